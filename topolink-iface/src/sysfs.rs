//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Best-effort RDMA and link-speed metadata via Linux sysfs. Every read
//! here is optional: a missing file just leaves the field at its
//! "unknown" default (empty string / zero speed), per §9's guidance to
//! treat empty values as unknown rather than modeling interface kinds.

use std::fs;
use std::path::Path;

use crate::InterfaceInfo;

pub(crate) fn enrich(info: &mut InterfaceInfo) {
    let base = format!("/sys/class/net/{}", info.name);

    if let Some(speed) = read_u32(&format!("{base}/speed")) {
        info.speed_mbps = speed;
    }

    let ib_root = format!("{base}/device/infiniband");
    let Ok(mut entries) = fs::read_dir(&ib_root) else {
        return;
    };
    let Some(Ok(device)) = entries.next() else {
        return;
    };
    let device_name = device.file_name().to_string_lossy().to_string();
    info.rdma_device = device_name.clone();

    let device_path = Path::new(&ib_root).join(&device_name);
    if let Some(guid) = read_trimmed(&device_path.join("node_guid")) {
        info.node_guid = guid;
    }
    if let Some(guid) = read_trimmed(&device_path.join("sys_image_guid")) {
        info.sys_image_guid = guid;
    }
}

fn read_u32(path: &str) -> Option<u32> {
    read_trimmed(Path::new(path)).and_then(|s| s.parse().ok())
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
