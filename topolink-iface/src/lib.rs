//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The interface enumerator: an external collaborator (§6) that lists
//! active non-loopback interfaces and their link-local address, global
//! prefixes, and best-effort RDMA/speed metadata.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tracing::warn;

mod sysfs;

/// The tuple an interface enumerator supplies for each active interface,
/// per §6's "External collaborators" contract.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    pub link_local_address: Option<IpAddr>,
    pub global_prefixes: Vec<IpNetwork>,
    pub rdma_device: String,
    pub node_guid: String,
    pub sys_image_guid: String,
    pub speed_mbps: u32,
}

/// Errors from platform-level interface enumeration. Per §7,
/// non-fatal: logged and retried on the next refresh.
#[derive(Debug)]
pub struct InterfaceEnumerationError(nix::Error);

impl std::fmt::Display for InterfaceEnumerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to enumerate interfaces")
    }
}

impl std::error::Error for InterfaceEnumerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl InterfaceEnumerationError {
    pub fn log(&self) {
        warn!(error = %self.0, "{}", self);
    }
}

/// Lists every active, non-loopback interface with at least one usable
/// address, along with its metadata.
pub fn list_active_interfaces() -> Result<Vec<InterfaceInfo>, InterfaceEnumerationError> {
    let addrs = getifaddrs().map_err(InterfaceEnumerationError)?;

    let mut by_name: BTreeMap<String, InterfaceInfo> = BTreeMap::new();

    for addr in addrs {
        if !addr.flags.contains(InterfaceFlags::IFF_UP)
            || addr.flags.contains(InterfaceFlags::IFF_LOOPBACK)
        {
            continue;
        }

        let Some(sockaddr) = addr.address else {
            continue;
        };
        let Some(ip) = to_ip_addr(&sockaddr) else {
            continue;
        };

        let entry = by_name.entry(addr.interface_name.clone()).or_insert_with(|| {
            InterfaceInfo {
                name: addr.interface_name.clone(),
                ..Default::default()
            }
        });

        if topolink_utils::ip::is_link_local(&ip) {
            entry.link_local_address.get_or_insert(ip);
            continue;
        }

        let prefix_len = addr
            .netmask
            .as_ref()
            .and_then(to_ip_addr)
            .map(|mask| netmask_to_prefix_len(mask))
            .unwrap_or(if ip.is_ipv4() { 32 } else { 128 });

        if let Ok(network) = IpNetwork::new(ip, prefix_len) {
            if topolink_utils::ip::is_global_prefix(&network) {
                entry.global_prefixes.push(network);
            }
        }
    }

    for info in by_name.values_mut() {
        info.global_prefixes.sort_by_key(|n| n.to_string());
        info.global_prefixes.dedup();
        sysfs::enrich(info);
    }

    Ok(by_name
        .into_values()
        .filter(|i| i.link_local_address.is_some())
        .collect())
}

fn to_ip_addr(addr: &nix::sys::socket::SockaddrStorage) -> Option<IpAddr> {
    if let Some(v4) = addr.as_sockaddr_in() {
        Some(IpAddr::V4(std::net::Ipv4Addr::from(v4.ip())))
    } else {
        addr.as_sockaddr_in6().map(|v6| IpAddr::V6(v6.ip()))
    }
}

fn netmask_to_prefix_len(mask: IpAddr) -> u8 {
    match mask {
        IpAddr::V4(v4) => u32::from(v4).count_ones() as u8,
        IpAddr::V6(v6) => v6.octets().iter().map(|b| b.count_ones() as u8).sum(),
    }
}
