//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The receiver loop (§4.3): join the multicast group on every active
//! interface, recover the receiving interface for each datagram via
//! ancillary `IPV6_PKTINFO` data, and dispatch direct/indirect updates.

use std::collections::HashSet;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use topolink_graph::{Graph, Metrics};
use topolink_proto::Announcement;
use topolink_utils::socket::{self, SocketExt, UdpSocket, UdpSocketExt};
use tracing::{debug, warn};

use crate::error::Error;

/// How often the receiver re-enumerates active interfaces and refreshes
/// its multicast group membership.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    pub multicast_address: Ipv6Addr,
    pub multicast_port: u16,
    pub include_neighbors: bool,
    pub local_machine_id: String,
}

/// Runs the receiver loop forever, returning only if the root socket
/// cannot be set up — the one failure in this loop that's fatal at the
/// daemon level rather than recoverable per-interface or per-datagram.
pub async fn run(
    graph: Arc<Graph>,
    metrics: Arc<Metrics>,
    config: ReceiverConfig,
) -> Result<(), Error> {
    let socket = setup_socket(config.multicast_port).map_err(Error::SocketSetupFailed)?;

    let mut joined: HashSet<u32> = HashSet::new();
    refresh_joins(&socket, &config.multicast_address, &mut joined, &metrics);

    let mut refresh = tokio::time::interval(REFRESH_INTERVAL);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut buf = vec![0u8; 65535];

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                refresh_joins(&socket, &config.multicast_address, &mut joined, &metrics);
            }
            result = socket::recv_with_pktinfo(&socket, &mut buf) => {
                match result {
                    Ok((n, _src, pktinfo)) => {
                        handle_datagram(&graph, &metrics, &config, &buf[..n], pktinfo);
                    }
                    Err(error) => {
                        warn!(error = %error, "failed to receive announcement");
                    }
                }
            }
        }
    }
}

fn setup_socket(port: u16) -> std::io::Result<UdpSocket> {
    let addr: SocketAddr = format!("[::]:{port}").parse().unwrap();
    let socket = UdpSocket::bind_reuseaddr(addr)?;
    socket.set_ipv6_pktinfo(true)?;
    Ok(socket)
}

fn refresh_joins(
    socket: &UdpSocket,
    group: &Ipv6Addr,
    joined: &mut HashSet<u32>,
    metrics: &Metrics,
) {
    let interfaces = match topolink_iface::list_active_interfaces() {
        Ok(interfaces) => interfaces,
        Err(error) => {
            error.log();
            return;
        }
    };

    let mut active = HashSet::new();
    for interface in &interfaces {
        let Ok(ifindex) = nix::net::if_::if_nametoindex(interface.name.as_str()) else {
            continue;
        };
        active.insert(ifindex);
        if joined.contains(&ifindex) {
            continue;
        }
        match socket.join_multicast_v6(group, ifindex) {
            Ok(()) => {
                joined.insert(ifindex);
                debug!(interface = %interface.name, "joined multicast group");
            }
            Err(error) => {
                metrics.record_join_failure(&interface.name);
                Error::JoinFailed {
                    interface: interface.name.clone(),
                    source: error,
                }
                .log();
            }
        }
    }

    // Leave interfaces that disappeared from the active list (§5: "any
    // per-interface socket is closed when that interface disappears").
    let stale: Vec<u32> = joined.difference(&active).copied().collect();
    for ifindex in stale {
        let _ = socket.leave_multicast_v6(group, ifindex);
        joined.remove(&ifindex);
    }
}

fn handle_datagram(
    graph: &Graph,
    metrics: &Metrics,
    config: &ReceiverConfig,
    payload: &[u8],
    pktinfo: Option<socket::PktInfo>,
) {
    let announcement = match Announcement::decode(payload) {
        Ok(announcement) => announcement,
        Err(error) => {
            metrics.record_decode_failure();
            error.log();
            return;
        }
    };

    // B1: self-announcements make no graph mutation.
    if announcement.machine_id == config.local_machine_id {
        return;
    }

    let receiving_interface = pktinfo
        .and_then(|info| nix::net::if_::if_indextoname(info.ifindex).ok())
        .and_then(|name| name.to_str().map(str::to_owned).ok())
        .unwrap_or_default();

    graph.add_or_update(
        &announcement.machine_id,
        &announcement.hostname,
        &announcement.interface,
        &announcement.source_ip,
        &receiving_interface,
        &announcement.rdma_device,
        &announcement.node_guid,
        &announcement.sys_image_guid,
        announcement.speed,
        &announcement.global_prefixes,
        true,
        "",
    );

    if !config.include_neighbors || announcement.neighbors.is_empty() {
        return;
    }

    for neighbor in &announcement.neighbors {
        // B2: neighbor entries naming the local machine are skipped.
        if neighbor.machine_id == config.local_machine_id {
            continue;
        }
        graph.add_or_update_indirect(
            &announcement.machine_id,
            &neighbor.machine_id,
            &neighbor.hostname,
            &neighbor.local_interface,
            &neighbor.local_address,
            &neighbor.local_prefixes,
            &neighbor.local_rdma_device,
            &neighbor.local_node_guid,
            &neighbor.local_sys_image_guid,
            neighbor.local_speed_mbps,
            &neighbor.remote_interface,
            &neighbor.remote_address,
            &neighbor.remote_prefixes,
            &neighbor.remote_rdma_device,
            &neighbor.remote_node_guid,
            &neighbor.remote_sys_image_guid,
            neighbor.remote_speed_mbps,
        );
    }
}
