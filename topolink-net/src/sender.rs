//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The sender loop (§4.2): every `send_interval`, compose and transmit an
//! announcement on each active interface.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::MissedTickBehavior;
use topolink_graph::{Graph, Metrics};
use topolink_proto::{Announcement, NeighborEntry};
use topolink_utils::socket::{SocketExt, UdpSocket, UdpSocketExt};
use tracing::debug;

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub send_interval: Duration,
    pub multicast_address: Ipv6Addr,
    pub multicast_port: u16,
    pub include_neighbors: bool,
    pub local_machine_id: String,
    pub local_hostname: String,
}

/// Runs the sender loop forever. Intended to be wrapped in
/// `topolink_utils::task::Task::spawn_supervised`.
pub async fn run(graph: Arc<Graph>, metrics: Arc<Metrics>, config: SenderConfig) {
    let mut interval = tokio::time::interval(config.send_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        send_cycle(&graph, &metrics, &config).await;
    }
}

async fn send_cycle(graph: &Graph, metrics: &Metrics, config: &SenderConfig) {
    let interfaces = match topolink_iface::list_active_interfaces() {
        Ok(interfaces) => interfaces,
        Err(error) => {
            error.log();
            return;
        }
    };

    graph.touch_local();

    let neighbors = if config.include_neighbors {
        build_neighbor_entries(graph)
    } else {
        Vec::new()
    };

    let timestamp = now_unix();

    for interface in &interfaces {
        let Some(link_local) = interface.link_local_address else {
            continue;
        };

        let announcement = Announcement {
            hostname: config.local_hostname.clone(),
            machine_id: config.local_machine_id.clone(),
            timestamp,
            interface: interface.name.clone(),
            source_ip: format!("{link_local}%{}", interface.name),
            global_prefixes: interface
                .global_prefixes
                .iter()
                .map(|p| p.to_string())
                .collect(),
            rdma_device: interface.rdma_device.clone(),
            node_guid: interface.node_guid.clone(),
            sys_image_guid: interface.sys_image_guid.clone(),
            speed: interface.speed_mbps,
            neighbors: neighbors.clone(),
        };

        match send_on_interface(&interface.name, &announcement.encode(), config).await {
            Ok(()) => {
                metrics.record_send_success(&interface.name);
                debug!(interface = %interface.name, "sent announcement");
            }
            Err(error) => {
                metrics.record_send_failure(&interface.name);
                error.log();
            }
        }
    }
}

async fn send_on_interface(
    interface_name: &str,
    payload: &[u8],
    config: &SenderConfig,
) -> Result<(), Error> {
    let ifindex = nix::net::if_::if_nametoindex(interface_name)
        .map_err(|e| Error::SendFailed {
            interface: interface_name.to_string(),
            source: std::io::Error::from(e),
        })?;

    let socket = UdpSocket::bind_reuseaddr("[::]:0".parse().unwrap()).map_err(|e| {
        Error::SendFailed {
            interface: interface_name.to_string(),
            source: e,
        }
    })?;
    socket
        .set_multicast_ifindex_v6(ifindex)
        .map_err(|e| Error::SendFailed {
            interface: interface_name.to_string(),
            source: e,
        })?;

    let dest = SocketAddrV6::new(config.multicast_address, config.multicast_port, 0, ifindex);
    socket
        .send_to(payload, dest)
        .await
        .map(|_| ())
        .map_err(|e| Error::SendFailed {
            interface: interface_name.to_string(),
            source: e,
        })
}

fn build_neighbor_entries(graph: &Graph) -> Vec<NeighborEntry> {
    let local_id = graph.local_machine_id();
    let nodes = graph.get_nodes();

    graph
        .get_direct_neighbors_with_id()
        .into_iter()
        // Omit relays equal to the local machine_id (§4.2 step 2).
        .filter(|(dst, _)| *dst != local_id)
        .map(|(dst, edge)| {
            let hostname = nodes
                .get(&dst)
                .map(|n| n.hostname.clone())
                .unwrap_or_default();
            NeighborEntry {
                machine_id: dst,
                hostname,
                local_interface: edge.local_interface,
                local_address: edge.local_address,
                local_prefixes: edge.local_prefixes,
                local_rdma_device: edge.local_rdma_device,
                local_node_guid: edge.local_node_guid,
                local_sys_image_guid: edge.local_sys_image_guid,
                local_speed_mbps: edge.local_speed_mbps,
                remote_interface: edge.remote_interface,
                remote_address: edge.remote_address,
                remote_prefixes: edge.remote_prefixes,
                remote_rdma_device: edge.remote_rdma_device,
                remote_node_guid: edge.remote_node_guid,
                remote_sys_image_guid: edge.remote_sys_image_guid,
                remote_speed_mbps: edge.remote_speed_mbps,
            }
        })
        .collect()
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

