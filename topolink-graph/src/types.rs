//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use serde::Serialize;

/// Per-interface metadata attached to a [`Node`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InterfaceDetails {
    pub ip_address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub global_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rdma_device: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub node_guid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sys_image_guid: String,
    pub speed_mbps: u32,
}

/// A discovered machine, keyed by its stable `machine_id` in the graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Node {
    pub machine_id: String,
    pub hostname: String,
    pub last_seen: u64,
    pub interfaces: BTreeMap<String, InterfaceDetails>,
    pub is_local: bool,
}

/// A directional edge from a source node to a destination node, carrying
/// both endpoints' interface identity and metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Edge {
    pub local_interface: String,
    pub local_address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_rdma_device: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_node_guid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub local_sys_image_guid: String,
    pub local_speed_mbps: u32,

    pub remote_interface: String,
    pub remote_address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_prefixes: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_rdma_device: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_node_guid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_sys_image_guid: String,
    pub remote_speed_mbps: u32,

    pub direct: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub learned_from: String,
}

/// An inferred shared L2 broadcast domain, derived on demand and never
/// persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkSegment {
    pub id: String,
    pub interface: String,
    pub network_prefix: String,
    pub connected_nodes: Vec<String>,
    pub edge_info: BTreeMap<String, Edge>,
}
