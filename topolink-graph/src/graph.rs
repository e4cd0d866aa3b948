//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::segment;
use crate::types::{Edge, InterfaceDetails, Node, NetworkSegment};

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, Node>,
    // edges[src][dst] -> edges ordered by insertion, at most one per
    // (local_interface, remote_interface) pair.
    edges: HashMap<String, HashMap<String, Vec<Edge>>>,
    local_machine_id: String,
    changed: bool,
}

/// The concurrent topology store: nodes, multi-edges, and the change bit
/// that gates the exporter. A single read-write lock protects all state;
/// accessors hand back deep copies so callers never hold the lock across
/// I/O.
#[derive(Debug, Default)]
pub struct Graph {
    state: RwLock<State>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Creates or refreshes the local node. Idempotent; marks the change
    /// bit on the first call.
    pub fn set_local_node(
        &self,
        machine_id: &str,
        hostname: &str,
        interfaces: BTreeMap<String, InterfaceDetails>,
    ) {
        let mut state = self.state.write().unwrap();
        let is_new = state.local_machine_id.is_empty();
        state.local_machine_id = machine_id.to_string();
        let node = state
            .nodes
            .entry(machine_id.to_string())
            .or_insert_with(|| Node {
                machine_id: machine_id.to_string(),
                is_local: true,
                ..Default::default()
            });
        node.hostname = hostname.to_string();
        node.interfaces = interfaces;
        node.last_seen = now_unix();
        node.is_local = true;
        if is_new {
            state.changed = true;
        }
    }

    /// Refreshes the local node's `last_seen` without touching its
    /// interface metadata. Called once per send cycle (§4.2).
    pub fn touch_local(&self) {
        let mut state = self.state.write().unwrap();
        let local_id = state.local_machine_id.clone();
        if let Some(node) = state.nodes.get_mut(&local_id) {
            node.last_seen = now_unix();
        }
    }

    /// Feeds a direct update from the receiver (§4.3 step 1): an
    /// announcement was received on `local_interface` from a peer
    /// reporting the given fields on `remote_interface`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_or_update(
        &self,
        remote_machine_id: &str,
        remote_hostname: &str,
        remote_interface: &str,
        remote_address: &str,
        local_interface: &str,
        remote_rdma_device: &str,
        remote_node_guid: &str,
        remote_sys_image_guid: &str,
        remote_speed_mbps: u32,
        remote_global_prefixes: &[String],
        direct: bool,
        learned_from: &str,
    ) {
        let mut state = self.state.write().unwrap();
        let local_id = state.local_machine_id.clone();
        if remote_machine_id == local_id {
            // Self-announcement; the receiver should have already dropped
            // the whole datagram (B1), but defend regardless (I5).
            return;
        }

        let remote_details = InterfaceDetails {
            ip_address: remote_address.to_string(),
            global_prefixes: remote_global_prefixes.to_vec(),
            rdma_device: remote_rdma_device.to_string(),
            node_guid: remote_node_guid.to_string(),
            sys_image_guid: remote_sys_image_guid.to_string(),
            speed_mbps: remote_speed_mbps,
        };
        upsert_node(
            &mut state,
            remote_machine_id,
            remote_hostname,
            remote_interface,
            remote_details.clone(),
        );

        let local_details = state
            .nodes
            .get(&local_id)
            .and_then(|n| n.interfaces.get(local_interface))
            .cloned()
            .unwrap_or_default();

        let edge = Edge {
            local_interface: local_interface.to_string(),
            local_address: local_details.ip_address,
            local_prefixes: local_details.global_prefixes,
            local_rdma_device: local_details.rdma_device,
            local_node_guid: local_details.node_guid,
            local_sys_image_guid: local_details.sys_image_guid,
            local_speed_mbps: local_details.speed_mbps,
            remote_interface: remote_interface.to_string(),
            remote_address: remote_address.to_string(),
            remote_prefixes: remote_details.global_prefixes,
            remote_rdma_device: remote_details.rdma_device,
            remote_node_guid: remote_details.node_guid,
            remote_sys_image_guid: remote_details.sys_image_guid,
            remote_speed_mbps: remote_details.speed_mbps,
            direct,
            learned_from: learned_from.to_string(),
        };
        upsert_edge(&mut state, &local_id, remote_machine_id, edge);
    }

    /// Feeds an indirect update from the receiver (§4.3 step 2): `relay`
    /// reported `neighbor` in its neighbor list. Stores an edge from the
    /// relay to the neighbor with `direct=false`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_or_update_indirect(
        &self,
        relay_machine_id: &str,
        neighbor_machine_id: &str,
        neighbor_hostname: &str,
        local_interface: &str,
        local_address: &str,
        local_prefixes: &[String],
        local_rdma_device: &str,
        local_node_guid: &str,
        local_sys_image_guid: &str,
        local_speed_mbps: u32,
        remote_interface: &str,
        remote_address: &str,
        remote_prefixes: &[String],
        remote_rdma_device: &str,
        remote_node_guid: &str,
        remote_sys_image_guid: &str,
        remote_speed_mbps: u32,
    ) {
        let mut state = self.state.write().unwrap();
        let local_id = state.local_machine_id.clone();
        if neighbor_machine_id == local_id {
            // I5: local never appears as its own neighbor via a relay.
            return;
        }

        let neighbor_details = InterfaceDetails {
            ip_address: remote_address.to_string(),
            global_prefixes: remote_prefixes.to_vec(),
            rdma_device: remote_rdma_device.to_string(),
            node_guid: remote_node_guid.to_string(),
            sys_image_guid: remote_sys_image_guid.to_string(),
            speed_mbps: remote_speed_mbps,
        };
        upsert_node(
            &mut state,
            neighbor_machine_id,
            neighbor_hostname,
            remote_interface,
            neighbor_details,
        );

        let edge = Edge {
            local_interface: local_interface.to_string(),
            local_address: local_address.to_string(),
            local_prefixes: local_prefixes.to_vec(),
            local_rdma_device: local_rdma_device.to_string(),
            local_node_guid: local_node_guid.to_string(),
            local_sys_image_guid: local_sys_image_guid.to_string(),
            local_speed_mbps,
            remote_interface: remote_interface.to_string(),
            remote_address: remote_address.to_string(),
            remote_prefixes: remote_prefixes.to_vec(),
            remote_rdma_device: remote_rdma_device.to_string(),
            remote_node_guid: remote_node_guid.to_string(),
            remote_sys_image_guid: remote_sys_image_guid.to_string(),
            remote_speed_mbps,
            direct: false,
            learned_from: relay_machine_id.to_string(),
        };
        upsert_edge(&mut state, relay_machine_id, neighbor_machine_id, edge);
    }

    /// Removes nodes (other than the local node) whose `last_seen` is
    /// older than `timeout`, cascading to their edges. Returns the number
    /// of nodes removed.
    pub fn remove_expired(&self, timeout: std::time::Duration) -> usize {
        let mut state = self.state.write().unwrap();
        let now = now_unix();
        let cutoff = now.saturating_sub(timeout.as_secs());
        let local_id = state.local_machine_id.clone();

        let expired: HashSet<String> = state
            .nodes
            .values()
            .filter(|n| !n.is_local && n.machine_id != local_id)
            .filter(|n| n.last_seen < cutoff)
            .map(|n| n.machine_id.clone())
            .collect();

        if expired.is_empty() {
            return 0;
        }

        for id in &expired {
            state.nodes.remove(id);
        }

        // Cascade: drop edges sourced at or destined to an expired node.
        state.edges.retain(|src, _| !expired.contains(src));
        for dsts in state.edges.values_mut() {
            dsts.retain(|dst, _| !expired.contains(dst));
        }
        // Drop remaining edges relayed through an expired node.
        for dsts in state.edges.values_mut() {
            for edges in dsts.values_mut() {
                edges.retain(|e| !expired.contains(&e.learned_from));
            }
        }
        // Prune empty inner maps.
        for dsts in state.edges.values_mut() {
            dsts.retain(|_, edges| !edges.is_empty());
        }
        state.edges.retain(|_, dsts| !dsts.is_empty());

        state.changed = true;
        expired.len()
    }

    /// Returns a deep copy of every known node.
    pub fn get_nodes(&self) -> HashMap<String, Node> {
        self.state.read().unwrap().nodes.clone()
    }

    /// Returns a deep copy of the full edge map.
    pub fn get_edges(&self) -> HashMap<String, HashMap<String, Vec<Edge>>> {
        self.state.read().unwrap().edges.clone()
    }

    /// Returns the direct edges sourced at the local node.
    pub fn get_direct_neighbors(&self) -> Vec<Edge> {
        self.get_direct_neighbors_with_id()
            .into_iter()
            .map(|(_, edge)| edge)
            .collect()
    }

    /// Returns the direct edges sourced at the local node, paired with
    /// each edge's destination machine_id and hostname.
    pub fn get_direct_neighbors_with_id(&self) -> Vec<(String, Edge)> {
        let state = self.state.read().unwrap();
        state
            .edges
            .get(&state.local_machine_id)
            .into_iter()
            .flat_map(|dsts| dsts.iter())
            .flat_map(|(dst, edges)| edges.iter().map(move |e| (dst.clone(), e.clone())))
            .filter(|(_, e)| e.direct)
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.state.read().unwrap().changed
    }

    pub fn clear_changes(&self) {
        self.state.write().unwrap().changed = false;
    }

    /// Runs the segment detector (§4.5) over a consistent snapshot.
    pub fn get_network_segments(&self) -> Vec<NetworkSegment> {
        let state = self.state.read().unwrap();
        segment::detect_segments(&state.nodes, &state.edges, &state.local_machine_id)
    }

    /// Returns the local node's machine_id, or an empty string before
    /// `set_local_node` has been called.
    pub fn local_machine_id(&self) -> String {
        self.state.read().unwrap().local_machine_id.clone()
    }

    /// Rewinds a node's `last_seen` by `age`, for exercising expiration
    /// from outside the crate without a real clock dependency.
    #[cfg(feature = "testing")]
    pub fn age_node(&self, machine_id: &str, age: std::time::Duration) {
        let mut state = self.state.write().unwrap();
        if let Some(node) = state.nodes.get_mut(machine_id) {
            node.last_seen = node.last_seen.saturating_sub(age.as_secs());
        }
    }
}

fn upsert_node(
    state: &mut State,
    machine_id: &str,
    hostname: &str,
    interface_name: &str,
    details: InterfaceDetails,
) {
    match state.nodes.get_mut(machine_id) {
        None => {
            let mut interfaces = BTreeMap::new();
            interfaces.insert(interface_name.to_string(), details);
            state.nodes.insert(
                machine_id.to_string(),
                Node {
                    machine_id: machine_id.to_string(),
                    hostname: hostname.to_string(),
                    last_seen: now_unix(),
                    interfaces,
                    is_local: false,
                },
            );
            state.changed = true;
        }
        Some(node) => {
            if node.hostname != hostname {
                node.hostname = hostname.to_string();
                state.changed = true;
            }
            node.last_seen = now_unix();
            match node.interfaces.get(interface_name) {
                None => {
                    node.interfaces.insert(interface_name.to_string(), details);
                    state.changed = true;
                }
                Some(existing) => {
                    let material_changed = existing.ip_address != details.ip_address
                        || existing.rdma_device != details.rdma_device
                        || existing.speed_mbps != details.speed_mbps;
                    if material_changed {
                        node.interfaces.insert(interface_name.to_string(), details);
                        state.changed = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_interfaces() -> BTreeMap<String, InterfaceDetails> {
        let mut map = BTreeMap::new();
        map.insert(
            "e0".to_string(),
            InterfaceDetails {
                ip_address: "fe80::a%e0".to_string(),
                ..Default::default()
            },
        );
        map
    }

    fn new_local_graph() -> Graph {
        let graph = Graph::new();
        graph.set_local_node("A", "node-a", local_interfaces());
        graph
    }

    #[test]
    fn direct_update_creates_node_and_edge() {
        let graph = new_local_graph();
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );

        let nodes = graph.get_nodes();
        assert!(nodes.contains_key("B"));
        let edges = graph.get_edges();
        let edge = &edges["A"]["B"][0];
        assert!(edge.direct);
        assert_eq!(edge.local_address, "fe80::a%e0");
        assert_eq!(edge.remote_address, "fe80::b%e0");
    }

    #[test]
    fn repeated_identical_update_is_idempotent() {
        // L2: applying the same update twice matches applying it once.
        let graph = new_local_graph();
        for _ in 0..2 {
            graph.add_or_update(
                "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
                true, "",
            );
        }
        let edges = graph.get_edges();
        assert_eq!(edges["A"]["B"].len(), 1);
    }

    #[test]
    fn indirect_edge_does_not_demote_direct_edge() {
        // L3 / I6.
        let graph = new_local_graph();
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            false, "C",
        );
        let edges = graph.get_edges();
        assert!(edges["A"]["B"][0].direct);
        assert_eq!(edges["A"]["B"][0].learned_from, "");
    }

    #[test]
    fn indirect_edge_is_promoted_by_later_direct_evidence() {
        let graph = new_local_graph();
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            false, "C",
        );
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        let edges = graph.get_edges();
        assert!(edges["A"]["B"][0].direct);
        assert_eq!(edges["A"]["B"][0].learned_from, "");
    }

    #[test]
    fn self_announcement_makes_no_mutation() {
        // B1.
        let graph = new_local_graph();
        graph.add_or_update(
            "A", "node-a", "e0", "fe80::a%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        assert_eq!(graph.get_nodes().len(), 1);
        assert!(graph.get_edges().is_empty());
    }

    #[test]
    fn neighbor_entry_naming_local_is_skipped() {
        // B2 / I5.
        let graph = new_local_graph();
        graph.add_or_update_indirect(
            "C", "A", "node-a", "e0", "fe80::c%e0", &[], "", "", "", 0, "e0",
            "fe80::a%e0", &[], "", "", "", 0,
        );
        assert!(graph.get_edges().is_empty());
    }

    #[test]
    fn remove_expired_drops_remote_nodes_and_cascading_edges() {
        // P1 / I2 / S5.
        let graph = new_local_graph();
        graph.add_or_update(
            "R", "relay", "e0", "fe80::r%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        graph.add_or_update_indirect(
            "R", "N", "node-n", "e0", "fe80::r%e0", &[], "", "", "", 0, "e0",
            "fe80::n%e0", &[], "", "", "", 0,
        );
        assert!(graph.get_nodes().contains_key("R"));
        assert!(graph.get_nodes().contains_key("N"));

        // Age R out by rewinding its last_seen far into the past.
        {
            let mut state = graph.state.write().unwrap();
            state.nodes.get_mut("R").unwrap().last_seen = 0;
        }

        let removed = graph.remove_expired(std::time::Duration::from_secs(1));
        assert_eq!(removed, 1);
        let nodes = graph.get_nodes();
        assert!(!nodes.contains_key("R"));
        // N has no independent evidence but the edge via R is gone too.
        let edges = graph.get_edges();
        assert!(!edges.contains_key("R"));
    }

    #[test]
    fn remove_expired_never_removes_local_node() {
        // I3.
        let graph = new_local_graph();
        {
            let mut state = graph.state.write().unwrap();
            state.nodes.get_mut("A").unwrap().last_seen = 0;
        }
        let removed = graph.remove_expired(std::time::Duration::from_secs(0));
        assert_eq!(removed, 0);
        assert!(graph.get_nodes().contains_key("A"));
    }

    #[test]
    fn zero_timeout_removes_every_aged_remote_node() {
        // B3.
        let graph = new_local_graph();
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        {
            let mut state = graph.state.write().unwrap();
            state.nodes.get_mut("B").unwrap().last_seen = 0;
        }
        let removed = graph.remove_expired(std::time::Duration::from_secs(0));
        assert_eq!(removed, 1);
    }

    #[test]
    fn get_direct_neighbors_excludes_indirect_edges() {
        let graph = new_local_graph();
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        graph.add_or_update_indirect(
            "B", "C", "node-c", "e0", "fe80::b%e0", &[], "", "", "", 0, "e0",
            "fe80::c%e0", &[], "", "", "", 0,
        );
        let neighbors = graph.get_direct_neighbors();
        assert_eq!(neighbors.len(), 1);
        assert!(neighbors[0].direct);
    }

    #[test]
    fn change_bit_clears_only_on_request() {
        let graph = new_local_graph();
        assert!(graph.has_changes());
        graph.clear_changes();
        assert!(!graph.has_changes());
        graph.add_or_update(
            "B", "node-b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[],
            true, "",
        );
        assert!(graph.has_changes());
    }
}

fn upsert_edge(state: &mut State, src: &str, dst: &str, edge: Edge) {
    let edges = state
        .edges
        .entry(src.to_string())
        .or_default()
        .entry(dst.to_string())
        .or_default();

    match edges.iter_mut().find(|e| {
        e.local_interface == edge.local_interface
            && e.remote_interface == edge.remote_interface
    }) {
        None => {
            edges.push(edge);
            state.changed = true;
        }
        Some(existing) => {
            if !existing.direct && edge.direct {
                // Promotion: indirect -> direct.
                *existing = edge;
                state.changed = true;
            } else if existing.direct == edge.direct {
                if *existing != edge {
                    *existing = edge;
                    state.changed = true;
                }
            }
            // else: existing is direct and the update is indirect; the
            // more-direct variant is preserved (I6), no change.
        }
    }
}
