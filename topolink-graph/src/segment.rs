//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Stateless inference of shared L2 segments from a graph snapshot, per
//! §4.5. Connected-components + same-interface-name + 2-node
//! prefix-shared special case — not the maximum-clique variant.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::types::{Edge, NetworkSegment, Node};

type EdgeMap = HashMap<String, HashMap<String, Vec<Edge>>>;

/// Runs stages A through E over a consistent snapshot and returns the
/// resulting segments, numbered `segment_0, segment_1, ...` in
/// deterministic output order.
pub fn detect_segments(
    nodes: &HashMap<String, Node>,
    edges: &EdgeMap,
    local_machine_id: &str,
) -> Vec<NetworkSegment> {
    let mut tagged: Vec<(NetworkSegment, SegmentOrigin)> = Vec::new();
    let mut claimed_interfaces: HashSet<String> = HashSet::new();

    stage_a_local_perspective(edges, local_machine_id, &mut tagged, &mut claimed_interfaces);
    stage_b_remote_perspective(edges, local_machine_id, &claimed_interfaces, &mut tagged);
    stage_b_cross_named_pairs(edges, local_machine_id, &claimed_interfaces, &mut tagged);

    for (segment, origin) in &mut tagged {
        stage_c_assign_prefix(segment, nodes, local_machine_id, origin);
    }

    let segments = tagged.into_iter().map(|(segment, _)| segment).collect();
    let merged = stage_d_merge_by_prefix(segments);
    stage_e_number(merged)
}

/// Distinguishes how a segment's `edge_info` entries are indexed, so Stage C
/// can tell which side of each `Edge` is "that member's own" without
/// guessing from interface-name overlap (same-named interfaces across hosts
/// are the norm here, not a corner case).
enum SegmentOrigin {
    /// Stage A: `edge_info` is keyed by remote member, but every entry is
    /// the literal edge as recorded from the local node's perspective —
    /// `local_prefixes` is the local node's own prefix set on every entry,
    /// and `remote_prefixes` is that specific member's own prefix set. The
    /// local node is an implicit member with no `edge_info` entry of its
    /// own.
    LocalPerspective,
    /// Stage B and its cross-named extension: `edge_info` is reindexed per
    /// member, so each entry's own prefixes are already its
    /// `local_prefixes`.
    MemberPerspective,
}

/// Stage A: group edges sourced at the local node by `local_interface`;
/// keep groups with at least two remote members.
fn stage_a_local_perspective(
    edges: &EdgeMap,
    local_machine_id: &str,
    segments: &mut Vec<(NetworkSegment, SegmentOrigin)>,
    claimed_interfaces: &mut HashSet<String>,
) {
    let Some(local_edges) = edges.get(local_machine_id) else {
        return;
    };

    let mut by_interface: BTreeMap<String, BTreeMap<String, Edge>> = BTreeMap::new();
    for (dst, dst_edges) in local_edges {
        for edge in dst_edges {
            let slot = by_interface
                .entry(edge.local_interface.clone())
                .or_default();
            match slot.get(dst) {
                Some(existing) if existing.direct && !edge.direct => {}
                _ => {
                    slot.insert(dst.clone(), edge.clone());
                }
            }
        }
    }

    for (interface, members) in by_interface {
        if members.len() < 2 {
            continue;
        }
        claimed_interfaces.insert(interface.clone());

        let mut connected_nodes: BTreeSet<String> = members.keys().cloned().collect();
        connected_nodes.insert(local_machine_id.to_string());

        let edge_info: BTreeMap<String, Edge> = members.into_iter().collect();

        segments.push((
            NetworkSegment {
                id: String::new(),
                interface,
                network_prefix: String::new(),
                connected_nodes: connected_nodes.into_iter().collect(),
                edge_info,
            },
            SegmentOrigin::LocalPerspective,
        ));
    }
}

/// Stage B: on interfaces not already claimed by Stage A, find symmetric
/// same-interface-name edges between non-local nodes and compute
/// connected components by BFS.
fn stage_b_remote_perspective(
    edges: &EdgeMap,
    local_machine_id: &str,
    claimed_interfaces: &HashSet<String>,
    segments: &mut Vec<(NetworkSegment, SegmentOrigin)>,
) {
    // interface name -> adjacency of (node -> Vec<(neighbor, edge)>)
    let mut by_interface: BTreeMap<String, HashMap<String, Vec<(String, Edge)>>> =
        BTreeMap::new();

    for (src, dsts) in edges {
        if src == local_machine_id {
            continue;
        }
        for (dst, dst_edges) in dsts {
            if dst == local_machine_id {
                continue;
            }
            for edge in dst_edges {
                if edge.local_interface != edge.remote_interface {
                    continue;
                }
                if claimed_interfaces.contains(&edge.local_interface) {
                    continue;
                }
                by_interface
                    .entry(edge.local_interface.clone())
                    .or_default()
                    .entry(src.clone())
                    .or_default()
                    .push((dst.clone(), edge.clone()));
            }
        }
    }

    for (interface, adjacency) in by_interface {
        let components = connected_components(&adjacency);
        for component in components {
            if component.len() < 2 {
                continue;
            }
            if component.len() == 2 {
                if !pair_shares_prefix(&component, &adjacency) {
                    continue;
                }
            }

            let edge_info = representative_edges(&component, &adjacency);
            segments.push((
                NetworkSegment {
                    id: String::new(),
                    interface: interface.clone(),
                    network_prefix: String::new(),
                    connected_nodes: component.into_iter().collect(),
                    edge_info,
                },
                SegmentOrigin::MemberPerspective,
            ));
        }
    }
}

/// Extension to the 2-node rule: a point-to-point link whose two ends
/// name their interface differently (bridge vs. VLAN sub-interface naming
/// conventions rarely agree) still forms a segment when both sides report
/// an identical `global_prefixes` entry. The representative interface is
/// the sorted join of the two distinct names, matching Stage D's naming
/// convention for composite segments.
fn stage_b_cross_named_pairs(
    edges: &EdgeMap,
    local_machine_id: &str,
    claimed_interfaces: &HashSet<String>,
    segments: &mut Vec<(NetworkSegment, SegmentOrigin)>,
) {
    for (src, dsts) in edges {
        if src == local_machine_id {
            continue;
        }
        for (dst, dst_edges) in dsts {
            if dst == local_machine_id {
                continue;
            }
            for edge in dst_edges {
                if edge.local_interface == edge.remote_interface {
                    continue;
                }
                if claimed_interfaces.contains(&edge.local_interface)
                    || claimed_interfaces.contains(&edge.remote_interface)
                {
                    continue;
                }
                let shares_prefix = edge
                    .local_prefixes
                    .iter()
                    .any(|p| edge.remote_prefixes.contains(p));
                if !shares_prefix {
                    continue;
                }

                let mut names: BTreeSet<String> = BTreeSet::new();
                names.insert(edge.local_interface.clone());
                names.insert(edge.remote_interface.clone());
                let interface = representative_interface_name(&names);

                let mut connected_nodes = BTreeSet::new();
                connected_nodes.insert(src.clone());
                connected_nodes.insert(dst.clone());

                let mut edge_info = BTreeMap::new();
                edge_info.insert(src.clone(), edge.clone());
                let mut reversed = edge.clone();
                std::mem::swap(&mut reversed.local_interface, &mut reversed.remote_interface);
                std::mem::swap(&mut reversed.local_address, &mut reversed.remote_address);
                std::mem::swap(&mut reversed.local_prefixes, &mut reversed.remote_prefixes);
                std::mem::swap(&mut reversed.local_rdma_device, &mut reversed.remote_rdma_device);
                std::mem::swap(&mut reversed.local_node_guid, &mut reversed.remote_node_guid);
                std::mem::swap(
                    &mut reversed.local_sys_image_guid,
                    &mut reversed.remote_sys_image_guid,
                );
                std::mem::swap(&mut reversed.local_speed_mbps, &mut reversed.remote_speed_mbps);
                edge_info.insert(dst.clone(), reversed);

                segments.push((
                    NetworkSegment {
                        id: String::new(),
                        interface,
                        network_prefix: String::new(),
                        connected_nodes: connected_nodes.into_iter().collect(),
                        edge_info,
                    },
                    SegmentOrigin::MemberPerspective,
                ));
            }
        }
    }
}

fn connected_components(
    adjacency: &HashMap<String, Vec<(String, Edge)>>,
) -> Vec<BTreeSet<String>> {
    let mut all_nodes: BTreeSet<String> = BTreeSet::new();
    for (src, neighbors) in adjacency {
        all_nodes.insert(src.clone());
        for (dst, _) in neighbors {
            all_nodes.insert(dst.clone());
        }
    }

    let mut undirected: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (src, neighbors) in adjacency {
        for (dst, _) in neighbors {
            undirected.entry(src.as_str()).or_default().insert(dst.as_str());
            undirected.entry(dst.as_str()).or_default().insert(src.as_str());
        }
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut components = Vec::new();

    for node in &all_nodes {
        if visited.contains(node) {
            continue;
        }
        let mut component = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(node.clone());
        visited.insert(node.clone());

        while let Some(current) = queue.pop_front() {
            component.insert(current.clone());
            if let Some(neighbors) = undirected.get(current.as_str()) {
                for &neighbor in neighbors {
                    if !visited.contains(neighbor) {
                        visited.insert(neighbor.to_string());
                        queue.push_back(neighbor.to_string());
                    }
                }
            }
        }
        components.push(component);
    }

    components
}

fn pair_shares_prefix(
    component: &BTreeSet<String>,
    adjacency: &HashMap<String, Vec<(String, Edge)>>,
) -> bool {
    let members: Vec<&String> = component.iter().collect();
    let (a, b) = (members[0], members[1]);

    let edge_a_to_b = adjacency
        .get(a)
        .and_then(|v| v.iter().find(|(dst, _)| dst == b));
    let edge_b_to_a = adjacency
        .get(b)
        .and_then(|v| v.iter().find(|(dst, _)| dst == a));

    let Some((_, edge)) = edge_a_to_b.or(edge_b_to_a) else {
        return false;
    };
    edge.local_prefixes
        .iter()
        .any(|p| edge.remote_prefixes.contains(p))
}

fn representative_edges(
    component: &BTreeSet<String>,
    adjacency: &HashMap<String, Vec<(String, Edge)>>,
) -> BTreeMap<String, Edge> {
    let mut edge_info = BTreeMap::new();
    for member in component {
        if let Some(neighbors) = adjacency.get(member) {
            if let Some((_, edge)) = neighbors.iter().min_by_key(|(dst, _)| dst.clone()) {
                edge_info.insert(member.clone(), edge.clone());
                continue;
            }
        }
        // This member only appears as a destination; find an edge that
        // points at it.
        for src in adjacency.keys().collect::<BTreeSet<_>>() {
            let neighbors = &adjacency[src];
            if let Some((_, edge)) = neighbors.iter().find(|(dst, _)| dst == member) {
                // The representative edge is recorded from the member's
                // own point of view: swap local/remote.
                let mut swapped = edge.clone();
                std::mem::swap(&mut swapped.local_interface, &mut swapped.remote_interface);
                std::mem::swap(&mut swapped.local_address, &mut swapped.remote_address);
                std::mem::swap(&mut swapped.local_prefixes, &mut swapped.remote_prefixes);
                std::mem::swap(&mut swapped.local_rdma_device, &mut swapped.remote_rdma_device);
                std::mem::swap(&mut swapped.local_node_guid, &mut swapped.remote_node_guid);
                std::mem::swap(
                    &mut swapped.local_sys_image_guid,
                    &mut swapped.remote_sys_image_guid,
                );
                std::mem::swap(&mut swapped.local_speed_mbps, &mut swapped.remote_speed_mbps);
                edge_info.insert(member.clone(), swapped);
                break;
            }
        }
    }
    edge_info
}

/// Stage C: most-common shared CIDR across members' interface-of-record
/// `global_prefixes`, ties broken lexicographically. Each member's own
/// prefix set is counted exactly once, regardless of how many `edge_info`
/// entries reference it.
fn stage_c_assign_prefix(
    segment: &mut NetworkSegment,
    nodes: &HashMap<String, Node>,
    local_machine_id: &str,
    origin: &SegmentOrigin,
) {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    match origin {
        SegmentOrigin::LocalPerspective => {
            if let Some(local_prefixes) = nodes
                .get(local_machine_id)
                .and_then(|node| node.interfaces.get(&segment.interface))
            {
                tally(&mut counts, &local_prefixes.global_prefixes);
            }
            for edge in segment.edge_info.values() {
                tally(&mut counts, &edge.remote_prefixes);
            }
        }
        SegmentOrigin::MemberPerspective => {
            for edge in segment.edge_info.values() {
                tally(&mut counts, &edge.local_prefixes);
            }
        }
    }

    segment.network_prefix = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(prefix, _)| prefix)
        .unwrap_or_default();
}

fn tally(counts: &mut BTreeMap<String, usize>, prefixes: &[String]) {
    for prefix in prefixes {
        *counts.entry(prefix.clone()).or_insert(0) += 1;
    }
}

/// Stage D: merge segments sharing a non-empty `network_prefix`.
fn stage_d_merge_by_prefix(segments: Vec<NetworkSegment>) -> Vec<NetworkSegment> {
    let mut by_prefix: BTreeMap<String, Vec<NetworkSegment>> = BTreeMap::new();
    let mut unprefixed = Vec::new();

    for segment in segments {
        if segment.network_prefix.is_empty() {
            unprefixed.push(segment);
        } else {
            by_prefix
                .entry(segment.network_prefix.clone())
                .or_default()
                .push(segment);
        }
    }

    let mut merged = unprefixed;
    for (prefix, group) in by_prefix {
        if group.len() == 1 {
            merged.push(group.into_iter().next().unwrap());
            continue;
        }

        let mut connected_nodes: BTreeSet<String> = BTreeSet::new();
        let mut edge_info: BTreeMap<String, Edge> = BTreeMap::new();
        let mut interfaces: BTreeSet<String> = BTreeSet::new();

        for segment in group {
            interfaces.insert(segment.interface.clone());
            for node in segment.connected_nodes {
                connected_nodes.insert(node);
            }
            for (member, edge) in segment.edge_info {
                merge_edge_info(&mut edge_info, member, edge);
            }
        }

        let interface = representative_interface_name(&interfaces);

        merged.push(NetworkSegment {
            id: String::new(),
            interface,
            network_prefix: prefix,
            connected_nodes: connected_nodes.into_iter().collect(),
            edge_info,
        });
    }

    merged
}

fn merge_edge_info(edge_info: &mut BTreeMap<String, Edge>, member: String, edge: Edge) {
    match edge_info.get(&member) {
        None => {
            edge_info.insert(member, edge);
        }
        Some(existing) => {
            let existing_score = edge_preference_score(existing);
            let new_score = edge_preference_score(&edge);
            if new_score > existing_score {
                edge_info.insert(member, edge);
            }
        }
    }
}

fn edge_preference_score(edge: &Edge) -> u8 {
    let mut score = 0;
    if !edge.local_interface.is_empty() {
        score += 4;
    }
    if !edge.local_prefixes.is_empty() {
        score += 2;
    }
    if !edge.remote_prefixes.is_empty() {
        score += 1;
    }
    score
}

fn representative_interface_name(interfaces: &BTreeSet<String>) -> String {
    if interfaces.len() > 3 {
        return format!("mixed({})", interfaces.len());
    }
    interfaces.iter().cloned().collect::<Vec<_>>().join("+")
}

/// Stage E: number segments `segment_0, segment_1, ...` in deterministic
/// order: sorted by `network_prefix`, then representative interface, then
/// first member.
fn stage_e_number(mut segments: Vec<NetworkSegment>) -> Vec<NetworkSegment> {
    segments.sort_by(|a, b| {
        a.network_prefix
            .cmp(&b.network_prefix)
            .then_with(|| a.interface.cmp(&b.interface))
            .then_with(|| a.connected_nodes.first().cmp(&b.connected_nodes.first()))
    });

    for (index, segment) in segments.iter_mut().enumerate() {
        segment.id = format!("segment_{index}");
    }
    segments
}
