//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Literal end-to-end scenarios (§8 S1-S6), each composing several graph
//! operations the way the sender/receiver loop would.

use std::collections::BTreeMap;
use std::time::Duration;

use topolink_graph::{Graph, InterfaceDetails};

fn iface(addr: &str) -> BTreeMap<String, InterfaceDetails> {
    let mut map = BTreeMap::new();
    map.insert(
        "e0".to_string(),
        InterfaceDetails {
            ip_address: addr.to_string(),
            ..Default::default()
        },
    );
    map
}

#[test]
fn s1_two_hosts_one_interface_no_segment() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));
    a.add_or_update(
        "B", "b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[], true, "",
    );

    let nodes = a.get_nodes();
    assert_eq!(nodes.len(), 2);
    let edges = a.get_edges();
    assert!(edges["A"]["B"][0].direct);
    assert!(a.get_network_segments().is_empty());
}

#[test]
fn s2_three_hosts_with_neighbor_relay_yields_one_segment() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));

    // A receives directly from B and from C.
    a.add_or_update(
        "B", "b", "e0", "fe80::b%e0", "e0", "", "", "", 0, &[], true, "",
    );
    a.add_or_update(
        "C", "c", "e0", "fe80::c%e0", "e0", "", "", "", 0, &[], true, "",
    );

    // B's announcement also carries a neighbor entry for C (relayed).
    a.add_or_update_indirect(
        "B", "C", "c", "e0", "fe80::b%e0", &[], "", "", "", 0, "e0",
        "fe80::c%e0", &[], "", "", "", 0,
    );
    // C's announcement carries a neighbor entry for B.
    a.add_or_update_indirect(
        "C", "B", "b", "e0", "fe80::c%e0", &[], "", "", "", 0, "e0",
        "fe80::b%e0", &[], "", "", "", 0,
    );

    let segments = a.get_network_segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].interface, "e0");
    let mut members = segments[0].connected_nodes.clone();
    members.sort();
    assert_eq!(members, vec!["A", "B", "C"]);
}

#[test]
fn s3_mesh_plus_point_to_point_rdma_link() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));

    for peer in ["B", "C", "D"] {
        a.add_or_update(
            peer,
            peer,
            "e0",
            &format!("fe80::{}%e0", peer.to_lowercase()),
            "e0",
            "",
            "",
            "",
            0,
            &[],
            true,
            "",
        );
    }
    // Full mesh among B, C, D relayed through each other.
    for (src, dst) in [("B", "C"), ("B", "D"), ("C", "B"), ("C", "D"), ("D", "B"), ("D", "C")] {
        a.add_or_update_indirect(
            src,
            dst,
            dst,
            "e0",
            &format!("fe80::{}%e0", src.to_lowercase()),
            &[],
            "",
            "",
            "",
            0,
            "e0",
            &format!("fe80::{}%e0", dst.to_lowercase()),
            &[],
            "",
            "",
            "",
            0,
        );
    }

    // A point-to-point RDMA link between B and D on p0, no shared prefix.
    a.add_or_update_indirect(
        "B", "D", "d", "p0", "fe80::b%p0", &[], "mlx5_0", "", "", 100_000, "p0",
        "fe80::d%p0", &[], "mlx5_1", "", "", 100_000,
    );

    let segments = a.get_network_segments();
    let e0_segment = segments.iter().find(|s| s.interface == "e0").unwrap();
    let mut members = e0_segment.connected_nodes.clone();
    members.sort();
    assert_eq!(members, vec!["A", "B", "C", "D"]);

    assert!(!segments.iter().any(|s| s.interface == "p0"));
}

#[test]
fn s4_two_node_shared_prefix_segment_merges_interface_names() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));
    // Two peers B, C are not directly connected to A on br10/vlan10; A
    // only learns about them as relayed neighbors of an observer D.
    a.add_or_update(
        "D", "d", "e0", "fe80::d%e0", "e0", "", "", "", 0, &[], true, "",
    );
    a.add_or_update_indirect(
        "B",
        "C",
        "c",
        "br10",
        "fe80::b%br10",
        &["10.0.3.0/24".to_string()],
        "",
        "",
        "",
        0,
        "vlan10",
        "fe80::c%vlan10",
        &["10.0.3.0/24".to_string()],
        "",
        "",
        "",
        0,
    );

    let segments = a.get_network_segments();
    let segment = segments
        .iter()
        .find(|s| s.connected_nodes.contains(&"B".to_string()))
        .expect("expected a segment containing B");
    assert_eq!(segment.network_prefix, "10.0.3.0/24");
    assert_eq!(segment.interface, "br10+vlan10");
}

#[test]
fn s5_relay_expiry_removes_indirect_edge_but_keeps_independently_seen_node() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));
    a.add_or_update(
        "R", "r", "e0", "fe80::r%e0", "e0", "", "", "", 0, &[], true, "",
    );
    a.add_or_update_indirect(
        "R", "N", "n", "e0", "fe80::r%e0", &[], "", "", "", 0, "e1",
        "fe80::n%e1", &[], "", "", "", 0,
    );
    // N also has independent direct evidence.
    a.add_or_update(
        "N", "n", "e1", "fe80::n%e1", "e0", "", "", "", 0, &[], true, "",
    );

    a.age_node("R", Duration::from_secs(1000));
    let removed = a.remove_expired(Duration::from_secs(1));
    assert_eq!(removed, 1);

    let nodes = a.get_nodes();
    assert!(!nodes.contains_key("R"));
    assert!(nodes.contains_key("N"));

    let edges = a.get_edges();
    assert!(!edges.contains_key("R"));
    assert!(edges["A"]["N"].iter().all(|e| e.learned_from != "R"));
}

#[test]
fn s7_local_perspective_segment_counts_each_members_prefix_once() {
    let mut interfaces = BTreeMap::new();
    interfaces.insert(
        "e0".to_string(),
        InterfaceDetails {
            ip_address: "fe80::a%e0".to_string(),
            global_prefixes: vec!["192.168.1.0/24".to_string()],
            ..Default::default()
        },
    );
    let a = Graph::new();
    a.set_local_node("A", "a", interfaces);

    // A's own prefix is unique; two of three remote members share a CIDR.
    a.add_or_update(
        "B", "b", "e0", "fe80::b%e0", "e0", "", "", "", 0,
        &["10.0.5.0/24".to_string()], true, "",
    );
    a.add_or_update(
        "C", "c", "e0", "fe80::c%e0", "e0", "", "", "", 0,
        &["10.0.5.0/24".to_string()], true, "",
    );
    a.add_or_update(
        "D", "d", "e0", "fe80::d%e0", "e0", "", "", "", 0,
        &["172.16.0.0/24".to_string()], true, "",
    );

    let segments = a.get_network_segments();
    assert_eq!(segments.len(), 1);
    // The majority CIDR among the three members' own prefixes wins; A's
    // own prefix must not be weighted by its remote-member count.
    assert_eq!(segments[0].network_prefix, "10.0.5.0/24");
}

#[test]
fn s6_second_export_tick_with_no_mutation_is_a_no_op() {
    let a = Graph::new();
    a.set_local_node("A", "a", iface("fe80::a%e0"));
    assert!(a.has_changes());
    a.clear_changes();
    assert!(!a.has_changes());

    // Simulate a tick with no intervening mutation: has_changes stays
    // false and nothing needs to be written again.
    assert!(!a.has_changes());
}
