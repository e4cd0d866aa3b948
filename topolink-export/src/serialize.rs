//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The three serializers named in §6: DOT, nwdiag, and JSON. Each sorts
//! at every map iteration so output is deterministic across runs with
//! identical graph content.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use topolink_graph::{Edge, NetworkSegment, Node};

/// A graph snapshot ready for serialization: `HashMap`s handed back by
/// the graph's accessors, sorted into `BTreeMap`s so iteration order is
/// stable.
pub struct Snapshot {
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, BTreeMap<String, Vec<Edge>>>,
    pub segments: Option<Vec<NetworkSegment>>,
}

impl Snapshot {
    pub fn new(
        nodes: HashMap<String, Node>,
        edges: HashMap<String, HashMap<String, Vec<Edge>>>,
        segments: Option<Vec<NetworkSegment>>,
    ) -> Snapshot {
        let nodes = nodes.into_iter().collect();
        let edges = edges
            .into_iter()
            .map(|(src, dsts)| {
                let mut dsts: BTreeMap<String, Vec<Edge>> = dsts.into_iter().collect();
                for edges in dsts.values_mut() {
                    edges.sort_by(|a, b| {
                        (&a.local_interface, &a.remote_interface)
                            .cmp(&(&b.local_interface, &b.remote_interface))
                    });
                }
                (src, dsts)
            })
            .collect();
        Snapshot {
            nodes,
            edges,
            segments,
        }
    }
}

#[derive(Serialize)]
struct JsonSnapshot<'a> {
    nodes: &'a BTreeMap<String, Node>,
    edges: &'a BTreeMap<String, BTreeMap<String, Vec<Edge>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segments: &'a Option<Vec<NetworkSegment>>,
}

/// Serializes the snapshot as the JSON shape of §6.
pub fn to_json(snapshot: &Snapshot) -> Vec<u8> {
    let doc = JsonSnapshot {
        nodes: &snapshot.nodes,
        edges: &snapshot.edges,
        segments: &snapshot.segments,
    };
    serde_json::to_vec_pretty(&doc).expect("graph snapshot serialization is infallible")
}

/// Renders the snapshot as a Graphviz DOT document.
pub fn to_dot(snapshot: &Snapshot) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("graph topology {\n");

    for (id, node) in &snapshot.nodes {
        out.push_str(&format!(
            "  \"{id}\" [label=\"{}\"];\n",
            escape(&node.hostname)
        ));
    }

    for (src, dsts) in &snapshot.edges {
        for (dst, edges) in dsts {
            for edge in edges {
                let style = if edge.direct { "solid" } else { "dashed" };
                out.push_str(&format!(
                    "  \"{src}\" -- \"{dst}\" [label=\"{}-{}\", style={style}];\n",
                    escape(&edge.local_interface),
                    escape(&edge.remote_interface),
                ));
            }
        }
    }

    if let Some(segments) = &snapshot.segments {
        for segment in segments {
            out.push_str(&format!("  subgraph cluster_{} {{\n", segment.id));
            out.push_str(&format!(
                "    label=\"{} ({})\";\n",
                segment.id,
                escape(&segment.interface)
            ));
            for member in &segment.connected_nodes {
                out.push_str(&format!("    \"{member}\";\n"));
            }
            out.push_str("  }\n");
        }
    }

    out.push_str("}\n");
    out.into_bytes()
}

/// Renders the snapshot as an nwdiag document: one `network` block per
/// segment interface, plus a catch-all block for unsegmented nodes.
pub fn to_nwdiag(snapshot: &Snapshot) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("nwdiag {\n");

    match &snapshot.segments {
        Some(segments) if !segments.is_empty() => {
            for segment in segments {
                out.push_str(&format!("  network {} {{\n", sanitize(&segment.id)));
                if !segment.network_prefix.is_empty() {
                    out.push_str(&format!(
                        "    address = \"{}\"\n",
                        escape(&segment.network_prefix)
                    ));
                }
                for member in &segment.connected_nodes {
                    out.push_str(&format!("    \"{member}\";\n"));
                }
                out.push_str("  }\n");
            }
        }
        _ => {
            out.push_str("  network all {\n");
            for id in snapshot.nodes.keys() {
                out.push_str(&format!("    \"{id}\";\n"));
            }
            out.push_str("  }\n");
        }
    }

    out.push_str("}\n");
    out.into_bytes()
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_snapshot() -> Snapshot {
        let mut nodes = HashMap::new();
        nodes.insert(
            "A".to_string(),
            Node {
                machine_id: "A".to_string(),
                hostname: "node-a".to_string(),
                is_local: true,
                ..Default::default()
            },
        );
        nodes.insert(
            "B".to_string(),
            Node {
                machine_id: "B".to_string(),
                hostname: "node-b".to_string(),
                ..Default::default()
            },
        );

        let mut edges = HashMap::new();
        let mut dsts = HashMap::new();
        dsts.insert(
            "B".to_string(),
            vec![Edge {
                local_interface: "e0".to_string(),
                remote_interface: "e0".to_string(),
                direct: true,
                ..Default::default()
            }],
        );
        edges.insert("A".to_string(), dsts);

        Snapshot::new(nodes, edges, None)
    }

    #[test]
    fn json_output_is_deterministic_and_sorted() {
        let snapshot = sample_snapshot();
        let first = to_json(&snapshot);
        let second = to_json(&snapshot);
        assert_eq!(first, second);
        let text = String::from_utf8(first).unwrap();
        assert!(text.find("\"A\"").unwrap() < text.find("\"B\"").unwrap());
    }

    #[test]
    fn dot_output_contains_every_node_and_edge() {
        let snapshot = sample_snapshot();
        let text = String::from_utf8(to_dot(&snapshot)).unwrap();
        assert!(text.contains("\"A\""));
        assert!(text.contains("\"A\" -- \"B\""));
    }

    #[test]
    fn json_omits_segments_when_disabled() {
        let snapshot = sample_snapshot();
        let text = String::from_utf8(to_json(&snapshot)).unwrap();
        assert!(!text.contains("segments"));
    }
}
