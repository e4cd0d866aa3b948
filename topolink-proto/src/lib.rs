//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The announcement wire format: a self-describing JSON record broadcast
//! over the multicast group, tolerant of unknown fields so mixed-version
//! fleets interoperate.

pub mod error;

use serde::{Deserialize, Serialize};

pub use crate::error::{Error, MalformedPacket};

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// One neighbor entry inside an [`Announcement`]: a complete edge record
/// from the sender's point of view, with the sender's own fields mirrored
/// as `local_*` and the neighbor's fields as `remote_*`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct NeighborEntry {
    pub machine_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    pub local_interface: String,
    pub local_address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_rdma_device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_node_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_sys_image_guid: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub local_speed_mbps: u32,

    pub remote_interface: String,
    pub remote_address: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_rdma_device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_node_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote_sys_image_guid: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub remote_speed_mbps: u32,
}

/// A single multicast datagram emitted by a node on one of its interfaces.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Announcement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    pub machine_id: String,
    pub timestamp: i64,
    pub interface: String,
    pub source_ip: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rdma_device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sys_image_guid: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub speed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<NeighborEntry>,
}

/// Intermediate shape used only to distinguish a missing or empty
/// `machine_id` from other decode failures: every other required field
/// falls through to serde's own missing-field error (reported as
/// [`MalformedPacket::InvalidJson`]), but `machine_id` identifies the node
/// and a datagram without one must produce
/// [`MalformedPacket::MissingMachineId`] specifically.
#[derive(Deserialize)]
struct Raw {
    #[serde(flatten)]
    value: serde_json::Value,
}

impl Announcement {
    /// Decodes a JSON-encoded announcement, tolerating unknown fields.
    pub fn decode(bytes: &[u8]) -> Result<Announcement, Error> {
        let raw: Raw = serde_json::from_slice(bytes)
            .map_err(MalformedPacket::InvalidJson)?;
        let has_machine_id = raw
            .value
            .get("machine_id")
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_machine_id {
            return Err(MalformedPacket::MissingMachineId.into());
        }
        let announcement: Announcement = serde_json::from_value(raw.value)
            .map_err(MalformedPacket::InvalidJson)?;
        Ok(announcement)
    }

    /// Serializes this announcement as a JSON byte string, omitting empty
    /// optional fields.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Announcement serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Announcement {
        Announcement {
            hostname: "node-a".to_string(),
            machine_id: "A".to_string(),
            timestamp: 1_700_000_000,
            interface: "e0".to_string(),
            source_ip: "fe80::a%e0".to_string(),
            global_prefixes: vec!["10.0.0.0/24".to_string()],
            rdma_device: "mlx5_0".to_string(),
            node_guid: "abc".to_string(),
            sys_image_guid: "def".to_string(),
            speed: 100_000,
            neighbors: vec![NeighborEntry {
                machine_id: "B".to_string(),
                hostname: "node-b".to_string(),
                local_interface: "e0".to_string(),
                local_address: "fe80::a%e0".to_string(),
                local_prefixes: vec![],
                local_rdma_device: String::new(),
                local_node_guid: String::new(),
                local_sys_image_guid: String::new(),
                local_speed_mbps: 0,
                remote_interface: "e0".to_string(),
                remote_address: "fe80::b%e0".to_string(),
                remote_prefixes: vec![],
                remote_rdma_device: String::new(),
                remote_node_guid: String::new(),
                remote_sys_image_guid: String::new(),
                remote_speed_mbps: 0,
            }],
        }
    }

    #[test]
    fn round_trips_a_well_formed_announcement() {
        let original = sample();
        let decoded = Announcement::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn omits_empty_optional_fields_on_encode() {
        let mut announcement = sample();
        announcement.rdma_device.clear();
        announcement.global_prefixes.clear();
        announcement.speed = 0;
        let encoded = String::from_utf8(announcement.encode()).unwrap();
        assert!(!encoded.contains("rdma_device"));
        assert!(!encoded.contains("global_prefixes"));
        assert!(!encoded.contains("\"speed\""));
    }

    #[test]
    fn ignores_unknown_fields_on_decode() {
        let json = br#"{
            "machine_id": "A",
            "interface": "e0",
            "source_ip": "fe80::a%e0",
            "timestamp": 1,
            "future_field": {"nested": true}
        }"#;
        let announcement = Announcement::decode(json).unwrap();
        assert_eq!(announcement.machine_id, "A");
    }

    #[test]
    fn rejects_missing_machine_id() {
        let json = br#"{"interface":"e0","source_ip":"fe80::a","timestamp":1}"#;
        let error = Announcement::decode(json).unwrap_err();
        assert!(matches!(
            error,
            Error::MalformedPacket(MalformedPacket::MissingMachineId)
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        let error = Announcement::decode(b"not json").unwrap_err();
        assert!(matches!(
            error,
            Error::MalformedPacket(MalformedPacket::InvalidJson(_))
        ));
    }
}
