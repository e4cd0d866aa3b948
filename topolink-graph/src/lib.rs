//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The topology graph (§4.4) and segment detector (§4.5): the concurrent
//! store of nodes and multi-edges, and the stateless function that infers
//! shared L2 segments from a graph snapshot.

pub mod graph;
pub mod metrics;
pub mod segment;
pub mod types;

pub use graph::Graph;
pub use metrics::{Metrics, MetricsSnapshot};
pub use types::{Edge, InterfaceDetails, NetworkSegment, Node};
