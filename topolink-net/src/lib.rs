//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The sender and receiver loops (§4.2, §4.3): multicast socket setup,
//! per-interface join, ancillary receive-interface recovery, and
//! dispatch into the topology graph.

pub mod error;
pub mod receiver;
pub mod sender;

pub use error::Error;
pub use receiver::{run as run_receiver, ReceiverConfig};
pub use sender::{run as run_sender, SenderConfig};
