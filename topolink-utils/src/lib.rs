//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Primitives shared by every `topolink-*` crate: address-family and
//! prefix helpers, cancellation-safe task wrappers, and multicast socket
//! option extension traits.

pub mod ip;
pub mod socket;
pub mod task;

use tokio::sync::mpsc;

/// Channel sender alias used throughout the daemon's inter-task plumbing.
pub type Sender<T> = mpsc::Sender<T>;
/// Channel receiver alias used throughout the daemon's inter-task plumbing.
pub type Receiver<T> = mpsc::Receiver<T>;
