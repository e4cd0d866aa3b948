//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The read-only HTTP API (§4.7): health, and the graph in each of its
//! three renderings.

pub mod server;

pub use server::{router, run, ServerConfig};
