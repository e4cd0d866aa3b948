//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The export scheduler (§4.6) and the DOT/nwdiag/JSON serializers (§6).

pub mod scheduler;
pub mod serialize;

pub use scheduler::{run as run_scheduler, SchedulerConfig};
pub use serialize::Snapshot;
