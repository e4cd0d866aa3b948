//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors from the sender/receiver loops. Per §7, all of these are
/// recovered locally (counted and logged); only root socket setup
/// failure is fatal and surfaces through the supervisor channel.
#[derive(Debug)]
pub enum Error {
    JoinFailed { interface: String, source: std::io::Error },
    SendFailed { interface: String, source: std::io::Error },
    SocketSetupFailed(std::io::Error),
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::JoinFailed { interface, source } => {
                warn!(%interface, error = %source, "{}", self);
            }
            Error::SendFailed { interface, source } => {
                warn!(%interface, error = %source, "{}", self);
            }
            Error::SocketSetupFailed(source) => {
                warn!(error = %source, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::JoinFailed { .. } => write!(f, "failed to join multicast group"),
            Error::SendFailed { .. } => write!(f, "failed to send announcement"),
            Error::SocketSetupFailed(..) => write!(f, "failed to set up multicast socket"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::JoinFailed { source, .. } => Some(source),
            Error::SendFailed { source, .. } => Some(source),
            Error::SocketSetupFailed(source) => Some(source),
        }
    }
}
