//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

/// Errors arising from decoding an announcement payload.
#[derive(Debug)]
pub enum Error {
    MalformedPacket(MalformedPacket),
}

/// Reasons a datagram failed to decode into an [`Announcement`](crate::Announcement).
#[derive(Debug)]
pub enum MalformedPacket {
    InvalidJson(serde_json::Error),
    MissingMachineId,
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::MalformedPacket(error) => error.log(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedPacket(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedPacket(error) => Some(error),
        }
    }
}

impl From<MalformedPacket> for Error {
    fn from(error: MalformedPacket) -> Error {
        Error::MalformedPacket(error)
    }
}

impl MalformedPacket {
    pub fn log(&self) {
        match self {
            MalformedPacket::InvalidJson(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
            MalformedPacket::MissingMachineId => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for MalformedPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedPacket::InvalidJson(..) => {
                write!(f, "malformed announcement: invalid JSON")
            }
            MalformedPacket::MissingMachineId => {
                write!(f, "malformed announcement: missing machine_id")
            }
        }
    }
}

impl std::error::Error for MalformedPacket {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MalformedPacket::InvalidJson(error) => Some(error),
            MalformedPacket::MissingMachineId => None,
        }
    }
}

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
