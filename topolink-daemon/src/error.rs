//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::error;

/// Fatal at startup (§7). Never retried — the process exits non-zero
/// after logging.
#[derive(Debug)]
pub enum ConfigError {
    Unreadable(String, std::io::Error),
    Malformed(String, toml::de::Error),
    InvalidHttpAddress(String),
}

impl ConfigError {
    pub fn log(&self) {
        match self {
            ConfigError::Unreadable(path, source) => {
                error!(path, error = %source, "{}", self);
            }
            ConfigError::Malformed(path, source) => {
                error!(path, error = %source, "{}", self);
            }
            ConfigError::InvalidHttpAddress(address) => {
                error!(address, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Unreadable(path, _) => {
                write!(f, "failed to read configuration file {path}")
            }
            ConfigError::Malformed(path, _) => {
                write!(f, "failed to parse configuration file {path}")
            }
            ConfigError::InvalidHttpAddress(address) => {
                write!(f, "invalid http_address {address}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Unreadable(_, source) => Some(source),
            ConfigError::Malformed(_, source) => Some(source),
            ConfigError::InvalidHttpAddress(_) => None,
        }
    }
}
