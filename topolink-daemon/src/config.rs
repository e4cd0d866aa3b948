//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::error::ConfigError;

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub send_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub node_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub export_interval: Duration,
    pub multicast_address: Ipv6Addr,
    pub multicast_port: u16,
    pub output_file: PathBuf,
    pub http_address: String,
    pub include_neighbors: bool,
    pub show_segments: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            send_interval: Duration::from_secs(30),
            node_timeout: Duration::from_secs(120),
            export_interval: Duration::from_secs(60),
            multicast_address: "ff02::4c4c:6469".parse().unwrap(),
            multicast_port: 9999,
            output_file: PathBuf::from("/var/lib/topolink/topology.dot"),
            http_address: ":6469".to_owned(),
            include_neighbors: false,
            show_segments: false,
            log_level: LogLevel::default(),
        }
    }
}

/// The fixed cadence of the expiration ticker (§4.6). Not exposed as a
/// configuration key: the spec only names the export ticker as tunable.
pub const EXPIRATION_INTERVAL: Duration = Duration::from_secs(30);

impl Config {
    /// Loads the configuration document at `config_file`, or the default
    /// configuration when no path is given. An explicitly named file that
    /// is missing, unreadable, or fails to parse is a fatal `ConfigError`;
    /// the spec only auto-falls-back for `output_file`'s directory, not
    /// for the config document itself.
    pub fn load(config_file: Option<&str>) -> Result<Config, ConfigError> {
        let config = match config_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Unreadable(path.to_owned(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::Malformed(path.to_owned(), e))?
            }
            None => Config::default(),
        };
        Ok(config)
    }

    /// Resolves `output_file`, falling back to `./topology.dot` when the
    /// configured directory does not exist or is not writable.
    pub fn resolved_output_file(&self) -> PathBuf {
        let dir = self
            .output_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));

        if dir_is_writable(dir) {
            self.output_file.clone()
        } else {
            PathBuf::from("./topology.dot")
        }
    }

    /// Parses `http_address`, treating a bare `:PORT` form as "any
    /// address" the way Go-style listen addresses do.
    pub fn http_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let candidate = if let Some(port) = self.http_address.strip_prefix(':') {
            format!("[::]:{port}")
        } else {
            self.http_address.clone()
        };
        candidate
            .parse()
            .map_err(|_| ConfigError::InvalidHttpAddress(self.http_address.clone()))
    }
}

fn dir_is_writable(dir: &std::path::Path) -> bool {
    let probe = dir.join(format!(".topolink-write-test-{}", std::process::id()));
    match std::fs::File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.send_interval, Duration::from_secs(30));
        assert_eq!(config.node_timeout, Duration::from_secs(120));
        assert_eq!(config.export_interval, Duration::from_secs(60));
        assert_eq!(config.multicast_port, 9999);
        assert!(!config.include_neighbors);
        assert!(!config.show_segments);
    }

    #[test]
    fn loads_from_toml_document() {
        let toml_doc = r#"
            send_interval = 10
            multicast_port = 12345
            include_neighbors = true
        "#;
        let config: Config = toml::from_str(toml_doc).unwrap();
        assert_eq!(config.send_interval, Duration::from_secs(10));
        assert_eq!(config.multicast_port, 12345);
        assert!(config.include_neighbors);
        // Unspecified keys keep their defaults.
        assert_eq!(config.node_timeout, Duration::from_secs(120));
    }

    #[test]
    fn rejects_unknown_keys() {
        let toml_doc = r#"
            bogus_key = true
        "#;
        let result: Result<Config, _> = toml::from_str(toml_doc);
        assert!(result.is_err());
    }

    #[test]
    fn bare_port_http_address_binds_any_address() {
        let mut config = Config::default();
        config.http_address = ":6469".to_owned();
        let addr = config.http_socket_addr().unwrap();
        assert_eq!(addr.port(), 6469);
    }
}
