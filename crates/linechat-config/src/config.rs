use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Validated connection parameters shared by both endpoints.
///
/// Immutable once built; fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
}

impl ConnectionConfig {
    /// Build a config from already-typed values.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let raw = RawConnection {
            host: Some(host.into()),
            port: Some(PortValue::Number(i64::from(port))),
        };
        raw.validate("inline")
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port, never 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]:{}", self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// A port as written in a source: `port = 5000` or `port = "5000"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    fn parse(&self) -> Result<u16> {
        let number = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                ConfigError::InvalidPort {
                    value: text.clone(),
                }
            })?,
        };

        match u16::try_from(number) {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort {
                value: number.to_string(),
            }),
        }
    }
}

/// Unvalidated `host` / `port` pair as read from a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawConnection {
    pub host: Option<String>,
    pub port: Option<PortValue>,
}

impl RawConnection {
    /// Check required keys and ranges, producing an immutable config.
    pub fn validate(self, section: &str) -> Result<ConnectionConfig> {
        let host = self.host.ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: "host",
        })?;
        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost {
                section: section.to_string(),
            });
        }

        let port = self
            .port
            .ok_or_else(|| ConfigError::MissingKey {
                section: section.to_string(),
                key: "port",
            })?
            .parse()?;

        Ok(ConnectionConfig {
            host: host.to_string(),
            port,
        })
    }
}
