use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;
use tracing::debug;

use crate::config::{PortValue, RawConnection};
use crate::error::{ConfigError, Result};

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "local_config.toml";

/// Section holding the connection keys.
pub const DEFAULT_SECTION: &str = "LOCAL_SERVER";

/// Supplies raw connection parameters.
///
/// Implementations may read from disk on every call; memoization is the
/// resolver's job, not the source's.
pub trait ConfigSource: Send + Sync {
    /// Read the current `host` / `port` values.
    fn load(&self) -> Result<RawConnection>;

    /// Section name used in error messages.
    fn section(&self) -> &str;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// A named section of a TOML file:
///
/// ```toml
/// [LOCAL_SERVER]
/// host = "127.0.0.1"
/// port = 5000
/// ```
#[derive(Debug, Clone)]
pub struct TomlFileSource {
    path: PathBuf,
    section: String,
}

impl TomlFileSource {
    /// Read `section` from the file at `path`.
    pub fn new(path: impl AsRef<Path>, section: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            section: section.into(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for TomlFileSource {
    fn load(&self) -> Result<RawConnection> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        let mut table: toml::Table =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let section = table
            .remove(&self.section)
            .ok_or_else(|| ConfigError::MissingSection {
                section: self.section.clone(),
            })?;
        debug!(path = ?self.path, section = %self.section, "read connection section");

        RawConnection::deserialize(section).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn section(&self) -> &str {
        &self.section
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.path.display(), self.section)
    }
}

/// Explicit `host` / `port` values layered over an optional base source.
///
/// The base is consulted only when an override is missing.
pub struct OverrideSource {
    base: Option<Box<dyn ConfigSource>>,
    host: Option<String>,
    port: Option<u16>,
}

impl OverrideSource {
    pub fn new(base: Option<Box<dyn ConfigSource>>) -> Self {
        Self {
            base,
            host: None,
            port: None,
        }
    }

    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }
}

impl ConfigSource for OverrideSource {
    fn load(&self) -> Result<RawConnection> {
        let mut raw = match (&self.host, &self.port, &self.base) {
            (Some(_), Some(_), _) | (_, _, None) => RawConnection::default(),
            (_, _, Some(base)) => base.load()?,
        };

        if let Some(host) = &self.host {
            raw.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            raw.port = Some(PortValue::Number(i64::from(port)));
        }
        Ok(raw)
    }

    fn section(&self) -> &str {
        self.base
            .as_ref()
            .map(|base| base.section())
            .unwrap_or("command line")
    }

    fn describe(&self) -> String {
        match &self.base {
            Some(base) if self.host.is_none() || self.port.is_none() => {
                format!("command line over {}", base.describe())
            }
            _ => "command line".to_string(),
        }
    }
}

/// In-memory key/value source; values can be changed after construction.
#[derive(Debug, Default)]
pub struct MemorySource {
    section: String,
    values: Mutex<RawConnection>,
}

impl MemorySource {
    pub fn new(section: impl Into<String>, raw: RawConnection) -> Self {
        Self {
            section: section.into(),
            values: Mutex::new(raw),
        }
    }

    /// Replace the stored values.
    pub fn set(&self, raw: RawConnection) {
        *self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = raw;
    }
}

impl ConfigSource for MemorySource {
    fn load(&self) -> Result<RawConnection> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn section(&self) -> &str {
        &self.section
    }

    fn describe(&self) -> String {
        format!("memory [{}]", self.section)
    }
}
