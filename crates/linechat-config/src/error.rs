use std::path::PathBuf;

/// Errors that can occur while resolving connection parameters.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML, or the section has the wrong shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The named section does not exist.
    #[error("missing section [{section}]")]
    MissingSection { section: String },

    /// A required key is absent from the section.
    #[error("missing key '{key}' in section [{section}]")]
    MissingKey { section: String, key: &'static str },

    /// The host value is empty.
    #[error("empty host in section [{section}]")]
    EmptyHost { section: String },

    /// The port is not an integer in 1..=65535.
    #[error("invalid port '{value}' (expected an integer in 1..=65535)")]
    InvalidPort { value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
