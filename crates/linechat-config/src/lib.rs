//! Connection parameters for linechat endpoints.
//!
//! A [`ConfigSource`] supplies raw `host` / `port` values (a TOML file section,
//! command-line overrides, or an in-memory map). A [`ConfigResolver`] validates
//! them into an immutable [`ConnectionConfig`] the first time it is asked and
//! hands out the same value for every later call.

pub mod config;
pub mod error;
pub mod resolver;
pub mod source;

pub use config::{ConnectionConfig, PortValue, RawConnection};
pub use error::{ConfigError, Result};
pub use resolver::ConfigResolver;
pub use source::{
    ConfigSource, MemorySource, OverrideSource, TomlFileSource, DEFAULT_CONFIG_FILE,
    DEFAULT_SECTION,
};
