//! Two-party line chat over TCP.
//!
//! One server and one client exchange newline-terminated UTF-8 messages over a
//! single connection, each side reading and writing at the same time.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream with error classification
//! - [`frame`]: Newline-delimited message framing
//! - [`config`]: Connection parameters resolved once from a TOML file or overrides
//! - [`session`]: Server/client connection managers and the duplex loop

/// Re-export transport types.
pub mod transport {
    pub use linechat_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linechat_frame::*;
}

/// Re-export configuration types.
pub mod config {
    pub use linechat_config::*;
}

/// Re-export session types.
pub mod session {
    pub use linechat_session::*;
}
