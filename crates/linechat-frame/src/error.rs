/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An outbound message contains the delimiter byte.
    #[error("message contains an embedded newline at byte {position}")]
    EmbeddedNewline { position: usize },

    /// No delimiter was seen within the configured maximum line length.
    #[error("frame too long ({size} bytes without delimiter, max {max})")]
    FrameTooLong { size: usize, max: usize },

    /// A complete frame was received but is not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended after a partial frame.
    #[error("connection closed with {pending} bytes of an incomplete frame")]
    IncompleteFrame { pending: usize },

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error is a read or write timeout rather than a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
