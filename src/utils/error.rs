use std::io;
use thiserror::Error;

/// Main error type for the JPEG XL container encoder.
///
/// The taxonomy is deliberately small: a precondition violated by the caller
/// (`ApiUsage`), a failure inside an encoding step (`Encode`), and plain I/O
/// failures from writers. Allocation failures surface as `Encode`.
#[derive(Debug, Error)]
pub enum JxlError {
    /// An I/O error occurred while writing framed output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An API precondition was violated before any bytes for the offending
    /// item were produced.
    #[error("API usage error: {0}")]
    ApiUsage(String),
    /// An internal encoding step failed (header serialization, frame
    /// encoding, box compression).
    #[error("Encoding error: {0}")]
    Encode(String),
}

impl JxlError {
    pub(crate) fn api(msg: impl Into<String>) -> Self {
        JxlError::ApiUsage(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        JxlError::Encode(msg.into())
    }
}

/// A specialized `Result` type for container encoding operations.
pub type Result<T> = std::result::Result<T, JxlError>;
