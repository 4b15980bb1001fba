//! Custom error types for the chamber instruments.
//!
//! `ChamberError` is the single error type returned by both instrument sessions. It
//! separates the failures a caller can recover from (a short write) from the ones that
//! leave a session unusable (transport I/O failure, a device that answers with the wrong
//! bytes, an unparseable capture header).
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: connect/open failure or any transport I/O error. Fatal.
//! - **`CommandSend`**: the transport accepted fewer bytes than the command holds, even
//!   after the configured retries. The issuing operation reports it; the caller decides
//!   whether to abort the sequence.
//! - **`ProtocolMismatch`**: the device echo or acknowledgement differs from what was sent.
//! - **`MalformedFrame`**: a reply or capture header that cannot be decoded.
//! - **`Timeout`**: a poll or acknowledgement wait exceeded its configured limit.
//! - **`NotConnected`**: an operation was attempted on a closed session.
//! - **`Config`** / **`ConfigValidation`**: configuration load and semantic errors.
//!
//! Out-of-range parameters are never an error: they are clamped to the nearest bound.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the chamber error type.
pub type ChamberResult<T> = std::result::Result<T, ChamberError>;

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum ChamberError {
    #[error("Connection error ({context}): {source}")]
    Connection {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Short write for '{command}': {sent} of {expected} bytes accepted")]
    CommandSend {
        command: String,
        sent: usize,
        expected: usize,
    },

    #[error("Protocol mismatch: expected {expected:?}, received {received:?}")]
    ProtocolMismatch { expected: Vec<u8>, received: Vec<u8> },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),
}

impl ChamberError {
    /// Wrap a transport error with a short description of what was being attempted.
    pub fn connection(context: impl Into<String>, source: std::io::Error) -> Self {
        ChamberError::Connection {
            context: context.into(),
            source,
        }
    }

    /// Whether the session that produced this error should be considered unusable.
    ///
    /// Only a short write leaves the session in a known state; everything else means the
    /// device and the client may disagree about where the conversation is.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ChamberError::CommandSend { .. } | ChamberError::InvalidArgument(_)
        )
    }
}
