//! Error types for the wire protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The message body does not have the shape its profile requires.
    #[error("invalid message body: {message}")]
    InvalidBody {
        /// Description of the problem.
        message: String,
    },
}

impl ProtocolError {
    /// Creates an invalid-body error.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: message.into(),
        }
    }

    /// Returns the protocol-level status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::InvalidBody { .. } => crate::status::BAD_REQUEST,
        }
    }
}
