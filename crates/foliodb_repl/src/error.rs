//! Error types for the replication core.

use thiserror::Error;

/// Result type for replication operations.
pub type ReplResult<T> = Result<T, ReplError>;

/// Errors that can occur while negotiating changes with a peer.
#[derive(Debug, Error)]
pub enum ReplError {
    /// The peer sent a request the protocol forbids.
    #[error("protocol error ({code}): {message}")]
    Protocol {
        /// Protocol status code.
        code: u16,
        /// Description of the problem.
        message: String,
    },

    /// The storage layer failed while answering an ancestry query or
    /// persisting bookkeeping.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },
}

impl ReplError {
    /// Creates a protocol error.
    pub fn protocol(code: u16, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

impl From<foliodb_protocol::ProtocolError> for ReplError {
    fn from(err: foliodb_protocol::ProtocolError) -> Self {
        Self::Protocol {
            code: err.status_code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ReplError::protocol(409, "proposeChanges required");
        assert_eq!(err.to_string(), "protocol error (409): proposeChanges required");

        let err = ReplError::storage("disk gone");
        assert_eq!(err.to_string(), "storage error: disk gone");
    }

    #[test]
    fn protocol_error_conversion() {
        let err: ReplError = foliodb_protocol::ProtocolError::invalid_body("nope").into();
        assert!(matches!(err, ReplError::Protocol { code: 400, .. }));
    }
}
