//! Error types for query translation.

use thiserror::Error;

/// Result type for query translation.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while translating a query expression.
///
/// All translation failures are fatal to the current compilation; the
/// compiler produces no partial output.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query expression is malformed or uses an unsupported construct.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },
}

impl QueryError {
    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }
}

/// Logs and returns an invalid-query error from the enclosing function.
macro_rules! fail {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::warn!("invalid query: {message}");
        return Err($crate::error::QueryError::InvalidQuery { message });
    }};
}

pub(crate) use fail;
