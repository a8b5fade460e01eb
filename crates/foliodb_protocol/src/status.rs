//! Protocol status codes.
//!
//! The codes follow HTTP semantics; `0` in a positional response slot means
//! the advertised revision is accepted.

/// The revision is accepted (requested from the peer).
pub const OK: u16 = 0;

/// The revision is already stored locally.
pub const NOT_MODIFIED: u16 = 304;

/// The request body was malformed.
pub const BAD_REQUEST: u16 = 400;

/// The advertised revision conflicts with the local document.
pub const CONFLICT: u16 = 409;

/// The local lookup failed.
pub const INTERNAL_ERROR: u16 = 500;
