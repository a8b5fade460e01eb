//! # FolioDB Protocol
//!
//! Replication wire protocol types for FolioDB.
//!
//! This crate provides:
//! - `Profile` and `ChangesRequest` for inbound change advertisements
//! - `ChangeEntry` / `ProposedChangeEntry` batch parsing
//! - `ChangesResponse` and the positional `ResponseBody` emitter
//! - Status codes shared by both replication directions
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
pub mod error;
pub mod message;
pub mod response;
pub mod status;

pub use change::{
    parse_changes_body, parse_propose_changes_body, ChangeEntry, ProposedChangeEntry,
    RemoteSequence,
};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{ChangesRequest, Profile};
pub use response::{decode_response_body, ChangesResponse, ResponseBody, ResponseSlot};
