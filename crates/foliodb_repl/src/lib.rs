//! # FolioDB Replication
//!
//! Change negotiation for FolioDB's pull replication.
//!
//! This crate provides:
//! - `RevFinder` for classifying inbound change advertisements
//! - `AncestryOracle`, the storage seam for revision ancestry
//! - `MessageBus`, the transport seam for replies
//! - `RevFinderDelegate`, the puller seam for demand registration
//! - `WorkerMailbox`, the single-threaded execution context
//!
//! The transport posts inbound messages and revision receipts onto the
//! worker mailbox; everything else happens inside it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod delegate;
pub mod error;
pub mod finder;
pub mod mailbox;
pub mod oracle;

pub use bus::{MessageBus, RecordingBus, Reply};
pub use config::PullConfig;
pub use delegate::{ChangeSequence, RecordingDelegate, RevFinderDelegate};
pub use error::{ReplError, ReplResult};
pub use finder::RevFinder;
pub use mailbox::{MailboxHandle, WorkerMailbox};
pub use oracle::{AncestryAnswer, AncestryOracle, LocalRevision, MemoryAncestryOracle};
