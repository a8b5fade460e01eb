//! # FolioDB Query
//!
//! Translation of FolioDB's JSON-shaped query language into SQL over the
//! row store.
//!
//! This crate provides:
//! - `QueryNode` for the parsed expression tree
//! - `QueryCompiler` for precedence-driven SQL emission
//! - Property path canonicalization
//! - Full-text-search join planning (`FtsPlan`)
//!
//! This is a pure translation crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod fts;
pub mod node;
mod ops;
pub mod path;

pub use compiler::QueryCompiler;
pub use error::{QueryError, QueryResult};
pub use fts::FtsPlan;
pub use node::QueryNode;
pub use path::{append_paths, property_from_node, write_quoted};
