//! Change-batch entries.
//!
//! A `changes` entry is `[sequence, doc-id, rev-id, deleted?, body-size?]`;
//! a `proposeChanges` entry is `[doc-id, rev-id, parent-rev-id?,
//! body-size?]`. Both arrive as JSON arrays inside the message body.

use std::fmt;

use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};

/// The peer's monotonic cursor value for a change. Opaque to the receiver;
/// it is echoed back when checkpointing, so both numeric and text forms are
/// preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSequence {
    /// Numeric cursor.
    Number(u64),
    /// Text cursor.
    Text(String),
}

impl RemoteSequence {
    /// Reads a sequence from a JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(RemoteSequence::Number),
            Value::String(s) => Some(RemoteSequence::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteSequence::Number(n) => write!(f, "{n}"),
            RemoteSequence::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One entry of a `changes` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    /// The peer's sequence cursor for this change.
    pub sequence: RemoteSequence,
    /// Document ID.
    pub doc_id: String,
    /// Advertised revision ID.
    pub rev_id: String,
    /// The advertised revision is a deletion (tombstone).
    pub deleted: bool,
    /// Expected body size in bytes; 0 when the peer sent no hint.
    pub body_size: u64,
}

impl ChangeEntry {
    /// Parses one `changes` entry from its JSON array form.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let Some(parts) = value.as_array() else {
            return Err(ProtocolError::invalid_body("change entry must be an array"));
        };
        let sequence = parts
            .first()
            .and_then(RemoteSequence::from_value)
            .ok_or_else(|| ProtocolError::invalid_body("change entry has no sequence"))?;
        let doc_id = required_string(parts.get(1), "change entry has no docID")?;
        let rev_id = required_string(parts.get(2), "change entry has no revID")?;
        let deleted = parts.get(3).map_or(false, truthy);
        let body_size = parts.get(4).and_then(Value::as_u64).unwrap_or(0);
        Ok(Self {
            sequence,
            doc_id,
            rev_id,
            deleted,
            body_size,
        })
    }
}

/// One entry of a `proposeChanges` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedChangeEntry {
    /// Document ID.
    pub doc_id: String,
    /// Proposed revision ID.
    pub rev_id: String,
    /// The revision the peer believes is the document's current one, absent
    /// when the peer is creating the document.
    pub parent_rev_id: Option<String>,
    /// Expected body size in bytes; 0 when the peer sent no hint.
    pub body_size: u64,
}

impl ProposedChangeEntry {
    /// Parses one `proposeChanges` entry from its JSON array form. An empty
    /// parent revision is normalized to absent.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let Some(parts) = value.as_array() else {
            return Err(ProtocolError::invalid_body(
                "proposed change entry must be an array",
            ));
        };
        let doc_id = required_string(parts.first(), "proposed change entry has no docID")?;
        let rev_id = required_string(parts.get(1), "proposed change entry has no revID")?;
        let parent_rev_id = parts
            .get(2)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let body_size = parts.get(3).and_then(Value::as_u64).unwrap_or(0);
        Ok(Self {
            doc_id,
            rev_id,
            parent_rev_id,
            body_size,
        })
    }
}

/// Parses a `changes` message body into its entries.
pub fn parse_changes_body(body: &Value) -> ProtocolResult<Vec<ChangeEntry>> {
    let Some(items) = body.as_array() else {
        return Err(ProtocolError::invalid_body("body must be an array"));
    };
    items.iter().map(ChangeEntry::from_value).collect()
}

/// Parses a `proposeChanges` message body into its entries.
pub fn parse_propose_changes_body(body: &Value) -> ProtocolResult<Vec<ProposedChangeEntry>> {
    let Some(items) = body.as_array() else {
        return Err(ProtocolError::invalid_body("body must be an array"));
    };
    items.iter().map(ProposedChangeEntry::from_value).collect()
}

fn required_string(value: Option<&Value>, message: &str) -> ProtocolResult<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::invalid_body(message))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_entry_full_form() {
        let entry = ChangeEntry::from_value(&json!([12, "doc1", "2-abc", 1, 512])).unwrap();
        assert_eq!(entry.sequence, RemoteSequence::Number(12));
        assert_eq!(entry.doc_id, "doc1");
        assert_eq!(entry.rev_id, "2-abc");
        assert!(entry.deleted);
        assert_eq!(entry.body_size, 512);
    }

    #[test]
    fn change_entry_defaults() {
        let entry = ChangeEntry::from_value(&json!(["s-9", "doc1", "1-a"])).unwrap();
        assert_eq!(entry.sequence, RemoteSequence::Text("s-9".into()));
        assert!(!entry.deleted);
        assert_eq!(entry.body_size, 0);
    }

    #[test]
    fn change_entry_rejects_bad_shapes() {
        assert!(ChangeEntry::from_value(&json!("doc1")).is_err());
        assert!(ChangeEntry::from_value(&json!([1])).is_err());
        assert!(ChangeEntry::from_value(&json!([1, "doc1", ""])).is_err());
        assert!(ChangeEntry::from_value(&json!([[], "doc1", "1-a"])).is_err());
    }

    #[test]
    fn proposed_entry_parent_forms() {
        let with_parent =
            ProposedChangeEntry::from_value(&json!(["doc1", "2-b", "1-a", 99])).unwrap();
        assert_eq!(with_parent.parent_rev_id.as_deref(), Some("1-a"));
        assert_eq!(with_parent.body_size, 99);

        let no_parent = ProposedChangeEntry::from_value(&json!(["doc1", "1-a"])).unwrap();
        assert_eq!(no_parent.parent_rev_id, None);

        let empty_parent = ProposedChangeEntry::from_value(&json!(["doc1", "1-a", ""])).unwrap();
        assert_eq!(empty_parent.parent_rev_id, None);
    }

    #[test]
    fn proposed_entry_rejects_missing_ids() {
        assert!(ProposedChangeEntry::from_value(&json!(["", "1-a"])).is_err());
        assert!(ProposedChangeEntry::from_value(&json!(["doc1"])).is_err());
    }

    #[test]
    fn batch_parsing() {
        let body = json!([[1, "a", "1-a"], [2, "b", "1-b"]]);
        let entries = parse_changes_body(&body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].doc_id, "b");

        assert!(parse_changes_body(&json!({"not": "an array"})).is_err());
        assert!(parse_changes_body(&json!([[1, "a", "1-a"], "bogus"])).is_err());
    }

    #[test]
    fn remote_sequence_display() {
        assert_eq!(RemoteSequence::Number(42).to_string(), "42");
        assert_eq!(RemoteSequence::Text("s-1".into()).to_string(), "s-1");
    }
}
