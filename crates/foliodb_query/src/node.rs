//! Dynamic query expression node.

use crate::error::{QueryError, QueryResult};

/// A node of a query expression tree.
///
/// This is the in-memory form of the JSON-shaped query language. A node is
/// either a scalar, an ordered sequence (an operator application), or a
/// mapping (the operand object of a `SELECT`). Binary blobs can appear when
/// the expression arrives in a binary encoding; the compiler rejects them.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Double(f64),
    /// Text string.
    Str(String),
    /// Binary blob (not expressible in queries).
    Blob(Vec<u8>),
    /// Ordered sequence of nodes.
    Seq(Vec<QueryNode>),
    /// Mapping from string keys to nodes.
    Map(Vec<(String, QueryNode)>),
}

impl QueryNode {
    /// Parses a JSON string into a node tree.
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| QueryError::invalid_query(format!("malformed JSON: {e}")))?;
        Ok(Self::from(value))
    }

    /// Returns the string value, if this node is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryNode::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the sequence elements, if this node is a sequence.
    pub fn as_seq(&self) -> Option<&[QueryNode]> {
        match self {
            QueryNode::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the value for `key`, if this node is a mapping that has it.
    pub fn get(&self, key: &str) -> Option<&QueryNode> {
        match self {
            QueryNode::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Returns true if this node is a mapping.
    pub fn is_map(&self) -> bool {
        matches!(self, QueryNode::Map(_))
    }

    /// Serializes the node as compact JSON.
    ///
    /// Used for derived index names; blobs do not occur in that position and
    /// serialize as `null`.
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    fn write_json(&self, out: &mut String) {
        match self {
            QueryNode::Null | QueryNode::Blob(_) => out.push_str("null"),
            QueryNode::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            QueryNode::Int(i) => out.push_str(&i.to_string()),
            QueryNode::Double(f) => out.push_str(&f.to_string()),
            QueryNode::Str(s) => write_json_string(out, s),
            QueryNode::Seq(items) => {
                out.push('[');
                for (n, item) in items.iter().enumerate() {
                    if n > 0 {
                        out.push(',');
                    }
                    item.write_json(out);
                }
                out.push(']');
            }
            QueryNode::Map(pairs) => {
                out.push('{');
                for (n, (key, value)) in pairs.iter().enumerate() {
                    if n > 0 {
                        out.push(',');
                    }
                    write_json_string(out, key);
                    out.push(':');
                    value.write_json(out);
                }
                out.push('}');
            }
        }
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

impl From<serde_json::Value> for QueryNode {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => QueryNode::Null,
            serde_json::Value::Bool(b) => QueryNode::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    QueryNode::Int(i)
                } else {
                    QueryNode::Double(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => QueryNode::Str(s),
            serde_json::Value::Array(items) => {
                QueryNode::Seq(items.into_iter().map(QueryNode::from).collect())
            }
            serde_json::Value::Object(pairs) => QueryNode::Map(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k, QueryNode::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for QueryNode {
    fn from(s: &str) -> Self {
        QueryNode::Str(s.to_string())
    }
}

impl From<i64> for QueryNode {
    fn from(i: i64) -> Self {
        QueryNode::Int(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_scalars() {
        assert_eq!(QueryNode::from_json_str("null").unwrap(), QueryNode::Null);
        assert_eq!(
            QueryNode::from_json_str("true").unwrap(),
            QueryNode::Bool(true)
        );
        assert_eq!(QueryNode::from_json_str("42").unwrap(), QueryNode::Int(42));
        assert_eq!(
            QueryNode::from_json_str("2.5").unwrap(),
            QueryNode::Double(2.5)
        );
        assert_eq!(
            QueryNode::from_json_str("\"hi\"").unwrap(),
            QueryNode::Str("hi".into())
        );
    }

    #[test]
    fn from_json_nested() {
        let node = QueryNode::from_json_str(r#"["=", [".", "name"], "Bob"]"#).unwrap();
        let items = node.as_seq().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_str(), Some("="));
    }

    #[test]
    fn map_get() {
        let node = QueryNode::from_json_str(r#"{"WHERE": 1, "WHAT": 2}"#).unwrap();
        assert_eq!(node.get("WHERE"), Some(&QueryNode::Int(1)));
        assert_eq!(node.get("ORDER BY"), None);
        assert!(node.is_map());
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(QueryNode::from_json_str("[1,").is_err());
    }

    #[test]
    fn json_roundtrip() {
        let node = QueryNode::from_json_str(r#"[[".","a"],["$","p"]]"#).unwrap();
        assert_eq!(node.to_json(), r#"[[".","a"],["$","p"]]"#);
    }

    #[test]
    fn json_string_escaping() {
        let node = QueryNode::Str("a\"b\\c".into());
        assert_eq!(node.to_json(), r#""a\"b\\c""#);
    }
}
