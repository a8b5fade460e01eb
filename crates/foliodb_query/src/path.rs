//! Canonical property paths.
//!
//! A path is a string of dot-separated identifier components with bracketed
//! integer indices appended directly, e.g. `address.phones[0].number`.

use crate::error::{fail, QueryResult};
use crate::node::QueryNode;

/// Appends a child path to a parent path.
///
/// A leading `$` or `$.` on the child (legacy alias syntax) is stripped.
/// An index component (starting with `[`) concatenates without a separator.
pub fn append_paths(parent: &str, child: &str) -> String {
    let mut child = child;
    if let Some(stripped) = child.strip_prefix('$') {
        child = stripped.strip_prefix('.').unwrap_or(stripped);
    }
    if parent.is_empty() {
        child.to_string()
    } else if child.starts_with('[') {
        format!("{parent}{child}")
    } else {
        format!("{parent}.{child}")
    }
}

/// Concatenates property operands into a canonical path.
///
/// A string operand appends a `.`-separated component; a single-element
/// sub-sequence holding an integer appends a `[n]` index.
pub fn property_from_operands(operands: &[QueryNode]) -> QueryResult<String> {
    let mut property = String::new();
    for (n, item) in operands.iter().enumerate() {
        match item {
            QueryNode::Seq(index) => {
                if n == 0 {
                    fail!("property path can't start with an array index");
                }
                if index.len() != 1 {
                    fail!("property array index must have exactly one item");
                }
                let QueryNode::Int(index) = index[0] else {
                    fail!("property array index must be an integer");
                };
                property.push('[');
                property.push_str(&index.to_string());
                property.push(']');
            }
            other => {
                let Some(name) = other.as_str() else {
                    fail!("invalid value in property path");
                };
                if n > 0 {
                    property.push('.');
                }
                property.push_str(name);
            }
        }
    }
    Ok(property)
}

/// Returns the canonical path of a property-op node, or the empty string if
/// the node is not a property op.
///
/// Both forms are recognized: `[".", "a", "b"]` and the shorthand
/// `[".a", ...]` whose symbol carries the head of the path.
pub fn property_from_node(node: &QueryNode) -> QueryResult<String> {
    let Some(items) = node.as_seq() else {
        return Ok(String::new());
    };
    let Some(symbol) = items.first().and_then(QueryNode::as_str) else {
        return Ok(String::new());
    };
    if !symbol.starts_with('.') {
        return Ok(String::new());
    }
    if symbol == "." {
        return property_from_operands(&items[1..]);
    }
    let mut operands = Vec::with_capacity(items.len());
    operands.push(QueryNode::Str(symbol[1..].to_string()));
    operands.extend_from_slice(&items[1..]);
    property_from_operands(&operands)
}

/// Writes a string with SQL quoting: inside apostrophes, doubling any
/// contained apostrophes.
pub fn write_quoted(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(json: &str) -> QueryResult<String> {
        property_from_node(&QueryNode::from_json_str(json).unwrap())
    }

    #[test]
    fn append_basic() {
        assert_eq!(append_paths("", "name"), "name");
        assert_eq!(append_paths("address", "city"), "address.city");
        assert_eq!(append_paths("phones", "[0]"), "phones[0]");
    }

    #[test]
    fn append_strips_legacy_alias() {
        assert_eq!(append_paths("", "$.name"), "name");
        assert_eq!(append_paths("", "$name"), "name");
        assert_eq!(append_paths("doc", "$.name"), "doc.name");
    }

    #[test]
    fn path_from_operands_form() {
        assert_eq!(path(r#"[".", "a", "b"]"#).unwrap(), "a.b");
    }

    #[test]
    fn path_from_shorthand() {
        assert_eq!(path(r#"[".a.b"]"#).unwrap(), "a.b");
    }

    #[test]
    fn path_with_index() {
        assert_eq!(path(r#"[".a", [0]]"#).unwrap(), "a[0]");
        assert_eq!(path(r#"[".", "a", [3], "b"]"#).unwrap(), "a[3].b");
    }

    #[test]
    fn non_integer_index_rejected() {
        assert!(path(r#"[".a", ["b"]]"#).is_err());
    }

    #[test]
    fn index_at_first_position_rejected() {
        assert!(path(r#"[".", [0], "a"]"#).is_err());
    }

    #[test]
    fn non_property_node_yields_empty() {
        assert_eq!(path(r#"["=", 1, 2]"#).unwrap(), "");
        assert_eq!(path(r#""name""#).unwrap(), "");
    }

    #[test]
    fn quoting_doubles_apostrophes() {
        let mut out = String::new();
        write_quoted(&mut out, "can't");
        assert_eq!(out, "'can''t'");

        let mut plain = String::new();
        write_quoted(&mut plain, "name");
        assert_eq!(plain, "'name'");
    }
}
