//! Full-text-search join planning.
//!
//! Before the compiler emits a SELECT it scans the WHERE tree for `MATCH`
//! operators and registers the full-text index table behind each left-hand
//! side. The FROM clause joins every registered table as `FTSn`, where `n`
//! is the 1-based first-discovery position. The plan is an ordered sequence
//! with linear search: the ordering is observable through the join aliases,
//! so it must never become a hash map.

use crate::error::{fail, QueryResult};
use crate::node::QueryNode;
use crate::path::property_from_node;

/// The ordered set of full-text index tables discovered in a WHERE clause.
#[derive(Debug, Default)]
pub struct FtsPlan {
    tables: Vec<String>,
}

impl FtsPlan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all registered tables.
    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Returns the registered tables in discovery order.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Returns the 1-based alias index of `name`, if registered.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t == name).map(|i| i + 1)
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Registers `name`, returning its 1-based alias index. Registration is
    /// idempotent and preserves first-discovery order.
    pub fn register(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(index) = self.index_of(&name) {
            return index;
        }
        self.tables.push(name);
        self.tables.len()
    }

    /// Returns true if no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Derives the index name for an expression list: the table name, `::`, and
/// the JSON form of the list with double quotes replaced by apostrophes.
pub(crate) fn index_name(table: &str, keys: &[QueryNode]) -> String {
    let json = QueryNode::Seq(keys.to_vec()).to_json();
    format!("{table}::{}", json.replace('"', "'"))
}

/// Derives the full-text index name behind a `MATCH` left-hand side.
pub(crate) fn fts_index_name(table: &str, key: &QueryNode) -> QueryResult<String> {
    let Some(items) = key.as_seq() else {
        fail!("invalid left-hand side of MATCH");
    };
    let symbol = items.first().and_then(QueryNode::as_str).unwrap_or("");
    if symbol.is_empty() {
        fail!("invalid left-hand side of MATCH");
    }
    if symbol.starts_with('.') {
        // Abbreviation for the common case of a plain property.
        Ok(fts_index_name_for_property(table, &property_from_node(key)?))
    } else {
        Ok(index_name(table, items))
    }
}

/// Derives the full-text index name for a plain property path.
pub(crate) fn fts_index_name_for_property(table: &str, property: &str) -> String {
    format!("{table}::.{property}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_ordered() {
        let mut plan = FtsPlan::new();
        assert_eq!(plan.register("kv::.text"), 1);
        assert_eq!(plan.register("kv::.title"), 2);
        assert_eq!(plan.register("kv::.text"), 1);
        assert_eq!(plan.tables(), ["kv::.text", "kv::.title"]);
        assert_eq!(plan.index_of("kv::.title"), Some(2));
        assert_eq!(plan.index_of("kv::.body"), None);
    }

    #[test]
    fn property_index_name() {
        let key = QueryNode::from_json_str(r#"[".", "text"]"#).unwrap();
        assert_eq!(fts_index_name("kv_default", &key).unwrap(), "kv_default::.text");

        let shorthand = QueryNode::from_json_str(r#"[".text"]"#).unwrap();
        assert_eq!(
            fts_index_name("kv_default", &shorthand).unwrap(),
            "kv_default::.text"
        );
    }

    #[test]
    fn complex_key_uses_json_form() {
        let key = QueryNode::from_json_str(r#"["lower()", [".", "text"]]"#).unwrap();
        assert_eq!(
            fts_index_name("kv_default", &key).unwrap(),
            "kv_default::['lower()',['.','text']]"
        );
    }

    #[test]
    fn invalid_match_lhs_rejected() {
        assert!(fts_index_name("kv", &QueryNode::Str("text".into())).is_err());
        assert!(fts_index_name("kv", &QueryNode::Seq(vec![])).is_err());
    }
}
