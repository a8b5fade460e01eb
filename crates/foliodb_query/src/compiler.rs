//! Translation of query expression trees into SQL.
//!
//! The compiler walks a [`QueryNode`] tree and streams SQL text into an
//! output buffer, consulting the operator table for precedence and emission
//! kind. A context stack of enclosing operations decides parenthesization:
//! an operation whose precedence is less than or equal to its enclosing
//! operation's is wrapped in parentheses.
//!
//! A compiler instance is single-shot: each `parse*` call resets it, and
//! [`QueryCompiler::sql`] reads the produced statement.

use std::collections::HashSet;

use crate::error::{fail, QueryResult};
use crate::fts::{self, FtsPlan};
use crate::node::QueryNode;
use crate::ops::{self, Lookup, OpKind, Operation};
use crate::path::{append_paths, property_from_node, property_from_operands, write_quoted};

/// Translates query expression trees into SQL statements.
///
/// The underlying engine is expected to provide the body-helper functions
/// `fl_value`, `fl_exists`, `fl_count` and `fl_each`, plus
/// `rank(matchinfo(...))` for full-text rank.
#[derive(Debug)]
pub struct QueryCompiler {
    table_name: String,
    body_column: String,
    base_result_columns: Vec<String>,
    default_limit: Option<u64>,
    default_offset: Option<u64>,
    property_path_prefix: String,
    sql: String,
    context: Vec<Operation>,
    variables: HashSet<String>,
    parameters: HashSet<String>,
    fts: FtsPlan,
    first_custom_result_column: usize,
}

impl QueryCompiler {
    /// Creates a compiler targeting `table_name`, reading document bodies
    /// from `body_column`.
    pub fn new(table_name: impl Into<String>, body_column: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            body_column: body_column.into(),
            base_result_columns: vec!["key".into(), "sequence".into()],
            default_limit: None,
            default_offset: None,
            property_path_prefix: String::new(),
            sql: String::new(),
            context: Vec::new(),
            variables: HashSet::new(),
            parameters: HashSet::new(),
            fts: FtsPlan::new(),
            first_custom_result_column: 0,
        }
    }

    /// Replaces the base result columns emitted before any caller columns.
    #[must_use]
    pub fn with_base_result_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_result_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the LIMIT applied when the query does not specify one.
    #[must_use]
    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = Some(limit);
        self
    }

    /// Sets the OFFSET applied when the query does not specify one.
    #[must_use]
    pub fn with_default_offset(mut self, offset: u64) -> Self {
        self.default_offset = Some(offset);
        self
    }

    /// Sets a path prefix prepended to every document property access.
    #[must_use]
    pub fn with_property_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_path_prefix = prefix.into();
        self
    }

    /// Returns the SQL produced by the last `parse*` call.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the index of the first caller-supplied result column, after
    /// the base columns and any `offsets(...)` full-text columns.
    pub fn first_custom_result_column(&self) -> usize {
        self.first_custom_result_column
    }

    /// Returns the names of the substituted parameters seen while parsing.
    pub fn parameters(&self) -> &HashSet<String> {
        &self.parameters
    }

    /// Returns the full-text index tables joined by the query, in join-alias
    /// order.
    pub fn fts_tables(&self) -> &[String] {
        self.fts.tables()
    }

    /// Clears all per-compilation state.
    pub fn reset(&mut self) {
        self.sql.clear();
        self.context.clear();
        self.context.push(ops::OUTER_OPERATION);
        self.variables.clear();
        self.parameters.clear();
        self.fts.clear();
        self.first_custom_result_column = 0;
    }

    /// Compiles a top-level query.
    ///
    /// A mapping is treated as the operands of a SELECT; a sequence starting
    /// with `"SELECT"` is dispatched through the operator table; any other
    /// expression becomes the WHERE clause of an implicit SELECT.
    pub fn parse(&mut self, expression: &QueryNode) -> QueryResult<()> {
        self.reset();
        match expression {
            QueryNode::Map(_) => self.write_select(expression.get("WHERE"), Some(expression)),
            QueryNode::Seq(items)
                if items.first().and_then(QueryNode::as_str) == Some("SELECT") =>
            {
                self.parse_node(expression)
            }
            _ => self.write_select(Some(expression), None),
        }
    }

    /// Parses JSON text and compiles it as a top-level query.
    pub fn parse_json(&mut self, json: &str) -> QueryResult<()> {
        let expression = QueryNode::from_json_str(json)?;
        self.parse(&expression)
    }

    /// Compiles a single expression with no SELECT framing.
    pub fn parse_expression_only(&mut self, expression: &QueryNode) -> QueryResult<()> {
        self.reset();
        self.parse_node(expression)
    }

    /// Compiles a single expression with a throwaway compiler and returns
    /// its SQL.
    pub fn expression_sql(expression: &QueryNode, body_column: &str) -> QueryResult<String> {
        let mut compiler = QueryCompiler::new("XXX", body_column);
        compiler.parse_expression_only(expression)?;
        Ok(compiler.sql.clone())
    }

    /// Compiles an idempotent index-creation statement over the given key
    /// expressions. The index name is derived from the table name and the
    /// JSON form of the expression list.
    pub fn compile_create_index(&mut self, expressions: &[QueryNode]) -> QueryResult<()> {
        self.reset();
        let name = fts::index_name(&self.table_name, expressions);
        self.sql.push_str("CREATE INDEX IF NOT EXISTS \"");
        self.sql.push_str(&name);
        self.sql.push_str("\" ON ");
        self.sql.push_str(&self.table_name);
        self.sql.push(' ');
        self.write_column_list(expressions)
    }

    // ---- SELECT emission ----

    fn write_select(
        &mut self,
        where_clause: Option<&QueryNode>,
        operands: Option<&QueryNode>,
    ) -> QueryResult<()> {
        // All MATCH properties must be known before the FROM clause can list
        // the auxiliary tables.
        if let Some(where_clause) = where_clause {
            self.find_fts_properties(where_clause)?;
        }

        self.sql.push_str("SELECT ");
        let mut n_col = 0;
        for column in &self.base_result_columns {
            if n_col > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str(column);
            n_col += 1;
        }
        for table in self.fts.tables() {
            if n_col > 0 {
                self.sql.push_str(", ");
            }
            self.sql.push_str("offsets(\"");
            self.sql.push_str(table);
            self.sql.push_str("\")");
            n_col += 1;
        }
        self.first_custom_result_column = n_col;

        if let Some(what) = operands.and_then(|o| o.get("WHAT")) {
            let Some(columns) = what.as_seq() else {
                fail!("WHAT must be an array");
            };
            for column in columns {
                if n_col > 0 {
                    self.sql.push_str(", ");
                }
                self.write_result_column(column)?;
                n_col += 1;
            }
        }
        if n_col == 0 {
            fail!("no result columns");
        }

        if operands.and_then(|o| o.get("FROM")).is_some() {
            fail!("FROM parameter to SELECT isn't supported");
        }
        self.sql.push_str(" FROM ");
        self.sql.push_str(&self.table_name);
        for (i, table) in self.fts.tables().iter().enumerate() {
            self.sql.push_str(&format!(", \"{table}\" AS FTS{}", i + 1));
        }

        if let Some(where_clause) = where_clause {
            self.sql.push_str(" WHERE ");
            self.parse_node(where_clause)?;
        }

        if let Some(order) = operands.and_then(|o| o.get("ORDER BY")) {
            self.sql.push_str(" ORDER BY ");
            // The ORDER BY frame suppresses parentheses around the list.
            self.context.push(ops::ORDER_BY_OPERATION);
            let result = match order.as_seq() {
                Some(items) => self.write_column_list(items),
                None => Err(crate::error::QueryError::invalid_query(
                    "ORDER BY must be an array",
                )),
            };
            self.context.pop();
            result?;
        }

        if let Some(limit) = self.default_limit {
            self.sql.push_str(" LIMIT ");
            self.sql.push_str(&limit.to_string());
        }
        if let Some(offset) = self.default_offset {
            self.sql.push_str(" OFFSET ");
            self.sql.push_str(&offset.to_string());
        }
        Ok(())
    }

    fn write_result_column(&mut self, column: &QueryNode) -> QueryResult<()> {
        match column {
            QueryNode::Seq(_) => self.parse_node(column),
            QueryNode::Str(s) if s == "*" => {
                fail!("'*' result column isn't supported");
            }
            QueryNode::Str(s) => self.write_string_literal_as_property(s),
            _ => fail!("invalid item in WHAT clause; must be an array or '.property'"),
        }
    }

    fn write_string_literal_as_property(&mut self, s: &str) -> QueryResult<()> {
        let Some(property) = s.strip_prefix('.') else {
            fail!("invalid property name '{s}'; must start with '.'");
        };
        self.write_property_getter("fl_value", property)
    }

    // ---- expression dispatch ----

    fn enclosing_precedence(&self) -> i32 {
        self.context
            .last()
            .map_or(ops::OUTER_OPERATION.precedence, |op| op.precedence)
    }

    fn in_column_list(&self) -> bool {
        self.context
            .last()
            .is_some_and(|op| op.kind == OpKind::ColumnList)
    }

    fn parse_node(&mut self, node: &QueryNode) -> QueryResult<()> {
        match node {
            // A JSON null becomes a zero-length blob literal, which keeps it
            // distinct from SQL NULL (the encoding of MISSING).
            QueryNode::Null => self.sql.push_str("x''"),
            QueryNode::Int(i) => self.sql.push_str(&i.to_string()),
            QueryNode::Double(f) => self.sql.push_str(&f.to_string()),
            QueryNode::Bool(b) => self.sql.push(if *b { '1' } else { '0' }),
            QueryNode::Str(s) => {
                if self.in_column_list() {
                    self.write_string_literal_as_property(s)?;
                } else {
                    write_quoted(&mut self.sql, s);
                }
            }
            QueryNode::Blob(_) => fail!("binary data not supported in query"),
            QueryNode::Map(_) => fail!("dictionaries not supported in query"),
            QueryNode::Seq(items) => self.parse_op_node(items)?,
        }
        Ok(())
    }

    fn parse_op_node(&mut self, items: &[QueryNode]) -> QueryResult<()> {
        if items.is_empty() {
            fail!("empty expression array");
        }
        let Some(symbol) = items[0].as_str() else {
            fail!("operation must be a string");
        };
        let operands = &items[1..];
        // Operand counts are capped at 9, matching the widest arity window.
        let nargs = operands.len().min(9);
        match ops::lookup(symbol, nargs) {
            Lookup::Found(operation) => self.handle_operation(operation, symbol, operands),
            Lookup::WrongArity => fail!("wrong number of arguments to {symbol}"),
            Lookup::Unknown => self.handle_operation(ops::FALLBACK_OPERATION, symbol, operands),
        }
    }

    /// Invokes an operation's emitter, parenthesizing by precedence. The
    /// context push is paired with a pop on every exit path.
    fn handle_operation(
        &mut self,
        operation: Operation,
        symbol: &str,
        operands: &[QueryNode],
    ) -> QueryResult<()> {
        let parenthesize = operation.precedence <= self.enclosing_precedence();
        self.context.push(operation);
        if parenthesize {
            self.sql.push('(');
        }
        let result = self.write_operation(operation.kind, symbol, operands);
        if result.is_ok() && parenthesize {
            self.sql.push(')');
        }
        self.context.pop();
        result
    }

    fn write_operation(
        &mut self,
        kind: OpKind,
        symbol: &str,
        operands: &[QueryNode],
    ) -> QueryResult<()> {
        match kind {
            OpKind::Infix | OpKind::ArgList | OpKind::ColumnList => {
                self.write_infix(symbol, operands)
            }
            OpKind::Prefix => self.write_prefix(symbol, operands),
            OpKind::Postfix => self.write_postfix(symbol, operands),
            OpKind::Property => self.write_property(operands),
            OpKind::Parameter => self.write_parameter(symbol, operands),
            OpKind::Variable => self.write_variable(symbol, operands),
            OpKind::Missing => {
                self.sql.push_str("NULL");
                Ok(())
            }
            OpKind::Exists => self.write_exists(symbol, operands),
            OpKind::Between => self.write_between(symbol, operands),
            OpKind::In => self.write_in(symbol, operands),
            OpKind::Match => self.write_match(operands),
            OpKind::AnyEvery => self.write_any_every(symbol, operands),
            OpKind::Select => self.write_select_op(operands),
            OpKind::Fallback => self.write_fallback(symbol, operands),
            OpKind::OrderBy | OpKind::Outer => {
                fail!("internal: context-only operation dispatched")
            }
        }
    }

    // ---- operation emitters ----

    fn write_infix(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        for (n, operand) in operands.iter().enumerate() {
            if n > 0 {
                if symbol != "," {
                    self.sql.push(' ');
                }
                self.sql.push_str(symbol);
                self.sql.push(' ');
            }
            self.parse_node(operand)?;
        }
        Ok(())
    }

    fn write_prefix(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        self.sql.push_str(symbol);
        if symbol.ends_with(|c: char| c.is_ascii_alphabetic()) {
            self.sql.push(' ');
        }
        self.parse_node(&operands[0])
    }

    fn write_postfix(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        self.parse_node(&operands[0])?;
        self.sql.push(' ');
        self.sql.push_str(symbol);
        Ok(())
    }

    fn write_exists(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        // "EXISTS propertyname" turns into a call to fl_exists().
        if self.write_nested_property_op_if_any("fl_exists", operands)? {
            return Ok(());
        }
        self.write_prefix(symbol, operands)
    }

    fn write_between(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        self.parse_node(&operands[0])?;
        self.sql.push(' ');
        self.sql.push_str(symbol);
        self.sql.push(' ');
        self.parse_node(&operands[1])?;
        self.sql.push_str(" AND ");
        self.parse_node(&operands[2])
    }

    fn write_in(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        self.parse_node(&operands[0])?;
        self.sql.push(' ');
        self.sql.push_str(symbol);
        self.sql.push(' ');
        self.write_arg_list(&operands[1..])
    }

    fn write_match(&mut self, operands: &[QueryNode]) -> QueryResult<()> {
        let fts_table_no = self.fts_property_index(&operands[0], false)?;
        if fts_table_no == 0 {
            fail!("MATCH can only appear in the WHERE clause of a SELECT");
        }
        self.sql.push_str("(FTS");
        self.sql.push_str(&fts_table_no.to_string());
        self.sql.push_str(".text MATCH ");
        self.parse_node(&operands[1])?;
        self.sql.push_str(" AND FTS");
        self.sql.push_str(&fts_table_no.to_string());
        self.sql.push_str(".rowid = ");
        self.sql.push_str(&self.table_name);
        self.sql.push_str(".sequence)");
        Ok(())
    }

    fn write_any_every(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        let Some(var) = operands[0].as_str() else {
            fail!("ANY/EVERY first parameter must be an identifier");
        };
        if !is_valid_identifier(var) {
            fail!("ANY/EVERY first parameter must be an identifier; '{var}' is not");
        }
        if self.variables.contains(var) {
            fail!("variable '{var}' is already in use");
        }
        let var = var.to_string();
        self.variables.insert(var.clone());
        let result = self.write_any_every_body(symbol, &var, operands);
        self.variables.remove(&var);
        result
    }

    fn write_any_every_body(
        &mut self,
        symbol: &str,
        var: &str,
        operands: &[QueryNode],
    ) -> QueryResult<()> {
        let property = property_from_node(&operands[1])?;
        if property.is_empty() {
            fail!("ANY/EVERY only supports a property as its source");
        }
        let every = symbol != "ANY";
        let any_and_every = symbol == "ANY AND EVERY";

        if any_and_every {
            self.sql.push('(');
            self.write_property_getter("fl_count", &property)?;
            self.sql.push_str(" > 0 AND ");
        }
        if every {
            self.sql.push_str("NOT ");
        }
        self.sql.push_str("EXISTS (SELECT 1 FROM ");
        self.write_property_getter("fl_each", &property)?;
        self.sql.push_str(" AS _");
        self.sql.push_str(var);
        self.sql.push_str(" WHERE ");
        if every {
            self.sql.push_str("NOT (");
        }
        self.parse_node(&operands[2])?;
        if every {
            self.sql.push(')');
        }
        self.sql.push(')');
        if any_and_every {
            self.sql.push(')');
        }
        Ok(())
    }

    fn write_property(&mut self, operands: &[QueryNode]) -> QueryResult<()> {
        let property = property_from_operands(operands)?;
        self.write_property_getter("fl_value", &property)
    }

    fn write_parameter(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        let name = if symbol.len() == 1 {
            match &operands[0] {
                QueryNode::Str(s) => s.clone(),
                QueryNode::Int(i) => i.to_string(),
                _ => fail!("invalid query parameter name"),
            }
        } else {
            let name = &symbol[1..];
            if !operands.is_empty() {
                fail!("extra operands to '{name}'");
            }
            name.to_string()
        };
        if !is_alphanumeric_or_underscore(&name) {
            fail!("invalid query parameter name '{name}'");
        }
        self.sql.push_str("$_");
        self.sql.push_str(&name);
        self.parameters.insert(name);
        Ok(())
    }

    fn write_variable(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        let (var, rest) = if symbol.len() == 1 {
            let Some(var) = operands.first().and_then(QueryNode::as_str) else {
                fail!("invalid variable name");
            };
            (var.to_string(), &operands[1..])
        } else {
            (symbol[1..].to_string(), operands)
        };
        if !is_valid_identifier(&var) {
            fail!("invalid variable name '{var}'");
        }
        if !self.variables.contains(&var) {
            fail!("no such variable '{var}'");
        }

        if rest.is_empty() {
            self.sql.push('_');
            self.sql.push_str(&var);
            self.sql.push_str(".value");
        } else {
            let property = property_from_operands(rest)?;
            self.sql.push_str("fl_value(_");
            self.sql.push_str(&var);
            self.sql.push_str(".pointer, ");
            write_quoted(&mut self.sql, &property);
            self.sql.push(')');
        }
        Ok(())
    }

    fn write_select_op(&mut self, operands: &[QueryNode]) -> QueryResult<()> {
        if !operands[0].is_map() {
            fail!("argument to SELECT must be an object");
        }
        if self.context.len() <= 2 {
            // Outer SELECT: compile in place.
            self.write_select(operands[0].get("WHERE"), Some(&operands[0]))
        } else {
            // Nested SELECT: use a fresh compiler and splice its output.
            let mut nested = QueryCompiler::new(&self.table_name, &self.body_column);
            nested.parse(&operands[0])?;
            self.sql.push_str(nested.sql());
            Ok(())
        }
    }

    fn write_fallback(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        if let Some(property) = symbol.strip_prefix('.') {
            self.write_property_getter("fl_value", property)
        } else if symbol.starts_with('$') {
            self.write_parameter(symbol, operands)
        } else if symbol.starts_with('?') {
            self.write_variable(symbol, operands)
        } else if symbol.len() > 2 && symbol.ends_with("()") {
            self.write_function(symbol, operands)
        } else {
            fail!("unknown operator '{symbol}'");
        }
    }

    fn write_function(&mut self, symbol: &str, operands: &[QueryNode]) -> QueryResult<()> {
        let name = &symbol[..symbol.len() - 2];
        let mut lowered = String::with_capacity(name.len());
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                fail!("illegal non-alphanumeric character in function name '{name}'");
            }
            lowered.push(c.to_ascii_lowercase());
        }

        // Special cases: "array_count(prop)" becomes fl_count, and
        // "rank(prop)" resolves against the full-text plan.
        if lowered == "array_count" && self.write_nested_property_op_if_any("fl_count", operands)? {
            return Ok(());
        }
        if lowered == "rank" && self.write_nested_property_op_if_any("rank", operands)? {
            return Ok(());
        }

        self.sql.push_str(&lowered);
        self.write_arg_list(operands)
    }

    fn write_arg_list(&mut self, operands: &[QueryNode]) -> QueryResult<()> {
        self.handle_operation(ops::ARG_LIST_OPERATION, ",", operands)
    }

    fn write_column_list(&mut self, operands: &[QueryNode]) -> QueryResult<()> {
        self.handle_operation(ops::COLUMN_LIST_OPERATION, ",", operands)
    }

    /// If the first operand is a property op, emits it through `func` and
    /// returns true.
    fn write_nested_property_op_if_any(
        &mut self,
        func: &str,
        operands: &[QueryNode],
    ) -> QueryResult<bool> {
        let Some(first) = operands.first() else {
            return Ok(false);
        };
        let property = property_from_node(first)?;
        if property.is_empty() {
            return Ok(false);
        }
        self.write_property_getter(func, &property)?;
        Ok(true)
    }

    /// Emits a call to a body-helper function for a property, handling the
    /// reserved `_id`/`_sequence` names and full-text `rank`.
    fn write_property_getter(&mut self, func: &str, property: &str) -> QueryResult<()> {
        if property == "_id" {
            if func != "fl_value" {
                fail!("can't use '_id' in this context");
            }
            self.sql.push_str("key");
        } else if property == "_sequence" {
            if func != "fl_value" {
                fail!("can't use '_sequence' in this context");
            }
            self.sql.push_str("sequence");
        } else if func == "rank" {
            let fts_table = fts::fts_index_name_for_property(&self.table_name, property);
            if !self.fts.contains(&fts_table) {
                fail!("rank() can only be used with FTS properties");
            }
            self.sql.push_str("rank(matchinfo(\"");
            self.sql.push_str(&fts_table);
            self.sql.push_str("\"))");
        } else {
            self.sql.push_str(func);
            self.sql.push('(');
            self.sql.push_str(&self.body_column);
            self.sql.push_str(", ");
            let full_path = append_paths(&self.property_path_prefix, property);
            write_quoted(&mut self.sql, &full_path);
            self.sql.push(')');
        }
        Ok(())
    }

    // ---- full-text discovery ----

    /// Pre-scans an expression for MATCH operators, registering the
    /// full-text table behind each left-hand side.
    fn find_fts_properties(&mut self, node: &QueryNode) -> QueryResult<()> {
        let Some(items) = node.as_seq() else {
            return Ok(());
        };
        if items.is_empty() {
            return Ok(());
        }
        let mut rest = &items[1..];
        if items[0].as_str() == Some("MATCH") && !rest.is_empty() {
            self.fts_property_index(&rest[0], true)?;
            rest = &rest[1..];
        }
        for child in rest {
            self.find_fts_properties(child)?;
        }
        Ok(())
    }

    /// Returns the 1-based join alias of the full-text table behind a MATCH
    /// left-hand side, registering it when `can_add` is set. Returns 0 when
    /// the table is unregistered and `can_add` is unset.
    fn fts_property_index(&mut self, match_lhs: &QueryNode, can_add: bool) -> QueryResult<usize> {
        let key = fts::fts_index_name(&self.table_name, match_lhs)?;
        if let Some(index) = self.fts.index_of(&key) {
            Ok(index)
        } else if can_add {
            Ok(self.fts.register(key))
        } else {
            Ok(0)
        }
    }
}

fn is_alphanumeric_or_underscore(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_identifier(s: &str) -> bool {
    is_alphanumeric_or_underscore(s) && !s.starts_with(|c: char| c.is_ascii_digit())
}
