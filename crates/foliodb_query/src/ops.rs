//! The operator table.
//!
//! Each operator has a symbol, an arity window, a precedence (higher binds
//! tighter), and an emission kind. The table is process-wide immutable data;
//! lookup is a linear scan by symbol with ties broken by the arity window.

/// How an operation is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpKind {
    /// Operands interleaved with the symbol.
    Infix,
    /// Symbol, then the single operand.
    Prefix,
    /// Single operand, then the symbol.
    Postfix,
    /// Document property accessor (`.`).
    Property,
    /// Substituted query parameter (`$`).
    Parameter,
    /// Variable bound by `ANY`/`EVERY` (`?`).
    Variable,
    /// `MISSING` literal.
    Missing,
    /// `EXISTS`, with the property rewrite.
    Exists,
    /// `BETWEEN` ternary.
    Between,
    /// `IN` / `NOT IN` with a parenthesized list.
    In,
    /// Full-text `MATCH` with the implicit join.
    Match,
    /// `ANY` / `EVERY` / `ANY AND EVERY` quantifiers.
    AnyEvery,
    /// Nested or outer `SELECT`.
    Select,
    /// Unrecognized symbol, resolved by prefix or `()` suffix.
    Fallback,
    /// Comma-joined argument list (synthetic).
    ArgList,
    /// Comma-joined column list whose strings are properties (synthetic).
    ColumnList,
    /// ORDER BY list frame (synthetic, context-only).
    OrderBy,
    /// Outer frame at the bottom of the context stack (synthetic).
    Outer,
}

/// One entry of the operator table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Operation {
    pub symbol: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub precedence: i32,
    pub kind: OpKind,
}

const fn op(
    symbol: &'static str,
    min_args: usize,
    max_args: usize,
    precedence: i32,
    kind: OpKind,
) -> Operation {
    Operation {
        symbol,
        min_args,
        max_args,
        precedence,
        kind,
    }
}

/// The operator table. Order matters: lookup takes the first entry whose
/// symbol and arity window both match.
pub(crate) const OPERATIONS: &[Operation] = &[
    op(".", 1, 9, 9, OpKind::Property),
    op("$", 1, 1, 9, OpKind::Parameter),
    op("?", 1, 9, 9, OpKind::Variable),
    op("MISSING", 0, 0, 9, OpKind::Missing),
    op("||", 2, 9, 8, OpKind::Infix),
    op("*", 2, 9, 7, OpKind::Infix),
    op("/", 2, 2, 7, OpKind::Infix),
    op("%", 2, 2, 7, OpKind::Infix),
    op("+", 2, 9, 6, OpKind::Infix),
    op("-", 2, 2, 6, OpKind::Infix),
    op("-", 1, 1, 9, OpKind::Prefix),
    op("<", 2, 2, 4, OpKind::Infix),
    op("<=", 2, 2, 4, OpKind::Infix),
    op(">", 2, 2, 4, OpKind::Infix),
    op(">=", 2, 2, 4, OpKind::Infix),
    op("=", 2, 2, 3, OpKind::Infix),
    op("!=", 2, 2, 3, OpKind::Infix),
    op("IS", 2, 2, 3, OpKind::Infix),
    op("IS NOT", 2, 2, 3, OpKind::Infix),
    op("IN", 2, 9, 3, OpKind::In),
    op("NOT IN", 2, 9, 3, OpKind::In),
    op("LIKE", 2, 2, 3, OpKind::Infix),
    op("MATCH", 2, 2, 3, OpKind::Match),
    op("BETWEEN", 3, 3, 3, OpKind::Between),
    op("EXISTS", 1, 1, 8, OpKind::Exists),
    op("NOT", 1, 1, 9, OpKind::Prefix),
    op("AND", 2, 9, 2, OpKind::Infix),
    op("OR", 2, 9, 2, OpKind::Infix),
    op("ANY", 3, 3, 1, OpKind::AnyEvery),
    op("EVERY", 3, 3, 1, OpKind::AnyEvery),
    op("ANY AND EVERY", 3, 3, 1, OpKind::AnyEvery),
    op("SELECT", 1, 1, 1, OpKind::Select),
    op("DESC", 1, 1, 2, OpKind::Postfix),
];

/// Sentinel for symbols not present in the table. Its precedence sits above
/// every real operator so fallback emissions are never parenthesized.
pub(crate) const FALLBACK_OPERATION: Operation = op("", 0, 9, 10, OpKind::Fallback);

/// Comma-joined argument list. The negative precedence forces parentheses
/// whenever the list sits inside any real operator.
pub(crate) const ARG_LIST_OPERATION: Operation = op(",", 0, 9, -2, OpKind::ArgList);

/// Comma-joined column list; string operands are interpreted as properties.
pub(crate) const COLUMN_LIST_OPERATION: Operation = op(",", 0, 9, -2, OpKind::ColumnList);

/// ORDER BY frame. Sits below the column list so the top-level list is not
/// parenthesized.
pub(crate) const ORDER_BY_OPERATION: Operation = op("ORDER BY", 1, 9, -3, OpKind::OrderBy);

/// Outer frame at the bottom of the context stack after `reset`.
pub(crate) const OUTER_OPERATION: Operation = op("", 1, 1, -1, OpKind::Outer);

/// Result of an operator-table lookup.
pub(crate) enum Lookup {
    /// Symbol and arity both matched.
    Found(Operation),
    /// Symbol matched but no entry accepts this operand count.
    WrongArity,
    /// Symbol not present; the fallback applies.
    Unknown,
}

/// Looks up an operator by symbol and operand count.
pub(crate) fn lookup(symbol: &str, nargs: usize) -> Lookup {
    let mut name_matched = false;
    for entry in OPERATIONS {
        if entry.symbol == symbol {
            name_matched = true;
            if nargs >= entry.min_args && nargs <= entry.max_args {
                return Lookup::Found(*entry);
            }
        }
    }
    if name_matched {
        Lookup::WrongArity
    } else {
        Lookup::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_arity() {
        // "-" is binary at precedence 6 and unary at precedence 9.
        let Lookup::Found(binary) = lookup("-", 2) else {
            panic!("binary minus not found");
        };
        assert_eq!(binary.precedence, 6);
        assert_eq!(binary.kind, OpKind::Infix);

        let Lookup::Found(unary) = lookup("-", 1) else {
            panic!("unary minus not found");
        };
        assert_eq!(unary.precedence, 9);
        assert_eq!(unary.kind, OpKind::Prefix);
    }

    #[test]
    fn lookup_wrong_arity() {
        assert!(matches!(lookup("=", 3), Lookup::WrongArity));
        assert!(matches!(lookup("BETWEEN", 2), Lookup::WrongArity));
    }

    #[test]
    fn lookup_unknown() {
        assert!(matches!(lookup("FROBNICATE", 2), Lookup::Unknown));
        assert!(matches!(lookup(".name", 0), Lookup::Unknown));
    }

    #[test]
    fn comparison_binds_tighter_than_boolean() {
        let Lookup::Found(eq) = lookup("=", 2) else {
            panic!();
        };
        let Lookup::Found(and) = lookup("AND", 2) else {
            panic!();
        };
        assert!(eq.precedence > and.precedence);
    }
}
