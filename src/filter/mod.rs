//! Row filter mini-language for selective restore.
//!
//! A filter set looks like `table1(a == 1 AND b != "x"),table2(c IS NULL)`:
//! per-table boolean expressions over the column values of a parsed row.
//! The language knows comparisons (`==`, `!=`, `>`, `>=`, `<`, `<=`),
//! `IN (...)`, `IS NULL`, `LIKE`, `NOT`, `AND`, `OR`, and parentheses.
//! `AND` and `OR` evaluate both children; there is no short-circuit
//! guarantee. The empty expression allows every row.

mod lexer;
mod parser;

use crate::codec::Value;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;

pub use lexer::CmpOp;

/// A parsed row as the evaluator sees it: column name to value.
pub type Row = AHashMap<String, Value>;

/// Errors raised while parsing or evaluating filter expressions.
///
/// Parse-side variants are fatal for the whole run; evaluation-side
/// variants are per-row and cause the row to be skipped.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("unexpected token {0:?} in filter expression")]
    Lex(String),

    #[error("invalid filter expression: {0}")]
    Validate(String),

    #[error("filter expression does not reduce to a single boolean expression")]
    Unreduced,

    #[error("invalid literal {0:?} in filter expression")]
    BadLiteral(String),

    #[error("failed to compile LIKE pattern {pattern:?}")]
    BadLikePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("field {field:?} not found for {op:?} operation")]
    FieldNotFound { field: String, op: &'static str },

    #[error("type mismatch for field {field:?}: {left} vs {right}")]
    TypesMismatch {
        field: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("type {kind} not supported for field {field:?}")]
    TypeNotSupported { field: String, kind: &'static str },
}

/// A boolean expression tree node. The set of node kinds is closed, so a
/// sum type carries the whole evaluator.
#[derive(Debug, Clone)]
pub enum Node {
    /// Empty expression: always true.
    Nop,
    Eq { field: String, arg: Value },
    Ne { field: String, arg: Value },
    Gt { field: String, arg: Value },
    Ge { field: String, arg: Value },
    Lt { field: String, arg: Value },
    Le { field: String, arg: Value },
    In { field: String, args: Vec<Value> },
    IsNull { field: String },
    Like { field: String, re: Regex },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

fn lookup<'r>(row: &'r Row, field: &str, op: &'static str) -> Result<&'r Value, FilterError> {
    row.get(field).ok_or_else(|| FilterError::FieldNotFound {
        field: field.to_string(),
        op,
    })
}

/// Three-way comparison for same-typed operands; anything else errors.
fn compare(field: &str, value: &Value, arg: &Value) -> Result<std::cmp::Ordering, FilterError> {
    use std::cmp::Ordering;
    match (value, arg) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal)),
        (Value::Str(_) | Value::Int(_) | Value::Float(_), _) => Err(FilterError::TypesMismatch {
            field: field.to_string(),
            left: value.type_name(),
            right: arg.type_name(),
        }),
        _ => Err(FilterError::TypeNotSupported {
            field: field.to_string(),
            kind: value.type_name(),
        }),
    }
}

impl Node {
    /// Build a comparison node for the given operator.
    pub(crate) fn comparison(op: CmpOp, field: String, arg: Value) -> Node {
        match op {
            CmpOp::Eq => Node::Eq { field, arg },
            CmpOp::Ne => Node::Ne { field, arg },
            CmpOp::Gt => Node::Gt { field, arg },
            CmpOp::Ge => Node::Ge { field, arg },
            CmpOp::Lt => Node::Lt { field, arg },
            CmpOp::Le => Node::Le { field, arg },
        }
    }

    /// Build a LIKE node: `%` becomes `.*`, `_` becomes `.`, every other
    /// regex metacharacter is escaped. The match is unanchored.
    pub(crate) fn like(field: String, pattern: &str) -> Result<Node, FilterError> {
        let translated = regex::escape(pattern).replace('_', ".").replace('%', ".*");
        let re = Regex::new(&translated).map_err(|e| FilterError::BadLikePattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        Ok(Node::Like { field, re })
    }

    /// Evaluate this expression against a row.
    pub fn value(&self, row: &Row) -> Result<bool, FilterError> {
        match self {
            Node::Nop => Ok(true),
            Node::Eq { field, arg } => Ok(lookup(row, field, "==")? == arg),
            Node::Ne { field, arg } => Ok(lookup(row, field, "!=")? != arg),
            Node::Gt { field, arg } => {
                Ok(compare(field, lookup(row, field, ">")?, arg)?.is_gt())
            }
            Node::Ge { field, arg } => {
                Ok(compare(field, lookup(row, field, ">=")?, arg)?.is_ge())
            }
            Node::Lt { field, arg } => {
                Ok(compare(field, lookup(row, field, "<")?, arg)?.is_lt())
            }
            Node::Le { field, arg } => {
                Ok(compare(field, lookup(row, field, "<=")?, arg)?.is_le())
            }
            Node::In { field, args } => {
                let value = lookup(row, field, "IN")?;
                Ok(args.iter().any(|arg| arg == value))
            }
            Node::IsNull { field } => Ok(lookup(row, field, "IS NULL")?.is_null()),
            Node::Like { field, re } => match lookup(row, field, "LIKE")? {
                Value::Str(s) => Ok(re.is_match(s)),
                other => Err(FilterError::TypesMismatch {
                    field: field.to_string(),
                    left: other.type_name(),
                    right: "string",
                }),
            },
            Node::And(x, y) => {
                let left = x.value(row)?;
                let right = y.value(row)?;
                Ok(left && right)
            }
            Node::Or(x, y) => {
                let left = x.value(row)?;
                let right = y.value(row)?;
                Ok(left || right)
            }
            Node::Not(x) => Ok(!x.value(row)?),
        }
    }
}

/// A compiled filter for a single table.
#[derive(Debug, Clone)]
pub struct Filter {
    expr: Node,
}

impl Filter {
    /// Parse one inner expression. The empty expression allows every row.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let tokens = lexer::tokenize(expression)?;
        lexer::validate(&tokens)?;
        let expr = parser::build(tokens)?;
        Ok(Self { expr })
    }

    pub fn value(&self, row: &Row) -> Result<bool, FilterError> {
        self.expr.value(row)
    }
}

static TABLE_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Per-table filters parsed from `table1(expr),table2(expr)`.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: AHashMap<String, Filter>,
}

impl FilterSet {
    /// Split a top-level filter expression on commas at parenthesis depth
    /// zero and parse each table's inner expression.
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let mut filters = AHashMap::new();
        for (table, inner) in split_tables(expression)? {
            let filter = Filter::parse(&inner)?;
            filters.insert(table, filter);
        }
        Ok(Self { filters })
    }

    pub fn get(&self, table: &str) -> Option<&Filter> {
        self.filters.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

fn split_tables(expression: &str) -> Result<Vec<(String, String)>, FilterError> {
    let mut result = Vec::new();
    let mut key = String::new();
    let mut chars = expression.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '(' => {
                let mut inner = String::new();
                let mut depth = 0i64;
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        '(' => {
                            depth += 1;
                            inner.push(c);
                        }
                        ')' if depth == 0 => {
                            closed = true;
                            break;
                        }
                        ')' => {
                            depth -= 1;
                            inner.push(c);
                        }
                        _ => inner.push(c),
                    }
                }
                if !closed {
                    return Err(FilterError::Validate("unbalanced parentheses".into()));
                }
                let table = key.trim().to_string();
                if !TABLE_KEY_RE.is_match(&table) {
                    return Err(FilterError::Validate(format!(
                        "invalid table name {table:?} in filter expression"
                    )));
                }
                result.push((table, inner));
                key.clear();
            }
            ',' => key.clear(),
            _ => key.push(ch),
        }
    }
    if !key.trim().is_empty() {
        return Err(FilterError::Validate(format!(
            "dangling filter fragment {:?}",
            key.trim()
        )));
    }
    Ok(result)
}
