//! Pattern-rewriting parser for the filter language.
//!
//! Tokens are lifted to typed nodes and an ordered rule table is applied
//! iteratively: each rule scans left to right, replacing every matching
//! span with the node it constructs. The loop runs until a full pass makes
//! no replacement. Rule order is what gives the language its precedence:
//! parentheses > comparison/IN/IS NULL/LIKE > NOT > AND > OR.

use super::lexer::Token;
use super::{FilterError, Node};
use crate::codec::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Field,
    Literal,
    LParen,
    RParen,
    Comma,
    SimpleOp,
    And,
    Or,
    Not,
    In,
    IsNull,
    Like,
    BoolExpr,
}

#[derive(Debug, Clone)]
enum PNode {
    Tok(Token),
    Expr(Node),
}

fn kind_of(node: &PNode) -> Kind {
    match node {
        PNode::Expr(_) => Kind::BoolExpr,
        PNode::Tok(t) => match t {
            Token::LParen => Kind::LParen,
            Token::RParen => Kind::RParen,
            Token::Comma => Kind::Comma,
            Token::Op(_) => Kind::SimpleOp,
            Token::And => Kind::And,
            Token::Or => Kind::Or,
            Token::Not => Kind::Not,
            Token::In => Kind::In,
            Token::IsNull => Kind::IsNull,
            Token::Like => Kind::Like,
            Token::Number(_) | Token::StringLit(_) => Kind::Literal,
            Token::Field(_) => Kind::Field,
        },
    }
}

/// One element of a rule pattern: acceptable kinds plus a repetition range.
/// `max == -1` encodes an unbounded repetition.
struct RuleItem {
    kinds: &'static [Kind],
    min: u32,
    max: i64,
}

const fn one(kinds: &'static [Kind]) -> RuleItem {
    RuleItem { kinds, min: 1, max: 1 }
}

const fn many(kinds: &'static [Kind]) -> RuleItem {
    RuleItem {
        kinds,
        min: 1,
        max: -1,
    }
}

struct Rule {
    pattern: &'static [RuleItem],
    build: fn(Vec<PNode>) -> Result<Node, FilterError>,
}

static RULES: &[Rule] = &[
    // Field <op> literal
    Rule {
        pattern: &[
            one(&[Kind::Field]),
            one(&[Kind::SimpleOp]),
            one(&[Kind::Literal]),
        ],
        build: build_cmp,
    },
    // Field IS NULL
    Rule {
        pattern: &[one(&[Kind::Field]), one(&[Kind::IsNull])],
        build: build_is_null,
    },
    // Field LIKE literal
    Rule {
        pattern: &[
            one(&[Kind::Field]),
            one(&[Kind::Like]),
            one(&[Kind::Literal]),
        ],
        build: build_like,
    },
    // Field IN ( literal [, literal]* )
    Rule {
        pattern: &[
            one(&[Kind::Field]),
            one(&[Kind::In]),
            one(&[Kind::LParen]),
            many(&[Kind::Literal, Kind::Comma]),
            one(&[Kind::RParen]),
        ],
        build: build_in,
    },
    // NOT expr
    Rule {
        pattern: &[one(&[Kind::Not]), one(&[Kind::BoolExpr])],
        build: build_not,
    },
    // expr AND expr
    Rule {
        pattern: &[
            one(&[Kind::BoolExpr]),
            one(&[Kind::And]),
            one(&[Kind::BoolExpr]),
        ],
        build: build_and,
    },
    // expr OR expr
    Rule {
        pattern: &[
            one(&[Kind::BoolExpr]),
            one(&[Kind::Or]),
            one(&[Kind::BoolExpr]),
        ],
        build: build_or,
    },
    // ( expr )
    Rule {
        pattern: &[
            one(&[Kind::LParen]),
            one(&[Kind::BoolExpr]),
            one(&[Kind::RParen]),
        ],
        build: build_group,
    },
];

/// Greedy match of `pattern` at the start of `nodes`; returns the matched
/// span length.
fn match_at(pattern: &[RuleItem], nodes: &[PNode]) -> Option<usize> {
    let mut pos = 0;
    for item in pattern {
        let mut count: u32 = 0;
        while (item.max < 0 || i64::from(count) < item.max)
            && pos < nodes.len()
            && item.kinds.contains(&kind_of(&nodes[pos]))
        {
            pos += 1;
            count += 1;
        }
        if count < item.min {
            return None;
        }
    }
    Some(pos)
}

/// Reduce a token list to a single boolean expression tree. The empty token
/// list reduces to the allow-all [`Node::Nop`].
pub fn build(tokens: Vec<Token>) -> Result<Node, FilterError> {
    if tokens.is_empty() {
        return Ok(Node::Nop);
    }
    let mut nodes: Vec<PNode> = tokens.into_iter().map(PNode::Tok).collect();
    loop {
        let mut progress = false;
        for rule in RULES {
            let mut i = 0;
            while i < nodes.len() {
                match match_at(rule.pattern, &nodes[i..]) {
                    Some(len) => {
                        let span: Vec<PNode> = nodes.drain(i..i + len).collect();
                        let expr = (rule.build)(span)?;
                        nodes.insert(i, PNode::Expr(expr));
                        progress = true;
                        // Stay put: the reduction may enable another match
                        // at the same position (left associativity).
                    }
                    None => i += 1,
                }
            }
        }
        if !progress {
            break;
        }
    }
    if nodes.len() == 1 {
        if let Some(PNode::Expr(expr)) = nodes.pop() {
            return Ok(expr);
        }
    }
    Err(FilterError::Unreduced)
}

fn literal(token: Token) -> Result<Value, FilterError> {
    match token {
        Token::Number(raw) => {
            if let Ok(i) = raw.parse::<i64>() {
                Ok(Value::Int(i))
            } else if let Ok(f) = raw.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(FilterError::BadLiteral(raw))
            }
        }
        Token::StringLit(s) => Ok(Value::Str(s)),
        other => Err(FilterError::BadLiteral(format!("{other:?}"))),
    }
}

fn malformed() -> FilterError {
    FilterError::Unreduced
}

fn take_field(node: PNode) -> Result<String, FilterError> {
    match node {
        PNode::Tok(Token::Field(name)) => Ok(name),
        _ => Err(malformed()),
    }
}

fn take_expr(node: PNode) -> Result<Node, FilterError> {
    match node {
        PNode::Expr(expr) => Ok(expr),
        _ => Err(malformed()),
    }
}

fn build_cmp(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let field = take_field(it.next().ok_or_else(malformed)?)?;
    let op = match it.next() {
        Some(PNode::Tok(Token::Op(op))) => op,
        _ => return Err(malformed()),
    };
    let arg = match it.next() {
        Some(PNode::Tok(token)) => literal(token)?,
        _ => return Err(malformed()),
    };
    Ok(Node::comparison(op, field, arg))
}

fn build_is_null(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let field = take_field(it.next().ok_or_else(malformed)?)?;
    Ok(Node::IsNull { field })
}

fn build_like(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let field = take_field(it.next().ok_or_else(malformed)?)?;
    let _like = it.next();
    match it.next() {
        Some(PNode::Tok(Token::StringLit(pattern))) => Node::like(field, &pattern),
        Some(PNode::Tok(Token::Number(pattern))) => Node::like(field, &pattern),
        _ => Err(malformed()),
    }
}

fn build_in(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let field = take_field(it.next().ok_or_else(malformed)?)?;
    let mut args = Vec::new();
    for node in it {
        match node {
            PNode::Tok(Token::In | Token::LParen | Token::RParen | Token::Comma) => {}
            PNode::Tok(token @ (Token::Number(_) | Token::StringLit(_))) => {
                args.push(literal(token)?);
            }
            _ => return Err(malformed()),
        }
    }
    if args.is_empty() {
        return Err(FilterError::Validate(
            "IN list must contain one or more values".into(),
        ));
    }
    Ok(Node::In { field, args })
}

fn build_not(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let _not = it.next();
    let child = take_expr(it.next().ok_or_else(malformed)?)?;
    Ok(Node::Not(Box::new(child)))
}

fn build_and(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let left = take_expr(it.next().ok_or_else(malformed)?)?;
    let _and = it.next();
    let right = take_expr(it.next().ok_or_else(malformed)?)?;
    Ok(Node::And(Box::new(left), Box::new(right)))
}

fn build_or(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let left = take_expr(it.next().ok_or_else(malformed)?)?;
    let _or = it.next();
    let right = take_expr(it.next().ok_or_else(malformed)?)?;
    Ok(Node::Or(Box::new(left), Box::new(right)))
}

fn build_group(span: Vec<PNode>) -> Result<Node, FilterError> {
    let mut it = span.into_iter();
    let _open = it.next();
    take_expr(it.next().ok_or_else(malformed)?)
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse(expr: &str) -> Node {
        build(tokenize(expr).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_reduces_to_nop() {
        assert!(matches!(parse(""), Node::Nop));
    }

    #[test]
    fn test_simple_comparison() {
        match parse("a == 1") {
            Node::Eq { field, arg } => {
                assert_eq!(field, "a");
                assert_eq!(arg, Value::Int(1));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // a == 1 OR b == 2 AND c == 3  =>  Or(a==1, And(b==2, c==3))
        match parse("a == 1 OR b == 2 AND c == 3") {
            Node::Or(left, right) => {
                assert!(matches!(*left, Node::Eq { .. }));
                assert!(matches!(*right, Node::And(_, _)));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_and_or_left_associative_at_equal_nesting() {
        // a AND b OR c  =>  Or(And(a, b), c)
        match parse("a == 1 AND b == 2 OR c == 3") {
            Node::Or(left, right) => {
                assert!(matches!(*left, Node::And(_, _)));
                assert!(matches!(*right, Node::Eq { .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_parentheses_group() {
        // (a == 1 OR b == 2) AND c == 3  =>  And(Or(..), ..)
        match parse("(a == 1 OR b == 2) AND c == 3") {
            Node::And(left, right) => {
                assert!(matches!(*left, Node::Or(_, _)));
                assert!(matches!(*right, Node::Eq { .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_group_followed_by_comparison() {
        // (a==1) AND b==2 converges despite the group reducing late.
        match parse("(a == 1) AND b == 2") {
            Node::And(left, right) => {
                assert!(matches!(*left, Node::Eq { .. }));
                assert!(matches!(*right, Node::Eq { .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        // NOT a == 1 AND b == 2  =>  And(Not(a==1), b==2)
        match parse("NOT a == 1 AND b == 2") {
            Node::And(left, right) => {
                assert!(matches!(*left, Node::Not(_)));
                assert!(matches!(*right, Node::Eq { .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_in_collects_literals() {
        match parse("x IN (1, 2, \"three\")") {
            Node::In { field, args } => {
                assert_eq!(field, "x");
                assert_eq!(
                    args,
                    vec![Value::Int(1), Value::Int(2), Value::Str("three".into())]
                );
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_float_literal() {
        match parse("a > 1.5") {
            Node::Gt { arg, .. } => assert_eq!(arg, Value::Float(1.5)),
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn test_unreduced_is_error() {
        let tokens = tokenize("a ==").unwrap();
        assert!(matches!(build(tokens), Err(FilterError::Unreduced)));
    }
}
