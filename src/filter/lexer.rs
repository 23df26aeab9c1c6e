//! Tokenizer and structural validator for the row filter language.

use super::FilterError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Comparison operators shared by the lexer and the expression tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Comma,
    Op(CmpOp),
    And,
    Or,
    Not,
    In,
    IsNull,
    Like,
    Number(String),
    StringLit(String),
    Field(String),
}

/// Punctuation and operator lexemes, matched longest-first.
const SPLITTERS: &[&str] = &[
    "IS NULL", "LIKE", "AND", "NOT", "OR", "IN", "==", "!=", ">=", "<=", ">", "<", "(", ")", ",",
    "'",
];

/// Upper bound on an operator lexeme length tried at each position.
const MAX_SPLITTER_LEN: usize = 64;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9.]+$").unwrap());
static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^('.*')|(".*")$"#).unwrap());
static FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

fn splitter_at(expr: &str, pos: usize) -> Option<&'static str> {
    let remaining = expr.len() - pos;
    for len in (1..=MAX_SPLITTER_LEN.min(remaining)).rev() {
        if let Some(candidate) = expr.get(pos..pos + len) {
            if let Some(s) = SPLITTERS.iter().find(|s| **s == candidate) {
                return Some(*s);
            }
        }

    }
    None
}

/// Lex one inner filter expression into tokens.
///
/// Left-to-right scan: at each position the longest operator match wins;
/// everything else accumulates into the current identifier/value token,
/// flushed on the next separator. A post-pass re-merges tokens that were
/// split around interior single quotes.
pub fn tokenize(expr: &str) -> Result<Vec<Token>, FilterError> {
    let mut raw: Vec<String> = Vec::new();
    let mut token = String::new();
    let mut pos = 0;
    while pos < expr.len() {
        if let Some(s) = splitter_at(expr, pos) {
            if !token.is_empty() {
                raw.push(std::mem::take(&mut token));
            }
            raw.push(s.to_string());
            pos += s.len();
            continue;
        }
        match expr[pos..].chars().next() {
            Some(ch) => {
                token.push(ch);
                pos += ch.len_utf8();
            }
            None => break,
        }
    }
    if !token.is_empty() {
        raw.push(token);
    }
    balance(raw).into_iter().map(classify).collect()
}

/// Re-merge single-quoted spans the splitter pass tore apart, honoring
/// `\'` escapes, and trim whitespace from bare tokens.
fn balance(raw: Vec<String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = String::new();
    for item in raw {
        if item == "'" {
            if pending.is_empty() {
                pending.push('\'');
            } else if pending.ends_with('\\') {
                pending.push('\'');
            } else {
                pending.push('\'');
                out.push(std::mem::take(&mut pending));
            }
        } else if pending.is_empty() {
            let trimmed = item.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        } else {
            pending.push_str(&item);
        }
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

fn unescape(body: &str) -> String {
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) => result.push(next),
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

fn classify(raw: String) -> Result<Token, FilterError> {
    match raw.as_str() {
        "(" => return Ok(Token::LParen),
        ")" => return Ok(Token::RParen),
        "," => return Ok(Token::Comma),
        "==" => return Ok(Token::Op(CmpOp::Eq)),
        "!=" => return Ok(Token::Op(CmpOp::Ne)),
        ">" => return Ok(Token::Op(CmpOp::Gt)),
        ">=" => return Ok(Token::Op(CmpOp::Ge)),
        "<" => return Ok(Token::Op(CmpOp::Lt)),
        "<=" => return Ok(Token::Op(CmpOp::Le)),
        "AND" => return Ok(Token::And),
        "OR" => return Ok(Token::Or),
        "NOT" => return Ok(Token::Not),
        "IN" => return Ok(Token::In),
        "IS NULL" => return Ok(Token::IsNull),
        "LIKE" => return Ok(Token::Like),
        _ => {}
    }
    if NUMBER_RE.is_match(&raw) {
        return Ok(Token::Number(raw));
    }
    if raw.len() >= 2 && STRING_RE.is_match(&raw) {
        let body = &raw[1..raw.len() - 1];
        return Ok(Token::StringLit(unescape(body)));
    }
    if FIELD_RE.is_match(&raw) {
        return Ok(Token::Field(raw));
    }
    Err(FilterError::Lex(raw))
}

fn is_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::Field(_) | Token::Number(_) | Token::StringLit(_)
    )
}

/// Structural validation applied to the raw token list before tree building.
pub fn validate(tokens: &[Token]) -> Result<(), FilterError> {
    let mut depth = 0i64;
    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::LParen => {
                depth += 1;
                match tokens.get(i + 1) {
                    Some(t) if is_operand(t) => {}
                    Some(Token::LParen | Token::Not) => {}
                    _ => {
                        return Err(FilterError::Validate(
                            "opening parenthesis must be followed by a field or value".into(),
                        ))
                    }
                }
            }
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(FilterError::Validate("unbalanced parentheses".into()));
                }
                match tokens.get(i + 1) {
                    None => {}
                    Some(Token::And | Token::Or | Token::RParen) => {}
                    _ => {
                        return Err(FilterError::Validate(
                            "closing parenthesis must be followed by AND or OR".into(),
                        ))
                    }
                }
            }
            Token::In => {
                if !matches!(tokens.get(i + 1), Some(Token::LParen)) {
                    return Err(FilterError::Validate(
                        "IN must be followed by a parenthesised value list".into(),
                    ));
                }
                let mut j = i + 2;
                let mut values = 0;
                loop {
                    match tokens.get(j) {
                        Some(Token::Number(_) | Token::StringLit(_)) => {
                            values += 1;
                            j += 1;
                        }
                        _ => {
                            return Err(FilterError::Validate(
                                "IN list must contain one or more values".into(),
                            ))
                        }
                    }
                    match tokens.get(j) {
                        Some(Token::Comma) => j += 1,
                        Some(Token::RParen) => break,
                        _ => {
                            return Err(FilterError::Validate(
                                "IN list values must be separated by commas".into(),
                            ))
                        }
                    }
                }
                if values == 0 {
                    return Err(FilterError::Validate(
                        "IN list must contain one or more values".into(),
                    ));
                }
            }
            Token::And | Token::Or => match tokens.get(i + 1) {
                Some(t) if is_operand(t) => {}
                Some(Token::LParen | Token::Not) => {}
                _ => {
                    return Err(FilterError::Validate(
                        "AND/OR must be followed by a field, value, or group".into(),
                    ))
                }
            },
            Token::IsNull => {
                if i == 0 || !matches!(tokens[i - 1], Token::Field(_)) {
                    return Err(FilterError::Validate(
                        "IS NULL must be preceded by a field".into(),
                    ));
                }
            }
            Token::Like => {
                if i == 0 || !matches!(tokens[i - 1], Token::Field(_)) {
                    return Err(FilterError::Validate(
                        "LIKE must be preceded by a field".into(),
                    ));
                }
            }
            _ => {}
        }
        i += 1;
    }
    if depth != 0 {
        return Err(FilterError::Validate("unbalanced parentheses".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_comparison() {
        let tokens = tokenize("foo == 123").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("foo".into()),
                Token::Op(CmpOp::Eq),
                Token::Number("123".into()),
            ]
        );
    }

    #[test]
    fn test_longest_match_wins() {
        let tokens = tokenize("a >= 2").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("a".into()),
                Token::Op(CmpOp::Ge),
                Token::Number("2".into()),
            ]
        );
    }

    #[test]
    fn test_double_quoted_string() {
        let tokens = tokenize(r#"name == "hello world""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("name".into()),
                Token::Op(CmpOp::Eq),
                Token::StringLit("hello world".into()),
            ]
        );
    }

    #[test]
    fn test_single_quoted_string_rebalanced() {
        let tokens = tokenize("name == 'hello world'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("name".into()),
                Token::Op(CmpOp::Eq),
                Token::StringLit("hello world".into()),
            ]
        );
    }

    #[test]
    fn test_escaped_single_quote() {
        let tokens = tokenize(r"name == 'it\'s'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("name".into()),
                Token::Op(CmpOp::Eq),
                Token::StringLit("it's".into()),
            ]
        );
    }

    #[test]
    fn test_is_null_single_token() {
        let tokens = tokenize("x IS NULL").unwrap();
        assert_eq!(tokens, vec![Token::Field("x".into()), Token::IsNull]);
    }

    #[test]
    fn test_in_list() {
        let tokens = tokenize("x IN (1, 2)").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("x".into()),
                Token::In,
                Token::LParen,
                Token::Number("1".into()),
                Token::Comma,
                Token::Number("2".into()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_negative_number() {
        let tokens = tokenize("a == -5").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Field("a".into()),
                Token::Op(CmpOp::Eq),
                Token::Number("-5".into()),
            ]
        );
    }

    #[test]
    fn test_empty_expression() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_validate_accepts_valid() {
        let cases = [
            "a == 1",
            "a == 1 AND b == 2",
            "(a == 1) AND (b == 2)",
            "a IN (1, 2, \"three\")",
            "a IS NULL OR b LIKE \"x%\"",
            "NOT a == 1",
            "((a == 1))",
        ];
        for case in cases {
            let tokens = tokenize(case).unwrap();
            validate(&tokens).unwrap_or_else(|e| panic!("{case}: {e}"));
        }
    }

    #[test]
    fn test_validate_rejects_unbalanced() {
        let tokens = tokenize("(a == 1").unwrap();
        assert!(validate(&tokens).is_err());
        let tokens = tokenize("a == 1)").unwrap();
        assert!(validate(&tokens).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_in_list() {
        let tokens = tokenize("a IN ()").unwrap();
        assert!(validate(&tokens).is_err());
    }

    #[test]
    fn test_validate_rejects_dangling_and() {
        let tokens = tokenize("a == 1 AND").unwrap();
        assert!(validate(&tokens).is_err());
    }

    #[test]
    fn test_validate_rejects_is_null_without_field() {
        let tokens = tokenize("IS NULL").unwrap();
        assert!(validate(&tokens).is_err());
    }
}
