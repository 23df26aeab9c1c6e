//! The csjson row codec: comma-separated JSON values, one row per line.
//!
//! A dump file's plaintext is an optional back-tick header line followed by
//! data lines. Within a line, columns are separated by single commas; a SQL
//! NULL is the empty token between separators, numeric columns carry the
//! server's textual representation verbatim, and string/binary columns are
//! JSON-encoded strings. Newlines inside values only ever appear as `\n`
//! escape sequences inside a JSON string, so the format stays line-oriented.

use crate::db::ColumnClass;
use crate::error::{Error, Result};
use std::io::{BufReader, Read, Write};

/// A dynamically typed column value as it exists after parsing a dump line.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Human-readable type name, used in filter error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Writes rows in the csjson format, counting plaintext bytes as it goes.
pub struct RowWriter<W: Write> {
    out: W,
    bytes: u64,
}

impl<W: Write> RowWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, bytes: 0 }
    }

    /// Write the optional header line: back-tick-quoted column names.
    pub fn write_header(&mut self, columns: &[String]) -> std::io::Result<()> {
        let mut line = String::new();
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push('`');
            line.push_str(col);
            line.push('`');
        }
        line.push('\n');
        self.out.write_all(line.as_bytes())?;
        self.bytes += line.len() as u64;
        Ok(())
    }

    /// Write one row. `fields` holds the raw value bytes the server sent
    /// (`None` for NULL); `classes` decides per column how they are emitted.
    pub fn write_row(
        &mut self,
        fields: &[Option<Vec<u8>>],
        classes: &[ColumnClass],
    ) -> std::io::Result<()> {
        debug_assert_eq!(fields.len(), classes.len());
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                self.out.write_all(b",")?;
                self.bytes += 1;
            }
            let Some(raw) = field else {
                continue; // NULL: empty token
            };
            match classes[i] {
                ColumnClass::Numeric => {
                    self.out.write_all(raw)?;
                    self.bytes += raw.len() as u64;
                }
                ColumnClass::String | ColumnClass::Binary => {
                    let text = String::from_utf8_lossy(raw);
                    let encoded =
                        serde_json::to_vec(text.as_ref()).map_err(std::io::Error::other)?;
                    self.out.write_all(&encoded)?;
                    self.bytes += encoded.len() as u64;
                }
            }
        }
        self.out.write_all(b"\n")?;
        self.bytes += 1;
        Ok(())
    }

    /// Plaintext bytes written so far (pre-compression).
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Parses a decompressed csjson stream back into rows of [`Value`]s.
///
/// Byte-level state machine: `"` opens a quoted region (inside it a
/// backslash escapes the following character, tracked as an odd/even
/// toggle), `,` outside quotes ends a column, `\n` outside quotes ends the
/// row. An empty raw token decodes to NULL; any other token must parse as a
/// JSON number, boolean, or string.
pub struct RowReader<R: Read> {
    input: BufReader<R>,
    bytes: u64,
    started: bool,
}

impl<R: Read> RowReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
            bytes: 0,
            started: false,
        }
    }

    /// Plaintext bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    fn next_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            return match self.input.read(&mut buf) {
                Ok(0) => Ok(None),
                Ok(_) => {
                    self.bytes += 1;
                    Ok(Some(buf[0]))
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
        }
    }

    /// Header detection: if the first non-whitespace byte is a back-tick the
    /// whole line is discarded. Otherwise the byte belongs to the first row
    /// and is handed back for normal parsing.
    fn skip_header(&mut self) -> Result<Option<u8>> {
        loop {
            let Some(b) = self.next_byte()? else {
                return Ok(None);
            };
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => continue,
                b'`' => {
                    while let Some(b) = self.next_byte()? {
                        if b == b'\n' {
                            break;
                        }
                    }
                    return Ok(None);
                }
                other => return Ok(Some(other)),
            }
        }
    }

    /// Read the next row, or `None` at end of stream. A trailing partial
    /// line with no terminating newline is discarded.
    pub fn read_row(&mut self) -> Result<Option<Vec<Value>>> {
        let mut pending: Option<u8> = None;
        if !self.started {
            self.started = true;
            pending = self.skip_header()?;
        }

        let mut columns: Vec<Value> = Vec::new();
        let mut column: Vec<u8> = Vec::new();
        let mut in_quotes = false;
        let mut escaped = false;

        loop {
            let b = match pending.take() {
                Some(b) => b,
                None => match self.next_byte()? {
                    Some(b) => b,
                    None => return Ok(None), // EOF: drop unterminated partial row
                },
            };
            if in_quotes {
                column.push(b);
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_quotes = false;
                }
                continue;
            }
            match b {
                b'"' if !escaped => {
                    column.push(b);
                    in_quotes = true;
                }
                b'\\' => {
                    column.push(b);
                    escaped = !escaped;
                }
                b',' => {
                    columns.push(decode_token(&column)?);
                    column.clear();
                    escaped = false;
                }
                b'\n' => {
                    columns.push(decode_token(&column)?);
                    return Ok(Some(columns));
                }
                other => {
                    column.push(other);
                    escaped = false;
                }
            }
        }
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// Decode one raw column token. Empty means NULL; everything else must be a
/// JSON number (i64 preferred, f64 fallback), boolean, or string.
fn decode_token(raw: &[u8]) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    // Bare numeric tokens carry the server's textual representation
    // verbatim, which for ZEROFILL columns has leading zeros that strict
    // JSON number grammar rejects.
    if let Some(value) = decode_bare_number(raw) {
        return Ok(value);
    }
    let parsed: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| Error::Codec(format!("invalid token {:?}: {e}", String::from_utf8_lossy(raw))))?;
    match parsed {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(Error::Codec(format!("number out of range: {n}")))
            }
        }
        serde_json::Value::String(s) => Ok(Value::Str(s)),
        other => Err(Error::Codec(format!(
            "unexpected token type: {}",
            match other {
                serde_json::Value::Array(_) => "array",
                serde_json::Value::Object(_) => "object",
                _ => "unknown",
            }
        ))),
    }
}

/// Parse a token consisting only of digits and dots (with an optional
/// leading minus) as a number, i64 preferred. Anything else, including
/// exponent forms, stays on the JSON path.
fn decode_bare_number(raw: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(raw).ok()?;
    let body = text.strip_prefix('-').unwrap_or(text);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    text.parse::<f64>().ok().map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnClass::{Binary, Numeric, String as Str};

    fn write_rows(rows: &[&[Option<&str>]], classes: &[ColumnClass]) -> Vec<u8> {
        let mut writer = RowWriter::new(Vec::new());
        for row in rows {
            let fields: Vec<Option<Vec<u8>>> = row
                .iter()
                .map(|f| f.map(|s| s.as_bytes().to_vec()))
                .collect();
            writer.write_row(&fields, classes).unwrap();
        }
        writer.into_inner()
    }

    fn read_all(data: &[u8]) -> Vec<Vec<Value>> {
        RowReader::new(data).collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_null_and_numeric_line_format() {
        let out = write_rows(&[&[Some("1"), None, Some("3.14")]], &[Numeric, Str, Numeric]);
        assert_eq!(out, b"1,,3.14\n");
    }

    #[test]
    fn test_null_and_numeric_round_trip() {
        let rows = read_all(b"1,,3.14\n");
        assert_eq!(
            rows,
            vec![vec![Value::Int(1), Value::Null, Value::Float(3.14)]]
        );
    }

    #[test]
    fn test_string_with_comma_and_newline_stays_on_one_line() {
        let out = write_rows(&[&[Some("hello,\nworld")]], &[Str]);
        assert_eq!(out, b"\"hello,\\nworld\"\n");

        let rows = read_all(&out);
        assert_eq!(rows, vec![vec![Value::Str("hello,\nworld".into())]]);
    }

    #[test]
    fn test_escaped_quote_round_trip() {
        let out = write_rows(&[&[Some(r#"say "hi" \ bye"#)]], &[Str]);
        let rows = read_all(&out);
        assert_eq!(rows, vec![vec![Value::Str(r#"say "hi" \ bye"#.into())]]);
    }

    #[test]
    fn test_numeric_text_preserved_digit_for_digit() {
        let out = write_rows(
            &[&[Some("00042"), Some("-7"), Some("1.2300")]],
            &[Numeric, Numeric, Numeric],
        );
        assert_eq!(out, b"00042,-7,1.2300\n");

        // The ZEROFILL-style text must parse back, not trip the strict
        // JSON number grammar.
        let rows = read_all(&out);
        assert_eq!(
            rows,
            vec![vec![Value::Int(42), Value::Int(-7), Value::Float(1.23)]]
        );
    }

    #[test]
    fn test_leading_zero_integer_round_trips() {
        let rows = read_all(b"007,00.50\n");
        assert_eq!(rows, vec![vec![Value::Int(7), Value::Float(0.5)]]);
    }

    #[test]
    fn test_binary_round_trip() {
        let out = write_rows(&[&[Some("\x01\x02abc")]], &[Binary]);
        let rows = read_all(&out);
        assert_eq!(rows, vec![vec![Value::Str("\x01\x02abc".into())]]);
    }

    #[test]
    fn test_header_line_is_skipped() {
        let data = b"`a`,`b`\n1,2\n";
        let rows = read_all(data);
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(2)]]);
    }

    #[test]
    fn test_header_tolerance_same_rows_either_way() {
        let with = read_all(b"`a`,`b`\n1,\"x\"\n,2\n");
        let without = read_all(b"1,\"x\"\n,2\n");
        assert_eq!(with, without);
    }

    #[test]
    fn test_header_writer_format() {
        let mut writer = RowWriter::new(Vec::new());
        writer
            .write_header(&["id".to_string(), "name".to_string()])
            .unwrap();
        assert_eq!(writer.into_inner(), b"`id`,`name`\n");
    }

    #[test]
    fn test_empty_stream() {
        assert!(read_all(b"").is_empty());
        assert!(read_all(b"`a`\n").is_empty());
    }

    #[test]
    fn test_empty_line_mid_stream_is_single_null() {
        let rows = read_all(b"1\n\n2\n");
        assert_eq!(
            rows,
            vec![vec![Value::Int(1)], vec![Value::Null], vec![Value::Int(2)]]
        );
    }

    #[test]
    fn test_booleans_parse() {
        let rows = read_all(b"true,false\n");
        assert_eq!(rows, vec![vec![Value::Bool(true), Value::Bool(false)]]);
    }

    #[test]
    fn test_int_preferred_over_float() {
        let rows = read_all(b"5,5.0\n");
        assert_eq!(rows, vec![vec![Value::Int(5), Value::Float(5.0)]]);
    }

    #[test]
    fn test_malformed_token_is_fatal() {
        let mut reader = RowReader::new(&b"{bogus}\n"[..]);
        assert!(matches!(reader.read_row(), Err(Error::Codec(_))));
    }

    #[test]
    fn test_partial_trailing_line_discarded() {
        let rows = read_all(b"1,2\n3,4");
        assert_eq!(rows, vec![vec![Value::Int(1), Value::Int(2)]]);
    }

    #[test]
    fn test_bytes_counted() {
        let mut reader = RowReader::new(&b"1,2\n"[..]);
        while reader.read_row().unwrap().is_some() {}
        assert_eq!(reader.bytes_read(), 4);
    }

    #[test]
    fn test_round_trip_through_bzip2() {
        use std::io::Write as _;
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        let plain = write_rows(
            &[&[Some("1"), Some("a,\"b\""), None], &[Some("2"), None, Some("z")]],
            &[Numeric, Str, Str],
        );
        encoder.write_all(&plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let decoder = bzip2::read::BzDecoder::new(&compressed[..]);
        let rows = RowReader::new(decoder).collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Str("a,\"b\"".into()), Value::Null],
                vec![Value::Int(2), Value::Null, Value::Str("z".into())],
            ]
        );
    }
}
