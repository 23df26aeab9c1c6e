//! Replays one parsed dump stream into a table via prepared inserts.

use crate::codec::{RowReader, Value};
use crate::db::quote_ident;
use crate::error::{Error, Result};
use crate::filter::{Filter, Row};
use crate::stats::TableStats;
use crossbeam::channel::bounded;
use mysql::prelude::Queryable;
use mysql::{Conn, Statement};
use std::io::Read;
use std::time::Instant;
use tracing::{debug, warn};

/// Rows buffered between the parsing producer and the inserting consumer.
const ROW_QUEUE_DEPTH: usize = 1024;

/// Restorer for a single table. The column list comes from the schema
/// file and is authoritative: it dictates both the insert statement and
/// the positional meaning of every parsed row.
pub struct TableRestorer<'a> {
    table: String,
    columns: Vec<String>,
    query: String,
    filter: Option<&'a Filter>,
    dry_run: bool,
}

impl<'a> TableRestorer<'a> {
    pub fn new(
        table: &str,
        columns: Vec<String>,
        filter: Option<&'a Filter>,
        dry_run: bool,
    ) -> Self {
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        let placeholders = vec!["?"; columns.len()].join(",");
        let query = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list,
            placeholders
        );
        Self {
            table: table.to_string(),
            columns,
            query,
            filter,
            dry_run,
        }
    }

    /// The insert statement this restorer prepares, composed exactly once.
    pub fn insert_statement(&self) -> &str {
        &self.query
    }

    /// Parse the stream and insert its rows. The row parser runs as a
    /// background producer; parse errors are fatal for the table, per-row
    /// insert errors are logged and skipped.
    pub fn run<R: Read + Send>(&self, input: R, conn: &mut Conn) -> Result<TableStats> {
        debug!(table = %self.table, query = %self.query, "restoring table");
        let start = Instant::now();
        let (tx, rx) = bounded::<Vec<Value>>(ROW_QUEUE_DEPTH);

        let (rows, bytes) = std::thread::scope(|scope| -> Result<(u64, u64)> {
            let producer = scope.spawn(move || -> Result<u64> {
                let mut reader = RowReader::new(input);
                while let Some(row) = reader.read_row()? {
                    if tx.send(row).is_err() {
                        break; // consumer gave up
                    }
                }
                Ok(reader.bytes_read())
            });

            // Created lazily so an empty file never prepares anything.
            let mut statement: Option<Statement> = None;
            let mut rows = 0u64;
            // Consume the receiver by value: if the insert side fails,
            // dropping it unblocks the parser so the scope can join.
            for row in rx {
                if row.len() != self.columns.len() {
                    warn!(
                        table = %self.table,
                        expected = self.columns.len(),
                        got = row.len(),
                        "column count mismatch, skipping row"
                    );
                    continue;
                }
                if let Some(filter) = self.filter {
                    let mapped: Row = self
                        .columns
                        .iter()
                        .zip(row.iter())
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    match filter.value(&mapped) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(e) => {
                            warn!(table = %self.table, error = %e, "filter failed, skipping row");
                            continue;
                        }
                    }
                }
                if self.dry_run {
                    println!("{}", self.render_sql(&row));
                    rows += 1;
                    continue;
                }
                if statement.is_none() {
                    statement = Some(conn.prep(&self.query).map_err(Error::Query)?);
                }
                if let Some(stmt) = statement.as_ref() {
                    let params: Vec<mysql::Value> = row.iter().map(sql_value).collect();
                    match conn.exec_drop(stmt, params) {
                        Ok(()) => rows += 1,
                        Err(e) => {
                            warn!(table = %self.table, error = %e, "insert failed, skipping row");
                        }
                    }
                }
            }

            let bytes = match producer.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            if let Some(stmt) = statement.take() {
                let _ = conn.close(stmt);
            }
            Ok((rows, bytes))
        })?;

        Ok(TableStats {
            rows,
            bytes,
            duration: start.elapsed(),
        })
    }

    /// Render one row as a literal INSERT for dry-run diagnostics.
    fn render_sql(&self, row: &[Value]) -> String {
        let values = row
            .iter()
            .map(sql_literal)
            .collect::<Vec<_>>()
            .join(",");
        let columns = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns,
            values
        )
    }
}

fn sql_value(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Int(i) => mysql::Value::Int(*i),
        Value::Float(f) => mysql::Value::Double(*f),
        Value::Bool(b) => mysql::Value::Int(i64::from(*b)),
        Value::Str(s) => mysql::Value::Bytes(s.clone().into_bytes()),
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_composition() {
        let restorer = TableRestorer::new(
            "users",
            vec!["id".into(), "name".into(), "age".into()],
            None,
            false,
        );
        assert_eq!(
            restorer.insert_statement(),
            "INSERT INTO `users` (`id`,`name`,`age`) VALUES (?,?,?)"
        );
    }

    #[test]
    fn test_render_sql_literals() {
        let restorer = TableRestorer::new("t", vec!["a".into(), "b".into(), "c".into()], None, true);
        let row = vec![Value::Int(1), Value::Null, Value::Str("it's".into())];
        assert_eq!(
            restorer.render_sql(&row),
            r"INSERT INTO `t` (`a`,`b`,`c`) VALUES (1,NULL,'it\'s')"
        );
    }

    #[test]
    fn test_sql_value_conversion() {
        assert_eq!(sql_value(&Value::Null), mysql::Value::NULL);
        assert_eq!(sql_value(&Value::Int(5)), mysql::Value::Int(5));
        assert_eq!(sql_value(&Value::Bool(true)), mysql::Value::Int(1));
        assert_eq!(
            sql_value(&Value::Str("x".into())),
            mysql::Value::Bytes(b"x".to_vec())
        );
    }
}
