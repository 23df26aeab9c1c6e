//! Streams one table out of the shared snapshot connection into a writer.

use crate::codec::RowWriter;
use crate::db::{quote_ident, TableInfo};
use crate::error::{Error, Result};
use crate::stats::TableStats;
use crossbeam::channel::bounded;
use mysql::prelude::Queryable;
use mysql::Conn;
use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// Rows buffered between the fetching producer and the encoding consumer.
const ROW_QUEUE_DEPTH: usize = 1024;

/// Dumper for a single table. Stateless apart from its counters, so the
/// pool can run many of them concurrently against distinct tables.
pub struct TableDumper<'a> {
    info: &'a TableInfo,
    header: bool,
}

impl<'a> TableDumper<'a> {
    pub fn new(info: &'a TableInfo, header: bool) -> Self {
        Self { info, header }
    }

    /// Stream `SELECT *` through the codec into `out`.
    ///
    /// The SELECT and row fetch run on a producer thread that holds the
    /// snapshot-connection lock; encoding and compression happen on the
    /// calling thread. Statement execution therefore serialises across
    /// tables while the write side stays parallel.
    pub fn run<W: Write>(&self, snapshot: &Mutex<Conn>, out: W) -> Result<TableStats> {
        let start = Instant::now();
        let classes = self.info.classes();
        let names = self.info.column_names();
        let table = self.info.name.as_str();

        let mut writer = RowWriter::new(out);
        let (tx, rx) = bounded::<Vec<Option<Vec<u8>>>>(ROW_QUEUE_DEPTH);

        let rows = std::thread::scope(|scope| -> Result<u64> {
            let producer = scope.spawn(move || -> Result<()> {
                let mut conn = snapshot.lock().unwrap();
                let query = format!("SELECT * FROM {}", quote_ident(table));
                let result = conn.query_iter(query).map_err(Error::Query)?;
                for row in result {
                    let row = row.map_err(Error::Query)?;
                    let fields: Vec<Option<Vec<u8>>> =
                        row.unwrap().into_iter().map(value_bytes).collect();
                    if tx.send(fields).is_err() {
                        break; // consumer gave up
                    }
                }
                Ok(())
            });

            if self.header {
                writer.write_header(&names)?;
            }
            let mut rows = 0u64;
            // Consume the receiver by value: if encoding fails, dropping it
            // unblocks the producer so the scope can join.
            for fields in rx {
                if fields.len() != classes.len() {
                    return Err(Error::Codec(format!(
                        "table {table}: result returned {} columns, descriptor has {}",
                        fields.len(),
                        classes.len()
                    )));
                }
                writer.write_row(&fields, &classes)?;
                rows += 1;
            }

            match producer.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            }
            Ok(rows)
        })?;

        let stats = TableStats {
            rows,
            bytes: writer.bytes_written(),
            duration: start.elapsed(),
        };
        debug!(
            table,
            rows = stats.rows,
            bytes = stats.bytes,
            "table dump finished"
        );
        Ok(stats)
    }
}

/// Raw bytes of one column value as the text protocol delivered it. The
/// non-bytes variants only show up with binary-protocol results, but are
/// rendered anyway so the codec always sees the server's textual form.
fn value_bytes(value: mysql::Value) -> Option<Vec<u8>> {
    use mysql::Value;
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(bytes),
        Value::Int(i) => Some(i.to_string().into_bytes()),
        Value::UInt(u) => Some(u.to_string().into_bytes()),
        Value::Float(f) => Some(f.to_string().into_bytes()),
        Value::Double(d) => Some(d.to_string().into_bytes()),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if micros == 0 {
                Some(
                    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
                        .into_bytes(),
                )
            } else {
                Some(
                    format!(
                        "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
                    )
                    .into_bytes(),
                )
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = u32::from(hours) + days * 24;
            if micros == 0 {
                Some(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}").into_bytes())
            } else {
                Some(
                    format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
                        .into_bytes(),
                )
            }
        }
    }
}
