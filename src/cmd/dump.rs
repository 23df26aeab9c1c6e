use super::ConnArgs;
use crate::db::DbInfo;
use crate::dir_dumper::{DirDumper, DumpConfig};
use crate::error::Error;
use crate::pool::WorkerPool;
use crate::storage::{DumpCompression, Location};
use crossbeam::channel::bounded;
use mysql::Conn;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

#[derive(Serialize)]
struct DumpJsonOutput {
    destination: String,
    compression: String,
    streams: usize,
    statistics: DumpStatistics,
    tables: Vec<String>,
}

#[derive(Serialize)]
struct DumpStatistics {
    tables_dumped: u64,
    rows: u64,
    bytes: u64,
    elapsed_secs: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    conn: ConnArgs,
    dir: String,
    tables: Option<String>,
    skip_tables: Option<String>,
    streams: Option<usize>,
    compression: String,
    no_header: bool,
    post_file_cmd: Option<String>,
    sftp_insecure: bool,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    let compression: DumpCompression = compression
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let streams = super::resolve_streams(streams);

    let dest = Location::parse(&dir, sftp_insecure)?;
    dest.ensure_dir()?;

    let mut db = DbInfo::connect(conn.to_opts(Vec::new()))?;
    let selected = super::select_tables(
        db.tables()?,
        tables.as_deref(),
        skip_tables.as_deref(),
    );
    if selected.is_empty() {
        anyhow::bail!("no tables to dump");
    }

    // Descriptors and CREATE statements come from the introspection
    // connection, up front, so workers never touch it.
    let mut infos = Vec::with_capacity(selected.len());
    let mut creates = Vec::with_capacity(selected.len());
    for table in &selected {
        infos.push(db.table_info(table)?);
        creates.push((table.clone(), db.show_create(table)?));
    }
    let backup_locks = db.has_backup_lock();

    let snapshot = Conn::new(conn.to_opts(Vec::new())).map_err(Error::Connect)?;
    let dumper = DirDumper::new(
        dest,
        snapshot,
        infos,
        DumpConfig {
            compression,
            header: !no_header,
            post_file_cmd,
        },
    );
    dumper.write_schema(&creates)?;
    dumper.bootstrap_snapshot(backup_locks)?;
    info!(
        tables = selected.len(),
        streams, %compression, "starting dump"
    );

    let start = Instant::now();
    let pb = super::table_progress(progress && !json, selected.len() as u64);

    let (tx, rx) = bounded::<String>(0);
    let names = selected.clone();
    let producer = std::thread::spawn(move || {
        for name in names {
            if tx.send(name).is_err() {
                break;
            }
        }
        // Dropping the sender closes the job stream.
    });

    WorkerPool::new(streams).run(rx, |table: String| {
        dumper.dump(&table);
        pb.inc(1);
    });
    let _ = producer.join();
    pb.finish_and_clear();

    let stats = dumper.stats();
    let elapsed = start.elapsed();
    let selected_len = selected.len() as u64;
    if json {
        let output = DumpJsonOutput {
            destination: dir,
            compression: compression.to_string(),
            streams,
            statistics: DumpStatistics {
                tables_dumped: stats.tables,
                rows: stats.rows,
                bytes: stats.bytes,
                elapsed_secs: elapsed.as_secs_f64(),
            },
            tables: selected,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Dumped {} tables ({} rows, {} bytes) using {} streams in {:.2?} (cumulative table time {:.2?})",
            stats.tables, stats.rows, stats.bytes, streams, elapsed, stats.busy
        );
    }
    if stats.tables < selected_len {
        anyhow::bail!(
            "{} of {} tables failed to dump",
            selected_len - stats.tables,
            selected_len
        );
    }
    Ok(())
}
