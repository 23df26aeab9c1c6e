use super::ConnArgs;
use crate::dir_restorer::{DirRestorer, RestoreConfig};
use crate::error::Error;
use crate::filter::FilterSet;
use crate::pool::WorkerPool;
use crate::storage::Location;
use crossbeam::channel::bounded;
use mysql::Pool;
use serde::Serialize;
use std::time::Instant;
use tracing::info;

#[derive(Serialize)]
struct RestoreJsonOutput {
    source: String,
    streams: usize,
    dry_run: bool,
    statistics: RestoreStatistics,
    tables: Vec<String>,
}

#[derive(Serialize)]
struct RestoreStatistics {
    tables_restored: u64,
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
    filter: Option<String>,
    streams: Option<usize>,
    create_tables: bool,
    truncate_tables: bool,
    dry_run: bool,
    sftp_insecure: bool,
    progress: bool,
    json: bool,
) -> anyhow::Result<()> {
    let streams = super::resolve_streams(streams);
    let source = Location::parse(&dir, sftp_insecure)?;

    // A broken filter expression aborts the whole run before any table is
    // touched.
    let filters = match &filter {
        Some(expression) => FilterSet::parse(expression)?,
        None => FilterSet::default(),
    };

    // Every pooled connection comes up with foreign-key checks already
    // disabled, so workers can insert in any table order.
    let opts = conn.to_opts(vec!["SET FOREIGN_KEY_CHECKS = 0".to_string()]);
    let pool = Pool::new(opts).map_err(Error::Connect)?;

    let restorer = DirRestorer::new(
        source,
        pool,
        conn.database.clone(),
        filters,
        RestoreConfig {
            create_tables,
            truncate_tables,
            dry_run,
        },
    )?;
    restorer.prepare()?;

    let selected = super::select_tables(
        restorer.tables(),
        tables.as_deref(),
        skip_tables.as_deref(),
    );
    if selected.is_empty() {
        anyhow::bail!("no tables to restore");
    }
    info!(tables = selected.len(), streams, dry_run, "starting restore");

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
    });

    WorkerPool::new(streams).run(rx, |table: String| {
        restorer.restore(&table);
        pb.inc(1);
    });
    let _ = producer.join();
    pb.finish_and_clear();

    restorer.finish()?;

    let stats = restorer.stats();
    let elapsed = start.elapsed();
    if json {
        let output = RestoreJsonOutput {
            source: dir,
            streams,
            dry_run,
            statistics: RestoreStatistics {
                tables_restored: stats.tables,
                rows: stats.rows,
                bytes: stats.bytes,
                elapsed_secs: elapsed.as_secs_f64(),
            },
            tables: selected,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Restored {} tables ({} rows, {} bytes) using {} streams in {:.2?} (cumulative table time {:.2?})",
            stats.tables, stats.rows, stats.bytes, streams, elapsed, stats.busy
        );
    }
    Ok(())
}
