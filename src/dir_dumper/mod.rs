//! Directory-level dump orchestration: owns the shared snapshot
//! connection, hands each worker a compressed writer, and aggregates
//! statistics.

use crate::db::{quote_ident, TableInfo};
use crate::error::{Error, Result};
use crate::stats::{RunStats, TableStats};
use crate::storage::{DumpCompression, Location};
use crate::table_dumper::TableDumper;
use ahash::AHashMap;
use mysql::prelude::Queryable;
use mysql::Conn;
use std::io::Write;
use std::process::Command;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DumpConfig {
    pub compression: DumpCompression,
    /// Write the back-tick header line into each file.
    pub header: bool,
    /// Shell command template run after each file finalises;
    /// `%FILE_NAME%` and `%FILE_PATH%` are substituted literally.
    pub post_file_cmd: Option<String>,
}

pub struct DirDumper {
    dest: Location,
    snapshot: Mutex<Conn>,
    tables: AHashMap<String, TableInfo>,
    config: DumpConfig,
    stats: Mutex<RunStats>,
}

impl DirDumper {
    pub fn new(
        dest: Location,
        snapshot: Conn,
        tables: Vec<TableInfo>,
        config: DumpConfig,
    ) -> Self {
        Self {
            dest,
            snapshot: Mutex::new(snapshot),
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            config,
            stats: Mutex::new(RunStats::default()),
        }
    }

    /// Take the point-in-time cut on the shared connection. Must complete
    /// before any worker issues its first SELECT.
    ///
    /// With backup locks available the sequence is lock, snapshot, unlock:
    /// releasing after the snapshot yields a consistent view without
    /// blocking writes for the rest of the dump. Without them the snapshot
    /// alone is still consistent for transactional tables.
    pub fn bootstrap_snapshot(&self, backup_locks: bool) -> Result<()> {
        let mut conn = self.snapshot.lock().unwrap();
        if backup_locks {
            conn.query_drop("LOCK TABLES FOR BACKUP")
                .map_err(Error::Snapshot)?;
            conn.query_drop("LOCK BINLOG FOR BACKUP")
                .map_err(Error::Snapshot)?;
        }
        conn.query_drop("START TRANSACTION WITH CONSISTENT SNAPSHOT")
            .map_err(Error::Snapshot)?;
        if backup_locks {
            conn.query_drop("UNLOCK BINLOG").map_err(Error::Snapshot)?;
            conn.query_drop("UNLOCK TABLES").map_err(Error::Snapshot)?;
        }
        info!(backup_locks, "consistent snapshot started");
        Ok(())
    }

    /// Write the schema.sql companion from `SHOW CREATE TABLE` output.
    pub fn write_schema(&self, creates: &[(String, String)]) -> Result<()> {
        let mut out = self.dest.create("schema.sql")?;
        for (table, create) in creates {
            writeln!(out, "DROP TABLE IF EXISTS {};", quote_ident(table))?;
            writeln!(out, "{};", create.trim_end_matches(';'))?;
            writeln!(out)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Worker entry point. Per-table failures are logged; the run
    /// continues with the remaining tables.
    pub fn dump(&self, table: &str) {
        let Some(info) = self.tables.get(table) else {
            warn!(table, "no descriptor for table, skipping");
            return;
        };
        let file_name = format!("{}.csjson.{}", table, self.config.compression.ext());
        match self.dump_table(info, &file_name) {
            Ok(stats) => {
                info!(
                    table,
                    rows = stats.rows,
                    bytes = stats.bytes,
                    duration = ?stats.duration,
                    "dumped table"
                );
                self.stats.lock().unwrap().add(&stats);
                self.run_post_hook(&file_name);
            }
            Err(e) => error!(table, error = %format!("{e:#}"), "error dumping table"),
        }
    }

    fn dump_table(&self, info: &TableInfo, file_name: &str) -> Result<TableStats> {
        let raw = self.dest.create(file_name)?;
        let mut writer = self.config.compression.wrap(raw);
        let stats = TableDumper::new(info, self.config.header).run(&self.snapshot, &mut writer)?;
        writer.finish()?;
        Ok(stats)
    }

    /// Fire-and-forget shell hook after a file finalises.
    fn run_post_hook(&self, file_name: &str) {
        let Some(template) = &self.config.post_file_cmd else {
            return;
        };
        let command = template
            .replace("%FILE_NAME%", file_name)
            .replace("%FILE_PATH%", &self.dest.file_path(file_name));
        match Command::new("sh").arg("-c").arg(&command).spawn() {
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => warn!(command, error = %e, "failed to spawn post-file command"),
        }
    }

    pub fn stats(&self) -> RunStats {
        *self.stats.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_hook_substitution() {
        let template = "upload %FILE_NAME% from %FILE_PATH%";
        let dest = Location::Local(std::path::PathBuf::from("/backups"));
        let substituted = template
            .replace("%FILE_NAME%", "t.csjson.bz2")
            .replace("%FILE_PATH%", &dest.file_path("t.csjson.bz2"));
        assert_eq!(
            substituted,
            "upload t.csjson.bz2 from /backups/t.csjson.bz2"
        );
    }

    #[test]
    fn test_file_naming() {
        for (compression, expect) in [
            (DumpCompression::Bzip2, "users.csjson.bz2"),
            (DumpCompression::Gzip, "users.csjson.gz"),
        ] {
            assert_eq!(format!("users.csjson.{}", compression.ext()), expect);
        }
    }
}
