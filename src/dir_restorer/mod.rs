//! Directory-level restore orchestration: file discovery, decompressor
//! selection, table creation/truncation, and statistics aggregation.

use crate::db::quote_ident;
use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::schema;
use crate::stats::{RunStats, TableStats};
use crate::storage::{Compression, Location};
use crate::table_restorer::TableRestorer;
use mysql::prelude::Queryable;
use mysql::{Pool, PooledConn};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct RestoreConfig {
    /// Create missing tables from the schema.sql companion.
    pub create_tables: bool,
    /// Truncate existing tables before inserting.
    pub truncate_tables: bool,
    /// Print rendered INSERT statements instead of executing them.
    pub dry_run: bool,
}

pub struct DirRestorer {
    source: Location,
    schema: String,
    pool: Pool,
    db_name: String,
    filters: FilterSet,
    config: RestoreConfig,
    stats: std::sync::Mutex<RunStats>,
}

impl DirRestorer {
    /// Open the source directory and read the schema.sql companion. The
    /// pool's connections must come up with foreign-key checks disabled
    /// (set through the connection init command).
    pub fn new(
        source: Location,
        pool: Pool,
        db_name: String,
        filters: FilterSet,
        config: RestoreConfig,
    ) -> Result<Self> {
        let schema = source.read_to_string("schema.sql")?;
        Ok(Self {
            source,
            schema,
            pool,
            db_name,
            filters,
            config,
            stats: std::sync::Mutex::new(RunStats::default()),
        })
    }

    /// Every table the schema file defines, the default restore set.
    pub fn tables(&self) -> Vec<String> {
        schema::find_tables(&self.schema)
    }

    /// Session preparation: foreign-key checks off for the run.
    pub fn prepare(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().map_err(Error::Connect)?;
        conn.query_drop("SET SESSION FOREIGN_KEY_CHECKS = 0")
            .map_err(Error::Query)?;
        Ok(())
    }

    /// Re-enable foreign-key checks once every worker is done.
    pub fn finish(&self) -> Result<()> {
        let mut conn = self.pool.get_conn().map_err(Error::Connect)?;
        conn.query_drop("SET SESSION FOREIGN_KEY_CHECKS = 1")
            .map_err(Error::Query)?;
        Ok(())
    }

    /// Worker entry point. Missing or ambiguous files and per-table
    /// failures are logged; the run continues.
    pub fn restore(&self, table: &str) {
        match self.restore_table(table) {
            Ok(Some(stats)) => {
                info!(
                    table,
                    rows = stats.rows,
                    bytes = stats.bytes,
                    duration = ?stats.duration,
                    "restored table"
                );
                self.stats.lock().unwrap().add(&stats);
            }
            Ok(None) => {}
            Err(e) => error!(table, error = %format!("{e:#}"), "error restoring table"),
        }
    }

    fn restore_table(&self, table: &str) -> Result<Option<TableStats>> {
        let matches = self.source.list(table)?;
        let file_name = match matches.as_slice() {
            [] => {
                warn!(table, "file for table not found, skipping");
                return Ok(None);
            }
            [single] => single.clone(),
            many => {
                warn!(
                    table,
                    candidates = %many.join(", "),
                    "multiple potential files for table, skipping"
                );
                return Ok(None);
            }
        };

        let compression = Compression::from_name(&file_name);
        if compression == Compression::None {
            warn!(
                table,
                file = %file_name,
                "could not detect compression format, skipping"
            );
            return Ok(None);
        }

        let mut conn = self.pool.get_conn().map_err(Error::Connect)?;
        if !self.ensure_table(&mut conn, table)? {
            return Ok(None);
        }

        let columns = schema::find_table_columns(&self.schema, table);
        if columns.is_empty() {
            warn!(table, "no columns found in schema file, skipping");
            return Ok(None);
        }

        let reader = compression.wrap_reader(self.source.open(&file_name)?)?;
        let filter = self.filters.get(table);
        let restorer = TableRestorer::new(table, columns, filter, self.config.dry_run);
        restorer.run(reader, conn.as_mut()).map(Some)
    }

    /// Make sure the target table exists, honouring the create/truncate
    /// flags. Returns false when the table should be skipped.
    fn ensure_table(&self, conn: &mut PooledConn, table: &str) -> Result<bool> {
        let exists: Option<String> = conn
            .exec_first(
                "SELECT `table_name` FROM `information_schema`.`tables` \
                 WHERE `table_schema` = ? AND `table_name` = ?",
                (self.db_name.as_str(), table),
            )
            .map_err(Error::Query)?;

        if exists.is_some() {
            if self.config.truncate_tables && !self.config.dry_run {
                info!(table, "truncating table");
                conn.query_drop(format!("TRUNCATE TABLE {}", quote_ident(table)))
                    .map_err(Error::Query)?;
            }
            return Ok(true);
        }
        if !self.config.create_tables {
            error!(
                table,
                "table does not exist and automatic creation not allowed"
            );
            return Ok(false);
        }
        let Some(create) = schema::find_table_create(&self.schema, table) else {
            error!(table, "could not find create statement for table");
            return Ok(false);
        };
        info!(table, "creating table");
        if !self.config.dry_run {
            conn.query_drop(create).map_err(Error::Query)?;
        }
        Ok(true)
    }

    pub fn stats(&self) -> RunStats {
        *self.stats.lock().unwrap()
    }
}
