//! Server introspection: base-table listing, column classification, and
//! capability probing on one dedicated connection.

use crate::error::{Error, Result};
use mysql::prelude::Queryable;
use mysql::{Conn, Opts};

/// The codec's abstraction over SQL column types. The class decides how a
/// value is emitted into a dump file and how it is re-parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    String,
    Numeric,
    Binary,
}

/// Role a column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    None,
    Unique,
    Primary,
}

/// One column of a table descriptor.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub field: String,
    pub sql_type: String,
    pub class: ColumnClass,
    pub nullable: bool,
    pub key: KeyRole,
    pub default: Option<String>,
    pub extra: String,
}

/// Immutable table descriptor. Columns are listed in the order `SELECT *`
/// returns them, which is also the dump header order.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Option<String>,
}

impl TableInfo {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.field.clone()).collect()
    }

    pub fn classes(&self) -> Vec<ColumnClass> {
        self.columns.iter().map(|c| c.class).collect()
    }
}

/// Back-tick-quote an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Classify a SQL column type into its semantic class. Unknown types are a
/// fatal dump error: emitting them without a defined encoding would corrupt
/// the dump.
pub fn classify(sql_type: &str) -> Option<ColumnClass> {
    let base = sql_type
        .split(|c| c == '(' || c == ' ')
        .next()
        .unwrap_or(sql_type)
        .to_ascii_lowercase();
    match base.as_str() {
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set"
        | "date" | "datetime" | "time" | "json" => Some(ColumnClass::String),
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "decimal"
        | "numeric" | "float" | "double" | "real" | "timestamp" | "year" => {
            Some(ColumnClass::Numeric)
        }
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            Some(ColumnClass::Binary)
        }
        _ => None,
    }
}

/// Introspection handle owning its own connection, separate from the
/// snapshot connection the dumpers share.
pub struct DbInfo {
    conn: Conn,
    has_backup_lock: Option<bool>,
}

impl DbInfo {
    /// Connect and verify the server responds.
    pub fn connect(opts: Opts) -> Result<Self> {
        let mut conn = Conn::new(opts).map_err(Error::Connect)?;
        conn.query_first::<u8, _>("SELECT 1")
            .map_err(Error::Connect)?;
        Ok(Self {
            conn,
            has_backup_lock: None,
        })
    }

    /// Base tables only, in server order. Views are not dumped.
    pub fn tables(&mut self) -> Result<Vec<String>> {
        self.conn
            .query_map(
                "SHOW FULL TABLES WHERE Table_type LIKE 'BASE TABLE'",
                |(name, _kind): (String, String)| name,
            )
            .map_err(Error::Query)
    }

    /// Build the immutable descriptor for one table.
    pub fn table_info(&mut self, table: &str) -> Result<TableInfo> {
        let rows: Vec<(String, String, String, String, Option<String>, String)> = self
            .conn
            .query(format!("SHOW COLUMNS FROM {}", quote_ident(table)))
            .map_err(Error::Query)?;

        let mut columns = Vec::with_capacity(rows.len());
        for (field, sql_type, null, key, default, extra) in rows {
            let class = classify(&sql_type).ok_or_else(|| Error::UnsupportedType {
                table: table.to_string(),
                column: field.clone(),
                sql_type: sql_type.clone(),
            })?;
            columns.push(ColumnInfo {
                field,
                sql_type,
                class,
                nullable: null.eq_ignore_ascii_case("yes"),
                key: match key.as_str() {
                    "PRI" => KeyRole::Primary,
                    "UNI" => KeyRole::Unique,
                    _ => KeyRole::None,
                },
                default,
                extra,
            });
        }
        let primary_key = columns
            .iter()
            .find(|c| c.key == KeyRole::Primary)
            .map(|c| c.field.clone());
        Ok(TableInfo {
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// Whether the server advertises non-blocking backup locks. Cached;
    /// probe failure means the capability is absent.
    pub fn has_backup_lock(&mut self) -> bool {
        if let Some(cached) = self.has_backup_lock {
            return cached;
        }
        let answer = self
            .conn
            .query_first::<String, _>("SELECT @@have_backup_locks")
            .ok()
            .flatten()
            .map(|v| v == "YES")
            .unwrap_or(false);
        self.has_backup_lock = Some(answer);
        answer
    }

    /// `SHOW CREATE TABLE` text, used to build the schema.sql companion.
    pub fn show_create(&mut self, table: &str) -> Result<String> {
        let row: Option<(String, String)> = self
            .conn
            .query_first(format!("SHOW CREATE TABLE {}", quote_ident(table)))
            .map_err(Error::Query)?;
        row.map(|(_name, create)| create).ok_or_else(|| {
            Error::Config(format!("table {table:?} has no CREATE TABLE statement"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_string_family() {
        for t in [
            "varchar(255)",
            "char(3)",
            "text",
            "mediumtext",
            "enum('a','b')",
            "set('x')",
            "date",
            "datetime",
            "json",
        ] {
            assert_eq!(classify(t), Some(ColumnClass::String), "{t}");
        }
    }

    #[test]
    fn test_classify_numeric_family() {
        for t in [
            "int(11)",
            "tinyint(1)",
            "bigint(20) unsigned",
            "decimal(10,2)",
            "double",
            "float",
            "timestamp",
            "year",
        ] {
            assert_eq!(classify(t), Some(ColumnClass::Numeric), "{t}");
        }
    }

    #[test]
    fn test_classify_binary_family() {
        for t in ["blob", "longblob", "varbinary(16)", "binary(8)"] {
            assert_eq!(classify(t), Some(ColumnClass::Binary), "{t}");
        }
    }

    #[test]
    fn test_classify_unknown_is_none() {
        assert_eq!(classify("geometry"), None);
        assert_eq!(classify("point"), None);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("weird`name"), "`weird``name`");
    }
}
