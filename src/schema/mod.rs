//! Regex extraction of `CREATE TABLE` statements from a `schema.sql`
//! companion file.
//!
//! This is deliberately not a SQL parser: a schema containing a `;` inside
//! a string literal will confuse the non-greedy statement match.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches every `CREATE TABLE \`name\`` occurrence.
static TABLES_RE: Lazy<Regex> = Lazy::new(|| Regex::new("CREATE TABLE `([^`]+)`").unwrap());

/// Matches a column definition line: leading whitespace then a back-tick
/// identifier.
static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+`([^`]+)`").unwrap());

/// List every table the schema file defines, in file order.
pub fn find_tables(schema: &str) -> Vec<String> {
    TABLES_RE
        .captures_iter(schema)
        .map(|c| c[1].to_string())
        .collect()
}

/// Extract the full `CREATE TABLE` statement for one table, up to and
/// including the terminating semicolon.
pub fn find_table_create(schema: &str, table: &str) -> Option<String> {
    let pattern = format!("CREATE TABLE `{}`[^;]+;", regex::escape(table));
    let re = Regex::new(&pattern).ok()?;
    re.find(schema).map(|m| m.as_str().to_string())
}

/// Ordered column names of one table, extracted from the lines of its
/// `CREATE TABLE` block.
pub fn find_table_columns(schema: &str, table: &str) -> Vec<String> {
    let Some(create) = find_table_create(schema, table) else {
        return Vec::new();
    };
    create
        .lines()
        .filter_map(|line| COLUMN_RE.captures(line))
        .map(|c| c[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "\
-- dump preamble
DROP TABLE IF EXISTS `users`;
CREATE TABLE `users` (
  `id` int(11) NOT NULL AUTO_INCREMENT,
  `name` varchar(255) DEFAULT NULL,
  `created_at` timestamp NOT NULL,
  PRIMARY KEY (`id`),
  KEY `idx_name` (`name`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8;

DROP TABLE IF EXISTS `orders`;
CREATE TABLE `orders` (
  `id` bigint(20) NOT NULL,
  `user_id` int(11) DEFAULT NULL,
  `total` decimal(10,2) NOT NULL
) ENGINE=InnoDB;
";

    #[test]
    fn test_find_tables() {
        assert_eq!(find_tables(SCHEMA), vec!["users", "orders"]);
    }

    #[test]
    fn test_find_table_create() {
        let create = find_table_create(SCHEMA, "users").unwrap();
        assert!(create.starts_with("CREATE TABLE `users`"));
        assert!(create.ends_with("CHARSET=utf8;"));
        assert!(create.contains("AUTO_INCREMENT"));
    }

    #[test]
    fn test_find_table_create_missing() {
        assert!(find_table_create(SCHEMA, "absent").is_none());
    }

    #[test]
    fn test_find_table_columns() {
        // KEY lines do not begin with whitespace-then-backtick, so only
        // real column definitions are picked up.
        assert_eq!(
            find_table_columns(SCHEMA, "users"),
            vec!["id", "name", "created_at"]
        );
        assert_eq!(
            find_table_columns(SCHEMA, "orders"),
            vec!["id", "user_id", "total"]
        );
    }

    #[test]
    fn test_find_table_columns_missing_table() {
        assert!(find_table_columns(SCHEMA, "absent").is_empty());
    }
}
