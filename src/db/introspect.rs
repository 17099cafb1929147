//! Schema introspection.
//!
//! Table listing goes through fixed, dialect-specific catalog queries whose
//! textual output is parsed defensively. Nothing here fails: a broken
//! catalog read degrades to an empty listing and the caller decides what
//! that means.

use tracing::warn;

use super::config::Dialect;
use super::connection::SqlConnection;

const POSTGRES_TABLES: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name";

const MYSQL_TABLES: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name";

const MSSQL_TABLES: &str = "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME";

const SQLITE_TABLES: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Returns the base-table listing query for a dialect name.
///
/// Unrecognized names get the postgres query.
#[must_use]
pub fn table_listing_query(dialect: &str) -> &'static str {
    match Dialect::from_name(dialect) {
        Some(Dialect::Mysql) => MYSQL_TABLES,
        Some(Dialect::Mssql) => MSSQL_TABLES,
        Some(Dialect::Sqlite) => SQLITE_TABLES,
        Some(Dialect::Postgres) | None => POSTGRES_TABLES,
    }
}

/// Parses header-plus-rows tabular text into table names.
///
/// Skips the header, drops blank lines, and keeps the first
/// tab-separated field of every remaining row.
#[must_use]
pub fn parse_table_listing(text: &str) -> Vec<String> {
    text.lines()
        .skip(1)
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Lists base tables, degrading to an empty list on any failure.
pub async fn list_base_tables(conn: &dyn SqlConnection, dialect: Dialect) -> Vec<String> {
    match conn.query_text(table_listing_query(dialect.as_str())).await {
        Ok(text) => parse_table_listing(&text),
        Err(e) => {
            warn!(%dialect, error = %e, "table listing failed");
            Vec::new()
        }
    }
}

/// Catalog query describing the columns of `table`.
///
/// Result columns are name, type, and nullability, in that order.
#[must_use]
pub fn columns_query(dialect: Dialect, table: &str) -> String {
    let literal = table.replace('\'', "''");
    match dialect {
        Dialect::Postgres => format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = '{literal}' ORDER BY ordinal_position"
        ),
        Dialect::Mysql => format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = '{literal}' ORDER BY ordinal_position"
        ),
        Dialect::Mssql => format!(
            "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = '{literal}' ORDER BY ORDINAL_POSITION"
        ),
        Dialect::Sqlite => format!(
            "SELECT name, type, CASE \"notnull\" WHEN 1 THEN 'NO' ELSE 'YES' END AS is_nullable \
             FROM pragma_table_info('{literal}') ORDER BY cid"
        ),
    }
}

/// Query returning up to `n` rows of `table`.
#[must_use]
pub fn sample_rows_query(dialect: Dialect, table: &str, n: usize) -> String {
    let ident = dialect.quote_identifier(table);
    match dialect {
        Dialect::Mssql => format!("SELECT TOP {n} * FROM {ident}"),
        _ => format!("SELECT * FROM {ident} LIMIT {n}"),
    }
}
