//! sqlx-backed drivers for postgres, mysql, and sqlite.
//!
//! Rows are decoded into JSON by trying column types in a fixed
//! per-backend order. Columns whose type sqlx does not know (domains such
//! as `information_schema.sql_identifier`) fall back to an unchecked text
//! decode.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo};
use tracing::debug;

use super::DbError;
use super::config::{ConnectionConfig, Dialect};
use super::connection::{Connector, QueryOutput, SqlConnection};

/// Default pool size per resolved connection.
const DEFAULT_POOL_SIZE: u32 = 4;
/// Default time to wait for a pooled connection.
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 15;

/// Tries each listed type in order and returns the first that decodes.
macro_rules! decode_cell {
    ($row:expr, $idx:expr, [$($ty:ty => $conv:expr),+ $(,)?]) => {
        $(
            if let Ok(value) = $row.try_get::<Option<$ty>, _>($idx) {
                return value.map_or(Value::Null, $conv);
            }
        )+
    };
}

/// Production [`Connector`] that opens real driver connections.
#[derive(Debug, Clone)]
pub struct DriverConnector {
    pool_size: u32,
    acquire_timeout: Duration,
}

impl Default for DriverConnector {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl DriverConnector {
    /// Sets the maximum pool size.
    #[must_use]
    pub const fn pool_size(mut self, n: u32) -> Self {
        self.pool_size = n;
        self
    }

    /// Sets the pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn SqlConnection>, DbError> {
        debug!(dialect = %config.dialect, db = %config.target(), "opening connection");
        match config.dialect {
            Dialect::Postgres => {
                let (host, port, user, pass) = network_fields(config)?;
                let options = PgConnectOptions::new()
                    .host(host)
                    .port(port)
                    .username(user)
                    .password(pass)
                    .database(&config.database);
                let pool = PgPoolOptions::new()
                    .max_connections(self.pool_size)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Arc::new(SqlxConnection::Postgres(pool)))
            }
            Dialect::Mysql => {
                let (host, port, user, pass) = network_fields(config)?;
                let options = MySqlConnectOptions::new()
                    .host(host)
                    .port(port)
                    .username(user)
                    .password(pass)
                    .database(&config.database);
                let pool = MySqlPoolOptions::new()
                    .max_connections(self.pool_size)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Arc::new(SqlxConnection::MySql(pool)))
            }
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::new()
                    .filename(&config.database)
                    .create_if_missing(false);
                let pool = SqlitePoolOptions::new()
                    .max_connections(self.pool_size)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Arc::new(SqlxConnection::Sqlite(pool)))
            }
            #[cfg(feature = "mssql")]
            Dialect::Mssql => {
                let conn = super::mssql::MssqlConnection::connect(config).await?;
                Ok(Arc::new(conn))
            }
            #[cfg(not(feature = "mssql"))]
            Dialect::Mssql => Err(DbError::Unsupported { dialect: "mssql" }),
        }
    }
}

/// Extracts the fields validation guarantees for networked dialects.
pub(crate) fn network_fields(config: &ConnectionConfig) -> Result<(&str, u16, &str, &str), DbError> {
    match (
        config.host.as_deref(),
        config.port,
        config.username.as_deref(),
        config.password.as_deref(),
    ) {
        (Some(host), Some(port), Some(user), Some(pass)) => Ok((host, port, user, pass)),
        _ => Err(DbError::Other(format!(
            "{} connection requires host, port, username, and password",
            config.dialect
        ))),
    }
}

/// A pooled sqlx connection.
#[derive(Debug, Clone)]
pub enum SqlxConnection {
    /// `PostgreSQL` pool.
    Postgres(PgPool),
    /// `MySQL` pool.
    MySql(MySqlPool),
    /// `SQLite` pool.
    Sqlite(SqlitePool),
}

#[async_trait]
impl SqlConnection for SqlxConnection {
    fn dialect(&self) -> Dialect {
        match self {
            Self::Postgres(_) => Dialect::Postgres,
            Self::MySql(_) => Dialect::Mysql,
            Self::Sqlite(_) => Dialect::Sqlite,
        }
    }

    async fn query(&self, sql: &str) -> Result<QueryOutput, DbError> {
        // Model-issued SQL is rarely repeated; keep it out of the statement cache.
        let output = match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(sql).persistent(false).fetch_all(pool).await?;
                collect(&rows, pg_cell)
            }
            Self::MySql(pool) => {
                let rows = sqlx::query(sql).persistent(false).fetch_all(pool).await?;
                collect(&rows, mysql_cell)
            }
            Self::Sqlite(pool) => {
                let rows = sqlx::query(sql).persistent(false).fetch_all(pool).await?;
                collect(&rows, sqlite_cell)
            }
        };
        Ok(output)
    }
}

fn collect<R: Row>(rows: &[R], cell: fn(&R, usize) -> Value) -> QueryOutput {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect()
        })
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| cell(row, idx)).collect())
        .collect();
    QueryOutput::new(columns, rows)
}

fn decimal_value(d: rust_decimal::Decimal) -> Value {
    let text = d.to_string();
    text.parse::<serde_json::Number>()
        .map_or(Value::String(text), Value::Number)
}

fn fallback<R: Row>(row: &R, idx: usize) -> Value
where
    for<'r> String: sqlx::Decode<'r, R::Database>,
    usize: sqlx::ColumnIndex<R>,
{
    if let Ok(text) = row.try_get_unchecked::<Option<String>, _>(idx) {
        return text.map_or(Value::Null, Value::String);
    }
    let type_name = row.columns()[idx].type_info().name().to_string();
    Value::String(format!("<{type_name}>"))
}

fn pg_cell(row: &PgRow, idx: usize) -> Value {
    decode_cell!(row, idx, [
        bool => Value::Bool,
        i16 => |v| json!(v),
        i32 => |v| json!(v),
        i64 => |v| json!(v),
        f32 => |v| json!(v),
        f64 => |v| json!(v),
        rust_decimal::Decimal => decimal_value,
        String => Value::String,
        chrono::NaiveDateTime => |v| Value::String(v.to_string()),
        chrono::DateTime<chrono::Utc> => |v| Value::String(v.to_rfc3339()),
        chrono::NaiveDate => |v| Value::String(v.to_string()),
        chrono::NaiveTime => |v| Value::String(v.to_string()),
        uuid::Uuid => |v| Value::String(v.to_string()),
        Value => |v| v,
    ]);
    fallback(row, idx)
}

fn mysql_cell(row: &MySqlRow, idx: usize) -> Value {
    decode_cell!(row, idx, [
        i64 => |v| json!(v),
        u64 => |v| json!(v),
        f64 => |v| json!(v),
        f32 => |v| json!(v),
        rust_decimal::Decimal => decimal_value,
        chrono::NaiveDateTime => |v| Value::String(v.to_string()),
        chrono::DateTime<chrono::Utc> => |v| Value::String(v.to_rfc3339()),
        chrono::NaiveDate => |v| Value::String(v.to_string()),
        chrono::NaiveTime => |v| Value::String(v.to_string()),
        Value => |v| v,
        String => Value::String,
    ]);
    fallback(row, idx)
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> Value {
    decode_cell!(row, idx, [
        i64 => |v| json!(v),
        f64 => |v| json!(v),
        String => Value::String,
        Vec<u8> => |v: Vec<u8>| Value::String(format!("<{} bytes>", v.len())),
    ]);
    fallback(row, idx)
}
