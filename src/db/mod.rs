//! Database access: connection parameters, drivers, introspection, and
//! per-turn connection resolution.
//!
//! Drivers sit behind the [`SqlConnection`] and [`Connector`] traits so the
//! resolver and the SQL tools never see a concrete driver type.

pub mod config;
pub mod connection;
pub mod driver;
pub mod introspect;
#[cfg(feature = "mssql")]
pub mod mssql;
pub mod resolver;

use thiserror::Error;

pub use config::{ConnectionConfig, ConnectionParams, Dialect};
pub use connection::{Connector, LiveConnection, PROBE_QUERY, QueryOutput, SqlConnection};
pub use driver::{DriverConnector, SqlxConnection};
pub use introspect::{list_base_tables, parse_table_listing, table_listing_query};
pub use resolver::ConnectionResolver;

/// Errors raised by database drivers.
#[derive(Debug, Error)]
pub enum DbError {
    /// Error from sqlx (postgres, mysql, sqlite).
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Error from the SQL Server client.
    #[cfg(feature = "mssql")]
    #[error("sql server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dialect was compiled out of this build.
    #[error("{dialect} support is not enabled in this build")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
    },

    /// Any other driver failure.
    #[error("{0}")]
    Other(String),
}
