//! Connection parameters and dialect metadata.
//!
//! [`ConnectionParams`] is what arrives with a request; every field is
//! optional there. [`ConnectionParams::validate`] turns it into a
//! [`ConnectionConfig`] or rejects it. Nothing is ever defaulted: a
//! missing host or password is an error, not a reason to connect to
//! some other database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `PostgreSQL`.
    Postgres,
    /// `MySQL` / `MariaDB`.
    Mysql,
    /// `SQLite` database file.
    Sqlite,
    /// Microsoft SQL Server.
    Mssql,
}

impl Dialect {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Mssql => "mssql",
        }
    }

    /// Parses a dialect name, accepting common aliases.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "mssql" | "sqlserver" | "sql_server" => Some(Self::Mssql),
            _ => None,
        }
    }

    /// Whether this dialect connects over the network (and therefore needs
    /// host, port, and credentials).
    #[must_use]
    pub const fn is_networked(self) -> bool {
        !matches!(self, Self::Sqlite)
    }

    /// Quotes an identifier for this dialect.
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", name.replace('`', "``")),
            Self::Mssql => format!("[{}]", name.replace(']', "]]")),
        }
    }

    /// Wraps `sql` in a statement that plans it without executing.
    #[must_use]
    pub fn explain_statement(self, sql: &str) -> String {
        let sql = sql.trim().trim_end_matches(';');
        match self {
            Self::Postgres | Self::Mysql => format!("EXPLAIN {sql}"),
            Self::Sqlite => format!("EXPLAIN QUERY PLAN {sql}"),
            Self::Mssql => format!("SET NOEXEC ON; {sql}; SET NOEXEC OFF;"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            AgentError::configuration(format!(
                "unsupported database type '{s}' (expected postgres, mysql, sqlite, or mssql)"
            ))
        })
    }
}

/// Connection parameters as supplied by a caller. All fields optional.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Database type (`postgres`, `mysql`, `sqlite`, `mssql`).
    #[serde(rename = "type", default)]
    pub db_type: Option<String>,
    /// Server host name.
    #[serde(default)]
    pub host: Option<String>,
    /// Server port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name (file path for sqlite).
    #[serde(default)]
    pub database: Option<String>,
    /// Login user.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ConnectionParams {
    /// Validates that every required field is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] naming every missing field, or
    /// the unsupported type.
    pub fn validate(&self) -> Result<ConnectionConfig, AgentError> {
        let db_type = present(self.db_type.as_deref())
            .ok_or_else(|| AgentError::configuration("missing required connection field: type"))?;
        let dialect: Dialect = db_type.parse()?;

        let mut missing = Vec::new();
        let database = present(self.database.as_deref());
        if database.is_none() {
            missing.push("database");
        }

        let (host, port, username, password) = if dialect.is_networked() {
            let host = present(self.host.as_deref());
            let port = self.port.filter(|&p| p != 0);
            let username = present(self.username.as_deref());
            let password = present(self.password.as_deref());
            for (name, is_set) in [
                ("host", host.is_some()),
                ("port", port.is_some()),
                ("username", username.is_some()),
                ("password", password.is_some()),
            ] {
                if !is_set {
                    missing.push(name);
                }
            }
            (host, port, username, password)
        } else {
            (None, None, None, None)
        };

        if !missing.is_empty() {
            return Err(AgentError::configuration(format!(
                "missing required connection fields for {dialect}: {}",
                missing.join(", ")
            )));
        }

        Ok(ConnectionConfig {
            dialect,
            host: host.map(String::from),
            port,
            database: database.map(String::from).unwrap_or_default(),
            username: username.map(String::from),
            password: password.map(String::from),
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Validated connection target. Immutable for the lifetime of a request.
///
/// Network fields are `Some` for every dialect except sqlite.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// SQL dialect.
    pub dialect: Dialect,
    /// Server host.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Database name, or file path for sqlite.
    pub database: String,
    /// Login user.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Human-readable target for logs and errors. Never includes credentials.
    #[must_use]
    pub fn target(&self) -> String {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{host}:{port}/{}", self.database),
            (Some(host), None) => format!("{host}/{}", self.database),
            _ => self.database.clone(),
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn postgres_params() -> ConnectionParams {
        ConnectionParams {
            db_type: Some("postgres".to_string()),
            host: Some("db.internal".to_string()),
            port: Some(5432),
            database: Some("shop".to_string()),
            username: Some("analyst".to_string()),
            password: Some("s3cret".to_string()),
        }
    }

    #[test_case("postgres", Some(Dialect::Postgres))]
    #[test_case("PostgreSQL", Some(Dialect::Postgres))]
    #[test_case("mariadb", Some(Dialect::Mysql))]
    #[test_case("sqlite3", Some(Dialect::Sqlite))]
    #[test_case("sqlserver", Some(Dialect::Mssql))]
    #[test_case("oracle", None)]
    fn test_dialect_from_name(name: &str, expected: Option<Dialect>) {
        assert_eq!(Dialect::from_name(name), expected);
    }

    #[test]
    fn test_params_debug_redacts_password() {
        let rendered = format!("{:?}", postgres_params());
        assert!(!rendered.contains("s3cret"), "{rendered}");
        assert!(rendered.contains("analyst"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validate_complete_params() {
        let config = postgres_params()
            .validate()
            .unwrap_or_else(|e| unreachable!("validate failed: {e}"));
        assert_eq!(config.dialect, Dialect::Postgres);
        assert_eq!(config.target(), "db.internal:5432/shop");
    }

    #[test]
    fn test_validate_reports_all_missing_fields() {
        let params = ConnectionParams {
            host: None,
            password: Some("   ".to_string()),
            ..postgres_params()
        };
        let err = params.validate().err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("host"), "{err}");
        assert!(err.contains("password"), "{err}");
        assert!(!err.contains("username"), "{err}");
    }

    #[test]
    fn test_validate_missing_type() {
        let params = ConnectionParams {
            db_type: None,
            ..postgres_params()
        };
        assert!(matches!(
            params.validate(),
            Err(AgentError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validate_sqlite_needs_only_database() {
        let params = ConnectionParams {
            db_type: Some("sqlite".to_string()),
            database: Some("/tmp/shop.db".to_string()),
            ..ConnectionParams::default()
        };
        let config = params
            .validate()
            .unwrap_or_else(|e| unreachable!("validate failed: {e}"));
        assert_eq!(config.target(), "/tmp/shop.db");
        assert!(config.host.is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = postgres_params()
            .validate()
            .unwrap_or_else(|e| unreachable!("validate failed: {e}"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test_case(Dialect::Postgres, "EXPLAIN SELECT 1")]
    #[test_case(Dialect::Sqlite, "EXPLAIN QUERY PLAN SELECT 1")]
    #[test_case(Dialect::Mssql, "SET NOEXEC ON; SELECT 1; SET NOEXEC OFF;")]
    fn test_explain_statement(dialect: Dialect, expected: &str) {
        assert_eq!(dialect.explain_statement("SELECT 1;"), expected);
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Postgres.quote_identifier("or\"ders"), "\"or\"\"ders\"");
        assert_eq!(Dialect::Mysql.quote_identifier("orders"), "`orders`");
        assert_eq!(Dialect::Mssql.quote_identifier("orders"), "[orders]");
    }
}
