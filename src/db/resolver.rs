//! Per-turn connection resolution.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::config::ConnectionConfig;
use super::connection::{Connector, LiveConnection};
use super::driver::DriverConnector;
use super::introspect::list_base_tables;
use crate::error::AgentError;

/// Default liveness probe bound in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Opens, introspects, and probes the connection for one turn.
#[derive(Clone)]
pub struct ConnectionResolver {
    connector: Arc<dyn Connector>,
    probe_timeout: Duration,
    strict_introspection: bool,
}

impl Default for ConnectionResolver {
    fn default() -> Self {
        Self::new(Arc::new(DriverConnector::default()))
    }
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("probe_timeout", &self.probe_timeout)
            .field("strict_introspection", &self.strict_introspection)
            .finish_non_exhaustive()
    }
}

impl ConnectionResolver {
    /// Creates a resolver over the given connector.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            strict_introspection: false,
        }
    }

    /// Sets the liveness probe bound.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Makes an empty or failed table listing fatal.
    #[must_use]
    pub const fn with_strict_introspection(mut self, strict: bool) -> Self {
        self.strict_introspection = strict;
        self
    }

    /// Resolves a validated config into a probed [`LiveConnection`].
    ///
    /// The visible table set is restricted to the tables the catalog
    /// reports. When the catalog reports nothing the set is left
    /// unrestricted, unless strict introspection is on.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Connectivity`] when the connection cannot be opened
    ///   or the probe fails or times out.
    /// - [`AgentError::Introspection`] under strict introspection when no
    ///   tables are listed.
    pub async fn resolve(&self, config: &ConnectionConfig) -> Result<LiveConnection, AgentError> {
        let target = config.target();
        let handle = self
            .connector
            .connect(config)
            .await
            .map_err(|e| AgentError::Connectivity {
                message: format!("cannot connect to {} at {target}: {e}", config.dialect),
            })?;

        let tables = list_base_tables(handle.as_ref(), config.dialect).await;
        let include = if tables.is_empty() {
            if self.strict_introspection {
                return Err(AgentError::Introspection {
                    message: format!("no base tables could be listed for {target}"),
                });
            }
            warn!(dialect = %config.dialect, db = %target, "no tables listed, schema left unrestricted");
            None
        } else {
            Some(tables)
        };

        let live = LiveConnection::new(handle, config, include);
        match tokio::time::timeout(self.probe_timeout, live.probe()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(AgentError::Connectivity {
                    message: format!("liveness probe failed for {target}: {e}"),
                });
            }
            Err(_) => {
                return Err(AgentError::Connectivity {
                    message: format!(
                        "liveness probe timed out after {}s for {target}",
                        self.probe_timeout.as_secs()
                    ),
                });
            }
        }

        info!(
            dialect = %config.dialect,
            host = config.host.as_deref().unwrap_or("-"),
            database = %config.database,
            tables = live.include_tables().map_or(0, <[String]>::len),
            "connection resolved"
        );
        Ok(live)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use crate::db::config::Dialect;
    use crate::db::connection::{PROBE_QUERY, QueryOutput, SqlConnection};
    use async_trait::async_trait;
    use serde_json::json;

    struct CatalogConnection {
        tables: Result<Vec<&'static str>, ()>,
        probe_ok: bool,
        probe_delay: Duration,
    }

    #[async_trait]
    impl SqlConnection for CatalogConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        async fn query(&self, sql: &str) -> Result<QueryOutput, DbError> {
            if sql == PROBE_QUERY {
                tokio::time::sleep(self.probe_delay).await;
                return if self.probe_ok {
                    Ok(QueryOutput::new(vec!["test".to_string()], vec![vec![json!(1)]]))
                } else {
                    Err(DbError::Other("probe refused".to_string()))
                };
            }
            match &self.tables {
                Ok(names) => Ok(QueryOutput::new(
                    vec!["table_name".to_string()],
                    names.iter().map(|n| vec![json!(n)]).collect(),
                )),
                Err(()) => Err(DbError::Other("permission denied".to_string())),
            }
        }
    }

    struct FixedConnector {
        tables: Result<Vec<&'static str>, ()>,
        probe_ok: bool,
        probe_delay: Duration,
        refuse: bool,
    }

    impl FixedConnector {
        fn healthy(tables: Vec<&'static str>) -> Self {
            Self {
                tables: Ok(tables),
                probe_ok: true,
                probe_delay: Duration::ZERO,
                refuse: false,
            }
        }
    }

    #[async_trait]
    impl Connector for FixedConnector {
        async fn connect(
            &self,
            _config: &ConnectionConfig,
        ) -> Result<Arc<dyn SqlConnection>, DbError> {
            if self.refuse {
                return Err(DbError::Other("connection refused".to_string()));
            }
            Ok(Arc::new(CatalogConnection {
                tables: self.tables.clone(),
                probe_ok: self.probe_ok,
                probe_delay: self.probe_delay,
            }))
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            dialect: Dialect::Postgres,
            host: Some("db.internal".to_string()),
            port: Some(5432),
            database: "shop".to_string(),
            username: Some("analyst".to_string()),
            password: Some("s3cret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_resolve_restricts_to_listed_tables() {
        let resolver =
            ConnectionResolver::new(Arc::new(FixedConnector::healthy(vec!["orders", "customers"])));
        let live = resolver
            .resolve(&config())
            .await
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert_eq!(
            live.include_tables(),
            Some(&["orders".to_string(), "customers".to_string()][..])
        );
        assert!(live.is_table_visible("ORDERS"));
        assert!(!live.is_table_visible("payroll"));
    }

    #[tokio::test]
    async fn test_resolve_empty_listing_is_unrestricted() {
        let resolver = ConnectionResolver::new(Arc::new(FixedConnector::healthy(vec![])));
        let live = resolver
            .resolve(&config())
            .await
            .unwrap_or_else(|e| panic!("resolve failed: {e}"));
        assert!(live.include_tables().is_none());
        assert!(live.is_table_visible("anything"));
    }

    #[tokio::test]
    async fn test_resolve_failed_listing_is_fatal_when_strict() {
        let connector = FixedConnector {
            tables: Err(()),
            ..FixedConnector::healthy(vec![])
        };
        let resolver =
            ConnectionResolver::new(Arc::new(connector)).with_strict_introspection(true);
        let result = resolver.resolve(&config()).await;
        assert!(matches!(result, Err(AgentError::Introspection { .. })));
    }

    #[tokio::test]
    async fn test_resolve_connect_failure_is_connectivity() {
        let connector = FixedConnector {
            refuse: true,
            ..FixedConnector::healthy(vec!["orders"])
        };
        let result = ConnectionResolver::new(Arc::new(connector))
            .resolve(&config())
            .await;
        match result {
            Err(AgentError::Connectivity { message }) => {
                assert!(message.contains("db.internal:5432/shop"));
                assert!(!message.contains("s3cret"));
            }
            other => panic!("expected connectivity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_probe_failure_is_connectivity() {
        let connector = FixedConnector {
            probe_ok: false,
            ..FixedConnector::healthy(vec!["orders"])
        };
        let result = ConnectionResolver::new(Arc::new(connector))
            .resolve(&config())
            .await;
        assert!(matches!(result, Err(AgentError::Connectivity { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_probe_timeout_is_connectivity() {
        let connector = FixedConnector {
            probe_delay: Duration::from_secs(30),
            ..FixedConnector::healthy(vec!["orders"])
        };
        let result = ConnectionResolver::new(Arc::new(connector))
            .with_probe_timeout(Duration::from_secs(1))
            .resolve(&config())
            .await;
        match result {
            Err(AgentError::Connectivity { message }) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
