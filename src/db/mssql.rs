//! SQL Server driver over tiberius.

use async_trait::async_trait;
use serde_json::{Value, json};
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::warn;

use super::DbError;
use super::config::{ConnectionConfig, Dialect};
use super::connection::{QueryOutput, SqlConnection};
use super::driver::network_fields;

/// Tries each listed type in order and returns the first that converts.
macro_rules! decode_cell {
    ($row:expr, $idx:expr, [$($ty:ty => $conv:expr),+ $(,)?]) => {
        $(
            if let Ok(value) = $row.try_get::<$ty, _>($idx) {
                return value.map_or(Value::Null, $conv);
            }
        )+
    };
}

/// A single tiberius client. TDS is not multiplexed, so calls serialize
/// on the mutex.
pub struct MssqlConnection {
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl MssqlConnection {
    /// Connects with SQL Server authentication.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        let (host, port, user, pass) = network_fields(config)?;

        let mut tds = Config::new();
        tds.host(host);
        tds.port(port);
        tds.database(&config.database);
        tds.authentication(AuthMethod::sql_server(user, pass));
        tds.trust_cert();

        let tcp = TcpStream::connect(tds.get_addr()).await?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(tds, tcp.compat_write()).await?;

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("client", &"<tiberius::Client>")
            .finish()
    }
}

#[async_trait]
impl SqlConnection for MssqlConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    async fn query(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let mut client = self.client.lock().await;
        let results = client.simple_query(sql).await?.into_results().await?;

        // A batch may yield several result sets; the last one with rows wins.
        let Some(rows) = results.into_iter().rev().find(|set| !set.is_empty()) else {
            return Ok(QueryOutput::default());
        };

        let columns = rows[0]
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| cell(row, idx)).collect())
            .collect();
        Ok(QueryOutput::new(columns, rows))
    }

    async fn validate(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let outcome = self.query(&Dialect::Mssql.explain_statement(sql)).await;

        // A failed batch never reaches its trailing `SET NOEXEC OFF`.
        let mut client = self.client.lock().await;
        let reset = match client.simple_query("SET NOEXEC OFF").await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = reset {
            warn!(error = %e, "failed to reset NOEXEC after validation");
        }

        outcome
    }
}

fn cell(row: &Row, idx: usize) -> Value {
    decode_cell!(row, idx, [
        bool => Value::Bool,
        u8 => |v| json!(v),
        i16 => |v| json!(v),
        i32 => |v| json!(v),
        i64 => |v| json!(v),
        f32 => |v| json!(v),
        f64 => |v| json!(v),
        tiberius::numeric::Numeric => |v| {
            let text = v.to_string();
            text.parse::<serde_json::Number>()
                .map_or(Value::String(text), Value::Number)
        },
        &str => |v: &str| Value::String(v.to_string()),
        tiberius::Uuid => |v| Value::String(v.to_string()),
        chrono::NaiveDateTime => |v| Value::String(v.to_string()),
        chrono::NaiveDate => |v| Value::String(v.to_string()),
        chrono::NaiveTime => |v| Value::String(v.to_string()),
        chrono::DateTime<chrono::FixedOffset> => |v| Value::String(v.to_rfc3339()),
        &[u8] => |v: &[u8]| Value::String(format!("<{} bytes>", v.len())),
    ]);
    Value::String("<unsupported>".to_string())
}
