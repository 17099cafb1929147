//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::db::ConnectionParams;

/// askdb: ask questions of a relational database in plain language.
///
/// Connects to `PostgreSQL`, `MySQL`, `SQLite`, or SQL Server, lets an LLM
/// explore the schema and run SQL, and prints the answer.
#[derive(Parser, Debug)]
#[command(name = "askdb")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question about a database.
    ///
    /// Runs one agent turn. Progress streams to stderr; the answer and a
    /// summary of the tool calls go to stdout.
    #[command(after_help = r#"Examples:
  askdb query "How many orders are pending?" --db-type sqlite --database shop.db
  askdb query "Top 10 customers by revenue" --db-type postgres --host db --port 5432 \
      --database shop --username analyst --password secret
  askdb query "Export last month's orders to Excel" --db-type mysql ... --data-source shop
  ASKDB_DB_PASSWORD=secret askdb --format json query "Count users" --db-type mssql ...
"#)]
    Query {
        /// The question to answer.
        message: String,

        /// Connection parameters.
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Backend id or family (openai, anthropic). Falls back to the
        /// first available backend.
        #[arg(long)]
        provider: Option<String>,

        /// Label prefixing export object keys.
        #[arg(long)]
        data_source: Option<String>,

        /// JSON file with earlier messages of the conversation.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Conversation id echoed in the result. Generated when omitted.
        #[arg(long)]
        thread_id: Option<String>,

        /// Directory containing prompt templates.
        #[arg(long, env = "ASKDB_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// List the available model backends.
    Providers,

    /// Resolve a connection and print the visible tables.
    Tables {
        /// Connection parameters.
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Write default prompt templates to disk for customization.
    ///
    /// Creates `sql_agent.md` in the target directory. Existing files are
    /// not overwritten.
    InitPrompts {
        /// Target directory (default: `~/.config/askdb/prompts/`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Database connection flags shared by `query` and `tables`.
#[derive(Args, Clone, Default)]
pub struct ConnectionArgs {
    /// Database type (postgres, mysql, sqlite, mssql).
    #[arg(long = "db-type", env = "ASKDB_DB_TYPE")]
    pub db_type: Option<String>,

    /// Server host.
    #[arg(long, env = "ASKDB_DB_HOST")]
    pub host: Option<String>,

    /// Server port.
    #[arg(long, env = "ASKDB_DB_PORT")]
    pub port: Option<u16>,

    /// Database name, or file path for sqlite.
    #[arg(long, env = "ASKDB_DB_NAME")]
    pub database: Option<String>,

    /// Login user.
    #[arg(long, env = "ASKDB_DB_USER")]
    pub username: Option<String>,

    /// Login password.
    #[arg(long, env = "ASKDB_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionArgs")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionArgs {
    /// Converts the flags into unvalidated connection parameters.
    #[must_use]
    pub fn to_params(&self) -> ConnectionParams {
        ConnectionParams {
            db_type: self.db_type.clone(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_arguments() {
        let cli = Cli::try_parse_from([
            "askdb",
            "--format",
            "json",
            "query",
            "How many orders?",
            "--db-type",
            "postgres",
            "--host",
            "db",
            "--port",
            "5432",
            "--database",
            "shop",
            "--username",
            "analyst",
            "--password",
            "secret",
            "--provider",
            "anthropic",
        ])
        .unwrap_or_else(|e| panic!("parse: {e}"));

        assert_eq!(cli.format, "json");
        let Commands::Query {
            message,
            connection,
            provider,
            ..
        } = cli.command
        else {
            panic!("expected query");
        };
        assert_eq!(message, "How many orders?");
        assert_eq!(provider.as_deref(), Some("anthropic"));
        let params = connection.to_params();
        assert_eq!(params.port, Some(5432));
        assert_eq!(params.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_init_prompts_dir() {
        let cli = Cli::try_parse_from(["askdb", "init-prompts", "--dir", "/tmp/p"])
            .unwrap_or_else(|e| panic!("parse: {e}"));
        assert!(matches!(
            cli.command,
            Commands::InitPrompts { dir: Some(ref d) } if d == &PathBuf::from("/tmp/p")
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let cli = Cli::try_parse_from([
            "askdb",
            "tables",
            "--db-type",
            "mysql",
            "--password",
            "hunter2",
        ])
        .unwrap_or_else(|e| panic!("parse: {e}"));
        let rendered = format!("{cli:?}");
        assert!(!rendered.contains("hunter2"), "{rendered}");
        assert!(rendered.contains("<redacted>"));
    }
}
