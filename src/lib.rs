//! # askdb
//!
//! Ask questions of a relational database in plain language.
//!
//! A turn takes a question plus connection parameters, lets an LLM explore
//! the schema and run SQL through a small set of tools, and returns a
//! natural-language answer. When object storage is configured the agent
//! can also hand back a spreadsheet of the results.
//!
//! ## Supported databases
//!
//! - `PostgreSQL`, `MySQL`, and `SQLite` through sqlx
//! - SQL Server through tiberius (feature `mssql`)
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use askdb::agent::{AgentConfig, Orchestrator, ProviderRegistry, TurnRequest, TurnUpdate};
//! use askdb::db::ConnectionParams;
//! use futures_util::StreamExt;
//!
//! # async fn run() -> Result<(), askdb::AgentError> {
//! let config = AgentConfig::from_env()?;
//! let registry = Arc::new(ProviderRegistry::from_config(&config)?);
//! let orchestrator = Orchestrator::new(registry, config);
//!
//! let mut stream = orchestrator.run_turn(TurnRequest {
//!     thread_id: "t-1".to_string(),
//!     connection: ConnectionParams {
//!         db_type: Some("sqlite".to_string()),
//!         database: Some("shop.db".to_string()),
//!         ..ConnectionParams::default()
//!     },
//!     user_message: "How many orders are pending?".to_string(),
//!     ..TurnRequest::default()
//! });
//!
//! while let Some(update) = stream.next().await {
//!     if let TurnUpdate::Finished(result) = update {
//!         println!("{}", result.answer_text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod db;
pub mod error;
pub mod export;

pub use agent::{Orchestrator, TurnRequest, TurnResult, TurnStream, TurnUpdate};
pub use error::{AgentError, Error, ErrorKind, Result};
