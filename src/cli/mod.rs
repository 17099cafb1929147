//! CLI layer for askdb.
//!
//! Provides the command-line interface using clap, with commands for
//! asking questions, listing backends and tables, and scaffolding prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, ConnectionArgs};
