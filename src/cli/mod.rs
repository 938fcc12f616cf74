//! CLI module for modelgen
//!
//! Provides command-line interface for:
//! - check: Compile a definition and print its field summary
//! - validate: Validate one document read from stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, describe, run, run_command, summarize, validate, Config};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_document, write_error, write_response, write_violations};
