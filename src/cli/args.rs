//! CLI argument definitions using clap
//!
//! Commands:
//! - modelgen check --config <path> --type <Name>
//! - modelgen validate --config <path> --type <Name>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// modelgen - compile model definitions and validate documents against them
#[derive(Parser, Debug)]
#[command(name = "modelgen")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a definition and print a summary of its fields
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./modelgen.json")]
        config: PathBuf,

        /// Definition name, with or without extension
        #[arg(long = "type", value_name = "NAME")]
        type_name: String,
    },

    /// Validate one JSON document read from stdin
    Validate {
        /// Path to configuration file
        #[arg(long, default_value = "./modelgen.json")]
        config: PathBuf,

        /// Definition name, with or without extension
        #[arg(long = "type", value_name = "NAME")]
        type_name: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
