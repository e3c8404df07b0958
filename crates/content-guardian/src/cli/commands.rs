//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// JSON document to scan
    #[arg(value_name = "DOCUMENT")]
    pub document: PathBuf,

    /// Host name the document was served from
    #[arg(long, default_value = "")]
    pub host: String,

    /// Rules file (defaults to the configured rules path)
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Also print the annotated document
    #[arg(long)]
    pub emit_tree: bool,
}

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// JSON document to filter
    #[arg(value_name = "DOCUMENT")]
    pub document: PathBuf,

    /// Host name the document was served from
    #[arg(long, default_value = "")]
    pub host: String,

    /// Rules file to watch (defaults to the configured rules path)
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,
}

/// Profile command arguments.
#[derive(Debug, Args)]
pub struct ProfileCommand {
    /// Host name to resolve
    pub host: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Text to test against the rules
    pub text: String,

    /// Rules file (defaults to the configured rules path)
    #[arg(short, long, value_name = "FILE")]
    pub rules: Option<PathBuf>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
