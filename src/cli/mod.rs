//! CLI command definitions for report-forge
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Report Forge: fill Word templates from SQL queries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web UI and JSON API (default if no subcommand given)
    Serve(ServeArgs),

    /// Generate one report from a template
    Generate(GenerateArgs),

    /// Create the sample tables and rows in the database
    Seed,

    /// List the placeholders found in a template
    Placeholders(PlaceholdersArgs),

    /// Ask the SQL assistant for a query
    Suggest(SuggestArgs),

    /// Ask the SQL assistant whether a query fits a description
    Verify(VerifyArgs),
}

/// Arguments for the serve subcommand
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Port for the web UI (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// YAML parameters file loaded at start-up (overrides config)
    #[arg(long, value_name = "FILE")]
    pub parameters: Option<PathBuf>,
}

/// Arguments for the generate subcommand
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// The .docx template
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    /// Report month as YYYY-MM (default: current month)
    #[arg(long, value_name = "YYYY-MM")]
    pub date: Option<String>,

    /// YAML parameters file (default: config, then built-in parameters)
    #[arg(long, value_name = "FILE")]
    pub parameters: Option<PathBuf>,

    /// Output path (default: <template stem>-<date>.docx next to the template)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the placeholders subcommand
#[derive(Args, Debug)]
pub struct PlaceholdersArgs {
    /// The .docx template
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,
}

/// Arguments for the suggest subcommand
#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Parameter (placeholder) name
    #[arg(short, long)]
    pub name: String,

    /// What the query should return
    #[arg(long)]
    pub description: String,
}

/// Arguments for the verify subcommand
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// The query to check
    #[arg(short, long)]
    pub sql: String,

    /// What the query is expected to return
    #[arg(long)]
    pub description: String,
}
