use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "moviedb", version)]
pub struct Cli {
    #[arg(short, long, global = true, default_value = "./config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default).
    Serve,
    /// Create tables, indexes and seed rows, then exit.
    Migrate,
    /// Print the configuration JSON schema.
    Schema,
}
