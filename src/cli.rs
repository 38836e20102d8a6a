use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediafetch")]
#[command(author, version, about = "Resolve, fetch and decode media URIs")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and decode one or more URIs through the worker pool
    Fetch {
        /// URIs or local paths to fetch
        #[arg(required = true)]
        uris: Vec<String>,
    },

    /// Resolve a URI without fetching it
    Resolve {
        /// URI to resolve
        #[arg(required = true)]
        uri: String,
    },

    /// List registered resolver platforms
    Platforms,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
