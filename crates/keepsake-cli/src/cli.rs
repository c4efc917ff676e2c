//! Command-line definition for the `keepsake` maintenance binary.

use clap::{Parser, Subcommand};
use keepsake_core::RecordKind;
use std::path::PathBuf;

/// keepsake - inspect and maintain an agent memory store
#[derive(Parser, Debug)]
#[command(name = "keepsake", version, about = "Inspect and maintain an agent memory store")]
pub struct Cli {
    /// Data root (overrides KEEPSAKE_HOME and ~/.keepsake)
    #[arg(long, value_name = "DIR", global = true)]
    pub home: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Search across all projects; "*" lists everything, newest first
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Restrict to a record type (repeatable)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        types: Vec<RecordKind>,
        /// Restrict to a project (repeatable)
        #[arg(short = 'p', long = "project", value_name = "ID")]
        projects: Vec<String>,
        /// Only records created within this many days
        #[arg(short = 'd', long)]
        days: Option<u32>,
        /// Omit highlighted fragments
        #[arg(long)]
        no_highlight: bool,
    },

    /// Records created recently, newest first
    Recent {
        #[arg(short = 'd', long, default_value_t = 7)]
        days: u32,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        types: Vec<RecordKind>,
    },

    /// Titles starting with a prefix
    Suggest {
        prefix: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Index document counts and size
    Stats,

    /// Delete expired records and their index entries
    Sweep,

    /// Remove index lock markers left by crashed writers
    CleanupLocks {
        /// Remove all markers regardless of age
        #[arg(long)]
        force: bool,
    },

    /// Rebuild the search index from stored records
    Reindex,
}
