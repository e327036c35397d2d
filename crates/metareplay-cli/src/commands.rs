use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "metareplay")]
#[command(about = "Replays filesystem change events into a metadata replica", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply JSON-lines event files, one batch per file, in the order given
    Apply {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Register a backup source and its destination
    AddBackup { src: String, dest: String },
    /// List registered backup mappings
    ListBackups,
    /// List derived file diffs
    ListDiffs {
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
