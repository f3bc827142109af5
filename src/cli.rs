use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed hierarchical task tracker CLI.
/// Storage defaults to ~/.taskdeck/tasks.json or a path passed via --db.
#[derive(Parser)]
#[command(name = "td", version, about = "Hierarchical task tracking CLI")]
pub struct Cli {
    /// Path to the JSON database file.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Acting owner identity for all operations.
    #[arg(long, global = true, default_value_t = 1)]
    pub owner: u64,

    #[command(subcommand)]
    pub command: Commands,
}
