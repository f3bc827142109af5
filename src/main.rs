//! # td - Hierarchical task tracking CLI
//!
//! A file-backed task tracker built on the `taskdeck` engine: tasks nest to
//! model projects, milestones and subtasks, time is logged against any
//! node, and rollups and timeline spans are computed across subtrees.
//!
//! ## Quick start
//!
//! ```bash
//! # Add a project and a task underneath it
//! td add "Launch" --kind project
//! td add "Write docs" --parent Launch --due "in 2w"
//!
//! # Query with filters, sorting and pagination
//! td list --status in-progress --priority high --sort due --page 1
//!
//! # Re-parent, log time, and roll it up
//! td move "Write docs" Launch
//! td log "Write docs" 90
//! td rollup Launch
//! ```
//!
//! Data is stored locally in `~/.taskdeck/tasks.json`; pass `--db` to use
//! another file. `RUST_LOG` controls diagnostic output.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use taskdeck::cli::Cli;
use taskdeck::cmd::{self, Commands};
use taskdeck::store::JsonStore;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        cmd::cmd_completions(*shell);
        return;
    }

    let db_path = cli.db.clone().unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let dir = PathBuf::from(home).join(".taskdeck");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("Failed to create {}: {e}", dir.display());
            std::process::exit(1);
        }
        dir.join("tasks.json")
    });

    let store = match JsonStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open {}: {e}", db_path.display());
            std::process::exit(1);
        }
    };
    let owner = cli.owner;

    let result = match cli.command {
        Commands::Completions { .. } => unreachable!("handled above"),
        Commands::Add {
            name, desc, due, parent, kind, priority, status, progress,
        } => cmd::cmd_add(&store, owner, name, desc, due, parent, kind, priority, status, progress),

        Commands::List {
            statuses, priorities, kinds, assignees, due_from, due_to,
            search, sort, desc, page, page_size,
        } => cmd::cmd_list(
            &store, owner, statuses, priorities, kinds, assignees,
            due_from, due_to, search, sort, desc, page, page_size,
        ),

        Commands::View { id, children, parents } => {
            cmd::cmd_view(&store, owner, id, children, parents)
        }

        Commands::Update {
            id, name, desc, status, priority, kind, progress, due, clear_due,
        } => cmd::cmd_update(
            &store, owner, id, name, desc, status, priority, kind, progress, due, clear_due,
        ),

        Commands::Move { id, parent } => cmd::cmd_move(&store, owner, id, parent),

        Commands::Promote { id } => cmd::cmd_promote(&store, owner, id),

        Commands::Complete { id } => cmd::cmd_complete(&store, owner, id),

        Commands::Delete { id } => cmd::cmd_delete(&store, owner, id),

        Commands::Log { id, minutes, date, timer } => {
            cmd::cmd_log(&store, owner, id, minutes, date, timer)
        }

        Commands::Assign { id, user } => cmd::cmd_assign(&store, owner, id, user),

        Commands::Rollup { ids } => cmd::cmd_rollup(&store, owner, ids),

        Commands::Timeline { from, to } => cmd::cmd_timeline(&store, owner, from, to),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
