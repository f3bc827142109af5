//! Enumerations and field types for the task engine.
//!
//! This module defines the structured data types used to categorise tasks
//! and time entries, plus their ranking and display helpers.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Task completion status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[serde(alias = "ToDo")]
    ToDo,
    #[serde(alias = "InProgress")]
    InProgress,
    #[serde(alias = "Blocked")]
    Blocked,
    #[serde(alias = "Waiting")]
    Waiting,
    #[serde(alias = "Done")]
    Done,
}

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Hierarchical task types that define the organisational structure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    #[serde(alias = "Project")]
    Project,
    #[serde(alias = "Milestone")]
    Milestone,
    #[serde(alias = "Task")]
    Task,
}

/// How a time entry was recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    Manual,
    Timer,
}

/// Rank a status for ordering (workflow order, Done last).
pub fn status_rank(s: Status) -> u8 {
    match s {
        Status::ToDo => 0,
        Status::InProgress => 1,
        Status::Blocked => 2,
        Status::Waiting => 3,
        Status::Done => 4,
    }
}

/// Rank a priority for ordering (Critical first).
pub fn priority_rank(p: Priority) -> u8 {
    match p {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

/// Format a task status for display.
pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::ToDo => "ToDo",
        Status::InProgress => "InProgress",
        Status::Blocked => "Blocked",
        Status::Waiting => "Waiting",
        Status::Done => "Done",
    }
}

/// Format a priority level for display.
pub fn format_priority(p: Priority) -> &'static str {
    match p {
        Priority::Low => "Low",
        Priority::Medium => "Medium",
        Priority::High => "High",
        Priority::Critical => "Critical",
    }
}

/// Format a task kind for display.
pub fn format_kind(k: Kind) -> &'static str {
    match k {
        Kind::Project => "Project",
        Kind::Milestone => "Milestone",
        Kind::Task => "Task",
    }
}

/// Format an entry type for display.
pub fn format_entry_type(e: EntryType) -> &'static str {
    match e {
        EntryType::Manual => "Manual",
        EntryType::Timer => "Timer",
    }
}
