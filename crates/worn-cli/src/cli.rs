//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Minimal project time tracker.
///
/// Tracks which project is being worked on in an append-only event log
/// and reconstructs time totals from it on demand.
#[derive(Debug, Parser)]
#[command(name = "worn", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every prompt.
    #[arg(short = 'y', long = "yes", global = true)]
    pub yes: bool,

    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start tracking a project, stopping the running one first.
    Start {
        /// When the work started (repeatable; words are joined; defaults to now).
        #[arg(short = 't', long = "time", value_name = "TIME")]
        time: Vec<String>,

        /// Project name, id, timestamp id or "last". Words are joined.
        project: Vec<String>,
    },

    /// Stop tracking a project.
    Stop {
        /// When the work stopped (repeatable; words are joined; defaults to now).
        #[arg(short = 't', long = "time", value_name = "TIME")]
        time: Vec<String>,

        /// Project name, id, timestamp id or "last". Words are joined.
        project: Vec<String>,
    },

    /// Rename a project, keeping its id and history.
    Rename {
        /// Current name, id, timestamp id or "last".
        from: String,

        /// The new name.
        to: String,
    },

    /// Remove a project and every log event recorded for it.
    Rm {
        /// Project name, id, timestamp id or "last". Words are joined.
        project: Vec<String>,
    },

    /// Inspect tracker state.
    Show {
        #[command(subcommand)]
        what: ShowWhat,
    },

    /// Summarize time spent per project.
    Report {
        /// Largest unit to show: w, d, h, m or s.
        #[arg(short = 'l', long = "scale", default_value = "h", value_name = "SCALE")]
        scale: String,

        /// Output form.
        #[arg(short = 'f', long = "form", value_enum, default_value_t = ReportForm::Simple)]
        form: ReportForm,

        /// Only count events at or after this time (repeatable; words are joined).
        #[arg(short = 's', long = "since", value_name = "TIME")]
        since: Vec<String>,

        /// Include projects with no recorded time.
        #[arg(short = 'a', long = "all")]
        all: bool,

        /// Suppress the header line.
        #[arg(short = 'H', long = "no-header")]
        no_header: bool,

        /// Restrict to one project. Words are joined.
        project: Vec<String>,
    },

    /// Move a recorded event to a different instant.
    Edit {
        /// The instant of the event to move.
        at: String,

        /// The instant to move it to.
        #[arg(long)]
        to: String,

        /// Why the record is being changed (kept in the audit trail).
        #[arg(long)]
        reason: String,
    },

    /// Print a fresh project id.
    Gen,

    /// Describe the accepted date/time expressions.
    ExplainDates,
}

/// Subjects of `worn show`.
#[derive(Debug, Subcommand)]
pub enum ShowWhat {
    /// The most recently touched project and its state.
    Last,

    /// Every registered project.
    Projects,

    /// The event log.
    Logs {
        /// Show at most this many events.
        #[arg(short = 'n', long = "count")]
        count: Option<usize>,

        /// Only events at or after this time (repeatable; words are joined).
        #[arg(short = 's', long = "since", value_name = "TIME")]
        since: Vec<String>,

        /// Read a superseded log version instead of the active log.
        #[arg(long)]
        version: Option<Uuid>,

        /// Restrict to one project. Words are joined.
        project: Vec<String>,
    },

    /// The history-edit audit trail.
    Versions,

    /// Resolve a name fragment to project ids.
    Id {
        /// Name or name prefix. Words are joined.
        project: Vec<String>,
    },
}

/// Report output forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportForm {
    /// Per-project breakdown with a total column.
    Simple,
    /// Flat comma-separated rows.
    Csv,
    /// Compact colon-separated duration columns.
    Time,
}
