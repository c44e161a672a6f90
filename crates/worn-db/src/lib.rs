//! Storage layer for the worn time tracker.
//!
//! Two SQLite tables (`streams` and `hashes`) back everything: the
//! append-only event log, the project directory, the edit audit trail,
//! and the collaborator cache. The [`Tracker`] facade ties them together
//! and is the type callers program against.
//!
//! # Thread Safety
//!
//! [`Store`] wraps a `rusqlite::Connection`, which is `Send` but not
//! `Sync`. A [`Tracker`] can be moved between threads but not shared
//! without external synchronization.

use thiserror::Error;

use worn_core::{InvalidIdentity, TimeParseError, TimestampId};

pub mod directory;
pub mod history;
pub mod log;
pub mod store;
pub mod tracker;

pub use directory::LastStatus;
pub use history::VersionEntry;
pub use store::{Store, StoreError};
pub use tracker::Tracker;

/// Errors raised by tracker operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// An append or edit would place an event before an existing one.
    #[error("cannot record {attempted}: the log already ends at {latest}")]
    OrderingViolation { attempted: String, latest: String },
    /// An id or timestamp-id lookup found no registered project.
    #[error("no such project: {0}")]
    UnknownProject(String),
    /// A project name or id failed validation.
    #[error(transparent)]
    InvalidIdentity(#[from] InvalidIdentity),
    /// A mutation was attempted against the empty-log placeholder.
    #[error("cannot {action}: no project has been tracked yet")]
    PlaceholderOperation { action: &'static str },
    /// A stored record is missing or has unparseable fields.
    #[error("malformed record {id}: {message}")]
    MalformedRecord { id: TimestampId, message: String },
    /// An error from the underlying store.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A time expression failed to parse.
    #[error(transparent)]
    Time(#[from] TimeParseError),
}
