//! Core domain logic for the worn time tracker.
//!
//! This crate contains the storage-independent pieces:
//! - Time-expression parsing: heterogeneous date/time inputs to instants
//! - Timestamp ids: the composite ordering key of the event log
//! - Project identity types and the tagged resolution input
//! - Report aggregation: paired start/stop events to duration totals

pub mod id;
pub mod project;
pub mod report;
pub mod timeparse;

pub use id::{IdSpec, InvalidTimestampId, TimestampId, is_timestamp_id};
pub use project::{
    InvalidIdentity, LogEvent, Project, ProjectRef, Resolved, State, fold_name, is_uuid,
};
pub use report::{Report, ReportEntry, Scale, aggregate, decompose};
pub use timeparse::{TimeInput, TimeParseError, parse, parse_at};
