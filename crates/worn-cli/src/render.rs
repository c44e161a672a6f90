//! Plain-text rendering of tracker state.
//!
//! Every helper returns a string ending in a newline per line of output;
//! no styling or color.

use std::collections::HashMap;
use std::fmt::Write;

use uuid::Uuid;

use worn_core::{LogEvent, Project, TimestampId};
use worn_db::{LastStatus, VersionEntry};

fn instant_label(id: TimestampId) -> String {
    id.instant()
        .map_or_else(|| id.to_string(), |dt| dt.format("%a %F %T").to_string())
}

/// One line describing the derived last project.
pub fn render_last(status: &LastStatus) -> String {
    format!(
        "{:?} {} {}\n",
        status.project.name,
        status.state.as_str(),
        instant_label(status.when),
    )
}

/// One line per log event, resolving project ids through `names`.
pub fn render_log(events: &[LogEvent], names: &HashMap<Uuid, String>) -> String {
    let mut out = String::new();
    for event in events {
        let name = names
            .get(&event.project)
            .map_or_else(|| event.project.to_string(), Clone::clone);
        writeln!(
            out,
            "{}  {}  {:7}  {:?}",
            event.id,
            instant_label(event.id),
            event.state.as_str(),
            name,
        )
        .unwrap();
    }
    out
}

/// One `id  name` line per project.
pub fn render_projects(projects: &[Project]) -> String {
    let mut out = String::new();
    for project in projects {
        writeln!(out, "{}  {:?}", project.id, project.name).unwrap();
    }
    out
}

/// One line per retained log version.
pub fn render_versions(entries: &[VersionEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        writeln!(
            out,
            "{}  {}  {:?}",
            instant_label(entry.at),
            entry.version,
            entry.reason,
        )
        .unwrap();
    }
    out
}
