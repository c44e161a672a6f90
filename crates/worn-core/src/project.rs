//! Project identity types and the tagged resolution input.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::id::{TimestampId, is_timestamp_id};

/// A project id and name that are both UUID-shaped, which would make
/// name/id lookups ambiguous.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("project {id} cannot take the uuid-shaped name {name:?}")]
pub struct InvalidIdentity {
    pub id: Uuid,
    pub name: String,
}

/// Whether `s` is a hyphenated UUID string.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && Uuid::try_parse(s).is_ok()
}

/// A tracked project.
///
/// The name is case-preserving for display; the directory indexes it
/// case-folded (see [`Project::fold`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
}

impl Project {
    /// Builds a project, rejecting UUID-shaped names.
    pub fn new(id: Uuid, name: impl Into<String>) -> Result<Self, InvalidIdentity> {
        let name = name.into();
        if is_uuid(name.trim()) {
            return Err(InvalidIdentity { id, name });
        }
        Ok(Self { id, name })
    }

    /// The case-folded, trimmed key the directory indexes this name under.
    pub fn fold(&self) -> String {
        fold_name(&self.name)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.name)
    }
}

/// The case-folded, trimmed form of a project name.
pub fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Whether a project is currently being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Started,
    Stopped,
}

impl State {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }

    pub const fn is_running(self) -> bool {
        matches!(self, Self::Started)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unrecognized project state string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown project state {value:?}")]
pub struct UnknownState {
    pub value: String,
}

impl FromStr for State {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "stopped" => Ok(Self::Stopped),
            _ => Err(UnknownState {
                value: s.to_string(),
            }),
        }
    }
}

/// How a caller names a project.
///
/// Raw input is classified once, up front, and the directory matches
/// exhaustively on the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectRef {
    /// A plain name; created on first reference.
    ByName(String),
    /// An id that must already be registered.
    ById(Uuid),
    /// The project recorded by the log event with this id.
    ByTimestampId(TimestampId),
    /// The project of the most recent log event.
    Last,
    /// No input at all; resolves to the placeholder.
    Empty,
}

impl ProjectRef {
    /// Classifies a raw string.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed.eq_ignore_ascii_case("last") {
            return Self::Last;
        }
        if is_uuid(trimmed) {
            if let Ok(id) = Uuid::try_parse(trimmed) {
                return Self::ById(id);
            }
        }
        if is_timestamp_id(trimmed) {
            if let Ok(id) = trimmed.parse() {
                return Self::ByTimestampId(id);
            }
        }
        Self::ByName(trimmed.to_string())
    }
}

impl From<&Project> for ProjectRef {
    fn from(project: &Project) -> Self {
        Self::ById(project.id)
    }
}

/// The outcome of resolving a [`ProjectRef`].
///
/// `Placeholder` stands in when nothing matches and nothing should be
/// created (an empty log for `Last`, or empty input). It is derived, never
/// stored, and every mutating operation on it fails loudly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Project(Project),
    Placeholder,
}

impl Resolved {
    pub const fn project(&self) -> Option<&Project> {
        match self {
            Self::Project(p) => Some(p),
            Self::Placeholder => None,
        }
    }
}

/// One committed record of the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub id: TimestampId,
    pub project: Uuid,
    pub state: State,
}

impl LogEvent {
    /// The instant of this event (millisecond precision).
    pub fn instant(&self) -> Option<chrono::DateTime<chrono::Local>> {
        self.id.instant()
    }
}
