//! The append-only event log.
//!
//! Ordered `(timestamp-id, project, state)` records under the `logs`
//! stream key. Appends enforce monotonic order against the log tail; the
//! history replay is the only writer allowed to bypass that guard.

use chrono::{DateTime, Duration, Local};
use uuid::Uuid;

use worn_core::{IdSpec, LogEvent, Project, State, TimestampId};

use crate::TrackError;
use crate::store::{Fields, Store};

pub const LOGS: &str = "logs";

/// Appends this far into the future proceed without confirmation.
pub const GRACE_SECONDS: i64 = 10;

/// Asked before committing an event more than the grace period in the
/// future; returning `false` turns the append into a no-op.
pub type Confirm<'a> = &'a mut dyn FnMut(&Project, DateTime<Local>) -> bool;

fn field(fields: &Fields, id: TimestampId, name: &str) -> Result<String, TrackError> {
    fields
        .get(name)
        .cloned()
        .ok_or_else(|| TrackError::MalformedRecord {
            id,
            message: format!("missing field {name:?}"),
        })
}

pub(crate) fn decode(id: TimestampId, fields: &Fields) -> Result<LogEvent, TrackError> {
    let project = field(fields, id, "project")?;
    let project = Uuid::try_parse(&project).map_err(|_| TrackError::MalformedRecord {
        id,
        message: format!("bad project id {project:?}"),
    })?;
    // Missing state on very old records means stopped.
    let state = match fields.get("state") {
        None => State::Stopped,
        Some(raw) => raw.parse().map_err(|_| TrackError::MalformedRecord {
            id,
            message: format!("bad state {raw:?}"),
        })?,
    };
    Ok(LogEvent { id, project, state })
}

fn encode(project: Uuid, state: State) -> Fields {
    let mut fields = Fields::new();
    fields.insert("project".to_string(), project.to_string());
    fields.insert("state".to_string(), state.as_str().to_string());
    fields
}

/// Appends a state change for a project.
///
/// Rejects instants strictly earlier than the log tail with
/// [`TrackError::OrderingViolation`]. An instant more than
/// [`GRACE_SECONDS`] past `now` is submitted to `confirm` first; a
/// declined confirmation returns `Ok(None)` without writing anything.
pub fn append(
    store: &mut Store,
    project: &Project,
    state: State,
    at: DateTime<Local>,
    now: DateTime<Local>,
    confirm: Confirm<'_>,
) -> Result<Option<TimestampId>, TrackError> {
    if let Some(latest) = latest(store)? {
        if at.timestamp_millis() < latest.id.millis {
            return Err(TrackError::OrderingViolation {
                attempted: at.format("%F %T").to_string(),
                latest: latest
                    .instant()
                    .map_or_else(|| latest.id.to_string(), |dt| dt.format("%F %T").to_string()),
            });
        }
    }

    if needs_confirmation(at, now) && !confirm(project, at) {
        tracing::debug!(project = %project.name, %at, "future append declined");
        return Ok(None);
    }

    let id = store.append(LOGS, &encode(project.id, state), IdSpec::from_instant(at))?;
    tracing::debug!(project = %project.name, %state, %id, "logged");
    Ok(Some(id))
}

/// Whether an instant is far enough past `now` that committing it needs
/// the caller's confirmation.
pub fn needs_confirmation(at: DateTime<Local>, now: DateTime<Local>) -> bool {
    at > now + Duration::seconds(GRACE_SECONDS)
}

/// Re-appends an event under a caller-chosen id and stream key, without
/// the ordering guard. Only the history replay uses this.
pub(crate) fn append_exact(
    store: &mut Store,
    key: &str,
    project: Uuid,
    state: State,
    id: IdSpec,
) -> Result<TimestampId, TrackError> {
    Ok(store.append(key, &encode(project, state), id)?)
}

/// Ordered scan of the active log (or a superseded version of it).
///
/// `count` caps the records scanned, before the `matching` filter.
pub fn events(
    store: &Store,
    matching: Option<Uuid>,
    since: Option<DateTime<Local>>,
    count: Option<usize>,
    version: Option<Uuid>,
) -> Result<Vec<LogEvent>, TrackError> {
    let key = version.map_or_else(|| LOGS.to_string(), |v| format!("logs-{v}"));
    let start = since.map(TimestampId::floor);
    let records = store.range(&key, start, None, count, false)?;

    let mut events = Vec::with_capacity(records.len());
    for (id, fields) in &records {
        let event = decode(*id, fields)?;
        if matching.is_none_or(|project| event.project == project) {
            events.push(event);
        }
    }
    Ok(events)
}

/// The event stored under exactly this id, if any.
pub(crate) fn events_at(store: &Store, id: TimestampId) -> Result<Vec<LogEvent>, TrackError> {
    let records = store.range(LOGS, Some(id), Some(id), Some(1), false)?;
    records
        .iter()
        .map(|(id, fields)| decode(*id, fields))
        .collect()
}

/// The log tail, from which the "last project" is derived.
pub fn latest(store: &Store) -> Result<Option<LogEvent>, TrackError> {
    match store.last(LOGS)? {
        Some((id, fields)) => Ok(Some(decode(id, &fields)?)),
        None => Ok(None),
    }
}

/// Removes one event from the active log.
pub fn delete_event(store: &mut Store, id: TimestampId) -> Result<bool, TrackError> {
    Ok(store.delete(LOGS, id)?)
}
