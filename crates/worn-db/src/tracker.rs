//! The tracker facade: the interface callers program against.
//!
//! Owns the store handle plus the two injected seams that keep the core
//! non-interactive and testable: a clock, and the future-timestamp
//! confirmation predicate.

use chrono::{DateTime, Local};
use std::path::Path;
use uuid::Uuid;

use worn_core::{
    LogEvent, Project, ProjectRef, Report, ReportEntry, Resolved, Scale, State, TimestampId,
    report,
};

use crate::TrackError;
use crate::directory::{self, LastStatus};
use crate::history::{self, VersionEntry};
use crate::log;
use crate::store::Store;

type Clock = Box<dyn Fn() -> DateTime<Local>>;
type ConfirmFn = Box<dyn FnMut(&Project, DateTime<Local>) -> bool>;

pub struct Tracker {
    store: Store,
    clock: Clock,
    confirm: ConfirmFn,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker").finish_non_exhaustive()
    }
}

impl Tracker {
    /// Opens a tracker over the store at `path`.
    ///
    /// The default clock is the wall clock and the default confirmation
    /// accepts, which suits non-interactive embedding; interactive
    /// callers inject a prompt via [`Tracker::with_confirm`].
    pub fn open(path: &Path) -> Result<Self, TrackError> {
        Ok(Self::with_store(Store::open(path)?))
    }

    /// A tracker over an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, TrackError> {
        Ok(Self::with_store(Store::open_in_memory()?))
    }

    fn with_store(store: Store) -> Self {
        Self {
            store,
            clock: Box::new(Local::now),
            confirm: Box::new(|_, _| true),
        }
    }

    /// Replaces the future-timestamp confirmation predicate.
    #[must_use]
    pub fn with_confirm(
        mut self,
        confirm: impl FnMut(&Project, DateTime<Local>) -> bool + 'static,
    ) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Replaces the clock; tests freeze it.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    fn now(&self) -> DateTime<Local> {
        (self.clock)()
    }

    /// Resolves a project reference (creating on unknown plain names).
    pub fn resolve(&mut self, target: &ProjectRef) -> Result<Resolved, TrackError> {
        directory::resolve(&mut self.store, target)
    }

    fn require(resolved: Resolved, action: &'static str) -> Result<Project, TrackError> {
        match resolved {
            Resolved::Project(project) => Ok(project),
            Resolved::Placeholder => Err(TrackError::PlaceholderOperation { action }),
        }
    }

    /// Starts a project, stopping whatever was running at the same
    /// instant first.
    pub fn start(
        &mut self,
        target: &ProjectRef,
        at: Option<DateTime<Local>>,
    ) -> Result<Option<TimestampId>, TrackError> {
        let now = self.now();
        let at = at.unwrap_or(now);
        let project = Self::require(self.resolve(target)?, "start")?;

        // One decision covers both writes: declining must not stop the
        // running project while skipping the start.
        if log::needs_confirmation(at, now) && !(self.confirm)(&project, at) {
            tracing::debug!(project = %project.name, %at, "future start declined");
            return Ok(None);
        }
        let mut accept = |_: &Project, _: DateTime<Local>| true;

        if let Some(last) = directory::last(&self.store)? {
            if last.is_running() {
                log::append(
                    &mut self.store,
                    &last.project,
                    State::Stopped,
                    at,
                    now,
                    &mut accept,
                )?;
            }
        }

        log::append(&mut self.store, &project, State::Started, at, now, &mut accept)
    }

    /// Stops a project. A project that is not currently running is left
    /// alone (`Ok(None)`).
    pub fn stop(
        &mut self,
        target: &ProjectRef,
        at: Option<DateTime<Local>>,
    ) -> Result<Option<TimestampId>, TrackError> {
        let now = self.now();
        let at = at.unwrap_or(now);
        let project = Self::require(self.resolve(target)?, "stop")?;

        let running = log::events(&self.store, Some(project.id), None, None, None)?
            .last()
            .is_some_and(|event| event.state.is_running());
        if !running {
            tracing::debug!(project = %project.name, "not running; nothing to stop");
            return Ok(None);
        }

        log::append(
            &mut self.store,
            &project,
            State::Stopped,
            at,
            now,
            &mut self.confirm,
        )
    }

    /// Renames a project.
    pub fn rename(&mut self, target: &ProjectRef, new_name: &str) -> Result<Project, TrackError> {
        let project = Self::require(self.resolve(target)?, "rename")?;
        directory::rename(&mut self.store, &project, new_name)
    }

    /// Removes a project and all of its log events.
    pub fn remove(&mut self, target: &ProjectRef) -> Result<(), TrackError> {
        let project = Self::require(self.resolve(target)?, "remove")?;
        directory::remove(&mut self.store, &project)
    }

    /// Ordered event scan, optionally filtered to one project, bounded
    /// below by `since`, capped at `count`, against the active log or a
    /// superseded version.
    pub fn events(
        &mut self,
        matching: Option<&ProjectRef>,
        since: Option<DateTime<Local>>,
        count: Option<usize>,
        version: Option<Uuid>,
    ) -> Result<Vec<LogEvent>, TrackError> {
        let filter = match matching {
            None => None,
            Some(target) => match self.resolve(target)? {
                Resolved::Project(project) => Some(project.id),
                // Filtering on the placeholder matches nothing.
                Resolved::Placeholder => return Ok(Vec::new()),
            },
        };
        log::events(&self.store, filter, since, count, version)
    }

    /// Moves the event recorded at `at` to `to`; see [`history::edit_time`].
    pub fn edit_time(
        &mut self,
        at: DateTime<Local>,
        to: DateTime<Local>,
        reason: &str,
    ) -> Result<Uuid, TrackError> {
        let now = self.now();
        history::edit_time(&mut self.store, at, to, reason, now)
    }

    /// The derived last project, if the log has any events.
    pub fn last(&self) -> Result<Option<LastStatus>, TrackError> {
        directory::last(&self.store)
    }

    /// All registered projects, sorted by folded name.
    pub fn projects(&self) -> Result<Vec<Project>, TrackError> {
        directory::all(&self.store)
    }

    /// Fuzzy project lookup; see [`directory::nearest_by_name`].
    pub fn nearest(&mut self, fragment: &str) -> Result<Vec<Project>, TrackError> {
        directory::nearest_by_name(&mut self.store, fragment)
    }

    /// The edit audit trail.
    pub fn versions(&self) -> Result<Vec<VersionEntry>, TrackError> {
        history::versions(&self.store)
    }

    /// Records a ticket number against a project for the external
    /// ticketing collaborator.
    pub fn cache(&mut self, ticket: u64, target: &ProjectRef) -> Result<(), TrackError> {
        let project = Self::require(self.resolve(target)?, "cache")?;
        let when = log::events(&self.store, Some(project.id), None, None, None)?
            .last()
            .map_or_else(|| TimestampId::floor(self.now()), |event| event.id);
        directory::cache(&mut self.store, ticket, &project, when)
    }

    /// Builds a report over the (optionally filtered) event log.
    ///
    /// The project currently derived as "last", if still running, has its
    /// open interval closed against the report-generation time.
    pub fn aggregate(
        &mut self,
        matching: Option<&ProjectRef>,
        since: Option<DateTime<Local>>,
        scale: Scale,
        include_all: bool,
        show_header: bool,
    ) -> Result<Report, TrackError> {
        let now = self.now();
        let events = self.events(matching, since, None, None)?;

        let last = directory::last(&self.store)?;
        let running_last = last
            .as_ref()
            .filter(|status| status.is_running())
            .map(|status| status.project.id);

        let totals = report::aggregate(&events, now, running_last);

        let mut entries = Vec::with_capacity(totals.len());
        for (id, total_secs) in &totals {
            let project = directory::get(&self.store, *id)?;
            entries.push(ReportEntry {
                name: project.name,
                id: *id,
                total_secs: *total_secs,
                running: running_last == Some(*id),
            });
        }
        if include_all {
            for project in directory::all(&self.store)? {
                if !totals.contains_key(&project.id) {
                    entries.push(ReportEntry {
                        id: project.id,
                        name: project.name,
                        total_secs: 0,
                        running: false,
                    });
                }
            }
        }
        entries.sort_by_key(|entry| entry.name.to_lowercase());

        Ok(Report {
            entries,
            since,
            scale,
            include_all,
            show_header,
        })
    }
}
