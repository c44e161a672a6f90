//! The project directory: the bidirectional name↔UUID index.
//!
//! Backed by the `projects` hash, which holds both directions at once:
//! case-folded name → id, and id → display name. Reads always hit the
//! store, so a rename is visible to the very next lookup.

use uuid::Uuid;

use worn_core::{Project, ProjectRef, Resolved, State, TimestampId, fold_name, is_uuid};

use crate::TrackError;
use crate::log;
use crate::store::Store;

pub const PROJECTS: &str = "projects";
const TICKETS: &str = "cache:tickets";
const RECORDED: &str = "cache:recorded";

/// The derived "last project": the tail of the log resolved through the
/// directory. Never stored, always recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastStatus {
    pub project: Project,
    pub state: State,
    pub when: TimestampId,
}

impl LastStatus {
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// Resolves a project reference, creating a project when a plain unknown
/// name is given.
pub fn resolve(store: &mut Store, target: &ProjectRef) -> Result<Resolved, TrackError> {
    match target {
        ProjectRef::ById(id) => get(store, *id).map(Resolved::Project),
        ProjectRef::ByName(name) => by_name(store, name),
        ProjectRef::ByTimestampId(id) => {
            let events = log::events_at(store, *id)?;
            match events.first() {
                Some(event) => get(store, event.project).map(Resolved::Project),
                None => Err(TrackError::UnknownProject(id.to_string())),
            }
        }
        ProjectRef::Last => Ok(last(store)?.map_or(Resolved::Placeholder, |status| {
            Resolved::Project(status.project)
        })),
        ProjectRef::Empty => {
            tracing::debug!("empty project reference resolves to the placeholder");
            Ok(Resolved::Placeholder)
        }
    }
}

fn by_name(store: &mut Store, name: &str) -> Result<Resolved, TrackError> {
    // A UUID-shaped string can still arrive as ByName when callers build
    // the variant themselves; treat a registered id as an id lookup.
    let trimmed = name.trim();
    if is_uuid(trimmed) {
        if let Ok(id) = Uuid::try_parse(trimmed) {
            return get(store, id).map(Resolved::Project);
        }
    }
    match store.hget(PROJECTS, &fold_name(name))? {
        Some(id) => {
            let id = Uuid::try_parse(&id).map_err(|_| TrackError::UnknownProject(id))?;
            get(store, id).map(Resolved::Project)
        }
        None => create(store, name).map(Resolved::Project),
    }
}

/// Looks up a registered project by id.
pub fn get(store: &Store, id: Uuid) -> Result<Project, TrackError> {
    let name = store
        .hget(PROJECTS, &id.to_string())?
        .ok_or_else(|| TrackError::UnknownProject(id.to_string()))?;
    Project::new(id, name).map_err(TrackError::from)
}

/// Registers a new project under a fresh id.
///
/// Insert-if-absent on the name key: if another writer registered the
/// same folded name first, that registration wins and is returned.
pub fn create(store: &mut Store, name: &str) -> Result<Project, TrackError> {
    let project = Project::new(Uuid::new_v4(), name.trim())?;
    let folded = project.fold();
    if store.hset_nx(PROJECTS, &folded, &project.id.to_string())? {
        store.hset(PROJECTS, &project.id.to_string(), &project.name)?;
        tracing::debug!(id = %project.id, name = %project.name, "created project");
        Ok(project)
    } else {
        let winner = store
            .hget(PROJECTS, &folded)?
            .ok_or_else(|| TrackError::UnknownProject(folded))?;
        let id = Uuid::try_parse(&winner).map_err(|_| TrackError::UnknownProject(winner))?;
        get(store, id)
    }
}

/// Fuzzy name lookup.
///
/// An exact (case-insensitive) name or registered id short-circuits to a
/// single match; otherwise every directory name whose leading
/// `fragment.len()` characters match the fragment case-insensitively is
/// returned, deduplicated and sorted by folded name. An empty result
/// means "no match"; the caller decides whether to offer creation.
pub fn nearest_by_name(store: &mut Store, fragment: &str) -> Result<Vec<Project>, TrackError> {
    let trimmed = fragment.trim();
    if trimmed.eq_ignore_ascii_case("last") {
        return Ok(resolve(store, &ProjectRef::Last)?
            .project()
            .cloned()
            .into_iter()
            .collect());
    }
    if is_uuid(trimmed) {
        if let Ok(id) = Uuid::try_parse(trimmed) {
            if let Ok(project) = get(store, id) {
                return Ok(vec![project]);
            }
        }
        return Ok(Vec::new());
    }

    let folded = fold_name(trimmed);
    if let Some(id) = store.hget(PROJECTS, &folded)? {
        let id = Uuid::try_parse(&id).map_err(|_| TrackError::UnknownProject(id))?;
        return Ok(vec![get(store, id)?]);
    }

    let mut matches = Vec::new();
    for label in store.hkeys(PROJECTS)? {
        // uuid fields are the reverse id→name entries, not names
        if is_uuid(&label) || label.len() < folded.len() {
            continue;
        }
        if label.starts_with(folded.as_str()) {
            if let Some(id) = store.hget(PROJECTS, &label)? {
                if let Ok(id) = Uuid::try_parse(&id) {
                    matches.push(get(store, id)?);
                }
            }
        }
    }
    matches.sort_by_key(Project::fold);
    matches.dedup_by_key(|p| p.id);
    Ok(matches)
}

/// Renames a project, atomically swapping the folded name key.
pub fn rename(store: &mut Store, project: &Project, new_name: &str) -> Result<Project, TrackError> {
    let renamed = Project::new(project.id, new_name.trim())?;
    store.hset(PROJECTS, &project.id.to_string(), &renamed.name)?;
    store.hdel(PROJECTS, &project.fold())?;
    store.hset(PROJECTS, &renamed.fold(), &renamed.id.to_string())?;
    tracing::debug!(id = %project.id, from = %project.name, to = %renamed.name, "renamed project");
    Ok(renamed)
}

/// Every registered project, sorted by folded name.
///
/// Only the UUID-keyed entries are projects; the name→id entries are the
/// reverse index.
pub fn all(store: &Store) -> Result<Vec<Project>, TrackError> {
    let mut projects = Vec::new();
    for (field, value) in store.hgetall(PROJECTS)? {
        if let Ok(id) = Uuid::try_parse(&field) {
            projects.push(Project::new(id, value)?);
        }
    }
    projects.sort_by_key(Project::fold);
    Ok(projects)
}

/// Removes a project and cascades to delete all of its log events.
pub fn remove(store: &mut Store, project: &Project) -> Result<(), TrackError> {
    let events = log::events(store, Some(project.id), None, None, None)?;
    for event in &events {
        store.delete(log::LOGS, event.id)?;
    }
    store.hdel(PROJECTS, &project.fold())?;
    store.hdel(PROJECTS, &project.id.to_string())?;
    tracing::debug!(id = %project.id, events = events.len(), "removed project");
    Ok(())
}

/// Write-through hooks for an external ticketing collaborator.
pub fn cache(
    store: &mut Store,
    ticket: u64,
    project: &Project,
    when: TimestampId,
) -> Result<(), TrackError> {
    store.hset(TICKETS, &project.id.to_string(), &ticket.to_string())?;
    store.hset(RECORDED, &project.id.to_string(), &when.to_string())?;
    Ok(())
}

/// Derives the last project from the log tail.
pub fn last(store: &Store) -> Result<Option<LastStatus>, TrackError> {
    let Some(event) = log::latest(store)? else {
        return Ok(None);
    };
    let project = get(store, event.project)?;
    Ok(Some(LastStatus {
        project,
        state: event.state,
        when: event.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn unknown_names_are_created_with_fresh_ids() {
        let mut store = mem();
        let Resolved::Project(alpha) = resolve(&mut store, &ProjectRef::parse("Alpha")).unwrap()
        else {
            panic!("expected a project");
        };
        assert_eq!(alpha.name, "Alpha");

        // Same folded name resolves to the same project.
        let again = resolve(&mut store, &ProjectRef::parse("alpha")).unwrap();
        assert_eq!(again.project().unwrap().id, alpha.id);

        // Round-trip through the id.
        let by_id = resolve(&mut store, &ProjectRef::ById(alpha.id)).unwrap();
        assert_eq!(by_id.project().unwrap(), &alpha);
    }

    #[test]
    fn unknown_ids_are_not_created() {
        let mut store = mem();
        assert!(matches!(
            resolve(&mut store, &ProjectRef::ById(Uuid::new_v4())),
            Err(TrackError::UnknownProject(_))
        ));
    }

    #[test]
    fn empty_reference_is_the_placeholder() {
        let mut store = mem();
        assert_eq!(
            resolve(&mut store, &ProjectRef::Empty).unwrap(),
            Resolved::Placeholder
        );
        // Empty log: "last" is the placeholder too.
        assert_eq!(
            resolve(&mut store, &ProjectRef::Last).unwrap(),
            Resolved::Placeholder
        );
    }

    #[test]
    fn nearest_prefers_exact_matches() {
        let mut store = mem();
        create(&mut store, "alpha").unwrap();
        create(&mut store, "alphabet").unwrap();

        let hits = nearest_by_name(&mut store, "ALPHA").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "alpha");
    }

    #[test]
    fn nearest_falls_back_to_prefix_matches() {
        let mut store = mem();
        create(&mut store, "alpha").unwrap();
        create(&mut store, "alphabet").unwrap();
        create(&mut store, "beta").unwrap();

        let hits = nearest_by_name(&mut store, "alp").unwrap();
        let names: Vec<&str> = hits.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "alphabet"]);

        assert!(nearest_by_name(&mut store, "gamma").unwrap().is_empty());
    }

    #[test]
    fn rename_swaps_the_folded_key() {
        let mut store = mem();
        let project = create(&mut store, "Old Name").unwrap();
        let renamed = rename(&mut store, &project, "New Name").unwrap();
        assert_eq!(renamed.id, project.id);

        // Old name is gone, the new one resolves to the same id.
        assert!(store.hget(PROJECTS, "old name").unwrap().is_none());
        let found = resolve(&mut store, &ProjectRef::parse("new name")).unwrap();
        assert_eq!(found.project().unwrap().id, project.id);
    }

    #[test]
    fn rename_to_a_uuid_shaped_name_is_rejected() {
        let mut store = mem();
        let project = create(&mut store, "alpha").unwrap();
        assert!(matches!(
            rename(&mut store, &project, &Uuid::new_v4().to_string()),
            Err(TrackError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn all_lists_only_projects_sorted_by_folded_name() {
        let mut store = mem();
        create(&mut store, "Zulu").unwrap();
        create(&mut store, "alpha").unwrap();
        let names: Vec<String> = all(&store).unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "Zulu"]);
    }

    #[test]
    fn create_is_insert_if_absent() {
        let mut store = mem();
        let first = create(&mut store, "alpha").unwrap();
        let second = create(&mut store, "  ALPHA ").unwrap();
        assert_eq!(first.id, second.id);
    }
}
