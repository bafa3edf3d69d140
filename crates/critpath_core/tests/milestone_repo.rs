use chrono::NaiveDate;
use critpath_core::db::open_db_in_memory;
use critpath_core::{
    Milestone, MilestoneChanges, MilestoneRepository, MilestoneStatus, MilestoneValidationError,
    Project, RepoError, ScheduleWindow, SqliteMilestoneRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn seed_project(repo: &SqliteMilestoneRepository<'_>) -> Project {
    let project = Project::new("Launch", Some(date(2024, 1, 1)));
    repo.upsert_project(&project).unwrap();
    project
}

fn milestone(project: &Project, name: &str, sort_order: i64, deps: &[&Milestone]) -> Milestone {
    let mut milestone = Milestone::new(project.uuid, name);
    milestone.duration_days = Some(3);
    milestone.sort_order = sort_order;
    milestone.dependencies = deps.iter().map(|dep| dep.uuid).collect();
    milestone
}

#[test]
fn store_rejects_connection_without_latest_schema() {
    let conn = Connection::open_in_memory().unwrap();
    let result = SqliteMilestoneRepository::try_new(&conn);
    assert!(matches!(result, Err(RepoError::InvalidData(_))));
}

#[test]
fn milestone_round_trips_with_dates_status_and_window() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let mut original = milestone(&project, "Design review", 0, &[]);
    original.start_date = Some(date(2024, 2, 5));
    original.end_date = Some(date(2024, 2, 9));
    original.start_offset_days = Some(2);
    original.custom_start_date = Some(date(2024, 2, 6));
    original.status = MilestoneStatus::InProgress;
    original.schedule = Some(ScheduleWindow {
        earliest_start: date(2024, 2, 5),
        earliest_finish: date(2024, 2, 9),
        latest_start: date(2024, 2, 7),
        latest_finish: date(2024, 2, 11),
        slack_days: 2,
        is_critical: false,
    });

    let saved = repo.save_milestone(&original).unwrap();
    assert_eq!(saved, original);
    assert_eq!(repo.get_milestone(original.uuid).unwrap(), Some(original));
}

#[test]
fn project_anchor_date_comes_from_project_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    assert_eq!(
        repo.load_project_anchor_date(project.uuid).unwrap(),
        Some(date(2024, 1, 1))
    );

    let mut moved = project.clone();
    moved.start_date = None;
    repo.upsert_project(&moved).unwrap();
    assert_eq!(repo.load_project_anchor_date(project.uuid).unwrap(), None);
    assert_eq!(repo.get_project(project.uuid).unwrap(), Some(moved));

    let missing = Uuid::new_v4();
    assert!(matches!(
        repo.load_project_anchor_date(missing),
        Err(RepoError::ProjectNotFound(id)) if id == missing
    ));
}

#[test]
fn saving_into_unknown_project_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let ghost = Project::new("ghost", None);

    let err = repo
        .save_milestone(&milestone(&ghost, "orphan", 0, &[]))
        .unwrap_err();
    assert!(matches!(err, RepoError::ProjectNotFound(id) if id == ghost.uuid));
}

#[test]
fn invalid_milestone_is_rejected_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let mut negative = milestone(&project, "negative", 0, &[]);
    negative.duration_days = Some(-1);
    let err = repo.save_milestone(&negative).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(MilestoneValidationError::NegativeDuration(-1))
    ));
    assert!(repo.get_milestone(negative.uuid).unwrap().is_none());
}

#[test]
fn project_listing_is_ordered_and_carries_dependencies() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let a = milestone(&project, "a", 2, &[]);
    let b = milestone(&project, "b", 0, &[]);
    let c = milestone(&project, "c", 1, &[&b, &a]);
    for item in [&a, &b, &c] {
        repo.save_milestone(item).unwrap();
    }

    let listed = repo.load_project_milestones(project.uuid).unwrap();
    let names: Vec<_> = listed.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["b", "c", "a"]);
    assert_eq!(listed[1].dependencies, vec![b.uuid, a.uuid]);
    assert!(listed[0].dependencies.is_empty());
}

#[test]
fn resaving_replaces_dependency_edges() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let a = milestone(&project, "a", 0, &[]);
    let b = milestone(&project, "b", 1, &[]);
    let mut c = milestone(&project, "c", 2, &[&a]);
    for item in [&a, &b, &c] {
        repo.save_milestone(item).unwrap();
    }

    c.dependencies = vec![b.uuid];
    let saved = repo.save_milestone(&c).unwrap();
    assert_eq!(saved.dependencies, vec![b.uuid]);
    assert!(repo.find_dependents(project.uuid, a.uuid).unwrap().is_empty());
}

#[test]
fn edge_to_unknown_milestone_is_rejected_by_store() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let mut dangling = milestone(&project, "dangling", 0, &[]);
    dangling.dependencies = vec![Uuid::new_v4()];
    assert!(matches!(
        repo.save_milestone(&dangling),
        Err(RepoError::Db(_))
    ));
    assert!(repo.get_milestone(dangling.uuid).unwrap().is_none());
}

#[test]
fn find_dependents_returns_direct_dependents_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let root = milestone(&project, "root", 0, &[]);
    let x = milestone(&project, "x", 1, &[&root]);
    let y = milestone(&project, "y", 2, &[&root]);
    let z = milestone(&project, "z", 3, &[&x]);
    for item in [&root, &x, &y, &z] {
        repo.save_milestone(item).unwrap();
    }

    let dependents = repo.find_dependents(project.uuid, root.uuid).unwrap();
    let ids: Vec<_> = dependents.iter().map(|m| m.uuid).collect();
    assert_eq!(ids, vec![x.uuid, y.uuid]);
    assert_eq!(dependents[0].dependencies, vec![root.uuid]);
}

#[test]
fn save_milestones_updates_derived_fields_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let stored = repo
        .save_milestone(&milestone(&project, "stored", 0, &[]))
        .unwrap();
    let mut scheduled = stored.clone();
    scheduled.name = "renamed in memory".to_string();
    scheduled.schedule = Some(ScheduleWindow {
        earliest_start: date(2024, 1, 1),
        earliest_finish: date(2024, 1, 4),
        latest_start: date(2024, 1, 1),
        latest_finish: date(2024, 1, 4),
        slack_days: 0,
        is_critical: true,
    });

    repo.save_milestones(&[scheduled.clone()]).unwrap();
    let reloaded = repo.get_milestone(stored.uuid).unwrap().unwrap();
    assert_eq!(reloaded.name, "stored");
    assert_eq!(reloaded.schedule, scheduled.schedule);

    let unknown = milestone(&project, "unknown", 1, &[]);
    assert!(matches!(
        repo.save_milestones(&[unknown.clone()]),
        Err(RepoError::NotFound(id)) if id == unknown.uuid
    ));
}

#[test]
fn delete_cascades_dependency_edges() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let a = milestone(&project, "a", 0, &[]);
    let b = milestone(&project, "b", 1, &[&a]);
    repo.save_milestone(&a).unwrap();
    repo.save_milestone(&b).unwrap();

    repo.delete_milestone(a.uuid).unwrap();
    let remaining = repo.load_project_milestones(project.uuid).unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].dependencies.is_empty());

    assert!(matches!(
        repo.delete_milestone(a.uuid),
        Err(RepoError::NotFound(id)) if id == a.uuid
    ));
}

#[test]
fn commit_changes_rewires_deletes_and_stamps_together() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let base = milestone(&project, "base", 0, &[]);
    let target = milestone(&project, "target", 1, &[&base]);
    let dependent = milestone(&project, "dependent", 2, &[&target]);
    for m in [&base, &target, &dependent] {
        repo.save_milestone(m).unwrap();
    }

    let mut rewired = dependent.clone();
    rewired.dependencies = vec![base.uuid];
    let mut scheduled = base.clone();
    scheduled.schedule = Some(ScheduleWindow {
        earliest_start: date(2024, 1, 1),
        earliest_finish: date(2024, 1, 4),
        latest_start: date(2024, 1, 1),
        latest_finish: date(2024, 1, 4),
        slack_days: 0,
        is_critical: true,
    });

    repo.commit_changes(&MilestoneChanges {
        upserts: &[rewired],
        delete: Some(target.uuid),
        scheduled: &[scheduled.clone()],
    })
    .unwrap();

    assert!(repo.get_milestone(target.uuid).unwrap().is_none());
    let reloaded = repo.get_milestone(dependent.uuid).unwrap().unwrap();
    assert_eq!(reloaded.dependencies, vec![base.uuid]);
    let base_reloaded = repo.get_milestone(base.uuid).unwrap().unwrap();
    assert_eq!(base_reloaded.schedule, scheduled.schedule);
}

#[test]
fn failed_commit_changes_keeps_every_earlier_write_out() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteMilestoneRepository::try_new(&conn).unwrap();
    let project = seed_project(&repo);

    let base = milestone(&project, "base", 0, &[]);
    let target = milestone(&project, "target", 1, &[&base]);
    let dependent = milestone(&project, "dependent", 2, &[&target]);
    for m in [&base, &target, &dependent] {
        repo.save_milestone(m).unwrap();
    }

    let mut rewired = dependent.clone();
    rewired.dependencies = vec![base.uuid];
    let missing = Uuid::new_v4();
    assert!(matches!(
        repo.commit_changes(&MilestoneChanges {
            upserts: &[rewired.clone()],
            delete: Some(missing),
            scheduled: &[],
        }),
        Err(RepoError::NotFound(id)) if id == missing
    ));
    assert_eq!(
        repo.get_milestone(dependent.uuid).unwrap().unwrap().dependencies,
        vec![target.uuid]
    );

    let stray = milestone(&project, "stray", 3, &[]);
    assert!(matches!(
        repo.commit_changes(&MilestoneChanges {
            upserts: &[rewired],
            delete: Some(target.uuid),
            scheduled: &[stray],
        }),
        Err(RepoError::NotFound(_))
    ));
    assert!(repo.get_milestone(target.uuid).unwrap().is_some());
    assert_eq!(
        repo.get_milestone(dependent.uuid).unwrap().unwrap().dependencies,
        vec![target.uuid]
    );
}
