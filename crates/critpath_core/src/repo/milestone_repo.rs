//! Milestone store contract and SQLite implementation.
//!
//! # Responsibility
//! - Define the persistence contract the scheduler consumes.
//! - Keep SQL, date encoding and edge-table details inside the store.
//!
//! # Invariants
//! - Write paths call `Milestone::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Project listings are ordered by `sort_order ASC, milestone_uuid ASC`.
//! - A milestone and its dependency edges are always written together.
//! - `commit_changes` is all-or-nothing.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::milestone::{
    Milestone, MilestoneId, MilestoneStatus, MilestoneValidationError, ScheduleWindow,
};
use crate::model::project::{Project, ProjectId};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const MILESTONE_SELECT_SQL: &str = "SELECT
    milestone_uuid,
    project_uuid,
    name,
    start_date,
    end_date,
    duration_days,
    start_offset_days,
    custom_start_date,
    sort_order,
    status,
    earliest_start,
    earliest_finish,
    latest_start,
    latest_finish,
    slack_days,
    is_critical
FROM milestones";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store error for milestone persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Validation(MilestoneValidationError),
    Db(DbError),
    NotFound(MilestoneId),
    ProjectNotFound(ProjectId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "milestone not found: {id}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted milestone data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::ProjectNotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<MilestoneValidationError> for RepoError {
    fn from(value: MilestoneValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract consumed by the scheduler.
pub trait MilestoneRepository {
    /// Loads every milestone of a project in display order.
    fn load_project_milestones(&self, project_uuid: ProjectId) -> RepoResult<Vec<Milestone>>;
    /// Loads the project's start date, the default forward-pass anchor.
    fn load_project_anchor_date(&self, project_uuid: ProjectId) -> RepoResult<Option<NaiveDate>>;
    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>>;
    /// Inserts or fully replaces one milestone, edges included.
    fn save_milestone(&self, milestone: &Milestone) -> RepoResult<Milestone>;
    /// Overwrites the derived schedule fields of many milestones at once.
    fn save_milestones(&self, milestones: &[Milestone]) -> RepoResult<()>;
    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<()>;
    /// Milestones of `project_uuid` whose dependencies include `id`.
    fn find_dependents(&self, project_uuid: ProjectId, id: MilestoneId)
        -> RepoResult<Vec<Milestone>>;
    /// Applies one mutation atomically: full upserts first, then the optional
    /// delete, then the derived-field stamp. Nothing is kept on failure.
    fn commit_changes(&self, changes: &MilestoneChanges<'_>) -> RepoResult<()>;
}

/// Writes that make up one scheduling mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MilestoneChanges<'a> {
    /// Inserted or fully replaced, edges included.
    pub upserts: &'a [Milestone],
    pub delete: Option<MilestoneId>,
    /// Derived schedule fields to overwrite.
    pub scheduled: &'a [Milestone],
}

impl<T: MilestoneRepository + ?Sized> MilestoneRepository for &T {
    fn load_project_milestones(&self, project_uuid: ProjectId) -> RepoResult<Vec<Milestone>> {
        (**self).load_project_milestones(project_uuid)
    }

    fn load_project_anchor_date(&self, project_uuid: ProjectId) -> RepoResult<Option<NaiveDate>> {
        (**self).load_project_anchor_date(project_uuid)
    }

    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>> {
        (**self).get_milestone(id)
    }

    fn save_milestone(&self, milestone: &Milestone) -> RepoResult<Milestone> {
        (**self).save_milestone(milestone)
    }

    fn save_milestones(&self, milestones: &[Milestone]) -> RepoResult<()> {
        (**self).save_milestones(milestones)
    }

    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<()> {
        (**self).delete_milestone(id)
    }

    fn find_dependents(
        &self,
        project_uuid: ProjectId,
        id: MilestoneId,
    ) -> RepoResult<Vec<Milestone>> {
        (**self).find_dependents(project_uuid, id)
    }

    fn commit_changes(&self, changes: &MilestoneChanges<'_>) -> RepoResult<()> {
        (**self).commit_changes(changes)
    }
}

/// SQLite-backed milestone store.
pub struct SqliteMilestoneRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMilestoneRepository<'conn> {
    /// Creates the store from a migrated connection.
    ///
    /// # Errors
    /// - `InvalidData` when the connection schema is not at the latest version.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected = latest_version();
        let actual: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual != expected {
            return Err(RepoError::InvalidData(format!(
                "milestone store requires schema version {expected}, got {actual}"
            )));
        }
        Ok(Self { conn })
    }

    /// Inserts or updates the host-owned project record.
    pub fn upsert_project(&self, project: &Project) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO projects (project_uuid, name, start_date)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_uuid) DO UPDATE SET
                name = excluded.name,
                start_date = excluded.start_date,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                project.uuid.to_string(),
                project.name.as_str(),
                project.start_date.map(format_date),
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, project_uuid: ProjectId) -> RepoResult<Option<Project>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT name, start_date FROM projects WHERE project_uuid = ?1;",
                [project_uuid.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(name, start_date)| -> RepoResult<Project> {
            Ok(Project {
                uuid: project_uuid,
                name,
                start_date: parse_optional_date(start_date, "projects.start_date")?,
            })
        })
        .transpose()
    }
}

impl MilestoneRepository for SqliteMilestoneRepository<'_> {
    fn load_project_milestones(&self, project_uuid: ProjectId) -> RepoResult<Vec<Milestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MILESTONE_SELECT_SQL}
             WHERE project_uuid = ?1
             ORDER BY sort_order ASC, milestone_uuid ASC;"
        ))?;
        let mut rows = stmt.query([project_uuid.to_string()])?;
        let mut milestones = Vec::new();
        while let Some(row) = rows.next()? {
            milestones.push(parse_milestone_row(row)?);
        }

        attach_dependencies(self.conn, project_uuid, &mut milestones)?;
        Ok(milestones)
    }

    fn load_project_anchor_date(&self, project_uuid: ProjectId) -> RepoResult<Option<NaiveDate>> {
        self.get_project(project_uuid)?
            .map(|project| project.start_date)
            .ok_or(RepoError::ProjectNotFound(project_uuid))
    }

    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MILESTONE_SELECT_SQL}
             WHERE milestone_uuid = ?1;"
        ))?;
        let mut rows = stmt.query([id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut milestone = parse_milestone_row(row)?;
        milestone.dependencies = load_dependencies(self.conn, id)?;
        Ok(Some(milestone))
    }

    fn save_milestone(&self, milestone: &Milestone) -> RepoResult<Milestone> {
        milestone.validate()?;
        ensure_project_exists(self.conn, milestone.project_uuid)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        write_milestone(&tx, milestone)?;
        tx.commit()?;

        self.get_milestone(milestone.uuid)?
            .ok_or(RepoError::NotFound(milestone.uuid))
    }

    fn save_milestones(&self, milestones: &[Milestone]) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for milestone in milestones {
            write_schedule(&tx, milestone)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_milestone(&self, id: MilestoneId) -> RepoResult<()> {
        delete_row(self.conn, id)
    }

    fn find_dependents(
        &self,
        project_uuid: ProjectId,
        id: MilestoneId,
    ) -> RepoResult<Vec<Milestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MILESTONE_SELECT_SQL}
             WHERE project_uuid = ?1
               AND milestone_uuid IN (
                 SELECT milestone_uuid
                 FROM milestone_dependencies
                 WHERE depends_on_uuid = ?2
               )
             ORDER BY sort_order ASC, milestone_uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![project_uuid.to_string(), id.to_string()])?;
        let mut milestones = Vec::new();
        while let Some(row) = rows.next()? {
            milestones.push(parse_milestone_row(row)?);
        }

        attach_dependencies(self.conn, project_uuid, &mut milestones)?;
        Ok(milestones)
    }

    fn commit_changes(&self, changes: &MilestoneChanges<'_>) -> RepoResult<()> {
        for milestone in changes.upserts {
            milestone.validate()?;
            ensure_project_exists(self.conn, milestone.project_uuid)?;
        }

        // Dropping `tx` on any early return rolls every write back.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for milestone in changes.upserts {
            write_milestone(&tx, milestone)?;
        }
        if let Some(id) = changes.delete {
            delete_row(&tx, id)?;
        }
        for milestone in changes.scheduled {
            write_schedule(&tx, milestone)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn ensure_project_exists(conn: &Connection, project_uuid: ProjectId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE project_uuid = ?1);",
        [project_uuid.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(RepoError::ProjectNotFound(project_uuid));
    }
    Ok(())
}

/// Upserts one milestone row and replaces its edge rows.
fn write_milestone(conn: &Connection, milestone: &Milestone) -> RepoResult<()> {
    let window = milestone.schedule.as_ref();
    conn.execute(
        "INSERT INTO milestones (
            milestone_uuid,
            project_uuid,
            name,
            start_date,
            end_date,
            duration_days,
            start_offset_days,
            custom_start_date,
            sort_order,
            status,
            earliest_start,
            earliest_finish,
            latest_start,
            latest_finish,
            slack_days,
            is_critical
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(milestone_uuid) DO UPDATE SET
            project_uuid = excluded.project_uuid,
            name = excluded.name,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            duration_days = excluded.duration_days,
            start_offset_days = excluded.start_offset_days,
            custom_start_date = excluded.custom_start_date,
            sort_order = excluded.sort_order,
            status = excluded.status,
            earliest_start = excluded.earliest_start,
            earliest_finish = excluded.earliest_finish,
            latest_start = excluded.latest_start,
            latest_finish = excluded.latest_finish,
            slack_days = excluded.slack_days,
            is_critical = excluded.is_critical,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![
            milestone.uuid.to_string(),
            milestone.project_uuid.to_string(),
            milestone.name.trim(),
            milestone.start_date.map(format_date),
            milestone.end_date.map(format_date),
            milestone.duration_days,
            milestone.start_offset_days,
            milestone.custom_start_date.map(format_date),
            milestone.sort_order,
            status_to_db(milestone.status),
            window.map(|w| format_date(w.earliest_start)),
            window.map(|w| format_date(w.earliest_finish)),
            window.map(|w| format_date(w.latest_start)),
            window.map(|w| format_date(w.latest_finish)),
            window.map(|w| w.slack_days),
            window.map(|w| bool_to_int(w.is_critical)),
        ],
    )?;

    conn.execute(
        "DELETE FROM milestone_dependencies WHERE milestone_uuid = ?1;",
        [milestone.uuid.to_string()],
    )?;
    for (position, dep) in milestone.dependencies.iter().enumerate() {
        conn.execute(
            "INSERT INTO milestone_dependencies (milestone_uuid, depends_on_uuid, position)
             VALUES (?1, ?2, ?3);",
            params![milestone.uuid.to_string(), dep.to_string(), position as i64],
        )?;
    }
    Ok(())
}

/// Overwrites only the derived columns of an existing row.
fn write_schedule(conn: &Connection, milestone: &Milestone) -> RepoResult<()> {
    let window = milestone.schedule.as_ref();
    let changed = conn.execute(
        "UPDATE milestones
         SET
            earliest_start = ?2,
            earliest_finish = ?3,
            latest_start = ?4,
            latest_finish = ?5,
            slack_days = ?6,
            is_critical = ?7,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE milestone_uuid = ?1;",
        params![
            milestone.uuid.to_string(),
            window.map(|w| format_date(w.earliest_start)),
            window.map(|w| format_date(w.earliest_finish)),
            window.map(|w| format_date(w.latest_start)),
            window.map(|w| format_date(w.latest_finish)),
            window.map(|w| w.slack_days),
            window.map(|w| bool_to_int(w.is_critical)),
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(milestone.uuid));
    }
    Ok(())
}

fn delete_row(conn: &Connection, id: MilestoneId) -> RepoResult<()> {
    let changed = conn.execute(
        "DELETE FROM milestones WHERE milestone_uuid = ?1;",
        [id.to_string()],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(id));
    }
    Ok(())
}

fn attach_dependencies(
    conn: &Connection,
    project_uuid: ProjectId,
    milestones: &mut [Milestone],
) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT d.milestone_uuid, d.depends_on_uuid
         FROM milestone_dependencies d
         INNER JOIN milestones m ON m.milestone_uuid = d.milestone_uuid
         WHERE m.project_uuid = ?1
         ORDER BY d.milestone_uuid ASC, d.position ASC;",
    )?;
    let mut rows = stmt.query([project_uuid.to_string()])?;
    let mut edges: HashMap<MilestoneId, Vec<MilestoneId>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let from: String = row.get(0)?;
        let to: String = row.get(1)?;
        edges
            .entry(parse_uuid(&from, "milestone_dependencies.milestone_uuid")?)
            .or_default()
            .push(parse_uuid(&to, "milestone_dependencies.depends_on_uuid")?);
    }

    for milestone in milestones.iter_mut() {
        milestone.dependencies = edges.remove(&milestone.uuid).unwrap_or_default();
    }
    Ok(())
}

fn load_dependencies(conn: &Connection, id: MilestoneId) -> RepoResult<Vec<MilestoneId>> {
    let mut stmt = conn.prepare(
        "SELECT depends_on_uuid
         FROM milestone_dependencies
         WHERE milestone_uuid = ?1
         ORDER BY position ASC;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut dependencies = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        dependencies.push(parse_uuid(&value, "milestone_dependencies.depends_on_uuid")?);
    }
    Ok(dependencies)
}

fn parse_milestone_row(row: &Row<'_>) -> RepoResult<Milestone> {
    let uuid_text: String = row.get("milestone_uuid")?;
    let project_text: String = row.get("project_uuid")?;
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in milestones.status"
        ))
    })?;

    Ok(Milestone {
        uuid: parse_uuid(&uuid_text, "milestones.milestone_uuid")?,
        project_uuid: parse_uuid(&project_text, "milestones.project_uuid")?,
        name: row.get("name")?,
        start_date: parse_optional_date(row.get("start_date")?, "milestones.start_date")?,
        end_date: parse_optional_date(row.get("end_date")?, "milestones.end_date")?,
        duration_days: row.get("duration_days")?,
        start_offset_days: row.get("start_offset_days")?,
        custom_start_date: parse_optional_date(
            row.get("custom_start_date")?,
            "milestones.custom_start_date",
        )?,
        dependencies: Vec::new(),
        sort_order: row.get("sort_order")?,
        status,
        schedule: parse_schedule_window(row)?,
    })
}

fn parse_schedule_window(row: &Row<'_>) -> RepoResult<Option<ScheduleWindow>> {
    let earliest_start: Option<String> = row.get("earliest_start")?;
    let Some(earliest_start) = earliest_start else {
        return Ok(None);
    };

    let required_date = |column: &'static str| -> RepoResult<NaiveDate> {
        let value: Option<String> = row.get(column)?;
        let value = value.ok_or_else(|| {
            RepoError::InvalidData(format!("missing milestones.{column} for scheduled row"))
        })?;
        parse_date(&value, column)
    };

    let slack_days: Option<i64> = row.get("slack_days")?;
    let is_critical: Option<i64> = row.get("is_critical")?;
    let (Some(slack_days), Some(is_critical)) = (slack_days, is_critical) else {
        return Err(RepoError::InvalidData(
            "missing slack or critical flag for scheduled row".to_string(),
        ));
    };

    Ok(Some(ScheduleWindow {
        earliest_start: parse_date(&earliest_start, "earliest_start")?,
        earliest_finish: required_date("earliest_finish")?,
        latest_start: required_date("latest_start")?,
        latest_finish: required_date("latest_finish")?,
        slack_days,
        is_critical: int_to_bool(is_critical, "milestones.is_critical")?,
    }))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str, column: &str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

fn parse_optional_date(value: Option<String>, column: &str) -> RepoResult<Option<NaiveDate>> {
    value.map(|text| parse_date(&text, column)).transpose()
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn status_to_db(status: MilestoneStatus) -> &'static str {
    match status {
        MilestoneStatus::Pending => "pending",
        MilestoneStatus::InProgress => "in_progress",
        MilestoneStatus::Completed => "completed",
        MilestoneStatus::Blocked => "blocked",
    }
}

fn parse_status(value: &str) -> Option<MilestoneStatus> {
    match value {
        "pending" => Some(MilestoneStatus::Pending),
        "in_progress" => Some(MilestoneStatus::InProgress),
        "completed" => Some(MilestoneStatus::Completed),
        "blocked" => Some(MilestoneStatus::Blocked),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
