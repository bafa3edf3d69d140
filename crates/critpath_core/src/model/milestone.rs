//! Milestone domain model.
//!
//! # Responsibility
//! - Define the canonical schedulable record and its derived schedule window.
//! - Normalize partially expanded dependency input into identifier lists.
//! - Validate hand-editable fields before they reach storage.
//!
//! # Invariants
//! - `dependencies` has set semantics: no duplicates, never contains `uuid`.
//! - `end_date` is not earlier than `start_date` when both are set.
//! - `schedule` is `None` until the first recalculation pass.

use crate::model::project::ProjectId;
use crate::schedule::date_math::days_between;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one milestone, unique within its project.
pub type MilestoneId = Uuid;

/// Upper bound for `duration_days`, `start_offset_days` and pinned windows:
/// roughly a thousand years.
pub const MAX_SPAN_DAYS: i64 = 366 * 1_000;

/// Workflow state of a milestone. Opaque to the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

/// Fields derived by the critical path pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub earliest_start: NaiveDate,
    pub earliest_finish: NaiveDate,
    pub latest_start: NaiveDate,
    pub latest_finish: NaiveDate,
    /// Whole days this milestone can slip without moving the project end.
    pub slack_days: i64,
    pub is_critical: bool,
}

/// Canonical schedulable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub uuid: MilestoneId,
    pub project_uuid: ProjectId,
    pub name: String,
    /// Fixed start. Anchors the forward pass for root milestones.
    pub start_date: Option<NaiveDate>,
    /// Fixed end. Only honored when `start_date` is fixed too.
    pub end_date: Option<NaiveDate>,
    /// Used when the window is not fixed by both dates.
    pub duration_days: Option<i64>,
    /// Extra days after the latest dependency finishes.
    pub start_offset_days: Option<i64>,
    /// Overrides the dependency-derived earliest start.
    pub custom_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub dependencies: Vec<MilestoneId>,
    /// Stable tie-break and display order within a project.
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub status: MilestoneStatus,
    #[serde(default)]
    pub schedule: Option<ScheduleWindow>,
}

impl Milestone {
    /// Creates a milestone with a generated id and no timing inputs.
    pub fn new(project_uuid: ProjectId, name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), project_uuid, name)
    }

    /// Creates a milestone with a caller-provided id.
    pub fn with_id(uuid: MilestoneId, project_uuid: ProjectId, name: impl Into<String>) -> Self {
        Self {
            uuid,
            project_uuid,
            name: name.into(),
            start_date: None,
            end_date: None,
            duration_days: None,
            start_offset_days: None,
            custom_start_date: None,
            dependencies: Vec::new(),
            sort_order: 0,
            status: MilestoneStatus::Pending,
            schedule: None,
        }
    }

    /// Returns `(start, end)` when both dates are fixed.
    pub fn fixed_window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    /// Duration in days: the fixed window length when both dates are set,
    /// otherwise `duration_days`.
    pub fn effective_duration_days(&self) -> Option<i64> {
        match self.fixed_window() {
            Some((start, end)) => Some(days_between(start, end)),
            None => self.duration_days,
        }
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn depends_on(&self, id: MilestoneId) -> bool {
        self.dependencies.contains(&id)
    }

    /// Overwrites every hand-editable field from a draft.
    ///
    /// Identity, owner and derived schedule fields are left untouched.
    /// `sort_order` is only replaced when the draft carries one.
    pub fn apply_draft(&mut self, draft: &MilestoneDraft) {
        self.name = draft.name.trim().to_string();
        self.start_date = draft.start_date;
        self.end_date = draft.end_date;
        self.duration_days = draft.duration_days;
        self.start_offset_days = draft.start_offset_days;
        self.custom_start_date = draft.custom_start_date;
        self.dependencies = normalize_dependencies(&draft.dependencies);
        if let Some(sort_order) = draft.sort_order {
            self.sort_order = sort_order;
        }
        self.status = draft.status;
    }

    /// Validates hand-editable fields.
    ///
    /// # Errors
    /// - Blank name, negative duration or offset.
    /// - Duration or offset above `MAX_SPAN_DAYS`.
    /// - Fixed end earlier than fixed start.
    /// - A dependency on itself.
    pub fn validate(&self) -> Result<(), MilestoneValidationError> {
        if self.name.trim().is_empty() {
            return Err(MilestoneValidationError::BlankName);
        }
        if let Some(days) = self.duration_days {
            if days < 0 {
                return Err(MilestoneValidationError::NegativeDuration(days));
            }
            if days > MAX_SPAN_DAYS {
                return Err(MilestoneValidationError::DurationOutOfRange(days));
            }
        }
        if let Some(days) = self.start_offset_days {
            if days < 0 {
                return Err(MilestoneValidationError::NegativeStartOffset(days));
            }
            if days > MAX_SPAN_DAYS {
                return Err(MilestoneValidationError::StartOffsetOutOfRange(days));
            }
        }
        if let Some((start, end)) = self.fixed_window() {
            if end < start {
                return Err(MilestoneValidationError::EndBeforeStart { start, end });
            }
        }
        if self.depends_on(self.uuid) {
            return Err(MilestoneValidationError::SelfDependency(self.uuid));
        }
        Ok(())
    }
}

/// Validation failures for hand-editable milestone fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneValidationError {
    BlankName,
    NegativeDuration(i64),
    NegativeStartOffset(i64),
    DurationOutOfRange(i64),
    StartOffsetOutOfRange(i64),
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    SelfDependency(MilestoneId),
}

impl Display for MilestoneValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "milestone name must not be blank"),
            Self::NegativeDuration(days) => {
                write!(f, "milestone duration must not be negative, got {days}")
            }
            Self::NegativeStartOffset(days) => {
                write!(f, "milestone start offset must not be negative, got {days}")
            }
            Self::DurationOutOfRange(days) => write!(
                f,
                "milestone duration {days} exceeds the maximum of {MAX_SPAN_DAYS} days"
            ),
            Self::StartOffsetOutOfRange(days) => write!(
                f,
                "milestone start offset {days} exceeds the maximum of {MAX_SPAN_DAYS} days"
            ),
            Self::EndBeforeStart { start, end } => {
                write!(f, "milestone end {end} is earlier than start {start}")
            }
            Self::SelfDependency(id) => write!(f, "milestone {id} cannot depend on itself"),
        }
    }
}

impl Error for MilestoneValidationError {}

/// One dependency as supplied by callers: a bare id or an expanded record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
    Id(MilestoneId),
    Expanded(Box<Milestone>),
}

impl DependencyRef {
    pub fn id(&self) -> MilestoneId {
        match self {
            Self::Id(id) => *id,
            Self::Expanded(milestone) => milestone.uuid,
        }
    }
}

impl From<MilestoneId> for DependencyRef {
    fn from(value: MilestoneId) -> Self {
        Self::Id(value)
    }
}

impl From<Milestone> for DependencyRef {
    fn from(value: Milestone) -> Self {
        Self::Expanded(Box::new(value))
    }
}

/// Collapses dependency refs to unique ids, keeping first-seen order.
pub fn normalize_dependencies<'a, I>(refs: I) -> Vec<MilestoneId>
where
    I: IntoIterator<Item = &'a DependencyRef>,
{
    let mut seen = HashSet::new();
    refs.into_iter()
        .map(DependencyRef::id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Create/update input for one milestone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneDraft {
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<i64>,
    pub start_offset_days: Option<i64>,
    pub custom_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
    /// `None` appends on create and keeps the current value on update.
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub status: MilestoneStatus,
}

impl MilestoneDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, days: i64) -> Self {
        self.duration_days = Some(days);
        self
    }

    pub fn with_dependencies<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = MilestoneId>,
    {
        self.dependencies = ids.into_iter().map(DependencyRef::Id).collect();
        self
    }

    /// Builds an editable draft that reproduces the milestone's current inputs.
    pub fn from_milestone(milestone: &Milestone) -> Self {
        Self {
            name: milestone.name.clone(),
            start_date: milestone.start_date,
            end_date: milestone.end_date,
            duration_days: milestone.duration_days,
            start_offset_days: milestone.start_offset_days,
            custom_start_date: milestone.custom_start_date,
            dependencies: milestone
                .dependencies
                .iter()
                .copied()
                .map(DependencyRef::Id)
                .collect(),
            sort_order: Some(milestone.sort_order),
            status: milestone.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        normalize_dependencies, DependencyRef, Milestone, MilestoneDraft,
        MilestoneValidationError, MAX_SPAN_DAYS,
    };
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn normalize_accepts_ids_and_expanded_records() {
        let project = Uuid::new_v4();
        let expanded = Milestone::new(project, "design");
        let raw = Uuid::new_v4();

        let refs = vec![
            DependencyRef::Id(raw),
            DependencyRef::from(expanded.clone()),
            DependencyRef::Id(raw),
        ];

        assert_eq!(normalize_dependencies(&refs), vec![raw, expanded.uuid]);
    }

    #[test]
    fn dependency_refs_parse_from_strings_and_objects() {
        let project = Uuid::new_v4();
        let raw = Uuid::new_v4();
        let expanded = Milestone::new(project, "build");
        let json = format!(
            r#"["{raw}", {{"uuid": "{}", "project_uuid": "{project}", "name": "build"}}]"#,
            expanded.uuid
        );

        let refs: Vec<DependencyRef> = serde_json::from_str(&json).expect("refs should parse");
        assert!(matches!(refs[0], DependencyRef::Id(id) if id == raw));
        assert!(matches!(&refs[1], DependencyRef::Expanded(m) if m.uuid == expanded.uuid));
    }

    #[test]
    fn effective_duration_prefers_fixed_window() {
        let mut milestone = Milestone::new(Uuid::new_v4(), "qa");
        milestone.duration_days = Some(3);
        assert_eq!(milestone.effective_duration_days(), Some(3));

        milestone.start_date = Some(date(2024, 3, 1));
        assert_eq!(milestone.effective_duration_days(), Some(3));

        milestone.end_date = Some(date(2024, 3, 11));
        assert_eq!(milestone.effective_duration_days(), Some(10));
    }

    #[test]
    fn validate_rejects_bad_inputs() {
        let mut milestone = Milestone::new(Uuid::new_v4(), "  ");
        assert_eq!(milestone.validate(), Err(MilestoneValidationError::BlankName));

        milestone.name = "launch".to_string();
        milestone.duration_days = Some(-1);
        assert_eq!(
            milestone.validate(),
            Err(MilestoneValidationError::NegativeDuration(-1))
        );

        milestone.duration_days = Some(1_000_000_000);
        assert_eq!(
            milestone.validate(),
            Err(MilestoneValidationError::DurationOutOfRange(1_000_000_000))
        );

        milestone.duration_days = Some(MAX_SPAN_DAYS);
        milestone.start_offset_days = Some(MAX_SPAN_DAYS + 1);
        assert_eq!(
            milestone.validate(),
            Err(MilestoneValidationError::StartOffsetOutOfRange(MAX_SPAN_DAYS + 1))
        );

        milestone.start_offset_days = None;
        milestone.duration_days = Some(1);
        milestone.start_date = Some(date(2024, 3, 5));
        milestone.end_date = Some(date(2024, 3, 4));
        assert!(matches!(
            milestone.validate(),
            Err(MilestoneValidationError::EndBeforeStart { .. })
        ));

        milestone.end_date = None;
        milestone.dependencies.push(milestone.uuid);
        assert_eq!(
            milestone.validate(),
            Err(MilestoneValidationError::SelfDependency(milestone.uuid))
        );
    }

    #[test]
    fn apply_draft_keeps_identity_and_sort_order_when_unset() {
        let mut milestone = Milestone::new(Uuid::new_v4(), "kickoff");
        milestone.sort_order = 4;
        let uuid = milestone.uuid;
        let dep = Uuid::new_v4();

        let draft = MilestoneDraft::new(" review ")
            .with_duration(2)
            .with_dependencies([dep, dep]);
        milestone.apply_draft(&draft);

        assert_eq!(milestone.uuid, uuid);
        assert_eq!(milestone.name, "review");
        assert_eq!(milestone.sort_order, 4);
        assert_eq!(milestone.dependencies, vec![dep]);
        assert_eq!(milestone.duration_days, Some(2));
    }
}
