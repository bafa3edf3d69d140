//! Milestone scheduling use-case service.
//!
//! # Responsibility
//! - Validate milestone mutations against the whole project graph.
//! - Commit one mutation, then recompute and stamp the schedule of every
//!   milestone in the project.
//! - Drive the reassignment protocol when a milestone with dependents is
//!   deleted.
//!
//! # Invariants
//! - A mutation is scheduled in memory first; cycles, dangling dependencies
//!   and unschedulable dates reject it before anything is written.
//! - The mutation and the refreshed schedule are committed in one store
//!   transaction, so a failure leaves the project as it was.
//! - Each load/check/compute/commit cycle runs under the project's lock;
//!   different projects never contend.

use crate::config::SchedulerConfig;
use crate::model::milestone::{
    Milestone, MilestoneDraft, MilestoneId, MilestoneValidationError, MAX_SPAN_DAYS,
};
use crate::model::project::ProjectId;
use crate::repo::milestone_repo::{MilestoneChanges, MilestoneRepository, RepoError};
use crate::schedule::cpm::{
    calculate_critical_path, get_critical_path_sequence, CriticalPathReport, ScheduleContext,
    ScheduleError,
};
use crate::schedule::date_math::{add_business_days, days_between, DateOutOfRange};
use crate::schedule::graph::{find_cycle, find_missing_dependencies, CycleError};
use crate::schedule::reassign::{
    apply_reassignment, resolve_replacement, DeletionPlan, InvalidReplacement,
    ReassignmentDecision,
};
use crate::service::clock::{Clock, SystemClock};
use crate::service::project_lock::ProjectLocks;
use chrono::NaiveDate;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from scheduling use-cases. Each one is scoped to a single
/// mutation attempt.
#[derive(Debug)]
pub enum ScheduleServiceError {
    /// Target milestone does not exist.
    MilestoneNotFound(MilestoneId),
    /// Hand-editable fields are invalid.
    Validation(MilestoneValidationError),
    /// The proposed dependency set closes a cycle.
    CycleDetected { path: Vec<MilestoneId> },
    /// A dependency id does not exist in the milestone's project.
    DependencyNotFound {
        milestone: MilestoneId,
        dependency: MilestoneId,
    },
    /// Deletion needs a reassignment decision first.
    DependencyConflict {
        milestone: MilestoneId,
        plan: DeletionPlan,
    },
    /// The chosen replacement is not a dependency of the deleted milestone.
    InvalidReplacement(InvalidReplacement),
    /// Timing inputs push a derived date past the supported calendar.
    DateOutOfRange {
        milestone: MilestoneId,
        source: DateOutOfRange,
    },
    /// Store failure, surfaced unchanged.
    Repo(RepoError),
}

impl Display for ScheduleServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MilestoneNotFound(id) => write!(f, "milestone not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::CycleDetected { path } => write!(f, "{}", CycleError { path: path.clone() }),
            Self::DependencyNotFound {
                milestone,
                dependency,
            } => write!(
                f,
                "milestone {milestone} depends on {dependency}, which is not in the same project"
            ),
            Self::DependencyConflict { milestone, plan } => write!(
                f,
                "dependency conflict: {} milestone(s) depend on {milestone}; a reassignment decision is required",
                plan.dependents().len()
            ),
            Self::InvalidReplacement(err) => write!(f, "{err}"),
            Self::DateOutOfRange { milestone, source } => {
                write!(f, "cannot schedule milestone {milestone}: {source}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ScheduleServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidReplacement(err) => Some(err),
            Self::DateOutOfRange { source, .. } => Some(source),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ScheduleServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::MilestoneNotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<MilestoneValidationError> for ScheduleServiceError {
    fn from(value: MilestoneValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CycleError> for ScheduleServiceError {
    fn from(value: CycleError) -> Self {
        Self::CycleDetected { path: value.path }
    }
}

impl From<ScheduleError> for ScheduleServiceError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::Cycle(err) => err.into(),
            ScheduleError::DateOutOfRange { milestone, source } => {
                Self::DateOutOfRange { milestone, source }
            }
        }
    }
}

impl From<InvalidReplacement> for ScheduleServiceError {
    fn from(value: InvalidReplacement) -> Self {
        Self::InvalidReplacement(value)
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleServiceError>;

/// Rewiring applied while deleting a milestone that had dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedReassignment {
    pub plan: DeletionPlan,
    pub replacement: Option<MilestoneId>,
    /// Dependents rewritten and persisted.
    pub updated: Vec<MilestoneId>,
}

/// Result of a committed deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionOutcome {
    pub deleted: MilestoneId,
    /// `None` when nothing depended on the deleted milestone.
    pub reassignment: Option<AppliedReassignment>,
    /// Schedule of the remaining milestones.
    pub report: CriticalPathReport,
}

/// Scheduling facade over a milestone store.
pub struct ScheduleService<R: MilestoneRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
    config: SchedulerConfig,
    locks: ProjectLocks,
}

impl<R: MilestoneRepository> ScheduleService<R> {
    /// Creates a service on the host's local clock with default config.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: MilestoneRepository, C: Clock> ScheduleService<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            config: SchedulerConfig::default(),
            locks: ProjectLocks::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Creates a milestone and recalculates its project.
    ///
    /// # Contract
    /// - `draft.sort_order = None` appends after the last milestone.
    /// - Returns the stored milestone with its freshly derived schedule.
    pub fn create_milestone(
        &self,
        project_uuid: ProjectId,
        draft: &MilestoneDraft,
    ) -> ScheduleResult<Milestone> {
        let mut candidate = Milestone::new(project_uuid, draft.name.as_str());
        candidate.apply_draft(draft);
        self.commit_mutation(candidate, draft.sort_order.is_none(), "milestone_create")
    }

    /// Replaces the editable fields of a milestone and recalculates.
    pub fn update_milestone(
        &self,
        id: MilestoneId,
        draft: &MilestoneDraft,
    ) -> ScheduleResult<Milestone> {
        let mut candidate = self.require_milestone(id)?;
        candidate.apply_draft(draft);
        self.commit_mutation(candidate, false, "milestone_update")
    }

    /// Fixes the milestone window to `business_days` working days from
    /// `start` and recalculates.
    ///
    /// # Errors
    /// - `Validation` for a negative count or one above `MAX_SPAN_DAYS`.
    pub fn pin_milestone_window(
        &self,
        id: MilestoneId,
        start: NaiveDate,
        business_days: i64,
    ) -> ScheduleResult<Milestone> {
        if business_days < 0 {
            return Err(MilestoneValidationError::NegativeDuration(business_days).into());
        }
        if business_days > MAX_SPAN_DAYS {
            return Err(MilestoneValidationError::DurationOutOfRange(business_days).into());
        }
        let mut candidate = self.require_milestone(id)?;
        let end = add_business_days(start, business_days).map_err(|source| {
            ScheduleServiceError::DateOutOfRange {
                milestone: id,
                source,
            }
        })?;
        candidate.start_date = Some(start);
        candidate.end_date = Some(end);
        candidate.duration_days = Some(days_between(start, end));
        self.commit_mutation(candidate, false, "milestone_update")
    }

    pub fn get_milestone(&self, id: MilestoneId) -> ScheduleResult<Option<Milestone>> {
        self.repo.get_milestone(id).map_err(Into::into)
    }

    /// Lists a project's milestones in display order.
    pub fn list_milestones(&self, project_uuid: ProjectId) -> ScheduleResult<Vec<Milestone>> {
        self.locks.with_project(project_uuid, || -> ScheduleResult<Vec<Milestone>> {
            self.repo
                .load_project_milestones(project_uuid)
                .map_err(Into::into)
        })
    }

    /// Recomputes and stamps the schedule of every milestone in a project.
    pub fn recalculate_project(
        &self,
        project_uuid: ProjectId,
    ) -> ScheduleResult<CriticalPathReport> {
        self.locks
            .with_project(project_uuid, || self.recalculate_locked(project_uuid))
    }

    /// Critical milestone ids by earliest start, from the stored schedule.
    pub fn critical_path(&self, project_uuid: ProjectId) -> ScheduleResult<Vec<MilestoneId>> {
        let milestones = self.list_milestones(project_uuid)?;
        Ok(get_critical_path_sequence(&milestones))
    }

    /// Classifies a pending deletion without changing anything.
    pub fn plan_deletion(&self, id: MilestoneId) -> ScheduleResult<DeletionPlan> {
        let target = self.require_milestone(id)?;
        self.locks.with_project(target.project_uuid, || -> ScheduleResult<DeletionPlan> {
            let dependents = self.repo.find_dependents(target.project_uuid, id)?;
            Ok(DeletionPlan::plan(&target, &dependents))
        })
    }

    /// Deletes a milestone, rewiring its dependents first when it has any.
    ///
    /// # Contract
    /// - Without dependents, `decision` is ignored and no reassignment runs.
    /// - With dependents and `decision = None`, nothing is written and
    ///   `DependencyConflict` carries the plan to decide on.
    /// - Otherwise every dependent drops the deleted id and gains the
    ///   replacement (if any and not already present), then the target is
    ///   deleted and the project recalculated.
    pub fn delete_milestone(
        &self,
        id: MilestoneId,
        decision: Option<ReassignmentDecision>,
    ) -> ScheduleResult<DeletionOutcome> {
        let project_uuid = self.require_milestone(id)?.project_uuid;
        let started_at = Instant::now();

        let result = self.locks.with_project(project_uuid, || -> ScheduleResult<DeletionOutcome> {
            let target = self.require_milestone(id)?;
            let dependents = self.repo.find_dependents(project_uuid, id)?;

            let reassignment = if dependents.is_empty() {
                None
            } else {
                let plan = DeletionPlan::plan(&target, &dependents);
                info!(
                    "event=reassignment_plan module=service milestone={} dependents={} decision={}",
                    id,
                    plan.dependents().len(),
                    if decision.is_some() { "supplied" } else { "missing" }
                );
                let Some(decision) = decision else {
                    return Err(ScheduleServiceError::DependencyConflict { milestone: id, plan });
                };
                let replacement = resolve_replacement(&target, decision)?;
                let updated = apply_reassignment(id, &dependents, replacement);
                Some((plan, replacement, updated))
            };

            let mut proposed = self.repo.load_project_milestones(project_uuid)?;
            proposed.retain(|milestone| milestone.uuid != id);
            if let Some((_, _, updated)) = &reassignment {
                for milestone in updated {
                    replace_or_push(&mut proposed, milestone.clone());
                }
            }
            if let Some(path) = find_cycle(&proposed) {
                return Err(ScheduleServiceError::CycleDetected { path });
            }
            let report = self.schedule_snapshot(project_uuid, &proposed)?;

            let rewired = reassignment
                .as_ref()
                .map_or(&[][..], |(_, _, updated)| updated.as_slice());
            self.repo.commit_changes(&MilestoneChanges {
                upserts: rewired,
                delete: Some(id),
                scheduled: &report.milestones,
            })?;

            Ok(DeletionOutcome {
                deleted: id,
                reassignment: reassignment.map(|(plan, replacement, updated)| {
                    AppliedReassignment {
                        plan,
                        replacement,
                        updated: updated.iter().map(|milestone| milestone.uuid).collect(),
                    }
                }),
                report,
            })
        });

        match &result {
            Ok(outcome) => info!(
                "event=milestone_delete module=service status=ok milestone={} reassigned={} duration_ms={}",
                id,
                outcome
                    .reassignment
                    .as_ref()
                    .map_or(0, |applied| applied.updated.len()),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=milestone_delete module=service status=rejected milestone={} error={}",
                id, err
            ),
        }
        result
    }

    fn require_milestone(&self, id: MilestoneId) -> ScheduleResult<Milestone> {
        self.repo
            .get_milestone(id)?
            .ok_or(ScheduleServiceError::MilestoneNotFound(id))
    }

    /// Checks `candidate` against its project, schedules the proposed set and
    /// commits the mutation with the refreshed schedule in one transaction.
    fn commit_mutation(
        &self,
        mut candidate: Milestone,
        append: bool,
        event: &'static str,
    ) -> ScheduleResult<Milestone> {
        let started_at = Instant::now();
        let project_uuid = candidate.project_uuid;
        let id = candidate.uuid;

        let result = self.locks.with_project(project_uuid, || -> ScheduleResult<Milestone> {
            if candidate.depends_on(id) {
                return Err(ScheduleServiceError::CycleDetected {
                    path: vec![id, id],
                });
            }
            candidate.validate()?;

            let mut proposed = self.repo.load_project_milestones(project_uuid)?;
            if append {
                candidate.sort_order = proposed
                    .iter()
                    .map(|milestone| milestone.sort_order + 1)
                    .max()
                    .unwrap_or(0);
            }
            replace_or_push(&mut proposed, candidate.clone());

            if let Some((milestone, dependency)) = find_missing_dependencies(&proposed)
                .into_iter()
                .next()
            {
                return Err(ScheduleServiceError::DependencyNotFound {
                    milestone,
                    dependency,
                });
            }
            if let Some(path) = find_cycle(&proposed) {
                return Err(ScheduleServiceError::CycleDetected { path });
            }
            let report = self.schedule_snapshot(project_uuid, &proposed)?;

            let scheduled = report
                .milestones
                .iter()
                .find(|milestone| milestone.uuid == id)
                .cloned()
                .ok_or(ScheduleServiceError::MilestoneNotFound(id))?;
            self.repo.commit_changes(&MilestoneChanges {
                upserts: std::slice::from_ref(&scheduled),
                delete: None,
                scheduled: &report.milestones,
            })?;
            Ok(scheduled)
        });

        match &result {
            Ok(_) => info!(
                "event={} module=service status=ok milestone={} project={} duration_ms={}",
                event,
                id,
                project_uuid,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event={} module=service status=rejected milestone={} project={} error={}",
                event, id, project_uuid, err
            ),
        }
        result
    }

    /// Caller must hold the project's lock.
    fn recalculate_locked(&self, project_uuid: ProjectId) -> ScheduleResult<CriticalPathReport> {
        let milestones = self.repo.load_project_milestones(project_uuid)?;
        let report = self.schedule_snapshot(project_uuid, &milestones)?;
        self.repo.save_milestones(&report.milestones)?;
        Ok(report)
    }

    /// Schedules `milestones` in memory without writing anything.
    fn schedule_snapshot(
        &self,
        project_uuid: ProjectId,
        milestones: &[Milestone],
    ) -> ScheduleResult<CriticalPathReport> {
        let started_at = Instant::now();
        let anchor = self.repo.load_project_anchor_date(project_uuid)?;
        let context = ScheduleContext::new(anchor, self.clock.today()).with_config(self.config);

        let report = calculate_critical_path(milestones, &context)?;

        info!(
            "event=recalculate module=service status=ok project={} milestones={} critical={} warnings={} duration_ms={}",
            project_uuid,
            report.milestones.len(),
            report.critical_sequence.len(),
            report.warnings.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}

fn replace_or_push(milestones: &mut Vec<Milestone>, candidate: Milestone) {
    match milestones
        .iter_mut()
        .find(|milestone| milestone.uuid == candidate.uuid)
    {
        Some(slot) => *slot = candidate,
        None => milestones.push(candidate),
    }
}
