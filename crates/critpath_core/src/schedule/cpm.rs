//! Critical path pass over one project's milestones.
//!
//! # Responsibility
//! - Run the forward pass (earliest start/finish) in dependency-first order.
//! - Run the backward pass (latest start/finish) in reverse order.
//! - Derive slack and critical membership.
//!
//! # Invariants
//! - Pure: the same input and context always yield the same report.
//! - Output keeps input order; only `schedule` is populated.
//! - `earliest_finish >= earliest_start` and `latest_finish >= latest_start`.
//! - `latest_start >= earliest_start`: the backward pass uses the span each
//!   milestone really occupies, and only successors that wait on their
//!   dependencies constrain them.
//! - Date overflow is an error, never a panic.
//! - "Today" is only used when a root milestone has no anchor at all, and
//!   every such use is reported as a `TimingWarning`.

use crate::config::{SchedulerConfig, SinkAnchor};
use crate::model::milestone::{Milestone, MilestoneId, ScheduleWindow};
use crate::schedule::date_math::{add_calendar_days, days_between, DateOutOfRange};
use crate::schedule::graph::{CycleError, DependencyGraph};
use chrono::NaiveDate;
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Inputs of one pass that do not live on the milestones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleContext {
    /// Anchor for root milestones without a fixed start.
    pub project_start: Option<NaiveDate>,
    /// Last-resort anchor when `project_start` is missing too.
    pub today: NaiveDate,
    pub config: SchedulerConfig,
}

impl ScheduleContext {
    pub fn new(project_start: Option<NaiveDate>, today: NaiveDate) -> Self {
        Self {
            project_start,
            today,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }
}

/// Best-effort substitutions made while scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingWarning {
    /// Root milestone had no fixed start and the project had no start date.
    AnchoredToToday {
        milestone: MilestoneId,
        date: NaiveDate,
    },
    /// Neither a fixed window nor a duration; scheduled as zero days.
    MissingDuration { milestone: MilestoneId },
}

/// Result of one critical path pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalPathReport {
    pub milestones: Vec<Milestone>,
    /// Critical milestones ordered by earliest start.
    pub critical_sequence: Vec<MilestoneId>,
    pub project_start: Option<NaiveDate>,
    pub project_finish: Option<NaiveDate>,
    pub warnings: Vec<TimingWarning>,
}

/// Why a pass produced no schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    Cycle(CycleError),
    /// A derived date fell outside the supported calendar.
    DateOutOfRange {
        milestone: MilestoneId,
        source: DateOutOfRange,
    },
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle(err) => write!(f, "{err}"),
            Self::DateOutOfRange { milestone, source } => {
                write!(f, "cannot schedule milestone {milestone}: {source}")
            }
        }
    }
}

impl Error for ScheduleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cycle(err) => Some(err),
            Self::DateOutOfRange { source, .. } => Some(source),
        }
    }
}

impl From<CycleError> for ScheduleError {
    fn from(value: CycleError) -> Self {
        Self::Cycle(value)
    }
}

/// Computes earliest/latest windows, slack and criticality for every
/// milestone.
///
/// # Errors
/// - `Cycle` when the dependency relation is cyclic.
/// - `DateOutOfRange` when durations or offsets push a date past the
///   calendar.
///
/// No partial schedule is produced in either case.
pub fn calculate_critical_path(
    milestones: &[Milestone],
    context: &ScheduleContext,
) -> Result<CriticalPathReport, ScheduleError> {
    let graph = DependencyGraph::build(milestones);
    let order = graph.topological_order()?;
    let count = graph.len();
    let mut warnings = Vec::new();

    let durations: Vec<i64> = milestones
        .iter()
        .map(|milestone| match milestone.effective_duration_days() {
            Some(days) => days,
            None => {
                warnings.push(TimingWarning::MissingDuration {
                    milestone: milestone.uuid,
                });
                0
            }
        })
        .collect();

    let mut earliest_start = vec![context.today; count];
    let mut earliest_finish = vec![context.today; count];
    for &position in &order {
        let milestone = graph.milestone(position);
        let shift = |date: NaiveDate, days: i64| {
            add_calendar_days(date, days).map_err(|source| ScheduleError::DateOutOfRange {
                milestone: milestone.uuid,
                source,
            })
        };
        let dependencies = graph.dependencies_of(position);

        let start = if dependencies.is_empty() {
            match milestone.start_date.or(context.project_start) {
                Some(date) => date,
                None => {
                    warnings.push(TimingWarning::AnchoredToToday {
                        milestone: milestone.uuid,
                        date: context.today,
                    });
                    context.today
                }
            }
        } else if let Some(custom) = milestone.custom_start_date {
            custom
        } else {
            let latest_dependency_finish = dependencies
                .iter()
                .map(|&dep| earliest_finish[dep])
                .max()
                .unwrap_or(context.today);
            shift(
                latest_dependency_finish,
                milestone.start_offset_days.unwrap_or(0),
            )?
        };

        let finish = match milestone.fixed_window() {
            Some((_, end)) => end.max(start),
            None => shift(start, durations[position])?,
        };

        earliest_start[position] = start;
        earliest_finish[position] = finish;
    }

    let project_start = earliest_start.iter().min().copied();
    let project_finish = earliest_finish.iter().max().copied();

    // Span actually occupied after the forward pass. Differs from the
    // nominal duration when a fixed window is clamped or shortened by a
    // dependency-driven start.
    let spans: Vec<i64> = (0..count)
        .map(|position| days_between(earliest_start[position], earliest_finish[position]))
        .collect();

    let mut latest_start = vec![context.today; count];
    let mut latest_finish = vec![context.today; count];
    for &position in order.iter().rev() {
        let milestone = graph.milestone(position);
        let shift = |date: NaiveDate, days: i64| {
            add_calendar_days(date, days).map_err(|source| ScheduleError::DateOutOfRange {
                milestone: milestone.uuid,
                source,
            })
        };

        let mut constraining = graph
            .successors_of(position)
            .iter()
            .map(|&successor| (successor, graph.milestone(successor)))
            .filter(|(_, successor)| successor.custom_start_date.is_none())
            .peekable();

        let finish = if constraining.peek().is_none() {
            match (context.config.sink_anchor, project_finish) {
                (SinkAnchor::ProjectFinish, Some(end)) => end,
                _ => earliest_finish[position],
            }
        } else {
            let mut finish: Option<NaiveDate> = None;
            for (index, successor) in constraining {
                let lag = successor.start_offset_days.unwrap_or(0);
                let bound = shift(latest_start[index], -lag)?;
                finish = Some(finish.map_or(bound, |current| current.min(bound)));
            }
            finish.unwrap_or(earliest_finish[position])
        };

        latest_finish[position] = finish;
        latest_start[position] = shift(finish, -spans[position])?;
    }

    let scheduled: Vec<Milestone> = milestones
        .iter()
        .enumerate()
        .map(|(position, milestone)| {
            let slack_days = days_between(earliest_start[position], latest_start[position]);
            let mut scheduled = milestone.clone();
            scheduled.schedule = Some(ScheduleWindow {
                earliest_start: earliest_start[position],
                earliest_finish: earliest_finish[position],
                latest_start: latest_start[position],
                latest_finish: latest_finish[position],
                slack_days,
                is_critical: context.config.is_critical_slack(slack_days),
            });
            scheduled
        })
        .collect();

    for warning in &warnings {
        match warning {
            TimingWarning::AnchoredToToday { milestone, date } => warn!(
                "event=timing_warning module=schedule status=degraded kind=anchored_to_today milestone={} date={}",
                milestone, date
            ),
            TimingWarning::MissingDuration { milestone } => warn!(
                "event=timing_warning module=schedule status=degraded kind=missing_duration milestone={}",
                milestone
            ),
        }
    }

    let critical_sequence = get_critical_path_sequence(&scheduled);
    debug!(
        "event=critical_path module=schedule status=ok milestones={} critical={} warnings={}",
        scheduled.len(),
        critical_sequence.len(),
        warnings.len()
    );

    Ok(CriticalPathReport {
        milestones: scheduled,
        critical_sequence,
        project_start,
        project_finish,
        warnings,
    })
}

/// Ids of critical milestones ordered by earliest start, then `sort_order`,
/// then id. Milestones never scheduled are skipped.
pub fn get_critical_path_sequence(milestones: &[Milestone]) -> Vec<MilestoneId> {
    let mut critical: Vec<(&Milestone, &ScheduleWindow)> = milestones
        .iter()
        .filter_map(|milestone| {
            milestone
                .schedule
                .as_ref()
                .filter(|window| window.is_critical)
                .map(|window| (milestone, window))
        })
        .collect();
    critical.sort_by(|(a, a_window), (b, b_window)| {
        a_window
            .earliest_start
            .cmp(&b_window.earliest_start)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.uuid.cmp(&b.uuid))
    });
    critical
        .into_iter()
        .map(|(milestone, _)| milestone.uuid)
        .collect()
}
