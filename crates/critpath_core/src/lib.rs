//! Critical path scheduling core.
//! This crate owns milestone graph invariants and the derived schedule.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schedule;
pub mod service;

pub use config::{ConfigError, SchedulerConfig, SinkAnchor};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::milestone::{
    normalize_dependencies, DependencyRef, Milestone, MilestoneDraft, MilestoneId,
    MilestoneStatus, MilestoneValidationError, ScheduleWindow, MAX_SPAN_DAYS,
};
pub use model::project::{Project, ProjectId};
pub use repo::milestone_repo::{
    MilestoneChanges, MilestoneRepository, RepoError, RepoResult, SqliteMilestoneRepository,
};
pub use schedule::cpm::{
    calculate_critical_path, get_critical_path_sequence, CriticalPathReport, ScheduleContext,
    ScheduleError, TimingWarning,
};
pub use schedule::date_math::{
    add_business_days, add_calendar_days, days_between, is_weekend, DateOutOfRange,
};
pub use schedule::graph::{
    detect_circular_dependencies, find_cycle, find_missing_dependencies, topological_sort,
    CycleError, DependencyGraph,
};
pub use schedule::reassign::{DeletionPlan, InvalidReplacement, ReassignmentDecision};
pub use service::clock::{Clock, FixedClock, SystemClock};
pub use service::project_lock::ProjectLocks;
pub use service::schedule_service::{
    AppliedReassignment, DeletionOutcome, ScheduleResult, ScheduleService, ScheduleServiceError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
