//! Project record supplied by the host application.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable project identifier that owns a milestone graph.
pub type ProjectId = Uuid;

/// Owner of a milestone graph. Read-only to the scheduling core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: ProjectId,
    pub name: String,
    /// Default anchor for root milestones without a fixed start date.
    pub start_date: Option<NaiveDate>,
}

impl Project {
    /// Creates a project record with a generated id.
    pub fn new(name: impl Into<String>, start_date: Option<NaiveDate>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            start_date,
        }
    }
}
