//! Dependency reassignment for milestone deletion.
//!
//! # Responsibility
//! - Classify a pending deletion by who depends on the target and what the
//!   target itself depends on.
//! - Rewrite dependents once the caller has settled on a replacement.
//!
//! # Invariants
//! - Planning never mutates anything.
//! - A replacement is always one of the deleted milestone's own
//!   dependencies, so rewiring cannot introduce a cycle into an acyclic graph.

use crate::model::milestone::{Milestone, MilestoneId};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// How dependents of a deleted milestone get rewired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassignmentDecision {
    /// Depend on this milestone instead of the deleted one.
    ReplaceWith(MilestoneId),
    /// Drop the edge; dependents without other dependencies become roots.
    Detach,
}

/// Classification of a pending deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionPlan {
    /// Nothing depends on the target; delete right away.
    NoDependents,
    /// A single sensible rewiring exists but still needs confirmation.
    AutoReassignable {
        dependents: Vec<MilestoneId>,
        suggestion: ReassignmentDecision,
    },
    /// The target has several dependencies; the caller must pick one of
    /// `candidates` or detach.
    RequiresUserChoice {
        dependents: Vec<MilestoneId>,
        candidates: Vec<MilestoneId>,
    },
}

impl DeletionPlan {
    /// Classifies the deletion of `target` given the project's milestones
    /// that depend on it. Entries that do not actually depend on `target`
    /// are ignored.
    pub fn plan(target: &Milestone, dependents: &[Milestone]) -> Self {
        let dependent_ids: Vec<MilestoneId> = dependents
            .iter()
            .filter(|milestone| milestone.uuid != target.uuid && milestone.depends_on(target.uuid))
            .map(|milestone| milestone.uuid)
            .collect();

        if dependent_ids.is_empty() {
            return Self::NoDependents;
        }

        match target.dependencies.as_slice() {
            [] => Self::AutoReassignable {
                dependents: dependent_ids,
                suggestion: ReassignmentDecision::Detach,
            },
            [only] => Self::AutoReassignable {
                dependents: dependent_ids,
                suggestion: ReassignmentDecision::ReplaceWith(*only),
            },
            many => Self::RequiresUserChoice {
                dependents: dependent_ids,
                candidates: many.to_vec(),
            },
        }
    }

    pub fn dependents(&self) -> &[MilestoneId] {
        match self {
            Self::NoDependents => &[],
            Self::AutoReassignable { dependents, .. } => dependents,
            Self::RequiresUserChoice { dependents, .. } => dependents,
        }
    }

    pub fn requires_decision(&self) -> bool {
        !matches!(self, Self::NoDependents)
    }

    /// The decision to use when the caller accepts the suggestion.
    pub fn suggested_decision(&self) -> Option<ReassignmentDecision> {
        match self {
            Self::AutoReassignable { suggestion, .. } => Some(*suggestion),
            Self::NoDependents | Self::RequiresUserChoice { .. } => None,
        }
    }
}

/// The replacement is not one of the deleted milestone's dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidReplacement {
    pub target: MilestoneId,
    pub replacement: MilestoneId,
}

impl Display for InvalidReplacement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "milestone {} is not a dependency of deleted milestone {}",
            self.replacement, self.target
        )
    }
}

impl Error for InvalidReplacement {}

/// Resolves a decision to the replacement id, if any.
pub fn resolve_replacement(
    target: &Milestone,
    decision: ReassignmentDecision,
) -> Result<Option<MilestoneId>, InvalidReplacement> {
    match decision {
        ReassignmentDecision::Detach => Ok(None),
        ReassignmentDecision::ReplaceWith(replacement) if target.depends_on(replacement) => {
            Ok(Some(replacement))
        }
        ReassignmentDecision::ReplaceWith(replacement) => Err(InvalidReplacement {
            target: target.uuid,
            replacement,
        }),
    }
}

/// Returns rewritten copies of `dependents` with `target` removed from their
/// dependencies and `replacement` added when not already present.
pub fn apply_reassignment(
    target: MilestoneId,
    dependents: &[Milestone],
    replacement: Option<MilestoneId>,
) -> Vec<Milestone> {
    dependents
        .iter()
        .map(|dependent| {
            let mut updated = dependent.clone();
            updated.dependencies.retain(|dep| *dep != target);
            if let Some(replacement) = replacement {
                if replacement != updated.uuid && !updated.depends_on(replacement) {
                    updated.dependencies.push(replacement);
                }
            }
            updated
        })
        .collect()
}
