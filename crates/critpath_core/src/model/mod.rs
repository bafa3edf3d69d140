//! Scheduling domain model.
//!
//! # Responsibility
//! - Define the milestone record consumed and produced by the scheduler.
//! - Define the read-only project record that supplies the anchor date.
//!
//! # Invariants
//! - Every milestone is identified by a stable `MilestoneId`.
//! - Derived schedule fields live in `ScheduleWindow` and are only ever
//!   written by a recalculation pass.

pub mod milestone;
pub mod project;
