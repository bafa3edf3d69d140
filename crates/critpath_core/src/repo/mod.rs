//! Store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the milestone store contract the scheduler depends on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Store writes enforce `Milestone::validate()` before persistence.
//! - Store APIs return semantic errors (`NotFound`, `ProjectNotFound`) in
//!   addition to DB transport errors.

pub mod milestone_repo;
