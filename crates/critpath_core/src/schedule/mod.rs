//! Pure scheduling algorithms.
//!
//! # Responsibility
//! - Date arithmetic, dependency graph ordering, the critical path pass and
//!   deletion reassignment planning.
//!
//! # Invariants
//! - Nothing here touches storage or reads the wall clock.
//! - Every function is deterministic for a given input snapshot.

pub mod cpm;
pub mod date_math;
pub mod graph;
pub mod reassign;
