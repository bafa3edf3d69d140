//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls and scheduling passes into use-case APIs.
//! - Serialize recalculation per project.

pub mod clock;
pub mod project_lock;
pub mod schedule_service;
