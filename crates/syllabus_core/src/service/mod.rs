//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate template resolution, the reconciliation engine, and
//!   repository calls into use-case level APIs.
//! - Validate requests before any mutation reaches persistence.

pub mod outcome_service;
pub mod syllabus_service;
