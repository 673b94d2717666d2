//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Multi-row mutations run inside one immediate transaction.
//! - Repository APIs return semantic errors (`...NotFound`) in addition to
//!   DB transport errors.

pub mod outcome_repo;
pub mod syllabus_repo;
