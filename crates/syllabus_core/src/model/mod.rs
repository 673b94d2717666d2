//! Canonical domain model for templates and syllabus documents.
//!
//! # Responsibility
//! - Define the structure-template shape and its validation rules.
//! - Define the live document tree that templates are instantiated into.
//!
//! # Invariants
//! - Section codes are unique within a template and within a document.
//! - Sub-section names are unique within their owning section.

pub mod document;
pub mod template;
