//! Template-to-document reconciliation.
//!
//! # Responsibility
//! - Instantiate fresh document trees from a template.
//! - Diff and patch existing trees against an evolving template without
//!   destroying user-entered leaf content on matched nodes.
//! - Resolve templates through an injected source instead of ambient state.

pub mod engine;
pub mod template_source;
