//! Core domain logic for template-driven syllabus structures.
//! This crate is the single source of truth for reconciliation invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::document::{
    SectionId, SectionInstance, SubSectionBody, SubSectionId, SubSectionInstance,
    SyllabusDocument, SyllabusId,
};
pub use model::template::{
    AttributeGroupId, AttributeValueId, SectionDef, SubSectionDef, SubSectionKind, TemplateError,
    TemplateModel,
};
pub use repo::outcome_repo::{
    ObjectiveId, ObjectiveRecord, OutcomeBridge, OutcomeId, OutcomeRecord, OutcomeRepoError,
    OutcomeRepoResult, OutcomeRepository, PloId, PloRecord, SqliteOutcomeRepository,
};
pub use repo::syllabus_repo::{
    SqliteSyllabusRepository, SyllabusRepoError, SyllabusRepoResult, SyllabusRepository,
};
pub use service::outcome_service::{AssociationDelta, OutcomeService, OutcomeServiceError};
pub use service::syllabus_service::{
    SyllabusService, SyllabusServiceError, SyncFailure, SyncRunReport, SyncedDocument,
};
pub use sync::engine::{initialize_document, synchronize_document, ChangeSet, StructureChange};
pub use sync::template_source::{
    TemplateRegistry, TemplateRegistryError, TemplateSource, TemplateSourceError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
