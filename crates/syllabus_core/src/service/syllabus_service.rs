//! Syllabus use-case service.
//!
//! # Responsibility
//! - Create documents from templates, keep the stored population in sync
//!   with evolving templates, and apply leaf edits (text, selections).
//! - Validate selection values against the sub-section's attribute group
//!   before any membership mutation.
//!
//! # Invariants
//! - A sync either persists the full change set for one document or leaves
//!   that document's committed state unchanged.
//! - Batch sync never aborts on one document's failure; failures are
//!   reported per document.

use crate::model::document::{SubSectionId, SyllabusDocument, SyllabusId};
use crate::model::template::{AttributeGroupId, AttributeValueId, TemplateError};
use crate::repo::syllabus_repo::{SyllabusRepoError, SyllabusRepository};
use crate::sync::engine::{initialize_document, synchronize_document, ChangeSet};
use crate::sync::template_source::{TemplateSource, TemplateSourceError};
use log::{error, info};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from syllabus service operations.
#[derive(Debug)]
pub enum SyllabusServiceError {
    /// Display name is blank after trim.
    InvalidSyllabusName,
    /// Another syllabus already uses the requested name.
    DuplicateSyllabusName(String),
    /// Target syllabus does not exist.
    SyllabusNotFound(SyllabusId),
    /// Template source could not resolve the document's template key.
    TemplateUnavailable(TemplateSourceError),
    /// Template resolved but failed structural validation.
    TemplateInvalid(TemplateError),
    /// Target sub-section does not exist.
    SubSectionNotFound(SubSectionId),
    /// Operation requires a text sub-section.
    TextSubSectionRequired(SubSectionId),
    /// Operation requires a selection sub-section.
    SelectionSubSectionRequired(SubSectionId),
    /// A requested value does not belong to the sub-section's group.
    ValueNotInGroup {
        value_id: AttributeValueId,
        group_id: AttributeGroupId,
    },
    /// Repository-level failure.
    Repo(SyllabusRepoError),
}

impl Display for SyllabusServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSyllabusName => write!(f, "syllabus name must not be blank"),
            Self::DuplicateSyllabusName(name) => {
                write!(f, "syllabus name already in use: `{name}`")
            }
            Self::SyllabusNotFound(id) => write!(f, "syllabus not found: {id}"),
            Self::TemplateUnavailable(err) => write!(f, "{err}"),
            Self::TemplateInvalid(err) => write!(f, "{err}"),
            Self::SubSectionNotFound(id) => write!(f, "sub-section not found: {id}"),
            Self::TextSubSectionRequired(id) => {
                write!(f, "sub-section must be text kind: {id}")
            }
            Self::SelectionSubSectionRequired(id) => {
                write!(f, "sub-section must be selection kind: {id}")
            }
            Self::ValueNotInGroup { value_id, group_id } => write!(
                f,
                "value {value_id} does not belong to attribute group {group_id}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyllabusServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TemplateUnavailable(err) => Some(err),
            Self::TemplateInvalid(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SyllabusRepoError> for SyllabusServiceError {
    fn from(value: SyllabusRepoError) -> Self {
        match value {
            SyllabusRepoError::SyllabusNotFound(id) => Self::SyllabusNotFound(id),
            SyllabusRepoError::DuplicateSyllabusName(name) => Self::DuplicateSyllabusName(name),
            SyllabusRepoError::SubSectionNotFound(id) => Self::SubSectionNotFound(id),
            SyllabusRepoError::NotTextSubSection(id) => Self::TextSubSectionRequired(id),
            SyllabusRepoError::NotSelectionSubSection(id) => {
                Self::SelectionSubSectionRequired(id)
            }
            other => Self::Repo(other),
        }
    }
}

/// One document's failed synchronization: the document's committed state is
/// unchanged and the batch (if any) continues.
#[derive(Debug)]
pub struct SyncFailure {
    pub syllabus_id: SyllabusId,
    pub cause: SyllabusServiceError,
}

impl Display for SyncFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "structure sync failed for syllabus {}: {}",
            self.syllabus_id, self.cause
        )
    }
}

impl Error for SyncFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// One successfully synchronized document in a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedDocument {
    pub syllabus_id: SyllabusId,
    /// Number of structural changes applied; zero means already in sync.
    pub change_count: usize,
}

/// Outcome of one batch run over the whole document population.
#[derive(Debug, Default)]
pub struct SyncRunReport {
    pub synced: Vec<SyncedDocument>,
    pub failures: Vec<SyncFailure>,
}

impl SyncRunReport {
    /// Total structural changes applied across all synced documents.
    pub fn total_changes(&self) -> usize {
        self.synced.iter().map(|entry| entry.change_count).sum()
    }

    /// Number of documents that actually changed.
    pub fn changed_documents(&self) -> usize {
        self.synced
            .iter()
            .filter(|entry| entry.change_count > 0)
            .count()
    }
}

/// Syllabus service facade over a repository and a template source.
pub struct SyllabusService<R: SyllabusRepository, S: TemplateSource> {
    repo: R,
    templates: S,
}

impl<R: SyllabusRepository, S: TemplateSource> SyllabusService<R, S> {
    /// Creates a service from repository and template source implementations.
    pub fn new(repo: R, templates: S) -> Self {
        Self { repo, templates }
    }

    /// Creates one syllabus document from the given template key.
    ///
    /// The document is instantiated per the template (empty leaf state) and
    /// persisted in one transaction.
    pub fn create_syllabus(
        &self,
        name: impl Into<String>,
        template_key: &str,
    ) -> Result<SyllabusDocument, SyllabusServiceError> {
        let name = normalize_syllabus_name(name.into())?;
        let template = self
            .templates
            .load(template_key)
            .map_err(SyllabusServiceError::TemplateUnavailable)?;
        let document = initialize_document(Uuid::new_v4(), name, &template)
            .map_err(SyllabusServiceError::TemplateInvalid)?;
        self.repo.insert_document(&document)?;

        info!(
            "event=syllabus_create module=service status=ok syllabus={} template={} sections={} sub_sections={}",
            document.syllabus_id,
            template.key,
            document.sections.len(),
            document.sub_section_count()
        );
        Ok(document)
    }

    /// Loads one document tree.
    pub fn get_document(
        &self,
        syllabus_id: SyllabusId,
    ) -> Result<Option<SyllabusDocument>, SyllabusServiceError> {
        self.repo.load_document(syllabus_id).map_err(Into::into)
    }

    /// Synchronizes one document against its bound template.
    ///
    /// Returns the applied change set; empty means the document already
    /// matched. On failure the document's committed state is unchanged.
    pub fn sync_syllabus(&self, syllabus_id: SyllabusId) -> Result<ChangeSet, SyncFailure> {
        match self.sync_inner(syllabus_id) {
            Ok(changes) => {
                info!(
                    "event=structure_sync module=service status=ok syllabus={syllabus_id} changes={}",
                    changes.len()
                );
                Ok(changes)
            }
            Err(cause) => {
                error!(
                    "event=structure_sync module=service status=error syllabus={syllabus_id} error={cause}"
                );
                Err(SyncFailure { syllabus_id, cause })
            }
        }
    }

    /// Synchronizes every stored document, collecting per-document outcomes.
    pub fn sync_all(&self) -> Result<SyncRunReport, SyllabusServiceError> {
        let ids = self.repo.list_syllabus_ids()?;
        let mut report = SyncRunReport::default();

        for syllabus_id in ids {
            match self.sync_syllabus(syllabus_id) {
                Ok(changes) => report.synced.push(SyncedDocument {
                    syllabus_id,
                    change_count: changes.len(),
                }),
                Err(failure) => report.failures.push(failure),
            }
        }

        info!(
            "event=structure_sync_batch module=service status=ok documents={} changed={} changes={} failures={}",
            report.synced.len(),
            report.changed_documents(),
            report.total_changes(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Replaces the content of one text sub-section.
    pub fn update_text_content(
        &self,
        sub_section_id: SubSectionId,
        content: &str,
    ) -> Result<(), SyllabusServiceError> {
        self.repo
            .update_text_content(sub_section_id, content)
            .map_err(Into::into)
    }

    /// Replaces the full selected-value set of one selection sub-section.
    ///
    /// Every requested value must belong to the sub-section's attribute
    /// group; the whole request is rejected before mutation otherwise.
    pub fn apply_selection(
        &self,
        sub_section_id: SubSectionId,
        value_ids: &[AttributeValueId],
    ) -> Result<(), SyllabusServiceError> {
        let group_id = self.repo.selection_group(sub_section_id)?;
        let allowed = self.repo.group_value_ids(group_id)?;

        let desired: BTreeSet<AttributeValueId> = value_ids.iter().copied().collect();
        for value_id in &desired {
            if !allowed.contains(value_id) {
                return Err(SyllabusServiceError::ValueNotInGroup {
                    value_id: *value_id,
                    group_id,
                });
            }
        }

        self.repo
            .replace_selection(sub_section_id, &desired)
            .map_err(Into::into)
    }

    fn sync_inner(&self, syllabus_id: SyllabusId) -> Result<ChangeSet, SyllabusServiceError> {
        let mut document = self
            .repo
            .load_document(syllabus_id)?
            .ok_or(SyllabusServiceError::SyllabusNotFound(syllabus_id))?;
        let template = self
            .templates
            .load(&document.template_key)
            .map_err(SyllabusServiceError::TemplateUnavailable)?;

        let changes = synchronize_document(&mut document, &template)
            .map_err(SyllabusServiceError::TemplateInvalid)?;
        if !changes.is_empty() {
            self.repo.save_document(&document)?;
        }
        Ok(changes)
    }
}

fn normalize_syllabus_name(value: String) -> Result<String, SyllabusServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyllabusServiceError::InvalidSyllabusName);
    }
    Ok(trimmed.to_string())
}
