//! Live syllabus document tree.
//!
//! # Responsibility
//! - Represent one editable syllabus instance: sections owning polymorphic
//!   sub-sections, ordered the way the structure template orders them.
//! - Keep leaf state (text content, selected values) next to the structure
//!   so whole-document persistence is a single-shape operation.
//!
//! # Invariants
//! - `code` is unique across a document's sections.
//! - `name` is unique across one section's sub-sections.
//! - Sections sort by `(position, code)`, sub-sections by `(position, name)`.

use crate::model::template::{AttributeGroupId, AttributeValueId, SubSectionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable identifier of one syllabus document.
pub type SyllabusId = Uuid;

/// Stable identifier of one section instance.
pub type SectionId = Uuid;

/// Stable identifier of one sub-section instance.
pub type SubSectionId = Uuid;

/// Kind-specific leaf state of a sub-section instance.
///
/// Exactly one variant per template kind; each variant holds only the
/// fields that kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubSectionBody {
    /// Free text entered by the document editor.
    Text { content: String },
    /// Multi-select membership over one attribute group.
    Selection {
        attribute_group_id: AttributeGroupId,
        selected_value_ids: BTreeSet<AttributeValueId>,
    },
    /// Pointer to an external concept rendered elsewhere.
    Reference { reference_code: String },
}

impl SubSectionBody {
    /// Returns the template kind this body corresponds to.
    pub fn kind(&self) -> SubSectionKind {
        match self {
            Self::Text { .. } => SubSectionKind::Text,
            Self::Selection { .. } => SubSectionKind::Selection,
            Self::Reference { .. } => SubSectionKind::Reference,
        }
    }
}

/// One sub-section instance owned by a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSectionInstance {
    /// Stable id, preserved across structure syncs for matched nodes.
    pub sub_section_id: SubSectionId,
    /// Identity key within the owning section.
    pub name: String,
    /// Ordering key within the owning section.
    pub position: i64,
    /// Kind-specific leaf state.
    pub body: SubSectionBody,
}

/// One section instance owned by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInstance {
    /// Stable id, preserved across structure syncs for matched nodes.
    pub section_id: SectionId,
    /// Identity key within the document.
    pub code: String,
    /// Display label, refreshed from the template on sync.
    pub name: String,
    /// Ordering key within the document.
    pub position: i64,
    /// Ordered, exclusively owned sub-sections.
    pub sub_sections: Vec<SubSectionInstance>,
}

impl SectionInstance {
    /// Returns one sub-section by its identity name.
    pub fn sub_section(&self, name: &str) -> Option<&SubSectionInstance> {
        self.sub_sections.iter().find(|sub| sub.name == name)
    }

    /// Returns one sub-section mutably by its identity name.
    pub fn sub_section_mut(&mut self, name: &str) -> Option<&mut SubSectionInstance> {
        self.sub_sections.iter_mut().find(|sub| sub.name == name)
    }
}

/// One complete syllabus document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusDocument {
    /// Stable document id.
    pub syllabus_id: SyllabusId,
    /// Unique display name.
    pub name: String,
    /// Key of the template this document is kept in sync with.
    pub template_key: String,
    /// Ordered, exclusively owned sections.
    pub sections: Vec<SectionInstance>,
}

impl SyllabusDocument {
    /// Creates an empty document shell for the given template key.
    pub fn new(
        syllabus_id: SyllabusId,
        name: impl Into<String>,
        template_key: impl Into<String>,
    ) -> Self {
        Self {
            syllabus_id,
            name: name.into(),
            template_key: template_key.into(),
            sections: Vec::new(),
        }
    }

    /// Returns one section by its identity code.
    pub fn section(&self, code: &str) -> Option<&SectionInstance> {
        self.sections.iter().find(|section| section.code == code)
    }

    /// Returns one section mutably by its identity code.
    pub fn section_mut(&mut self, code: &str) -> Option<&mut SectionInstance> {
        self.sections.iter_mut().find(|section| section.code == code)
    }

    /// Re-sorts sections and sub-sections into canonical order.
    ///
    /// Called after structural mutation so in-memory order always matches
    /// `(position, identity-key)` order.
    pub fn sort_structure(&mut self) {
        self.sections
            .sort_by(|a, b| (a.position, a.code.as_str()).cmp(&(b.position, b.code.as_str())));
        for section in &mut self.sections {
            section
                .sub_sections
                .sort_by(|a, b| (a.position, a.name.as_str()).cmp(&(b.position, b.name.as_str())));
        }
    }

    /// Counts all sub-sections across sections.
    pub fn sub_section_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| section.sub_sections.len())
            .sum()
    }
}
