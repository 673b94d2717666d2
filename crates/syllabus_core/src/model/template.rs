//! Structure template model.
//!
//! # Responsibility
//! - Describe the versioned section/sub-section layout a syllabus follows.
//! - Validate identity and kind-specific payload before a template is used
//!   to build or synchronize any document.
//!
//! # Invariants
//! - Section codes are unique within one template.
//! - Sub-section names are unique within one section definition.
//! - Selection definitions carry an attribute group id.
//! - Reference definitions carry a non-empty reference code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of an attribute group (reference data).
pub type AttributeGroupId = Uuid;

/// Stable identifier of one value inside an attribute group.
pub type AttributeValueId = Uuid;

/// Validation errors for a structure template.
///
/// Every variant names the offending definition so batch tooling can report
/// which part of a template file is broken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A section definition has a blank code.
    BlankSectionCode { position: i64 },
    /// Two section definitions share one code.
    DuplicateSectionCode { code: String },
    /// A sub-section definition has a blank name.
    BlankSubSectionName { section_code: String },
    /// Two sub-section definitions in one section share one name.
    DuplicateSubSectionName { section_code: String, name: String },
    /// A selection definition is missing its attribute group.
    MissingAttributeGroup { section_code: String, name: String },
    /// A reference definition is missing its reference code.
    MissingReferenceCode { section_code: String, name: String },
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSectionCode { position } => {
                write!(f, "section definition at position {position} has a blank code")
            }
            Self::DuplicateSectionCode { code } => {
                write!(f, "section code `{code}` appears more than once")
            }
            Self::BlankSubSectionName { section_code } => {
                write!(f, "section `{section_code}` has a sub-section with a blank name")
            }
            Self::DuplicateSubSectionName { section_code, name } => write!(
                f,
                "sub-section name `{name}` appears more than once in section `{section_code}`"
            ),
            Self::MissingAttributeGroup { section_code, name } => write!(
                f,
                "selection sub-section `{name}` in section `{section_code}` has no attribute group"
            ),
            Self::MissingReferenceCode { section_code, name } => write!(
                f,
                "reference sub-section `{name}` in section `{section_code}` has no reference code"
            ),
        }
    }
}

impl Error for TemplateError {}

/// Sub-section payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubSectionKind {
    /// Free text entered by the document editor.
    Text,
    /// Multi-select over one attribute group.
    Selection,
    /// Pointer to an external concept (credit, learning materials, ...).
    Reference,
}

/// Definition of one sub-section inside a section.
///
/// Kind-specific fields are optional at the serde layer so the original
/// structure-file format (which omits absent fields) parses unchanged;
/// `validate` enforces their presence per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSectionDef {
    /// Identity key within the owning section.
    pub name: String,
    /// Serialized as `type` to match the structure-file schema.
    #[serde(rename = "type")]
    pub kind: SubSectionKind,
    /// Ordering key within the owning section.
    pub position: i64,
    /// Required when `kind == SubSectionKind::Selection`.
    #[serde(default)]
    pub attribute_group_id: Option<AttributeGroupId>,
    /// Required when `kind == SubSectionKind::Reference`.
    #[serde(default)]
    pub reference_code: Option<String>,
}

/// Definition of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDef {
    /// Identity key within the template; survives renames across versions.
    pub code: String,
    /// Display label; free to change across versions.
    pub name: String,
    /// Ordering key within the template.
    pub position: i64,
    /// Ordered sub-section definitions.
    #[serde(default)]
    pub sub_sections: Vec<SubSectionDef>,
}

/// A complete, keyed structure template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateModel {
    /// Source key this template was resolved under (e.g. `syllabus_2025`).
    pub key: String,
    /// Ordered section definitions.
    pub sections: Vec<SectionDef>,
}

impl TemplateModel {
    /// Creates a template from already-built section definitions.
    pub fn new(key: impl Into<String>, sections: Vec<SectionDef>) -> Self {
        Self {
            key: key.into(),
            sections,
        }
    }

    /// Parses the structure-file JSON format: a bare array of sections.
    ///
    /// Parsing does not validate; callers run `validate` before using the
    /// template against any document.
    pub fn from_json(key: impl Into<String>, json: &str) -> Result<Self, serde_json::Error> {
        let sections: Vec<SectionDef> = serde_json::from_str(json)?;
        Ok(Self::new(key, sections))
    }

    /// Returns one section definition by code.
    pub fn section(&self, code: &str) -> Option<&SectionDef> {
        self.sections.iter().find(|section| section.code == code)
    }

    /// Checks template-wide identity and kind-specific payload rules.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let mut seen_codes: BTreeSet<&str> = BTreeSet::new();
        for section in &self.sections {
            if section.code.trim().is_empty() {
                return Err(TemplateError::BlankSectionCode {
                    position: section.position,
                });
            }
            if !seen_codes.insert(section.code.as_str()) {
                return Err(TemplateError::DuplicateSectionCode {
                    code: section.code.clone(),
                });
            }

            let mut seen_names: BTreeSet<&str> = BTreeSet::new();
            for sub_section in &section.sub_sections {
                if sub_section.name.trim().is_empty() {
                    return Err(TemplateError::BlankSubSectionName {
                        section_code: section.code.clone(),
                    });
                }
                if !seen_names.insert(sub_section.name.as_str()) {
                    return Err(TemplateError::DuplicateSubSectionName {
                        section_code: section.code.clone(),
                        name: sub_section.name.clone(),
                    });
                }
                validate_kind_payload(section, sub_section)?;
            }
        }
        Ok(())
    }
}

fn validate_kind_payload(
    section: &SectionDef,
    sub_section: &SubSectionDef,
) -> Result<(), TemplateError> {
    match sub_section.kind {
        SubSectionKind::Text => Ok(()),
        SubSectionKind::Selection => {
            if sub_section.attribute_group_id.is_none() {
                return Err(TemplateError::MissingAttributeGroup {
                    section_code: section.code.clone(),
                    name: sub_section.name.clone(),
                });
            }
            Ok(())
        }
        SubSectionKind::Reference => {
            let has_code = sub_section
                .reference_code
                .as_deref()
                .is_some_and(|code| !code.trim().is_empty());
            if !has_code {
                return Err(TemplateError::MissingReferenceCode {
                    section_code: section.code.clone(),
                    name: sub_section.name.clone(),
                });
            }
            Ok(())
        }
    }
}
