//! Structure initializer and two-level tree synchronizer.
//!
//! # Responsibility
//! - Build a fresh document tree from a validated template.
//! - Reconcile an existing tree against a template: insert missing nodes,
//!   remove obsolete nodes, refresh metadata on matched nodes.
//!
//! # Invariants
//! - Section identity is `code`; sub-section identity is `name`.
//! - Matched text content and selection membership survive every update
//!   path; only delete+insert replaces leaf state.
//! - Synchronizing twice with the same template yields an empty change log
//!   the second time.

use crate::model::document::{
    SectionInstance, SubSectionBody, SubSectionInstance, SyllabusDocument, SyllabusId,
};
use crate::model::template::{
    SectionDef, SubSectionDef, SubSectionKind, TemplateError, TemplateModel,
};
use std::collections::HashSet;
use uuid::Uuid;

/// One structural mutation applied by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureChange {
    /// A section missing from the document was instantiated.
    SectionAdded { code: String },
    /// A section no longer defined by the template was removed, together
    /// with all of its sub-sections.
    SectionRemoved { code: String },
    /// A matched section had `name` or `position` refreshed.
    SectionUpdated { code: String },
    /// A sub-section missing from its section was instantiated empty.
    SubSectionAdded { section_code: String, name: String },
    /// A sub-section no longer defined by the template was removed; its
    /// leaf content is discarded.
    SubSectionRemoved { section_code: String, name: String },
    /// A matched sub-section had `position` or reference metadata refreshed.
    SubSectionUpdated { section_code: String, name: String },
}

/// Ordered log of mutations from one synchronizer run.
///
/// Entry order is deterministic: per level, removals in current document
/// order, then insertions/updates in template definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<StructureChange>,
}

impl ChangeSet {
    /// Returns whether the run changed anything.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of logged changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns the logged changes in application order.
    pub fn changes(&self) -> &[StructureChange] {
        &self.changes
    }

    fn push(&mut self, change: StructureChange) {
        self.changes.push(change);
    }
}

/// Builds a fresh document tree from a template.
///
/// Every section and sub-section is instantiated in template order with
/// empty leaf state: text content is empty, selections start with no chosen
/// values, references copy the template's reference code.
pub fn initialize_document(
    syllabus_id: SyllabusId,
    name: impl Into<String>,
    template: &TemplateModel,
) -> Result<SyllabusDocument, TemplateError> {
    template.validate()?;

    let mut document = SyllabusDocument::new(syllabus_id, name, template.key.clone());
    for section_def in &template.sections {
        document.sections.push(instantiate_section(section_def)?);
    }
    document.sort_structure();
    Ok(document)
}

/// Reconciles `document` against `template` in place.
///
/// Two-level diff keyed by section `code` and sub-section `name`:
/// obsolete nodes are removed (cascading), missing nodes are instantiated
/// empty, matched nodes have metadata refreshed while their leaf content is
/// left untouched. Returns the ordered change log; an empty log means the
/// document already matched the template.
pub fn synchronize_document(
    document: &mut SyllabusDocument,
    template: &TemplateModel,
) -> Result<ChangeSet, TemplateError> {
    template.validate()?;

    let mut changes = ChangeSet::default();

    let template_codes: HashSet<&str> = template
        .sections
        .iter()
        .map(|section| section.code.as_str())
        .collect();

    let removed_codes: Vec<String> = document
        .sections
        .iter()
        .filter(|section| !template_codes.contains(section.code.as_str()))
        .map(|section| section.code.clone())
        .collect();
    document
        .sections
        .retain(|section| template_codes.contains(section.code.as_str()));
    for code in removed_codes {
        changes.push(StructureChange::SectionRemoved { code });
    }

    for section_def in &template.sections {
        let matched = document
            .sections
            .iter()
            .position(|section| section.code == section_def.code);
        match matched {
            Some(index) => {
                let section = &mut document.sections[index];
                if section.name != section_def.name || section.position != section_def.position {
                    section.name = section_def.name.clone();
                    section.position = section_def.position;
                    changes.push(StructureChange::SectionUpdated {
                        code: section_def.code.clone(),
                    });
                }
                synchronize_sub_sections(section, section_def, &mut changes)?;
            }
            None => {
                document.sections.push(instantiate_section(section_def)?);
                changes.push(StructureChange::SectionAdded {
                    code: section_def.code.clone(),
                });
            }
        }
    }

    document.sort_structure();
    Ok(changes)
}

fn synchronize_sub_sections(
    section: &mut SectionInstance,
    section_def: &SectionDef,
    changes: &mut ChangeSet,
) -> Result<(), TemplateError> {
    let template_names: HashSet<&str> = section_def
        .sub_sections
        .iter()
        .map(|sub| sub.name.as_str())
        .collect();

    let removed_names: Vec<String> = section
        .sub_sections
        .iter()
        .filter(|sub| !template_names.contains(sub.name.as_str()))
        .map(|sub| sub.name.clone())
        .collect();
    section
        .sub_sections
        .retain(|sub| template_names.contains(sub.name.as_str()));
    for name in removed_names {
        changes.push(StructureChange::SubSectionRemoved {
            section_code: section_def.code.clone(),
            name,
        });
    }

    for sub_def in &section_def.sub_sections {
        let matched = section
            .sub_sections
            .iter()
            .position(|sub| sub.name == sub_def.name);
        match matched {
            Some(index) => {
                let sub = &mut section.sub_sections[index];
                if requires_rebuild(sub, sub_def) {
                    // Leaf state under the old definition is meaningless under
                    // the new one; replace with a fresh empty instance.
                    *sub = instantiate_sub_section(section_def, sub_def)?;
                    changes.push(StructureChange::SubSectionRemoved {
                        section_code: section_def.code.clone(),
                        name: sub_def.name.clone(),
                    });
                    changes.push(StructureChange::SubSectionAdded {
                        section_code: section_def.code.clone(),
                        name: sub_def.name.clone(),
                    });
                } else if refresh_metadata(sub, sub_def) {
                    changes.push(StructureChange::SubSectionUpdated {
                        section_code: section_def.code.clone(),
                        name: sub_def.name.clone(),
                    });
                }
            }
            None => {
                section
                    .sub_sections
                    .push(instantiate_sub_section(section_def, sub_def)?);
                changes.push(StructureChange::SubSectionAdded {
                    section_code: section_def.code.clone(),
                    name: sub_def.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// A matched sub-section must be rebuilt when its kind changed, or when a
/// selection now points at a different attribute group (the stored chosen
/// values belong to the old group).
fn requires_rebuild(sub: &SubSectionInstance, sub_def: &SubSectionDef) -> bool {
    match (&sub.body, sub_def.kind) {
        (SubSectionBody::Text { .. }, SubSectionKind::Text) => false,
        (SubSectionBody::Reference { .. }, SubSectionKind::Reference) => false,
        (
            SubSectionBody::Selection {
                attribute_group_id, ..
            },
            SubSectionKind::Selection,
        ) => Some(*attribute_group_id) != sub_def.attribute_group_id,
        _ => true,
    }
}

/// Refreshes position and reference metadata on a kind-stable match.
/// Returns whether anything changed. Never touches text content or
/// selection membership.
fn refresh_metadata(sub: &mut SubSectionInstance, sub_def: &SubSectionDef) -> bool {
    let mut touched = false;
    if sub.position != sub_def.position {
        sub.position = sub_def.position;
        touched = true;
    }
    if let (SubSectionBody::Reference { reference_code }, Some(def_code)) =
        (&mut sub.body, sub_def.reference_code.as_deref())
    {
        if reference_code != def_code {
            *reference_code = def_code.to_string();
            touched = true;
        }
    }
    touched
}

fn instantiate_section(section_def: &SectionDef) -> Result<SectionInstance, TemplateError> {
    let mut sub_sections = Vec::with_capacity(section_def.sub_sections.len());
    for sub_def in &section_def.sub_sections {
        sub_sections.push(instantiate_sub_section(section_def, sub_def)?);
    }
    Ok(SectionInstance {
        section_id: Uuid::new_v4(),
        code: section_def.code.clone(),
        name: section_def.name.clone(),
        position: section_def.position,
        sub_sections,
    })
}

fn instantiate_sub_section(
    section_def: &SectionDef,
    sub_def: &SubSectionDef,
) -> Result<SubSectionInstance, TemplateError> {
    let body = match sub_def.kind {
        SubSectionKind::Text => SubSectionBody::Text {
            content: String::new(),
        },
        SubSectionKind::Selection => match sub_def.attribute_group_id {
            Some(attribute_group_id) => SubSectionBody::Selection {
                attribute_group_id,
                selected_value_ids: Default::default(),
            },
            None => {
                return Err(TemplateError::MissingAttributeGroup {
                    section_code: section_def.code.clone(),
                    name: sub_def.name.clone(),
                });
            }
        },
        SubSectionKind::Reference => match sub_def.reference_code.as_deref() {
            Some(reference_code) if !reference_code.trim().is_empty() => {
                SubSectionBody::Reference {
                    reference_code: reference_code.to_string(),
                }
            }
            _ => {
                return Err(TemplateError::MissingReferenceCode {
                    section_code: section_def.code.clone(),
                    name: sub_def.name.clone(),
                });
            }
        },
    };

    Ok(SubSectionInstance {
        sub_section_id: Uuid::new_v4(),
        name: sub_def.name.clone(),
        position: sub_def.position,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::{initialize_document, synchronize_document, StructureChange};
    use crate::model::document::SubSectionBody;
    use crate::model::template::{SectionDef, SubSectionDef, SubSectionKind, TemplateModel};
    use uuid::Uuid;

    fn text_sub(name: &str, position: i64) -> SubSectionDef {
        SubSectionDef {
            name: name.to_string(),
            kind: SubSectionKind::Text,
            position,
            attribute_group_id: None,
            reference_code: None,
        }
    }

    fn section(code: &str, name: &str, position: i64, subs: Vec<SubSectionDef>) -> SectionDef {
        SectionDef {
            code: code.to_string(),
            name: name.to_string(),
            position,
            sub_sections: subs,
        }
    }

    #[test]
    fn initialize_builds_empty_leaves_in_template_order() {
        let template = TemplateModel::new(
            "t1",
            vec![
                section("b", "Second", 2, vec![text_sub("x", 1)]),
                section("a", "First", 1, vec![]),
            ],
        );

        let document = initialize_document(Uuid::new_v4(), "Doc", &template).unwrap();

        assert_eq!(document.template_key, "t1");
        assert_eq!(document.sections.len(), 2);
        assert_eq!(document.sections[0].code, "a");
        assert_eq!(document.sections[1].code, "b");
        let sub = &document.sections[1].sub_sections[0];
        assert_eq!(sub.body, SubSectionBody::Text { content: String::new() });
    }

    #[test]
    fn synchronize_is_idempotent() {
        let template = TemplateModel::new(
            "t1",
            vec![section("a", "A", 1, vec![text_sub("x", 1), text_sub("y", 2)])],
        );
        let mut document = initialize_document(Uuid::new_v4(), "Doc", &template).unwrap();

        let first = synchronize_document(&mut document, &template).unwrap();
        assert!(first.is_empty());

        let second = synchronize_document(&mut document, &template).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn change_log_orders_removals_before_template_order_inserts() {
        let initial = TemplateModel::new(
            "t1",
            vec![
                section("old", "Old", 1, vec![]),
                section("keep", "Keep", 2, vec![text_sub("stale", 1)]),
            ],
        );
        let mut document = initialize_document(Uuid::new_v4(), "Doc", &initial).unwrap();

        let updated = TemplateModel::new(
            "t2",
            vec![
                section("keep", "Keep", 1, vec![text_sub("fresh", 1)]),
                section("new", "New", 2, vec![]),
            ],
        );
        let changes = synchronize_document(&mut document, &updated).unwrap();

        assert_eq!(
            changes.changes(),
            &[
                StructureChange::SectionRemoved { code: "old".to_string() },
                StructureChange::SectionUpdated { code: "keep".to_string() },
                StructureChange::SubSectionRemoved {
                    section_code: "keep".to_string(),
                    name: "stale".to_string(),
                },
                StructureChange::SubSectionAdded {
                    section_code: "keep".to_string(),
                    name: "fresh".to_string(),
                },
                StructureChange::SectionAdded { code: "new".to_string() },
            ]
        );
    }

    #[test]
    fn section_rename_propagates_without_losing_content() {
        let initial = TemplateModel::new("t1", vec![section("a", "A", 1, vec![text_sub("x", 1)])]);
        let mut document = initialize_document(Uuid::new_v4(), "Doc", &initial).unwrap();
        if let SubSectionBody::Text { content } =
            &mut document.sections[0].sub_sections[0].body
        {
            *content = "hello".to_string();
        }

        let renamed = TemplateModel::new(
            "t2",
            vec![section("a", "A renamed", 1, vec![text_sub("x", 1)])],
        );
        let changes = synchronize_document(&mut document, &renamed).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(document.sections[0].name, "A renamed");
        assert_eq!(
            document.sections[0].sub_sections[0].body,
            SubSectionBody::Text { content: "hello".to_string() }
        );
    }

    #[test]
    fn kind_change_replaces_leaf_state() {
        let initial = TemplateModel::new("t1", vec![section("a", "A", 1, vec![text_sub("x", 1)])]);
        let mut document = initialize_document(Uuid::new_v4(), "Doc", &initial).unwrap();
        if let SubSectionBody::Text { content } =
            &mut document.sections[0].sub_sections[0].body
        {
            *content = "typed text".to_string();
        }

        let group_id = Uuid::new_v4();
        let redefined = TemplateModel::new(
            "t2",
            vec![section(
                "a",
                "A",
                1,
                vec![SubSectionDef {
                    name: "x".to_string(),
                    kind: SubSectionKind::Selection,
                    position: 1,
                    attribute_group_id: Some(group_id),
                    reference_code: None,
                }],
            )],
        );
        let changes = synchronize_document(&mut document, &redefined).unwrap();

        assert_eq!(changes.len(), 2);
        match &document.sections[0].sub_sections[0].body {
            SubSectionBody::Selection {
                attribute_group_id,
                selected_value_ids,
            } => {
                assert_eq!(*attribute_group_id, group_id);
                assert!(selected_value_ids.is_empty());
            }
            other => panic!("expected selection body, got {other:?}"),
        }
    }
}
