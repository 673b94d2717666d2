use syllabus_core::{
    SubSectionKind, TemplateError, TemplateModel, TemplateRegistry, TemplateRegistryError,
    TemplateSource, TemplateSourceError,
};
use uuid::Uuid;

const STRUCTURE_JSON: &str = r#"[
    {
        "code": "general_info",
        "name": "General Information",
        "position": 1,
        "sub_sections": [
            {"name": "Course title in English", "type": "text", "position": 1},
            {
                "name": "Teaching mode",
                "type": "selection",
                "position": 2,
                "attribute_group_id": "5f0c3d6a-9a3e-4d86-9c79-55fbd6a2a8d1"
            },
            {"name": "Credits", "type": "reference", "position": 3, "reference_code": "credit"}
        ]
    },
    {
        "code": "course_overview",
        "name": "Course Overview",
        "position": 2,
        "sub_sections": [
            {"name": "Detailed description", "type": "text", "position": 1},
            {
                "name": "Textbook and materials",
                "type": "reference",
                "position": 2,
                "reference_code": "learning_material"
            }
        ]
    }
]"#;

#[test]
fn from_json_parses_structure_file_format() {
    let template = TemplateModel::from_json("syllabus_2025", STRUCTURE_JSON).unwrap();
    template.validate().unwrap();

    assert_eq!(template.sections.len(), 2);
    let general = template.section("general_info").unwrap();
    assert_eq!(general.sub_sections.len(), 3);
    assert_eq!(general.sub_sections[0].kind, SubSectionKind::Text);
    assert_eq!(general.sub_sections[1].kind, SubSectionKind::Selection);
    assert_eq!(
        general.sub_sections[1].attribute_group_id,
        Some(Uuid::parse_str("5f0c3d6a-9a3e-4d86-9c79-55fbd6a2a8d1").unwrap())
    );
    assert_eq!(
        general.sub_sections[2].reference_code.as_deref(),
        Some("credit")
    );
}

#[test]
fn from_json_rejects_unknown_kind() {
    let json = r#"[
        {
            "code": "general_info",
            "name": "General Information",
            "position": 1,
            "sub_sections": [{"name": "x", "type": "table", "position": 1}]
        }
    ]"#;
    assert!(TemplateModel::from_json("broken", json).is_err());
}

#[test]
fn validation_names_the_offending_definition() {
    let json = r#"[
        {
            "code": "general_info",
            "name": "General Information",
            "position": 1,
            "sub_sections": [{"name": "Teaching mode", "type": "selection", "position": 1}]
        }
    ]"#;
    let template = TemplateModel::from_json("syllabus_2025", json).unwrap();
    let err = template.validate().unwrap_err();
    assert_eq!(
        err,
        TemplateError::MissingAttributeGroup {
            section_code: "general_info".to_string(),
            name: "Teaching mode".to_string(),
        }
    );
}

#[test]
fn registry_round_trips_registered_json() {
    let mut registry = TemplateRegistry::new();
    registry.register_json("syllabus_2025", STRUCTURE_JSON).unwrap();

    let loaded = registry.load("syllabus_2025").unwrap();
    assert_eq!(loaded.key, "syllabus_2025");
    assert_eq!(loaded.sections.len(), 2);

    let err = registry.load("syllabus_2024").unwrap_err();
    assert_eq!(err, TemplateSourceError::NotFound("syllabus_2024".to_string()));
}

#[test]
fn registry_rejects_invalid_template_on_registration() {
    let json = r#"[
        {
            "code": "general_info",
            "name": "General Information",
            "position": 1,
            "sub_sections": [{"name": "Credits", "type": "reference", "position": 1}]
        }
    ]"#;
    let mut registry = TemplateRegistry::new();
    let err = registry.register_json("syllabus_2025", json).unwrap_err();
    assert!(matches!(
        err,
        TemplateRegistryError::Invalid(TemplateError::MissingReferenceCode { .. })
    ));
    assert!(registry.is_empty());
}
