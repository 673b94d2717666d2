//! CLI smoke entry point.
//!
//! # Responsibility
//! - Drive the core end-to-end against an in-memory database: seed
//!   reference data, create a syllabus from a template, edit a leaf, then
//!   resync after a template revision.
//! - Keep output deterministic for quick local sanity checks.

use syllabus_core::db::open_db_in_memory;
use syllabus_core::{
    SectionDef, SqliteSyllabusRepository, SubSectionBody, SubSectionDef, SubSectionKind,
    SyllabusRepository, SyllabusService, TemplateModel, TemplateRegistry,
};

const TEMPLATE_KEY: &str = "syllabus_2025";

fn main() {
    if let Err(err) = run() {
        eprintln!("smoke failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("syllabus_core version={}", syllabus_core::core_version());

    let conn = open_db_in_memory()?;

    let group_id = {
        let repo = SqliteSyllabusRepository::try_new(&conn)?;
        let group_id = repo.create_attribute_group("Teaching mode")?;
        repo.create_attribute_value(group_id, "Lecture")?;
        repo.create_attribute_value(group_id, "Laboratory")?;
        group_id
    };

    let mut registry = TemplateRegistry::new();
    registry.register(TemplateModel::new(
        TEMPLATE_KEY,
        vec![SectionDef {
            code: "general_info".to_string(),
            name: "General Information".to_string(),
            position: 1,
            sub_sections: vec![
                text_sub("Course title in English", 1),
                SubSectionDef {
                    name: "Teaching mode".to_string(),
                    kind: SubSectionKind::Selection,
                    position: 2,
                    attribute_group_id: Some(group_id),
                    reference_code: None,
                },
                SubSectionDef {
                    name: "Credits".to_string(),
                    kind: SubSectionKind::Reference,
                    position: 3,
                    attribute_group_id: None,
                    reference_code: Some("credit".to_string()),
                },
            ],
        }],
    ))?;

    let syllabus_id = {
        let service =
            SyllabusService::new(SqliteSyllabusRepository::try_new(&conn)?, &registry);
        let document = service.create_syllabus("Introduction to Programming", TEMPLATE_KEY)?;
        println!(
            "created syllabus sections={} sub_sections={}",
            document.sections.len(),
            document.sub_section_count()
        );

        let title = document
            .section("general_info")
            .and_then(|section| section.sub_section("Course title in English"))
            .ok_or("course title sub-section missing")?;
        service.update_text_content(title.sub_section_id, "Introduction to Programming")?;
        document.syllabus_id
    };

    // Revision adds a course-overview section; the resync must keep the
    // edited title untouched.
    registry.replace(TemplateModel::new(
        TEMPLATE_KEY,
        vec![
            SectionDef {
                code: "general_info".to_string(),
                name: "General Information".to_string(),
                position: 1,
                sub_sections: vec![
                    text_sub("Course title in English", 1),
                    SubSectionDef {
                        name: "Teaching mode".to_string(),
                        kind: SubSectionKind::Selection,
                        position: 2,
                        attribute_group_id: Some(group_id),
                        reference_code: None,
                    },
                ],
            },
            SectionDef {
                code: "course_overview".to_string(),
                name: "Course Overview".to_string(),
                position: 2,
                sub_sections: vec![text_sub("Detailed description", 1)],
            },
        ],
    ))?;

    let service = SyllabusService::new(SqliteSyllabusRepository::try_new(&conn)?, &registry);
    let report = service.sync_all()?;
    println!(
        "synced documents={} changed={} changes={} failures={}",
        report.synced.len(),
        report.changed_documents(),
        report.total_changes(),
        report.failures.len()
    );

    let document = service
        .get_document(syllabus_id)?
        .ok_or("synced syllabus missing")?;
    let title = document
        .section("general_info")
        .and_then(|section| section.sub_section("Course title in English"))
        .ok_or("course title sub-section missing after sync")?;
    match &title.body {
        SubSectionBody::Text { content } => {
            println!("title after sync=`{content}` sections={}", document.sections.len());
        }
        _ => return Err("course title is not a text sub-section".into()),
    }

    Ok(())
}

fn text_sub(name: &str, position: i64) -> SubSectionDef {
    SubSectionDef {
        name: name.to_string(),
        kind: SubSectionKind::Text,
        position,
        attribute_group_id: None,
        reference_code: None,
    }
}
