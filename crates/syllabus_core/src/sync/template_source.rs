//! Template resolution seam and in-process registry.
//!
//! # Responsibility
//! - Define the `TemplateSource` contract the services resolve templates
//!   through, keeping the core free of file I/O and ambient global state.
//! - Provide a validated in-process registry for embedding callers that
//!   hold their template set in memory.
//!
//! # Invariants
//! - Registered templates have passed `TemplateModel::validate`.
//! - Registry keys are normalized (trimmed) and unique.

use crate::model::template::{TemplateError, TemplateModel};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Resolution failures reported by a template source.
///
/// Both variants mean "template unavailable" to a caller: the document(s)
/// bound to the key cannot be synchronized until the source is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSourceError {
    /// No template is known under the requested key.
    NotFound(String),
    /// The source held data for the key but could not produce a model.
    Unparseable { key: String, message: String },
}

impl Display for TemplateSourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "template not found: `{key}`"),
            Self::Unparseable { key, message } => {
                write!(f, "template `{key}` could not be parsed: {message}")
            }
        }
    }
}

impl Error for TemplateSourceError {}

/// Resolves a template key to its structural definition.
///
/// Implementations own whatever external representation exists (files,
/// remote config, seeded fixtures); the core only sees validated models.
pub trait TemplateSource {
    /// Loads one template by key.
    fn load(&self, key: &str) -> Result<TemplateModel, TemplateSourceError>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for &T {
    fn load(&self, key: &str) -> Result<TemplateModel, TemplateSourceError> {
        (**self).load(key)
    }
}

/// Registration errors for the in-process registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRegistryError {
    /// Key is empty or contains characters outside `[a-z0-9._-]`.
    InvalidTemplateKey(String),
    /// Key is already registered; use `replace` to publish a new version.
    DuplicateTemplateKey(String),
    /// `replace` was called for a key that was never registered.
    UnknownTemplateKey(String),
    /// Template failed structural validation.
    Invalid(TemplateError),
    /// JSON input could not be parsed into section definitions.
    Unparseable { key: String, message: String },
}

impl Display for TemplateRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTemplateKey(key) => write!(f, "template key is invalid: `{key}`"),
            Self::DuplicateTemplateKey(key) => {
                write!(f, "template key already registered: `{key}`")
            }
            Self::UnknownTemplateKey(key) => {
                write!(f, "template key not registered: `{key}`")
            }
            Self::Invalid(err) => write!(f, "{err}"),
            Self::Unparseable { key, message } => {
                write!(f, "template `{key}` could not be parsed: {message}")
            }
        }
    }
}

impl Error for TemplateRegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateError> for TemplateRegistryError {
    fn from(value: TemplateError) -> Self {
        Self::Invalid(value)
    }
}

/// In-process template registry keyed by normalized template key.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateModel>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one validated template under its own key.
    pub fn register(&mut self, template: TemplateModel) -> Result<(), TemplateRegistryError> {
        let key = normalize_key(&template.key)?;
        if self.templates.contains_key(key.as_str()) {
            return Err(TemplateRegistryError::DuplicateTemplateKey(key));
        }
        template.validate()?;
        self.templates.insert(
            key.clone(),
            TemplateModel {
                key,
                sections: template.sections,
            },
        );
        Ok(())
    }

    /// Publishes a new version of an already-registered template.
    ///
    /// Documents bound to the key pick the new structure up on their next
    /// synchronization.
    pub fn replace(&mut self, template: TemplateModel) -> Result<(), TemplateRegistryError> {
        let key = normalize_key(&template.key)?;
        if !self.templates.contains_key(key.as_str()) {
            return Err(TemplateRegistryError::UnknownTemplateKey(key));
        }
        template.validate()?;
        self.templates.insert(
            key.clone(),
            TemplateModel {
                key,
                sections: template.sections,
            },
        );
        Ok(())
    }

    /// Parses structure-file JSON and registers the result.
    pub fn register_json(&mut self, key: &str, json: &str) -> Result<(), TemplateRegistryError> {
        let template = TemplateModel::from_json(key, json).map_err(|err| {
            TemplateRegistryError::Unparseable {
                key: key.trim().to_string(),
                message: err.to_string(),
            }
        })?;
        self.register(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Returns sorted registered keys.
    pub fn template_keys(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    /// Returns one template by key.
    pub fn get(&self, key: &str) -> Option<&TemplateModel> {
        self.templates.get(key.trim())
    }
}

impl TemplateSource for TemplateRegistry {
    fn load(&self, key: &str) -> Result<TemplateModel, TemplateSourceError> {
        match self.get(key) {
            Some(template) => Ok(template.clone()),
            None => Err(TemplateSourceError::NotFound(key.trim().to_string())),
        }
    }
}

fn normalize_key(key: &str) -> Result<String, TemplateRegistryError> {
    let normalized = key.trim();
    let valid = !normalized.is_empty()
        && normalized.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.'
        });
    if !valid {
        return Err(TemplateRegistryError::InvalidTemplateKey(key.to_string()));
    }
    Ok(normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::{TemplateRegistry, TemplateRegistryError, TemplateSource, TemplateSourceError};
    use crate::model::template::{SectionDef, TemplateModel};

    fn template(key: &str) -> TemplateModel {
        TemplateModel::new(
            key,
            vec![SectionDef {
                code: "general_info".to_string(),
                name: "General Information".to_string(),
                position: 1,
                sub_sections: vec![],
            }],
        )
    }

    #[test]
    fn registers_and_loads_template() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(template("syllabus_2025"))
            .expect("template should register");
        assert_eq!(registry.len(), 1);

        let loaded = registry.load("syllabus_2025").expect("template should load");
        assert_eq!(loaded.key, "syllabus_2025");
        assert_eq!(loaded.sections.len(), 1);
    }

    #[test]
    fn load_trims_key_and_reports_not_found() {
        let mut registry = TemplateRegistry::new();
        registry
            .register(template("syllabus_2025"))
            .expect("template should register");

        assert!(registry.load("  syllabus_2025  ").is_ok());
        let err = registry.load("missing").expect_err("missing key must fail");
        assert_eq!(err, TemplateSourceError::NotFound("missing".to_string()));
    }

    #[test]
    fn rejects_invalid_or_duplicate_key() {
        let mut registry = TemplateRegistry::new();
        let invalid = registry.register(template("Syllabus 2025"));
        assert!(matches!(
            invalid,
            Err(TemplateRegistryError::InvalidTemplateKey(_))
        ));

        registry
            .register(template("syllabus_2025"))
            .expect("first registration should succeed");
        let duplicate = registry.register(template("syllabus_2025"));
        assert!(matches!(
            duplicate,
            Err(TemplateRegistryError::DuplicateTemplateKey(_))
        ));
    }

    #[test]
    fn replace_requires_existing_key_and_publishes_new_version() {
        let mut registry = TemplateRegistry::new();
        let unknown = registry.replace(template("syllabus_2025"));
        assert!(matches!(
            unknown,
            Err(TemplateRegistryError::UnknownTemplateKey(_))
        ));

        registry
            .register(template("syllabus_2025"))
            .expect("template should register");
        let mut next = template("syllabus_2025");
        next.sections[0].name = "General Information v2".to_string();
        registry.replace(next).expect("replacement should succeed");

        let loaded = registry.load("syllabus_2025").expect("template should load");
        assert_eq!(loaded.sections[0].name, "General Information v2");
    }

    #[test]
    fn register_json_parses_structure_file_format() {
        let json = r#"[
            {
                "code": "general_info",
                "name": "General Information",
                "position": 1,
                "sub_sections": [
                    {"name": "Course title", "type": "text", "position": 1},
                    {
                        "name": "Teaching mode",
                        "type": "selection",
                        "position": 2,
                        "attribute_group_id": "5f0c3d6a-9a3e-4d86-9c79-55fbd6a2a8d1"
                    },
                    {
                        "name": "Credits",
                        "type": "reference",
                        "position": 3,
                        "reference_code": "credit"
                    }
                ]
            }
        ]"#;

        let mut registry = TemplateRegistry::new();
        registry
            .register_json("syllabus_2025", json)
            .expect("json template should register");

        let loaded = registry.load("syllabus_2025").expect("template should load");
        assert_eq!(loaded.sections[0].sub_sections.len(), 3);
    }

    #[test]
    fn register_json_reports_parse_failures() {
        let mut registry = TemplateRegistry::new();
        let err = registry
            .register_json("broken", "not json")
            .expect_err("broken json must fail");
        assert!(matches!(
            err,
            TemplateRegistryError::Unparseable { key, .. } if key == "broken"
        ));
    }
}
