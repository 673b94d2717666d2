//! Syllabus document persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Load and store whole document trees (syllabus → sections →
//!   sub-sections → selection memberships).
//! - Own attribute group/value reference data the selection paths validate
//!   against.
//!
//! # Invariants
//! - `save_document` replaces the stored structure in one immediate
//!   transaction: either the whole tree is written or nothing is.
//! - Child listings are deterministic: `position ASC, identity-key ASC`.
//! - Leaf updates (`update_text_content`, `replace_selection`) verify the
//!   target's kind before mutating.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::document::{
    SectionInstance, SubSectionBody, SubSectionId, SubSectionInstance, SyllabusDocument,
    SyllabusId,
};
use crate::model::template::{AttributeGroupId, AttributeValueId};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by syllabus repository operations.
pub type SyllabusRepoResult<T> = Result<T, SyllabusRepoError>;

/// Errors from syllabus repository operations.
#[derive(Debug)]
pub enum SyllabusRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target syllabus does not exist.
    SyllabusNotFound(SyllabusId),
    /// Another syllabus already uses the requested display name.
    DuplicateSyllabusName(String),
    /// Target sub-section does not exist.
    SubSectionNotFound(SubSectionId),
    /// Target sub-section exists but is not text kind.
    NotTextSubSection(SubSectionId),
    /// Target sub-section exists but is not selection kind.
    NotSelectionSubSection(SubSectionId),
    /// Target attribute group does not exist.
    GroupNotFound(AttributeGroupId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for SyllabusRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::SyllabusNotFound(id) => write!(f, "syllabus not found: {id}"),
            Self::DuplicateSyllabusName(name) => {
                write!(f, "syllabus name already in use: `{name}`")
            }
            Self::SubSectionNotFound(id) => write!(f, "sub-section not found: {id}"),
            Self::NotTextSubSection(id) => write!(f, "sub-section is not text kind: {id}"),
            Self::NotSelectionSubSection(id) => {
                write!(f, "sub-section is not selection kind: {id}")
            }
            Self::GroupNotFound(id) => write!(f, "attribute group not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "syllabus repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "syllabus repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "syllabus repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid syllabus data: {message}"),
        }
    }
}

impl Error for SyllabusRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SyllabusRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SyllabusRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for document tree and attribute reference data.
pub trait SyllabusRepository {
    /// Persists a freshly initialized document.
    fn insert_document(&self, document: &SyllabusDocument) -> SyllabusRepoResult<()>;
    /// Loads one complete document tree.
    fn load_document(&self, syllabus_id: SyllabusId)
        -> SyllabusRepoResult<Option<SyllabusDocument>>;
    /// Replaces the stored structure of one document atomically.
    fn save_document(&self, document: &SyllabusDocument) -> SyllabusRepoResult<()>;
    /// Lists all stored syllabus ids in stable name order.
    fn list_syllabus_ids(&self) -> SyllabusRepoResult<Vec<SyllabusId>>;
    /// Replaces the content of one text sub-section.
    fn update_text_content(
        &self,
        sub_section_id: SubSectionId,
        content: &str,
    ) -> SyllabusRepoResult<()>;
    /// Returns the attribute group of one selection sub-section.
    fn selection_group(&self, sub_section_id: SubSectionId)
        -> SyllabusRepoResult<AttributeGroupId>;
    /// Replaces the full selected-value set of one selection sub-section.
    fn replace_selection(
        &self,
        sub_section_id: SubSectionId,
        value_ids: &BTreeSet<AttributeValueId>,
    ) -> SyllabusRepoResult<()>;
    /// Creates one attribute group.
    fn create_attribute_group(&self, name: &str) -> SyllabusRepoResult<AttributeGroupId>;
    /// Creates one attribute value inside a group.
    fn create_attribute_value(
        &self,
        group_id: AttributeGroupId,
        name: &str,
    ) -> SyllabusRepoResult<AttributeValueId>;
    /// Returns the ids of all values belonging to one group.
    fn group_value_ids(
        &self,
        group_id: AttributeGroupId,
    ) -> SyllabusRepoResult<BTreeSet<AttributeValueId>>;
}

/// SQLite-backed syllabus repository.
pub struct SqliteSyllabusRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSyllabusRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> SyllabusRepoResult<Self> {
        ensure_syllabus_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SyllabusRepository for SqliteSyllabusRepository<'_> {
    fn insert_document(&self, document: &SyllabusDocument) -> SyllabusRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let name_taken: i64 = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM syllabus WHERE name = ?1);",
            [document.name.as_str()],
            |row| row.get(0),
        )?;
        if name_taken == 1 {
            return Err(SyllabusRepoError::DuplicateSyllabusName(
                document.name.clone(),
            ));
        }

        tx.execute(
            "INSERT INTO syllabus (syllabus_uuid, name, template_key)
             VALUES (?1, ?2, ?3);",
            params![
                document.syllabus_id.to_string(),
                document.name.as_str(),
                document.template_key.as_str(),
            ],
        )?;
        insert_structure_rows(&tx, document)?;

        tx.commit()?;
        Ok(())
    }

    fn load_document(
        &self,
        syllabus_id: SyllabusId,
    ) -> SyllabusRepoResult<Option<SyllabusDocument>> {
        let header: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT name, template_key
                 FROM syllabus
                 WHERE syllabus_uuid = ?1;",
                [syllabus_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, template_key)) = header else {
            return Ok(None);
        };

        let mut document = SyllabusDocument::new(syllabus_id, name, template_key);

        let mut stmt = self.conn.prepare(
            "SELECT section_uuid, code, name, position
             FROM main_section
             WHERE syllabus_uuid = ?1
             ORDER BY position ASC, code ASC;",
        )?;
        let mut rows = stmt.query([syllabus_id.to_string()])?;
        while let Some(row) = rows.next()? {
            let section_uuid_text: String = row.get("section_uuid")?;
            document.sections.push(SectionInstance {
                section_id: parse_uuid(&section_uuid_text, "main_section.section_uuid")?,
                code: row.get("code")?,
                name: row.get("name")?,
                position: row.get("position")?,
                sub_sections: Vec::new(),
            });
        }

        for section in &mut document.sections {
            section.sub_sections = load_sub_sections(self.conn, section.section_id)?;
        }

        Ok(Some(document))
    }

    fn save_document(&self, document: &SyllabusDocument) -> SyllabusRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE syllabus
             SET name = ?2,
                 template_key = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE syllabus_uuid = ?1;",
            params![
                document.syllabus_id.to_string(),
                document.name.as_str(),
                document.template_key.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(SyllabusRepoError::SyllabusNotFound(document.syllabus_id));
        }

        delete_structure_rows(&tx, document.syllabus_id)?;
        insert_structure_rows(&tx, document)?;

        tx.commit()?;
        Ok(())
    }

    fn list_syllabus_ids(&self) -> SyllabusRepoResult<Vec<SyllabusId>> {
        let mut stmt = self.conn.prepare(
            "SELECT syllabus_uuid
             FROM syllabus
             ORDER BY name ASC, syllabus_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "syllabus.syllabus_uuid")?);
        }
        Ok(ids)
    }

    fn update_text_content(
        &self,
        sub_section_id: SubSectionId,
        content: &str,
    ) -> SyllabusRepoResult<()> {
        match sub_section_kind(self.conn, sub_section_id)?.as_deref() {
            None => Err(SyllabusRepoError::SubSectionNotFound(sub_section_id)),
            Some("text") => {
                self.conn.execute(
                    "UPDATE sub_section
                     SET content = ?2
                     WHERE sub_section_uuid = ?1;",
                    params![sub_section_id.to_string(), content],
                )?;
                Ok(())
            }
            Some(_) => Err(SyllabusRepoError::NotTextSubSection(sub_section_id)),
        }
    }

    fn selection_group(
        &self,
        sub_section_id: SubSectionId,
    ) -> SyllabusRepoResult<AttributeGroupId> {
        selection_group_inner(self.conn, sub_section_id)
    }

    fn replace_selection(
        &self,
        sub_section_id: SubSectionId,
        value_ids: &BTreeSet<AttributeValueId>,
    ) -> SyllabusRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        selection_group_inner(&tx, sub_section_id)?;

        tx.execute(
            "DELETE FROM sub_section_attribute_value WHERE sub_section_uuid = ?1;",
            [sub_section_id.to_string()],
        )?;
        for value_id in value_ids {
            tx.execute(
                "INSERT INTO sub_section_attribute_value (sub_section_uuid, value_uuid)
                 VALUES (?1, ?2);",
                params![sub_section_id.to_string(), value_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_attribute_group(&self, name: &str) -> SyllabusRepoResult<AttributeGroupId> {
        let group_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attribute_group (group_uuid, name) VALUES (?1, ?2);",
            params![group_id.to_string(), name],
        )?;
        Ok(group_id)
    }

    fn create_attribute_value(
        &self,
        group_id: AttributeGroupId,
        name: &str,
    ) -> SyllabusRepoResult<AttributeValueId> {
        ensure_group_exists(self.conn, group_id)?;
        let value_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attribute_value (value_uuid, group_uuid, name) VALUES (?1, ?2, ?3);",
            params![value_id.to_string(), group_id.to_string(), name],
        )?;
        Ok(value_id)
    }

    fn group_value_ids(
        &self,
        group_id: AttributeGroupId,
    ) -> SyllabusRepoResult<BTreeSet<AttributeValueId>> {
        ensure_group_exists(self.conn, group_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT value_uuid
             FROM attribute_value
             WHERE group_uuid = ?1;",
        )?;
        let mut rows = stmt.query([group_id.to_string()])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.insert(parse_uuid(&value, "attribute_value.value_uuid")?);
        }
        Ok(ids)
    }
}

fn insert_structure_rows(
    conn: &Connection,
    document: &SyllabusDocument,
) -> SyllabusRepoResult<()> {
    for section in &document.sections {
        conn.execute(
            "INSERT INTO main_section (section_uuid, syllabus_uuid, code, name, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                section.section_id.to_string(),
                document.syllabus_id.to_string(),
                section.code.as_str(),
                section.name.as_str(),
                section.position,
            ],
        )?;

        for sub in &section.sub_sections {
            let (kind, content, group_uuid, reference_code) = match &sub.body {
                SubSectionBody::Text { content } => {
                    ("text", Some(content.as_str()), None, None)
                }
                SubSectionBody::Selection {
                    attribute_group_id, ..
                } => ("selection", None, Some(attribute_group_id.to_string()), None),
                SubSectionBody::Reference { reference_code } => {
                    ("reference", None, None, Some(reference_code.as_str()))
                }
            };

            conn.execute(
                "INSERT INTO sub_section (
                    sub_section_uuid,
                    section_uuid,
                    name,
                    kind,
                    position,
                    content,
                    attribute_group_uuid,
                    reference_code
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    sub.sub_section_id.to_string(),
                    section.section_id.to_string(),
                    sub.name.as_str(),
                    kind,
                    sub.position,
                    content,
                    group_uuid,
                    reference_code,
                ],
            )?;

            if let SubSectionBody::Selection {
                selected_value_ids, ..
            } = &sub.body
            {
                for value_id in selected_value_ids {
                    conn.execute(
                        "INSERT INTO sub_section_attribute_value (sub_section_uuid, value_uuid)
                         VALUES (?1, ?2);",
                        params![sub.sub_section_id.to_string(), value_id.to_string()],
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn delete_structure_rows(conn: &Connection, syllabus_id: SyllabusId) -> SyllabusRepoResult<()> {
    conn.execute(
        "DELETE FROM sub_section_attribute_value
         WHERE sub_section_uuid IN (
            SELECT sub.sub_section_uuid
            FROM sub_section sub
            INNER JOIN main_section sec ON sec.section_uuid = sub.section_uuid
            WHERE sec.syllabus_uuid = ?1
         );",
        [syllabus_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM sub_section
         WHERE section_uuid IN (
            SELECT section_uuid FROM main_section WHERE syllabus_uuid = ?1
         );",
        [syllabus_id.to_string()],
    )?;
    conn.execute(
        "DELETE FROM main_section WHERE syllabus_uuid = ?1;",
        [syllabus_id.to_string()],
    )?;
    Ok(())
}

fn load_sub_sections(
    conn: &Connection,
    section_id: Uuid,
) -> SyllabusRepoResult<Vec<SubSectionInstance>> {
    let mut stmt = conn.prepare(
        "SELECT sub_section_uuid, name, kind, position, content, attribute_group_uuid, reference_code
         FROM sub_section
         WHERE section_uuid = ?1
         ORDER BY position ASC, name ASC;",
    )?;
    let mut rows = stmt.query([section_id.to_string()])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_sub_section_row(conn, row)?);
    }
    Ok(items)
}

fn parse_sub_section_row(conn: &Connection, row: &Row<'_>) -> SyllabusRepoResult<SubSectionInstance> {
    let sub_section_uuid_text: String = row.get("sub_section_uuid")?;
    let sub_section_id = parse_uuid(&sub_section_uuid_text, "sub_section.sub_section_uuid")?;
    let kind_text: String = row.get("kind")?;

    let body = match kind_text.as_str() {
        "text" => SubSectionBody::Text {
            content: row.get::<_, Option<String>>("content")?.unwrap_or_default(),
        },
        "selection" => {
            let group_text: Option<String> = row.get("attribute_group_uuid")?;
            let group_text = group_text.ok_or_else(|| {
                SyllabusRepoError::InvalidData(format!(
                    "selection sub-section `{sub_section_uuid_text}` has no attribute group"
                ))
            })?;
            SubSectionBody::Selection {
                attribute_group_id: parse_uuid(&group_text, "sub_section.attribute_group_uuid")?,
                selected_value_ids: load_selected_value_ids(conn, sub_section_id)?,
            }
        }
        "reference" => {
            let reference_code: Option<String> = row.get("reference_code")?;
            let reference_code = reference_code.ok_or_else(|| {
                SyllabusRepoError::InvalidData(format!(
                    "reference sub-section `{sub_section_uuid_text}` has no reference code"
                ))
            })?;
            SubSectionBody::Reference { reference_code }
        }
        other => {
            return Err(SyllabusRepoError::InvalidData(format!(
                "invalid sub-section kind `{other}` in sub_section.kind"
            )));
        }
    };

    Ok(SubSectionInstance {
        sub_section_id,
        name: row.get("name")?,
        position: row.get("position")?,
        body,
    })
}

fn load_selected_value_ids(
    conn: &Connection,
    sub_section_id: SubSectionId,
) -> SyllabusRepoResult<BTreeSet<AttributeValueId>> {
    let mut stmt = conn.prepare(
        "SELECT value_uuid
         FROM sub_section_attribute_value
         WHERE sub_section_uuid = ?1;",
    )?;
    let mut rows = stmt.query([sub_section_id.to_string()])?;
    let mut ids = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.insert(parse_uuid(&value, "sub_section_attribute_value.value_uuid")?);
    }
    Ok(ids)
}

fn sub_section_kind(
    conn: &Connection,
    sub_section_id: SubSectionId,
) -> SyllabusRepoResult<Option<String>> {
    let kind = conn
        .query_row(
            "SELECT kind FROM sub_section WHERE sub_section_uuid = ?1;",
            [sub_section_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(kind)
}

fn selection_group_inner(
    conn: &Connection,
    sub_section_id: SubSectionId,
) -> SyllabusRepoResult<AttributeGroupId> {
    let target: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT kind, attribute_group_uuid
             FROM sub_section
             WHERE sub_section_uuid = ?1;",
            [sub_section_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match target {
        None => Err(SyllabusRepoError::SubSectionNotFound(sub_section_id)),
        Some((kind, group_text)) if kind == "selection" => {
            let group_text = group_text.ok_or_else(|| {
                SyllabusRepoError::InvalidData(format!(
                    "selection sub-section `{sub_section_id}` has no attribute group"
                ))
            })?;
            parse_uuid(&group_text, "sub_section.attribute_group_uuid")
        }
        Some(_) => Err(SyllabusRepoError::NotSelectionSubSection(sub_section_id)),
    }
}

fn ensure_group_exists(
    conn: &Connection,
    group_id: AttributeGroupId,
) -> SyllabusRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM attribute_group WHERE group_uuid = ?1);",
        [group_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(SyllabusRepoError::GroupNotFound(group_id));
    }
    Ok(())
}

fn parse_uuid(value: &str, column: &'static str) -> SyllabusRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| SyllabusRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_syllabus_connection_ready(conn: &Connection) -> SyllabusRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(SyllabusRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in [
        "syllabus",
        "main_section",
        "sub_section",
        "attribute_group",
        "attribute_value",
        "sub_section_attribute_value",
    ] {
        if !table_exists(conn, table)? {
            return Err(SyllabusRepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "sub_section_uuid",
        "section_uuid",
        "name",
        "kind",
        "position",
        "content",
        "attribute_group_uuid",
        "reference_code",
    ] {
        if !table_has_column(conn, "sub_section", column)? {
            return Err(SyllabusRepoError::MissingRequiredColumn {
                table: "sub_section",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> SyllabusRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> SyllabusRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
