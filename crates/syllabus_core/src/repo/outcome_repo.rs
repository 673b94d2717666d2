//! Outcome-mapping persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store course objectives, their child learning outcomes, programme
//!   learning outcomes, direct target memberships, and rated bridges.
//! - Own the transactional delta application for target reconciliation.
//!
//! # Invariants
//! - At most one bridge row exists per (outcome, programme outcome) pair.
//! - `apply_target_changes` commits membership and bridge updates together
//!   or not at all.
//! - Bridge inserts are idempotent: existing bridges keep their rating.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::document::SyllabusId;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one course objective (bridge parent).
pub type ObjectiveId = Uuid;

/// Stable identifier of one course learning outcome (bridge child).
pub type OutcomeId = Uuid;

/// Stable identifier of one programme learning outcome (bridge target).
pub type PloId = Uuid;

/// Result type used by outcome repository operations.
pub type OutcomeRepoResult<T> = Result<T, OutcomeRepoError>;

/// Errors from outcome repository operations.
#[derive(Debug)]
pub enum OutcomeRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target objective does not exist.
    ObjectiveNotFound(ObjectiveId),
    /// Target child outcome does not exist.
    OutcomeNotFound(OutcomeId),
    /// Target programme outcome does not exist.
    PloNotFound(PloId),
    /// A programme outcome with the same code already exists.
    DuplicatePloCode(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for OutcomeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ObjectiveNotFound(id) => write!(f, "course objective not found: {id}"),
            Self::OutcomeNotFound(id) => write!(f, "course learning outcome not found: {id}"),
            Self::PloNotFound(id) => write!(f, "programme learning outcome not found: {id}"),
            Self::DuplicatePloCode(code) => {
                write!(f, "programme learning outcome code already in use: `{code}`")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "outcome repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "outcome repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid outcome data: {message}"),
        }
    }
}

impl Error for OutcomeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for OutcomeRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for OutcomeRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read model for one course objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveRecord {
    pub objective_id: ObjectiveId,
    pub syllabus_id: SyllabusId,
    /// Derived display name (`CO1`, `CO2`, ...).
    pub name: String,
    pub content: String,
}

/// Read model for one child learning outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub outcome_id: OutcomeId,
    pub objective_id: ObjectiveId,
    pub content: String,
}

/// Read model for one programme learning outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PloRecord {
    pub plo_id: PloId,
    pub code: String,
    pub description: String,
}

/// Read model for one rated bridge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeBridge {
    pub outcome_id: OutcomeId,
    pub plo_id: PloId,
    pub rating: i64,
}

/// Repository interface for outcome-mapping operations.
pub trait OutcomeRepository {
    /// Creates one programme learning outcome.
    fn create_plo(&self, code: &str, description: &str) -> OutcomeRepoResult<PloRecord>;
    /// Returns the subset of `plo_ids` that do not resolve, sorted.
    fn missing_plos(&self, plo_ids: &BTreeSet<PloId>) -> OutcomeRepoResult<Vec<PloId>>;
    /// Creates one course objective with no targets yet.
    fn create_objective(
        &self,
        syllabus_id: SyllabusId,
        name: &str,
        content: &str,
    ) -> OutcomeRepoResult<ObjectiveId>;
    /// Loads one objective.
    fn get_objective(&self, objective_id: ObjectiveId)
        -> OutcomeRepoResult<Option<ObjectiveRecord>>;
    /// Lists objective names for one syllabus.
    fn list_objective_names(&self, syllabus_id: SyllabusId) -> OutcomeRepoResult<Vec<String>>;
    /// Returns the objective's current direct target set.
    fn list_targets(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<BTreeSet<PloId>>;
    /// Applies one reconciliation delta atomically: direct membership rows
    /// plus child bridge deletions and idempotent zero-rated insertions.
    fn apply_target_changes(
        &self,
        objective_id: ObjectiveId,
        to_add: &BTreeSet<PloId>,
        to_remove: &BTreeSet<PloId>,
    ) -> OutcomeRepoResult<()>;
    /// Creates one child outcome and seeds zero-rated bridges to every
    /// current target of the parent objective.
    fn create_outcome(
        &self,
        objective_id: ObjectiveId,
        content: &str,
    ) -> OutcomeRepoResult<OutcomeId>;
    /// Loads one child outcome.
    fn get_outcome(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<Option<OutcomeRecord>>;
    /// Lists child outcomes of one objective in stable order.
    fn list_outcomes(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<Vec<OutcomeRecord>>;
    /// Lists one child outcome's bridges sorted by target id.
    fn list_bridges(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<Vec<OutcomeBridge>>;
    /// Returns one bridge's rating, if the bridge exists.
    fn get_rating(&self, outcome_id: OutcomeId, plo_id: PloId) -> OutcomeRepoResult<Option<i64>>;
    /// Updates an existing bridge's rating or creates the bridge.
    fn upsert_rating(
        &self,
        outcome_id: OutcomeId,
        plo_id: PloId,
        rating: i64,
    ) -> OutcomeRepoResult<()>;
    /// Deletes one objective with its children, bridges, and memberships.
    fn delete_objective(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<()>;
    /// Deletes one child outcome with its bridges.
    fn delete_outcome(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<()>;
}

/// SQLite-backed outcome repository.
pub struct SqliteOutcomeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteOutcomeRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> OutcomeRepoResult<Self> {
        ensure_outcome_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl OutcomeRepository for SqliteOutcomeRepository<'_> {
    fn create_plo(&self, code: &str, description: &str) -> OutcomeRepoResult<PloRecord> {
        let code_taken: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM programme_learning_outcome WHERE code = ?1);",
            [code],
            |row| row.get(0),
        )?;
        if code_taken == 1 {
            return Err(OutcomeRepoError::DuplicatePloCode(code.to_string()));
        }

        let plo_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO programme_learning_outcome (plo_uuid, code, description)
             VALUES (?1, ?2, ?3);",
            params![plo_id.to_string(), code, description],
        )?;
        Ok(PloRecord {
            plo_id,
            code: code.to_string(),
            description: description.to_string(),
        })
    }

    fn missing_plos(&self, plo_ids: &BTreeSet<PloId>) -> OutcomeRepoResult<Vec<PloId>> {
        let mut missing = Vec::new();
        for plo_id in plo_ids {
            let exists: i64 = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM programme_learning_outcome WHERE plo_uuid = ?1);",
                [plo_id.to_string()],
                |row| row.get(0),
            )?;
            if exists == 0 {
                missing.push(*plo_id);
            }
        }
        Ok(missing)
    }

    fn create_objective(
        &self,
        syllabus_id: SyllabusId,
        name: &str,
        content: &str,
    ) -> OutcomeRepoResult<ObjectiveId> {
        let objective_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO course_objective (objective_uuid, syllabus_uuid, name, content)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                objective_id.to_string(),
                syllabus_id.to_string(),
                name,
                content,
            ],
        )?;
        Ok(objective_id)
    }

    fn get_objective(
        &self,
        objective_id: ObjectiveId,
    ) -> OutcomeRepoResult<Option<ObjectiveRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT objective_uuid, syllabus_uuid, name, content
             FROM course_objective
             WHERE objective_uuid = ?1;",
        )?;
        let mut rows = stmt.query([objective_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_objective_row(row)?));
        }
        Ok(None)
    }

    fn list_objective_names(&self, syllabus_id: SyllabusId) -> OutcomeRepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name
             FROM course_objective
             WHERE syllabus_uuid = ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([syllabus_id.to_string()])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }

    fn list_targets(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<BTreeSet<PloId>> {
        ensure_objective_exists(self.conn, objective_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT plo_uuid
             FROM objective_plo
             WHERE objective_uuid = ?1;",
        )?;
        let mut rows = stmt.query([objective_id.to_string()])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.insert(parse_uuid(&value, "objective_plo.plo_uuid")?);
        }
        Ok(ids)
    }

    fn apply_target_changes(
        &self,
        objective_id: ObjectiveId,
        to_add: &BTreeSet<PloId>,
        to_remove: &BTreeSet<PloId>,
    ) -> OutcomeRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_objective_exists(&tx, objective_id)?;

        for plo_id in to_remove {
            tx.execute(
                "DELETE FROM objective_plo
                 WHERE objective_uuid = ?1 AND plo_uuid = ?2;",
                params![objective_id.to_string(), plo_id.to_string()],
            )?;
            tx.execute(
                "DELETE FROM clo_plo_association
                 WHERE plo_uuid = ?2
                   AND outcome_uuid IN (
                     SELECT outcome_uuid
                     FROM course_learning_outcome
                     WHERE objective_uuid = ?1
                   );",
                params![objective_id.to_string(), plo_id.to_string()],
            )?;
        }

        for plo_id in to_add {
            tx.execute(
                "INSERT OR IGNORE INTO objective_plo (objective_uuid, plo_uuid)
                 VALUES (?1, ?2);",
                params![objective_id.to_string(), plo_id.to_string()],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO clo_plo_association (outcome_uuid, plo_uuid, rating)
                 SELECT outcome_uuid, ?2, 0
                 FROM course_learning_outcome
                 WHERE objective_uuid = ?1;",
                params![objective_id.to_string(), plo_id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn create_outcome(
        &self,
        objective_id: ObjectiveId,
        content: &str,
    ) -> OutcomeRepoResult<OutcomeId> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_objective_exists(&tx, objective_id)?;

        let outcome_id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO course_learning_outcome (outcome_uuid, objective_uuid, content)
             VALUES (?1, ?2, ?3);",
            params![outcome_id.to_string(), objective_id.to_string(), content],
        )?;
        tx.execute(
            "INSERT INTO clo_plo_association (outcome_uuid, plo_uuid, rating)
             SELECT ?1, plo_uuid, 0
             FROM objective_plo
             WHERE objective_uuid = ?2;",
            params![outcome_id.to_string(), objective_id.to_string()],
        )?;

        tx.commit()?;
        Ok(outcome_id)
    }

    fn get_outcome(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<Option<OutcomeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT outcome_uuid, objective_uuid, content
             FROM course_learning_outcome
             WHERE outcome_uuid = ?1;",
        )?;
        let mut rows = stmt.query([outcome_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_outcome_row(row)?));
        }
        Ok(None)
    }

    fn list_outcomes(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<Vec<OutcomeRecord>> {
        ensure_objective_exists(self.conn, objective_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT outcome_uuid, objective_uuid, content
             FROM course_learning_outcome
             WHERE objective_uuid = ?1
             ORDER BY outcome_uuid ASC;",
        )?;
        let mut rows = stmt.query([objective_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_outcome_row(row)?);
        }
        Ok(items)
    }

    fn list_bridges(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<Vec<OutcomeBridge>> {
        ensure_outcome_exists(self.conn, outcome_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT plo_uuid, rating
             FROM clo_plo_association
             WHERE outcome_uuid = ?1
             ORDER BY plo_uuid ASC;",
        )?;
        let mut rows = stmt.query([outcome_id.to_string()])?;
        let mut bridges = Vec::new();
        while let Some(row) = rows.next()? {
            let plo_text: String = row.get(0)?;
            let rating: i64 = row.get(1)?;
            if rating < 0 {
                return Err(OutcomeRepoError::InvalidData(format!(
                    "negative rating `{rating}` in clo_plo_association.rating"
                )));
            }
            bridges.push(OutcomeBridge {
                outcome_id,
                plo_id: parse_uuid(&plo_text, "clo_plo_association.plo_uuid")?,
                rating,
            });
        }
        Ok(bridges)
    }

    fn get_rating(&self, outcome_id: OutcomeId, plo_id: PloId) -> OutcomeRepoResult<Option<i64>> {
        let rating = self
            .conn
            .query_row(
                "SELECT rating
                 FROM clo_plo_association
                 WHERE outcome_uuid = ?1 AND plo_uuid = ?2;",
                params![outcome_id.to_string(), plo_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rating)
    }

    fn upsert_rating(
        &self,
        outcome_id: OutcomeId,
        plo_id: PloId,
        rating: i64,
    ) -> OutcomeRepoResult<()> {
        ensure_outcome_exists(self.conn, outcome_id)?;
        ensure_plo_exists(self.conn, plo_id)?;

        let changed = self.conn.execute(
            "UPDATE clo_plo_association
             SET rating = ?3
             WHERE outcome_uuid = ?1 AND plo_uuid = ?2;",
            params![outcome_id.to_string(), plo_id.to_string(), rating],
        )?;
        if changed == 0 {
            self.conn.execute(
                "INSERT INTO clo_plo_association (outcome_uuid, plo_uuid, rating)
                 VALUES (?1, ?2, ?3);",
                params![outcome_id.to_string(), plo_id.to_string(), rating],
            )?;
        }
        Ok(())
    }

    fn delete_objective(&self, objective_id: ObjectiveId) -> OutcomeRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_objective_exists(&tx, objective_id)?;

        tx.execute(
            "DELETE FROM clo_plo_association
             WHERE outcome_uuid IN (
                SELECT outcome_uuid
                FROM course_learning_outcome
                WHERE objective_uuid = ?1
             );",
            [objective_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM course_learning_outcome WHERE objective_uuid = ?1;",
            [objective_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM objective_plo WHERE objective_uuid = ?1;",
            [objective_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM course_objective WHERE objective_uuid = ?1;",
            [objective_id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn delete_outcome(&self, outcome_id: OutcomeId) -> OutcomeRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_outcome_exists(&tx, outcome_id)?;

        tx.execute(
            "DELETE FROM clo_plo_association WHERE outcome_uuid = ?1;",
            [outcome_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM course_learning_outcome WHERE outcome_uuid = ?1;",
            [outcome_id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn parse_objective_row(row: &Row<'_>) -> OutcomeRepoResult<ObjectiveRecord> {
    let objective_text: String = row.get("objective_uuid")?;
    let syllabus_text: String = row.get("syllabus_uuid")?;
    Ok(ObjectiveRecord {
        objective_id: parse_uuid(&objective_text, "course_objective.objective_uuid")?,
        syllabus_id: parse_uuid(&syllabus_text, "course_objective.syllabus_uuid")?,
        name: row.get("name")?,
        content: row.get("content")?,
    })
}

fn parse_outcome_row(row: &Row<'_>) -> OutcomeRepoResult<OutcomeRecord> {
    let outcome_text: String = row.get("outcome_uuid")?;
    let objective_text: String = row.get("objective_uuid")?;
    Ok(OutcomeRecord {
        outcome_id: parse_uuid(&outcome_text, "course_learning_outcome.outcome_uuid")?,
        objective_id: parse_uuid(&objective_text, "course_learning_outcome.objective_uuid")?,
        content: row.get("content")?,
    })
}

fn ensure_objective_exists(
    conn: &Connection,
    objective_id: ObjectiveId,
) -> OutcomeRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM course_objective WHERE objective_uuid = ?1);",
        [objective_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(OutcomeRepoError::ObjectiveNotFound(objective_id));
    }
    Ok(())
}

fn ensure_outcome_exists(conn: &Connection, outcome_id: OutcomeId) -> OutcomeRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM course_learning_outcome WHERE outcome_uuid = ?1);",
        [outcome_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(OutcomeRepoError::OutcomeNotFound(outcome_id));
    }
    Ok(())
}

fn ensure_plo_exists(conn: &Connection, plo_id: PloId) -> OutcomeRepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM programme_learning_outcome WHERE plo_uuid = ?1);",
        [plo_id.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(OutcomeRepoError::PloNotFound(plo_id));
    }
    Ok(())
}

fn parse_uuid(value: &str, column: &'static str) -> OutcomeRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| OutcomeRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_outcome_connection_ready(conn: &Connection) -> OutcomeRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(OutcomeRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in [
        "course_objective",
        "course_learning_outcome",
        "programme_learning_outcome",
        "objective_plo",
        "clo_plo_association",
    ] {
        if !table_exists(conn, table)? {
            return Err(OutcomeRepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> OutcomeRepoResult<bool> {
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
