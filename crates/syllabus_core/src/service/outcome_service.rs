//! Outcome-mapping use-case service.
//!
//! # Responsibility
//! - Reconcile an objective's programme-outcome targets against a desired
//!   set, keeping child outcome bridges in step.
//! - Provide objective/outcome lifecycle operations (create with derived
//!   `CO<n>` naming, rating upserts, cascading deletes).
//!
//! # Invariants
//! - Reconciliation validates every requested target before any mutation.
//! - Retained bridges keep their rating; new bridges start at zero.
//! - Ratings are non-negative.

use crate::model::document::SyllabusId;
use crate::repo::outcome_repo::{
    ObjectiveId, ObjectiveRecord, OutcomeId, OutcomeRecord, OutcomeRepoError, OutcomeRepository,
    PloId, PloRecord,
};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static OBJECTIVE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CO(\d+)$").expect("valid objective name regex"));

/// Errors from outcome service operations.
#[derive(Debug)]
pub enum OutcomeServiceError {
    /// Content is blank after trim.
    InvalidContent,
    /// Programme outcome code is blank after trim.
    InvalidPloCode(String),
    /// Rating is negative.
    InvalidRating(i64),
    /// Target objective does not exist.
    ObjectiveNotFound(ObjectiveId),
    /// Target child outcome does not exist.
    OutcomeNotFound(OutcomeId),
    /// A requested programme outcome does not resolve.
    PloNotFound(PloId),
    /// Repository-level failure.
    Repo(OutcomeRepoError),
}

impl Display for OutcomeServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidContent => write!(f, "content must not be blank"),
            Self::InvalidPloCode(code) => {
                write!(f, "programme outcome code must not be blank: `{code}`")
            }
            Self::InvalidRating(rating) => {
                write!(f, "rating must not be negative, got {rating}")
            }
            Self::ObjectiveNotFound(id) => write!(f, "course objective not found: {id}"),
            Self::OutcomeNotFound(id) => write!(f, "course learning outcome not found: {id}"),
            Self::PloNotFound(id) => write!(f, "programme learning outcome not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OutcomeServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<OutcomeRepoError> for OutcomeServiceError {
    fn from(value: OutcomeRepoError) -> Self {
        match value {
            OutcomeRepoError::ObjectiveNotFound(id) => Self::ObjectiveNotFound(id),
            OutcomeRepoError::OutcomeNotFound(id) => Self::OutcomeNotFound(id),
            OutcomeRepoError::PloNotFound(id) => Self::PloNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Computed target delta of one reconciliation, in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationDelta {
    pub added: Vec<PloId>,
    pub removed: Vec<PloId>,
}

impl AssociationDelta {
    /// Returns whether the reconciliation changed anything.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Outcome-mapping service facade.
pub struct OutcomeService<R: OutcomeRepository> {
    repo: R,
}

impl<R: OutcomeRepository> OutcomeService<R> {
    /// Creates a service from a repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one programme learning outcome.
    pub fn create_plo(
        &self,
        code: &str,
        description: &str,
    ) -> Result<PloRecord, OutcomeServiceError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(OutcomeServiceError::InvalidPloCode(code.to_string()));
        }
        self.repo.create_plo(code, description).map_err(Into::into)
    }

    /// Creates one course objective with a derived `CO<n>` name and the
    /// given initial target set.
    pub fn create_objective(
        &self,
        syllabus_id: SyllabusId,
        content: &str,
        plo_ids: &[PloId],
    ) -> Result<ObjectiveRecord, OutcomeServiceError> {
        if content.trim().is_empty() {
            return Err(OutcomeServiceError::InvalidContent);
        }

        let desired: BTreeSet<PloId> = plo_ids.iter().copied().collect();
        self.ensure_plos_resolve(&desired)?;

        let existing_names = self.repo.list_objective_names(syllabus_id)?;
        let name = next_objective_name(&existing_names);
        let objective_id = self.repo.create_objective(syllabus_id, &name, content)?;
        if !desired.is_empty() {
            self.repo
                .apply_target_changes(objective_id, &desired, &BTreeSet::new())?;
        }

        Ok(ObjectiveRecord {
            objective_id,
            syllabus_id,
            name,
            content: content.to_string(),
        })
    }

    /// Creates one child outcome under an objective.
    ///
    /// Seeds a zero-rated bridge to every current target of the parent.
    pub fn create_child_outcome(
        &self,
        objective_id: ObjectiveId,
        content: &str,
    ) -> Result<OutcomeRecord, OutcomeServiceError> {
        if content.trim().is_empty() {
            return Err(OutcomeServiceError::InvalidContent);
        }
        let outcome_id = self.repo.create_outcome(objective_id, content)?;
        Ok(OutcomeRecord {
            outcome_id,
            objective_id,
            content: content.to_string(),
        })
    }

    /// Reconciles an objective's direct targets against `desired_plo_ids`.
    ///
    /// Every id must resolve or the whole request is rejected before any
    /// mutation. An empty desired set is an explicit "remove all": direct
    /// memberships and all child bridges are cleared. Bridges to retained
    /// targets keep their rating; bridges to added targets are created at
    /// rating zero unless they already exist.
    pub fn reconcile_targets(
        &self,
        objective_id: ObjectiveId,
        desired_plo_ids: &[PloId],
    ) -> Result<AssociationDelta, OutcomeServiceError> {
        let desired: BTreeSet<PloId> = desired_plo_ids.iter().copied().collect();
        self.ensure_plos_resolve(&desired)?;

        let current = self.repo.list_targets(objective_id)?;
        let to_add: BTreeSet<PloId> = desired.difference(&current).copied().collect();
        let to_remove: BTreeSet<PloId> = current.difference(&desired).copied().collect();

        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(AssociationDelta::default());
        }

        self.repo
            .apply_target_changes(objective_id, &to_add, &to_remove)?;

        info!(
            "event=target_reconcile module=service status=ok objective={objective_id} added={} removed={}",
            to_add.len(),
            to_remove.len()
        );
        Ok(AssociationDelta {
            added: to_add.into_iter().collect(),
            removed: to_remove.into_iter().collect(),
        })
    }

    /// Sets one bridge's rating, creating the bridge when absent.
    pub fn set_rating(
        &self,
        outcome_id: OutcomeId,
        plo_id: PloId,
        rating: i64,
    ) -> Result<(), OutcomeServiceError> {
        if rating < 0 {
            return Err(OutcomeServiceError::InvalidRating(rating));
        }
        self.repo
            .upsert_rating(outcome_id, plo_id, rating)
            .map_err(Into::into)
    }

    /// Loads one objective.
    pub fn get_objective(
        &self,
        objective_id: ObjectiveId,
    ) -> Result<Option<ObjectiveRecord>, OutcomeServiceError> {
        self.repo.get_objective(objective_id).map_err(Into::into)
    }

    /// Returns an objective's current direct target set.
    pub fn list_targets(
        &self,
        objective_id: ObjectiveId,
    ) -> Result<BTreeSet<PloId>, OutcomeServiceError> {
        self.repo.list_targets(objective_id).map_err(Into::into)
    }

    /// Lists an objective's child outcomes.
    pub fn list_child_outcomes(
        &self,
        objective_id: ObjectiveId,
    ) -> Result<Vec<OutcomeRecord>, OutcomeServiceError> {
        self.repo.list_outcomes(objective_id).map_err(Into::into)
    }

    /// Deletes one objective with children, bridges, and memberships.
    pub fn delete_objective(
        &self,
        objective_id: ObjectiveId,
    ) -> Result<(), OutcomeServiceError> {
        self.repo.delete_objective(objective_id).map_err(Into::into)
    }

    /// Deletes one child outcome with its bridges.
    pub fn delete_child_outcome(
        &self,
        outcome_id: OutcomeId,
    ) -> Result<(), OutcomeServiceError> {
        self.repo.delete_outcome(outcome_id).map_err(Into::into)
    }

    fn ensure_plos_resolve(&self, plo_ids: &BTreeSet<PloId>) -> Result<(), OutcomeServiceError> {
        let missing = self.repo.missing_plos(plo_ids)?;
        match missing.first() {
            Some(plo_id) => Err(OutcomeServiceError::PloNotFound(*plo_id)),
            None => Ok(()),
        }
    }
}

/// Derives the next objective display name from existing `CO<n>` names.
fn next_objective_name(existing: &[String]) -> String {
    let mut max_index: u64 = 0;
    for name in existing {
        if let Some(caps) = OBJECTIVE_NAME_RE.captures(name.trim()) {
            if let Ok(value) = caps[1].parse::<u64>() {
                max_index = max_index.max(value);
            }
        }
    }
    format!("CO{}", max_index + 1)
}

#[cfg(test)]
mod tests {
    use super::next_objective_name;

    #[test]
    fn first_objective_is_co1() {
        assert_eq!(next_objective_name(&[]), "CO1");
    }

    #[test]
    fn next_name_skips_past_highest_index() {
        let existing = vec!["CO1".to_string(), "CO7".to_string(), "CO2".to_string()];
        assert_eq!(next_objective_name(&existing), "CO8");
    }

    #[test]
    fn non_matching_names_are_ignored() {
        let existing = vec!["Objective A".to_string(), "CO".to_string(), "CO1".to_string()];
        assert_eq!(next_objective_name(&existing), "CO2");
    }
}
