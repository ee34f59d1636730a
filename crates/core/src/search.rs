//! Record search.
//!
//! Case-insensitive substring matching over the identification section (names and
//! identification number), combinable with creation-date, lifecycle-state and
//! clinician filters. Matching is a full scan over the store; the record population
//! of a single practice is small enough that an inverted index would be ceremony.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditEntry};
use crate::error::{RecordError, RecordResult};
use crate::record::{ClinicalRecord, LifecycleState};
use crate::store::{sort_newest_first, Paged, Pagination, RecordStore};
use chrono::NaiveDate;
use dcr_types::CanonicalId;

/// Filters for a record search. All filters are optional and conjunctive.
#[derive(Clone, Debug, Default)]
pub struct SearchCriteria {
    /// Substring matched case-insensitively against patient names and the
    /// identification number. Must be at least 2 characters after trimming.
    pub text: Option<String>,
    /// Only records created on or after this date.
    pub created_from: Option<NaiveDate>,
    /// Only records created on or before this date.
    pub created_to: Option<NaiveDate>,
    pub state: Option<LifecycleState>,
    /// Only records authored by this clinician.
    pub clinician: Option<CanonicalId>,
}

impl SearchCriteria {
    /// Returns the normalised search term, lowercased and trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Validation`] when a term is present but shorter than
    /// 2 characters after trimming.
    fn normalised_text(&self) -> RecordResult<Option<String>> {
        let Some(text) = &self.text else {
            return Ok(None);
        };
        let trimmed = text.trim();
        if trimmed.chars().count() < 2 {
            return Err(RecordError::validation(
                "text",
                "search term must be at least 2 characters",
            ));
        }
        Ok(Some(trimmed.to_lowercase()))
    }
}

/// Search over the records of a [`RecordStore`].
#[derive(Clone)]
pub struct SearchEngine {
    store: RecordStore,
}

impl SearchEngine {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Runs a search and records a `view` audit entry naming the actor for each
    /// record returned on the page.
    ///
    /// Results are ordered newest first (creation time descending, ties broken by
    /// record id) so pagination is stable.
    pub fn search(
        &self,
        criteria: &SearchCriteria,
        pagination: Pagination,
        actor: &Actor,
    ) -> RecordResult<Paged<ClinicalRecord>> {
        pagination.validate()?;
        let term = criteria.normalised_text()?;

        let mut matches: Vec<ClinicalRecord> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|r| Self::matches(r, criteria, term.as_deref()))
            .collect();
        sort_newest_first(&mut matches);

        let page = Paged::slice(matches, pagination);
        for record in &page.items {
            self.store.audit().append(&AuditEntry::new(
                record.meta.id.clone(),
                actor,
                AuditAction::View,
                None,
                None,
            ))?;
        }
        Ok(page)
    }

    fn matches(record: &ClinicalRecord, criteria: &SearchCriteria, term: Option<&str>) -> bool {
        if let Some(term) = term {
            let ident = &record.sections.identification;
            let haystacks = [
                ident.first_name.as_deref(),
                ident.paternal_surname.as_deref(),
                ident.maternal_surname.as_deref(),
                ident.identification_number.as_deref(),
            ];
            let hit = haystacks
                .iter()
                .flatten()
                .any(|value| value.to_lowercase().contains(term));
            if !hit {
                return false;
            }
        }

        let created = record.meta.created_at.date_naive();
        if let Some(from) = criteria.created_from {
            if created < from {
                return false;
            }
        }
        if let Some(to) = criteria.created_to {
            if created > to {
                return false;
            }
        }
        if let Some(state) = criteria.state {
            if record.meta.state != state {
                return false;
            }
        }
        if let Some(clinician) = &criteria.clinician {
            if &record.meta.author_id != clinician {
                return false;
            }
        }
        true
    }
}
