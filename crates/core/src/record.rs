//! The clinical record aggregate root.

use crate::derived::{compute_age, compute_bmi};
use crate::sections::Sections;
use chrono::{DateTime, NaiveDate, Utc};
use dcr_types::CanonicalId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a record.
///
/// States only advance draft→complete→reviewed. Moving backwards is not a transition;
/// it is the privileged admin "reopen" operation, audited under its own action type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Being authored; sections may be partially filled.
    Draft,
    /// Passed the completeness gate; awaiting clinical sign-off.
    Complete,
    /// Clinically signed off; sealed against further edits.
    Reviewed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::Complete => "complete",
            LifecycleState::Reviewed => "reviewed",
        }
    }

    /// True if `target` is the immediate forward successor of this state.
    pub fn advances_to(&self, target: LifecycleState) -> bool {
        matches!(
            (self, target),
            (LifecycleState::Draft, LifecycleState::Complete)
                | (LifecycleState::Complete, LifecycleState::Reviewed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(LifecycleState::Draft),
            "complete" => Ok(LifecycleState::Complete),
            "reviewed" => Ok(LifecycleState::Reviewed),
            other => Err(format!(
                "unknown lifecycle state '{other}' (expected draft, complete or reviewed)"
            )),
        }
    }
}

/// Aggregate metadata, persisted as `record.yaml` in the record repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Record identifier. Doubles as the repository directory name.
    pub id: CanonicalId,
    /// The patient this record belongs to. Never changes after creation.
    pub patient_id: CanonicalId,
    /// The clinician who created the record.
    pub author_id: CanonicalId,
    /// The actor whose mutation was most recently accepted.
    pub last_editor_id: CanonicalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: LifecycleState,
    /// Monotonic counter, 1 at creation, incremented by exactly 1 on every accepted
    /// mutation. Also the optimistic-concurrency token.
    pub version: u64,
}

/// The full aggregate: metadata plus all eight sections.
#[derive(Clone, Debug, PartialEq)]
pub struct ClinicalRecord {
    pub meta: RecordMeta,
    pub sections: Sections,
}

/// Derived values recomputed from section data. Never persisted as input.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// Age in whole years, if a birth date is recorded.
    pub age_years: Option<i32>,
    /// Body-mass index to two decimal places, if weight and height are recorded.
    pub bmi: Option<f64>,
}

impl ClinicalRecord {
    /// Recomputes the derived fields as of a given date.
    ///
    /// Exports pass the record's `updated_at` date here so that an unchanged record
    /// renders identically however much later it is exported; interactive reads pass
    /// today.
    pub fn derived_as_of(&self, as_of: NaiveDate) -> DerivedFields {
        DerivedFields {
            age_years: self
                .sections
                .identification
                .birth_date
                .map(|birth| compute_age(birth, as_of)),
            bmi: compute_bmi(
                self.sections.non_pathological_history.weight_kg,
                self.sections.non_pathological_history.height_cm,
            ),
        }
    }

    /// Recomputes the derived fields as of today.
    pub fn derived(&self) -> DerivedFields {
        self.derived_as_of(Utc::now().date_naive())
    }
}
