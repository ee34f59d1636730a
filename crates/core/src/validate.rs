//! Section validation and record completeness.
//!
//! Two distinct checks live here:
//!
//! - [`validate_payload`] — per-field type and range rules for one submitted payload,
//!   applied before anything is persisted.
//! - [`validate_completeness`] — the gate for the draft→complete transition. This is a
//!   deliberately weak bar: a fixed minimal set of required fields must be non-blank.
//!   It measures whether the record is identifiable and has a stated reason for the
//!   visit, not clinical thoroughness.
//!
//! Unknown-field rejection is not handled here; it happens at the deserialization
//! boundary in [`crate::sections::SectionPayload::parse`].

use crate::derived::compute_bmi;
use crate::error::FieldViolation;
use crate::sections::{SectionPayload, Sections};
use chrono::Utc;

/// Result of the whole-record completeness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completeness {
    pub is_complete: bool,
    /// Dotted paths of required fields that are absent or blank.
    pub missing_fields: Vec<String>,
}

fn check_range<T: PartialOrd + Copy + std::fmt::Display>(
    violations: &mut Vec<FieldViolation>,
    field: &str,
    value: Option<T>,
    min: T,
    max: T,
) {
    if let Some(v) = value {
        if v < min || v > max {
            violations.push(FieldViolation::new(
                field,
                format!("must be between {min} and {max}, got {v}"),
            ));
        }
    }
}

/// Validates one submitted payload against its section's field rules.
///
/// Returns all violations rather than stopping at the first, so a caller can surface
/// the full list in a single round trip. An empty result means the payload is valid.
pub fn validate_payload(payload: &SectionPayload) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    match payload {
        SectionPayload::Identification(s) => {
            if let Some(birth_date) = s.birth_date {
                if birth_date > Utc::now().date_naive() {
                    violations.push(FieldViolation::new(
                        "identification.birth_date",
                        "birth date cannot be in the future",
                    ));
                }
            }
            if let Some(email) = &s.email {
                if !email.trim().is_empty() && !email.contains('@') {
                    violations.push(FieldViolation::new(
                        "identification.email",
                        "must contain '@'",
                    ));
                }
            }
        }
        SectionPayload::ChiefComplaint(s) => {
            check_range(
                &mut violations,
                "chief-complaint.pain_scale",
                s.pain_scale,
                0,
                10,
            );
            check_range(
                &mut violations,
                "chief-complaint.duration_days",
                s.duration_days,
                0,
                36_500,
            );
        }
        SectionPayload::FamilyHistory(_) => {}
        SectionPayload::NonPathologicalHistory(s) => {
            check_range(
                &mut violations,
                "non-pathological-history.weight_kg",
                s.weight_kg,
                1.0,
                500.0,
            );
            check_range(
                &mut violations,
                "non-pathological-history.height_cm",
                s.height_cm,
                30.0,
                250.0,
            );
            check_range(
                &mut violations,
                "non-pathological-history.brushings_per_day",
                s.brushings_per_day,
                0,
                10,
            );
            // Cross-field plausibility: a BMI outside any survivable range means one
            // of the two inputs is wrong even if each passed its own bounds.
            if let Some(bmi) = compute_bmi(s.weight_kg, s.height_cm) {
                if !(5.0..=100.0).contains(&bmi) {
                    violations.push(FieldViolation::new(
                        "non-pathological-history.weight_kg",
                        format!("weight/height combination yields implausible BMI {bmi}"),
                    ));
                }
            }
        }
        SectionPayload::PathologicalHistory(_) => {}
        SectionPayload::ExtraoralExam(s) => {
            check_range(
                &mut violations,
                "extraoral-exam.systolic_mmhg",
                s.systolic_mmhg,
                60,
                250,
            );
            check_range(
                &mut violations,
                "extraoral-exam.diastolic_mmhg",
                s.diastolic_mmhg,
                30,
                150,
            );
            check_range(
                &mut violations,
                "extraoral-exam.temperature_c",
                s.temperature_c,
                30.0,
                45.0,
            );
            check_range(
                &mut violations,
                "extraoral-exam.heart_rate_bpm",
                s.heart_rate_bpm,
                20,
                250,
            );
        }
        SectionPayload::IntraoralExam(_) => {}
        SectionPayload::DiagnosticAids(_) => {}
    }

    violations
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Checks the minimal required-field set for the draft→complete gate.
///
/// Required: patient first name, both surnames, and the chief complaint — all
/// non-blank. Everything else may stay empty; completeness gates the transition, it
/// does not measure how thoroughly the form was filled.
pub fn validate_completeness(sections: &Sections) -> Completeness {
    let mut missing = Vec::new();

    if is_blank(&sections.identification.first_name) {
        missing.push("identification.first_name".to_string());
    }
    if is_blank(&sections.identification.paternal_surname) {
        missing.push("identification.paternal_surname".to_string());
    }
    if is_blank(&sections.identification.maternal_surname) {
        missing.push("identification.maternal_surname".to_string());
    }
    if is_blank(&sections.chief_complaint.complaint) {
        missing.push("chief-complaint.complaint".to_string());
    }

    Completeness {
        is_complete: missing.is_empty(),
        missing_fields: missing,
    }
}
