//! The eight fixed sections of a clinical record.
//!
//! Each section has an explicit schema: a struct whose fields are all optional until
//! the record is marked complete, with `deny_unknown_fields` so an unrecognised field
//! is rejected at the deserialization boundary instead of silently dropped.
//!
//! Section payloads merge field-wise into the stored section: a field present in the
//! payload replaces the stored value, an absent field is left untouched, and list
//! values are replaced wholesale (no element-level merging).
//!
//! Derived values (age, body-mass index) are deliberately absent from these schemas.
//! They are recomputed from their source fields on read, validation and export, and
//! can never be written directly.

use crate::error::{FieldViolation, RecordError, RecordResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifiers for the eight fixed sections, in canonical document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionId {
    Identification,
    ChiefComplaint,
    FamilyHistory,
    NonPathologicalHistory,
    PathologicalHistory,
    ExtraoralExam,
    IntraoralExam,
    DiagnosticAids,
}

impl SectionId {
    /// All sections in canonical document order. This order is load-bearing: the
    /// export projection iterates it to produce deterministic output.
    pub const ALL: [SectionId; 8] = [
        SectionId::Identification,
        SectionId::ChiefComplaint,
        SectionId::FamilyHistory,
        SectionId::NonPathologicalHistory,
        SectionId::PathologicalHistory,
        SectionId::ExtraoralExam,
        SectionId::IntraoralExam,
        SectionId::DiagnosticAids,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::Identification => "identification",
            SectionId::ChiefComplaint => "chief-complaint",
            SectionId::FamilyHistory => "family-history",
            SectionId::NonPathologicalHistory => "non-pathological-history",
            SectionId::PathologicalHistory => "pathological-history",
            SectionId::ExtraoralExam => "extraoral-exam",
            SectionId::IntraoralExam => "intraoral-exam",
            SectionId::DiagnosticAids => "diagnostic-aids",
        }
    }

    /// Human-readable heading used in the export projection.
    pub fn title(&self) -> &'static str {
        match self {
            SectionId::Identification => "Identification",
            SectionId::ChiefComplaint => "Chief complaint",
            SectionId::FamilyHistory => "Family history",
            SectionId::NonPathologicalHistory => "Non-pathological history",
            SectionId::PathologicalHistory => "Pathological history",
            SectionId::ExtraoralExam => "Extraoral examination",
            SectionId::IntraoralExam => "Intraoral examination",
            SectionId::DiagnosticAids => "Diagnostic aids",
        }
    }

    /// Filename of this section inside a record repository.
    pub fn file_name(&self) -> String {
        format!("{}.yaml", self.as_str())
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionId::ALL
            .iter()
            .find(|id| id.as_str() == s.trim())
            .copied()
            .ok_or_else(|| format!("unknown section '{}'", s.trim()))
    }
}

/// Patient identity and contact details.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentificationSection {
    pub first_name: Option<String>,
    pub paternal_surname: Option<String>,
    pub maternal_surname: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub identification_number: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
}

impl IdentificationSection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.first_name, patch.first_name);
        merge_field(&mut self.paternal_surname, patch.paternal_surname);
        merge_field(&mut self.maternal_surname, patch.maternal_surname);
        merge_field(&mut self.birth_date, patch.birth_date);
        merge_field(&mut self.sex, patch.sex);
        merge_field(&mut self.identification_number, patch.identification_number);
        merge_field(&mut self.phone, patch.phone);
        merge_field(&mut self.email, patch.email);
        merge_field(&mut self.address, patch.address);
        merge_field(&mut self.occupation, patch.occupation);
    }
}

/// The reason for the visit, in the patient's words plus basic characterisation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChiefComplaintSection {
    pub complaint: Option<String>,
    pub onset: Option<String>,
    pub duration_days: Option<u32>,
    pub pain_scale: Option<u8>,
}

impl ChiefComplaintSection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.complaint, patch.complaint);
        merge_field(&mut self.onset, patch.onset);
        merge_field(&mut self.duration_days, patch.duration_days);
        merge_field(&mut self.pain_scale, patch.pain_scale);
    }
}

/// Heredofamilial disease background.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FamilyHistorySection {
    pub diabetes: Option<bool>,
    pub hypertension: Option<bool>,
    pub cancer: Option<bool>,
    pub heart_disease: Option<bool>,
    pub notes: Option<String>,
}

impl FamilyHistorySection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.diabetes, patch.diabetes);
        merge_field(&mut self.hypertension, patch.hypertension);
        merge_field(&mut self.cancer, patch.cancer);
        merge_field(&mut self.heart_disease, patch.heart_disease);
        merge_field(&mut self.notes, patch.notes);
    }
}

/// Habits and anthropometrics. Weight and height are the body-mass index sources.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NonPathologicalHistorySection {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_type: Option<String>,
    pub smoker: Option<bool>,
    pub alcohol_use: Option<String>,
    pub brushings_per_day: Option<u8>,
}

impl NonPathologicalHistorySection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.weight_kg, patch.weight_kg);
        merge_field(&mut self.height_cm, patch.height_cm);
        merge_field(&mut self.blood_type, patch.blood_type);
        merge_field(&mut self.smoker, patch.smoker);
        merge_field(&mut self.alcohol_use, patch.alcohol_use);
        merge_field(&mut self.brushings_per_day, patch.brushings_per_day);
    }
}

/// Personal medical background. List fields are replaced wholesale on merge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathologicalHistorySection {
    pub allergies: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub surgeries: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
}

impl PathologicalHistorySection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.allergies, patch.allergies);
        merge_field(&mut self.current_medications, patch.current_medications);
        merge_field(&mut self.surgeries, patch.surgeries);
        merge_field(&mut self.chronic_conditions, patch.chronic_conditions);
    }
}

/// Extraoral findings and vital signs taken at examination.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtraoralExamSection {
    pub head: Option<String>,
    pub neck: Option<String>,
    pub tmj: Option<String>,
    pub lymph_nodes: Option<String>,
    pub facial_symmetry: Option<String>,
    pub systolic_mmhg: Option<u16>,
    pub diastolic_mmhg: Option<u16>,
    pub temperature_c: Option<f64>,
    pub heart_rate_bpm: Option<u16>,
}

impl ExtraoralExamSection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.head, patch.head);
        merge_field(&mut self.neck, patch.neck);
        merge_field(&mut self.tmj, patch.tmj);
        merge_field(&mut self.lymph_nodes, patch.lymph_nodes);
        merge_field(&mut self.facial_symmetry, patch.facial_symmetry);
        merge_field(&mut self.systolic_mmhg, patch.systolic_mmhg);
        merge_field(&mut self.diastolic_mmhg, patch.diastolic_mmhg);
        merge_field(&mut self.temperature_c, patch.temperature_c);
        merge_field(&mut self.heart_rate_bpm, patch.heart_rate_bpm);
    }
}

/// Intraoral findings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntraoralExamSection {
    pub oral_mucosa: Option<String>,
    pub gums: Option<String>,
    pub tongue: Option<String>,
    pub palate: Option<String>,
    pub floor_of_mouth: Option<String>,
    pub occlusion: Option<String>,
    pub odontogram_notes: Option<String>,
}

impl IntraoralExamSection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.oral_mucosa, patch.oral_mucosa);
        merge_field(&mut self.gums, patch.gums);
        merge_field(&mut self.tongue, patch.tongue);
        merge_field(&mut self.palate, patch.palate);
        merge_field(&mut self.floor_of_mouth, patch.floor_of_mouth);
        merge_field(&mut self.occlusion, patch.occlusion);
        merge_field(&mut self.odontogram_notes, patch.odontogram_notes);
    }
}

/// Supporting studies: imaging, laboratory work, models.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticAidsSection {
    pub radiographs: Option<Vec<String>>,
    pub lab_tests: Option<Vec<String>>,
    pub study_models: Option<String>,
    pub notes: Option<String>,
}

impl DiagnosticAidsSection {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.radiographs, patch.radiographs);
        merge_field(&mut self.lab_tests, patch.lab_tests);
        merge_field(&mut self.study_models, patch.study_models);
        merge_field(&mut self.notes, patch.notes);
    }
}

fn merge_field<T>(target: &mut Option<T>, patch: Option<T>) {
    if patch.is_some() {
        *target = patch;
    }
}

/// A typed section payload, tagged by section.
///
/// This is the shape accepted by `update_section`: callers name a section and supply a
/// JSON object; [`SectionPayload::parse`] dispatches to the matching schema and rejects
/// unknown fields with a validation error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SectionPayload {
    Identification(IdentificationSection),
    ChiefComplaint(ChiefComplaintSection),
    FamilyHistory(FamilyHistorySection),
    NonPathologicalHistory(NonPathologicalHistorySection),
    PathologicalHistory(PathologicalHistorySection),
    ExtraoralExam(ExtraoralExamSection),
    IntraoralExam(IntraoralExamSection),
    DiagnosticAids(DiagnosticAidsSection),
}

impl SectionPayload {
    /// Parses a raw JSON object against the schema of `section`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Validation`] if the object does not conform — including
    /// any unknown field, which is rejected rather than dropped.
    pub fn parse(section: SectionId, value: serde_json::Value) -> RecordResult<Self> {
        fn reject(section: SectionId, err: serde_json::Error) -> RecordError {
            RecordError::Validation(vec![FieldViolation::new(
                section.as_str(),
                err.to_string(),
            )])
        }

        Ok(match section {
            SectionId::Identification => SectionPayload::Identification(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::ChiefComplaint => SectionPayload::ChiefComplaint(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::FamilyHistory => SectionPayload::FamilyHistory(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::NonPathologicalHistory => SectionPayload::NonPathologicalHistory(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::PathologicalHistory => SectionPayload::PathologicalHistory(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::ExtraoralExam => SectionPayload::ExtraoralExam(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::IntraoralExam => SectionPayload::IntraoralExam(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
            SectionId::DiagnosticAids => SectionPayload::DiagnosticAids(
                serde_json::from_value(value).map_err(|e| reject(section, e))?,
            ),
        })
    }

    /// The section this payload targets.
    pub fn section_id(&self) -> SectionId {
        match self {
            SectionPayload::Identification(_) => SectionId::Identification,
            SectionPayload::ChiefComplaint(_) => SectionId::ChiefComplaint,
            SectionPayload::FamilyHistory(_) => SectionId::FamilyHistory,
            SectionPayload::NonPathologicalHistory(_) => SectionId::NonPathologicalHistory,
            SectionPayload::PathologicalHistory(_) => SectionId::PathologicalHistory,
            SectionPayload::ExtraoralExam(_) => SectionId::ExtraoralExam,
            SectionPayload::IntraoralExam(_) => SectionId::IntraoralExam,
            SectionPayload::DiagnosticAids(_) => SectionId::DiagnosticAids,
        }
    }

    /// The payload as submitted, for audit snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::JsonSerialization`] if the payload cannot be serialized.
    pub fn snapshot(&self) -> RecordResult<serde_json::Value> {
        let value = match self {
            SectionPayload::Identification(s) => serde_json::to_value(s),
            SectionPayload::ChiefComplaint(s) => serde_json::to_value(s),
            SectionPayload::FamilyHistory(s) => serde_json::to_value(s),
            SectionPayload::NonPathologicalHistory(s) => serde_json::to_value(s),
            SectionPayload::PathologicalHistory(s) => serde_json::to_value(s),
            SectionPayload::ExtraoralExam(s) => serde_json::to_value(s),
            SectionPayload::IntraoralExam(s) => serde_json::to_value(s),
            SectionPayload::DiagnosticAids(s) => serde_json::to_value(s),
        };
        value.map_err(RecordError::JsonSerialization)
    }
}

/// All eight sections of one record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sections {
    pub identification: IdentificationSection,
    pub chief_complaint: ChiefComplaintSection,
    pub family_history: FamilyHistorySection,
    pub non_pathological_history: NonPathologicalHistorySection,
    pub pathological_history: PathologicalHistorySection,
    pub extraoral_exam: ExtraoralExamSection,
    pub intraoral_exam: IntraoralExamSection,
    pub diagnostic_aids: DiagnosticAidsSection,
}

impl Sections {
    /// Merges a payload into the matching stored section.
    pub fn merge(&mut self, payload: SectionPayload) {
        match payload {
            SectionPayload::Identification(p) => self.identification.merge(p),
            SectionPayload::ChiefComplaint(p) => self.chief_complaint.merge(p),
            SectionPayload::FamilyHistory(p) => self.family_history.merge(p),
            SectionPayload::NonPathologicalHistory(p) => self.non_pathological_history.merge(p),
            SectionPayload::PathologicalHistory(p) => self.pathological_history.merge(p),
            SectionPayload::ExtraoralExam(p) => self.extraoral_exam.merge(p),
            SectionPayload::IntraoralExam(p) => self.intraoral_exam.merge(p),
            SectionPayload::DiagnosticAids(p) => self.diagnostic_aids.merge(p),
        }
    }

    /// Serializes one section to its on-disk YAML representation.
    pub fn to_yaml(&self, section: SectionId) -> RecordResult<String> {
        let yaml = match section {
            SectionId::Identification => serde_yaml::to_string(&self.identification),
            SectionId::ChiefComplaint => serde_yaml::to_string(&self.chief_complaint),
            SectionId::FamilyHistory => serde_yaml::to_string(&self.family_history),
            SectionId::NonPathologicalHistory => {
                serde_yaml::to_string(&self.non_pathological_history)
            }
            SectionId::PathologicalHistory => serde_yaml::to_string(&self.pathological_history),
            SectionId::ExtraoralExam => serde_yaml::to_string(&self.extraoral_exam),
            SectionId::IntraoralExam => serde_yaml::to_string(&self.intraoral_exam),
            SectionId::DiagnosticAids => serde_yaml::to_string(&self.diagnostic_aids),
        };
        yaml.map_err(RecordError::YamlSerialization)
    }

    /// Replaces one section from its on-disk YAML representation.
    pub fn set_from_yaml(&mut self, section: SectionId, yaml: &str) -> RecordResult<()> {
        match section {
            SectionId::Identification => {
                self.identification =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::ChiefComplaint => {
                self.chief_complaint =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::FamilyHistory => {
                self.family_history =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::NonPathologicalHistory => {
                self.non_pathological_history =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::PathologicalHistory => {
                self.pathological_history =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::ExtraoralExam => {
                self.extraoral_exam =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::IntraoralExam => {
                self.intraoral_exam =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
            SectionId::DiagnosticAids => {
                self.diagnostic_aids =
                    serde_yaml::from_str(yaml).map_err(RecordError::YamlDeserialization)?;
            }
        }
        Ok(())
    }
}
