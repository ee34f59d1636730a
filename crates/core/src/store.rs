//! Record aggregate store.
//!
//! Owns the canonical [`ClinicalRecord`] and its sections. Each record is persisted as
//! a small set of YAML files inside its own Git-versioned repository under a sharded
//! directory; every accepted mutation is one surgical commit of exactly the files it
//! touched, written transactionally with its audit entry (and, when the patient
//! identification number changes, the uniqueness index).
//!
//! Optimistic concurrency: callers may pass the version they read; if the record has
//! moved on the mutation fails with a version conflict and nothing is written. No lock
//! is held across the read-then-write gap.

use crate::actor::Actor;
use crate::audit::{AuditAction, AuditEntry, AuditRecorder};
use crate::config::CoreConfig;
use crate::error::{RecordError, RecordResult};
use crate::record::{ClinicalRecord, LifecycleState, RecordMeta};
use crate::sections::{SectionId, SectionPayload, Sections};
use crate::validate::validate_payload;
use crate::versioned::{CommitAction, CommitMessage, FileToWrite, SideFile, VersionedRepo};
use chrono::Utc;
use dcr_types::CanonicalId;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RECORD_FILE: &str = "record.yaml";
const SECTIONS_DIR: &str = "sections";
const IDENTIFICATION_INDEX_FILE: &str = "identification.json";

/// Pagination request. Pages are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub(crate) fn validate(&self) -> RecordResult<()> {
        if self.page == 0 {
            return Err(RecordError::validation("page", "must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(RecordError::validation("page_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// One page of results plus the total match count.
#[derive(Clone, Debug, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paged<T> {
    pub(crate) fn slice(mut items: Vec<T>, pagination: Pagination) -> Self {
        let total_count = items.len();
        let start = (pagination.page as usize - 1).saturating_mul(pagination.page_size as usize);
        let items = if start >= items.len() {
            Vec::new()
        } else {
            let end = (start + pagination.page_size as usize).min(items.len());
            items.drain(start..end).collect()
        };
        Self {
            items,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }
}

/// Raw on-disk content captured at load time, used as rollback state for the
/// subsequent mutation of the same record.
pub(crate) struct RawFiles {
    pub meta: String,
    pub sections: BTreeMap<SectionId, String>,
}

/// Store for clinical record aggregates.
#[derive(Clone)]
pub struct RecordStore {
    cfg: Arc<CoreConfig>,
    audit: AuditRecorder,
}

impl RecordStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        let audit = AuditRecorder::new(cfg.audit_dir());
        Self { cfg, audit }
    }

    /// The audit recorder bound to this store's data directory.
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    pub(crate) fn config(&self) -> &Arc<CoreConfig> {
        &self.cfg
    }

    fn record_dir(&self, record_id: &CanonicalId) -> PathBuf {
        record_id.sharded_dir(&self.cfg.records_dir())
    }

    fn section_rel_path(section: SectionId) -> PathBuf {
        Path::new(SECTIONS_DIR).join(section.file_name())
    }

    fn identification_index_path(&self) -> PathBuf {
        self.cfg.index_dir().join(IDENTIFICATION_INDEX_FILE)
    }

    /// Creates a new draft record for `patient_id`, authored by `actor`.
    ///
    /// The record starts at version 1 in the draft state. Initial payloads are
    /// validated and merged exactly as a later `update_section` would, but within the
    /// single creation transaction.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Validation`] if any initial payload fails its section rules
    /// - [`RecordError::DuplicateIdentification`] if the identification number is
    ///   already registered to another record
    /// - storage errors if the repository cannot be created; on any failure no trace
    ///   of the record remains
    pub fn create(
        &self,
        patient_id: CanonicalId,
        actor: &Actor,
        initial: Vec<SectionPayload>,
    ) -> RecordResult<ClinicalRecord> {
        let mut violations = Vec::new();
        for payload in &initial {
            violations.extend(validate_payload(payload));
        }
        if !violations.is_empty() {
            return Err(RecordError::Validation(violations));
        }

        let mut sections = Sections::default();
        let mut snapshots = Vec::new();
        for payload in initial {
            snapshots.push(payload.snapshot()?);
            sections.merge(payload);
        }

        let (record_id, record_dir) = self.allocate_record_dir()?;

        let now = Utc::now();
        let meta = RecordMeta {
            id: record_id.clone(),
            patient_id,
            author_id: actor.id.clone(),
            last_editor_id: actor.id.clone(),
            created_at: now,
            updated_at: now,
            state: LifecycleState::Draft,
            version: 1,
        };
        let record = ClinicalRecord { meta, sections };

        let mut side_files = Vec::new();
        if let Some(number) = record
            .sections
            .identification
            .identification_number
            .as_deref()
        {
            side_files.push(self.prepare_identification_claim(&record_id, None, number)?);
        }

        let snapshot = if snapshots.is_empty() {
            None
        } else {
            Some(serde_json::Value::Array(snapshots))
        };
        side_files.push(self.audit.prepare(&AuditEntry::new(
            record_id.clone(),
            actor,
            AuditAction::Create,
            None,
            snapshot,
        ))?);

        let meta_yaml =
            serde_yaml::to_string(&record.meta).map_err(RecordError::YamlSerialization)?;
        let mut section_yamls = Vec::with_capacity(SectionId::ALL.len());
        for section in SectionId::ALL {
            section_yamls.push((Self::section_rel_path(section), record.sections.to_yaml(section)?));
        }

        let record_file = Path::new(RECORD_FILE);
        let mut files = vec![FileToWrite {
            relative_path: record_file,
            content: &meta_yaml,
            old_content: None,
        }];
        for (rel_path, yaml) in &section_yamls {
            files.push(FileToWrite {
                relative_path: rel_path,
                content: yaml,
                old_content: None,
            });
        }

        let message = CommitMessage {
            action: CommitAction::Create,
            section: None,
            detail: None,
        };
        VersionedRepo::init_and_commit(&record_dir, actor, &message, &files, &side_files)?;

        tracing::info!(record = %record_id, patient = %record.meta.patient_id, "created record");
        Ok(record)
    }

    /// Loads a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::RecordNotFound`] if no record directory exists.
    pub fn get(&self, record_id: &CanonicalId) -> RecordResult<ClinicalRecord> {
        Ok(self.load_with_raw(record_id)?.0)
    }

    pub(crate) fn load_with_raw(
        &self,
        record_id: &CanonicalId,
    ) -> RecordResult<(ClinicalRecord, RawFiles)> {
        let dir = self.record_dir(record_id);
        if !dir.is_dir() {
            return Err(RecordError::RecordNotFound(record_id.to_string()));
        }

        let meta_raw = fs::read_to_string(dir.join(RECORD_FILE)).map_err(RecordError::FileRead)?;
        let meta: RecordMeta =
            serde_yaml::from_str(&meta_raw).map_err(RecordError::YamlDeserialization)?;

        let mut sections = Sections::default();
        let mut raw_sections = BTreeMap::new();
        for section in SectionId::ALL {
            let raw = fs::read_to_string(dir.join(Self::section_rel_path(section)))
                .map_err(RecordError::FileRead)?;
            sections.set_from_yaml(section, &raw)?;
            raw_sections.insert(section, raw);
        }

        Ok((
            ClinicalRecord { meta, sections },
            RawFiles {
                meta: meta_raw,
                sections: raw_sections,
            },
        ))
    }

    /// Merges a validated payload into one section of a record.
    ///
    /// On success the record's version has advanced by exactly 1, `last_editor_id`
    /// points at `actor`, and an `edit-section` audit entry carrying the payload as
    /// submitted exists — all committed together or not at all.
    ///
    /// # Errors
    ///
    /// - [`RecordError::RecordNotFound`] for an unknown id
    /// - [`RecordError::Forbidden`] if the record is reviewed (sealed)
    /// - [`RecordError::VersionConflict`] if `expected_version` no longer matches
    /// - [`RecordError::Validation`] if the payload fails its section rules
    /// - [`RecordError::DuplicateIdentification`] on an identification number clash
    pub fn update_section(
        &self,
        record_id: &CanonicalId,
        payload: SectionPayload,
        actor: &Actor,
        expected_version: Option<u64>,
    ) -> RecordResult<ClinicalRecord> {
        let (mut record, raw) = self.load_with_raw(record_id)?;

        if record.meta.state == LifecycleState::Reviewed {
            return Err(RecordError::Forbidden(
                "record is reviewed and sealed; an admin must reopen it before editing".into(),
            ));
        }

        if let Some(expected) = expected_version {
            if expected != record.meta.version {
                return Err(RecordError::VersionConflict {
                    expected,
                    actual: record.meta.version,
                });
            }
        }

        let violations = validate_payload(&payload);
        if !violations.is_empty() {
            return Err(RecordError::Validation(violations));
        }

        let section = payload.section_id();
        let snapshot = payload.snapshot()?;

        let mut side_files = Vec::new();
        if let SectionPayload::Identification(patch) = &payload {
            if let Some(number) = patch.identification_number.as_deref() {
                let previous = record
                    .sections
                    .identification
                    .identification_number
                    .as_deref();
                if Some(number) != previous {
                    side_files.push(self.prepare_identification_claim(
                        record_id, previous, number,
                    )?);
                }
            }
        }

        record.sections.merge(payload);
        record.meta.version += 1;
        record.meta.updated_at = Utc::now();
        record.meta.last_editor_id = actor.id.clone();

        side_files.push(self.audit.prepare(&AuditEntry::new(
            record_id.clone(),
            actor,
            AuditAction::EditSection,
            Some(section),
            Some(snapshot),
        ))?);

        let meta_yaml =
            serde_yaml::to_string(&record.meta).map_err(RecordError::YamlSerialization)?;
        let section_yaml = record.sections.to_yaml(section)?;
        let section_rel = Self::section_rel_path(section);
        let old_section = raw.sections.get(&section).map(String::as_str);

        let files = [
            FileToWrite {
                relative_path: Path::new(RECORD_FILE),
                content: &meta_yaml,
                old_content: Some(&raw.meta),
            },
            FileToWrite {
                relative_path: &section_rel,
                content: &section_yaml,
                old_content: old_section,
            },
        ];

        let message = CommitMessage {
            action: CommitAction::Update,
            section: Some(section),
            detail: None,
        };
        VersionedRepo::write_and_commit(
            &self.record_dir(record_id),
            actor,
            &message,
            &files,
            &side_files,
        )?;

        tracing::debug!(record = %record_id, section = %section, version = record.meta.version, "updated section");
        Ok(record)
    }

    /// Commits a metadata-only mutation (lifecycle transitions and reopens) together
    /// with its audit entry. The version increment and state change have already been
    /// applied to `record` by the caller.
    pub(crate) fn commit_meta_change(
        &self,
        record: &ClinicalRecord,
        old_meta: &str,
        actor: &Actor,
        commit_action: CommitAction,
        detail: String,
        audit_action: AuditAction,
    ) -> RecordResult<()> {
        let meta_yaml =
            serde_yaml::to_string(&record.meta).map_err(RecordError::YamlSerialization)?;

        let side_files = vec![self.audit.prepare(&AuditEntry::new(
            record.meta.id.clone(),
            actor,
            audit_action,
            None,
            Some(serde_json::json!({ "state": record.meta.state.as_str() })),
        ))?];

        let files = [FileToWrite {
            relative_path: Path::new(RECORD_FILE),
            content: &meta_yaml,
            old_content: Some(old_meta),
        }];

        let message = CommitMessage {
            action: commit_action,
            section: None,
            detail: Some(detail),
        };
        VersionedRepo::write_and_commit(
            &self.record_dir(&record.meta.id),
            actor,
            &message,
            &files,
            &side_files,
        )
    }

    /// Lists records belonging to `patient_id`, newest first, paginated.
    pub fn find_by_patient(
        &self,
        patient_id: &CanonicalId,
        pagination: Pagination,
    ) -> RecordResult<Paged<ClinicalRecord>> {
        pagination.validate()?;

        let mut records: Vec<ClinicalRecord> = self
            .list_all()?
            .into_iter()
            .filter(|r| &r.meta.patient_id == patient_id)
            .collect();
        sort_newest_first(&mut records);
        Ok(Paged::slice(records, pagination))
    }

    /// Loads every record in the store by walking the sharded directory tree.
    ///
    /// Unreadable records are logged and skipped so one corrupt entry cannot take
    /// down every listing.
    pub(crate) fn list_all(&self) -> RecordResult<Vec<ClinicalRecord>> {
        let records_dir = self.cfg.records_dir();
        let mut records = Vec::new();

        let Ok(s1_iter) = fs::read_dir(&records_dir) else {
            return Ok(records);
        };
        for s1 in s1_iter.flatten() {
            if !s1.path().is_dir() {
                continue;
            }
            let Ok(s2_iter) = fs::read_dir(s1.path()) else {
                continue;
            };
            for s2 in s2_iter.flatten() {
                if !s2.path().is_dir() {
                    continue;
                }
                let Ok(id_iter) = fs::read_dir(s2.path()) else {
                    continue;
                };
                for id_entry in id_iter.flatten() {
                    let Some(name) = id_entry.file_name().to_str().map(str::to_string) else {
                        continue;
                    };
                    let Ok(record_id) = CanonicalId::parse(&name) else {
                        continue;
                    };
                    match self.get(&record_id) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            tracing::warn!("skipping unreadable record {}: {}", name, e);
                        }
                    }
                }
            }
        }

        Ok(records)
    }

    /// Allocates a fresh record id and creates its sharded directory, guarding
    /// against collisions by retrying with different ids.
    fn allocate_record_dir(&self) -> RecordResult<(CanonicalId, PathBuf)> {
        let base_dir = self.cfg.records_dir();
        for _attempt in 0..5 {
            let record_id = CanonicalId::generate();
            let candidate = record_id.sharded_dir(&base_dir);

            if candidate.exists() {
                continue;
            }

            if let Some(parent) = candidate.parent() {
                fs::create_dir_all(parent).map_err(RecordError::RecordDirCreation)?;
            }

            match fs::create_dir(&candidate) {
                Ok(()) => return Ok((record_id, candidate)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(RecordError::RecordDirCreation(e)),
            }
        }

        Err(RecordError::RecordDirCreation(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "failed to allocate a unique record directory after 5 attempts",
        )))
    }

    fn load_identification_index(&self) -> RecordResult<(BTreeMap<String, String>, Option<String>)> {
        let path = self.identification_index_path();
        if !path.is_file() {
            return Ok((BTreeMap::new(), None));
        }
        let raw = fs::read_to_string(&path).map_err(RecordError::FileRead)?;
        let map = serde_json::from_str(&raw).map_err(RecordError::JsonDeserialization)?;
        Ok((map, Some(raw)))
    }

    /// Checks the uniqueness index for `number` and stages the index update that
    /// claims it for `record_id` (releasing `previous` if the number changed).
    fn prepare_identification_claim(
        &self,
        record_id: &CanonicalId,
        previous: Option<&str>,
        number: &str,
    ) -> RecordResult<SideFile> {
        let (mut index, old_content) = self.load_identification_index()?;

        if let Some(owner) = index.get(number) {
            if owner != &record_id.to_string() {
                return Err(RecordError::DuplicateIdentification(number.to_string()));
            }
        }

        if let Some(previous) = previous {
            index.remove(previous);
        }
        index.insert(number.to_string(), record_id.to_string());

        let content =
            serde_json::to_string_pretty(&index).map_err(RecordError::JsonSerialization)?;
        Ok(SideFile {
            path: self.identification_index_path(),
            content,
            old_content,
        })
    }
}

/// Stable listing order: creation time descending, ties broken by id ascending, so
/// pagination stays consistent even when a concurrent write lands between pages.
pub(crate) fn sort_newest_first(records: &mut [ClinicalRecord]) {
    records.sort_by(|a, b| {
        b.meta
            .created_at
            .cmp(&a.meta.created_at)
            .then_with(|| a.meta.id.cmp(&b.meta.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::sections::{ChiefComplaintSection, IdentificationSection};
    use dcr_types::NonEmptyText;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, RecordStore) {
        let tmp = TempDir::new().expect("temp dir");
        let cfg = CoreConfig::new(tmp.path().join("data")).expect("config");
        (tmp, RecordStore::new(Arc::new(cfg)))
    }

    fn clinician() -> Actor {
        Actor::new(
            CanonicalId::generate(),
            NonEmptyText::new("Dr Store").expect("name"),
            NonEmptyText::new("store@test.example").expect("email"),
            Role::Clinician,
        )
    }

    fn identification(first_name: &str, number: Option<&str>) -> SectionPayload {
        SectionPayload::Identification(IdentificationSection {
            first_name: Some(first_name.into()),
            identification_number: number.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn create_starts_at_version_one_in_draft() {
        let (_tmp, store) = test_store();
        let actor = clinician();

        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        assert_eq!(record.meta.version, 1);
        assert_eq!(record.meta.state, LifecycleState::Draft);
        assert_eq!(record.meta.author_id, actor.id);
        assert_eq!(record.meta.last_editor_id, actor.id);

        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Create);
    }

    #[test]
    fn get_round_trips_created_record() {
        let (_tmp, store) = test_store();
        let actor = clinician();

        let record = store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![identification("Ana", None)],
            )
            .expect("create");
        let loaded = store.get(&record.meta.id).expect("get");

        assert_eq!(loaded.meta, record.meta);
        assert_eq!(
            loaded.sections.identification.first_name.as_deref(),
            Some("Ana")
        );
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let (_tmp, store) = test_store();
        assert!(matches!(
            store.get(&CanonicalId::generate()),
            Err(RecordError::RecordNotFound(_))
        ));
    }

    #[test]
    fn update_section_bumps_version_and_audits() {
        let (_tmp, store) = test_store();
        let actor = clinician();
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let updated = store
            .update_section(
                &record.meta.id,
                SectionPayload::ChiefComplaint(ChiefComplaintSection {
                    complaint: Some("toothache".into()),
                    pain_scale: Some(6),
                    ..Default::default()
                }),
                &actor,
                Some(1),
            )
            .expect("update");

        assert_eq!(updated.meta.version, 2);
        assert_eq!(
            updated.sections.chief_complaint.complaint.as_deref(),
            Some("toothache")
        );

        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::EditSection);
        assert_eq!(trail[0].section, Some(SectionId::ChiefComplaint));
        assert_eq!(
            trail[0]
                .snapshot
                .as_ref()
                .and_then(|s| s.get("complaint"))
                .and_then(|v| v.as_str()),
            Some("toothache")
        );
    }

    #[test]
    fn stale_expected_version_conflicts_and_leaves_record_untouched() {
        let (_tmp, store) = test_store();
        let actor = clinician();
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        store
            .update_section(
                &record.meta.id,
                identification("Ana", None),
                &actor,
                Some(1),
            )
            .expect("first update");

        let err = store
            .update_section(
                &record.meta.id,
                identification("Benito", None),
                &actor,
                Some(1),
            )
            .expect_err("stale version must conflict");
        assert!(matches!(
            err,
            RecordError::VersionConflict {
                expected: 1,
                actual: 2
            }
        ));

        let loaded = store.get(&record.meta.id).expect("get");
        assert_eq!(loaded.meta.version, 2);
        assert_eq!(
            loaded.sections.identification.first_name.as_deref(),
            Some("Ana")
        );
        // The failed attempt must not have produced an audit entry.
        assert_eq!(store.audit().list(&record.meta.id).expect("audit").len(), 2);
    }

    #[test]
    fn invalid_payload_is_rejected_without_mutation() {
        let (_tmp, store) = test_store();
        let actor = clinician();
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let err = store
            .update_section(
                &record.meta.id,
                SectionPayload::ChiefComplaint(ChiefComplaintSection {
                    pain_scale: Some(11),
                    ..Default::default()
                }),
                &actor,
                None,
            )
            .expect_err("out-of-range pain scale must fail");
        assert!(matches!(err, RecordError::Validation(_)));
        assert_eq!(store.get(&record.meta.id).expect("get").meta.version, 1);
    }

    #[test]
    fn identification_number_is_unique_across_records() {
        let (_tmp, store) = test_store();
        let actor = clinician();

        store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![identification("Ana", Some("CURP-001"))],
            )
            .expect("first create");

        let err = store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![identification("Benito", Some("CURP-001"))],
            )
            .expect_err("duplicate identification number must conflict");
        assert!(matches!(err, RecordError::DuplicateIdentification(_)));
        assert!(err.is_conflict());
    }

    #[test]
    fn changing_identification_number_releases_the_old_claim() {
        let (_tmp, store) = test_store();
        let actor = clinician();

        let record = store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![identification("Ana", Some("CURP-001"))],
            )
            .expect("create");

        store
            .update_section(
                &record.meta.id,
                identification("Ana", Some("CURP-002")),
                &actor,
                None,
            )
            .expect("renumber");

        // The old number is free again.
        store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![identification("Benito", Some("CURP-001"))],
            )
            .expect("old number is reusable");
    }

    #[test]
    fn find_by_patient_filters_and_paginates() {
        let (_tmp, store) = test_store();
        let actor = clinician();
        let patient = CanonicalId::generate();

        for _ in 0..3 {
            store
                .create(patient.clone(), &actor, vec![])
                .expect("create");
        }
        store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("other patient");

        let page = store
            .find_by_patient(&patient, Pagination::new(1, 2))
            .expect("page 1");
        assert_eq!(page.total_count, 3);
        assert_eq!(page.items.len(), 2);

        let page2 = store
            .find_by_patient(&patient, Pagination::new(2, 2))
            .expect("page 2");
        assert_eq!(page2.items.len(), 1);
    }

    #[test]
    fn zero_page_size_is_a_validation_error() {
        let (_tmp, store) = test_store();
        assert!(matches!(
            store.find_by_patient(&CanonicalId::generate(), Pagination::new(1, 0)),
            Err(RecordError::Validation(_))
        ));
    }
}
