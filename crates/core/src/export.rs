//! Record export pipeline.
//!
//! An export projects a record into a canonical plain-markup document, renders it
//! through a [`Renderer`], and stores the result as a content-addressed artifact with
//! a metadata sidecar and an `export` audit entry.
//!
//! The projection is deterministic: sections are emitted in canonical document order
//! and derived fields are computed as of the record's last update date, never "now".
//! Exporting an unchanged record therefore produces byte-identical output, which the
//! content-addressed blob store collapses into a single stored blob.
//!
//! Rendering happens before anything touches disk, so a renderer failure aborts the
//! export with no partial state.

use crate::error::{RecordError, RecordResult};
use crate::record::ClinicalRecord;
use crate::sections::SectionId;
use crate::store::RecordStore;
use crate::actor::Actor;
use crate::audit::{AuditAction, AuditEntry};
use dcr_artifacts::{ArtifactMetadata, ArtifactStore};
use dcr_types::CanonicalId;
use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;

/// Turns canonical markup into final artifact bytes.
///
/// The trait is the seam for output formats: the built-in [`MarkupRenderer`] passes
/// the markup through unchanged, a PDF backend would typeset it.
pub trait Renderer {
    /// Human-readable name of the output format, recorded nowhere but useful in logs.
    fn format(&self) -> &'static str;

    /// Renders markup to artifact bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::RenderFailure`] when the backend cannot produce output.
    fn render(&self, markup: &str) -> RecordResult<Vec<u8>>;
}

/// Identity renderer: the canonical markup itself is the artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupRenderer;

impl Renderer for MarkupRenderer {
    fn format(&self) -> &'static str {
        "markup"
    }

    fn render(&self, markup: &str) -> RecordResult<Vec<u8>> {
        Ok(markup.as_bytes().to_vec())
    }
}

/// Outcome of one export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub metadata: ArtifactMetadata,
    /// `true` if an identical artifact already existed and its blob was reused.
    pub reused: bool,
}

/// Projects `record` into the canonical markup document.
///
/// Derived fields use the record's `updated_at` date as the reference point so the
/// projection depends only on record content, not on the wall clock at export time.
pub fn canonical_markup(record: &ClinicalRecord) -> RecordResult<String> {
    let meta = &record.meta;
    let derived = record.derived_as_of(meta.updated_at.date_naive());

    let mut out = String::new();
    let _ = writeln!(out, "# Clinical Record {}", meta.id);
    let _ = writeln!(out);
    let _ = writeln!(out, "patient: {}", meta.patient_id);
    let _ = writeln!(out, "state: {}", meta.state);
    let _ = writeln!(out, "version: {}", meta.version);
    let _ = writeln!(out, "created_at: {}", meta.created_at.to_rfc3339());
    let _ = writeln!(out, "updated_at: {}", meta.updated_at.to_rfc3339());
    match derived.age_years {
        Some(age) => {
            let _ = writeln!(out, "age_years: {age}");
        }
        None => {
            let _ = writeln!(out, "age_years: unknown");
        }
    }
    match derived.bmi {
        Some(bmi) => {
            let _ = writeln!(out, "bmi: {bmi:.2}");
        }
        None => {
            let _ = writeln!(out, "bmi: unknown");
        }
    }

    for section in SectionId::ALL {
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", section.title());
        let _ = writeln!(out);
        out.push_str(&record.sections.to_yaml(section)?);
    }

    Ok(out)
}

/// Export pipeline over a [`RecordStore`] and its artifact store.
#[derive(Clone)]
pub struct ExportPipeline {
    store: RecordStore,
    artifacts: Arc<ArtifactStore>,
}

impl ExportPipeline {
    /// Opens the artifact store under the record store's data directory.
    pub fn new(store: RecordStore) -> RecordResult<Self> {
        let artifacts = ArtifactStore::open(&store.config().artifacts_dir())?;
        Ok(Self {
            store,
            artifacts: Arc::new(artifacts),
        })
    }

    /// Exports a record through `renderer`.
    ///
    /// Order of effects: render (pure, abortable), blob write (idempotent), metadata
    /// sidecar, audit entry. An audit failure rolls the sidecar back; an orphaned
    /// blob is harmless because blobs are content-addressed and shared.
    pub fn export(
        &self,
        record_id: &CanonicalId,
        actor: &Actor,
        renderer: &dyn Renderer,
    ) -> RecordResult<ExportOutcome> {
        let record = self.store.get(record_id)?;

        let markup = canonical_markup(&record)?;
        let bytes = renderer.render(&markup)?;

        let blob = self.artifacts.store_blob(&bytes)?;
        let metadata = self.artifacts.metadata_for(record_id, &blob, &bytes)?;
        let meta_path = self.artifacts.write_metadata(&metadata)?;

        let entry = AuditEntry::new(
            record_id.clone(),
            actor,
            AuditAction::Export,
            None,
            Some(serde_json::json!({
                "sequence": metadata.sequence,
                "content_hash": metadata.content_hash.as_str(),
                "format": renderer.format(),
            })),
        );
        if let Err(audit_error) = self.store.audit().append(&entry) {
            let _ = fs::remove_file(&meta_path);
            return Err(audit_error);
        }

        tracing::info!(
            record = %record_id,
            sequence = metadata.sequence,
            hash = %metadata.content_hash,
            reused = blob.reused,
            "exported record"
        );
        Ok(ExportOutcome {
            metadata,
            reused: blob.reused,
        })
    }

    /// Lists a record's export artifacts, newest first.
    ///
    /// Artifacts outlive their record, so this works for deleted records too.
    pub fn artifact_history(&self, record_id: &CanonicalId) -> RecordResult<Vec<ArtifactMetadata>> {
        Ok(self.artifacts.history(record_id)?)
    }

    /// Re-hashes the stored blob for the given export and compares it with the
    /// recorded hash. Returns `true` when the artifact is intact.
    pub fn verify_artifact(
        &self,
        record_id: &CanonicalId,
        sequence: u32,
    ) -> RecordResult<bool> {
        let history = self.artifact_history(record_id)?;
        let Some(metadata) = history.iter().find(|m| m.sequence == sequence) else {
            return Err(RecordError::InvalidInput(format!(
                "no export with sequence {sequence} for record {record_id}"
            )));
        };
        Ok(self.artifacts.verify(metadata)?)
    }

    /// Reads the rendered bytes of one export back from blob storage.
    pub fn read_artifact(&self, metadata: &ArtifactMetadata) -> RecordResult<Vec<u8>> {
        Ok(self.artifacts.read_blob(&metadata.content_hash)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::config::CoreConfig;
    use crate::sections::{IdentificationSection, SectionPayload};
    use dcr_types::NonEmptyText;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RecordStore, ExportPipeline) {
        let tmp = TempDir::new().expect("temp dir");
        let cfg = CoreConfig::new(tmp.path().join("data")).expect("config");
        let store = RecordStore::new(Arc::new(cfg));
        let pipeline = ExportPipeline::new(store.clone()).expect("pipeline");
        (tmp, store, pipeline)
    }

    fn test_actor(role: Role) -> Actor {
        Actor::new(
            CanonicalId::generate(),
            NonEmptyText::new("Dr Export").expect("name"),
            NonEmptyText::new("export@test.example").expect("email"),
            role,
        )
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn format(&self) -> &'static str {
            "failing"
        }

        fn render(&self, _markup: &str) -> RecordResult<Vec<u8>> {
            Err(RecordError::RenderFailure("backend unavailable".into()))
        }
    }

    #[test]
    fn unchanged_record_exports_to_identical_hashes() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(
                CanonicalId::generate(),
                &actor,
                vec![SectionPayload::Identification(IdentificationSection {
                    first_name: Some("Ana".into()),
                    ..Default::default()
                })],
            )
            .expect("create");

        let first = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("first export");
        let second = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("second export");

        assert_eq!(first.metadata.content_hash, second.metadata.content_hash);
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.metadata.sequence, 1);
        assert_eq!(second.metadata.sequence, 2);
    }

    #[test]
    fn edited_record_exports_to_a_different_hash() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let before = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("export");

        store
            .update_section(
                &record.meta.id,
                SectionPayload::Identification(IdentificationSection {
                    first_name: Some("Ana".into()),
                    ..Default::default()
                }),
                &actor,
                None,
            )
            .expect("update");

        let after = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("export");
        assert_ne!(before.metadata.content_hash, after.metadata.content_hash);
    }

    #[test]
    fn render_failure_leaves_no_artifact_and_no_audit_entry() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let err = pipeline
            .export(&record.meta.id, &actor, &FailingRenderer)
            .expect_err("render failure must abort");
        assert!(matches!(err, RecordError::RenderFailure(_)));

        assert!(pipeline
            .artifact_history(&record.meta.id)
            .expect("history")
            .is_empty());
        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert!(trail.iter().all(|e| e.action != AuditAction::Export));
    }

    #[test]
    fn export_records_an_audit_entry_with_the_hash() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let outcome = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("export");

        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert_eq!(trail[0].action, AuditAction::Export);
        assert_eq!(
            trail[0]
                .snapshot
                .as_ref()
                .and_then(|s| s.get("content_hash"))
                .and_then(|v| v.as_str()),
            Some(outcome.metadata.content_hash.as_str())
        );
    }

    #[test]
    fn markup_lists_sections_in_document_order() {
        let (_tmp, store, _pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let markup = canonical_markup(&record).expect("markup");
        let mut last = 0;
        for section in SectionId::ALL {
            let header = format!("## {}", section.title());
            let pos = markup.find(&header).expect("section header present");
            assert!(pos > last, "sections must appear in canonical order");
            last = pos;
        }
        assert!(markup.contains("age_years: unknown"));
    }

    #[test]
    fn verify_artifact_reports_intact_exports() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let outcome = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("export");
        assert!(pipeline
            .verify_artifact(&record.meta.id, outcome.metadata.sequence)
            .expect("verify"));

        assert!(pipeline.verify_artifact(&record.meta.id, 99).is_err());
    }

    #[test]
    fn read_artifact_round_trips_rendered_bytes() {
        let (_tmp, store, pipeline) = setup();
        let actor = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &actor, vec![])
            .expect("create");

        let outcome = pipeline
            .export(&record.meta.id, &actor, &MarkupRenderer)
            .expect("export");
        let bytes = pipeline.read_artifact(&outcome.metadata).expect("read");
        let expected = canonical_markup(&store.get(&record.meta.id).expect("get")).expect("markup");
        assert_eq!(bytes, expected.into_bytes());
    }
}
