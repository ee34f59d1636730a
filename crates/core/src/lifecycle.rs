//! Record lifecycle state machine.
//!
//! Records move forward one step at a time: draft to complete (gated on record
//! completeness and restricted to the record's author or an admin), then complete to
//! reviewed (restricted to actors with review authority). Reviewed records are sealed.
//! The only way backwards is an admin reopen, which returns a complete or reviewed
//! record to draft.
//!
//! Every accepted change bumps the record version by 1 and lands atomically with its
//! audit entry, exactly like a section edit.

use crate::actor::Actor;
use crate::audit::AuditAction;
use crate::error::{RecordError, RecordResult};
use crate::record::{ClinicalRecord, LifecycleState};
use crate::store::RecordStore;
use crate::validate::validate_completeness;
use crate::versioned::CommitAction;
use chrono::Utc;
use dcr_types::CanonicalId;

/// Role-gated lifecycle operations over records in a [`RecordStore`].
#[derive(Clone)]
pub struct LifecycleManager {
    store: RecordStore,
}

impl LifecycleManager {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Advances a record to `target`.
    ///
    /// Only the single forward step from the record's current state is accepted.
    /// Draft to complete additionally requires the record to be complete and the
    /// actor to be the record's author or an admin; complete to reviewed requires
    /// review authority.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidTransition`] if `target` is not the next state
    /// - [`RecordError::IncompleteRecord`] when completing a record that is missing
    ///   mandatory fields
    /// - [`RecordError::Forbidden`] when the actor lacks the authority for the step
    pub fn transition(
        &self,
        record_id: &CanonicalId,
        target: LifecycleState,
        actor: &Actor,
    ) -> RecordResult<ClinicalRecord> {
        let (mut record, raw) = self.store.load_with_raw(record_id)?;
        let from = record.meta.state;

        if !from.advances_to(target) {
            return Err(RecordError::InvalidTransition { from, to: target });
        }

        match target {
            LifecycleState::Complete => {
                if record.meta.author_id != actor.id && !actor.is_admin() {
                    return Err(RecordError::Forbidden(
                        "only the record's author or an admin may mark it complete".into(),
                    ));
                }
                let completeness = validate_completeness(&record.sections);
                if !completeness.is_complete {
                    return Err(RecordError::IncompleteRecord(completeness.missing_fields));
                }
            }
            LifecycleState::Reviewed => {
                if !actor.can_review() {
                    return Err(RecordError::Forbidden(
                        "only a reviewer or an admin may mark a record reviewed".into(),
                    ));
                }
            }
            LifecycleState::Draft => unreachable!("no forward step targets draft"),
        }

        record.meta.state = target;
        record.meta.version += 1;
        record.meta.updated_at = Utc::now();
        record.meta.last_editor_id = actor.id.clone();

        self.store.commit_meta_change(
            &record,
            &raw.meta,
            actor,
            CommitAction::Transition,
            format!("{from} -> {target}"),
            AuditAction::TransitionState,
        )?;

        tracing::info!(record = %record_id, %from, to = %target, "state transition");
        Ok(record)
    }

    /// Returns a complete or reviewed record to draft. Admin only.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Forbidden`] unless the actor is an admin
    /// - [`RecordError::InvalidTransition`] if the record is already a draft
    pub fn reopen(&self, record_id: &CanonicalId, actor: &Actor) -> RecordResult<ClinicalRecord> {
        if !actor.is_admin() {
            return Err(RecordError::Forbidden(
                "only an admin may reopen a record".into(),
            ));
        }

        let (mut record, raw) = self.store.load_with_raw(record_id)?;
        let from = record.meta.state;
        if from == LifecycleState::Draft {
            return Err(RecordError::InvalidTransition {
                from,
                to: LifecycleState::Draft,
            });
        }

        record.meta.state = LifecycleState::Draft;
        record.meta.version += 1;
        record.meta.updated_at = Utc::now();
        record.meta.last_editor_id = actor.id.clone();

        self.store.commit_meta_change(
            &record,
            &raw.meta,
            actor,
            CommitAction::Reopen,
            format!("{from} -> draft"),
            AuditAction::Reopen,
        )?;

        tracing::info!(record = %record_id, %from, "record reopened");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Role;
    use crate::config::CoreConfig;
    use crate::sections::{ChiefComplaintSection, IdentificationSection, SectionPayload};
    use dcr_types::NonEmptyText;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RecordStore, LifecycleManager) {
        let tmp = TempDir::new().expect("temp dir");
        let cfg = CoreConfig::new(tmp.path().join("data")).expect("config");
        let store = RecordStore::new(Arc::new(cfg));
        let lifecycle = LifecycleManager::new(store.clone());
        (tmp, store, lifecycle)
    }

    fn test_actor(role: Role) -> Actor {
        Actor::new(
            CanonicalId::generate(),
            NonEmptyText::new("Dr Lifecycle").expect("name"),
            NonEmptyText::new("lifecycle@test.example").expect("email"),
            role,
        )
    }

    fn complete_payloads() -> Vec<SectionPayload> {
        vec![
            SectionPayload::Identification(IdentificationSection {
                first_name: Some("Ana".into()),
                paternal_surname: Some("Ruiz".into()),
                maternal_surname: Some("García".into()),
                ..Default::default()
            }),
            SectionPayload::ChiefComplaint(ChiefComplaintSection {
                complaint: Some("sensitivity to cold".into()),
                ..Default::default()
            }),
        ]
    }

    #[test]
    fn author_completes_then_reviewer_reviews() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let reviewer = test_actor(Role::Reviewer);

        let record = store
            .create(CanonicalId::generate(), &author, complete_payloads())
            .expect("create");

        let completed = lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &author)
            .expect("complete");
        assert_eq!(completed.meta.state, LifecycleState::Complete);
        assert_eq!(completed.meta.version, 2);

        let reviewed = lifecycle
            .transition(&record.meta.id, LifecycleState::Reviewed, &reviewer)
            .expect("review");
        assert_eq!(reviewed.meta.state, LifecycleState::Reviewed);
        assert_eq!(reviewed.meta.version, 3);

        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[0].action, AuditAction::TransitionState);
    }

    #[test]
    fn incomplete_record_cannot_be_completed() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &author, vec![])
            .expect("create");

        let err = lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &author)
            .expect_err("incomplete record must be rejected");
        let RecordError::IncompleteRecord(missing) = err else {
            panic!("expected IncompleteRecord, got {err:?}");
        };
        assert!(missing.iter().any(|f| f.contains("first_name")));
        assert!(missing.iter().any(|f| f.contains("complaint")));

        // The failed transition must not have advanced the record.
        assert_eq!(store.get(&record.meta.id).expect("get").meta.version, 1);
    }

    #[test]
    fn only_author_or_admin_may_complete() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let other = test_actor(Role::Clinician);
        let admin = test_actor(Role::Admin);

        let record = store
            .create(CanonicalId::generate(), &author, complete_payloads())
            .expect("create");

        assert!(matches!(
            lifecycle.transition(&record.meta.id, LifecycleState::Complete, &other),
            Err(RecordError::Forbidden(_))
        ));
        lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &admin)
            .expect("admin may complete");
    }

    #[test]
    fn clinician_cannot_review() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &author, complete_payloads())
            .expect("create");
        lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &author)
            .expect("complete");

        assert!(matches!(
            lifecycle.transition(&record.meta.id, LifecycleState::Reviewed, &author),
            Err(RecordError::Forbidden(_))
        ));
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let record = store
            .create(CanonicalId::generate(), &author, complete_payloads())
            .expect("create");

        assert!(matches!(
            lifecycle.transition(&record.meta.id, LifecycleState::Reviewed, &author),
            Err(RecordError::InvalidTransition {
                from: LifecycleState::Draft,
                to: LifecycleState::Reviewed,
            })
        ));
    }

    #[test]
    fn reviewed_record_is_sealed_until_admin_reopens() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);
        let reviewer = test_actor(Role::Reviewer);
        let admin = test_actor(Role::Admin);

        let record = store
            .create(CanonicalId::generate(), &author, complete_payloads())
            .expect("create");
        lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &author)
            .expect("complete");
        lifecycle
            .transition(&record.meta.id, LifecycleState::Reviewed, &reviewer)
            .expect("review");

        let err = store
            .update_section(
                &record.meta.id,
                SectionPayload::ChiefComplaint(ChiefComplaintSection {
                    complaint: Some("new complaint".into()),
                    ..Default::default()
                }),
                &author,
                None,
            )
            .expect_err("sealed record must reject edits");
        assert!(matches!(err, RecordError::Forbidden(_)));

        assert!(matches!(
            lifecycle.reopen(&record.meta.id, &reviewer),
            Err(RecordError::Forbidden(_))
        ));

        let reopened = lifecycle
            .reopen(&record.meta.id, &admin)
            .expect("admin reopen");
        assert_eq!(reopened.meta.state, LifecycleState::Draft);
        assert_eq!(reopened.meta.version, 4);

        store
            .update_section(
                &record.meta.id,
                SectionPayload::ChiefComplaint(ChiefComplaintSection {
                    complaint: Some("new complaint".into()),
                    ..Default::default()
                }),
                &author,
                None,
            )
            .expect("reopened record is editable again");
    }

    // Full pass over a record's life: create, edit identification, a premature
    // completion attempt, edit chief complaint, then completion. The version advances
    // by exactly one per accepted mutation and rejected operations leave no trace.
    #[test]
    fn record_version_counts_accepted_mutations() {
        let (_tmp, store, lifecycle) = setup();
        let author = test_actor(Role::Clinician);

        let record = store
            .create(CanonicalId::generate(), &author, vec![])
            .expect("create");
        assert_eq!(record.meta.version, 1);

        let record = store
            .update_section(
                &record.meta.id,
                SectionPayload::Identification(IdentificationSection {
                    first_name: Some("Ana".into()),
                    paternal_surname: Some("Ruiz".into()),
                    maternal_surname: Some("García".into()),
                    ..Default::default()
                }),
                &author,
                Some(1),
            )
            .expect("identification edit");
        assert_eq!(record.meta.version, 2);

        // Chief complaint still missing, so completion is rejected without a version bump.
        assert!(matches!(
            lifecycle.transition(&record.meta.id, LifecycleState::Complete, &author),
            Err(RecordError::IncompleteRecord(_))
        ));

        let record = store
            .update_section(
                &record.meta.id,
                SectionPayload::ChiefComplaint(ChiefComplaintSection {
                    complaint: Some("sensitivity to cold in upper left molar".into()),
                    pain_scale: Some(4),
                    ..Default::default()
                }),
                &author,
                Some(2),
            )
            .expect("chief complaint edit");
        assert_eq!(record.meta.version, 3);

        let record = lifecycle
            .transition(&record.meta.id, LifecycleState::Complete, &author)
            .expect("complete");
        assert_eq!(record.meta.version, 4);
        assert_eq!(record.meta.state, LifecycleState::Complete);

        let trail = store.audit().list(&record.meta.id).expect("audit");
        assert_eq!(trail.len(), 4);
        let edits = trail
            .iter()
            .filter(|e| e.action == AuditAction::EditSection)
            .count();
        assert_eq!(edits, 2);
        assert_eq!(trail[0].action, AuditAction::TransitionState);
    }

    #[test]
    fn reopening_a_draft_is_rejected() {
        let (_tmp, store, lifecycle) = setup();
        let admin = test_actor(Role::Admin);
        let record = store
            .create(CanonicalId::generate(), &admin, vec![])
            .expect("create");

        assert!(matches!(
            lifecycle.reopen(&record.meta.id, &admin),
            Err(RecordError::InvalidTransition { .. })
        ));
    }
}
