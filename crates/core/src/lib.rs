//! Core domain logic for DCR, the dental clinical record service.
//!
//! This crate owns the clinical record aggregate end to end:
//!
//! - [`store::RecordStore`] persists each record as YAML files in its own Git
//!   repository, with optimistic versioning and atomic commit-plus-audit writes
//! - [`sections`] defines the eight fixed sections and their merge semantics
//! - [`validate`] enforces per-field ranges and record completeness
//! - [`derived`] computes age and BMI from their source fields on demand
//! - [`lifecycle::LifecycleManager`] runs the draft / complete / reviewed state
//!   machine with role gating
//! - [`audit::AuditRecorder`] keeps an append-only trail per record, stored outside
//!   the record repository so it survives record deletion
//! - [`search::SearchEngine`] matches patient names and identification numbers
//! - [`export::ExportPipeline`] renders records into content-addressed artifacts
//!
//! The crate is deliberately free of any transport or UI concern; the CLI (and any
//! future API surface) composes these services on top.

pub mod actor;
pub mod audit;
pub mod config;
pub mod derived;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod record;
pub mod search;
pub mod sections;
pub mod store;
pub mod validate;

mod versioned;

pub use actor::{Actor, Role};
pub use audit::{AuditAction, AuditEntry, AuditRecorder};
pub use config::CoreConfig;
pub use error::{FieldViolation, RecordError, RecordResult};
pub use export::{ExportOutcome, ExportPipeline, MarkupRenderer, Renderer};
pub use lifecycle::LifecycleManager;
pub use record::{ClinicalRecord, DerivedFields, LifecycleState, RecordMeta};
pub use search::{SearchCriteria, SearchEngine};
pub use sections::{SectionId, SectionPayload, Sections};
pub use store::{Paged, Pagination, RecordStore};
