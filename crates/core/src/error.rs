use crate::record::LifecycleState;
use std::fmt;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field, e.g. `chief-complaint.pain_scale`.
    pub field: String,
    /// Human-readable description of the rule that failed.
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error taxonomy for the clinical record core.
///
/// The first group mirrors the boundary contract surfaced to callers (validation,
/// not-found, forbidden, conflict, lifecycle preconditions, render failure). The
/// remaining variants are storage-level failures; they are kept distinct rather than
/// collapsed into the caller-facing taxonomy so that nothing is silently reclassified.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("version conflict: expected version {expected}, record is at version {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("identification number '{0}' is already registered to another record")]
    DuplicateIdentification(String),

    #[error("record is incomplete: missing {}", .0.join(", "))]
    IncompleteRecord(Vec<String>),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("renderer failed: {0}")]
    RenderFailure(String),

    #[error("failed to create record directory: {0}")]
    RecordDirCreation(std::io::Error),

    #[error(
        "create failed and cleanup also failed (path: {path}): create={create_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterCreateFailed {
        path: std::path::PathBuf,
        #[source]
        create_error: Box<RecordError>,
        cleanup_error: std::io::Error,
    },

    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),

    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),

    #[error("failed to serialize record data: {0}")]
    YamlSerialization(serde_yaml::Error),

    #[error("failed to deserialize record data: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("failed to serialize JSON: {0}")]
    JsonSerialization(serde_json::Error),

    #[error("failed to deserialize JSON: {0}")]
    JsonDeserialization(serde_json::Error),

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),

    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),

    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),

    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),

    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),

    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),

    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),

    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),

    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),

    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),

    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),

    #[error("artifact storage error: {0}")]
    Artifact(#[from] dcr_artifacts::ArtifactError),

    #[error("invalid identifier: {0}")]
    Id(#[from] dcr_types::TypeError),
}

impl RecordError {
    /// Convenience constructor for a single-violation validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// True for the two conflict shapes a caller should re-read and retry on.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::DuplicateIdentification(_)
        )
    }
}

/// Result type for clinical record operations.
pub type RecordResult<T> = std::result::Result<T, RecordError>;
