//! Content-addressed export artifact storage for DCR.
//!
//! Every export of a clinical record produces an immutable artifact: the rendered byte
//! stream plus a metadata sidecar describing it. This crate owns both.
//!
//! ## Design principles
//!
//! - Artifact bytes and artifact metadata are deliberately separated
//! - Bytes are stored content-addressed by SHA-256 and are immutable once written
//! - Identical content is stored once; re-exporting an unchanged record reuses the blob
//! - Metadata entries are append-only per record, numbered by an export sequence
//! - Metadata references a record by identifier only, so artifact history survives
//!   the record itself being deleted
//!
//! ## Storage layout
//!
//! ```text
//! <artifacts_root>/
//! ├── blobs/
//! │   └── sha256/
//! │       └── ab/              # first two hex characters of the hash
//! │           └── ab3f9e…      # full hash as filename
//! └── meta/
//!     └── <s1>/<s2>/<record_id>/
//!         ├── 00000001.yaml    # one sidecar per export, in export order
//!         └── 00000002.yaml
//! ```
//!
//! Content addressing gives deduplication (identical exports share one blob),
//! integrity (bytes can be re-hashed and compared via [`ArtifactStore::verify`]) and
//! deterministic paths (same content, same location).

mod hash;
mod store;

pub use hash::Sha256Hash;
pub use store::{ArtifactMetadata, ArtifactStore, StoredBlob};

/// Errors that can occur during artifact operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Artifacts root directory could not be created or is not a directory.
    #[error("invalid artifacts root: {0}")]
    InvalidRoot(String),

    /// A hash string was not 64 lowercase hex characters.
    #[error("invalid sha-256 hash: '{0}'")]
    InvalidHash(String),

    /// A blob referenced by metadata is missing from storage.
    #[error("artifact blob {0} not found in storage")]
    BlobNotFound(String),

    /// A metadata sidecar could not be serialized or parsed.
    #[error("artifact metadata error: {0}")]
    Metadata(#[from] serde_yaml::Error),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;
