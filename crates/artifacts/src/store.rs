//! Artifact storage service implementation.
//!
//! [`ArtifactStore`] manages the two halves of an export artifact: the content-addressed
//! byte blob and the per-record metadata sidecar. Blob writes are idempotent (identical
//! content maps to the same path and is written once); metadata sidecars are write-once
//! and numbered by an export sequence so that per-record history is totally ordered.
//!
//! The store is deliberately unaware of clinical record internals. It deals in record
//! identifiers and byte streams only, which keeps artifact retention independent of a
//! record's continued existence.

use crate::{ArtifactError, ArtifactResult, Sha256Hash};
use chrono::{DateTime, Utc};
use dcr_types::{CanonicalId, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BLOBS_DIR: &str = "blobs";
const META_DIR: &str = "meta";
const HASH_ALGORITHM: &str = "sha256";

/// Result of storing artifact bytes in content-addressed storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// SHA-256 digest of the stored bytes.
    pub hash: Sha256Hash,
    /// Size of the stored bytes.
    pub byte_size: u64,
    /// Blob location relative to the artifacts root.
    pub relative_path: String,
    /// `true` if an identical blob already existed and was reused.
    pub reused: bool,
}

/// Metadata sidecar for one export artifact.
///
/// Serialised to YAML and stored under the owning record's metadata directory. The
/// sidecar is immutable once written; a newer export supersedes it only by carrying a
/// higher sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Identifier of the record this artifact was exported from.
    pub record_id: CanonicalId,
    /// Export sequence for this record, starting at 1.
    pub sequence: u32,
    /// Hashing algorithm used (always "sha256" for the current implementation).
    pub hash_algorithm: NonEmptyText,
    /// Hex digest of the artifact content.
    pub content_hash: Sha256Hash,
    /// Size of the artifact in bytes.
    pub byte_size: u64,
    /// Detected media type, if any. Best-effort, not authoritative.
    pub media_type: Option<NonEmptyText>,
    /// Blob location relative to the artifacts root.
    pub storage_path: NonEmptyText,
    /// UTC timestamp when the artifact was stored.
    pub created_at: DateTime<Utc>,
}

/// Store for export artifacts: content-addressed blobs plus per-record metadata.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens (creating if necessary) an artifact store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::InvalidRoot`] if `root` exists but is not a directory,
    /// or if the directory cannot be created.
    pub fn open(root: &Path) -> ArtifactResult<Self> {
        if root.exists() && !root.is_dir() {
            return Err(ArtifactError::InvalidRoot(format!(
                "path is not a directory: {}",
                root.display()
            )));
        }
        fs::create_dir_all(root).map_err(|e| {
            ArtifactError::InvalidRoot(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn blob_relative_path(hash: &Sha256Hash) -> PathBuf {
        Path::new(BLOBS_DIR)
            .join(HASH_ALGORITHM)
            .join(hash.shard_prefix())
            .join(hash.as_str())
    }

    fn meta_dir(&self, record_id: &CanonicalId) -> PathBuf {
        record_id.sharded_dir(&self.root.join(META_DIR))
    }

    fn meta_path(&self, record_id: &CanonicalId, sequence: u32) -> PathBuf {
        self.meta_dir(record_id).join(format!("{sequence:08}.yaml"))
    }

    /// Stores `bytes` in content-addressed storage.
    ///
    /// Identical content maps to the same blob path; if the blob already exists it is
    /// left untouched and reported as reused. This is what makes re-exporting an
    /// unchanged record cheap and verifiably identical.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] if directory creation or the blob write fails.
    pub fn store_blob(&self, bytes: &[u8]) -> ArtifactResult<StoredBlob> {
        let hash = Sha256Hash::digest(bytes);
        let relative = Self::blob_relative_path(&hash);
        let full = self.root.join(&relative);

        let reused = full.exists();
        if !reused {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full, bytes)?;
        }

        Ok(StoredBlob {
            hash,
            byte_size: bytes.len() as u64,
            relative_path: relative.to_string_lossy().into_owned(),
            reused,
        })
    }

    /// Builds the metadata sidecar for a freshly stored blob.
    ///
    /// The sequence is one greater than the newest existing sidecar for the record.
    pub fn metadata_for(
        &self,
        record_id: &CanonicalId,
        blob: &StoredBlob,
        bytes: &[u8],
    ) -> ArtifactResult<ArtifactMetadata> {
        let media_type = infer::get(bytes)
            .map(|kind| kind.mime_type().to_string())
            .or_else(|| {
                // infer only knows binary magic numbers; fall back for textual output.
                std::str::from_utf8(bytes).ok().map(|_| "text/plain".into())
            })
            .and_then(|mime| NonEmptyText::new(mime).ok());

        Ok(ArtifactMetadata {
            record_id: record_id.clone(),
            sequence: self.next_sequence(record_id)?,
            hash_algorithm: NonEmptyText::new(HASH_ALGORITHM)
                .expect("constant algorithm name is non-empty"),
            content_hash: blob.hash.clone(),
            byte_size: blob.byte_size,
            media_type,
            storage_path: NonEmptyText::new(&blob.relative_path)
                .expect("blob path is never empty"),
            created_at: Utc::now(),
        })
    }

    /// Returns the next export sequence number for `record_id` (1 for the first export).
    pub fn next_sequence(&self, record_id: &CanonicalId) -> ArtifactResult<u32> {
        Ok(self.max_sequence(record_id)? + 1)
    }

    fn max_sequence(&self, record_id: &CanonicalId) -> ArtifactResult<u32> {
        let dir = self.meta_dir(record_id);
        if !dir.exists() {
            return Ok(0);
        }

        let mut max = 0u32;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(seq) = stem.parse::<u32>() {
                max = max.max(seq);
            }
        }
        Ok(max)
    }

    /// Writes a metadata sidecar. Write-once: an existing sidecar for the same
    /// sequence is never overwritten.
    ///
    /// Returns the absolute path of the written sidecar so callers coordinating a
    /// larger transaction can roll the write back.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] if the sidecar already exists or cannot be
    /// written, [`ArtifactError::Metadata`] if serialization fails.
    pub fn write_metadata(&self, meta: &ArtifactMetadata) -> ArtifactResult<PathBuf> {
        let path = self.meta_path(&meta.record_id, meta.sequence);
        if path.exists() {
            return Err(ArtifactError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("artifact metadata already exists: {}", path.display()),
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(meta)?;
        fs::write(&path, yaml)?;
        Ok(path)
    }

    /// Lists all artifacts for a record, newest first. The first entry is the
    /// record's "current" export.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] on directory read failure,
    /// [`ArtifactError::Metadata`] if a sidecar cannot be parsed.
    pub fn history(&self, record_id: &CanonicalId) -> ArtifactResult<Vec<ArtifactMetadata>> {
        let dir = self.meta_dir(record_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let contents = fs::read_to_string(entry.path())?;
            let meta: ArtifactMetadata = serde_yaml::from_str(&contents)?;
            entries.push(meta);
        }

        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(entries)
    }

    /// Reads artifact bytes back from content-addressed storage.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::BlobNotFound`] if no blob exists for `hash`.
    pub fn read_blob(&self, hash: &Sha256Hash) -> ArtifactResult<Vec<u8>> {
        let path = self.root.join(Self::blob_relative_path(hash));
        if !path.exists() {
            return Err(ArtifactError::BlobNotFound(hash.to_string()));
        }
        Ok(fs::read(path)?)
    }

    /// Re-hashes a stored blob and compares it with the recorded content hash.
    ///
    /// Returns `true` when the stored bytes still match the metadata.
    pub fn verify(&self, meta: &ArtifactMetadata) -> ArtifactResult<bool> {
        let bytes = self.read_blob(&meta.content_hash)?;
        Ok(Sha256Hash::digest(&bytes) == meta.content_hash && bytes.len() as u64 == meta.byte_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let tmp = TempDir::new().expect("temp dir");
        let store = ArtifactStore::open(&tmp.path().join("artifacts")).expect("open store");
        (tmp, store)
    }

    fn record_id() -> CanonicalId {
        CanonicalId::parse("aabbccddeeff00112233445566778899").expect("canonical id")
    }

    #[test]
    fn store_blob_is_idempotent_for_identical_content() {
        let (_tmp, store) = store();

        let first = store.store_blob(b"# Clinical record\n").expect("first store");
        let second = store.store_blob(b"# Clinical record\n").expect("second store");

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.hash, second.hash);
        assert_eq!(first.relative_path, second.relative_path);
    }

    #[test]
    fn metadata_sequence_increments_per_record() {
        let (_tmp, store) = store();
        let id = record_id();

        let blob = store.store_blob(b"export one").expect("store blob");
        let meta1 = store.metadata_for(&id, &blob, b"export one").expect("meta");
        assert_eq!(meta1.sequence, 1);
        store.write_metadata(&meta1).expect("write meta 1");

        let blob2 = store.store_blob(b"export two").expect("store blob");
        let meta2 = store.metadata_for(&id, &blob2, b"export two").expect("meta");
        assert_eq!(meta2.sequence, 2);
        store.write_metadata(&meta2).expect("write meta 2");
    }

    #[test]
    fn metadata_is_write_once() {
        let (_tmp, store) = store();
        let id = record_id();

        let blob = store.store_blob(b"export").expect("store blob");
        let meta = store.metadata_for(&id, &blob, b"export").expect("meta");
        store.write_metadata(&meta).expect("first write");
        assert!(store.write_metadata(&meta).is_err());
    }

    #[test]
    fn history_is_newest_first() {
        let (_tmp, store) = store();
        let id = record_id();

        for content in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()] {
            let blob = store.store_blob(content).expect("store blob");
            let meta = store.metadata_for(&id, &blob, content).expect("meta");
            store.write_metadata(&meta).expect("write meta");
        }

        let history = store.history(&id).expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sequence, 3);
        assert_eq!(history[2].sequence, 1);
    }

    #[test]
    fn verify_detects_intact_and_tampered_blobs() {
        let (_tmp, store) = store();
        let id = record_id();

        let bytes = b"rendered record";
        let blob = store.store_blob(bytes).expect("store blob");
        let meta = store.metadata_for(&id, &blob, bytes).expect("meta");
        store.write_metadata(&meta).expect("write meta");

        assert!(store.verify(&meta).expect("verify"));

        // Tamper with the blob on disk.
        let blob_path = store.root.join(ArtifactStore::blob_relative_path(&blob.hash));
        fs::write(&blob_path, b"tampered").expect("tamper");
        assert!(!store.verify(&meta).expect("verify tampered"));
    }

    #[test]
    fn read_blob_fails_for_unknown_hash() {
        let (_tmp, store) = store();
        let missing = Sha256Hash::digest(b"never stored");
        assert!(matches!(
            store.read_blob(&missing),
            Err(ArtifactError::BlobNotFound(_))
        ));
    }

    #[test]
    fn textual_output_gets_a_text_media_type() {
        let (_tmp, store) = store();
        let id = record_id();

        let bytes = b"plain markup output";
        let blob = store.store_blob(bytes).expect("store blob");
        let meta = store.metadata_for(&id, &blob, bytes).expect("meta");
        assert_eq!(
            meta.media_type.as_ref().map(|m| m.as_str()),
            Some("text/plain")
        );
    }
}
