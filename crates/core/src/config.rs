//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core services.
//! Nothing in this crate reads environment variables during request handling; doing so
//! leads to inconsistent behaviour in multi-threaded runtimes and test harnesses.

use crate::error::{RecordError, RecordResult};
use std::path::{Path, PathBuf};

const RECORDS_DIR_NAME: &str = "records";
const AUDIT_DIR_NAME: &str = "audit";
const ARTIFACTS_DIR_NAME: &str = "artifacts";
const INDEX_DIR_NAME: &str = "index";

/// Core configuration resolved at startup.
///
/// All storage roots are derived from a single data directory:
///
/// ```text
/// <data_dir>/records/     per-record versioned repositories
/// <data_dir>/audit/       append-only audit entries, outside the record repos
/// <data_dir>/artifacts/   content-addressed export artifacts
/// <data_dir>/index/       uniqueness indexes
/// ```
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig` rooted at `data_dir`.
    ///
    /// The directory does not need to exist yet; services create their own
    /// subdirectories on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidInput`] if `data_dir` is empty, or exists and is
    /// not a directory.
    pub fn new(data_dir: PathBuf) -> RecordResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(RecordError::InvalidInput(
                "data directory cannot be empty".into(),
            ));
        }
        if data_dir.exists() && !data_dir.is_dir() {
            return Err(RecordError::InvalidInput(format!(
                "data directory path is not a directory: {}",
                data_dir.display()
            )));
        }
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join(RECORDS_DIR_NAME)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join(AUDIT_DIR_NAME)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join(ARTIFACTS_DIR_NAME)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join(INDEX_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derives_storage_roots_from_data_dir() {
        let cfg = CoreConfig::new(PathBuf::from("/tmp/dcr")).expect("config should build");
        assert_eq!(cfg.records_dir(), PathBuf::from("/tmp/dcr/records"));
        assert_eq!(cfg.audit_dir(), PathBuf::from("/tmp/dcr/audit"));
        assert_eq!(cfg.artifacts_dir(), PathBuf::from("/tmp/dcr/artifacts"));
        assert_eq!(cfg.index_dir(), PathBuf::from("/tmp/dcr/index"));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(CoreConfig::new(PathBuf::new()).is_err());
    }

    #[test]
    fn rejects_file_as_data_dir() {
        let tmp = TempDir::new().expect("temp dir");
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").expect("write file");
        assert!(CoreConfig::new(file).is_err());
    }
}
