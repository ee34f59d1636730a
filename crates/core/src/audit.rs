//! Append-only audit trail.
//!
//! Every mutating operation on a record — and every export — produces exactly one
//! [`AuditEntry`], written in the same transaction as the mutation itself. Entries are
//! immutable JSON files stored under a sharded directory *outside* the record's
//! repository, so the trail survives even if the record is later deleted (regulatory
//! retention).
//!
//! The canonical record only ever holds the latest values; historical values are
//! recoverable only through this log, which is why each entry carries the section
//! payload exactly as submitted.

use crate::actor::{Actor, Role};
use crate::error::{RecordError, RecordResult};
use crate::sections::SectionId;
use crate::versioned::SideFile;
use chrono::{DateTime, Utc};
use dcr_types::CanonicalId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// What happened to the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Create,
    EditSection,
    TransitionState,
    /// Admin reversal of an apparent sign-off. Deliberately distinct from
    /// `transition-state` so reopens are findable at a glance.
    Reopen,
    Export,
    View,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::EditSection => "edit-section",
            AuditAction::TransitionState => "transition-state",
            AuditAction::Reopen => "reopen",
            AuditAction::Export => "export",
            AuditAction::View => "view",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub record_id: CanonicalId,
    pub actor_id: CanonicalId,
    pub actor_role: Role,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionId>,
    pub timestamp: DateTime<Utc>,
    /// The section payload exactly as submitted, for edit actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        record_id: CanonicalId,
        actor: &Actor,
        action: AuditAction,
        section: Option<SectionId>,
        snapshot: Option<serde_json::Value>,
    ) -> Self {
        Self {
            record_id,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action,
            section,
            timestamp: Utc::now(),
            snapshot,
        }
    }
}

/// Writer and reader for per-record audit trails.
#[derive(Clone, Debug)]
pub struct AuditRecorder {
    audit_root: PathBuf,
}

impl AuditRecorder {
    pub fn new(audit_root: PathBuf) -> Self {
        Self { audit_root }
    }

    fn record_dir(&self, record_id: &CanonicalId) -> PathBuf {
        record_id.sharded_dir(&self.audit_root)
    }

    fn next_sequence(&self, record_id: &CanonicalId) -> RecordResult<u32> {
        let dir = self.record_dir(record_id);
        if !dir.exists() {
            return Ok(1);
        }

        let mut max = 0u32;
        for entry in fs::read_dir(&dir).map_err(RecordError::FileRead)? {
            let entry = entry.map_err(RecordError::FileRead)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(seq) = name.split('-').next().and_then(|s| s.parse::<u32>().ok()) {
                max = max.max(seq);
            }
        }
        Ok(max + 1)
    }

    /// Serializes `entry` into a staged write for the owning transaction.
    ///
    /// The file is not written here; it becomes part of the mutation's staged file
    /// set so the audit write commits and rolls back with the record mutation.
    pub(crate) fn prepare(&self, entry: &AuditEntry) -> RecordResult<SideFile> {
        let seq = self.next_sequence(&entry.record_id)?;
        let path = self
            .record_dir(&entry.record_id)
            .join(format!("{seq:08}-{}.json", entry.action.as_str()));
        let content =
            serde_json::to_string_pretty(entry).map_err(RecordError::JsonSerialization)?;
        Ok(SideFile {
            path,
            content,
            old_content: None,
        })
    }

    /// Appends an entry immediately, outside any record mutation.
    ///
    /// Used for `view` entries, which observe a record without changing it and so
    /// have no transaction to join.
    pub fn append(&self, entry: &AuditEntry) -> RecordResult<()> {
        let staged = self.prepare(entry)?;
        if let Some(parent) = staged.path.parent() {
            fs::create_dir_all(parent).map_err(RecordError::FileWrite)?;
        }
        fs::write(&staged.path, staged.content).map_err(RecordError::FileWrite)
    }

    /// Lists all entries for a record in reverse-chronological order.
    ///
    /// Unreadable entries are logged and skipped rather than failing the whole
    /// listing; one corrupt file must not hide the rest of the trail.
    pub fn list(&self, record_id: &CanonicalId) -> RecordResult<Vec<AuditEntry>> {
        let dir = self.record_dir(record_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&dir).map_err(RecordError::FileRead)? {
            let entry = entry.map_err(RecordError::FileRead)?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        // Filenames are zero-padded sequence first, so lexicographic descending is
        // reverse insertion order.
        names.sort();
        names.reverse();

        let mut entries = Vec::new();
        for name in names {
            let path = dir.join(&name);
            let contents = fs::read_to_string(&path).map_err(RecordError::FileRead)?;
            match serde_json::from_str::<AuditEntry>(&contents) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("skipping unreadable audit entry {}: {}", path.display(), e);
                }
            }
        }
        Ok(entries)
    }
}
