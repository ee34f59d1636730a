//! Versioned record repositories with Git-based history.
//!
//! Each clinical record lives in its own local Git repository. Every accepted
//! mutation becomes exactly one commit containing only the files that mutation
//! touched, with a structured commit message naming the action and the acting
//! clinician. Nothing is ever rewritten; the full edit history of a record is
//! recoverable from its repository even though the canonical files only hold the
//! latest values.
//!
//! Atomicity is handled here: a mutation's file writes (both inside the repository
//! and side files such as audit entries and index updates) are staged with their
//! prior content captured, and on any failure — including a failed commit — every
//! staged write is rolled back so the record is left exactly as it was.
//!
//! All repositories standardise on `refs/heads/main`.

use crate::actor::Actor;
use crate::error::{RecordError, RecordResult};
use crate::sections::SectionId;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MAIN_REF: &str = "refs/heads/main";

/// Controlled vocabulary of record mutations, used in commit subjects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommitAction {
    Create,
    Update,
    Transition,
    Reopen,
}

impl CommitAction {
    fn as_str(&self) -> &'static str {
        match self {
            CommitAction::Create => "create",
            CommitAction::Update => "update",
            CommitAction::Transition => "transition",
            CommitAction::Reopen => "reopen",
        }
    }
}

/// Structured commit message for record mutations.
///
/// Rendered as `record: <action> [section]` followed by trailers identifying the
/// acting clinician, so repository history is queryable without external context.
#[derive(Clone, Debug)]
pub(crate) struct CommitMessage {
    pub action: CommitAction,
    pub section: Option<SectionId>,
    pub detail: Option<String>,
}

impl CommitMessage {
    pub(crate) fn render(&self, actor: &Actor) -> String {
        let mut subject = format!("record: {}", self.action.as_str());
        if let Some(section) = self.section {
            subject.push(' ');
            subject.push_str(section.as_str());
        }
        if let Some(detail) = &self.detail {
            subject.push_str(" (");
            subject.push_str(detail);
            subject.push(')');
        }

        format!(
            "{subject}\n\nActor-Id: {id}\nActor-Role: {role}",
            id = actor.id,
            role = actor.role
        )
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record: {}", self.action.as_str())
    }
}

/// A file to be written inside the record repository and committed.
#[derive(Debug, Clone)]
pub(crate) struct FileToWrite<'a> {
    /// Path relative to the repository workdir.
    pub relative_path: &'a Path,
    /// New content.
    pub content: &'a str,
    /// Previous content for rollback. `None` if the file is new.
    pub old_content: Option<&'a str>,
}

/// A file written in the same transaction but living outside the repository
/// (audit entries, index files). Rolled back with the repository files, never
/// committed to Git.
#[derive(Debug, Clone)]
pub(crate) struct SideFile {
    pub path: PathBuf,
    pub content: String,
    /// Previous content for rollback. `None` if the file is new.
    pub old_content: Option<String>,
}

/// Handle over one record's Git repository.
pub(crate) struct VersionedRepo {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedRepo {
    /// Initialise a new repository at `workdir`.
    pub(crate) fn init(workdir: &Path) -> RecordResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(RecordError::GitInit)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                RecordError::GitInit(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    /// Open an existing repository at exactly `workdir`.
    ///
    /// `NO_SEARCH` stops git2 from walking up to a parent `.git`, which matters for
    /// record isolation: a missing record must never resolve to some enclosing repo.
    pub(crate) fn open(workdir: &Path) -> RecordResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(RecordError::GitOpen)?;
        let actual_workdir = repo
            .workdir()
            .ok_or_else(|| {
                RecordError::GitOpen(git2::Error::from_str("repository has no working directory"))
            })?
            .to_path_buf();
        Ok(Self {
            repo,
            workdir: actual_workdir,
        })
    }

    fn ensure_main_head(&self) -> RecordResult<()> {
        self.repo.set_head(MAIN_REF).map_err(RecordError::GitSetHead)
    }

    fn resolve_head_parents(&self) -> RecordResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(RecordError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(RecordError::GitHead(e)),
        }
    }

    /// Create a commit containing only `relative_paths`.
    fn commit_paths(
        &self,
        actor: &Actor,
        message: &str,
        relative_paths: &[PathBuf],
    ) -> RecordResult<git2::Oid> {
        self.ensure_main_head()?;
        let mut index = self.repo.index().map_err(RecordError::GitIndex)?;

        for path in relative_paths {
            if path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(RecordError::InvalidInput(
                    "path must not contain parent directory references (..)".into(),
                ));
            }
            index.add_path(path).map_err(RecordError::GitAdd)?;
        }

        let tree_id = index.write_tree().map_err(RecordError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(RecordError::GitFindTree)?;

        let sig = git2::Signature::now(actor.name.as_str(), actor.email.as_str())
            .map_err(RecordError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(RecordError::GitCommit)
    }

    /// Writes repository files plus side files and commits the repository files,
    /// rolling everything back on failure.
    ///
    /// On error:
    /// - files that previously existed are restored to their previous content
    /// - new files are removed
    /// - directories created during this operation are removed
    pub(crate) fn write_and_commit(
        repo_path: &Path,
        actor: &Actor,
        msg: &CommitMessage,
        files: &[FileToWrite],
        side_files: &[SideFile],
    ) -> RecordResult<()> {
        let repo = Self::open(repo_path)?;

        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: RecordResult<()> = (|| {
            // Collect every missing parent directory, shallowest first, so creation
            // order is valid and rollback (reversed) removes deepest first.
            let mut dirs_needed: HashSet<PathBuf> = HashSet::new();
            let targets: Vec<PathBuf> = files
                .iter()
                .map(|f| repo.workdir.join(f.relative_path))
                .chain(side_files.iter().map(|s| s.path.clone()))
                .collect();
            for target in &targets {
                let mut current = target.parent();
                while let Some(dir) = current {
                    if dir.as_os_str().is_empty() || dir.exists() {
                        break;
                    }
                    dirs_needed.insert(dir.to_path_buf());
                    current = dir.parent();
                }
            }
            let mut dirs_to_create: Vec<PathBuf> = dirs_needed.into_iter().collect();
            dirs_to_create.sort_by_key(|p| p.components().count());

            for dir in &dirs_to_create {
                fs::create_dir(dir).map_err(RecordError::FileWrite)?;
                created_dirs.push(dir.clone());
            }

            for file in files {
                let full_path = repo.workdir.join(file.relative_path);
                fs::write(&full_path, file.content).map_err(RecordError::FileWrite)?;
                written.push((full_path, file.old_content.map(str::to_string)));
            }
            for side in side_files {
                fs::write(&side.path, &side.content).map_err(RecordError::FileWrite)?;
                written.push((side.path.clone(), side.old_content.clone()));
            }

            let paths: Vec<PathBuf> = files
                .iter()
                .map(|f| f.relative_path.to_path_buf())
                .collect();
            repo.commit_paths(actor, &msg.render(actor), &paths)?;

            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(write_error) => {
                for (path, old_content) in written.iter().rev() {
                    match old_content {
                        Some(contents) => {
                            let _ = fs::write(path, contents);
                        }
                        None => {
                            let _ = fs::remove_file(path);
                        }
                    }
                }
                for dir in created_dirs.iter().rev() {
                    let _ = fs::remove_dir(dir);
                }
                Err(write_error)
            }
        }
    }

    /// Initialise a repository, write and commit initial files, and remove the whole
    /// record directory if anything fails.
    ///
    /// Record creation is all-or-nothing: either the repository exists with its first
    /// commit, or no trace of the record remains.
    pub(crate) fn init_and_commit(
        record_dir: &Path,
        actor: &Actor,
        message: &CommitMessage,
        files: &[FileToWrite],
        side_files: &[SideFile],
    ) -> RecordResult<()> {
        let result: RecordResult<()> = (|| {
            let _repo = Self::init(record_dir)?;
            Self::write_and_commit(record_dir, actor, message, files, side_files)?;
            Ok(())
        })();

        match result {
            Ok(()) => Ok(()),
            Err(create_error) => {
                // Side files were already rolled back by write_and_commit; only the
                // freshly initialised repository directory is left to clean up.
                if let Err(cleanup_error) = remove_record_dir(record_dir) {
                    return Err(RecordError::CleanupAfterCreateFailed {
                        path: record_dir.to_path_buf(),
                        create_error: Box::new(create_error),
                        cleanup_error,
                    });
                }
                Err(create_error)
            }
        }
    }
}

fn remove_record_dir(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    Ok(())
}
