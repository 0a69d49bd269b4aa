//! Corpus assembler: copies allow-listed files out of local clones.
//!
//! The corpus mirrors the clone layout (`<owner>/<name>/...`) under the
//! target directory. Hidden entries (names starting with `.`) are pruned at
//! every depth below the clone root, so `.git` and similar trees are never
//! walked. Symlinks are not followed during the walk; a file symlink is
//! copied only when it resolves to a regular file inside the same clone.

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::harvest::result_set::ResultSet;
use crate::harvest::traits::AssembleError;
use crate::model::RepoId;

/// How to treat a result row whose clone directory does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingClonePolicy {
    /// Log and continue
    #[default]
    Skip,
    /// Abort with [`AssembleError::MissingClone`]
    Fail,
}

/// Suffix allow-list for file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-sensitive suffix match: `main.q` matches `.q`, `main.qq` does not.
    pub fn matches(&self, file_name: &str) -> bool {
        self.allowed.iter().any(|ext| file_name.ends_with(ext.as_str()))
    }
}

pub fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Whether the symlink at `link` resolves to a regular file under `root`.
///
/// `root` must already be canonical. Dangling links resolve to nothing and
/// are rejected.
fn link_stays_inside(link: &Path, root: &Path) -> bool {
    match link.canonicalize() {
        Ok(target) => target.starts_with(root) && target.is_file(),
        Err(_) => false,
    }
}

/// Counters for one assembly run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssembleReport {
    pub repositories: usize,
    pub files_copied: usize,
    /// Rows skipped because their clone directory does not exist
    pub missing: usize,
}

#[derive(Debug, Clone)]
pub struct CorpusAssembler {
    repos_dir: PathBuf,
    target_dir: PathBuf,
    filter: ExtensionFilter,
    missing: MissingClonePolicy,
}

impl CorpusAssembler {
    pub fn new(
        repos_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        filter: ExtensionFilter,
    ) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            target_dir: target_dir.into(),
            filter,
            missing: MissingClonePolicy::Skip,
        }
    }

    pub fn with_missing_policy(mut self, policy: MissingClonePolicy) -> Self {
        self.missing = policy;
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Copies matching files of every distinct repository in `results`,
    /// most-starred first.
    ///
    /// # Errors
    ///
    /// Any walk or copy failure aborts the run. A missing clone aborts it
    /// only under [`MissingClonePolicy::Fail`].
    pub fn assemble(&self, results: &ResultSet) -> Result<AssembleReport, AssembleError> {
        let mut report = AssembleReport::default();

        for (index, id) in results.sorted_by_stars().unique_ids().iter().enumerate() {
            info!(index, repo = %id, "Processing repository");
            match self.copy_repo(id)? {
                Some(copied) => {
                    report.repositories += 1;
                    report.files_copied += copied;
                }
                None => report.missing += 1,
            }
        }

        info!(
            repositories = report.repositories,
            files = report.files_copied,
            missing = report.missing,
            "Done"
        );
        Ok(report)
    }

    /// Copies matching files of one clone. Returns `None` if the clone is
    /// missing and the policy allows skipping it.
    pub fn copy_repo(&self, id: &RepoId) -> Result<Option<usize>, AssembleError> {
        let repo_path = id.local_path(&self.repos_dir);
        if !repo_path.is_dir() {
            return match self.missing {
                MissingClonePolicy::Skip => {
                    warn!(repo = %id, path = %repo_path.display(), "Clone directory missing, skipping");
                    Ok(None)
                }
                MissingClonePolicy::Fail => Err(AssembleError::MissingClone(repo_path)),
            };
        }

        let root = repo_path.canonicalize().map_err(|source| AssembleError::Io {
            path: repo_path.clone(),
            source,
        })?;

        let mut copied = 0;
        let walker = WalkDir::new(&repo_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&self.repos_dir)
                .map_err(|_| AssembleError::OutsideBase(entry.path().to_path_buf()))?;
            let dest = self.target_dir.join(relative);

            let file_type = entry.file_type();

            if file_type.is_dir() {
                std::fs::create_dir_all(&dest).map_err(|source| AssembleError::Io {
                    path: dest.clone(),
                    source,
                })?;
            } else if self.filter.matches(&entry.file_name().to_string_lossy()) {
                if file_type.is_symlink() {
                    if !link_stays_inside(entry.path(), &root) {
                        warn!(
                            repo = %id,
                            path = %entry.path().display(),
                            "Symlink does not point to a file inside the clone, skipping"
                        );
                        continue;
                    }
                } else if !file_type.is_file() {
                    continue;
                }
                std::fs::copy(entry.path(), &dest).map_err(|source| AssembleError::Io {
                    path: dest.clone(),
                    source,
                })?;
                copied += 1;
            }
        }

        Ok(Some(copied))
    }
}

// ============================================================================
// Tests
// ============================================================================
