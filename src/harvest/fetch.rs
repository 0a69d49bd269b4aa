//! Repository fetcher: makes sure each harvested repository has a complete
//! local clone under `<repos_dir>/<owner>/<name>`.
//!
//! A clone counts as complete only once the [`COMPLETION_MARKER`] file has
//! been written into it. A directory without the marker is a leftover from
//! an interrupted or failed clone; it is removed and cloned again.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::harvest::result_set::ResultSet;
use crate::harvest::traits::RateLimiter;
use crate::model::{CloneState, RepoId, COMPLETION_MARKER};
use crate::traits::{CloneError, RepoCloner};

/// What happened to a single repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Clone succeeded and was marked complete
    Cloned,
    /// A complete clone was already present
    Skipped,
    /// The clone command ran and failed
    CloneFailed,
    /// The clone could not be attempted (directory preparation failed)
    NotAttempted,
}

impl FetchOutcome {
    /// Whether an external clone was attempted, which triggers throttling.
    pub fn attempted(self) -> bool {
        matches!(self, FetchOutcome::Cloned | FetchOutcome::CloneFailed)
    }
}

/// Counters for one fetch batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub cloned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Rows whose owner or name could not form a [`RepoId`]
    pub invalid: usize,
}

impl FetchReport {
    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Cloned => self.cloned += 1,
            FetchOutcome::Skipped => self.skipped += 1,
            FetchOutcome::CloneFailed | FetchOutcome::NotAttempted => self.failed += 1,
        }
    }

    pub fn attempts(&self) -> usize {
        self.cloned + self.failed
    }
}

/// Sequential, throttled clone driver.
pub struct RepositoryFetcher<C>
where
    C: RepoCloner,
{
    cloner: C,
    repos_dir: PathBuf,
    host: String,
    limiter: Arc<dyn RateLimiter>,
}

impl<C> RepositoryFetcher<C>
where
    C: RepoCloner,
{
    pub fn new(cloner: C, repos_dir: impl Into<PathBuf>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            cloner,
            repos_dir: repos_dir.into(),
            host: "github.com".to_string(),
            limiter,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    pub fn cloner(&self) -> &C {
        &self.cloner
    }

    /// Ensures a complete clone of `id` exists. Does not throttle.
    ///
    /// Errors are logged and reported through the returned [`FetchOutcome`];
    /// nothing here aborts a batch.
    pub async fn ensure_clone(&self, id: &RepoId) -> FetchOutcome {
        let dest = id.local_path(&self.repos_dir);

        match CloneState::inspect(&dest) {
            CloneState::Complete => {
                info!(repo = %id, path = %dest.display(), "Repository already exists");
                return FetchOutcome::Skipped;
            }
            CloneState::Partial => {
                warn!(
                    repo = %id,
                    path = %dest.display(),
                    marker = COMPLETION_MARKER,
                    "Existing directory has no completion marker; deleting it and cloning again"
                );
                if let Err(e) = tokio::fs::remove_dir_all(&dest).await {
                    error!(repo = %id, error = %e, "Failed to remove incomplete clone");
                    return FetchOutcome::NotAttempted;
                }
            }
            CloneState::Absent => {}
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(repo = %id, error = %e, "Failed to create owner directory");
                return FetchOutcome::NotAttempted;
            }
        }

        let url = id.clone_url(&self.host);
        info!(repo = %id, dir = %self.repos_dir.display(), "Downloading repository");

        let result = match self.cloner.clone_repo(&url, &dest).await {
            Ok(()) => write_completion_marker(&dest),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => FetchOutcome::Cloned,
            Err(e) => {
                error!(repo = %id, url = %url, error = %e, "Failed to clone repository");
                FetchOutcome::CloneFailed
            }
        }
    }

    /// Clones the `limit` most-starred rows of `results` (all rows if `None`).
    ///
    /// Throttles after every attempted clone, successful or not. Repeated
    /// ids within the batch are processed once.
    pub async fn fetch_all(&self, results: &ResultSet, limit: Option<usize>) -> FetchReport {
        let sorted = results.sorted_by_stars();
        let rows = limit.unwrap_or(sorted.len()).min(sorted.len());
        info!(
            rows,
            total = sorted.len(),
            throttle = %self.limiter.describe(),
            "Fetching repositories"
        );
        for (license, count) in sorted.license_counts() {
            info!(license = %license, count, "License breakdown");
        }

        let mut report = FetchReport::default();
        let mut seen = HashSet::new();

        for record in &sorted.records()[..rows] {
            let id = match record.repo_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!(name = %record.name, error = %e, "Skipping row with unusable id");
                    report.invalid += 1;
                    continue;
                }
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            let outcome = self.ensure_clone(&id).await;
            report.record(outcome);
            if outcome.attempted() {
                self.limiter.throttle().await;
            }
        }

        info!(
            cloned = report.cloned,
            skipped = report.skipped,
            failed = report.failed,
            invalid = report.invalid,
            "Done"
        );
        report
    }
}

/// Atomically creates the completion marker inside `dest`.
pub fn write_completion_marker(dest: &Path) -> Result<(), CloneError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dest)?;
    tmp.write_all(env!("CARGO_PKG_VERSION").as_bytes())?;
    tmp.persist(dest.join(COMPLETION_MARKER))
        .map_err(|e| CloneError::Io(e.error))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::rate_limit::{FixedInterval, ManualClock};
    use crate::model::SearchResultRecord;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    // Creates the destination like git would, failing for configured repos
    #[derive(Default)]
    struct FakeCloner {
        calls: Mutex<Vec<String>>,
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl RepoCloner for FakeCloner {
        async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.fail_urls.iter().any(|u| u == url) {
                return Err(CloneError::Failed {
                    url: url.to_string(),
                    status: "exit status: 128".to_string(),
                });
            }
            std::fs::create_dir_all(dest)?;
            std::fs::write(dest.join("README.md"), b"# cloned")?;
            Ok(())
        }
    }

    fn record(owner: &str, name: &str, stars: u64) -> SearchResultRecord {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "owner": { "login": owner },
            "stargazers_count": stars
        }))
        .unwrap()
    }

    fn fetcher(
        cloner: FakeCloner,
        repos_dir: &Path,
        clock: Arc<ManualClock>,
    ) -> RepositoryFetcher<FakeCloner> {
        RepositoryFetcher::new(
            cloner,
            repos_dir,
            Arc::new(FixedInterval::new(Duration::from_secs(150), clock)),
        )
    }

    #[tokio::test]
    async fn test_ensure_clone_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let fetcher = fetcher(FakeCloner::default(), dir.path(), clock);
        let id = RepoId::new("o", "r").unwrap();

        assert_eq!(fetcher.ensure_clone(&id).await, FetchOutcome::Cloned);
        assert_eq!(
            CloneState::inspect(&id.local_path(dir.path())),
            CloneState::Complete
        );
        assert_eq!(fetcher.ensure_clone(&id).await, FetchOutcome::Skipped);
        assert_eq!(fetcher.cloner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clone_without_marker_is_deleted_and_recloned() {
        let dir = tempfile::tempdir().unwrap();
        let id = RepoId::new("o", "r").unwrap();
        let partial = id.local_path(dir.path());
        std::fs::create_dir_all(partial.join(".git")).unwrap();
        std::fs::write(partial.join("half-written"), b"").unwrap();

        let clock = Arc::new(ManualClock::new());
        let fetcher = fetcher(FakeCloner::default(), dir.path(), clock);

        assert_eq!(fetcher.ensure_clone(&id).await, FetchOutcome::Cloned);
        assert!(!partial.join("half-written").exists());
        assert!(partial.join(COMPLETION_MARKER).is_file());
    }

    #[tokio::test]
    async fn test_clone_failure_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let cloner = FakeCloner {
            fail_urls: vec!["https://github.com/a/broken.git".to_string()],
            ..FakeCloner::default()
        };
        let fetcher = fetcher(cloner, dir.path(), clock.clone());
        let results = ResultSet::new(vec![record("a", "broken", 10), record("b", "fine", 5)]);

        let report = fetcher.fetch_all(&results, None).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.cloned, 1);
        assert_eq!(clock.sleeps().len(), 2);
        // A failed clone leaves no completion marker
        assert_ne!(
            CloneState::inspect(&dir.path().join("a").join("broken")),
            CloneState::Complete
        );
    }

    #[tokio::test]
    async fn test_limit_takes_most_starred_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let fetcher = fetcher(FakeCloner::default(), dir.path(), clock);
        let results = ResultSet::new(vec![
            record("o", "few", 1),
            record("o", "most", 100),
            record("o", "some", 10),
        ]);

        let report = fetcher.fetch_all(&results, Some(2)).await;

        assert_eq!(report.cloned, 2);
        assert_eq!(
            *fetcher.cloner.calls.lock().unwrap(),
            vec![
                "https://github.com/o/most.git".to_string(),
                "https://github.com/o/some.git".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_rows() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let fetcher = fetcher(FakeCloner::default(), dir.path(), clock.clone())
            .with_host("example.org");
        let results = ResultSet::new(vec![
            record("o", "r", 3),
            record("o", "r", 2),
            record("..", "r", 1),
        ]);

        let report = fetcher.fetch_all(&results, None).await;

        assert_eq!(report.invalid, 1);
        assert_eq!(report.attempts(), 1);
        assert_eq!(
            *fetcher.cloner.calls.lock().unwrap(),
            vec!["https://example.org/o/r.git".to_string()]
        );
        assert_eq!(clock.sleeps().len(), 1);
    }
}
