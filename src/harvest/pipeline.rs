//! Sequential three-stage pipeline.
//!
//! This module provides the [`HarvestPipeline`] coordinator that runs the
//! stages in order (Harvest → Fetch → Assemble) with:
//! - Async execution via `tokio`
//! - Per-stage timing collected in [`PipelineStats`]
//! - Structured logging via `tracing`
//!
//! Each stage hands the next one its output through the persisted result
//! set: the fetch and assemble stages read the file written by the harvest
//! stage, exactly as they do when run on their own.

use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use crate::harvest::assemble::{AssembleReport, CorpusAssembler};
use crate::harvest::fetch::{FetchReport, RepositoryFetcher};
use crate::harvest::query::QueryHarvester;
use crate::harvest::result_set::ResultSet;
use crate::harvest::traits::{AssembleError, ResultSetError};
use crate::traits::{RepoCloner, SearchApi};

// ============================================================================
// Pipeline Types
// ============================================================================

/// Search parameters for the harvest stage.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Topic / language qualifiers
    pub query: String,

    /// License qualifiers appended to `query`
    pub license_query: String,

    /// Result set file suffix
    pub suffix: String,
}

/// Complete pipeline result.
#[derive(Debug)]
pub struct PipelineReport {
    /// Where the harvested result set was written
    pub result_path: PathBuf,

    /// Records persisted by the harvest stage
    pub harvested: usize,

    /// Whether pagination reached the last page
    pub harvest_complete: bool,

    pub fetch: FetchReport,

    pub assemble: AssembleReport,

    pub stats: PipelineStats,
}

/// Timing of each stage.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Total time spent on the entire run (milliseconds)
    pub total_duration_ms: u64,

    /// Time spent paginating the search API (milliseconds)
    pub harvest_duration_ms: u64,

    /// Time spent cloning, including throttling pauses (milliseconds)
    pub fetch_duration_ms: u64,

    /// Time spent copying corpus files (milliseconds)
    pub assemble_duration_ms: u64,
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Errors that abort the pipeline.
///
/// Search and clone failures are not among them: the harvest stage keeps
/// partial results and the fetch stage skips failed repositories.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Result set could not be written or read back
    #[error("Result set error: {0}")]
    ResultSet(#[from] ResultSetError),

    /// Corpus assembly failed
    #[error("Assembly failed: {0}")]
    Assemble(#[from] AssembleError),

    /// The blocking assembly task panicked or was cancelled
    #[error("Assembly task failed: {0}")]
    Join(String),
}

// ============================================================================
// Pipeline Executor
// ============================================================================

/// Runs harvest, fetch and assemble back to back.
///
/// # Example
///
/// ```ignore
/// let pipeline = HarvestPipeline::new(harvester, fetcher, assembler, output_dir)
///     .with_fetch_limit(Some(232));
/// let report = pipeline.execute(&spec).await?;
/// println!("Copied {} files", report.assemble.files_copied);
/// ```
pub struct HarvestPipeline<S, C>
where
    S: SearchApi,
    C: RepoCloner,
{
    harvester: QueryHarvester<S>,
    fetcher: RepositoryFetcher<C>,
    assembler: CorpusAssembler,
    output_dir: PathBuf,
    fetch_limit: Option<usize>,
}

impl<S, C> HarvestPipeline<S, C>
where
    S: SearchApi,
    C: RepoCloner,
{
    /// Creates a pipeline that clones every harvested repository.
    pub fn new(
        harvester: QueryHarvester<S>,
        fetcher: RepositoryFetcher<C>,
        assembler: CorpusAssembler,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            harvester,
            fetcher,
            assembler,
            output_dir: output_dir.into(),
            fetch_limit: None,
        }
    }

    /// Restricts the fetch stage to the `limit` most-starred repositories.
    pub fn with_fetch_limit(mut self, limit: Option<usize>) -> Self {
        self.fetch_limit = limit;
        self
    }

    pub fn fetcher(&self) -> &RepositoryFetcher<C> {
        &self.fetcher
    }

    /// Executes all stages for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the result set cannot be persisted or
    /// reloaded, or if corpus assembly fails.
    pub async fn execute(&self, spec: &QuerySpec) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        let mut stats = PipelineStats::default();

        // ====================================================================
        // Stage 1: Harvest
        // ====================================================================

        info!("Starting harvest stage");
        let harvest_start = Instant::now();
        let (outcome, result_path) = self
            .harvester
            .harvest_and_save(&self.output_dir, &spec.suffix, &spec.query, &spec.license_query)
            .await?;
        stats.harvest_duration_ms = harvest_start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.harvest_duration_ms,
            records = outcome.records.len(),
            complete = outcome.is_complete(),
            "Harvest completed"
        );

        // ====================================================================
        // Stage 2: Fetch
        // ====================================================================

        let results = ResultSet::load(&result_path)?;

        info!("Starting fetch stage");
        let fetch_start = Instant::now();
        let fetch = self.fetcher.fetch_all(&results, self.fetch_limit).await;
        stats.fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
        info!(duration_ms = stats.fetch_duration_ms, "Fetch completed");

        // ====================================================================
        // Stage 3: Assemble
        // ====================================================================

        info!("Starting assemble stage");
        let assemble_start = Instant::now();
        let assembler = self.assembler.clone();
        let assemble = tokio::task::spawn_blocking(move || assembler.assemble(&results))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        stats.assemble_duration_ms = assemble_start.elapsed().as_millis() as u64;
        info!(
            duration_ms = stats.assemble_duration_ms,
            files = assemble.files_copied,
            "Assemble completed"
        );

        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        Ok(PipelineReport {
            result_path,
            harvested: outcome.records.len(),
            harvest_complete: outcome.is_complete(),
            fetch,
            assemble,
            stats,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
