//! Query harvester: paginated repository search.
//!
//! Pages are requested with an increasing `page` cursor until a page arrives
//! without a `next` link or a request fails. Failures never discard the pages
//! already collected; the loop stops and the partial set is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::harvest::result_set::ResultSet;
use crate::harvest::traits::{RateLimiter, ResultSetError};
use crate::traits::{SearchApi, SearchError, SearchRequest};

/// Result of one harvest run.
#[derive(Debug)]
pub struct HarvestOutcome {
    /// The combined query that was sent
    pub query: String,

    /// All records collected before pagination ended
    pub records: ResultSet,

    /// Number of pages fetched successfully
    pub pages: u32,

    /// The error that stopped pagination early, if any
    pub failure: Option<SearchError>,
}

impl HarvestOutcome {
    /// `true` when pagination ended because the last page had no `next` link.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Joins the topic query and the license clause with a single space.
pub fn compose_query(query: &str, license_query: &str) -> String {
    format!("{} {}", query.trim(), license_query.trim())
        .trim()
        .to_string()
}

/// Paginated search harvester.
pub struct QueryHarvester<S>
where
    S: SearchApi,
{
    api: S,
    limiter: Arc<dyn RateLimiter>,
    per_page: u32,
    sort: String,
    order: String,
}

impl<S> QueryHarvester<S>
where
    S: SearchApi,
{
    /// Creates a harvester with 100 results per page sorted by stars, descending.
    pub fn new(api: S, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            api,
            limiter,
            per_page: 100,
            sort: "stars".to_string(),
            order: "desc".to_string(),
        }
    }

    pub fn with_page_size(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort = sort.into();
        self.order = order.into();
        self
    }

    /// Collects every page for `query` combined with `license_query`.
    ///
    /// Never fails: an unsuccessful request is logged and recorded in
    /// [`HarvestOutcome::failure`], and the records gathered so far are kept.
    pub async fn harvest(&self, query: &str, license_query: &str) -> HarvestOutcome {
        let query = compose_query(query, license_query);
        info!(query = %query, "Running query");

        let mut records = Vec::new();
        let mut page = 1u32;
        let mut pages = 0u32;
        let mut failure = None;

        loop {
            info!(page, "Fetching page");
            let request = SearchRequest {
                query: query.clone(),
                sort: self.sort.clone(),
                order: self.order.clone(),
                per_page: self.per_page,
                page,
            };

            let result = match self.api.search_page(&request).await {
                Ok(result) => result,
                Err(e) => {
                    error!(page, error = %e, "Failed to fetch data");
                    failure = Some(e);
                    break;
                }
            };

            pages += 1;
            if let Some(total) = result.total_count.filter(|_| page == 1) {
                info!(total_count = total, "Search reports matching repositories");
            }
            info!(count = result.items.len(), "Fetched repositories");
            records.extend(result.items);

            if !result.has_next {
                info!("No more pages to fetch");
                break;
            }

            page += 1;
            self.limiter.throttle().await;
        }

        info!(total = records.len(), pages, "Total repositories found");

        HarvestOutcome {
            query,
            records: ResultSet::new(records),
            pages,
            failure,
        }
    }

    /// Harvests and writes the records to `<output_dir>/q-repo-list_<suffix>.json`.
    ///
    /// The file is written even when pagination stopped early.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSetError`] only if the result file cannot be written.
    pub async fn harvest_and_save(
        &self,
        output_dir: &Path,
        suffix: &str,
        query: &str,
        license_query: &str,
    ) -> Result<(HarvestOutcome, PathBuf), ResultSetError> {
        let outcome = self.harvest(query, license_query).await;
        let path = ResultSet::path_for(output_dir, suffix);
        outcome.records.save(&path)?;
        info!(path = %path.display(), records = outcome.records.len(), "Saved result set");
        Ok((outcome, path))
    }
}

// ============================================================================
// Tests
// ============================================================================
