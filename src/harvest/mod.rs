//! Harvest module - search, clone and corpus assembly stages.
//!
//! This module provides the stage implementations of the harvester:
//! - **Query**: paginated search via [`QueryHarvester`]
//! - **Fetch**: idempotent, throttled cloning via [`RepositoryFetcher`]
//! - **Assemble**: filtered corpus copy via [`CorpusAssembler`]
//! - **Pacing**: [`RateLimiter`] implementations driven by an injected [`Clock`]
//! - **Pipeline**: sequential executor via [`pipeline::HarvestPipeline`]

pub mod assemble;
pub mod fetch;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod result_set;
pub mod traits;

// Re-export commonly used types
pub use traits::{AssembleError, Clock, RateLimiter, ResultSetError};

pub use assemble::{AssembleReport, CorpusAssembler, ExtensionFilter, MissingClonePolicy};
pub use fetch::{FetchOutcome, FetchReport, RepositoryFetcher};
pub use pipeline::{HarvestPipeline, PipelineError, PipelineReport, PipelineStats, QuerySpec};
pub use query::{compose_query, HarvestOutcome, QueryHarvester};
pub use rate_limit::{FixedInterval, ManualClock, RateLimitPolicy, TokenBucket, TokioClock};
pub use result_set::ResultSet;
