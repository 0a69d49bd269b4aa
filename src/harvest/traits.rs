//! Timing seams and stage error types for the harvest pipeline.
//!
//! - Pacing abstractions via [`Clock`] and [`RateLimiter`]
//! - Standardized error handling for persistence and corpus assembly

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Timing Traits
// ============================================================================

/// Source of time for rate limiters.
///
/// Production code uses [`TokioClock`](super::rate_limit::TokioClock); tests
/// inject [`ManualClock`](super::rate_limit::ManualClock) so that pacing can
/// be observed without waiting in real time.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;

    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Pacing policy applied between consecutive outbound operations.
///
/// The harvester calls [`RateLimiter::throttle`] between successful search
/// pages; the fetcher calls it after every attempted clone.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Waits until the next operation is allowed to proceed.
    async fn throttle(&self);

    /// Returns a short human-readable description used in logs.
    fn describe(&self) -> String;
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while persisting or loading a result set.
#[derive(Error, Debug)]
pub enum ResultSetError {
    /// Failed to read or write the result file
    #[error("I/O error on result set {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result file is not valid JSON for the record schema
    #[error("Invalid result set JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur during corpus assembly.
#[derive(Error, Debug)]
pub enum AssembleError {
    /// Clone directory is missing and the policy forbids skipping it
    #[error("Clone directory does not exist: {0}")]
    MissingClone(PathBuf),

    /// Directory traversal failed
    #[error("Failed to walk clone directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Copy or directory creation failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walk produced an entry outside the repos base directory
    #[error("Path {0} is not under the repos directory")]
    OutsideBase(PathBuf),
}
