pub mod config;
pub mod git;
pub mod github;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod traits;

// Re-export common types for convenience
pub use config::HarvesterConfig;
pub use model::*;
pub use traits::*;
