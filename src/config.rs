//! Harvester configuration.
//!
//! Defaults describe a q/kdb corpus run (topic filters, permissive
//! licenses, 5s between pages, 150s between clones). A TOML file may override
//! any subset of fields; `GITHUB_TOKEN` is read from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::github::DEFAULT_SEARCH_URL;
use crate::harvest::assemble::MissingClonePolicy;
use crate::harvest::rate_limit::RateLimitPolicy;

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Directory holding `q-repo-list_<suffix>.json` result sets
    pub output_dir: PathBuf,
    pub search: SearchConfig,
    pub fetch: FetchConfig,
    pub assemble: AssembleConfig,
    pub http: HttpConfig,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            search: SearchConfig::default(),
            fetch: FetchConfig::default(),
            assemble: AssembleConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_url: String,
    pub query: String,
    /// Space-separated `license:` qualifiers, OR'd by the provider
    pub license_query: String,
    /// Result set file suffix
    pub suffix: String,
    pub per_page: u32,
    pub sort: String,
    pub order: String,
    pub rate_limit: RateLimitPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_SEARCH_URL.to_string(),
            query: "topic:q topic:kdb".to_string(),
            license_query: "license:apache-2.0 license:mit license:0bsd license:cc".to_string(),
            suffix: "q-kdb".to_string(),
            per_page: 100,
            sort: "stars".to_string(),
            order: "desc".to_string(),
            rate_limit: RateLimitPolicy::fixed_secs(5.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub repos_dir: PathBuf,
    pub host: String,
    /// `limit = 232` clones the most-starred rows, `limit = "all"` every row
    pub limit: CloneLimit,
    pub shallow: bool,
    pub rate_limit: RateLimitPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("github-repos"),
            host: "github.com".to_string(),
            limit: CloneLimit::Top(232),
            shallow: false,
            rate_limit: RateLimitPolicy::fixed_secs(150.0),
        }
    }
}

/// How many rows of the result set the fetch stage clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "LimitRepr", try_from = "LimitRepr")]
pub enum CloneLimit {
    Top(usize),
    All,
}

impl CloneLimit {
    /// Row bound for [`RepositoryFetcher::fetch_all`](crate::harvest::RepositoryFetcher::fetch_all).
    pub fn rows(self) -> Option<usize> {
        match self {
            CloneLimit::Top(n) => Some(n),
            CloneLimit::All => None,
        }
    }
}

// On-disk form: a bare count or the word "all"
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LimitRepr {
    Count(usize),
    Word(String),
}

impl From<CloneLimit> for LimitRepr {
    fn from(limit: CloneLimit) -> Self {
        match limit {
            CloneLimit::Top(n) => LimitRepr::Count(n),
            CloneLimit::All => LimitRepr::Word("all".to_string()),
        }
    }
}

impl TryFrom<LimitRepr> for CloneLimit {
    type Error = String;

    fn try_from(repr: LimitRepr) -> Result<Self, Self::Error> {
        match repr {
            LimitRepr::Count(n) => Ok(CloneLimit::Top(n)),
            LimitRepr::Word(word) if word == "all" => Ok(CloneLimit::All),
            LimitRepr::Word(word) => Err(format!("expected a count or \"all\", got \"{}\"", word)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssembleConfig {
    pub target_dir: PathBuf,
    pub extensions: Vec<String>,
    pub missing_clones: MissingClonePolicy,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("training-set-q-language"),
            extensions: vec![".q".to_string(), ".md".to_string()],
            missing_clones: MissingClonePolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Request timeout; unset keeps the client default
    pub timeout_secs: Option<u64>,
    /// Explicit proxy URL; `HTTP(S)_PROXY` from the environment apply otherwise
    pub proxy: Option<String>,
    /// Bearer token, normally supplied via `GITHUB_TOKEN`
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("repo-harvester/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: None,
            proxy: None,
            token: None,
        }
    }
}

impl HarvesterConfig {
    /// Loads defaults, overlays `path` if given, then applies the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.http.token = Some(token.trim().to_string());
            }
        }
    }
}
