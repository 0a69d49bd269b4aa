use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the marker file written inside a clone once `git clone` succeeded.
pub const COMPLETION_MARKER: &str = ".harvest-complete";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoIdError {
    #[error("Empty {0} component")]
    Empty(&'static str),
    #[error("Invalid {field} component '{value}'")]
    Invalid { field: &'static str, value: String },
}

/// Repository identity as a pair of path-safe components.
///
/// Owner and name stay separate so that local paths are built with the
/// platform's own join instead of a hard-coded separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoIdError> {
        let owner = owner.into();
        let name = name.into();
        validate_component("owner", &owner)?;
        validate_component("name", &name)?;
        Ok(Self { owner, name })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name` as a relative path.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(&self.owner).join(&self.name)
    }

    pub fn local_path(&self, base: &Path) -> PathBuf {
        base.join(self.relative_path())
    }

    pub fn clone_url(&self, host: &str) -> String {
        format!("https://{}/{}/{}.git", host, self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn validate_component(field: &'static str, value: &str) -> Result<(), RepoIdError> {
    if value.is_empty() {
        return Err(RepoIdError::Empty(field));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(RepoIdError::Invalid {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoLicense {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One repository hit from the search API.
///
/// Fields not modelled here are kept in `extra` so the provider's schema is
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub name: String,
    pub owner: RepoOwner,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub license: Option<RepoLicense>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SearchResultRecord {
    pub fn repo_id(&self) -> Result<RepoId, RepoIdError> {
        RepoId::new(self.owner.login.clone(), self.name.clone())
    }

    pub fn license_key(&self) -> Option<&str> {
        self.license.as_ref().and_then(|l| l.key.as_deref())
    }
}

/// State of a local clone directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneState {
    Absent,
    /// Directory exists but the completion marker does not.
    Partial,
    Complete,
}

impl CloneState {
    pub fn inspect(path: &Path) -> Self {
        if !path.exists() {
            CloneState::Absent
        } else if path.join(COMPLETION_MARKER).is_file() {
            CloneState::Complete
        } else {
            CloneState::Partial
        }
    }
}
