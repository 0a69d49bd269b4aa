use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::traits::{CloneError, RepoCloner};

/// Clones through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCloner {
    program: String,
    shallow: bool,
}

impl GitCloner {
    pub fn new(shallow: bool) -> Self {
        Self {
            program: "git".to_string(),
            shallow,
        }
    }

    /// Uses a different executable in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl RepoCloner for GitCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError> {
        let mut command = Command::new(&self.program);
        command.arg("clone");
        if self.shallow {
            command.args(["--depth", "1"]);
        }
        command
            .arg(url)
            .arg(dest)
            .stdin(Stdio::null())
            // Missing or private repositories must fail instead of prompting
            .env("GIT_TERMINAL_PROMPT", "0");

        debug!(url, dest = %dest.display(), shallow = self.shallow, "Running git clone");
        let status = command.status().await.map_err(CloneError::Spawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(CloneError::Failed {
                url: url.to_string(),
                status: status.to_string(),
            })
        }
    }
}
