//! Ephemeral per-session workspace holding a clone of the target repository.
//!
//! The clone lives in a [`tempfile::TempDir`]; dropping the [`Workspace`]
//! removes it, so teardown happens on every exit path including early
//! returns, cancellation and panics.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tempfile::TempDir;

use crate::config::Config;
use crate::errors::PipelineError;
use crate::git::{self, CommandOutput};
use crate::github;
use crate::reporter::{EventKind, SessionReporter};

const WORKSPACE_PREFIX: &str = "backspace-";
const REPO_DIR: &str = "repo";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    repo_path: PathBuf,
    default_branch: Option<String>,
}

impl Workspace {
    /// Create a temp scope and clone `repo_url` into it.
    ///
    /// Clone failure is fatal. Identity setup and the credentialed remote
    /// rewrite are best-effort: failures are reported and the clone is kept.
    pub async fn acquire(
        repo_url: &str,
        config: &Config,
        reporter: &SessionReporter,
    ) -> Result<Self, PipelineError> {
        let dir = create_temp_dir(config.settings.sandbox.workspace_root.as_deref())
            .map_err(PipelineError::WorkspaceSetup)?;
        let repo_path = dir.path().join(REPO_DIR);

        reporter
            .emit(
                EventKind::GitClone,
                format!("Cloning repository: {}", github::redact_url(repo_url)),
            )
            .await;

        let repo_arg = repo_path.to_string_lossy().into_owned();
        let clone = git::git(dir.path(), &["clone", repo_url, &repo_arg])
            .await
            .map_err(|e| PipelineError::CloneFailed {
                stderr: e.to_string(),
            })?;
        if !clone.success() {
            return Err(PipelineError::CloneFailed {
                stderr: clone.error_text(),
            });
        }

        let mut workspace = Self {
            dir,
            repo_path,
            default_branch: None,
        };

        workspace.configure_identity(config).await;
        workspace.configure_remote(repo_url, config, reporter).await;
        workspace.default_branch = workspace.detect_default_branch().await;

        reporter
            .emit(EventKind::RepoReady, "Repository cloned and configured")
            .await;
        Ok(workspace)
    }

    /// Path of the cloned repository.
    pub fn path(&self) -> &Path {
        &self.repo_path
    }

    /// Root of the temp scope; removed on drop.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The branch the clone checked out, i.e. the remote's default branch.
    pub fn default_branch(&self) -> Option<&str> {
        self.default_branch.as_deref()
    }

    async fn configure_identity(&self, config: &Config) {
        let git_settings = &config.settings.git;
        for (key, value) in [
            ("user.name", git_settings.user_name.as_str()),
            ("user.email", git_settings.user_email.as_str()),
        ] {
            match git::git(&self.repo_path, &["config", key, value]).await {
                Ok(out) if out.success() => {}
                Ok(out) => tracing::warn!("git config {} failed: {}", key, out.error_text()),
                Err(e) => tracing::warn!("git config {} failed: {}", key, e),
            }
        }
    }

    async fn configure_remote(&self, repo_url: &str, config: &Config, reporter: &SessionReporter) {
        let token = config.credentials.source_control_token.expose_secret();
        let Some(remote) = github::authenticated_remote_url(repo_url, token) else {
            reporter
                .emit(
                    EventKind::RemoteConfigFailed,
                    "Not a GitHub repository URL; keeping the original remote",
                )
                .await;
            return;
        };

        let result = git::git(&self.repo_path, &["remote", "set-url", "origin", &remote]).await;
        let failure = match result {
            Ok(out) if out.success() => None,
            Ok(out) => Some(out.error_text()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(err) = failure {
            // The token could appear in git's error text.
            let err = err.replace(token, "***");
            reporter
                .emit(
                    EventKind::RemoteConfigFailed,
                    format!("Failed to configure authenticated remote: {}", err),
                )
                .await;
        }
    }

    async fn detect_default_branch(&self) -> Option<String> {
        let out: CommandOutput = git::git(&self.repo_path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()?;
        let branch = out.stdout.trim();
        if out.success() && !branch.is_empty() && branch != "HEAD" {
            Some(branch.to_string())
        } else {
            None
        }
    }
}

fn create_temp_dir(root: Option<&Path>) -> std::io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKSPACE_PREFIX);
    match root {
        Some(root) => {
            std::fs::create_dir_all(root)?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_dir_under_root_and_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("work");
        let path = {
            let dir = create_temp_dir(Some(&nested)).unwrap();
            let path = dir.path().to_path_buf();
            assert!(path.starts_with(&nested));
            assert!(
                path.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(WORKSPACE_PREFIX)
            );
            assert!(path.exists());
            path
        };
        assert!(!path.exists());
    }
}
