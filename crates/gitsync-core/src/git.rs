use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use std::process::Output;

use crate::config::GitSettings;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOutcome {
    Success,
    /// The pull produced unmerged paths; the merge was aborted.
    Conflict,
}

/// The repository fetch/merge/push run once per sync cycle.
#[async_trait::async_trait]
pub trait GitOps: Send + Sync + 'static {
    async fn sync(&self) -> Result<GitOutcome>;
}

/// `GitOps` backed by the `git` executable.
pub struct GitCommand {
    repo: PathBuf,
    remote: String,
    branch: String,
    commit_message: String,
}

impl GitCommand {
    pub fn new(settings: &GitSettings) -> Self {
        Self {
            repo: settings.repo.clone(),
            remote: settings.remote.clone(),
            branch: settings.branch.clone(),
            commit_message: settings.commit_message.clone(),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .await?;
        Ok(output)
    }

    /// Run git and fail on a non-zero exit.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            return Err(SyncError::Git(format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                combined(&output).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[async_trait::async_trait]
impl GitOps for GitCommand {
    async fn sync(&self) -> Result<GitOutcome> {
        self.run(&["add", "-A"]).await?;

        let message = format!(
            "{} ({})",
            self.commit_message,
            chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let commit = self.git(&["commit", "-m", &message]).await?;
        if commit.status.success() {
            tracing::debug!(repo = %self.repo.display(), "Committed local changes");
        } else {
            let text = combined(&commit);
            if !text.contains("nothing to commit") && !text.contains("nothing added to commit") {
                return Err(SyncError::Git(format!("git commit failed: {}", text.trim())));
            }
        }

        let pull = self
            .git(&["pull", "--no-edit", "--no-rebase", &self.remote, &self.branch])
            .await?;
        if !pull.status.success() {
            let text = combined(&pull);
            let unmerged = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
            if !unmerged.trim().is_empty() {
                tracing::warn!(
                    repo = %self.repo.display(),
                    paths = %unmerged.trim().replace('\n', ", "),
                    "Pull produced unmerged paths, aborting merge"
                );
                if let Err(e) = self.run(&["merge", "--abort"]).await {
                    tracing::error!(error = %e, "Failed to abort merge");
                }
                return Ok(GitOutcome::Conflict);
            }
            if text.contains("couldn't find remote ref") {
                // First push to an empty remote branch.
                tracing::debug!(branch = %self.branch, "Remote branch does not exist yet");
            } else {
                return Err(SyncError::Git(format!("git pull failed: {}", text.trim())));
            }
        }

        self.run(&["push", &self.remote, &format!("HEAD:{}", self.branch)])
            .await?;
        Ok(GitOutcome::Success)
    }
}
