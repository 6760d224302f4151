use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Files (relative to the repository) opened when the service starts.
    #[serde(default)]
    pub files: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            auto_start: true,
            files: Vec::new(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    #[serde(default = "default_repo")]
    pub repo: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            remote: default_remote(),
            branch: default_branch(),
            commit_message: default_commit_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            file: true,
        }
    }
}

fn default_interval() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_repo() -> PathBuf {
    PathBuf::from(".")
}
fn default_remote() -> String {
    "origin".into()
}
fn default_branch() -> String {
    "master".into()
}
fn default_commit_message() -> String {
    "gitsync: automatic commit".into()
}
fn default_filter() -> String {
    "info".into()
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidSettings(
                "sync.interval_secs must be greater than zero".into(),
            ));
        }
        if self.git.branch.trim().is_empty() {
            return Err(SyncError::InvalidSettings("git.branch is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings: Settings = serde_json::from_str(r#"{"git": {"branch": "main"}}"#).unwrap();
        assert_eq!(settings.git.branch, "main");
        assert_eq!(settings.git.remote, "origin");
        assert_eq!(settings.sync.interval_secs, 30);
        assert!(settings.sync.auto_start);
        assert_eq!(settings.logging.filter, "info");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.sync.files = vec!["notes.md".into(), "analysis.ipynb".into()];
        settings.sync.interval_secs = 5;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.sync.files, settings.sync.files);
        assert_eq!(loaded.sync.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"sync": {"interval_secs": 0}}"#).unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
