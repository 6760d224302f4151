use crate::model::Origin;

/// Errors raised by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The user chose to leave a conflict unresolved; syncing must halt.
    #[error("conflict in {path} was left unresolved")]
    ConflictIgnored { path: String },

    #[error("storage error for {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("git sync failed: {0}")]
    Git(String),

    #[error("repository has unmerged paths")]
    RepoConflict,

    #[error("{} file(s) failed to {action}: {}", .failures.len(), summarize(.failures))]
    Files {
        action: String,
        failures: Vec<(String, String)>,
    },

    #[error("{0} version is missing")]
    MissingVersion(Origin),

    #[error("unknown version origin: {0}")]
    UnknownOrigin(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn summarize(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(path, error)| format!("{path}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    pub fn storage(path: impl Into<String>, source: anyhow::Error) -> Self {
        SyncError::Storage {
            path: path.into(),
            source,
        }
    }

    /// True for the error that must stop the sync loop rather than retry.
    pub fn is_conflict_ignored(&self) -> bool {
        matches!(self, SyncError::ConflictIgnored { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
