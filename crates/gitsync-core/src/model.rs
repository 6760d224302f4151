use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::notebook::Notebook;

/// Which snapshot of a file a version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Last known synchronized state.
    Base,
    /// What the user currently has in the editor.
    Local,
    /// What storage holds after the remote sync.
    Remote,
}

impl Origin {
    pub fn as_str(&self) -> &str {
        match self {
            Origin::Base => "base",
            Origin::Local => "local",
            Origin::Remote => "remote",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base" => Ok(Origin::Base),
            "local" => Ok(Origin::Local),
            "remote" => Ok(Origin::Remote),
            other => Err(SyncError::UnknownOrigin(other.to_string())),
        }
    }
}

/// The three snapshots of one open file.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSet<C> {
    pub base: Option<C>,
    pub local: Option<C>,
    pub remote: Option<C>,
}

impl<C> VersionSet<C> {
    pub fn new() -> Self {
        Self {
            base: None,
            local: None,
            remote: None,
        }
    }

    pub fn set(&mut self, origin: Origin, content: C) {
        match origin {
            Origin::Base => self.base = Some(content),
            Origin::Local => self.local = Some(content),
            Origin::Remote => self.remote = Some(content),
        }
    }

    pub fn get(&self, origin: Origin) -> Option<&C> {
        match origin {
            Origin::Base => self.base.as_ref(),
            Origin::Local => self.local.as_ref(),
            Origin::Remote => self.remote.as_ref(),
        }
    }

    pub fn require(&self, origin: Origin) -> Result<&C> {
        self.get(origin).ok_or(SyncError::MissingVersion(origin))
    }

    pub fn is_complete(&self) -> bool {
        self.base.is_some() && self.local.is_some() && self.remote.is_some()
    }
}

impl<C> Default for VersionSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A cursor location. `column` counts characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

impl CursorPosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Editor scroll offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub top: f64,
    pub left: f64,
}

/// File content as the storage layer sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Notebook(Notebook),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Notebook(_) => None,
        }
    }

    pub fn as_notebook(&self) -> Option<&Notebook> {
        match self {
            Content::Notebook(nb) => Some(nb),
            Content::Text(_) => None,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Content::Text(_) => "text",
            Content::Notebook(_) => "notebook",
        }
    }
}

/// State of the synchronization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    UpToDate,
    Sync,
    Merge,
    Dirty,
    Warning,
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::UpToDate => "up-to-date",
            SyncStatus::Sync => "sync",
            SyncStatus::Merge => "merge",
            SyncStatus::Dirty => "dirty",
            SyncStatus::Warning => "warning",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_set_slots() {
        let mut versions = VersionSet::new();
        assert!(!versions.is_complete());
        versions.set(Origin::Base, "b");
        versions.set(Origin::Local, "l");
        assert!(matches!(
            versions.require(Origin::Remote),
            Err(SyncError::MissingVersion(Origin::Remote))
        ));
        versions.set(Origin::Remote, "r");
        assert!(versions.is_complete());
        assert_eq!(versions.get(Origin::Local), Some(&"l"));
    }

    #[test]
    fn test_origin_parse() {
        assert_eq!("remote".parse::<Origin>().unwrap(), Origin::Remote);
        assert!("theirs".parse::<Origin>().is_err());
    }

    #[test]
    fn test_status_names() {
        assert_eq!(SyncStatus::UpToDate.to_string(), "up-to-date");
        assert_eq!(
            serde_json::to_string(&SyncStatus::UpToDate).unwrap(),
            "\"up-to-date\""
        );
    }
}
