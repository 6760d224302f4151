use std::fmt;

/// What to do with a conflicting merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Discard the remote changes and keep the editor content.
    KeepLocal,
    /// Discard the local changes and take the remote content.
    KeepRemote,
    /// Show the conflict-marked result and let the user edit it.
    ViewDiff,
    /// Leave the file alone and stop syncing until the conflict is cleared.
    Ignore,
}

impl ConflictChoice {
    pub const ALL: [ConflictChoice; 4] = [
        ConflictChoice::KeepLocal,
        ConflictChoice::KeepRemote,
        ConflictChoice::ViewDiff,
        ConflictChoice::Ignore,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConflictChoice::KeepLocal => "Revert to local",
            ConflictChoice::KeepRemote => "Revert to remote",
            ConflictChoice::ViewDiff => "View diff",
            ConflictChoice::Ignore => "Ignore and stop syncing",
        }
    }
}

impl fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a prompt needs to present a conflict.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub path: String,
    /// Merged content with LOCAL/REMOTE conflict markers.
    pub marked: String,
    pub local: String,
    pub remote: String,
}

/// Asks the user how to settle a conflicting merge.
#[async_trait::async_trait]
pub trait ConflictPrompt: Send + Sync {
    async fn choose(&self, report: &ConflictReport) -> ConflictChoice;
}

/// Always answers with the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompt(pub ConflictChoice);

#[async_trait::async_trait]
impl ConflictPrompt for FixedPrompt {
    async fn choose(&self, _report: &ConflictReport) -> ConflictChoice {
        self.0
    }
}
