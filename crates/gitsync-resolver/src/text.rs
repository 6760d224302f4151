//! Three-way resolver for plain text files.
//!
//! Holds the base/local/remote snapshots of one file, merges them line by
//! line, and settles conflicts through a [`ConflictPrompt`]. The user's cursor
//! rides through the merge as a random token embedded in the local text.

use std::sync::Arc;

use gitsync_core::token::generate_token;
use gitsync_core::{CursorPosition, Origin, Result, Signal, SyncError, VersionSet};
use merge_engine::{diff3, ConflictMarkers, MergeOutput, PatternRegistry};

use crate::prompt::{ConflictChoice, ConflictPrompt, ConflictReport};

const SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Clean,
    Merging,
    Resolved,
    Conflicted,
}

pub struct TextResolver {
    path: String,
    versions: VersionSet<String>,
    merged: Option<String>,
    token: Option<String>,
    requested: Option<CursorPosition>,
    cursor: Option<CursorPosition>,
    state: ResolverState,
    conflict: bool,
    conflict_state: Arc<Signal<bool>>,
    patterns: PatternRegistry,
}

impl TextResolver {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            versions: VersionSet::new(),
            merged: None,
            token: None,
            requested: None,
            cursor: None,
            state: ResolverState::Clean,
            conflict: false,
            conflict_state: Arc::new(Signal::new()),
            patterns: PatternRegistry::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: PatternRegistry) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn add_version(&mut self, content: String, origin: Origin) {
        self.versions.set(origin, content);
    }

    pub fn versions(&self) -> &VersionSet<String> {
        &self.versions
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// Result of the last merge that produced visible output.
    pub fn merged(&self) -> Option<&str> {
        self.merged.as_deref()
    }

    pub fn conflict(&self) -> bool {
        self.conflict
    }

    /// Emits the new conflict flag whenever it flips.
    pub fn conflict_state(&self) -> Arc<Signal<bool>> {
        self.conflict_state.clone()
    }

    /// Mark a previously reported conflict as settled by the user.
    pub fn clear_conflict(&mut self) {
        self.state = ResolverState::Clean;
        self.set_conflict(false);
    }

    /// Embed a fresh token into the local version at `position`.
    pub fn set_cursor_token(&mut self, position: CursorPosition) -> Result<()> {
        let local = self.clean_local()?;
        let token = generate_token();
        let offset = byte_offset(&local, position);
        let mut tagged = String::with_capacity(local.len() + token.len());
        tagged.push_str(&local[..offset]);
        tagged.push_str(&token);
        tagged.push_str(&local[offset..]);
        self.versions.local = Some(tagged);
        self.token = Some(token);
        self.requested = Some(position);
        Ok(())
    }

    /// Cursor position recovered from the last merge.
    pub fn cursor(&self) -> Option<CursorPosition> {
        self.cursor
    }

    /// Merge local and remote against base.
    ///
    /// Returns `None` when there is nothing new to display, the merged text
    /// otherwise. Fails with [`SyncError::ConflictIgnored`] when the user
    /// chooses to ignore a conflict.
    pub async fn merge_versions(&mut self, prompt: &dyn ConflictPrompt) -> Result<Option<String>> {
        let base = self.versions.require(Origin::Base)?.clone();
        let tagged = self.versions.require(Origin::Local)?.clone();
        let remote = self.versions.require(Origin::Remote)?.clone();
        let local = self.clean_local()?;

        self.state = ResolverState::Merging;
        self.versions.local = Some(local.clone());
        self.cursor = None;

        if local == remote {
            self.versions.base = Some(remote);
            self.merged = None;
            self.token = None;
            self.state = ResolverState::Resolved;
            self.set_conflict(false);
            return Ok(None);
        }

        let mut output = self.merge_text(&tagged, &base, &remote);
        if output.conflict && tagged != local {
            // The token alone can turn a remote edit of the cursor line into
            // a conflict; prefer a clean merge without it.
            let untagged = self.merge_text(&local, &base, &remote);
            if !untagged.conflict {
                output = untagged;
            }
        }

        if !output.conflict {
            let (merged, cursor) = self.take_token(output.render(SEPARATOR, &markers()));
            self.cursor = cursor.or(self.requested);
            self.versions.base = Some(merged.clone());
            self.merged = Some(merged.clone());
            self.state = ResolverState::Resolved;
            self.set_conflict(false);
            tracing::debug!(path = %self.path, "Merged without conflict");
            return Ok(Some(merged));
        }

        let (marked, marked_cursor) = self.take_token(output.render(SEPARATOR, &markers()));
        let report = ConflictReport {
            path: self.path.clone(),
            marked: marked.clone(),
            local: local.clone(),
            remote: remote.clone(),
        };
        let choice = prompt.choose(&report).await;
        tracing::info!(path = %self.path, choice = %choice, "Conflict settled");

        let merged = match choice {
            ConflictChoice::KeepLocal => {
                let (_, cursor) = self.take_token(tagged);
                self.cursor = cursor;
                self.set_conflict(false);
                self.state = ResolverState::Resolved;
                local
            }
            ConflictChoice::KeepRemote => {
                self.cursor = self.requested;
                self.set_conflict(false);
                self.state = ResolverState::Resolved;
                remote.clone()
            }
            ConflictChoice::ViewDiff => {
                self.cursor = marked_cursor;
                self.set_conflict(true);
                self.state = ResolverState::Conflicted;
                marked
            }
            ConflictChoice::Ignore => {
                self.token = None;
                self.set_conflict(true);
                self.state = ResolverState::Conflicted;
                return Err(SyncError::ConflictIgnored {
                    path: self.path.clone(),
                });
            }
        };

        self.token = None;
        self.versions.base = Some(remote);
        self.merged = Some(merged.clone());
        Ok(Some(merged))
    }

    fn merge_text(&self, local: &str, base: &str, remote: &str) -> MergeOutput {
        let mut output = diff3::merge(local, base, remote, SEPARATOR);
        if output.conflict {
            let resolved = self.patterns.resolve_false_conflicts(&mut output);
            if resolved > 0 {
                tracing::debug!(path = %self.path, resolved, "Resolved false conflicts");
            }
        }
        output
    }

    /// Local version with any cursor token removed.
    fn clean_local(&self) -> Result<String> {
        let local = self.versions.require(Origin::Local)?;
        Ok(match &self.token {
            Some(token) => local.replace(token.as_str(), ""),
            None => local.clone(),
        })
    }

    fn take_token(&self, text: String) -> (String, Option<CursorPosition>) {
        match &self.token {
            Some(token) => locate_token(&text, token),
            None => (text, None),
        }
    }

    fn set_conflict(&mut self, conflict: bool) {
        if self.conflict != conflict {
            self.conflict = conflict;
            self.conflict_state.emit(&conflict);
        }
    }
}

fn markers() -> ConflictMarkers {
    ConflictMarkers::labelled()
}

/// Byte offset of `position` in `text`, clamped to the last line and to the
/// end of the addressed line.
pub(crate) fn byte_offset(text: &str, position: CursorPosition) -> usize {
    let mut start = 0;
    for (index, line) in text.split('\n').enumerate() {
        let last = start + line.len() >= text.len();
        if index == position.line || last {
            let column = line
                .char_indices()
                .nth(position.column)
                .map(|(b, _)| b)
                .unwrap_or(line.len());
            return start + column;
        }
        start += line.len() + 1;
    }
    text.len()
}

/// Find `token` in `text`, returning the text without it and where it was.
pub(crate) fn locate_token(text: &str, token: &str) -> (String, Option<CursorPosition>) {
    let Some(index) = text.find(token) else {
        return (text.to_string(), None);
    };
    let before = &text[..index];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count();
    (
        text.replace(token, ""),
        Some(CursorPosition::new(line, column)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::FixedPrompt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn resolver(base: &str, local: &str, remote: &str) -> TextResolver {
        let mut r = TextResolver::new("notes.txt");
        r.add_version(base.into(), Origin::Base);
        r.add_version(local.into(), Origin::Local);
        r.add_version(remote.into(), Origin::Remote);
        r
    }

    struct Recording {
        choice: ConflictChoice,
        seen: Mutex<Vec<ConflictReport>>,
    }

    #[async_trait::async_trait]
    impl ConflictPrompt for Recording {
        async fn choose(&self, report: &ConflictReport) -> ConflictChoice {
            self.seen.lock().unwrap().push(report.clone());
            self.choice
        }
    }

    #[tokio::test]
    async fn test_identical_versions_adopt_as_base() {
        let mut r = resolver("old base\n", "same\n", "same\n");
        let out = r.merge_versions(&FixedPrompt(ConflictChoice::Ignore)).await.unwrap();
        assert_eq!(out, None);
        assert_eq!(r.versions().base.as_deref(), Some("same\n"));
        assert!(!r.conflict());
        assert_eq!(r.state(), ResolverState::Resolved);
    }

    #[tokio::test]
    async fn test_identical_versions_with_cursor_token() {
        let mut r = resolver("a\n", "b\n", "b\n");
        r.set_cursor_token(CursorPosition::new(0, 1)).unwrap();
        let out = r.merge_versions(&FixedPrompt(ConflictChoice::Ignore)).await.unwrap();
        assert_eq!(out, None);
        assert_eq!(r.versions().base.as_deref(), Some("b\n"));
        assert_eq!(r.versions().local.as_deref(), Some("b\n"));
    }

    #[tokio::test]
    async fn test_clean_merge_sets_base_and_restores_cursor() {
        let base = "first\nsecond\nthird\n";
        let local = "first\nsecond line\nthird\n";
        let remote = "zeroth\nfirst\nsecond\nthird\n";
        let mut r = resolver(base, local, remote);
        r.set_cursor_token(CursorPosition::new(1, 6)).unwrap();

        let merged = r
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged, "zeroth\nfirst\nsecond line\nthird\n");
        assert_eq!(r.versions().base.as_deref(), Some(merged.as_str()));
        // One line was inserted above the cursor.
        assert_eq!(r.cursor(), Some(CursorPosition::new(2, 6)));
    }

    #[tokio::test]
    async fn test_conflict_reports_both_sides() {
        let mut r = resolver("a\n", "a\nX\n", "a\nY\n");
        let prompt = Recording {
            choice: ConflictChoice::ViewDiff,
            seen: Mutex::new(Vec::new()),
        };
        let out = r.merge_versions(&prompt).await.unwrap().unwrap();
        assert!(r.conflict());
        assert_eq!(r.state(), ResolverState::Conflicted);
        assert!(out.contains("X") && out.contains("Y"));
        assert!(out.contains("<<<<<<<<< LOCAL"));
        assert!(out.contains(">>>>>>>>> REMOTE"));
        let seen = prompt.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].marked, out);
        assert_eq!(r.versions().base.as_deref(), Some("a\nY\n"));
    }

    #[tokio::test]
    async fn test_keep_local_and_keep_remote() {
        let mut r = resolver("a\n", "a\nX\n", "a\nY\n");
        let out = r.merge_versions(&FixedPrompt(ConflictChoice::KeepLocal)).await.unwrap();
        assert_eq!(out.as_deref(), Some("a\nX\n"));
        assert!(!r.conflict());
        assert_eq!(r.versions().base.as_deref(), Some("a\nY\n"));

        let mut r = resolver("a\n", "a\nX\n", "a\nY\n");
        let out = r.merge_versions(&FixedPrompt(ConflictChoice::KeepRemote)).await.unwrap();
        assert_eq!(out.as_deref(), Some("a\nY\n"));
        assert!(!r.conflict());
    }

    #[tokio::test]
    async fn test_ignore_fails_and_flags_conflict() {
        let mut r = resolver("a\n", "a\nX\n", "a\nY\n");
        let flips = Arc::new(AtomicUsize::new(0));
        let f = flips.clone();
        let _sub = r.conflict_state().connect(move |c| {
            if *c {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = r
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap_err();
        assert!(err.is_conflict_ignored());
        assert!(r.conflict());
        assert_eq!(r.versions().base.as_deref(), Some("a\n"));
        assert_eq!(flips.load(Ordering::SeqCst), 1);

        r.clear_conflict();
        assert!(!r.conflict());
        assert_eq!(r.state(), ResolverState::Clean);
    }

    #[tokio::test]
    async fn test_prefix_false_conflict_needs_no_prompt() {
        let mut r = resolver("", "draft\nmore text\n", "draft\n");
        let prompt = Recording {
            choice: ConflictChoice::Ignore,
            seen: Mutex::new(Vec::new()),
        };
        let out = r.merge_versions(&prompt).await.unwrap();
        assert_eq!(out.as_deref(), Some("draft\nmore text\n"));
        assert!(prompt.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cursor_line_edited_remotely_does_not_conflict() {
        let mut r = resolver("a\nb\nc\n", "a\nb\nc\nd\n", "a\nB\nc\n");
        r.set_cursor_token(CursorPosition::new(1, 1)).unwrap();
        let out = r
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("a\nB\nc\nd\n"));
        assert_eq!(r.cursor(), Some(CursorPosition::new(1, 1)));
    }

    #[tokio::test]
    async fn test_missing_version() {
        let mut r = TextResolver::new("x");
        r.add_version("a".into(), Origin::Local);
        let err = r
            .merge_versions(&FixedPrompt(ConflictChoice::KeepLocal))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingVersion(Origin::Base)));
    }

    #[test]
    fn test_byte_offset_clamps() {
        let text = "héllo\nworld";
        assert_eq!(byte_offset(text, CursorPosition::new(0, 2)), 3);
        assert_eq!(byte_offset(text, CursorPosition::new(1, 99)), text.len());
        assert_eq!(byte_offset(text, CursorPosition::new(7, 0)), 7);
        assert_eq!(byte_offset("", CursorPosition::new(3, 3)), 0);
    }

    #[test]
    fn test_locate_token() {
        let (text, pos) = locate_token("ab\ncTOKd\n", "TOK");
        assert_eq!(text, "ab\ncd\n");
        assert_eq!(pos, Some(CursorPosition::new(1, 1)));
        assert_eq!(locate_token("none", "TOK").1, None);
    }
}
