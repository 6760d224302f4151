//! Binds one open editor document to its resolver.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use gitsync_core::{Content, ContentStore, Notebook, Origin, Result, Signal, Subscription};
use gitsync_resolver::{ConflictPrompt, NotebookResolver, TextResolver};

use crate::editor::{NotebookEditor, TextEditor};

/// Conflict flag mirrored out of a resolver so it can be read without
/// waiting on an in-flight merge.
struct ConflictMirror {
    flag: Arc<AtomicBool>,
    signal: Arc<Signal<bool>>,
    _subscription: Subscription,
}

impl ConflictMirror {
    fn new(signal: Arc<Signal<bool>>) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        let f = flag.clone();
        let subscription = signal.connect(move |conflict| f.store(*conflict, Ordering::SeqCst));
        Self {
            flag,
            signal,
            _subscription: subscription,
        }
    }

    fn get(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct TextFile {
    path: String,
    repo_path: PathBuf,
    editor: Arc<dyn TextEditor>,
    store: Arc<dyn ContentStore>,
    resolver: Mutex<TextResolver>,
    conflict: ConflictMirror,
}

impl TextFile {
    pub fn new(
        path: impl Into<String>,
        repo_path: impl Into<PathBuf>,
        editor: Arc<dyn TextEditor>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let path = path.into();
        let mut resolver = TextResolver::new(path.clone());
        resolver.add_version(editor.content(), Origin::Base);
        let conflict = ConflictMirror::new(resolver.conflict_state());
        Self {
            path,
            repo_path: repo_path.into(),
            editor,
            store,
            resolver: Mutex::new(resolver),
            conflict,
        }
    }

    async fn save(&self) -> Result<()> {
        if let Err(e) = self.editor.refresh().await {
            tracing::warn!(path = %self.path, error = %e, "Failed to refresh file");
            return Ok(());
        }
        let text = self.editor.content();
        if let Err(e) = self.store.save(&self.path, &Content::Text(text.clone())).await {
            tracing::warn!(path = %self.path, error = %e, "Failed to save file");
            return Ok(());
        }
        self.resolver.lock().await.add_version(text, Origin::Base);
        self.editor.mark_saved();
        Ok(())
    }

    async fn reload(&self, prompt: &dyn ConflictPrompt) -> Result<()> {
        let remote = match self.store.get(&self.path).await {
            Ok(Content::Text(text)) => text,
            Ok(other) => {
                tracing::warn!(path = %self.path, kind = other.kind(), "Expected text content");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "Failed to fetch remote content");
                return Ok(());
            }
        };

        let viewport = self.editor.viewport();
        let (merged, cursor) = {
            let mut resolver = self.resolver.lock().await;
            resolver.add_version(remote, Origin::Remote);
            resolver.add_version(self.editor.content(), Origin::Local);
            resolver.set_cursor_token(self.editor.cursor())?;
            let merged = resolver.merge_versions(prompt).await?;
            (merged, resolver.cursor())
        };
        let Some(merged) = merged else {
            return Ok(());
        };

        if let Err(e) = self.store.save(&self.path, &Content::Text(merged)).await {
            tracing::warn!(path = %self.path, error = %e, "Failed to save merged content");
            return Ok(());
        }
        if let Err(e) = self.editor.revert().await {
            tracing::warn!(path = %self.path, error = %e, "Failed to revert editor");
            return Ok(());
        }
        if let Some(cursor) = cursor {
            self.editor.set_cursor(cursor);
        }
        self.editor.set_viewport(viewport);
        Ok(())
    }
}

pub struct NotebookFile {
    path: String,
    repo_path: PathBuf,
    editor: Arc<dyn NotebookEditor>,
    store: Arc<dyn ContentStore>,
    resolver: Mutex<NotebookResolver>,
    conflict: ConflictMirror,
}

impl NotebookFile {
    pub fn new(
        path: impl Into<String>,
        repo_path: impl Into<PathBuf>,
        editor: Arc<dyn NotebookEditor>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let path = path.into();
        let mut resolver = NotebookResolver::new(path.clone());
        resolver.add_version(editor.content(), Origin::Base);
        let conflict = ConflictMirror::new(resolver.conflict_state());
        Self {
            path,
            repo_path: repo_path.into(),
            editor,
            store,
            resolver: Mutex::new(resolver),
            conflict,
        }
    }

    async fn save(&self) -> Result<()> {
        if let Err(e) = self.editor.refresh().await {
            tracing::warn!(path = %self.path, error = %e, "Failed to refresh notebook");
            return Ok(());
        }
        let notebook = self.editor.content();
        if let Err(e) = self
            .store
            .save(&self.path, &Content::Notebook(notebook.clone()))
            .await
        {
            tracing::warn!(path = %self.path, error = %e, "Failed to save notebook");
            return Ok(());
        }
        self.resolver.lock().await.add_version(notebook, Origin::Base);
        self.editor.mark_saved();
        Ok(())
    }

    async fn reload(&self, prompt: &dyn ConflictPrompt) -> Result<()> {
        let remote: Notebook = match self.store.get(&self.path).await {
            Ok(Content::Notebook(notebook)) => notebook,
            Ok(other) => {
                tracing::warn!(path = %self.path, kind = other.kind(), "Expected notebook content");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(path = %self.path, error = %e, "Failed to fetch remote notebook");
                return Ok(());
            }
        };

        let viewport = self.editor.viewport();
        let (merged, cursor) = {
            let mut resolver = self.resolver.lock().await;
            resolver.add_version(remote, Origin::Remote);
            resolver.add_version(self.editor.content(), Origin::Local);
            resolver.set_cursor_token(self.editor.cursor())?;
            let merged = resolver.merge_versions(prompt).await?;
            (merged, resolver.cursor())
        };
        let Some(merged) = merged else {
            return Ok(());
        };

        if let Err(e) = self.store.save(&self.path, &Content::Notebook(merged)).await {
            tracing::warn!(path = %self.path, error = %e, "Failed to save merged notebook");
            return Ok(());
        }
        if let Err(e) = self.editor.revert().await {
            tracing::warn!(path = %self.path, error = %e, "Failed to revert notebook editor");
            return Ok(());
        }
        if let Some(cursor) = cursor {
            self.editor.set_cursor(cursor);
        }
        self.editor.set_viewport(viewport);
        Ok(())
    }
}

/// An open document under synchronization.
pub enum SyncFile {
    Text(TextFile),
    Notebook(NotebookFile),
}

impl SyncFile {
    pub fn text(
        path: impl Into<String>,
        repo_path: impl Into<PathBuf>,
        editor: Arc<dyn TextEditor>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        SyncFile::Text(TextFile::new(path, repo_path, editor, store))
    }

    pub fn notebook(
        path: impl Into<String>,
        repo_path: impl Into<PathBuf>,
        editor: Arc<dyn NotebookEditor>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        SyncFile::Notebook(NotebookFile::new(path, repo_path, editor, store))
    }

    pub fn path(&self) -> &str {
        match self {
            SyncFile::Text(f) => &f.path,
            SyncFile::Notebook(f) => &f.path,
        }
    }

    /// Root of the repository the file belongs to.
    pub fn repo_path(&self) -> &Path {
        match self {
            SyncFile::Text(f) => &f.repo_path,
            SyncFile::Notebook(f) => &f.repo_path,
        }
    }

    /// Persist the editor content and adopt it as the new base.
    ///
    /// Storage failures are logged, not returned.
    pub async fn save(&self) -> Result<()> {
        match self {
            SyncFile::Text(f) => f.save().await,
            SyncFile::Notebook(f) => f.save().await,
        }
    }

    /// Merge the stored content into the editor.
    ///
    /// Storage failures are logged, not returned. Fails with
    /// `SyncError::ConflictIgnored` when the user leaves a conflict unresolved.
    pub async fn reload(&self, prompt: &dyn ConflictPrompt) -> Result<()> {
        match self {
            SyncFile::Text(f) => f.reload(prompt).await,
            SyncFile::Notebook(f) => f.reload(prompt).await,
        }
    }

    pub fn conflict(&self) -> bool {
        match self {
            SyncFile::Text(f) => f.conflict.get(),
            SyncFile::Notebook(f) => f.conflict.get(),
        }
    }

    pub fn dirty(&self) -> bool {
        match self {
            SyncFile::Text(f) => f.editor.is_dirty(),
            SyncFile::Notebook(f) => f.editor.is_dirty(),
        }
    }

    pub async fn clear_conflict(&self) {
        match self {
            SyncFile::Text(f) => f.resolver.lock().await.clear_conflict(),
            SyncFile::Notebook(f) => f.resolver.lock().await.clear_conflict(),
        }
    }

    pub fn conflict_state(&self) -> Arc<Signal<bool>> {
        match self {
            SyncFile::Text(f) => f.conflict.signal.clone(),
            SyncFile::Notebook(f) => f.conflict.signal.clone(),
        }
    }

    pub fn dirty_state(&self) -> Arc<Signal<bool>> {
        match self {
            SyncFile::Text(f) => f.editor.dirty_changed(),
            SyncFile::Notebook(f) => f.editor.dirty_changed(),
        }
    }
}
