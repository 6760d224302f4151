//! Host editor seams.
//!
//! A file wrapper talks to whatever editor holds the open document through
//! these traits. The memory implementations keep the document model in
//! process and revert from a [`ContentStore`]. The disk implementations
//! serve a headless host (the CLI) whose user edits the stored files directly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gitsync_core::{Content, ContentStore, CursorPosition, Notebook, Signal, Viewport};
use gitsync_resolver::NotebookCursor;

#[async_trait::async_trait]
pub trait TextEditor: Send + Sync {
    fn content(&self) -> String;

    fn cursor(&self) -> CursorPosition;

    fn set_cursor(&self, cursor: CursorPosition);

    fn viewport(&self) -> Viewport;

    fn set_viewport(&self, viewport: Viewport);

    fn is_dirty(&self) -> bool;

    /// Clear the dirty flag after the content was persisted.
    fn mark_saved(&self);

    /// Emits the dirty flag whenever it flips.
    fn dirty_changed(&self) -> Arc<Signal<bool>>;

    /// Reload the document model from storage, discarding unsaved edits.
    async fn revert(&self) -> anyhow::Result<()>;

    /// Pick up edits made outside the editor before the content is saved.
    async fn refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait NotebookEditor: Send + Sync {
    fn content(&self) -> Notebook;

    fn cursor(&self) -> NotebookCursor;

    fn set_cursor(&self, cursor: NotebookCursor);

    fn viewport(&self) -> Viewport;

    fn set_viewport(&self, viewport: Viewport);

    fn is_dirty(&self) -> bool;

    fn mark_saved(&self);

    fn dirty_changed(&self) -> Arc<Signal<bool>>;

    async fn revert(&self) -> anyhow::Result<()>;

    async fn refresh(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Document types a [`MemoryEditor`] can hold.
pub trait Document: Clone + Send + Sync + 'static {
    fn from_content(path: &str, content: Content) -> anyhow::Result<Self>;
}

impl Document for String {
    fn from_content(path: &str, content: Content) -> anyhow::Result<Self> {
        match content {
            Content::Text(text) => Ok(text),
            other => anyhow::bail!("{} holds {} content, expected text", path, other.kind()),
        }
    }
}

impl Document for Notebook {
    fn from_content(path: &str, content: Content) -> anyhow::Result<Self> {
        match content {
            Content::Notebook(notebook) => Ok(notebook),
            other => anyhow::bail!("{} holds {} content, expected a notebook", path, other.kind()),
        }
    }
}

struct EditorState<D, K> {
    document: D,
    cursor: K,
    viewport: Viewport,
    dirty: bool,
}

/// In-process editor over a shared content store.
pub struct MemoryEditor<D, K> {
    path: String,
    store: Arc<dyn ContentStore>,
    state: Mutex<EditorState<D, K>>,
    dirty_changed: Arc<Signal<bool>>,
}

pub type MemoryTextEditor = MemoryEditor<String, CursorPosition>;
pub type MemoryNotebookEditor = MemoryEditor<Notebook, NotebookCursor>;

impl<D: Document, K: Copy + Default + Send + 'static> MemoryEditor<D, K> {
    /// Open `path` from `store`.
    pub async fn open(path: impl Into<String>, store: Arc<dyn ContentStore>) -> anyhow::Result<Self> {
        let path = path.into();
        let document = D::from_content(&path, store.get(&path).await?)?;
        Ok(Self::with_document(path, store, document))
    }

    pub fn with_document(path: impl Into<String>, store: Arc<dyn ContentStore>, document: D) -> Self {
        Self {
            path: path.into(),
            store,
            state: Mutex::new(EditorState {
                document,
                cursor: K::default(),
                viewport: Viewport::default(),
                dirty: false,
            }),
            dirty_changed: Arc::new(Signal::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn document(&self) -> D {
        self.lock().document.clone()
    }

    /// Replace the document as if the user typed it.
    pub fn edit(&self, document: D) {
        self.replace(document, true);
    }

    fn replace(&self, document: D, dirty: bool) {
        self.lock().document = document;
        self.set_dirty(dirty);
    }

    async fn fetch(&self) -> anyhow::Result<D> {
        D::from_content(&self.path, self.store.get(&self.path).await?)
    }

    fn lock(&self) -> MutexGuard<'_, EditorState<D, K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_dirty(&self, dirty: bool) {
        let changed = {
            let mut state = self.lock();
            let changed = state.dirty != dirty;
            state.dirty = dirty;
            changed
        };
        if changed {
            self.dirty_changed.emit(&dirty);
        }
    }

    fn cursor_value(&self) -> K {
        self.lock().cursor
    }

    fn set_cursor_value(&self, cursor: K) {
        self.lock().cursor = cursor;
    }

    fn viewport_value(&self) -> Viewport {
        self.lock().viewport
    }

    fn set_viewport_value(&self, viewport: Viewport) {
        self.lock().viewport = viewport;
    }

    fn dirty_value(&self) -> bool {
        self.lock().dirty
    }

    async fn reload_document(&self) -> anyhow::Result<D> {
        let document = self.fetch().await?;
        self.replace(document.clone(), false);
        Ok(document)
    }
}

#[async_trait::async_trait]
impl TextEditor for MemoryTextEditor {
    fn content(&self) -> String {
        self.document()
    }

    fn cursor(&self) -> CursorPosition {
        self.cursor_value()
    }

    fn set_cursor(&self, cursor: CursorPosition) {
        self.set_cursor_value(cursor);
    }

    fn viewport(&self) -> Viewport {
        self.viewport_value()
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.set_viewport_value(viewport);
    }

    fn is_dirty(&self) -> bool {
        self.dirty_value()
    }

    fn mark_saved(&self) {
        self.set_dirty(false);
    }

    fn dirty_changed(&self) -> Arc<Signal<bool>> {
        self.dirty_changed.clone()
    }

    async fn revert(&self) -> anyhow::Result<()> {
        self.reload_document().await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl NotebookEditor for MemoryNotebookEditor {
    fn content(&self) -> Notebook {
        self.document()
    }

    fn cursor(&self) -> NotebookCursor {
        self.cursor_value()
    }

    fn set_cursor(&self, cursor: NotebookCursor) {
        self.set_cursor_value(cursor);
    }

    fn viewport(&self) -> Viewport {
        self.viewport_value()
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.set_viewport_value(viewport);
    }

    fn is_dirty(&self) -> bool {
        self.dirty_value()
    }

    fn mark_saved(&self) {
        self.set_dirty(false);
    }

    fn dirty_changed(&self) -> Arc<Signal<bool>> {
        self.dirty_changed.clone()
    }

    async fn revert(&self) -> anyhow::Result<()> {
        self.reload_document().await.map(|_| ())
    }
}

/// Editor over a document that is edited out of process, straight in
/// storage. [`refresh`](TextEditor::refresh) re-reads it; the document is
/// dirty while it differs from what was last saved or reverted to.
pub struct DiskEditor<D, K> {
    inner: MemoryEditor<D, K>,
    saved: Mutex<D>,
}

pub type DiskTextEditor = DiskEditor<String, CursorPosition>;
pub type DiskNotebookEditor = DiskEditor<Notebook, NotebookCursor>;

impl<D: Document + PartialEq, K: Copy + Default + Send + 'static> DiskEditor<D, K> {
    pub async fn open(path: impl Into<String>, store: Arc<dyn ContentStore>) -> anyhow::Result<Self> {
        let inner = MemoryEditor::open(path, store).await?;
        let saved = Mutex::new(inner.document());
        Ok(Self { inner, saved })
    }

    pub fn path(&self) -> &str {
        self.inner.path()
    }

    fn saved(&self) -> MutexGuard<'_, D> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh_document(&self) -> anyhow::Result<()> {
        let document = self.inner.fetch().await?;
        let dirty = document != *self.saved();
        self.inner.replace(document, dirty);
        Ok(())
    }

    fn adopt_saved(&self) {
        *self.saved() = self.inner.document();
        self.inner.set_dirty(false);
    }

    async fn revert_document(&self) -> anyhow::Result<()> {
        let document = self.inner.reload_document().await?;
        *self.saved() = document;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TextEditor for DiskTextEditor {
    fn content(&self) -> String {
        self.inner.document()
    }

    fn cursor(&self) -> CursorPosition {
        self.inner.cursor_value()
    }

    fn set_cursor(&self, cursor: CursorPosition) {
        self.inner.set_cursor_value(cursor);
    }

    fn viewport(&self) -> Viewport {
        self.inner.viewport_value()
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.inner.set_viewport_value(viewport);
    }

    fn is_dirty(&self) -> bool {
        self.inner.dirty_value()
    }

    fn mark_saved(&self) {
        self.adopt_saved();
    }

    fn dirty_changed(&self) -> Arc<Signal<bool>> {
        self.inner.dirty_changed.clone()
    }

    async fn revert(&self) -> anyhow::Result<()> {
        self.revert_document().await
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        self.refresh_document().await
    }
}

#[async_trait::async_trait]
impl NotebookEditor for DiskNotebookEditor {
    fn content(&self) -> Notebook {
        self.inner.document()
    }

    fn cursor(&self) -> NotebookCursor {
        self.inner.cursor_value()
    }

    fn set_cursor(&self, cursor: NotebookCursor) {
        self.inner.set_cursor_value(cursor);
    }

    fn viewport(&self) -> Viewport {
        self.inner.viewport_value()
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.inner.set_viewport_value(viewport);
    }

    fn is_dirty(&self) -> bool {
        self.inner.dirty_value()
    }

    fn mark_saved(&self) {
        self.adopt_saved();
    }

    fn dirty_changed(&self) -> Arc<Signal<bool>> {
        self.inner.dirty_changed.clone()
    }

    async fn revert(&self) -> anyhow::Result<()> {
        self.revert_document().await
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        self.refresh_document().await
    }
}
