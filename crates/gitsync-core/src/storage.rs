use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;

use crate::model::Content;
use crate::notebook::Notebook;

/// Where file content is read from and persisted to.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> anyhow::Result<Content>;

    async fn save(&self, path: &str, content: &Content) -> anyhow::Result<()>;
}

fn is_notebook_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("ipynb"))
}

/// Content store over a directory on disk.
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait::async_trait]
impl ContentStore for FsContentStore {
    async fn get(&self, path: &str) -> anyhow::Result<Content> {
        let text = fs::read_to_string(self.resolve(path)).await?;
        if is_notebook_path(path) {
            Ok(Content::Notebook(Notebook::from_json(&text)?))
        } else {
            Ok(Content::Text(text))
        }
    }

    /// Uses tmp+rename so readers never observe a half-written file.
    async fn save(&self, path: &str, content: &Content) -> anyhow::Result<()> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", target.display()))?;
        fs::create_dir_all(parent).await?;

        let body = match content {
            Content::Text(text) => text.clone(),
            Content::Notebook(nb) => nb.to_json()?,
        };
        let filename = target
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.gitsync.tmp", filename));
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

/// In-memory content store for headless hosts and tests.
#[derive(Default)]
pub struct MemoryContentStore {
    files: DashMap<String, Content>,
    failures: AtomicUsize,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, content: Content) {
        self.files.insert(path.into(), content);
    }

    pub fn remove(&self, path: &str) -> Option<Content> {
        self.files.remove(path).map(|(_, c)| c)
    }

    pub fn peek(&self, path: &str) -> Option<Content> {
        self.files.get(path).map(|c| c.value().clone())
    }

    /// Make the next `count` operations fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, path: &str) -> anyhow::Result<Content> {
        if self.take_failure() {
            anyhow::bail!("simulated read failure for {}", path);
        }
        self.peek(path)
            .ok_or_else(|| anyhow::anyhow!("no such file: {}", path))
    }

    async fn save(&self, path: &str, content: &Content) -> anyhow::Result<()> {
        if self.take_failure() {
            anyhow::bail!("simulated write failure for {}", path);
        }
        self.files.insert(path.to_string(), content.clone());
        Ok(())
    }
}
