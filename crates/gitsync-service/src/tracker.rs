//! The set of open files and their aggregate conflict/dirty state.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use futures::future::join_all;

use gitsync_core::{Result, Signal, Subscription, SyncError};
use gitsync_resolver::ConflictPrompt;

use crate::file::SyncFile;

/// Paths currently conflicted or dirty. Updated one path at a time from the
/// files' signals; the aggregate flags are "list is non-empty".
#[derive(Default)]
struct Aggregates {
    conflicts: Vec<String>,
    changed: Vec<String>,
}

#[derive(Clone, Copy)]
enum Flag {
    Conflict,
    Dirty,
}

struct Shared {
    aggregates: Mutex<Aggregates>,
    conflict_state: Arc<Signal<bool>>,
    dirty_state: Arc<Signal<bool>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Aggregates> {
        self.aggregates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `path`'s flag and emit the aggregate only if it flipped.
    fn update(&self, flag: Flag, path: &str, value: bool) {
        let flipped = {
            let mut aggregates = self.lock();
            let list = match flag {
                Flag::Conflict => &mut aggregates.conflicts,
                Flag::Dirty => &mut aggregates.changed,
            };
            let before = !list.is_empty();
            let present = list.iter().position(|p| p == path);
            match (value, present) {
                (true, None) => list.push(path.to_string()),
                (false, Some(index)) => {
                    list.swap_remove(index);
                }
                _ => {}
            }
            let after = !list.is_empty();
            (before != after).then_some(after)
        };

        if let Some(state) = flipped {
            match flag {
                Flag::Conflict => {
                    tracing::info!(conflict = state, "Aggregate conflict state changed");
                    self.conflict_state.emit(&state);
                }
                Flag::Dirty => {
                    tracing::debug!(dirty = state, "Aggregate dirty state changed");
                    self.dirty_state.emit(&state);
                }
            }
        }
    }
}

struct Tracked {
    file: Arc<SyncFile>,
    subscriptions: [Subscription; 2],
}

pub struct FileTracker {
    files: DashMap<String, Tracked>,
    current: Mutex<Option<String>>,
    shared: Arc<Shared>,
}

impl Default for FileTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTracker {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
            current: Mutex::new(None),
            shared: Arc::new(Shared {
                aggregates: Mutex::new(Aggregates::default()),
                conflict_state: Arc::new(Signal::new()),
                dirty_state: Arc::new(Signal::new()),
            }),
        }
    }

    /// Start tracking `file`. A file already open under the same path is
    /// closed first.
    pub fn open(&self, file: SyncFile) -> Arc<SyncFile> {
        let path = file.path().to_string();
        if self.files.contains_key(&path) {
            self.close(&path);
        }
        let file = Arc::new(file);

        let conflict_sub = {
            let shared = self.shared.clone();
            let path = path.clone();
            file.conflict_state()
                .connect(move |value| shared.update(Flag::Conflict, &path, *value))
        };
        let dirty_sub = {
            let shared = self.shared.clone();
            let path = path.clone();
            file.dirty_state()
                .connect(move |value| shared.update(Flag::Dirty, &path, *value))
        };

        self.files.insert(
            path.clone(),
            Tracked {
                file: file.clone(),
                subscriptions: [conflict_sub, dirty_sub],
            },
        );
        self.shared.update(Flag::Conflict, &path, file.conflict());
        self.shared.update(Flag::Dirty, &path, file.dirty());
        tracing::debug!(path = %path, "Tracking file");
        file
    }

    /// Stop tracking `path`, dropping its subscriptions and withdrawing it
    /// from the aggregates.
    pub fn close(&self, path: &str) -> Option<Arc<SyncFile>> {
        let (_, tracked) = self.files.remove(path)?;
        drop(tracked.subscriptions);
        self.shared.update(Flag::Conflict, path, false);
        self.shared.update(Flag::Dirty, path, false);

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() == Some(path) {
            *current = None;
        }
        tracing::debug!(path = %path, "Closed file");
        Some(tracked.file)
    }

    pub fn get(&self, path: &str) -> Option<Arc<SyncFile>> {
        self.files.get(path).map(|t| t.file.clone())
    }

    /// Open files ordered by path.
    pub fn files(&self) -> Vec<Arc<SyncFile>> {
        let mut files: Vec<Arc<SyncFile>> = self.files.iter().map(|t| t.file.clone()).collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        files
    }

    pub fn files_in_repo(&self, repo: &Path) -> Vec<Arc<SyncFile>> {
        self.files()
            .into_iter()
            .filter(|f| f.repo_path() == repo)
            .collect()
    }

    /// Focus `path`. Returns false if it is not open.
    pub fn set_current(&self, path: Option<&str>) -> bool {
        if path.is_some_and(|p| !self.files.contains_key(p)) {
            return false;
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = path.map(str::to_string);
        true
    }

    pub fn current(&self) -> Option<Arc<SyncFile>> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        current.and_then(|p| self.get(&p))
    }

    pub fn conflict(&self) -> bool {
        !self.shared.lock().conflicts.is_empty()
    }

    pub fn dirty(&self) -> bool {
        !self.shared.lock().changed.is_empty()
    }

    pub fn conflict_state(&self) -> Arc<Signal<bool>> {
        self.shared.conflict_state.clone()
    }

    pub fn dirty_state(&self) -> Arc<Signal<bool>> {
        self.shared.dirty_state.clone()
    }

    /// Save every open file concurrently.
    pub async fn save_all(&self) -> Result<()> {
        let files = self.files();
        let results = join_all(files.iter().map(|f| async move {
            (f.path().to_string(), f.save().await)
        }))
        .await;
        collect_failures("save", results)
    }

    /// Reload every open file concurrently.
    ///
    /// Every file runs to completion before failures are reported.
    pub async fn reload_all(&self, prompt: &dyn ConflictPrompt) -> Result<()> {
        let files = self.files();
        let results = join_all(files.iter().map(|f| async move {
            (f.path().to_string(), f.reload(prompt).await)
        }))
        .await;
        collect_failures("reload", results)
    }
}

/// An ignored conflict is returned as is; anything else is aggregated.
fn collect_failures(action: &str, results: Vec<(String, Result<()>)>) -> Result<()> {
    let mut ignored = None;
    let mut failures = Vec::new();
    for (path, result) in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_conflict_ignored() => {
                ignored.get_or_insert(e);
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to {}", action);
                failures.push((path, e.to_string()));
            }
        }
    }
    if let Some(e) = ignored {
        return Err(e);
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(SyncError::Files {
            action: action.to_string(),
            failures,
        })
    }
}
