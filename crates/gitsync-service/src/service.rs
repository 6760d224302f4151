use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use gitsync_core::{GitOps, GitOutcome, Result, Signal, Subscription, SyncError, SyncStatus};
use gitsync_resolver::ConflictPrompt;

use crate::tracker::FileTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: SyncStatus,
    pub message: Option<String>,
}

struct State {
    running: bool,
    blocked: bool,
    /// Start again once unblocked.
    resume: bool,
    status: SyncStatus,
    message: Option<String>,
    stop_tx: Option<tokio::sync::broadcast::Sender<()>>,
}

struct Inner {
    tracker: Arc<FileTracker>,
    git: Arc<dyn GitOps>,
    prompt: Arc<dyn ConflictPrompt>,
    interval: Duration,
    state: Mutex<State>,
    status_changed: Arc<Signal<StatusUpdate>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Periodic save → git sync → reload loop over the tracker's files.
///
/// Stops and blocks itself while any tracked file is conflicted, and resumes
/// the loop it stopped once the last conflict is cleared.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

impl SyncService {
    pub fn new(
        tracker: Arc<FileTracker>,
        git: Arc<dyn GitOps>,
        prompt: Arc<dyn ConflictPrompt>,
        interval: Duration,
    ) -> Self {
        let blocked = tracker.conflict();
        let inner = Arc::new(Inner {
            tracker: tracker.clone(),
            git,
            prompt,
            interval,
            state: Mutex::new(State {
                running: false,
                blocked,
                resume: false,
                status: SyncStatus::UpToDate,
                message: None,
                stop_tx: None,
            }),
            status_changed: Arc::new(Signal::new()),
            subscriptions: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let conflict_sub = tracker.conflict_state().connect(move |conflict| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.on_conflict(*conflict);
            }
        });
        let weak = Arc::downgrade(&inner);
        let dirty_sub = tracker.dirty_state().connect(move |dirty| {
            if let Some(inner) = Weak::upgrade(&weak) {
                inner.on_dirty(*dirty);
            }
        });
        inner.lock_subscriptions().extend([conflict_sub, dirty_sub]);

        Self { inner }
    }

    /// Start the loop. No-op (returns false) when already running or blocked;
    /// a start while blocked takes effect once the conflicts clear.
    pub fn start(&self) -> bool {
        Inner::start(&self.inner)
    }

    /// Prevent the next cycle. A cycle in flight runs to completion.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn running(&self) -> bool {
        self.inner.lock().running
    }

    pub fn blocked(&self) -> bool {
        self.inner.lock().blocked
    }

    pub fn status(&self) -> (SyncStatus, Option<String>) {
        let state = self.inner.lock();
        (state.status, state.message.clone())
    }

    pub fn status_changed(&self) -> Arc<Signal<StatusUpdate>> {
        self.inner.status_changed.clone()
    }

    pub fn tracker(&self) -> &Arc<FileTracker> {
        &self.inner.tracker
    }

    /// One save → git → reload cycle. Errors are returned, not recorded.
    pub async fn sync(&self) -> Result<()> {
        self.inner.sync().await
    }

    /// One cycle, turning a failure into `warning` status.
    pub async fn run_cycle(&self) -> SyncStatus {
        self.inner.run_cycle().await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start(this: &Arc<Self>) -> bool {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Sync service needs a tokio runtime");
                return false;
            }
        };

        let (stop_tx, stop_rx) = tokio::sync::broadcast::channel::<()>(1);
        {
            let mut state = this.lock();
            if state.blocked {
                state.resume = true;
                return false;
            }
            if state.running {
                return false;
            }
            state.running = true;
            state.stop_tx = Some(stop_tx);
        }

        tracing::info!(interval_secs = this.interval.as_secs(), "Sync service started");
        handle.spawn(run_loop(Arc::downgrade(this), stop_rx));
        true
    }

    fn stop(&self) {
        self.halt(false);
    }

    /// Stop the loop, optionally marking the service blocked in the same step.
    /// Only a blocking stop of a running loop is resumed later.
    fn halt(&self, block: bool) {
        let stop_tx = {
            let mut state = self.lock();
            if block {
                state.resume |= state.running;
                state.blocked = true;
            } else {
                state.resume = false;
            }
            state.running = false;
            state.stop_tx.take()
        };
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
            tracing::info!("Sync service stopped");
        }
    }

    fn on_conflict(self: &Arc<Self>, conflict: bool) {
        if conflict {
            tracing::warn!("Conflict detected, blocking sync");
            self.halt(true);
        } else {
            let resume = {
                let mut state = self.lock();
                state.blocked = false;
                std::mem::take(&mut state.resume)
            };
            if resume {
                tracing::info!("Conflicts cleared, resuming sync");
                Inner::start(self);
            } else {
                tracing::info!("Conflicts cleared");
            }
        }
    }

    /// Reflect unsaved edits while idle; cycle statuses take precedence.
    fn on_dirty(&self, dirty: bool) {
        let status = self.lock().status;
        if matches!(status, SyncStatus::UpToDate | SyncStatus::Dirty) {
            let next = if dirty {
                SyncStatus::Dirty
            } else {
                SyncStatus::UpToDate
            };
            self.set_status(next, None);
        }
    }

    fn set_status(&self, status: SyncStatus, message: Option<String>) {
        {
            let mut state = self.lock();
            if state.status == status && state.message == message {
                return;
            }
            state.status = status;
            state.message = message.clone();
        }
        self.status_changed.emit(&StatusUpdate { status, message });
    }

    async fn sync(&self) -> Result<()> {
        self.tracker.save_all().await?;
        self.set_status(SyncStatus::Sync, None);

        if self.git.sync().await? == GitOutcome::Conflict {
            return Err(SyncError::RepoConflict);
        }

        self.set_status(SyncStatus::Merge, None);
        self.tracker.reload_all(self.prompt.as_ref()).await?;
        self.set_status(SyncStatus::UpToDate, None);
        Ok(())
    }

    async fn run_cycle(&self) -> SyncStatus {
        if let Err(e) = self.sync().await {
            tracing::warn!(error = %e, "Sync cycle failed");
            self.set_status(SyncStatus::Warning, Some(e.to_string()));
        }
        self.lock().status
    }
}

/// Holds the service weakly between cycles so dropping every handle ends it.
async fn run_loop(inner: Weak<Inner>, mut stop: tokio::sync::broadcast::Receiver<()>) {
    loop {
        let Some(this) = inner.upgrade() else {
            break;
        };
        this.run_cycle().await;
        let interval = this.interval;
        drop(this);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.recv() => {
                tracing::debug!("Sync loop exiting");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::MemoryTextEditor;
    use crate::file::SyncFile;
    use gitsync_core::{Content, MemoryContentStore};
    use gitsync_resolver::{ConflictChoice, FixedPrompt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Git stand-in: runs `hook` once, then answers with `outcome`.
    struct FakeGit {
        calls: AtomicUsize,
        outcome: Mutex<Result<GitOutcome>>,
        hook: Mutex<Option<Hook>>,
    }

    impl FakeGit {
        fn new(outcome: Result<GitOutcome>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: Mutex::new(outcome),
                hook: Mutex::new(None),
            }
        }

        fn on_next_sync(&self, hook: impl Fn() + Send + Sync + 'static) {
            *self.hook.lock().unwrap() = Some(Box::new(hook));
        }
    }

    #[async_trait::async_trait]
    impl GitOps for FakeGit {
        async fn sync(&self) -> Result<GitOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
            match &*self.outcome.lock().unwrap() {
                Ok(outcome) => Ok(*outcome),
                Err(e) => Err(SyncError::Git(e.to_string())),
            }
        }
    }

    struct Fixture {
        store: Arc<MemoryContentStore>,
        editor: Arc<MemoryTextEditor>,
        tracker: Arc<FileTracker>,
        git: Arc<FakeGit>,
    }

    async fn fixture(outcome: Result<GitOutcome>) -> Fixture {
        let store = Arc::new(MemoryContentStore::new());
        store.insert("notes.txt", Content::Text("a\n".into()));
        let editor = Arc::new(
            MemoryTextEditor::open("notes.txt", store.clone())
                .await
                .unwrap(),
        );
        let tracker = Arc::new(FileTracker::new());
        tracker.open(SyncFile::text(
            "notes.txt",
            "/repo",
            editor.clone(),
            store.clone(),
        ));
        Fixture {
            store,
            editor,
            tracker,
            git: Arc::new(FakeGit::new(outcome)),
        }
    }

    fn service(fx: &Fixture, choice: ConflictChoice, interval: Duration) -> SyncService {
        SyncService::new(
            fx.tracker.clone(),
            fx.git.clone(),
            Arc::new(FixedPrompt(choice)),
            interval,
        )
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_cycle_walks_statuses() {
        let fx = fixture(Ok(GitOutcome::Success)).await;
        let svc = service(&fx, ConflictChoice::KeepLocal, Duration::from_secs(60));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = svc
            .status_changed()
            .connect(move |update| s.lock().unwrap().push(update.status));

        fx.editor.edit("a\nb\n".into());
        assert_eq!(svc.status().0, SyncStatus::Dirty);

        assert_eq!(svc.run_cycle().await, SyncStatus::UpToDate);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SyncStatus::Dirty,
                SyncStatus::UpToDate,
                SyncStatus::Sync,
                SyncStatus::Merge,
                SyncStatus::UpToDate
            ]
        );
        assert_eq!(fx.store.peek("notes.txt"), Some(Content::Text("a\nb\n".into())));
    }

    #[tokio::test]
    async fn test_git_failure_sets_warning() {
        let fx = fixture(Err(SyncError::Git("remote unreachable".into()))).await;
        let svc = service(&fx, ConflictChoice::KeepLocal, Duration::from_secs(60));
        assert_eq!(svc.run_cycle().await, SyncStatus::Warning);
        let (_, message) = svc.status();
        assert!(message.unwrap().contains("remote unreachable"));
    }

    #[tokio::test]
    async fn test_repo_conflict_sets_warning() {
        let fx = fixture(Ok(GitOutcome::Conflict)).await;
        let svc = service(&fx, ConflictChoice::KeepLocal, Duration::from_secs(60));
        assert_eq!(svc.run_cycle().await, SyncStatus::Warning);
        assert!(svc.sync().await.is_err());
    }

    #[tokio::test]
    async fn test_loop_repeats_after_interval() {
        let fx = fixture(Ok(GitOutcome::Success)).await;
        let svc = service(&fx, ConflictChoice::KeepLocal, Duration::from_millis(20));
        assert!(svc.start());
        assert!(!svc.start());
        assert!(wait_for(|| fx.git.calls.load(Ordering::SeqCst) >= 3).await);

        svc.stop();
        assert!(!svc.running());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let after_stop = fx.git.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.git.calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_conflict_blocks_until_cleared() {
        let fx = fixture(Ok(GitOutcome::Success)).await;
        let svc = service(&fx, ConflictChoice::Ignore, Duration::from_secs(3600));

        // The user keeps typing while the remote changes the same line.
        let store = fx.store.clone();
        let editor = fx.editor.clone();
        fx.git.on_next_sync(move || {
            store.insert("notes.txt", Content::Text("a\nremote\n".into()));
            editor.edit("a\nlocal\n".into());
        });

        assert!(svc.start());
        assert!(wait_for(|| svc.blocked()).await);
        assert!(!svc.running());
        assert!(wait_for(|| svc.status().0 == SyncStatus::Warning).await);

        assert!(!svc.start());
        assert!(!svc.running());

        let file = fx.tracker.get("notes.txt").unwrap();
        file.clear_conflict().await;
        assert!(!svc.blocked());
        assert!(svc.running());
        svc.stop();
    }

    #[tokio::test]
    async fn test_clearing_conflict_only_resumes_a_blocked_loop() {
        let fx = fixture(Ok(GitOutcome::Success)).await;
        let svc = service(&fx, ConflictChoice::Ignore, Duration::from_millis(20));
        let store = fx.store.clone();
        let editor = fx.editor.clone();
        fx.git.on_next_sync(move || {
            store.insert("notes.txt", Content::Text("a\nremote\n".into()));
            editor.edit("a\nlocal\n".into());
        });

        // Never started: a single cycle conflicts, clearing it starts nothing.
        assert_eq!(svc.run_cycle().await, SyncStatus::Warning);
        assert!(svc.blocked());
        let file = fx.tracker.get("notes.txt").unwrap();
        file.clear_conflict().await;
        assert!(!svc.blocked());
        assert!(!svc.running());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.git.calls.load(Ordering::SeqCst), 1);

        // Stopped by hand while blocked: stays stopped.
        let store = fx.store.clone();
        let editor = fx.editor.clone();
        fx.git.on_next_sync(move || {
            store.insert("notes.txt", Content::Text("a\nremote again\n".into()));
            editor.edit("a\nlocal again\n".into());
        });
        assert!(svc.start());
        assert!(wait_for(|| svc.blocked()).await);
        svc.stop();
        file.clear_conflict().await;
        assert!(!svc.blocked());
        assert!(!svc.running());
    }

    #[tokio::test]
    async fn test_dropping_every_handle_ends_the_loop() {
        let fx = fixture(Ok(GitOutcome::Success)).await;
        let svc = service(&fx, ConflictChoice::KeepLocal, Duration::from_millis(20));
        assert!(svc.start());
        assert!(wait_for(|| fx.git.calls.load(Ordering::SeqCst) >= 2).await);

        let weak = Arc::downgrade(&svc.inner);
        drop(svc);
        assert!(wait_for(|| weak.upgrade().is_none()).await);

        let after_drop = fx.git.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.git.calls.load(Ordering::SeqCst), after_drop);
    }
}
