//! Configuration directory watcher for hot reload.
//!
//! A single task multiplexes three sources: the cancellation token, a ticker
//! running at the policy's poll interval, and filesystem notifications. Events
//! only stamp the time of the latest qualifying change; the ticker decides when
//! that change is old enough to act on. A burst of events therefore collapses
//! into one reload per debounce window.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::loader::{list_config_files, ConfigLoader};
use crate::config::ReloadingConfig;
use crate::observability::metrics;
use crate::reload::policy::ReloadPolicy;

/// Error type for starting the watcher.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to create filesystem watcher: {0}")]
    Watcher(#[source] notify::Error),
}

/// Why the reload loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The cancellation token fired.
    Cancelled,
    /// The filesystem event source closed. Reloads no longer happen; the caller
    /// decides whether that is fatal.
    SourceClosed,
}

/// Registers a directory with a filesystem watch.
///
/// Must be idempotent: it is called again on every tick.
pub trait DirWatch {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl DirWatch for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Where and how often to look for configuration changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSettings {
    pub watch_dir: PathBuf,
    pub suffix: String,
    pub min_interval: Duration,
}

impl From<&ReloadingConfig> for ReloadSettings {
    fn from(config: &ReloadingConfig) -> Self {
        Self {
            watch_dir: config.watch_dir.clone(),
            suffix: config.suffix.clone(),
            min_interval: Duration::from_secs(config.min_interval_secs),
        }
    }
}

/// Watches a directory and hands freshly loaded snapshots to a callback.
pub struct ConfigReloadLoop<L> {
    settings: ReloadSettings,
    policy: ReloadPolicy,
    loader: Arc<L>,
}

/// A running reload loop.
pub struct ReloadHandle {
    cancel: CancellationToken,
    task: JoinHandle<WatchExit>,
}

impl ReloadHandle {
    /// Cancel the loop and wait for it to finish.
    pub async fn stop(self) -> Result<WatchExit, JoinError> {
        self.cancel.cancel();
        self.task.await
    }

    /// Wait for the loop to finish on its own (parent token or source closed).
    pub async fn join(self) -> Result<WatchExit, JoinError> {
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<L: ConfigLoader> ConfigReloadLoop<L> {
    pub fn new(settings: ReloadSettings, loader: L) -> Self {
        let policy = ReloadPolicy::new(settings.min_interval);
        Self {
            settings,
            policy,
            loader: Arc::new(loader),
        }
    }

    /// Create the filesystem watch and spawn the loop.
    ///
    /// Failing to create the watch is fatal. A missing watch directory is not:
    /// registration is retried on every tick. The loop stops when `cancel` (or
    /// [`ReloadHandle::stop`]) fires.
    pub fn start<F>(self, cancel: &CancellationToken, on_reload: F) -> Result<ReloadHandle, ReloadError>
    where
        F: FnMut(L::Snapshot) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(ReloadError::Watcher)?;

        let cancel = cancel.child_token();
        let task = tokio::spawn(self.run(watcher, rx, cancel.clone(), on_reload));
        Ok(ReloadHandle { cancel, task })
    }

    /// The event loop. Reload attempts never overlap: each one is awaited on
    /// this task before the next event is looked at.
    pub async fn run<W, F>(
        self,
        mut watcher: W,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        cancel: CancellationToken,
        mut on_reload: F,
    ) -> WatchExit
    where
        W: DirWatch,
        F: FnMut(L::Snapshot),
    {
        let mut ticker = time::interval(self.policy.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut watching = None;
        let mut last_change_at: Option<Instant> = None;

        tracing::info!(
            dir = %self.settings.watch_dir.display(),
            suffix = %self.settings.suffix,
            min_interval_ms = self.policy.min_reload_interval().as_millis() as u64,
            poll_interval_ms = self.policy.poll_interval().as_millis() as u64,
            "Config reload loop starting"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Config reload loop cancelled");
                    return WatchExit::Cancelled;
                }

                _ = ticker.tick() => {
                    watching = Some(self.register(&mut watcher, watching));

                    if !self.policy.due_for_reload(Instant::now(), last_change_at) {
                        continue;
                    }

                    // Cleared before the attempt so a failed reload waits for a new event.
                    last_change_at = None;
                    self.reload(&mut on_reload).await;
                }

                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if self.is_qualifying(&event) {
                            tracing::debug!(kind = ?event.kind, paths = ?event.paths, "Config change detected");
                            last_change_at = Some(Instant::now());
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Filesystem watcher reported an error");
                    }
                    None => {
                        tracing::warn!("Filesystem watcher event source closed, config reloads stopped");
                        return WatchExit::SourceClosed;
                    }
                },
            }
        }
    }

    /// Returns whether the directory is being watched now.
    fn register<W: DirWatch>(&self, watcher: &mut W, watching: Option<bool>) -> bool {
        let dir = &self.settings.watch_dir;
        match watcher.watch_dir(dir) {
            Ok(()) => {
                if watching != Some(true) {
                    tracing::info!(dir = %dir.display(), "Watching config directory");
                }
                true
            }
            Err(e) => {
                if watching == Some(false) {
                    tracing::debug!(dir = %dir.display(), error = %e, "Config directory still not watchable");
                } else {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to watch config directory, retrying every tick");
                }
                false
            }
        }
    }

    /// List and load on the blocking pool; the directory is read when the
    /// attempt starts.
    async fn reload<F: FnMut(L::Snapshot)>(&self, on_reload: &mut F) {
        let loader = Arc::clone(&self.loader);
        let dir = self.settings.watch_dir.clone();
        let suffix = self.settings.suffix.clone();

        let loaded = task::spawn_blocking(move || {
            let paths = list_config_files(&dir, &suffix)?;
            tracing::info!(files = paths.len(), "Reloading configuration");
            loader.load_files(&paths)
        })
        .await;

        match loaded {
            Ok(Ok(snapshot)) => {
                metrics::record_reload(true);
                on_reload(snapshot);
            }
            Ok(Err(e)) => {
                metrics::record_reload(false);
                tracing::error!(error = %e, "Config reload failed, keeping current configuration");
            }
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(error = %e, "Config reload task failed, keeping current configuration");
            }
        }
    }

    fn is_qualifying(&self, event: &Event) -> bool {
        let relevant_kind = matches!(
            event.kind,
            EventKind::Create(_)
                | EventKind::Remove(_)
                | EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Data(_) | ModifyKind::Any)
        );
        relevant_kind && event.paths.iter().any(|path| has_suffix(path, &self.settings.suffix))
    }
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.ends_with(suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    use crate::config::ConfigError;

    type Calls = Arc<Mutex<Vec<(Instant, Vec<PathBuf>)>>>;

    /// Records every call; fails while `fail` is set.
    struct RecordingLoader {
        calls: Calls,
        fail: Arc<AtomicBool>,
        cancel_during_load: Option<CancellationToken>,
    }

    impl ConfigLoader for RecordingLoader {
        type Snapshot = Vec<PathBuf>;

        fn load_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, ConfigError> {
            self.calls.lock().unwrap().push((Instant::now(), paths.to_vec()));
            if let Some(token) = &self.cancel_during_load {
                token.cancel();
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ConfigError::Io {
                    path: PathBuf::from("injected"),
                    source: io::Error::new(io::ErrorKind::Other, "injected failure"),
                });
            }
            Ok(paths.to_vec())
        }
    }

    #[derive(Clone, Default)]
    struct FakeWatch {
        attempts: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl DirWatch for FakeWatch {
        fn watch_dir(&mut self, _dir: &Path) -> notify::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(notify::Error::path_not_found())
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        dir: TempDir,
        events: Option<mpsc::UnboundedSender<notify::Result<Event>>>,
        cancel: CancellationToken,
        calls: Calls,
        applied: Arc<Mutex<Vec<Vec<PathBuf>>>>,
        fail: Arc<AtomicBool>,
        watch: FakeWatch,
        task: JoinHandle<WatchExit>,
    }

    impl Harness {
        fn start(min_interval: Duration) -> Self {
            Self::start_with(min_interval, false)
        }

        fn start_with(min_interval: Duration, cancel_during_load: bool) -> Self {
            let dir = TempDir::new().unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let calls = Calls::default();
            let applied = Arc::new(Mutex::new(Vec::new()));
            let fail = Arc::new(AtomicBool::new(false));
            let watch = FakeWatch::default();

            let settings = ReloadSettings {
                watch_dir: dir.path().to_path_buf(),
                suffix: ".toml".to_string(),
                min_interval,
            };
            let loader = RecordingLoader {
                calls: Arc::clone(&calls),
                fail: Arc::clone(&fail),
                cancel_during_load: cancel_during_load.then(|| cancel.clone()),
            };
            let sink = Arc::clone(&applied);
            let reload_loop = ConfigReloadLoop::new(settings, loader);
            let task = tokio::spawn(reload_loop.run(watch.clone(), rx, cancel.clone(), move |snapshot| {
                sink.lock().unwrap().push(snapshot);
            }));

            Self {
                dir,
                events: Some(tx),
                cancel,
                calls,
                applied,
                fail,
                watch,
                task,
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        /// Create the file on disk and deliver the matching event.
        fn create(&self, name: &str) {
            fs::write(self.path(name), "").unwrap();
            self.send(EventKind::Create(CreateKind::File), name);
        }

        fn send(&self, kind: EventKind, name: &str) {
            let event = Event::new(kind).add_path(self.path(name));
            // The loop may already have exited.
            let _ = self.events.as_ref().unwrap().send(Ok(event));
        }

        fn calls(&self) -> Vec<(Instant, Vec<PathBuf>)> {
            self.calls.lock().unwrap().clone()
        }

        fn applied(&self) -> usize {
            self.applied.lock().unwrap().len()
        }

        async fn shutdown(self) -> WatchExit {
            self.cancel.cancel();
            self.task.await.unwrap()
        }
    }

    const TEN_SECS: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn no_events_means_no_reloads() {
        let harness = Harness::start(TEN_SECS);

        time::sleep(Duration::from_secs(120)).await;

        assert!(harness.calls().is_empty());
        assert_eq!(harness.shutdown().await, WatchExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_coalesced_into_one_ordered_reload() {
        let harness = Harness::start(TEN_SECS);
        let start = Instant::now();

        harness.create("b.toml");
        time::sleep(Duration::from_secs(1)).await;
        harness.create("a.toml");
        time::sleep(Duration::from_secs(30)).await;

        let calls = harness.calls();
        assert_eq!(calls.len(), 1);
        let (at, paths) = &calls[0];
        let elapsed = at.duration_since(start);
        assert!(elapsed >= TEN_SECS && elapsed <= Duration::from_secs(11), "reloaded after {elapsed:?}");
        assert_eq!(paths, &vec![harness.path("a.toml"), harness.path("b.toml")]);
        assert_eq!(harness.applied(), 1);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn single_event_reloads_within_window_plus_poll() {
        let harness = Harness::start(TEN_SECS);
        time::sleep(Duration::from_millis(2_500)).await;

        let changed = Instant::now();
        harness.create("a.toml");
        time::sleep(Duration::from_secs(30)).await;

        let calls = harness.calls();
        assert_eq!(calls.len(), 1);
        let elapsed = calls[0].0.duration_since(changed);
        assert!(elapsed >= TEN_SECS && elapsed <= Duration::from_secs(11), "reloaded after {elapsed:?}");
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn many_events_in_many_files_still_one_reload() {
        let harness = Harness::start(TEN_SECS);

        for i in 0..50 {
            harness.create(&format!("{:02}.toml", i % 5));
            harness.send(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "00.toml");
        }
        time::sleep(Duration::from_secs(60)).await;

        let calls = harness.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 5);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reloads_are_at_least_one_window_apart() {
        let harness = Harness::start(TEN_SECS);

        for _ in 0..5 {
            harness.create("a.toml");
            time::sleep(Duration::from_secs(4)).await;
            harness.send(EventKind::Modify(ModifyKind::Any), "a.toml");
            time::sleep(Duration::from_secs(13)).await;
        }

        let calls = harness.calls();
        assert_eq!(calls.len(), 5);
        for pair in calls.windows(2) {
            assert!(pair[1].0.duration_since(pair[0].0) >= TEN_SECS);
        }
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn events_that_do_not_qualify_are_ignored() {
        let harness = Harness::start(TEN_SECS);
        fs::write(harness.path("notes.txt"), "").unwrap();
        fs::write(harness.path("a.toml"), "").unwrap();

        harness.send(EventKind::Create(CreateKind::File), "notes.txt");
        harness.send(EventKind::Modify(ModifyKind::Data(DataChange::Any)), "a.toml.swp");
        harness.send(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)), "a.toml");
        harness.send(EventKind::Access(AccessKind::Any), "a.toml");
        harness.send(EventKind::Other, "a.toml");
        time::sleep(Duration::from_secs(60)).await;

        assert!(harness.calls().is_empty());
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removal_and_rename_trigger_reload() {
        let harness = Harness::start(TEN_SECS);

        harness.send(EventKind::Remove(RemoveKind::File), "gone.toml");
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(harness.calls().len(), 1);
        assert!(harness.calls()[0].1.is_empty());

        fs::write(harness.path("renamed.toml"), "").unwrap();
        harness.send(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "renamed.toml");
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(harness.calls().len(), 2);
        assert_eq!(harness.calls()[1].1, vec![harness.path("renamed.toml")]);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_keeps_previous_and_waits_for_next_event() {
        let harness = Harness::start(TEN_SECS);
        harness.fail.store(true, Ordering::SeqCst);

        harness.create("a.toml");
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(harness.calls().len(), 1);
        assert_eq!(harness.applied(), 0);

        // No retry without a new qualifying event.
        harness.fail.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.calls().len(), 1);

        harness.create("a.toml");
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(harness.calls().len(), 2);
        assert_eq!(harness.applied(), 1);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_directory_counts_as_failed_reload() {
        let harness = Harness::start(TEN_SECS);
        harness.create("a.toml");
        fs::remove_file(harness.path("a.toml")).unwrap();
        fs::remove_dir(harness.dir.path()).unwrap();

        time::sleep(Duration::from_secs(20)).await;

        // Listing failed, so the loader was never consulted.
        assert!(harness.calls().is_empty());
        assert_eq!(harness.applied(), 0);
        assert!(!harness.task.is_finished());
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn registration_is_retried_every_tick() {
        let harness = Harness::start(TEN_SECS);
        harness.watch.fail.store(true, Ordering::SeqCst);

        time::sleep(Duration::from_millis(5_500)).await;
        let attempts = harness.watch.attempts.load(Ordering::SeqCst);
        assert!(attempts >= 5, "only {attempts} attempts");

        harness.watch.fail.store(false, Ordering::SeqCst);
        harness.create("a.toml");
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(harness.calls().len(), 1);
        harness.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_errors_do_not_stop_the_loop() {
        let harness = Harness::start(TEN_SECS);

        let tx = harness.events.as_ref().unwrap();
        tx.send(Err(notify::Error::generic("queue overflow"))).unwrap();
        harness.create("a.toml");
        time::sleep(Duration::from_secs(15)).await;

        assert_eq!(harness.calls().len(), 1);
        assert_eq!(harness.shutdown().await, WatchExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_event_source_ends_loop_distinctly() {
        let mut harness = Harness::start(TEN_SECS);
        time::sleep(Duration::from_secs(1)).await;

        drop(harness.events.take());
        let exit = time::timeout(Duration::from_secs(5), &mut harness.task)
            .await
            .expect("loop should stop")
            .unwrap();

        assert_eq!(exit, WatchExit::SourceClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_load_finishes_attempt_then_exits() {
        let harness = Harness::start_with(TEN_SECS, true);

        harness.create("a.toml");
        time::sleep(Duration::from_secs(10)).await;
        // Queue more work that must never be acted on.
        harness.create("b.toml");
        time::sleep(Duration::from_secs(30)).await;

        assert!(harness.task.is_finished());
        assert_eq!(harness.calls().len(), 1);
        assert_eq!(harness.applied(), 1);
        assert_eq!(harness.task.await.unwrap(), WatchExit::Cancelled);
    }

    struct ThreadRecordingLoader(Arc<Mutex<Vec<std::thread::ThreadId>>>);

    impl ConfigLoader for ThreadRecordingLoader {
        type Snapshot = ();

        fn load_files(&self, _paths: &[PathBuf]) -> Result<(), ConfigError> {
            self.0.lock().unwrap().push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loading_runs_off_the_loop_thread() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let threads = Arc::new(Mutex::new(Vec::new()));
        let settings = ReloadSettings {
            watch_dir: dir.path().to_path_buf(),
            suffix: ".toml".to_string(),
            min_interval: TEN_SECS,
        };
        let reload_loop = ConfigReloadLoop::new(settings, ThreadRecordingLoader(Arc::clone(&threads)));
        let task = tokio::spawn(reload_loop.run(FakeWatch::default(), rx, cancel.clone(), |()| {}));

        let path = dir.path().join("a.toml");
        fs::write(&path, "").unwrap();
        tx.send(Ok(Event::new(EventKind::Create(CreateKind::File)).add_path(path)))
            .unwrap();
        time::sleep(Duration::from_secs(15)).await;

        cancel.cancel();
        assert_eq!(task.await.unwrap(), WatchExit::Cancelled);

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        // current_thread runtime: the loop itself runs on this thread.
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn stop_cancels_only_this_loop() {
        let parent = CancellationToken::new();
        let dir = TempDir::new().unwrap();
        let settings = ReloadSettings {
            watch_dir: dir.path().to_path_buf(),
            suffix: ".toml".to_string(),
            min_interval: TEN_SECS,
        };
        let loader = RecordingLoader {
            calls: Calls::default(),
            fail: Arc::new(AtomicBool::new(false)),
            cancel_during_load: None,
        };

        let handle = ConfigReloadLoop::new(settings, loader)
            .start(&parent, |_snapshot| {})
            .unwrap();

        assert!(!handle.is_finished());
        assert_eq!(handle.stop().await.unwrap(), WatchExit::Cancelled);
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn suffix_matches_file_name_only() {
        assert!(has_suffix(Path::new("/etc/app.toml/a.toml"), ".toml"));
        assert!(!has_suffix(Path::new("/etc/app.toml/a.txt"), ".toml"));
        assert!(!has_suffix(Path::new("/"), ".toml"));
    }
}
