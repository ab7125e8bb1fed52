//! Watch manager: notify events in, classified delta events out.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ignore::overrides::{Override, OverrideBuilder};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::presence::PresenceTracker;
use crate::config::{Settings, WatchConfig};
use crate::delta::DeltaEvent;
use crate::hash::Fingerprint;
use crate::manifest::{Manifest, SourceWalker};
use crate::{debug_event, log_event};

/// Decides which raw paths the watcher cares about.
#[derive(Debug)]
struct PathFilter {
    root: PathBuf,
    ignored: Option<Override>,
    excluded: Vec<PathBuf>,
}

impl PathFilter {
    fn new(root: &Path, patterns: &[String], excluded: Vec<PathBuf>) -> Self {
        let mut builder = OverrideBuilder::new(root);
        for pattern in patterns {
            if let Err(e) = builder.add(pattern) {
                tracing::warn!("[watcher] invalid ignore pattern '{pattern}': {e}");
            }
        }
        Self {
            root: root.to_path_buf(),
            ignored: builder.build().ok(),
            excluded,
        }
    }

    /// Workspace-relative path for a raw event path, if relevant.
    fn relevant(&self, absolute: &Path) -> Option<PathBuf> {
        let relative = absolute.strip_prefix(&self.root).ok()?;
        if relative.as_os_str().is_empty() || self.excluded.iter().any(|d| relative.starts_with(d)) {
            return None;
        }
        let hidden = relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| s.starts_with('.') && s.len() > 1)
        });
        if hidden {
            return None;
        }
        if let Some(ignored) = &self.ignored {
            if ignored.matched(relative, false).is_whitelist() {
                return None;
            }
        }
        Some(relative.to_path_buf())
    }
}

/// Synchronous core of the watch loop.
///
/// Owns the debouncer and presence records; the async task only moves
/// events in and out of it.
#[derive(Debug)]
pub struct WatchLoop {
    filter: PathFilter,
    debouncer: Debouncer,
    presence: PresenceTracker,
}

impl WatchLoop {
    pub fn new(root: &Path, config: &WatchConfig, ignore_patterns: &[String], excluded: Vec<PathBuf>) -> Self {
        Self {
            filter: PathFilter::new(root, ignore_patterns, excluded),
            debouncer: Debouncer::new(config.debounce_ms),
            presence: PresenceTracker::new(root),
        }
    }

    /// Mark every file currently under `roots` as seen.
    pub fn seed(&mut self, roots: &[PathBuf], ignore_patterns: &[String]) -> usize {
        let walker = SourceWalker::new(ignore_patterns);
        let mut seeded = 0;
        for root in roots {
            for file in walker.walk(root) {
                if let Some(relative) = self.filter.relevant(&root.join(&file)) {
                    self.presence.seed(&relative);
                    seeded += 1;
                }
            }
        }
        seeded
    }

    /// Register manifest files; returns `missing`/`dirty` events.
    pub fn expect(&mut self, files: &[(PathBuf, Fingerprint)]) -> Vec<DeltaEvent> {
        files
            .iter()
            .filter_map(|(path, fingerprint)| {
                self.presence
                    .expect(path, *fingerprint)
                    .map(|kind| DeltaEvent::new(path.clone(), kind))
            })
            .collect()
    }

    /// Feed one raw notification. Deletions classify immediately; every
    /// other kind waits for its debounce window.
    pub fn handle(&mut self, event: Event) -> Vec<DeltaEvent> {
        let mut out = Vec::new();
        let removal = matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
        );
        if matches!(event.kind, EventKind::Access(_)) {
            return out;
        }

        for path in &event.paths {
            let Some(relative) = self.filter.relevant(path) else {
                continue;
            };
            if removal {
                self.debouncer.remove(&relative);
                if let Some(kind) = self.presence.removed(&relative) {
                    out.push(DeltaEvent::new(relative, kind));
                }
            } else if !path.is_dir() {
                debug_event!("watcher", "queued", "{:?} {}", event.kind, relative.display());
                self.debouncer.record(relative);
            }
        }
        out
    }

    /// Classify every path whose debounce window has closed.
    pub fn flush(&mut self) -> Vec<DeltaEvent> {
        self.debouncer
            .take_ready(Instant::now())
            .into_iter()
            .filter_map(|path| {
                self.presence
                    .classify(&path)
                    .map(|kind| DeltaEvent::new(path, kind))
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.next_deadline()
    }

    pub fn pending(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Cancel outstanding debounce timers without firing them.
    pub fn clear(&mut self) {
        self.debouncer.clear();
    }
}

struct Running {
    watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Watches module source roots and streams classified `DeltaEvent`s.
pub struct WatchManager {
    root: PathBuf,
    config: WatchConfig,
    ignore_patterns: Vec<String>,
    excluded: Vec<PathBuf>,
    expected: Vec<(PathBuf, Fingerprint)>,
    unwatched: Vec<PathBuf>,
    running: Option<Running>,
}

impl std::fmt::Debug for WatchManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchManager")
            .field("root", &self.root)
            .field("running", &self.running.is_some())
            .field("unwatched", &self.unwatched)
            .finish()
    }
}

impl WatchManager {
    /// The root is canonicalized so it matches the resolved paths some
    /// backends report (FSEvents, roots reached through a symlink).
    pub fn new(root: impl Into<PathBuf>, settings: &Settings) -> Self {
        let root = root.into();
        Self {
            root: root.canonicalize().unwrap_or(root),
            config: settings.watch.clone(),
            ignore_patterns: settings.build.ignore_patterns.clone(),
            excluded: vec![PathBuf::from(crate::config::LOCAL_DIR)],
            expected: Vec::new(),
            unwatched: Vec::new(),
            running: None,
        }
    }

    /// Take expected files from a manifest and exclude its output trees.
    pub fn expect_manifest(&mut self, manifest: &Manifest) {
        self.expected = manifest
            .modules
            .values()
            .flat_map(|m| {
                m.files
                    .iter()
                    .map(move |f| (m.workspace_path(&f.path), f.fingerprint))
            })
            .collect();
        self.excluded.push(manifest.build_location.clone());
        self.excluded
            .extend(manifest.modules.values().map(|m| m.output_root.clone()));
        self.excluded.sort();
        self.excluded.dedup();
    }

    /// Source roots of a manifest's modules, absolute.
    pub fn module_roots(manifest: &Manifest) -> Vec<PathBuf> {
        manifest
            .modules
            .values()
            .map(|m| manifest.root().join(&m.source_root))
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Roots that failed to watch in the last `start`.
    pub fn unwatched_roots(&self) -> &[PathBuf] {
        &self.unwatched
    }

    /// Start watching `roots` (absolute, or relative to the workspace).
    ///
    /// Must be called inside a tokio runtime. A root that cannot be
    /// watched is logged and listed in [`unwatched_roots`](Self::unwatched_roots).
    pub fn start(&mut self, roots: &[PathBuf]) -> Result<mpsc::Receiver<DeltaEvent>, WatchError> {
        if self.running.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        let roots: Vec<PathBuf> = roots
            .iter()
            .map(|r| if r.is_absolute() { r.clone() } else { self.root.join(r) })
            .map(|r| r.canonicalize().unwrap_or(r))
            .collect();

        let (raw_tx, raw_rx) = mpsc::channel(self.config.event_channel_size.max(1));
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.blocking_send(res);
        })?;

        self.unwatched.clear();
        let mut watched = Vec::new();
        for root in &roots {
            match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => {
                    debug_event!("watcher", "watching", "{}", root.display());
                    watched.push(root.clone());
                }
                Err(e) => {
                    let error = WatchError::PathWatchFailed {
                        path: root.clone(),
                        reason: e.to_string(),
                    };
                    tracing::warn!("[watcher] {error}");
                    self.unwatched.push(root.clone());
                }
            }
        }

        let mut state = WatchLoop::new(
            &self.root,
            &self.config,
            &self.ignore_patterns,
            self.excluded.clone(),
        );
        let seeded = state.seed(&watched, &self.ignore_patterns);
        let initial = state.expect(&self.expected);
        log_event!(
            "watcher",
            "started",
            "{seeded} files in {} roots, {} unwatched",
            watched.len(),
            self.unwatched.len()
        );

        let (tx, rx) = mpsc::channel(self.config.event_channel_size.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(state, raw_rx, tx, cancel.clone(), initial));

        self.running = Some(Running {
            watcher,
            cancel,
            task,
        });
        Ok(rx)
    }

    /// Stop watching. Releases the OS watcher and drops pending debounce
    /// timers without firing them. Safe to call at any time.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        drop(running.watcher);
        // The task exits on its own once it sees the cancellation.
        drop(running.task);
        log_event!("watcher", "stopped");
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(
    mut state: WatchLoop,
    mut raw: mpsc::Receiver<notify::Result<Event>>,
    out: mpsc::Sender<DeltaEvent>,
    cancel: CancellationToken,
    initial: Vec<DeltaEvent>,
) {
    for event in initial {
        if out.send(event).await.is_err() {
            return;
        }
    }

    loop {
        let deadline = state.next_deadline();
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let events = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = raw.recv() => match received {
                Some(Ok(event)) => state.handle(event),
                Some(Err(e)) => {
                    let error = WatchError::EventError { details: e.to_string() };
                    tracing::warn!("[watcher] {error}");
                    continue;
                }
                None => break,
            },
            _ = expiry => state.flush(),
        };

        for event in events {
            log_event!("watcher", "delta", "{event}");
            if out.send(event).await.is_err() {
                state.clear();
                return;
            }
        }
    }

    if state.pending() > 0 {
        debug_event!("watcher", "cancelled", "{} pending paths dropped", state.pending());
    }
    state.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaKind;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn watch_loop(root: &Path, debounce_ms: u64) -> WatchLoop {
        let config = WatchConfig {
            debounce_ms,
            ..WatchConfig::default()
        };
        WatchLoop::new(root, &config, &["*.generated.*".to_string()], vec![PathBuf::from(".hotwire")])
    }

    fn modify(path: PathBuf) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path)
    }

    #[test]
    fn burst_of_writes_is_one_change() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("src/user.ts");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "class User {}").unwrap();

        let mut state = watch_loop(temp.path(), 40);
        state.seed(&[temp.path().join("src")], &[]);

        for body in ["a", "ab", "abc"] {
            fs::write(&file, format!("class User {{ {body}: string }}")).unwrap();
            assert!(state.handle(modify(file.clone())).is_empty());
        }
        assert!(state.flush().is_empty());

        std::thread::sleep(Duration::from_millis(60));
        let events = state.flush();
        assert_eq!(events, vec![DeltaEvent::changed("src/user.ts")]);
    }

    #[test]
    fn create_then_modify_is_one_add() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("fresh.ts");
        let mut state = watch_loop(temp.path(), 10);

        fs::write(&file, "export {}").unwrap();
        state.handle(Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone()));
        fs::write(&file, "export const x = 1;").unwrap();
        state.handle(modify(file.clone()));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(state.flush(), vec![DeltaEvent::added("fresh.ts")]);
    }

    #[test]
    fn deletion_is_immediate_and_cancels_pending() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("gone.ts");
        fs::write(&file, "class Gone {}").unwrap();
        let mut state = watch_loop(temp.path(), 1_000);
        state.seed(&[temp.path().to_path_buf()], &[]);

        fs::write(&file, "class Gone { x = 1 }").unwrap();
        state.handle(modify(file.clone()));
        assert_eq!(state.pending(), 1);

        fs::remove_file(&file).unwrap();
        let events = state.handle(Event::new(EventKind::Remove(RemoveKind::File)).add_path(file));
        assert_eq!(events, vec![DeltaEvent::removed("gone.ts")]);
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn ignored_and_internal_paths_are_dropped() {
        let temp = TempDir::new().unwrap();
        let mut state = watch_loop(temp.path(), 10);

        state.handle(modify(temp.path().join(".hotwire/build/core/a.ts")));
        state.handle(modify(temp.path().join("src/api.generated.ts")));
        state.handle(modify(PathBuf::from("/elsewhere/x.ts")));
        assert_eq!(state.pending(), 0);
    }

    #[test]
    fn clear_drops_timers_without_firing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.ts");
        fs::write(&file, "class A {}").unwrap();
        let mut state = watch_loop(temp.path(), 5);

        state.handle(modify(file));
        state.clear();
        std::thread::sleep(Duration::from_millis(15));
        assert!(state.flush().is_empty());
    }

    #[test]
    fn expected_files_report_missing() {
        let temp = TempDir::new().unwrap();
        let mut state = watch_loop(temp.path(), 10);
        let events = state.expect(&[(PathBuf::from("src/a.ts"), Fingerprint::new(3, 3))]);
        assert_eq!(
            events,
            vec![DeltaEvent::new("src/a.ts", DeltaKind::Missing)]
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut manager = WatchManager::new(temp.path(), &Settings::default());
        manager.stop();

        let _rx = manager.start(&[temp.path().to_path_buf()]).unwrap();
        assert!(manager.is_running());
        assert!(matches!(
            manager.start(&[temp.path().to_path_buf()]),
            Err(WatchError::AlreadyStarted)
        ));
        manager.stop();
        manager.stop();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn unwatchable_root_is_reported() {
        let temp = TempDir::new().unwrap();
        let mut manager = WatchManager::new(temp.path(), &Settings::default());
        let missing = temp.path().join("does-not-exist");

        let _rx = manager.start(&[missing.clone()]).unwrap();
        assert_eq!(manager.unwatched_roots(), &[missing]);
        manager.stop();
    }
}
