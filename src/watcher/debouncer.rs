//! Per-path quiet windows for raw notify events.
//!
//! An editor save is often several events (truncate, write, chmod, a
//! formatter rewrite). Each path gets a deadline that every new event
//! pushes back; a path is classified once its deadline passes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    /// Workspace-relative path -> instant it may be classified.
    deadlines: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::from_millis(window_ms),
            deadlines: HashMap::new(),
        }
    }

    /// Note an event for `path` now.
    pub fn record(&mut self, path: PathBuf) {
        self.record_at(path, Instant::now());
    }

    /// Note an event for `path` at `at`, restarting its window.
    pub fn record_at(&mut self, path: PathBuf, at: Instant) {
        self.deadlines.insert(path, at + self.window);
    }

    /// Drop `path` without classifying it. Returns whether it was waiting.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.deadlines.remove(path).is_some()
    }

    /// Paths whose deadline is at or before `now`, sorted so one batch is
    /// always emitted in the same order.
    pub fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        self.deadlines.retain(|path, deadline| {
            let due = *deadline <= now;
            if due {
                ready.push(path.clone());
            }
            !due
        });
        ready.sort();
        ready
    }

    /// Earliest deadline, for the watch loop to sleep until.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(300);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn save_burst_is_released_once_after_the_last_event() {
        let mut debouncer = Debouncer::new(300);
        let t0 = Instant::now();
        let user = PathBuf::from("a/user.ts");

        for offset in [0, 40, 90] {
            debouncer.record_at(user.clone(), t0 + ms(offset));
        }

        assert!(debouncer.take_ready(t0 + ms(300)).is_empty());
        assert_eq!(debouncer.next_deadline(), Some(t0 + ms(90) + WINDOW));
        assert_eq!(debouncer.take_ready(t0 + ms(390)), vec![user]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn independent_paths_release_on_their_own_deadlines() {
        let mut debouncer = Debouncer::new(300);
        let t0 = Instant::now();
        debouncer.record_at(PathBuf::from("b/account.ts"), t0);
        debouncer.record_at(PathBuf::from("a/user.ts"), t0);
        debouncer.record_at(PathBuf::from("a/later.ts"), t0 + ms(200));

        assert_eq!(
            debouncer.take_ready(t0 + WINDOW),
            vec![PathBuf::from("a/user.ts"), PathBuf::from("b/account.ts")]
        );
        assert_eq!(debouncer.pending_count(), 1);
        assert_eq!(debouncer.next_deadline(), Some(t0 + ms(500)));
    }

    #[test]
    fn removed_and_cleared_paths_never_release() {
        let mut debouncer = Debouncer::new(300);
        let t0 = Instant::now();
        let user = PathBuf::from("a/user.ts");

        debouncer.record_at(user.clone(), t0);
        assert!(debouncer.remove(&user));
        assert!(!debouncer.remove(&user));

        debouncer.record_at(user, t0);
        debouncer.record_at(PathBuf::from("a/other.ts"), t0);
        debouncer.clear();
        assert!(debouncer.take_ready(t0 + ms(1000)).is_empty());
        assert_eq!(debouncer.next_deadline(), None);
    }
}
