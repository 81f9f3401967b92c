//! Coalesces file change events per path.
//!
//! Rapid save sequences (auto-save, IDE formatting) collapse into one event;
//! when a path sees both a modification and a removal inside the window, the
//! latest event wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What happened to a path, after coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or modified; content must be re-indexed.
    Changed,
    /// Removed; derived data must be deleted.
    Removed,
}

/// Records event timestamps and releases paths that have been quiet for the
/// configured window.
#[derive(Debug)]
pub struct Debouncer {
    pending: HashMap<PathBuf, (FileEvent, Instant)>,
    window: Duration,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            window: Duration::from_millis(window_ms),
        }
    }

    /// Record an event, restarting the quiet window for this path. A newer
    /// event replaces an older one wholesale.
    pub fn record(&mut self, path: PathBuf, event: FileEvent) {
        self.pending.insert(path, (event, Instant::now()));
    }

    /// Take all paths whose last event is older than the window.
    pub fn take_ready(&mut self) -> Vec<(PathBuf, FileEvent)> {
        let now = Instant::now();
        let window = self.window;
        let mut ready = Vec::new();
        self.pending.retain(|path, (event, at)| {
            if now.duration_since(*at) >= window {
                ready.push((path.clone(), *event));
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn quiet_window_releases_events() {
        let mut debouncer = Debouncer::new(30);
        let path = PathBuf::from("/ws/file.rs");
        debouncer.record(path.clone(), FileEvent::Changed);

        assert!(debouncer.take_ready().is_empty());
        sleep(Duration::from_millis(40));
        let ready = debouncer.take_ready();
        assert_eq!(ready, vec![(path, FileEvent::Changed)]);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn newer_event_wins() {
        let mut debouncer = Debouncer::new(20);
        let path = PathBuf::from("/ws/file.rs");
        debouncer.record(path.clone(), FileEvent::Changed);
        debouncer.record(path.clone(), FileEvent::Removed);

        sleep(Duration::from_millis(30));
        let ready = debouncer.take_ready();
        assert_eq!(ready, vec![(path, FileEvent::Removed)]);
    }

    #[test]
    fn new_event_restarts_the_window() {
        let mut debouncer = Debouncer::new(40);
        let path = PathBuf::from("/ws/file.rs");
        debouncer.record(path.clone(), FileEvent::Changed);
        sleep(Duration::from_millis(25));
        debouncer.record(path.clone(), FileEvent::Changed);
        sleep(Duration::from_millis(25));
        // Only 25ms since the latest event.
        assert!(debouncer.take_ready().is_empty());
        sleep(Duration::from_millis(20));
        assert_eq!(debouncer.take_ready().len(), 1);
    }
}
