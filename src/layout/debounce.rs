//! Resize debouncing: terminal emulators deliver resize events in bursts
//! while the user drags; collapsing a burst into one recompute after a short
//! quiet period keeps the layout engine from thrashing.

use std::time::{Duration, Instant};

/// Default quiet period before a pending resize is released.
pub const DEFAULT_QUIET: Duration = Duration::from_millis(150);

/// Collapses bursts of resize events into a single pending dimension pair.
#[derive(Debug)]
pub struct ResizeDebouncer {
    quiet: Duration,
    pending: Option<(u16, u16)>,
    last_event: Instant,
}

impl ResizeDebouncer {
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            last_event: Instant::now(),
        }
    }

    /// Record a resize event. Later events overwrite earlier ones; only the
    /// final dimensions of a burst matter.
    pub fn event(&mut self, width: u16, height: u16) {
        self.pending = Some((width, height));
        self.last_event = Instant::now();
    }

    /// Take the pending dimensions once the quiet period has elapsed.
    /// Returns `None` while a burst is still in progress or nothing is
    /// pending. Poll from the UI tick.
    pub fn take_ready(&mut self) -> Option<(u16, u16)> {
        if self.pending.is_some() && self.last_event.elapsed() >= self.quiet {
            return self.pending.take();
        }
        None
    }

    /// Whether an event is waiting (ready or not).
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET)
    }
}
