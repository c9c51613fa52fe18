//! Logger thread: a dedicated thread owns the `JsonlWriter`; refresh tasks
//! send entries over a bounded crossbeam channel with non-blocking
//! `try_send()` so a slow disk never stalls a refresh cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};

use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};

/// Bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Cloneable, non-blocking sender side of the logger.
#[derive(Clone)]
pub struct LoggerHandle {
    tx: Option<Sender<LogEntry>>,
    dropped: Arc<AtomicU64>,
}

impl LoggerHandle {
    /// Handle that discards everything (tests, `--quiet` tooling).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            tx: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue an entry. Dropped (and counted) if the channel is full or the
    /// logger thread is gone; logging never blocks and never fails loudly.
    pub fn log(&self, entry: LogEntry) {
        if let Some(tx) = &self.tx {
            if tx.try_send(entry).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Entries lost to back-pressure since startup.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the logger thread. The thread exits (after a final flush) once all
/// `LoggerHandle` clones are dropped.
pub fn spawn_logger(config: JsonlConfig) -> (LoggerHandle, JoinHandle<()>) {
    let (tx, rx) = bounded::<LogEntry>(CHANNEL_CAPACITY);
    let handle = thread::Builder::new()
        .name("dkh-logger".to_string())
        .spawn(move || {
            let mut writer = JsonlWriter::open(config);
            while let Ok(entry) = rx.recv() {
                writer.write_entry(&entry);
            }
            writer.fsync();
        })
        .unwrap_or_else(|_| thread::spawn(|| {}));

    (
        LoggerHandle {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
        },
        handle,
    )
}
