//! Background store maintenance: periodic retention pruning and space
//! reclamation. Runs on its own thread; each pass is one bounded critical
//! section inside the store, so concurrent refresh reads/writes are only
//! briefly delayed.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::core::config::StoreConfig;
use crate::logger::channel::LoggerHandle;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::store::sqlite::SharedMetricsStore;

/// Spawn the maintenance thread. It exits when `shutdown` is signalled (any
/// message) or disconnected.
pub fn spawn_maintenance(
    store: SharedMetricsStore,
    config: StoreConfig,
    shutdown: Receiver<()>,
    logger: LoggerHandle,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(config.prune_interval_minutes * 60);
    let retention_days = config.retention_days;

    thread::Builder::new()
        .name("dkh-maintenance".to_string())
        .spawn(move || {
            loop {
                match shutdown.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                match store.prune_and_reclaim(retention_days) {
                    Ok(deleted) => {
                        if deleted > 0 {
                            let mut entry =
                                LogEntry::new(EventType::StorePruned, Severity::Info);
                            entry.rows = u64::try_from(deleted).ok();
                            logger.log(entry);
                        }
                    }
                    Err(error) => {
                        logger.log(
                            LogEntry::new(EventType::Error, Severity::Warning)
                                .details(format!("store maintenance failed: {error}")),
                        );
                    }
                }
            }
        })
        .unwrap_or_else(|_| thread::spawn(|| {}))
}
