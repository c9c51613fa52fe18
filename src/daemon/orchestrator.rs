//! Refresh orchestration: one independent, named, cancellable refresh task
//! per enabled widget.
//!
//! Each task loops: wait on its interval (or a control message) → skip if
//! globally paused or modal-claimed → validate → execute → parse → publish
//! to the shared cache → repeat. A slow or hung widget never delays the
//! others; there is no global lock around refreshes.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use rand::Rng;

use crate::core::config::{Config, WidgetConfig};
use crate::daemon::cache::WidgetCache;
use crate::exec::runner::{ExecutionStatus, ScriptExecutor};
use crate::logger::channel::LoggerHandle;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::protocol::element::{FailureCategory, WidgetData};
use crate::protocol::parser::ProtocolParser;
use crate::store::HistoryStore;
use crate::trust::checksum::BundledChecksums;
use crate::trust::validator::{ScriptValidator, ValidationStatus};

/// Control-channel capacity per worker. Forced refreshes collapse: a second
/// force while one is pending is redundant.
const CONTROL_CAP: usize = 1;

/// Largest fraction of the interval used as startup jitter.
const STARTUP_JITTER: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerCommand {
    /// Run one refresh now, bypassing the pause/modal gate exactly once.
    ForceRefresh,
    Stop,
}

struct WorkerHandle {
    control: Sender<WorkerCommand>,
    thread: JoinHandle<()>,
}

/// Owns the per-widget refresh tasks, the shared cache, and the pause state.
pub struct RefreshOrchestrator {
    config: Arc<RwLock<Config>>,
    cache: WidgetCache,
    store: Arc<dyn HistoryStore>,
    bundled: Arc<BundledChecksums>,
    logger: LoggerHandle,
    paused: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    modal_claims: Arc<Mutex<HashSet<String>>>,
    workers: Mutex<HashMap<String, WorkerHandle>>,
}

impl RefreshOrchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn HistoryStore>,
        bundled: BundledChecksums,
        logger: LoggerHandle,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            cache: WidgetCache::new(),
            store,
            bundled: Arc::new(bundled),
            logger,
            paused: Arc::new(AtomicBool::new(false)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            modal_claims: Arc::new(Mutex::new(HashSet::new())),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Handle to the shared cache for the render layer.
    #[must_use]
    pub fn cache(&self) -> WidgetCache {
        self.cache.clone()
    }

    /// Shared view of the live configuration (layout ops mutate through it).
    #[must_use]
    pub fn config(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Spawn a refresh task for every enabled widget.
    pub fn start(&self) {
        let ids: Vec<String> = self
            .config
            .read()
            .enabled_widgets()
            .map(|w| w.id.clone())
            .collect();
        let mut workers = self.workers.lock();
        for id in ids {
            if !workers.contains_key(&id) {
                let handle = self.spawn_worker(&id);
                workers.insert(id, handle);
            }
        }
    }

    /// Swap in a new configuration: stop loops for removed widgets, start
    /// loops for added ones. Running loops pick up changed intervals on
    /// their next tick.
    pub fn reload(&self, new_config: Config) {
        let next_ids: HashSet<String> = new_config
            .enabled_widgets()
            .map(|w| w.id.clone())
            .collect();
        *self.config.write() = new_config;

        let mut workers = self.workers.lock();
        let current_ids: Vec<String> = workers.keys().cloned().collect();
        for id in current_ids {
            if !next_ids.contains(&id) {
                if let Some(worker) = workers.remove(&id) {
                    // Dropping the sender disconnects the control channel,
                    // which wakes the worker even if its queue is full.
                    let _ = worker.control.try_send(WorkerCommand::Stop);
                    drop(worker.control);
                    let _ = worker.thread.join();
                }
                self.cache.remove(&id);
            }
        }
        for id in next_ids {
            if !workers.contains_key(&id) {
                let handle = self.spawn_worker(&id);
                workers.insert(id, handle);
            }
        }

        self.logger
            .log(LogEntry::new(EventType::ConfigReload, Severity::Info));
    }

    /// Pause all scheduled refreshes (checked at the top of each tick;
    /// in-flight executions finish).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Give a modal exclusive ownership of a widget; its scheduled
    /// refreshes skip until released.
    pub fn claim_modal(&self, id: &str) {
        self.modal_claims.lock().insert(id.to_string());
    }

    pub fn release_modal(&self, id: &str) {
        self.modal_claims.lock().remove(id);
    }

    /// Out-of-band refresh (action completed, user pressed refresh).
    /// Bypasses the pause/modal gate exactly once. Returns false for an
    /// unknown widget.
    pub fn force_refresh(&self, id: &str) -> bool {
        let workers = self.workers.lock();
        match workers.get(id) {
            // A full control queue means a forced refresh is already pending.
            Some(worker) => {
                let _ = worker.control.try_send(WorkerCommand::ForceRefresh);
                true
            }
            None => false,
        }
    }

    /// Force-refresh every running widget (SIGUSR1).
    pub fn force_refresh_all(&self) {
        let workers = self.workers.lock();
        for worker in workers.values() {
            let _ = worker.control.try_send(WorkerCommand::ForceRefresh);
        }
    }

    /// Stop every refresh task. In-flight subprocesses are torn down via the
    /// shared cancellation flag; workers are joined until `grace` runs out,
    /// then abandoned (they exit on their own once their kill completes).
    pub fn shutdown(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::Relaxed);

        let mut workers = self.workers.lock();
        for worker in workers.values() {
            let _ = worker.control.try_send(WorkerCommand::Stop);
        }

        let deadline = Instant::now() + grace;
        for (id, worker) in workers.drain() {
            // Disconnect the control channel so a worker parked on a long
            // interval (or with a full queue) wakes immediately.
            drop(worker.control);
            if Instant::now() >= deadline {
                eprintln!("[DKH-DAEMON] shutdown grace expired; abandoning worker {id}");
                continue;
            }
            let _ = worker.thread.join();
        }
    }

    // ──────────────────── worker internals ────────────────────

    fn spawn_worker(&self, id: &str) -> WorkerHandle {
        let (control_tx, control_rx) = bounded(CONTROL_CAP);
        let worker = Worker {
            id: id.to_string(),
            config: Arc::clone(&self.config),
            cache: self.cache.clone(),
            store: Arc::clone(&self.store),
            bundled: Arc::clone(&self.bundled),
            logger: self.logger.clone(),
            paused: Arc::clone(&self.paused),
            shutting_down: Arc::clone(&self.shutting_down),
            modal_claims: Arc::clone(&self.modal_claims),
        };

        let thread = thread::Builder::new()
            .name(format!("dkh-widget-{id}"))
            .spawn(move || worker.run(&control_rx))
            .unwrap_or_else(|_| thread::spawn(|| {}));

        WorkerHandle {
            control: control_tx,
            thread,
        }
    }
}

struct Worker {
    id: String,
    config: Arc<RwLock<Config>>,
    cache: WidgetCache,
    store: Arc<dyn HistoryStore>,
    bundled: Arc<BundledChecksums>,
    logger: LoggerHandle,
    paused: Arc<AtomicBool>,
    shutting_down: Arc<AtomicBool>,
    modal_claims: Arc<Mutex<HashSet<String>>>,
}

impl Worker {
    fn run(&self, control: &Receiver<WorkerCommand>) {
        let parser = ProtocolParser::new();

        // Stagger startup so a dashboard full of same-interval widgets does
        // not fire every subprocess at the same instant.
        let mut delay = jittered(self.interval());

        loop {
            let forced = match control.recv_timeout(delay) {
                Ok(WorkerCommand::ForceRefresh) => true,
                Ok(WorkerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => false,
            };

            if self.shutting_down.load(Ordering::Relaxed) {
                return;
            }

            delay = self.interval();
            if !forced && self.gated() {
                continue;
            }
            self.tick(&parser);
        }
    }

    /// Effective interval: protocol override beats the configured value.
    fn interval(&self) -> Duration {
        let configured = self
            .config
            .read()
            .widget(&self.id)
            .map_or(10, |w| w.refresh_seconds);
        let seconds = self
            .cache
            .get(&self.id)
            .and_then(|state| state.data.refresh_override)
            .unwrap_or(configured);
        Duration::from_secs(seconds.max(1))
    }

    fn gated(&self) -> bool {
        self.paused.load(Ordering::Relaxed) || self.modal_claims.lock().contains(&self.id)
    }

    fn tick(&self, parser: &ProtocolParser) {
        let started = Instant::now();
        self.cache.set_refreshing(&self.id, true);

        let (widget, executor) = {
            let config = self.config.read();
            let Some(widget) = config.widget(&self.id).cloned() else {
                self.cache.set_refreshing(&self.id, false);
                return;
            };
            (widget, ScriptExecutor::for_refresh(&config.execution))
        };

        match self.refresh_once(parser, &widget, &executor) {
            Ok(data) => {
                self.cache.store_success(&self.id, data);
                self.log_refresh(EventType::RefreshOk, Severity::Info, started, None);
            }
            Err((category, message)) => {
                self.cache
                    .store_failure(&self.id, WidgetData::failed(category, message.clone()));
                let event = if category == FailureCategory::Security {
                    EventType::ValidationRejected
                } else {
                    EventType::RefreshFailed
                };
                self.log_refresh(event, Severity::Warning, started, Some(message));
            }
        }
    }

    /// Validate → execute → parse. Security failures surface as error
    /// snapshots; execution failures carry stderr context.
    fn refresh_once(
        &self,
        parser: &ProtocolParser,
        widget: &WidgetConfig,
        executor: &ScriptExecutor,
    ) -> std::result::Result<WidgetData, (FailureCategory, String)> {
        let (paths, security) = {
            let config = self.config.read();
            (config.paths.clone(), config.security.clone())
        };
        let validator = ScriptValidator::new(&paths, &security, &self.bundled);
        let validation = validator.validate(widget);

        if !validation.is_runnable() {
            return Err((FailureCategory::Security, validation.message));
        }
        let Some(path) = validation.resolved_path.clone() else {
            return Err((
                FailureCategory::Security,
                "validator returned no path".to_string(),
            ));
        };

        let extended = self.cache.is_extended(&self.id);
        let result = executor.execute_cancellable(&path, extended, &self.shutting_down);

        match result.status {
            ExecutionStatus::Success => {
                let mut data = parser.parse(&self.id, &result.stdout, self.store.as_ref());
                if validation.status == ValidationStatus::Warning {
                    data.warnings.insert(0, validation.message);
                }
                for warning in &data.warnings {
                    self.logger.log(
                        LogEntry::new(EventType::ParserWarning, Severity::Warning)
                            .widget(&self.id)
                            .details(warning.clone()),
                    );
                }
                Ok(data)
            }
            ExecutionStatus::Timeout => Err((
                FailureCategory::Execution,
                format!("timed out after {:.1}s", result.duration.as_secs_f64()),
            )),
            ExecutionStatus::NonZeroExit => Err((
                FailureCategory::Execution,
                format!(
                    "exit code {}: {}",
                    result.exit_code.unwrap_or(-1),
                    result.stderr.trim()
                ),
            )),
            ExecutionStatus::Crashed => {
                Err((FailureCategory::Execution, result.stderr.trim().to_string()))
            }
        }
    }

    fn log_refresh(
        &self,
        event: EventType,
        severity: Severity,
        started: Instant,
        details: Option<String>,
    ) {
        let mut entry = LogEntry::new(event, severity).widget(&self.id);
        entry.duration_ms = u64::try_from(started.elapsed().as_millis()).ok();
        entry.consecutive_errors = self.cache.get(&self.id).map(|s| s.consecutive_errors);
        entry.details = details;
        self.logger.log(entry);
    }
}

fn jittered(interval: Duration) -> Duration {
    let fraction = rand::rng().random_range(0.0..STARTUP_JITTER);
    interval.mul_f64(fraction)
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{PathsConfig, WidgetConfig};
    use crate::store::NullHistoryStore;
    use std::io::Write;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    struct Fixture {
        tmp: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let custom_dir = tmp.path().join("widgets");
            std::fs::create_dir_all(&custom_dir).unwrap();
            let mut config = Config::default();
            config.paths = PathsConfig {
                custom_dir,
                bundled_dir: tmp.path().join("bundled-nonexistent"),
                override_dir: None,
                ..PathsConfig::default()
            };
            Self { tmp, config }
        }

        fn add_widget(&mut self, id: &str, refresh_seconds: u64, body: &str) {
            let path = self.config.paths.custom_dir.join(id);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(body.as_bytes()).unwrap();
            drop(file);
            #[cfg(unix)]
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

            self.config.widgets.push(WidgetConfig {
                id: id.to_string(),
                path: id.to_string(),
                refresh_seconds,
                ..WidgetConfig::default()
            });
        }

        fn orchestrator(&self) -> RefreshOrchestrator {
            RefreshOrchestrator::new(
                self.config.clone(),
                Arc::new(NullHistoryStore),
                BundledChecksums::with_entries(Vec::<(String, String)>::new()),
                LoggerHandle::disabled(),
            )
        }
    }

    fn wait_for<F: Fn() -> bool>(what: &str, predicate: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[cfg(unix)]
    #[test]
    fn refresh_populates_the_cache() {
        let mut fx = Fixture::new();
        fx.add_widget("cpu", 1, "#!/bin/sh\necho 'title: CPU'\necho 'row: fine'\n");
        let orch = fx.orchestrator();
        orch.start();

        let cache = orch.cache();
        wait_for("cpu snapshot", || {
            cache
                .get("cpu")
                .is_some_and(|s| s.data.title.as_deref() == Some("CPU"))
        });
        let state = cache.get("cpu").unwrap();
        assert_eq!(state.consecutive_errors, 0);
        assert!(state.last_success.is_some());

        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn failing_widget_accumulates_error_streak_without_blocking_others() {
        let mut fx = Fixture::new();
        fx.add_widget("bad", 1, "#!/bin/sh\necho doom >&2\nexit 1\n");
        fx.add_widget("good", 1, "#!/bin/sh\necho 'row: ok'\n");
        let orch = fx.orchestrator();
        orch.start();

        let cache = orch.cache();
        wait_for("both snapshots", || {
            cache.get("bad").is_some_and(|s| s.consecutive_errors >= 1)
                && cache.get("good").is_some_and(|s| s.last_success.is_some())
        });

        let bad = cache.get("bad").unwrap();
        assert!(bad.data.is_error());
        assert_eq!(
            bad.data.failure.as_ref().unwrap().category,
            FailureCategory::Execution
        );
        assert!(bad.last_success.is_none());

        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn missing_widget_reports_security_failure() {
        let mut fx = Fixture::new();
        fx.add_widget("ghost", 1, "#!/bin/sh\n");
        std::fs::remove_file(fx.config.paths.custom_dir.join("ghost")).unwrap();
        let orch = fx.orchestrator();
        orch.start();

        let cache = orch.cache();
        wait_for("security failure", || {
            cache.get("ghost").is_some_and(|s| s.data.is_error())
        });
        assert_eq!(
            cache
                .get("ghost")
                .unwrap()
                .data
                .failure
                .unwrap()
                .category,
            FailureCategory::Security
        );

        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn forced_refresh_bypasses_pause_once() {
        let mut fx = Fixture::new();
        let marker = fx.tmp.path().join("ran");
        fx.add_widget(
            "cpu",
            3600, // never fires on its own within the test
            &format!("#!/bin/sh\necho tick >> {}\necho 'row: hi'\n", marker.display()),
        );
        let orch = fx.orchestrator();
        orch.pause();
        orch.start();

        // Paused + long interval: nothing should run yet.
        thread::sleep(Duration::from_millis(300));
        assert!(!marker.exists());

        assert!(orch.force_refresh("cpu"));
        let cache = orch.cache();
        wait_for("forced run", || marker.exists() && cache.get("cpu").is_some());

        // Still paused afterwards: no further runs accumulate.
        thread::sleep(Duration::from_millis(300));
        let runs = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert_eq!(runs, 1, "force bypasses the gate exactly once");

        assert!(!orch.force_refresh("nonexistent"));
        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn modal_claim_skips_scheduled_refreshes() {
        let mut fx = Fixture::new();
        let marker = fx.tmp.path().join("ran");
        fx.add_widget(
            "cpu",
            1,
            &format!("#!/bin/sh\necho tick >> {}\n", marker.display()),
        );
        let orch = fx.orchestrator();
        orch.claim_modal("cpu");
        orch.start();

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "claimed widget must not refresh");

        orch.release_modal("cpu");
        wait_for("post-release run", || marker.exists());

        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn reload_stops_removed_and_starts_added_widgets() {
        let mut fx = Fixture::new();
        fx.add_widget("old", 1, "#!/bin/sh\necho 'row: old'\n");
        let orch = fx.orchestrator();
        orch.start();

        let cache = orch.cache();
        wait_for("old snapshot", || cache.get("old").is_some());

        fx.config.widgets.clear();
        fx.add_widget("new", 1, "#!/bin/sh\necho 'row: new'\n");
        orch.reload(fx.config.clone());

        wait_for("new snapshot", || cache.get("new").is_some());
        assert!(cache.get("old").is_none(), "removed widget leaves the cache");

        orch.shutdown(Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_kills_inflight_scripts_within_grace() {
        let mut fx = Fixture::new();
        fx.add_widget("slow", 1, "#!/bin/sh\nsleep 60\n");
        let orch = fx.orchestrator();
        orch.start();

        let cache = orch.cache();
        wait_for("refresh in flight", || {
            cache.get("slow").is_some_and(|s| s.refreshing)
        });

        let started = Instant::now();
        orch.shutdown(Duration::from_secs(5));
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "shutdown must not wait out the script"
        );
    }
}
