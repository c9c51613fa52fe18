//! Widget subprocess runner: direct spawn (never a shell), concurrent capped
//! capture of both output streams, and process-tree kill on timeout.

#![allow(missing_docs)]

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::config::ExecutionConfig;
use crate::exec::environment::scrubbed_environment;

/// Poll cadence while waiting for the child to exit.
const WAIT_POLL: Duration = Duration::from_millis(50);
/// Grace between SIGTERM and SIGKILL when tearing down the process group.
const KILL_GRACE: Duration = Duration::from_millis(500);
/// Capture read chunk size.
const READ_CHUNK: usize = 4096;

// ──────────────────── result model ────────────────────

/// How one execution ended. Ephemeral, one per refresh tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    NonZeroExit,
    Timeout,
    Crashed,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl ExecutionResult {
    fn crashed(details: String) -> Self {
        Self {
            status: ExecutionStatus::Crashed,
            stdout: String::new(),
            stderr: details,
            exit_code: None,
            duration: Duration::ZERO,
            stdout_truncated: false,
            stderr_truncated: false,
        }
    }
}

// ──────────────────── executor ────────────────────

/// Runs validated widget scripts under fixed resource limits.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    /// Zero means unbounded (used by user-invoked actions configured so).
    timeout: Duration,
    stdout_cap: usize,
    stderr_cap: usize,
}

impl ScriptExecutor {
    /// Executor for scheduled widget refreshes.
    #[must_use]
    pub fn for_refresh(config: &ExecutionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.refresh_timeout_seconds),
            stdout_cap: config.stdout_cap_bytes,
            stderr_cap: config.stderr_cap_bytes,
        }
    }

    /// Executor for user-invoked actions (0 seconds = unbounded).
    #[must_use]
    pub fn for_action(config: &ExecutionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.action_timeout_seconds),
            stdout_cap: config.stdout_cap_bytes,
            stderr_cap: config.stderr_cap_bytes,
        }
    }

    #[must_use]
    pub fn with_limits(timeout: Duration, stdout_cap: usize, stderr_cap: usize) -> Self {
        Self {
            timeout,
            stdout_cap,
            stderr_cap,
        }
    }

    /// Run the resolved script. `extended` passes the single `--extended`
    /// argument for expanded-view refreshes.
    pub fn execute(&self, path: &Path, extended: bool) -> ExecutionResult {
        self.execute_cancellable(path, extended, &AtomicBool::new(false))
    }

    /// Like [`Self::execute`], but also tears the process tree down as soon
    /// as `cancel` is raised (daemon shutdown must not orphan a live
    /// subprocess). A cancelled run reports as [`ExecutionStatus::Timeout`].
    pub fn execute_cancellable(
        &self,
        path: &Path,
        extended: bool,
        cancel: &AtomicBool,
    ) -> ExecutionResult {
        let started = Instant::now();

        let mut command = Command::new(path);
        if extended {
            command.arg("--extended");
        }
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        command
            .env_clear()
            .envs(scrubbed_environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so a timeout can take down descendants too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(error) => {
                return ExecutionResult::crashed(format!(
                    "failed to spawn {}: {error}",
                    path.display()
                ));
            }
        };

        // Both streams are drained concurrently; a widget filling one pipe
        // buffer must not deadlock the other.
        let stdout_reader = child
            .stdout
            .take()
            .map(|stream| spawn_capture("dkh-stdout", stream, self.stdout_cap));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stream| spawn_capture("dkh-stderr", stream, self.stderr_cap));

        let (exit, timed_out) = self.wait_with_timeout(&mut child, started, cancel);

        let (stdout, stdout_truncated) = join_capture(stdout_reader);
        let (stderr, stderr_truncated) = join_capture(stderr_reader);
        let duration = started.elapsed();

        let (status, exit_code) = if timed_out {
            (ExecutionStatus::Timeout, None)
        } else {
            match exit.and_then(|s| s.code()) {
                Some(0) => (ExecutionStatus::Success, Some(0)),
                Some(code) => (ExecutionStatus::NonZeroExit, Some(code)),
                // Exited without a code: killed by an external signal.
                None => (ExecutionStatus::Crashed, None),
            }
        };

        ExecutionResult {
            status,
            stdout,
            stderr,
            exit_code,
            duration,
            stdout_truncated,
            stderr_truncated,
        }
    }

    /// Wait for exit, enforcing the timeout. Returns the exit status (if the
    /// child exited on its own) and whether the timeout fired.
    fn wait_with_timeout(
        &self,
        child: &mut Child,
        started: Instant,
        cancel: &AtomicBool,
    ) -> (Option<std::process::ExitStatus>, bool) {
        let unbounded = self.timeout.is_zero();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return (Some(status), false),
                Ok(None) => {}
                Err(_) => return (None, false),
            }

            let expired = !unbounded && started.elapsed() >= self.timeout;
            if expired || cancel.load(Ordering::Relaxed) {
                kill_process_tree(child);
                // Reap so the direct child never lingers as a zombie.
                let _ = child.wait();
                return (None, true);
            }

            thread::sleep(WAIT_POLL);
        }
    }
}

// ──────────────────── capture threads ────────────────────

fn spawn_capture<R: Read + Send + 'static>(
    name: &str,
    mut stream: R,
    cap: usize,
) -> JoinHandle<(Vec<u8>, bool)> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut collected = Vec::new();
            let mut truncated = false;
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if collected.len() < cap {
                            let take = n.min(cap - collected.len());
                            collected.extend_from_slice(&chunk[..take]);
                            if take < n {
                                truncated = true;
                            }
                        } else {
                            // Past the cap: keep draining so the child never
                            // blocks on a full pipe, discard the bytes.
                            truncated = true;
                        }
                    }
                }
            }
            (collected, truncated)
        })
        .unwrap_or_else(|_| thread::spawn(|| (Vec::new(), false)))
}

fn join_capture(handle: Option<JoinHandle<(Vec<u8>, bool)>>) -> (String, bool) {
    match handle.and_then(|h| h.join().ok()) {
        Some((bytes, truncated)) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        None => (String::new(), false),
    }
}

// ──────────────────── tree kill ────────────────────

/// Terminate the child's entire process group: SIGTERM, a short grace, then
/// SIGKILL for anything still alive. Killing only the immediate child would
/// orphan grandchildren spawned by the script.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    let pgid = Pid::from_raw(raw);

    let _ = killpg(pgid, Signal::SIGTERM);
    let deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    let _ = killpg(pgid, Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        drop(file);
        #[cfg(unix)]
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn executor() -> ScriptExecutor {
        ScriptExecutor::with_limits(Duration::from_secs(5), 64 * 1024, 32 * 1024)
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "ok.sh", "#!/bin/sh\necho 'title: Test'\n");

        let result = executor().execute(&path, false);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "title: Test\n");
        assert!(!result.stdout_truncated);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "fail.sh", "#!/bin/sh\necho oops >&2\nexit 3\n");

        let result = executor().execute(&path, false);
        assert_eq!(result.status, ExecutionStatus::NonZeroExit);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[test]
    fn extended_flag_is_passed_as_single_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "args.sh", "#!/bin/sh\necho \"argc=$# first=$1\"\n");

        let normal = executor().execute(&path, false);
        assert_eq!(normal.stdout, "argc=0 first=\n");

        let extended = executor().execute(&path, true);
        assert_eq!(extended.stdout, "argc=1 first=--extended\n");
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_script_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "cwd.sh", "#!/bin/sh\npwd\n");

        let result = executor().execute(&path, false);
        let reported = std::path::PathBuf::from(result.stdout.trim());
        assert_eq!(
            std::fs::canonicalize(reported).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn environment_is_replaced_not_inherited() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            &dir,
            "env.sh",
            "#!/bin/sh\necho \"path=$PATH\"\necho \"preload=$LD_PRELOAD\"\necho \"term=$TERM\"\n",
        );

        let result = executor().execute(&path, false);
        assert!(result.stdout.contains("path=/usr/local/bin:/usr/bin:/bin"));
        assert!(result.stdout.contains("preload=\n"));
        assert!(result.stdout.contains("term=\n"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_whole_process_tree() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("grandchild.pid");
        let path = script(
            &dir,
            "hang.sh",
            &format!("#!/bin/sh\nsleep 30 &\necho $! > {}\nwait\n", pid_file.display()),
        );

        let exec = ScriptExecutor::with_limits(Duration::from_millis(300), 1024, 1024);
        let started = Instant::now();
        let result = exec.execute(&path, false);

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5), "kill was prompt");

        // The background `sleep 30` must be gone too.
        let raw = std::fs::read_to_string(&pid_file).unwrap();
        let pid = nix::unistd::Pid::from_raw(raw.trim().parse::<i32>().unwrap());
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match nix::sys::signal::kill(pid, None) {
                Err(_) => break, // ESRCH: descendant is dead
                Ok(()) if Instant::now() > deadline => {
                    panic!("grandchild {pid} survived the tree kill");
                }
                Ok(()) => thread::sleep(Duration::from_millis(50)),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn output_is_capped_without_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        // ~400 KiB on each stream, far past both pipe buffers and the caps.
        let path = script(
            &dir,
            "noisy.sh",
            "#!/bin/sh\ni=0\nwhile [ $i -lt 100 ]; do\n  head -c 4096 /dev/zero | tr '\\0' 'x'\n  head -c 4096 /dev/zero | tr '\\0' 'e' >&2\n  i=$((i+1))\ndone\n",
        );

        let exec = ScriptExecutor::with_limits(Duration::from_secs(10), 8192, 4096);
        let result = exec.execute(&path, false);

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout.len(), 8192);
        assert_eq!(result.stderr.len(), 4096);
        assert!(result.stdout_truncated);
        assert!(result.stderr_truncated);
    }

    #[cfg(unix)]
    #[test]
    fn cancellation_tears_down_a_running_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "forever.sh", "#!/bin/sh\nsleep 60\n");

        let cancel = std::sync::Arc::new(AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&cancel);
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::Relaxed);
        });

        let exec = ScriptExecutor::with_limits(Duration::from_secs(60), 1024, 1024);
        let started = Instant::now();
        let result = exec.execute_cancellable(&path, false, &cancel);
        waker.join().unwrap();

        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn spawn_failure_is_crashed() {
        let result = executor().execute(Path::new("/nonexistent/widget.sh"), false);
        assert_eq!(result.status, ExecutionStatus::Crashed);
        assert!(result.stderr.contains("failed to spawn"));
    }
}
