//! Runs one job as a child process with a timeout and captures its output.
//!
//! The executor is pure with respect to the store: it never calls
//! `JobStore::finalize_*` itself. It only reports an outcome; the `Worker`
//! maps that outcome onto the right finalize call.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use std::io::Write as _;

use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::process_group;
use crate::shutdown::Shutdown;

/// Grace period between SIGTERM and SIGKILL when a job exceeds its timeout.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// The result of running one job to completion (or to a timeout/spawn failure).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// Set on timeout or spawn failure; `None` on a normal (possibly
    /// non-zero) exit, since a non-zero exit code speaks for itself.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.error.is_none() && self.exit_code == Some(0)
    }
}

/// An append-only byte sink for one job's interleaved stdout/stderr,
/// keyed by job id. The default implementation is a per-job log file;
/// tests can substitute an in-memory sink.
pub trait LogSink: Send + Sync {
    /// Open (creating if necessary) the append-only stream for `job_id`.
    fn open(&self, job_id: &str) -> std::io::Result<Box<dyn std::io::Write + Send>>;
}

/// Writes each job's output to `<dir>/job_<id>.log`.
pub struct FileLogSink {
    dir: PathBuf,
}

impl FileLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("job_{job_id}.log"))
    }
}

impl LogSink for FileLogSink {
    fn open(&self, job_id: &str) -> std::io::Result<Box<dyn std::io::Write + Send>> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(job_id))?;
        Ok(Box::new(file))
    }
}

pub struct Executor;

impl Executor {
    /// Spawn `command` under a shell, wait up to `timeout_seconds`, and
    /// capture interleaved stdout/stderr into `sink`. A second shutdown
    /// request observed on `shutdown` while the child is running cancels it
    /// early, the same way a timeout does.
    pub async fn run(
        job_id: &str,
        command: &str,
        timeout_seconds: i64,
        sink: &dyn LogSink,
        shutdown: &Shutdown,
    ) -> ExecutionOutcome {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| process_group::set_process_group());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionOutcome {
                    exit_code: Some(-1),
                    timed_out: false,
                    error: Some(format!("spawn failed: {err}")),
                };
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = spawn_copy_task(stdout.map(StdKind::Out), job_id, sink);
        let stderr_task = spawn_copy_task(stderr.map(StdKind::Err), job_id, sink);

        let timeout = Duration::from_secs(timeout_seconds.max(0) as u64);
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait()) => match result {
                Ok(Ok(status)) => ExecutionOutcome {
                    exit_code: status.code().map(i64::from),
                    timed_out: false,
                    error: None,
                },
                Ok(Err(err)) => ExecutionOutcome {
                    exit_code: None,
                    timed_out: false,
                    error: Some(format!("wait failed: {err}")),
                },
                Err(_) => {
                    Self::escalate_timeout(&mut child, pid).await;
                    ExecutionOutcome {
                        exit_code: Some(-1),
                        timed_out: true,
                        error: Some("timeout".to_string()),
                    }
                }
            },
            _ = shutdown.escalated() => {
                Self::escalate_timeout(&mut child, pid).await;
                ExecutionOutcome {
                    exit_code: Some(-1),
                    timed_out: false,
                    error: Some("cancelled: shutdown escalated".to_string()),
                }
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;

        outcome
    }

    async fn escalate_timeout(child: &mut Child, pid: Option<u32>) {
        if let Some(pid) = pid {
            let _ = process_group::terminate_process_group(pid);
        }

        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }

        if let Some(pid) = pid {
            let _ = process_group::kill_process_group(pid);
        }
        let _ = child.wait().await;
    }
}

enum StdKind {
    Out(tokio::process::ChildStdout),
    Err(tokio::process::ChildStderr),
}

/// Stream one pipe's bytes into the sink as they arrive. Each task opens its
/// own handle to the sink; for the default file sink that's an independent
/// `O_APPEND` file descriptor, so individual `write()` calls still interleave
/// correctly even though stdout and stderr are copied concurrently.
fn spawn_copy_task(
    pipe: Option<StdKind>,
    job_id: &str,
    sink: &dyn LogSink,
) -> tokio::task::JoinHandle<()> {
    let job_id = job_id.to_string();
    let mut writer = match sink.open(&job_id) {
        Ok(w) => w,
        Err(_) => return tokio::spawn(async {}),
    };

    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        match pipe {
            Some(StdKind::Out(mut r)) => loop {
                match r.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if writer.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            },
            Some(StdKind::Err(mut r)) => loop {
                match r.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if writer.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                }
            },
            None => {}
        }
    })
}

/// Resolve the default log directory relative to the current working directory.
pub fn default_log_dir() -> PathBuf {
    Path::new("./logs").to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct MemSink(Arc<Mutex<Vec<u8>>>);

    impl LogSink for MemSink {
        fn open(&self, _job_id: &str) -> std::io::Result<Box<dyn std::io::Write + Send>> {
            Ok(Box::new(MemWriter(self.0.clone())))
        }
    }

    struct MemWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for MemWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_kills_command_that_outlives_its_timeout() {
        let sink = MemSink::default();
        let shutdown = Shutdown::new();

        let outcome = Executor::run("timeout-test", "sleep 30", 1, &sink, &shutdown).await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(-1));
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn run_reports_success_for_a_zero_exit() {
        let sink = MemSink::default();
        let shutdown = Shutdown::new();

        let outcome = Executor::run("ok-test", "exit 0", 5, &sink, &shutdown).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code, Some(0));
    }
}
