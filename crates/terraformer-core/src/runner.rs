//! Execution of a single terraform step as a child process.
//!
//! Standard output and standard error are drained concurrently. Every line is
//! logged tagged with the step's arguments and appended to a capture buffer
//! that lives exactly as long as the step, so a failure report only ever
//! contains the output of the step that failed.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{Result, TerraformerError};
use crate::operation::Step;

/// PID of the terraform process currently running, shared with the signal
/// relay.
#[derive(Debug, Clone, Default)]
pub struct ActiveProcess {
    pid: Arc<Mutex<Option<u32>>>,
}

impl ActiveProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// PID of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    /// Send `signal` to the running child, holding the slot so the PID cannot
    /// be released and reaped meanwhile. `None` when no child is running.
    pub fn signal(&self, signal: Signal) -> Option<(u32, nix::Result<()>)> {
        let slot = self.pid.lock();
        let pid = (*slot)?;
        Some((pid, kill(Pid::from_raw(pid as i32), signal)))
    }

    /// Register `pid` as the running child. Fails if another is registered.
    pub(crate) fn claim(&self, pid: u32) -> Result<ActiveGuard> {
        let mut slot = self.pid.lock();
        if let Some(existing) = *slot {
            return Err(TerraformerError::ProcessBusy(existing));
        }
        *slot = Some(pid);
        Ok(ActiveGuard {
            active: self.clone(),
        })
    }
}

/// Clears the active PID. Must be dropped before the child is reaped.
pub(crate) struct ActiveGuard {
    active: ActiveProcess,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *self.active.pid.lock() = None;
    }
}

/// Output of one step, shared between the two stream copiers.
#[derive(Debug, Clone, Default)]
struct CaptureBuffer(Arc<Mutex<String>>);

impl CaptureBuffer {
    fn push_line(&self, line: &str) {
        let mut buf = self.0.lock();
        buf.push_str(line);
        buf.push('\n');
    }

    fn contents(&self) -> String {
        self.0.lock().clone()
    }
}

/// A step that exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub exit_code: i32,
    /// Everything the step wrote, prefixed with its arguments.
    pub output: String,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Success,
    Failure(StepFailure),
}

/// Spawns terraform steps one at a time.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    binary: PathBuf,
    working_dir: PathBuf,
    active: ActiveProcess,
}

impl ProcessRunner {
    pub fn new(binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, active: ActiveProcess) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            active,
        }
    }

    /// Run `step` to completion.
    ///
    /// A non-zero exit is reported as [`RunResult::Failure`]; only problems
    /// starting or supervising the process are errors.
    pub async fn execute(&self, step: &Step) -> Result<RunResult> {
        let args = step.to_string();
        if let Some(pid) = self.active.pid() {
            return Err(TerraformerError::ProcessBusy(pid));
        }

        tracing::info!(args = %args, "executing terraform command");

        let mut child = Command::new(&self.binary)
            .args(&step.args)
            .current_dir(&self.working_dir)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TerraformerError::Spawn {
                args: args.clone(),
                source: e,
            })?;

        let pid = child.id();
        let guard = match pid.map(|pid| self.active.claim(pid)).transpose() {
            Ok(guard) => guard,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };
        tracing::debug!(args = %args, ?pid, "terraform process started");

        let capture = CaptureBuffer::default();
        capture.push_line(&format!("args: {}", args));

        let copiers = [
            child.stdout.take().map(|out| spawn_copier(out, "stdout", &args, &capture)),
            child.stderr.take().map(|err| spawn_copier(err, "stderr", &args, &capture)),
        ];

        // The slot is cleared while the exited child is still a zombie, so a
        // relayed signal can never reach a recycled PID.
        if let Some(pid) = pid {
            wait_for_exit(pid).await;
        }
        drop(guard);
        let status = child.wait().await.map_err(|e| TerraformerError::Spawn {
            args: args.clone(),
            source: e,
        });

        // Drain whatever is left in the pipes before classifying.
        for copier in copiers.into_iter().flatten() {
            if let Err(e) = copier.await {
                tracing::warn!(args = %args, error = %e, "output copier failed");
            }
        }

        let status = status?;
        if status.success() {
            tracing::info!(args = %args, "terraform process finished successfully");
            return Ok(RunResult::Success);
        }

        let exit_code = status
            .code()
            .or_else(|| status.signal().map(|signo| 128 + signo))
            .unwrap_or(-1);
        tracing::error!(args = %args, exit_code, "terraform process finished with error");

        Ok(RunResult::Failure(StepFailure {
            exit_code,
            output: capture.contents(),
        }))
    }
}

/// Wait until `pid` has exited without reaping it.
async fn wait_for_exit(pid: u32) {
    let waited = tokio::task::spawn_blocking(move || loop {
        match waitid(
            Id::Pid(Pid::from_raw(pid as i32)),
            WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT,
        ) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    })
    .await;

    match waited {
        Ok(Ok(_)) => {}
        Ok(Err(errno)) => tracing::warn!(pid, error = %errno, "failed to wait for terraform process exit"),
        Err(e) => tracing::warn!(pid, error = %e, "exit watcher failed"),
    }
}

/// Copy one output stream line by line into the log and the capture buffer.
fn spawn_copier<R>(reader: R, stream: &'static str, args: &str, capture: &CaptureBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let args = args.to_string();
    let capture = capture.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    tracing::info!(args = %args, stream, "{}", line);
                    capture.push_line(line);
                }
                Err(e) => {
                    tracing::warn!(args = %args, stream, error = %e, "failed to read terraform output");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::StepKind;
    use std::os::unix::fs::PermissionsExt;
    use terraformer_config::PathSet;

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("fake-terraform");
        std::fs::write(&path, format!("#!/usr/bin/env bash\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn step(kind: StepKind) -> Step {
        Step::new(kind, &PathSet::default().with_base_dir("/nonexistent"))
    }

    #[tokio::test]
    async fn test_success() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(tmp.path(), "echo hello; echo oops >&2; exit 0");
        let runner = ProcessRunner::new(bin, tmp.path(), ActiveProcess::new());

        let result = runner.execute(&step(StepKind::Init)).await.unwrap();
        assert_eq!(result, RunResult::Success);
    }

    #[tokio::test]
    async fn test_failure_captures_both_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(tmp.path(), "echo \"out $1\"; echo \"err $1\" >&2; exit 3");
        let active = ActiveProcess::new();
        let runner = ProcessRunner::new(bin, tmp.path(), active.clone());

        let RunResult::Failure(failure) = runner.execute(&step(StepKind::Apply)).await.unwrap() else {
            panic!("expected failure");
        };
        assert_eq!(failure.exit_code, 3);
        assert!(failure.output.starts_with("args: apply -input=false"));
        assert!(failure.output.contains("out apply"));
        assert!(failure.output.contains("err apply"));
        assert!(active.pid().is_none());
    }

    #[tokio::test]
    async fn test_capture_is_step_scoped() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(
            tmp.path(),
            "echo \"output of $1\"; if [ \"$1\" = plan ]; then exit 5; fi",
        );
        let runner = ProcessRunner::new(bin, tmp.path(), ActiveProcess::new());

        assert_eq!(
            runner.execute(&step(StepKind::Validate)).await.unwrap(),
            RunResult::Success
        );
        let RunResult::Failure(failure) = runner.execute(&step(StepKind::Plan)).await.unwrap() else {
            panic!("expected failure");
        };
        assert!(failure.output.contains("output of plan"));
        assert!(!failure.output.contains("output of validate"));
    }

    #[tokio::test]
    async fn test_killed_by_signal_reports_shell_style_code() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(tmp.path(), "kill -KILL $$");
        let runner = ProcessRunner::new(bin, tmp.path(), ActiveProcess::new());

        let RunResult::Failure(failure) = runner.execute(&step(StepKind::Init)).await.unwrap() else {
            panic!("expected failure");
        };
        assert_eq!(failure.exit_code, 128 + 9);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(
            tmp.path().join("does-not-exist"),
            tmp.path(),
            ActiveProcess::new(),
        );
        let err = runner.execute(&step(StepKind::Init)).await.unwrap_err();
        assert!(matches!(err, TerraformerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_refuses_second_active_process() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(tmp.path(), "exit 0");
        let active = ActiveProcess::new();
        let _held = active.claim(4242).unwrap();

        let runner = ProcessRunner::new(bin, tmp.path(), active.clone());
        let err = runner.execute(&step(StepKind::Init)).await.unwrap_err();
        assert!(matches!(err, TerraformerError::ProcessBusy(4242)));
    }

    #[tokio::test]
    async fn test_exit_is_observed_before_reaping() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();

        wait_for_exit(pid).await;
        // Still a zombie, so the PID has not been handed out again.
        assert!(kill(Pid::from_raw(pid as i32), None).is_ok());
        assert!(child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_signal_reaches_registered_child_only() {
        let active = ActiveProcess::new();
        assert!(active.signal(Signal::SIGTERM).is_none());

        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = child.id().unwrap();
        let guard = active.claim(pid).unwrap();

        let (signalled, result) = active.signal(Signal::SIGTERM).unwrap();
        assert_eq!(signalled, pid);
        assert!(result.is_ok());
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));

        drop(guard);
        assert!(active.signal(Signal::SIGTERM).is_none());
    }

    #[tokio::test]
    async fn test_slot_is_free_after_execute() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = script(tmp.path(), "exit 0");
        let active = ActiveProcess::new();
        let runner = ProcessRunner::new(bin, tmp.path(), active.clone());

        runner.execute(&step(StepKind::Init)).await.unwrap();
        assert!(active.pid().is_none());
        assert!(active.signal(Signal::SIGINT).is_none());
    }

    #[test]
    fn test_guard_clears_pid() {
        let active = ActiveProcess::new();
        {
            let _guard = active.claim(7).unwrap();
            assert_eq!(active.pid(), Some(7));
            assert!(active.claim(8).is_err());
        }
        assert_eq!(active.pid(), None);
    }
}
