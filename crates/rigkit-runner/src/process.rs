//! Spawns and supervises one runner process per case invocation, enforcing
//! the case's timeout and observing cooperative cancellation
//! (SPEC_FULL.md §4.7).

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::process::Stdio;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rigkit_utils::CancellationToken;
use serde_json::Value as Json;

use crate::command_spec::CommandSpec;
use crate::result::{ErrorDetail, RunnerResult};

/// Slice used to poll cancellation while waiting on the child process. Short
/// enough that cancellation is observed promptly, long enough to avoid
/// busy-waiting.
const POLL_SLICE: Duration = Duration::from_millis(200);

/// Grace period given to a terminated process before the engine gives up
/// waiting on its exit (order of seconds, per spec.md §5).
const TERMINATION_GRACE: Duration = Duration::from_secs(3);

/// Everything needed to invoke a runner for one case (spec.md §6.2).
#[derive(Debug, Clone)]
pub struct RunnerInvocation {
    pub command: CommandSpec,
    pub run_folder: Utf8PathBuf,
    pub stdin_payload: Json,
    pub timeout: Duration,
    pub test_id: String,
    pub test_version: String,
    pub effective_inputs_redacted: Json,
}

/// Why a case invocation did not run to a normal process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    ProcessExited,
    TimedOut,
    Cancelled,
}

/// Spawns, supervises, and collects the result of one case's runner
/// process. Implementations MUST use argv-only process spawning.
pub trait CaseRunner: Send + Sync {
    fn run(&self, invocation: &RunnerInvocation, cancel: &CancellationToken) -> RunnerResult;
}

/// The real [`CaseRunner`]: spawns an OS process, streams its stdout/stderr
/// into the run folder, and enforces the timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCaseRunner;

impl ProcessCaseRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn stream_to_file<R: Read + Send + 'static>(mut source: R, path: &Path) -> thread::JoinHandle<()> {
        let path = path.to_path_buf();
        thread::spawn(move || {
            let Ok(mut file) = File::create(&path) else { return };
            let mut buf = [0u8; 8192];
            loop {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if file.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })
    }
}

impl CaseRunner for ProcessCaseRunner {
    fn run(&self, invocation: &RunnerInvocation, cancel: &CancellationToken) -> RunnerResult {
        let start_time = chrono::Utc::now();

        let mut command = invocation.command.to_command();
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let end_time = chrono::Utc::now();
                return RunnerResult::synthesize_error(
                    &invocation.test_id,
                    &invocation.test_version,
                    start_time,
                    end_time,
                    invocation.effective_inputs_redacted.clone(),
                    ErrorDetail::new("runnerError", format!("failed to spawn runner: {e}")),
                );
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Ok(payload) = serde_json::to_vec(&invocation.stdin_payload) {
                let _ = stdin.write_all(&payload);
            }
        }

        let stdout_path = invocation.run_folder.join("stdout.log");
        let stderr_path = invocation.run_folder.join("stderr.log");
        let stdout_handle = child.stdout.take().map(|s| Self::stream_to_file(BufReader::new(s), stdout_path.as_std_path()));
        let stderr_handle = child.stderr.take().map(|s| Self::stream_to_file(BufReader::new(s), stderr_path.as_std_path()));

        let pid = child.id();
        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let status = child.wait();
            let _ = tx.send(status);
        });

        let deadline = Instant::now() + invocation.timeout;
        let mut stop_reason = StopReason::ProcessExited;
        let exit_status = loop {
            if cancel.is_cancelled() {
                stop_reason = StopReason::Cancelled;
                break None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                stop_reason = StopReason::TimedOut;
                break None;
            }
            let slice = remaining.min(POLL_SLICE);
            match rx.recv_timeout(slice) {
                Ok(status) => break status.ok(),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    stop_reason = StopReason::ProcessExited;
                    break None;
                }
            }
        };

        if stop_reason != StopReason::ProcessExited {
            terminate_process(pid);
            let _ = rx.recv_timeout(TERMINATION_GRACE);
        }
        let _ = waiter.join();
        if let Some(handle) = stdout_handle {
            let _ = handle.join();
        }
        if let Some(handle) = stderr_handle {
            let _ = handle.join();
        }

        let end_time = chrono::Utc::now();

        match stop_reason {
            StopReason::TimedOut => RunnerResult::synthesize_timeout(
                &invocation.test_id,
                &invocation.test_version,
                start_time,
                end_time,
                invocation.effective_inputs_redacted.clone(),
                invocation.timeout.as_secs(),
            ),
            StopReason::Cancelled => {
                let mut result = RunnerResult::synthesize_error(
                    &invocation.test_id,
                    &invocation.test_version,
                    start_time,
                    end_time,
                    invocation.effective_inputs_redacted.clone(),
                    ErrorDetail::new("aborted", "run was cancelled before the process exited"),
                );
                result.status = crate::result::RunStatus::Aborted;
                result
            }
            StopReason::ProcessExited => {
                read_result_document(invocation, exit_status.and_then(|s| s.code()), start_time, end_time)
            }
        }
    }
}

fn read_result_document(
    invocation: &RunnerInvocation,
    exit_code: Option<i32>,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: chrono::DateTime<chrono::Utc>,
) -> RunnerResult {
    let result_path = invocation.run_folder.join("result.json");
    match std::fs::read_to_string(&result_path) {
        Ok(content) => match serde_json::from_str::<RunnerResult>(&content) {
            Ok(result) => result,
            Err(e) => RunnerResult::synthesize_error(
                &invocation.test_id,
                &invocation.test_version,
                start_time,
                end_time,
                invocation.effective_inputs_redacted.clone(),
                ErrorDetail::new(
                    "runnerError",
                    format!("runner produced an unparseable result.json (exit code {exit_code:?}): {e}"),
                ),
            ),
        },
        Err(_) => RunnerResult::synthesize_error(
            &invocation.test_id,
            &invocation.test_version,
            start_time,
            end_time,
            invocation.effective_inputs_redacted.clone(),
            ErrorDetail::new(
                "runnerError",
                format!("runner did not produce result.json (exit code {exit_code:?})"),
            ),
        ),
    }
}

/// Force-terminate a runner process that did not exit within its timeout or
/// was cancelled. SIGKILL on Unix, `TerminateProcess` on Windows: the one
/// platform-specific surface in the engine core (spec.md §4.11 makes the
/// same exception for elevation detection).
#[cfg_attr(not(any(unix, windows)), allow(unused_variables))]
fn terminate_process(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }

    #[cfg(windows)]
    #[allow(unsafe_code)]
    unsafe {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

        if let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, pid) {
            let _ = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);
        }
    }
}
