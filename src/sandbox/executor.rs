//! Process supervision for a single sandbox run.

use super::usage::UsageSampler;
use super::{
    ExecutionError, ExecutionResult, MAX_OUTPUT_BYTES, ResourceLimits, error_kind, flags,
    limits, traceback,
};
use crate::language::Language;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for pipe readers once the child is gone. A grandchild
/// that escaped the process group can hold a pipe open indefinitely.
const PIPE_GRACE: Duration = Duration::from_millis(500);

pub(super) struct Job<'a> {
    pub interpreter: &'a OsStr,
    pub language: Language,
    pub code: &'a str,
    pub limits: ResourceLimits,
    pub stdin: Option<&'a str>,
}

type Capture = JoinHandle<(Vec<u8>, bool)>;

pub(super) async fn run(job: Job<'_>) -> ExecutionResult {
    let started = Instant::now();

    let workdir = match tempfile::TempDir::with_prefix("halluscan-") {
        Ok(dir) => dir,
        Err(e) => {
            return ExecutionResult::rejected(
                error_kind::SPAWN,
                format!("failed to create working directory: {e}"),
                started.elapsed(),
            );
        }
    };
    let script = job.language.script_name();
    if let Err(e) = std::fs::write(workdir.path().join(script), job.code) {
        return ExecutionResult::rejected(
            error_kind::SPAWN,
            format!("failed to write {script}: {e}"),
            started.elapsed(),
        );
    }

    let mut command = Command::new(job.interpreter);
    command
        .args(["-I", "-B", script])
        .current_dir(workdir.path())
        .env_clear()
        .env("PYTHONIOENCODING", "utf-8")
        .stdin(if job.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        command.env("PATH", path);
    }
    limits::confine(&mut command, &job.limits);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(interpreter = ?job.interpreter, error = %e, "failed to start interpreter");
            return ExecutionResult::rejected(
                error_kind::SPAWN,
                format!(
                    "failed to start interpreter '{}': {e}",
                    job.interpreter.to_string_lossy()
                ),
                started.elapsed(),
            );
        }
    };
    let pid = child.id();
    debug!(?pid, timeout_ms = job.limits.max_execution_time_ms, "sandbox process started");

    if let (Some(input), Some(mut pipe)) = (job.stdin, child.stdin.take()) {
        let input = input.to_owned();
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                trace!(error = %e, "stdin closed before input was written");
            }
        });
    }
    let stdout = child.stdout.take().map(|out| tokio::spawn(read_capped(out)));
    let stderr = child.stderr.take().map(|err| tokio::spawn(read_capped(err)));

    let (status, timed_out, sampler) = supervise(&mut child, pid, job.limits.timeout()).await;
    let elapsed = started.elapsed();

    let (output, stdout_truncated) = collect(stdout).await;
    let (stderr, stderr_truncated) = collect(stderr).await;

    let mut result = ExecutionResult {
        exit_code: status.as_ref().and_then(ExitStatus::code),
        timed_out,
        output,
        stderr,
        resource_usage: sampler.finish(elapsed),
        ..Default::default()
    };

    if stdout_truncated || stderr_truncated {
        result.security_flags.push(flags::OUTPUT_TRUNCATED.to_string());
    }

    if timed_out {
        result.security_flags.push(flags::TIMEOUT_ENFORCED.to_string());
        result.errors.push(ExecutionError::new(
            error_kind::TIMEOUT,
            format!(
                "execution exceeded {} ms and was terminated",
                job.limits.max_execution_time_ms
            ),
        ));
    } else if let Some(signal) = status.as_ref().and_then(terminating_signal) {
        record_signal(&mut result, signal);
    } else if result.exit_code != Some(0) {
        let parsed = traceback::parse(&result.stderr, job.code, script);
        if parsed.is_empty() {
            let status = result
                .exit_code
                .map_or_else(|| "unknown".to_string(), |code| code.to_string());
            result.errors.push(ExecutionError::new(
                error_kind::NON_ZERO_EXIT,
                format!("process exited with status {status}"),
            ));
        } else {
            if parsed.iter().any(|e| e.kind == error_kind::MEMORY) {
                result
                    .security_flags
                    .push(flags::MEMORY_LIMIT_EXCEEDED.to_string());
            }
            result.errors.extend(parsed);
        }
    }

    result.success = !result.timed_out && result.exit_code == Some(0) && result.errors.is_empty();
    debug!(
        success = result.success,
        exit_code = ?result.exit_code,
        timed_out = result.timed_out,
        elapsed_ms = result.resource_usage.execution_time_ms,
        "sandbox process finished"
    );
    result
}

/// Wait for the child while sampling its usage. The deadline wins over
/// everything: once it passes the whole process group is killed and reaped.
async fn supervise(
    child: &mut Child,
    pid: Option<u32>,
    timeout: Duration,
) -> (Option<ExitStatus>, bool, UsageSampler) {
    let mut sampler = UsageSampler::new(pid);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut timed_out = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = &mut deadline => {
                timed_out = true;
                debug!(?pid, "deadline passed, killing sandbox process");
                terminate(child, pid).await;
                break child.wait().await;
            }
            _ = ticker.tick() => sampler.sample(),
        }
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(error = %e, "failed to reap sandbox process");
            None
        }
    };
    (status, timed_out, sampler)
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: kill only sends a signal. The child leads its own group.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        trace!(error = %e, "child already gone");
    }
}

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_BYTES - kept.len();
                if n > room {
                    kept.extend_from_slice(&buf[..room]);
                    truncated = true;
                } else {
                    kept.extend_from_slice(&buf[..n]);
                }
            }
        }
    }
    (kept, truncated)
}

async fn collect(capture: Option<Capture>) -> (String, bool) {
    let Some(mut handle) = capture else {
        return (String::new(), false);
    };
    match tokio::time::timeout(PIPE_GRACE, &mut handle).await {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        Ok(Err(e)) => {
            warn!(error = %e, "output reader failed");
            (String::new(), false)
        }
        Err(_) => {
            handle.abort();
            debug!("output pipe still open after exit, giving up on it");
            (String::new(), false)
        }
    }
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn record_signal(result: &mut ExecutionResult, signal: i32) {
    #[cfg(unix)]
    if signal == libc::SIGXCPU {
        result.timed_out = true;
        result
            .security_flags
            .push(flags::CPU_LIMIT_EXCEEDED.to_string());
        result.errors.push(ExecutionError::new(
            error_kind::TIMEOUT,
            "CPU time limit exceeded",
        ));
        return;
    }
    result.security_flags.push(flags::killed_by_signal(signal));
    result.errors.push(ExecutionError::new(
        error_kind::PROCESS_KILLED,
        format!("process terminated by signal {signal}"),
    ));
}
