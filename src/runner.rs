//! External command execution with a per-attempt timeout and bounded retry.
use std::{
    io::{Read, Write},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::error::RunnerError;

/// Default wall-clock timeout for a single attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Poll interval while waiting for a child to finish.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A command to execute, with its timeout and retry policy.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Command line, executed through `sh -c`.
    pub command: String,
    /// Wall-clock timeout applied to each attempt.
    pub timeout: Duration,
    /// Total attempt budget; the command runs at most this many times.
    pub attempts: usize,
    /// Fixed wait between a failed attempt and the next.
    pub retry_delay: Duration,
    /// Data written to the child's stdin, when present.
    pub stdin: Option<String>,
}

impl RunRequest {
    /// Creates a request with the default timeout and a single attempt.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
            attempts: 1,
            retry_delay: Duration::ZERO,
            stdin: None,
        }
    }

    /// Overrides the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the total attempt budget.
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Sets the fixed wait between failed attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Feeds the given data to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Captured result of a completed command.
#[derive(Debug)]
pub struct RunOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub code: i32,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl RunOutput {
    /// stdout with trailing whitespace stripped.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end()
    }
}

/// Runs a command, retrying failed attempts up to the request's budget.
///
/// Returns the output of the first attempt that exits zero; otherwise the
/// error of the final attempt.
pub fn run(request: &RunRequest) -> Result<RunOutput, RunnerError> {
    for attempt in 1..request.attempts {
        match run_attempt(request) {
            Ok(output) => return Ok(output),
            Err(err) => {
                warn!(
                    command = %request.command,
                    attempt,
                    attempts = request.attempts,
                    "command attempt failed: {err}"
                );
                thread::sleep(request.retry_delay);
            }
        }
    }
    run_attempt(request)
}

/// Sentinel-style wrapper for status checks: failure logs and yields `None`
/// instead of propagating.
pub fn run_quiet(request: &RunRequest) -> Option<RunOutput> {
    match run(request) {
        Ok(output) => Some(output),
        Err(err) => {
            debug!(command = %request.command, "command failed: {err}");
            None
        }
    }
}

fn run_attempt(request: &RunRequest) -> Result<RunOutput, RunnerError> {
    let output = run_once(request)?;
    if output.code != 0 {
        return Err(RunnerError::NonZeroExit {
            command: request.command.clone(),
            code: (output.code >= 0).then_some(output.code),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

fn run_once(request: &RunRequest) -> Result<RunOutput, RunnerError> {
    debug!(command = %request.command, timeout = ?request.timeout, "running command");

    let stdin = if request.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&request.command)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunnerError::Spawn {
            command: request.command.clone(),
            source,
        })?;

    if let Some(input) = &request.stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        // A child that exits before reading produces a broken pipe; the
        // non-zero exit surfaces the failure.
        let _ = pipe.write_all(input.as_bytes());
    }

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + request.timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RunnerError::TimedOut {
                    command: request.command.clone(),
                    timeout: request.timeout,
                });
            }
            None => thread::sleep(WAIT_POLL_INTERVAL),
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    debug!(
        command = %request.command,
        code = status.code().unwrap_or(-1),
        stdout = %stdout.trim_end(),
        stderr = %stderr.trim_end(),
        "command finished"
    );

    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_string(&mut buf);
        }
        buf
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Instant};

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn captures_stdout_and_stderr_separately() {
        let output = run(&RunRequest::new("echo out; echo err 1>&2")).unwrap();
        assert_eq!(output.code, 0);
        assert_eq!(output.stdout_trimmed(), "out");
        assert_eq!(output.stderr.trim_end(), "err");
    }

    #[test]
    fn failing_command_makes_exactly_the_requested_attempts() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("attempts");
        let command = format!("echo x >> {}; exit 1", marker.display());

        let result = run(
            &RunRequest::new(command)
                .attempts(3)
                .retry_delay(Duration::from_millis(5)),
        );

        assert!(matches!(result, Err(RunnerError::NonZeroExit { .. })));
        let recorded = fs::read_to_string(&marker).unwrap();
        assert_eq!(recorded.lines().count(), 3);
    }

    #[test]
    fn success_short_circuits_remaining_attempts() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("attempts");
        let command = format!("echo x >> {}", marker.display());

        run(&RunRequest::new(command).attempts(3)).unwrap();

        let recorded = fs::read_to_string(&marker).unwrap();
        assert_eq!(recorded.lines().count(), 1);
    }

    #[test]
    fn timeout_kills_the_child() {
        let started = Instant::now();
        let result = run(&RunRequest::new("sleep 30").timeout(Duration::from_millis(200)));

        assert!(matches!(result, Err(RunnerError::TimedOut { .. })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn stdin_is_fed_to_the_child() {
        let output = run(&RunRequest::new("cat").stdin("hello")).unwrap();
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn run_quiet_returns_none_on_failure() {
        assert!(run_quiet(&RunRequest::new("exit 3")).is_none());
        assert!(run_quiet(&RunRequest::new("true")).is_some());
    }
}
