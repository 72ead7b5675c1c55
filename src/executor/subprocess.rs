//! Subprocess execution for container runtime calls.
//!
//! Programs are exec'd directly without a shell. Output is drained on
//! background threads while the child is polled against its deadline.

use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ContainerErrorKind, UnitError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of a finished subprocess.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Whether the command exited with status 0.
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl SubprocessBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run to completion, killing the process if it outlives the timeout.
    pub fn run(self) -> Result<SubprocessResult, UnitError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            timeout_secs = self.timeout.as_secs(),
            "Executing subprocess"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("Failed to spawn {}: {}", self.program, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let status = self.wait(&mut child, started)?;

        let result = SubprocessResult {
            success: status.success(),
            exit_code: status.code(),
            stdout: join_output(stdout),
            stderr: join_output(stderr),
        };
        debug!(
            success = result.success,
            exit_code = ?result.exit_code,
            duration_ms = started.elapsed().as_millis(),
            "Subprocess completed"
        );
        Ok(result)
    }

    fn wait(&self, child: &mut Child, started: Instant) -> Result<ExitStatus, UnitError> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() > self.timeout => {
                    warn!(
                        program = %self.program,
                        timeout_secs = self.timeout.as_secs(),
                        "Process timed out, killing"
                    );
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "Failed to kill timed-out process");
                    }
                    let _ = child.wait();
                    return Err(UnitError::Container {
                        kind: ContainerErrorKind::Timeout {
                            timeout_secs: self.timeout.as_secs(),
                        },
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(failed(format!("Failed to check process status: {}", e)));
                }
            }
        }
    }
}

fn failed(message: String) -> UnitError {
    UnitError::Container {
        kind: ContainerErrorKind::RuntimeFailed { message },
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_output(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_command(program: &str, args: &[&str]) -> Result<SubprocessResult, UnitError> {
        SubprocessBuilder::new(program)
            .args(args.iter().copied())
            .timeout(Duration::from_secs(5))
            .run()
    }

    #[test]
    fn test_run_echo() {
        let result = run_command("echo", &["hello", "world"]).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = run_command("false", &[]).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_env_is_passed() {
        let result = SubprocessBuilder::new("sh")
            .args(["-c", "echo $TASKFLOW_TEST_VAR"])
            .env("TASKFLOW_TEST_VAR", "hello_env")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello_env");
    }

    #[test]
    fn test_large_output_does_not_block() {
        let result = run_command("sh", &["-c", "head -c 200000 /dev/zero | tr '\\0' x"]).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.len(), 200_000);
    }

    #[test]
    fn test_timeout_kills_process() {
        let result = SubprocessBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200))
            .run();
        assert!(matches!(
            result,
            Err(UnitError::Container {
                kind: ContainerErrorKind::Timeout { .. }
            })
        ));
    }

    #[test]
    fn test_nonexistent_command() {
        let result = run_command("nonexistent_command_12345", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stderr_capture() {
        let result = run_command("sh", &["-c", "echo error >&2"]).unwrap();
        assert!(result.success);
        assert_eq!(result.stderr.trim(), "error");
    }
}
