//! Subprocess execution behind a narrow, fakeable capability.
//!
//! Unpacking and scanning both shell out to external tools. They do so only
//! through [`ProcessRunner`], so tests can substitute a scripted runner for
//! real subprocesses.

use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Poll interval while waiting on a child with a deadline.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully described subprocess invocation.
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the child. Values are never logged.
    pub envs: Vec<(String, SecretString)>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: SecretString) -> Self {
        self.envs.push((key.into(), value));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shell-like rendering for log lines, e.g. `tar -xf a.tar --directory out`.
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Human-readable reason for a failed run: exit code plus trimmed stderr.
    pub fn failure_detail(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stderr = stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

/// Runs a subprocess to completion and captures its output.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        debug!("Running {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &spec.envs {
            command.env(key, value.expose_secret());
        }

        let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;

        // Drain both pipes concurrently so a chatty child never blocks on a full pipe.
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match spec.timeout {
            Some(timeout) => wait_with_deadline(&mut child, spec, timeout)?,
            None => child.wait().map_err(|e| ProcessError::Wait {
                program: spec.program.clone(),
                source: e,
            })?,
        };

        Ok(ProcessOutput {
            success: status.success(),
            code: status.code(),
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        })
    }
}

fn wait_with_deadline(
    child: &mut Child,
    spec: &CommandSpec,
    timeout: Duration,
) -> Result<std::process::ExitStatus, ProcessError> {
    let deadline = Instant::now() + timeout;
    loop {
        let polled = child.try_wait().map_err(|e| ProcessError::Wait {
            program: spec.program.clone(),
            source: e,
        })?;
        if let Some(status) = polled {
            return Ok(status);
        }

        if Instant::now() >= deadline {
            warn!(
                "'{}' exceeded its {:?} limit, killing it",
                spec.program, timeout
            );
            if let Err(e) = child.kill() {
                warn!("Failed to kill '{}': {}", spec.program, e);
            }
            // Reap the child so it does not linger as a zombie.
            let _ = child.wait();
            return Err(ProcessError::TimedOut {
                program: spec.program.clone(),
                timeout,
            });
        }

        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
