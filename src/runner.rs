//! Asynchronous external command execution.
//!
//! Every check ends up as one shell command line run in a manifest
//! directory. [`ProcessRunner::run`] resolves exactly once per call with the
//! exit code and the full stdout/stderr text; it never returns an error.
//! A command that cannot even be spawned resolves like a command that ran
//! and failed, with exit code 1 and the reason on stderr.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, instrument, trace, warn};

use crate::model::Platform;

/// A shell command line and the directory to run it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub dir: PathBuf,
}

impl Invocation {
    pub fn new(command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            dir: dir.into(),
        }
    }
}

/// Captured result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn spawn_failed(command: &str, error: &std::io::Error) -> Self {
        Self::new(1, "", format!("failed to run `{}`: {}", command, error))
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `invocation` to completion.
    async fn run(&self, invocation: &Invocation) -> ProcessOutput;
}

/// Runs commands through the platform shell (`sh -c`, or `cmd /C` on
/// Windows).
///
/// No timeout is applied: a hung tool hangs its check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

fn shell_command(command_line: &str) -> Command {
    match Platform::current() {
        Platform::Windows => {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command_line);
            cmd
        }
        Platform::Linux | Platform::MacOS => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command_line);
            cmd
        }
    }
}

async fn collect<R: AsyncRead + Unpin>(stream: Option<R>, name: &'static str) -> String {
    let mut stream = match stream {
        Some(stream) => stream,
        None => return String::new(),
    };

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                trace!(stream = name, bytes = n, "read chunk");
                buffer.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                warn!(stream = name, error = %e, "stopped reading process output");
                break;
            }
        }
    }

    String::from_utf8_lossy(&buffer).into_owned()
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    #[instrument(skip(self), fields(command = %invocation.command, dir = %invocation.dir.display()))]
    async fn run(&self, invocation: &Invocation) -> ProcessOutput {
        let mut cmd = shell_command(&invocation.command);
        cmd.current_dir(&invocation.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "spawn failed");
                return ProcessOutput::spawn_failed(&invocation.command, &e);
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (stdout, stderr, status) = tokio::join!(
            collect(stdout, "stdout"),
            collect(stderr, "stderr"),
            child.wait()
        );

        match status {
            Ok(status) => {
                // No code means the process was killed by a signal.
                let exit_code = status.code().unwrap_or(-1);
                debug!(exit_code, stdout_len = stdout.len(), stderr_len = stderr.len(), "command finished");
                ProcessOutput::new(exit_code, stdout, stderr)
            }
            Err(e) => {
                warn!(error = %e, "waiting for command failed");
                ProcessOutput::spawn_failed(&invocation.command, &e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outputs and records every invocation it receives.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: Mutex<VecDeque<ProcessOutput>>,
        pub calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, output: ProcessOutput) -> Self {
            self.replies.lock().unwrap().push_back(output);
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> ProcessOutput {
            self.calls.lock().unwrap().push(invocation.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ProcessOutput::new(0, "", ""))
        }
    }
}
