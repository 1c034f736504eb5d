//! Local command execution using `tokio::process`

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::UNKNOWN_STATUS;
use crate::drain::{DrainSummary, DrainTask};
use crate::error::ExecError;
use crate::platform::PlatformPrefix;
use crate::sink::OutputSink;
use crate::traits::CommandRunner;

/// Local command executor
///
/// Hands a command string to the platform shell prefix, drains stdout and
/// stderr while the child runs, and returns the exit code once the child has
/// exited and both streams are fully drained.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    prefix: PlatformPrefix,
}

impl LocalExecutor {
    /// Create a new local executor for the current platform
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix(PlatformPrefix::detect())
    }

    /// Create a local executor with an explicit shell prefix
    #[must_use]
    pub fn with_prefix(prefix: PlatformPrefix) -> Self {
        Self { prefix }
    }

    /// The prefix prepended to every command
    #[must_use]
    pub fn prefix(&self) -> &PlatformPrefix {
        &self.prefix
    }

    /// Whether commands are handed to a Windows command interpreter
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.prefix.is_windows()
    }

    /// Run `command` in the current directory, discarding its output
    ///
    /// # Errors
    /// See [`LocalExecutor::execute`]
    pub async fn run(&self, command: &str) -> Result<i32, ExecError> {
        self.execute(command, None, None, false).await
    }

    /// Run `command` in `folder`, discarding its output
    ///
    /// # Errors
    /// See [`LocalExecutor::execute`]
    pub async fn run_in(&self, command: &str, folder: &Path) -> Result<i32, ExecError> {
        self.execute(command, Some(folder), None, false).await
    }

    /// Run `command` in the current directory, forwarding output to `sink`
    ///
    /// The sink is left open.
    ///
    /// # Errors
    /// See [`LocalExecutor::execute`]
    pub async fn run_with_sink(&self, command: &str, sink: OutputSink) -> Result<i32, ExecError> {
        self.execute(command, None, Some(sink), false).await
    }

    /// Execute `command` and return its exit code
    ///
    /// stdout and stderr are both forwarded line by line to `sink`, in no
    /// particular order relative to each other, or discarded when no sink is
    /// given. When `close_sink` is set the sink is closed once both streams
    /// have ended. A child killed by a signal reports [`UNKNOWN_STATUS`].
    ///
    /// Dropping the returned future kills the child.
    ///
    /// # Errors
    /// - `ExecError::SpawnError` if the process cannot be started
    /// - `ExecError::Interrupted` if waiting for the child is interrupted
    /// - `ExecError::IoError` for any other failure while waiting
    #[instrument(skip(self, sink), level = "debug")]
    pub async fn execute(
        &self,
        command: &str,
        folder: Option<&Path>,
        sink: Option<OutputSink>,
        close_sink: bool,
    ) -> Result<i32, ExecError> {
        let start = Instant::now();
        let line = self.prefix.command_line(command);

        debug!(command = %command, argv = ?line, "executing local command");

        let (program, args) = line
            .split_first()
            .ok_or_else(|| ExecError::SpawnError("empty command line".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(folder) = folder {
            cmd.current_dir(folder);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::SpawnError(format!("{program}: {e}")))?;

        // Start draining before waiting, a full pipe would block the child forever
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(
                DrainTask::new(stdout, sink.clone(), false)
                    .with_label("stdout")
                    .spawn(),
            );
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(
                DrainTask::new(stderr, sink.clone(), false)
                    .with_label("stderr")
                    .spawn(),
            );
        }

        let status = child.wait().await.map_err(|e| ExecError::from_wait(&e))?;

        let drained = join_drains(drains).await;

        if close_sink {
            if let Some(sink) = &sink {
                if let Err(e) = sink.close().await {
                    error!(error = %e, "error closing the dump sink");
                }
            }
        }

        let code = status.code().unwrap_or(UNKNOWN_STATUS);

        debug!(
            command = %command,
            status = code,
            lines = drained.lines_forwarded,
            duration = ?start.elapsed(),
            "command completed"
        );

        Ok(code)
    }
}

/// Wait for every drain and add up what they consumed
async fn join_drains(drains: Vec<JoinHandle<DrainSummary>>) -> DrainSummary {
    let mut total = DrainSummary::default();
    for handle in drains {
        match handle.await {
            Ok(summary) => {
                total.bytes_read += summary.bytes_read;
                total.lines_forwarded += summary.lines_forwarded;
                total.dropped_fragment |= summary.dropped_fragment;
            }
            Err(e) => warn!(error = %e, "drain task did not finish"),
        }
    }
    total
}

#[async_trait]
impl CommandRunner for LocalExecutor {
    async fn run(
        &mut self,
        command: &str,
        sink: Option<OutputSink>,
        close_sink: bool,
    ) -> Result<i32, ExecError> {
        self.execute(command, None, sink, close_sink).await
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}
