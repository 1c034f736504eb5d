//! A program with a working folder, executed with per-call arguments

use std::path::{Path, PathBuf};

use crate::error::ExecError;
use crate::local::LocalExecutor;
use crate::sink::OutputSink;

/// Program bound to an optional working folder
///
/// The program is fixed at construction. Arguments are not stored; each call
/// to [`exec`](Self::exec) joins its own arguments onto the program name with
/// single spaces. No quoting is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    folder: Option<PathBuf>,
}

impl Command {
    /// Bind `program`, running in the inherited working folder
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            folder: None,
        }
    }

    /// The program given at construction
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Working folder for subsequent executions (`None` inherits ours)
    pub fn set_folder(&mut self, folder: Option<PathBuf>) {
        self.folder = folder;
    }

    #[must_use]
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// `program arg1 arg2 ...`
    #[must_use]
    pub fn command_line(&self, args: &[&str]) -> String {
        let mut line = self.program.clone();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run the program with `args` through `executor`
    ///
    /// # Errors
    /// See [`LocalExecutor::execute`]
    pub async fn exec(
        &self,
        executor: &LocalExecutor,
        args: &[&str],
        sink: Option<OutputSink>,
        close_sink: bool,
    ) -> Result<i32, ExecError> {
        executor
            .execute(&self.command_line(args), self.folder(), sink, close_sink)
            .await
    }
}
