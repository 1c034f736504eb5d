//! runhost-exec: Local and remote command execution
//!
//! Runs a command string either as a local child process or over an SSH exec
//! channel, drains its output streams concurrently (optionally forwarding each
//! line to an [`OutputSink`]) and returns the exit code once everything has
//! been drained.

pub mod cancel;
pub mod command;
pub mod drain;
pub mod error;
pub mod local;
pub mod platform;
pub mod sink;
pub mod ssh;
pub mod traits;

pub use cancel::CancelHandle;
pub use command::Command;
pub use drain::{DrainSummary, DrainTask, Dump};
pub use error::ExecError;
pub use local::LocalExecutor;
pub use platform::PlatformPrefix;
pub use sink::{CapturedOutput, LINE_ENDING, OutputSink};
pub use ssh::RemoteExecutor;
pub use traits::CommandRunner;

/// Exit status reported when the real one could not be determined
pub const UNKNOWN_STATUS: i32 = -1;
