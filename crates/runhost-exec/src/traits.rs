//! Command runner trait

use async_trait::async_trait;

use crate::error::ExecError;
use crate::sink::OutputSink;

/// Anything that can run a command string and report its exit code
///
/// Takes `&mut self` because a remote session runs one channel at a time.
#[async_trait]
pub trait CommandRunner: Send {
    /// Run `command`, forwarding output to `sink` when given
    async fn run(
        &mut self,
        command: &str,
        sink: Option<OutputSink>,
        close_sink: bool,
    ) -> Result<i32, ExecError>;

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}
