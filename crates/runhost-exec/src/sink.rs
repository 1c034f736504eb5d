//! Output sinks receiving forwarded command output

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Line terminator appended to every forwarded line
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
/// Line terminator appended to every forwarded line
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Shared destination for command output
///
/// Cloning is cheap and every clone writes to the same underlying writer, so
/// the stdout and stderr drains of one execution can share a sink. Each line is
/// written and flushed while holding the lock, which keeps lines from different
/// streams whole.
#[derive(Clone)]
pub struct OutputSink {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

impl OutputSink {
    /// Wrap any async writer
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::pin(writer))),
        }
    }

    /// Sink writing to the standard output of this process
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// In-memory sink plus a handle to inspect what was written
    #[must_use]
    pub fn memory() -> (Self, CapturedOutput) {
        let state = Arc::new(std::sync::Mutex::new(Captured::default()));
        let sink = Self::new(MemoryWriter {
            state: Arc::clone(&state),
        });
        (sink, CapturedOutput { state })
    }

    /// Write one line followed by [`LINE_ENDING`], then flush
    ///
    /// # Errors
    /// Returns the underlying writer's error
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(LINE_ENDING.as_bytes()).await?;
        writer.flush().await
    }

    /// Write bytes verbatim, then flush
    ///
    /// # Errors
    /// Returns the underlying writer's error
    pub async fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Shut the underlying writer down
    ///
    /// # Errors
    /// Returns the underlying writer's error
    pub async fn close(&self) -> io::Result<()> {
        self.writer.lock().await.shutdown().await
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    closed: bool,
}

struct MemoryWriter {
    state: Arc<std::sync::Mutex<Captured>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "sink is closed",
            )));
        }
        state.bytes.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        Poll::Ready(Ok(()))
    }
}

/// Read side of [`OutputSink::memory`]
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    state: Arc<std::sync::Mutex<Captured>>,
}

impl CapturedOutput {
    /// Everything written so far, decoded lossily
    #[must_use]
    pub fn contents(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&state.bytes).into_owned()
    }

    /// Written text split into lines (terminators removed)
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    /// Whether the sink has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}
