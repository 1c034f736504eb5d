//! Stream draining
//!
//! A child process (or SSH channel) blocks once its output pipe fills up, so
//! every output stream must be consumed to the end whether or not anyone cares
//! about the content. [`DrainTask`] does that, optionally forwarding each
//! complete line to an [`OutputSink`].
//!
//! Draining is best effort: read failures end the task and sink failures only
//! stop the forwarding. Neither is reported to the caller, so losing output can
//! never prevent the exit code from being delivered.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::sink::OutputSink;

const DISCARD_BUFFER_SIZE: usize = 1024;

/// Longest line forwarded before the rest of the stream is discarded
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// What to do with drained content
#[derive(Debug, Clone)]
pub enum Dump {
    /// Read and drop everything
    Discard,
    /// Forward complete lines to a sink
    Forward {
        /// Destination for forwarded lines
        sink: OutputSink,
        /// Close the sink once the stream ends
        close_at_end: bool,
    },
}

/// Outcome of a finished drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Bytes consumed from the stream
    pub bytes_read: u64,
    /// Lines written to the sink
    pub lines_forwarded: usize,
    /// Whether an unterminated final fragment or an overlong line was dropped
    pub dropped_fragment: bool,
}

/// One stream bound to a [`Dump`] behaviour
#[derive(Debug)]
pub struct DrainTask<R> {
    reader: R,
    dump: Dump,
    stream: &'static str,
    max_line: usize,
}

impl<R> DrainTask<R>
where
    R: AsyncRead + Unpin,
{
    /// Drain `reader`, forwarding to `sink` when one is given
    pub fn new(reader: R, sink: Option<OutputSink>, close_at_end: bool) -> Self {
        let dump = match sink {
            Some(sink) => Dump::Forward { sink, close_at_end },
            None => Dump::Discard,
        };
        Self {
            reader,
            dump,
            stream: "output",
            max_line: MAX_LINE_LENGTH,
        }
    }

    /// Drain `reader` and drop the content
    pub fn discard(reader: R) -> Self {
        Self::new(reader, None, false)
    }

    /// Drain `reader`, forwarding each line to `sink`
    pub fn forward(reader: R, sink: OutputSink, close_at_end: bool) -> Self {
        Self::new(reader, Some(sink), close_at_end)
    }

    /// Name of the stream used in log events
    #[must_use]
    pub fn with_label(mut self, stream: &'static str) -> Self {
        self.stream = stream;
        self
    }

    /// Cap on buffered line length; a longer line switches to discard mode
    #[must_use]
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Run the drain on the tokio runtime
    pub fn spawn(self) -> JoinHandle<DrainSummary>
    where
        R: Send + 'static,
    {
        tokio::spawn(self.run())
    }

    /// Consume the stream to its end
    pub async fn run(self) -> DrainSummary {
        let Self {
            mut reader,
            dump,
            stream,
            max_line,
        } = self;
        let mut summary = DrainSummary::default();

        match dump {
            Dump::Discard => discard(&mut reader, &mut summary, stream).await,
            Dump::Forward { sink, close_at_end } => {
                forward(reader, &sink, max_line, &mut summary, stream).await;
                if close_at_end {
                    if let Err(e) = sink.close().await {
                        error!(stream, error = %e, "error closing the dump sink");
                    }
                }
            }
        }

        debug!(
            stream,
            bytes = summary.bytes_read,
            lines = summary.lines_forwarded,
            "stream drained"
        );
        summary
    }
}

async fn discard<R>(reader: &mut R, summary: &mut DrainSummary, stream: &str)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; DISCARD_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => summary.bytes_read += n as u64,
            Err(e) => {
                error!(stream, error = %e, "error draining the stream");
                break;
            }
        }
    }
}

async fn forward<R>(
    reader: R,
    sink: &OutputSink,
    max_line: usize,
    summary: &mut DrainSummary,
    stream: &str,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        // One byte over the cap for the terminator
        let limit = max_line as u64 + 1;
        match (&mut reader).take(limit).read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(n) => {
                summary.bytes_read += n as u64;

                if line.len() > max_line && line.last() != Some(&b'\n') {
                    warn!(stream, max_line, "line too long, discarding the rest of the stream");
                    summary.dropped_fragment = true;
                    discard(&mut reader, summary, stream).await;
                    return;
                }

                // read_until only stops short of the delimiter at end of stream
                if line.last() != Some(&b'\n') {
                    debug!(stream, len = line.len(), "dropping unterminated final fragment");
                    summary.dropped_fragment = true;
                    break;
                }
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }

                let text = String::from_utf8_lossy(&line);
                if let Err(e) = sink.write_line(&text).await {
                    error!(stream, error = %e, "error writing to the dump sink, discarding the rest");
                    discard(&mut reader, summary, stream).await;
                    return;
                }
                summary.lines_forwarded += 1;
            }
            Err(e) => {
                error!(stream, error = %e, "error draining the stream");
                break;
            }
        }
    }
}
