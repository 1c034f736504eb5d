//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use russh::keys::ssh_key::{self, HashAlg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

use crate::UNKNOWN_STATUS;
use crate::cancel::CancelHandle;
use crate::drain::DrainTask;
use crate::error::ExecError;
use crate::sink::OutputSink;
use crate::traits::CommandRunner;

/// Buffer between the channel pump and the output drain
const PIPE_CAPACITY: usize = 64 * 1024;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no)
        info!(
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "auto accepting the server key"
        );
        Ok(true)
    }
}

/// Hands out the connect password at most once per session
struct PasswordAnswer {
    password: String,
    supplied: bool,
}

impl PasswordAnswer {
    fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            supplied: false,
        }
    }

    fn supply(&mut self, prompt: &str) -> Result<String, ExecError> {
        if self.supplied {
            error!(prompt, "prompted for the password again, maybe wrong password?");
            return Err(ExecError::PasswordReprompted);
        }
        self.supplied = true;
        debug!(prompt, "answering with the password passed to connect");
        Ok(self.password.clone())
    }
}

fn auth_error(e: russh::Error) -> ExecError {
    ExecError::AuthenticationFailed(e.to_string())
}

fn transport_error(e: russh::Error) -> ExecError {
    ExecError::Transport(e.to_string())
}

/// Authenticate with a single password answer
///
/// Keyboard-interactive is tried first so servers that prompt get the
/// password exactly once. Servers without it fall back to the `password`
/// method, unless the password was already used.
async fn authenticate(
    session: &mut client::Handle<SshClientHandler>,
    user: &str,
    answer: &mut PasswordAnswer,
) -> Result<(), ExecError> {
    let mut response = session
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(auth_error)?;

    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(()),
            KeyboardInteractiveAuthResponse::Failure { .. } => break,
            KeyboardInteractiveAuthResponse::InfoRequest {
                name,
                instructions,
                prompts,
            } => {
                if !name.is_empty() || !instructions.is_empty() {
                    info!(%name, %instructions, "message from server");
                }
                let mut responses = Vec::with_capacity(prompts.len());
                for prompt in &prompts {
                    responses.push(answer.supply(&prompt.prompt)?);
                }
                response = session
                    .authenticate_keyboard_interactive_respond(responses)
                    .await
                    .map_err(auth_error)?;
            }
        }
    }

    if answer.supplied {
        return Err(ExecError::AuthenticationFailed(
            "password rejected".to_string(),
        ));
    }

    let password = answer.supply("password")?;
    let auth_res = session
        .authenticate_password(user, password)
        .await
        .map_err(auth_error)?;

    if auth_res.success() {
        Ok(())
    } else {
        Err(ExecError::AuthenticationFailed(
            "password rejected".to_string(),
        ))
    }
}

/// What the pump cares about from an exec channel
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(i32),
    Eof,
    Other,
    Closed,
}

#[async_trait]
trait ExecChannel: Send {
    async fn next_event(&mut self) -> ChannelEvent;
    async fn close(&mut self) -> Result<(), ExecError>;
}

#[async_trait]
impl ExecChannel for Channel<client::Msg> {
    async fn next_event(&mut self) -> ChannelEvent {
        match self.wait().await {
            Some(ChannelMsg::Data { data }) => ChannelEvent::Stdout(data.to_vec()),
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => ChannelEvent::Stderr(data.to_vec()),
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                ChannelEvent::ExitStatus(exit_status.cast_signed())
            }
            Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                warn!(signal = ?signal_name, "remote command terminated by signal");
                ChannelEvent::Other
            }
            Some(ChannelMsg::Eof) => ChannelEvent::Eof,
            Some(ChannelMsg::Close) | None => ChannelEvent::Closed,
            Some(_) => ChannelEvent::Other,
        }
    }

    async fn close(&mut self) -> Result<(), ExecError> {
        Channel::<client::Msg>::close(self)
            .await
            .map_err(transport_error)
    }
}

async fn wait_cancelled(cancel: Option<&CancelHandle>) {
    match cancel {
        Some(handle) => handle.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Move channel output into the drain until the channel closes
///
/// The exit status usually arrives after EOF, so the loop runs until the
/// channel is closed rather than stopping at EOF.
async fn pump<C>(
    channel: &mut C,
    sink: Option<OutputSink>,
    close_sink: bool,
    cancel: Option<&CancelHandle>,
) -> i32
where
    C: ExecChannel + ?Sized,
{
    let (stdout_tx, stdout_rx) = tokio::io::duplex(PIPE_CAPACITY);
    let drain = DrainTask::new(stdout_rx, sink.clone(), false)
        .with_label("channel")
        .spawn();
    let mut stdout_tx = Some(stdout_tx);
    let mut status = UNKNOWN_STATUS;

    let cancelled = wait_cancelled(cancel);
    tokio::pin!(cancelled);

    loop {
        let event = tokio::select! {
            event = channel.next_event() => event,
            () = &mut cancelled => {
                warn!("execution cancelled, disconnecting the channel");
                break;
            }
        };

        match event {
            ChannelEvent::Stdout(data) => {
                if let Some(tx) = stdout_tx.as_mut() {
                    if let Err(e) = tx.write_all(&data).await {
                        warn!(error = %e, "output drain stopped, discarding channel output");
                        stdout_tx = None;
                    }
                }
            }
            ChannelEvent::Stderr(data) => {
                if let Some(sink) = &sink {
                    if let Err(e) = sink.write_raw(&data).await {
                        error!(error = %e, "error writing the error stream to the dump sink");
                    }
                }
            }
            ChannelEvent::ExitStatus(code) => status = code,
            ChannelEvent::Eof => stdout_tx = None,
            ChannelEvent::Other => {}
            ChannelEvent::Closed => break,
        }
    }

    drop(stdout_tx);
    match drain.await {
        Ok(summary) => debug!(
            bytes = summary.bytes_read,
            lines = summary.lines_forwarded,
            "channel output drained"
        ),
        Err(e) => warn!(error = %e, "drain task did not finish"),
    }

    if close_sink {
        if let Some(sink) = &sink {
            if let Err(e) = sink.close().await {
                error!(error = %e, "error closing the dump sink");
            }
        }
    }

    if let Err(e) = channel.close().await {
        debug!(error = %e, "channel was already closed");
    }

    status
}

/// SSH command executor
///
/// Holds at most one authenticated session. Every [`execute`](Self::execute)
/// opens its own exec channel and closes it before returning, so executions on
/// one session are strictly sequential.
pub struct RemoteExecutor {
    /// SSH client configuration
    config: Arc<client::Config>,
    /// SSH session (set by `connect`)
    session: Option<client::Handle<SshClientHandler>>,
    /// Host of the current session
    host: Option<String>,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("host", &self.host)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExecutor {
    /// Create an unconnected executor
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(client::Config::default())
    }

    /// Create an unconnected executor with a custom russh configuration
    #[must_use]
    pub fn with_config(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
            session: None,
            host: None,
        }
    }

    /// Host of the current session
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Connect and authenticate with a password
    ///
    /// An existing session is disconnected first. Any host key is accepted.
    ///
    /// # Errors
    /// - `ExecError::ConnectionFailed` if the host cannot be reached
    /// - `ExecError::AuthenticationFailed` if the password is rejected
    /// - `ExecError::PasswordReprompted` if the server asks for it twice
    #[instrument(skip(self, password))]
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<(), ExecError> {
        if self.session.is_some() {
            if let Err(e) = self.disconnect().await {
                warn!(error = %e, "failed to close the previous session");
            }
        }

        info!(host, port, user = username, "connecting to SSH");

        let mut session = client::connect(Arc::clone(&self.config), (host, port), SshClientHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let mut answer = PasswordAnswer::new(password);
        if let Err(e) = authenticate(&mut session, username, &mut answer).await {
            let _ = session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(e);
        }

        info!(host, "SSH connected and authenticated");

        self.session = Some(session);
        self.host = Some(host.to_string());
        Ok(())
    }

    /// Whether a session exists and is still open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Close the session, if any
    ///
    /// # Errors
    /// Returns `ExecError::Transport` if the disconnect message cannot be sent;
    /// the session is dropped either way
    pub async fn disconnect(&mut self) -> Result<(), ExecError> {
        let host = self.host.take();
        match self.session.take() {
            Some(session) => {
                session
                    .disconnect(Disconnect::ByApplication, "", "English")
                    .await
                    .map_err(transport_error)?;
                info!(host = ?host, "SSH disconnected");
            }
            None => info!("no session to disconnect (probably never connected)"),
        }
        Ok(())
    }

    /// Execute `command` on the connected host and return its exit status
    ///
    /// No stdin is sent. The output stream is drained line by line into
    /// `sink` (or discarded); the error stream is copied to `sink` verbatim.
    /// Triggering `cancel` closes the channel and yields whatever status was
    /// received so far, normally [`UNKNOWN_STATUS`]. A command that ends
    /// without reporting a status also yields [`UNKNOWN_STATUS`].
    ///
    /// # Errors
    /// - `ExecError::NotConnected` without a live session
    /// - `ExecError::Transport` if the channel cannot be opened or started
    #[instrument(skip(self, sink, cancel), fields(host = self.host.as_deref().unwrap_or("-")))]
    pub async fn execute(
        &mut self,
        command: &str,
        sink: Option<OutputSink>,
        close_sink: bool,
        cancel: Option<&CancelHandle>,
    ) -> Result<i32, ExecError> {
        if !self.is_connected() {
            return Err(ExecError::NotConnected);
        }
        let session = self.session.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %command, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(transport_error)?;

        channel.exec(true, command).await.map_err(transport_error)?;

        // Nothing is forwarded to the remote stdin
        channel.eof().await.map_err(transport_error)?;

        let status = pump(&mut channel, sink, close_sink, cancel).await;

        debug!(
            command = %command,
            status = status,
            duration = ?start.elapsed(),
            "remote command completed"
        );

        Ok(status)
    }
}

#[async_trait]
impl CommandRunner for RemoteExecutor {
    async fn run(
        &mut self,
        command: &str,
        sink: Option<OutputSink>,
        close_sink: bool,
    ) -> Result<i32, ExecError> {
        self.execute(command, sink, close_sink, None).await
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}
