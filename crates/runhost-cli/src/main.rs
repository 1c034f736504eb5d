//! runhost CLI
//!
//! Runs a command locally or over SSH, forwards its output to stdout and exits
//! with the command's exit code

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use runhost_exec::{CancelHandle, LocalExecutor, OutputSink, RemoteExecutor};
use tracing::{error, warn};

mod config;
mod logging;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "runhost")]
#[command(about = "Run commands locally or over SSH and report their exit code", long_about = None)]
struct Cli {
    /// Path to runhost.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a command on this machine
    Local {
        /// Working folder
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Discard the command output
        #[arg(long)]
        quiet: bool,

        /// Close the output sink once the command has finished
        #[arg(long)]
        close_sink: bool,

        /// Command line, handed to the platform shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a command on a remote host over SSH
    ///
    /// The password is read from the environment variable named by
    /// `[remote] password_env` (default `RUNHOST_PASSWORD`).
    Remote {
        /// Host address
        #[arg(long)]
        host: Option<String>,

        /// SSH port
        #[arg(long)]
        port: Option<u16>,

        /// Username
        #[arg(long)]
        user: Option<String>,

        /// Discard the command output
        #[arg(long)]
        quiet: bool,

        /// Command line, run by the remote shell
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("loading config {}", path.display()))?,
        None => Config::load_default()?,
    };

    logging::init(cli.log_level.as_deref().unwrap_or(&config.log.level));

    let status = match cli.command {
        Commands::Local {
            folder,
            quiet,
            close_sink,
            command,
        } => run_local(&config, folder, quiet, close_sink, &command.join(" ")).await?,
        Commands::Remote {
            host,
            port,
            user,
            quiet,
            command,
        } => {
            let host = host
                .or_else(|| config.remote.host.clone())
                .ok_or_else(|| eyre!("no remote host (use --host or [remote] host)"))?;
            let user = user
                .or_else(|| config.remote.user.clone())
                .ok_or_else(|| eyre!("no remote user (use --user or [remote] user)"))?;
            let port = port.unwrap_or(config.remote.port);
            let password = std::env::var(&config.remote.password_env).wrap_err_with(|| {
                format!("reading password from ${}", config.remote.password_env)
            })?;

            run_remote(&host, port, &user, &password, quiet, &command.join(" ")).await?
        }
    };

    std::process::exit(status);
}

async fn run_local(
    config: &Config,
    folder: Option<PathBuf>,
    quiet: bool,
    close_sink: bool,
    command: &str,
) -> Result<i32> {
    let executor = LocalExecutor::with_prefix(config.local.prefix());
    let folder = folder.or_else(|| config.local.folder.clone());
    let sink = (!quiet).then(OutputSink::stdout);

    let status = executor
        .execute(command, folder.as_deref(), sink, close_sink)
        .await?;
    Ok(status)
}

async fn run_remote(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    quiet: bool,
    command: &str,
) -> Result<i32> {
    let mut executor = RemoteExecutor::new();
    executor.connect(host, port, user, password).await?;

    // Ctrl-C closes the channel instead of killing us mid-session
    let cancel = CancelHandle::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, closing the channel");
                cancel.cancel();
            }
        })
    };

    let sink = (!quiet).then(OutputSink::stdout);
    let result = executor.execute(command, sink, false, Some(&cancel)).await;
    interrupt.abort();

    if let Err(e) = executor.disconnect().await {
        warn!(error = %e, "failed to disconnect cleanly");
    }

    result.map_err(|e| {
        if e.is_transport() {
            error!(host, error = %e, "remote execution failed");
        }
        e.into()
    })
}
