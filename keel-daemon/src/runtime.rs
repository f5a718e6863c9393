use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use keel_core::{paths, AgentConfig};
use keel_sync::{
    AtomicFileOperator, BackoffPolicy, FileManagerService, GrpcFileServiceClient, TransferClient,
};

use crate::bus::{BusHandle, MessagePipe};
use crate::error::{io_err, DaemonError};
use crate::inbox;
use crate::plugin::FilePlugin;

/// A configured agent: bus, plugins and inbox watcher under one home.
pub struct Agent {
    home: PathBuf,
    config: AgentConfig,
    transfer: TransferClient,
    pipe: MessagePipe,
}

impl Agent {
    pub fn new(home: PathBuf, config: AgentConfig, transfer: TransferClient) -> Self {
        Self {
            home,
            config,
            transfer,
            pipe: MessagePipe::new(),
        }
    }

    /// Handle for publishing to and observing the agent's bus.
    pub fn bus(&self) -> BusHandle {
        self.pipe.bus()
    }

    /// Run until `shutdown` is cancelled or a component fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        ensure_runtime_dirs(&self.home)?;

        let Agent {
            home,
            config,
            transfer,
            mut pipe,
        } = self;

        let manager =
            FileManagerService::new(transfer, Arc::new(AtomicFileOperator::new()), config);
        pipe.register(Box::new(FilePlugin::new(manager, shutdown.child_token())));

        let bus = pipe.bus();
        // Plugins must be subscribed before the inbox replays queued requests.
        let running = pipe.start(shutdown.clone()).await?;
        let pipe_handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let result = running.wait().await;
                shutdown.cancel();
                result
            })
        };

        let inbox_handle = {
            let shutdown = shutdown.clone();
            let inbox = paths::inbox_dir(&home);
            tokio::spawn(async move {
                let result = inbox::watch(inbox, bus, shutdown.clone()).await;
                shutdown.cancel();
                result
            })
        };

        let (pipe_result, inbox_result) = tokio::join!(pipe_handle, inbox_handle);
        handle_join("message_pipe", pipe_result)?;
        handle_join("inbox_watcher", inbox_result)?;
        Ok(())
    }
}

/// Transfer client for `config.command`, or an uninitialised one when no
/// server is configured.
pub fn transfer_client(config: &AgentConfig) -> Result<TransferClient, DaemonError> {
    let policy = BackoffPolicy::from(&config.common);
    match &config.command {
        Some(command) => {
            let client = GrpcFileServiceClient::connect_lazy(&command.server_url)?;
            Ok(TransferClient::new(Arc::new(client), policy))
        }
        None => {
            tracing::warn!("no command server configured, remote file operations will fail");
            Ok(TransferClient::uninitialized(policy))
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config: AgentConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config))
}

/// Run the daemon until ctrl-c.
pub async fn run(home: PathBuf, config: AgentConfig) -> Result<(), DaemonError> {
    let transfer = transfer_client(&config)?;
    tracing::info!(
        instance = %config.instance_id,
        allowed = config.allowed_directories.len(),
        "starting keel daemon",
    );
    let agent = Agent::new(home, config, transfer);

    let shutdown = CancellationToken::new();
    let signal_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down daemon");
                        shutdown.cancel();
                        Ok(())
                    }
                    Err(err) => {
                        shutdown.cancel();
                        Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}")))
                    }
                },
            }
        })
    };

    let agent_result = agent.run(shutdown.clone()).await;
    shutdown.cancel();
    handle_join("signal_handler", signal_handle.await)?;
    agent_result
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [paths::inbox_dir(home), paths::logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// `KEEL_LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` sets the filter.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("KEEL_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}
