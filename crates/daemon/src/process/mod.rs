pub mod utils;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::http_server;
use crate::service_state::StateSetupError;
use crate::{ServiceConfig, ServiceState};

/// How long spawned tasks get to wind down once a shutdown is signalled
const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_FILE_PREFIX: &str = "vkv.log";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error("error creating service state: {0}")]
    State(#[from] StateSetupError),
    #[error("service tasks did not stop within {} seconds", FINAL_SHUTDOWN_TIMEOUT.as_secs())]
    ShutdownTimeout,
}

impl ProcessError {
    /// Exit status the binary reports for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcessError::Signals(_) => 2,
            ProcessError::State(_) => 3,
            ProcessError::ShutdownTimeout => 4,
        }
    }
}

/// Handle for gracefully shutting down the daemon service.
pub struct ShutdownHandle {
    graceful_waiter: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
    state: ServiceState,
}

impl ShutdownHandle {
    /// Block until the service shuts down, by signal or by [`Self::shutdown`].
    ///
    /// The HTTP server stops first. The mount is shut down after it so a
    ///  running upgrade finishes the key it is on.
    pub async fn wait(self) -> Result<(), ProcessError> {
        let _ = self.graceful_waiter.await;

        let joined = timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(self.tasks)).await;
        self.state.shutdown().await;
        if joined.is_err() {
            return Err(ProcessError::ShutdownTimeout);
        }

        tracing::info!("service stopped");
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn env_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Install the global subscriber: compact stdout, plus a daily rolling file
///  under `log_dir` when one is configured.
///
/// The returned guards flush the non-blocking writers and must outlive the service.
fn init_logging(level: tracing::Level, log_dir: Option<&Path>) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(env_filter(level));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: not logging to {:?}: {}", dir, e);
            return None;
        }
        let (file_writer, file_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
        guards.push(file_guard);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter(level)),
        )
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Open the mount and start serving the API.
///
/// Dropping the returned [`ShutdownHandle`] does not stop the service.
pub async fn start_service(
    service_config: &ServiceConfig,
) -> Result<(ServiceState, ShutdownHandle), ProcessError> {
    let (graceful_waiter, shutdown_tx, shutdown_rx) =
        utils::graceful_shutdown_blocker().map_err(ProcessError::Signals)?;
    let state = ServiceState::from_config(service_config).await?;

    let api_addr = SocketAddr::from(([0, 0, 0, 0], service_config.api_port));
    let api_config = http_server::Config::new(api_addr, service_config.request_timeout);
    let api_state = state.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = http_server::run_api(api_config, api_state, shutdown_rx).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!(
        mount_id = %service_config.mount_id,
        upgrading = state.backend().is_upgrading(),
        "serving kv API on port {}",
        service_config.api_port
    );

    let handle = ShutdownHandle {
        graceful_waiter,
        tasks: vec![api_task],
        shutdown_tx,
        state: state.clone(),
    };
    Ok((state, handle))
}

/// Run the daemon until a shutdown signal is received.
pub async fn spawn_service(service_config: &ServiceConfig) -> Result<(), ProcessError> {
    let _guards = init_logging(service_config.log_level, service_config.log_dir.as_deref());

    let result = match start_service(service_config).await {
        Ok((_, handle)) => handle.wait().await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    result
}
