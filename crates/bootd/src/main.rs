//! dockerboot daemon
//!
//! Starts the configured containers with the host, serves the health and
//! control API, and cleans the containers up again on Ctrl-C.

use anyhow::{Context, Result};
use boot_lib::{
    engine::{ContainerEngine, DockerEngine, MemoryEngine},
    events::EventBus,
    health::HealthRegistry,
    observability::StructuredLogger,
    registry::ManagerRegistry,
};
use bootd::{
    api,
    config::{DaemonConfig, EngineKind},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lower bound for the engine client's per-request timeout
const MIN_ENGINE_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Client timeout when image pulls are unbounded
const UNBOUNDED_PULL_REQUEST_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting dockerbootd");

    let config = DaemonConfig::load()?;
    info!(
        instance = %config.instance_name,
        engine = ?config.engine,
        host = %config.docker.host,
        "Daemon configured"
    );

    let engine = connect_engine(&config).await?;
    let shutdown = CancellationToken::new();

    let registry = Arc::new(
        ManagerRegistry::from_settings(
            &config.docker,
            engine,
            config.manager_options(),
            shutdown.clone(),
        )
        .context("Failed to register container managers")?,
    );

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(DAEMON_VERSION, registry.len());

    // Listeners go up before host start so no event is missed
    let bus = EventBus::default();
    let listeners = registry.spawn_listeners(&bus, &shutdown);

    let health_registry = HealthRegistry::new();
    let app_state = Arc::new(api::AppState::new(
        registry.clone(),
        bus.clone(),
        health_registry.clone(),
    ));

    if let Err(e) = registry.start_all().await {
        error!(container_type = %e.container_type, error = %e, cause = %e.source, "Host start failed");
        logger.log_host_phase("start", 0, 1);
        logger.log_shutdown("host start failed");
        shutdown.cancel();
        registry.stop_all().await;
        return Err(e).context("Host start failed");
    }
    logger.log_host_phase("start", registry.len(), 0);

    health_registry.refresh(&registry.statuses()).await;
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Interrupts pulls in progress and ends listeners and the API server
    shutdown.cancel();

    let failed = registry.stop_all().await;
    logger.log_host_phase("stop", registry.len() - failed, failed);

    for listener in listeners {
        if let Err(e) = listener.await {
            warn!(error = %e, "Event listener task ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

async fn connect_engine(config: &DaemonConfig) -> Result<Arc<dyn ContainerEngine>> {
    match config.engine {
        EngineKind::Docker => {
            // the client timeout also covers pulls, so it must not undercut the pull timeout
            let request_timeout = match config.pull_timeout_secs {
                0 => UNBOUNDED_PULL_REQUEST_TIMEOUT_SECS,
                secs => secs.max(MIN_ENGINE_REQUEST_TIMEOUT_SECS),
            };
            let engine = DockerEngine::connect(&config.docker, Duration::from_secs(request_timeout))
                .with_context(|| format!("Failed to connect to Docker at {}", config.docker.host))?;
            engine
                .ping()
                .await
                .with_context(|| format!("Docker at {} is not responding", config.docker.host))?;
            Ok(Arc::new(engine))
        }
        EngineKind::Memory => {
            warn!("Using in-memory engine; no containers reach a Docker daemon");
            Ok(Arc::new(MemoryEngine::new()))
        }
    }
}
