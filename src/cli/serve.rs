//! Serve command implementation

use crate::cli::ServeArgs;
use crate::config::{EdgewatchConfig, LogFormat};
use crate::persistence::DetectionPipeline;
use crate::relay::{DetectionForwarder, LivenessSweeper, RelayBroker};
use crate::transport::{create_router, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<EdgewatchConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        EdgewatchConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        EdgewatchConfig::default()
    };

    config = config.with_env_overrides();

    // CLI overrides win
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(window) = args.liveness_window {
        config.relay.liveness_window_seconds = window;
    }
    if args.no_persistence {
        config.persistence.enabled = false;
    }
    if args.no_sweep {
        config.relay.sweep_interval_seconds = 0;
    }

    Ok(config)
}

/// Initialize tracing based on configuration
pub fn init_tracing(
    config: &crate::config::LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Build the detection pipeline, if persistence is enabled
pub fn build_pipeline(
    config: &EdgewatchConfig,
) -> Result<Option<Arc<DetectionPipeline>>, Box<dyn std::error::Error>> {
    if !config.persistence.enabled {
        tracing::info!("Detection persistence disabled");
        return Ok(None);
    }
    let pipeline = DetectionPipeline::from_config(&config.persistence)?;
    tracing::info!(store = pipeline.store_name(), "Detection persistence enabled");
    Ok(Some(Arc::new(pipeline)))
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => {}
    }

    cancel_token.cancel();
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and validate configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;

    tracing::info!("Starting Edgewatch relay");
    tracing::debug!(?config, "Loaded configuration");

    // 3. Persistence pipeline and broker
    let pipeline = build_pipeline(&config)?;
    let broker = Arc::new(RelayBroker::new(config.relay.clone(), pipeline.clone()));

    let app_state = Arc::new(AppState::new(Arc::clone(&broker), Arc::new(config.clone())));
    let app = create_router(app_state);

    // 4. Background tasks
    let cancel_token = CancellationToken::new();
    let sweep_handle = if config.relay.sweep_enabled() {
        tracing::info!(
            interval_seconds = config.relay.sweep_interval_seconds,
            window_seconds = config.relay.liveness_window_seconds,
            "Starting liveness sweeper"
        );
        let sweeper = LivenessSweeper::new(Arc::clone(&broker), config.relay.sweep_interval());
        Some(sweeper.start(cancel_token.clone()))
    } else {
        tracing::info!("Liveness sweep disabled");
        None
    };

    let forward_handle = pipeline.as_ref().map(|pipeline| {
        DetectionForwarder::new(Arc::clone(&broker), pipeline.subscribe())
            .start(cancel_token.clone())
    });

    // 5. Bind and serve
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Edgewatch relay listening");

    // Long-lived WebSocket and SSE connections only end once the broker
    // closes them, so close them as soon as the signal arrives.
    let shutdown = {
        let broker = Arc::clone(&broker);
        let cancel_token = cancel_token.clone();
        async move {
            shutdown_signal(cancel_token).await;
            let closed = broker.shutdown();
            tracing::info!(connections = closed, "Closed client connections");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    // 6. Cleanup
    cancel_token.cancel();

    if let Some(handle) = sweep_handle {
        tracing::info!("Waiting for liveness sweeper to stop");
        handle.await?;
    }

    if let Some(handle) = forward_handle {
        handle.await?;
    }

    if let Some(pipeline) = pipeline {
        tracing::info!(in_flight = pipeline.in_flight(), "Waiting for detection writes");
        pipeline.shutdown().await;
    }

    tracing::info!("Edgewatch relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn args(config: PathBuf) -> ServeArgs {
        ServeArgs {
            config,
            port: None,
            host: None,
            log_level: None,
            liveness_window: None,
            no_persistence: false,
            no_sweep: false,
        }
    }

    #[test]
    fn test_serve_config_loading() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[server]\nport = 8080").unwrap();

        let config = load_config_with_overrides(&args(temp.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_serve_cli_overrides_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "[server]\nport = 8080\n[relay]\nliveness_window_seconds = 10",
        )
        .unwrap();

        let mut serve_args = args(temp.path().to_path_buf());
        serve_args.port = Some(9000);
        serve_args.liveness_window = Some(60);
        serve_args.no_persistence = true;
        serve_args.no_sweep = true;

        let config = load_config_with_overrides(&serve_args).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.relay.liveness_window_seconds, 60);
        assert!(!config.persistence.enabled);
        assert!(!config.relay.sweep_enabled());
    }

    #[test]
    fn test_serve_works_without_config_file() {
        let config = load_config_with_overrides(&args(PathBuf::from("nonexistent.toml"))).unwrap();
        assert_eq!(config.relay.liveness_window_seconds, 30);
    }

    #[test]
    fn test_build_pipeline_respects_enabled_flag() {
        let mut config = EdgewatchConfig::default();
        assert_eq!(build_pipeline(&config).unwrap().unwrap().store_name(), "memory");

        config.persistence.enabled = false;
        assert!(build_pipeline(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_signal_returns_on_cancel() {
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(shutdown_signal(cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let broker = Arc::new(RelayBroker::new(Default::default(), None));
        let sweeper = LivenessSweeper::new(broker, Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let handle = sweeper.start(cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }
}
