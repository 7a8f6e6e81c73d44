use satlight_controller::config::ControllerConfig;
use satlight_controller::led;
use satlight_controller::logging;
use satlight_controller::model::{PatternResolver, SatelliteTable, StateStore};
use satlight_controller::render::RenderLoop;
use satlight_controller::server::{self, AppState};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, config_found) = ControllerConfig::load(&config_path)?;

    // Initialize logging
    let _logging_guard =
        logging::init_logging(&config.log_dir, "satlight-controller", &config.log_level)?;

    tracing::info!("Satellite LED controller starting...");
    if config_found {
        tracing::info!("Loaded configuration from {}", config_path);
    } else {
        tracing::info!("Config file {} not found, using defaults", config_path);
    }
    let layout = config.layout();
    tracing::info!(
        "{} satellites with {} LEDs each ({} LEDs total)",
        layout.satellite_count,
        layout.leds_per_satellite,
        layout.total_leds()
    );
    if config.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured, accepting unauthenticated webhooks");
    }

    // Load satellite state
    let table = Arc::new(
        SatelliteTable::load(StateStore::new(&config.state.path), layout.satellite_count).await,
    );
    tracing::info!("Satellite state: {}", table.snapshot().await);

    // Start render loop
    let driver = led::build_driver(
        config.led.driver,
        &config.led.spi_device,
        config.led.brightness,
        config.led.color_order,
    )?;
    let render_loop = RenderLoop::new(
        table.clone(),
        PatternResolver::new(config.palette(), config.blink_half_period()),
        driver,
        layout,
        config.tick(),
    );
    let render_state = render_loop.state_handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let render_handle = render_loop.start(shutdown_rx);

    // Start HTTP server
    let app = server::router(Arc::new(AppState {
        table,
        render_state,
        layout,
        webhook_secret: config.webhook_secret.clone(),
    }));
    let address = config.server_address();
    let listener = TcpListener::bind(&address)
        .await
        .context(format!("Failed to bind {}", address))?;
    tracing::info!("Server listening on {}", address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Blank the strip whether the server stopped cleanly or not
    tracing::info!("Stopping render loop...");
    let _ = shutdown_tx.send(true);
    match render_handle.await {
        Ok(Ok(())) => tracing::info!("Render loop stopped"),
        Ok(Err(e)) => tracing::warn!("Render loop stopped with error: {}", e),
        Err(e) => tracing::error!("Render loop task failed: {}", e),
    }

    served.context("HTTP server error")?;
    tracing::info!("Satellite LED controller stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
