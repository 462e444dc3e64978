//! mutation-hook-service - Kubernetes mutating admission webhook.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration from the environment
//! - Starts the health server and the TLS webhook server
//! - Drains in-flight requests on SIGTERM or SIGINT

use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use tokio::signal;
use tracing::{error, info};

use mutation_hook_service::{
    HealthState, WebhookConfig, WebhookState, run_health_server, run_webhook_server,
};

/// Grace period for in-flight admission requests during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mutation_hook_service=info".parse()?),
        )
        .json()
        .init();

    info!("Starting server ...");

    let config = WebhookConfig::from_env()?;
    info!(
        cert_path = %config.cert_path.display(),
        key_path = %config.key_path.display(),
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        verbose = config.verbose,
        "Loaded configuration"
    );

    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness works while TLS loads
    let health_handle = {
        let health_state = health_state.clone();
        let addr = config.health_addr();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let handle = Handle::new();

    // Flip readiness once the TLS listener is accepting
    {
        let handle = handle.clone();
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Some(addr) = handle.listening().await {
                info!(%addr, "Webhook listener ready");
                health_state.set_ready(true).await;
            }
        });
    }

    let webhook_handle = {
        let state = Arc::new(WebhookState::new(health_state.clone(), &config));
        let handle = handle.clone();
        let config = config.clone();
        tokio::spawn(async move { run_webhook_server(state, &config, handle).await })
    };

    tokio::select! {
        result = webhook_handle => {
            match result {
                Ok(Ok(())) => info!("Webhook server stopped"),
                Ok(Err(e)) => {
                    error!("Webhook server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => error!("Webhook server task panicked: {}", e),
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)));
            info!(
                "Waiting up to {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the server cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
