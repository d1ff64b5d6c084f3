//! Portal Expose Controller
//!
//! Runs the PortalExpose and TunnelClass controllers and serves health
//! endpoints.
//!
//! # Usage
//!
//! - `portal-expose-controller` or `portal-expose-controller controller` - run
//!   the controllers
//! - `portal-expose-controller crd` - print the CRD manifests and exit
//!
//! # HTTP Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /ready` - Readiness check

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_expose_controller::{crds, runner, ControllerConfig};

/// Kubernetes controller for PortalExpose and TunnelClass resources
#[derive(Parser, Debug)]
#[command(name = "portal-expose-controller", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the PortalExpose and TunnelClass controllers (default)
    Controller,
    /// Print the CRD manifests as YAML and exit
    Crd,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "portal-expose-controller",
    })
}

async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

fn create_router() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Controller) {
        Commands::Crd => {
            print!("{}", crds::render_crds()?);
            Ok(())
        }
        Commands::Controller => run_controller().await,
    }
}

async fn run_controller() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portal_expose=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Portal Expose Controller");

    let config = ControllerConfig::from_env();
    tracing::info!(
        tunnel_image = %config.tunnel_image,
        requeue_interval_secs = config.requeue_interval_secs,
        error_backoff_secs = config.error_backoff_secs,
        "Loaded controller configuration"
    );

    let client = kube::Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, create_router()).await {
            tracing::error!(error = %e, "HTTP server failed");
        }
    });

    runner::run(client, &config).await;

    server.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
