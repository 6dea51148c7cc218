/*
 * 5D Labs RELP Forwarding Extension - Controller Service
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Controller Service - Kubernetes controller for `RsyslogRelp` records
//!
//! This service configures RELP log and audit forwarding on tenant nodes by:
//! - Watching `RsyslogRelp` custom resources
//! - Publishing node configuration bundles and cleaning nodes on opt-out
//! - Maintaining per-tenant alert rules, scrape config and dashboard
//! - Providing health and readiness endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use relp_controller::tasks::{load_config, run_controller};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    client: kube::Client,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,relp_controller=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!(
        "Starting RELP forwarding controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let config = load_config()?;
    let shutdown = CancellationToken::new();

    let controller_handle = {
        let client = client.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run_controller(client, config, shutdown).await })
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        )
        .with_state(AppState { client });

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("Controller HTTP server listening on 0.0.0.0:8080");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                shutdown.cancel();
            }
        })
        .await?;

    match controller_handle.await {
        Ok(Ok(())) => info!("Controller service stopped"),
        Ok(Err(e)) => {
            error!("Controller failed: {}", e);
            return Err(e.into());
        }
        Err(e) => {
            error!("Controller task join error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "relp-controller",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready once the API server answers.
async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.client.apiserver_version().await {
        Ok(_) => Ok(Json(json!({
            "status": "ready",
            "service": "relp-controller",
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
