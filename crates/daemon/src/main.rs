// SPDX-License-Identifier: Apache-2.0

//! Loudness Balancer Daemon -- background service exposing the loudness
//! core's command/event surface over HTTP for CLI or GUI clients.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use loudness_daemon::{api, persistence, AppState};

#[derive(Parser, Debug)]
#[command(name = "loudness-daemon")]
#[command(about = "Real-time loudness measurement and balancing daemon", long_about = None)]
struct Args {
    /// HTTP API port
    #[arg(short, long, default_value = "7878")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("loudness_daemon={level},loudness_core={level}"))
        .init();

    info!("loudness balancer daemon starting");

    let persisted = persistence::load();
    let state = AppState::new(persisted);

    spawn_continuous_balance(state.clone());
    spawn_stale_sweep(state.clone());
    tokio::spawn(api::spawn_playback_mix(state.clone()));

    let app = Router::new()
        .route("/api/v1/status", get(api::status))
        .route("/api/v1/streams", get(api::get_streams))
        .route("/api/v1/streams", post(api::register_stream))
        .route("/api/v1/streams/{id}", delete(api::unregister_stream))
        .route("/api/v1/streams/{id}/gain", post(api::set_gain))
        .route("/api/v1/streams/{id}/max-gain", post(api::set_max_gain))
        .route("/api/v1/streams/{id}/reset", post(api::reset_measurements))
        .route("/api/v1/streams/{id}/solo", post(api::toggle_solo))
        .route("/api/v1/solo/clear", post(api::clear_solo))
        .route("/api/v1/auto-balance", post(api::set_auto_balance))
        .route("/api/v1/balance-now", post(api::balance_now))
        .route("/api/v1/limiter", get(api::get_limiter))
        .route("/api/v1/limiter", post(api::set_limiter))
        .route("/api/v1/events", get(api::events))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Continuous-balance task: fires `balance_now` at a fixed
/// 500 ms cadence whenever auto-balance is enabled. The cadence, 400 ms
/// window, and 100 ms hop guarantee at least 4 block updates between
/// passes.
fn spawn_continuous_balance(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            let mut coordinator = state.coordinator.write().await;
            if coordinator.auto_balance().enabled {
                coordinator.balance_now(None);
            }
        }
    });
}

/// Stale-stream sweep: every 5 s, drop streams the host no
/// longer vouches for. This reference daemon only knows about synthetic
/// sources it started itself, so every registered stream "still exists"
/// until explicitly unregistered or the stream itself reports gone via
/// `push_frame` returning `UnknownStream`; the sweep exists as the
/// scheduled hook a real host-presence check would plug into.
fn spawn_stale_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            state.coordinator.write().await.sweep_stale(|_id| true);
        }
    });
}
