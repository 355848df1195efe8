#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

//! The HTTP/SSE surface (§4.8, §6) and the MCP adapter (§4.9), sharing one
//! `AppState` and, by default, one listener: `mnemo_cli`'s `serve` command is
//! the only thing that binds a socket, calling [`serve`] with everything this
//! crate needs already constructed.

pub mod http;
pub mod mcp;
pub mod sse_bridge;
pub mod state;
pub mod turn;

use std::time::Duration;

use mnemo_core::memory::EpisodicRepo;

pub use state::AppState;

/// How often the importance-decay sweep runs (§4.5).
const DECAY_INTERVAL: Duration = Duration::from_secs(3600);
/// Multiplier applied to every Episodic item's `importance` each sweep.
const DECAY_FACTOR: f64 = 0.98;
/// Floor `importance` never drops below (§4.5).
const DECAY_FLOOR: f64 = 0.01;

/// Builds the merged router (plain HTTP routes plus the MCP SSE transport
/// mounted at `mcp_path`) and serves it on `bind_addr` until the process is
/// killed. Background sweepers for the otid cache and the suspended-step
/// table are started alongside so a long-lived process doesn't leak either.
pub async fn serve(state: AppState, bind_addr: &str, mcp_path: &str) -> anyhow::Result<()> {
    spawn_sweepers(&state);

    let mcp_router = mcp::router(state.clone(), mcp_path);
    let router = http::router(state).merge(mcp_router);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, mcp_path, "mnemo_server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Periodic background maintenance (§4.4 otid TTL, §4.7.1 ticket TTL), both
/// of which are otherwise only swept lazily on access.
fn spawn_sweepers(state: &AppState) {
    let otids = state.otids.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            otids.sweep();
        }
    });

    let suspended = state.suspended.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = suspended.evict_expired(chrono::Utc::now());
            if evicted > 0 {
                tracing::debug!(evicted, "swept expired confirmation tickets");
            }
        }
    });

    let engine = state.engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DECAY_INTERVAL);
        loop {
            interval.tick().await;
            let users = match engine.users().list_active().await {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!(error = %e, "importance decay sweep: could not list users");
                    continue;
                }
            };
            for user in users {
                match engine
                    .episodic_repo()
                    .decay_importance(&user.id, DECAY_FACTOR, DECAY_FLOOR)
                    .await
                {
                    Ok(affected) if affected > 0 => {
                        tracing::debug!(user_id = %user.id, affected, "decayed episodic importance");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(user_id = %user.id, error = %e, "importance decay failed"),
                }
            }
        }
    });
}
