//! On-demand sweep.
//!
//! - POST /api/v1/poll
//!   Runs one poll cycle right away, delivers the notice as the interval
//!   poller would and returns it, followed by any per-repository failures.
//!   Safe to call while the interval poller is sweeping: every repository
//!   is updated under its own registry lock.

use axum::{extract::State, routing::post, Router};

use crate::routes::SharedState;

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/poll", post(poll_now))
        .with_state(state)
}

async fn poll_now(State(state): State<SharedState>) -> String {
    let outcome = state.detector.sweep().await;

    let mut text = outcome
        .notice
        .unwrap_or_else(|| "No new commits".to_string());
    for (repo, reason) in &outcome.failures {
        text.push_str(&format!("\nCould not poll {}: {}", repo, reason));
    }
    text
}
