//! HTTP command surface - plain-text in and out.
//!
//! Each submodule defines routes for one command group:
//! - `follow`: POST /api/v1/follow, POST /api/v1/unfollow
//! - `following`: GET /api/v1/following
//! - `poll`: POST /api/v1/poll, an on-demand sweep

pub mod follow;
pub mod following;
pub mod poll;

use axum::Router;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::follow::FollowManager;
use crate::poller::ChangeDetector;

pub struct AppState {
    pub follow: FollowManager,
    pub detector: Arc<ChangeDetector>,
}

pub type SharedState = Arc<AppState>;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .merge(follow::routes(state.clone()))
        .merge(following::routes(state.clone()))
        .merge(poll::routes(state))
}

/// Gateway calls block on git; keep them off the async workers.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("command task failed: {}", e)))?
}
