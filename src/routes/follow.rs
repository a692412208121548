//! Follow and unfollow commands.
//!
//! - POST /api/v1/follow { source: string, branches?: string[] }
//!   Follows a git URL or alias, restricted to `branches` when given.
//!   Returns the updated following list.
//!
//! - POST /api/v1/unfollow { name: string, branches?: string[] }
//!   Stops following the listed branches, or the whole repository.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::Result;
use crate::models::Branch;
use crate::routes::{blocking, SharedState};

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/follow", post(follow))
        .route("/api/v1/unfollow", post(unfollow))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct FollowRequest {
    source: String,
    #[serde(default)]
    branches: Vec<String>,
}

async fn follow(
    State(state): State<SharedState>,
    Json(request): Json<FollowRequest>,
) -> Result<String> {
    let branches: Vec<Branch> = request.branches.into_iter().map(Branch::from).collect();
    let source = request.source;
    blocking(move || state.follow.follow(&source, &branches)).await
}

#[derive(Debug, Deserialize)]
struct UnfollowRequest {
    name: String,
    #[serde(default)]
    branches: Vec<String>,
}

async fn unfollow(
    State(state): State<SharedState>,
    Json(request): Json<UnfollowRequest>,
) -> Result<String> {
    let branches: Vec<Branch> = request.branches.into_iter().map(Branch::from).collect();
    let name = request.name;
    blocking(move || state.follow.unfollow(&name, &branches)).await
}
