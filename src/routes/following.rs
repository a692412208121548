use axum::{extract::State, routing::get, Router};

use crate::error::Result;
use crate::routes::{blocking, SharedState};

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/following", get(list_following))
        .with_state(state)
}

async fn list_following(State(state): State<SharedState>) -> Result<String> {
    blocking(move || state.follow.following()).await
}
