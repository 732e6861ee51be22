//! Aggregate statistics route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::scheduler::AggregateStats;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(aggregate_stats))
}

async fn aggregate_stats(State(state): State<AppState>) -> ApiResult<Json<AggregateStats>> {
    Ok(Json(state.supervisor.aggregate_stats().await?))
}
