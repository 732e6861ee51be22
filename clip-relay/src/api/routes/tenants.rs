//! Tenant lifecycle routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use std::path::{Path as FsPath, PathBuf};

use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::config::load_tenants_file;
use crate::domain::Stats;
use crate::scheduler::{LoadReport, LogEntry, OpenResult, StartResult, TenantSnapshot};

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub tenant_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopAllResponse {
    pub stopped: usize,
}

/// Optional body for `/reload`; without a path the configured profiles file is read.
#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    pub path: Option<String>,
}

impl ReloadRequest {
    fn resolve(&self, default: &FsPath) -> PathBuf {
        match self.path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => default.to_path_buf(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenSessionsRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub tenant_id: String,
    pub endpoint: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tenants))
        .route("/reload", post(reload_tenants))
        .route("/start-all", post(start_all))
        .route("/stop-all", post(stop_all))
        .route("/open", post(open_sessions))
        .route("/{id}/open", post(open_session))
        .route("/{id}/start", post(start_tenant))
        .route("/{id}/stop", post(stop_tenant))
        .route("/{id}/logs", get(tenant_logs))
        .route("/{id}/stats", get(tenant_stats))
}

async fn list_tenants(State(state): State<AppState>) -> ApiResult<Json<Vec<TenantSnapshot>>> {
    Ok(Json(state.supervisor.list_tenants().await?))
}

async fn reload_tenants(
    State(state): State<AppState>,
    request: Option<Json<ReloadRequest>>,
) -> ApiResult<Json<LoadReport>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let path = request.resolve(&state.profiles_file);
    tracing::info!(path = %path.display(), "Reloading profiles");
    let file = load_tenants_file(&path).await?;
    Ok(Json(state.supervisor.load_tenant_file(file).await?))
}

async fn open_sessions(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionsRequest>,
) -> ApiResult<Json<Vec<OpenResult>>> {
    Ok(Json(state.supervisor.open_sessions(&request.ids).await))
}

async fn open_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OpenSessionResponse>> {
    let endpoint = state.supervisor.open_session(&id).await?;
    Ok(Json(OpenSessionResponse {
        tenant_id: id,
        endpoint,
    }))
}

async fn start_all(State(state): State<AppState>) -> ApiResult<Json<Vec<StartResult>>> {
    Ok(Json(state.supervisor.start_all().await?))
}

async fn stop_all(State(state): State<AppState>) -> ApiResult<Json<StopAllResponse>> {
    let stopped = state.supervisor.stop_all().await?;
    Ok(Json(StopAllResponse { stopped }))
}

async fn start_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.supervisor.start(&id).await?;
    Ok(Json(ActionResponse {
        tenant_id: id,
        status: "running",
    }))
}

async fn stop_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.supervisor.stop(&id).await?;
    Ok(Json(ActionResponse {
        tenant_id: id,
        status: "stopped",
    }))
}

async fn tenant_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(state.supervisor.get_logs(&id).await?))
}

async fn tenant_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Stats>> {
    Ok(Json(state.supervisor.get_stats(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_request_path() {
        let default = FsPath::new("profiles.txt");

        let request: ReloadRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.resolve(default), default);

        let request: ReloadRequest = serde_json::from_str(r#"{"path": "  "}"#).unwrap();
        assert_eq!(request.resolve(default), default);

        let request: ReloadRequest =
            serde_json::from_str(r#"{"path": "/etc/relay/other.txt"}"#).unwrap();
        assert_eq!(request.resolve(default), PathBuf::from("/etc/relay/other.txt"));
    }

    #[test]
    fn test_open_sessions_request_deserialize() {
        let request: OpenSessionsRequest =
            serde_json::from_str(r#"{"ids": ["p1", "p2"]}"#).unwrap();
        assert_eq!(request.ids, vec!["p1", "p2"]);
    }
}
