//! Log filter routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    /// Directory holding the rolling log files.
    pub log_dir: String,
}

impl LoggingConfigResponse {
    fn from_config(logging: &LoggingConfig) -> Self {
        Self {
            filter: logging.get_filter(),
            log_dir: logging.log_dir().display().to_string(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_log_filter))
}

async fn get_logging_config(State(state): State<AppState>) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;
    Ok(Json(LoggingConfigResponse::from_config(logging)))
}

async fn update_log_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;
    logging.set_filter(&request.filter)?;
    tracing::info!(filter = %request.filter, "Log filter updated");
    Ok(Json(LoggingConfigResponse::from_config(logging)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_deserialize() {
        let json = r#"{"filter": "clip_relay=debug"}"#;
        let request: UpdateLogFilterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.filter, "clip_relay=debug");
    }
}
