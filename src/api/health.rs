//! 健康检查 API

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    uptime_secs: i64,
    running_pipelines: usize,
    finished_pipelines: usize,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok",
        service: "zpod-engine",
        version: VERSION,
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        running_pipelines: state.coordinator.running_count().await,
        finished_pipelines: state.pipelines.history_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::super::tests::{send, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health() {
        let app = crate::api::router(test_state().await);
        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["running_pipelines"], 0);
    }
}
