//! 组件添加与流水线查询 API
//!
//! 包含 /instances/:instance_id/components, /pipelines/* 端点

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::domain::{ComponentKey, PipelineRecord};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 添加组件请求
#[derive(Debug, Clone, Deserialize)]
pub struct AddComponentRequest {
    pub component_uid: String,
    pub extra_id: Option<String>,
    /// 组件参数（hostname、last_octet 等）
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// 添加组件响应
#[derive(Debug, Serialize)]
pub struct AddComponentResponse {
    pub pipeline_id: String,
    pub key: ComponentKey,
    pub status: &'static str,
    pub status_url: String,
}

/// 流水线历史查询参数
#[derive(Debug, Deserialize)]
pub struct PipelineHistoryQuery {
    /// 返回数量限制，默认 20
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// 状态过滤 (running, success, failed, cancelled)
    pub status: Option<String>,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct PipelineHistoryResponse {
    pub pipelines: Vec<PipelineRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub pipeline_id: String,
    pub cancelled: bool,
}

/// 创建组件路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/instances/:instance_id/components", post(add_component))
        .route("/pipelines/recent", get(get_recent_pipelines))
        .route(
            "/pipelines/:pipeline_id",
            get(get_pipeline).delete(cancel_pipeline),
        )
}

/// 添加组件
///
/// POST /instances/:instance_id/components
///
/// 只登记并启动流水线，阶段在后台执行
async fn add_component(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<i64>,
    Json(request): Json<AddComponentRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.component_uid.trim().is_empty() {
        return Err(ApiError::bad_request("component_uid must not be empty"));
    }

    let handle = state
        .coordinator
        .add_component(
            instance_id,
            &request.component_uid,
            request.extra_id.as_deref(),
            request.data,
        )
        .await?;

    info!(pipeline_id = %handle.id, key = %handle.key, "Add-component request accepted");

    let response = AddComponentResponse {
        status_url: format!("/pipelines/{}", handle.id),
        pipeline_id: handle.id.clone(),
        key: handle.key.clone(),
        status: "running",
    };
    // 不等待完成；结果通过 status_url 查询
    drop(handle);

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /pipelines/:pipeline_id
async fn get_pipeline(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .pipelines
        .get_any(&pipeline_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Pipeline '{}'", pipeline_id)))?;

    Ok(Json(record))
}

/// GET /pipelines/recent
///
/// 运行中的流水线排在历史记录之前
async fn get_recent_pipelines(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PipelineHistoryQuery>,
) -> impl IntoResponse {
    let status = query.status.as_deref();

    let mut pipelines: Vec<PipelineRecord> = state
        .pipelines
        .get_all()
        .await
        .into_iter()
        .filter(|r| status.map_or(true, |s| r.status.as_str() == s))
        .collect();
    pipelines.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    pipelines.extend(state.pipelines.get_history(query.limit, status).await);
    pipelines.truncate(query.limit);

    Json(PipelineHistoryResponse {
        total: pipelines.len(),
        pipelines,
    })
}

/// DELETE /pipelines/:pipeline_id
///
/// 尽力取消：已在运行的阶段会执行完毕，之后的阶段被撤回
async fn cancel_pipeline(
    State(state): State<Arc<AppState>>,
    Path(pipeline_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if state.pipelines.get_any(&pipeline_id).await.is_none() {
        return Err(ApiError::not_found(format!("Pipeline '{}'", pipeline_id)));
    }

    let cancelled = state.coordinator.cancel_pipeline(&pipeline_id).await;
    Ok(Json(CancelResponse {
        pipeline_id,
        cancelled,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{send, test_state};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_add_component_accepted() {
        let state = test_state().await;
        let app = crate::api::router(state.clone());

        let (status, body) = send(
            app,
            "POST",
            "/instances/1/components",
            Some(json!({"component_uid": "esxi-8.0", "data": {"last_octet": 12}})),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "running");
        assert_eq!(body["key"]["instance_id"], 1);
        assert_eq!(body["key"]["component_uid"], "esxi-8.0");
        let id = body["pipeline_id"].as_str().unwrap().to_string();
        assert_eq!(body["status_url"], format!("/pipelines/{}", id));

        // The snapshot has no network data, so Deploy fails
        for _ in 0..200 {
            if state.coordinator.running_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let app = crate::api::router(state);
        let (status, record) = send(app, "GET", &format!("/pipelines/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "failed");
        assert_eq!(record["stages"][2]["name"], "deploy");
        assert_eq!(record["stages"][2]["status"], "failed");
        assert_eq!(record["stages"][4]["status"], "skipped");
    }

    #[tokio::test]
    async fn test_empty_component_uid_rejected() {
        let app = crate::api::router(test_state().await);
        let (status, body) = send(
            app,
            "POST",
            "/instances/1/components",
            Some(json!({"component_uid": " "})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let state = test_state().await;

        let app = crate::api::router(state.clone());
        let (status, body) = send(app, "GET", "/pipelines/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let app = crate::api::router(state);
        let (status, _) = send(app, "DELETE", "/pipelines/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recent_pipelines_empty() {
        let app = crate::api::router(test_state().await);
        let (status, body) = send(app, "GET", "/pipelines/recent?limit=5", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["pipelines"], json!([]));
    }
}
