use crate::ax_state::AppState;
use crate::core::pipeline::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use crate::models::query::QueryRequest;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// 自然语言查询：200 成功，400 引擎失败（生成 / 校验 / 执行），422 请求不合法，500 审计失败
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> impl IntoResponse {
    if let Err(msg) = payload.check() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": msg }))).into_response();
    }

    match state.nlq.execute_query(&payload).await {
        Ok(resp) if resp.success => Json(resp).into_response(),
        Ok(resp) => (StatusCode::BAD_REQUEST, Json(resp)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("failed to record query: {}", e) })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

pub async fn query_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT) })),
        )
            .into_response();
    }

    match state.nlq.history(limit).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            error!("读取查询历史失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
