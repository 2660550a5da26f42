use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use cashflow_nlq::ax_state::AppState;
use cashflow_nlq::core::generator::SqlGenerator;
use cashflow_nlq::core::pipeline::NlqService;
use cashflow_nlq::core::validator::{SqlValidator, ValidatedSql};
use cashflow_nlq::error::{ExecutionError, QueryLogError};
use cashflow_nlq::infra::executor::SqlExecutor;
use cashflow_nlq::infra::query_log::{MemoryQueryLog, QueryLog};
use cashflow_nlq::models::query_log::QueryAttemptRecord;
use cashflow_nlq::models::schema::{FunctionWhitelist, SchemaWhitelist};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

struct StaticExecutor {
    fail: bool,
}

#[async_trait]
impl SqlExecutor for StaticExecutor {
    async fn execute(
        &self,
        _sql: &ValidatedSql,
    ) -> Result<cashflow_nlq::models::query::QueryRows, ExecutionError> {
        if self.fail {
            return Err(ExecutionError::Connection("connection refused".into()));
        }
        Ok(cashflow_nlq::models::query::QueryRows {
            columns: vec!["count".into()],
            rows: vec![json!({ "count": 42 })],
        })
    }
}

struct ReadOnlyLog;

#[async_trait]
impl QueryLog for ReadOnlyLog {
    async fn record(&self, _record: &QueryAttemptRecord) -> Result<(), QueryLogError> {
        Err(QueryLogError::Unavailable("read-only replica".into()))
    }

    async fn recent(&self, _limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
        Ok(Vec::new())
    }
}

fn router(fail: bool, log: Arc<dyn QueryLog>) -> axum::Router {
    let validator = SqlValidator::new(
        Arc::new(SchemaWhitelist::cashflow()),
        Arc::new(FunctionWhitelist::standard()),
    );
    let nlq = NlqService::new(
        SqlGenerator::new(validator, None, Duration::from_secs(1)),
        Arc::new(StaticExecutor { fail }),
        log,
    );
    cashflow_nlq::app(Arc::new(AppState { nlq }))
}

fn post_query(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analytics/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let response = router(false, Arc::new(MemoryQueryLog::new()))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn successful_query_returns_rows() {
    let response = router(false, Arc::new(MemoryQueryLog::new()))
        .oneshot(post_query(json!({ "query": "how many transactions", "limit": 10 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["intent"], "transaction_count");
    assert_eq!(body["source"], "template");
    assert_eq!(body["result_count"], 1);
    assert_eq!(body["results"][0]["count"], 42);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn invalid_requests_are_unprocessable() {
    for body in [
        json!({ "query": "   " }),
        json!({ "query": "total spend", "limit": 0 }),
        json!({ "query": "total spend", "limit": 1001 }),
        json!({ "query": "total spend", "date_from": "2024-02-01", "date_to": "2024-01-01" }),
    ] {
        let response = router(false, Arc::new(MemoryQueryLog::new()))
            .oneshot(post_query(body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    }
}

#[tokio::test]
async fn engine_failure_is_bad_request() {
    let log = Arc::new(MemoryQueryLog::new());
    let response = router(true, log.clone())
        .oneshot(post_query(json!({ "query": "total spend" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("connection_failed"));
    assert_eq!(log.snapshot().unwrap().len(), 1);
}

#[tokio::test]
async fn custom_intent_without_provider_is_bad_request() {
    let response = router(false, Arc::new(MemoryQueryLog::new()))
        .oneshot(post_query(json!({ "query": "anything", "intent": "custom" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("generation_not_configured"));
}

#[tokio::test]
async fn log_failure_is_internal_error() {
    let response = router(false, Arc::new(ReadOnlyLog))
        .oneshot(post_query(json!({ "query": "total spend" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn history_lists_recent_attempts() {
    let log = Arc::new(MemoryQueryLog::new());
    let app = router(false, log.clone());
    for q in ["total spend", "total income", "average transaction"] {
        app.clone().oneshot(post_query(json!({ "query": q }))).await.unwrap();
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/analytics/query-history?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["user_query"], "average transaction");
    assert_eq!(entries[0]["executed_successfully"], true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/analytics/query-history?limit=201")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
