use crate::core::classifier::classify;
use crate::core::generator::SqlGenerator;
use crate::error::{NlqError, QueryLogError};
use crate::infra::executor::SqlExecutor;
use crate::infra::query_log::QueryLog;
use crate::models::intent::QueryIntent;
use crate::models::query::{CandidateSource, QueryRequest, QueryResponse};
use crate::models::query_log::QueryAttemptRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn, Span};

/// 查询历史默认条数与上限
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// 意图识别 -> SQL 生成（模板优先）-> 安全校验 -> 执行 -> 审计
pub struct NlqService {
    generator: SqlGenerator,
    executor: Arc<dyn SqlExecutor>,
    log: Arc<dyn QueryLog>,
}

impl NlqService {
    pub fn new(generator: SqlGenerator, executor: Arc<dyn SqlExecutor>, log: Arc<dyn QueryLog>) -> Self {
        Self {
            generator,
            executor,
            log,
        }
    }

    /// 引擎失败体现在 `success: false` 的响应里；只有审计写入失败才返回 Err
    #[instrument(skip(self, request), fields(question = %request.query, intent = tracing::field::Empty))]
    pub async fn execute_query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryLogError> {
        let started = Instant::now();
        let intent = request.intent.unwrap_or_else(|| classify(&request.query));
        Span::current().record("intent", intent.as_str());
        let parameters = serde_json::to_string(&request.params).unwrap_or_default();

        let generated = match self
            .generator
            .generate(&request.query, intent, &request.params)
            .await
        {
            Ok(generated) => generated,
            Err(failure) => {
                warn!("SQL 生成失败: {}", failure.error.describe());
                let attempt = Attempt {
                    request,
                    intent,
                    source: None,
                    sql: failure.attempted_sql.unwrap_or_default(),
                    parameters,
                    started,
                };
                return self.fail(attempt, failure.error).await;
            }
        };

        info!("SQL 已通过校验 (source={:?})", generated.source);
        match self.executor.execute(&generated.sql).await {
            Ok(rows) => {
                let execution_time_ms = elapsed_ms(started);
                let result_count = rows.rows.len();
                let sql = generated.sql.into_string();
                let record = QueryAttemptRecord::success(
                    &request.query,
                    &sql,
                    parameters,
                    execution_time_ms,
                    result_count,
                );
                self.write_log(&record).await?;
                info!("查询完成: {} 行, {:.1} ms", result_count, execution_time_ms);
                Ok(QueryResponse {
                    success: true,
                    sql,
                    intent: generated.intent,
                    source: Some(generated.source),
                    columns: rows.columns,
                    results: rows.rows,
                    execution_time_ms,
                    result_count,
                    error: None,
                })
            }
            Err(e) => {
                error!("SQL 执行失败: {}", e);
                let attempt = Attempt {
                    request,
                    intent: generated.intent,
                    source: Some(generated.source),
                    sql: generated.sql.into_string(),
                    parameters,
                    started,
                };
                self.fail(attempt, NlqError::from(e)).await
            }
        }
    }

    /// 最近的查询记录，最新的在前
    pub async fn history(&self, limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
        self.log.recent(limit.clamp(1, MAX_HISTORY_LIMIT)).await
    }

    async fn fail(&self, attempt: Attempt<'_>, err: NlqError) -> Result<QueryResponse, QueryLogError> {
        let execution_time_ms = elapsed_ms(attempt.started);
        let message = err.describe();
        let record = QueryAttemptRecord::failure(
            &attempt.request.query,
            &attempt.sql,
            attempt.parameters,
            execution_time_ms,
            message.clone(),
        );
        self.write_log(&record).await?;
        Ok(QueryResponse {
            success: false,
            sql: attempt.sql,
            intent: attempt.intent,
            source: attempt.source,
            columns: Vec::new(),
            results: Vec::new(),
            execution_time_ms,
            result_count: 0,
            error: Some(message),
        })
    }

    async fn write_log(&self, record: &QueryAttemptRecord) -> Result<(), QueryLogError> {
        self.log.record(record).await.map_err(|e| {
            error!("审计日志写入失败: {}", e);
            e
        })
    }
}

struct Attempt<'a> {
    request: &'a QueryRequest,
    intent: QueryIntent,
    source: Option<CandidateSource>,
    sql: String,
    parameters: String,
    started: Instant,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::{SqlValidator, ValidatedSql};
    use crate::error::ExecutionError;
    use crate::infra::query_log::MemoryQueryLog;
    use crate::models::query::{QueryParams, QueryRows};
    use crate::models::schema::{FunctionWhitelist, SchemaWhitelist};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn execute(&self, sql: &ValidatedSql) -> Result<QueryRows, ExecutionError> {
            self.seen.lock().unwrap().push(sql.as_str().to_string());
            if self.fail {
                return Err(ExecutionError::Query("relation does not exist".into()));
            }
            Ok(QueryRows {
                columns: vec!["total".into()],
                rows: vec![json!({"total": -1234.5})],
            })
        }
    }

    struct BrokenLog;

    #[async_trait]
    impl QueryLog for BrokenLog {
        async fn record(&self, _record: &QueryAttemptRecord) -> Result<(), QueryLogError> {
            Err(QueryLogError::Unavailable("disk full".into()))
        }

        async fn recent(&self, _limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
            Ok(Vec::new())
        }
    }

    fn generator() -> SqlGenerator {
        let validator = SqlValidator::new(
            Arc::new(SchemaWhitelist::cashflow()),
            Arc::new(FunctionWhitelist::standard()),
        );
        SqlGenerator::new(validator, None, Duration::from_secs(1))
    }

    fn request(query: &str, intent: Option<QueryIntent>) -> QueryRequest {
        QueryRequest {
            query: query.to_string(),
            params: QueryParams::default(),
            intent,
        }
    }

    #[tokio::test]
    async fn template_query_executes_and_logs_success() {
        let executor = Arc::new(RecordingExecutor::default());
        let log = Arc::new(MemoryQueryLog::new());
        let service = NlqService::new(generator(), executor.clone(), log.clone());

        let resp = service
            .execute_query(&request("How much did I spend?", None))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.intent, QueryIntent::TotalSpend);
        assert_eq!(resp.source, Some(CandidateSource::Template));
        assert_eq!(resp.result_count, 1);
        assert_eq!(executor.seen.lock().unwrap().as_slice(), &[resp.sql.clone()]);

        let records = log.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].executed_successfully);
        assert_eq!(records[0].generated_sql, resp.sql);
        assert_eq!(records[0].result_count, Some(1));
    }

    #[tokio::test]
    async fn generation_failure_logs_once_without_executing() {
        let executor = Arc::new(RecordingExecutor::default());
        let log = Arc::new(MemoryQueryLog::new());
        let service = NlqService::new(generator(), executor.clone(), log.clone());

        let resp = service
            .execute_query(&request("anything", Some(QueryIntent::Custom)))
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.sql, "");
        assert!(resp.error.unwrap().starts_with("generation_not_configured"));
        assert!(executor.seen.lock().unwrap().is_empty());

        let records = log.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].executed_successfully);
    }

    #[tokio::test]
    async fn execution_failure_is_reported_and_logged() {
        let executor = Arc::new(RecordingExecutor {
            fail: true,
            ..Default::default()
        });
        let log = Arc::new(MemoryQueryLog::new());
        let service = NlqService::new(generator(), executor, log.clone());

        let resp = service
            .execute_query(&request("how many transactions", None))
            .await
            .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.intent, QueryIntent::TransactionCount);
        assert!(resp.sql.starts_with("SELECT COUNT(*)"));
        assert!(resp.error.as_deref().unwrap().starts_with("query_failed"));

        let records = log.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].generated_sql, resp.sql);
        assert!(records[0].error_message.as_deref().unwrap().contains("relation does not exist"));
    }

    #[tokio::test]
    async fn log_failure_surfaces_as_error() {
        let service = NlqService::new(
            generator(),
            Arc::new(RecordingExecutor::default()),
            Arc::new(BrokenLog),
        );
        let err = service
            .execute_query(&request("total income", None))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryLogError::Unavailable(_)));
    }

    #[tokio::test]
    async fn history_clamps_limit() {
        let log = Arc::new(MemoryQueryLog::new());
        let service = NlqService::new(generator(), Arc::new(RecordingExecutor::default()), log.clone());
        for _ in 0..3 {
            service.execute_query(&request("total income", None)).await.unwrap();
        }
        assert_eq!(service.history(0).await.unwrap().len(), 1);
        assert_eq!(service.history(500).await.unwrap().len(), 3);
    }
}
