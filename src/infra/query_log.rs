use crate::error::QueryLogError;
use crate::models::query_log::QueryAttemptRecord;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Mutex;

/// 查询审计日志，只追加
#[async_trait]
pub trait QueryLog: Send + Sync {
    async fn record(&self, record: &QueryAttemptRecord) -> Result<(), QueryLogError>;

    /// 按时间倒序返回最近的记录
    async fn recent(&self, limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError>;
}

pub struct PgQueryLog {
    pool: PgPool,
}

impl PgQueryLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryLog for PgQueryLog {
    async fn record(&self, record: &QueryAttemptRecord) -> Result<(), QueryLogError> {
        sqlx::query(
            "INSERT INTO nlq_queries (id, user_query, generated_sql, parameters, execution_time_ms, \
             result_count, error_message, executed_successfully, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record.id)
        .bind(&record.user_query)
        .bind(&record.generated_sql)
        .bind(&record.parameters)
        .bind(record.execution_time_ms)
        .bind(record.result_count)
        .bind(&record.error_message)
        .bind(record.executed_successfully)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
        let rows = sqlx::query_as::<_, QueryAttemptRecord>(
            "SELECT id, user_query, generated_sql, parameters, execution_time_ms, result_count, \
             error_message, executed_successfully, created_at \
             FROM nlq_queries ORDER BY created_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// 进程内日志，用于测试与无数据库的本地运行
#[derive(Default)]
pub struct MemoryQueryLog {
    records: Mutex<Vec<QueryAttemptRecord>>,
}

impl MemoryQueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|e| QueryLogError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl QueryLog for MemoryQueryLog {
    async fn record(&self, record: &QueryAttemptRecord) -> Result<(), QueryLogError> {
        self.records
            .lock()
            .map_err(|e| QueryLogError::Unavailable(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<QueryAttemptRecord>, QueryLogError> {
        let records = self
            .records
            .lock()
            .map_err(|e| QueryLogError::Unavailable(e.to_string()))?;
        Ok(records.iter().rev().take(limit as usize).cloned().collect())
    }
}
