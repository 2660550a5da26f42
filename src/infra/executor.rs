use super::utils::{pg_columns, pg_row_to_json};
use crate::core::validator::ValidatedSql;
use crate::error::ExecutionError;
use crate::models::query::QueryRows;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

/// 只接受通过校验的 SQL
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &ValidatedSql) -> Result<QueryRows, ExecutionError>;
}

pub struct PgExecutor {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgExecutor {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, sql: &ValidatedSql) -> Result<QueryRows, ExecutionError> {
        let mut tx = self.pool.begin().await?;
        // 只读事务 + 语句超时，结束后总是回滚
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let timeout = format!("SET LOCAL statement_timeout = {}", self.statement_timeout_ms);
        sqlx::query(&timeout).execute(&mut *tx).await?;

        let rows = sqlx::query(sql.as_str()).fetch_all(&mut *tx).await?;

        if let Err(e) = tx.rollback().await {
            warn!("只读事务回滚失败: {}", e);
        }

        let columns = rows.first().map(pg_columns).unwrap_or_default();
        let rows: Vec<_> = rows.iter().map(|row| pg_row_to_json(row, &columns)).collect();
        debug!("查询返回 {} 行", rows.len());
        Ok(QueryRows { columns, rows })
    }
}
