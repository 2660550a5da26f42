use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// 每次查询尝试（成功或失败）落一条审计记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct QueryAttemptRecord {
    pub id: Uuid,
    pub user_query: String,
    pub generated_sql: String,
    pub parameters: Option<String>,
    pub execution_time_ms: f64,
    pub result_count: Option<i32>,
    pub error_message: Option<String>,
    pub executed_successfully: bool,
    pub created_at: DateTime<Utc>,
}

impl QueryAttemptRecord {
    pub fn success(
        user_query: &str,
        sql: &str,
        parameters: String,
        execution_time_ms: f64,
        result_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_query: user_query.to_string(),
            generated_sql: sql.to_string(),
            parameters: Some(parameters),
            execution_time_ms,
            result_count: Some(i32::try_from(result_count).unwrap_or(i32::MAX)),
            error_message: None,
            executed_successfully: true,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        user_query: &str,
        sql: &str,
        parameters: String,
        execution_time_ms: f64,
        error_message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_query: user_query.to_string(),
            generated_sql: sql.to_string(),
            parameters: Some(parameters),
            execution_time_ms,
            result_count: None,
            error_message: Some(error_message),
            executed_successfully: false,
            created_at: Utc::now(),
        }
    }
}
