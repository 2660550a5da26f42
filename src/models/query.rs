use crate::models::intent::QueryIntent;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 模板默认行数上限
pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl QueryParams {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String, // 用户提问内容
    #[serde(flatten)]
    pub params: QueryParams,
    /// 调用方强制指定意图，`custom` 直接走 LLM
    #[serde(default)]
    pub intent: Option<QueryIntent>,
}

impl QueryRequest {
    pub fn check(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if let Some(limit) = self.params.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(format!("limit must be between 1 and {}", MAX_LIMIT));
            }
        }
        if let (Some(from), Some(to)) = (self.params.date_from, self.params.date_to) {
            if from > to {
                return Err("date_from must not be after date_to".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Template,
    Llm,
}

/// 尚未通过校验的候选 SQL，只存在于单次请求内
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub sql: String,
    pub source: CandidateSource,
    pub intent: QueryIntent,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub sql: String,
    pub intent: QueryIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CandidateSource>,
    pub columns: Vec<String>,
    pub results: Vec<Value>,
    pub execution_time_ms: f64,
    pub result_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> QueryRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_flattens_params() {
        let req = request(
            r#"{"query": "total spend", "date_from": "2024-01-01", "limit": 5, "intent": "custom"}"#,
        );
        assert_eq!(req.params.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(req.params.limit, Some(5));
        assert_eq!(req.intent, Some(QueryIntent::Custom));
        assert!(req.check().is_ok());
    }

    #[test]
    fn request_check_rejects_bad_input() {
        assert!(request(r#"{"query": "   "}"#).check().is_err());
        assert!(request(r#"{"query": "x", "limit": 0}"#).check().is_err());
        assert!(request(r#"{"query": "x", "limit": 1001}"#).check().is_err());
        assert!(request(r#"{"query": "x", "date_from": "2024-02-01", "date_to": "2024-01-01"}"#)
            .check()
            .is_err());
    }

    #[test]
    fn limit_defaults() {
        assert_eq!(QueryParams::default().effective_limit(), DEFAULT_LIMIT);
    }
}
