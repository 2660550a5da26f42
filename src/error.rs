use std::time::Duration;
use thiserror::Error;

/// SQL 安全校验的拒绝原因，首个失败即终止校验
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("failed to parse SQL: {0}")]
    Unparseable(String),
    #[error("only a single read-only SELECT is allowed, found {0}")]
    DisallowedStatement(String),
    #[error("table '{0}' is not in the schema whitelist")]
    UnknownTable(String),
    #[error("column '{0}' is not in the schema whitelist")]
    UnknownColumn(String),
    #[error("function '{0}' is not in the function whitelist")]
    UnknownFunction(String),
    #[error("unsupported SQL construct: {0}")]
    UnsupportedConstruct(String),
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unparseable(_) => "unparseable",
            Self::DisallowedStatement(_) => "disallowed_statement",
            Self::UnknownTable(_) => "unknown_table",
            Self::UnknownColumn(_) => "unknown_column",
            Self::UnknownFunction(_) => "unknown_function",
            Self::UnsupportedConstruct(_) => "unsupported_construct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no text-generation provider is configured")]
    NotConfigured,
    #[error("text-generation provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("{provider} returned status {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned no SQL")]
    EmptyOutput,
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "generation_not_configured",
            Self::Timeout(_) => "generation_timeout",
            Self::Provider { .. } | Self::Transport(_) => "generation_failed",
            Self::EmptyOutput => "generation_empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_failed",
            Self::Query(_) => "query_failed",
        }
    }
}

impl From<sqlx::Error> for ExecutionError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Connection(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// 审计日志写入失败必须上抛，不能吞掉
#[derive(Debug, Error)]
pub enum QueryLogError {
    #[error("query log storage failed: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("query log store is unavailable: {0}")]
    Unavailable(String),
}

/// 单次查询流水线的失败，附带最后尝试的 SQL 以便审计
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NlqError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl NlqError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Generation(e) => e.code(),
            Self::Rejected(e) => e.code(),
            Self::Execution(e) => e.code(),
        }
    }

    /// 面向调用方的错误描述: "<code>: <message>"
    pub fn describe(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_are_stable() {
        assert_eq!(
            RejectionReason::DisallowedStatement("DROP".into()).code(),
            "disallowed_statement"
        );
        assert_eq!(RejectionReason::UnknownTable("users".into()).code(), "unknown_table");
        assert_eq!(RejectionReason::UnknownColumn("x".into()).code(), "unknown_column");
        assert_eq!(RejectionReason::UnknownFunction("pg_sleep".into()).code(), "unknown_function");
    }

    #[test]
    fn describe_prefixes_code() {
        let err = NlqError::from(RejectionReason::UnknownTable("users".into()));
        assert_eq!(
            err.describe(),
            "unknown_table: table 'users' is not in the schema whitelist"
        );
    }

    #[test]
    fn pool_timeout_is_a_connection_error() {
        let err = ExecutionError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "connection_failed");
        let err = ExecutionError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), "query_failed");
    }
}
