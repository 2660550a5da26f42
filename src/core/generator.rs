use crate::core::templates;
use crate::core::validator::{SqlValidator, ValidatedSql};
use crate::error::{GenerationError, NlqError};
use crate::models::intent::QueryIntent;
use crate::models::query::{CandidateQuery, CandidateSource, QueryParams};
use crate::models::schema::{FunctionWhitelist, SchemaWhitelist};
use async_trait::async_trait;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// 外部文本生成能力，生产环境为 OpenAI / Anthropic，测试中可替换为假实现
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub sql: ValidatedSql,
    pub source: CandidateSource,
    pub intent: QueryIntent,
}

/// 生成失败，附带最后尝试过的 SQL（若有）
#[derive(Debug, Clone)]
pub struct GenerateFailure {
    pub error: NlqError,
    pub attempted_sql: Option<String>,
}

impl GenerateFailure {
    fn new(error: impl Into<NlqError>, attempted_sql: Option<String>) -> Self {
        Self {
            error: error.into(),
            attempted_sql,
        }
    }
}

pub struct SqlGenerator {
    validator: SqlValidator,
    provider: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl SqlGenerator {
    pub fn new(
        validator: SqlValidator,
        provider: Option<Arc<dyn TextGenerator>>,
        timeout: Duration,
    ) -> Self {
        Self {
            validator,
            provider,
            timeout,
        }
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    /// 先走模板；模板缺失或未通过校验时交给 LLM，LLM 结果同样必须通过校验
    pub async fn generate(
        &self,
        question: &str,
        intent: QueryIntent,
        params: &QueryParams,
    ) -> Result<GeneratedQuery, GenerateFailure> {
        let mut template_rejection = None;
        if let Some(sql) = templates::render(intent, params) {
            debug!("模板 SQL: {}", sql);
            match self.validator.validate(&sql) {
                Ok(validated) => {
                    return Ok(GeneratedQuery {
                        sql: validated,
                        source: CandidateSource::Template,
                        intent,
                    })
                }
                Err(reason) => {
                    warn!("模板 {} 未通过校验: {}", intent, reason);
                    template_rejection = Some((sql, reason));
                }
            }
        }

        // 没有 LLM 可兜底时直接报告模板的拒绝原因
        let attempted = match (template_rejection, &self.provider) {
            (Some((sql, reason)), None) => return Err(GenerateFailure::new(reason, Some(sql))),
            (rejection, _) => rejection.map(|(sql, _)| sql),
        };

        let candidate = self
            .llm_candidate(question, params)
            .await
            .map_err(|e| GenerateFailure::new(e, attempted))?;

        match self.validator.validate(&candidate.sql) {
            Ok(validated) => {
                info!("LLM 生成的 SQL 通过校验");
                Ok(GeneratedQuery {
                    sql: validated,
                    source: candidate.source,
                    intent: candidate.intent,
                })
            }
            Err(reason) => {
                warn!("LLM 生成的 SQL 被拒绝 ({}): {}", reason.code(), candidate.sql);
                Err(GenerateFailure::new(reason, Some(candidate.sql)))
            }
        }
    }

    async fn llm_candidate(
        &self,
        question: &str,
        params: &QueryParams,
    ) -> Result<CandidateQuery, GenerationError> {
        let provider = self.provider.as_ref().ok_or(GenerationError::NotConfigured)?;
        let prompt = build_prompt(
            self.validator.schema(),
            self.validator.functions(),
            question,
            params,
        );
        debug!("调用 {} 生成 SQL", provider.name());

        let raw = tokio::time::timeout(self.timeout, provider.generate(&prompt))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;

        let sql = strip_code_fence(&raw);
        if sql.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(CandidateQuery {
            sql,
            source: CandidateSource::Llm,
            intent: QueryIntent::Custom,
        })
    }
}

const GENERATION_RULES: &str = "\
Rules:
1. Produce exactly one SELECT statement. Never modify data or the schema.
2. Do not use UNION, INTERSECT, EXCEPT, SELECT INTO, window functions or locking clauses.
3. Reference only the tables, columns and functions listed above.
4. To show vendor names, join transactions.vendor_id to vendors.id and select vendors.name.
5. Amounts are signed: expenses are negative (amount < 0), income is positive (amount > 0).
6. \"Top\" or \"largest\" spending means ordering the summed negative amounts ASC; \
\"top\" income means ordering DESC. \"Bottom\" reverses the order.
7. Always include a LIMIT clause.
8. Reply with the SQL only, without explanation or Markdown.";

pub fn build_prompt(
    schema: &SchemaWhitelist,
    functions: &FunctionWhitelist,
    question: &str,
    params: &QueryParams,
) -> Prompt {
    let mut system = String::from(
        "You translate questions about a personal cash-flow ledger into a single PostgreSQL query.\n\n\
         Schema (only these tables and columns exist):\n",
    );
    for (table, columns) in schema.tables() {
        let _ = writeln!(system, "- {}({})", table, columns.join(", "));
    }
    let allowed: Vec<String> = functions.names().map(str::to_uppercase).collect();
    let _ = writeln!(system, "\nAllowed functions: {}\n", allowed.join(", "));
    system.push_str(GENERATION_RULES);

    let date_range = match (params.date_from, params.date_to) {
        (Some(from), Some(to)) => format!("from {} to {}", from, to),
        (Some(from), None) => format!("on or after {}", from),
        (None, Some(to)) => format!("on or before {}", to),
        (None, None) => "no date restriction".to_string(),
    };
    let user = format!(
        "Question: {}\nDate range: {}\nRow limit: {}",
        question.trim(),
        date_range,
        params.effective_limit()
    );
    Prompt { system, user }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:[A-Za-z0-9_-]*[ \t]*\n)?(.*?)```").expect("valid regex"))
}

/// 去掉模型回复中的 Markdown 代码块包裹
pub fn strip_code_fence(raw: &str) -> String {
    match fence_regex().captures(raw) {
        Some(caps) => caps[1].trim().to_string(),
        None => {
            let text = raw.trim();
            // 未闭合的代码块：丢掉首行的 ```lang
            match text.strip_prefix("```") {
                Some(rest) => rest.split_once('\n').map_or(rest, |(_, body)| body).trim().to_string(),
                None => text.to_string(),
            }
        }
    }
}
