//! SQL 安全校验器
//!
//! 流程：解析 -> 语句形态检查（结构 + 词法双重）-> 别名预扫描 -> 引用检查。
//! 任一环节失败立即返回第一个拒绝原因，不做任何修补。

mod alias;
mod references;
mod walk;

pub use alias::{AliasTable, AliasTarget};
pub use walk::{output_columns, walk_query, Node, OutputColumns, ScopeId, Visitor};

use crate::error::RejectionReason;
use crate::models::schema::{FunctionWhitelist, SchemaWhitelist};
use references::ReferenceChecker;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::sync::Arc;
use tracing::debug;

/// 词法扫描的危险关键字，只匹配未加引号的单词
const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "EXEC", "EXECUTE",
    "UNION", "INTERSECT", "EXCEPT", "INTO", "GRANT", "REVOKE", "MERGE", "COPY", "CALL",
];

/// 已通过校验的 SQL，只能由 [`SqlValidator::validate`] 构造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct SqlValidator {
    schema: Arc<SchemaWhitelist>,
    functions: Arc<FunctionWhitelist>,
}

impl SqlValidator {
    pub fn new(schema: Arc<SchemaWhitelist>, functions: Arc<FunctionWhitelist>) -> Self {
        Self { schema, functions }
    }

    pub fn schema(&self) -> &SchemaWhitelist {
        &self.schema
    }

    pub fn functions(&self) -> &FunctionWhitelist {
        &self.functions
    }

    pub fn validate(&self, sql: &str) -> Result<ValidatedSql, RejectionReason> {
        let dialect = PostgreSqlDialect {};
        let statements = Parser::parse_sql(&dialect, sql)
            .map_err(|e| RejectionReason::Unparseable(e.to_string()))?;

        let query = single_query(&statements)?;
        scan_keywords(&dialect, sql)?;
        walk_query(query, &mut ShapeCheck)?;

        let mut aliases = AliasTable::default();
        walk_query(query, &mut aliases)?;

        let mut checker = ReferenceChecker {
            schema: &self.schema,
            functions: &self.functions,
            aliases: &aliases,
        };
        walk_query(query, &mut checker)?;

        debug!("SQL 校验通过: {}", sql.trim());
        Ok(ValidatedSql(sql.trim().to_string()))
    }
}

fn single_query(statements: &[Statement]) -> Result<&Query, RejectionReason> {
    match statements {
        [] => Err(RejectionReason::Unparseable("no statement found".to_string())),
        [Statement::Query(query)] => Ok(query),
        [other] => Err(RejectionReason::DisallowedStatement(statement_kind(other))),
        many => {
            // 多条语句时优先报告其中的非查询语句
            let kind = many
                .iter()
                .find(|s| !matches!(s, Statement::Query(_)))
                .map(statement_kind)
                .unwrap_or_else(|| format!("{} statements", many.len()));
            Err(RejectionReason::DisallowedStatement(kind))
        }
    }
}

fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

fn scan_keywords(dialect: &PostgreSqlDialect, sql: &str) -> Result<(), RejectionReason> {
    let tokens = Tokenizer::new(dialect, sql)
        .tokenize()
        .map_err(|e| RejectionReason::Unparseable(e.to_string()))?;
    for token in tokens {
        if let Token::Word(word) = token {
            if word.quote_style.is_none() {
                let upper = word.value.to_uppercase();
                if DENIED_KEYWORDS.contains(&upper.as_str()) {
                    return Err(RejectionReason::DisallowedStatement(upper));
                }
            }
        }
    }
    Ok(())
}

/// 结构检查：树中任何位置都不允许出现非只读 SELECT 结构
struct ShapeCheck;

impl Visitor for ShapeCheck {
    fn visit(&mut self, node: Node<'_>) -> Result<(), RejectionReason> {
        match node {
            Node::Disallowed(what) => Err(RejectionReason::DisallowedStatement(what)),
            Node::Scope { .. }
            | Node::Cte { .. }
            | Node::Table { .. }
            | Node::Derived { .. }
            | Node::SelectAlias { .. }
            | Node::Column { .. }
            | Node::QualifiedWildcard { .. }
            | Node::Function(_)
            | Node::Structural => Ok(()),
        }
    }
}
