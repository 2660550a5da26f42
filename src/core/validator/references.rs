use super::alias::{AliasTable, AliasTarget};
use super::walk::{object_name, Node, ScopeId, Visitor};
use crate::error::RejectionReason;
use crate::models::schema::{FunctionWhitelist, SchemaWhitelist};
use sqlparser::ast::Ident;

type CheckResult = Result<(), RejectionReason>;

/// 引用检查：表、列、函数都必须解析到白名单
pub struct ReferenceChecker<'a> {
    pub schema: &'a SchemaWhitelist,
    pub functions: &'a FunctionWhitelist,
    pub aliases: &'a AliasTable,
}

impl ReferenceChecker<'_> {
    fn check_table(&self, table: &str) -> CheckResult {
        if self.schema.has_table(table) {
            Ok(())
        } else {
            Err(RejectionReason::UnknownTable(table.to_string()))
        }
    }

    fn check_column(&self, parts: &[Ident], scope: ScopeId, output_ok: bool) -> CheckResult {
        let parts: Vec<String> = parts.iter().map(|p| p.value.to_lowercase()).collect();
        match parts.as_slice() {
            [column] => self.check_unqualified(scope, column, output_ok),
            [qualifier, column] => self.check_qualified(scope, qualifier, column),
            _ => Err(RejectionReason::UnknownColumn(parts.join("."))),
        }
    }

    /// 未限定列：由内向外，在第一个能提供该列的作用域里解析。
    /// 输出别名只在 `output_ok`（ORDER BY / GROUP BY 顶层裸名）时可用，且仅限同一 SELECT。
    fn check_unqualified(&self, scope: ScopeId, column: &str, output_ok: bool) -> CheckResult {
        let found = self.aliases.scope_chain(scope).any(|s| {
            self.aliases
                .targets_in(s)
                .iter()
                .any(|target| self.provides(target, column))
        });
        if found || (output_ok && self.aliases.is_output_alias(scope, column)) {
            Ok(())
        } else {
            Err(RejectionReason::UnknownColumn(column.to_string()))
        }
    }

    fn check_qualified(&self, scope: ScopeId, qualifier: &str, column: &str) -> CheckResult {
        let display = format!("{}.{}", qualifier, column);
        match self.aliases.resolve(scope, qualifier) {
            Some(targets) => {
                for target in targets {
                    if let AliasTarget::Table(table) = target {
                        self.check_table(table)?;
                    }
                    if !self.provides(target, column) {
                        return Err(RejectionReason::UnknownColumn(display));
                    }
                }
                Ok(())
            }
            None if self.schema.has_table(qualifier) => {
                if self.schema.table_has_column(qualifier, column) {
                    Ok(())
                } else {
                    Err(RejectionReason::UnknownColumn(display))
                }
            }
            None => Err(RejectionReason::UnknownTable(qualifier.to_string())),
        }
    }

    /// 来源是否暴露了名为 `column` 的白名单列
    fn provides(&self, target: &AliasTarget, column: &str) -> bool {
        match target {
            AliasTarget::Table(table) => self.schema.table_has_column(table, column),
            AliasTarget::Derived(Some(columns)) => columns.iter().any(|c| c == column),
            // `SELECT *` 的子查询：退回到语句里出现过的基表
            AliasTarget::Derived(None) => self
                .aliases
                .statement_tables()
                .any(|table| self.schema.table_has_column(table, column)),
        }
    }

    fn check_wildcard(&self, scope: ScopeId, qualifier: &str) -> CheckResult {
        match self.aliases.resolve(scope, qualifier) {
            Some(targets) => {
                for target in targets {
                    if let AliasTarget::Table(table) = target {
                        self.check_table(table)?;
                    }
                }
                Ok(())
            }
            None => self.check_table(qualifier),
        }
    }
}

impl Visitor for ReferenceChecker<'_> {
    fn visit(&mut self, node: Node<'_>) -> CheckResult {
        match node {
            Node::Table { name, scope, .. } => {
                let table = object_name(name);
                if self.aliases.is_cte_ref(scope, &table) {
                    Ok(())
                } else {
                    self.check_table(&table)
                }
            }
            Node::Column {
                parts,
                scope,
                output_ok,
            } => self.check_column(parts, scope, output_ok),
            Node::QualifiedWildcard { name, scope } => {
                self.check_wildcard(scope, &object_name(name))
            }
            Node::Function(name) => {
                if self.functions.allows(&name) {
                    Ok(())
                } else {
                    Err(RejectionReason::UnknownFunction(name))
                }
            }
            Node::Disallowed(what) => Err(RejectionReason::DisallowedStatement(what)),
            Node::Scope { .. }
            | Node::Cte { .. }
            | Node::Derived { .. }
            | Node::SelectAlias { .. }
            | Node::Structural => Ok(()),
        }
    }
}
