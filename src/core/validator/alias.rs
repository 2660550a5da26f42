use super::walk::{object_name, Node, OutputColumns, ScopeId, Visitor};
use crate::error::RejectionReason;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasTarget {
    Table(String),
    /// 子查询、CTE 或嵌套 JOIN，只暴露其输出列；`None` 表示输出列未知
    Derived(OutputColumns),
}

/// 单次校验内有效的别名表，引用检查之前必须完整构建。
///
/// 名字按作用域登记，解析时从当前作用域逐层向外查找。
#[derive(Debug, Default)]
pub struct AliasTable {
    parents: HashMap<ScopeId, ScopeId>,
    bindings: HashMap<(ScopeId, String), Vec<AliasTarget>>,
    scope_targets: HashMap<ScopeId, Vec<AliasTarget>>,
    ctes: HashMap<(ScopeId, String), OutputColumns>,
    /// 解析到 CTE 的表引用
    cte_refs: HashSet<(ScopeId, String)>,
    outputs: HashSet<(ScopeId, String)>,
    statement_tables: BTreeSet<String>,
}

impl AliasTable {
    /// 从 `scope` 开始由内向外的作用域链
    pub fn scope_chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), |s| self.parents.get(s).copied())
    }

    /// 最内层绑定了 `token` 的作用域里的全部目标
    pub fn resolve(&self, scope: ScopeId, token: &str) -> Option<&[AliasTarget]> {
        self.scope_chain(scope).find_map(|s| {
            self.bindings
                .get(&(s, token.to_string()))
                .map(Vec::as_slice)
        })
    }

    /// 某个作用域 FROM 子句里的全部来源
    pub fn targets_in(&self, scope: ScopeId) -> &[AliasTarget] {
        self.scope_targets
            .get(&scope)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_cte_ref(&self, scope: ScopeId, table: &str) -> bool {
        self.cte_refs.contains(&(scope, table.to_string()))
    }

    /// 同一个 SELECT 列表里的输出别名
    pub fn is_output_alias(&self, scope: ScopeId, name: &str) -> bool {
        self.outputs.contains(&(scope, name.to_string()))
    }

    /// 语句中任意位置出现过的基表
    pub fn statement_tables(&self) -> impl Iterator<Item = &str> {
        self.statement_tables.iter().map(String::as_str)
    }

    fn visible_cte(&self, scope: ScopeId, name: &str) -> Option<&OutputColumns> {
        self.scope_chain(scope)
            .find_map(|s| self.ctes.get(&(s, name.to_string())))
    }

    fn bind(&mut self, scope: ScopeId, token: Option<String>, target: AliasTarget) {
        if let Some(token) = token {
            let targets = self.bindings.entry((scope, token)).or_default();
            if !targets.contains(&target) {
                targets.push(target.clone());
            }
        }
        self.scope_targets.entry(scope).or_default().push(target);
    }
}

impl Visitor for AliasTable {
    fn visit(&mut self, node: Node<'_>) -> Result<(), RejectionReason> {
        match node {
            Node::Scope {
                id,
                parent: Some(parent),
            } => {
                self.parents.insert(id, parent);
            }
            Node::Cte {
                name,
                columns,
                scope,
            } => {
                self.ctes.insert((scope, name.value.to_lowercase()), columns);
            }
            Node::Table { name, alias, scope } => {
                let canonical = object_name(name);
                let token = match alias {
                    Some(alias) => alias.value.to_lowercase(),
                    None => canonical.clone(),
                };
                // 只有单段名字、且 CTE 已在外层定义时才指向 CTE
                let cte = match name.0.as_slice() {
                    [_] => self.visible_cte(scope, &canonical).cloned(),
                    _ => None,
                };
                let target = match cte {
                    Some(columns) => {
                        self.cte_refs.insert((scope, canonical));
                        AliasTarget::Derived(columns)
                    }
                    None => {
                        self.statement_tables.insert(canonical.clone());
                        AliasTarget::Table(canonical)
                    }
                };
                self.bind(scope, Some(token), target);
            }
            Node::Derived {
                alias,
                columns,
                scope,
            } => {
                let token = alias.map(|a| a.value.to_lowercase());
                self.bind(scope, token, AliasTarget::Derived(columns));
            }
            Node::SelectAlias { alias, scope } => {
                self.outputs.insert((scope, alias.value.to_lowercase()));
            }
            Node::Scope { parent: None, .. }
            | Node::Disallowed(_)
            | Node::Column { .. }
            | Node::QualifiedWildcard { .. }
            | Node::Function(_)
            | Node::Structural => {}
        }
        Ok(())
    }
}
