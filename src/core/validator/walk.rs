//! 语法树遍历：把 sqlparser 的 AST 归约为一个封闭的节点种类集合。
//!
//! 遍历器本身不做白名单判断，只负责把每个节点交给 [`Visitor`]。
//! 未被显式归类的表达式 / 表因子一律拒绝，新语法不会被静默放过。

use crate::error::RejectionReason;
use sqlparser::ast::{
    Distinct, Expr, FunctionArg, FunctionArgExpr, GroupByExpr, Ident, Join, JoinConstraint,
    JoinOperator, ObjectName, OrderByExpr, Query, Select, SelectItem, SetExpr, TableAlias,
    TableFactor, TableWithJoins,
};

type WalkResult = Result<(), RejectionReason>;

/// 每个 (子)查询一个作用域，按遍历顺序编号，根查询为 0
pub type ScopeId = usize;

/// 子查询 / CTE 的输出列；含 `*` 时为 `None`
pub type OutputColumns = Option<Vec<String>>;

#[derive(Debug)]
pub enum Node<'a> {
    /// 只读 SELECT 之外的结构：集合运算、VALUES、SELECT INTO、行锁
    Disallowed(String),
    Scope {
        id: ScopeId,
        parent: Option<ScopeId>,
    },
    /// WITH 子句定义的名字，在其 body 遍历完之后才出现
    Cte {
        name: &'a Ident,
        columns: OutputColumns,
        scope: ScopeId,
    },
    Table {
        name: &'a ObjectName,
        alias: Option<&'a Ident>,
        scope: ScopeId,
    },
    /// FROM 里的子查询或嵌套 JOIN
    Derived {
        alias: Option<&'a Ident>,
        columns: OutputColumns,
        scope: ScopeId,
    },
    /// SELECT 列表里的输出别名
    SelectAlias { alias: &'a Ident, scope: ScopeId },
    /// `output_ok` 只在 ORDER BY / GROUP BY 的顶层裸标识符上为真
    Column {
        parts: &'a [Ident],
        scope: ScopeId,
        output_ok: bool,
    },
    QualifiedWildcard { name: &'a ObjectName, scope: ScopeId },
    Function(String),
    /// 运算符、字面量、子句关键字等语法结构，不做函数白名单检查
    Structural,
}

pub trait Visitor {
    fn visit(&mut self, node: Node<'_>) -> WalkResult;
}

pub fn walk_query<V: Visitor + ?Sized>(query: &Query, visitor: &mut V) -> WalkResult {
    Walker {
        visitor,
        scope: 0,
        next_scope: 0,
    }
    .query(query)
}

/// 小写并以 `.` 连接的规范名
pub fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

/// 查询的输出列名，按 PostgreSQL 的默认列名规则推断
pub fn output_columns(query: &Query) -> OutputColumns {
    match query.body.as_ref() {
        SetExpr::Select(select) => select
            .projection
            .iter()
            .map(|item| match item {
                SelectItem::ExprWithAlias { alias, .. } => Some(alias.value.to_lowercase()),
                SelectItem::UnnamedExpr(expr) => Some(default_column_name(expr)),
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => None,
            })
            .collect(),
        SetExpr::Query(inner) => output_columns(inner),
        _ => None,
    }
}

fn default_column_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.to_lowercase(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|p| p.value.to_lowercase())
            .unwrap_or_default(),
        Expr::Function(func) => func
            .name
            .0
            .last()
            .map(|p| p.value.to_lowercase())
            .unwrap_or_default(),
        Expr::Nested(inner) | Expr::Cast { expr: inner, .. } => default_column_name(inner),
        _ => "?column?".to_string(),
    }
}

/// 别名里显式列出的列名优先于子查询推断出的列名
fn aliased_columns(alias: Option<&TableAlias>, query: &Query) -> OutputColumns {
    match alias {
        Some(alias) if !alias.columns.is_empty() => Some(
            alias
                .columns
                .iter()
                .map(|c| c.value.to_lowercase())
                .collect(),
        ),
        _ => output_columns(query),
    }
}

fn unsupported(what: impl std::fmt::Display) -> RejectionReason {
    let text: String = what.to_string().chars().take(80).collect();
    RejectionReason::UnsupportedConstruct(text)
}

struct Walker<'v, V: ?Sized> {
    visitor: &'v mut V,
    scope: ScopeId,
    next_scope: ScopeId,
}

impl<V: Visitor + ?Sized> Walker<'_, V> {
    fn emit(&mut self, node: Node<'_>) -> WalkResult {
        self.visitor.visit(node)
    }

    /// 新开一个作用域遍历子查询，结束后恢复外层作用域
    fn query(&mut self, query: &Query) -> WalkResult {
        let id = self.next_scope;
        self.next_scope += 1;
        let parent = (id != 0).then_some(self.scope);
        self.emit(Node::Scope { id, parent })?;

        let outer = std::mem::replace(&mut self.scope, id);
        let result = self.query_body(query);
        self.scope = outer;
        result
    }

    fn query_body(&mut self, query: &Query) -> WalkResult {
        if !query.locks.is_empty() {
            self.emit(Node::Disallowed("row locking clause".to_string()))?;
        }
        if let Some(with) = &query.with {
            if with.recursive {
                return Err(unsupported("WITH RECURSIVE"));
            }
            for cte in &with.cte_tables {
                if cte.from.is_some() {
                    return Err(unsupported(cte));
                }
                self.query(&cte.query)?;
                let scope = self.scope;
                self.emit(Node::Cte {
                    name: &cte.alias.name,
                    columns: aliased_columns(Some(&cte.alias), &cte.query),
                    scope,
                })?;
            }
        }
        self.set_expr(&query.body)?;
        self.order_by(&query.order_by)?;
        if let Some(limit) = &query.limit {
            self.expr(limit)?;
        }
        if let Some(offset) = &query.offset {
            self.expr(&offset.value)?;
        }
        if let Some(quantity) = query.fetch.as_ref().and_then(|f| f.quantity.as_ref()) {
            self.expr(quantity)?;
        }
        Ok(())
    }

    fn set_expr(&mut self, body: &SetExpr) -> WalkResult {
        match body {
            SetExpr::Select(select) => self.select(select),
            // 括号包起来的查询与外层共用作用域
            SetExpr::Query(query) => self.query_body(query),
            SetExpr::SetOperation { op, .. } => self.emit(Node::Disallowed(op.to_string())),
            SetExpr::Values(_) => self.emit(Node::Disallowed("VALUES".to_string())),
            _ => self.emit(Node::Disallowed("non-SELECT query body".to_string())),
        }
    }

    fn select(&mut self, select: &Select) -> WalkResult {
        if select.into.is_some() {
            self.emit(Node::Disallowed("SELECT INTO".to_string()))?;
        }
        if select.top.is_some() {
            return Err(unsupported("TOP clause"));
        }
        if !select.lateral_views.is_empty() {
            return Err(unsupported("LATERAL VIEW"));
        }
        if !select.named_window.is_empty() {
            return Err(unsupported("WINDOW clause"));
        }

        if let Some(Distinct::On(exprs)) = &select.distinct {
            self.exprs(exprs)?;
        }
        for table in &select.from {
            self.table_with_joins(table)?;
        }
        for item in &select.projection {
            self.select_item(item)?;
        }
        if let Some(selection) = &select.selection {
            self.expr(selection)?;
        }
        for e in select
            .cluster_by
            .iter()
            .chain(&select.distribute_by)
            .chain(&select.sort_by)
        {
            self.expr(e)?;
        }
        if let Some(qualify) = &select.qualify {
            self.expr(qualify)?;
        }
        match &select.group_by {
            GroupByExpr::All => self.emit(Node::Structural)?,
            GroupByExpr::Expressions(exprs) => {
                for e in exprs {
                    self.grouping_item(e)?;
                }
            }
        }
        // HAVING 只能引用输入列
        if let Some(having) = &select.having {
            self.expr(having)?;
        }
        Ok(())
    }

    fn order_by(&mut self, items: &[OrderByExpr]) -> WalkResult {
        for item in items {
            self.grouping_item(&item.expr)?;
        }
        Ok(())
    }

    /// ORDER BY / GROUP BY 的单个条目：只有裸标识符可以指向输出别名
    fn grouping_item(&mut self, expr: &Expr) -> WalkResult {
        match expr {
            Expr::Identifier(ident) => {
                let scope = self.scope;
                self.emit(Node::Column {
                    parts: std::slice::from_ref(ident),
                    scope,
                    output_ok: true,
                })
            }
            other => self.expr(other),
        }
    }

    fn select_item(&mut self, item: &SelectItem) -> WalkResult {
        match item {
            SelectItem::UnnamedExpr(expr) => self.expr(expr),
            SelectItem::ExprWithAlias { expr, alias } => {
                let scope = self.scope;
                self.emit(Node::SelectAlias { alias, scope })?;
                self.expr(expr)
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let scope = self.scope;
                self.emit(Node::QualifiedWildcard { name, scope })
            }
            SelectItem::Wildcard(_) => self.emit(Node::Structural),
        }
    }

    fn table_with_joins(&mut self, table: &TableWithJoins) -> WalkResult {
        self.table_factor(&table.relation)?;
        for join in &table.joins {
            self.join(join)?;
        }
        Ok(())
    }

    fn table_factor(&mut self, factor: &TableFactor) -> WalkResult {
        match factor {
            TableFactor::Table { name, alias, args, .. } => {
                if args.is_some() {
                    return Err(unsupported(format!("table function {}", name)));
                }
                let scope = self.scope;
                self.emit(Node::Table {
                    name,
                    alias: alias.as_ref().map(|a| &a.name),
                    scope,
                })
            }
            TableFactor::Derived { subquery, alias, .. } => {
                self.query(subquery)?;
                let scope = self.scope;
                self.emit(Node::Derived {
                    alias: alias.as_ref().map(|a| &a.name),
                    columns: aliased_columns(alias.as_ref(), subquery),
                    scope,
                })
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
                ..
            } => {
                // 内层的表直接绑定到当前作用域，外层别名不暴露列
                self.table_with_joins(table_with_joins)?;
                match alias {
                    Some(alias) => {
                        let scope = self.scope;
                        self.emit(Node::Derived {
                            alias: Some(&alias.name),
                            columns: None,
                            scope,
                        })
                    }
                    None => self.emit(Node::Structural),
                }
            }
            other => Err(unsupported(other)),
        }
    }

    fn join(&mut self, join: &Join) -> WalkResult {
        self.table_factor(&join.relation)?;
        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c)
            | JoinOperator::LeftSemi(c)
            | JoinOperator::RightSemi(c)
            | JoinOperator::LeftAnti(c)
            | JoinOperator::RightAnti(c) => c,
            JoinOperator::CrossJoin => return self.emit(Node::Structural),
            _ => return Err(unsupported("APPLY join")),
        };
        match constraint {
            JoinConstraint::On(expr) => self.expr(expr),
            JoinConstraint::Using(columns) => {
                let scope = self.scope;
                for column in columns {
                    self.emit(Node::Column {
                        parts: std::slice::from_ref(column),
                        scope,
                        output_ok: false,
                    })?;
                }
                Ok(())
            }
            JoinConstraint::Natural | JoinConstraint::None => self.emit(Node::Structural),
        }
    }

    fn function_arg(&mut self, arg: &FunctionArg) -> WalkResult {
        let arg = match arg {
            FunctionArg::Named { arg, .. } => arg,
            FunctionArg::Unnamed(arg) => arg,
        };
        match arg {
            FunctionArgExpr::Expr(expr) => self.expr(expr),
            FunctionArgExpr::QualifiedWildcard(name) => {
                let scope = self.scope;
                self.emit(Node::QualifiedWildcard { name, scope })
            }
            FunctionArgExpr::Wildcard => self.emit(Node::Structural),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> WalkResult {
        for e in exprs {
            self.expr(e)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> WalkResult {
        match expr {
            Expr::Identifier(ident) => {
                let scope = self.scope;
                self.emit(Node::Column {
                    parts: std::slice::from_ref(ident),
                    scope,
                    output_ok: false,
                })
            }
            Expr::CompoundIdentifier(parts) => {
                let scope = self.scope;
                self.emit(Node::Column {
                    parts,
                    scope,
                    output_ok: false,
                })
            }
            Expr::Value(_) | Expr::TypedString { .. } => self.emit(Node::Structural),

            Expr::Nested(inner)
            | Expr::UnaryOp { expr: inner, .. }
            | Expr::Cast { expr: inner, .. }
            | Expr::TryCast { expr: inner, .. }
            | Expr::SafeCast { expr: inner, .. }
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsNotTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::IsNotFalse(inner)
            | Expr::IsUnknown(inner)
            | Expr::IsNotUnknown(inner) => {
                self.emit(Node::Structural)?;
                self.expr(inner)
            }

            Expr::BinaryOp { left, right, .. }
            | Expr::IsDistinctFrom(left, right)
            | Expr::IsNotDistinctFrom(left, right)
            | Expr::Like {
                expr: left,
                pattern: right,
                ..
            }
            | Expr::ILike {
                expr: left,
                pattern: right,
                ..
            }
            | Expr::SimilarTo {
                expr: left,
                pattern: right,
                ..
            } => {
                self.emit(Node::Structural)?;
                self.expr(left)?;
                self.expr(right)
            }

            Expr::Between { expr, low, high, .. } => {
                self.emit(Node::Structural)?;
                self.expr(expr)?;
                self.expr(low)?;
                self.expr(high)
            }
            Expr::InList { expr, list, .. } => {
                self.emit(Node::Structural)?;
                self.expr(expr)?;
                self.exprs(list)
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.emit(Node::Structural)?;
                self.expr(expr)?;
                self.query(subquery)
            }
            Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
                self.emit(Node::Structural)?;
                self.query(subquery)
            }
            Expr::Tuple(items) => {
                self.emit(Node::Structural)?;
                self.exprs(items)
            }
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
                ..
            } => {
                self.emit(Node::Structural)?;
                if let Some(operand) = operand {
                    self.expr(operand)?;
                }
                self.exprs(conditions)?;
                self.exprs(results)?;
                if let Some(else_result) = else_result {
                    self.expr(else_result)?;
                }
                Ok(())
            }
            Expr::Interval(interval) => {
                self.emit(Node::Structural)?;
                self.expr(&interval.value)
            }

            Expr::Function(func) => {
                if func.over.is_some() {
                    return Err(unsupported(format!("window function {}", func.name)));
                }
                self.emit(Node::Function(object_name(&func.name)))?;
                for arg in &func.args {
                    self.function_arg(arg)?;
                }
                if let Some(filter) = &func.filter {
                    self.expr(filter)?;
                }
                for item in &func.order_by {
                    self.expr(&item.expr)?;
                }
                Ok(())
            }
            // 特殊语法形式的函数，按同名函数做白名单检查
            Expr::Extract { expr, .. } => {
                self.emit(Node::Function("extract".to_string()))?;
                self.expr(expr)
            }
            Expr::Ceil { expr, .. } => {
                self.emit(Node::Function("ceil".to_string()))?;
                self.expr(expr)
            }
            Expr::Floor { expr, .. } => {
                self.emit(Node::Function("floor".to_string()))?;
                self.expr(expr)
            }
            Expr::Substring { .. } => Err(RejectionReason::UnknownFunction("substring".to_string())),
            Expr::Trim { .. } => Err(RejectionReason::UnknownFunction("trim".to_string())),
            Expr::Position { .. } => Err(RejectionReason::UnknownFunction("position".to_string())),
            Expr::Overlay { .. } => Err(RejectionReason::UnknownFunction("overlay".to_string())),

            other => Err(unsupported(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::Statement;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    /// 记录遍历到的节点种类，便于断言
    #[derive(Default)]
    struct Recorder {
        scopes: Vec<(ScopeId, Option<ScopeId>)>,
        tables: Vec<(String, ScopeId)>,
        columns: Vec<(String, ScopeId, bool)>,
        functions: Vec<String>,
        aliases: Vec<(String, ScopeId)>,
        derived: Vec<(Option<String>, OutputColumns)>,
        disallowed: Vec<String>,
    }

    impl Visitor for Recorder {
        fn visit(&mut self, node: Node<'_>) -> WalkResult {
            match node {
                Node::Scope { id, parent } => self.scopes.push((id, parent)),
                Node::Table { name, scope, .. } => self.tables.push((object_name(name), scope)),
                Node::Column {
                    parts,
                    scope,
                    output_ok,
                } => {
                    let name = parts.iter().map(|p| p.value.as_str()).collect::<Vec<_>>().join(".");
                    self.columns.push((name, scope, output_ok));
                }
                Node::Function(name) => self.functions.push(name),
                Node::SelectAlias { alias, scope } => self.aliases.push((alias.value.clone(), scope)),
                Node::Derived { alias, columns, .. } => {
                    self.derived.push((alias.map(|a| a.value.clone()), columns))
                }
                Node::Cte { name, columns, .. } => {
                    self.derived.push((Some(name.value.clone()), columns))
                }
                Node::Disallowed(what) => self.disallowed.push(what),
                Node::QualifiedWildcard { .. } | Node::Structural => {}
            }
            Ok(())
        }
    }

    fn record(sql: &str) -> Result<Recorder, RejectionReason> {
        let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap();
        let Statement::Query(query) = &statements[0] else {
            panic!("not a query: {sql}");
        };
        let mut recorder = Recorder::default();
        walk_query(query, &mut recorder)?;
        Ok(recorder)
    }

    fn column(name: &str, scope: ScopeId, output_ok: bool) -> (String, ScopeId, bool) {
        (name.to_string(), scope, output_ok)
    }

    #[test]
    fn collects_tables_columns_and_functions() {
        let r = record(
            "SELECT v.name, SUM(t.amount) AS total FROM transactions t \
             JOIN vendors v ON t.vendor_id = v.id GROUP BY v.name ORDER BY total",
        )
        .unwrap();
        assert_eq!(
            r.tables,
            vec![("transactions".to_string(), 0), ("vendors".to_string(), 0)]
        );
        assert_eq!(r.functions, vec!["sum"]);
        assert_eq!(r.aliases, vec![("total".to_string(), 0)]);
        assert!(r.columns.contains(&column("t.vendor_id", 0, false)));
        assert!(r.columns.contains(&column("v.name", 0, false)));
        assert!(r.columns.contains(&column("total", 0, true)));
    }

    #[test]
    fn only_bare_ordering_items_may_name_outputs() {
        let r = record(
            "SELECT category, COUNT(*) AS n FROM transactions GROUP BY category \
             HAVING MAX(amount) > 0 ORDER BY LOWER(category), n",
        )
        .unwrap();
        assert!(r.columns.contains(&column("category", 0, true)));
        assert!(r.columns.contains(&column("amount", 0, false)));
        assert!(r.columns.contains(&column("n", 0, true)));
        // LOWER(category) 里的 category 是嵌套表达式
        assert_eq!(
            r.columns.iter().filter(|c| **c == column("category", 0, false)).count(),
            2
        );
    }

    #[test]
    fn subqueries_open_child_scopes() {
        let r = record(
            "SELECT id FROM transactions WHERE vendor_id IN (SELECT id FROM vendors WHERE name = 'x')",
        )
        .unwrap();
        assert_eq!(r.scopes, vec![(0, None), (1, Some(0))]);
        assert_eq!(
            r.tables,
            vec![("transactions".to_string(), 0), ("vendors".to_string(), 1)]
        );
        assert!(r.columns.contains(&column("name", 1, false)));
        assert!(r.columns.contains(&column("vendor_id", 0, false)));
    }

    #[test]
    fn derived_tables_and_ctes_report_output_columns() {
        let r = record(
            "WITH m AS (SELECT category, SUM(amount) AS total FROM transactions GROUP BY category) \
             SELECT s.n FROM (SELECT COUNT(*) AS n, t.amount, CAST(amount AS INTEGER) FROM transactions t) s \
             JOIN m ON TRUE JOIN (SELECT * FROM vendors) v ON TRUE",
        )
        .unwrap();
        let strings = |v: &[&str]| Some(v.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(
            r.derived,
            vec![
                (Some("m".to_string()), strings(&["category", "total"])),
                (Some("s".to_string()), strings(&["n", "amount", "amount"])),
                (Some("v".to_string()), None),
            ]
        );
    }

    #[test]
    fn explicit_alias_columns_win() {
        let r = record("SELECT a FROM (SELECT amount FROM transactions) s (a)").unwrap();
        assert_eq!(r.derived, vec![(Some("s".to_string()), Some(vec!["a".to_string()]))]);
    }

    #[test]
    fn recursive_ctes_are_unsupported() {
        let err = record("WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r").err().unwrap();
        assert_eq!(err.code(), "unsupported_construct");
    }

    #[test]
    fn special_form_functions_are_named() {
        let r = record("SELECT EXTRACT(YEAR FROM transaction_date) FROM transactions").unwrap();
        assert_eq!(r.functions, vec!["extract"]);
    }

    #[test]
    fn set_operations_are_flagged() {
        let r = record("SELECT id FROM transactions UNION SELECT id FROM vendors").unwrap();
        assert_eq!(r.disallowed, vec!["UNION"]);
    }

    #[test]
    fn window_functions_are_unsupported() {
        let err = record("SELECT SUM(amount) OVER () FROM transactions").err().unwrap();
        assert_eq!(err.code(), "unsupported_construct");
    }

    #[test]
    fn substring_is_not_callable() {
        let err = record("SELECT SUBSTRING(category FROM 1 FOR 2) FROM transactions").err().unwrap();
        assert_eq!(err, RejectionReason::UnknownFunction("substring".to_string()));
    }
}
