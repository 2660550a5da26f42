use crate::models::intent::QueryIntent;

/// 一条关键词规则：命中 `any_of` 任一词，且（若非空）命中 `requires_any` 任一词
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub any_of: &'static [&'static str],
    pub requires_any: &'static [&'static str],
    pub intent: QueryIntent,
}

impl Rule {
    fn matches(&self, text: &str) -> bool {
        self.any_of.iter().any(|w| text.contains(w))
            && (self.requires_any.is_empty() || self.requires_any.iter().any(|w| text.contains(w)))
    }
}

const TOTALS: &[&str] = &["total", "sum", "spend", "spent"];
const INCOME: &[&str] = &["income", "revenue", "earned"];
const MONTHLY: &[&str] = &["monthly", "month", "trend"];
const COUNTS: &[&str] = &["count", "number", "how many"];
const ANOMALY: &[&str] = &["anomal"];

/// 有序规则表，先命中者胜
pub const RULES: &[Rule] = &[
    // 合计 / 支出
    Rule { any_of: TOTALS, requires_any: INCOME, intent: QueryIntent::TotalIncome },
    Rule { any_of: TOTALS, requires_any: &[], intent: QueryIntent::TotalSpend },
    // 按月趋势
    Rule { any_of: MONTHLY, requires_any: &["income"], intent: QueryIntent::IncomeByMonth },
    Rule { any_of: MONTHLY, requires_any: &[], intent: QueryIntent::SpendByMonth },
    // 商户
    Rule { any_of: &["vendor", "merchant", "company"], requires_any: &[], intent: QueryIntent::TopVendors },
    // 分类
    Rule { any_of: &["category"], requires_any: &[], intent: QueryIntent::SpendByCategory },
    // 计数
    Rule { any_of: COUNTS, requires_any: ANOMALY, intent: QueryIntent::AnomaliesCount },
    Rule { any_of: COUNTS, requires_any: &[], intent: QueryIntent::TransactionCount },
    // 平均
    Rule { any_of: &["average"], requires_any: &[], intent: QueryIntent::AverageTransaction },
    // 最近
    Rule { any_of: &["recent", "latest", "last"], requires_any: &[], intent: QueryIntent::RecentTransactions },
    // 异常
    Rule { any_of: ANOMALY, requires_any: &["unresolved", "open", "pending"], intent: QueryIntent::UnresolvedAnomalies },
    Rule { any_of: ANOMALY, requires_any: &[], intent: QueryIntent::AnomaliesCount },
];

pub fn classify(question: &str) -> QueryIntent {
    classify_with(RULES, question)
}

/// 规则都未命中时兜底为最近交易
pub fn classify_with(rules: &[Rule], question: &str) -> QueryIntent {
    let text = question.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&text))
        .map(|rule| rule.intent)
        .unwrap_or(QueryIntent::RecentTransactions)
}
