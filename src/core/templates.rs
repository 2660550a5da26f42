use crate::models::intent::QueryIntent;
use crate::models::query::QueryParams;
use chrono::NaiveDate;

/// 参数化安全 SQL 模板。`{date_filter}` 恰好出现一次，`{limit}` 可选
#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub sql: &'static str,
    /// 日期过滤作用的列
    pub date_column: &'static str,
}

pub fn template_for(intent: QueryIntent) -> Option<Template> {
    let t = match intent {
        QueryIntent::TotalSpend => Template {
            sql: "SELECT SUM(amount) AS total FROM transactions WHERE amount < 0 AND {date_filter}",
            date_column: "transaction_date",
        },
        QueryIntent::TotalIncome => Template {
            sql: "SELECT SUM(amount) AS total FROM transactions WHERE amount > 0 AND {date_filter}",
            date_column: "transaction_date",
        },
        QueryIntent::SpendByMonth => Template {
            sql: "SELECT DATE_TRUNC('month', transaction_date) AS month, SUM(amount) AS total \
                  FROM transactions WHERE amount < 0 AND {date_filter} \
                  GROUP BY month ORDER BY month",
            date_column: "transaction_date",
        },
        QueryIntent::IncomeByMonth => Template {
            sql: "SELECT DATE_TRUNC('month', transaction_date) AS month, SUM(amount) AS total \
                  FROM transactions WHERE amount > 0 AND {date_filter} \
                  GROUP BY month ORDER BY month",
            date_column: "transaction_date",
        },
        QueryIntent::TopVendors => Template {
            sql: "SELECT v.name, SUM(t.amount) AS total \
                  FROM transactions t JOIN vendors v ON t.vendor_id = v.id \
                  WHERE t.amount < 0 AND {date_filter} \
                  GROUP BY v.id, v.name ORDER BY total ASC LIMIT {limit}",
            date_column: "t.transaction_date",
        },
        QueryIntent::SpendByCategory => Template {
            sql: "SELECT category, SUM(amount) AS total FROM transactions \
                  WHERE amount < 0 AND category IS NOT NULL AND {date_filter} \
                  GROUP BY category ORDER BY total ASC",
            date_column: "transaction_date",
        },
        QueryIntent::TransactionCount => Template {
            sql: "SELECT COUNT(*) AS count FROM transactions WHERE {date_filter}",
            date_column: "transaction_date",
        },
        QueryIntent::AverageTransaction => Template {
            sql: "SELECT AVG(amount) AS average FROM transactions WHERE {date_filter}",
            date_column: "transaction_date",
        },
        QueryIntent::RecentTransactions => Template {
            sql: "SELECT t.*, v.name AS vendor_name \
                  FROM transactions t LEFT JOIN vendors v ON t.vendor_id = v.id \
                  WHERE {date_filter} ORDER BY t.transaction_date DESC LIMIT {limit}",
            date_column: "t.transaction_date",
        },
        QueryIntent::AnomaliesCount => Template {
            sql: "SELECT COUNT(*) AS count FROM anomalies WHERE {date_filter}",
            date_column: "detected_at",
        },
        QueryIntent::UnresolvedAnomalies => Template {
            sql: "SELECT a.*, t.amount, v.name AS vendor_name \
                  FROM anomalies a JOIN transactions t ON a.transaction_id = t.id \
                  LEFT JOIN vendors v ON t.vendor_id = v.id \
                  WHERE a.resolved_at IS NULL AND {date_filter} \
                  ORDER BY a.detected_at DESC LIMIT {limit}",
            date_column: "a.detected_at",
        },
        QueryIntent::Custom => return None,
    };
    Some(t)
}

/// 只拼接格式化后的日期，从不拼接用户原文
pub fn date_filter(column: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> String {
    let mut parts = Vec::with_capacity(2);
    if let Some(d) = from {
        parts.push(format!("{} >= '{}'", column, d.format("%Y-%m-%d")));
    }
    if let Some(d) = to {
        parts.push(format!("{} <= '{}'", column, d.format("%Y-%m-%d")));
    }
    if parts.is_empty() {
        "1=1".to_string()
    } else {
        parts.join(" AND ")
    }
}

pub fn render(intent: QueryIntent, params: &QueryParams) -> Option<String> {
    let template = template_for(intent)?;
    let filter = date_filter(template.date_column, params.date_from, params.date_to);
    Some(
        template
            .sql
            .replace("{date_filter}", &filter)
            .replace("{limit}", &params.effective_limit().to_string()),
    )
}
