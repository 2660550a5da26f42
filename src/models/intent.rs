use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    TotalSpend,
    TotalIncome,
    SpendByMonth,
    IncomeByMonth,
    TopVendors,
    SpendByCategory,
    TransactionCount,
    AverageTransaction,
    RecentTransactions,
    AnomaliesCount,
    UnresolvedAnomalies,
    /// 无模板，交给 LLM 生成
    Custom,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 12] = [
        Self::TotalSpend,
        Self::TotalIncome,
        Self::SpendByMonth,
        Self::IncomeByMonth,
        Self::TopVendors,
        Self::SpendByCategory,
        Self::TransactionCount,
        Self::AverageTransaction,
        Self::RecentTransactions,
        Self::AnomaliesCount,
        Self::UnresolvedAnomalies,
        Self::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TotalSpend => "total_spend",
            Self::TotalIncome => "total_income",
            Self::SpendByMonth => "spend_by_month",
            Self::IncomeByMonth => "income_by_month",
            Self::TopVendors => "top_vendors",
            Self::SpendByCategory => "spend_by_category",
            Self::TransactionCount => "transaction_count",
            Self::AverageTransaction => "average_transaction",
            Self::RecentTransactions => "recent_transactions",
            Self::AnomaliesCount => "anomalies_count",
            Self::UnresolvedAnomalies => "unresolved_anomalies",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_name_matches_as_str() {
        for intent in QueryIntent::ALL {
            let json = serde_json::to_string(&intent).unwrap();
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
        }
    }
}
