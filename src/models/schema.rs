use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// 表 -> 允许访问的列（有序）。启动时加载一次，运行期只读
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWhitelist {
    tables: BTreeMap<String, Vec<String>>,
}

impl SchemaWhitelist {
    pub fn new<T, C, S>(tables: T) -> Self
    where
        T: IntoIterator<Item = (S, C)>,
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tables = tables
            .into_iter()
            .map(|(table, cols)| {
                let mut seen = BTreeSet::new();
                let cols = cols
                    .into_iter()
                    .map(|c| c.as_ref().to_lowercase())
                    .filter(|c| seen.insert(c.clone()))
                    .collect();
                (table.as_ref().to_lowercase(), cols)
            })
            .collect();
        Self { tables }
    }

    /// 现金流业务库的默认白名单
    pub fn cashflow() -> Self {
        Self::new([
            (
                "transactions",
                vec![
                    "id",
                    "transaction_date",
                    "vendor_id",
                    "amount",
                    "category",
                    "normalized_description",
                    "raw_description",
                    "source",
                    "statement_id",
                    "created_at",
                    "updated_at",
                ],
            ),
            (
                "vendors",
                vec!["id", "name", "normalized_name", "embedding", "created_at", "updated_at"],
            ),
            (
                "statements",
                vec![
                    "id",
                    "source_file",
                    "period_start",
                    "period_end",
                    "account_type",
                    "processed_at",
                    "created_at",
                ],
            ),
            (
                "anomalies",
                vec![
                    "id",
                    "transaction_id",
                    "anomaly_type",
                    "severity",
                    "description",
                    "expected_value",
                    "actual_value",
                    "confidence",
                    "detected_at",
                    "resolved_at",
                    "notes",
                ],
            ),
        ])
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    pub fn table_has_column(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|cols| cols.iter().any(|c| c == column))
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables.iter().map(|(t, c)| (t.as_str(), c.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// 允许调用的 SQL 函数，大小写不敏感
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionWhitelist {
    names: BTreeSet<String>,
}

impl FunctionWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }

    /// 聚合 / 日期 / 字符串 / 数学 四类
    pub fn standard() -> Self {
        Self::new([
            "SUM", "COUNT", "AVG", "MIN", "MAX", "DATE_TRUNC", "EXTRACT", "UPPER", "LOWER",
            "LENGTH", "COALESCE", "ABS", "ROUND",
        ])
    }

    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// 白名单文件格式: {"tables": {"name": ["col", ...]}, "functions": [...]}
#[derive(Debug, Deserialize)]
struct WhitelistFile {
    tables: HashMap<String, Vec<String>>,
    #[serde(default)]
    functions: Option<Vec<String>>,
}

/// 从 JSON 文件加载白名单；未给出 functions 时沿用标准函数集
pub fn load_whitelists(path: &Path) -> anyhow::Result<(SchemaWhitelist, FunctionWhitelist)> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read whitelist file {}: {}", path.display(), e))?;
    parse_whitelists(&raw)
}

fn parse_whitelists(raw: &str) -> anyhow::Result<(SchemaWhitelist, FunctionWhitelist)> {
    let file: WhitelistFile = serde_json::from_str(raw)?;
    let schema = SchemaWhitelist::new(file.tables);
    if schema.is_empty() {
        anyhow::bail!("whitelist file declares no tables");
    }
    let functions = match file.functions {
        Some(names) => FunctionWhitelist::new(names),
        None => FunctionWhitelist::standard(),
    };
    Ok((schema, functions))
}
