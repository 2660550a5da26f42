use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Map, Value};
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column, Row, TypeInfo};
use std::collections::HashSet;
use uuid::Uuid;

/// 结果集的列名，按查询输出顺序；重名列依次改名为 `name_2`、`name_3`
pub fn pg_columns(row: &PgRow) -> Vec<String> {
    unique_column_names(row.columns().iter().map(|c| c.name()))
}

/// 生成的名字也不能和其它原始列名冲突，如 `id, id, id_2` -> `id, id_3, id_2`
pub fn unique_column_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let names: Vec<&str> = names.into_iter().collect();
    let originals: HashSet<&str> = names.iter().copied().collect();
    let mut taken = HashSet::new();
    let mut keys = Vec::with_capacity(names.len());
    for name in &names {
        let mut key = name.to_string();
        let mut n = 2;
        while taken.contains(&key) || (key != *name && originals.contains(key.as_str())) {
            key = format!("{}_{}", name, n);
            n += 1;
        }
        taken.insert(key.clone());
        keys.push(key);
    }
    keys
}

/// 一行结果转成 JSON 对象，`keys` 来自 [`pg_columns`]，与列一一对应
pub fn pg_row_to_json(row: &PgRow, keys: &[String]) -> Value {
    let values = row.columns().iter().map(|col| pg_value(row, col)).collect();
    row_object(keys, values)
}

pub fn row_object(keys: &[String], values: Vec<Value>) -> Value {
    let map: Map<String, Value> = keys.iter().cloned().zip(values).collect();
    Value::Object(map)
}

fn pg_value(row: &PgRow, col: &PgColumn) -> Value {
    let idx = col.ordinal();
    let type_name = col.type_info().name(); // 数据库原生类型名，如 "INT4", "NUMERIC"

    match type_name {
        "INT2" => json!(row.try_get::<Option<i16>, _>(idx).unwrap_or(None)),
        "INT4" => json!(row.try_get::<Option<i32>, _>(idx).unwrap_or(None)),
        "INT8" => json!(row.try_get::<Option<i64>, _>(idx).unwrap_or(None)),
        "FLOAT4" => json!(row.try_get::<Option<f32>, _>(idx).unwrap_or(None)),
        "FLOAT8" => json!(row.try_get::<Option<f64>, _>(idx).unwrap_or(None)),
        "NUMERIC" => {
            let v: Option<rust_decimal::Decimal> = row.try_get(idx).unwrap_or(None);
            // 金额统一输出为数字
            json!(v.and_then(|d| d.to_f64()))
        }
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            json!(row.try_get::<Option<String>, _>(idx).unwrap_or(None))
        }
        "BOOL" => json!(row.try_get::<Option<bool>, _>(idx).unwrap_or(None)),
        "UUID" => {
            let v: Option<Uuid> = row.try_get(idx).unwrap_or(None);
            json!(v.map(|u| u.to_string()))
        }
        "DATE" => {
            let v: Option<NaiveDate> = row.try_get(idx).unwrap_or(None);
            json!(v.map(|d| d.to_string()))
        }
        "TIME" => {
            let v: Option<NaiveTime> = row.try_get(idx).unwrap_or(None);
            json!(v.map(|t| t.to_string()))
        }
        "TIMESTAMP" => {
            let v: Option<NaiveDateTime> = row.try_get(idx).unwrap_or(None);
            json!(v.map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        }
        "TIMESTAMPTZ" => {
            let v: Option<DateTime<Utc>> = row.try_get(idx).unwrap_or(None);
            json!(v.map(|dt| dt.to_rfc3339()))
        }
        "JSON" | "JSONB" => {
            let v: Option<Value> = row.try_get(idx).unwrap_or(None);
            v.unwrap_or(Value::Null)
        }
        _ => {
            // 未知类型尝试按文本读取，失败则为 null
            let v: Option<String> = row.try_get_unchecked(idx).unwrap_or(None);
            json!(v)
        }
    }
}
