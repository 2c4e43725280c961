//! Warehouse SQL adapter.
//!
//! Executes model-generated SQL as-is against a read-only identity on the
//! data warehouse. The read-only grant is the safety boundary: this
//! adapter must never be pointed at a writable connection. History-store
//! statements elsewhere in the system are parameterized; model SQL is not,
//! and stays inside this scope.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row, TypeInfo};

use fm_domain::cancel::CancelToken;
use fm_domain::tool::{ToolFailure, ToolOutput, ToolSpec};

use crate::ToolAdapter;

/// Rows rendered into the text table handed to the model.
const TEXT_ROW_CAP: usize = 20;
/// Rows kept in the structured payload.
const STRUCT_ROW_CAP: usize = 200;
/// Cell width cap in the text table.
const CELL_WIDTH: usize = 40;

pub struct SqlTool {
    pool: PgPool,
    timeout: Duration,
}

impl SqlTool {
    pub fn new(pool: PgPool, timeout_secs: u64) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait::async_trait]
impl ToolAdapter for SqlTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "sql_query".into(),
            description: "Run a read-only SQL query against the business data warehouse. \
                          Returns the result rows as a table."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The SQL query to execute" }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: Value, cancel: CancelToken) -> Result<ToolOutput, ToolFailure> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .ok_or_else(|| ToolFailure::permanent("sql_query: 'query' must be a string"))?
            .to_string();

        let fetch = sqlx::query(&query).fetch_all(&self.pool);

        let rows = tokio::select! {
            result = tokio::time::timeout(self.timeout, fetch) => match result {
                Ok(Ok(rows)) => rows,
                Ok(Err(e)) => return Err(classify_sql_error(e)),
                Err(_) => {
                    return Err(ToolFailure::transient(format!(
                        "query timed out after {}s",
                        self.timeout.as_secs()
                    )));
                }
            },
            _ = wait_cancelled(&cancel) => {
                return Err(ToolFailure::transient("query cancelled"));
            }
        };

        // Zero rows is a successful result, not an error.
        if rows.is_empty() {
            return Ok(ToolOutput {
                text_summary: "query returned no rows".into(),
                structured: Some(serde_json::json!({"columns": [], "rows": []})),
                citations: Vec::new(),
                truncated: false,
            });
        }

        let columns: Vec<String> = rows[0]
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let decoded: Vec<Vec<Value>> = rows
            .iter()
            .take(STRUCT_ROW_CAP)
            .map(|row| (0..columns.len()).map(|i| decode_cell(row, i)).collect())
            .collect();

        let truncated = rows.len() > STRUCT_ROW_CAP;
        let text_summary = render_table(&columns, &decoded, rows.len());

        Ok(ToolOutput {
            text_summary,
            structured: Some(serde_json::json!({
                "columns": columns,
                "rows": decoded,
            })),
            citations: Vec::new(),
            truncated,
        })
    }
}

async fn wait_cancelled(cancel: &CancelToken) {
    while !cancel.is_cancelled() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Map a sqlx error to a concise, non-leaking failure.
fn classify_sql_error(e: sqlx::Error) -> ToolFailure {
    match e {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            // 42501 insufficient_privilege, 42601 syntax_error, 42P01
            // undefined_table — all permanent from the model's view.
            let message = format!("query failed: {}", db.message());
            tracing::warn!(code = %code, "warehouse query failed");
            ToolFailure::permanent(message)
        }
        sqlx::Error::PoolTimedOut => {
            ToolFailure::transient("warehouse connection pool is exhausted")
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            tracing::warn!(error = %e, "warehouse connection failure");
            ToolFailure::transient("warehouse connection failed")
        }
        other => {
            tracing::warn!(error = %other, "warehouse query failed");
            ToolFailure::permanent("query failed")
        }
    }
}

/// Decode one cell to JSON, by column type name. Types outside the common
/// warehouse set come back as null rather than failing the whole query.
fn decode_cell(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_info().name().to_string();
    match type_name.as_str() {
        "INT2" => opt_json(row.try_get::<Option<i16>, _>(idx).map(|v| v.map(Value::from))),
        "INT4" => opt_json(row.try_get::<Option<i32>, _>(idx).map(|v| v.map(Value::from))),
        "INT8" => opt_json(row.try_get::<Option<i64>, _>(idx).map(|v| v.map(Value::from))),
        "FLOAT4" => opt_json(
            row.try_get::<Option<f32>, _>(idx)
                .map(|v| v.map(|f| Value::from(f as f64))),
        ),
        "FLOAT8" => opt_json(row.try_get::<Option<f64>, _>(idx).map(|v| v.map(Value::from))),
        "NUMERIC" => opt_json(row.try_get::<Option<rust_decimal::Decimal>, _>(idx).map(|v| {
            v.map(|d| {
                d.to_f64()
                    .map(Value::from)
                    .unwrap_or_else(|| Value::String(d.to_string()))
            })
        })),
        "BOOL" => opt_json(row.try_get::<Option<bool>, _>(idx).map(|v| v.map(Value::from))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => opt_json(
            row.try_get::<Option<String>, _>(idx)
                .map(|v| v.map(Value::from)),
        ),
        "UUID" => opt_json(
            row.try_get::<Option<sqlx::types::Uuid>, _>(idx)
                .map(|v| v.map(|u| Value::String(u.to_string()))),
        ),
        "DATE" => opt_json(
            row.try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map(|v| v.map(|d| Value::String(d.to_string()))),
        ),
        "TIMESTAMP" => opt_json(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map(|v| v.map(|d| Value::String(d.to_string()))),
        ),
        "TIMESTAMPTZ" => opt_json(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map(|v| v.map(|d| Value::String(d.to_rfc3339()))),
        ),
        "JSON" | "JSONB" => opt_json(row.try_get::<Option<Value>, _>(idx)),
        _ => Value::Null,
    }
}

fn opt_json(result: Result<Option<Value>, sqlx::Error>) -> Value {
    result.ok().flatten().unwrap_or(Value::Null)
}

/// Render a bounded pipe-separated table for the model.
fn render_table(columns: &[String], rows: &[Vec<Value>], total_rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&columns.join(" | "));
    out.push('\n');

    for row in rows.iter().take(TEXT_ROW_CAP) {
        let cells: Vec<String> = row.iter().map(render_cell).collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }

    if total_rows > TEXT_ROW_CAP {
        out.push_str(&format!(
            "... ({total_rows} rows total, showing first {TEXT_ROW_CAP})\n"
        ));
    }
    out
}

fn render_cell(value: &Value) -> String {
    let rendered = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.len() > CELL_WIDTH {
        let mut end = CELL_WIDTH;
        while !rendered.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…", &rendered[..end])
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_table_small() {
        let columns = vec!["product".to_string(), "total".to_string()];
        let rows = vec![
            vec![Value::String("Mountain-200".into()), Value::from(1200)],
            vec![Value::String("Road-250".into()), Value::from(950)],
        ];
        let table = render_table(&columns, &rows, 2);
        assert!(table.starts_with("product | total"));
        assert!(table.contains("Mountain-200 | 1200"));
        assert!(!table.contains("rows total"));
    }

    #[test]
    fn render_table_marks_truncation() {
        let columns = vec!["n".to_string()];
        let rows: Vec<Vec<Value>> = (0..TEXT_ROW_CAP + 5)
            .map(|i| vec![Value::from(i as i64)])
            .collect();
        let table = render_table(&columns, &rows, 500);
        assert!(table.contains("500 rows total"));
    }

    #[test]
    fn render_cell_caps_width() {
        let long = Value::String("x".repeat(100));
        let rendered = render_cell(&long);
        assert!(rendered.len() <= CELL_WIDTH + '…'.len_utf8());
        assert!(rendered.ends_with('…'));
    }

    #[test]
    fn render_cell_null_is_empty() {
        assert_eq!(render_cell(&Value::Null), "");
    }
}
