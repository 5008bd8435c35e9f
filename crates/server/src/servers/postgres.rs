//! PostgreSQL query tool.

use super::{markdown, non_empty};
use crate::config::{database_url, env_var, PostgresConfig};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use toolhouse_core::{Mapping, ToolError, ToolResult, Value};
use toolhouse_mcp::protocol::{CallToolResult, ToolSchema};
use toolhouse_mcp::tools::{
    json_schema_object, json_schema_string, parse_arguments, tool_schema, Tool, ToolRegistry,
};
use tracing::{info, warn};

const SERVICE: &str = "PostgreSQL";
const LOGGED_QUERY_CHARS: usize = 100;

/// Whether `query` reads rows: its first keyword is `SELECT`.
pub fn is_select_query(query: &str) -> bool {
    query.trim().to_lowercase().starts_with("select")
}

fn database_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn upstream(err: sqlx::Error) -> ToolError {
    ToolError::upstream(SERVICE, database_message(&err))
}

fn preview(query: &str) -> String {
    if query.chars().count() > LOGGED_QUERY_CHARS {
        format!("{}...", query.chars().take(LOGGED_QUERY_CHARS).collect::<String>())
    } else {
        query.to_string()
    }
}

/// Decode one column of `row` by its PostgreSQL type name.
fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(|d| d.to_string())
            .into(),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            row.try_get::<Option<String>, _>(index)?.into()
        }
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map_or(Value::Empty, Value::from),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|u| u.to_string())
            .into(),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|d| d.to_string())
            .into(),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|t| t.to_string())
            .into(),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|t| t.to_string())
            .into(),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|t| t.to_rfc3339())
            .into(),
        other => Value::text(format!("<unsupported type {}>", other)),
    };
    Ok(value)
}

/// Convert a row to a mapping keyed by column name, in column order.
pub fn row_to_mapping(row: &PgRow) -> Mapping {
    let mut mapping = Mapping::new();
    for (index, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let value = decode_column(row, index, type_name).unwrap_or_else(|e| {
            warn!(column = column.name(), type_name, error = %e, "Failed to decode column");
            Value::text(format!("<unsupported type {}>", type_name))
        });
        mapping.insert(column.name(), value);
    }
    mapping
}

/// Outcome of a statement run through [`Database::execute_sql`].
#[derive(Debug)]
pub enum QueryOutcome {
    Rows(Vec<Mapping>),
    Affected(u64),
}

/// One connection per process so session state (`SET`, temporary tables)
/// carries over from one call to the next.
pub struct Database {
    conn: Mutex<PgConnection>,
}

impl Database {
    pub fn from_connection(conn: PgConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub async fn connect(config: &PostgresConfig) -> anyhow::Result<Self> {
        let url = database_url(env_var)?;
        let timeout = Duration::from_secs(config.connect_timeout_secs);

        let mut conn = tokio::time::timeout(timeout, PgConnection::connect(&url))
            .await
            .context("Timed out connecting to PostgreSQL")?
            .context("Failed to connect to PostgreSQL")?;

        sqlx::raw_sql("SELECT 1")
            .execute(&mut conn)
            .await
            .context("PostgreSQL connectivity check failed")?;

        info!("Connected to PostgreSQL");

        Ok(Self::from_connection(conn))
    }

    /// Dry-run `query` in a transaction that is always rolled back.
    async fn validate(conn: &mut PgConnection, query: &str) -> ToolResult<()> {
        let mut tx = conn.begin().await.map_err(upstream)?;
        let outcome = (&mut *tx).execute(sqlx::raw_sql(query)).await;
        tx.rollback().await.map_err(upstream)?;

        outcome
            .map(|_| ())
            .map_err(|e| ToolError::invalid_input(database_message(&e)))
    }

    /// Statements other than SELECT go through the simple query protocol, so
    /// `;`-separated scripts are accepted.
    pub async fn execute_sql(&self, query: &str) -> ToolResult<QueryOutcome> {
        let mut conn = self.conn.lock().await;

        info!(query = %preview(query), "Validating SQL query");
        Self::validate(&mut conn, query).await?;

        if is_select_query(query) {
            let rows = sqlx::query(query)
                .fetch_all(&mut *conn)
                .await
                .map_err(upstream)?;
            info!(records = rows.len(), "SELECT query returned records");
            return Ok(QueryOutcome::Rows(rows.iter().map(row_to_mapping).collect()));
        }

        let mut tx = conn.begin().await.map_err(upstream)?;
        let result = (&mut *tx)
            .execute(sqlx::raw_sql(query))
            .await
            .map_err(upstream)?;
        tx.commit().await.map_err(upstream)?;

        info!(rows_affected = result.rows_affected(), "Statement executed");
        Ok(QueryOutcome::Affected(result.rows_affected()))
    }
}

/// Tool that runs a single SQL statement
pub struct ExecuteSqlTool {
    db: Arc<Database>,
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlArgs {
    query: String,
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn schema(&self) -> ToolSchema {
        tool_schema(
            "execute_sql",
            "Execute PostgreSQL Query",
            "Validate and execute a PostgreSQL statement. SELECT statements return \
             their rows; other statements are committed and report the affected row count.",
            false,
            json_schema_object(
                serde_json::json!({"query": json_schema_string("PostgreSQL statement to execute")}),
                vec!["query"],
            ),
        )
    }

    async fn execute(&self, arguments: serde_json::Value) -> ToolResult<CallToolResult> {
        let args: ExecuteSqlArgs = parse_arguments("execute_sql", arguments)?;
        let query = non_empty(&args.query, "Query")?;

        match self.db.execute_sql(query).await? {
            QueryOutcome::Rows(rows) if rows.is_empty() => {
                Ok(CallToolResult::text("No records found"))
            }
            QueryOutcome::Rows(rows) => markdown(&Mapping::new().with("records", rows), &[]),
            QueryOutcome::Affected(n) => Ok(CallToolResult::text(format!(
                "Query executed successfully: {} row(s) affected",
                n
            ))),
        }
    }
}

pub fn registry(db: Arc<Database>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ExecuteSqlTool { db }));
    registry
}
