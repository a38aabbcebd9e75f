//! Postgres implementation of `DatabaseStore`
//!
//! Every statement runs inside a `READ ONLY` transaction that is rolled back,
//! so neither the plan-only check nor real execution can leave changes behind.

use crate::db::store::{ColumnInfo, DatabaseStore, EnumInfo, ForeignKeyRef, SchemaInfo, TableInfo};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::json;
use sqlx::{Column, Executor, PgPool, Postgres, Row, Statement, Transaction};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

pub const SELECT_ONLY_MESSAGE: &str = "Only SELECT statements are allowed";

const COLUMNS_SQL: &str = r#"
    SELECT c.table_name::text AS table_name,
           c.column_name::text AS column_name,
           CASE WHEN c.data_type = 'USER-DEFINED' THEN c.udt_name::text ELSE c.data_type::text END AS data_type,
           (c.is_nullable = 'YES') AS nullable
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

const FOREIGN_KEYS_SQL: &str = r#"
    SELECT kcu.table_name::text AS table_name,
           kcu.column_name::text AS column_name,
           ccu.table_name::text AS foreign_table,
           ccu.column_name::text AS foreign_column
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage ccu
      ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = $1
"#;

const ENUMS_SQL: &str = r#"
    SELECT t.typname::text AS enum_name, e.enumlabel::text AS enum_value
    FROM pg_type t
    JOIN pg_enum e ON t.oid = e.enumtypid
    JOIN pg_namespace n ON n.oid = t.typnamespace
    WHERE n.nspname = $1
    ORDER BY t.typname, e.enumsortorder
"#;

pub struct PgStore {
    pool: PgPool,
    schema: String,
    statement_timeout: Duration,
}

/// One row of the column listing
#[derive(Debug, Clone)]
pub(crate) struct ColumnRow {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub nullable: bool,
}

/// One foreign-key edge
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyRow {
    pub table: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: String, statement_timeout: Duration) -> Self {
        Self {
            pool,
            schema,
            statement_timeout,
        }
    }

    async fn read_only_transaction(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        // SET cannot take bind parameters; the value is an integer we produced
        let timeout_sql = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&timeout_sql).execute(&mut *tx).await?;
        Ok(tx)
    }
}

#[async_trait]
impl DatabaseStore for PgStore {
    async fn describe_schema(&self) -> Result<SchemaInfo, StoreError> {
        let column_rows = sqlx::query(COLUMNS_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                Ok(ColumnRow {
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get("nullable")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let fk_rows = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                Ok(ForeignKeyRow {
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    foreign_table: row.try_get("foreign_table")?,
                    foreign_column: row.try_get("foreign_column")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let enum_rows = sqlx::query(ENUMS_SQL)
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("enum_name")?,
                    row.try_get::<String, _>("enum_value")?,
                ))
            })
            .collect::<Result<Vec<(String, String)>, sqlx::Error>>()?;

        debug!(
            columns = column_rows.len(),
            foreign_keys = fk_rows.len(),
            enum_labels = enum_rows.len(),
            "Introspected schema '{}'",
            self.schema
        );

        Ok(assemble_schema(column_rows, fk_rows, enum_rows))
    }

    async fn plan_only(&self, sql: &str) -> Result<serde_json::Value, StoreError> {
        let sql = strip_terminator(sql);
        let mut tx = self.read_only_transaction().await?;
        let explain = format!("EXPLAIN (FORMAT JSON) {}", sql);

        let plan = match sqlx::query_scalar::<_, serde_json::Value>(&explain)
            .fetch_one(&mut *tx)
            .await
        {
            Ok(plan) => plan,
            Err(sqlx::Error::Database(db)) => {
                let outcome = json!({ "ok": false, "message": db.message() });
                // The transaction is aborted by the planner error; rollback still succeeds
                tx.rollback().await?;
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };

        let names = output_column_names(&mut tx, sql).await?;
        let outcome = match duplicate_column_name(&names) {
            Some(name) => json!({ "ok": false, "message": duplicate_column_message(name) }),
            None => json!({ "ok": true, "plan": plan }),
        };

        tx.rollback().await?;
        Ok(outcome)
    }

    async fn execute_read_only(&self, sql: &str) -> Result<serde_json::Value, StoreError> {
        if !starts_with_select(sql) {
            return Err(StoreError::Rejected(SELECT_ONLY_MESSAGE.to_string()));
        }
        let sql = strip_terminator(sql);

        let mut tx = self.read_only_transaction().await?;

        // json_agg keeps every key but decoding keeps only the last of a repeated one
        let names = output_column_names(&mut tx, sql).await?;
        if let Some(name) = duplicate_column_name(&names) {
            tx.rollback().await?;
            return Err(StoreError::Query(duplicate_column_message(name)));
        }

        let wrapped = format!("SELECT COALESCE(json_agg(q), '[]'::json) FROM ({}) AS q", sql);
        let rows = sqlx::query_scalar::<_, serde_json::Value>(&wrapped)
            .fetch_one(&mut *tx)
            .await?;
        tx.rollback().await?;

        Ok(rows)
    }
}

/// Output column names of `sql` as Postgres describes the prepared statement.
async fn output_column_names(
    tx: &mut Transaction<'static, Postgres>,
    sql: &str,
) -> Result<Vec<String>, StoreError> {
    let statement = (&mut **tx).prepare(sql).await?;
    Ok(statement
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect())
}

/// First output name that appears more than once.
pub(crate) fn duplicate_column_name(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

fn duplicate_column_message(name: &str) -> String {
    format!(
        "duplicate output column name \"{}\"; give each column a distinct alias",
        name
    )
}

fn starts_with_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false)
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// Group flat introspection rows into tables, keeping column order.
pub(crate) fn assemble_schema(
    columns: Vec<ColumnRow>,
    foreign_keys: Vec<ForeignKeyRow>,
    enum_labels: Vec<(String, String)>,
) -> SchemaInfo {
    let fk_index: HashMap<(String, String), ForeignKeyRef> = foreign_keys
        .into_iter()
        .map(|fk| {
            (
                (fk.table, fk.column),
                ForeignKeyRef {
                    table: fk.foreign_table,
                    column: fk.foreign_column,
                },
            )
        })
        .collect();

    let mut tables: Vec<TableInfo> = Vec::new();
    for row in columns {
        let references = fk_index.get(&(row.table.clone(), row.column.clone())).cloned();
        let column = ColumnInfo {
            name: row.column,
            data_type: row.data_type,
            nullable: row.nullable,
            references,
        };
        match tables.last_mut() {
            Some(table) if table.name == row.table => table.columns.push(column),
            _ => tables.push(TableInfo {
                name: row.table,
                columns: vec![column],
            }),
        }
    }

    let mut enums: Vec<EnumInfo> = Vec::new();
    for (name, value) in enum_labels {
        match enums.last_mut() {
            Some(e) if e.name == name => e.values.push(value),
            _ => enums.push(EnumInfo {
                name,
                values: vec![value],
            }),
        }
    }

    SchemaInfo { tables, enums }
}
