//! Store contract - the three read-only operations the assistant needs

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw structural description returned by introspection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub tables: Vec<TableInfo>,
    pub enums: Vec<EnumInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub references: Option<ForeignKeyRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
    pub name: String,
    pub values: Vec<String>,
}

#[async_trait]
pub trait DatabaseStore: Send + Sync {
    /// Tables, columns, types, foreign keys and enumerations.
    async fn describe_schema(&self) -> Result<SchemaInfo, StoreError>;

    /// Parse and plan `sql` without running it.
    ///
    /// Returns the store's JSON-shaped answer: `{"ok": true, ...}` for a clean
    /// plan, `{"ok": false, "message": "..."}` for a planner error. `Err` means
    /// the check itself could not be performed.
    async fn plan_only(&self, sql: &str) -> Result<serde_json::Value, StoreError>;

    /// Run a read-only query and return its rows as JSON values.
    ///
    /// Implementations must reject anything other than a SELECT statement
    /// themselves, regardless of what callers have checked.
    async fn execute_read_only(&self, sql: &str) -> Result<serde_json::Value, StoreError>;
}
