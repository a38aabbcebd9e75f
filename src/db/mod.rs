//! Database module for the relational store the assistant queries
//!
//! The assistant only ever reads: schema introspection, plan-only checks and
//! read-only execution. `DatabaseStore` is the seam; `PgStore` is the Postgres
//! implementation.

pub mod connection;
pub mod postgres;
pub mod store;

pub use connection::init_pool;
pub use postgres::PgStore;
pub use store::{ColumnInfo, DatabaseStore, EnumInfo, ForeignKeyRef, SchemaInfo, TableInfo};
