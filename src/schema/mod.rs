//! Schema grounding for the SQL generator
//!
//! - `describe`: renders introspected structure into the text the model reads
//! - `cache`: memoizes that text for a fixed time-to-live

pub mod cache;
pub mod describe;

pub use cache::{SchemaCache, SchemaCacheEntry, SCHEMA_CACHE_TTL_SECS};
pub use describe::{render_schema_description, SchemaDescription};
