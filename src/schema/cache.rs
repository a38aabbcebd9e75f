//! Schema cache
//!
//! Holds at most one rendered description. The entry is replaced wholesale by
//! swapping an `Arc` under a short write lock; readers clone the `Arc` and never
//! see a partially built value. Two requests racing past an expired entry may
//! both refresh; the results are identical so the second swap is only wasted work.

use crate::clock::Clock;
use crate::db::store::DatabaseStore;
use crate::error::{AssistantError, Result};
use crate::schema::describe::{render_schema_description, SchemaDescription};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Entries younger than this are reused verbatim.
pub const SCHEMA_CACHE_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct SchemaCacheEntry {
    pub description: SchemaDescription,
    pub fetched_at: DateTime<Utc>,
}

pub struct SchemaCache {
    store: Arc<dyn DatabaseStore>,
    clock: Arc<dyn Clock>,
    extra_notes: Vec<String>,
    entry: RwLock<Option<Arc<SchemaCacheEntry>>>,
}

impl SchemaCache {
    pub fn new(store: Arc<dyn DatabaseStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            extra_notes: Vec::new(),
            entry: RwLock::new(None),
        }
    }

    /// Additional domain notes appended after the built-in ones
    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.extra_notes = notes;
        self
    }

    pub fn current_entry(&self) -> Option<Arc<SchemaCacheEntry>> {
        match self.entry.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace_entry(&self, next: Option<Arc<SchemaCacheEntry>>) {
        match self.entry.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Drop the cached entry so the next call rebuilds it
    pub fn invalidate(&self) {
        self.replace_entry(None);
    }

    fn is_fresh(&self, entry: &SchemaCacheEntry, now: DateTime<Utc>) -> bool {
        (now - entry.fetched_at).num_seconds() < SCHEMA_CACHE_TTL_SECS
    }

    /// Return the cached description, rebuilding it when absent or expired.
    ///
    /// If the rebuild fails, a stale entry is returned and kept; with no entry at
    /// all the failure surfaces as `SchemaUnavailable`.
    pub async fn get_schema_description(&self) -> Result<SchemaDescription> {
        let now = self.clock.now();
        let current = self.current_entry();

        if let Some(entry) = &current {
            if self.is_fresh(entry, now) {
                return Ok(entry.description.clone());
            }
        }

        match self.store.describe_schema().await {
            Ok(info) => {
                let description =
                    render_schema_description(&info, now.date_naive(), &self.extra_notes);
                info!(
                    tables = info.tables.len(),
                    enums = info.enums.len(),
                    chars = description.as_str().len(),
                    "Schema description refreshed"
                );
                self.replace_entry(Some(Arc::new(SchemaCacheEntry {
                    description: description.clone(),
                    fetched_at: now,
                })));
                Ok(description)
            }
            Err(e) => match current {
                Some(stale) => {
                    warn!(
                        error = %e,
                        fetched_at = %stale.fetched_at,
                        "Schema refresh failed, serving stale description"
                    );
                    Ok(stale.description.clone())
                }
                None => Err(AssistantError::SchemaUnavailable(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{ColumnInfo, SchemaInfo, TableInfo};
    use crate::error::StoreError;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl DatabaseStore for CountingStore {
        async fn describe_schema(&self) -> std::result::Result<SchemaInfo, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Connection("introspection down".into()));
            }
            Ok(SchemaInfo {
                tables: vec![TableInfo {
                    name: "students".into(),
                    columns: vec![ColumnInfo {
                        name: "id".into(),
                        data_type: "uuid".into(),
                        nullable: false,
                        references: None,
                    }],
                }],
                enums: vec![],
            })
        }

        async fn plan_only(
            &self,
            _sql: &str,
        ) -> std::result::Result<serde_json::Value, StoreError> {
            unreachable!("cache never plans")
        }

        async fn execute_read_only(
            &self,
            _sql: &str,
        ) -> std::result::Result<serde_json::Value, StoreError> {
            unreachable!("cache never executes")
        }
    }

    fn setup() -> (Arc<CountingStore>, Arc<ManualClock>, SchemaCache) {
        let store = Arc::new(CountingStore::default());
        let start = Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock(Mutex::new(start)));
        let cache = SchemaCache::new(store.clone(), clock.clone());
        (store, clock, cache)
    }

    #[tokio::test]
    async fn test_reuses_entry_within_ttl() {
        let (store, clock, cache) = setup();

        let first = cache.get_schema_description().await.unwrap();
        clock.advance(Duration::minutes(59));
        let second = cache.get_schema_description().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_once_after_expiry() {
        let (store, clock, cache) = setup();

        cache.get_schema_description().await.unwrap();
        clock.advance(Duration::hours(1));
        let refreshed = cache.get_schema_description().await.unwrap();
        cache.get_schema_description().await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert!(refreshed.as_str().contains("Current date: 2026-10-18"));
        assert_eq!(cache.current_entry().unwrap().fetched_at, clock.now());
    }

    #[tokio::test]
    async fn test_failure_without_entry_is_schema_unavailable() {
        let (store, _clock, cache) = setup();
        store.failing.store(true, Ordering::SeqCst);

        let err = cache.get_schema_description().await.unwrap_err();
        assert!(matches!(err, AssistantError::SchemaUnavailable(_)));
        assert!(cache.current_entry().is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_entry() {
        let (store, clock, cache) = setup();
        let original = cache.get_schema_description().await.unwrap();
        let original_fetched_at = cache.current_entry().unwrap().fetched_at;

        store.failing.store(true, Ordering::SeqCst);
        clock.advance(Duration::hours(2));
        let served = cache.get_schema_description().await.unwrap();

        assert_eq!(served, original);
        assert_eq!(cache.current_entry().unwrap().fetched_at, original_fetched_at);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let (store, _clock, cache) = setup();
        cache.get_schema_description().await.unwrap();
        cache.invalidate();
        cache.get_schema_description().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
