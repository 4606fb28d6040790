//! Per-connection-name cache of table metadata.
//!
//! Introspecting every table is the most expensive metadata call this layer
//! makes, so results are cached per connection key. Each key has its own
//! async mutex: concurrent requests for the same key serialize and the
//! population runs once, while requests for different keys never wait on
//! each other.

use crate::db::handler::ConnectionHandler;
use crate::error::DbResult;
use crate::models::table::{ColumnRef, TableRef};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Table to columns map, as produced by the connection handler.
pub type TableMap = BTreeMap<TableRef, Vec<ColumnRef>>;

#[derive(Default)]
struct Entry {
    fetched_at: Option<Instant>,
    tables: TableMap,
}

impl Entry {
    fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        match (self.fetched_at, ttl) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(ttl)) => at.elapsed() < ttl,
        }
    }
}

/// Cache of `TableMap`s keyed by connection name.
pub struct MetadataCache {
    entries: RwLock<HashMap<String, Arc<Mutex<Entry>>>>,
    /// Entries older than this are re-populated; `None` disables staleness.
    ttl: Option<Duration>,
    only_ordinary_tables: bool,
}

impl MetadataCache {
    pub fn new(ttl: Option<Duration>, only_ordinary_tables: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            only_ordinary_tables,
        }
    }

    /// The cached table map for `key`, populating it through `handler` on
    /// first request or staleness. Same-key callers block on the entry
    /// lock, so the expensive introspection runs exactly once.
    pub async fn get(&self, key: &str, handler: &mut ConnectionHandler) -> DbResult<TableMap> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Entry::default())))
                .clone()
        };

        let mut guard = entry.lock().await;
        if guard.is_fresh(self.ttl) {
            debug!(key, "Metadata cache hit");
            return Ok(guard.tables.clone());
        }

        debug!(key, "Populating metadata cache");
        let tables = handler
            .describe_all_tables(|_, _| {}, true, self.only_ordinary_tables)
            .await?;
        guard.tables = tables.clone();
        guard.fetched_at = Some(Instant::now());
        Ok(tables)
    }

    /// Drop every cached entry unconditionally.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
        debug!("Metadata cache invalidated");
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("ttl", &self.ttl)
            .field("only_ordinary_tables", &self.only_ordinary_tables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn handler_with_table(name: &str) -> ConnectionHandler {
        let mut handler = ConnectionHandler::new();
        handler.connect("sqlite::memory:").await.unwrap();
        handler
            .execute(&format!("CREATE TABLE {} (a INTEGER)", name))
            .await
            .unwrap();
        handler
    }

    #[tokio::test]
    async fn test_second_get_serves_from_cache() {
        let cache = MetadataCache::new(None, true);
        let mut first = handler_with_table("from_first").await;
        let map = cache.get("conn", &mut first).await.unwrap();
        assert!(map.contains_key(&TableRef::new("from_first")));

        // A different handler with a different database: the cached map is
        // returned and no introspection runs against it.
        let mut second = handler_with_table("from_second").await;
        let cached = cache.get("conn", &mut second).await.unwrap();
        assert!(cached.contains_key(&TableRef::new("from_first")));
        assert!(!cached.contains_key(&TableRef::new("from_second")));
    }

    #[tokio::test]
    async fn test_racing_gets_on_one_key_populate_once() {
        let cache = MetadataCache::new(None, true);
        let mut first = handler_with_table("from_first").await;
        let mut second = handler_with_table("from_second").await;

        let (map_one, map_two) =
            tokio::join!(cache.get("conn", &mut first), cache.get("conn", &mut second));
        let map_one = map_one.unwrap();
        let map_two = map_two.unwrap();

        // Whichever caller won the entry lock populated the cache; the
        // other was handed the same map without introspecting its own
        // handler. Exactly one of the two databases is visible.
        assert_eq!(map_one, map_two);
        let saw_first = map_one.contains_key(&TableRef::new("from_first"));
        let saw_second = map_one.contains_key(&TableRef::new("from_second"));
        assert!(saw_first != saw_second);
    }

    #[tokio::test]
    async fn test_distinct_keys_populate_independently() {
        let cache = MetadataCache::new(None, true);
        let mut a = handler_with_table("alpha").await;
        let mut b = handler_with_table("beta").await;
        let map_a = cache.get("a", &mut a).await.unwrap();
        let map_b = cache.get("b", &mut b).await.unwrap();
        assert!(map_a.contains_key(&TableRef::new("alpha")));
        assert!(map_b.contains_key(&TableRef::new("beta")));
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_refetch() {
        let cache = MetadataCache::new(None, true);
        let mut handler = handler_with_table("t1").await;
        cache.get("conn", &mut handler).await.unwrap();

        handler.execute("CREATE TABLE t2 (a INTEGER)").await.unwrap();
        // Still the stale view.
        let stale = cache.get("conn", &mut handler).await.unwrap();
        assert!(!stale.contains_key(&TableRef::new("t2")));

        cache.invalidate_all().await;
        let fresh = cache.get("conn", &mut handler).await.unwrap();
        assert!(fresh.contains_key(&TableRef::new("t2")));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let cache = MetadataCache::new(Some(Duration::ZERO), true);
        let mut handler = handler_with_table("t1").await;
        cache.get("conn", &mut handler).await.unwrap();
        handler.execute("CREATE TABLE t2 (a INTEGER)").await.unwrap();
        let fresh = cache.get("conn", &mut handler).await.unwrap();
        assert!(fresh.contains_key(&TableRef::new("t2")));
    }
}
