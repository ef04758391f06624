//! SQLite-backed forecast cache.
//!
//! `SqliteWeatherStore` is the synchronous store. `WeatherCache` is the shared
//! async handle: it serializes access behind a mutex, runs queries on the
//! blocking pool and notifies subscribers after every mutation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{future, Stream, StreamExt};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::{CacheError, CacheResult};
use crate::record::WeatherRecord;

/// Keyed storage for cached forecasts.
///
/// Writes replace whole records; only `touch` updates a single column.
pub trait WeatherStore: Send {
    fn get(&self, name: &str) -> CacheResult<Option<WeatherRecord>>;

    /// Update `last_used_at`. Returns `false` when no record exists.
    fn touch(&self, name: &str, timestamp: i64) -> CacheResult<bool>;

    /// Insert or replace the record keyed by `record.name`.
    fn put(&self, record: &WeatherRecord) -> CacheResult<()>;

    /// All decodable records, most recently used first.
    fn list_by_last_used_desc(&self) -> CacheResult<Vec<WeatherRecord>>;

    /// Remove the record with the smallest `fetched_at`, returning its name.
    fn delete_oldest_by_fetch_time(&self) -> CacheResult<Option<String>>;

    fn clear(&self) -> CacheResult<()>;

    fn count(&self) -> CacheResult<usize>;
}

const SELECT_COLUMNS: &str = "name, location_country, location_state, lat, lon, fetched_at, \
     last_used_at, timezone, timezone_offset, current_json, hourly_json, daily_json";

pub struct SqliteWeatherStore {
    conn: Connection,
}

impl SqliteWeatherStore {
    /// Open (or create) the cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory cache.
    pub fn in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> CacheResult<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_data (
                name TEXT PRIMARY KEY,
                location_country TEXT NOT NULL,
                location_state TEXT,
                lat REAL NOT NULL,
                lon REAL NOT NULL,
                fetched_at INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL,
                timezone TEXT NOT NULL,
                timezone_offset INTEGER NOT NULL,
                current_json TEXT,
                hourly_json TEXT,
                daily_json TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_weather_last_used ON weather_data(last_used_at);
            CREATE INDEX IF NOT EXISTS idx_weather_fetched ON weather_data(fetched_at);
            "#,
        )?;
        Ok(())
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            name: row.get(0)?,
            country: row.get(1)?,
            state: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            fetched_at: row.get(5)?,
            last_used_at: row.get(6)?,
            timezone: row.get(7)?,
            timezone_offset: row.get(8)?,
            current_json: row.get(9)?,
            hourly_json: row.get(10)?,
            daily_json: row.get(11)?,
        })
    }
}

/// A row as stored, before the nested JSON columns are decoded.
struct RawRecord {
    name: String,
    country: String,
    state: Option<String>,
    latitude: f64,
    longitude: f64,
    fetched_at: i64,
    last_used_at: i64,
    timezone: String,
    timezone_offset: i32,
    current_json: Option<String>,
    hourly_json: Option<String>,
    daily_json: Option<String>,
}

impl RawRecord {
    fn decode(self) -> CacheResult<WeatherRecord> {
        let name = self.name;
        let corrupt = |source| CacheError::Corrupt {
            name: name.clone(),
            source,
        };

        let current = decode_column(self.current_json.as_deref()).map_err(&corrupt)?;
        let hourly = decode_column(self.hourly_json.as_deref()).map_err(&corrupt)?;
        let daily = decode_column(self.daily_json.as_deref()).map_err(&corrupt)?;

        Ok(WeatherRecord {
            name: name.clone(),
            country: self.country,
            state: self.state,
            latitude: self.latitude,
            longitude: self.longitude,
            fetched_at: self.fetched_at,
            last_used_at: self.last_used_at,
            timezone: self.timezone,
            timezone_offset: self.timezone_offset,
            current,
            hourly,
            daily,
        })
    }
}

fn decode_column<T: DeserializeOwned>(json: Option<&str>) -> Result<Option<T>, serde_json::Error> {
    json.map(serde_json::from_str).transpose()
}

fn encode_column<T: Serialize>(value: Option<&T>) -> CacheResult<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

impl WeatherStore for SqliteWeatherStore {
    fn get(&self, name: &str) -> CacheResult<Option<WeatherRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM weather_data WHERE name = ?1 LIMIT 1", SELECT_COLUMNS),
                params![name],
                Self::row_to_raw,
            )
            .optional()?;

        raw.map(RawRecord::decode).transpose()
    }

    fn touch(&self, name: &str, timestamp: i64) -> CacheResult<bool> {
        let updated = self.conn.execute(
            "UPDATE weather_data SET last_used_at = ?1 WHERE name = ?2",
            params![timestamp, name],
        )?;
        Ok(updated > 0)
    }

    fn put(&self, record: &WeatherRecord) -> CacheResult<()> {
        let current_json = encode_column(record.current.as_ref())?;
        let hourly_json = encode_column(record.hourly.as_ref())?;
        let daily_json = encode_column(record.daily.as_ref())?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO weather_data
            (name, location_country, location_state, lat, lon, fetched_at, last_used_at,
             timezone, timezone_offset, current_json, hourly_json, daily_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.name,
                record.country,
                record.state,
                record.latitude,
                record.longitude,
                record.fetched_at,
                record.last_used_at,
                record.timezone,
                record.timezone_offset,
                current_json,
                hourly_json,
                daily_json,
            ],
        )?;
        Ok(())
    }

    fn list_by_last_used_desc(&self) -> CacheResult<Vec<WeatherRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM weather_data ORDER BY last_used_at DESC",
            SELECT_COLUMNS
        ))?;

        let rows = stmt
            .query_map([], Self::row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .filter_map(|raw| match raw.decode() {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping cache entry: {}", e);
                    None
                }
            })
            .collect();
        Ok(records)
    }

    fn delete_oldest_by_fetch_time(&self) -> CacheResult<Option<String>> {
        let oldest: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM weather_data ORDER BY fetched_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(name) = &oldest {
            self.conn
                .execute("DELETE FROM weather_data WHERE name = ?1", params![name])?;
        }
        Ok(oldest)
    }

    fn clear(&self) -> CacheResult<()> {
        self.conn.execute("DELETE FROM weather_data", [])?;
        Ok(())
    }

    fn count(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM weather_data", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Marks a pending write as abandoned when the awaiting future goes away.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Shared async handle over a [`WeatherStore`].
#[derive(Clone)]
pub struct WeatherCache {
    store: Arc<Mutex<Box<dyn WeatherStore>>>,
    changes: Arc<watch::Sender<u64>>,
}

impl WeatherCache {
    pub fn new(store: impl WeatherStore + 'static) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
            changes: Arc::new(changes),
        }
    }

    /// Receiver that observes a new version after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    async fn run<T, F>(&self, op: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn WeatherStore) -> CacheResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store.lock();
            op(&**guard)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    /// Run a write on the blocking pool and bump the change version from the
    /// same closure, so subscribers hear about every write that lands.
    ///
    /// `op` returns the value and whether the store changed. If the caller is
    /// dropped before the write acquires the lock, the write is skipped.
    async fn mutate<T, F>(&self, op: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn WeatherStore) -> CacheResult<(T, bool)> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let changes = Arc::clone(&self.changes);
        let abandoned = Arc::new(AtomicBool::new(false));
        let _abandon_on_drop = AbandonOnDrop(Arc::clone(&abandoned));

        tokio::task::spawn_blocking(move || {
            let guard = store.lock();
            if abandoned.load(Ordering::SeqCst) {
                return Err(CacheError::Abandoned);
            }
            let (value, changed) = op(&**guard)?;
            if changed {
                changes.send_modify(|version| *version = version.wrapping_add(1));
            }
            Ok(value)
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))?
    }

    pub async fn get(&self, name: &str) -> CacheResult<Option<WeatherRecord>> {
        let name = name.to_string();
        self.run(move |store| store.get(&name)).await
    }

    pub async fn touch(&self, name: &str, timestamp: i64) -> CacheResult<bool> {
        let name = name.to_string();
        self.mutate(move |store| {
            let updated = store.touch(&name, timestamp)?;
            Ok((updated, updated))
        })
        .await
    }

    pub async fn put(&self, record: WeatherRecord) -> CacheResult<()> {
        self.mutate(move |store| store.put(&record).map(|()| ((), true)))
            .await
    }

    pub async fn list_by_last_used_desc(&self) -> CacheResult<Vec<WeatherRecord>> {
        self.run(|store| store.list_by_last_used_desc()).await
    }

    pub async fn delete_oldest_by_fetch_time(&self) -> CacheResult<Option<String>> {
        self.mutate(|store| {
            let evicted = store.delete_oldest_by_fetch_time()?;
            let changed = evicted.is_some();
            Ok((evicted, changed))
        })
        .await
    }

    pub async fn clear(&self) -> CacheResult<()> {
        self.mutate(|store| store.clear().map(|()| ((), true))).await
    }

    pub async fn count(&self) -> CacheResult<usize> {
        self.run(|store| store.count()).await
    }

    /// Live view of the whole cache, most recently used first.
    ///
    /// Yields the current contents immediately, then again after each
    /// mutation. Mutations that land before the next query are folded into a
    /// single emission. A failed query is logged and skipped.
    pub fn watch_all(&self) -> impl Stream<Item = Vec<WeatherRecord>> + Send + 'static {
        let rx = self.subscribe();
        futures::stream::unfold(
            (self.clone(), rx, true),
            |(cache, mut rx, first)| async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                rx.borrow_and_update();

                let listing = match cache.list_by_last_used_desc().await {
                    Ok(records) => Some(records),
                    Err(e) => {
                        tracing::warn!("Failed to list cached weather: {}", e);
                        None
                    }
                };
                Some((listing, (cache, rx, false)))
            },
        )
        .filter_map(future::ready)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::record::fixtures;
    use std::time::Duration;

    fn names(records: &[WeatherRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_put_and_get() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        let record = fixtures::record("Taipei", 100, 100);

        store.put(&record).unwrap();
        let retrieved = store.get("Taipei").unwrap().unwrap();

        assert_eq!(retrieved, record);
    }

    #[test]
    fn test_get_missing() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        assert!(store.get("Nowhere").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_whole_record() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 100, 100)).unwrap();

        let mut replacement = fixtures::record("Taipei", 500, 500);
        replacement.hourly = None;
        replacement.timezone = "UTC".into();
        store.put(&replacement).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("Taipei").unwrap().unwrap(), replacement);
    }

    #[test]
    fn test_touch_updates_last_used_only() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 100, 100)).unwrap();

        assert!(store.touch("Taipei", 900).unwrap());
        let record = store.get("Taipei").unwrap().unwrap();
        assert_eq!(record.last_used_at, 900);
        assert_eq!(record.fetched_at, 100);

        assert!(!store.touch("Nowhere", 900).unwrap());
    }

    #[test]
    fn test_list_ordered_by_last_used_desc() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 0, 100)).unwrap();
        store.put(&fixtures::record("London", 0, 200)).unwrap();
        store.put(&fixtures::record("Lima", 0, 150)).unwrap();

        let records = store.list_by_last_used_desc().unwrap();
        assert_eq!(names(&records), vec!["London", "Lima", "Taipei"]);
    }

    #[test]
    fn test_delete_oldest_by_fetch_time() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 300, 0)).unwrap();
        store.put(&fixtures::record("London", 100, 999)).unwrap();
        store.put(&fixtures::record("Lima", 200, 0)).unwrap();

        assert_eq!(store.delete_oldest_by_fetch_time().unwrap().as_deref(), Some("London"));
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.get("London").unwrap().is_none());
    }

    #[test]
    fn test_delete_oldest_on_empty_store() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        assert_eq!(store.delete_oldest_by_fetch_time().unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 0, 0)).unwrap();
        store.put(&fixtures::record("London", 0, 0)).unwrap();

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_json_is_reported_and_skipped_in_listing() {
        let store = SqliteWeatherStore::in_memory().unwrap();
        store.put(&fixtures::record("Taipei", 0, 100)).unwrap();
        store.put(&fixtures::record("London", 0, 200)).unwrap();
        store
            .conn
            .execute(
                "UPDATE weather_data SET hourly_json = '{not json' WHERE name = 'London'",
                [],
            )
            .unwrap();

        assert!(matches!(store.get("London"), Err(CacheError::Corrupt { .. })));
        let records = store.list_by_last_used_desc().unwrap();
        assert_eq!(names(&records), vec!["Taipei"]);
    }

    #[test]
    fn test_open_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather_cache.db");

        {
            let store = SqliteWeatherStore::open(&path).unwrap();
            store.put(&fixtures::record("Taipei", 1, 2)).unwrap();
        }

        let reopened = SqliteWeatherStore::open(&path).unwrap();
        assert!(reopened.get("Taipei").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_watch_all_emits_initial_listing_and_changes() {
        let cache = WeatherCache::new(SqliteWeatherStore::in_memory().unwrap());
        cache.put(fixtures::record("Taipei", 0, 100)).await.unwrap();
        cache.put(fixtures::record("London", 0, 200)).await.unwrap();

        let mut stream = Box::pin(cache.watch_all());
        let first = stream.next().await.unwrap();
        assert_eq!(names(&first), vec!["London", "Taipei"]);

        cache.touch("Taipei", 300).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(names(&second), vec!["Taipei", "London"]);

        cache.clear().await.unwrap();
        let third = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_touch_of_missing_record_does_not_notify() {
        let cache = WeatherCache::new(SqliteWeatherStore::in_memory().unwrap());
        let rx = cache.subscribe();

        assert!(!cache.touch("Nowhere", 1).await.unwrap());
        assert!(!rx.has_changed().unwrap());

        cache.put(fixtures::record("Taipei", 0, 0)).await.unwrap();
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_eviction_notifies_only_when_a_row_is_removed() {
        let cache = WeatherCache::new(SqliteWeatherStore::in_memory().unwrap());
        let mut rx = cache.subscribe();

        assert_eq!(cache.delete_oldest_by_fetch_time().await.unwrap(), None);
        assert!(!rx.has_changed().unwrap());

        cache.put(fixtures::record("Taipei", 10, 10)).await.unwrap();
        rx.borrow_and_update();

        assert_eq!(
            cache.delete_oldest_by_fetch_time().await.unwrap().as_deref(),
            Some("Taipei")
        );
        assert!(rx.has_changed().unwrap());
    }

    /// Sleeps inside `put` while holding the cache lock.
    struct SlowWriteStore {
        inner: SqliteWeatherStore,
        delay: Duration,
    }

    impl SlowWriteStore {
        fn new(delay: Duration) -> Self {
            Self {
                inner: SqliteWeatherStore::in_memory().unwrap(),
                delay,
            }
        }
    }

    impl WeatherStore for SlowWriteStore {
        fn get(&self, name: &str) -> CacheResult<Option<WeatherRecord>> {
            self.inner.get(name)
        }

        fn touch(&self, name: &str, timestamp: i64) -> CacheResult<bool> {
            self.inner.touch(name, timestamp)
        }

        fn put(&self, record: &WeatherRecord) -> CacheResult<()> {
            std::thread::sleep(self.delay);
            self.inner.put(record)
        }

        fn list_by_last_used_desc(&self) -> CacheResult<Vec<WeatherRecord>> {
            self.inner.list_by_last_used_desc()
        }

        fn delete_oldest_by_fetch_time(&self) -> CacheResult<Option<String>> {
            self.inner.delete_oldest_by_fetch_time()
        }

        fn clear(&self) -> CacheResult<()> {
            self.inner.clear()
        }

        fn count(&self) -> CacheResult<usize> {
            self.inner.count()
        }
    }

    #[tokio::test]
    async fn test_write_dropped_mid_flight_still_notifies() {
        let cache = WeatherCache::new(SlowWriteStore::new(Duration::from_millis(300)));
        let mut rx = cache.subscribe();

        let pending = tokio::time::timeout(
            Duration::from_millis(100),
            cache.put(fixtures::record("Taipei", 0, 0)),
        )
        .await;
        assert!(pending.is_err(), "write should still be running");

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("subscribers must hear about the write")
            .unwrap();
        assert!(cache.get("Taipei").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_dropped_before_it_starts_is_skipped() {
        let cache = WeatherCache::new(SlowWriteStore::new(Duration::from_millis(300)));

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.put(fixtures::record("Osaka", 0, 0)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Queued behind the first write, then dropped.
        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            cache.put(fixtures::record("Taipei", 0, 0)),
        )
        .await;
        assert!(pending.is_err());

        first.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(cache.get("Osaka").await.unwrap().is_some());
        assert!(cache.get("Taipei").await.unwrap().is_none());
        assert_eq!(cache.count().await.unwrap(), 1);
    }
}
