//! The request log holds one immutable `(user, request_time)` record per
//! admitted request. Records are only ever inserted or bulk-deleted.

use std::collections::HashMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edue_core::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Bumped whenever the key layout changes.
const SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"schema_version";
const RECORDS_TREE: &str = "rate_limits";
const META_TREE: &str = "meta";

/// Request log errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record with the same user and timestamp already exists.
    #[error("Duplicate request record for {user} at {request_time}")]
    Duplicate {
        /// User of the conflicting record.
        user: UserId,
        /// Timestamp of the conflicting record.
        request_time: f64,
    },

    /// Timestamp is negative or not finite.
    #[error("Invalid request timestamp: {0}")]
    InvalidTimestamp(f64),

    /// On-disk layout was written by an incompatible version.
    #[error("Schema version mismatch: found {found}, expected {expected}")]
    Schema {
        /// Version found on disk.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// Backend is not reachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One admitted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Who made the request.
    pub user: UserId,
    /// Seconds since the Unix epoch.
    pub request_time: f64,
}

impl RequestRecord {
    /// Create a new record.
    #[must_use]
    pub const fn new(user: UserId, request_time: f64) -> Self {
        Self { user, request_time }
    }

    /// Timestamp as a calendar time.
    #[must_use]
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.request_time)
    }
}

/// Convert epoch seconds to a calendar time.
#[must_use]
pub fn to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let micros = (secs * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
}

/// Durable storage for request records.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Create or verify the storage layout. Idempotent.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Timestamps for `user` strictly newer than `after`, oldest first.
    async fn load_since(&self, user: &UserId, after: f64) -> Result<Vec<f64>, StoreError>;

    /// Append a record.
    async fn insert(&self, record: &RequestRecord) -> Result<(), StoreError>;

    /// Delete records for `user` at or before `cutoff`. Returns how many were removed.
    async fn delete_through(&self, user: &UserId, cutoff: f64) -> Result<usize, StoreError>;

    /// Delete every record for `user`. Returns how many were removed.
    async fn delete_user(&self, user: &UserId) -> Result<usize, StoreError>;
}

fn check_timestamp(request_time: f64) -> Result<(), StoreError> {
    if request_time.is_finite() && request_time >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidTimestamp(request_time))
    }
}

/// Length-prefixed user identity; no user's prefix is a prefix of another's.
fn user_prefix(user: &UserId) -> Vec<u8> {
    let id = user.as_ref().as_bytes();
    let len = u32::try_from(id.len()).unwrap_or(u32::MAX);
    let mut key = Vec::with_capacity(4 + id.len() + 8);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(id);
    key
}

/// Prefix followed by the timestamp bits, so keys sort by time within a user.
fn record_key(user: &UserId, request_time: f64) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(&request_time.to_bits().to_be_bytes());
    key
}

fn prefix_end(user: &UserId) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(&[0xFF; 8]);
    key
}

/// Request log backed by sled.
pub struct SledStore {
    db: sled::Db,
    records: sled::Tree,
    meta: sled::Tree,
}

impl SledStore {
    /// Open or create a store at `path`, creating missing parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// Use an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if the trees cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let records = db.open_tree(RECORDS_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        Ok(Self { db, records, meta })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub const fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Total number of records across all users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flush all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns error if flush fails.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn remove_range(
        &self,
        range: (Bound<Vec<u8>>, Bound<Vec<u8>>),
    ) -> Result<usize, StoreError> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;

        for result in self.records.range(range) {
            let (key, _) = result?;
            batch.remove(key);
            removed += 1;
        }

        if removed > 0 {
            self.records.apply_batch(batch)?;
        }
        Ok(removed)
    }
}

#[async_trait]
impl RequestStore for SledStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let current = SCHEMA_VERSION.to_be_bytes();
        match self
            .meta
            .compare_and_swap(SCHEMA_KEY, None as Option<&[u8]>, Some(&current[..]))?
        {
            Ok(()) => {
                self.meta.flush()?;
                tracing::info!(version = SCHEMA_VERSION, "Initialized rate limit store");
                Ok(())
            }
            Err(existing) => {
                let found = existing
                    .current
                    .as_deref()
                    .and_then(|v| <[u8; 4]>::try_from(v).ok())
                    .map_or(0, u32::from_be_bytes);
                if found == SCHEMA_VERSION {
                    Ok(())
                } else {
                    Err(StoreError::Schema {
                        found,
                        expected: SCHEMA_VERSION,
                    })
                }
            }
        }
    }

    async fn load_since(&self, user: &UserId, after: f64) -> Result<Vec<f64>, StoreError> {
        // Stored times are never negative; a negative bound means "everything".
        let start = if after < 0.0 {
            Bound::Included(user_prefix(user))
        } else {
            Bound::Excluded(record_key(user, after))
        };

        let mut times = Vec::new();
        for result in self.records.range((start, Bound::Included(prefix_end(user)))) {
            let (_, value) = result?;
            let record: RequestRecord = serde_json::from_slice(&value)?;
            times.push(record.request_time);
        }
        Ok(times)
    }

    async fn insert(&self, record: &RequestRecord) -> Result<(), StoreError> {
        check_timestamp(record.request_time)?;

        let key = record_key(&record.user, record.request_time);
        let value = serde_json::to_vec(record)?;

        if self
            .records
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Err(StoreError::Duplicate {
                user: record.user.clone(),
                request_time: record.request_time,
            });
        }

        self.records.flush()?;
        Ok(())
    }

    async fn delete_through(&self, user: &UserId, cutoff: f64) -> Result<usize, StoreError> {
        if cutoff < 0.0 {
            return Ok(0);
        }
        let removed = self.remove_range((
            Bound::Included(user_prefix(user)),
            Bound::Included(record_key(user, cutoff)),
        ))?;
        if removed > 0 {
            self.records.flush()?;
        }
        Ok(removed)
    }

    async fn delete_user(&self, user: &UserId) -> Result<usize, StoreError> {
        let removed = self.remove_range((
            Bound::Included(user_prefix(user)),
            Bound::Included(prefix_end(user)),
        ))?;
        self.records.flush()?;
        Ok(removed)
    }
}

/// In-memory request log.
///
/// Nothing survives the process. Reads and writes can be made to fail
/// independently to rehearse storage outages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<UserId, Vec<f64>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Make every write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Number of records held for `user`.
    pub async fn count(&self, user: &UserId) -> usize {
        self.records.lock().await.get(user).map_or(0, Vec::len)
    }

    fn read_guard(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::Acquire) {
            Err(StoreError::Unavailable("reads disabled".to_string()))
        } else {
            Ok(())
        }
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Acquire) {
            Err(StoreError::Unavailable("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_since(&self, user: &UserId, after: f64) -> Result<Vec<f64>, StoreError> {
        self.read_guard()?;
        let records = self.records.lock().await;
        Ok(records
            .get(user)
            .map(|times| times.iter().copied().filter(|t| *t > after).collect())
            .unwrap_or_default())
    }

    async fn insert(&self, record: &RequestRecord) -> Result<(), StoreError> {
        self.write_guard()?;
        check_timestamp(record.request_time)?;

        let mut records = self.records.lock().await;
        let times = records.entry(record.user.clone()).or_default();
        let pos = times.partition_point(|t| *t < record.request_time);
        if times.get(pos).is_some_and(|t| t.total_cmp(&record.request_time).is_eq()) {
            return Err(StoreError::Duplicate {
                user: record.user.clone(),
                request_time: record.request_time,
            });
        }
        times.insert(pos, record.request_time);
        Ok(())
    }

    async fn delete_through(&self, user: &UserId, cutoff: f64) -> Result<usize, StoreError> {
        self.write_guard()?;
        let mut records = self.records.lock().await;
        let Some(times) = records.get_mut(user) else {
            return Ok(0);
        };
        let before = times.len();
        times.retain(|t| *t > cutoff);
        let removed = before - times.len();
        if times.is_empty() {
            records.remove(user);
        }
        Ok(removed)
    }

    async fn delete_user(&self, user: &UserId) -> Result<usize, StoreError> {
        self.write_guard()?;
        let mut records = self.records.lock().await;
        Ok(records.remove(user).map_or(0, |times| times.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, SledStore) {
        let temp = tempdir().unwrap();
        let store = SledStore::open(&temp.path().join("db")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state").join("nested").join("rate_limits");

        let store = SledStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let (_temp, store) = open_store();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_schema_mismatch() {
        let (_temp, store) = open_store();
        store
            .meta
            .insert(SCHEMA_KEY, &99u32.to_be_bytes()[..])
            .unwrap();

        let result = store.ensure_schema().await;
        assert!(matches!(
            result,
            Err(StoreError::Schema { found: 99, expected: 1 })
        ));
    }

    #[tokio::test]
    async fn test_load_since_is_ordered_and_exclusive() {
        let (_temp, store) = open_store();
        let user = UserId::new("42");

        for t in [300.5, 100.0, 200.25, 1_000.0] {
            store.insert(&RequestRecord::new(user.clone(), t)).await.unwrap();
        }

        assert_eq!(store.load_since(&user, 100.0).await.unwrap(), vec![200.25, 300.5, 1_000.0]);
        assert_eq!(store.load_since(&user, -1.0).await.unwrap().len(), 4);
        assert!(store.load_since(&user, 1_000.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_users_do_not_share_prefixes() {
        let (_temp, store) = open_store();
        let short = UserId::new("1");
        let long = UserId::new("12");

        store.insert(&RequestRecord::new(short.clone(), 10.0)).await.unwrap();
        store.insert(&RequestRecord::new(long.clone(), 20.0)).await.unwrap();

        assert_eq!(store.load_since(&short, 0.0).await.unwrap(), vec![10.0]);
        assert_eq!(store.load_since(&long, 0.0).await.unwrap(), vec![20.0]);

        assert_eq!(store.delete_user(&short).await.unwrap(), 1);
        assert_eq!(store.load_since(&long, 0.0).await.unwrap(), vec![20.0]);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let (_temp, store) = open_store();
        let record = RequestRecord::new(UserId::new("7"), 55.5);

        store.insert(&record).await.unwrap();
        let result = store.insert(&record).await;

        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_timestamp_rejected() {
        let (_temp, store) = open_store();
        let user = UserId::new("7");

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let result = store.insert(&RequestRecord::new(user.clone(), bad)).await;
            assert!(matches!(result, Err(StoreError::InvalidTimestamp(_))));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_through_is_inclusive() {
        let (_temp, store) = open_store();
        let user = UserId::new("9");

        for t in [10.0, 20.0, 30.0] {
            store.insert(&RequestRecord::new(user.clone(), t)).await.unwrap();
        }

        assert_eq!(store.delete_through(&user, 20.0).await.unwrap(), 2);
        assert_eq!(store.load_since(&user, 0.0).await.unwrap(), vec![30.0]);
        assert_eq!(store.delete_through(&user, -5.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_matches_sled_semantics() {
        let store = MemoryStore::new();
        let user = UserId::new("9");

        for t in [30.0, 10.0, 20.0] {
            store.insert(&RequestRecord::new(user.clone(), t)).await.unwrap();
        }
        assert!(matches!(
            store.insert(&RequestRecord::new(user.clone(), 20.0)).await,
            Err(StoreError::Duplicate { .. })
        ));

        assert_eq!(store.load_since(&user, 10.0).await.unwrap(), vec![20.0, 30.0]);
        assert_eq!(store.delete_through(&user, 20.0).await.unwrap(), 2);
        assert_eq!(store.count(&user).await, 1);
        assert_eq!(store.delete_user(&user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_outages() {
        let store = MemoryStore::new();
        let user = UserId::new("9");

        store.set_fail_writes(true);
        assert!(matches!(
            store.insert(&RequestRecord::new(user.clone(), 1.0)).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.load_since(&user, 0.0).await.unwrap().is_empty());

        store.set_fail_reads(true);
        assert!(store.load_since(&user, 0.0).await.is_err());
    }

    #[test]
    fn test_record_datetime() {
        let record = RequestRecord::new(UserId::new("1"), 1_700_000_000.5);
        let at = record.recorded_at().unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 500);
    }
}
