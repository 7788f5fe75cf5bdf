//! Write-once record cache.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{PluginError, PluginResult};

/// Usage accounting for cache lookups.
///
/// Called on every hit and every fresh population. The default does nothing;
/// an integrator can implement eviction on top of it.
pub trait UsageHook: Send + Sync {
    /// Record that `project` used `key` of `cache`.
    fn register(&self, _cache: &'static str, _project: Option<&str>, _key: &dyn fmt::Debug) {}
}

/// Hook that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUsageTracking;

impl UsageHook for NoUsageTracking {}

/// A successful value or a captured failure.
#[derive(Debug, Clone)]
pub struct CacheRecord<V> {
    outcome: Result<V, PluginError>,
}

impl<V: Clone> CacheRecord<V> {
    /// The stored value, or the stored failure.
    ///
    /// # Errors
    ///
    /// Returns a clone of the captured failure.
    pub fn value(&self) -> PluginResult<V> {
        self.outcome.clone()
    }

    /// Whether the record holds a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}

type Slot<V> = Arc<OnceLock<Arc<CacheRecord<V>>>>;

/// Concurrent map from structural keys to write-once records.
///
/// Population through [`RecordCache::get_or_populate`] is single-flight per
/// key: concurrent callers for the same key wait for the first one and share
/// its record. Explicit [`RecordCache::put`] on a populated key fails with
/// [`PluginError::DuplicateRecord`].
pub struct RecordCache<K, V> {
    name: &'static str,
    records: DashMap<K, Slot<V>>,
    usage: Arc<dyn UsageHook>,
}

impl<K, V> RecordCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_usage(name, Arc::new(NoUsageTracking))
    }

    /// Create an empty cache reporting usage to `usage`.
    #[must_use]
    pub fn with_usage(name: &'static str, usage: Arc<dyn UsageHook>) -> Self {
        Self {
            name,
            records: DashMap::new(),
            usage,
        }
    }

    /// Cache name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The value stored for `key`. A hit is reported to the usage hook on
    /// behalf of `project`.
    ///
    /// # Errors
    ///
    /// Re-raises the failure captured for `key`.
    pub fn get(&self, project: Option<&str>, key: &K) -> PluginResult<Option<V>> {
        let record = self
            .records
            .get(key)
            .and_then(|slot| slot.value().get().cloned());
        match record {
            Some(record) => {
                tracing::debug!(cache = self.name, key = ?key, "Cache hit");
                self.usage.register(self.name, project, key);
                record.value().map(Some)
            },
            None => Ok(None),
        }
    }

    /// Store a value.
    ///
    /// # Errors
    ///
    /// [`PluginError::DuplicateRecord`] if the key already has a record.
    pub fn put(&self, key: K, value: V) -> PluginResult<V> {
        self.insert(key, Ok(value.clone()))?;
        Ok(value)
    }

    /// Store a failure to be re-raised by later lookups.
    ///
    /// # Errors
    ///
    /// [`PluginError::DuplicateRecord`] if the key already has a record.
    pub fn put_failure(&self, key: K, error: PluginError) -> PluginResult<()> {
        self.insert(key, Err(error))
    }

    fn insert(&self, key: K, outcome: Result<V, PluginError>) -> PluginResult<()> {
        let record = Arc::new(CacheRecord { outcome });
        let reported = key.clone();
        match self.records.entry(key) {
            Entry::Occupied(slot) => {
                if slot.get().set(record).is_err() {
                    return Err(PluginError::DuplicateRecord {
                        cache: self.name,
                        key: format!("{:?}", slot.key()),
                    });
                }
            },
            Entry::Vacant(slot) => {
                let cell = OnceLock::new();
                let _ = cell.set(record);
                slot.insert(Arc::new(cell));
            },
        }
        self.usage.register(self.name, None, &reported);
        Ok(())
    }

    /// The value for `key`, computing and storing it on first use.
    ///
    /// Failures from `populate` are stored too and re-raised on every later
    /// lookup without calling `populate` again.
    ///
    /// # Errors
    ///
    /// The failure produced by `populate`, now or on an earlier call.
    pub fn get_or_populate<F>(&self, project: Option<&str>, key: K, populate: F) -> PluginResult<V>
    where
        F: FnOnce() -> PluginResult<V>,
    {
        let slot: Slot<V> = self.records.entry(key.clone()).or_default().value().clone();

        let mut populated = false;
        let record = slot.get_or_init(|| {
            populated = true;
            Arc::new(CacheRecord {
                outcome: populate(),
            })
        });

        if populated {
            tracing::debug!(
                cache = self.name,
                key = ?key,
                failed = record.is_failure(),
                "Cache miss, populated"
            );
        } else {
            tracing::debug!(cache = self.name, key = ?key, "Cache hit");
        }
        self.usage.register(self.name, project, &key);
        record.value()
    }

    /// Successful values currently stored.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.records
            .iter()
            .filter_map(|slot| slot.value().get().and_then(|r| r.outcome.clone().ok()))
            .collect()
    }

    /// Whether `key` has a committed record.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.records
            .get(key)
            .is_some_and(|slot| slot.value().get().is_some())
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn flush(&self) {
        let count = self.records.len();
        self.records.clear();
        tracing::debug!(cache = self.name, records = count, "Cache flushed");
    }
}

impl<K: Eq + Hash, V> fmt::Debug for RecordCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCache")
            .field("name", &self.name)
            .field("records", &self.records.len())
            .finish_non_exhaustive()
    }
}
