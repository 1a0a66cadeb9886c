use log::debug;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::Expiry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use std::fmt::Debug;

/// An enum to represent the expiration of a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Expiration {
    AtOnce,
    After(Duration),
    Never,
}

impl Expiration {
    /// Returns the duration of this expiration.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Expiration::AtOnce => Some(Duration::from_secs(0)),
            Expiration::After(duration) => Some(*duration),
            Expiration::Never => None,
        }
    }
}

pub struct MyExpiry;

impl<K, V> Expiry<K, (Expiration, V)> for MyExpiry
where
    K: Clone + std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn expire_after_create(
        &self,
        _key: &K,
        value: &(Expiration, V),
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value.0.as_duration()
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &(Expiration, V),
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.0.as_duration()
    }
}

/// A bounded moka cache whose loader runs at most once per key at a time:
/// concurrent callers for a missing key wait for the same load.
pub struct AutoCache<K, V>
where
    K: Clone + std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<K, (Expiration, V)>,
    capacity: u64,
}

fn eviction_listener<K: Debug, V>(key: Arc<K>, _value: V, cause: RemovalCause) {
    let value_type = std::any::type_name::<V>();
    debug!("Evicted key {key:?} -> {} Cause: {cause:?}", value_type);
}

impl<K, V> AutoCache<K, V>
where
    K: Clone + std::hash::Hash + Eq + Send + Sync + Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .expire_after(MyExpiry)
                .eviction_listener(eviction_listener)
                .build(),
            capacity,
        }
    }

    pub fn size(&self) -> (u64, u64) {
        (self.cache.entry_count(), self.capacity)
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let value = self.cache.get(key).await.map(|(_, value)| value);
        if value.is_some() {
            debug!("Got cached key {key:?} -> {}", std::any::type_name::<V>());
        }
        value
    }

    /// Returns the cached value or runs `loader`. Errors are not cached and
    /// are handed to every caller that waited on the failed load.
    pub async fn get_or_try_load<F, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: Future<Output = Result<(V, Expiration), E>>,
        E: Clone + Send + Sync + 'static,
    {
        debug!("Fetching key {key:?} -> {}", std::any::type_name::<V>());
        self.cache
            .try_get_with(key, async move {
                loader.await.map(|(value, expiry)| (expiry, value))
            })
            .await
            .map(|(_, value)| value)
            .map_err(|e: Arc<E>| E::clone(&e))
    }

    pub async fn set(&self, key: K, value: V, expiry: Expiration) {
        if expiry != Expiration::AtOnce {
            debug!(
                "Caching setted key {key:?} -> {}",
                std::any::type_name::<V>()
            );
            self.cache.insert(key, (expiry, value)).await;
        }
    }

    pub async fn invalidate(&self, key: &K) {
        self.cache.invalidate(key).await
    }
}
