//! Cache engine trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheResult;

/// Capability interface a cache storage engine exposes to its host.
///
/// Operations report ordinary failures through their return value (`false`,
/// `None`, an empty list). Whether backend errors are returned as `Err` instead
/// is up to the engine's configuration. Configuration errors are always `Err`.
///
/// All keys are logical keys; the engine applies its own prefix.
#[async_trait]
pub trait CacheEngine: Send + Sync {
    /// Writes a value.
    ///
    /// `ttl` of `None` uses the engine's default duration. A zero TTL stores the
    /// value without expiry.
    async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + Sync;

    /// Reads a value.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Reads a value, falling back to `default` on a miss.
    async fn get_or<T>(&self, key: &str, default: T) -> CacheResult<T>
    where
        T: DeserializeOwned + Send,
    {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Atomically increments a counter and returns its new value.
    async fn increment(&self, key: &str, offset: i64) -> CacheResult<Option<i64>>;

    /// Atomically decrements a counter and returns its new value.
    async fn decrement(&self, key: &str, offset: i64) -> CacheResult<Option<i64>>;

    /// Writes a value only if the key is absent.
    ///
    /// Returns `true` if the value was stored.
    async fn add<T>(&self, key: &str, value: &T) -> CacheResult<bool>
    where
        T: Serialize + Sync;

    /// Deletes a key. Returns `true` only if a key was actually removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Deletes a key without blocking the backend on memory reclamation.
    async fn delete_async(&self, key: &str) -> CacheResult<bool>;

    /// Removes every key owned by this engine.
    ///
    /// With `check` set nothing is removed and entries are left to expire on
    /// their own.
    async fn clear(&self, check: bool) -> CacheResult<bool>;

    /// Removes every key owned by this engine using incremental scanning.
    async fn clear_blocking(&self) -> CacheResult<bool>;

    /// Returns the current tag of every configured group.
    async fn groups(&self) -> CacheResult<Vec<String>>;

    /// Invalidates every key tagged with `group`.
    async fn clear_group(&self, group: &str) -> CacheResult<bool>;

    /// Reads several values in order.
    async fn get_many<T>(&self, keys: &[&str]) -> CacheResult<Vec<Option<T>>>
    where
        T: DeserializeOwned + Send,
    {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Writes several values. Returns `true` only if every write succeeded.
    async fn set_many<T>(&self, entries: &[(&str, T)], ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        let mut stored = true;
        for (key, value) in entries {
            stored &= self.set(key, value, ttl).await?;
        }
        Ok(stored)
    }

    /// Deletes several keys. Returns `true` only if every key was removed.
    async fn delete_many(&self, keys: &[&str]) -> CacheResult<bool> {
        let mut removed = true;
        for key in keys {
            removed &= self.delete(key).await?;
        }
        Ok(removed)
    }
}
