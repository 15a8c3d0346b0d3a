//! Connection seam between the engine and a store client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use sc_cache::CacheResult;

use crate::topology::ConnectionPlan;

/// Command primitives the engine needs from a live connection.
///
/// Keys passed here are physical keys; prefixing happens in the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value` without expiry.
    async fn set(&self, key: &str, value: String) -> CacheResult<bool>;

    /// `SETEX key seconds value`.
    async fn set_ex(&self, key: &str, seconds: u64, value: String) -> CacheResult<bool>;

    /// `SET key value NX [EX seconds]`. Returns `true` if the key was set.
    async fn set_nx_ex(&self, key: &str, value: String, seconds: Option<u64>)
        -> CacheResult<bool>;

    /// `INCRBY key offset`.
    async fn incr_by(&self, key: &str, offset: i64) -> CacheResult<i64>;

    /// `DECRBY key offset`.
    async fn decr_by(&self, key: &str, offset: i64) -> CacheResult<i64>;

    /// `INCR key`.
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    /// `EXPIRE key seconds`. Returns `true` if the key exists.
    async fn expire(&self, key: &str, seconds: u64) -> CacheResult<bool>;

    /// `DEL key...`. Returns the number of removed keys.
    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    /// `UNLINK key...`. Returns the number of removed keys.
    async fn unlink(&self, keys: &[String]) -> CacheResult<u64>;

    /// `KEYS pattern`.
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// `SCAN cursor MATCH pattern COUNT count`, followed until the cursor
    /// returns to `0`.
    ///
    /// Yields one batch of keys per reply. The next page is requested after the
    /// current one is handed out, so keys may be removed while scanning.
    fn scan(&self, pattern: &str, count: usize) -> BoxStream<'_, CacheResult<Vec<String>>>;

    /// Closes the connection.
    async fn close(&self) -> CacheResult<()>;
}

/// Opens a [`Transport`] for a resolved plan.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector.
    type Transport: Transport + 'static;

    /// Establishes the connection.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Connection` if the store cannot be reached and
    /// `CacheError::Configuration` if the plan cannot be expressed by the client.
    async fn connect(&self, plan: &ConnectionPlan) -> CacheResult<Self::Transport>;
}

/// Lifecycle of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Created, `init` not called yet.
    Unconfigured,
    /// `init` is establishing the connection.
    Connecting,
    /// Connected and serving commands.
    Ready,
    /// Closed by the host.
    Closed,
    /// The store could not be reached. The host must reinitialize.
    Failed,
    /// The configuration is invalid. Retrying without a change is pointless.
    Fatal,
}

impl EngineState {
    /// Returns whether commands can be served.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}
