//! Redis cache engine.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sc_cache::codec::{decode, encode};
use sc_cache::key::{effective_ttl, group_tag, prefix_pattern, prefixed_key};
use sc_cache::{CacheEngine, CacheError, CacheResult};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::EngineConfig;
use crate::connection::{Connector, EngineState, Transport};
use crate::fred_client::FredConnector;
use crate::topology::resolve;

/// Cache engine backed by a single Redis connection.
///
/// The connection is opened by [`RedisEngine::init`] and released by
/// [`RedisEngine::close`]. Every operation awaits its reply before the next
/// command is sent.
///
/// A persistent engine keeps its connection across `close`, and the next
/// `init` reuses it. Dropping an engine that still holds a connection closes
/// it in the background when a Tokio runtime is available; outside a runtime
/// the connection is leaked, so call `close` before dropping.
pub struct RedisEngine<C: Connector = FredConnector> {
    config: EngineConfig,
    connector: C,
    connection: Option<C::Transport>,
    state: EngineState,
}

impl RedisEngine<FredConnector> {
    /// Creates an engine that connects through `fred`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_connector(config, FredConnector::new())
    }
}

impl<C: Connector> RedisEngine<C> {
    /// Creates an engine that connects through `connector`.
    #[must_use]
    pub fn with_connector(config: EngineConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            connection: None,
            state: EngineState::Unconfigured,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Live connection, if any.
    #[must_use]
    pub const fn connection(&self) -> Option<&C::Transport> {
        self.connection.as_ref()
    }

    /// Resolves the topology and opens the connection.
    ///
    /// Returns `Ok(false)` if the store could not be reached; the host can
    /// treat the engine as unavailable. Calling this on a ready engine, or on a
    /// closed persistent one, keeps the existing connection.
    ///
    /// ## Errors
    ///
    /// Returns `CacheError::Configuration` if the configuration is invalid.
    pub async fn init(&mut self) -> CacheResult<bool> {
        if self.state.is_ready() {
            return Ok(true);
        }
        if self.connection.is_some() {
            self.state = EngineState::Ready;
            tracing::debug!("Reusing persistent cache connection");
            return Ok(true);
        }

        let plan = match resolve(&self.config) {
            Ok(plan) => plan,
            Err(err) => {
                self.state = EngineState::Fatal;
                tracing::error!(error = %err, "Invalid cache configuration");
                return Err(err);
            }
        };

        self.state = EngineState::Connecting;
        match self.connector.connect(&plan).await {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = EngineState::Ready;
                tracing::debug!(
                    prefix = %self.config.prefix,
                    replication = ?plan.replication_tag(),
                    "Cache engine ready"
                );
                Ok(true)
            }
            Err(err) if err.is_fatal() => {
                self.state = EngineState::Fatal;
                tracing::error!(error = %err, "Invalid cache configuration");
                Err(err)
            }
            Err(err) => {
                self.state = EngineState::Failed;
                tracing::warn!(error = %err, "Cache store unreachable");
                Ok(false)
            }
        }
    }

    /// Releases the connection.
    ///
    /// A persistent connection is kept open for the next `init`.
    ///
    /// ## Errors
    ///
    /// Returns the transport error if closing fails.
    pub async fn close(&mut self) -> CacheResult<()> {
        if self.connection.is_none() {
            return Ok(());
        }
        self.state = EngineState::Closed;

        if self.config.persistent {
            tracing::debug!("Keeping persistent cache connection open");
            return Ok(());
        }
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    fn key(&self, key: &str) -> String {
        prefixed_key(&self.config.prefix, key)
    }

    fn transport(&self) -> CacheResult<&C::Transport> {
        self.connection
            .as_ref()
            .filter(|_| self.state.is_ready())
            .ok_or(CacheError::NotConnected)
    }

    /// Applies the failure convention: errors become `fallback` unless the
    /// engine is configured to raise them.
    fn settle<T>(
        &self,
        operation: &'static str,
        result: CacheResult<T>,
        fallback: T,
    ) -> CacheResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) if self.config.raises_errors() => Err(err),
            Err(err) => {
                tracing::warn!(operation, error = %err, "Cache command failed");
                Ok(fallback)
            }
        }
    }

    async fn write<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        let transport = self.transport()?;
        let key = self.key(key);
        let value = encode(value)?;

        match effective_ttl(ttl, self.config.duration) {
            0 => transport.set(&key, value).await,
            seconds => transport.set_ex(&key, seconds, value).await,
        }
    }

    async fn read<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let key = self.key(key);
        match self.transport()?.get(&key).await? {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn adjust(&self, key: &str, offset: i64, increment: bool) -> CacheResult<i64> {
        let transport = self.transport()?;
        let key = self.key(key);

        let value = if increment {
            transport.incr_by(&key, offset).await?
        } else {
            transport.decr_by(&key, offset).await?
        };

        if self.config.duration > 0 {
            transport.expire(&key, self.config.duration).await?;
        }
        Ok(value)
    }

    async fn insert<T>(&self, key: &str, value: &T) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        let transport = self.transport()?;
        let key = self.key(key);
        let value = encode(value)?;
        let seconds = Some(self.config.duration).filter(|seconds| *seconds > 0);

        transport.set_nx_ex(&key, value, seconds).await
    }

    async fn remove(&self, key: &str, lazily: bool) -> CacheResult<bool> {
        let transport = self.transport()?;
        let keys = [self.key(key)];

        let removed = if lazily {
            transport.unlink(&keys).await?
        } else {
            transport.del(&keys).await?
        };
        Ok(removed > 0)
    }

    async fn remove_all(&self) -> CacheResult<bool> {
        let transport = self.transport()?;
        let keys = transport.keys(&prefix_pattern(&self.config.prefix)).await?;

        let mut cleared = true;
        for key in keys {
            cleared &= transport.del(std::slice::from_ref(&key)).await? > 0;
        }
        Ok(cleared)
    }

    async fn remove_all_incrementally(&self) -> CacheResult<bool> {
        let transport = self.transport()?;
        let pattern = prefix_pattern(&self.config.prefix);
        let count = self.config.scan_count.max(1);

        let mut pages = transport.scan(&pattern, count);
        let mut cleared = true;
        while let Some(keys) = pages.try_next().await? {
            for key in keys {
                cleared &= transport.unlink(std::slice::from_ref(&key)).await? > 0;
            }
        }
        Ok(cleared)
    }

    async fn group_tags(&self) -> CacheResult<Vec<String>> {
        let transport = self.transport()?;

        let mut tags = Vec::with_capacity(self.config.groups.len());
        for group in &self.config.groups {
            let key = self.key(group);
            let version = match transport.get(&key).await? {
                Some(version) => version,
                None => {
                    let version = encode(&1)?;
                    transport.set(&key, version.clone()).await?;
                    version
                }
            };
            tags.push(group_tag(group, &version));
        }
        Ok(tags)
    }

    async fn bump_group(&self, group: &str) -> CacheResult<bool> {
        let key = self.key(group);
        self.transport()?.incr(&key).await?;
        Ok(true)
    }
}

#[async_trait]
impl<C: Connector> CacheEngine for RedisEngine<C> {
    async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        let result = self.write(key, value, ttl).await;
        self.settle("set", result, false)
    }

    async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let result = self.read(key).await;
        self.settle("get", result, None)
    }

    async fn increment(&self, key: &str, offset: i64) -> CacheResult<Option<i64>> {
        let result = self.adjust(key, offset, true).await.map(Some);
        self.settle("increment", result, None)
    }

    async fn decrement(&self, key: &str, offset: i64) -> CacheResult<Option<i64>> {
        let result = self.adjust(key, offset, false).await.map(Some);
        self.settle("decrement", result, None)
    }

    async fn add<T>(&self, key: &str, value: &T) -> CacheResult<bool>
    where
        T: Serialize + Sync,
    {
        let result = self.insert(key, value).await;
        self.settle("add", result, false)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let result = self.remove(key, false).await;
        self.settle("delete", result, false)
    }

    async fn delete_async(&self, key: &str) -> CacheResult<bool> {
        let result = self.remove(key, true).await;
        self.settle("delete_async", result, false)
    }

    async fn clear(&self, check: bool) -> CacheResult<bool> {
        if check {
            return Ok(true);
        }
        let result = self.remove_all().await;
        self.settle("clear", result, false)
    }

    async fn clear_blocking(&self) -> CacheResult<bool> {
        let result = self.remove_all_incrementally().await;
        self.settle("clear_blocking", result, false)
    }

    async fn groups(&self) -> CacheResult<Vec<String>> {
        let result = self.group_tags().await;
        self.settle("groups", result, Vec::new())
    }

    async fn clear_group(&self, group: &str) -> CacheResult<bool> {
        let result = self.bump_group(group).await;
        self.settle("clear_group", result, false)
    }
}

impl<C: Connector> std::fmt::Debug for RedisEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEngine")
            .field("prefix", &self.config.prefix)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Drop for RedisEngine<C> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!("Closing cache connection of a dropped engine");
                runtime.spawn(async move {
                    if let Err(err) = connection.close().await {
                        tracing::debug!(error = %err, "Closing dropped cache connection failed");
                    }
                });
            }
            Err(_) => tracing::debug!("Cache engine dropped without close outside a runtime"),
        }
    }
}
