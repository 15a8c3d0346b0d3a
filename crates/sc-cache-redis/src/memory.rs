//! In-process store implementing the connection primitives.
//!
//! Useful for tests and for hosts that want an engine without a Redis server.
//! Expiry is evaluated lazily on access. Patterns support `*`, `?` and
//! backslash escapes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::Mutex;
use sc_cache::{CacheError, CacheResult};

use crate::connection::{Connector, Transport};
use crate::topology::ConnectionPlan;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    seq: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<String, Entry>,
    next_seq: u64,
    failing: bool,
    open_connections: usize,
    last_plan: Option<ConnectionPlan>,
}

impl StoreState {
    fn check(&self) -> CacheResult<()> {
        if self.failing {
            Err(CacheError::Connection("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn purge(&mut self, key: &str) {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
        }
    }

    fn put(&mut self, key: &str, value: String, expires_at: Option<Instant>) {
        self.purge(key);
        let seq = match self.entries.get(key) {
            Some(entry) => entry.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                seq,
            },
        );
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge(key);
        self.entries.get_mut(key)
    }

    fn evict_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    fn live_keys(&mut self) -> Vec<String> {
        self.evict_expired();
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn add(&mut self, key: &str, delta: i64) -> CacheResult<i64> {
        let current = match self.live(key) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| not_an_integer())?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(not_an_integer)?;
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = next.to_string(),
            None => self.put(key, next.to_string(), None),
        }
        Ok(next)
    }

    fn remove(&mut self, keys: &[String]) -> u64 {
        let mut removed = 0;
        for key in keys {
            self.purge(key);
            if self.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

fn not_an_integer() -> CacheError {
    CacheError::Command("ERR value is not an integer or out of range".to_string())
}

/// Expiry instant for a TTL; `None` when it lies beyond what `Instant` can hold.
fn expiry(seconds: u64) -> Option<Instant> {
    Instant::now().checked_add(Duration::from_secs(seconds))
}

/// Shared in-memory key space.
///
/// Clones share the same data, so a test can keep a handle to inspect what an
/// engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw value, as another client would.
    pub fn insert_raw(&self, key: &str, value: impl Into<String>) {
        self.state.lock().put(key, value.into(), None);
    }

    /// Reads the raw stored value.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.lock().live(key).map(|entry| entry.value.clone())
    }

    /// Returns whether a live key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().live(key).is_some()
    }

    /// Remaining time to live, or `None` if the key is absent or never expires.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.state
            .lock()
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().live_keys().len()
    }

    /// Returns whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every command fail with a connection error while set.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of connections opened and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// Plan of the most recent successful connection.
    #[must_use]
    pub fn last_plan(&self) -> Option<ConnectionPlan> {
        self.state.lock().last_plan.clone()
    }
}

/// Connector handing out connections to a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: MemoryStore,
    reachable: bool,
}

impl MemoryConnector {
    /// Creates a connector for `store`.
    #[must_use]
    pub const fn new(store: MemoryStore) -> Self {
        Self {
            store,
            reachable: true,
        }
    }

    /// Creates a connector whose every connection attempt fails.
    #[must_use]
    pub const fn unreachable(store: MemoryStore) -> Self {
        Self {
            store,
            reachable: false,
        }
    }

    /// The backing store.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, plan: &ConnectionPlan) -> CacheResult<MemoryTransport> {
        if !self.reachable {
            return Err(CacheError::Connection("connection refused".to_string()));
        }
        let mut state = self.store.state.lock();
        state.open_connections += 1;
        state.last_plan = Some(plan.clone());
        drop(state);

        Ok(MemoryTransport {
            store: self.store.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Connection to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransport {
    store: MemoryStore,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn state(&self) -> CacheResult<parking_lot::MutexGuard<'_, StoreState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Connection("connection closed".to_string()));
        }
        let state = self.store.state.lock();
        state.check()?;
        Ok(state)
    }

    fn scan_page(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        let mut state = self.state()?;
        state.evict_expired();

        // The cursor is an insertion sequence number, so removing keys between
        // pages never shifts the remaining ones.
        let mut pending: Vec<(u64, &String)> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.seq >= cursor)
            .map(|(key, entry)| (entry.seq, key))
            .collect();
        pending.sort_unstable();

        let window = &pending[..pending.len().min(count.max(1))];
        let next = if window.len() < pending.len() {
            window.last().map_or(0, |(seq, _)| seq + 1)
        } else {
            0
        };
        let batch = window
            .iter()
            .filter(|(_, key)| glob_match(pattern, key))
            .map(|(_, key)| (*key).clone())
            .collect();
        Ok((next, batch))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.state()?.live(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<bool> {
        self.state()?.put(key, value, None);
        Ok(true)
    }

    async fn set_ex(&self, key: &str, seconds: u64, value: String) -> CacheResult<bool> {
        if seconds == 0 {
            return Err(CacheError::Command(
                "ERR invalid expire time in 'setex' command".to_string(),
            ));
        }
        self.state()?.put(key, value, expiry(seconds));
        Ok(true)
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: String,
        seconds: Option<u64>,
    ) -> CacheResult<bool> {
        let mut state = self.state()?;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.put(key, value, seconds.and_then(expiry));
        Ok(true)
    }

    async fn incr_by(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.state()?.add(key, offset)
    }

    async fn decr_by(&self, key: &str, offset: i64) -> CacheResult<i64> {
        let delta = offset.checked_neg().ok_or_else(not_an_integer)?;
        self.state()?.add(key, delta)
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        self.state()?.add(key, 1)
    }

    async fn expire(&self, key: &str, seconds: u64) -> CacheResult<bool> {
        let mut state = self.state()?;
        if state.live(key).is_none() {
            return Ok(false);
        }
        if seconds == 0 {
            state.entries.remove(key);
        } else if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = expiry(seconds);
        }
        Ok(true)
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        Ok(self.state()?.remove(keys))
    }

    async fn unlink(&self, keys: &[String]) -> CacheResult<u64> {
        Ok(self.state()?.remove(keys))
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .state()?
            .live_keys()
            .into_iter()
            .filter(|key| glob_match(pattern, key))
            .collect())
    }

    fn scan(&self, pattern: &str, count: usize) -> BoxStream<'_, CacheResult<Vec<String>>> {
        let pattern = pattern.to_string();
        stream::try_unfold(Some(0), move |cursor| {
            let pattern = pattern.clone();
            async move {
                match cursor {
                    Some(cursor) => self
                        .scan_page(cursor, &pattern, count)
                        .map(|(next, batch)| Some((batch, (next != 0).then_some(next)))),
                    None => Ok(None),
                }
            }
        })
        .boxed()
    }

    async fn close(&self) -> CacheResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.store.state.lock();
            state.open_connections = state.open_connections.saturating_sub(1);
        }
        Ok(())
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
