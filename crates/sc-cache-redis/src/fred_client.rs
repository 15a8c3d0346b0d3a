//! `fred` backed connection.

use async_trait::async_trait;
use fred::cmd;
use fred::prelude::*;
use fred::types::scan::{ScanResult, Scanner};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sc_cache::{CacheError, CacheResult};

use crate::connection::{Connector, Transport};
use crate::error::from_redis_error;
use crate::topology::{ConnectionPlan, Topology};

const SUPPORTED_SCHEMES: &[&str] = &["tcp", "redis"];

/// Connector that opens a `fred` client for a plan.
///
/// No reconnect policy is installed: a failed connection is reported to the
/// engine instead of being retried in the background.
#[derive(Debug, Clone, Copy, Default)]
pub struct FredConnector;

impl FredConnector {
    /// Creates a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Live `fred` connection.
#[derive(Clone)]
pub struct FredTransport {
    client: Client,
}

impl FredTransport {
    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for FredTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FredTransport")
            .field("client", &self.client.id())
            .finish()
    }
}

/// Builds the `fred` client configuration for a plan.
///
/// A direct plan connects to its first node, which is the primary of a
/// replicated list. The database and master password only apply when the
/// plan carries them; a plain single-node plan uses the node's own password.
///
/// ## Errors
///
/// Returns `CacheError::Configuration` for an empty node list or a scheme the
/// client cannot speak.
pub fn client_config(plan: &ConnectionPlan) -> CacheResult<Config> {
    for node in plan.nodes() {
        if !SUPPORTED_SCHEMES.contains(&node.scheme.as_str()) {
            return Err(CacheError::Configuration(format!(
                "unsupported scheme: {}",
                node.scheme
            )));
        }
    }

    match &plan.topology {
        Topology::Direct { nodes, replication } => {
            let primary = nodes.first().ok_or_else(|| {
                CacheError::Configuration("no redis server configured".to_string())
            })?;
            let (password, database) = match replication {
                Some(options) => (options.master.password.clone(), Some(options.master.database)),
                None => (primary.password.clone(), None),
            };
            Ok(Config {
                server: ServerConfig::Centralized {
                    server: Server::new(primary.host.clone(), primary.port),
                },
                password,
                database,
                fail_fast: true,
                ..Config::default()
            })
        }
        Topology::Sentinel {
            nodes,
            service,
            master,
        } => {
            if nodes.is_empty() {
                return Err(CacheError::Configuration(
                    "no sentinel configured".to_string(),
                ));
            }
            let hosts = nodes
                .iter()
                .map(|node| (node.host.clone(), node.port))
                .collect();
            Ok(Config {
                server: ServerConfig::new_sentinel(hosts, service.clone()),
                password: master.password.clone(),
                database: Some(master.database),
                fail_fast: true,
                ..Config::default()
            })
        }
    }
}

/// Converts seconds for Redis expiration, clamping at `i64::MAX`.
fn seconds_to_i64(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

fn page_keys(page: &ScanResult) -> Vec<String> {
    page.results()
        .iter()
        .flatten()
        .filter_map(|key| key.as_str().map(str::to_string))
        .collect()
}

#[async_trait]
impl Connector for FredConnector {
    type Transport = FredTransport;

    async fn connect(&self, plan: &ConnectionPlan) -> CacheResult<FredTransport> {
        let config = client_config(plan)?;
        let client = Client::new(config, None, None, None);

        client.init().await.map_err(from_redis_error)?;

        tracing::info!(
            nodes = plan.nodes().len(),
            replication = ?plan.replication_tag(),
            "Redis connection established"
        );

        Ok(FredTransport { client })
    }
}

#[async_trait]
impl Transport for FredTransport {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.client
            .get::<Option<String>, _>(key)
            .await
            .map_err(from_redis_error)
    }

    async fn set(&self, key: &str, value: String) -> CacheResult<bool> {
        self.client
            .set::<(), _, _>(key, value, None, None, false)
            .await
            .map_err(from_redis_error)?;
        Ok(true)
    }

    async fn set_ex(&self, key: &str, seconds: u64, value: String) -> CacheResult<bool> {
        self.client
            .set::<(), _, _>(
                key,
                value,
                Some(Expiration::EX(seconds_to_i64(seconds))),
                None,
                false,
            )
            .await
            .map_err(from_redis_error)?;
        Ok(true)
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: String,
        seconds: Option<u64>,
    ) -> CacheResult<bool> {
        let expiration = seconds.map(|s| Expiration::EX(seconds_to_i64(s)));

        let result: Option<String> = self
            .client
            .set(key, value, expiration, Some(SetOptions::NX), false)
            .await
            .map_err(from_redis_error)?;

        Ok(result.is_some())
    }

    async fn incr_by(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.client
            .incr_by::<i64, _>(key, offset)
            .await
            .map_err(from_redis_error)
    }

    async fn decr_by(&self, key: &str, offset: i64) -> CacheResult<i64> {
        self.client
            .decr_by::<i64, _>(key, offset)
            .await
            .map_err(from_redis_error)
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        self.client
            .incr::<i64, _>(key)
            .await
            .map_err(from_redis_error)
    }

    async fn expire(&self, key: &str, seconds: u64) -> CacheResult<bool> {
        self.client
            .expire::<bool, _>(key, seconds_to_i64(seconds), None)
            .await
            .map_err(from_redis_error)
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.client
            .del::<u64, _>(keys.to_vec())
            .await
            .map_err(from_redis_error)
    }

    async fn unlink(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.client
            .unlink::<u64, _>(keys.to_vec())
            .await
            .map_err(from_redis_error)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.client
            .custom::<Vec<String>, _>(cmd!("KEYS"), vec![pattern.to_string()])
            .await
            .map_err(from_redis_error)
    }

    fn scan(&self, pattern: &str, count: usize) -> BoxStream<'_, CacheResult<Vec<String>>> {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.client
            .scan(pattern.to_string(), Some(count), None)
            .map_err(from_redis_error)
            .map_ok(|page| page_keys(&page))
            .boxed()
    }

    async fn close(&self) -> CacheResult<()> {
        self.client.quit().await.map_err(from_redis_error)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use fred::mocks::{MockCommand, Mocks};
    use fred::types::Value;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::EngineConfig;
    use crate::topology::resolve;

    /// Records every command as text and answers from a scripted queue.
    #[derive(Debug, Default)]
    struct Recorder {
        commands: Mutex<Vec<Vec<String>>>,
        replies: Mutex<VecDeque<Value>>,
    }

    impl Recorder {
        fn reply(&self, value: Value) {
            self.replies.lock().push_back(value);
        }

        fn take(&self) -> Vec<Vec<String>> {
            std::mem::take(&mut *self.commands.lock())
        }
    }

    impl Mocks for Recorder {
        fn process_command(&self, command: MockCommand) -> Result<Value, fred::error::Error> {
            let mut line = vec![String::from(&*command.cmd)];
            line.extend(
                command
                    .args
                    .iter()
                    .map(|arg| arg.as_str().map(|text| text.into_owned()).unwrap_or_default()),
            );
            self.commands.lock().push(line);
            Ok(self.replies.lock().pop_front().unwrap_or(Value::Null))
        }
    }

    async fn mocked() -> (FredTransport, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let config = Config {
            mocks: Some(recorder.clone()),
            ..Config::default()
        };
        let client = Client::new(config, None, None, None);
        client.init().await.unwrap();
        recorder.take();
        (FredTransport { client }, recorder)
    }

    fn line(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| (*part).to_string()).collect()
    }

    #[tokio::test]
    async fn set_variants_send_expiry_and_nx() {
        let (transport, recorder) = mocked().await;
        recorder.reply(Value::String("OK".into()));
        recorder.reply(Value::String("OK".into()));
        recorder.reply(Value::String("OK".into()));
        recorder.reply(Value::Null);

        assert!(transport.set("k", "v".to_string()).await.unwrap());
        assert!(transport.set_ex("k", 30, "v".to_string()).await.unwrap());
        assert!(transport
            .set_nx_ex("n", "1".to_string(), Some(60))
            .await
            .unwrap());
        assert!(!transport.set_nx_ex("n", "2".to_string(), None).await.unwrap());

        assert_eq!(
            recorder.take(),
            vec![
                line(&["SET", "k", "v"]),
                line(&["SET", "k", "v", "EX", "30"]),
                line(&["SET", "n", "1", "EX", "60", "NX"]),
                line(&["SET", "n", "2", "NX"]),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_expiry_is_clamped() {
        let (transport, recorder) = mocked().await;
        recorder.reply(Value::String("OK".into()));

        transport.set_ex("k", u64::MAX, "v".to_string()).await.unwrap();

        assert_eq!(
            recorder.take(),
            vec![line(&["SET", "k", "v", "EX", &i64::MAX.to_string()])]
        );
    }

    #[tokio::test]
    async fn counters_and_expire_read_integer_replies() {
        let (transport, recorder) = mocked().await;
        recorder.reply(Value::Integer(8));
        recorder.reply(Value::Integer(5));
        recorder.reply(Value::Integer(6));
        recorder.reply(Value::Integer(1));
        recorder.reply(Value::Integer(0));

        assert_eq!(transport.incr_by("n", 3).await.unwrap(), 8);
        assert_eq!(transport.decr_by("n", 3).await.unwrap(), 5);
        assert_eq!(transport.incr("n").await.unwrap(), 6);
        assert!(transport.expire("n", 60).await.unwrap());
        assert!(!transport.expire("gone", 60).await.unwrap());

        assert_eq!(
            recorder.take(),
            vec![
                line(&["INCRBY", "n", "3"]),
                line(&["DECRBY", "n", "3"]),
                line(&["INCR", "n"]),
                line(&["EXPIRE", "n", "60"]),
                line(&["EXPIRE", "gone", "60"]),
            ]
        );
    }

    #[tokio::test]
    async fn removals_return_the_reply_count() {
        let (transport, recorder) = mocked().await;
        recorder.reply(Value::Integer(2));
        recorder.reply(Value::Integer(0));

        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(transport.del(&keys).await.unwrap(), 2);
        assert_eq!(transport.unlink(&keys[..1]).await.unwrap(), 0);
        assert_eq!(transport.del(&[]).await.unwrap(), 0);
        assert_eq!(transport.unlink(&[]).await.unwrap(), 0);

        assert_eq!(
            recorder.take(),
            vec![line(&["DEL", "a", "b"]), line(&["UNLINK", "a"])]
        );
    }

    #[tokio::test]
    async fn get_and_keys_decode_replies() {
        let (transport, recorder) = mocked().await;
        recorder.reply(Value::String("\"x\"".into()));
        recorder.reply(Value::Null);
        recorder.reply(Value::Array(vec![
            Value::String("p_a".into()),
            Value::String("p_b".into()),
        ]));

        assert_eq!(transport.get("k").await.unwrap().as_deref(), Some("\"x\""));
        assert_eq!(transport.get("missing").await.unwrap(), None);
        assert_eq!(
            transport.keys("p_*").await.unwrap(),
            vec!["p_a".to_string(), "p_b".to_string()]
        );

        assert_eq!(
            recorder.take(),
            vec![
                line(&["GET", "k"]),
                line(&["GET", "missing"]),
                line(&["KEYS", "p_*"]),
            ]
        );
    }

    #[test]
    fn scalar_server_uses_node_password_and_default_database() {
        let plan = resolve(&EngineConfig::new().server("cache.local").password("pw").database(4))
            .unwrap();
        let config = client_config(&plan).unwrap();

        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.database, None);
        assert!(config.fail_fast);
        match config.server {
            ServerConfig::Centralized { server } => {
                assert_eq!(&*server.host, "cache.local");
                assert_eq!(server.port, 6379);
            }
            other => panic!("expected centralized config, got {other:?}"),
        }
    }

    #[test]
    fn replicated_list_connects_to_primary_with_database() {
        let plan = resolve(
            &EngineConfig::new()
                .server(vec!["primary", "replica"])
                .port(6380)
                .database(4),
        )
        .unwrap();
        let config = client_config(&plan).unwrap();

        assert_eq!(config.database, Some(4));
        match config.server {
            ServerConfig::Centralized { server } => {
                assert_eq!(&*server.host, "primary");
                assert_eq!(server.port, 6380);
            }
            other => panic!("expected centralized config, got {other:?}"),
        }
    }

    #[test]
    fn sentinel_plan_lists_every_sentinel() {
        let plan = resolve(
            &EngineConfig::new()
                .sentinel(vec!["s1", "s2"])
                .port(26379)
                .service("cache")
                .password("pw"),
        )
        .unwrap();
        let config = client_config(&plan).unwrap();

        assert_eq!(config.password.as_deref(), Some("pw"));
        assert_eq!(config.database, Some(0));
        match config.server {
            ServerConfig::Sentinel {
                hosts,
                service_name,
                ..
            } => {
                let hosts: Vec<_> = hosts
                    .iter()
                    .map(|server| (String::from(&*server.host), server.port))
                    .collect();
                assert_eq!(
                    hosts,
                    vec![("s1".to_string(), 26379), ("s2".to_string(), 26379)]
                );
                assert_eq!(service_name, "cache");
            }
            other => panic!("expected sentinel config, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_scheme_is_a_configuration_error() {
        let plan = resolve(&EngineConfig::new().server("a").scheme("unix")).unwrap();
        let err = client_config(&plan).unwrap_err();
        assert!(err.is_fatal());
    }
}
