//! Redis engine configuration.

use serde::{Deserialize, Serialize};

/// One address or an ordered list of addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Addresses {
    /// A single host.
    One(String),
    /// An ordered list of hosts.
    Many(Vec<String>),
}

impl Addresses {
    /// Normalizes into an ordered list, dropping blank entries.
    #[must_use]
    pub fn to_list(&self) -> Vec<String> {
        let hosts = match self {
            Self::One(host) => std::slice::from_ref(host),
            Self::Many(hosts) => hosts.as_slice(),
        };
        hosts
            .iter()
            .filter(|host| !host.trim().is_empty())
            .cloned()
            .collect()
    }

    /// Returns whether no usable address is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_list().is_empty()
    }

    /// Returns whether this was given as a single scalar address.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::One(_))
    }
}

impl From<&str> for Addresses {
    fn from(host: &str) -> Self {
        Self::One(host.to_string())
    }
}

impl From<String> for Addresses {
    fn from(host: String) -> Self {
        Self::One(host)
    }
}

impl From<Vec<String>> for Addresses {
    fn from(hosts: Vec<String>) -> Self {
        Self::Many(hosts)
    }
}

impl From<Vec<&str>> for Addresses {
    fn from(hosts: Vec<&str>) -> Self {
        Self::Many(hosts.into_iter().map(str::to_string).collect())
    }
}

/// Replication behaviour for server mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Plain connection without replication options.
    None,
    /// Primary/replica set; the first address is the primary.
    Replicated,
}

/// Redis engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server address(es) for direct or replicated mode.
    #[serde(default)]
    pub server: Option<Addresses>,
    /// Sentinel address(es) for high-availability mode.
    #[serde(default)]
    pub sentinel: Option<Addresses>,
    /// Transport scheme applied to every node.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Port applied to every node.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Redis password (optional).
    #[serde(default)]
    pub password: Option<String>,
    /// Redis database number.
    #[serde(default)]
    pub database: u8,
    /// Master service name tracked by the sentinels.
    #[serde(default = "default_service")]
    pub service: String,
    /// String prepended to every key.
    #[serde(default)]
    pub prefix: String,
    /// Default TTL in seconds. `0` disables expiry.
    #[serde(default = "default_duration")]
    pub duration: u64,
    /// Invalidation groups.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Keep the connection open after the engine is closed.
    #[serde(default)]
    pub persistent: bool,
    /// Return command errors instead of failure values.
    #[serde(default)]
    pub exceptions: Option<bool>,
    /// Explicit replication mode for server mode.
    ///
    /// When unset, a scalar `server` gets no replication options and a list gets
    /// a replicated setup.
    #[serde(default)]
    pub replication: Option<ReplicationMode>,
    /// Batch size hint for incremental scans.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: None,
            sentinel: None,
            scheme: default_scheme(),
            port: default_port(),
            password: None,
            database: 0,
            service: default_service(),
            prefix: String::new(),
            duration: default_duration(),
            groups: Vec::new(),
            persistent: false,
            exceptions: None,
            replication: None,
            scan_count: default_scan_count(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address(es).
    #[must_use]
    pub fn server(mut self, server: impl Into<Addresses>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Sets the sentinel address(es).
    #[must_use]
    pub fn sentinel(mut self, sentinel: impl Into<Addresses>) -> Self {
        self.sentinel = Some(sentinel.into());
        self
    }

    /// Sets the transport scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the Redis password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the Redis database number.
    #[must_use]
    pub const fn database(mut self, database: u8) -> Self {
        self.database = database;
        self
    }

    /// Sets the sentinel service name.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the default TTL in seconds.
    #[must_use]
    pub const fn duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    /// Sets the invalidation groups.
    #[must_use]
    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Keeps the connection open after close.
    #[must_use]
    pub const fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Returns command errors instead of failure values.
    #[must_use]
    pub const fn exceptions(mut self, exceptions: bool) -> Self {
        self.exceptions = Some(exceptions);
        self
    }

    /// Sets the replication mode explicitly.
    #[must_use]
    pub const fn replication(mut self, mode: ReplicationMode) -> Self {
        self.replication = Some(mode);
        self
    }

    /// Sets the scan batch size.
    #[must_use]
    pub const fn scan_count(mut self, count: usize) -> Self {
        self.scan_count = count;
        self
    }

    /// Returns whether command errors are surfaced as `Err`.
    #[must_use]
    pub fn raises_errors(&self) -> bool {
        self.exceptions.unwrap_or(false)
    }
}

fn default_scheme() -> String {
    "tcp".to_string()
}

const fn default_port() -> u16 {
    6379
}

fn default_service() -> String {
    "mymaster".to_string()
}

const fn default_duration() -> u64 {
    3600
}

const fn default_scan_count() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.scheme, "tcp");
        assert_eq!(config.port, 6379);
        assert_eq!(config.database, 0);
        assert_eq!(config.service, "mymaster");
        assert_eq!(config.prefix, "");
        assert_eq!(config.duration, 3600);
        assert!(config.server.is_none());
        assert!(config.sentinel.is_none());
        assert!(!config.persistent);
        assert!(!config.raises_errors());
    }

    #[test]
    fn addresses_normalize() {
        assert_eq!(Addresses::from("10.0.0.1").to_list(), vec!["10.0.0.1"]);
        assert_eq!(
            Addresses::from(vec!["a", "", "b"]).to_list(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(Addresses::from("").is_empty());
        assert!(Addresses::Many(vec![]).is_empty());
        assert!(Addresses::from("a").is_scalar());
        assert!(!Addresses::from(vec!["a"]).is_scalar());
    }

    #[test]
    fn deserialize_scalar_and_list_from_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            server = "redis.internal"
            prefix = "app_"
            duration = 0
            groups = ["posts", "comments"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server, Some(Addresses::One("redis.internal".to_string())));
        assert_eq!(config.prefix, "app_");
        assert_eq!(config.duration, 0);
        assert_eq!(config.groups, vec!["posts", "comments"]);
        assert_eq!(config.port, 6379);

        let config: EngineConfig = toml::from_str(
            r#"
            sentinel = ["s1", "s2", "s3"]
            port = 26379
            service = "cache-master"
            password = "secret"
            exceptions = true
            replication = "replicated"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.sentinel.as_ref().map(Addresses::to_list),
            Some(vec!["s1".to_string(), "s2".to_string(), "s3".to_string()])
        );
        assert_eq!(config.port, 26379);
        assert_eq!(config.service, "cache-master");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert!(config.raises_errors());
        assert_eq!(config.replication, Some(ReplicationMode::Replicated));
    }

    #[test]
    fn builder() {
        let config = EngineConfig::new()
            .server(vec!["a", "b"])
            .port(6380)
            .password("pw")
            .database(2)
            .prefix("p_")
            .duration(60)
            .groups(["g1"])
            .persistent(true)
            .exceptions(true)
            .scan_count(10);
        assert_eq!(config.server, Some(Addresses::from(vec!["a", "b"])));
        assert_eq!(config.port, 6380);
        assert_eq!(config.database, 2);
        assert_eq!(config.groups, vec!["g1"]);
        assert!(config.persistent);
        assert!(config.raises_errors());
        assert_eq!(config.scan_count, 10);
    }
}
