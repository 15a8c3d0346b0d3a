//! Connection topology resolution.
//!
//! Turns an [`EngineConfig`] into a [`ConnectionPlan`]. Resolution is pure: the
//! configuration is only read.

use sc_cache::{CacheError, CacheResult};

use crate::config::{Addresses, EngineConfig, ReplicationMode};

/// Replication tag used for primary/replica server lists.
pub const PREDIS_REPLICATION: &str = "predis";

/// Replication tag used for sentinel-discovered masters.
pub const SENTINEL_REPLICATION: &str = "sentinel";

/// A resolved node. Scheme, port and password are copied from the
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Transport scheme.
    pub scheme: String,
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Password sent on connect.
    pub password: Option<String>,
}

/// Auth and database applied to the data-serving connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterParameters {
    /// Password for the master.
    pub password: Option<String>,
    /// Logical database index.
    pub database: u8,
}

/// Replication options of a server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationOptions {
    /// Parameters applied to the primary connection.
    pub master: MasterParameters,
}

/// How the client reaches the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Connect to the listed servers directly.
    Direct {
        /// Ordered nodes; with replication the first one is the primary.
        nodes: Vec<Node>,
        /// Replication options, absent for a plain single-node connection.
        replication: Option<ReplicationOptions>,
    },
    /// Ask the sentinels for the current master of `service`.
    Sentinel {
        /// Ordered sentinel endpoints.
        nodes: Vec<Node>,
        /// Service name tracked by the sentinels.
        service: String,
        /// Parameters applied to the discovered master, not to the sentinels.
        master: MasterParameters,
    },
}

/// Concrete connection strategy derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPlan {
    /// Topology to connect to.
    pub topology: Topology,
    /// Whether command errors should be raised, if configured.
    pub exceptions: Option<bool>,
}

impl ConnectionPlan {
    /// Nodes of the plan, in order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        match &self.topology {
            Topology::Direct { nodes, .. } | Topology::Sentinel { nodes, .. } => nodes,
        }
    }

    /// Replication tag, or `None` for a plain connection.
    #[must_use]
    pub const fn replication_tag(&self) -> Option<&'static str> {
        match &self.topology {
            Topology::Direct {
                replication: Some(_),
                ..
            } => Some(PREDIS_REPLICATION),
            Topology::Direct {
                replication: None, ..
            } => None,
            Topology::Sentinel { .. } => Some(SENTINEL_REPLICATION),
        }
    }

    /// Parameters for the data-serving connection, if the plan carries any.
    #[must_use]
    pub fn master(&self) -> Option<&MasterParameters> {
        match &self.topology {
            Topology::Direct { replication, .. } => {
                replication.as_ref().map(|options| &options.master)
            }
            Topology::Sentinel { master, .. } => Some(master),
        }
    }
}

/// Resolves a configuration into a connection plan.
///
/// ## Errors
///
/// Returns `CacheError::Configuration` if neither or both of `server` and
/// `sentinel` are set.
pub fn resolve(config: &EngineConfig) -> CacheResult<ConnectionPlan> {
    let server = non_empty(config.server.as_ref());
    let sentinel = non_empty(config.sentinel.as_ref());

    let topology = match (server, sentinel) {
        (None, None) => {
            return Err(CacheError::Configuration(
                "no redis server configured".to_string(),
            ))
        }
        (Some(_), Some(_)) => {
            return Err(CacheError::Configuration(
                "both sentinel and server are set".to_string(),
            ))
        }
        (None, Some(sentinels)) => Topology::Sentinel {
            nodes: nodes(config, sentinels),
            service: config.service.clone(),
            master: master_parameters(config),
        },
        (Some(servers), None) => {
            let mode = config.replication.unwrap_or(if servers.is_scalar() {
                ReplicationMode::None
            } else {
                ReplicationMode::Replicated
            });
            let replication = match mode {
                ReplicationMode::None => None,
                ReplicationMode::Replicated => Some(ReplicationOptions {
                    master: master_parameters(config),
                }),
            };
            Topology::Direct {
                nodes: nodes(config, servers),
                replication,
            }
        }
    };

    Ok(ConnectionPlan {
        topology,
        exceptions: config.exceptions,
    })
}

fn non_empty(addresses: Option<&Addresses>) -> Option<&Addresses> {
    addresses.filter(|addresses| !addresses.is_empty())
}

fn nodes(config: &EngineConfig, addresses: &Addresses) -> Vec<Node> {
    addresses
        .to_list()
        .into_iter()
        .map(|host| Node {
            scheme: config.scheme.clone(),
            host,
            port: config.port,
            password: config.password.clone(),
        })
        .collect()
}

fn master_parameters(config: &EngineConfig) -> MasterParameters {
    MasterParameters {
        password: config.password.clone(),
        database: config.database,
    }
}
