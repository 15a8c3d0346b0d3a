//! # sc-cache-redis
//!
//! Redis cache engine implementing the `sc-cache` contract.
//!
//! The engine reaches the store in one of three ways, chosen from
//! configuration:
//!
//! - a single server
//! - a primary/replica server list
//! - a master discovered through Redis Sentinel
//!
//! One connection is opened per engine and reused for every command. Integers
//! are stored as plain decimal text so counters stay usable server side, and
//! groups are invalidated by bumping a version counter instead of deleting keys.
//!
//! ## Example
//!
//! ```ignore
//! use sc_cache::CacheEngine;
//! use sc_cache_redis::{EngineConfig, RedisEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::new()
//!         .sentinel(vec!["10.0.0.1", "10.0.0.2"])
//!         .port(26379)
//!         .service("mymaster")
//!         .prefix("app_");
//!
//!     let mut engine = RedisEngine::new(config);
//!     if !engine.init().await? {
//!         eprintln!("cache unavailable");
//!     }
//!
//!     engine.set("greeting", &"hello", None).await?;
//!     let value: Option<String> = engine.get("greeting").await?;
//!
//!     engine.close().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod fred_client;
pub mod memory;
pub mod topology;

pub use config::{Addresses, EngineConfig, ReplicationMode};
pub use connection::{Connector, EngineState, Transport};
pub use engine::RedisEngine;
pub use fred_client::{FredConnector, FredTransport};
pub use memory::{MemoryConnector, MemoryStore, MemoryTransport};
pub use topology::{resolve, ConnectionPlan, Node, Topology};
