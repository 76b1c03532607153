pub mod config;
pub mod error;
pub mod grpc;
pub mod registry;
pub mod task;
pub mod utils;

#[cfg(feature = "server")]
pub mod register;

#[cfg(feature = "client")]
pub mod resolver;

pub use config::{
    init_env, CHECK_TTL_SECS, CONSUL_ADDR, CONSUL_TOKEN, HEARTBEAT_INTERVAL_SECS, RESOLVER_SCHEME,
};
pub use error::DiscoveryError;
