//! Client-side name resolution.
//!
//! A [`Builder`] is installed once per scheme into a process-wide table. Dialing
//! `scheme:///service` looks the builder up and asks it for a [`Resolver`], which
//! keeps pushing the service's healthy addresses into a [`ClientConn`].

pub mod balancer;
pub mod consul;


use crate::error::DiscoveryError;
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub use balancer::{dial, BalancedClientConn, ResolvedChannel};
pub use consul::{
    install_consul_resolver, install_consul_resolver_with_config, ConsulBuilder, ConsulResolver,
    ResolverConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    /// `host:port`
    pub addr: String,
}

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

/// The full address set of a target. Every push replaces the previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub addresses: Vec<Address>,
}

/// A parsed dial target, `scheme://authority/endpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub scheme: String,
    pub authority: String,
    pub endpoint: String,
}

impl Target {
    pub fn parse(target: &str) -> Result<Self, DiscoveryError> {
        let (scheme, rest) = target
            .split_once("://")
            .ok_or_else(|| DiscoveryError::InvalidTarget(target.to_string()))?;
        let (authority, endpoint) = rest.split_once('/').unwrap_or(("", rest));

        if scheme.is_empty() || endpoint.is_empty() {
            return Err(DiscoveryError::InvalidTarget(target.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

/// Sink the resolver pushes address sets into.
#[async_trait]
pub trait ClientConn: Send + Sync {
    async fn update_state(&self, state: State) -> Result<()>;
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Ask for an out-of-band refresh. Never blocks; requests made while one is
    /// already pending collapse into it.
    fn resolve_now(&self);

    /// Stop watching and wait for the watch loop to exit. Idempotent.
    async fn close(&mut self);

    fn scheme(&self) -> &str;
}

#[async_trait]
pub trait Builder: Send + Sync {
    /// Resolve `target` once, push the result into `conn`, then keep watching.
    async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn>,
    ) -> Result<Box<dyn Resolver>, DiscoveryError>;

    fn scheme(&self) -> &str;
}

static BUILDERS: Lazy<RwLock<HashMap<String, Arc<dyn Builder>>>> = Lazy::new(Default::default);

/// Install `builder` for its scheme. A scheme can only be installed once per
/// process; later attempts are rejected and leave the first builder in place.
pub fn register(builder: Arc<dyn Builder>) -> Result<(), DiscoveryError> {
    let scheme = builder.scheme().to_string();
    let mut builders = BUILDERS.write().unwrap_or_else(|e| e.into_inner());

    if builders.contains_key(&scheme) {
        warn!("Resolver for scheme {} already installed, keeping the first one", scheme);
        return Err(DiscoveryError::SchemeInstalled(scheme));
    }

    info!("Installed resolver for scheme {}", scheme);
    builders.insert(scheme, builder);
    Ok(())
}

pub fn get(scheme: &str) -> Option<Arc<dyn Builder>> {
    BUILDERS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(scheme)
        .cloned()
}
