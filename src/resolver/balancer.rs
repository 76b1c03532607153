use super::{ClientConn, Resolver, State, Target};
use crate::error::DiscoveryError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tower::discover::Change;
use tracing::{debug, warn};

const BALANCE_CAPACITY: usize = 64;

/// Feeds a tonic balanced channel from full address sets.
///
/// The channel only understands insert/remove events, so each pushed set is
/// diffed against what the channel already holds. Sends never wait: tonic only
/// drains the channel while requests are in flight, so a full channel leaves
/// the rest of the diff for the next push.
pub struct BalancedClientConn {
    tx: mpsc::Sender<Change<String, Endpoint>>,
    current: Mutex<BTreeSet<String>>,
}

impl BalancedClientConn {
    pub fn new(tx: mpsc::Sender<Change<String, Endpoint>>) -> Self {
        Self {
            tx,
            current: Mutex::new(BTreeSet::new()),
        }
    }

    /// Addresses the channel has been told about.
    pub async fn addresses(&self) -> Vec<String> {
        self.current.lock().await.iter().cloned().collect()
    }

    fn send(&self, change: Change<String, Endpoint>) -> Result<()> {
        self.tx.try_send(change).map_err(|e| match e {
            TrySendError::Full(_) => anyhow!("balanced channel is full"),
            TrySendError::Closed(_) => anyhow!("balanced channel is gone"),
        })
    }
}

#[async_trait]
impl ClientConn for BalancedClientConn {
    async fn update_state(&self, state: State) -> Result<()> {
        let next: BTreeSet<String> = state.addresses.into_iter().map(|a| a.addr).collect();
        let mut current = self.current.lock().await;

        let stale: Vec<String> = current.difference(&next).cloned().collect();
        let fresh: Vec<String> = next.difference(&current).cloned().collect();
        let pending = stale.len() + fresh.len();

        for (applied, addr) in stale.into_iter().enumerate() {
            self.send(Change::Remove(addr.clone()))
                .with_context(|| format!("{} of {} changes deferred", pending - applied, pending))?;
            debug!("Removed endpoint {}", addr);
            current.remove(&addr);
        }

        for addr in fresh {
            let endpoint = match Endpoint::from_shared(format!("http://{}", addr)) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    warn!("Skipping invalid endpoint {}: {}", addr, e);
                    continue;
                }
            };
            self.send(Change::Insert(addr.clone(), endpoint))
                .with_context(|| format!("endpoint {} and later ones deferred", addr))?;
            debug!("Added endpoint {}", addr);
            current.insert(addr);
        }

        Ok(())
    }
}

/// A balanced channel together with the resolver feeding it.
pub struct ResolvedChannel {
    channel: Channel,
    resolver: Box<dyn Resolver>,
}

impl ResolvedChannel {
    /// A cheap clone of the underlying channel.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    pub fn resolve_now(&self) {
        self.resolver.resolve_now();
    }

    pub async fn close(mut self) {
        self.resolver.close().await;
    }
}

/// Dial a `scheme:///service` target through the resolver installed for its
/// scheme.
pub async fn dial(target: &str) -> Result<ResolvedChannel, DiscoveryError> {
    let target = Target::parse(target)?;
    let builder =
        super::get(&target.scheme).ok_or_else(|| DiscoveryError::UnknownScheme(target.scheme.clone()))?;

    let (channel, tx) = Channel::balance_channel::<String>(BALANCE_CAPACITY);
    let conn = std::sync::Arc::new(BalancedClientConn::new(tx));
    let resolver = builder.build(&target, conn).await?;

    Ok(ResolvedChannel { channel, resolver })
}
