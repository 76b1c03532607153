use super::{Address, Builder, ClientConn, Resolver, State, Target};
use crate::error::DiscoveryError;
use crate::registry::{ConsulClient, RegistryClient, RegistryConfig};
use crate::task::BackgroundTask;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Period of the background refresh, independent of server heartbeats.
    pub refresh_interval: Duration,

    /// Fail `build` when the first resolve fails instead of starting empty.
    pub strict_initial_resolve: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            strict_initial_resolve: false,
        }
    }
}

impl ResolverConfig {
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn strict_initial_resolve(mut self, strict: bool) -> Self {
        self.strict_initial_resolve = strict;
        self
    }
}

/// Produces one [`ConsulResolver`] per dialed service name.
pub struct ConsulBuilder {
    scheme: String,
    client: Arc<dyn RegistryClient>,
    config: ResolverConfig,
}

impl ConsulBuilder {
    pub fn new(address: impl Into<String>, scheme: impl Into<String>) -> Result<Self, DiscoveryError> {
        Self::with_config(RegistryConfig::new(address), scheme)
    }

    /// Builder whose registry requests carry `config`'s token and timeout.
    pub fn with_config(
        config: RegistryConfig,
        scheme: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let client = ConsulClient::new(config).map_err(DiscoveryError::Client)?;
        Ok(Self::with_client(Arc::new(client), scheme))
    }

    pub fn with_client(client: Arc<dyn RegistryClient>, scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            client,
            config: ResolverConfig::default(),
        }
    }

    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }
}

/// Healthy addresses of `service`, one per instance.
pub async fn resolve(
    client: &dyn RegistryClient,
    service: &str,
) -> Result<Vec<Address>, DiscoveryError> {
    let entries = client
        .healthy_service_entries(service)
        .await
        .map_err(|source| DiscoveryError::Resolve {
            service: service.to_string(),
            source,
        })?;

    Ok(entries
        .iter()
        .map(|entry| Address::new(entry.network_address()))
        .collect())
}

async fn push(conn: &dyn ClientConn, service: &str, addresses: Vec<Address>) {
    let count = addresses.len();
    match conn.update_state(State { addresses }).await {
        Ok(()) => debug!("Pushed {} addresses of {}", count, service),
        Err(e) => warn!("Update state of {} error: {}", service, e),
    }
}

#[async_trait]
impl Builder for ConsulBuilder {
    async fn build(
        &self,
        target: &Target,
        conn: Arc<dyn ClientConn>,
    ) -> Result<Box<dyn Resolver>, DiscoveryError> {
        let service = target.endpoint.clone();

        let initial = match resolve(self.client.as_ref(), &service).await {
            Ok(addresses) => addresses,
            Err(e) if self.config.strict_initial_resolve => return Err(e),
            Err(e) => {
                error!("Initial resolve failed, starting with no addresses: {}", e);
                Vec::new()
            }
        };
        info!("Resolved {} addresses for {}", initial.len(), service);
        push(conn.as_ref(), &service, initial.clone()).await;

        let refresh = Arc::new(Notify::new());
        let watcher = spawn_watcher(
            Arc::clone(&self.client),
            conn,
            service.clone(),
            Arc::clone(&refresh),
            initial,
            self.config.refresh_interval,
        );

        Ok(Box::new(ConsulResolver {
            scheme: self.scheme.clone(),
            service,
            refresh,
            watcher: Some(watcher),
        }))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

/// Watches one service name until closed.
pub struct ConsulResolver {
    scheme: String,
    service: String,
    refresh: Arc<Notify>,
    watcher: Option<BackgroundTask>,
}

#[async_trait]
impl Resolver for ConsulResolver {
    fn resolve_now(&self) {
        // Notify holds at most one permit: a pending refresh absorbs the rest.
        if self.watcher.is_some() {
            self.refresh.notify_one();
        }
    }

    async fn close(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
            info!("Closed resolver of {}", self.service);
        }
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

fn spawn_watcher(
    client: Arc<dyn RegistryClient>,
    conn: Arc<dyn ClientConn>,
    service: String,
    refresh: Arc<Notify>,
    mut last_known: Vec<Address>,
    period: Duration,
) -> BackgroundTask {
    let period = period.max(Duration::from_millis(1));

    BackgroundTask::spawn(format!("resolver {}", service), move |mut stop| async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = refresh.notified() => debug!("Refresh of {} requested", service),
                _ = ticker.tick() => {}
            }

            match resolve(client.as_ref(), &service).await {
                Ok(addresses) => last_known = addresses,
                Err(e) => error!("{}, keeping {} known addresses", e, last_known.len()),
            }

            // A consumer that stops taking updates must not keep close() waiting.
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = push(conn.as_ref(), &service, last_known.clone()) => {}
            }
        }
    })
}

/// Install a [`ConsulBuilder`] for `scheme` into the process-wide resolver table.
///
/// Meant to be called once at startup; installing the same scheme twice fails
/// with [`DiscoveryError::SchemeInstalled`].
pub fn install_consul_resolver(address: &str, scheme: &str) -> Result<(), DiscoveryError> {
    install_consul_resolver_with_config(RegistryConfig::new(address), scheme)
}

/// Like [`install_consul_resolver`], with the token and timeout taken from `config`.
pub fn install_consul_resolver_with_config(
    config: RegistryConfig,
    scheme: &str,
) -> Result<(), DiscoveryError> {
    let builder = ConsulBuilder::with_config(config, scheme)?;
    super::register(Arc::new(builder))
}
