#[cfg(test)]
mod tests;

use crate::error::DiscoveryError;
use crate::registry::{
    service_id, CheckRegistration, ConsulClient, HealthStatus, RegistryClient, RegistryConfig,
    ServiceRegistration,
};
use crate::task::BackgroundTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What a server announces about itself.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: Duration,
}

/// Proof of a live registration. Hand it back to [`LeaseRegistrar::deregister`]
/// to withdraw it; dropping it only stops the heartbeat and lets the TTL lapse.
pub struct LeaseHandle {
    service_id: String,
    heartbeat: BackgroundTask,
}

impl LeaseHandle {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }
}

pub struct LeaseRegistrar {
    client: Arc<dyn RegistryClient>,
    ttl: Duration,
}

impl LeaseRegistrar {
    pub fn new(client: Arc<dyn RegistryClient>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    /// Registrar talking to the Consul agent at `address`.
    pub fn connect(address: impl Into<String>, ttl: Duration) -> Result<Self, DiscoveryError> {
        Self::with_config(RegistryConfig::new(address), ttl)
    }

    pub fn with_config(config: RegistryConfig, ttl: Duration) -> Result<Self, DiscoveryError> {
        let client = ConsulClient::new(config).map_err(DiscoveryError::Client)?;
        Ok(Self::new(Arc::new(client), ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register the instance, attach a passing TTL check and start heartbeating.
    ///
    /// A failed check registration leaves the service entry in place; rolling
    /// it back is up to the caller.
    pub async fn register(&self, info: RegistrationInfo) -> Result<LeaseHandle, DiscoveryError> {
        let id = service_id(&info.service_name, &info.host, info.port);

        let registration = ServiceRegistration {
            id: id.clone(),
            name: info.service_name.clone(),
            tags: vec![info.service_name.clone()],
            address: info.host.clone(),
            port: info.port,
        };
        self.client
            .service_register(&registration)
            .await
            .map_err(|source| DiscoveryError::ServiceRegister {
                id: id.clone(),
                source,
            })?;

        let check = CheckRegistration {
            id: id.clone(),
            name: info.service_name.clone(),
            service_id: id.clone(),
            ttl: self.ttl,
            status: HealthStatus::Passing,
        };
        self.client
            .check_register(&check)
            .await
            .map_err(|source| DiscoveryError::CheckRegister {
                id: id.clone(),
                source,
            })?;

        info!("Registered service {} with a {:?} ttl check", id, self.ttl);

        let heartbeat = spawn_heartbeat(Arc::clone(&self.client), id.clone(), info.heartbeat_interval);
        Ok(LeaseHandle {
            service_id: id,
            heartbeat,
        })
    }

    /// Stop the heartbeat, then remove the service and its check.
    ///
    /// The heartbeat is joined before the registry is touched, so no TTL update
    /// can land after the check is gone. A failed service deregistration is
    /// only logged; the check deregistration decides the result.
    pub async fn deregister(&self, handle: LeaseHandle) -> Result<(), DiscoveryError> {
        let LeaseHandle {
            service_id,
            heartbeat,
        } = handle;
        heartbeat.stop().await;

        match self.client.service_deregister(&service_id).await {
            Ok(()) => info!("Deregistered service {} from registry", service_id),
            Err(e) => warn!("Deregister service {} error: {}", service_id, e),
        }

        if let Err(source) = self.client.check_deregister(&service_id).await {
            error!("Deregister check {} error: {}", service_id, source);
            return Err(DiscoveryError::CheckDeregister {
                id: service_id,
                source,
            });
        }

        Ok(())
    }
}

fn spawn_heartbeat(
    client: Arc<dyn RegistryClient>,
    id: String,
    period: Duration,
) -> BackgroundTask {
    let period = period.max(Duration::from_millis(1));

    BackgroundTask::spawn(format!("heartbeat {}", id), move |mut stop| async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            // A hung call must neither swallow the following ticks nor hold up stop.
            let update = time::timeout(period, client.update_ttl(&id, "", HealthStatus::Passing));
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                result = update => match result {
                    Ok(Ok(())) => debug!("Refreshed ttl of {}", id),
                    Ok(Err(e)) => warn!("Update ttl of service {} error: {}", id, e),
                    Err(_) => warn!("Update ttl of service {} timed out after {:?}", id, period),
                },
            }
        }

        debug!("Heartbeat of {} stopped", id);
    })
}
