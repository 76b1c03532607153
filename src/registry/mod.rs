pub mod consul;
pub mod memory;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use consul::{ConsulClient, RegistryConfig};
pub use memory::{Call, MemoryRegistry, Op};

/// Build the unique key of one instance of `name` listening on `host:port`.
pub fn service_id(name: &str, host: &str, port: u16) -> String {
    format!("{}-{}-{}", name, host, port)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Passing => write!(f, "passing"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Tags")]
    pub tags: Vec<String>,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Port")]
    pub port: u16,
}

/// A TTL check bound to a registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRegistration {
    pub id: String,
    pub name: String,
    pub service_id: String,
    pub ttl: Duration,
    pub status: HealthStatus,
}

/// One healthy instance as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub id: String,
    pub service: String,
    pub address: String,
    pub port: u16,
}

impl ServiceEntry {
    /// `host:port` form used by the transport, with IPv6 hosts bracketed.
    pub fn network_address(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register a service instance
    async fn service_register(&self, registration: &ServiceRegistration) -> Result<()>;

    /// Remove a service instance
    async fn service_deregister(&self, service_id: &str) -> Result<()>;

    /// Attach a TTL health check to a registered service
    async fn check_register(&self, check: &CheckRegistration) -> Result<()>;

    /// Remove a health check
    async fn check_deregister(&self, check_id: &str) -> Result<()>;

    /// Refresh a TTL check with the given status
    async fn update_ttl(&self, check_id: &str, output: &str, status: HealthStatus) -> Result<()>;

    /// Instances of `service` whose checks are all passing
    async fn healthy_service_entries(&self, service: &str) -> Result<Vec<ServiceEntry>>;
}
