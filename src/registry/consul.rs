use super::{CheckRegistration, HealthStatus, RegistryClient, ServiceEntry, ServiceRegistration};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Agent address, `host:port` or a full URL.
    pub address: String,

    /// Timeout applied to every request.
    pub timeout: Duration,

    pub token: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            timeout: Duration::from_secs(5),
            token: None,
        }
    }
}

impl RegistryConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        }
    }
}

/// Client for the Consul agent HTTP API.
#[derive(Clone)]
pub struct ConsulClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl ConsulClient {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build consul http client")?;

        let base_url = Url::parse(&config.base_url())
            .with_context(|| format!("parse consul address {}", config.address))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("consul address {} cannot hold a path", config.address);
        }

        Ok(Self {
            http,
            base_url,
            token: config.token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// API url under `v1/`, each segment percent-encoded on its own.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("consul address {} cannot hold a path", self.base_url))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn put<T: Serialize + ?Sized>(&self, segments: &[&str], body: Option<&T>) -> Result<()> {
        let url = self.url(segments)?;
        let mut request = self.authorize(self.http.put(url.clone()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("consul {} returned {}: {}", url.path(), status, text.trim());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CheckBody<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "ServiceID")]
    service_id: &'a str,
    #[serde(rename = "TTL")]
    ttl: String,
    #[serde(rename = "Status")]
    status: HealthStatus,
}

impl<'a> From<&'a CheckRegistration> for CheckBody<'a> {
    fn from(check: &'a CheckRegistration) -> Self {
        Self {
            id: &check.id,
            name: &check.name,
            service_id: &check.service_id,
            ttl: format!("{}s", check.ttl.as_secs().max(1)),
            status: check.status,
        }
    }
}

#[derive(Debug, Serialize)]
struct TtlUpdate<'a> {
    #[serde(rename = "Status")]
    status: HealthStatus,
    #[serde(rename = "Output")]
    output: &'a str,
}

#[derive(Debug, Deserialize)]
struct HealthNode {
    #[serde(rename = "Address", default)]
    address: String,
}

#[derive(Debug, Deserialize)]
struct HealthService {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Service", default)]
    service: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Node")]
    node: HealthNode,
    #[serde(rename = "Service")]
    service: HealthService,
}

impl From<HealthEntry> for ServiceEntry {
    fn from(entry: HealthEntry) -> Self {
        // Consul leaves the service address empty when it equals the node's.
        let address = if entry.service.address.is_empty() {
            entry.node.address
        } else {
            entry.service.address
        };

        ServiceEntry {
            id: entry.service.id,
            service: entry.service.service,
            address,
            port: entry.service.port,
        }
    }
}

fn parse_health_entries(body: &str) -> Result<Vec<ServiceEntry>> {
    let entries: Vec<HealthEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().map(ServiceEntry::from).collect())
}

#[async_trait]
impl RegistryClient for ConsulClient {
    async fn service_register(&self, registration: &ServiceRegistration) -> Result<()> {
        self.put(&["agent", "service", "register"], Some(registration))
            .await
    }

    async fn service_deregister(&self, service_id: &str) -> Result<()> {
        self.put::<()>(&["agent", "service", "deregister", service_id], None)
            .await
    }

    async fn check_register(&self, check: &CheckRegistration) -> Result<()> {
        self.put(&["agent", "check", "register"], Some(&CheckBody::from(check)))
            .await
    }

    async fn check_deregister(&self, check_id: &str) -> Result<()> {
        self.put::<()>(&["agent", "check", "deregister", check_id], None)
            .await
    }

    async fn update_ttl(&self, check_id: &str, output: &str, status: HealthStatus) -> Result<()> {
        let body = TtlUpdate { status, output };
        self.put(&["agent", "check", "update", check_id], Some(&body))
            .await
    }

    async fn healthy_service_entries(&self, service: &str) -> Result<Vec<ServiceEntry>> {
        let url = self.url(&["health", "service", service])?;
        let request = self.http.get(url).query(&[("passing", "true")]);

        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            anyhow::bail!("consul health/service/{} returned {}: {}", service, status, body.trim());
        }

        let entries = parse_health_entries(&body)
            .with_context(|| format!("decode health entries of {}", service))?;
        debug!("Consul reports {} healthy entries for {}", entries.len(), service);
        Ok(entries)
    }
}
