use crate::register::{LeaseRegistrar, RegistrationInfo};
use anyhow::Result;
use local_ip_address::local_ip;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tonic::body::BoxBody;
use tonic::codegen::http::{Request, Response};
use tonic::codegen::Service;
use tonic::server::NamedService;
use tonic::transport::Server;
use tracing::{error, info};

/// A tonic server that announces itself to the registry for as long as it serves.
pub struct GrpcServer {
    registrar: LeaseRegistrar,
    service_name: String,
    heartbeat_interval: Duration,
    host: Option<String>,
}

impl GrpcServer {
    pub fn new(registrar: LeaseRegistrar, service_name: String, heartbeat_interval: Duration) -> Self {
        Self {
            registrar,
            service_name,
            heartbeat_interval,
            host: None,
        }
    }

    /// Address announced to the registry. Defaults to the first local IP.
    pub fn advertise_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    fn registration(&self, port: u16) -> Result<RegistrationInfo> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => local_ip()?.to_string(),
        };

        Ok(RegistrationInfo {
            service_name: self.service_name.clone(),
            host,
            port,
            heartbeat_interval: self.heartbeat_interval,
        })
    }

    /// Register, serve until `shutdown` resolves, then deregister.
    pub async fn serve<S, F>(&self, service: S, port: u16, shutdown: F) -> Result<()>
    where
        S: Service<Request<BoxBody>, Response = Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let lease = self.registrar.register(self.registration(port)?).await?;
        info!("Service {} registered as {}", self.service_name, lease.service_id());

        let served = Server::builder()
            .add_service(service)
            .serve_with_shutdown(addr, shutdown)
            .await;

        let deregistered = self.registrar.deregister(lease).await;
        if let Err(e) = &served {
            error!("gRPC server error: {}", e);
        }
        served?;
        deregistered?;
        Ok(())
    }
}
