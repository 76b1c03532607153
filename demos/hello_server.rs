use anyhow::Result;
use clap::Parser;
use consul_discovery::grpc::handlers::hello::HelloHandler;
use consul_discovery::grpc::pb::hello::hello_service_server::HelloServiceServer;
use consul_discovery::grpc::server::GrpcServer;
use consul_discovery::register::LeaseRegistrar;
use consul_discovery::registry::RegistryConfig;
use consul_discovery::utils::logger;
use consul_discovery::{init_env, CHECK_TTL_SECS, CONSUL_ADDR, CONSUL_TOKEN, HEARTBEAT_INTERVAL_SECS};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to serve on
    #[arg(short, long, default_value_t = 8082)]
    port: u16,

    /// Address announced to the registry, defaults to the first local IP
    #[arg(long)]
    host: Option<String>,

    /// Logical service name
    #[arg(short, long, default_value = "HelloService")]
    service: String,

    /// Consul agent address, overrides CONSUL_ADDR
    #[arg(long)]
    consul: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    let _guard = logger::init("./logs".to_string())?;
    let args = Args::parse();

    let consul = args.consul.unwrap_or_else(|| CONSUL_ADDR.clone());
    let config = RegistryConfig::new(consul).token(CONSUL_TOKEN.clone());
    let registrar = LeaseRegistrar::with_config(config, Duration::from_secs(*CHECK_TTL_SECS))?;

    let mut server = GrpcServer::new(
        registrar,
        args.service.clone(),
        Duration::from_secs(*HEARTBEAT_INTERVAL_SECS),
    );
    let instance = match &args.host {
        Some(host) => {
            server = server.advertise_host(host.clone());
            format!("{}:{}", host, args.port)
        }
        None => format!("port {}", args.port),
    };

    info!("Starting {} on port {}", args.service, args.port);
    server
        .serve(
            HelloServiceServer::new(HelloHandler::new(instance)),
            args.port,
            async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down...");
            },
        )
        .await
}
