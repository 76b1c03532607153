use anyhow::Result;
use clap::Parser;
use consul_discovery::grpc::pb::hello::{hello_service_client::HelloServiceClient, HelloRequest};
use consul_discovery::registry::RegistryConfig;
use consul_discovery::resolver::{dial, install_consul_resolver_with_config};
use consul_discovery::utils::logger;
use consul_discovery::{init_env, CONSUL_ADDR, CONSUL_TOKEN, RESOLVER_SCHEME};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Logical service name to call
    #[arg(short, long, default_value = "HelloService")]
    service: String,

    /// Name sent in every greeting
    #[arg(short, long, default_value = "user1")]
    name: String,

    /// Consul agent address, overrides CONSUL_ADDR
    #[arg(long)]
    consul: Option<String>,

    /// Number of calls, 0 keeps calling until interrupted
    #[arg(short, long, default_value_t = 0)]
    count: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env();
    let _guard = logger::init("./logs".to_string())?;
    let args = Args::parse();

    let consul = args.consul.unwrap_or_else(|| CONSUL_ADDR.clone());
    let config = RegistryConfig::new(consul).token(CONSUL_TOKEN.clone());
    install_consul_resolver_with_config(config, &RESOLVER_SCHEME)?;

    let resolved = dial(&format!("{}:///{}", *RESOLVER_SCHEME, args.service)).await?;
    let mut client = HelloServiceClient::new(resolved.channel());

    let mut sent = 0;
    loop {
        let request = tonic::Request::new(HelloRequest {
            name: args.name.clone(),
        });
        match tokio::time::timeout(Duration::from_secs(1), client.say_hello(request)).await {
            Ok(Ok(response)) => info!("Hello: {}", response.into_inner().result),
            Ok(Err(status)) => {
                warn!("could not greet: {}", status);
                resolved.resolve_now();
            }
            Err(_) => warn!("could not greet: timed out"),
        }

        sent += 1;
        if args.count != 0 && sent >= args.count {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }

    resolved.close().await;
    Ok(())
}
