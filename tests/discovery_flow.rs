use anyhow::Result;
use async_trait::async_trait;
use consul_discovery::register::{LeaseRegistrar, RegistrationInfo};
use consul_discovery::registry::{HealthStatus, MemoryRegistry};
use consul_discovery::resolver::{Builder, ClientConn, ConsulBuilder, Resolver, State, Target};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Default)]
struct LatestState {
    latest: Mutex<Option<Vec<String>>>,
}

impl LatestState {
    fn addresses(&self) -> Vec<String> {
        self.latest.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl ClientConn for LatestState {
    async fn update_state(&self, state: State) -> Result<()> {
        let mut addrs: Vec<String> = state.addresses.into_iter().map(|a| a.addr).collect();
        addrs.sort();
        *self.latest.lock().unwrap() = Some(addrs);
        Ok(())
    }
}

fn info(host: &str, port: u16) -> RegistrationInfo {
    RegistrationInfo {
        service_name: "HelloService".to_string(),
        host: host.to_string(),
        port,
        heartbeat_interval: Duration::from_secs(1),
    }
}

#[tokio::test(start_paused = true)]
async fn test_servers_come_and_go() {
    let registry = Arc::new(MemoryRegistry::new());
    let registrar = LeaseRegistrar::new(registry.clone(), Duration::from_secs(15));
    let builder = ConsulBuilder::with_client(registry.clone(), "flow");
    let conn = Arc::new(LatestState::default());

    let first = registrar.register(info("10.0.0.1", 9000)).await.unwrap();
    let target = Target::parse("flow:///HelloService").unwrap();
    let mut resolver = builder.build(&target, conn.clone()).await.unwrap();
    assert_eq!(conn.addresses(), vec!["10.0.0.1:9000"]);

    let second = registrar.register(info("10.0.0.2", 9000)).await.unwrap();
    resolver.resolve_now();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(conn.addresses(), vec!["10.0.0.1:9000", "10.0.0.2:9000"]);

    registrar.deregister(first).await.unwrap();
    sleep(Duration::from_millis(1100)).await;
    assert_eq!(conn.addresses(), vec!["10.0.0.2:9000"]);

    registrar.deregister(second).await.unwrap();
    sleep(Duration::from_millis(1100)).await;
    assert!(conn.addresses().is_empty());

    resolver.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_lease_drops_out() {
    let registry = Arc::new(MemoryRegistry::new());
    let registrar = LeaseRegistrar::new(registry.clone(), Duration::from_secs(15));
    let builder = ConsulBuilder::with_client(registry.clone(), "flow");
    let conn = Arc::new(LatestState::default());

    // Simulate a server that died without deregistering: its heartbeat stops
    // and the registry flips the check once the ttl lapses.
    let lease = registrar.register(info("10.0.0.1", 9000)).await.unwrap();
    let id = lease.service_id().to_string();
    drop(lease);

    let target = Target::parse("flow:///HelloService").unwrap();
    let mut resolver = builder.build(&target, conn.clone()).await.unwrap();
    assert_eq!(conn.addresses(), vec!["10.0.0.1:9000"]);

    registry.set_check_status(&id, HealthStatus::Critical);
    sleep(Duration::from_millis(1100)).await;
    assert!(conn.addresses().is_empty());

    resolver.close().await;
}
