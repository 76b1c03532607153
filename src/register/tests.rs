use super::*;
use crate::registry::{Call, MemoryRegistry, Op};
use tokio::time::sleep;

fn setup_test_registrar() -> (Arc<MemoryRegistry>, LeaseRegistrar) {
    let registry = Arc::new(MemoryRegistry::new());
    let registrar = LeaseRegistrar::new(registry.clone(), Duration::from_secs(15));
    (registry, registrar)
}

fn create_test_info(interval: Duration) -> RegistrationInfo {
    RegistrationInfo {
        service_name: "Svc".to_string(),
        host: "h".to_string(),
        port: 9,
        heartbeat_interval: interval,
    }
}

#[tokio::test(start_paused = true)]
async fn test_register_then_deregister() {
    let (registry, registrar) = setup_test_registrar();

    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .expect("Failed to register service");
    assert_eq!(handle.service_id(), "Svc-h-9");
    assert!(registry.has_service("Svc-h-9"));
    assert_eq!(registry.check_status("Svc-h-9"), Some(HealthStatus::Passing));

    registrar
        .deregister(handle)
        .await
        .expect("Failed to deregister service");

    let id = "Svc-h-9".to_string();
    assert_eq!(registry.count(&Call::ServiceDeregister(id.clone())), 1);
    assert_eq!(registry.count(&Call::CheckDeregister(id.clone())), 1);
    assert!(!registry.has_service(&id));

    // Nothing may reach the registry once deregister has returned.
    let calls = registry.calls().len();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(registry.calls().len(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_cadence() {
    let (registry, registrar) = setup_test_registrar();
    let interval = Duration::from_secs(2);

    let handle = registrar.register(create_test_info(interval)).await.unwrap();
    let ttl_updates = Call::UpdateTtl("Svc-h-9".to_string());
    assert_eq!(registry.count(&ttl_updates), 0);

    sleep(interval * 3 + Duration::from_millis(100)).await;
    let seen = registry.count(&ttl_updates);
    assert!((3..=4).contains(&seen), "unexpected heartbeat count {}", seen);

    registrar.deregister(handle).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_survives_failures() {
    let (registry, registrar) = setup_test_registrar();
    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .unwrap();

    registry.fail(Op::UpdateTtl);
    sleep(Duration::from_millis(3500)).await;
    registry.recover(Op::UpdateTtl);
    sleep(Duration::from_secs(2)).await;

    assert_eq!(registry.count(&Call::UpdateTtl("Svc-h-9".to_string())), 5);
    assert!(!handle.heartbeat.is_finished());

    registrar.deregister(handle).await.unwrap();
}

#[tokio::test]
async fn test_service_register_failure() {
    let (registry, registrar) = setup_test_registrar();
    registry.fail(Op::ServiceRegister);

    let result = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await;
    assert!(matches!(result, Err(DiscoveryError::ServiceRegister { .. })));

    // No check was attempted after the service itself was refused.
    assert_eq!(registry.calls(), vec![Call::ServiceRegister("Svc-h-9".to_string())]);
}

#[tokio::test]
async fn test_check_register_failure_keeps_service() {
    let (registry, registrar) = setup_test_registrar();
    registry.fail(Op::CheckRegister);

    let result = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await;
    assert!(matches!(result, Err(DiscoveryError::CheckRegister { .. })));
    assert!(registry.has_service("Svc-h-9"));
}

#[tokio::test(start_paused = true)]
async fn test_deregister_swallows_service_failure() {
    let (registry, registrar) = setup_test_registrar();
    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .unwrap();

    registry.fail(Op::ServiceDeregister);
    registrar
        .deregister(handle)
        .await
        .expect("check deregistration decides the outcome");
    assert_eq!(registry.count(&Call::CheckDeregister("Svc-h-9".to_string())), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deregister_reports_check_failure() {
    let (registry, registrar) = setup_test_registrar();
    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .unwrap();

    registry.fail(Op::CheckDeregister);
    let result = registrar.deregister(handle).await;
    assert!(matches!(
        result,
        Err(DiscoveryError::CheckDeregister { ref id, .. }) if id == "Svc-h-9"
    ));

    // The heartbeat is gone regardless.
    let calls = registry.calls().len();
    sleep(Duration::from_secs(5)).await;
    assert_eq!(registry.calls().len(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_stops_heartbeat() {
    let (registry, registrar) = setup_test_registrar();
    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .unwrap();

    drop(handle);
    sleep(Duration::from_millis(100)).await;
    registry.clear_calls();
    sleep(Duration::from_secs(5)).await;
    assert!(registry.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hung_ttl_update_does_not_starve_heartbeat() {
    let (registry, registrar) = setup_test_registrar();
    let handle = registrar
        .register(create_test_info(Duration::from_secs(1)))
        .await
        .unwrap();

    // Every update is abandoned after one interval and the next tick still fires.
    registry.hang(Op::UpdateTtl);
    sleep(Duration::from_millis(3500)).await;
    let seen = registry.count(&Call::UpdateTtl("Svc-h-9".to_string()));
    assert!((3..=4).contains(&seen), "unexpected heartbeat count {}", seen);
    assert!(!handle.heartbeat.is_finished());

    // Deregister does not wait for the hung call to time out.
    let started = tokio::time::Instant::now();
    time::timeout(Duration::from_secs(5), registrar.deregister(handle))
        .await
        .expect("deregister waited on a hung heartbeat")
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!registry.has_service("Svc-h-9"));
}

#[test]
fn test_registrar_keeps_ttl() {
    let (_, registrar) = setup_test_registrar();
    assert_eq!(registrar.ttl(), Duration::from_secs(15));
}
