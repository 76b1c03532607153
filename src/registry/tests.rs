use super::*;
use std::time::Duration;

fn create_test_registration(name: &str, host: &str, port: u16) -> ServiceRegistration {
    ServiceRegistration {
        id: service_id(name, host, port),
        name: name.to_string(),
        tags: vec![name.to_string()],
        address: host.to_string(),
        port,
    }
}

fn create_test_check(registration: &ServiceRegistration) -> CheckRegistration {
    CheckRegistration {
        id: registration.id.clone(),
        name: registration.name.clone(),
        service_id: registration.id.clone(),
        ttl: Duration::from_secs(15),
        status: HealthStatus::Passing,
    }
}

#[test]
fn test_service_id_is_stable() {
    assert_eq!(service_id("Svc", "h", 9), "Svc-h-9");
    assert_eq!(service_id("Svc", "h", 9), service_id("Svc", "h", 9));
    assert_ne!(service_id("Svc", "h", 9), service_id("Svc", "h", 10));
}

#[test]
fn test_health_status_wire_format() {
    assert_eq!(serde_json::to_string(&HealthStatus::Passing).unwrap(), "\"passing\"");
    assert_eq!(HealthStatus::Critical.to_string(), "critical");
}

#[tokio::test]
async fn test_memory_registry_basic_lifecycle() {
    let registry = MemoryRegistry::new();
    let registration = create_test_registration("test-service", "127.0.0.1", 8080);
    let check = create_test_check(&registration);

    registry.service_register(&registration).await.unwrap();
    registry.check_register(&check).await.unwrap();
    registry
        .update_ttl(&check.id, "", HealthStatus::Passing)
        .await
        .unwrap();

    let entries = registry.healthy_service_entries("test-service").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].network_address(), "127.0.0.1:8080");

    registry.service_deregister(&registration.id).await.unwrap();
    registry.check_deregister(&check.id).await.unwrap();
    assert!(!registry.has_service(&registration.id));
    assert!(registry
        .healthy_service_entries("test-service")
        .await
        .unwrap()
        .is_empty());

    assert_eq!(
        registry.calls(),
        vec![
            Call::ServiceRegister(registration.id.clone()),
            Call::CheckRegister(check.id.clone()),
            Call::UpdateTtl(check.id.clone()),
            Call::HealthyServiceEntries("test-service".to_string()),
            Call::ServiceDeregister(registration.id.clone()),
            Call::CheckDeregister(check.id.clone()),
            Call::HealthyServiceEntries("test-service".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_memory_registry_filters_unhealthy() {
    let registry = MemoryRegistry::new();
    let healthy = create_test_registration("svc", "10.0.0.1", 9000);
    let expired = create_test_registration("svc", "10.0.0.2", 9000);
    let other = create_test_registration("other", "10.0.0.3", 9000);

    for registration in [&healthy, &expired, &other] {
        registry.service_register(registration).await.unwrap();
        registry
            .check_register(&create_test_check(registration))
            .await
            .unwrap();
    }
    registry.set_check_status(&expired.id, HealthStatus::Critical);

    let entries = registry.healthy_service_entries("svc").await.unwrap();
    let addresses: Vec<String> = entries.iter().map(|e| e.network_address()).collect();
    assert_eq!(addresses, vec!["10.0.0.1:9000"]);
}

#[tokio::test]
async fn test_memory_registry_failure_injection() {
    let registry = MemoryRegistry::new();
    let registration = create_test_registration("svc", "h", 1);

    registry.fail(Op::ServiceRegister);
    assert!(registry.service_register(&registration).await.is_err());
    assert!(!registry.has_service(&registration.id));
    assert_eq!(registry.count(&Call::ServiceRegister(registration.id.clone())), 1);

    registry.recover(Op::ServiceRegister);
    registry.service_register(&registration).await.unwrap();
    assert!(registry.has_service(&registration.id));
}

#[tokio::test]
async fn test_memory_registry_rejects_unknown_ids() {
    let registry = MemoryRegistry::new();

    assert!(registry.update_ttl("missing", "", HealthStatus::Passing).await.is_err());
    assert!(registry.check_deregister("missing").await.is_err());
    assert!(registry.service_deregister("missing").await.is_err());

    let orphan = create_test_check(&create_test_registration("svc", "h", 1));
    assert!(registry.check_register(&orphan).await.is_err());
}

#[tokio::test]
async fn test_memory_registry_checks_outlive_their_service() {
    let registry = MemoryRegistry::new();
    let registration = create_test_registration("svc", "h", 1);
    let check = create_test_check(&registration);
    registry.service_register(&registration).await.unwrap();
    registry.check_register(&check).await.unwrap();

    registry.service_deregister(&registration.id).await.unwrap();
    assert!(!registry.has_service(&registration.id));
    assert_eq!(registry.check_status(&check.id), Some(HealthStatus::Passing));
    assert!(registry.healthy_service_entries("svc").await.unwrap().is_empty());

    registry.check_deregister(&check.id).await.unwrap();
    assert_eq!(registry.check_status(&check.id), None);

    // remove reaps both at once.
    registry.service_register(&registration).await.unwrap();
    registry.check_register(&check).await.unwrap();
    registry.remove(&registration.id);
    assert!(!registry.has_service(&registration.id));
    assert_eq!(registry.check_status(&check.id), None);
}

#[test]
fn test_network_address_brackets_ipv6() {
    let entry = |address: &str| ServiceEntry {
        id: "svc-1".to_string(),
        service: "svc".to_string(),
        address: address.to_string(),
        port: 9000,
    };

    assert_eq!(entry("10.0.0.1").network_address(), "10.0.0.1:9000");
    assert_eq!(entry("host-b").network_address(), "host-b:9000");
    assert_eq!(entry("::1").network_address(), "[::1]:9000");
    assert_eq!(entry("fe80::1").network_address(), "[fe80::1]:9000");
    assert_eq!(entry("[::1]").network_address(), "[::1]:9000");
}
