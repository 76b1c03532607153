use super::{CheckRegistration, HealthStatus, RegistryClient, ServiceEntry, ServiceRegistration};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Registry operations, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ServiceRegister,
    ServiceDeregister,
    CheckRegister,
    CheckDeregister,
    UpdateTtl,
    HealthyServiceEntries,
}

/// A call as observed by [`MemoryRegistry`], keyed by the id or name it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ServiceRegister(String),
    ServiceDeregister(String),
    CheckRegister(String),
    CheckDeregister(String),
    UpdateTtl(String),
    HealthyServiceEntries(String),
}

#[derive(Default)]
struct State {
    services: BTreeMap<String, ServiceRegistration>,
    checks: BTreeMap<String, (String, HealthStatus)>,
    calls: Vec<Call>,
    failing: HashSet<Op>,
    hanging: HashSet<Op>,
}

/// In-process registry: an instance is healthy when every check bound to it
/// is passing.
///
/// Services and checks are removed only by their own deregister calls, so a
/// check outlives its service until `check_deregister`. [`remove`](Self::remove)
/// drops both at once, as an agent reaping a dead node would.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `op` fail until [`recover`](Self::recover).
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    /// Make every subsequent `op` record its call and then never complete.
    pub fn hang(&self, op: Op) {
        self.lock().hanging.insert(op);
    }

    pub fn recover(&self, op: Op) {
        let mut state = self.lock();
        state.failing.remove(&op);
        state.hanging.remove(&op);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn has_service(&self, service_id: &str) -> bool {
        self.lock().services.contains_key(service_id)
    }

    pub fn check_status(&self, check_id: &str) -> Option<HealthStatus> {
        self.lock().checks.get(check_id).map(|(_, status)| *status)
    }

    /// Force a check to a status, as an expired TTL would.
    pub fn set_check_status(&self, check_id: &str, status: HealthStatus) {
        if let Some(check) = self.lock().checks.get_mut(check_id) {
            check.1 = status;
        }
    }

    /// Insert a service without going through the call log or failure injection.
    pub fn seed(&self, registration: ServiceRegistration) {
        self.lock()
            .services
            .insert(registration.id.clone(), registration);
    }

    pub fn remove(&self, service_id: &str) {
        let mut state = self.lock();
        state.services.remove(service_id);
        state.checks.retain(|_, check| check.0 != service_id);
    }

    async fn record(&self, call: Call, op: Op) -> Result<MutexGuard<'_, State>> {
        let hanging = {
            let mut state = self.lock();
            state.calls.push(call);
            state.hanging.contains(&op)
        };
        if hanging {
            std::future::pending::<()>().await;
        }

        let state = self.lock();
        if state.failing.contains(&op) {
            anyhow::bail!("injected {:?} failure", op);
        }
        Ok(state)
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn service_register(&self, registration: &ServiceRegistration) -> Result<()> {
        let mut state = self
            .record(Call::ServiceRegister(registration.id.clone()), Op::ServiceRegister)
            .await?;
        state
            .services
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn service_deregister(&self, service_id: &str) -> Result<()> {
        let mut state = self
            .record(Call::ServiceDeregister(service_id.to_string()), Op::ServiceDeregister)
            .await?;
        if state.services.remove(service_id).is_none() {
            anyhow::bail!("unknown service {}", service_id);
        }
        Ok(())
    }

    async fn check_register(&self, check: &CheckRegistration) -> Result<()> {
        let mut state = self
            .record(Call::CheckRegister(check.id.clone()), Op::CheckRegister)
            .await?;
        if !state.services.contains_key(&check.service_id) {
            anyhow::bail!("check {} refers to unknown service {}", check.id, check.service_id);
        }
        state
            .checks
            .insert(check.id.clone(), (check.service_id.clone(), check.status));
        Ok(())
    }

    async fn check_deregister(&self, check_id: &str) -> Result<()> {
        let mut state = self
            .record(Call::CheckDeregister(check_id.to_string()), Op::CheckDeregister)
            .await?;
        if state.checks.remove(check_id).is_none() {
            anyhow::bail!("unknown check {}", check_id);
        }
        Ok(())
    }

    async fn update_ttl(&self, check_id: &str, _output: &str, status: HealthStatus) -> Result<()> {
        let mut state = self
            .record(Call::UpdateTtl(check_id.to_string()), Op::UpdateTtl)
            .await?;
        match state.checks.get_mut(check_id) {
            Some(check) => {
                check.1 = status;
                Ok(())
            }
            None => anyhow::bail!("unknown check {}", check_id),
        }
    }

    async fn healthy_service_entries(&self, service: &str) -> Result<Vec<ServiceEntry>> {
        let state = self
            .record(Call::HealthyServiceEntries(service.to_string()), Op::HealthyServiceEntries)
            .await?;

        let entries = state
            .services
            .values()
            .filter(|reg| reg.name == service)
            .filter(|reg| {
                state
                    .checks
                    .values()
                    .filter(|(owner, _)| *owner == reg.id)
                    .all(|(_, status)| *status == HealthStatus::Passing)
            })
            .map(|reg| ServiceEntry {
                id: reg.id.clone(),
                service: reg.name.clone(),
                address: reg.address.clone(),
                port: reg.port,
            })
            .collect();
        Ok(entries)
    }
}
