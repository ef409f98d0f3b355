//! Diagnostic wrappers over the resilience components.
//!
//! Thin operational surface for the CLI and support tooling: inspect and
//! reset breakers, and feed synthetic traffic to the tenant observer. No
//! logic of its own beyond delegating to the public contracts.

use std::sync::Arc;

use tillgate_core::{
    models::{BreakerKey, BreakerState, ServiceName, TenantId},
    CoreError, Result,
};

use crate::{
    circuit::CircuitBreaker,
    observer::{TenantFailureSnapshot, TenantObserver},
};

/// Administrative handle over breakers and the tenant observer.
#[derive(Debug)]
pub struct AdminHandle {
    breaker: Arc<CircuitBreaker>,
    observer: Arc<TenantObserver>,
}

impl AdminHandle {
    /// Creates a handle over the given components.
    pub fn new(breaker: Arc<CircuitBreaker>, observer: Arc<TenantObserver>) -> Self {
        Self { breaker, observer }
    }

    /// Returns the breaker record for one (tenant, service) pair.
    pub async fn breaker_status(
        &self,
        tenant_id: TenantId,
        service: &ServiceName,
    ) -> Result<BreakerState> {
        let key = BreakerKey::new(tenant_id, service.clone());
        self.breaker
            .status(&key)
            .await
            .ok_or_else(|| CoreError::not_found(format!("breaker {key}")))
    }

    /// Returns every breaker record, sorted by key for stable output.
    pub async fn all_breaker_status(&self) -> Vec<(BreakerKey, BreakerState)> {
        let mut statuses = self.breaker.all_status().await;
        statuses.sort_by_key(|(key, _)| key.to_string());
        statuses
    }

    /// Clears a breaker's failure counters back to closed.
    pub async fn reset_breaker(&self, tenant_id: TenantId, service: &ServiceName) -> Result<()> {
        let key = BreakerKey::new(tenant_id, service.clone());
        if self.breaker.status(&key).await.is_none() {
            return Err(CoreError::not_found(format!("breaker {key}")));
        }
        self.breaker.reset(&key).await;
        Ok(())
    }

    /// Feeds synthetic attempts and failures to the observer and evaluates.
    ///
    /// Lets operators verify alert thresholds without real traffic.
    pub async fn simulate_observer_traffic(
        &self,
        tenant_id: TenantId,
        attempts: u32,
        failures: u32,
    ) -> Result<TenantFailureSnapshot> {
        if failures > attempts {
            return Err(CoreError::validation("failures cannot exceed attempts"));
        }

        for _ in 0..attempts {
            self.observer.record_attempt(tenant_id).await;
        }
        for _ in 0..failures {
            self.observer.record_retryable_failure(tenant_id).await;
        }

        self.observer
            .evaluate(tenant_id)
            .await
            .ok_or_else(|| CoreError::configuration("tenant observation is disabled"))
    }
}
