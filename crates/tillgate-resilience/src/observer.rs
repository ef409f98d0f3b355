//! Tenant-level failure-ratio observation.
//!
//! A soft early-warning signal distinct from the per-(tenant, service)
//! circuit breaker: windowed attempt/failure counters per tenant flag a
//! tenant trending toward failure before any single service's breaker
//! trips. The observer drives alerting only; it never blocks a call.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tillgate_core::{
    events::TenantFailureAlertEvent, models::TenantId, Clock, EventHandler, ResilienceEvent,
};
use tokio::sync::Mutex;

/// Tenant observation configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ObserverConfig {
    /// Master switch; when false `evaluate` returns nothing.
    pub enabled: bool,
    /// Minimum attempts in the window before the ratio is meaningful.
    pub min_requests: u32,
    /// Failure ratio (0..=1) at which an alert is raised.
    pub failure_ratio_threshold: f64,
    /// Length of the observation window.
    pub time_window: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_requests: 10,
            failure_ratio_threshold: 0.5,
            time_window: Duration::from_secs(15 * 60),
        }
    }
}

/// Windowed counters for one tenant.
#[derive(Debug, Clone)]
struct TenantWindow {
    attempts: u32,
    failures: u32,
    window_start: DateTime<Utc>,
}

impl TenantWindow {
    fn new(now: DateTime<Utc>) -> Self {
        Self { attempts: 0, failures: 0, window_start: now }
    }
}

/// Point-in-time evaluation of a tenant's failure ratio.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TenantFailureSnapshot {
    /// Tenant evaluated.
    pub tenant_id: TenantId,
    /// Whether the window holds enough attempts to judge the ratio.
    pub eligible: bool,
    /// Attempts in the current window.
    pub attempts: u32,
    /// Retryable failures in the current window.
    pub failures: u32,
    /// failures / attempts, 0 when no attempts.
    pub failure_ratio: f64,
    /// True when eligible and the ratio clears the configured threshold.
    pub over_threshold: bool,
    /// Start of the current window.
    pub window_start: DateTime<Utc>,
}

/// Observes per-tenant attempt/failure ratios over a time window.
///
/// Counters accumulate for `time_window`; the first touch after the window
/// elapses resets them and starts a fresh window.
#[derive(Debug)]
pub struct TenantObserver {
    config: ObserverConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
    windows: Mutex<HashMap<TenantId, TenantWindow>>,
}

impl TenantObserver {
    /// Creates an observer with the given config, clock and event handler.
    pub fn new(config: ObserverConfig, clock: Arc<dyn Clock>, events: Arc<dyn EventHandler>) -> Self {
        Self { config, clock, events, windows: Mutex::new(HashMap::new()) }
    }

    /// Records one delivery attempt for a tenant.
    pub async fn record_attempt(&self, tenant_id: TenantId) {
        if !self.config.enabled {
            return;
        }
        let mut windows = self.windows.lock().await;
        let window = self.current_window(&mut windows, tenant_id);
        window.attempts = window.attempts.saturating_add(1);
    }

    /// Records one retryable failure for a tenant.
    pub async fn record_retryable_failure(&self, tenant_id: TenantId) {
        if !self.config.enabled {
            return;
        }
        let mut windows = self.windows.lock().await;
        let window = self.current_window(&mut windows, tenant_id);
        window.failures = window.failures.saturating_add(1);
    }

    /// Evaluates a tenant's current window.
    ///
    /// Returns `None` when observation is disabled. Raises a
    /// [`ResilienceEvent::TenantFailureAlert`] when the tenant is over
    /// threshold.
    pub async fn evaluate(&self, tenant_id: TenantId) -> Option<TenantFailureSnapshot> {
        if !self.config.enabled {
            return None;
        }

        let snapshot = {
            let mut windows = self.windows.lock().await;
            let window = self.current_window(&mut windows, tenant_id);

            let eligible = window.attempts >= self.config.min_requests;
            let failure_ratio = if window.attempts == 0 {
                0.0
            } else {
                f64::from(window.failures) / f64::from(window.attempts)
            };
            let over_threshold =
                eligible && failure_ratio >= self.config.failure_ratio_threshold;

            TenantFailureSnapshot {
                tenant_id,
                eligible,
                attempts: window.attempts,
                failures: window.failures,
                failure_ratio,
                over_threshold,
                window_start: window.window_start,
            }
        };

        if snapshot.over_threshold {
            tracing::warn!(
                tenant_id = %tenant_id,
                attempts = snapshot.attempts,
                failures = snapshot.failures,
                failure_ratio = snapshot.failure_ratio,
                "tenant failure ratio over threshold"
            );
            self.events
                .handle_event(ResilienceEvent::TenantFailureAlert(TenantFailureAlertEvent {
                    tenant_id,
                    attempts: snapshot.attempts,
                    failures: snapshot.failures,
                    failure_ratio: snapshot.failure_ratio,
                    window_start: snapshot.window_start,
                    raised_at: self.clock.now(),
                }))
                .await;
        }

        Some(snapshot)
    }

    /// Returns the tenant's window, resetting it first if it has elapsed.
    fn current_window<'a>(
        &self,
        windows: &'a mut HashMap<TenantId, TenantWindow>,
        tenant_id: TenantId,
    ) -> &'a mut TenantWindow {
        let now = self.clock.now();
        let window_length = chrono::Duration::from_std(self.config.time_window)
            .unwrap_or_else(|_| chrono::Duration::MAX);

        let window = windows.entry(tenant_id).or_insert_with(|| TenantWindow::new(now));
        if now - window.window_start >= window_length {
            *window = TenantWindow::new(now);
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use tillgate_core::{NoOpEventHandler, TestClock};

    use super::*;

    fn test_observer(config: ObserverConfig) -> (TenantObserver, TestClock) {
        let clock = TestClock::new();
        let observer =
            TenantObserver::new(config, Arc::new(clock.clone()), Arc::new(NoOpEventHandler));
        (observer, clock)
    }

    #[tokio::test]
    async fn disabled_observer_returns_nothing() {
        let (observer, _clock) =
            test_observer(ObserverConfig { enabled: false, ..ObserverConfig::default() });
        let tenant = TenantId::new();

        observer.record_attempt(tenant).await;
        assert!(observer.evaluate(tenant).await.is_none());
    }

    #[tokio::test]
    async fn below_min_requests_is_not_eligible() {
        let (observer, _clock) = test_observer(ObserverConfig::default());
        let tenant = TenantId::new();

        // 9 attempts, all failing: still under the sample-size floor
        for _ in 0..9 {
            observer.record_attempt(tenant).await;
            observer.record_retryable_failure(tenant).await;
        }

        let snapshot = observer.evaluate(tenant).await.unwrap();
        assert!(!snapshot.eligible);
        assert!(!snapshot.over_threshold);
        assert_eq!(snapshot.attempts, 9);
        assert_eq!(snapshot.failures, 9);
        assert!((snapshot.failure_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn tenth_attempt_flips_eligibility() {
        let (observer, _clock) = test_observer(ObserverConfig::default());
        let tenant = TenantId::new();

        for _ in 0..9 {
            observer.record_attempt(tenant).await;
            observer.record_retryable_failure(tenant).await;
        }
        assert!(!observer.evaluate(tenant).await.unwrap().eligible);

        observer.record_attempt(tenant).await;

        let snapshot = observer.evaluate(tenant).await.unwrap();
        assert!(snapshot.eligible);
        assert!(snapshot.over_threshold);
        assert_eq!(snapshot.attempts, 10);
        assert!((snapshot.failure_ratio - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn healthy_tenant_stays_under_threshold() {
        let (observer, _clock) = test_observer(ObserverConfig::default());
        let tenant = TenantId::new();

        for attempt in 0..20 {
            observer.record_attempt(tenant).await;
            if attempt % 5 == 0 {
                observer.record_retryable_failure(tenant).await;
            }
        }

        let snapshot = observer.evaluate(tenant).await.unwrap();
        assert!(snapshot.eligible);
        assert!(!snapshot.over_threshold);
        assert!((snapshot.failure_ratio - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn zero_attempts_has_zero_ratio() {
        let (observer, _clock) = test_observer(ObserverConfig::default());
        let snapshot = observer.evaluate(TenantId::new()).await.unwrap();

        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.failure_ratio, 0.0);
        assert!(!snapshot.eligible);
    }

    #[tokio::test]
    async fn window_expiry_resets_counters() {
        let (observer, clock) = test_observer(ObserverConfig {
            time_window: Duration::from_secs(60),
            ..ObserverConfig::default()
        });
        let tenant = TenantId::new();

        for _ in 0..12 {
            observer.record_attempt(tenant).await;
            observer.record_retryable_failure(tenant).await;
        }
        assert!(observer.evaluate(tenant).await.unwrap().over_threshold);

        clock.advance(Duration::from_secs(61));

        let snapshot = observer.evaluate(tenant).await.unwrap();
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.failures, 0);
        assert!(!snapshot.over_threshold);
        assert_eq!(snapshot.window_start, clock.now());
    }

    #[tokio::test]
    async fn tenants_are_counted_independently() {
        let (observer, _clock) = test_observer(ObserverConfig::default());
        let noisy = TenantId::new();
        let quiet = TenantId::new();

        for _ in 0..10 {
            observer.record_attempt(noisy).await;
            observer.record_retryable_failure(noisy).await;
        }
        observer.record_attempt(quiet).await;

        assert!(observer.evaluate(noisy).await.unwrap().over_threshold);
        let quiet_snapshot = observer.evaluate(quiet).await.unwrap();
        assert_eq!(quiet_snapshot.attempts, 1);
        assert_eq!(quiet_snapshot.failures, 0);
    }
}
