//! Per-(tenant, service) circuit breaker.
//!
//! Gates outbound calls so a failing downstream is not hammered while it is
//! down. Each (tenant, service) pair owns one breaker record in the shared
//! state store; cooldowns are absolute timestamps compared against the
//! injected clock, never relative sleeps.
//!
//! # State machine
//!
//! ```text
//! CLOSED    --failure_count >= threshold--> OPEN
//! OPEN      --now >= cooldown_until-------> HALF_OPEN (on next is_allowed)
//! HALF_OPEN --success--------------------> CLOSED
//! HALF_OPEN --failure--------------------> OPEN (cooldown restarts)
//! ```
//!
//! No transition errors: `is_allowed` returning false is flow control, not a
//! failure. Transitions persist through the store's compare-and-swap, so
//! concurrent workers racing on the same record collapse to one winner and
//! the losers recompute against the fresh state.

use std::{sync::Arc, time::Duration};

use tillgate_core::{
    events::{CircuitClosedEvent, CircuitOpenedEvent},
    models::{
        BreakerKey, BreakerState, CircuitState, ServiceName, TenantId, DEFAULT_FAILURE_THRESHOLD,
        DEFAULT_RESET_TIMEOUT_SECONDS,
    },
    Clock, EventHandler, ResilienceEvent,
};

use crate::store::BreakerStore;

/// Circuit breaker configuration applied to newly created breaker records.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CircuitConfig {
    /// Failures required before a closed breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker blocks requests before probing.
    pub cooldown: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(DEFAULT_RESET_TIMEOUT_SECONDS),
        }
    }
}

/// Circuit breaker over a shared state store.
///
/// Clones of the underlying store share state, so every worker process
/// holding a `CircuitBreaker` over the same store observes the same
/// transitions.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitConfig,
    store: Arc<dyn BreakerStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl CircuitBreaker {
    /// Creates a breaker over the given store, clock and event handler.
    pub fn new(
        config: CircuitConfig,
        store: Arc<dyn BreakerStore>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self { config, store, clock, events }
    }

    /// Returns the breaker record for a (tenant, service) pair, creating it
    /// with defaults (closed, zero failures) on first reference.
    pub async fn for_service(&self, service: &ServiceName, tenant_id: TenantId) -> BreakerState {
        let key = BreakerKey::new(tenant_id, service.clone());
        self.store.load_or_insert(&key, self.default_state()).await.value
    }

    /// Decides whether a call for this key may proceed.
    ///
    /// Closed and half-open breakers allow the call. An open breaker allows
    /// it only once the cooldown has expired, transitioning to half-open so
    /// the next outcome decides between closing and reopening.
    pub async fn is_allowed(&self, key: &BreakerKey) -> bool {
        loop {
            let current = self.store.load_or_insert(key, self.default_state()).await;

            match current.value.state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::Open => {
                    let now = self.clock.now();
                    let expired = current.value.cooldown_until.is_some_and(|until| now >= until);
                    if !expired {
                        return false;
                    }

                    let mut next = current.value.clone();
                    next.state = CircuitState::HalfOpen;

                    if self.store.compare_and_swap(key, current.version, next).await {
                        tracing::info!(breaker = %key, "circuit breaker half-open, probing");
                        return true;
                    }
                    // Lost the transition race; re-read and re-decide
                },
            }
        }
    }

    /// Records a failed call outcome.
    ///
    /// Increments the failure count. A half-open failure reopens immediately
    /// with a fresh cooldown; a closed breaker opens once the count reaches
    /// the threshold, incrementing the lifetime trip counter.
    pub async fn record_failure(&self, key: &BreakerKey) {
        loop {
            let current = self.store.load_or_insert(key, self.default_state()).await;
            let now = self.clock.now();

            let mut next = current.value.clone();
            next.failure_count = next.failure_count.saturating_add(1);

            let mut opened = false;
            match current.value.state {
                CircuitState::HalfOpen => {
                    // Probe failed: straight back to open, no threshold needed
                    next.state = CircuitState::Open;
                    next.opened_at = Some(now);
                    next.cooldown_until = Some(now + next.reset_timeout());
                    opened = true;
                },
                CircuitState::Closed if next.failure_count >= next.failure_threshold => {
                    next.state = CircuitState::Open;
                    next.opened_at = Some(now);
                    next.cooldown_until = Some(now + next.reset_timeout());
                    next.trip_count += 1;
                    opened = true;
                },
                CircuitState::Closed | CircuitState::Open => {},
            }

            let snapshot = next.clone();
            if self.store.compare_and_swap(key, current.version, next).await {
                if opened {
                    tracing::warn!(
                        breaker = %key,
                        failure_count = snapshot.failure_count,
                        trip_count = snapshot.trip_count,
                        "circuit breaker opened"
                    );
                    if let (Some(cooldown_until), Some(opened_at)) =
                        (snapshot.cooldown_until, snapshot.opened_at)
                    {
                        self.events
                            .handle_event(ResilienceEvent::CircuitOpened(CircuitOpenedEvent {
                                key: key.clone(),
                                failure_count: snapshot.failure_count,
                                trip_count: snapshot.trip_count,
                                cooldown_until,
                                opened_at,
                            }))
                            .await;
                    }
                }
                return;
            }
        }
    }

    /// Records a successful call outcome.
    ///
    /// Resets the failure count; a half-open breaker closes.
    pub async fn record_success(&self, key: &BreakerKey) {
        loop {
            let current = self.store.load_or_insert(key, self.default_state()).await;

            let mut next = current.value.clone();
            next.failure_count = 0;

            let mut closed = false;
            match current.value.state {
                CircuitState::HalfOpen => {
                    next.state = CircuitState::Closed;
                    next.opened_at = None;
                    next.cooldown_until = None;
                    closed = true;
                },
                CircuitState::Open => {
                    tracing::warn!(breaker = %key, "success recorded for open circuit");
                },
                CircuitState::Closed => {},
            }

            if self.store.compare_and_swap(key, current.version, next).await {
                if closed {
                    tracing::info!(breaker = %key, "circuit breaker closed, downstream recovered");
                    self.events
                        .handle_event(ResilienceEvent::CircuitClosed(CircuitClosedEvent {
                            key: key.clone(),
                            closed_at: self.clock.now(),
                        }))
                        .await;
                }
                return;
            }
        }
    }

    /// Clears failure counters back to a closed breaker.
    ///
    /// Diagnostic operation; the lifetime trip counter and configured
    /// thresholds are preserved.
    pub async fn reset(&self, key: &BreakerKey) {
        loop {
            let current = self.store.load_or_insert(key, self.default_state()).await;

            let mut next = current.value.clone();
            next.state = CircuitState::Closed;
            next.failure_count = 0;
            next.opened_at = None;
            next.cooldown_until = None;

            if self.store.compare_and_swap(key, current.version, next).await {
                tracing::info!(breaker = %key, "circuit breaker reset");
                return;
            }
        }
    }

    /// Returns the breaker record for a key, if one exists.
    pub async fn status(&self, key: &BreakerKey) -> Option<BreakerState> {
        self.store.load(key).await.map(|versioned| versioned.value)
    }

    /// Returns every breaker record in the store.
    pub async fn all_status(&self) -> Vec<(BreakerKey, BreakerState)> {
        let mut statuses = Vec::new();
        for key in self.store.keys().await {
            if let Some(versioned) = self.store.load(&key).await {
                statuses.push((key, versioned.value));
            }
        }
        statuses
    }

    fn default_state(&self) -> BreakerState {
        BreakerState::new(self.config.failure_threshold, self.config.cooldown.as_secs())
    }
}
