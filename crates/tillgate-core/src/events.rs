//! Event system for decoupled notification of resilience outcomes.
//!
//! The circuit breaker, retry scheduler and tenant observer emit events
//! through a handler trait instead of calling alerting or persistence code
//! directly. Subscribers (operator notifications, audit sinks) register on a
//! multicast handler; the resilience layer never blocks on them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BreakerKey, RetryReason, SubmissionId, TenantId};

/// Events emitted by the resilience layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResilienceEvent {
    /// A circuit breaker transitioned to open.
    CircuitOpened(CircuitOpenedEvent),

    /// A circuit breaker recovered to closed.
    CircuitClosed(CircuitClosedEvent),

    /// A failed delivery was scheduled for retry.
    RetryScheduled(RetryScheduledEvent),

    /// An operation exhausted its retry budget.
    PermanentlyFailed(PermanentlyFailedEvent),

    /// A submission was rejected for failing checksum verification.
    ChecksumRejected(ChecksumRejectedEvent),

    /// A tenant's windowed failure ratio crossed the alert threshold.
    TenantFailureAlert(TenantFailureAlertEvent),
}

/// Emitted when a breaker trips or reopens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitOpenedEvent {
    /// Breaker that opened.
    pub key: BreakerKey,
    /// Failure count at the time of the transition.
    pub failure_count: u32,
    /// Lifetime trip counter after the transition.
    pub trip_count: u64,
    /// When open-state blocking ends.
    pub cooldown_until: DateTime<Utc>,
    /// When the transition happened.
    pub opened_at: DateTime<Utc>,
}

/// Emitted when a breaker closes after a successful half-open probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitClosedEvent {
    /// Breaker that closed.
    pub key: BreakerKey,
    /// When the transition happened.
    pub closed_at: DateTime<Utc>,
}

/// Emitted when the retry scheduler books a future attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryScheduledEvent {
    /// Operation being retried.
    pub submission_id: SubmissionId,
    /// Tenant owning the operation.
    pub tenant_id: TenantId,
    /// Attempt number the schedule corresponds to (1-based).
    pub attempt: u32,
    /// Failure classification behind the retry.
    pub reason: RetryReason,
    /// Absolute timestamp of the next attempt.
    pub next_retry_at: DateTime<Utc>,
}

/// Emitted when an operation becomes permanently failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermanentlyFailedEvent {
    /// Operation that failed.
    pub submission_id: SubmissionId,
    /// Tenant owning the operation.
    pub tenant_id: TenantId,
    /// Attempts consumed, including the final one.
    pub attempts: u32,
    /// When the terminal transition happened.
    pub failed_at: DateTime<Utc>,
}

/// Emitted when checksum verification rejects a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumRejectedEvent {
    /// Submission that was rejected.
    pub submission_id: SubmissionId,
    /// Tenant owning the submission.
    pub tenant_id: TenantId,
    /// Verification errors, in check order.
    pub errors: Vec<String>,
    /// When the rejection happened.
    pub rejected_at: DateTime<Utc>,
}

/// Emitted when a tenant's failure ratio crosses the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantFailureAlertEvent {
    /// Tenant trending toward failure.
    pub tenant_id: TenantId,
    /// Attempts observed in the current window.
    pub attempts: u32,
    /// Retryable failures observed in the current window.
    pub failures: u32,
    /// failures / attempts for the window.
    pub failure_ratio: f64,
    /// Start of the observation window.
    pub window_start: DateTime<Utc>,
    /// When the alert was raised.
    pub raised_at: DateTime<Utc>,
}

/// Trait for handling resilience events.
///
/// Handlers must not block resilience processing. If event handling fails
/// the handler should log and swallow the error rather than propagate it.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a resilience event.
    async fn handle_event(&self, event: ResilienceEvent);
}

/// No-op event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: ResilienceEvent) {}
}

/// Multicast handler forwarding events to multiple subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber to receive resilience events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: ResilienceEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        // Subscriber failures must not interfere with resilience processing
        futures::future::join_all(futures).await;
    }
}
