//! Resilient dispatch orchestration.
//!
//! Composes the checksum service, circuit breaker, retry scheduler and
//! tenant observer around one downstream delivery attempt:
//!
//! verify checksum -> consult breaker -> deliver -> record outcome ->
//! schedule retry or mark permanently failed -> update observer counters.
//!
//! The downstream call itself is a black box behind [`Transport`]; this
//! layer never sleeps and never owns a timer. A scheduled retry is just a
//! future timestamp an external queue acts on by re-invoking the
//! dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tillgate_core::{
    events::ChecksumRejectedEvent,
    models::{
        BreakerKey, OperationStatus, RetryReason, RetryableOperation, ServiceName, SubmissionId,
        TenantId, TerminalId,
    },
    Clock, EventHandler, ResilienceEvent, Result,
};

use crate::{
    checksum::validate_submission_checksums,
    circuit::CircuitBreaker,
    observer::TenantObserver,
    retry::{RetryScheduler, RetrySource},
};

/// Downstream delivery mechanism.
///
/// Implementations perform the actual outbound call and map its failure
/// modes onto the [`tillgate_core::CoreError`] taxonomy.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Delivers one submission envelope downstream.
    async fn deliver(&self, request: &DispatchRequest) -> Result<()>;
}

/// One submission to forward downstream.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Submission being forwarded.
    pub submission_id: SubmissionId,
    /// Tenant owning the submission.
    pub tenant_id: TenantId,
    /// Terminal that produced the submission.
    pub terminal_id: TerminalId,
    /// Downstream service targeted.
    pub service: ServiceName,
    /// The checksummed submission envelope.
    pub envelope: Value,
}

/// Outcome of one dispatch pass, in user-visible terms.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Delivered downstream; the operation succeeded.
    Delivered,
    /// Checksum verification rejected the payload. Terminal.
    Rejected {
        /// Verification errors, in check order.
        errors: Vec<String>,
    },
    /// Circuit breaker open; no attempt was made.
    Skipped {
        /// When the breaker's cooldown ends, if known.
        cooldown_until: Option<DateTime<Utc>>,
    },
    /// Attempt failed; a retry is booked.
    Scheduled {
        /// Absolute timestamp of the next attempt.
        next_retry_at: DateTime<Utc>,
    },
    /// Attempt failed and no retry was booked (retries disabled).
    Failed {
        /// Classification of the failure.
        reason: RetryReason,
    },
    /// Retry budget exhausted. Requires operator intervention.
    PermanentlyFailed,
}

/// Orchestrates resilient delivery of submissions.
#[derive(Debug)]
pub struct Dispatcher {
    breaker: Arc<CircuitBreaker>,
    scheduler: Arc<RetryScheduler>,
    observer: Arc<TenantObserver>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventHandler>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Wires the resilience mechanisms around a transport.
    pub fn new(
        breaker: Arc<CircuitBreaker>,
        scheduler: Arc<RetryScheduler>,
        observer: Arc<TenantObserver>,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventHandler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { breaker, scheduler, observer, transport, events, clock }
    }

    /// Runs one delivery pass for an operation.
    ///
    /// Mutates the operation's bookkeeping; a terminal operation is left
    /// untouched. The caller persists the operation and, for a
    /// [`DispatchOutcome::Scheduled`] outcome, re-invokes once
    /// `next_retry_at` has passed.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        operation: &mut RetryableOperation,
        source: &RetrySource,
    ) -> DispatchOutcome {
        if operation.is_terminal() {
            tracing::debug!(
                submission_id = %request.submission_id,
                status = ?operation.status,
                "dispatch requested for terminal operation"
            );
            return match operation.status {
                OperationStatus::Succeeded => DispatchOutcome::Delivered,
                _ => DispatchOutcome::PermanentlyFailed,
            };
        }

        let report = validate_submission_checksums(&request.envelope);
        if !report.is_valid() {
            return self.reject(request, operation, report.errors).await;
        }

        let key = BreakerKey::new(request.tenant_id, request.service.clone());
        if !self.breaker.is_allowed(&key).await {
            let cooldown_until =
                self.breaker.status(&key).await.and_then(|state| state.cooldown_until);
            tracing::info!(
                submission_id = %request.submission_id,
                breaker = %key,
                "circuit breaker open, skipping delivery"
            );
            return DispatchOutcome::Skipped { cooldown_until };
        }

        self.observer.record_attempt(request.tenant_id).await;

        match self.transport.deliver(request).await {
            Ok(()) => {
                self.breaker.record_success(&key).await;
                operation.status = OperationStatus::Succeeded;
                operation.next_retry_at = None;
                tracing::info!(
                    submission_id = %request.submission_id,
                    service = %request.service,
                    "submission delivered"
                );
                DispatchOutcome::Delivered
            },
            Err(error) => {
                self.breaker.record_failure(&key).await;
                self.handle_failure(request, operation, source, &error).await
            },
        }
    }

    async fn handle_failure(
        &self,
        request: &DispatchRequest,
        operation: &mut RetryableOperation,
        source: &RetrySource,
        error: &tillgate_core::CoreError,
    ) -> DispatchOutcome {
        tracing::warn!(
            submission_id = %request.submission_id,
            service = %request.service,
            error = %error,
            "delivery attempt failed"
        );

        let Some(reason) = error.retry_reason() else {
            // Not in the retryable taxonomy; leave it failed for an operator
            operation.status = OperationStatus::Failed;
            operation.retry_reason = Some(RetryReason::GeneralError);
            operation.next_retry_at = None;
            return DispatchOutcome::Failed { reason: RetryReason::GeneralError };
        };

        self.observer.record_retryable_failure(request.tenant_id).await;
        self.scheduler.configure_retry(operation, source, reason).await;

        // Alert side effect only; the snapshot never blocks the outcome
        self.observer.evaluate(request.tenant_id).await;

        if operation.status == OperationStatus::PermanentlyFailed {
            return DispatchOutcome::PermanentlyFailed;
        }
        match operation.next_retry_at {
            Some(next_retry_at) => DispatchOutcome::Scheduled { next_retry_at },
            None => DispatchOutcome::Failed { reason },
        }
    }

    async fn reject(
        &self,
        request: &DispatchRequest,
        operation: &mut RetryableOperation,
        errors: Vec<String>,
    ) -> DispatchOutcome {
        tracing::warn!(
            submission_id = %request.submission_id,
            tenant_id = %request.tenant_id,
            errors = ?errors,
            "submission rejected for invalid checksum"
        );

        // Tampering or corruption will not self-correct, so never retried
        operation.status = OperationStatus::PermanentlyFailed;
        operation.retry_reason = Some(RetryReason::InvalidChecksum);
        operation.next_retry_at = None;

        self.events
            .handle_event(ResilienceEvent::ChecksumRejected(ChecksumRejectedEvent {
                submission_id: request.submission_id,
                tenant_id: request.tenant_id,
                errors: errors.clone(),
                rejected_at: self.clock.now(),
            }))
            .await;

        DispatchOutcome::Rejected { errors }
    }
}
