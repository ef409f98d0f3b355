//! Retry scheduling with failure-reason-specific delays.
//!
//! The scheduler never throws and never sleeps: each call either books an
//! absolute `next_retry_at` timestamp for an external queue to act on, or
//! moves the operation to its terminal permanently-failed state. Delay
//! selection depends on the failure classification:
//!
//! - network errors retry after a short fixed delay,
//! - validation errors retry after a long fixed delay,
//! - server errors back off exponentially with jitter,
//! - everything else retries after the base interval.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::Rng;
use tillgate_core::{
    events::{PermanentlyFailedEvent, RetryScheduledEvent},
    models::{
        resolve_base_interval, resolve_max_retries, resolve_retry_enabled, OperationStatus,
        RetryAttempt, RetryReason, RetryableOperation, TenantRetryConfig, TerminalRetryConfig,
    },
    Clock, EventHandler, ResilienceEvent,
};

/// Retry scheduler configuration; system-wide defaults behind the
/// terminal/tenant fallback chain.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    /// Retry budget when neither terminal nor tenant configures one.
    pub default_max_retries: u32,
    /// Whether retries are enabled when neither terminal nor tenant says.
    pub retries_enabled: bool,
    /// Base backoff interval for server errors and unclassified failures.
    pub base_interval: Duration,
    /// Upper bound on any computed backoff delay.
    pub max_delay: Duration,
    /// Fixed delay applied to network errors.
    pub network_error_delay: Duration,
    /// Fixed delay applied to validation errors.
    pub validation_error_delay: Duration,
    /// Half-width of the random jitter applied to server-error backoff.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 5,
            retries_enabled: true,
            base_interval: Duration::from_secs(300),
            max_delay: Duration::from_secs(24 * 60 * 60),
            network_error_delay: Duration::from_secs(60),
            validation_error_delay: Duration::from_secs(30 * 60),
            jitter: Duration::from_secs(30),
        }
    }
}

/// Retry configuration sources for one operation, most specific first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrySource {
    /// Terminal-level overrides.
    pub terminal: TerminalRetryConfig,
    /// Tenant-level overrides.
    pub tenant: TenantRetryConfig,
}

/// Schedules retries for failed forwarding operations.
#[derive(Debug)]
pub struct RetryScheduler {
    config: RetryConfig,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl RetryScheduler {
    /// Creates a scheduler with the given defaults, clock and event handler.
    pub fn new(config: RetryConfig, clock: Arc<dyn Clock>, events: Arc<dyn EventHandler>) -> Self {
        Self { config, clock, events }
    }

    /// Updates an operation's retry bookkeeping after a failed attempt.
    ///
    /// No-op when the operation is already terminal or retries are disabled
    /// for its terminal/tenant. With budget left, increments the attempt
    /// counter, appends to the history and books `next_retry_at`; with the
    /// budget spent, transitions to permanently failed and clears the
    /// schedule. Calling again on a terminal operation changes nothing.
    pub async fn configure_retry(
        &self,
        operation: &mut RetryableOperation,
        source: &RetrySource,
        reason: RetryReason,
    ) {
        if operation.is_terminal() {
            return;
        }

        if !resolve_retry_enabled(&source.terminal, &source.tenant, self.config.retries_enabled) {
            tracing::debug!(
                submission_id = %operation.submission_id,
                "retries disabled, leaving operation failed"
            );
            operation.status = OperationStatus::Failed;
            operation.retry_reason = Some(reason);
            operation.next_retry_at = None;
            return;
        }

        let max_retries =
            resolve_max_retries(&source.terminal, &source.tenant, self.config.default_max_retries);
        operation.max_retries = Some(max_retries);

        let now = self.clock.now();

        if operation.retry_count >= max_retries {
            // The final attempt was still consumed
            operation.retry_count = operation.retry_count.saturating_add(1);
            operation.status = OperationStatus::PermanentlyFailed;
            operation.retry_reason = Some(RetryReason::MaxRetriesExceeded);
            operation.next_retry_at = None;

            tracing::warn!(
                submission_id = %operation.submission_id,
                tenant_id = %operation.tenant_id,
                attempts = operation.retry_count,
                "retry budget exhausted, operation permanently failed"
            );
            self.events
                .handle_event(ResilienceEvent::PermanentlyFailed(PermanentlyFailedEvent {
                    submission_id: operation.submission_id,
                    tenant_id: operation.tenant_id,
                    attempts: operation.retry_count,
                    failed_at: now,
                }))
                .await;
            return;
        }

        operation.retry_count += 1;
        operation.status = OperationStatus::Failed;
        operation.retry_reason = Some(reason);
        operation.retry_history.push(RetryAttempt {
            attempt: operation.retry_count,
            reason,
            timestamp: now,
        });

        let base = resolve_base_interval(&source.terminal, &source.tenant, self.config.base_interval);
        let next_retry_at = self.next_retry_at(now, reason, operation.retry_count, base);
        operation.next_retry_at = Some(next_retry_at);

        tracing::info!(
            submission_id = %operation.submission_id,
            attempt = operation.retry_count,
            reason = %reason,
            next_retry_at = %next_retry_at,
            "retry scheduled"
        );
        self.events
            .handle_event(ResilienceEvent::RetryScheduled(RetryScheduledEvent {
                submission_id: operation.submission_id,
                tenant_id: operation.tenant_id,
                attempt: operation.retry_count,
                reason,
                next_retry_at,
            }))
            .await;
    }

    /// Computes the absolute next-attempt timestamp for a failure reason.
    ///
    /// All delays are whole seconds; exponential backoff is capped at
    /// `max_delay` and jitter never schedules before `now`.
    fn next_retry_at(
        &self,
        now: DateTime<Utc>,
        reason: RetryReason,
        retry_count: u32,
        base: Duration,
    ) -> DateTime<Utc> {
        let delay_secs = match reason {
            RetryReason::NetworkError => self.config.network_error_delay.as_secs() as i64,
            RetryReason::ValidationError => self.config.validation_error_delay.as_secs() as i64,
            RetryReason::ServerError => {
                // Doubling outruns the representable timestamp range fast;
                // the cap keeps high attempt counts schedulable
                let backoff = base
                    .as_secs()
                    .saturating_mul(2u64.saturating_pow(retry_count))
                    .min(self.config.max_delay.as_secs())
                    .min(i64::MAX as u64) as i64;
                let jitter_secs = self.config.jitter.as_secs().min(i64::MAX as u64) as i64;
                let jitter = if jitter_secs > 0 {
                    rand::rng().random_range(-jitter_secs..=jitter_secs)
                } else {
                    0
                };
                backoff.saturating_add(jitter).max(0)
            },
            RetryReason::GeneralError
            | RetryReason::MaxRetriesExceeded
            | RetryReason::InvalidChecksum => base.as_secs().min(i64::MAX as u64) as i64,
        };

        now + chrono::Duration::seconds(delay_secs)
    }
}
