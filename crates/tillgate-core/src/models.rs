//! Core domain models and strongly-typed identifiers.
//!
//! Defines tenant/terminal/submission ID newtypes, the per-(tenant, service)
//! circuit breaker state record, the retryable operation bookkeeping, and
//! the explicit terminal -> tenant -> default configuration fallback chain.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default consecutive failures before a breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown in seconds while a breaker stays open.
pub const DEFAULT_RESET_TIMEOUT_SECONDS: u64 = 300;

/// Strongly-typed tenant identifier.
///
/// Provides multi-tenancy isolation. Breaker state, observer counters and
/// retry configuration are all scoped to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Creates a new random tenant ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed terminal identifier.
///
/// A terminal is the point-of-sale device submitting transactions. Terminal
/// level retry configuration overrides tenant level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalId(pub Uuid);

impl TerminalId {
    /// Creates a new random terminal ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TerminalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TerminalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed submission identifier.
///
/// One submission corresponds to one forwarded transaction envelope and one
/// [`RetryableOperation`] tracking its delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub Uuid);

impl SubmissionId {
    /// Creates a new random submission ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubmissionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Name of a downstream service (web application, webhook relay, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Creates a service name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Unique key for circuit breaker state: one breaker per (tenant, service).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakerKey {
    /// Tenant owning the breaker.
    pub tenant_id: TenantId,
    /// Downstream service the breaker protects.
    pub service: ServiceName,
}

impl BreakerKey {
    /// Creates a breaker key for a (tenant, service) pair.
    pub fn new(tenant_id: TenantId, service: ServiceName) -> Self {
        Self { tenant_id, service }
    }
}

impl fmt::Display for BreakerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.service)
    }
}

/// Current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, all requests allowed.
    Closed,
    /// Downstream unhealthy, requests blocked until cooldown expires.
    Open,
    /// Cooldown expired, probe requests allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Persistent circuit breaker record for one (tenant, service) pair.
///
/// Created lazily with defaults on first reference and never deleted;
/// `trip_count` is a monotonic lifetime audit counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    /// Current state machine position.
    pub state: CircuitState,
    /// Consecutive failures recorded since the last success.
    pub failure_count: u32,
    /// Failures required before the breaker opens from closed.
    pub failure_threshold: u32,
    /// Cooldown duration applied when the breaker opens.
    pub reset_timeout_seconds: u64,
    /// When the breaker last transitioned to open.
    pub opened_at: Option<DateTime<Utc>>,
    /// Absolute timestamp until which open-state requests are blocked.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Lifetime count of closed -> open trips.
    pub trip_count: u64,
}

impl BreakerState {
    /// Creates a fresh closed breaker with the given thresholds.
    pub fn new(failure_threshold: u32, reset_timeout_seconds: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold,
            reset_timeout_seconds,
            opened_at: None,
            cooldown_until: None,
            trip_count: 0,
        }
    }

    /// Cooldown duration as a chrono duration for timestamp arithmetic.
    pub fn reset_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.reset_timeout_seconds).unwrap_or(i64::MAX))
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT_SECONDS)
    }
}

/// Lifecycle status of a retryable forwarding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Created, no delivery attempted yet.
    Pending,
    /// Last delivery attempt failed; may be scheduled for retry.
    Failed,
    /// Retry budget exhausted. Terminal, requires operator intervention.
    PermanentlyFailed,
    /// Delivered downstream. Terminal.
    Succeeded,
}

/// Classification of a delivery failure, driving retry delay selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// Transient connectivity failure; retried after a short fixed delay.
    NetworkError,
    /// Downstream rejected the payload; unlikely to self-resolve quickly.
    ValidationError,
    /// Downstream 5xx-style failure; retried with exponential backoff.
    ServerError,
    /// Unclassified failure; retried after the base interval.
    GeneralError,
    /// Retry budget exhausted. Terminal.
    MaxRetriesExceeded,
    /// Payload integrity check failed. Terminal, never retried.
    InvalidChecksum,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError => write!(f, "network_error"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::ServerError => write!(f, "server_error"),
            Self::GeneralError => write!(f, "general_error"),
            Self::MaxRetriesExceeded => write!(f, "max_retries_exceeded"),
            Self::InvalidChecksum => write!(f, "invalid_checksum"),
        }
    }
}

/// One entry in an operation's retry history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Attempt number this entry records (1-based).
    pub attempt: u32,
    /// Failure classification that caused the retry.
    pub reason: RetryReason,
    /// When the retry was scheduled.
    pub timestamp: DateTime<Utc>,
}

/// Retry bookkeeping for one outbound forwarding attempt.
///
/// History entries are appended in call order. Once the status is
/// [`OperationStatus::PermanentlyFailed`] or [`OperationStatus::Succeeded`]
/// the record is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryableOperation {
    /// Submission this operation forwards.
    pub submission_id: SubmissionId,
    /// Tenant owning the submission.
    pub tenant_id: TenantId,
    /// Terminal that produced the submission.
    pub terminal_id: TerminalId,
    /// Downstream service targeted.
    pub service: ServiceName,
    /// Current lifecycle status.
    pub status: OperationStatus,
    /// Attempts consumed so far.
    pub retry_count: u32,
    /// Retry budget resolved from terminal/tenant/default configuration.
    ///
    /// None until the scheduler first touches the operation.
    pub max_retries: Option<u32>,
    /// Classification of the most recent failure.
    pub retry_reason: Option<RetryReason>,
    /// Absolute timestamp of the next scheduled attempt.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Append-only log of scheduled retries.
    pub retry_history: Vec<RetryAttempt>,
}

impl RetryableOperation {
    /// Creates a pending operation with no attempts recorded.
    pub fn new(
        submission_id: SubmissionId,
        tenant_id: TenantId,
        terminal_id: TerminalId,
        service: ServiceName,
    ) -> Self {
        Self {
            submission_id,
            tenant_id,
            terminal_id,
            service,
            status: OperationStatus::Pending,
            retry_count: 0,
            max_retries: None,
            retry_reason: None,
            next_retry_at: None,
            retry_history: Vec::new(),
        }
    }

    /// Returns true once the operation reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, OperationStatus::PermanentlyFailed | OperationStatus::Succeeded)
    }
}

/// Terminal-level retry overrides. Unset fields fall through to the tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalRetryConfig {
    /// Whether retries are enabled for this terminal.
    pub retry_enabled: Option<bool>,
    /// Retry budget for this terminal.
    pub max_retries: Option<u32>,
    /// Base backoff interval in seconds for this terminal.
    pub retry_interval_seconds: Option<u64>,
}

/// Tenant-level retry overrides. Unset fields fall through to the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantRetryConfig {
    /// Whether retries are enabled for this tenant.
    pub retry_enabled: Option<bool>,
    /// Retry budget for this tenant.
    pub max_retries: Option<u32>,
    /// Base backoff interval in seconds for this tenant.
    pub retry_interval_seconds: Option<u64>,
}

/// Resolves the retry budget: terminal setting, else tenant, else default.
pub fn resolve_max_retries(
    terminal: &TerminalRetryConfig,
    tenant: &TenantRetryConfig,
    default: u32,
) -> u32 {
    terminal.max_retries.or(tenant.max_retries).unwrap_or(default)
}

/// Resolves whether retries are enabled: terminal, else tenant, else default.
pub fn resolve_retry_enabled(
    terminal: &TerminalRetryConfig,
    tenant: &TenantRetryConfig,
    default: bool,
) -> bool {
    terminal.retry_enabled.or(tenant.retry_enabled).unwrap_or(default)
}

/// Resolves the base backoff interval: terminal, else tenant, else default.
pub fn resolve_base_interval(
    terminal: &TerminalRetryConfig,
    tenant: &TenantRetryConfig,
    default: Duration,
) -> Duration {
    terminal
        .retry_interval_seconds
        .or(tenant.retry_interval_seconds)
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_state_defaults_are_closed() {
        let state = BreakerState::default();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(state.reset_timeout_seconds, DEFAULT_RESET_TIMEOUT_SECONDS);
        assert!(state.opened_at.is_none());
        assert!(state.cooldown_until.is_none());
        assert_eq!(state.trip_count, 0);
    }

    #[test]
    fn breaker_key_display_includes_tenant_and_service() {
        let tenant = TenantId::new();
        let key = BreakerKey::new(tenant, ServiceName::from("webapp"));
        assert_eq!(key.to_string(), format!("{tenant}/webapp"));
    }

    #[test]
    fn new_operation_is_pending_with_empty_history() {
        let op = RetryableOperation::new(
            SubmissionId::new(),
            TenantId::new(),
            TerminalId::new(),
            ServiceName::from("webhook"),
        );
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 0);
        assert!(op.retry_history.is_empty());
        assert!(!op.is_terminal());
    }

    #[test]
    fn terminal_statuses_detected() {
        let mut op = RetryableOperation::new(
            SubmissionId::new(),
            TenantId::new(),
            TerminalId::new(),
            ServiceName::from("webhook"),
        );
        op.status = OperationStatus::PermanentlyFailed;
        assert!(op.is_terminal());
        op.status = OperationStatus::Succeeded;
        assert!(op.is_terminal());
        op.status = OperationStatus::Failed;
        assert!(!op.is_terminal());
    }

    #[test]
    fn max_retries_resolution_prefers_terminal() {
        let terminal =
            TerminalRetryConfig { max_retries: Some(7), ..TerminalRetryConfig::default() };
        let tenant = TenantRetryConfig { max_retries: Some(3), ..TenantRetryConfig::default() };

        assert_eq!(resolve_max_retries(&terminal, &tenant, 5), 7);
        assert_eq!(resolve_max_retries(&TerminalRetryConfig::default(), &tenant, 5), 3);
        assert_eq!(
            resolve_max_retries(&TerminalRetryConfig::default(), &TenantRetryConfig::default(), 5),
            5
        );
    }

    #[test]
    fn base_interval_resolution_falls_through() {
        let terminal = TerminalRetryConfig {
            retry_interval_seconds: Some(120),
            ..TerminalRetryConfig::default()
        };
        let default = Duration::from_secs(300);

        assert_eq!(
            resolve_base_interval(&terminal, &TenantRetryConfig::default(), default),
            Duration::from_secs(120)
        );
        assert_eq!(
            resolve_base_interval(&TerminalRetryConfig::default(), &TenantRetryConfig::default(), default),
            default
        );
    }

    #[test]
    fn retry_reason_display_is_snake_case() {
        assert_eq!(RetryReason::NetworkError.to_string(), "network_error");
        assert_eq!(RetryReason::MaxRetriesExceeded.to_string(), "max_retries_exceeded");
        assert_eq!(RetryReason::InvalidChecksum.to_string(), "invalid_checksum");
    }
}
