//! Resilience layer for point-of-sale transaction forwarding.
//!
//! Wraps every outbound call to a downstream service in four cooperating
//! mechanisms:
//!
//! 1. **Checksum verification** - canonical-JSON SHA-256 integrity checks on
//!    the submission envelope and its embedded transaction.
//! 2. **Circuit breaker** - a per-(tenant, service) CLOSED/OPEN/HALF_OPEN
//!    gate with absolute-timestamp cooldowns.
//! 3. **Retry scheduler** - failure-reason-specific delays with exponential
//!    backoff and jitter for server errors, and a terminal
//!    permanently-failed state once the retry budget is exhausted.
//! 4. **Tenant observer** - a windowed attempt/failure ratio per tenant that
//!    raises early-warning alerts before any single breaker trips.
//!
//! The [`dispatch::Dispatcher`] composes them: verify checksum, consult the
//! breaker, attempt delivery through a black-box [`dispatch::Transport`],
//! record the outcome and schedule a retry or mark the operation permanently
//! failed. Delays and cooldowns are absolute timestamps compared against an
//! injected clock; this layer never sleeps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod checksum;
pub mod circuit;
pub mod config;
pub mod dispatch;
pub mod observer;
pub mod retry;
pub mod store;

pub use admin::AdminHandle;
pub use checksum::{compute_checksum, validate_submission_checksums, ChecksumReport};
pub use circuit::{CircuitBreaker, CircuitConfig};
pub use config::Config;
pub use dispatch::{DispatchOutcome, DispatchRequest, Dispatcher, Transport};
pub use observer::{ObserverConfig, TenantFailureSnapshot, TenantObserver};
pub use retry::{RetryConfig, RetryScheduler, RetrySource};
pub use store::{BreakerStore, MemoryBreakerStore, Versioned};
