//! Core domain models and shared abstractions for Tillgate.
//!
//! Provides strongly-typed identifiers, the circuit breaker and retry data
//! model, the error taxonomy, the injected clock, and the event system used
//! by the resilience layer. All other crates depend on these foundational
//! types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{EventHandler, MulticastEventHandler, NoOpEventHandler, ResilienceEvent};
pub use models::{
    BreakerKey, BreakerState, CircuitState, OperationStatus, RetryAttempt, RetryReason,
    RetryableOperation, ServiceName, SubmissionId, TenantId, TerminalId,
};
pub use time::{Clock, SystemClock, TestClock};
