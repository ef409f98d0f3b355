//! End-to-end scenarios across the composed resilience layer.
//!
//! Drives the dispatcher through realistic delivery sequences with a
//! scripted transport and a simulated clock, asserting the externally
//! observable lifecycle: breaker trips and recovery, retry scheduling
//! through to permanent failure, checksum rejection and tenant alerts.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use serde_json::{json, Value};
use tillgate_core::{
    models::{
        BreakerKey, CircuitState, OperationStatus, RetryReason, RetryableOperation, ServiceName,
        SubmissionId, TenantId, TenantRetryConfig, TerminalId,
    },
    Clock, CoreError, EventHandler, NoOpEventHandler, Result, TestClock,
};
use tillgate_resilience::{
    compute_checksum, checksum::CHECKSUM_FIELD, CircuitBreaker, CircuitConfig, DispatchOutcome,
    DispatchRequest, Dispatcher, MemoryBreakerStore, ObserverConfig, RetryConfig, RetryScheduler,
    RetrySource, TenantObserver, Transport,
};
use tokio::sync::Mutex;

/// Transport replaying a scripted sequence of delivery results.
#[derive(Debug, Default)]
struct ScriptedTransport {
    results: Mutex<VecDeque<Result<()>>>,
}

impl ScriptedTransport {
    async fn script(&self, results: Vec<Result<()>>) {
        self.results.lock().await.extend(results);
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn deliver(&self, _request: &DispatchRequest) -> Result<()> {
        self.results.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

struct Env {
    dispatcher: Dispatcher,
    breaker: Arc<CircuitBreaker>,
    observer: Arc<TenantObserver>,
    transport: Arc<ScriptedTransport>,
    clock: TestClock,
}

fn env_with(circuit: CircuitConfig) -> Env {
    let clock = TestClock::new();
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let events: Arc<dyn EventHandler> = Arc::new(NoOpEventHandler);

    let breaker = Arc::new(CircuitBreaker::new(
        circuit,
        Arc::new(MemoryBreakerStore::new()),
        shared_clock.clone(),
        events.clone(),
    ));
    let scheduler =
        Arc::new(RetryScheduler::new(RetryConfig::default(), shared_clock.clone(), events.clone()));
    let observer = Arc::new(TenantObserver::new(
        ObserverConfig::default(),
        shared_clock.clone(),
        events.clone(),
    ));
    let transport = Arc::new(ScriptedTransport::default());

    let dispatcher = Dispatcher::new(
        breaker.clone(),
        scheduler,
        observer.clone(),
        transport.clone(),
        events,
        shared_clock,
    );

    Env { dispatcher, breaker, observer, transport, clock }
}

fn signed_envelope() -> Value {
    let mut transaction = json!({
        "transaction_id": "txn-1001",
        "amount": 18.90,
        "currency": "EUR",
        "taxes": [{"rate": 19.00, "amount": 3.02}],
    })
    .as_object()
    .cloned()
    .expect("object literal");
    let checksum = compute_checksum(&transaction);
    transaction.insert(CHECKSUM_FIELD.to_string(), json!(checksum));

    let mut envelope = json!({
        "submission_id": "sub-1001",
        "terminal_id": "till-7",
        "transaction": transaction,
    })
    .as_object()
    .cloned()
    .expect("object literal");
    let checksum = compute_checksum(&envelope);
    envelope.insert(CHECKSUM_FIELD.to_string(), json!(checksum));

    Value::Object(envelope)
}

fn request_for(tenant: TenantId, service: &ServiceName) -> (DispatchRequest, RetryableOperation) {
    let request = DispatchRequest {
        submission_id: SubmissionId::new(),
        tenant_id: tenant,
        terminal_id: TerminalId::new(),
        service: service.clone(),
        envelope: signed_envelope(),
    };
    let operation = RetryableOperation::new(
        request.submission_id,
        request.tenant_id,
        request.terminal_id,
        request.service.clone(),
    );
    (request, operation)
}

#[tokio::test]
async fn breaker_trips_cools_down_and_recovers() {
    let env = env_with(CircuitConfig {
        failure_threshold: 5,
        cooldown: Duration::from_secs(60),
    });
    let tenant = TenantId::new();
    let service = ServiceName::from("webapp");
    let key = BreakerKey::new(tenant, service.clone());
    let source = RetrySource {
        tenant: TenantRetryConfig { max_retries: Some(20), ..Default::default() },
        ..RetrySource::default()
    };
    let (request, mut operation) = request_for(tenant, &service);

    // Five consecutive failures trip the breaker
    for _ in 0..5 {
        env.transport.script(vec![Err(CoreError::server(503, "unavailable"))]).await;
        let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;
        assert!(matches!(outcome, DispatchOutcome::Scheduled { .. }));
    }

    let state = env.breaker.status(&key).await.expect("breaker exists");
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.trip_count, 1);
    assert!(!env.breaker.is_allowed(&key).await);

    // While open, dispatch skips without consuming retry budget
    let budget_before = operation.retry_count;
    let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;
    assert!(matches!(outcome, DispatchOutcome::Skipped { .. }));
    assert_eq!(operation.retry_count, budget_before);

    // Cooldown expiry opens a probe window
    env.clock.advance(Duration::from_secs(61));
    assert!(env.breaker.is_allowed(&key).await);
    assert_eq!(env.breaker.status(&key).await.expect("breaker exists").state, CircuitState::HalfOpen);

    // A single success closes the breaker and clears the count
    env.breaker.record_success(&key).await;
    let state = env.breaker.status(&key).await.expect("breaker exists");
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failure_count, 0);
}

#[tokio::test]
async fn operation_retries_until_permanently_failed() {
    let env = env_with(CircuitConfig {
        // High threshold keeps the breaker out of this scenario
        failure_threshold: 100,
        cooldown: Duration::from_secs(60),
    });
    let tenant = TenantId::new();
    let service = ServiceName::from("webhook");
    let source = RetrySource {
        tenant: TenantRetryConfig { max_retries: Some(3), ..Default::default() },
        ..RetrySource::default()
    };
    let (request, mut operation) = request_for(tenant, &service);

    for attempt in 1..=3 {
        env.transport.script(vec![Err(CoreError::network("connection refused"))]).await;
        let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;

        match outcome {
            DispatchOutcome::Scheduled { next_retry_at } => {
                assert!(next_retry_at > env.clock.now());
                assert_eq!(operation.retry_count, attempt);
            },
            other => panic!("attempt {attempt}: expected schedule, got {other:?}"),
        }
        // The external queue would wait for next_retry_at before re-invoking
        env.clock.advance(Duration::from_secs(120));
    }

    env.transport.script(vec![Err(CoreError::network("connection refused"))]).await;
    let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;
    assert_eq!(outcome, DispatchOutcome::PermanentlyFailed);
    assert_eq!(operation.status, OperationStatus::PermanentlyFailed);
    assert_eq!(operation.retry_reason, Some(RetryReason::MaxRetriesExceeded));
    assert!(operation.next_retry_at.is_none());
    assert_eq!(operation.retry_history.len(), 3);

    // Terminal state is stable across further passes
    let snapshot = operation.clone();
    let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;
    assert_eq!(outcome, DispatchOutcome::PermanentlyFailed);
    assert_eq!(operation, snapshot);
}

#[tokio::test]
async fn eventual_success_after_transient_failures() {
    let env = env_with(CircuitConfig::default());
    let tenant = TenantId::new();
    let service = ServiceName::from("webapp");
    let (request, mut operation) = request_for(tenant, &service);
    let source = RetrySource::default();

    env.transport
        .script(vec![Err(CoreError::network("timeout")), Err(CoreError::server(502, "bad gateway"))])
        .await;

    assert!(matches!(
        env.dispatcher.dispatch(&request, &mut operation, &source).await,
        DispatchOutcome::Scheduled { .. }
    ));
    assert!(matches!(
        env.dispatcher.dispatch(&request, &mut operation, &source).await,
        DispatchOutcome::Scheduled { .. }
    ));

    let outcome = env.dispatcher.dispatch(&request, &mut operation, &source).await;
    assert_eq!(outcome, DispatchOutcome::Delivered);
    assert_eq!(operation.status, OperationStatus::Succeeded);
    // History preserves the failed attempts that preceded success
    assert_eq!(operation.retry_history.len(), 2);
}

#[tokio::test]
async fn corrupted_submission_never_reaches_transport() {
    let env = env_with(CircuitConfig::default());
    let tenant = TenantId::new();
    let service = ServiceName::from("webapp");
    let (mut request, mut operation) = request_for(tenant, &service);
    request.envelope["transaction"]["amount"] = json!(9999.99);

    let outcome =
        env.dispatcher.dispatch(&request, &mut operation, &RetrySource::default()).await;

    match outcome {
        DispatchOutcome::Rejected { errors } => {
            assert!(errors.contains(&"transaction checksum mismatch".to_string()));
        },
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(operation.status, OperationStatus::PermanentlyFailed);
    assert_eq!(operation.retry_reason, Some(RetryReason::InvalidChecksum));

    // The rejection happened before any breaker or observer bookkeeping
    let key = BreakerKey::new(tenant, service);
    assert!(env.breaker.status(&key).await.is_none());
    let snapshot = env.observer.evaluate(tenant).await.expect("observation enabled");
    assert_eq!(snapshot.attempts, 0);
}

#[tokio::test]
async fn tenant_observer_flags_failing_tenant_across_services() {
    let env = env_with(CircuitConfig {
        failure_threshold: 100,
        cooldown: Duration::from_secs(60),
    });
    let tenant = TenantId::new();
    let source = RetrySource {
        tenant: TenantRetryConfig { max_retries: Some(50), ..Default::default() },
        ..RetrySource::default()
    };

    // Failures spread across services: no single breaker trips, but the
    // tenant-level ratio crosses the alert threshold
    for index in 0..12 {
        let service = ServiceName::new(format!("service-{}", index % 4));
        let (request, mut operation) = request_for(tenant, &service);
        env.transport.script(vec![Err(CoreError::server(500, "boom"))]).await;
        env.dispatcher.dispatch(&request, &mut operation, &source).await;
    }

    let snapshot = env.observer.evaluate(tenant).await.expect("observation enabled");
    assert!(snapshot.eligible);
    assert!(snapshot.over_threshold);
    assert_eq!(snapshot.attempts, 12);
    assert_eq!(snapshot.failures, 12);
}
