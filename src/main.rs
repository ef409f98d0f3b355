//! Tillgate diagnostic CLI.
//!
//! Operator surface over the resilience layer's public contracts: inspect
//! and reset circuit breakers, feed synthetic traffic to the tenant
//! observer, and compute or verify submission checksums.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tillgate_core::{
    models::{ServiceName, TenantId},
    Clock, CoreError, NoOpEventHandler, SystemClock,
};
use tillgate_resilience::{
    compute_checksum, validate_submission_checksums, AdminHandle, CircuitBreaker, Config,
    MemoryBreakerStore, TenantObserver,
};
use tracing::info;
use uuid::Uuid;

/// Tillgate - resilient forwarding for point-of-sale transactions
#[derive(Parser, Debug)]
#[command(name = "tillgate")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the circuit breaker record for a (tenant, service) pair
    Status {
        /// Tenant UUID
        tenant: Uuid,

        /// Downstream service name
        service: String,
    },

    /// List every circuit breaker record
    #[command(alias = "ls")]
    StatusAll,

    /// Reset a circuit breaker's failure counters
    Reset {
        /// Tenant UUID
        tenant: Uuid,

        /// Downstream service name
        service: String,
    },

    /// Feed synthetic attempts/failures to the tenant observer
    Simulate {
        /// Tenant UUID
        tenant: Uuid,

        /// Number of attempts to record
        #[arg(short, long, default_value = "10")]
        attempts: u32,

        /// Number of retryable failures to record
        #[arg(short, long, default_value = "0")]
        failures: u32,
    },

    /// Compute the canonical checksum of a JSON payload file
    Checksum {
        /// Path to a JSON object file
        file: PathBuf,
    },

    /// Verify the checksums of a submission envelope file
    Verify {
        /// Path to a JSON submission envelope file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events = Arc::new(NoOpEventHandler);
    let breaker = Arc::new(CircuitBreaker::new(
        config.to_circuit_config(),
        Arc::new(MemoryBreakerStore::new()),
        clock.clone(),
        events.clone(),
    ));
    let observer = Arc::new(TenantObserver::new(config.to_observer_config(), clock, events));
    let admin = AdminHandle::new(breaker, observer);

    match cli.command {
        Commands::Status { tenant, service } => {
            let tenant = TenantId::from(tenant);
            let service = ServiceName::new(service);
            // Inspection must not create a record for an untouched pair
            match admin.breaker_status(tenant, &service).await {
                Ok(state) => {
                    println!("breaker {tenant}/{service}");
                    print_breaker(&state);
                },
                Err(CoreError::NotFound { .. }) => {
                    println!("no record for breaker {tenant}/{service}");
                },
                Err(error) => return Err(error.into()),
            }
        },
        Commands::StatusAll => {
            let statuses = admin.all_breaker_status().await;
            if statuses.is_empty() {
                println!("no breaker records");
            }
            for (key, state) in statuses {
                println!("breaker {key}");
                print_breaker(&state);
            }
        },
        Commands::Reset { tenant, service } => {
            let tenant = TenantId::from(tenant);
            let service = ServiceName::new(service);
            admin.reset_breaker(tenant, &service).await?;
            println!("breaker {tenant}/{service} reset");
        },
        Commands::Simulate { tenant, attempts, failures } => {
            let snapshot =
                admin.simulate_observer_traffic(TenantId::from(tenant), attempts, failures).await?;
            println!("tenant {tenant}");
            println!("  attempts:       {}", snapshot.attempts);
            println!("  failures:       {}", snapshot.failures);
            println!("  failure ratio:  {:.2}", snapshot.failure_ratio);
            println!("  eligible:       {}", snapshot.eligible);
            println!("  over threshold: {}", snapshot.over_threshold);
        },
        Commands::Checksum { file } => {
            let payload = read_json(&file)?;
            let fields = payload.as_object().context("payload must be a JSON object")?;
            println!("{}", compute_checksum(fields));
        },
        Commands::Verify { file } => {
            let envelope = read_json(&file)?;
            let report = validate_submission_checksums(&envelope);
            if report.is_valid() {
                println!("checksums valid");
            } else {
                for error in &report.errors {
                    println!("error: {error}");
                }
                anyhow::bail!("checksum verification failed");
            }
        },
    }

    Ok(())
}

fn print_breaker(state: &tillgate_core::models::BreakerState) {
    println!("  state:          {}", state.state);
    println!("  failures:       {}/{}", state.failure_count, state.failure_threshold);
    println!("  reset timeout:  {}s", state.reset_timeout_seconds);
    println!("  trips:          {}", state.trip_count);
    match state.cooldown_until {
        Some(until) => println!("  cooldown until: {until}"),
        None => println!("  cooldown until: -"),
    }
}

fn read_json(path: &PathBuf) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.rust_log))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();

    info!(log_filter = %config.rust_log, "tracing initialized");
}
