//! Pushbridge: Kafka to push-notification bridge.
//!
//! Consumes notification records from a Kafka consumer group, delivers each
//! through an SNS-compatible push API with bounded retry, and advances the
//! group's offsets once every record has a decision.
//!
//! `pushbridge register-endpoint <device-token>` registers a device token
//! with the configured platform application and prints the endpoint ARN.

use std::sync::Arc;

use anyhow::{Context, Result};
use pushbridge_core::{Clock, MulticastEventHandler, RealClock};
use pushbridge_delivery::{ClaimProcessor, RetryEngine, SnsClient};
use pushbridge_kafka::KafkaSource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{config::Config, stats::ProcessingStats};

mod config;
mod stats;

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    init_tracing();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {},
        Err(e) => error!(error = %e, "Failed to read .env file"),
    }

    let config = Config::load()?;
    info!(
        brokers = %config.kafka_brokers,
        topics = %config.kafka_topics,
        group_id = %config.kafka_group_id,
        offset_reset = %config.kafka_offset_reset,
        endpoint = %config.cns_endpoint,
        region = %config.cns_region,
        access_key = %config.access_key_masked(),
        max_retry_attempts = config.max_retry_attempts,
        partition_queue_size = config.partition_queue_size,
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let client = SnsClient::new(config.to_sns_config(), clock.clone())
        .await
        .context("Failed to create push client")?;

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        return match command.as_str() {
            "register-endpoint" => {
                let token = args.next().context("usage: pushbridge register-endpoint <token>")?;
                register_endpoint(&client, &config, &token).await
            },
            other => anyhow::bail!("unknown command: {other}"),
        };
    }

    run(client, clock, &config).await
}

/// Runs the consume-and-deliver loop until a shutdown signal arrives.
async fn run(client: SnsClient, clock: Arc<dyn Clock>, config: &Config) -> Result<()> {
    info!("Starting pushbridge");

    let engine = RetryEngine::new(Arc::new(client), config.to_retry_policy(), clock)
        .context("Failed to create retry engine")?;

    let stats = ProcessingStats::new();
    let mut events = MulticastEventHandler::new();
    events.add_subscriber(Arc::new(stats.clone()));
    let processor = ClaimProcessor::new(engine, Arc::new(events));

    let kafka_config = config.to_kafka_config()?;
    let source = KafkaSource::new(&kafka_config).context("Failed to create Kafka consumer")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, starting graceful shutdown");
            cancel.cancel();
        }
    });

    info!(topics = ?source.topics(), "Pushbridge is consuming");

    let summary = source
        .run(processor, config.partition_queue_size, config.shutdown_timeout(), cancel)
        .await;

    info!(
        received = summary.received,
        advanced = summary.advanced,
        receive_errors = summary.receive_errors,
        interrupted_claims = summary.interrupted_claims,
        stopped_claims = summary.stopped_claims,
        "Consumer stopped"
    );
    stats.log_summary();

    if summary.stopped_claims > 0 {
        anyhow::bail!("a partition claim loop died; undecided records will be redelivered");
    }

    info!("Pushbridge shutdown complete");
    Ok(())
}

async fn register_endpoint(client: &SnsClient, config: &Config, token: &str) -> Result<()> {
    if config.cns_platform_arn.trim().is_empty() {
        anyhow::bail!("CNS_PLATFORM_ARN is required to register endpoints");
    }

    let endpoint_arn = client
        .create_platform_endpoint(&config.cns_platform_arn, token)
        .await
        .context("Failed to create platform endpoint")?;

    println!("{endpoint_arn}");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pushbridge=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
