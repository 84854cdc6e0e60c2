//! AERIS — air-quality aggregation and forecasting daemon.
//!
//! Constructs every component once at startup and hands capability
//! handles down the graph: providers → caches → service → scheduler,
//! push bus → dispatcher, registry → everything that needs subscribers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aeris_common::config::Settings;
use aeris_svc::bus::PushBus;
use aeris_svc::dispatch::AlertDispatcher;
use aeris_svc::scheduler::Scheduler;
use aeris_svc::server::{self, AppState};
use aeris_svc::service::AirQualityService;
use aeris_svc::subscription::SubscriptionRegistry;
use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// AERIS air-quality aggregation and forecasting service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address (overrides configuration)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("aeris_svc={log_level},aeris_common={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("AERIS starting...");

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.http.bind_addr = bind;
    }
    if settings.providers.allow_mock_fallback {
        info!("deterministic mock fallback is enabled");
    } else {
        warn!("mock fallback disabled; requests with no upstream data will return unavailable");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service = Arc::new(AirQualityService::from_settings(
        &settings,
        shutdown_rx.clone(),
    )?);
    let registry = Arc::new(SubscriptionRegistry::new());
    let bus = Arc::new(PushBus::new(settings.bus.outbox_capacity));
    let dispatcher = Arc::new(AlertDispatcher::new(
        bus.clone(),
        Arc::new(aeris_svc::notify::LogEmailSink),
        Arc::new(aeris_svc::notify::LogSmsSink),
        chrono::Duration::minutes(settings.dispatch.cooldown_minutes as i64),
        settings.dispatch.history_capacity,
    ));

    let scheduler = Scheduler::new(
        service.clone(),
        registry.clone(),
        dispatcher.clone(),
        bus.clone(),
        Duration::from_secs(settings.scheduler.cadence_minutes * 60),
        settings.scheduler.worker_pool,
        Duration::from_secs(settings.scheduler.shutdown_grace_secs),
        shutdown_rx.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    let state = AppState {
        service,
        registry,
        dispatcher,
        bus,
        request_deadline: Duration::from_secs(settings.http.request_deadline_secs),
        started_at: Utc::now(),
    };

    // Translate Ctrl-C into the shutdown signal every component watches.
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    server::start(&settings.http.bind_addr, state, shutdown_rx).await?;

    // Server is down; make sure the scheduler drains too.
    let _ = shutdown_tx.send(true);
    let _ = scheduler_handle.await;
    info!("AERIS stopped");
    Ok(())
}
