pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use auth::Authorizer;
use chrono::{DateTime, Utc};
use coffer_core::crypto::envelope::{EnvelopeService, MasterKey};
use coffer_core::sweep::Sweeper;
use coffer_core::vault::SecretVault;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use config::{BackendKind, BrokerConfig, SweepSettings};
pub use state::AppState;
pub use telemetry::CorrelationId;

pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let state = build_state(&config)?;

    let http_listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind http listener on {addr}", addr = config.bind))?;

    let http_addr = http_listener.local_addr()?;
    info!(%http_addr, "http server listening");

    let http_router = http::router(state.clone());
    let http_server = tokio::spawn(async move {
        axum::serve(http_listener, http_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(anyhow::Error::from)
    });

    let sweep_task = if config.sweep.interval.is_zero() {
        warn!("expiry sweeps disabled; sweep interval is 0");
        None
    } else {
        Some(tokio::spawn(run_sweeper(state.clone(), config.sweep)))
    };

    http_server.await??;

    if let Some(task) = sweep_task {
        task.abort();
    }

    Ok(())
}

pub fn build_state(config: &BrokerConfig) -> anyhow::Result<AppState> {
    let authorizer = Authorizer::from_env()?;
    let master = MasterKey::from_env().context("failed to load the at-rest encryption key")?;
    let backend = config::build_backend(config)?;

    let vault = SecretVault::new(Arc::clone(&backend), EnvelopeService::new(master));
    let sweeper = Sweeper::new(backend).with_concurrency(config.sweep.concurrency);

    Ok(AppState::new(
        Arc::new(vault),
        Arc::new(sweeper),
        Arc::new(authorizer),
    ))
}

async fn run_sweeper(state: AppState, settings: SweepSettings) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let cutoff = sweep_cutoff(Utc::now(), settings.grace_secs);
        if let Err(err) = state.sweeper.sweep(cutoff).await {
            warn!(error = %err, "expiry sweep failed");
        }
    }
}

/// Cutoff for one sweep pass: now minus the configured grace. A grace
/// too large for the datetime range floors the cutoff, and a floored
/// cutoff matches no record.
fn sweep_cutoff(now: DateTime<Utc>, grace_secs: u64) -> DateTime<Utc> {
    i64::try_from(grace_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|grace| now.checked_sub_signed(grace))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(?err, "failed to install sigterm handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
