use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use coffer_broker::{BackendKind, BrokerConfig, SweepSettings};
use coffer_core::sweep::DEFAULT_SWEEP_CONCURRENCY;

#[derive(Parser)]
#[command(name = "coffer-broker", about = "Encrypted secret store with scope-guarded HTTP access")]
struct BrokerArgs {
    /// Address to bind the HTTP listener on
    #[arg(long, env = "COFFER_BIND", default_value = "0.0.0.0:8200")]
    bind: SocketAddr,
    /// Storage backend
    #[arg(long, env = "COFFER_BACKEND", value_enum, default_value = "memory")]
    backend: BackendKind,
    /// Data directory for the file backend
    #[arg(long, env = "COFFER_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Seconds between expiry sweeps; 0 disables the background sweeper
    #[arg(long, env = "COFFER_SWEEP_INTERVAL_SECS", default_value_t = 600)]
    sweep_interval_secs: u64,
    /// Extra seconds an expired secret is kept before sweeps may remove it
    #[arg(long, env = "COFFER_SWEEP_GRACE_SECS", default_value_t = 0)]
    sweep_grace_secs: u64,
    /// Maximum in-flight deletes per sweep pass
    #[arg(long, env = "COFFER_SWEEP_CONCURRENCY", default_value_t = DEFAULT_SWEEP_CONCURRENCY)]
    sweep_concurrency: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("broker exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = BrokerArgs::parse();
    coffer_broker::telemetry::init()?;

    let config = BrokerConfig {
        bind: args.bind,
        backend: args.backend,
        data_dir: args.data_dir,
        sweep: SweepSettings {
            interval: Duration::from_secs(args.sweep_interval_secs),
            grace_secs: args.sweep_grace_secs,
            concurrency: args.sweep_concurrency,
        },
    };

    coffer_broker::run(config).await
}
