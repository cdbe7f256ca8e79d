use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use coffer_core::backend::file::FileBackend;
use coffer_core::backend::memory::MemoryBackend;
use coffer_core::sweep::DEFAULT_SWEEP_CONCURRENCY;

use crate::state::SharedBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process storage, lost on shutdown.
    Memory,
    /// One JSON file per secret under the data directory.
    File,
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub bind: SocketAddr,
    pub backend: BackendKind,
    pub data_dir: Option<PathBuf>,
    pub sweep: SweepSettings,
}

#[derive(Clone, Copy, Debug)]
pub struct SweepSettings {
    /// Time between sweep passes; zero disables the background sweeper.
    pub interval: Duration,
    /// Extra seconds an expired secret survives before sweeps remove it.
    pub grace_secs: u64,
    pub concurrency: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8200)),
            backend: BackendKind::Memory,
            data_dir: None,
            sweep: SweepSettings::default(),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            grace_secs: 0,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }
}

pub fn build_backend(config: &BrokerConfig) -> Result<SharedBackend> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
        BackendKind::File => {
            let dir = config
                .data_dir
                .clone()
                .context("COFFER_DATA_DIR is required for the file backend")?;
            Ok(Arc::new(FileBackend::new(dir)))
        }
    }
}
