use crate::backend::StorageBackend;
use crate::error::Result;
use crate::types::SealedSecret;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// Upper bound on in-flight deletes during a sweep.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 250;

/// Outcome of one sweep pass. `examined` counts the expired candidates
/// the scan produced, of which `removed` were deleted and `failed` hit a
/// storage error and were left for the next pass.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Deletes expired records in bounded-concurrency batches.
///
/// Expiry lives outside the ciphertext, so sweeping needs no key
/// material. Records expiring exactly at the cutoff are kept; only
/// strictly earlier expiries are collected.
pub struct Sweeper<B> {
    backend: B,
    concurrency: usize,
}

impl<B: StorageBackend> Sweeper<B> {
    pub fn new(backend: B) -> Self {
        Sweeper {
            backend,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Remove every record whose expiry is strictly before `cutoff`.
    ///
    /// Safe to run repeatedly and concurrently: a record another sweep
    /// already deleted counts as gone, not as a failure.
    pub async fn sweep(&self, cutoff: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self.backend.scan(&|_, bytes| {
            serde_json::from_slice::<SealedSecret>(bytes)
                .map(|sealed| sealed.expires.is_past(cutoff))
                .unwrap_or(false)
        })?;

        info!(
            target = "audit",
            action = "sweep.start",
            cutoff = %cutoff.to_rfc3339(),
            expired = expired.len(),
            "expiry sweep starting"
        );

        let examined = expired.len();
        let removed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        futures::stream::iter(expired)
            .for_each_concurrent(Some(self.concurrency), |(key, _)| {
                let removed = &removed;
                let failed = &failed;
                async move {
                    match self.backend.delete(&key) {
                        Ok(true) => {
                            removed.fetch_add(1, Ordering::Relaxed);
                        }
                        // Already gone; sweeps may overlap.
                        Ok(false) => {}
                        Err(err) => {
                            warn!(
                                target = "audit",
                                action = "sweep.error",
                                name = %key,
                                error = %err,
                                "failed to delete expired secret"
                            );
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
            .await;

        let report = SweepReport {
            examined,
            removed: removed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };

        info!(
            target = "audit",
            action = "sweep.finish",
            examined = report.examined,
            removed = report.removed,
            failed = report.failed,
            "expiry sweep completed"
        );

        Ok(report)
    }
}
