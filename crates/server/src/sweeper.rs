//! Background purge of expired uploads.
//!
//! The sweeper sleeps for a random duration inside the configured window,
//! then removes every expired upload from storage and from the metadata
//! store. Jitter keeps several instances sharing one metadata store from
//! sweeping in lockstep.

use crate::metrics::{SWEEPER_CYCLES, SWEEPER_ERRORS, UPLOADS_PURGED};
use ferry_core::config::SweeperConfig;
use ferry_metadata::{MetadataResult, MetadataStore};
use ferry_storage::DataBackend;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Uploads matched by the expiry query.
    pub expired: u64,
    /// Uploads removed from both backends.
    pub purged: u64,
    /// Failed purge steps.
    pub errors: u64,
}

/// Periodic purge of expired uploads.
pub struct Sweeper {
    storage: Arc<dyn DataBackend>,
    metadata: Arc<dyn MetadataStore>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(
        storage: Arc<dyn DataBackend>,
        metadata: Arc<dyn MetadataStore>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            storage,
            metadata,
            config,
        }
    }

    /// Random sleep before the next pass, uniform over the configured window.
    pub fn next_delay(&self) -> Duration {
        let min = self.config.min_interval_secs;
        let max = self.config.max_interval_secs.max(min);
        Duration::from_secs(rand::rng().random_range(min..=max))
    }

    /// Run one pass over uploads expired at `now`.
    ///
    /// Storage is purged before metadata, and metadata only once storage
    /// succeeded. A failure on one upload is logged and the pass moves on;
    /// the upload is retried next cycle.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: i64) -> MetadataResult<SweepStats> {
        SWEEPER_CYCLES.inc();
        let ids = self.metadata.list_expired_upload_ids(now).await?;
        let mut stats = SweepStats {
            expired: ids.len() as u64,
            ..SweepStats::default()
        };

        for id in ids {
            match self.metadata.get_upload(&id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(upload_id = %id, "Expired upload already gone");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(upload_id = %id, error = %e, "Failed to load expired upload");
                    stats.errors += 1;
                    continue;
                }
            }

            if let Err(e) = self.storage.delete_upload(&id).await {
                tracing::warn!(upload_id = %id, error = %e, "Failed to purge expired upload from storage");
                stats.errors += 1;
                continue;
            }
            if let Err(e) = self.metadata.delete_upload(&id).await {
                tracing::warn!(upload_id = %id, error = %e, "Failed to purge expired upload metadata");
                stats.errors += 1;
                continue;
            }

            stats.purged += 1;
            tracing::debug!(upload_id = %id, "Expired upload purged");
        }

        UPLOADS_PURGED.inc_by(stats.purged);
        SWEEPER_ERRORS.inc_by(stats.errors);
        if stats.expired > 0 {
            tracing::info!(
                expired = stats.expired,
                purged = stats.purged,
                errors = stats.errors,
                "Sweep finished"
            );
        }
        Ok(stats)
    }

    /// Sleep and sweep forever.
    pub async fn run(self) {
        tracing::info!(
            min_interval_secs = self.config.min_interval_secs,
            max_interval_secs = self.config.max_interval_secs,
            "Expiry sweeper started"
        );

        loop {
            tokio::time::sleep(self.next_delay()).await;
            if let Err(e) = self.sweep_once(ferry_core::now_unix()).await {
                tracing::error!(error = %e, "Failed to list expired uploads, skipping this sweep");
            }
        }
    }

    /// Run the sweeper on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
