//! Application state shared across handlers.

use crate::lifecycle::Lifecycle;
use crate::sweeper::Sweeper;
use crate::transfer::{TransferLimits, TransferPipeline};
use crate::validator::TokenValidator;
use ferry_core::config::AppConfig;
use ferry_metadata::MetadataStore;
use ferry_storage::DataBackend;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Storage backend for file contents.
    pub storage: Arc<dyn DataBackend>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// External one-time-token validator.
    pub validator: Arc<dyn TokenValidator>,
    /// File status transitions.
    pub lifecycle: Lifecycle,
    /// Ingest and egress.
    pub pipeline: TransferPipeline,
}

impl AppState {
    /// Wire the transfer pipeline and lifecycle controller over the given backends.
    ///
    /// The configuration is expected to be validated already.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn DataBackend>,
        metadata: Arc<dyn MetadataStore>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let lifecycle = Lifecycle::new(storage.clone(), metadata.clone());
        let pipeline = TransferPipeline::new(
            storage.clone(),
            lifecycle.clone(),
            validator.clone(),
            TransferLimits::from(&config.server),
        );

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            validator,
            lifecycle,
            pipeline,
        }
    }

    /// Build the expiry sweeper, if enabled.
    pub fn sweeper(&self) -> Option<Sweeper> {
        self.config.sweeper.enabled.then(|| {
            Sweeper::new(
                self.storage.clone(),
                self.metadata.clone(),
                self.config.sweeper.clone(),
            )
        })
    }
}
