//! Transfer pipeline moving file bytes between the wire and a storage backend.
//!
//! Ingest streams a client body through a bounded conduit into
//! [`DataBackend::write_file`], hashing, sniffing and size-capping on the
//! way. Egress checks access to a file, streams it back out, and reports a
//! completed one-shot download to the lifecycle controller.

mod egress;
mod ingest;

pub use ingest::IngestError;

use crate::lifecycle::Lifecycle;
use crate::validator::TokenValidator;
use ferry_core::config::ServerConfig;
use ferry_storage::DataBackend;
use std::sync::Arc;

/// Limits applied to every transfer.
#[derive(Clone, Copy, Debug)]
pub struct TransferLimits {
    /// Largest accepted file, in bytes.
    pub max_file_size: u64,
    /// Size of the chunks forwarded to the backend writer.
    pub chunk_size: usize,
    /// Number of chunks buffered between producer and writer.
    pub conduit_depth: usize,
}

impl From<&ServerConfig> for TransferLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            chunk_size: config.ingest_chunk_size.max(1),
            conduit_depth: config.conduit_depth.max(1),
        }
    }
}

/// Ingest and egress over injected backends.
#[derive(Clone)]
pub struct TransferPipeline {
    storage: Arc<dyn DataBackend>,
    lifecycle: Lifecycle,
    validator: Arc<dyn TokenValidator>,
    limits: TransferLimits,
}

impl TransferPipeline {
    pub fn new(
        storage: Arc<dyn DataBackend>,
        lifecycle: Lifecycle,
        validator: Arc<dyn TokenValidator>,
        limits: TransferLimits,
    ) -> Self {
        Self {
            storage,
            lifecycle,
            validator,
            limits,
        }
    }

    pub fn limits(&self) -> TransferLimits {
        self.limits
    }
}
