//! Streaming ingest of one file into storage.

use super::TransferPipeline;
use crate::metrics::{BYTES_INGESTED, FILES_INGESTED, INGEST_DURATION, record_ingest_failure};
use bytes::{Bytes, BytesMut};
use ferry_core::sniff::{DEFAULT_CONTENT_TYPE, sniff_content_type};
use ferry_core::{ContentHash, ContentHasher, File, FileId, FileStatus, Upload};
use ferry_metadata::MetadataError;
use ferry_storage::{ByteStream, StorageError, StorageResult};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::time::Instant;
use tokio::sync::mpsc;

/// Ways an ingest can fail. No file is registered after any of them.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("file exceeds maximum size of {limit} bytes")]
    SizeLimitExceeded { limit: u64 },

    /// Reading the client body failed, typically a disconnect.
    #[error("client stream failed: {0}")]
    Client(String),

    #[error("storage write failed: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to persist file record: {0}")]
    Metadata(#[from] MetadataError),

    /// The backend writer task stopped without reporting a storage error.
    #[error("storage writer failed: {0}")]
    Writer(String),
}

impl IngestError {
    /// Label used for the ingest failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SizeLimitExceeded { .. } => "size_limit",
            Self::Client(_) => "client",
            Self::Storage(_) => "storage",
            Self::Metadata(_) => "metadata",
            Self::Writer(_) => "writer",
        }
    }
}

/// Message carried by the conduit from producer to writer.
#[derive(Debug)]
enum Frame {
    Data(Bytes),
    /// Producer finished cleanly; the writer may commit.
    End,
    /// Producer gave up; the writer must discard everything.
    Abort(String),
}

/// Turn the receiving end of the conduit into the stream handed to the backend.
///
/// The stream only ends cleanly after an explicit `End`. A dropped sender
/// surfaces as an error so a vanished producer can never commit a truncated file.
fn conduit_stream(mut rx: mpsc::Receiver<Frame>) -> impl Stream<Item = StorageResult<Bytes>> + Send {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Some(Frame::Data(chunk)) => yield Ok(chunk),
                Some(Frame::End) => break,
                Some(Frame::Abort(reason)) => {
                    yield Err(StorageError::Aborted(reason));
                    break;
                }
                None => {
                    yield Err(StorageError::Aborted("ingest producer went away".to_string()));
                    break;
                }
            }
        }
    }
}

/// Reads the client body, re-chunks it, and feeds the conduit.
struct Producer {
    tx: mpsc::Sender<Frame>,
    hasher: ContentHasher,
    size: u64,
    content_type: Option<&'static str>,
    max_size: u64,
}

impl Producer {
    fn new(tx: mpsc::Sender<Frame>, max_size: u64) -> Self {
        Self {
            tx,
            hasher: ContentHash::hasher(),
            size: 0,
            content_type: None,
            max_size,
        }
    }

    async fn pump<S, E>(&mut self, input: S, chunk_size: usize) -> Result<(), IngestError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut input = std::pin::pin!(input);
        let mut pending = BytesMut::with_capacity(chunk_size);

        while let Some(item) = input.next().await {
            let data = item.map_err(|e| IngestError::Client(e.to_string()))?;
            pending.extend_from_slice(&data);
            while pending.len() >= chunk_size {
                let chunk = pending.split_to(chunk_size).freeze();
                self.forward(chunk).await?;
            }
        }

        if !pending.is_empty() {
            self.forward(pending.freeze()).await?;
        }
        Ok(())
    }

    /// Sniff, hash and count one chunk, hand it to the writer, then enforce the cap.
    async fn forward(&mut self, chunk: Bytes) -> Result<(), IngestError> {
        if self.content_type.is_none() {
            self.content_type = Some(sniff_content_type(&chunk));
        }
        self.hasher.update(&chunk);
        self.size += chunk.len() as u64;

        self.tx
            .send(Frame::Data(chunk))
            .await
            .map_err(|_| IngestError::Writer("storage writer stopped reading".to_string()))?;

        if self.size > self.max_size {
            return Err(IngestError::SizeLimitExceeded {
                limit: self.max_size,
            });
        }
        Ok(())
    }
}

impl TransferPipeline {
    /// Stream `input` into storage as a new file of `upload` and register it.
    ///
    /// On failure the partially written object is deleted (best effort) and
    /// nothing is registered.
    #[tracing::instrument(skip(self, upload, input), fields(upload_id = %upload.id, file_id))]
    pub async fn ingest<S, E>(&self, upload: &Upload, name: &str, input: S) -> Result<File, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let started = Instant::now();
        let file_id = FileId::new();
        tracing::Span::current().record("file_id", tracing::field::display(&file_id));

        match self.ingest_inner(upload, &file_id, name, input).await {
            Ok(file) => {
                FILES_INGESTED.inc();
                BYTES_INGESTED.inc_by(file.size);
                INGEST_DURATION.observe(started.elapsed().as_secs_f64());
                tracing::info!(name = %file.name, size = file.size, content_type = %file.content_type, "File ingested");
                Ok(file)
            }
            Err(e) => {
                record_ingest_failure(e.reason());
                tracing::warn!(error = %e, "Ingest failed");
                if let Err(cleanup) = self.storage.delete_file(&upload.id, &file_id).await {
                    tracing::warn!(error = %cleanup, "Failed to clean up partially ingested file");
                }
                Err(e)
            }
        }
    }

    async fn ingest_inner<S, E>(
        &self,
        upload: &Upload,
        file_id: &FileId,
        name: &str,
        input: S,
    ) -> Result<File, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let (tx, rx) = mpsc::channel(self.limits.conduit_depth);
        let writer = {
            let storage = self.storage.clone();
            let upload_id = upload.id.clone();
            let file_id = file_id.clone();
            tokio::spawn(async move {
                let body: ByteStream = Box::pin(conduit_stream(rx));
                storage.write_file(&upload_id, &file_id, body).await
            })
        };

        let mut producer = Producer::new(tx, self.limits.max_file_size);
        let produced = producer.pump(input, self.limits.chunk_size).await;

        let details = match produced {
            Ok(()) => {
                // A failed send means the writer already stopped; its result says why.
                let _ = producer.tx.send(Frame::End).await;
                match writer.await {
                    Ok(Ok(details)) => details,
                    Ok(Err(e)) => return Err(IngestError::Storage(e)),
                    Err(join) => return Err(IngestError::Writer(join.to_string())),
                }
            }
            Err(e) => {
                let _ = producer.tx.send(Frame::Abort(e.to_string())).await;
                let written = writer.await;
                return Err(match (e, written) {
                    (IngestError::Writer(_), Ok(Err(storage))) => IngestError::Storage(storage),
                    (e, _) => e,
                });
            }
        };

        let mut file = File::new(file_id.clone(), name);
        file.size = producer.size;
        file.digest = producer.hasher.finalize().to_hex();
        file.content_type = producer
            .content_type
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        file.status = FileStatus::Uploaded;
        file.upload_date = ferry_core::now_unix();
        file.backend_details = details;

        self.lifecycle.register_file(&upload.id, &file).await?;
        Ok(file)
    }
}
