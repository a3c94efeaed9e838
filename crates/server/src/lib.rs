//! HTTP server for the ferry ephemeral file-sharing service.
//!
//! This crate provides:
//! - Upload creation and multipart file ingest
//! - File downloads with one-shot, removable and expiry semantics
//! - Password and one-time-token access control
//! - The background expiry sweeper
//! - Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod transfer;
pub mod validator;

pub use auth::TraceId;
pub use error::ApiError;
pub use lifecycle::Lifecycle;
pub use routes::create_router;
pub use state::AppState;
pub use sweeper::{SweepStats, Sweeper};
pub use transfer::TransferPipeline;
