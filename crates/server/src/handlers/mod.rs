//! HTTP request handlers.

pub mod common;
pub mod files;
pub mod service;
pub mod uploads;

pub use files::*;
pub use service::*;
pub use uploads::*;
