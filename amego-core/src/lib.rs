//! Rust client for the Amego (光貿) e-invoice JSON API: invoice and allowance
//! models, tax calculation, request signing and submission.
//!
//! # Examples
//! ```rust
//! use amego_core::config::Config;
//!
//! let config = Config::new("12345678", "app-key")?;
//! # let _ = config;
//! # Ok::<(), amego_core::config::ConfigError>(())
//! ```
pub mod allowance;
pub mod api;
pub mod config;
pub mod invoice;
pub mod sign;

use thiserror::Error;

pub use allowance::{AllowanceItem, AllowanceRecord};
pub use api::{AmegoClient, ApiError, ApiResponse, ClockReading, ListQuery, submit};
pub use config::{Config, ConfigError};
pub use invoice::{InvoiceError, InvoiceRecord, ValidationError};
pub use sign::{SignedRequest, SigningError};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Signing(#[from] sign::SigningError),
    #[error(transparent)]
    Api(#[from] api::ApiError),
}
