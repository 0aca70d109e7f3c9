//! ApoloBilling Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! shared by the rating, event cost and scheduler crates. It includes:
//!
//! - Domain models (Account, Balance, BalanceFilter, Action, AccountSummary)
//! - Traits for the external collaborators (storage, filters, publication, cache)
//! - Unified error handling
//! - Configuration and tracing setup
//! - Rounding and time helpers

pub mod config;
pub mod error;
pub mod models;
pub mod telemetry;
pub mod traits;
pub mod utils;

pub use config::RatingConfig;
pub use error::BillingError;

/// Result type alias using BillingError
pub type BillingResult<T> = Result<T, BillingError>;
