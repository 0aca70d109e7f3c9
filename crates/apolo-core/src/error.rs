//! Unified error handling for the rating engine
//!
//! Every fallible operation in the workspace returns [`BillingError`]. Each
//! variant maps to a stable machine-readable code through
//! [`BillingError::error_code`], used in logs and published events.

use thiserror::Error;

/// Main error type for rating, event cost and scheduling operations
#[derive(Error, Debug)]
pub enum BillingError {
    // ==================== Rating Errors ====================
    #[error("Uncomputable pricing: no rate tier covers offset {offset_secs}s")]
    UncomputablePricing { offset_secs: i64 },

    #[error("Invalid call data: {0}")]
    InvalidCallData(String),

    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    #[error("No rating information for {0}")]
    RatingInfoMissing(String),

    // ==================== EventCost Errors ====================
    #[error("Trim failed: {0}")]
    Trim(String),

    #[error("Dangling reference {id} in {table}")]
    DanglingReference { table: &'static str, id: String },

    // ==================== Scheduler Errors ====================
    #[error("Action type not registered: {0}")]
    ActionNotRegistered(String),

    #[error("Action {action_type} failed: {reason}")]
    ActionFailed { action_type: String, reason: String },

    #[error("Action timing {uuid} partially executed: {last_error}")]
    PartiallyExecuted { uuid: String, last_error: String },

    #[error("Cron expression error: {0}")]
    Cron(String),

    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("Report channel closed")]
    ChannelClosed,

    // ==================== Persistence Errors ====================
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Actions not found: {0}")]
    ActionsNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BillingError {
    /// Returns the stable error code for logs and events
    pub fn error_code(&self) -> &'static str {
        match self {
            BillingError::UncomputablePricing { .. } => "uncomputable_pricing",
            BillingError::InvalidCallData(_) => "invalid_call_data",
            BillingError::InvalidTiming(_) => "invalid_timing",
            BillingError::RatingInfoMissing(_) => "rating_info_missing",
            BillingError::Trim(_) => "trim_failed",
            BillingError::DanglingReference { .. } => "dangling_reference",
            BillingError::ActionNotRegistered(_) => "action_not_registered",
            BillingError::ActionFailed { .. } => "action_failed",
            BillingError::PartiallyExecuted { .. } => "partially_executed",
            BillingError::Cron(_) => "cron_error",
            BillingError::LockTimeout(_) => "lock_timeout",
            BillingError::ChannelClosed => "channel_closed",
            BillingError::AccountNotFound(_) => "account_not_found",
            BillingError::ActionsNotFound(_) => "actions_not_found",
            BillingError::Storage(_) => "storage_error",
            BillingError::Cache(_) => "cache_error",
            BillingError::Validation(_) => "validation_error",
            BillingError::UnsupportedFormat(_) => "unsupported_format",
            BillingError::Internal(_) => "internal_error",
            BillingError::Config(_) => "config_error",
            BillingError::Serialization(_) => "serialization_error",
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for BillingError {
    fn from(err: config::ConfigError) -> Self {
        BillingError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for BillingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BillingError::Validation(err.to_string())
    }
}

impl From<cron::error::Error> for BillingError {
    fn from(err: cron::error::Error) -> Self {
        BillingError::Cron(err.to_string())
    }
}

impl From<chrono::ParseError> for BillingError {
    fn from(err: chrono::ParseError) -> Self {
        BillingError::UnsupportedFormat(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BillingError::UncomputablePricing { offset_secs: 30 }.error_code(),
            "uncomputable_pricing"
        );
        assert_eq!(
            BillingError::ActionNotRegistered("*topup".to_string()).error_code(),
            "action_not_registered"
        );
    }

    #[test]
    fn test_display_includes_offset() {
        let err = BillingError::UncomputablePricing { offset_secs: 90 };
        assert!(err.to_string().contains("90s"));
    }
}
