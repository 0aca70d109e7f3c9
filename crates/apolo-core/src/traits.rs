//! Traits at the seams to external collaborators
//!
//! Persistence, filter evaluation, event publication and caching live
//! outside the rating core. These traits are the only way the core
//! reaches them.

use crate::error::BillingError;
use crate::models::{Account, Action};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Event payload handed to the publication bus
pub type EventMap = serde_json::Map<String, serde_json::Value>;

/// Account storage
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Load an account, `Ok(None)` when it does not exist
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, BillingError>;

    /// Persist an account
    async fn set_account(&self, account: &Account) -> Result<(), BillingError>;
}

/// Action list storage
#[async_trait]
pub trait ActionRepository: Send + Sync {
    /// Load the action list stored under `actions_id`
    async fn get_actions(&self, actions_id: &str) -> Result<Vec<Action>, BillingError>;
}

/// Attribute filter evaluation for per-action filters
#[async_trait]
pub trait ActionFilter: Send + Sync {
    /// Check whether `account` passes every filter in `filter_ids`
    async fn pass(
        &self,
        tenant: &str,
        filter_ids: &[String],
        account: &Account,
    ) -> Result<bool, BillingError>;
}

/// Filter evaluator that lets every account through
pub struct PassAllFilter;

#[async_trait]
impl ActionFilter for PassAllFilter {
    async fn pass(&self, _: &str, _: &[String], _: &Account) -> Result<bool, BillingError> {
        Ok(true)
    }
}

/// Event publication bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event, delivery is not awaited by the caller's logic
    async fn publish(&self, event: EventMap);
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BillingError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), BillingError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, BillingError>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> Result<bool, BillingError>;

    /// Drop every entry
    async fn clear(&self) -> Result<(), BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_all_filter() {
        let acc = Account::new("cgrates.org:1001");
        let filters = vec!["*string:~*req.Account:1001".to_string()];
        let passed = tokio_test::block_on(PassAllFilter.pass("cgrates.org", &filters, &acc));
        assert!(passed.unwrap());
    }
}
