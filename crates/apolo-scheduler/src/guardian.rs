//! Per-key exclusive locks
//!
//! Every account touched by an action timing is processed under a guard
//! keyed by its ID. Different keys never contend; the same key serializes.

use apolo_core::{BillingError, BillingResult, RatingConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Table of named async locks.
///
/// Entries are created on first use and dropped once nobody holds or
/// waits on them, so the table only grows with the number of keys in use.
#[derive(Default)]
pub struct Guardian {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Option<Duration>,
}

impl Guardian {
    /// `None` waits forever
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn from_config(config: &RatingConfig) -> Self {
        let ms = config.general.locking_timeout_ms;
        Self::new((ms > 0).then(|| Duration::from_millis(ms)))
    }

    /// Run `fut` while holding the lock on `key`.
    ///
    /// The future is not polled before the lock is acquired. Fails with
    /// [`BillingError::LockTimeout`] if the configured timeout elapses first.
    pub async fn guard<F: Future>(&self, key: &str, fut: F) -> BillingResult<F::Output> {
        let lock = self.lock_for(key);

        let held = match self.timeout {
            Some(limit) => {
                let acquired = tokio::time::timeout(limit, lock.clone().lock_owned()).await;
                match acquired {
                    Ok(held) => held,
                    Err(_) => {
                        drop(lock);
                        self.release(key);
                        warn!("Timed out after {:?} waiting for {}", limit, key);
                        return Err(BillingError::LockTimeout(key.to_string()));
                    }
                }
            }
            None => lock.clone().lock_owned().await,
        };
        debug!("Locked {}", key);

        let output = fut.await;

        drop(held);
        drop(lock);
        self.release(key);
        debug!("Unlocked {}", key);
        Ok(output)
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.locks.lock().len()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    // Only the table's own handle left means no holder and no waiter.
    fn release(&self, key: &str) {
        let mut locks = self.locks.lock();
        if locks.get(key).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}
