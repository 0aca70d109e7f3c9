//! Collaborators shared by every action timing execution

use crate::guardian::Guardian;
use crate::registry::ActionRegistry;
use apolo_cache::keys::ACTIONS_PREFIX;
use apolo_cache::MemoryCache;
use apolo_core::traits::{AccountRepository, ActionFilter, ActionRepository, EventPublisher, PassAllFilter};
use apolo_core::{BillingError, BillingResult, RatingConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything `ActionTiming::execute` reaches outside the timing itself.
///
/// Built once and shared behind an `Arc` by the workers running timings.
pub struct ExecutionContext {
    pub(crate) accounts: Arc<dyn AccountRepository>,
    pub(crate) actions: Arc<dyn ActionRepository>,
    pub(crate) filter: Arc<dyn ActionFilter>,
    pub(crate) publisher: Option<Arc<dyn EventPublisher>>,
    pub(crate) registry: Arc<ActionRegistry>,
    pub(crate) guardian: Arc<Guardian>,
    pub(crate) cache: Arc<MemoryCache>,
    pub(crate) config: RatingConfig,
}

impl ExecutionContext {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        actions: Arc<dyn ActionRepository>,
        registry: Arc<ActionRegistry>,
        config: RatingConfig,
    ) -> Self {
        Self {
            accounts,
            actions,
            filter: Arc::new(PassAllFilter),
            publisher: None,
            registry,
            guardian: Arc::new(Guardian::from_config(&config)),
            cache: Arc::new(MemoryCache::new()),
            config,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share a cache with other components instead of a private one
    pub fn with_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Share account locks with another context
    pub fn with_guardian(mut self, guardian: Arc<Guardian>) -> Self {
        self.guardian = guardian;
        self
    }

    pub fn guardian(&self) -> &Arc<Guardian> {
        &self.guardian
    }

    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    /// Forget every cached action list, returning how many were dropped
    pub fn invalidate_actions(&self) -> usize {
        self.cache.remove_prefix(ACTIONS_PREFIX)
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Bounded success/failure channels sized from the configuration
    pub fn report_channels(&self) -> (ReportChannels, ReportReceivers) {
        report_channels(self.config.scheduler.report_channel_capacity)
    }
}

/// Outcome of one action against one account
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub action_timing_uuid: String,
    /// `None` for accountless runs
    pub account_id: Option<String>,
    pub action_id: String,
    pub action_type: String,
    pub error: Option<String>,
}

/// Sending side of the report channels.
///
/// Sends wait for buffer space, so a consumer that stops reading
/// eventually stalls execution instead of piling up pending reports.
#[derive(Clone)]
pub struct ReportChannels {
    success: mpsc::Sender<ActionReport>,
    failed: mpsc::Sender<ActionReport>,
}

pub struct ReportReceivers {
    pub success: mpsc::Receiver<ActionReport>,
    pub failed: mpsc::Receiver<ActionReport>,
}

pub fn report_channels(capacity: usize) -> (ReportChannels, ReportReceivers) {
    let (success_tx, success_rx) = mpsc::channel(capacity.max(1));
    let (failed_tx, failed_rx) = mpsc::channel(capacity.max(1));
    (
        ReportChannels {
            success: success_tx,
            failed: failed_tx,
        },
        ReportReceivers {
            success: success_rx,
            failed: failed_rx,
        },
    )
}

impl ReportChannels {
    pub async fn success(&self, report: ActionReport) -> BillingResult<()> {
        self.success
            .send(report)
            .await
            .map_err(|_| BillingError::ChannelClosed)
    }

    pub async fn failed(&self, report: ActionReport) -> BillingResult<()> {
        self.failed
            .send(report)
            .await
            .map_err(|_| BillingError::ChannelClosed)
    }
}

impl ReportReceivers {
    /// Take everything already delivered, without waiting
    pub fn drain(&mut self) -> (Vec<ActionReport>, Vec<ActionReport>) {
        let mut success = Vec::new();
        while let Ok(r) = self.success.try_recv() {
            success.push(r);
        }
        let mut failed = Vec::new();
        while let Ok(r) = self.failed.try_recv() {
            failed.push(r);
        }
        (success, failed)
    }
}
