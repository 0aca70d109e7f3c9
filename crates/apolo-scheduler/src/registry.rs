//! Action-function registry
//!
//! Maps an action type tag to the code that performs it. The host fills it
//! at startup; execution only reads it.

use apolo_core::models::{Account, Action};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Side effect of one action type
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform `action`.
    ///
    /// `account` is `None` for accountless runs. `actions` is the whole
    /// sorted list the action belongs to and `extra_data` the timing's
    /// free-form payload.
    async fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        actions: &[Action],
        extra_data: &Value,
    ) -> anyhow::Result<()>;
}

/// Adapter for synchronous closures
struct FnHandler<F>(F);

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(Option<&mut Account>, &Action, &[Action], &Value) -> anyhow::Result<()> + Send + Sync,
{
    async fn execute(
        &self,
        account: Option<&mut Account>,
        action: &Action,
        actions: &[Action],
        extra_data: &Value,
    ) -> anyhow::Result<()> {
        (self.0)(account, action, actions, extra_data)
    }
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `action_type`, replacing any previous one
    pub fn register(&mut self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type.into(), handler);
    }

    /// Register a synchronous closure
    pub fn register_fn<F>(&mut self, action_type: impl Into<String>, f: F)
    where
        F: Fn(Option<&mut Account>, &Action, &[Action], &Value) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(action_type, Arc::new(FnHandler(f)));
    }

    pub fn get(&self, action_type: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(action_type)
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
