//! Cache key constants and builders
//!
//! # Key Patterns
//!
//! - `act:{actions_id}` - Resolved action lists
//! - `apl:{action_plan_id}` - Action plans
//! - `acc:{account_id}` - Account snapshots
//!
//! # Example
//!
//! ```
//! use apolo_cache::keys;
//!
//! assert_eq!(keys::actions_key("TOPUP_10"), "act:TOPUP_10");
//! ```

/// Prefix for resolved action lists
///
/// Format: `act:{actions_id}`
pub const ACTIONS_PREFIX: &str = "act:";

/// Prefix for action plans
///
/// Format: `apl:{action_plan_id}`
pub const ACTION_PLAN_PREFIX: &str = "apl:";

/// Prefix for account snapshots
pub const ACCOUNT_PREFIX: &str = "acc:";

pub fn actions_key(actions_id: &str) -> String {
    format!("{}{}", ACTIONS_PREFIX, actions_id)
}

pub fn action_plan_key(action_plan_id: &str) -> String {
    format!("{}{}", ACTION_PLAN_PREFIX, action_plan_id)
}

/// Build the key used both for caching and for the per-account guard
pub fn account_key(account_id: &str) -> String {
    format!("{}{}", ACCOUNT_PREFIX, account_id)
}
