//! Action model
//!
//! An action is one step of a scheduled action list. The side effect it
//! performs is looked up by `action_type` in the action-function registry.

use super::balance_filter::BalanceFilter;
use serde::{Deserialize, Serialize};

// ==================== Action Types ====================

pub const META_TOPUP: &str = "*topup";
pub const META_TOPUP_RESET: &str = "*topup_reset";
pub const META_DEBIT: &str = "*debit";
pub const META_DEBIT_RESET: &str = "*debit_reset";
pub const META_RESET_ACCOUNT: &str = "*reset_account";
pub const META_REMOVE_ACCOUNT: &str = "*remove_account";
pub const META_REMOVE_BALANCE: &str = "*remove_balance";
pub const META_SET_BALANCE: &str = "*set_balance";
pub const META_ENABLE_ACCOUNT: &str = "*enable_account";
pub const META_DISABLE_ACCOUNT: &str = "*disable_account";
pub const META_LOG: &str = "*log";
pub const META_HTTP_POST: &str = "*http_post";

/// Action types that only make sense against an account
pub const ACCOUNT_ACTIONS: &[&str] = &[
    META_TOPUP,
    META_TOPUP_RESET,
    META_DEBIT,
    META_DEBIT_RESET,
    META_RESET_ACCOUNT,
    META_REMOVE_ACCOUNT,
    META_REMOVE_BALANCE,
    META_SET_BALANCE,
    META_ENABLE_ACCOUNT,
    META_DISABLE_ACCOUNT,
];

pub fn is_account_action(action_type: &str) -> bool {
    ACCOUNT_ACTIONS.contains(&action_type)
}

/// One step of an action list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Action {
    pub id: String,
    pub action_type: String,
    #[serde(default)]
    pub extra_parameters: String,
    /// Filter IDs evaluated against the account before running
    #[serde(default)]
    pub filters: Vec<String>,
    /// Raw expiration, parsed onto the balance filter at execution time
    #[serde(default)]
    pub expiration_string: String,
    #[serde(default)]
    pub weight: f64,
    pub balance: Option<BalanceFilter>,
}

impl Action {
    pub fn new(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            ..Default::default()
        }
    }
}

/// Sort actions by weight, highest first
pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(|a, b| b.weight.total_cmp(&a.weight));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_weight_desc() {
        let mut acts = vec![
            Action {
                weight: 10.0,
                ..Action::new("a", META_TOPUP)
            },
            Action {
                weight: 20.0,
                ..Action::new("b", META_LOG)
            },
            Action {
                weight: 10.0,
                ..Action::new("c", META_DEBIT)
            },
        ];
        sort_actions(&mut acts);
        let ids: Vec<_> = acts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_account_actions() {
        assert!(is_account_action(META_REMOVE_ACCOUNT));
        assert!(!is_account_action(META_LOG));
    }
}
