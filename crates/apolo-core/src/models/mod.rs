//! Domain models shared by the rating and scheduling crates

pub mod account;
pub mod action;
pub mod balance_filter;

pub use account::{Account, AccountSummary, Balance, BalanceSummary, BalanceType};
pub use action::{Action, ACCOUNT_ACTIONS};
pub use balance_filter::BalanceFilter;
