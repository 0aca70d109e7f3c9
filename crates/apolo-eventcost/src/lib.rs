//! ApoloBilling event cost ledger
//!
//! Compressed storage form of a rated event. Rating details are kept once
//! in deduplication tables and referenced by ID from the charges.

pub mod charging;
pub mod event_cost;
pub mod tables;

pub use charging::{
    BalanceCharge, ChargedTiming, ChargingIncrement, ChargingInterval, RatingMatchedFilters,
    RatingUnit, META_NONE, META_PAUSE,
};
pub use event_cost::EventCost;
pub use tables::{DedupTable, TableValue};
