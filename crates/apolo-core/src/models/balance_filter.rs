//! Balance filter carried by actions
//!
//! Every field is optional so an action can tell "not given" apart from a
//! zero value. The `get_*` accessors resolve unset fields to their defaults.

use super::account::{Balance, BalanceType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BalanceFilter {
    pub uuid: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub balance_type: Option<BalanceType>,
    pub value: Option<Decimal>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub weight: Option<f64>,
    pub destination_ids: Option<BTreeSet<String>>,
    pub rating_subject: Option<String>,
    pub categories: Option<BTreeSet<String>>,
    pub timing_ids: Option<BTreeSet<String>>,
    pub disabled: Option<bool>,
    pub blocker: Option<bool>,
}

impl BalanceFilter {
    pub fn get_uuid(&self) -> String {
        self.uuid.clone().unwrap_or_default()
    }

    pub fn get_id(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    pub fn get_type(&self) -> BalanceType {
        self.balance_type.unwrap_or_default()
    }

    pub fn get_value(&self) -> Decimal {
        self.value.unwrap_or(Decimal::ZERO)
    }

    pub fn get_weight(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    pub fn get_rating_subject(&self) -> String {
        self.rating_subject.clone().unwrap_or_default()
    }

    pub fn get_destination_ids(&self) -> BTreeSet<String> {
        self.destination_ids.clone().unwrap_or_default()
    }

    pub fn get_categories(&self) -> BTreeSet<String> {
        self.categories.clone().unwrap_or_default()
    }

    pub fn get_timing_ids(&self) -> BTreeSet<String> {
        self.timing_ids.clone().unwrap_or_default()
    }

    pub fn get_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    pub fn get_blocker(&self) -> bool {
        self.blocker.unwrap_or(false)
    }

    /// `None` is the unlimited expiration
    pub fn get_expiration_date(&self) -> Option<DateTime<Utc>> {
        self.expiration_date
    }

    pub fn empty_expiration_date(&self) -> bool {
        self.expiration_date.is_none()
    }

    /// Build a new balance out of the filter values
    pub fn create_balance(&self) -> Balance {
        Balance {
            uuid: self.get_uuid(),
            id: self.get_id(),
            value: self.get_value(),
            expiration_date: self.get_expiration_date(),
            weight: self.get_weight(),
            disabled: self.get_disabled(),
        }
    }

    /// Check whether a balance satisfies every field that is set
    pub fn matches(&self, balance: &Balance) -> bool {
        self.uuid.as_ref().map_or(true, |u| *u == balance.uuid)
            && self.id.as_ref().map_or(true, |i| *i == balance.id)
            && self
                .expiration_date
                .map_or(true, |e| balance.expiration_date == Some(e))
            && self.weight.map_or(true, |w| w == balance.weight)
            && self.disabled.map_or(true, |d| d == balance.disabled)
    }
}
