//! Account model
//!
//! Accounts hold typed balances. The rating core reads them through
//! [`AccountSummary`] snapshots and the scheduler mutates them through
//! registered action functions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Balance type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BalanceType {
    #[default]
    #[serde(rename = "*monetary")]
    Monetary,
    #[serde(rename = "*voice")]
    Voice,
    #[serde(rename = "*data")]
    Data,
    #[serde(rename = "*sms")]
    Sms,
    #[serde(rename = "*generic")]
    Generic,
}

impl fmt::Display for BalanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceType::Monetary => write!(f, "*monetary"),
            BalanceType::Voice => write!(f, "*voice"),
            BalanceType::Data => write!(f, "*data"),
            BalanceType::Sms => write!(f, "*sms"),
            BalanceType::Generic => write!(f, "*generic"),
        }
    }
}

impl BalanceType {
    /// Parse from the `*type` tag
    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "*monetary" => Some(BalanceType::Monetary),
            "*voice" => Some(BalanceType::Voice),
            "*data" => Some(BalanceType::Data),
            "*sms" => Some(BalanceType::Sms),
            "*generic" => Some(BalanceType::Generic),
            _ => None,
        }
    }

    /// Unit balances are consumed in usage rather than money
    pub fn is_unit(&self) -> bool {
        !matches!(self, BalanceType::Monetary)
    }
}

/// A single balance inside an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Balance {
    pub uuid: String,
    pub id: String,
    pub value: Decimal,
    /// `None` means the balance never expires
    pub expiration_date: Option<DateTime<Utc>>,
    pub weight: f64,
    #[serde(default)]
    pub disabled: bool,
}

impl Balance {
    /// Check whether the balance has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiration_date, Some(exp) if exp <= now)
    }
}

/// Account entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Account {
    /// Tenant-qualified identifier, e.g. `cgrates.org:1001`
    pub id: String,

    /// Balances grouped by type
    #[serde(default)]
    pub balance_map: HashMap<BalanceType, Vec<Balance>>,

    #[serde(default)]
    pub allow_negative: bool,

    #[serde(default)]
    pub disabled: bool,

    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create an empty account, used when an action targets an unknown ID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sum of the non-expired, enabled balances of one type
    pub fn balance_value(&self, balance_type: BalanceType, now: DateTime<Utc>) -> Decimal {
        self.balance_map
            .get(&balance_type)
            .map(|bs| {
                bs.iter()
                    .filter(|b| !b.disabled && !b.is_expired_at(now))
                    .map(|b| b.value)
                    .sum()
            })
            .unwrap_or_default()
    }

    /// Snapshot the balances for attaching to a cost
    pub fn as_account_summary(&self) -> AccountSummary {
        let mut balance_summaries = Vec::new();
        for (balance_type, balances) in &self.balance_map {
            for b in balances {
                balance_summaries.push(BalanceSummary {
                    uuid: b.uuid.clone(),
                    id: b.id.clone(),
                    balance_type: *balance_type,
                    initial: b.value,
                    value: b.value,
                    disabled: b.disabled,
                });
            }
        }
        balance_summaries.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        let (tenant, id) = match self.id.split_once(':') {
            Some((t, i)) => (t.to_string(), i.to_string()),
            None => (String::new(), self.id.clone()),
        };
        AccountSummary {
            tenant,
            id,
            balance_summaries,
            allow_negative: self.allow_negative,
            disabled: self.disabled,
        }
    }
}

/// Balance snapshot inside an [`AccountSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BalanceSummary {
    pub uuid: String,
    pub id: String,
    #[serde(rename = "type")]
    pub balance_type: BalanceType,
    pub initial: Decimal,
    pub value: Decimal,
    #[serde(default)]
    pub disabled: bool,
}

/// Account snapshot taken at the end of a cost calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AccountSummary {
    pub tenant: String,
    pub id: String,
    pub balance_summaries: Vec<BalanceSummary>,
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl AccountSummary {
    /// Find the balance snapshot with the given UUID
    pub fn balance_summary_with_uuid(&self, uuid: &str) -> Option<&BalanceSummary> {
        self.balance_summaries.iter().find(|b| b.uuid == uuid)
    }

    /// Carry the initial values from a previous snapshot.
    ///
    /// Balances present in `previous` but missing here have expired during
    /// the event; they are appended back with a zero value.
    pub fn update_initial_value(&mut self, previous: &AccountSummary) {
        for old in &previous.balance_summaries {
            match self.balance_summaries.iter_mut().find(|b| b.uuid == old.uuid) {
                Some(current) => current.initial = old.initial,
                None => {
                    let mut expired = old.clone();
                    expired.value = Decimal::ZERO;
                    self.balance_summaries.push(expired);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn summary(bs: &[(&str, Decimal, Decimal)]) -> AccountSummary {
        AccountSummary {
            tenant: "cgrates.org".into(),
            id: "1001".into(),
            balance_summaries: bs
                .iter()
                .map(|(uuid, initial, value)| BalanceSummary {
                    uuid: uuid.to_string(),
                    initial: *initial,
                    value: *value,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_initial_value() {
        let previous = summary(&[("b1", dec!(10), dec!(8)), ("b2", dec!(5), dec!(5))]);
        let mut current = summary(&[("b1", dec!(8), dec!(6))]);
        current.update_initial_value(&previous);

        assert_eq!(current.balance_summaries.len(), 2);
        assert_eq!(current.balance_summaries[0].initial, dec!(10));
        assert_eq!(current.balance_summaries[0].value, dec!(6));
        let expired = current.balance_summary_with_uuid("b2").unwrap();
        assert_eq!(expired.initial, dec!(5));
        assert_eq!(expired.value, Decimal::ZERO);
    }

    #[test]
    fn test_balance_value_skips_expired() {
        let now = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        let mut acc = Account::new("cgrates.org:1001");
        acc.balance_map.insert(
            BalanceType::Monetary,
            vec![
                Balance {
                    uuid: "a".into(),
                    value: dec!(10),
                    ..Default::default()
                },
                Balance {
                    uuid: "b".into(),
                    value: dec!(3),
                    expiration_date: Some(now - chrono::Duration::days(1)),
                    ..Default::default()
                },
            ],
        );
        assert_eq!(acc.balance_value(BalanceType::Monetary, now), dec!(10));
        let summary = acc.as_account_summary();
        assert_eq!(summary.tenant, "cgrates.org");
        assert_eq!(summary.balance_summaries.len(), 2);
    }
}
