//! Charging intervals and the values kept in the dedup tables

use crate::tables::TableValue;
use apolo_core::utils::{duration_nanos, scale, RoundingMethod, Rounding};
use apolo_rating::{MaxCostStrategy, RITiming, RateGroups};
use chrono::{DateTime, Duration, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marker for paused (free) usage
pub const META_PAUSE: &str = "*pause";
/// Marker for "no extra charge"
pub const META_NONE: &str = "*none";

fn one() -> u32 {
    1
}

/// Rating plan metadata matched for a charge
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RatingMatchedFilters {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub destination_prefix_name: String,
    #[serde(default)]
    pub destination_id: String,
    #[serde(default)]
    pub rating_plan_id: String,
}

impl TableValue for RatingMatchedFilters {
    fn table_equal(&self, other: &Self) -> bool {
        self == other
    }

    fn is_empty_value(&self) -> bool {
        self == &RatingMatchedFilters::default()
    }
}

/// Calendar part of a charged rate interval
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargedTiming {
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub months: Vec<u32>,
    #[serde(default)]
    pub month_days: Vec<i32>,
    #[serde(default)]
    pub week_days: Vec<Weekday>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
}

impl From<&RITiming> for ChargedTiming {
    fn from(t: &RITiming) -> Self {
        Self {
            years: t.years.clone(),
            months: t.months.clone(),
            month_days: t.month_days.clone(),
            week_days: t.week_days.clone(),
            start_time: t.start_time.clone(),
            end_time: t.end_time.clone(),
        }
    }
}

impl ChargedTiming {
    pub fn to_timing(&self) -> RITiming {
        RITiming {
            id: String::new(),
            years: self.years.clone(),
            months: self.months.clone(),
            month_days: self.month_days.clone(),
            week_days: self.week_days.clone(),
            start_time: self.start_time.clone(),
            end_time: self.end_time.clone(),
        }
    }
}

impl TableValue for ChargedTiming {
    fn table_equal(&self, other: &Self) -> bool {
        self == other
    }
}

impl TableValue for RateGroups {
    fn table_equal(&self, other: &Self) -> bool {
        self == other
    }

    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

/// Pricing parameters of a rate interval, with its parts referenced by ID
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingUnit {
    #[serde(default)]
    pub connect_fee: Decimal,
    #[serde(default)]
    pub rounding_method: RoundingMethod,
    #[serde(default)]
    pub rounding_decimals: u32,
    #[serde(default)]
    pub max_cost: Decimal,
    #[serde(default)]
    pub max_cost_strategy: MaxCostStrategy,
    #[serde(default)]
    pub timing_id: String,
    #[serde(default)]
    pub rates_id: String,
    #[serde(default)]
    pub rating_filters_id: String,
}

impl TableValue for RatingUnit {
    fn table_equal(&self, other: &Self) -> bool {
        self == other
    }
}

/// Units taken from one balance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BalanceCharge {
    pub account_id: String,
    pub balance_uuid: String,
    #[serde(default)]
    pub rating_id: String,
    pub units: Decimal,
    /// Monetary charge accompanying a unit charge, or `*none`
    #[serde(default)]
    pub extra_charge_id: String,
}

impl BalanceCharge {
    /// Extra charge ID with the empty value read as `*none`
    pub fn extra_charge(&self) -> &str {
        if self.extra_charge_id.is_empty() {
            META_NONE
        } else {
            &self.extra_charge_id
        }
    }

    pub fn has_extra_charge(&self) -> bool {
        self.extra_charge() != META_NONE
    }
}

impl TableValue for BalanceCharge {
    fn table_equal(&self, other: &Self) -> bool {
        self.account_id == other.account_id
            && self.balance_uuid == other.balance_uuid
            && self.rating_id == other.rating_id
            && self.units == other.units
            && self.extra_charge() == other.extra_charge()
    }
}

/// Leaf cost unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingIncrement {
    #[serde(with = "duration_nanos")]
    pub usage: Duration,
    pub cost: Decimal,
    #[serde(default)]
    pub accounting_id: String,
    #[serde(default = "one")]
    pub compress_factor: u32,
}

impl ChargingIncrement {
    pub fn get_compress_factor(&self) -> u32 {
        self.compress_factor.max(1)
    }

    pub fn total_usage(&self) -> Duration {
        scale(self.usage, self.get_compress_factor())
    }

    pub fn total_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.get_compress_factor())
    }
}

/// Run of increments charged under one rating unit.
///
/// Usage, cost and the usage index inside the event are cached until
/// [`ChargingInterval::reset_counters`]; equality ignores the caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingInterval {
    #[serde(default)]
    pub rating_id: String,
    #[serde(default)]
    pub increments: Vec<ChargingIncrement>,
    #[serde(default = "one")]
    pub compress_factor: u32,
    #[serde(skip)]
    usage: Option<Duration>,
    #[serde(skip)]
    pub(crate) ec_usage_idx: Option<Duration>,
    #[serde(skip)]
    cost: Option<Decimal>,
}

impl PartialEq for ChargingInterval {
    fn eq(&self, other: &Self) -> bool {
        self.rating_id == other.rating_id
            && self.increments == other.increments
            && self.compress_factor == other.compress_factor
    }
}

impl ChargingInterval {
    pub fn new(rating_id: impl Into<String>, increments: Vec<ChargingIncrement>, compress_factor: u32) -> Self {
        Self {
            rating_id: rating_id.into(),
            increments,
            compress_factor,
            usage: None,
            ec_usage_idx: None,
            cost: None,
        }
    }

    pub fn get_compress_factor(&self) -> u32 {
        self.compress_factor.max(1)
    }

    /// Same rating and equal increments, compress factor aside
    pub fn partially_equals(&self, other: &ChargingInterval) -> bool {
        self.rating_id == other.rating_id && self.increments == other.increments
    }

    /// Usage of one repetition
    pub fn usage(&mut self) -> Duration {
        if let Some(u) = self.usage {
            return u;
        }
        let u = self
            .increments
            .iter()
            .fold(Duration::zero(), |acc, i| acc + i.total_usage());
        self.usage = Some(u);
        u
    }

    pub fn total_usage(&mut self) -> Duration {
        scale(self.usage(), self.get_compress_factor())
    }

    /// Cost of one repetition, rounded
    pub fn cost(&mut self, rounding: Rounding) -> Decimal {
        if let Some(c) = self.cost {
            return c;
        }
        let c = rounding.round(self.increments.iter().map(ChargingIncrement::total_cost).sum());
        self.cost = Some(c);
        c
    }

    pub fn total_cost(&mut self, rounding: Rounding) -> Decimal {
        rounding.round(self.cost(rounding) * Decimal::from(self.get_compress_factor()))
    }

    /// Usage elapsed in the event before this interval, once computed
    pub fn usage_index(&self) -> Option<Duration> {
        self.ec_usage_idx
    }

    pub fn start_time(&self, ec_start: DateTime<Utc>) -> DateTime<Utc> {
        ec_start + self.ec_usage_idx.unwrap_or_else(Duration::zero)
    }

    pub fn end_time(&mut self, start: DateTime<Utc>) -> DateTime<Utc> {
        start + self.total_usage()
    }

    pub fn reset_counters(&mut self) {
        self.usage = None;
        self.cost = None;
        self.ec_usage_idx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn incr(secs: i64, cost: Decimal, acc: &str, cf: u32) -> ChargingIncrement {
        ChargingIncrement {
            usage: Duration::seconds(secs),
            cost,
            accounting_id: acc.into(),
            compress_factor: cf,
        }
    }

    #[test]
    fn test_interval_usage_and_cost() {
        let mut cil = ChargingInterval::new(
            "R1",
            vec![incr(0, dec!(0.4), "", 1), incr(1, dec!(0.01), "A1", 60)],
            3,
        );
        assert_eq!(cil.usage(), Duration::seconds(60));
        assert_eq!(cil.total_usage(), Duration::seconds(180));
        assert_eq!(cil.cost(Rounding::default()), dec!(1.0));
        assert_eq!(cil.total_cost(Rounding::default()), dec!(3.0));

        let start = chrono::TimeZone::with_ymd_and_hms(&Utc, 2017, 1, 9, 16, 18, 21).unwrap();
        assert_eq!(cil.start_time(start), start);
        cil.ec_usage_idx = Some(Duration::seconds(30));
        assert_eq!(cil.start_time(start), start + Duration::seconds(30));
        assert_eq!(cil.end_time(start), start + Duration::seconds(180));
    }

    #[test]
    fn test_compress_factor_beyond_i32() {
        let runs = 3_000_000_000u32;
        let mut cil = ChargingInterval::new("R1", vec![incr(1, dec!(0), "A1", runs)], 2);
        assert_eq!(cil.usage(), Duration::seconds(3_000_000_000));
        assert_eq!(cil.total_usage(), Duration::seconds(6_000_000_000));
    }

    #[test]
    fn test_partially_equals_ignores_compress_factor_and_caches() {
        let mut a = ChargingInterval::new("R1", vec![incr(1, dec!(0.01), "A1", 10)], 1);
        let b = ChargingInterval::new("R1", vec![incr(1, dec!(0.01), "A1", 10)], 4);
        a.usage();
        assert!(a.partially_equals(&b));
        assert_ne!(a, b);
        let c = ChargingInterval::new("R1", vec![incr(1, dec!(0.01), "A1", 9)], 4);
        assert!(!a.partially_equals(&c));
    }

    #[test]
    fn test_balance_charge_none_equivalence() {
        let a = BalanceCharge {
            account_id: "cgrates.org:1001".into(),
            balance_uuid: "b1".into(),
            units: dec!(1),
            ..Default::default()
        };
        let mut b = a.clone();
        b.extra_charge_id = META_NONE.into();
        assert!(a.table_equal(&b));
        assert!(!a.has_extra_charge());
        b.extra_charge_id = "X".into();
        assert!(!a.table_equal(&b));
        assert!(b.has_extra_charge());
    }

    #[test]
    fn test_timing_conversion() {
        let t = RITiming {
            id: "T1".into(),
            week_days: vec![Weekday::Mon],
            start_time: "08:00:00".into(),
            ..Default::default()
        };
        let ct = ChargedTiming::from(&t);
        let back = ct.to_timing();
        assert_eq!(back.week_days, t.week_days);
        assert_eq!(back.start_time, t.start_time);
        assert!(back.id.is_empty());
    }
}
