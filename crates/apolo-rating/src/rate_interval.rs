//! Calendar-bounded pricing rules

use crate::rate_group::{RateGroups, RateParameters};
use crate::timing::RITiming;
use apolo_core::utils::{round, RoundingMethod};
use apolo_core::{BillingError, BillingResult};
use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// What happens when a call reaches `max_cost`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MaxCostStrategy {
    #[default]
    #[serde(rename = "")]
    None,
    /// Keep rating, but everything past the cap is free
    #[serde(rename = "*free")]
    Free,
    /// Cap the cost and ask the session layer to disconnect
    #[serde(rename = "*disconnect")]
    Disconnect,
}

impl fmt::Display for MaxCostStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxCostStrategy::None => write!(f, ""),
            MaxCostStrategy::Free => write!(f, "*free"),
            MaxCostStrategy::Disconnect => write!(f, "*disconnect"),
        }
    }
}

/// Pricing block of a rate interval
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RIRate {
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
    pub rates: RateGroups,
}

impl RIRate {
    pub fn new(rates: RateGroups) -> Self {
        Self {
            rates,
            rounding_method: RoundingMethod::Middle,
            rounding_decimals: 4,
            ..Default::default()
        }
    }
}

/// A calendar pattern paired with the prices that apply inside it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RateInterval {
    #[serde(default)]
    pub timing: RITiming,
    pub rating: RIRate,
    #[serde(default)]
    pub weight: f64,
}

fn is_midnight(t: DateTime<Utc>) -> bool {
    t.hour() == 0 && t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0
}

fn nanos(d: Duration) -> Decimal {
    Decimal::from(d.num_nanoseconds().unwrap_or(i64::MAX))
}

impl RateInterval {
    pub fn new(timing: RITiming, rating: RIRate, weight: f64) -> Self {
        Self {
            timing,
            rating,
            weight,
        }
    }

    /// Containment test used by the splitter.
    ///
    /// An end instant exactly on midnight belongs to the previous day, so it
    /// is moved back one second before matching.
    pub fn contains(&self, t: DateTime<Utc>, end_time: bool) -> bool {
        let t = if end_time && is_midnight(t) {
            t - Duration::seconds(1)
        } else {
            t
        };
        self.timing.contains(t)
    }

    pub fn get_rate_parameters(&self, start_offset: Duration) -> BillingResult<RateParameters> {
        self.rating.rates.rate_parameters_at(start_offset)
    }

    /// Price `duration` of usage starting `start_offset` into the call.
    ///
    /// Every tier crossed by the window is charged for the time spent in it.
    /// The sum is rounded with the interval's own rounding.
    pub fn get_cost(&self, duration: Duration, start_offset: Duration) -> BillingResult<Decimal> {
        // fail early when the first offset is not priced at all
        self.get_rate_parameters(start_offset)?;

        let rates = self.rating.rates.sorted();
        let end = start_offset + duration;
        let mut cursor = start_offset;
        let mut cost = Decimal::ZERO;
        while cursor < end {
            let params = self.get_rate_parameters(cursor)?;
            let boundary = rates
                .iter()
                .map(|r| r.group_interval_start)
                .find(|s| *s > cursor)
                .map_or(end, |s| s.min(end));
            let unit = nanos(params.unit);
            if unit.is_zero() {
                return Err(BillingError::UncomputablePricing {
                    offset_secs: cursor.num_seconds(),
                });
            }
            cost += params.price * nanos(boundary - cursor) / unit;
            cursor = boundary;
        }
        Ok(round(
            cost,
            self.rating.rounding_decimals,
            self.rating.rounding_method,
        ))
    }

    pub fn connect_fee(&self) -> Decimal {
        self.rating.connect_fee
    }

    /// Ordering for candidate lists: heavier first
    pub fn cmp_weight_desc(a: &RateInterval, b: &RateInterval) -> Ordering {
        b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal)
    }
}

/// Stable sort of candidate intervals by descending weight
pub fn sort_by_weight(intervals: &mut [RateInterval]) {
    intervals.sort_by(RateInterval::cmp_weight_desc);
}
