//! Flat, timespan based cost of a rated call

use crate::rate_interval::MaxCostStrategy;
use crate::timespan::TimeSpans;
use apolo_core::models::AccountSummary;
use apolo_core::utils::{duration_nanos, RoundingMethod};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Type of record for usage measured in time
pub const META_VOICE: &str = "*voice";
pub const META_DATA: &str = "*data";

/// Cost of a call as a list of rated timespans.
///
/// This is the expanded view. The compressed ledger used for storage is
/// the event cost built from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallCost {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub tor: String,
    pub cost: Decimal,
    pub timespans: TimeSpans,
    #[serde(with = "duration_nanos", default)]
    pub rated_usage: Duration,
    #[serde(default)]
    pub account_summary: Option<AccountSummary>,
    #[serde(default)]
    pub deduct_connect_fee: bool,
}

impl CallCost {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.first().map(|ts| ts.time_start)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.last().map(|ts| ts.time_end)
    }

    /// Wall clock length covered by the timespans
    pub fn get_duration(&self) -> Duration {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    pub fn get_connect_fee(&self) -> Decimal {
        self.timespans
            .first()
            .and_then(|ts| ts.rate_interval.as_ref())
            .map_or(Decimal::ZERO, |ri| ri.rating.connect_fee)
    }

    /// Finest rounding used by any of the spans
    pub fn get_longest_rounding(&self) -> (u32, RoundingMethod) {
        let mut longest = (0, RoundingMethod::None);
        for ri in self.timespans.iter().filter_map(|ts| ts.rate_interval.as_ref()) {
            if ri.rating.rounding_decimals > longest.0 || longest.1 == RoundingMethod::None {
                longest = (ri.rating.rounding_decimals, ri.rating.rounding_method);
            }
        }
        longest
    }

    /// Recompute `rated_usage` from the spans
    pub fn update_rated_usage(&mut self) -> Duration {
        self.rated_usage = self.timespans.total_duration();
        self.rated_usage
    }

    /// Recompute `cost` as the sum of span costs
    pub fn update_cost(&mut self) -> Decimal {
        self.cost = self.timespans.total_cost();
        self.cost
    }

    /// Strategy to apply when the cost reached a configured cap
    pub fn max_cost_reached(&self) -> Option<MaxCostStrategy> {
        let ri = self
            .timespans
            .iter()
            .filter_map(|ts| ts.rate_interval.as_ref())
            .find(|ri| ri.rating.max_cost > Decimal::ZERO)?;
        (self.cost >= ri.rating.max_cost && ri.rating.max_cost_strategy != MaxCostStrategy::None)
            .then_some(ri.rating.max_cost_strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_group::RateGroups;
    use crate::rate_interval::{RIRate, RateInterval};
    use crate::timespan::TimeSpan;
    use crate::timing::RITiming;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn span_with(start_min: i64, len_min: i64, rating: RIRate, cost: Decimal) -> TimeSpan {
        let base = Utc.with_ymd_and_hms(2012, 2, 3, 10, 0, 0).unwrap();
        let mut ts = TimeSpan::new(
            base + Duration::minutes(start_min),
            base + Duration::minutes(start_min + len_min),
        );
        ts.rate_interval = Some(RateInterval::new(RITiming::default(), rating, 0.0));
        ts.cost = cost;
        ts
    }

    #[test]
    fn test_summary_helpers() {
        let mut first = RIRate::new(RateGroups::default());
        first.connect_fee = dec!(0.4);
        first.rounding_decimals = 2;
        let mut second = RIRate::new(RateGroups::default());
        second.rounding_decimals = 6;
        second.rounding_method = RoundingMethod::Up;

        let mut cc = CallCost {
            timespans: TimeSpans(vec![
                span_with(0, 2, first, dec!(1.5)),
                span_with(2, 3, second, dec!(2.25)),
            ]),
            ..Default::default()
        };
        assert_eq!(cc.get_duration(), Duration::minutes(5));
        assert_eq!(cc.get_connect_fee(), dec!(0.4));
        assert_eq!(cc.get_longest_rounding(), (6, RoundingMethod::Up));
        assert_eq!(cc.update_cost(), dec!(3.75));
        assert_eq!(cc.update_rated_usage(), Duration::minutes(5));
    }

    #[test]
    fn test_max_cost_reached() {
        let mut rating = RIRate::new(RateGroups::default());
        rating.max_cost = dec!(2);
        rating.max_cost_strategy = MaxCostStrategy::Disconnect;
        let mut cc = CallCost {
            timespans: TimeSpans(vec![span_with(0, 1, rating, dec!(1))]),
            ..Default::default()
        };
        cc.update_cost();
        assert_eq!(cc.max_cost_reached(), None);
        cc.cost = dec!(2.5);
        assert_eq!(cc.max_cost_reached(), Some(MaxCostStrategy::Disconnect));
    }

    #[test]
    fn test_empty_call_cost() {
        let cc = CallCost::default();
        assert_eq!(cc.get_duration(), Duration::zero());
        assert_eq!(cc.get_connect_fee(), Decimal::ZERO);
        assert_eq!(cc.get_longest_rounding(), (0, RoundingMethod::None));
    }
}
