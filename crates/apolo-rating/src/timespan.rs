//! Time spans, increments and the rate interval splitter
//!
//! A call is rated as a sequence of contiguous [`TimeSpan`]s. The splitter
//! cuts spans wherever a rate interval's daily window or a price tier
//! boundary falls inside them, so that every span ends up governed by a
//! single interval. Splitting never gains or loses time: the receiver keeps
//! the earlier portion and the returned remainder covers the rest.

use crate::rate_interval::RateInterval;
use crate::rating_info::RatingInfo;
use apolo_core::utils::{duration_nanos, round_duration, scale, unit_of, Rounding};
use apolo_core::BillingResult;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use tracing::trace;

fn one() -> u32 {
    1
}

fn seconds(d: Duration) -> Decimal {
    Decimal::from(d.num_nanoseconds().unwrap_or(i64::MAX)) / Decimal::from(1_000_000_000i64)
}

/// Units consumed from a non-monetary balance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value after this increment
    pub value: Decimal,
    pub destination_id: String,
    pub consumed: Decimal,
    pub tor: String,
    pub rate_interval: Option<RateInterval>,
}

impl UnitInfo {
    /// Structural equality ignoring the running balance value
    pub fn equal(&self, other: &UnitInfo) -> bool {
        self.uuid == other.uuid
            && self.destination_id == other.destination_id
            && self.consumed == other.consumed
            && self.tor == other.tor
            && self.rate_interval == other.rate_interval
    }
}

/// Money taken from a monetary balance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonetaryInfo {
    pub uuid: String,
    pub id: String,
    /// Balance value after this increment
    pub value: Decimal,
    pub rate_interval: Option<RateInterval>,
}

impl MonetaryInfo {
    pub fn equal(&self, other: &MonetaryInfo) -> bool {
        self.uuid == other.uuid && self.rate_interval == other.rate_interval
    }
}

/// Which balances paid for an increment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebitInfo {
    pub unit: Option<UnitInfo>,
    pub monetary: Option<MonetaryInfo>,
    pub account_id: String,
}

fn opt_equal<T>(a: &Option<T>, b: &Option<T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => eq(x, y),
        _ => false,
    }
}

impl DebitInfo {
    pub fn equal(&self, other: &DebitInfo) -> bool {
        opt_equal(&self.unit, &other.unit, UnitInfo::equal)
            && opt_equal(&self.monetary, &other.monetary, MonetaryInfo::equal)
            && self.account_id == other.account_id
    }
}

/// Smallest billable slice of a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Increment {
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    pub cost: Decimal,
    #[serde(default)]
    pub balance_info: Option<DebitInfo>,
    #[serde(default = "one")]
    pub compress_factor: u32,
}

impl Default for Increment {
    fn default() -> Self {
        Self {
            duration: Duration::zero(),
            cost: Decimal::ZERO,
            balance_info: None,
            compress_factor: 1,
        }
    }
}

impl Increment {
    pub fn new(duration: Duration, cost: Decimal) -> Self {
        Self {
            duration,
            cost,
            ..Default::default()
        }
    }

    pub fn get_compress_factor(&self) -> u32 {
        self.compress_factor.max(1)
    }

    /// Cost of the whole run
    pub fn total_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.get_compress_factor())
    }

    /// Compression key: same duration, same cost, same balances
    pub fn equal(&self, other: &Increment) -> bool {
        self.duration == other.duration
            && self.cost == other.cost
            && opt_equal(&self.balance_info, &other.balance_info, DebitInfo::equal)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Increments(pub Vec<Increment>);

impl Deref for Increments {
    type Target = Vec<Increment>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Increments {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Increments {
    pub fn equal(&self, other: &Increments) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.equal(b))
    }

    /// Sum of increment costs at the global precision
    pub fn total_cost(&self, rounding: Rounding) -> Decimal {
        rounding.round(self.iter().map(Increment::total_cost).sum())
    }

    pub fn total_duration(&self) -> Duration {
        self.iter().fold(Duration::zero(), |acc, i| {
            acc + scale(i.duration, i.get_compress_factor())
        })
    }

    /// Run-length encode equal neighbours.
    ///
    /// The surviving increment carries the balance values of the last one
    /// it absorbed.
    pub fn compress(&mut self) {
        let mut out: Vec<Increment> = Vec::with_capacity(self.len());
        for mut incr in self.0.drain(..) {
            match out.last_mut() {
                Some(last) if last.equal(&incr) => {
                    last.compress_factor = last.get_compress_factor() + incr.get_compress_factor();
                    if let (Some(lb), Some(ib)) = (last.balance_info.as_mut(), incr.balance_info.as_ref()) {
                        if let (Some(lm), Some(im)) = (lb.monetary.as_mut(), ib.monetary.as_ref()) {
                            lm.value = im.value;
                        }
                        if let (Some(lu), Some(iu)) = (lb.unit.as_mut(), ib.unit.as_ref()) {
                            lu.value = iu.value;
                        }
                    }
                }
                _ => {
                    incr.compress_factor = incr.get_compress_factor();
                    out.push(incr);
                }
            }
        }
        self.0 = out;
    }

    /// Expand runs back into single increments, rebuilding the running
    /// balance values of the earlier ones
    pub fn decompress(&mut self) {
        let mut out = Vec::new();
        for c_incr in self.0.drain(..) {
            let cf = c_incr.get_compress_factor();
            for i in 0..cf {
                let mut incr = c_incr.clone();
                let remaining = Decimal::from(cf - (i + 1));
                if let Some(bi) = incr.balance_info.as_mut() {
                    if let Some(m) = bi.monetary.as_mut() {
                        m.value += incr.cost * remaining;
                    }
                    if let Some(u) = bi.unit.as_mut() {
                        u.value += seconds(incr.duration) * remaining;
                    }
                }
                incr.compress_factor = 1;
                out.push(incr);
            }
        }
        self.0 = out;
    }
}

/// A contiguous slice of a call, eventually governed by one rate interval
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    #[serde(default)]
    pub cost: Decimal,
    #[serde(default)]
    pub rate_interval: Option<RateInterval>,
    /// Elapsed call duration at the end of this span
    #[serde(with = "duration_nanos")]
    pub duration_index: Duration,
    #[serde(default)]
    pub increments: Increments,
    #[serde(default)]
    pub matched_subject: String,
    #[serde(default)]
    pub matched_prefix: String,
    #[serde(default)]
    pub matched_dest_id: String,
    #[serde(default)]
    pub rating_plan_id: String,
    #[serde(default = "one")]
    pub compress_factor: u32,
    /// Index of the rating info in the call descriptor, splitting only
    #[serde(skip)]
    pub(crate) rating_info_idx: Option<usize>,
}

impl TimeSpan {
    pub fn new(time_start: DateTime<Utc>, time_end: DateTime<Utc>) -> Self {
        Self {
            time_start,
            time_end,
            duration_index: time_end - time_start,
            compress_factor: 1,
            ..Default::default()
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    pub fn get_compress_factor(&self) -> u32 {
        self.compress_factor.max(1)
    }

    pub fn unit_duration(&self) -> Duration {
        unit_of(self.duration(), self.get_compress_factor())
    }

    pub fn unit_cost(&self) -> Decimal {
        self.cost / Decimal::from(self.get_compress_factor())
    }

    /// Strictly inside the span
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t > self.time_start && t < self.time_end
    }

    /// Elapsed call duration at the start of this span
    pub fn group_start(&self) -> Duration {
        (self.duration_index - self.duration()).max(Duration::zero())
    }

    pub fn group_end(&self) -> Duration {
        self.duration_index
    }

    /// Copy the matched rating information onto the span
    pub fn set_rating_info(&mut self, info: &RatingInfo, idx: usize) {
        self.matched_subject = info.matched_subject.clone();
        self.matched_prefix = info.matched_prefix.clone();
        self.matched_dest_id = info.matched_dest_id.clone();
        self.rating_plan_id = info.rating_plan_id.clone();
        self.rating_info_idx = Some(idx);
    }

    fn copy_rating_info(&mut self, from: &TimeSpan) {
        self.matched_subject = from.matched_subject.clone();
        self.matched_prefix = from.matched_prefix.clone();
        self.matched_dest_id = from.matched_dest_id.clone();
        self.rating_plan_id = from.rating_plan_id.clone();
        self.rating_info_idx = from.rating_info_idx;
    }

    /// Fix both duration indexes after `nts` was cut off the end of `self`
    pub fn set_new_duration_index(&mut self, nts: &mut TimeSpan) {
        nts.duration_index = self.duration_index;
        self.duration_index = (self.duration_index - nts.duration()).max(Duration::zero());
    }

    /// Cut the span at `at`, returning the later piece without an interval
    fn split_at(&mut self, at: DateTime<Utc>) -> TimeSpan {
        let mut nts = TimeSpan::new(at, self.time_end);
        nts.copy_rating_info(self);
        self.time_end = at;
        self.set_new_duration_index(&mut nts);
        nts
    }

    /// True when the interval already attached should be kept over `candidate`.
    ///
    /// A candidate whose daily window has not started at the span start is
    /// never better. With no incumbent the candidate wins. Otherwise higher
    /// weight wins, and for equal weights the interval whose window opened
    /// closest to the span start wins, ties going to the incumbent.
    pub fn has_better_rate_interval_than(&self, candidate: &RateInterval) -> bool {
        let other_distance = self.time_start - candidate.timing.left_margin(self.time_start);
        if other_distance < Duration::zero() {
            return true;
        }
        let current = match &self.rate_interval {
            Some(ri) => ri,
            None => return false,
        };
        if current.weight > candidate.weight {
            return true;
        }
        if current.weight < candidate.weight {
            return false;
        }
        let own_distance = self.time_start - current.timing.left_margin(self.time_start);
        own_distance <= other_distance
    }

    /// Attach `interval` unless the current one is better
    pub fn set_rate_interval(&mut self, interval: &RateInterval) {
        if !self.has_better_rate_interval_than(interval) {
            self.rate_interval = Some(interval.clone());
        }
    }

    /// Split against one rate interval.
    ///
    /// Returns the remainder when the span had to be cut, `None` when the
    /// interval either governs the whole span or does not touch it. With
    /// `data` set only the start containment matters and no cut is made.
    pub fn split_by_rate_interval(&mut self, interval: &RateInterval, data: bool) -> Option<TimeSpan> {
        if !(interval.contains(self.time_start, false) || interval.contains(self.time_end, true)) {
            return None;
        }

        // price tier boundaries inside the span
        let (group_start, group_end) = (self.group_start(), self.group_end());
        for rate in interval.rating.rates.sorted() {
            let boundary = rate.group_interval_start;
            if group_start < boundary && boundary < group_end {
                self.set_rate_interval(interval);
                let split_time = self.time_start + (boundary - group_start);
                let mut nts = self.split_at(split_time);
                nts.set_rate_interval(interval);
                trace!(at = %split_time, "tier split");
                return Some(nts);
            }
        }

        if data {
            if interval.contains(self.time_start, false) {
                self.set_rate_interval(interval);
            }
            return None;
        }

        let start_in = interval.contains(self.time_start, false);
        let end_in = interval.contains(self.time_end, true);
        if start_in && end_in {
            self.set_rate_interval(interval);
            return None;
        }

        if start_in {
            let split_time = interval.timing.right_margin(self.time_start);
            self.set_rate_interval(interval);
            if !self.contains(split_time) {
                return None;
            }
            trace!(at = %split_time, "right margin split");
            return Some(self.split_at(split_time));
        }

        if end_in {
            let split_time = interval.timing.left_margin(self.time_end);
            if !self.contains(split_time) {
                return None;
            }
            let mut nts = self.split_at(split_time);
            nts.set_rate_interval(interval);
            trace!(at = %split_time, "left margin split");
            return Some(nts);
        }
        None
    }

    /// Split at a rating plan activation time
    pub fn split_by_rating_plan(&mut self, activation: DateTime<Utc>, info: &RatingInfo, idx: usize) -> Option<TimeSpan> {
        if !self.contains(activation) {
            return None;
        }
        let mut nts = self.split_at(activation);
        nts.set_rating_info(info, idx);
        Some(nts)
    }

    /// Split at the first midnight inside the span
    pub fn split_by_day(&mut self) -> Option<TimeSpan> {
        let next_day = self.time_start.date_naive().succ_opt()?;
        let midnight = next_day.and_hms_opt(0, 0, 0)?.and_utc();
        if !self.contains(midnight) {
            return None;
        }
        let mut nts = self.split_at(midnight);
        nts.rate_interval = self.rate_interval.clone();
        Some(nts)
    }

    /// Split after `duration`, cutting an increment in two when needed
    pub fn split_by_duration(&mut self, duration: Duration) -> Option<TimeSpan> {
        if duration <= Duration::zero() || duration >= self.duration() {
            return None;
        }
        let mut nts = self.split_at(self.time_start + duration);
        nts.rate_interval = self.rate_interval.clone();

        let mut remaining = duration;
        for idx in 0..self.increments.len() {
            if remaining.is_zero() {
                nts.increments.0 = self.increments.split_off(idx);
                break;
            }
            let incr_duration = self.increments[idx].duration;
            if remaining >= incr_duration {
                remaining = remaining - incr_duration;
                continue;
            }
            let mut tail = self.increments[idx].clone();
            tail.duration = incr_duration - remaining;
            self.increments[idx].duration = remaining;
            let rest = self.increments.split_off(idx + 1);
            nts.increments.push(tail);
            nts.increments.extend(rest);
            break;
        }
        Some(nts)
    }

    /// Start instant of increment `index` (increments not compressed)
    pub fn time_start_for_increment(&self, index: usize) -> DateTime<Utc> {
        self.time_start
            + self
                .increments
                .iter()
                .take(index)
                .fold(Duration::zero(), |acc, i| acc + i.duration)
    }

    /// Split so the remainder starts with increment `index`
    pub fn split_by_increment(&mut self, index: usize) -> Option<TimeSpan> {
        if index == 0 || index >= self.increments.len() {
            return None;
        }
        let at = self.time_start_for_increment(index);
        let mut nts = self.split_at(at);
        nts.rate_interval = self.rate_interval.clone();
        nts.increments.0 = self.increments.split_off(index);
        Some(nts)
    }

    /// Stretch the span to a multiple of `increment`
    pub fn round_to_duration(&mut self, increment: Duration) {
        let initial = self.duration();
        let target = if increment < initial {
            round_duration(increment, initial)
        } else {
            increment
        };
        if target > initial {
            self.time_end = self.time_start + target;
            self.duration_index = self.duration_index + (target - initial);
        }
    }

    /// Cost from increments when present, otherwise from the rate interval
    pub fn calculate_cost(&self, rounding: Rounding) -> BillingResult<Decimal> {
        if self.increments.is_empty() {
            return match &self.rate_interval {
                Some(ri) => ri.get_cost(self.duration(), self.group_start()),
                None => Ok(Decimal::ZERO),
            };
        }
        Ok(self.increments.total_cost(rounding) * Decimal::from(self.get_compress_factor()))
    }

    /// Refresh and return the cached cost
    pub fn get_cost(&mut self, rounding: Rounding) -> BillingResult<Decimal> {
        let cost = self.calculate_cost(rounding)?;
        self.cost = if self.increments.is_empty() {
            rounding.round(cost)
        } else {
            cost
        };
        Ok(self.cost)
    }

    /// Break the span into equal increments sharing its rounded cost
    pub fn create_increments_slice(&mut self, rounding: Rounding) -> BillingResult<()> {
        let ri = match &self.rate_interval {
            Some(ri) => ri,
            None => return Ok(()),
        };
        let increment = ri.get_rate_parameters(self.group_start())?.increment;
        let nb = match (self.duration().num_nanoseconds(), increment.num_nanoseconds()) {
            (Some(d), Some(i)) if i > 0 => d / i,
            _ => 0,
        };
        self.increments.clear();
        if nb == 0 {
            return Ok(());
        }
        let total = ri.get_cost(self.duration(), self.group_start())?;
        let increment_cost = rounding.round(total / Decimal::from(nb));
        for _ in 0..nb {
            self.increments.push(Increment::new(increment, increment_cost));
        }
        self.cost = increment_cost * Decimal::from(nb);
        Ok(())
    }

    /// Compression key for neighbouring spans
    pub fn equal(&self, other: &TimeSpan) -> bool {
        self.increments.equal(&other.increments)
            && self.rate_interval == other.rate_interval
            && self.unit_cost() == other.unit_cost()
            && self.unit_duration() == other.unit_duration()
            && self.matched_subject == other.matched_subject
            && self.matched_prefix == other.matched_prefix
            && self.matched_dest_id == other.matched_dest_id
            && self.rating_plan_id == other.rating_plan_id
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpans(pub Vec<TimeSpan>);

impl Deref for TimeSpans {
    type Target = Vec<TimeSpan>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for TimeSpans {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<TimeSpan>> for TimeSpans {
    fn from(spans: Vec<TimeSpan>) -> Self {
        Self(spans)
    }
}

impl TimeSpans {
    /// Drop spans swallowed by a stretched span at `index` and trim the
    /// first one it only partially overlaps
    pub fn remove_overlapped_from_index(&mut self, index: usize) {
        let end = match self.get(index) {
            Some(ts) => ts.time_end,
            None => return,
        };
        let mut last_overlapped = index;
        for i in index + 1..self.len() {
            if self[i].time_end <= end {
                last_overlapped = i;
            } else {
                if self[i].time_start < end {
                    self[i].time_start = end;
                }
                break;
            }
        }
        if last_overlapped > index {
            self.drain(index + 1..=last_overlapped);
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.iter().map(|ts| ts.cost).sum()
    }

    pub fn total_duration(&self) -> Duration {
        self.iter().fold(Duration::zero(), |acc, ts| acc + ts.duration())
    }

    /// Compress increments, then merge equal neighbouring spans
    pub fn compress(&mut self) {
        let mut out: Vec<TimeSpan> = Vec::with_capacity(self.len());
        for mut ts in self.0.drain(..) {
            ts.increments.compress();
            match out.last_mut() {
                Some(last) if last.equal(&ts) => {
                    last.compress_factor = last.get_compress_factor() + 1;
                    last.cost += ts.cost;
                    last.time_end = ts.time_end;
                    last.duration_index = ts.duration_index;
                }
                _ => {
                    ts.compress_factor = ts.get_compress_factor();
                    out.push(ts);
                }
            }
        }
        self.0 = out;
    }

    pub fn decompress(&mut self) {
        let mut out = Vec::new();
        for mut c_ts in self.0.drain(..) {
            c_ts.increments.decompress();
            let cf = c_ts.get_compress_factor();
            let unit = c_ts.unit_duration();
            let unit_cost = c_ts.unit_cost();
            for i in (2..=cf).rev() {
                let mut u_ts = c_ts.clone();
                u_ts.time_end = c_ts.time_start + unit;
                u_ts.duration_index = c_ts.duration_index - scale(unit, i - 1);
                u_ts.compress_factor = 1;
                u_ts.cost = unit_cost;
                c_ts.time_start = u_ts.time_end;
                out.push(u_ts);
            }
            c_ts.cost = unit_cost;
            c_ts.compress_factor = 1;
            out.push(c_ts);
        }
        self.0 = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_group::{Rate, RateGroups};
    use crate::rate_interval::RIRate;
    use crate::timing::RITiming;
    use chrono::{TimeZone, Weekday};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    fn flat_rates(price: Decimal) -> RIRate {
        RIRate::new(RateGroups::new(vec![Rate::new(
            Duration::zero(),
            price,
            Duration::seconds(1),
            Duration::seconds(1),
        )]))
    }

    fn weekday_evening() -> RateInterval {
        RateInterval::new(
            RITiming {
                week_days: vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                ],
                start_time: "18:00:00".into(),
                ..Default::default()
            },
            flat_rates(dec!(0.1)),
            10.0,
        )
    }

    #[test]
    fn test_friday_night_into_saturday() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 23, 45, 0), at(2012, 2, 4, 0, 10, 0));
        let ri = weekday_evening();
        let nts = ts.split_by_rate_interval(&ri, false).unwrap();

        assert_eq!(ts.time_end, at(2012, 2, 4, 0, 0, 0));
        assert_eq!(ts.duration(), Duration::minutes(15));
        assert_eq!(ts.rate_interval.as_ref(), Some(&ri));

        assert_eq!(nts.time_start, at(2012, 2, 4, 0, 0, 0));
        assert_eq!(nts.duration(), Duration::minutes(10));
        assert!(nts.rate_interval.is_none());

        assert_eq!(ts.duration_index, Duration::minutes(15));
        assert_eq!(nts.duration_index, Duration::minutes(25));
    }

    #[test]
    fn test_left_margin_split() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 17, 50, 0), at(2012, 2, 3, 18, 10, 0));
        let ri = weekday_evening();
        let nts = ts.split_by_rate_interval(&ri, false).unwrap();
        assert_eq!(ts.time_end, at(2012, 2, 3, 18, 0, 0));
        assert!(ts.rate_interval.is_none());
        assert_eq!(nts.time_start, at(2012, 2, 3, 18, 0, 0));
        assert_eq!(nts.rate_interval.as_ref(), Some(&ri));
    }

    #[test]
    fn test_interval_covering_whole_span() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 19, 0, 0), at(2012, 2, 3, 19, 30, 0));
        let ri = weekday_evening();
        assert!(ts.split_by_rate_interval(&ri, false).is_none());
        assert_eq!(ts.rate_interval.as_ref(), Some(&ri));
    }

    #[test]
    fn test_interval_missing_span() {
        let mut ts = TimeSpan::new(at(2012, 2, 4, 10, 0, 0), at(2012, 2, 4, 10, 30, 0));
        assert!(ts.split_by_rate_interval(&weekday_evening(), false).is_none());
        assert!(ts.rate_interval.is_none());
    }

    #[test]
    fn test_tier_split() {
        let ri = RateInterval::new(
            RITiming::default(),
            RIRate::new(RateGroups::new(vec![
                Rate::new(Duration::zero(), dec!(0.02), Duration::seconds(1), Duration::seconds(1)),
                Rate::new(Duration::seconds(60), dec!(0.01), Duration::seconds(1), Duration::seconds(1)),
            ])),
            0.0,
        );
        let mut ts = TimeSpan::new(at(2012, 2, 3, 10, 0, 0), at(2012, 2, 3, 10, 1, 30));
        let nts = ts.split_by_rate_interval(&ri, false).unwrap();
        assert_eq!(ts.duration(), Duration::seconds(60));
        assert_eq!(nts.duration(), Duration::seconds(30));
        assert_eq!(nts.group_start(), Duration::seconds(60));
        assert!(ts.rate_interval.is_some() && nts.rate_interval.is_some());
        let total = ts.calculate_cost(Rounding::default()).unwrap()
            + nts.calculate_cost(Rounding::default()).unwrap();
        assert_eq!(total, dec!(1.5));
    }

    #[test]
    fn test_data_mode_never_cuts() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 23, 45, 0), at(2012, 2, 4, 0, 10, 0));
        assert!(ts.split_by_rate_interval(&weekday_evening(), true).is_none());
        assert!(ts.rate_interval.is_some());
        assert_eq!(ts.duration(), Duration::minutes(25));
    }

    #[test]
    fn test_weight_comparator() {
        let start = at(2012, 2, 3, 19, 0, 0);
        let mut ts = TimeSpan::new(start, start + Duration::minutes(10));
        let heavy = weekday_evening();
        let light = RateInterval::new(RITiming::default(), flat_rates(dec!(1)), 0.0);
        let late = RateInterval::new(
            RITiming {
                start_time: "20:00:00".into(),
                ..Default::default()
            },
            flat_rates(dec!(2)),
            50.0,
        );

        assert!(!ts.has_better_rate_interval_than(&light));
        ts.set_rate_interval(&light);
        ts.set_rate_interval(&heavy);
        assert_eq!(ts.rate_interval.as_ref(), Some(&heavy));

        // lighter never replaces heavier
        ts.set_rate_interval(&light);
        assert_eq!(ts.rate_interval.as_ref(), Some(&heavy));

        // a window not yet open at the span start is never better
        assert!(ts.has_better_rate_interval_than(&late));

        // equal weight: closer left margin wins, ties keep the incumbent
        let closer = RateInterval::new(
            RITiming {
                start_time: "18:30:00".into(),
                ..Default::default()
            },
            flat_rates(dec!(3)),
            10.0,
        );
        assert!(!ts.has_better_rate_interval_than(&closer));
        let mut same = heavy.clone();
        same.rating = flat_rates(dec!(4));
        assert!(ts.has_better_rate_interval_than(&same));
    }

    #[test]
    fn test_split_by_day_and_duration() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 23, 0, 0), at(2012, 2, 4, 1, 0, 0));
        let nts = ts.split_by_day().unwrap();
        assert_eq!(ts.time_end, at(2012, 2, 4, 0, 0, 0));
        assert_eq!(nts.duration(), Duration::hours(1));

        let mut ts = TimeSpan::new(at(2012, 2, 3, 10, 0, 0), at(2012, 2, 3, 10, 0, 30));
        ts.increments = Increments(vec![
            Increment::new(Duration::seconds(10), dec!(0.1)),
            Increment::new(Duration::seconds(10), dec!(0.1)),
            Increment::new(Duration::seconds(10), dec!(0.1)),
        ]);
        let nts = ts.split_by_duration(Duration::seconds(15)).unwrap();
        assert_eq!(ts.increments.total_duration(), Duration::seconds(15));
        assert_eq!(nts.increments.total_duration(), Duration::seconds(15));
        assert_eq!(ts.increments.len(), 2);
        assert_eq!(nts.increments.len(), 2);
        assert!(ts.split_by_duration(Duration::seconds(15)).is_none());
    }

    #[test]
    fn test_split_by_increment() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 10, 0, 0), at(2012, 2, 3, 10, 0, 30));
        ts.increments = Increments(vec![Increment::new(Duration::seconds(10), dec!(0.1)); 3]);
        assert!(ts.split_by_increment(0).is_none());
        let nts = ts.split_by_increment(2).unwrap();
        assert_eq!(nts.time_start, at(2012, 2, 3, 10, 0, 20));
        assert_eq!(ts.increments.len(), 2);
        assert_eq!(nts.increments.len(), 1);
        assert_eq!(ts.duration_index, Duration::seconds(20));
    }

    #[test]
    fn test_create_increments_slice() {
        let mut ts = TimeSpan::new(at(2012, 2, 3, 10, 0, 0), at(2012, 2, 3, 10, 1, 0));
        let mut rating = flat_rates(dec!(0.6));
        rating.rates.0[0].rate_increment = Duration::seconds(10);
        rating.rates.0[0].rate_unit = Duration::minutes(1);
        ts.rate_interval = Some(RateInterval::new(RITiming::default(), rating, 0.0));
        ts.create_increments_slice(Rounding::default()).unwrap();
        assert_eq!(ts.increments.len(), 6);
        assert_eq!(ts.increments[0].cost, dec!(0.1));
        assert_eq!(ts.cost, dec!(0.6));
        assert_eq!(ts.calculate_cost(Rounding::default()).unwrap(), dec!(0.6));
    }

    #[test]
    fn test_remove_overlapped_from_index() {
        let base = at(2012, 2, 3, 10, 0, 0);
        let mut tss = TimeSpans(vec![
            TimeSpan::new(base, base + Duration::seconds(50)),
            TimeSpan::new(base + Duration::seconds(10), base + Duration::seconds(20)),
            TimeSpan::new(base + Duration::seconds(20), base + Duration::seconds(30)),
            TimeSpan::new(base + Duration::seconds(30), base + Duration::seconds(60)),
        ]);
        tss.remove_overlapped_from_index(0);
        assert_eq!(tss.len(), 2);
        assert_eq!(tss[1].time_start, base + Duration::seconds(50));
        assert_eq!(tss[1].time_end, base + Duration::seconds(60));
    }

    #[test]
    fn test_compress_decompress_spans() {
        let base = at(2012, 2, 3, 10, 0, 0);
        let ri = RateInterval::new(RITiming::default(), flat_rates(dec!(0.1)), 0.0);
        let mut tss = TimeSpans::default();
        for i in 0..3 {
            let mut ts = TimeSpan::new(
                base + Duration::seconds(10 * i),
                base + Duration::seconds(10 * (i + 1)),
            );
            ts.duration_index = Duration::seconds(10 * (i + 1));
            ts.rate_interval = Some(ri.clone());
            ts.cost = dec!(1);
            ts.increments = Increments(vec![Increment::new(Duration::seconds(1), dec!(0.1)); 10]);
            tss.push(ts);
        }
        let original = tss.clone();
        tss.compress();
        assert_eq!(tss.len(), 1);
        assert_eq!(tss[0].compress_factor, 3);
        assert_eq!(tss[0].cost, dec!(3));
        assert_eq!(tss[0].increments.len(), 1);
        assert_eq!(tss[0].increments[0].compress_factor, 10);

        tss.decompress();
        assert_eq!(tss, original);
    }

    #[test]
    fn test_large_compress_factors() {
        let runs = 3_000_000_000u32;
        let base = at(2012, 2, 3, 10, 0, 0);
        let mut ts = TimeSpan::new(base, base + Duration::seconds(3_000_000_000));
        ts.compress_factor = runs;
        assert_eq!(ts.unit_duration(), Duration::seconds(1));

        let incrs = Increments(vec![Increment {
            compress_factor: runs,
            ..Increment::new(Duration::seconds(1), dec!(0))
        }]);
        assert_eq!(incrs.total_duration(), Duration::seconds(3_000_000_000));
    }

    #[test]
    fn test_increment_balance_values_round_trip() {
        let mut incrs = Increments(
            [dec!(9.9), dec!(9.8), dec!(9.7)]
                .into_iter()
                .map(|v| Increment {
                    duration: Duration::seconds(1),
                    cost: dec!(0.1),
                    balance_info: Some(DebitInfo {
                        monetary: Some(MonetaryInfo {
                            uuid: "b1".into(),
                            value: v,
                            ..Default::default()
                        }),
                        account_id: "cgrates.org:1001".into(),
                        ..Default::default()
                    }),
                    compress_factor: 1,
                })
                .collect(),
        );
        let original = incrs.clone();
        incrs.compress();
        assert_eq!(incrs.len(), 1);
        assert_eq!(
            incrs[0].balance_info.as_ref().unwrap().monetary.as_ref().unwrap().value,
            dec!(9.7)
        );
        incrs.decompress();
        assert_eq!(incrs, original);
    }

    proptest! {
        #[test]
        fn prop_split_conserves_duration(
            start_secs in 0i64..(14 * 86_400),
            len_secs in 1i64..(3 * 86_400),
            hour in 0u32..24,
        ) {
            let start = at(2012, 2, 1, 0, 0, 0) + Duration::seconds(start_secs);
            let end = start + Duration::seconds(len_secs);
            let ri = RateInterval::new(
                RITiming {
                    week_days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
                    start_time: format!("{:02}:00:00", hour),
                    ..Default::default()
                },
                flat_rates(dec!(1)),
                1.0,
            );
            let mut ts = TimeSpan::new(start, end);
            let before = ts.duration();
            if let Some(nts) = ts.split_by_rate_interval(&ri, false) {
                prop_assert_eq!(ts.duration() + nts.duration(), before);
                prop_assert_eq!(ts.time_end, nts.time_start);
                prop_assert!(ts.duration() > Duration::zero());
                prop_assert!(nts.duration() > Duration::zero());
            } else {
                prop_assert_eq!(ts.duration(), before);
            }
        }
    }
}
