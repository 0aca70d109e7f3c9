//! Rating request for one call and the splitting driver

use crate::call_cost::{CallCost, META_VOICE};
use crate::rate_interval::sort_by_weight;
use crate::rating_info::{sort_by_activation, RatingInfo};
use crate::timespan::{Increment, TimeSpan, TimeSpans};
use apolo_core::utils::{duration_nanos, round, Rounding};
use apolo_core::{BillingError, BillingResult};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Everything needed to rate one call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallDescriptor {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    pub tor: String,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Number of previous debit loops for the same session
    #[serde(default)]
    pub loop_index: u32,
    /// Elapsed session duration at `time_end`
    #[serde(with = "duration_nanos", default)]
    pub duration_index: Duration,
    #[serde(default)]
    pub rating_infos: Vec<RatingInfo>,
}

impl CallDescriptor {
    pub fn new(
        tenant: impl Into<String>,
        account: impl Into<String>,
        destination: impl Into<String>,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
    ) -> Self {
        let account = account.into();
        Self {
            category: "call".to_string(),
            tenant: tenant.into(),
            subject: account.clone(),
            account,
            destination: destination.into(),
            tor: META_VOICE.to_string(),
            time_start,
            time_end,
            duration_index: time_end - time_start,
            ..Default::default()
        }
    }

    pub fn get_duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    pub fn add_rating_info(&mut self, info: RatingInfo) {
        self.rating_infos.push(info);
    }

    pub fn validate_call_data(&self) -> BillingResult<()> {
        if self.time_start >= self.time_end {
            return Err(BillingError::InvalidCallData(
                "time_start must be strictly before time_end".to_string(),
            ));
        }
        if self.duration_index < self.get_duration() {
            return Err(BillingError::InvalidCallData(
                "duration_index must be equal or greater than time_end - time_start".to_string(),
            ));
        }
        Ok(())
    }

    /// Cut the call into spans each governed by at most one rate interval.
    ///
    /// Spans are first split at rating plan activation times (voice only),
    /// then against the intervals their plan selects for them. A span
    /// that was cut is evaluated again before moving on, so the remainder
    /// and the shortened span are both settled.
    pub fn split_in_time_spans(&mut self) -> BillingResult<TimeSpans> {
        let mut first = TimeSpan::new(self.time_start, self.time_end);
        first.duration_index = self.duration_index;
        let mut spans = TimeSpans(vec![first]);

        if self.rating_infos.is_empty() {
            return Ok(spans);
        }
        sort_by_activation(&mut self.rating_infos);
        spans[0].set_rating_info(&self.rating_infos[0], 0);

        if self.tor == META_VOICE {
            for (idx, info) in self.rating_infos.iter().enumerate() {
                if info.activation_time <= self.time_start {
                    spans[0].set_rating_info(info, idx);
                    continue;
                }
                let last = spans.len() - 1;
                match spans[last].split_by_rating_plan(info.activation_time, info, idx) {
                    Some(nts) => spans.push(nts),
                    None => break,
                }
            }
        }

        let data = self.tor != META_VOICE;

        let mut i = 0;
        while i < spans.len() {
            let info = match spans[i].rating_info_idx.and_then(|idx| self.rating_infos.get(idx)) {
                Some(info) => info,
                None => {
                    i += 1;
                    continue;
                }
            };
            let mut intervals = info.select_rating_intervals_for_span(&spans[i]);
            if intervals.is_empty() {
                // nothing governs the span start, an interval opening inside may still cut it
                intervals = info.rate_intervals.clone();
                sort_by_weight(&mut intervals);
            }
            let mut remainder = None;
            for interval in &intervals {
                // a heavier interval already governs the span
                if matches!(&spans[i].rate_interval, Some(cur) if cur.weight > interval.weight) {
                    continue;
                }
                if let Some(nts) = spans[i].split_by_rate_interval(interval, data) {
                    remainder = Some(nts);
                    break;
                }
            }
            match remainder {
                Some(nts) => spans.insert(i + 1, nts),
                None => i += 1,
            }
        }

        self.round_time_spans_to_increment(&mut spans)?;
        debug!(spans = spans.len(), "call split");
        Ok(spans)
    }

    /// Stretch every rated span to a whole number of increments, eating
    /// into the spans that follow
    pub fn round_time_spans_to_increment(&self, spans: &mut TimeSpans) -> BillingResult<()> {
        let mut i = 0;
        while i < spans.len() {
            let increment = match &spans[i].rate_interval {
                Some(ri) => ri.get_rate_parameters(spans[i].group_start())?.increment,
                None => {
                    i += 1;
                    continue;
                }
            };
            let before = spans[i].duration();
            spans[i].round_to_duration(increment);
            if spans[i].duration() > before {
                spans.remove_overlapped_from_index(i);
            }
            i += 1;
        }
        Ok(())
    }

    /// Rate the call.
    ///
    /// The connect fee is charged on the first span of the first loop as a
    /// zero length increment. The total is rounded with the finest rounding
    /// of the intervals involved and the spans are compressed.
    #[instrument(skip(self, rounding), fields(account = %self.account, destination = %self.destination))]
    pub fn get_cost(&mut self, rounding: Rounding) -> BillingResult<CallCost> {
        self.duration_index = self.duration_index.max(self.get_duration());
        self.validate_call_data()?;
        if self.rating_infos.is_empty() {
            return Err(BillingError::RatingInfoMissing(format!(
                "{}:{} -> {}",
                self.tenant, self.subject, self.destination
            )));
        }

        let mut spans = self.split_in_time_spans()?;
        let mut cost = Decimal::ZERO;
        for (i, ts) in spans.iter_mut().enumerate() {
            let connect_fee = match &ts.rate_interval {
                Some(ri) => ri.connect_fee(),
                None => {
                    warn!(start = %ts.time_start, end = %ts.time_end, "no rate interval covers span");
                    continue;
                }
            };
            ts.create_increments_slice(rounding)?;
            if i == 0 && self.loop_index == 0 && !connect_fee.is_zero() {
                ts.increments.insert(0, Increment::new(Duration::zero(), connect_fee));
                ts.cost += connect_fee;
            }
            cost += ts.cost;
        }

        let mut cc = self.create_call_cost(spans);
        let (decimals, method) = cc.get_longest_rounding();
        cc.cost = round(cost, decimals, method);
        cc.timespans.compress();
        cc.update_rated_usage();
        debug!(cost = %cc.cost, usage = ?cc.rated_usage, "call rated");
        Ok(cc)
    }

    pub fn create_call_cost(&self, timespans: TimeSpans) -> CallCost {
        CallCost {
            category: self.category.clone(),
            tenant: self.tenant.clone(),
            subject: self.subject.clone(),
            account: self.account.clone(),
            destination: self.destination.clone(),
            tor: self.tor.clone(),
            timespans,
            deduct_connect_fee: self.loop_index == 0,
            ..Default::default()
        }
    }
}
