//! Rating plan information matched for a call

use crate::rate_interval::RateInterval;
use crate::timespan::TimeSpan;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rate intervals of one rating plan, valid from `activation_time`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingInfo {
    pub matched_subject: String,
    pub matched_prefix: String,
    pub matched_dest_id: String,
    pub rating_plan_id: String,
    pub activation_time: DateTime<Utc>,
    #[serde(default)]
    pub rate_intervals: Vec<RateInterval>,
    #[serde(default)]
    pub fallback_keys: Vec<String>,
}

/// Windows already open at `reference` first, closest opening first;
/// windows opening later follow in chronological order
fn margin_key(ri: &RateInterval, reference: DateTime<Utc>) -> (bool, Duration) {
    let margin = ri.timing.left_margin(reference);
    (margin > reference, (reference - margin).abs())
}

impl RatingInfo {
    /// Intervals ordered by weight (heaviest first), then by how close their
    /// daily window opens to `reference`
    pub fn sorted_intervals(&self, reference: DateTime<Utc>) -> Vec<&RateInterval> {
        let mut intervals: Vec<&RateInterval> = self.rate_intervals.iter().collect();
        intervals.sort_by(|a, b| {
            RateInterval::cmp_weight_desc(a, b)
                .then_with(|| margin_key(a, reference).cmp(&margin_key(b, reference)))
        });
        intervals
    }

    /// Pick the intervals that may govern `span`.
    ///
    /// The primary is the first interval (in sorted order) containing the
    /// span start with its window already open. Later intervals of no lower
    /// weight whose window opens before the span end are added after it.
    /// The list is sorted here, so callers may hand in any order.
    pub fn select_rating_intervals_for_span(&self, span: &TimeSpan) -> Vec<RateInterval> {
        let intervals = self.sorted_intervals(span.time_start);
        let primary = intervals.iter().position(|ri| {
            ri.contains(span.time_start, false) && ri.timing.left_margin(span.time_start) <= span.time_start
        });
        let primary = match primary {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let floor = intervals[primary].weight;
        let mut result = vec![intervals[primary].clone()];
        for ri in &intervals[primary + 1..] {
            if ri.weight < floor {
                break;
            }
            if ri.timing.left_margin(span.time_start) < span.time_end {
                result.push((*ri).clone());
            }
        }
        result
    }
}

/// Sort by activation time, oldest first
pub fn sort_by_activation(infos: &mut [RatingInfo]) {
    infos.sort_by_key(|i| i.activation_time);
}
