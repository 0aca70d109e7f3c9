//! Action plans and the scheduling order of their timings

use crate::action_timing::{ActionTiming, META_MONTHLY_ESTIMATED};
use apolo_core::{BillingError, BillingResult};
use apolo_rating::timing::{LAST_MONTH_DAY, META_EVERY_MINUTE, META_HOURLY};
use apolo_rating::RITiming;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

pub const META_DAILY: &str = "*daily";
pub const META_WEEKLY: &str = "*weekly";
pub const META_MONTHLY: &str = "*monthly";
pub const META_MONTH_END: &str = "*month_end";
pub const META_YEARLY: &str = "*yearly";

/// Expand a timing shorthand anchored on `now`.
///
/// `*daily` fires at the time of day of `now`, `*weekly` on its weekday,
/// `*monthly` on its day of month and so on. `None` for anything else.
pub fn default_timing(tag: &str, now: DateTime<Utc>) -> Option<RITiming> {
    let time_of_day = now.format("%H:%M:%S").to_string();
    let day = now.day() as i32;
    let timing = match tag {
        META_EVERY_MINUTE => RITiming {
            start_time: format!("*:*:{}", now.second()),
            ..Default::default()
        },
        META_HOURLY => RITiming {
            start_time: format!("*:{}:{}", now.minute(), now.second()),
            ..Default::default()
        },
        META_DAILY => RITiming {
            start_time: time_of_day,
            ..Default::default()
        },
        META_WEEKLY => RITiming {
            week_days: vec![now.weekday()],
            start_time: time_of_day,
            ..Default::default()
        },
        META_MONTHLY | META_MONTHLY_ESTIMATED => RITiming {
            month_days: vec![day],
            start_time: time_of_day,
            ..Default::default()
        },
        META_MONTH_END => RITiming {
            month_days: vec![LAST_MONTH_DAY],
            start_time: time_of_day,
            ..Default::default()
        },
        META_YEARLY => RITiming {
            months: vec![now.month()],
            month_days: vec![day],
            start_time: time_of_day,
            ..Default::default()
        },
        _ => return None,
    };
    Some(RITiming {
        id: tag.to_string(),
        ..timing
    })
}

/// Resolve the timing of a plan entry: a shorthand, or a stored timing
pub fn resolve_timing(
    timing_id: &str,
    timings: &HashMap<String, RITiming>,
    now: DateTime<Utc>,
) -> BillingResult<RITiming> {
    if let Some(timing) = default_timing(timing_id, now) {
        return Ok(timing);
    }
    let timing = timings
        .get(timing_id)
        .ok_or_else(|| BillingError::InvalidTiming(format!("unknown timing {}", timing_id)))?;
    timing.validate()?;
    Ok(RITiming {
        id: timing_id.to_string(),
        ..timing.clone()
    })
}

/// Timings shared by a set of accounts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    #[serde(default)]
    pub account_ids: BTreeSet<String>,
    #[serde(default)]
    pub action_timings: Vec<ActionTiming>,
}

impl ActionPlan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn remove_account_id(&mut self, account_id: &str) -> bool {
        self.account_ids.remove(account_id)
    }

    /// Copies of the timings bound to this plan's ID and accounts
    pub fn scheduled_timings(&self) -> Vec<ActionTiming> {
        self.action_timings
            .iter()
            .map(|at| {
                let mut at = at.clone();
                at.set_action_plan_id(self.id.clone());
                at.set_account_ids(self.account_ids.iter().cloned());
                at
            })
            .collect()
    }
}

// Earlier first, never-firing last
fn cmp_start(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_weight_desc(a: &ActionTiming, b: &ActionTiming) -> Ordering {
    b.weight.total_cmp(&a.weight)
}

/// Timings ordered by next start time, heavier first on ties
#[derive(Debug, Clone, Default)]
pub struct ActionTimingPriorityList(pub Vec<ActionTiming>);

impl ActionTimingPriorityList {
    pub fn sort(&mut self, now: DateTime<Utc>) {
        for at in self.0.iter_mut() {
            if let Err(e) = at.get_next_start_time(now) {
                warn!("Cannot schedule action timing {}: {}", at.uuid, e);
            }
        }
        self.0.sort_by(|a, b| {
            cmp_start(a.cached_start_time(), b.cached_start_time())
                .then_with(|| cmp_weight_desc(a, b))
        });
    }
}

/// Timings ordered by weight alone
#[derive(Debug, Clone, Default)]
pub struct ActionTimingWeightOnlyPriorityList(pub Vec<ActionTiming>);

impl ActionTimingWeightOnlyPriorityList {
    pub fn sort(&mut self) {
        self.0.sort_by(cmp_weight_desc);
    }
}
