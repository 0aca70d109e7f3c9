//! Price tiers keyed by elapsed usage

use apolo_core::utils::duration_nanos;
use apolo_core::{BillingError, BillingResult};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price tier, active from `group_interval_start` elapsed usage onwards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rate {
    #[serde(with = "duration_nanos")]
    pub group_interval_start: Duration,
    /// Price per `rate_unit`
    pub value: Decimal,
    #[serde(with = "duration_nanos")]
    pub rate_increment: Duration,
    #[serde(with = "duration_nanos")]
    pub rate_unit: Duration,
}

impl Rate {
    pub fn new(start: Duration, value: Decimal, increment: Duration, unit: Duration) -> Self {
        Self {
            group_interval_start: start,
            value,
            rate_increment: increment,
            rate_unit: unit,
        }
    }

    fn parameters(&self) -> RateParameters {
        let one_sec = Duration::seconds(1);
        RateParameters {
            price: self.value,
            increment: if self.rate_increment.is_zero() {
                one_sec
            } else {
                self.rate_increment
            },
            unit: if self.rate_unit.is_zero() {
                one_sec
            } else {
                self.rate_unit
            },
        }
    }
}

/// Price, increment and unit resolved for one offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateParameters {
    pub price: Decimal,
    pub increment: Duration,
    pub unit: Duration,
}

/// Ordered list of price tiers.
///
/// Equality is element-wise in order, so two groups holding the same tiers
/// in a different order are different values for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateGroups(pub Vec<Rate>);

impl RateGroups {
    pub fn new(rates: Vec<Rate>) -> Self {
        let mut groups = Self(rates);
        groups.sort();
        groups
    }

    /// Stable sort ascending by tier start
    pub fn sort(&mut self) {
        self.0.sort_by_key(|r| r.group_interval_start);
    }

    /// Tiers in ascending start order, without touching the stored order
    pub fn sorted(&self) -> Vec<&Rate> {
        let mut rates: Vec<&Rate> = self.0.iter().collect();
        rates.sort_by_key(|r| r.group_interval_start);
        rates
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rate> {
        self.0.iter()
    }

    /// Resolve the tier covering `offset`.
    ///
    /// The winning tier is the last one (in ascending order) whose start is
    /// at or before `offset`. Zero increment or unit read as one second.
    pub fn rate_parameters_at(&self, offset: Duration) -> BillingResult<RateParameters> {
        let rates = self.sorted();
        for (index, rate) in rates.iter().enumerate() {
            let is_last = index == rates.len() - 1;
            if rate.group_interval_start <= offset
                && (is_last || rates[index + 1].group_interval_start > offset)
            {
                return Ok(rate.parameters());
            }
        }
        Err(BillingError::UncomputablePricing {
            offset_secs: offset.num_seconds(),
        })
    }

    /// Smallest increment among the tiers, used for rounding spans
    pub fn min_increment(&self) -> Option<Duration> {
        self.0.iter().map(|r| r.parameters().increment).min()
    }
}

impl From<Vec<Rate>> for RateGroups {
    fn from(rates: Vec<Rate>) -> Self {
        Self::new(rates)
    }
}
