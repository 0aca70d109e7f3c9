//! Compressed cost ledger of a rated event
//!
//! An [`EventCost`] stores the charges of an event as a sequence of
//! [`ChargingInterval`]s whose rating and accounting details live in
//! deduplication tables. Equal neighbouring intervals are folded into one
//! by raising its compress factor, so long calls at a flat rate stay small.
//!
//! The flat [`CallCost`] view is produced on demand by
//! [`EventCost::as_call_cost`] and converts back losslessly through
//! [`EventCost::from_call_cost`].

use crate::charging::{
    BalanceCharge, ChargedTiming, ChargingIncrement, ChargingInterval, RatingMatchedFilters,
    RatingUnit, META_NONE, META_PAUSE,
};
use crate::tables::{DedupTable, TableValue};
use apolo_core::models::AccountSummary;
use apolo_core::utils::{duration_nanos, scale, Rounding, RoundingMethod};
use apolo_core::{BillingError, BillingResult};
use apolo_rating::call_cost::META_VOICE;
use apolo_rating::{
    CallCost, DebitInfo, Increment, Increments, MonetaryInfo, RIRate, Rate, RateGroups,
    RateInterval, TimeSpan, TimeSpans, UnitInfo,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

fn dangling(table: &'static str, id: &str) -> BillingError {
    BillingError::DanglingReference {
        table,
        id: id.to_string(),
    }
}

/// Store `value` under `*pause` or deduplicated
fn set_in<T: TableValue>(table: &mut DedupTable<T>, value: T, is_pause: bool) -> String {
    if is_pause {
        table.insert(META_PAUSE, value);
        META_PAUSE.to_string()
    } else {
        table.get_id_with_set(value)
    }
}

/// Bring an entry of a foreign table into `own`, returning its local ID
fn import_entry<T: TableValue>(
    own: &mut DedupTable<T>,
    foreign: &DedupTable<T>,
    id: &str,
    table: &'static str,
) -> BillingResult<String> {
    if id.is_empty() {
        return Ok(String::new());
    }
    let value = foreign.get(id).ok_or_else(|| dangling(table, id))?;
    Ok(own.get_id_with_set(value.clone()))
}

fn copy_entry<T: TableValue>(own: &mut DedupTable<T>, foreign: &DedupTable<T>, id: &str) {
    if let Some(value) = foreign.get(id) {
        own.insert(id, value.clone());
    }
}

fn remap(id: &mut String, moved: &HashMap<String, String>) {
    if let Some(new_id) = moved.get(id.as_str()) {
        *id = new_id.clone();
    }
}

fn nanos(d: Duration) -> i64 {
    d.num_nanoseconds().unwrap_or(i64::MAX)
}

/// Split one repetition of an interval's increments after `need` usage.
///
/// The cut never falls inside a single increment: a compressed run is
/// divided between both sides and the kept side is rounded up to whole
/// increments.
fn split_increments(
    increments: &[ChargingIncrement],
    mut need: Duration,
) -> (Vec<ChargingIncrement>, Vec<ChargingIncrement>) {
    let mut head = Vec::new();
    let mut tail = Vec::new();
    for incr in increments {
        if need <= Duration::zero() {
            tail.push(incr.clone());
            continue;
        }
        let run = incr.total_usage();
        if run <= need {
            need = need - run;
            head.push(incr.clone());
            continue;
        }
        let unit = nanos(incr.usage).max(1);
        let cf = incr.get_compress_factor();
        let taken = u32::try_from(nanos(need).saturating_add(unit - 1) / unit).map_or(cf, |t| t.min(cf));
        let mut kept = incr.clone();
        kept.compress_factor = taken;
        head.push(kept);
        if taken < cf {
            let mut rest = incr.clone();
            rest.compress_factor = cf - taken;
            tail.push(rest);
        }
        need = Duration::zero();
    }
    (head, tail)
}

/// Cost of one event, charges plus the tables they reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCost {
    pub cgrid: String,
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(with = "duration_nanos::option", default)]
    usage: Option<Duration>,
    #[serde(default)]
    cost: Option<Decimal>,
    #[serde(default)]
    pub charges: Vec<ChargingInterval>,
    #[serde(default)]
    pub account_summary: Option<AccountSummary>,
    #[serde(default)]
    pub rating: DedupTable<RatingUnit>,
    #[serde(default)]
    pub accounting: DedupTable<BalanceCharge>,
    #[serde(default)]
    pub rating_filters: DedupTable<RatingMatchedFilters>,
    #[serde(default)]
    pub rates: DedupTable<RateGroups>,
    #[serde(default)]
    pub timings: DedupTable<ChargedTiming>,
}

impl EventCost {
    /// Empty ledger
    pub fn new_bare(cgrid: impl Into<String>, run_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            cgrid: cgrid.into(),
            run_id: run_id.into(),
            start_time,
            usage: None,
            cost: None,
            charges: Vec::new(),
            account_summary: None,
            rating: DedupTable::new(),
            accounting: DedupTable::new(),
            rating_filters: DedupTable::new(),
            rates: DedupTable::new(),
            timings: DedupTable::new(),
        }
    }

    /// Ledger of a single free `*pause` interval covering `usage`
    pub fn new_free(
        cgrid: impl Into<String>,
        run_id: impl Into<String>,
        account: &str,
        start_time: DateTime<Utc>,
        usage: Duration,
    ) -> Self {
        let mut ec = Self::new_bare(cgrid, run_id, start_time);
        ec.cost = Some(Decimal::ZERO);
        ec.rating.insert(
            META_PAUSE,
            RatingUnit {
                rounding_method: RoundingMethod::Up,
                rounding_decimals: 5,
                timing_id: META_PAUSE.into(),
                rates_id: META_PAUSE.into(),
                rating_filters_id: META_PAUSE.into(),
                ..Default::default()
            },
        );
        ec.accounting.insert(
            META_PAUSE,
            BalanceCharge {
                account_id: account.to_string(),
                rating_id: META_PAUSE.into(),
                ..Default::default()
            },
        );
        ec.rating_filters.insert(
            META_PAUSE,
            RatingMatchedFilters {
                rating_plan_id: META_PAUSE.into(),
                ..Default::default()
            },
        );
        ec.rates.insert(
            META_PAUSE,
            RateGroups::new(vec![Rate::new(
                Duration::zero(),
                Decimal::ZERO,
                Duration::nanoseconds(1),
                Duration::nanoseconds(1),
            )]),
        );
        ec.timings.insert(
            META_PAUSE,
            ChargedTiming {
                start_time: "00:00:00".into(),
                ..Default::default()
            },
        );
        ec.charges.push(ChargingInterval::new(
            META_PAUSE,
            vec![ChargingIncrement {
                usage,
                cost: Decimal::ZERO,
                accounting_id: META_PAUSE.into(),
                compress_factor: 1,
            }],
            1,
        ));
        ec
    }

    /// Build the compressed ledger from the flat timespan view
    pub fn from_call_cost(cc: &CallCost, cgrid: impl Into<String>, run_id: impl Into<String>) -> Self {
        let mut ec = Self::new_bare(cgrid, run_id, cc.start_time().unwrap_or_default());
        ec.account_summary = cc.account_summary.clone();
        for ts in cc.timespans.iter() {
            let filters = RatingMatchedFilters {
                subject: ts.matched_subject.clone(),
                destination_prefix_name: ts.matched_prefix.clone(),
                destination_id: ts.matched_dest_id.clone(),
                rating_plan_id: ts.rating_plan_id.clone(),
            };
            let is_pause = ts.rating_plan_id == META_PAUSE;
            let rating_id = ec.rating_id_for_rate_interval(ts.rate_interval.as_ref(), &filters, is_pause);
            let increments = ts
                .increments
                .iter()
                .map(|incr| ec.charging_increment(incr, &filters, is_pause))
                .collect();
            ec.charges
                .push(ChargingInterval::new(rating_id, increments, ts.get_compress_factor()));
        }
        ec
    }

    fn rating_id_for_rate_interval(
        &mut self,
        ri: Option<&RateInterval>,
        filters: &RatingMatchedFilters,
        is_pause: bool,
    ) -> String {
        let ri = match ri {
            Some(ri) => ri,
            None => return String::new(),
        };
        let rating_filters_id = set_in(&mut self.rating_filters, filters.clone(), is_pause);
        let timing_id = set_in(&mut self.timings, ChargedTiming::from(&ri.timing), is_pause);
        let rates_id = if ri.rating.rates.is_empty() {
            String::new()
        } else {
            set_in(&mut self.rates, ri.rating.rates.clone(), is_pause)
        };
        let unit = RatingUnit {
            connect_fee: ri.rating.connect_fee,
            rounding_method: ri.rating.rounding_method,
            rounding_decimals: ri.rating.rounding_decimals,
            max_cost: ri.rating.max_cost,
            max_cost_strategy: ri.rating.max_cost_strategy,
            timing_id,
            rates_id,
            rating_filters_id,
        };
        set_in(&mut self.rating, unit, is_pause)
    }

    fn charging_increment(
        &mut self,
        incr: &Increment,
        filters: &RatingMatchedFilters,
        is_pause: bool,
    ) -> ChargingIncrement {
        let mut charge = ChargingIncrement {
            usage: incr.duration,
            cost: incr.cost,
            accounting_id: String::new(),
            compress_factor: incr.get_compress_factor(),
        };
        let info = match &incr.balance_info {
            Some(info) => info,
            None => return charge,
        };
        if let Some(unit) = &info.unit {
            // dual balance: the unit charge points at the money it also took
            let extra_charge_id = match &info.monetary {
                Some(monetary) => {
                    let rating_id =
                        self.rating_id_for_rate_interval(monetary.rate_interval.as_ref(), filters, is_pause);
                    self.accounting.get_id_with_set(BalanceCharge {
                        account_id: info.account_id.clone(),
                        balance_uuid: monetary.uuid.clone(),
                        rating_id,
                        units: incr.cost,
                        extra_charge_id: String::new(),
                    })
                }
                None => META_NONE.to_string(),
            };
            let rating_id = self.rating_id_for_rate_interval(unit.rate_interval.as_ref(), filters, is_pause);
            let bc = BalanceCharge {
                account_id: info.account_id.clone(),
                balance_uuid: unit.uuid.clone(),
                rating_id,
                units: unit.consumed,
                extra_charge_id,
            };
            charge.accounting_id = set_in(&mut self.accounting, bc, is_pause);
        } else if let Some(monetary) = &info.monetary {
            let rating_id = self.rating_id_for_rate_interval(monetary.rate_interval.as_ref(), filters, is_pause);
            let bc = BalanceCharge {
                account_id: info.account_id.clone(),
                balance_uuid: monetary.uuid.clone(),
                rating_id,
                units: incr.cost,
                extra_charge_id: String::new(),
            };
            charge.accounting_id = set_in(&mut self.accounting, bc, is_pause);
        }
        charge
    }

    /// Rebuild the rate interval a rating unit was taken from
    pub fn rate_interval_for_rating_id(&self, rating_id: &str) -> Option<RateInterval> {
        let unit = self.rating.get(rating_id)?;
        let rates = self.rates.get(&unit.rates_id).cloned().unwrap_or_default();
        let timing = self
            .timings
            .get(&unit.timing_id)
            .map(|t| {
                let mut timing = t.to_timing();
                timing.id = unit.timing_id.clone();
                timing
            })
            .unwrap_or_default();
        Some(RateInterval {
            timing,
            rating: RIRate {
                connect_fee: unit.connect_fee,
                rounding_method: unit.rounding_method,
                rounding_decimals: unit.rounding_decimals,
                max_cost: unit.max_cost,
                max_cost_strategy: unit.max_cost_strategy,
                rates,
            },
            weight: 0.0,
        })
    }

    fn increment_from_charge(&self, charge: &ChargingIncrement) -> Increment {
        let mut incr = Increment {
            duration: charge.usage,
            cost: charge.cost,
            balance_info: None,
            compress_factor: charge.get_compress_factor(),
        };
        let bc = match self.accounting.get(&charge.accounting_id) {
            Some(bc) => bc,
            None => return incr,
        };
        let mut info = DebitInfo {
            account_id: bc.account_id.clone(),
            ..Default::default()
        };
        let is_unit_balance = self
            .account_summary
            .as_ref()
            .and_then(|s| s.balance_summary_with_uuid(&bc.balance_uuid))
            .is_some_and(|b| b.balance_type.is_unit());
        let mut extra = bc.extra_charge_id.as_str();
        if extra.is_empty() && is_unit_balance {
            extra = META_NONE;
        }
        let monetary = if extra.is_empty() {
            Some(bc)
        } else {
            info.unit = Some(UnitInfo {
                uuid: bc.balance_uuid.clone(),
                consumed: bc.units,
                rate_interval: self.rate_interval_for_rating_id(&bc.rating_id),
                ..Default::default()
            });
            if extra == META_NONE {
                None
            } else {
                self.accounting.get(extra)
            }
        };
        if let Some(m) = monetary {
            info.monetary = Some(MonetaryInfo {
                uuid: m.balance_uuid.clone(),
                rate_interval: self.rate_interval_for_rating_id(&m.rating_id),
                ..Default::default()
            });
        }
        incr.balance_info = Some(info);
        incr
    }

    /// Expand into the flat timespan view
    pub fn as_call_cost(&mut self, tor: &str, rounding: Rounding) -> CallCost {
        self.compute_usage_indexes();
        let ec_start = self.start_time;
        let mut timespans = Vec::with_capacity(self.charges.len());
        for idx in 0..self.charges.len() {
            let cil = &mut self.charges[idx];
            let time_start = cil.start_time(ec_start);
            let total_usage = cil.total_usage();
            let cost = cil.total_cost(rounding);

            let cil = &self.charges[idx];
            let mut ts = TimeSpan::new(time_start, time_start + total_usage);
            ts.cost = cost;
            ts.duration_index = cil.usage_index().unwrap_or_else(Duration::zero) + total_usage;
            ts.compress_factor = cil.get_compress_factor();
            if let Some(filters) = self
                .rating
                .get(&cil.rating_id)
                .and_then(|unit| self.rating_filters.get(&unit.rating_filters_id))
            {
                ts.matched_subject = filters.subject.clone();
                ts.matched_prefix = filters.destination_prefix_name.clone();
                ts.matched_dest_id = filters.destination_id.clone();
                ts.rating_plan_id = filters.rating_plan_id.clone();
            }
            ts.rate_interval = self.rate_interval_for_rating_id(&cil.rating_id);
            ts.increments = Increments(
                cil.increments
                    .iter()
                    .map(|c| self.increment_from_charge(c))
                    .collect(),
            );
            timespans.push(ts);
        }

        CallCost {
            tor: if tor.is_empty() { META_VOICE.to_string() } else { tor.to_string() },
            cost: self.get_cost(rounding),
            rated_usage: self.get_usage(),
            timespans: TimeSpans::from(timespans),
            account_summary: self.account_summary.clone(),
            ..Default::default()
        }
    }

    /// Total cost, rounded once over the interval totals
    pub fn get_cost(&mut self, rounding: Rounding) -> Decimal {
        if let Some(cost) = self.cost {
            return cost;
        }
        let total: Decimal = self.charges.iter_mut().map(|c| c.total_cost(rounding)).sum();
        let cost = rounding.round(total);
        self.cost = Some(cost);
        cost
    }

    pub fn get_usage(&mut self) -> Duration {
        if let Some(usage) = self.usage {
            return usage;
        }
        let usage = self
            .charges
            .iter_mut()
            .fold(Duration::zero(), |acc, c| acc + c.total_usage());
        self.usage = Some(usage);
        usage
    }

    /// Assign each interval the usage elapsed before it
    pub fn compute_usage_indexes(&mut self) {
        let mut elapsed = Duration::zero();
        for cil in self.charges.iter_mut() {
            if cil.ec_usage_idx.is_none() {
                cil.ec_usage_idx = Some(elapsed);
            }
            elapsed = elapsed + cil.total_usage();
        }
    }

    /// Fill every cache: usage, indexes and cost
    pub fn compute(&mut self, rounding: Rounding) {
        self.get_usage();
        self.compute_usage_indexes();
        self.get_cost(rounding);
    }

    pub fn reset_counters(&mut self) {
        self.cost = None;
        self.usage = None;
        for cil in self.charges.iter_mut() {
            cil.reset_counters();
        }
    }

    fn rating_id_from_event_cost(&mut self, other: &EventCost, rating_id: &str) -> BillingResult<String> {
        if rating_id.is_empty() {
            return Ok(String::new());
        }
        let mut unit = other
            .rating
            .get(rating_id)
            .ok_or_else(|| dangling("rating", rating_id))?
            .clone();
        if rating_id == META_PAUSE {
            copy_entry(&mut self.timings, &other.timings, &unit.timing_id);
            copy_entry(&mut self.rating_filters, &other.rating_filters, &unit.rating_filters_id);
            copy_entry(&mut self.rates, &other.rates, &unit.rates_id);
            self.rating.insert(META_PAUSE, unit);
            return Ok(META_PAUSE.to_string());
        }
        unit.timing_id = import_entry(&mut self.timings, &other.timings, &unit.timing_id, "timings")?;
        unit.rating_filters_id = import_entry(
            &mut self.rating_filters,
            &other.rating_filters,
            &unit.rating_filters_id,
            "rating_filters",
        )?;
        unit.rates_id = import_entry(&mut self.rates, &other.rates, &unit.rates_id, "rates")?;
        Ok(self.rating.get_id_with_set(unit))
    }

    fn accounting_id_from_event_cost(
        &mut self,
        other: &EventCost,
        accounting_id: &str,
        follow_extra: bool,
    ) -> BillingResult<String> {
        if accounting_id.is_empty() || accounting_id == META_NONE {
            return Ok(accounting_id.to_string());
        }
        let mut bc = other
            .accounting
            .get(accounting_id)
            .ok_or_else(|| dangling("accounting", accounting_id))?
            .clone();
        bc.rating_id = self.rating_id_from_event_cost(other, &bc.rating_id)?;
        if accounting_id == META_PAUSE {
            self.accounting.insert(META_PAUSE, bc);
            return Ok(META_PAUSE.to_string());
        }
        // extra charges are a single level deep
        bc.extra_charge_id = if follow_extra {
            self.accounting_id_from_event_cost(other, &bc.extra_charge_id, false)?
        } else {
            String::new()
        };
        Ok(self.accounting.get_id_with_set(bc))
    }

    /// Append `other.charges[idx]`, importing its table entries.
    ///
    /// When the last interval is partially equal to the imported one its
    /// compress factor absorbs it instead.
    pub fn append_charging_interval_from_event_cost(&mut self, other: &EventCost, idx: usize) -> BillingResult<()> {
        let incoming = other
            .charges
            .get(idx)
            .ok_or_else(|| BillingError::Internal(format!("no charging interval at index {idx}")))?;
        let rating_id = self.rating_id_from_event_cost(other, &incoming.rating_id)?;
        let mut increments = Vec::with_capacity(incoming.increments.len());
        for incr in &incoming.increments {
            let mut charge = incr.clone();
            charge.accounting_id = self.accounting_id_from_event_cost(other, &incr.accounting_id, true)?;
            increments.push(charge);
        }
        let cil = ChargingInterval::new(rating_id, increments, incoming.get_compress_factor());
        match self.charges.last_mut() {
            Some(last) if last.partially_equals(&cil) => {
                last.compress_factor = last.get_compress_factor() + cil.get_compress_factor();
            }
            _ => self.charges.push(cil),
        }
        self.reset_counters();
        Ok(())
    }

    /// Append the charges of temporally contiguous continuations of this event
    #[instrument(skip(self, others), fields(cgrid = %self.cgrid, run_id = %self.run_id))]
    pub fn merge(&mut self, others: impl IntoIterator<Item = EventCost>) -> BillingResult<()> {
        for mut other in others {
            if self.charges.is_empty() {
                self.start_time = other.start_time;
            }
            if let Some(mut summary) = other.account_summary.take() {
                if let Some(previous) = &self.account_summary {
                    summary.update_initial_value(previous);
                }
                self.account_summary = Some(summary);
            }
            for idx in 0..other.charges.len() {
                self.append_charging_interval_from_event_cost(&other, idx)?;
            }
        }
        self.reset_counters();
        debug!(charges = self.charges.len(), "event costs merged");
        Ok(())
    }

    /// Cut the ledger after `at` usage, returning the later part.
    ///
    /// Nothing is returned when `at` covers the whole usage. A zero `at`
    /// hands everything over and leaves the receiver empty.
    #[instrument(skip(self), fields(cgrid = %self.cgrid, run_id = %self.run_id))]
    pub fn trim(&mut self, at: Duration) -> BillingResult<Option<EventCost>> {
        if at < Duration::zero() {
            return Err(BillingError::Trim(format!("negative usage {at}")));
        }
        if at >= self.get_usage() {
            return Ok(None);
        }
        if at == Duration::zero() {
            let mut surplus = self.clone();
            surplus.reset_counters();
            let mut emptied = EventCost::new_bare(self.cgrid.clone(), self.run_id.clone(), self.start_time);
            emptied.account_summary = self.account_summary.clone();
            *self = emptied;
            return Ok(Some(surplus));
        }

        let mut kept: Vec<ChargingInterval> = Vec::new();
        let mut cut: Vec<ChargingInterval> = Vec::new();
        let mut elapsed = Duration::zero();
        for mut cil in std::mem::take(&mut self.charges) {
            cil.reset_counters();
            if elapsed >= at {
                cut.push(cil);
                continue;
            }
            let unit = cil.usage();
            let total = cil.total_usage();
            if elapsed + total <= at {
                elapsed = elapsed + total;
                kept.push(cil);
                continue;
            }

            let cf = cil.get_compress_factor();
            let whole = u32::try_from(nanos(at - elapsed) / nanos(unit).max(1)).map_or(cf, |w| w.min(cf));
            if whole > 0 {
                let mut head = cil.clone();
                head.compress_factor = whole;
                kept.push(head);
                elapsed = elapsed + scale(unit, whole);
            }
            let remaining = cf - whole;
            if elapsed == at {
                let mut tail = cil;
                tail.compress_factor = remaining;
                cut.push(tail);
                continue;
            }

            let (head_incrs, tail_incrs) = split_increments(&cil.increments, at - elapsed);
            let mut head = ChargingInterval::new(cil.rating_id.clone(), head_incrs, 1);
            elapsed = elapsed + head.usage();
            kept.push(head);
            if !tail_incrs.is_empty() {
                cut.push(ChargingInterval::new(cil.rating_id.clone(), tail_incrs, 1));
            }
            if remaining > 1 {
                let mut rest = cil;
                rest.compress_factor = remaining - 1;
                cut.push(rest);
            }
        }

        self.charges = kept;
        self.reset_counters();
        if cut.is_empty() {
            debug!(usage = ?self.get_usage(), "cut rounded up to the end of the event");
            return Ok(None);
        }

        let mut surplus = EventCost {
            start_time: self.start_time + self.get_usage(),
            usage: None,
            cost: None,
            charges: cut,
            ..self.clone()
        };
        surplus.remove_stale_references();
        self.remove_stale_references();
        surplus.reset_counters();
        debug!(kept = ?self.get_usage(), surplus = ?surplus.get_usage(), "event cost trimmed");
        Ok(Some(surplus))
    }

    /// Re-key every table entry equal to one in `reference` to its ID
    pub fn sync_keys(&mut self, reference: &EventCost) {
        let filters = self.rating_filters.rekey(&reference.rating_filters);
        let rates = self.rates.rekey(&reference.rates);
        let timings = self.timings.rekey(&reference.timings);
        for unit in self.rating.values_mut() {
            remap(&mut unit.rating_filters_id, &filters);
            remap(&mut unit.rates_id, &rates);
            remap(&mut unit.timing_id, &timings);
        }

        let ratings = self.rating.rekey(&reference.rating);
        for bc in self.accounting.values_mut() {
            remap(&mut bc.rating_id, &ratings);
        }

        // extra charges change content once their targets move, so match twice
        let first = self.accounting.rekey(&reference.accounting);
        for bc in self.accounting.values_mut() {
            remap(&mut bc.extra_charge_id, &first);
        }
        let second = self.accounting.rekey(&reference.accounting);
        for bc in self.accounting.values_mut() {
            remap(&mut bc.extra_charge_id, &second);
        }

        for cil in self.charges.iter_mut() {
            remap(&mut cil.rating_id, &ratings);
            for incr in cil.increments.iter_mut() {
                remap(&mut incr.accounting_id, &first);
                remap(&mut incr.accounting_id, &second);
            }
        }
    }

    /// Drop table entries no charge reaches any more
    pub fn remove_stale_references(&mut self) {
        let mut accounting: HashSet<String> = self
            .charges
            .iter()
            .flat_map(|cil| cil.increments.iter())
            .map(|incr| incr.accounting_id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        let extras: Vec<String> = accounting
            .iter()
            .filter_map(|id| self.accounting.get(id))
            .map(|bc| bc.extra_charge_id.clone())
            .collect();
        accounting.extend(extras);
        self.accounting.retain(|id| accounting.contains(id));

        let ratings: HashSet<String> = self
            .charges
            .iter()
            .map(|cil| cil.rating_id.clone())
            .chain(self.accounting.iter().map(|(_, bc)| bc.rating_id.clone()))
            .collect();
        self.rating.retain(|id| ratings.contains(id));

        let mut filters = HashSet::new();
        let mut rates = HashSet::new();
        let mut timings = HashSet::new();
        for (_, unit) in self.rating.iter() {
            filters.insert(unit.rating_filters_id.clone());
            rates.insert(unit.rates_id.clone());
            timings.insert(unit.timing_id.clone());
        }
        self.rating_filters.retain(|id| filters.contains(id));
        self.rates.retain(|id| rates.contains(id));
        self.timings.retain(|id| timings.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apolo_core::models::{BalanceSummary, BalanceType};
    use apolo_core::RatingConfig;
    use apolo_rating::{CallDescriptor, RITiming, RatingInfo};
    use chrono::{TimeZone, Weekday};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    fn per_second(price: Decimal, connect_fee: Decimal) -> RIRate {
        let mut rating = RIRate::new(RateGroups::new(vec![Rate::new(
            Duration::zero(),
            price,
            Duration::seconds(1),
            Duration::seconds(1),
        )]));
        rating.connect_fee = connect_fee;
        rating
    }

    fn rated_friday_night() -> CallCost {
        let weekday_evening = RateInterval::new(
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
            per_second(dec!(0.01), dec!(0.5)),
            10.0,
        );
        let weekend = RateInterval::new(
            RITiming {
                week_days: vec![Weekday::Sat, Weekday::Sun],
                ..Default::default()
            },
            per_second(dec!(0.02), Decimal::ZERO),
            10.0,
        );
        let mut cd = CallDescriptor::new(
            "cgrates.org",
            "1001",
            "0256",
            at(2012, 2, 3, 23, 45, 0),
            at(2012, 2, 4, 0, 10, 0),
        );
        cd.add_rating_info(RatingInfo {
            matched_subject: "*out:cgrates.org:call:1001".into(),
            matched_prefix: "0256".into(),
            matched_dest_id: "RET".into(),
            rating_plan_id: "RP_RETAIL".into(),
            activation_time: at(2012, 1, 1, 0, 0, 0),
            rate_intervals: vec![weekday_evening, weekend],
            fallback_keys: vec![],
        });
        cd.get_cost(Rounding::default()).unwrap()
    }

    fn voice_interval() -> RateInterval {
        RateInterval::new(RITiming::default(), per_second(dec!(0.01), Decimal::ZERO), 0.0)
    }

    fn debited_call() -> CallCost {
        let start = at(2017, 1, 9, 16, 18, 21);
        let mut ts = TimeSpan::new(start, start + Duration::seconds(90));
        ts.rate_interval = Some(voice_interval());
        ts.rating_plan_id = "RP_1001".into();
        ts.matched_subject = "*out:cgrates.org:call:1001".into();
        ts.cost = dec!(0.3);
        let voice = DebitInfo {
            account_id: "cgrates.org:1001".into(),
            unit: Some(UnitInfo {
                uuid: "voice-b1".into(),
                consumed: dec!(1),
                rate_interval: Some(voice_interval()),
                ..Default::default()
            }),
            monetary: Some(MonetaryInfo {
                uuid: "money-b1".into(),
                rate_interval: Some(voice_interval()),
                ..Default::default()
            }),
        };
        let money = DebitInfo {
            account_id: "cgrates.org:1001".into(),
            monetary: Some(MonetaryInfo {
                uuid: "money-b1".into(),
                rate_interval: Some(voice_interval()),
                ..Default::default()
            }),
            ..Default::default()
        };
        ts.increments = Increments(vec![
            Increment {
                duration: Duration::seconds(1),
                cost: dec!(0.0),
                balance_info: Some(voice),
                compress_factor: 60,
            },
            Increment {
                duration: Duration::seconds(1),
                cost: dec!(0.01),
                balance_info: Some(money),
                compress_factor: 30,
            },
        ]);
        CallCost {
            tor: META_VOICE.into(),
            cost: dec!(0.3),
            rated_usage: Duration::seconds(90),
            timespans: TimeSpans::from(vec![ts]),
            account_summary: Some(AccountSummary {
                tenant: "cgrates.org".into(),
                id: "1001".into(),
                balance_summaries: vec![
                    BalanceSummary {
                        uuid: "voice-b1".into(),
                        balance_type: BalanceType::Voice,
                        initial: dec!(60),
                        ..Default::default()
                    },
                    BalanceSummary {
                        uuid: "money-b1".into(),
                        balance_type: BalanceType::Monetary,
                        initial: dec!(10),
                        value: dec!(9.7),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn increment(secs: i64, cost: Decimal, accounting_id: &str, cf: u32) -> ChargingIncrement {
        ChargingIncrement {
            usage: Duration::seconds(secs),
            cost,
            accounting_id: accounting_id.into(),
            compress_factor: cf,
        }
    }

    /// Ledger with one rating unit and one monetary balance charge
    fn ledger(shape: &[(u32, Vec<u32>)]) -> EventCost {
        let mut ec = EventCost::new_bare("cgrid", "*default", at(2017, 1, 9, 16, 18, 21));
        ec.rating.insert(
            "R1",
            RatingUnit {
                rounding_decimals: 4,
                rates_id: "RT1".into(),
                ..Default::default()
            },
        );
        ec.rates.insert("RT1", per_second(dec!(0.01), Decimal::ZERO).rates);
        ec.accounting.insert(
            "A1",
            BalanceCharge {
                account_id: "cgrates.org:1001".into(),
                balance_uuid: "money-b1".into(),
                rating_id: "R1".into(),
                units: dec!(0.01),
                ..Default::default()
            },
        );
        for (cf, runs) in shape {
            let increments = runs.iter().map(|n| increment(1, dec!(0.01), "A1", *n)).collect();
            ec.charges.push(ChargingInterval::new("R1", increments, *cf));
        }
        ec
    }

    #[test]
    fn test_call_cost_round_trip() {
        let cc = rated_friday_night();
        let mut ec = EventCost::from_call_cost(&cc, "cgrid", "*default");
        assert_eq!(ec.charges.len(), 2);
        assert_eq!(ec.start_time, at(2012, 2, 3, 23, 45, 0));
        assert_eq!(ec.get_cost(Rounding::default()), dec!(21.5));
        assert_eq!(ec.get_usage(), Duration::minutes(25));
        assert_eq!(ec.rating_filters.len(), 1);

        let back = ec.as_call_cost("", Rounding::default());
        assert_eq!(back.tor, META_VOICE);
        assert_eq!(back.cost, cc.cost);
        assert_eq!(back.rated_usage, cc.rated_usage);
        assert_eq!(back.timespans.len(), cc.timespans.len());
        for (got, want) in back.timespans.iter().zip(cc.timespans.iter()) {
            assert_eq!(got.time_start, want.time_start);
            assert_eq!(got.time_end, want.time_end);
            assert_eq!(got.cost, want.cost);
            assert_eq!(got.rating_plan_id, "RP_RETAIL");
            assert_eq!(got.matched_dest_id, "RET");
            assert_eq!(
                got.rate_interval.as_ref().map(|ri| &ri.rating.rates),
                want.rate_interval.as_ref().map(|ri| &ri.rating.rates)
            );
            assert_eq!(got.increments.len(), want.increments.len());
            for (gi, wi) in got.increments.iter().zip(want.increments.iter()) {
                assert_eq!(gi.duration, wi.duration);
                assert_eq!(gi.cost, wi.cost);
                assert_eq!(gi.compress_factor, wi.compress_factor);
            }
        }
        assert_eq!(back.timespans[1].duration_index, Duration::minutes(25));
    }

    #[test]
    fn test_balance_attribution_round_trip() {
        let cc = debited_call();
        let mut ec = EventCost::from_call_cost(&cc, "cgrid", "*default");
        // voice charge, its monetary extra, plain monetary charge
        assert_eq!(ec.accounting.len(), 3);
        assert_eq!(ec.rating.len(), 1);
        let voice_id = &ec.charges[0].increments[0].accounting_id;
        let voice_bc = ec.accounting.get(voice_id).unwrap();
        assert_eq!(voice_bc.units, dec!(1));
        assert!(voice_bc.has_extra_charge());
        let extra = ec.accounting.get(&voice_bc.extra_charge_id).unwrap();
        assert_eq!(extra.balance_uuid, "money-b1");
        assert_eq!(extra.units, dec!(0.0));

        let back = ec.as_call_cost(META_VOICE, Rounding::default());
        assert_eq!(back.cost, dec!(0.3));
        assert_eq!(back.rated_usage, Duration::seconds(90));
        let incrs = &back.timespans[0].increments;
        let voice = incrs[0].balance_info.as_ref().unwrap();
        assert_eq!(voice.account_id, "cgrates.org:1001");
        let unit = voice.unit.as_ref().unwrap();
        assert_eq!(unit.uuid, "voice-b1");
        assert_eq!(unit.consumed, dec!(1));
        assert_eq!(voice.monetary.as_ref().unwrap().uuid, "money-b1");
        let money = incrs[1].balance_info.as_ref().unwrap();
        assert!(money.unit.is_none());
        assert_eq!(money.monetary.as_ref().unwrap().uuid, "money-b1");
        assert_eq!(
            money
                .monetary
                .as_ref()
                .and_then(|m| m.rate_interval.as_ref())
                .map(|ri| &ri.rating.rates),
            Some(&voice_interval().rating.rates)
        );
    }

    #[test]
    fn test_unit_only_charge_uses_account_summary() {
        let mut cc = debited_call();
        if let Some(bi) = cc.timespans[0].increments[0].balance_info.as_mut() {
            bi.monetary = None;
        }
        let mut ec = EventCost::from_call_cost(&cc, "cgrid", "*default");
        let voice_id = ec.charges[0].increments[0].accounting_id.clone();
        // an empty extra charge would otherwise read as monetary
        if let Some(bc) = ec.accounting.values_mut().find(|bc| bc.balance_uuid == "voice-b1") {
            bc.extra_charge_id.clear();
        }
        assert!(ec.accounting.get(&voice_id).is_some());
        let back = ec.as_call_cost(META_VOICE, Rounding::default());
        let voice = back.timespans[0].increments[0].balance_info.as_ref().unwrap();
        assert_eq!(voice.unit.as_ref().map(|u| u.uuid.as_str()), Some("voice-b1"));
        assert!(voice.monetary.is_none());
    }

    #[test]
    fn test_new_free() {
        let start = at(2017, 1, 9, 16, 18, 21);
        let mut ec = EventCost::new_free("cgrid", "*default", "cgrates.org:1001", start, Duration::minutes(5));
        assert_eq!(ec.get_cost(Rounding::default()), Decimal::ZERO);
        assert_eq!(ec.get_usage(), Duration::minutes(5));
        let cc = ec.as_call_cost(META_VOICE, Rounding::default());
        assert_eq!(cc.timespans.len(), 1);
        assert_eq!(cc.timespans[0].rating_plan_id, META_PAUSE);
        assert_eq!(cc.timespans[0].time_end, start + Duration::minutes(5));
        let bi = cc.timespans[0].increments[0].balance_info.as_ref().unwrap();
        assert_eq!(bi.account_id, "cgrates.org:1001");
    }

    #[test]
    fn test_configured_rounding_applies_to_totals() {
        let mut config = RatingConfig::default();
        config.general.rounding_decimals = 2;

        let mut ec = ledger(&[(1, vec![3])]);
        ec.charges[0].increments[0].cost = dec!(0.0123456);
        assert_eq!(ec.get_cost(config.rounding()), dec!(0.04));
        assert_eq!(ec.as_call_cost(META_VOICE, config.rounding()).cost, dec!(0.04));

        ec.reset_counters();
        assert_eq!(ec.get_cost(RatingConfig::default().rounding()), dec!(0.03704));
    }

    #[test]
    fn test_compute_and_usage_indexes() {
        let mut ec = ledger(&[(2, vec![30]), (1, vec![10, 20])]);
        ec.compute(Rounding::default());
        assert_eq!(ec.get_usage(), Duration::seconds(90));
        assert_eq!(ec.get_cost(Rounding::default()), dec!(0.9));
        assert_eq!(ec.charges[0].usage_index(), Some(Duration::zero()));
        assert_eq!(ec.charges[1].usage_index(), Some(Duration::seconds(60)));
        assert_eq!(
            ec.charges[1].start_time(ec.start_time),
            at(2017, 1, 9, 16, 19, 21)
        );

        ec.charges[1].compress_factor = 3;
        assert_eq!(ec.get_usage(), Duration::seconds(90));
        ec.reset_counters();
        assert_eq!(ec.get_usage(), Duration::seconds(150));
        assert_eq!(ec.charges[1].usage_index(), None);
    }

    #[test]
    fn test_merge_compresses_equal_intervals() {
        let start = at(2017, 1, 9, 16, 18, 21);
        let mut ec = EventCost::new_free("cgrid", "*default", "cgrates.org:1001", start, Duration::seconds(10));
        ec.account_summary = debited_call().account_summary;

        let second = EventCost::new_free(
            "cgrid",
            "*default",
            "cgrates.org:1001",
            start + Duration::seconds(10),
            Duration::seconds(10),
        );
        let mut third = EventCost::from_call_cost(&debited_call(), "cgrid", "*default");
        if let Some(summary) = third.account_summary.as_mut() {
            summary.balance_summaries.retain(|b| b.uuid == "money-b1");
            summary.balance_summaries[0].initial = dec!(9.7);
        }

        ec.merge(vec![second, third]).unwrap();
        assert_eq!(ec.charges.len(), 2);
        assert_eq!(ec.charges[0].rating_id, META_PAUSE);
        assert_eq!(ec.charges[0].compress_factor, 2);
        assert_eq!(ec.get_usage(), Duration::seconds(110));
        assert_eq!(ec.get_cost(Rounding::default()), dec!(0.3));

        let summary = ec.account_summary.as_ref().unwrap();
        // initial carried from the first ledger, expired voice balance kept
        assert_eq!(summary.balance_summary_with_uuid("money-b1").unwrap().initial, dec!(10));
        assert_eq!(summary.balance_summary_with_uuid("voice-b1").unwrap().value, Decimal::ZERO);

        for cil in &ec.charges {
            assert!(cil.rating_id.is_empty() || ec.rating.contains_key(&cil.rating_id));
            for incr in &cil.increments {
                assert!(ec.accounting.contains_key(&incr.accounting_id));
            }
        }
    }

    #[test]
    fn test_merge_rejects_dangling_reference() {
        let mut ec = ledger(&[(1, vec![10])]);
        let mut other = ledger(&[(1, vec![5])]);
        other.rating.remove("R1");
        let err = ec.merge(vec![other]).unwrap_err();
        assert_eq!(err.error_code(), "dangling_reference");
    }

    #[test]
    fn test_trim_inside_compressed_run() {
        let mut ec = ledger(&[(3, vec![10, 20]), (1, vec![5])]);
        let start = ec.start_time;
        let surplus = ec.trim(Duration::seconds(75)).unwrap().unwrap();

        assert_eq!(ec.get_usage(), Duration::seconds(75));
        assert_eq!(ec.charges.len(), 2);
        assert_eq!(ec.charges[0].compress_factor, 2);
        assert_eq!(ec.charges[1].increments, vec![increment(1, dec!(0.01), "A1", 10), increment(1, dec!(0.01), "A1", 5)]);

        assert_eq!(surplus.start_time, start + Duration::seconds(75));
        let mut surplus = surplus;
        assert_eq!(surplus.get_usage(), Duration::seconds(20));
        assert_eq!(surplus.charges[0].increments, vec![increment(1, dec!(0.01), "A1", 15)]);
        assert_eq!(surplus.charges.len(), 2);
        assert!(surplus.rating.contains_key("R1"));
        assert!(surplus.accounting.contains_key("A1"));
        assert_eq!(
            ec.get_cost(Rounding::default()) + surplus.get_cost(Rounding::default()),
            dec!(0.95)
        );
    }

    #[test]
    fn test_trim_rounds_up_to_increment() {
        let mut ec = ledger(&[]);
        ec.charges.push(ChargingInterval::new(
            "R1",
            vec![increment(60, dec!(0.6), "A1", 3)],
            1,
        ));
        let mut surplus = ec.trim(Duration::seconds(90)).unwrap().unwrap();
        assert_eq!(ec.get_usage(), Duration::seconds(120));
        assert_eq!(surplus.get_usage(), Duration::seconds(60));
    }

    #[test]
    fn test_trim_bounds() {
        let mut ec = ledger(&[(2, vec![30])]);
        let before = ec.clone();
        assert!(ec.trim(Duration::seconds(60)).unwrap().is_none());
        assert!(ec.trim(Duration::seconds(61)).unwrap().is_none());

        let surplus = ec.trim(Duration::zero()).unwrap().unwrap();
        assert_eq!(surplus, before);
        assert!(ec.charges.is_empty());
        assert!(ec.rating.is_empty());
        assert_eq!(ec.cgrid, "cgrid");
        assert_eq!(ec.get_usage(), Duration::zero());

        assert_eq!(ec.trim(Duration::seconds(-1)).unwrap_err().error_code(), "trim_failed");
    }

    #[test]
    fn test_sync_keys() {
        let cc = debited_call();
        let reference = EventCost::from_call_cost(&cc, "cgrid", "*default");
        let mut ec = EventCost::from_call_cost(&cc, "cgrid", "*default");
        ec.sync_keys(&reference);
        assert_eq!(ec, reference);
    }

    #[test]
    fn test_remove_stale_references() {
        let mut ec = ledger(&[(1, vec![10])]);
        ec.rating.insert("R_OLD", RatingUnit::default());
        ec.rates.insert("RT_OLD", RateGroups::default());
        ec.timings.insert("T_OLD", ChargedTiming::default());
        ec.accounting.insert(
            "A_OLD",
            BalanceCharge {
                rating_id: "R_OLD".into(),
                ..Default::default()
            },
        );
        ec.rating_filters.insert("F_OLD", RatingMatchedFilters::default());

        ec.remove_stale_references();
        assert_eq!(ec.rating.len(), 1);
        assert_eq!(ec.accounting.len(), 1);
        assert_eq!(ec.rates.len(), 1);
        assert!(ec.timings.is_empty());
        assert!(ec.rating_filters.is_empty());
    }

    #[test]
    fn test_caches_are_not_serialized_inside_intervals() {
        let mut ec = ledger(&[(2, vec![30])]);
        ec.compute(Rounding::default());
        let json = serde_json::to_string(&ec).unwrap();
        let mut decoded: EventCost = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.charges[0].usage_index(), None);
        assert_eq!(decoded.get_usage(), Duration::seconds(60));
        assert_eq!(decoded, ec);
    }

    proptest! {
        #[test]
        fn prop_trim_splits_usage_and_cost(
            shape in proptest::collection::vec(
                (1u32..4, proptest::collection::vec(1u32..10, 1..4)),
                1..5,
            ),
            cut in 0i64..200,
        ) {
            let mut ec = ledger(&shape);
            let total = ec.get_usage();
            let cost = ec.get_cost(Rounding::default());
            let at = Duration::seconds(cut);
            match ec.trim(at).unwrap() {
                None => prop_assert!(at >= total),
                Some(mut surplus) => {
                    prop_assert!(at < total);
                    prop_assert_eq!(ec.get_usage(), at);
                    prop_assert_eq!(ec.get_usage() + surplus.get_usage(), total);
                    prop_assert_eq!(
                        ec.get_cost(Rounding::default()) + surplus.get_cost(Rounding::default()),
                        cost
                    );
                    prop_assert_eq!(surplus.start_time, ec.start_time + at);
                }
            }
        }
    }
}
