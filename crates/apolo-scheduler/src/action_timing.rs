//! Recurring execution of an action list against a set of accounts

use crate::context::{ActionReport, ExecutionContext, ReportChannels};
use apolo_cache::keys::{account_key, actions_key};
use apolo_core::models::action::{is_account_action, sort_actions, META_REMOVE_ACCOUNT};
use apolo_core::models::{Account, Action, BalanceFilter};
use apolo_core::traits::{CacheService, EventMap};
use apolo_core::utils::time::{add_months, days_in_month, parse_duration, parse_time_detect_layout};
use apolo_core::{BillingError, BillingResult};
use apolo_rating::{RITiming, RateInterval};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Timing ID of monthly schedules that fall back to the month's last day
pub const META_MONTHLY_ESTIMATED: &str = "*monthly_estimated";

/// Name of the event published after every execution
pub const ACTION_TIMING_FIRED: &str = "ACTION_TIMING_FIRED";

/// One schedule entry of an action plan.
///
/// Unscheduled until [`ActionTiming::get_next_start_time`] caches the next
/// firing instant; every [`ActionTiming::execute`] drops the cache again,
/// except for one-shot `+duration` timings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionTiming {
    pub uuid: String,
    /// Recurrence. Cleared when the action list references an unknown type
    #[serde(default)]
    pub timing: Option<RateInterval>,
    pub actions_id: String,
    #[serde(default)]
    pub extra_data: Value,
    #[serde(default)]
    pub weight: f64,
    #[serde(skip)]
    actions: Option<Vec<Action>>,
    #[serde(skip)]
    account_ids: BTreeSet<String>,
    #[serde(skip)]
    action_plan_id: String,
    #[serde(skip)]
    st_cache: Option<DateTime<Utc>>,
}

impl ActionTiming {
    pub fn new(timing: RITiming, actions_id: impl Into<String>, weight: f64) -> Self {
        Self {
            uuid: Uuid::now_v7().to_string(),
            timing: Some(RateInterval {
                timing,
                ..Default::default()
            }),
            actions_id: actions_id.into(),
            weight,
            ..Default::default()
        }
    }

    pub fn account_ids(&self) -> &BTreeSet<String> {
        &self.account_ids
    }

    pub fn set_account_ids(&mut self, ids: impl IntoIterator<Item = String>) {
        self.account_ids = ids.into_iter().collect();
    }

    pub fn remove_account_id(&mut self, id: &str) -> bool {
        self.account_ids.remove(id)
    }

    pub fn action_plan_id(&self) -> &str {
        &self.action_plan_id
    }

    pub fn set_action_plan_id(&mut self, id: impl Into<String>) {
        self.action_plan_id = id.into();
    }

    /// Preload the action list, skipping the repository on execution
    pub fn set_actions(&mut self, mut actions: Vec<Action>) {
        sort_actions(&mut actions);
        self.actions = Some(actions);
    }

    pub fn is_asap(&self) -> bool {
        self.timing.as_ref().map_or(false, |ri| ri.timing.is_asap())
    }

    fn is_one_shot(&self) -> bool {
        self.timing
            .as_ref()
            .map_or(false, |ri| ri.timing.start_time.starts_with('+'))
    }

    pub fn cached_start_time(&self) -> Option<DateTime<Utc>> {
        self.st_cache
    }

    /// Next firing instant at or after `now`, cached until reset.
    ///
    /// `None` when there is no timing or the pattern never fires again.
    /// Normalizes the timing in place first: a blank start becomes
    /// midnight, years without months fire in January and months without
    /// days fire on the 1st.
    pub fn get_next_start_time(&mut self, now: DateTime<Utc>) -> BillingResult<Option<DateTime<Utc>>> {
        if let Some(cached) = self.st_cache {
            return Ok(Some(cached));
        }
        let Some(rate_interval) = self.timing.as_mut() else {
            return Ok(None);
        };
        let timing = &mut rate_interval.timing;

        let next = if let Some(rel) = timing.start_time.strip_prefix('+') {
            Some(now + parse_duration(rel)?)
        } else if timing.is_asap() {
            Some(now)
        } else {
            normalize(timing);
            if timing.id == META_MONTHLY_ESTIMATED {
                monthly_estimated(timing, now)
            } else {
                next_occurrence(timing, now)?
            }
        };

        self.st_cache = next;
        Ok(next)
    }

    pub fn reset_start_time_cache(&mut self) {
        if !self.is_one_shot() {
            self.st_cache = None;
        }
    }

    /// One task per target account, or a single accountless task
    pub fn tasks(&self) -> Vec<Task> {
        if self.account_ids.is_empty() {
            return vec![Task {
                uuid: self.uuid.clone(),
                actions_id: self.actions_id.clone(),
                account_id: None,
            }];
        }
        self.account_ids
            .iter()
            .map(|id| Task {
                uuid: self.uuid.clone(),
                actions_id: self.actions_id.clone(),
                account_id: Some(id.clone()),
            })
            .collect()
    }

    /// Run the action list against every target account.
    ///
    /// Each account is processed under its own guard and persisted only if
    /// all its actions succeeded and none removed it. An unregistered
    /// action type also clears the timing so it never fires again. Returns
    /// [`BillingError::PartiallyExecuted`] if any account's run aborted.
    #[instrument(skip(self, ctx, reports), fields(uuid = %self.uuid, actions_id = %self.actions_id))]
    pub async fn execute(
        &mut self,
        ctx: &ExecutionContext,
        reports: Option<&ReportChannels>,
    ) -> BillingResult<()> {
        self.reset_start_time_cache();

        let mut actions = match self.load_actions(ctx).await {
            Ok(actions) => actions,
            Err(e) => {
                error!("Failed to load actions {}: {}", self.actions_id, e);
                return Err(e);
            }
        };
        let now = Utc::now();
        let mut last_error = None;

        if self.account_ids.is_empty() {
            if let Err(e) = self.run_actions(ctx, None, None, &mut actions, now, reports).await {
                last_error = Some(e);
            }
        } else {
            let account_ids: Vec<String> = self.account_ids.iter().cloned().collect();
            for account_id in &account_ids {
                let run = self.run_for_account(ctx, account_id, &mut actions, now, reports);
                match ctx.guardian.guard(&account_key(account_id), run).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => last_error = Some(e),
                    Err(e) => warn!("Skipping account {}: {}", account_id, e),
                }
            }
        }

        self.publish_fired(ctx).await;

        match last_error {
            None => {
                info!("Action timing {} executed", self.uuid);
                Ok(())
            }
            Some(e) => Err(BillingError::PartiallyExecuted {
                uuid: self.uuid.clone(),
                last_error: e.to_string(),
            }),
        }
    }

    async fn load_actions(&mut self, ctx: &ExecutionContext) -> BillingResult<Vec<Action>> {
        if let Some(actions) = &self.actions {
            return Ok(actions.clone());
        }

        let key = actions_key(&self.actions_id);
        let cached = match ctx.cache.get::<Vec<Action>>(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache error for actions {}: {}", self.actions_id, e);
                None
            }
        };

        let mut actions = match cached {
            Some(actions) => actions,
            None => {
                debug!("Actions cache MISS for {}", self.actions_id);
                let loaded = ctx.actions.get_actions(&self.actions_id).await?;
                let ttl = ctx.config.scheduler.actions_cache_ttl_secs;
                if let Err(e) = ctx.cache.set(&key, &loaded, ttl).await {
                    warn!("Failed to cache actions {}: {}", self.actions_id, e);
                }
                loaded
            }
        };

        sort_actions(&mut actions);
        self.actions = Some(actions.clone());
        Ok(actions)
    }

    async fn run_for_account(
        &mut self,
        ctx: &ExecutionContext,
        account_id: &str,
        actions: &mut [Action],
        now: DateTime<Utc>,
        reports: Option<&ReportChannels>,
    ) -> BillingResult<()> {
        let mut account = match ctx.accounts.get_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                debug!("Account {} not found, starting empty", account_id);
                Account::new(account_id)
            }
            Err(e) => {
                warn!("Could not load account {}: {}", account_id, e);
                return Ok(());
            }
        };

        let removed = self
            .run_actions(ctx, Some(&mut account), Some(account_id), actions, now, reports)
            .await?;
        if removed {
            debug!("Account {} removed, not persisting", account_id);
            return Ok(());
        }

        ctx.accounts.set_account(&account).await.map_err(|e| {
            error!("Failed to persist account {}: {}", account_id, e);
            e
        })
    }

    /// Run `actions` in order, stopping at the first failure.
    ///
    /// Returns whether a remove-account action ran.
    async fn run_actions(
        &mut self,
        ctx: &ExecutionContext,
        mut account: Option<&mut Account>,
        account_id: Option<&str>,
        actions: &mut [Action],
        now: DateTime<Utc>,
        reports: Option<&ReportChannels>,
    ) -> BillingResult<bool> {
        let mut removed = false;

        for idx in 0..actions.len() {
            match account.as_deref() {
                Some(acc) if !actions[idx].filters.is_empty() => {
                    let tenant = acc.id.split_once(':').map_or("", |(tenant, _)| tenant);
                    match ctx.filter.pass(tenant, &actions[idx].filters, acc).await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!("Action {} filtered out for {}", actions[idx].id, acc.id);
                            continue;
                        }
                        Err(e) => {
                            error!("Filter check failed for action {}: {}", actions[idx].id, e);
                            self.report_failed(reports, account_id, &actions[idx..], &e).await;
                            return Err(e);
                        }
                    }
                }
                Some(_) => {}
                None if is_account_action(&actions[idx].action_type) => {
                    debug!("Skipping account action {} without account", actions[idx].id);
                    continue;
                }
                None => {}
            }

            apply_expiration(&mut actions[idx], &ctx.config.general.default_timezone, now);

            let action = &actions[idx];
            let Some(handler) = ctx.registry.get(&action.action_type) else {
                error!(
                    "Action type {} not registered, disabling timing {}",
                    action.action_type, self.uuid
                );
                self.timing = None;
                let e = BillingError::ActionNotRegistered(action.action_type.clone());
                self.report_failed(reports, account_id, &actions[idx..], &e).await;
                return Err(e);
            };

            if let Err(e) = handler
                .execute(account.as_deref_mut(), action, actions, &self.extra_data)
                .await
            {
                error!("Action {} ({}) failed: {:#}", action.id, action.action_type, e);
                let e = BillingError::ActionFailed {
                    action_type: action.action_type.clone(),
                    reason: format!("{:#}", e),
                };
                self.report_failed(reports, account_id, &actions[idx..], &e).await;
                return Err(e);
            }

            self.report(reports, account_id, action, None).await;
            if action.action_type == META_REMOVE_ACCOUNT {
                removed = true;
            }
        }

        Ok(removed)
    }

    async fn report(
        &self,
        reports: Option<&ReportChannels>,
        account_id: Option<&str>,
        action: &Action,
        error: Option<String>,
    ) {
        let Some(channels) = reports else {
            return;
        };
        let failed = error.is_some();
        let report = ActionReport {
            action_timing_uuid: self.uuid.clone(),
            account_id: account_id.map(str::to_string),
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
            error,
        };
        let sent = if failed {
            channels.failed(report).await
        } else {
            channels.success(report).await
        };
        if let Err(e) = sent {
            warn!("Dropping report for action {}: {}", action.id, e);
        }
    }

    // The failing action and every one after it
    async fn report_failed(
        &self,
        reports: Option<&ReportChannels>,
        account_id: Option<&str>,
        remaining: &[Action],
        e: &BillingError,
    ) {
        for action in remaining {
            self.report(reports, account_id, action, Some(e.to_string()))
                .await;
        }
    }

    async fn publish_fired(&self, ctx: &ExecutionContext) {
        let Some(publisher) = &ctx.publisher else {
            return;
        };
        let mut event = EventMap::new();
        event.insert("EventName".to_string(), json!(ACTION_TIMING_FIRED));
        event.insert("Uuid".to_string(), json!(self.uuid));
        event.insert("Id".to_string(), json!(self.action_plan_id));
        event.insert("ActionIds".to_string(), json!(self.actions_id));
        publisher.publish(event).await;
    }
}

fn normalize(timing: &mut RITiming) {
    if timing.start_time.is_empty() {
        timing.start_time = "00:00:00".to_string();
    }
    if !timing.years.is_empty() && timing.months.is_empty() {
        timing.months = vec![1];
    }
    if !timing.months.is_empty() && timing.month_days.is_empty() {
        timing.month_days = vec![1];
    }
}

fn next_occurrence(timing: &RITiming, now: DateTime<Utc>) -> BillingResult<Option<DateTime<Utc>>> {
    let schedule = Schedule::from_str(&timing.cron_string())?;
    // `after` is exclusive; step back a second to include `now` itself.
    // Firings are whole seconds, so with a fractional `now` the truncated
    // second is already in the past.
    let from = now.with_nanosecond(0).unwrap_or(now) - Duration::seconds(1);
    Ok(schedule
        .after(&from)
        .find(|t| *t >= now && timing.matches_month_day(*t)))
}

/// First monthly firing at or after `now`, clamping the target day to the
/// month's length instead of skipping short months
fn monthly_estimated(timing: &RITiming, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let target = u32::try_from(*timing.month_days.first()?).ok()?.max(1);
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()?;
    (0..=12).find_map(|offset| {
        let month = add_months(month_start, offset);
        let day = target.min(days_in_month(month));
        let candidate = timing.left_margin(month.with_day(day)?);
        (candidate >= now).then_some(candidate)
    })
}

fn apply_expiration(action: &mut Action, tz: &str, now: DateTime<Utc>) {
    if action.expiration_string.is_empty() {
        return;
    }
    match parse_time_detect_layout(&action.expiration_string, tz, now) {
        Ok(expiration) => {
            action
                .balance
                .get_or_insert_with(BalanceFilter::default)
                .expiration_date = expiration;
        }
        Err(e) => warn!(
            "Invalid expiration {:?} on action {}: {}",
            action.expiration_string, action.id, e
        ),
    }
}

/// A single-account slice of an action timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: String,
    pub actions_id: String,
    /// `None` runs the accountless actions
    pub account_id: Option<String>,
}

impl Task {
    pub async fn execute(
        &self,
        ctx: &ExecutionContext,
        reports: Option<&ReportChannels>,
    ) -> BillingResult<()> {
        let mut at = ActionTiming {
            uuid: self.uuid.clone(),
            actions_id: self.actions_id.clone(),
            ..Default::default()
        };
        at.account_ids.extend(self.account_id.clone());
        at.execute(ctx, reports).await
    }
}
