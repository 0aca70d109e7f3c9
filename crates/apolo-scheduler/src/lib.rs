//! ApoloBilling action scheduler
//!
//! Runs the action lists of [`ActionTiming`]s against accounts:
//!
//! - [`ActionTiming::get_next_start_time`] resolves the next firing instant
//!   of a calendar timing through a cron schedule
//! - [`ActionTiming::execute`] runs the actions of each target account
//!   under a per-account [`Guardian`] lock
//! - [`ActionRegistry`] maps action types to host-provided handlers
//! - [`ActionPlan`] and the priority lists order timings for a scheduler
//!
//! Persistence, filters and event publication are reached through the
//! traits in `apolo_core::traits`, bundled in an [`ExecutionContext`].

pub mod action_timing;
pub mod context;
pub mod guardian;
pub mod plan;
pub mod registry;

pub use action_timing::{ActionTiming, Task, ACTION_TIMING_FIRED, META_MONTHLY_ESTIMATED};
pub use context::{report_channels, ActionReport, ExecutionContext, ReportChannels, ReportReceivers};
pub use guardian::Guardian;
pub use plan::{
    default_timing, resolve_timing, ActionPlan, ActionTimingPriorityList,
    ActionTimingWeightOnlyPriorityList,
};
pub use registry::{ActionHandler, ActionRegistry};
