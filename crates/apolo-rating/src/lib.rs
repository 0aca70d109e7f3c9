//! ApoloBilling rating engine
//!
//! Turns a call window into priced time spans:
//!
//! - [`timing::RITiming`] matches instants against calendar patterns
//! - [`rate_group::RateGroups`] holds the price tiers of an interval
//! - [`rate_interval::RateInterval`] pairs a timing with its prices
//! - [`timespan::TimeSpan`] is cut by the splitter until each piece has a
//!   single governing interval
//! - [`call_descriptor::CallDescriptor::get_cost`] drives the whole process
//!   and produces a [`call_cost::CallCost`]
//!
//! Everything here is synchronous and works on owned data.

pub mod call_cost;
pub mod call_descriptor;
pub mod rate_group;
pub mod rate_interval;
pub mod rating_info;
pub mod timespan;
pub mod timing;

pub use call_cost::CallCost;
pub use call_descriptor::CallDescriptor;
pub use rate_group::{Rate, RateGroups, RateParameters};
pub use rate_interval::{MaxCostStrategy, RIRate, RateInterval};
pub use rating_info::RatingInfo;
pub use timespan::{DebitInfo, Increment, Increments, MonetaryInfo, TimeSpan, TimeSpans, UnitInfo};
pub use timing::RITiming;
