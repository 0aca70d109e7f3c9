//! Shared helpers: monetary rounding and time handling

pub mod rounding;
pub mod time;

pub use rounding::{round, Rounding, RoundingMethod};
pub use time::{
    duration_nanos, end_of_month, parse_duration, parse_time_detect_layout, round_duration, scale, unit_of,
};
