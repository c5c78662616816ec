//! Utility functions for identifiers and timestamps.

mod ids;
pub mod timestamps;

pub use ids::{generate_id, generate_run_id};
pub use timestamps::{
    file_stamp, format_iso8601, hours_between, iso_timestamp, now_utc, parse_iso8601,
    seconds_between, Timestamp,
};
