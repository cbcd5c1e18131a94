//! Cron-driven recurring scrape runs.
//!
//! One background task per job sleeps until the next cron tick and routes
//! the run through the `TriggerService`, so scheduled and manual runs share
//! the same per-source locks. A tick that wakes later than its misfire
//! grace window is skipped, never fired late.

mod scheduler;
mod types;

pub use scheduler::*;
pub use types::*;
