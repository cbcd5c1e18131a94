//! Scheduled job definitions.

use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;

/// How long past a missed tick the job still fires.
pub const DEFAULT_MISFIRE_GRACE: Duration = Duration::from_secs(600);

#[derive(Debug)]
pub enum SchedulerError {
    InvalidCron { source: String, message: String },
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::InvalidCron { source, message } => {
                write!(f, "Invalid cron expression for {source}: {message}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// A recurring scrape binding. Registered at scheduler start and fixed for
/// the process lifetime.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// Adapter name the job triggers.
    pub source: String,
    /// Parsed cron schedule (second-granularity expressions).
    pub schedule: Schedule,
    /// Wake-ups later than this after the tick skip the run.
    pub misfire_grace: Duration,
    /// Platform whose credential row must exist for the run to start.
    pub credential_platform: Option<String>,
}

impl ScheduledJob {
    pub fn new(source: impl Into<String>, cron_expr: &str) -> Result<Self, SchedulerError> {
        let source = source.into();
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            source: source.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source,
            schedule,
            misfire_grace: DEFAULT_MISFIRE_GRACE,
            credential_platform: None,
        })
    }

    pub fn with_misfire_grace(mut self, grace: Duration) -> Self {
        self.misfire_grace = grace;
        self
    }

    /// Require a credential row for `platform` before each run.
    pub fn with_credential_gate(mut self, platform: impl Into<String>) -> Self {
        self.credential_platform = Some(platform.into());
        self
    }
}

/// Production schedule, staggered so per-platform rate limits never overlap.
///
/// Times are UTC: github 02:00, thingiverse 02:30, ravelry 03:00. The
/// ravelry job is gated on its credential row and skipped with a warning
/// when none exists.
pub fn default_jobs() -> Vec<ScheduledJob> {
    vec![
        ScheduledJob::new("github", "0 0 2 * * *").unwrap(),
        ScheduledJob::new("thingiverse", "0 30 2 * * *").unwrap(),
        ScheduledJob::new("ravelry", "0 0 3 * * *")
            .unwrap()
            .with_credential_gate("ravelry"),
    ]
}
