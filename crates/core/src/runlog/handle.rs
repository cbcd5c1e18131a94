//! Emitting side of the run log channel.

use chrono::Utc;
use tokio::sync::mpsc;

use super::RunLogEntry;
use crate::scraper::ScrapeResult;

/// Environment override for the fallback actor id.
pub const SYSTEM_ACTOR_ENV: &str = "MAGPIE_SYSTEM_ACTOR";

/// Handle for recording scrape runs.
///
/// Cheaply cloneable; shared across the trigger service and the scheduler.
/// Entries travel through an async channel to the `RunLogWriter`. A record
/// whose actor cannot be resolved is dropped with a warning, so the log
/// never contains anonymous rows.
#[derive(Clone)]
pub struct RunLogHandle {
    tx: mpsc::Sender<RunLogEntry>,
    system_actor: Option<String>,
}

impl RunLogHandle {
    /// Create a handle from a channel sender and the configured fallback
    /// actor id.
    pub fn new(tx: mpsc::Sender<RunLogEntry>, system_actor: Option<String>) -> Self {
        Self { tx, system_actor }
    }

    /// Record a finished run asynchronously.
    ///
    /// Non-blocking for the caller. A full or closed channel is logged but
    /// never propagated.
    pub async fn record(&self, result: ScrapeResult, actor: Option<&str>) {
        let Some(entry) = self.entry(result, actor) else {
            return;
        };
        if let Err(e) = self.tx.send(entry).await {
            tracing::error!("Failed to record scrape run: {}", e);
        }
    }

    /// Record a finished run without awaiting.
    ///
    /// Returns true if the entry was queued.
    pub fn try_record(&self, result: ScrapeResult, actor: Option<&str>) -> bool {
        let Some(entry) = self.entry(result, actor) else {
            return false;
        };
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to record scrape run: {}", e);
                false
            }
        }
    }

    /// Resolve the actor and build the queue entry, or `None` when the
    /// record must be skipped.
    fn entry(&self, result: ScrapeResult, actor: Option<&str>) -> Option<RunLogEntry> {
        let actor = self.resolve_actor(actor)?;
        Some(RunLogEntry {
            timestamp: Utc::now(),
            actor,
            result,
        })
    }

    /// Actor resolution order: explicit caller, then the environment
    /// override, then the configured system actor.
    fn resolve_actor(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(actor) = explicit {
            if !actor.is_empty() {
                return Some(actor.to_string());
            }
        }
        if let Ok(actor) = std::env::var(SYSTEM_ACTOR_ENV) {
            if !actor.is_empty() {
                return Some(actor);
            }
        }
        if let Some(actor) = self.system_actor.as_ref() {
            if !actor.is_empty() {
                return Some(actor.clone());
            }
        }
        tracing::warn!("No actor resolvable for scrape run, skipping run log write");
        None
    }
}
