//! Scheduler implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::metrics;
use crate::scraper::ScrapeMode;
use crate::trigger::{TriggerError, TriggerService};

use super::types::ScheduledJob;

/// Fires cron-scheduled scrape runs.
///
/// One background task per job. All runs go through the `TriggerService`,
/// so a scheduled tick colliding with a manual run loses the source lock
/// and is skipped for that tick.
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    trigger: Arc<TriggerService>,
    credentials: Arc<dyn CredentialStore>,
    actor: String,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    /// Create a scheduler. Jobs are fixed for the process lifetime.
    pub fn new(
        jobs: Vec<ScheduledJob>,
        trigger: Arc<TriggerService>,
        credentials: Arc<dyn CredentialStore>,
        actor: impl Into<String>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            jobs,
            trigger,
            credentials,
            actor: actor.into(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the scheduler (spawns one background task per job).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(jobs = self.jobs.len(), "Starting scheduler");

        for job in &self.jobs {
            self.spawn_job_loop(job.clone());
        }

        info!("Scheduler started");
    }

    /// Stop the scheduler. Ticks already fired keep running to completion.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn spawn_job_loop(&self, job: ScheduledJob) {
        let running = Arc::clone(&self.running);
        let trigger = Arc::clone(&self.trigger);
        let credentials = Arc::clone(&self.credentials);
        let actor = self.actor.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(source = %job.source, "Job loop started");
            loop {
                let Some(fire_time) = job.schedule.upcoming(Utc).next() else {
                    warn!(source = %job.source, "Schedule has no upcoming ticks, stopping job loop");
                    break;
                };
                let wait = (fire_time - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(source = %job.source, "Job loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::fire(&job, &trigger, credentials.as_ref(), &actor, fire_time);
                    }
                }
            }
            info!(source = %job.source, "Job loop stopped");
        });
    }

    /// Run one tick of a job. Never propagates errors; a failed or skipped
    /// tick leaves the job scheduled.
    fn fire(
        job: &ScheduledJob,
        trigger: &TriggerService,
        credentials: &dyn CredentialStore,
        actor: &str,
        fire_time: DateTime<Utc>,
    ) {
        let lateness = Utc::now().signed_duration_since(fire_time);
        if is_misfire(lateness, job.misfire_grace) {
            warn!(
                source = %job.source,
                lateness_s = lateness.num_seconds(),
                "Tick woke past the misfire grace window, skipping"
            );
            metrics::SCHEDULED_RUNS_SKIPPED
                .with_label_values(&[&job.source, "misfire"])
                .inc();
            return;
        }

        if let Some(platform) = &job.credential_platform {
            // Resolved per tick so a credential added mid-day is picked up
            // without a restart.
            let present = match credentials.get(platform) {
                Ok(credential) => credential.is_some(),
                Err(e) => {
                    warn!(source = %job.source, platform = %platform, error = %e, "Credential lookup failed");
                    false
                }
            };
            if !present {
                warn!(
                    source = %job.source,
                    platform = %platform,
                    "No credential row for platform, skipping scheduled run"
                );
                metrics::SCHEDULED_RUNS_SKIPPED
                    .with_label_values(&[&job.source, "missing_credentials"])
                    .inc();
                return;
            }
        }

        match trigger.trigger(&job.source, ScrapeMode::full(), Some(actor)) {
            Ok(()) => {
                info!(source = %job.source, "Scheduled run started");
            }
            Err(TriggerError::AlreadyRunning(_)) => {
                warn!(source = %job.source, "Scheduled run skipped, a run is already in progress");
                metrics::SCHEDULED_RUNS_SKIPPED
                    .with_label_values(&[&job.source, "already_running"])
                    .inc();
            }
            Err(e) => {
                warn!(source = %job.source, error = %e, "Scheduled run failed to start");
            }
        }
    }
}

fn is_misfire(lateness: chrono::Duration, grace: Duration) -> bool {
    match lateness.to_std() {
        Ok(late) => late > grace,
        // Woke before the tick, never a misfire.
        Err(_) => false,
    }
}
