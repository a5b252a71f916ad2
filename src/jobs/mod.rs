use std::{sync::Arc, time::Instant};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        if self.context.config.reminders.enabled {
            tokio::spawn(Self::reminder_sweep_job(Arc::clone(&self)));
        } else {
            info!("Reminder sweep disabled");
        }

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Send due reminders and flag stuck clients
    async fn reminder_sweep_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.reminders.sweep_interval;
        let mut interval = interval(Duration::from_secs(secs));
        // No catch-up bursts after a slow sweep
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let start = Instant::now();

            match tasks::reminder_sweep(&scheduler.context).await {
                Ok(report) => {
                    metrics::record_background_job("reminder_sweep", "success", start.elapsed().as_secs_f64());
                    if report.sent + report.flagged + report.failed > 0 {
                        info!(
                            campaigns = report.campaigns,
                            sent = report.sent,
                            flagged = report.flagged,
                            failed = report.failed,
                            "Reminder sweep finished"
                        );
                    }
                }
                Err(e) => {
                    metrics::record_background_job("reminder_sweep", "error", start.elapsed().as_secs_f64());
                    error!("Reminder sweep failed: {}", e);
                }
            }
        }
    }

    /// Cleanup expired sessions (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            let start = Instant::now();

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("session_cleanup", "success", start.elapsed().as_secs_f64());
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("session_cleanup", "error", start.elapsed().as_secs_f64());
                    error!("Failed to cleanup expired sessions: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
