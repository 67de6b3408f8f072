//! # Reminder Scheduler
//!
//! Runs the escalation, digest and cleanup jobs on fixed intervals.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Jobs can be triggered on demand through `run_job`
//! - 1.0.0: Initial release

use crate::core::config::Config;
use crate::features::reminders::manager::ReminderManager;
use anyhow::Result;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Periodic maintenance jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    Escalate,
    Digest,
    Cleanup,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Escalate => write!(f, "escalate"),
            Job::Digest => write!(f, "digest"),
            Job::Cleanup => write!(f, "cleanup"),
        }
    }
}

impl FromStr for Job {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "escalate" | "escalation" => Ok(Job::Escalate),
            "digest" => Ok(Job::Digest),
            "cleanup" => Ok(Job::Cleanup),
            _ => Err(anyhow::anyhow!("Unknown job: {}", s)),
        }
    }
}

/// Run one job now and describe what it did
pub async fn run_job(manager: &ReminderManager, job: Job) -> Result<Value> {
    match job {
        Job::Escalate => {
            let escalated = manager.escalate_overdue_reminders().await?;
            Ok(json!({ "escalated": escalated }))
        }
        Job::Digest => {
            let summary = manager.send_daily_reminder_digest().await?;
            Ok(json!({ "sent": summary.is_some(), "summary": summary }))
        }
        Job::Cleanup => {
            let outcome = manager.cleanup_closed_reminders().await?;
            Ok(serde_json::to_value(outcome)?)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobIntervals {
    pub escalation: Duration,
    pub digest: Duration,
    pub cleanup: Duration,
}

impl JobIntervals {
    pub fn from_config(config: &Config) -> Self {
        JobIntervals {
            escalation: Duration::from_secs(config.escalation_interval_secs),
            digest: Duration::from_secs(config.digest_interval_secs),
            cleanup: Duration::from_secs(config.cleanup_interval_secs),
        }
    }
}

pub struct ReminderScheduler {
    manager: ReminderManager,
    intervals: JobIntervals,
}

impl ReminderScheduler {
    pub fn new(manager: ReminderManager, intervals: JobIntervals) -> Self {
        Self { manager, intervals }
    }

    /// Loop forever. Job failures are logged and the next tick runs as usual.
    pub async fn run(self) {
        info!(
            "⏰ Reminder scheduler started (escalate every {}s, digest every {}s, cleanup every {}s)",
            self.intervals.escalation.as_secs(),
            self.intervals.digest.as_secs(),
            self.intervals.cleanup.as_secs()
        );

        // First run happens one period after startup
        let start = Instant::now();
        let mut escalation = interval_at(start + self.intervals.escalation, self.intervals.escalation);
        let mut digest = interval_at(start + self.intervals.digest, self.intervals.digest);
        let mut cleanup = interval_at(start + self.intervals.cleanup, self.intervals.cleanup);
        for interval in [&mut escalation, &mut digest, &mut cleanup] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            let job = tokio::select! {
                _ = escalation.tick() => Job::Escalate,
                _ = digest.tick() => Job::Digest,
                _ = cleanup.tick() => Job::Cleanup,
            };
            self.tick(job).await;
        }
    }

    async fn tick(&self, job: Job) {
        debug!("Running scheduled {job} job");
        match run_job(&self.manager, job).await {
            Ok(result) => debug!("Scheduled {job} job finished: {result}"),
            Err(e) => error!("Scheduled {job} job failed: {e}"),
        }
    }
}
