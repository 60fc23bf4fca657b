//! Daily full-refresh scheduler.
//!
//! Fires [`Refresher::refresh_all`] once per calendar day at a fixed
//! wall-clock time in a named IANA timezone, independent of the host
//! timezone. The fire time is a six-field cron expression evaluated in
//! that zone, so it follows daylight-saving transitions.
//!
//! Enabling is idempotent: the scheduler is a guarded `Idle → Active`
//! state machine and a second [`DailyScheduler::enable`] reports
//! [`EnableOutcome::AlreadyActive`] without registering another timer.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::ScheduleConfig;
use crate::refresh::{RefreshError, Refresher};

/// A daily local time in a named timezone.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    time: NaiveTime,
    tz: Tz,
    schedule: Schedule,
}

impl DailySchedule {
    pub fn new(time: NaiveTime, tz: Tz) -> Result<Self> {
        let expression = format!("0 {} {} * * *", time.minute(), time.hour());
        let schedule = Schedule::from_str(&expression)
            .map_err(|e| anyhow::anyhow!("invalid cron expression '{}': {}", expression, e))?;
        Ok(Self { time, tz, schedule })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        Self::new(config.daily_time()?, config.tz()?)
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn describe(&self) -> String {
        format!("daily at {} {}", self.time.format("%H:%M"), self.tz.name())
    }
}

/// Result of [`DailyScheduler::enable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableOutcome {
    Started,
    AlreadyActive,
}

enum SchedulerState {
    Idle,
    Active {
        since: DateTime<Utc>,
        handle: JoinHandle<()>,
    },
}

/// Scheduler state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub active: bool,
    pub schedule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

pub struct DailyScheduler {
    schedule: DailySchedule,
    refresher: Arc<Refresher>,
    state: Mutex<SchedulerState>,
}

impl DailyScheduler {
    pub fn new(schedule: DailySchedule, refresher: Arc<Refresher>) -> Self {
        Self {
            schedule,
            refresher,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    /// Start the daily timer unless it is already running.
    pub fn enable(&self) -> EnableOutcome {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let SchedulerState::Active { since, .. } = &*state {
            tracing::info!(since = %since, "scheduler already active");
            return EnableOutcome::AlreadyActive;
        }

        let handle = tokio::spawn(run_loop(self.schedule.clone(), self.refresher.clone()));
        *state = SchedulerState::Active {
            since: Utc::now(),
            handle,
        };
        tracing::info!(schedule = %self.schedule.describe(), "scheduler started");
        EnableOutcome::Started
    }

    /// Stop the timer. Returns whether it was active.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match std::mem::replace(&mut *state, SchedulerState::Idle) {
            SchedulerState::Active { handle, .. } => {
                handle.abort();
                tracing::info!("scheduler stopped");
                true
            }
            SchedulerState::Idle => false,
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let (active, since) = match &*state {
            SchedulerState::Idle => (false, None),
            SchedulerState::Active { since, .. } => (true, Some(*since)),
        };
        SchedulerStatus {
            active,
            schedule: self.schedule.describe(),
            since,
            next_run: if active {
                self.schedule.next_after(Utc::now())
            } else {
                None
            },
        }
    }
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(schedule: DailySchedule, refresher: Arc<Refresher>) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::error!("schedule has no upcoming fire time; scheduler exiting");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(next_run = %next, "next scheduled refresh");
        tokio::time::sleep(wait).await;

        match refresher.refresh_all().await {
            Ok(report) => tracing::info!(
                run_id = %report.run_id,
                upserted = report.total_upserted(),
                "scheduled refresh complete"
            ),
            Err(RefreshError::AlreadyRunning(scope)) => {
                tracing::warn!(running = %scope, "scheduled refresh skipped; a run is in progress")
            }
            Err(e) => tracing::error!(error = %e, "scheduled refresh failed"),
        }
    }
}
