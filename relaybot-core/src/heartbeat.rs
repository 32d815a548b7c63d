// ABOUTME: Per-session heartbeat: an announcement on arm, then periodic uptime status messages.
// ABOUTME: Ticks follow a cron schedule in a configured timezone; dropping the handle stops the task.

use crate::config::HeartbeatConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use relaybot_platform::SharedConnection;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Clone)]
enum Cadence {
    Cron { schedule: cron::Schedule, tz: Tz },
    Every(Duration),
}

impl Cadence {
    /// Time until the next tick, or None when the schedule has no upcoming fire time
    fn next_delay(&self) -> Option<Duration> {
        match self {
            Cadence::Cron { schedule, tz } => {
                let next = schedule.upcoming(*tz).next()?;
                let delay = next.with_timezone(&Utc) - Utc::now();
                Some(delay.to_std().unwrap_or(Duration::ZERO))
            }
            Cadence::Every(period) => Some(*period),
        }
    }
}

/// Heartbeat settings shared by every session
#[derive(Clone)]
pub struct Heartbeat {
    destination_id: String,
    announcement: String,
    cadence: Cadence,
    started: Instant,
}

impl Heartbeat {
    /// Build from config; `None` when the heartbeat is disabled.
    ///
    /// `started` is the process start time used for uptime reporting.
    pub fn from_config(config: &HeartbeatConfig, started: Instant) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }

        let destination_id = config
            .destination_id
            .clone()
            .filter(|d| !d.trim().is_empty())
            .context("heartbeat.destination_id is required when the heartbeat is enabled")?;
        let schedule = cron::Schedule::from_str(&config.schedule)
            .with_context(|| format!("Invalid cron expression: {}", config.schedule))?;
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid timezone: {}", config.timezone))?;

        Ok(Some(Self {
            destination_id,
            announcement: config.announcement.clone(),
            cadence: Cadence::Cron { schedule, tz },
            started,
        }))
    }

    /// Fixed-period heartbeat
    pub fn every(
        destination_id: impl Into<String>,
        announcement: impl Into<String>,
        period: Duration,
        started: Instant,
    ) -> Self {
        Self {
            destination_id: destination_id.into(),
            announcement: announcement.into(),
            cadence: Cadence::Every(period),
            started,
        }
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    /// Status text sent on every tick
    pub fn status_message(&self) -> String {
        format!(
            "relaybot is up, running for {}",
            format_uptime(self.started.elapsed())
        )
    }

    /// Send the announcement, then start the recurring status task.
    ///
    /// Failure to send the announcement is returned; failures on later ticks
    /// are logged and the timer keeps running.
    pub async fn arm(&self, connection: SharedConnection) -> Result<HeartbeatHandle> {
        connection
            .send_message(&self.announcement, &self.destination_id)
            .await
            .with_context(|| {
                format!(
                    "Failed to send heartbeat announcement to {}",
                    self.destination_id
                )
            })?;

        let heartbeat = self.clone();
        let account_id = connection.current_user_id().to_string();
        let task = tokio::spawn(async move {
            loop {
                let Some(delay) = heartbeat.cadence.next_delay() else {
                    tracing::warn!(account_id = %account_id, "Heartbeat schedule has no upcoming tick");
                    return;
                };
                tokio::time::sleep(delay).await;

                let message = heartbeat.status_message();
                if let Err(e) = connection
                    .send_message(&message, &heartbeat.destination_id)
                    .await
                {
                    tracing::warn!(
                        account_id = %account_id,
                        destination = %heartbeat.destination_id,
                        error = %e,
                        "Heartbeat tick failed to send"
                    );
                } else {
                    tracing::debug!(account_id = %account_id, "Heartbeat sent");
                }
            }
        });

        Ok(HeartbeatHandle { task })
    }
}

/// Running heartbeat timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Render an uptime like "1d 2h 3m 4s", omitting leading zero units
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
