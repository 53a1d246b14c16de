//! Uptime Calculator
//!
//! Percentage of "up" observations for one node and IP version over a window.
//! A window is either a time range or a fixed number of newest samples; which
//! one the report windows use comes from `UptimeConfig`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::clock::minutes_before;
use crate::config::UptimeConfig;
use crate::database::StatusStore;
use crate::models::{IpVersion, Observation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uptime {
    /// No observations in the window
    Empty,
    Percent(u8),
}

impl Uptime {
    /// `floor(100 * up / total)`, `Empty` when `total` is zero
    pub fn from_counts(up: usize, total: usize) -> Self {
        if total == 0 {
            return Uptime::Empty;
        }
        let up = up.min(total) as u64;
        Uptime::Percent((up * 100 / total as u64) as u8)
    }

    pub fn from_observations(observations: &[Observation]) -> Self {
        let up = observations.iter().filter(|o| o.up).count();
        Self::from_counts(up, observations.len())
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            Uptime::Empty => None,
            Uptime::Percent(p) => Some(*p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UptimeWindow {
    /// Observations at or after the timestamp
    Since(i64),
    /// The newest `n` observations
    MostRecent(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UptimeStrategy {
    TimeWindow,
    SampleCount,
}

#[derive(Debug, Error)]
#[error("unknown uptime strategy `{0}` (expected time_window or sample_count)")]
pub struct UnknownStrategy(String);

impl FromStr for UptimeStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time_window" | "time" => Ok(UptimeStrategy::TimeWindow),
            "sample_count" | "samples" => Ok(UptimeStrategy::SampleCount),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// The three rolling windows a status report carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Last5Minutes,
    LastHour,
    LastDay,
}

impl ReportWindow {
    pub fn minutes(&self) -> i64 {
        match self {
            ReportWindow::Last5Minutes => 5,
            ReportWindow::LastHour => 60,
            ReportWindow::LastDay => 24 * 60,
        }
    }
}

pub struct UptimeCalculator {
    store: Arc<dyn StatusStore>,
    config: UptimeConfig,
}

impl UptimeCalculator {
    pub fn new(store: Arc<dyn StatusStore>, config: UptimeConfig) -> Self {
        Self { store, config }
    }

    /// Storage failures degrade to `Empty`
    pub async fn compute(&self, identity: &str, ip_version: IpVersion, window: UptimeWindow) -> Uptime {
        let observations = match window {
            UptimeWindow::Since(since) => {
                self.store
                    .list_observations_since(identity, ip_version, since)
                    .await
            }
            UptimeWindow::MostRecent(limit) => {
                self.store
                    .list_most_recent_observations(identity, ip_version, limit)
                    .await
            }
        };

        match observations {
            Ok(observations) => Uptime::from_observations(&observations),
            Err(e) => {
                error!(
                    identity = %identity,
                    ip_version = %ip_version,
                    error = %e,
                    "Failed to load observations for uptime"
                );
                Uptime::Empty
            }
        }
    }

    /// Concrete window for a report field, anchored at `now`
    pub fn window_for(&self, window: ReportWindow, now: i64) -> UptimeWindow {
        match self.config.strategy {
            UptimeStrategy::TimeWindow => UptimeWindow::Since(minutes_before(now, window.minutes())),
            UptimeStrategy::SampleCount => UptimeWindow::MostRecent(match window {
                ReportWindow::Last5Minutes => self.config.samples_last_5_minutes,
                ReportWindow::LastHour => self.config.samples_last_hour,
                ReportWindow::LastDay => self.config.samples_last_day,
            }),
        }
    }

    pub async fn compute_report_window(
        &self,
        identity: &str,
        ip_version: IpVersion,
        window: ReportWindow,
        now: i64,
    ) -> Uptime {
        self.compute(identity, ip_version, self.window_for(window, now)).await
    }
}
