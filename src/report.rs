//! Report Builder
//!
//! Folds observations into per-node status reports. The 5-minute and 1-hour
//! windows are recomputed on every observation for its IP version only; the
//! 1-day window is left to the periodic refresh.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::models::{IpVersion, Observation, StatusReport};
use crate::uptime::{ReportWindow, Uptime, UptimeCalculator};

pub struct ReportBuilder {
    uptime: Arc<UptimeCalculator>,
}

impl ReportBuilder {
    pub fn new(uptime: Arc<UptimeCalculator>) -> Self {
        Self { uptime }
    }

    /// Merge one observation into `report`, using the observation's
    /// timestamp as "now"
    pub async fn apply_observation(&self, report: &mut StatusReport, observation: &Observation) {
        report.identity = observation.identity.clone();
        if observation.owner.is_some() {
            report.owner = observation.owner.clone();
        }

        let ip_version = observation.ip_version;
        report.set_most_recent(ip_version, observation.up);

        let five = self
            .uptime
            .compute_report_window(
                &observation.identity,
                ip_version,
                ReportWindow::Last5Minutes,
                observation.timestamp,
            )
            .await;
        if let Uptime::Percent(p) = five {
            report.set_last_5_minutes(ip_version, p);
        }

        let hour = self
            .uptime
            .compute_report_window(
                &observation.identity,
                ip_version,
                ReportWindow::LastHour,
                observation.timestamp,
            )
            .await;
        if let Uptime::Percent(p) = hour {
            report.set_last_hour(ip_version, p);
        }
    }

    /// Apply a batch in input order on top of the already loaded reports.
    ///
    /// Returns one report per touched identity, ready for a single bulk save.
    pub async fn apply_batch(
        &self,
        existing: Vec<StatusReport>,
        observations: &[Observation],
    ) -> Vec<StatusReport> {
        let mut reports = existing;
        let mut index: HashMap<String, usize> = reports
            .iter()
            .enumerate()
            .map(|(i, r)| (r.identity.clone(), i))
            .collect();

        for observation in observations {
            let slot = match index.get(&observation.identity) {
                Some(slot) => *slot,
                None => {
                    reports.push(StatusReport::new(&observation.identity));
                    index.insert(observation.identity.clone(), reports.len() - 1);
                    reports.len() - 1
                }
            };
            self.apply_observation(&mut reports[slot], observation).await;
        }

        debug!(
            observations = observations.len(),
            reports = reports.len(),
            "Applied observation batch"
        );
        reports
    }

    /// Recompute the 1-day windows from scratch.
    ///
    /// Reports whose IPv4 window is empty are dropped from the result.
    pub async fn refresh_last_day(&self, reports: Vec<StatusReport>, now: i64) -> Vec<StatusReport> {
        let mut refreshed = Vec::with_capacity(reports.len());

        for mut report in reports {
            let v4 = self
                .uptime
                .compute_report_window(&report.identity, IpVersion::V4, ReportWindow::LastDay, now)
                .await;
            let Uptime::Percent(v4) = v4 else {
                continue;
            };
            report.set_last_day(IpVersion::V4, v4);

            let v6 = self
                .uptime
                .compute_report_window(&report.identity, IpVersion::V6, ReportWindow::LastDay, now)
                .await;
            report.set_last_day(IpVersion::V6, v6.percent().unwrap_or(0));

            refreshed.push(report);
        }

        refreshed
    }
}
