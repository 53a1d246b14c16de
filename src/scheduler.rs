//! Background Scheduler
//!
//! Two periodic jobs on their own tasks:
//!
//! - daily uptime refresh, first run one interval after start
//! - observation retention purge, first run immediately
//!
//! A slow run pushes the next tick back instead of bursting. Both loops stop
//! cooperatively on `stop()`.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SchedulerConfig;
use crate::service::DirectoryService;

pub struct Scheduler {
    service: Arc<DirectoryService>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(service: Arc<DirectoryService>, config: SchedulerConfig) -> Self {
        Self {
            service,
            config,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Spawn both loops. Calling `start` on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let refresh_every = self.config.daily_refresh_interval();
        let purge_every = self.config.purge_interval();

        self.handles.push(tokio::spawn(daily_refresh_loop(
            self.service.clone(),
            refresh_every,
            self.cancel.clone(),
        )));
        self.handles.push(tokio::spawn(purge_loop(
            self.service.clone(),
            purge_every,
            self.cancel.clone(),
        )));

        info!(
            refresh_interval_secs = refresh_every.as_secs(),
            purge_interval_secs = purge_every.as_secs(),
            "Background scheduler started"
        );
    }

    /// Cancel both loops and wait for them to finish
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        // Allow a later restart
        self.cancel = CancellationToken::new();
        info!("Background scheduler stopped");
    }
}

async fn daily_refresh_loop(service: Arc<DirectoryService>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let batch = service.refresh_last_day_reports().await;
                info!(reports = batch.report.len(), "Scheduled daily refresh finished");
            }
        }
    }
}

async fn purge_loop(service: Arc<DirectoryService>, every: Duration, cancel: CancellationToken) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = service.purge_old_observations().await {
                    error!(error = %e, "Scheduled observation purge failed");
                }
            }
        }
    }
}
