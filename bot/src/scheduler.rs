//! The lifecycle sweep.
//!
//! Every `sweep_interval` each live raid is checked, in order, for a hatch,
//! a start window transition, an expiry warning and deletion. Each step
//! decides under the registry write lock and writes nothing if it does not
//! apply, so a transition fires at most once however often the sweep runs.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::engine::RaidEngine;
use crate::error::{RaidError, Result};
use crate::raid::time::{self, StartWindow};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub raids: usize,
    pub hatched: usize,
    pub start_armed: usize,
    pub start_cleared: usize,
    pub warned: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SweepReport {
    fn is_idle(&self) -> bool {
        self.hatched + self.start_armed + self.start_cleared + self.warned + self.deleted + self.failed
            == 0
    }
}

pub struct Scheduler {
    engine: Arc<RaidEngine>,
}

impl Scheduler {
    pub fn new(engine: Arc<RaidEngine>) -> Self {
        Self { engine }
    }

    /// Runs the sweep forever on the configured interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.engine.timings().sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }

    /// One pass over every registered raid as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for channel_id in self.engine.registry().channel_ids() {
            report.raids += 1;
            match self.sweep_raid(channel_id, now, &mut report).await {
                Ok(()) | Err(RaidError::RaidNotFound(_)) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(channel_id, error = %e, "sweep failed for raid");
                }
            }
        }

        if !report.is_idle() {
            tracing::info!(?report, "sweep done");
        }
        report
    }

    async fn sweep_raid(
        &self,
        channel_id: u64,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let engine = &self.engine;
        let registry = engine.registry();
        let timings = engine.timings().clone();

        let hatched = registry
            .try_update(channel_id, |raid| {
                if !time::hatch_due(raid, now) {
                    return Ok(None);
                }
                raid.hatched = true;
                Ok(Some(()))
            })
            .await?;
        if hatched.is_some() {
            tracing::info!(channel_id, "egg hatched");
            report.hatched += 1;
            engine.refresh(channel_id);
        }

        let window = registry
            .try_update(channel_id, |raid| {
                let step = time::start_window(raid, now);
                match step {
                    Some(StartWindow::Arm) => {
                        raid.start_clear_time = Some(time::start_clear_time(now, &timings));
                    }
                    Some(StartWindow::Clear) => {
                        raid.start_time = None;
                        raid.start_clear_time = None;
                    }
                    None => {}
                }
                Ok(step)
            })
            .await?;
        match window.map(|(step, _)| step) {
            Some(StartWindow::Arm) => {
                tracing::debug!(channel_id, "start time passed, clear armed");
                report.start_armed += 1;
                engine.refresh(channel_id);
            }
            Some(StartWindow::Clear) => {
                tracing::info!(channel_id, "start window cleared");
                report.start_cleared += 1;
                engine.refresh(channel_id);
                let poller = Arc::clone(engine);
                engine.effects().spawn("completion poll", channel_id, async move {
                    poller.complete_present(channel_id, None).await
                });
            }
            None => {}
        }

        let warned = registry
            .try_update(channel_id, |raid| {
                if !time::expiry_due(raid, now) {
                    return Ok(None);
                }
                let deletion = time::deletion_time(now, &timings);
                raid.deletion_warning_time = Some(now);
                raid.deletion_time = Some(deletion);
                Ok(Some(deletion))
            })
            .await?;
        if let Some((deletion, _)) = warned {
            tracing::info!(channel_id, %deletion, "raid expired, deletion scheduled");
            report.warned += 1;
            let warner = Arc::clone(engine);
            engine.effects().spawn("deletion warning", channel_id, async move {
                warner.warn_deletion(channel_id, deletion).await
            });
        }

        if let Some(raid) = registry
            .retire_if(channel_id, |raid| time::deletion_due(raid, now))
            .await?
        {
            tracing::info!(channel_id, venue_id = raid.venue_id, "raid archived");
            report.deleted += 1;
            let gateway = Arc::clone(engine.gateway());
            if let Some(announcement) = raid.announcement {
                let gateway = Arc::clone(&gateway);
                engine.effects().spawn("delete announcement", channel_id, async move {
                    gateway.delete_message(announcement).await
                });
            }
            engine.effects().spawn("delete raid channel", channel_id, async move {
                gateway.delete_channel(channel_id).await
            });
        }

        Ok(())
    }
}
