//! Channel monitor: the active-channel set plus a periodic concurrent sweep.
//!
//! Posts arrive through the push-based update stream, so the default sweep only
//! refreshes `last_update` on each active channel. The per-channel work is a
//! [`SweepStrategy`] so a pull-based backfill can be plugged in later without
//! changing the start/stop lifecycle.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
    sync::{Mutex, RwLock},
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::{StoreError, Stores};

/// What one sweep unit did to its channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepUnit {
    Touched,
    Skipped,
}

#[async_trait]
pub trait SweepStrategy: Send + Sync {
    async fn sweep_channel(&self, stores: &Stores, channel_id: &str)
        -> Result<SweepUnit, StoreError>;
}

/// Re-fetch the channel and bump `last_update` if it is still active.
pub struct TouchSweep;

#[async_trait]
impl SweepStrategy for TouchSweep {
    async fn sweep_channel(
        &self,
        stores: &Stores,
        channel_id: &str,
    ) -> Result<SweepUnit, StoreError> {
        let _edit = stores.lock_channel_edits().await;
        let mut channel = stores.channels.get(channel_id).await?;
        if !channel.is_active {
            return Ok(SweepUnit::Skipped);
        }
        channel.last_update = Utc::now();
        stores.channels.save(&channel).await?;
        Ok(SweepUnit::Touched)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub touched: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ChannelMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    stores: Stores,
    interval: Duration,
    strategy: Arc<dyn SweepStrategy>,
    active: RwLock<HashSet<String>>,
    running: Mutex<Option<Running>>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "channel monitor loop ended abnormally");
        }
        info!("channel monitor stopped");
    }
}

impl ChannelMonitor {
    pub fn new(stores: Stores, interval: Duration) -> Self {
        Self::with_strategy(stores, interval, Arc::new(TouchSweep))
    }

    pub fn with_strategy(
        stores: Stores,
        interval: Duration,
        strategy: Arc<dyn SweepStrategy>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                stores,
                interval: interval.max(Duration::from_millis(1)),
                strategy,
                active: RwLock::new(HashSet::new()),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Load active channels and start ticking. Returns the size of the active set.
    ///
    /// A failed load is logged and the monitor runs with an empty set; channels
    /// added later through [`Self::add_channel`] are still swept.
    pub async fn start(&self) -> usize {
        let mut running = self.inner.running.lock().await;
        if let Some(previous) = running.take() {
            previous.shutdown().await;
        }

        match self.inner.stores.channels.list_all().await {
            Ok(channels) => {
                let mut active = self.inner.active.write().await;
                active.clear();
                active.extend(channels.into_iter().filter(|c| c.is_active).map(|c| c.id));
            }
            Err(e) => error!(error = %e, "failed to load channels for monitoring"),
        }
        let loaded = self.inner.active.read().await.len();

        let cancel = CancellationToken::new();
        let monitor = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            monitor.run_loop(token).await;
        });
        *running = Some(Running { cancel, handle });
        drop(running);

        info!(
            channels = loaded,
            interval_secs = self.inner.interval.as_secs(),
            "channel monitor started"
        );
        loaded
    }

    /// Cancel the loop and wait until any sweep in progress has finished.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };
        running.shutdown().await;
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Returns `true` if the id was not already active.
    pub async fn add_channel(&self, channel_id: impl Into<String>) -> bool {
        let channel_id = channel_id.into();
        let added = self.inner.active.write().await.insert(channel_id.clone());
        if added {
            info!(channel_id = %channel_id, "channel added to monitor");
        }
        added
    }

    /// Returns `true` if the id was active.
    pub async fn remove_channel(&self, channel_id: &str) -> bool {
        let removed = self.inner.active.write().await.remove(channel_id);
        if removed {
            info!(channel_id = %channel_id, "channel removed from monitor");
        }
        removed
    }

    /// Sorted snapshot of the active set.
    pub async fn active_channels(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.active.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one sweep over the current active set, one task per channel, and
    /// wait for all of them.
    pub async fn sweep(&self) -> SweepReport {
        let ids = self.active_channels().await;

        let mut tasks = JoinSet::new();
        for id in ids {
            let stores = self.inner.stores.clone();
            let strategy = self.inner.strategy.clone();
            tasks.spawn(async move {
                let result = strategy.sweep_channel(&stores, &id).await;
                (id, result)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(SweepUnit::Touched))) => report.touched += 1,
                Ok((_, Ok(SweepUnit::Skipped))) => report.skipped += 1,
                Ok((id, Err(e))) => {
                    error!(channel_id = %id, error = %e, "channel sweep failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "channel sweep task panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn run_loop(&self, cancel: CancellationToken) {
        let period = self.inner.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep().await;
                    debug!(
                        touched = report.touched,
                        skipped = report.skipped,
                        failed = report.failed,
                        "sweep finished"
                    );
                }
            }
        }
    }
}
