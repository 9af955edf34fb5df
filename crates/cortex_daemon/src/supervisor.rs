//! Process-wide owner of the shared reservoir and its background heartbeat.
//!
//! Between cycles the engine keeps ticking on a fixed interval so its state
//! decays and settles. The heartbeat takes the same lock as a cycle, so a
//! tick never lands between a cycle's apply, step and export calls.

use cortex_core::reservoir::{self, Reservoir, SharedReservoir};
use cortex_core::CortexError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Counters shared between the heartbeat task and the API.
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    ticks: AtomicU64,
    failures: AtomicU64,
    running: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeartbeatSnapshot {
    pub running: bool,
    pub ticks: u64,
    pub failures: u64,
    pub interval_ms: u64,
}

impl HeartbeatStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

pub struct ReservoirSupervisor {
    reservoir: SharedReservoir,
    interval: Duration,
    stats: Arc<HeartbeatStats>,
    heartbeat: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl ReservoirSupervisor {
    pub fn new(reservoir: SharedReservoir, interval: Duration) -> Self {
        ReservoirSupervisor {
            reservoir,
            interval,
            stats: Arc::new(HeartbeatStats::default()),
            heartbeat: None,
        }
    }

    /// Initialize `engine` and take ownership of it. A refused init is fatal.
    pub fn boot<R: Reservoir + 'static>(
        mut engine: R,
        neuron_count: i32,
        fanout: i32,
        interval: Duration,
    ) -> Result<Self, CortexError> {
        reservoir::initialize(&mut engine, neuron_count, fanout)?;
        info!(neuron_count = neuron_count, fanout = fanout, "Reservoir initialized");
        Ok(Self::new(reservoir::share(engine), interval))
    }

    pub fn reservoir(&self) -> SharedReservoir {
        self.reservoir.clone()
    }

    pub fn stats(&self) -> Arc<HeartbeatStats> {
        self.stats.clone()
    }

    pub fn snapshot(&self) -> HeartbeatSnapshot {
        snapshot(&self.stats, self.interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the heartbeat. Calling it while already running is a no-op.
    pub fn start(&mut self) {
        if self.heartbeat.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeat(
            self.reservoir.clone(),
            self.interval,
            self.stats.clone(),
            rx,
        ));
        self.stats.running.store(true, Ordering::Relaxed);
        self.heartbeat = Some((tx, handle));
        info!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");
    }

    /// Signal the heartbeat to exit and wait for it.
    pub async fn stop(&mut self) {
        let Some((tx, handle)) = self.heartbeat.take() else {
            return;
        };
        let _ = tx.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Heartbeat task ended abnormally");
        }
        self.stats.running.store(false, Ordering::Relaxed);
        info!(ticks = self.stats.ticks(), "Heartbeat stopped");
    }
}

pub fn snapshot(stats: &HeartbeatStats, interval: Duration) -> HeartbeatSnapshot {
    HeartbeatSnapshot {
        running: stats.is_running(),
        ticks: stats.ticks(),
        failures: stats.failures(),
        interval_ms: interval.as_millis() as u64,
    }
}

async fn heartbeat(
    reservoir: SharedReservoir,
    interval: Duration,
    stats: Arc<HeartbeatStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = reservoir.lock().await.step();
                match result {
                    Ok(()) => {
                        let n = stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!(tick = n, "Heartbeat step");
                    }
                    Err(e) => {
                        stats.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "Heartbeat step failed");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::reservoir::{RecordingReservoir, ReservoirCall};
    use cortex_core::ReservoirError;
    use tokio::sync::Mutex;

    #[test]
    fn test_boot_refused_init_is_fatal() {
        let mut engine = RecordingReservoir::new("{}");
        engine.refuse_init = true;
        let err = ReservoirSupervisor::boot(engine, 10, 2, Duration::from_millis(5))
            .err()
            .expect("init refusal must fail boot");
        assert!(matches!(
            err,
            CortexError::Boundary(ReservoirError::InitFailed { neuron_count: 10, fanout: 2 })
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_steps_until_stopped() {
        let engine = Arc::new(Mutex::new(RecordingReservoir::new("{}")));
        let shared: SharedReservoir = engine.clone();
        let mut supervisor = ReservoirSupervisor::new(shared, Duration::from_millis(5));

        supervisor.start();
        supervisor.start();
        assert!(supervisor.snapshot().running);
        tokio::time::sleep(Duration::from_millis(60)).await;
        supervisor.stop().await;

        let snap = supervisor.snapshot();
        assert!(!snap.running);
        assert!(snap.ticks >= 2);

        let steps = engine.lock().await.step_count() as u64;
        assert_eq!(steps, snap.ticks);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.lock().await.step_count() as u64, steps);
    }

    #[tokio::test]
    async fn test_step_errors_do_not_stop_heartbeat() {
        let mut engine = RecordingReservoir::new("{}");
        engine.fail_step_at = Some(1);
        let engine = Arc::new(Mutex::new(engine));
        let shared: SharedReservoir = engine.clone();
        let mut supervisor = ReservoirSupervisor::new(shared, Duration::from_millis(5));

        supervisor.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        supervisor.stop().await;

        let snap = supervisor.snapshot();
        assert_eq!(snap.failures, 1);
        assert!(snap.ticks >= 1);
        assert!(engine
            .lock()
            .await
            .calls
            .iter()
            .all(|c| *c == ReservoirCall::Step));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut supervisor =
            ReservoirSupervisor::new(reservoir::share(RecordingReservoir::new("{}")), Duration::from_secs(1));
        supervisor.stop().await;
        assert_eq!(supervisor.snapshot().ticks, 0);
    }
}
