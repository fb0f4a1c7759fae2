//! Tick Driver
//!
//! Drives the arena manager from a tokio interval. The manager sits behind
//! an async mutex; ticks and administrative callers take the same lock, so
//! timer start/stop/tick never interleave with admin operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::arena::manager::ArenaManager;
use crate::arena::state::MatchSummary;
use crate::TICKS_PER_SECOND;

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Ticks per second.
    pub tick_rate: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICKS_PER_SECOND,
        }
    }
}

/// Owns the manager and the tick loop.
pub struct ArenaServer {
    config: RuntimeConfig,
    manager: Arc<Mutex<ArenaManager>>,
    ticks: Arc<AtomicU64>,
    summaries_tx: broadcast::Sender<MatchSummary>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ArenaServer {
    /// Wrap an initialized manager.
    pub fn new(config: RuntimeConfig, manager: ArenaManager) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (summaries_tx, _) = broadcast::channel(64);
        Self {
            config,
            manager: Arc::new(Mutex::new(manager)),
            ticks: Arc::new(AtomicU64::new(0)),
            summaries_tx,
            shutdown_tx,
        }
    }

    /// Shared handle for administrative callers.
    pub fn manager(&self) -> Arc<Mutex<ArenaManager>> {
        Arc::clone(&self.manager)
    }

    /// Ticks driven so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Receive every match summary produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchSummary> {
        self.summaries_tx.subscribe()
    }

    /// Sender that stops `run`.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Signal `run` to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Tick until shutdown, then force-end every arena.
    pub async fn run(&self) -> Vec<MatchSummary> {
        let period = Duration::from_micros(1_000_000 / self.config.tick_rate.max(1));
        let mut tick_interval = interval(period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(tick_rate = self.config.tick_rate, "Tick driver started");

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let ended = self.manager.lock().await.tick();
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                    for summary in ended {
                        debug!(arena = %summary.arena, draw = summary.draw, "Publishing match summary");
                        let _ = self.summaries_tx.send(summary);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let summaries = self.manager.lock().await.shutdown();
        info!(ticks = self.ticks(), "Tick driver stopped");
        summaries
    }
}
