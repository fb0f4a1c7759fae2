//! Checkpoint Notifier
//!
//! Timer listener that broadcasts "N remaining" at configured thresholds.

use crate::core::time::{format_hhmmss, to_seconds};
use crate::host::messenger::Msg;
use crate::timer::countdown::{TimerListener, TimerStatus};

/// Broadcast sink the notifier talks to.
pub trait Broadcast {
    /// Send a message to everyone concerned.
    fn broadcast(&mut self, msg: Msg, args: &[String]);
}

/// Announces remaining time at each threshold (seconds).
#[derive(Clone, Debug)]
pub struct CheckpointNotifier {
    msg: Msg,
    thresholds: Vec<u64>,
    pending: Vec<u64>,
    next: usize,
}

impl CheckpointNotifier {
    /// Create a notifier. Thresholds may be given in any order.
    pub fn new(msg: Msg, thresholds: impl IntoIterator<Item = u64>) -> Self {
        let mut thresholds: Vec<u64> = thresholds.into_iter().collect();
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();
        Self {
            msg,
            thresholds,
            pending: Vec::new(),
            next: 0,
        }
    }

    /// Configured thresholds, descending.
    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    /// Thresholds still to be announced this run.
    pub fn pending(&self) -> &[u64] {
        self.pending.get(self.next..).unwrap_or(&[])
    }
}

impl<C: Broadcast + ?Sized> TimerListener<C> for CheckpointNotifier {
    fn on_start(&mut self, status: TimerStatus, _ctx: &mut C) {
        // Thresholds at or above the starting duration can never be hit
        let start = to_seconds(status.duration);
        self.pending = self.thresholds.iter().copied().filter(|t| *t < start).collect();
        self.next = 0;
    }

    fn on_tick(&mut self, status: TimerStatus, ctx: &mut C) {
        let left = to_seconds(status.remaining);
        while self.pending.get(self.next).is_some_and(|t| *t > left) {
            self.next += 1;
        }
        if self.pending.get(self.next) == Some(&left) {
            ctx.broadcast(self.msg, &[format_hhmmss(left)]);
            self.next += 1;
        }
    }

    fn on_finish(&mut self, _status: TimerStatus, _ctx: &mut C) {
        self.pending.clear();
        self.next = 0;
    }
}
