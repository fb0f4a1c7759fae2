//! Countdown Timer
//!
//! Duration-based timer advanced by the host's tick source. Instead of a
//! self-rescheduling callback, the timer stores an explicit scheduled-task
//! handle that counts down host ticks until the next callback. Dropping the
//! handle cancels the chain synchronously.
//!
//! ## Callback cadence
//!
//! ```text
//! start()  -> remaining = duration, on_start, schedule min(remaining, 20)
//! callback -> remaining -= 20
//!             remaining == 0 ? (clear task, on_finish)
//!                            : (on_tick, schedule min(remaining, 20))
//! stop()   -> clear task, remaining = 0, on_finish
//! ```

use crate::TIMER_INTERVAL_TICKS;

/// Read-only view of the timer handed to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerStatus {
    /// Configured duration in ticks.
    pub duration: u64,
    /// Remaining ticks.
    pub remaining: u64,
}

/// Observer of timer transitions.
///
/// `C` is a caller-supplied context threaded through every callback, so a
/// listener can reach collaborators (e.g. a broadcaster) it does not own.
pub trait TimerListener<C: ?Sized> {
    /// Timer started.
    fn on_start(&mut self, _status: TimerStatus, _ctx: &mut C) {}
    /// A callback fired with time still remaining.
    fn on_tick(&mut self, _status: TimerStatus, _ctx: &mut C) {}
    /// Timer expired or was stopped.
    fn on_finish(&mut self, _status: TimerStatus, _ctx: &mut C) {}
}

impl<C: ?Sized> TimerListener<C> for () {}

/// Pending callback: host ticks until it fires.
#[derive(Clone, Copy, Debug)]
struct ScheduledTask {
    due_in: u64,
}

/// Outcome of advancing the timer by one host tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerProgress {
    /// No callback chain is scheduled.
    Idle,
    /// Scheduled, but the next callback is not due yet.
    Waiting,
    /// A callback fired and time remains.
    Ticked {
        /// Ticks still remaining.
        remaining: u64,
    },
    /// The countdown ran out on this tick.
    Finished,
}

/// Countdown timer with an attached listener.
#[derive(Debug)]
pub struct CountdownTimer<L> {
    duration: u64,
    remaining: u64,
    task: Option<ScheduledTask>,
    listener: L,
}

impl<L> CountdownTimer<L> {
    /// Create a stopped timer of `duration` ticks.
    pub fn new(duration: u64, listener: L) -> Self {
        Self {
            duration,
            remaining: 0,
            task: None,
            listener,
        }
    }

    /// True while a callback chain is scheduled.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Configured duration in ticks.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Change the duration used by the next `start()`.
    pub fn set_duration(&mut self, duration: u64) {
        self.duration = duration;
    }

    /// Remaining ticks (0 when stopped).
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Attached listener.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Attached listener, mutably.
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    fn status(&self) -> TimerStatus {
        TimerStatus {
            duration: self.duration,
            remaining: self.remaining,
        }
    }

    fn schedule_next(&mut self) {
        let next = self.remaining.min(TIMER_INTERVAL_TICKS).max(1);
        self.task = Some(ScheduledTask { due_in: next });
    }

    /// Start the countdown. No-op (returns false) if already running.
    pub fn start<C: ?Sized>(&mut self, ctx: &mut C) -> bool
    where
        L: TimerListener<C>,
    {
        if self.task.is_some() {
            return false;
        }
        self.remaining = self.duration;
        let status = self.status();
        self.listener.on_start(status, ctx);
        self.schedule_next();
        true
    }

    /// Cancel the countdown. No-op (returns false) if not running.
    pub fn stop<C: ?Sized>(&mut self, ctx: &mut C) -> bool
    where
        L: TimerListener<C>,
    {
        if self.task.take().is_none() {
            return false;
        }
        self.remaining = 0;
        let status = self.status();
        self.listener.on_finish(status, ctx);
        true
    }

    /// Advance by one host tick, firing a callback when one is due.
    pub fn tick<C: ?Sized>(&mut self, ctx: &mut C) -> TimerProgress
    where
        L: TimerListener<C>,
    {
        let Some(task) = self.task.as_mut() else {
            return TimerProgress::Idle;
        };

        task.due_in = task.due_in.saturating_sub(1);
        if task.due_in > 0 {
            return TimerProgress::Waiting;
        }

        self.remaining = self.remaining.saturating_sub(TIMER_INTERVAL_TICKS);
        if self.remaining == 0 {
            self.task = None;
            let status = self.status();
            self.listener.on_finish(status, ctx);
            return TimerProgress::Finished;
        }

        let status = self.status();
        self.listener.on_tick(status, ctx);
        self.schedule_next();
        TimerProgress::Ticked { remaining: self.remaining }
    }
}
