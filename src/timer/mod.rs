//! Timer Module
//!
//! - `countdown`: tick-driven countdown with start/tick/finish hooks
//! - `checkpoint`: remaining-time broadcasts at configured thresholds

pub mod countdown;
pub mod checkpoint;

pub use countdown::{CountdownTimer, TimerListener, TimerProgress, TimerStatus};
pub use checkpoint::{Broadcast, CheckpointNotifier};
