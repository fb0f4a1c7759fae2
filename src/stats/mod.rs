//! Statistics Module
//!
//! - `rating`: ELO-style rating calculator with a tunable K-factor curve
//! - `ledger`: per-player, per-arena counters and derived ratios
//! - `store`: persistence contract plus JSON-file and in-memory stores

pub mod rating;
pub mod ledger;
pub mod store;

pub use rating::{KFactorCurve, Outcome, RatingCalculator};
pub use ledger::{ratio, PlayerStats, StatEvent, StatsError, StatsRecord};
pub use store::{JsonStatsStore, MemoryStatsStore, PersistError, StatsStore};
