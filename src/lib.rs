//! # Arena Match Server
//!
//! Competitive match orchestration: arenas with lobbies and spectators,
//! countdown-driven matches, per-arena player statistics and skill ratings.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ARENA MATCH SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Identity, locations, time units           │
//! │  timer/          - Tick-driven countdown and checkpoints     │
//! │  stats/          - Ratings, ledger, persistence              │
//! │  host/           - Player host, worlds and messenger traits  │
//! │  config/         - Hierarchical JSON configuration           │
//! │                                                              │
//! │  arena/          - Match orchestration                       │
//! │  ├── state.rs    - Arena state machine                       │
//! │  ├── manager.rs  - Arena registry                            │
//! │  ├── mode.rs     - Scoring rules per game mode               │
//! │  ├── loadout.rs  - Equipment classes                         │
//! │  ├── snapshot.rs - Player state save/restore                 │
//! │  ├── events.rs   - Lifecycle events and hooks                │
//! │  └── ability.rs  - Abilities and cooldowns                   │
//! │                                                              │
//! │  runtime/        - Async tick driver                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Threading
//!
//! All arena state is mutated from one logical thread. The runtime keeps
//! the manager behind a single async mutex shared by the tick loop and
//! administrative callers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod core;
pub mod host;
pub mod runtime;
pub mod stats;
pub mod timer;

// Re-export commonly used types
pub use arena::{Arena, ArenaError, ArenaManager, ManagerError, MatchSummary, Services, WarpKind};
pub use config::{ConfigError, ConfigStore};
pub use core::{Location, PlayerId};
pub use runtime::{ArenaServer, RuntimeConfig};
pub use stats::{RatingCalculator, StatsRecord, StatsStore};
pub use timer::CountdownTimer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Host tick rate (Hz)
pub const TICKS_PER_SECOND: u64 = 20;

/// Ticks between countdown callbacks (one second)
pub const TIMER_INTERVAL_TICKS: u64 = 20;
