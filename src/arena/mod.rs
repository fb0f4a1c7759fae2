//! Arena Module
//!
//! Match orchestration on top of the timer and stats layers.
//!
//! - `state`: one arena's state machine (lobby, running, ending)
//! - `manager`: registry of arenas built from the config store
//! - `mode`: scoring rules per game mode and their registry
//! - `loadout`: equipment classes
//! - `snapshot`: player state saved on entry and restored on exit
//! - `events`: lifecycle events and vetoing hooks
//! - `ability`: item-triggered abilities with permission nodes and cooldowns

pub mod ability;
pub mod events;
pub mod loadout;
pub mod manager;
pub mod mode;
pub mod snapshot;
pub mod state;

pub use ability::{Ability, AbilityError, AbilityRegistry, AbilitySet, Cooldown};
pub use events::{ArenaEvent, EventHook, Verdict};
pub use loadout::{LoadoutClass, LoadoutRegistry};
pub use manager::{ArenaManager, ManagerError};
pub use mode::{FreeForAll, GameMode, MatchView, ModeRegistry, Team, Teams};
pub use snapshot::PlayerSnapshot;
pub use state::{
    Arena, ArenaError, ArenaParts, ArenaPhase, ArenaWarps, MatchSummary, PlayerOutcome, Services, WarpKind,
};
