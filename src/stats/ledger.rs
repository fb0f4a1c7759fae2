//! Player Statistics Ledger
//!
//! Per-player, per-arena counters. Every mutating event marks the record
//! dirty; the owning arena flushes after each scoring event and at match end.
//! A failed write keeps the record dirty so the next flush retries it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::core::id::PlayerId;
use crate::stats::rating::Outcome;
use crate::stats::store::StatsStore;

/// Statistics errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    /// Event name not one of kill/death/win/loss/draw.
    #[error("unknown statistics event '{0}'")]
    UnknownEvent(String),
}

/// Countable events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatEvent {
    /// Killed another player.
    Kill,
    /// Was killed.
    Death,
    /// Won a match.
    Win,
    /// Lost a match.
    Loss,
    /// Drew a match.
    Draw,
}

impl StatEvent {
    /// Lower-case event name.
    pub fn as_str(self) -> &'static str {
        match self {
            StatEvent::Kill => "kill",
            StatEvent::Death => "death",
            StatEvent::Win => "win",
            StatEvent::Loss => "loss",
            StatEvent::Draw => "draw",
        }
    }
}

impl fmt::Display for StatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatEvent {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kill" | "kills" => Ok(StatEvent::Kill),
            "death" | "deaths" => Ok(StatEvent::Death),
            "win" | "wins" => Ok(StatEvent::Win),
            "loss" | "losses" => Ok(StatEvent::Loss),
            "draw" | "draws" => Ok(StatEvent::Draw),
            _ => Err(StatsError::UnknownEvent(s.to_string())),
        }
    }
}

impl From<Outcome> for StatEvent {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win => StatEvent::Win,
            Outcome::Draw => StatEvent::Draw,
            Outcome::Loss => StatEvent::Loss,
        }
    }
}

/// `x` when `y <= 1`, else `x / y` rounded to three decimals, never negative.
pub fn ratio(x: u32, y: u32) -> f64 {
    let value = if y <= 1 {
        f64::from(x)
    } else {
        (f64::from(x) / f64::from(y) * 1000.0).round() / 1000.0
    };
    value.max(0.0)
}

/// Persisted statistics for one player in one arena.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StatsRecord {
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
    /// Matches won.
    pub wins: u32,
    /// Matches lost.
    pub losses: u32,
    /// Matches drawn.
    pub draws: u32,
    /// Kills since the last death.
    pub kill_streak: u32,
    /// Wins since the last loss or draw.
    pub win_streak: u32,
    /// Ticks spent in running matches.
    pub time_played: u64,
    /// Kill/death ratio.
    pub kdr: f64,
    /// Win ratio.
    pub wlr: f64,
    /// Skill rating.
    pub rating: u32,
    /// Matches started per loadout class.
    pub class_usage: BTreeMap<String, u32>,
    /// End of the last match played.
    pub last_played: Option<DateTime<Utc>>,
}

impl StatsRecord {
    /// Fresh record with a starting rating.
    pub fn with_rating(rating: u32) -> Self {
        Self { rating, ..Self::default() }
    }

    /// Matches with a recorded result.
    pub fn games_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    fn apply(&mut self, event: StatEvent) {
        match event {
            StatEvent::Kill => {
                self.kills += 1;
                self.kill_streak += 1;
            }
            StatEvent::Death => {
                self.deaths += 1;
                self.kill_streak = 0;
            }
            StatEvent::Win => {
                self.wins += 1;
                self.win_streak += 1;
            }
            StatEvent::Loss => {
                self.losses += 1;
                self.win_streak = 0;
            }
            StatEvent::Draw => {
                self.draws += 1;
                self.win_streak = 0;
            }
        }
        self.kdr = ratio(self.kills, self.deaths);
        self.wlr = ratio(self.wins, self.losses + self.draws);
    }
}

/// Live ledger entry held by an arena while a player is a member.
#[derive(Clone, Debug)]
pub struct PlayerStats {
    player: PlayerId,
    arena: String,
    record: StatsRecord,
    tracking: bool,
    dirty: bool,
}

impl PlayerStats {
    /// Fresh entry with the given starting rating.
    pub fn new(player: PlayerId, arena: impl Into<String>, starting_rating: u32, tracking: bool) -> Self {
        Self {
            player,
            arena: arena.into(),
            record: StatsRecord::with_rating(starting_rating),
            tracking,
            dirty: false,
        }
    }

    /// Load from the store, falling back to a fresh record on a miss or a
    /// read failure.
    pub fn load(
        store: &dyn StatsStore,
        player: PlayerId,
        arena: &str,
        starting_rating: u32,
        tracking: bool,
    ) -> Self {
        let mut stats = Self::new(player, arena, starting_rating, tracking);
        match store.read(player, arena) {
            Ok(Some(record)) => stats.record = record,
            Ok(None) => {}
            Err(e) => {
                warn!(player = %player, arena = %arena, error = %e, "Failed to read stats, using defaults");
            }
        }
        stats
    }

    /// Owner.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Arena the record belongs to.
    pub fn arena(&self) -> &str {
        &self.arena
    }

    /// Current counters.
    pub fn record(&self) -> &StatsRecord {
        &self.record
    }

    /// Tracking enabled for this arena.
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Unwritten changes pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Matches with a recorded result.
    pub fn games_played(&self) -> u32 {
        self.record.games_played()
    }

    /// Current rating.
    pub fn rating(&self) -> u32 {
        self.record.rating
    }

    /// Count one event. Returns false when tracking is off.
    pub fn evaluate(&mut self, event: StatEvent) -> bool {
        if !self.tracking {
            return false;
        }
        self.record.apply(event);
        self.dirty = true;
        true
    }

    /// Count one event by name. Unknown names are an error.
    pub fn evaluate_named(&mut self, kind: &str) -> Result<bool, StatsError> {
        let event = kind.parse::<StatEvent>()?;
        Ok(self.evaluate(event))
    }

    /// Accumulate play time. Not flushed until the next write.
    pub fn add_time(&mut self, ticks: u64) {
        if !self.tracking || ticks == 0 {
            return;
        }
        self.record.time_played += ticks;
        self.dirty = true;
    }

    /// Overwrite the rating.
    pub fn set_rating(&mut self, rating: u32) {
        if !self.tracking || self.record.rating == rating {
            return;
        }
        self.record.rating = rating;
        self.dirty = true;
    }

    /// Count a match started with `class`.
    pub fn record_class(&mut self, class: &str) {
        if !self.tracking {
            return;
        }
        *self.record.class_usage.entry(class.to_string()).or_insert(0) += 1;
        self.dirty = true;
    }

    /// Stamp the end of a match.
    pub fn mark_played(&mut self, at: DateTime<Utc>) {
        if !self.tracking {
            return;
        }
        self.record.last_played = Some(at);
        self.dirty = true;
    }

    /// Write pending changes. On failure the entry stays dirty.
    pub fn flush(&mut self, store: &dyn StatsStore) -> bool {
        if !self.dirty {
            return true;
        }
        match store.write(self.player, &self.arena, &self.record) {
            Ok(()) => {
                self.dirty = false;
                true
            }
            Err(e) => {
                error!(player = %self.player, arena = %self.arena, error = %e, "Failed to write stats, will retry");
                false
            }
        }
    }
}
