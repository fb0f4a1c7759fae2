//! Player Snapshot
//!
//! Transient player state captured on entering an arena and written back on
//! leaving. Snapshots live only in memory and are consumed by `restore`, so
//! each capture is restored at most once.

use std::collections::BTreeSet;

use crate::core::id::PlayerId;
use crate::core::location::Location;
use crate::host::{Equipment, Movement, PlayerHost, Vitals};

/// Captured player state.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSnapshot {
    player: PlayerId,
    equipment: Equipment,
    vitals: Vitals,
    movement: Movement,
    location: Location,
    hidden_from: BTreeSet<PlayerId>,
}

impl PlayerSnapshot {
    /// Capture the current state. `None` for offline players.
    pub fn capture(host: &dyn PlayerHost, player: PlayerId) -> Option<Self> {
        if !host.is_online(player) {
            return None;
        }
        Some(Self {
            player,
            equipment: host.equipment(player),
            vitals: host.vitals(player),
            movement: host.movement(player),
            location: host.location(player),
            hidden_from: host.hidden_from(player),
        })
    }

    /// Player the snapshot belongs to.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Where the player stood when captured.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Viewers the player was hidden from when captured.
    pub fn hidden_from(&self) -> &BTreeSet<PlayerId> {
        &self.hidden_from
    }

    /// Write everything back, optionally teleporting to the captured location.
    ///
    /// Visibility exceptions picked up during the match are cleared; the ones
    /// held before the match are re-applied.
    pub fn restore(self, host: &dyn PlayerHost, teleport_back: bool) {
        let player = self.player;
        host.set_equipment(player, self.equipment);
        host.set_vitals(player, self.vitals);
        host.set_movement(player, self.movement);

        host.show_to_all(player);
        for viewer in self.hidden_from {
            host.hide_from(player, viewer);
        }

        if teleport_back {
            host.teleport(player, &self.location);
        }
    }
}
