//! Arena Events
//!
//! Lifecycle notifications raised by arenas. External hooks observe every
//! event; a veto is honoured only for cancelable ones (join, start).

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::id::PlayerId;

/// Arena lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArenaEvent {
    /// A player wants to join the lobby.
    PlayerJoin {
        /// Arena name.
        arena: String,
        /// Joining player.
        player: PlayerId,
    },

    /// A player left the arena.
    PlayerLeave {
        /// Arena name.
        arena: String,
        /// Leaving player.
        player: PlayerId,
        /// Removal happened as part of match end.
        match_ending: bool,
    },

    /// The match is about to start.
    ArenaStart {
        /// Arena name.
        arena: String,
        /// Lobby players at start.
        players: BTreeSet<PlayerId>,
    },

    /// The match ended.
    ArenaEnd {
        /// Arena name.
        arena: String,
        /// Declared winners (empty on draw).
        winners: BTreeSet<PlayerId>,
    },

    /// A player was kicked.
    PlayerKick {
        /// Arena name.
        arena: String,
        /// Kicked player.
        player: PlayerId,
    },
}

impl ArenaEvent {
    /// Event may be vetoed by a hook.
    pub fn is_cancelable(&self) -> bool {
        matches!(self, ArenaEvent::PlayerJoin { .. } | ArenaEvent::ArenaStart { .. })
    }

    /// Arena the event belongs to.
    pub fn arena(&self) -> &str {
        match self {
            ArenaEvent::PlayerJoin { arena, .. }
            | ArenaEvent::PlayerLeave { arena, .. }
            | ArenaEvent::ArenaStart { arena, .. }
            | ArenaEvent::ArenaEnd { arena, .. }
            | ArenaEvent::PlayerKick { arena, .. } => arena,
        }
    }
}

/// Hook decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Verdict {
    /// Let the event proceed.
    #[default]
    Allow,
    /// Cancel the event, with a reason shown to the player.
    Veto(String),
}

/// External observer of arena events.
pub trait EventHook: Send + Sync {
    /// Inspect an event. Vetoes of non-cancelable events are ignored.
    fn on_event(&self, _event: &ArenaEvent) -> Verdict {
        Verdict::Allow
    }
}

/// Run every hook over `event`. Returns the first veto reason, if the event
/// is cancelable and any hook vetoed it.
pub fn dispatch(hooks: &[std::sync::Arc<dyn EventHook>], event: &ArenaEvent) -> Option<String> {
    let mut veto = None;
    for hook in hooks {
        if let Verdict::Veto(reason) = hook.on_event(event) {
            if event.is_cancelable() && veto.is_none() {
                veto = Some(reason);
            }
        }
    }
    veto
}
