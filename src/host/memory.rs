//! In-memory host implementations for tests and the demo binary.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::core::id::PlayerId;
use crate::core::location::Location;
use crate::host::messenger::{Messenger, Msg};
use crate::host::{Equipment, Movement, PlayerHost, Vitals, Worlds};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State of one simulated player.
#[derive(Clone, Debug, Default)]
pub struct HostPlayer {
    /// Display name.
    pub name: String,
    /// Connected.
    pub online: bool,
    /// Carried items.
    pub equipment: Equipment,
    /// Health and experience.
    pub vitals: Vitals,
    /// Movement state.
    pub movement: Movement,
    /// Position.
    pub location: Location,
    /// Viewers that cannot see this player.
    pub hidden_from: BTreeSet<PlayerId>,
    /// Nodes explicitly denied to this player.
    pub denied: BTreeSet<String>,
    /// Reason given on the last disconnect.
    pub kicked: Option<String>,
    /// Every location teleported to, in order.
    pub teleports: Vec<Location>,
}

#[derive(Debug, Default)]
struct HostState {
    players: BTreeMap<PlayerId, HostPlayer>,
    registered: BTreeSet<String>,
    worlds: BTreeSet<String>,
}

/// Player host backed by a map of simulated players.
///
/// Permissions are granted unless the node is explicitly denied for the
/// player. Registered nodes are tracked for inspection.
#[derive(Debug)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    default_world: String,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new("world")
    }
}

impl InMemoryHost {
    /// Create a host whose only world is `default_world`.
    pub fn new(default_world: impl Into<String>) -> Self {
        let default_world = default_world.into();
        let mut state = HostState::default();
        state.worlds.insert(default_world.clone());
        Self {
            state: Mutex::new(state),
            default_world,
        }
    }

    /// Add a loaded world.
    pub fn add_world(&self, name: impl Into<String>) {
        lock(&self.state).worlds.insert(name.into());
    }

    /// Connect a new player with default state at the default world spawn.
    pub fn connect(&self, name: impl Into<String>) -> PlayerId {
        let id = PlayerId::random();
        let player = HostPlayer {
            name: name.into(),
            online: true,
            location: Location::new(0.0, 64.0, 0.0).in_world(&self.default_world),
            ..HostPlayer::default()
        };
        lock(&self.state).players.insert(id, player);
        id
    }

    /// Deny a permission node to one player.
    pub fn deny(&self, player: PlayerId, node: impl Into<String>) {
        if let Some(p) = lock(&self.state).players.get_mut(&player) {
            p.denied.insert(node.into());
        }
    }

    /// Copy of a player's simulated state.
    pub fn player(&self, player: PlayerId) -> Option<HostPlayer> {
        lock(&self.state).players.get(&player).cloned()
    }

    /// Mutate a player's simulated state in place.
    pub fn with_player<R>(&self, player: PlayerId, f: impl FnOnce(&mut HostPlayer) -> R) -> Option<R> {
        lock(&self.state).players.get_mut(&player).map(f)
    }

    /// Permission nodes registered so far.
    pub fn registered_permissions(&self) -> BTreeSet<String> {
        lock(&self.state).registered.clone()
    }

    fn read<R: Default>(&self, player: PlayerId, f: impl FnOnce(&HostPlayer) -> R) -> R {
        lock(&self.state).players.get(&player).map(f).unwrap_or_default()
    }

    fn write(&self, player: PlayerId, f: impl FnOnce(&mut HostPlayer)) {
        if let Some(p) = lock(&self.state).players.get_mut(&player) {
            if p.online {
                f(p);
            }
        }
    }
}

impl PlayerHost for InMemoryHost {
    fn is_online(&self, player: PlayerId) -> bool {
        self.read(player, |p| p.online)
    }

    fn display_name(&self, player: PlayerId) -> String {
        lock(&self.state)
            .players
            .get(&player)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| player.to_string())
    }

    fn has_permission(&self, player: PlayerId, node: &str) -> bool {
        self.read(player, |p| !p.denied.contains(node))
    }

    fn register_permission(&self, node: &str) {
        lock(&self.state).registered.insert(node.to_string());
    }

    fn unregister_permission(&self, node: &str) {
        lock(&self.state).registered.remove(node);
    }

    fn equipment(&self, player: PlayerId) -> Equipment {
        self.read(player, |p| p.equipment.clone())
    }

    fn set_equipment(&self, player: PlayerId, equipment: Equipment) {
        self.write(player, |p| p.equipment = equipment);
    }

    fn vitals(&self, player: PlayerId) -> Vitals {
        self.read(player, |p| p.vitals)
    }

    fn set_vitals(&self, player: PlayerId, vitals: Vitals) {
        self.write(player, |p| p.vitals = vitals);
    }

    fn movement(&self, player: PlayerId) -> Movement {
        self.read(player, |p| p.movement)
    }

    fn set_movement(&self, player: PlayerId, movement: Movement) {
        self.write(player, |p| p.movement = movement);
    }

    fn location(&self, player: PlayerId) -> Location {
        self.read(player, |p| p.location.clone())
    }

    fn teleport(&self, player: PlayerId, location: &Location) {
        self.write(player, |p| {
            p.location = location.clone();
            p.teleports.push(location.clone());
        });
    }

    fn hidden_from(&self, player: PlayerId) -> BTreeSet<PlayerId> {
        self.read(player, |p| p.hidden_from.clone())
    }

    fn hide_from(&self, player: PlayerId, viewer: PlayerId) {
        self.write(player, |p| {
            p.hidden_from.insert(viewer);
        });
    }

    fn show_to_all(&self, player: PlayerId) {
        self.write(player, |p| p.hidden_from.clear());
    }

    fn disconnect(&self, player: PlayerId, reason: &str) {
        self.write(player, |p| {
            p.online = false;
            p.kicked = Some(reason.to_string());
        });
    }
}

impl Worlds for InMemoryHost {
    fn world_exists(&self, name: &str) -> bool {
        lock(&self.state).worlds.contains(name)
    }

    fn default_world(&self) -> String {
        self.default_world.clone()
    }
}

/// One delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    /// Recipient.
    pub to: PlayerId,
    /// Template key.
    pub msg: Msg,
    /// Positional arguments.
    pub args: Vec<String>,
}

/// Messenger that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Delivered>>,
}

impl RecordingMessenger {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain recorded messages.
    pub fn take(&self) -> Vec<Delivered> {
        std::mem::take(&mut *lock(&self.sent))
    }

    /// Messages delivered to `player` with key `msg`.
    pub fn count(&self, player: PlayerId, msg: Msg) -> usize {
        lock(&self.sent).iter().filter(|d| d.to == player && d.msg == msg).count()
    }

    /// Arguments of the last message with key `msg`, to anyone.
    pub fn last_args(&self, msg: Msg) -> Option<Vec<String>> {
        lock(&self.sent).iter().rev().find(|d| d.msg == msg).map(|d| d.args.clone())
    }
}

impl Messenger for RecordingMessenger {
    fn tell(&self, recipient: PlayerId, msg: Msg, args: &[String]) {
        lock(&self.sent).push(Delivered {
            to: recipient,
            msg,
            args: args.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_players_ignore_writes() {
        let host = InMemoryHost::default();
        let id = host.connect("alice");
        host.disconnect(id, "bye");
        host.set_vitals(id, Vitals { health: 1.0, ..Vitals::default() });
        assert_eq!(host.player(id).unwrap().vitals, Vitals::default());
        assert_eq!(host.player(id).unwrap().kicked.as_deref(), Some("bye"));
        assert!(!host.is_online(id));
    }

    #[test]
    fn test_permission_denial() {
        let host = InMemoryHost::default();
        let id = host.connect("bob");
        assert!(host.has_permission(id, "classes.archer"));
        host.deny(id, "classes.archer");
        assert!(!host.has_permission(id, "classes.archer"));
        assert!(!host.has_permission(PlayerId::random(), "anything"));
    }

    #[test]
    fn test_recording_messenger() {
        let messenger = RecordingMessenger::new();
        let a = PlayerId::new([1; 16]);
        let b = PlayerId::new([2; 16]);
        messenger.announce(&[a, b], Msg::ArenaStarted, &["koth".to_string()]);
        assert_eq!(messenger.count(a, Msg::ArenaStarted), 1);
        assert_eq!(messenger.last_args(Msg::ArenaStarted), Some(vec!["koth".to_string()]));
        assert_eq!(messenger.take().len(), 2);
        assert_eq!(messenger.take().len(), 0);
    }
}
