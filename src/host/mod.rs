//! Host Collaborators
//!
//! The match core never touches player sessions, worlds or chat directly.
//! It goes through these narrow traits, implemented by the host runtime.
//!
//! - `PlayerHost`: read/write a player's transient state, permissions, kicks
//! - `Worlds`: world-name resolution for configured locations
//! - `messenger`: template-keyed player messaging
//! - `memory`: in-memory implementations for tests and the demo binary

pub mod messenger;
pub mod memory;

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::core::id::PlayerId;
use crate::core::location::Location;

pub use messenger::{LogMessenger, Messenger, Msg};
pub use memory::{InMemoryHost, RecordingMessenger};

// =============================================================================
// EQUIPMENT
// =============================================================================

/// A stack of one item type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item type identifier.
    pub material: String,
    /// Stack size.
    #[serde(default = "default_amount")]
    pub amount: u32,
}

fn default_amount() -> u32 {
    1
}

impl ItemStack {
    /// Create a stack.
    pub fn new(material: impl Into<String>, amount: u32) -> Self {
        Self { material: material.into(), amount }
    }
}

/// Worn armour pieces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Armor {
    /// Head slot.
    #[serde(default)]
    pub helmet: Option<ItemStack>,
    /// Chest slot.
    #[serde(default)]
    pub chestplate: Option<ItemStack>,
    /// Legs slot.
    #[serde(default)]
    pub leggings: Option<ItemStack>,
    /// Feet slot.
    #[serde(default)]
    pub boots: Option<ItemStack>,
}

/// Everything a player carries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    /// Inventory slots by index.
    pub slots: BTreeMap<u8, ItemStack>,
    /// Worn armour.
    pub armor: Armor,
    /// Main-hand item.
    pub main_hand: Option<ItemStack>,
    /// Off-hand item.
    pub off_hand: Option<ItemStack>,
}

impl Equipment {
    /// True when nothing is carried or worn.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
            && self.armor == Armor::default()
            && self.main_hand.is_none()
            && self.off_hand.is_none()
    }
}

// =============================================================================
// VITALS & MOVEMENT
// =============================================================================

/// Health, hunger and experience.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Health points.
    pub health: f64,
    /// Food level.
    pub food: u32,
    /// Experience level.
    pub level: u32,
    /// Progress towards the next level (0..1).
    pub experience: f32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: 20.0,
            food: 20,
            level: 0,
            experience: 0.0,
        }
    }
}

/// Host game mode governing how a player moves and interacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    /// Normal play.
    #[default]
    Survival,
    /// No block interaction.
    Adventure,
    /// Free building and flight.
    Creative,
    /// Invisible observer.
    Spectator,
}

/// Movement state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Host game mode.
    pub mode: GameMode,
    /// Currently flying.
    pub flying: bool,
}

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================

/// Access to live player sessions owned by the host runtime.
///
/// Getters on offline players return defaults; setters on offline players
/// are ignored.
pub trait PlayerHost: Send + Sync {
    /// Player currently connected.
    fn is_online(&self, player: PlayerId) -> bool;
    /// Name shown in messages.
    fn display_name(&self, player: PlayerId) -> String;
    /// Permission check.
    fn has_permission(&self, player: PlayerId, node: &str) -> bool;
    /// Register a permission node granted by default.
    fn register_permission(&self, node: &str);
    /// Revoke a previously registered node.
    fn unregister_permission(&self, node: &str);

    /// Current equipment.
    fn equipment(&self, player: PlayerId) -> Equipment;
    /// Replace equipment wholesale.
    fn set_equipment(&self, player: PlayerId, equipment: Equipment);
    /// Current vitals.
    fn vitals(&self, player: PlayerId) -> Vitals;
    /// Overwrite vitals.
    fn set_vitals(&self, player: PlayerId, vitals: Vitals);
    /// Current movement state.
    fn movement(&self, player: PlayerId) -> Movement;
    /// Overwrite movement state.
    fn set_movement(&self, player: PlayerId, movement: Movement);

    /// Current location.
    fn location(&self, player: PlayerId) -> Location;
    /// Move the player.
    fn teleport(&self, player: PlayerId, location: &Location);

    /// Players who currently cannot see `player`.
    fn hidden_from(&self, player: PlayerId) -> BTreeSet<PlayerId>;
    /// Hide `player` from `viewer`.
    fn hide_from(&self, player: PlayerId, viewer: PlayerId);
    /// Make `player` visible to everyone again.
    fn show_to_all(&self, player: PlayerId);

    /// Disconnect the player from the server.
    fn disconnect(&self, player: PlayerId, reason: &str);
}

/// World lookup for configured locations.
pub trait Worlds: Send + Sync {
    /// World with this name is loaded.
    fn world_exists(&self, name: &str) -> bool;
    /// Fallback world used when a referenced one is missing.
    fn default_world(&self) -> String;
}
