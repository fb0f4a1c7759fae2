//! Abilities
//!
//! Item-triggered actions usable by active players mid-match. Every ability
//! is gated behind the `abilities.<name>` permission node and consumes one
//! trigger item per use. Abilities with a cooldown refuse reuse until the
//! window (in ticks) has passed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::core::id::PlayerId;
use crate::host::messenger::{Messenger, Msg};
use crate::host::{Equipment, PlayerHost, Vitals};
use crate::TICKS_PER_SECOND;

/// Permission node guarding an ability.
pub fn permission_node(ability: &str) -> String {
    format!("abilities.{}", ability.to_lowercase())
}

/// Ability use rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbilityError {
    /// No ability registered under that key.
    #[error("no ability named '{0}'")]
    Unknown(String),

    /// Missing the ability permission.
    #[error("no permission to use '{0}'")]
    NotPermitted(String),

    /// Used again inside the cooldown window.
    #[error("'{ability}' is cooling down for {remaining} more ticks")]
    CoolingDown {
        /// Ability key.
        ability: String,
        /// Ticks until it may be used.
        remaining: u64,
    },

    /// Player carries none of the trigger item.
    #[error("no {0} to use")]
    MissingItem(String),
}

// =============================================================================
// ABILITY
// =============================================================================

/// What an ability may act on when it fires.
pub struct AbilityContext<'a> {
    /// Player sessions.
    pub host: &'a dyn PlayerHost,
    /// Player messaging.
    pub messenger: &'a dyn Messenger,
    /// Active players of the match, user included.
    pub players: &'a BTreeSet<PlayerId>,
}

/// One usable ability.
pub trait Ability: Send + Sync + fmt::Debug {
    /// Registry key, also the permission suffix.
    fn key(&self) -> &'static str;

    /// Item consumed per use.
    fn material(&self) -> &str;

    /// Ticks between uses; zero for none.
    fn cooldown(&self) -> u64 {
        0
    }

    /// Apply the effect.
    fn on_use(&self, player: PlayerId, ctx: &AbilityContext<'_>);
}

/// Restores the user to full health.
#[derive(Debug, Default)]
pub struct Heal;

impl Heal {
    /// Registry key.
    pub const KEY: &'static str = "heal";
}

impl Ability for Heal {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn material(&self) -> &str {
        "golden_apple"
    }

    fn cooldown(&self) -> u64 {
        30 * TICKS_PER_SECOND
    }

    fn on_use(&self, player: PlayerId, ctx: &AbilityContext<'_>) {
        let mut vitals = ctx.host.vitals(player);
        vitals.health = Vitals::default().health;
        ctx.host.set_vitals(player, vitals);
    }
}

// =============================================================================
// COOLDOWN
// =============================================================================

/// Per-player reuse window measured in ticks.
#[derive(Clone, Debug, Default)]
pub struct Cooldown {
    ticks: u64,
    ready_at: BTreeMap<PlayerId, u64>,
}

impl Cooldown {
    /// Window of `ticks` after each use.
    pub fn new(ticks: u64) -> Self {
        Self { ticks, ready_at: BTreeMap::new() }
    }

    /// Window length.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks until `player` may use it again at `now`.
    pub fn remaining(&self, player: PlayerId, now: u64) -> u64 {
        self.ready_at.get(&player).map_or(0, |at| at.saturating_sub(now))
    }

    /// Refuse inside the window, telling the player how long is left.
    pub fn check(&self, player: PlayerId, now: u64, messenger: &dyn Messenger) -> Result<(), u64> {
        let remaining = self.remaining(player, now);
        if remaining == 0 {
            return Ok(());
        }
        let seconds = remaining as f64 / TICKS_PER_SECOND as f64;
        messenger.tell(player, Msg::AbilityCooldown, &[format!("{:.2}", seconds)]);
        Err(remaining)
    }

    /// Open the window for `player` at `now`.
    pub fn start(&mut self, player: PlayerId, now: u64) {
        if self.ticks > 0 {
            self.ready_at.insert(player, now + self.ticks);
        }
    }

    /// Forget every window.
    pub fn clear(&mut self) {
        self.ready_at.clear();
    }
}

// =============================================================================
// ABILITY SET
// =============================================================================

struct Slot {
    ability: Box<dyn Ability>,
    cooldown: Cooldown,
}

/// Live abilities of one arena with their cooldowns.
#[derive(Default)]
pub struct AbilitySet {
    slots: BTreeMap<String, Slot>,
}

impl fmt::Debug for AbilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.keys()).finish()
    }
}

impl AbilitySet {
    /// No abilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an ability.
    pub fn insert(&mut self, ability: Box<dyn Ability>) {
        let cooldown = Cooldown::new(ability.cooldown());
        self.slots.insert(ability.key().to_lowercase(), Slot { ability, cooldown });
    }

    /// Find an ability by key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&dyn Ability> {
        self.slots.get(&key.to_lowercase()).map(|s| &*s.ability)
    }

    /// Ability triggered by `material`.
    pub fn for_material(&self, material: &str) -> Option<&dyn Ability> {
        self.slots
            .values()
            .map(|s| &*s.ability)
            .find(|a| a.material() == material)
    }

    /// Known keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Number of abilities.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// No abilities.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Ticks until `player` may use `key` again.
    pub fn remaining(&self, player: PlayerId, key: &str, now: u64) -> u64 {
        self.slots
            .get(&key.to_lowercase())
            .map_or(0, |s| s.cooldown.remaining(player, now))
    }

    /// Use `key` at tick `now`: permission, cooldown, then one trigger item.
    /// Refusals for permission and cooldown are told to the player.
    pub fn use_ability(
        &mut self,
        player: PlayerId,
        key: &str,
        now: u64,
        ctx: &AbilityContext<'_>,
    ) -> Result<(), AbilityError> {
        let slot = self
            .slots
            .get_mut(&key.to_lowercase())
            .ok_or_else(|| AbilityError::Unknown(key.to_string()))?;
        let name = slot.ability.key();

        if !ctx.host.has_permission(player, &permission_node(name)) {
            ctx.messenger.tell(player, Msg::AbilityNoPermission, &[]);
            return Err(AbilityError::NotPermitted(name.to_string()));
        }
        if let Err(remaining) = slot.cooldown.check(player, now, ctx.messenger) {
            return Err(AbilityError::CoolingDown { ability: name.to_string(), remaining });
        }
        if !take_one(ctx.host, player, slot.ability.material()) {
            return Err(AbilityError::MissingItem(slot.ability.material().to_string()));
        }

        slot.cooldown.start(player, now);
        slot.ability.on_use(player, ctx);
        debug!(player = %player, ability = name, "Ability used");
        Ok(())
    }

    /// Forget every cooldown.
    pub fn clear_cooldowns(&mut self) {
        for slot in self.slots.values_mut() {
            slot.cooldown.clear();
        }
    }
}

/// Remove one `material` item, hands first. False when none is carried.
fn take_one(host: &dyn PlayerHost, player: PlayerId, material: &str) -> bool {
    let mut equipment = host.equipment(player);
    if !remove_one(&mut equipment, material) {
        return false;
    }
    host.set_equipment(player, equipment);
    true
}

fn remove_one(equipment: &mut Equipment, material: &str) -> bool {
    for hand in [&mut equipment.main_hand, &mut equipment.off_hand] {
        if let Some(stack) = hand.as_mut().filter(|s| s.material == material && s.amount > 0) {
            stack.amount -= 1;
            if stack.amount == 0 {
                *hand = None;
            }
            return true;
        }
    }
    let slot = equipment
        .slots
        .iter()
        .find(|(_, s)| s.material == material && s.amount > 0)
        .map(|(slot, _)| *slot);
    let Some(slot) = slot else {
        return false;
    };
    if let Some(stack) = equipment.slots.get_mut(&slot) {
        stack.amount -= 1;
        if stack.amount == 0 {
            equipment.slots.remove(&slot);
        }
    }
    true
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Builds a fresh ability.
pub type AbilityFactory = fn() -> Box<dyn Ability>;

/// Ability key to factory.
#[derive(Clone)]
pub struct AbilityRegistry {
    factories: BTreeMap<String, AbilityFactory>,
}

impl fmt::Debug for AbilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl AbilityRegistry {
    /// Registry with no abilities.
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Add or replace the ability the factory builds.
    pub fn register(&mut self, factory: AbilityFactory) {
        let key = factory().key().to_lowercase();
        self.factories.insert(key, factory);
    }

    /// Known keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the ability named `key`, ignoring case.
    pub fn create(&self, key: &str) -> Option<Box<dyn Ability>> {
        self.factories.get(&key.to_lowercase()).map(|f| f())
    }

    /// Fresh set of every ability, with no cooldowns running.
    pub fn instantiate(&self) -> AbilitySet {
        let mut set = AbilitySet::new();
        for factory in self.factories.values() {
            set.insert(factory());
        }
        set
    }

    /// Register every ability node with the host.
    pub fn register_permissions(&self, host: &dyn PlayerHost) {
        for key in self.keys() {
            host.register_permission(&permission_node(key));
        }
    }
}

fn heal() -> Box<dyn Ability> {
    Box::new(Heal)
}

impl Default for AbilityRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(heal);
        registry
    }
}
