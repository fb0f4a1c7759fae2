//! Loadout Classes
//!
//! Named equipment bundles a player picks before a match. A class may be
//! gated behind the `classes.<name>` permission node.

use std::collections::BTreeMap;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::config::ClassSection;
use crate::core::id::PlayerId;
use crate::host::{Armor, Equipment, ItemStack, PlayerHost};

/// Largest stack an inventory slot holds.
pub const MAX_STACK_SIZE: u32 = 64;

/// Inventory slots available to a class.
pub const INVENTORY_SLOTS: usize = 36;

/// One loadout class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadoutClass {
    name: String,
    items: Vec<ItemStack>,
    armor: Armor,
    permission: bool,
}

impl LoadoutClass {
    /// Build from a config definition, splitting oversized stacks.
    pub fn from_section(name: impl Into<String>, section: &ClassSection) -> Self {
        let name = name.into();
        let mut items = Vec::new();
        let mut dropped = 0u64;
        for stack in &section.items {
            let mut left = stack.amount;
            while left > 0 && items.len() < INVENTORY_SLOTS {
                let amount = left.min(MAX_STACK_SIZE);
                items.push(ItemStack::new(stack.material.clone(), amount));
                left -= amount;
            }
            dropped += u64::from(left);
        }
        if dropped > 0 {
            warn!(class = %name, dropped, "Class has more stacks than inventory slots, extra items dropped");
        }
        Self {
            name,
            items,
            armor: section.armor.clone(),
            permission: section.permission,
        }
    }

    /// Display name as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-case name, used for lookups and permission nodes.
    pub fn lowercase_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Inventory contents after stack splitting.
    pub fn items(&self) -> &[ItemStack] {
        &self.items
    }

    /// Worn armour.
    pub fn armor(&self) -> &Armor {
        &self.armor
    }

    /// Permission node, if the class is gated.
    pub fn permission_node(&self) -> Option<String> {
        self.permission.then(|| format!("classes.{}", self.lowercase_name()))
    }

    /// May `player` use this class.
    pub fn is_permitted(&self, host: &dyn PlayerHost, player: PlayerId) -> bool {
        match self.permission_node() {
            Some(node) => host.has_permission(player, &node),
            None => true,
        }
    }

    /// Equipment a player receives.
    pub fn equipment(&self) -> Equipment {
        Equipment {
            slots: self
                .items
                .iter()
                .enumerate()
                .map(|(slot, stack)| (slot as u8, stack.clone()))
                .collect(),
            armor: self.armor.clone(),
            main_hand: None,
            off_hand: None,
        }
    }

    /// Replace the player's equipment with this class.
    pub fn give(&self, host: &dyn PlayerHost, player: PlayerId) {
        host.set_equipment(player, self.equipment());
    }
}

/// Case-insensitive class lookup.
#[derive(Clone, Debug, Default)]
pub struct LoadoutRegistry {
    classes: BTreeMap<String, LoadoutClass>,
}

impl LoadoutRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `classes` config section.
    pub fn from_config(sections: &BTreeMap<String, ClassSection>) -> Self {
        let mut registry = Self::new();
        for (name, section) in sections {
            registry.insert(LoadoutClass::from_section(name.clone(), section));
        }
        registry
    }

    /// Add or replace a class.
    pub fn insert(&mut self, class: LoadoutClass) {
        self.classes.insert(class.lowercase_name(), class);
    }

    /// Find a class by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&LoadoutClass> {
        self.classes.get(&name.to_lowercase())
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// No classes configured.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// All classes, sorted by lower-case name.
    pub fn iter(&self) -> impl Iterator<Item = &LoadoutClass> {
        self.classes.values()
    }

    /// Classes `player` may use.
    pub fn permitted(&self, host: &dyn PlayerHost, player: PlayerId) -> Vec<&LoadoutClass> {
        self.iter().filter(|c| c.is_permitted(host, player)).collect()
    }

    /// Uniformly random permitted class, `None` if the player holds none.
    pub fn random_permitted<R: Rng + ?Sized>(
        &self,
        host: &dyn PlayerHost,
        player: PlayerId,
        rng: &mut R,
    ) -> Option<&LoadoutClass> {
        self.permitted(host, player).choose(rng).copied()
    }

    /// Register every gating node with the host.
    pub fn register_permissions(&self, host: &dyn PlayerHost) {
        for node in self.iter().filter_map(LoadoutClass::permission_node) {
            host.register_permission(&node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::InMemoryHost;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn section(items: Vec<ItemStack>, permission: bool) -> ClassSection {
        ClassSection {
            items,
            armor: Armor::default(),
            permission,
        }
    }

    #[test]
    fn test_stack_splitting() {
        let class = LoadoutClass::from_section("Archer", &section(vec![ItemStack::new("arrow", 130)], false));
        let amounts: Vec<u32> = class.items().iter().map(|s| s.amount).collect();
        assert_eq!(amounts, vec![64, 64, 2]);
        assert_eq!(class.equipment().slots.len(), 3);
    }

    #[test]
    fn test_huge_amount_fills_inventory() {
        let class = LoadoutClass::from_section(
            "Hoarder",
            &section(vec![ItemStack::new("dirt", u32::MAX), ItemStack::new("torch", 10)], false),
        );
        assert_eq!(class.items().len(), INVENTORY_SLOTS);
        assert!(class.items().iter().all(|s| s.material == "dirt" && s.amount == MAX_STACK_SIZE));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut sections = BTreeMap::new();
        sections.insert("Knight".to_string(), section(vec![], false));
        let registry = LoadoutRegistry::from_config(&sections);
        assert_eq!(registry.get("knight").map(|c| c.name()), Some("Knight"));
        assert_eq!(registry.get("KNIGHT").map(|c| c.name()), Some("Knight"));
        assert!(registry.get("archer").is_none());
    }

    #[test]
    fn test_permission_gating() {
        let host = InMemoryHost::default();
        let alice = host.connect("alice");

        let mut sections = BTreeMap::new();
        sections.insert("Knight".to_string(), section(vec![], true));
        sections.insert("Archer".to_string(), section(vec![], true));
        sections.insert("Peasant".to_string(), section(vec![], false));
        let registry = LoadoutRegistry::from_config(&sections);

        registry.register_permissions(&host);
        assert_eq!(
            host.registered_permissions().into_iter().collect::<Vec<_>>(),
            vec!["classes.archer".to_string(), "classes.knight".to_string()]
        );

        host.deny(alice, "classes.knight");
        let names: Vec<&str> = registry.permitted(&host, alice).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Archer", "Peasant"]);
    }

    #[test]
    fn test_random_permitted() {
        let host = InMemoryHost::default();
        let alice = host.connect("alice");
        let mut sections = BTreeMap::new();
        sections.insert("Knight".to_string(), section(vec![], true));
        let registry = LoadoutRegistry::from_config(&sections);
        let mut rng = StdRng::seed_from_u64(7);

        assert_eq!(registry.random_permitted(&host, alice, &mut rng).map(|c| c.name()), Some("Knight"));
        host.deny(alice, "classes.knight");
        assert!(registry.random_permitted(&host, alice, &mut rng).is_none());
    }
}
