//! Arena Manager
//!
//! Registry of every configured arena. Builds arenas from the config store,
//! keeps the store in sync when arenas are created, edited or removed, and
//! answers the lookups commands need (by name, by member, by permission).

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::arena::ability::AbilityRegistry;
use crate::arena::events::ArenaEvent;
use crate::arena::loadout::LoadoutRegistry;
use crate::arena::mode::{FreeForAll, ModeRegistry};
use crate::arena::state::{Arena, ArenaError, ArenaParts, ArenaWarps, MatchSummary, Services, WarpKind};
use crate::config::{ArenaSection, ArenaSettings, ConfigError, ConfigStore};
use crate::core::id::PlayerId;
use crate::core::location::{Location, LocationError};
use crate::host::messenger::{format_list, Msg};
use crate::stats::rating::RatingCalculator;

/// Name of the arena created when the config holds none.
pub const DEFAULT_ARENA: &str = "default";

/// Permission node guarding access to an arena.
pub fn permission_node(arena: &str) -> String {
    format!("arenas.{}", arena.to_lowercase())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Manager errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// An arena with that name already exists.
    #[error("An arena named '{0}' already exists")]
    Duplicate(String),

    /// No arena with that name.
    #[error("No arena named '{0}'")]
    UnknownArena(String),

    /// Name is empty or contains whitespace or dots.
    #[error("Invalid arena name '{0}'")]
    InvalidName(String),

    /// No factory registered for the mode, not even the fallback.
    #[error("Unknown game mode '{0}'")]
    UnknownMode(String),

    /// Player lacks the arena permission node.
    #[error("No permission to join '{0}'")]
    NotPermitted(String),

    /// Config store failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Arena rejected the operation.
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Malformed location.
    #[error(transparent)]
    Location(#[from] LocationError),
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owns every arena.
pub struct ArenaManager {
    config: ConfigStore,
    services: Services,
    modes: ModeRegistry,
    abilities: AbilityRegistry,
    loadouts: Arc<LoadoutRegistry>,
    /// Keyed by lower-case name.
    arenas: BTreeMap<String, Arena>,
}

impl ArenaManager {
    /// Create an empty manager. Call `initialize` to load arenas.
    pub fn new(config: ConfigStore, services: Services) -> Self {
        Self {
            config,
            services,
            modes: ModeRegistry::default(),
            abilities: AbilityRegistry::default(),
            loadouts: Arc::new(LoadoutRegistry::new()),
            arenas: BTreeMap::new(),
        }
    }

    /// Replace the game mode registry.
    pub fn with_modes(mut self, modes: ModeRegistry) -> Self {
        self.modes = modes;
        self
    }

    /// Replace the ability registry.
    pub fn with_abilities(mut self, abilities: AbilityRegistry) -> Self {
        self.abilities = abilities;
        self
    }

    /// Load classes and every configured arena, creating the default arena
    /// when none are configured.
    pub fn initialize(&mut self) -> Result<(), ManagerError> {
        self.services
            .global_enabled
            .store(self.config.global().enabled, Ordering::SeqCst);

        let loadouts = LoadoutRegistry::from_config(self.config.classes());
        loadouts.register_permissions(&*self.services.host);
        self.loadouts = Arc::new(loadouts);
        self.abilities.register_permissions(&*self.services.host);

        if self.config.arena_names().is_empty() {
            info!("No arenas configured, creating '{}'", DEFAULT_ARENA);
            self.config.set_arena(DEFAULT_ARENA, self.new_section());
            self.config.persist();
        }
        self.load_all()
    }

    /// Build every arena in the config store.
    pub fn load_all(&mut self) -> Result<(), ManagerError> {
        for name in self.config.arena_names() {
            self.load_arena(&name)?;
        }
        info!(arenas = self.arenas.len(), classes = self.loadouts.len(), "Arenas loaded");
        Ok(())
    }

    /// Build one arena from its config subtree, replacing a loaded one.
    ///
    /// Unresolvable worlds and malformed warps are logged and leave the arena
    /// loaded but not ready.
    pub fn load_arena(&mut self, name: &str) -> Result<(), ManagerError> {
        let section = self
            .config
            .arena(name)
            .cloned()
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;

        let settings = self.resolve_world(name, section.settings);
        let warps = ArenaWarps {
            lobby: self.resolve_warp(name, WarpKind::Lobby, section.warps.lobby.as_deref(), &settings.world),
            spec: self.resolve_warp(name, WarpKind::Spec, section.warps.spec.as_deref(), &settings.world),
            end: self.resolve_warp(name, WarpKind::End, section.warps.end.as_deref(), &settings.world),
        };

        let mode = match self.modes.create(&settings.mode, &settings) {
            Some(mode) => mode,
            None => {
                warn!(arena = %name, mode = %settings.mode, "Unknown game mode, using {}", FreeForAll::KEY);
                self.modes
                    .create(FreeForAll::KEY, &settings)
                    .ok_or_else(|| ManagerError::UnknownMode(settings.mode.clone()))?
            }
        };

        let parts = ArenaParts {
            name: name.to_string(),
            settings,
            warps,
            info: section.info,
            mode,
            loadouts: Arc::clone(&self.loadouts),
            rating: RatingCalculator::from_global(self.config.global()),
            abilities: self.abilities.instantiate(),
        };
        let arena = Arena::new(parts, self.services.clone());
        if !arena.is_ready() {
            let missing: Vec<&str> = arena.missing_warps().iter().map(|w| w.key()).collect();
            warn!(arena = %name, missing = ?missing, "Arena is not ready");
        }

        self.services.host.register_permission(&permission_node(name));
        if let Some(mut old) = self.arenas.insert(name.to_lowercase(), arena) {
            old.teardown();
        }
        info!(arena = %name, "Arena loaded");
        Ok(())
    }

    fn resolve_world(&self, arena: &str, mut settings: ArenaSettings) -> ArenaSettings {
        if !self.services.worlds.world_exists(&settings.world) {
            let fallback = self.services.worlds.default_world();
            warn!(arena = %arena, world = %settings.world, fallback = %fallback, "World not found, using default");
            settings.world = fallback;
        }
        settings
    }

    fn resolve_warp(&self, arena: &str, kind: WarpKind, raw: Option<&str>, world: &str) -> Option<Location> {
        let raw = raw?;
        let location = match Location::deserialize(raw) {
            Ok(location) => location,
            Err(e) => {
                warn!(arena = %arena, warp = %kind, error = %e, "Invalid warp location");
                return None;
            }
        };
        let mut location = location.in_world(world);
        let named = location.world.clone().unwrap_or_default();
        if !self.services.worlds.world_exists(&named) {
            let fallback = self.services.worlds.default_world();
            warn!(arena = %arena, warp = %kind, world = %named, fallback = %fallback, "Warp world not found, using default");
            location.world = Some(fallback);
        }
        Some(location)
    }

    fn new_section(&self) -> ArenaSection {
        let mut section = ArenaSection::default();
        section.settings.world = self.services.worlds.default_world();
        section
    }

    /// Create an arena with default settings and persist it.
    pub fn create_arena(&mut self, name: &str) -> Result<&Arena, ManagerError> {
        let name = name.trim();
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '.') {
            return Err(ManagerError::InvalidName(name.to_string()));
        }
        let key = name.to_lowercase();
        let configured = self.config.arena_names().iter().any(|n| n.to_lowercase() == key);
        if configured || self.arenas.contains_key(&key) {
            return Err(ManagerError::Duplicate(name.to_string()));
        }

        self.config.set_arena(name, self.new_section());
        self.config.persist();
        self.load_arena(name)?;
        info!(arena = %name, "Arena created");
        self.arenas
            .get(&key)
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))
    }

    /// Force-end and evict, revoke the permission node and delete the
    /// config subtree.
    pub fn remove_arena(&mut self, name: &str) -> Result<Option<MatchSummary>, ManagerError> {
        let mut arena = self
            .arenas
            .remove(&name.to_lowercase())
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;
        let summary = arena.teardown();

        self.services.host.unregister_permission(&permission_node(arena.name()));
        self.config.remove_arena(arena.name());
        self.config.persist();
        info!(arena = %arena.name(), "Arena removed");
        Ok(summary)
    }

    /// Tear down one arena and rebuild it from config.
    pub fn reload_arena(&mut self, name: &str) -> Result<Option<MatchSummary>, ManagerError> {
        let real = self
            .arenas
            .get(&name.to_lowercase())
            .map(|a| a.name().to_string())
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;
        let summary = self.arenas.get_mut(&name.to_lowercase()).and_then(Arena::teardown);
        self.arenas.remove(&name.to_lowercase());
        self.load_arena(&real)?;
        Ok(summary)
    }

    /// Tear everything down, re-read the config file if bound, and reload.
    pub fn reload_all(&mut self) -> Result<Vec<MatchSummary>, ManagerError> {
        let summaries = self.shutdown();
        for arena in self.arenas.values() {
            self.services.host.unregister_permission(&permission_node(arena.name()));
        }
        self.arenas.clear();
        if let Some(path) = self.config.path().map(|p| p.to_path_buf()) {
            self.config = ConfigStore::load(path)?;
        }
        self.initialize()?;
        Ok(summaries)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Config store.
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Config store, mutably. Changes apply on the next reload.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    /// Loaded classes.
    pub fn loadouts(&self) -> &LoadoutRegistry {
        &self.loadouts
    }

    /// All arenas, sorted by lower-case name.
    pub fn arenas(&self) -> impl Iterator<Item = &Arena> {
        self.arenas.values()
    }

    /// Number of arenas.
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// No arenas loaded.
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    /// Arenas that are enabled.
    pub fn enabled_arenas(&self) -> Vec<&Arena> {
        self.arenas().filter(|a| a.is_enabled()).collect()
    }

    /// Arenas `player` holds the permission for.
    pub fn permitted_arenas(&self, player: PlayerId) -> Vec<&Arena> {
        self.arenas().filter(|a| self.is_permitted(player, a)).collect()
    }

    /// Arenas that are enabled and that `player` may join.
    pub fn enabled_and_permitted_arenas(&self, player: PlayerId) -> Vec<&Arena> {
        self.arenas()
            .filter(|a| a.is_enabled() && self.is_permitted(player, a))
            .collect()
    }

    fn is_permitted(&self, player: PlayerId, arena: &Arena) -> bool {
        self.services.host.has_permission(player, &permission_node(arena.name()))
    }

    /// Arena holding `player` in any of its sets.
    pub fn arena_with_player(&self, player: PlayerId) -> Option<&Arena> {
        self.arenas().find(|a| a.has_player(player))
    }

    /// Arena holding `player`, mutably.
    pub fn arena_with_player_mut(&mut self, player: PlayerId) -> Option<&mut Arena> {
        self.arenas.values_mut().find(|a| a.has_player(player))
    }

    /// Arena by name, ignoring case.
    pub fn arena_with_name(&self, name: &str) -> Option<&Arena> {
        self.arenas.get(&name.to_lowercase())
    }

    /// Arena by name, mutably.
    pub fn arena_with_name_mut(&mut self, name: &str) -> Option<&mut Arena> {
        self.arenas.get_mut(&name.to_lowercase())
    }

    /// Exactly one arena exists.
    pub fn has_one_arena(&self) -> bool {
        self.arenas.len() == 1
    }

    /// The arena, if exactly one exists.
    pub fn only_arena(&self) -> Option<&Arena> {
        if self.has_one_arena() {
            self.arenas.values().next()
        } else {
            None
        }
    }

    // =========================================================================
    // Warps
    // =========================================================================

    /// Warps the arena still needs.
    pub fn missing_warps(&self, name: &str) -> Result<Vec<WarpKind>, ManagerError> {
        self.arena_with_name(name)
            .map(Arena::missing_warps)
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))
    }

    /// Tell `recipient` which warps are missing, or that the arena is ready.
    /// Returns true when nothing is missing.
    pub fn report_missing_warps(&self, name: &str, recipient: PlayerId) -> Result<bool, ManagerError> {
        let missing = self.missing_warps(name)?;
        let messenger = &self.services.messenger;
        if missing.is_empty() {
            messenger.tell(recipient, Msg::ArenaReady, &[]);
            return Ok(true);
        }
        let keys = format_list(missing.iter().map(|w| w.key()), " ");
        messenger.tell(recipient, Msg::MissingWarps, &[keys]);
        Ok(false)
    }

    /// Store a warp in config and on the arena. Returns true when the arena
    /// just became ready.
    pub fn set_warp(&mut self, name: &str, kind: WarpKind, location: Location) -> Result<bool, ManagerError> {
        let arena = self
            .arenas
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;

        let encoded = location.serialize();
        if let Some(section) = self.config.arena_mut(arena.name()) {
            match kind {
                WarpKind::Lobby => section.warps.lobby = Some(encoded),
                WarpKind::Spec => section.warps.spec = Some(encoded),
                WarpKind::End => section.warps.end = Some(encoded),
            }
        }
        self.config.persist();

        let ready = arena.set_warp(kind, location);
        if ready {
            info!(arena = %arena.name(), "Arena is ready");
        }
        debug!(arena = %arena.name(), warp = %kind, "Warp set");
        Ok(ready)
    }

    // =========================================================================
    // Global state
    // =========================================================================

    /// Manager-wide switch.
    pub fn is_enabled(&self) -> bool {
        self.services.global_enabled.load(Ordering::SeqCst)
    }

    /// Flip the manager-wide switch. Turning it off force-ends every match.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<MatchSummary> {
        self.services.global_enabled.store(enabled, Ordering::SeqCst);
        self.config.global_mut().enabled = enabled;
        self.config.persist();
        info!(enabled, "Arenas toggled");
        if enabled {
            return Vec::new();
        }
        self.arenas.values_mut().filter_map(Arena::force_end).collect()
    }

    /// Command permitted while inside an arena.
    pub fn is_acceptable(&self, command: &str) -> bool {
        let command = command.trim().trim_start_matches('/').to_lowercase();
        let command = command.split_whitespace().next().unwrap_or_default();
        self.config
            .global()
            .allowed_cmds
            .split(',')
            .map(|c| c.trim().to_lowercase())
            .any(|c| !c.is_empty() && c == command)
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Put `player` in the lobby of the named arena.
    pub fn join(&mut self, player: PlayerId, name: &str) -> Result<(), ManagerError> {
        if self.arena_with_player(player).is_some() {
            return Err(ArenaError::AlreadyMember.into());
        }
        let permitted = self
            .arena_with_name(name)
            .map(|a| self.is_permitted(player, a))
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;
        if !permitted {
            return Err(ManagerError::NotPermitted(name.to_string()));
        }
        let arena = self
            .arena_with_name_mut(name)
            .ok_or_else(|| ManagerError::UnknownArena(name.to_string()))?;
        Ok(arena.add_player(player)?)
    }

    /// Remove `player` from whichever arena holds them.
    pub fn leave(&mut self, player: PlayerId) -> bool {
        match self.arena_with_player_mut(player) {
            Some(arena) => arena.remove_player(player, false),
            None => false,
        }
    }

    // =========================================================================
    // Runtime
    // =========================================================================

    /// Advance every arena one tick.
    pub fn tick(&mut self) -> Vec<MatchSummary> {
        self.arenas.values_mut().filter_map(Arena::tick).collect()
    }

    /// Drain lifecycle events from every arena.
    pub fn take_events(&mut self) -> Vec<ArenaEvent> {
        self.arenas.values_mut().flat_map(Arena::take_events).collect()
    }

    /// Force-end every match and evict every player.
    pub fn shutdown(&mut self) -> Vec<MatchSummary> {
        let summaries: Vec<MatchSummary> = self.arenas.values_mut().filter_map(Arena::teardown).collect();
        info!(ended = summaries.len(), "Arenas shut down");
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::to_ticks;
    use crate::host::memory::{InMemoryHost, RecordingMessenger};
    use crate::host::PlayerHost;
    use crate::stats::store::MemoryStatsStore;

    const CONFIG: &str = r#"{
        "arenas": {
            "Koth": {
                "settings": { "min-players": 2, "arena-time": 5, "announce-at": [] },
                "warps": { "lobby": "0,70,0", "spec": "10,70,10,90,0,world" }
            }
        }
    }"#;

    struct Fixture {
        host: Arc<InMemoryHost>,
        messenger: Arc<RecordingMessenger>,
        manager: ArenaManager,
    }

    fn fixture(json: &str) -> Fixture {
        let host = Arc::new(InMemoryHost::default());
        let messenger = Arc::new(RecordingMessenger::new());
        let services = Services::new(
            host.clone(),
            host.clone(),
            messenger.clone(),
            Arc::new(MemoryStatsStore::new()),
        );
        let mut manager = ArenaManager::new(ConfigStore::from_json_str(json).unwrap(), services);
        manager.initialize().unwrap();
        Fixture { host, messenger, manager }
    }

    #[test]
    fn test_empty_config_creates_default_arena() {
        let fx = fixture("{}");
        assert!(fx.manager.has_one_arena());
        let arena = fx.manager.only_arena().unwrap();
        assert_eq!(arena.name(), DEFAULT_ARENA);
        assert!(!arena.is_ready());
        assert_eq!(fx.manager.missing_warps("default").unwrap(), vec![WarpKind::Lobby, WarpKind::Spec]);
        assert!(fx.manager.config().arena(DEFAULT_ARENA).is_some());
    }

    #[test]
    fn test_load_from_config() {
        let fx = fixture(CONFIG);
        let arena = fx.manager.arena_with_name("koth").unwrap();
        assert_eq!(arena.name(), "Koth");
        assert!(arena.is_ready());
        assert_eq!(arena.warps().lobby.as_ref().unwrap().world.as_deref(), Some("world"));
        assert_eq!(arena.warps().spec.as_ref().unwrap().yaw, 90.0);
        assert!(fx.host.registered_permissions().contains("arenas.koth"));
        assert!(fx.host.registered_permissions().contains("abilities.heal"));
        assert!(arena.abilities().get("heal").is_some());
    }

    #[test]
    fn test_degraded_load() {
        let fx = fixture(
            r#"{ "arenas": { "broken": {
                "settings": { "world": "nether", "mode": "capture-the-flag" },
                "warps": { "lobby": "1,2", "spec": "5,5,5,0,0,nether" }
            } } }"#,
        );
        let arena = fx.manager.arena_with_name("broken").unwrap();
        assert_eq!(arena.settings().world, "world");
        assert_eq!(arena.mode_key(), FreeForAll::KEY);
        assert!(arena.warps().lobby.is_none());
        assert_eq!(arena.warps().spec.as_ref().unwrap().world.as_deref(), Some("world"));
        assert!(!arena.is_ready());
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_names() {
        let mut fx = fixture(CONFIG);
        assert!(matches!(fx.manager.create_arena("KOTH"), Err(ManagerError::Duplicate(_))));
        assert!(matches!(fx.manager.create_arena("two words"), Err(ManagerError::InvalidName(_))));
        assert!(matches!(fx.manager.create_arena(""), Err(ManagerError::InvalidName(_))));

        let created = fx.manager.create_arena("Dust").unwrap();
        assert_eq!(created.name(), "Dust");
        assert_eq!(fx.manager.len(), 2);
        assert!(fx.manager.config().arena("Dust").is_some());
    }

    #[test]
    fn test_remove_arena_tears_down() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        let b = fx.host.connect("b");
        fx.manager.join(a, "koth").unwrap();
        fx.manager.join(b, "koth").unwrap();
        fx.manager.arena_with_name_mut("koth").unwrap().start_arena().unwrap();

        let summary = fx.manager.remove_arena("koth").unwrap();
        assert!(summary.is_some());
        assert!(fx.manager.arena_with_name("koth").is_none());
        assert!(fx.manager.config().arena("Koth").is_none());
        assert!(!fx.host.registered_permissions().contains("arenas.koth"));
        assert_eq!(fx.host.location(a), Location::new(0.0, 64.0, 0.0).in_world("world"));
        assert!(matches!(fx.manager.remove_arena("koth"), Err(ManagerError::UnknownArena(_))));
    }

    #[test]
    fn test_arena_with_player_scans_all_sets() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        let b = fx.host.connect("b");
        let watcher = fx.host.connect("watcher");
        assert!(fx.manager.arena_with_player(a).is_none());

        fx.manager.join(a, "koth").unwrap();
        assert_eq!(fx.manager.arena_with_player(a).map(Arena::name), Some("Koth"));

        fx.manager.join(b, "koth").unwrap();
        let arena = fx.manager.arena_with_name_mut("koth").unwrap();
        arena.start_arena().unwrap();
        arena.spectate(watcher).unwrap();
        assert!(fx.manager.arena_with_player(b).is_some());
        assert!(fx.manager.arena_with_player(watcher).is_some());

        assert!(matches!(
            fx.manager.join(a, "koth"),
            Err(ManagerError::Arena(ArenaError::AlreadyMember))
        ));
        assert!(fx.manager.leave(watcher));
        assert!(fx.manager.arena_with_player(watcher).is_none());
    }

    #[test]
    fn test_permission_filters() {
        let mut fx = fixture(CONFIG);
        fx.manager.create_arena("dust").unwrap();
        let a = fx.host.connect("a");
        fx.host.deny(a, "arenas.dust");

        let names: Vec<&str> = fx.manager.permitted_arenas(a).iter().map(|x| x.name()).collect();
        assert_eq!(names, vec!["Koth"]);
        assert!(matches!(fx.manager.join(a, "dust"), Err(ManagerError::NotPermitted(_))));

        fx.manager.arena_with_name_mut("koth").unwrap().set_enabled(false);
        assert!(fx.manager.enabled_and_permitted_arenas(a).is_empty());
        assert_eq!(fx.manager.enabled_arenas().len(), 1);
    }

    #[test]
    fn test_global_disable_force_ends() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        let b = fx.host.connect("b");
        fx.manager.join(a, "koth").unwrap();
        fx.manager.join(b, "koth").unwrap();
        fx.manager.arena_with_name_mut("koth").unwrap().start_arena().unwrap();

        let ended = fx.manager.set_enabled(false);
        assert_eq!(ended.len(), 1);
        assert!(!fx.manager.is_enabled());
        assert!(!fx.manager.config().global().enabled);
        assert!(matches!(
            fx.manager.join(a, "koth"),
            Err(ManagerError::Arena(ArenaError::Disabled))
        ));

        fx.manager.set_enabled(true);
        fx.manager.join(a, "koth").unwrap();
    }

    #[test]
    fn test_set_warp_updates_config_and_readiness() {
        let mut fx = fixture("{}");
        let admin = fx.host.connect("admin");
        assert!(!fx.manager.report_missing_warps("default", admin).unwrap());
        assert_eq!(fx.messenger.last_args(Msg::MissingWarps), Some(vec!["lobby spec".to_string()]));

        let lobby = Location::with_facing(1.5, 65.0, -3.25, 180.0, 0.0, "world");
        assert!(!fx.manager.set_warp("default", WarpKind::Lobby, lobby.clone()).unwrap());
        assert!(fx.manager.set_warp("default", WarpKind::Spec, Location::new(0.0, 80.0, 0.0)).unwrap());

        let section = fx.manager.config().arena(DEFAULT_ARENA).unwrap();
        assert_eq!(section.warps.lobby.as_deref(), Some("1.5,65,-3.25,180,0,world"));
        assert!(fx.manager.report_missing_warps("default", admin).unwrap());
        assert_eq!(fx.messenger.count(admin, Msg::ArenaReady), 1);
    }

    #[test]
    fn test_is_acceptable() {
        let fx = fixture(CONFIG);
        assert!(fx.manager.is_acceptable("/arena leave"));
        assert!(fx.manager.is_acceptable("MSG bob hi"));
        assert!(fx.manager.is_acceptable("r"));
        assert!(!fx.manager.is_acceptable("/spawn"));
        assert!(!fx.manager.is_acceptable(""));
    }

    #[test]
    fn test_tick_ends_timed_match() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        let b = fx.host.connect("b");
        fx.manager.join(a, "koth").unwrap();
        fx.manager.join(b, "koth").unwrap();
        fx.manager.arena_with_name_mut("koth").unwrap().start_arena().unwrap();

        let mut ended = Vec::new();
        for _ in 0..to_ticks(5) {
            ended.extend(fx.manager.tick());
        }
        assert_eq!(ended.len(), 1);
        assert!(ended[0].draw);
        assert!(fx.manager.arena_with_player(a).is_none());
        assert!(fx
            .manager
            .take_events()
            .iter()
            .any(|e| matches!(e, ArenaEvent::ArenaEnd { .. })));
    }

    #[test]
    fn test_reload_arena_applies_config_edits() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        fx.manager.join(a, "koth").unwrap();

        fx.manager.config_mut().arena_mut("Koth").unwrap().settings.max_players = 3;
        fx.manager.reload_arena("koth").unwrap();
        assert_eq!(fx.manager.arena_with_name("koth").unwrap().max_players(), 3);
        assert!(fx.manager.arena_with_player(a).is_none(), "reload evicts members");
    }

    #[test]
    fn test_shutdown_restores_everyone() {
        let mut fx = fixture(CONFIG);
        let a = fx.host.connect("a");
        fx.manager.join(a, "koth").unwrap();
        assert!(fx.manager.shutdown().is_empty());
        assert!(fx.manager.arena_with_player(a).is_none());
        assert_eq!(fx.host.location(a).y, 64.0);
    }
}
