//! Configuration Store
//!
//! Hierarchical settings: one `global` section, the loadout `classes`, and a
//! subtree per arena with `settings`, `warps` and `info`. Every field carries
//! a serde default so partially written files still load.
//!
//! ```text
//! {
//!   "global":  { "enabled", "minimum-mmr", "starting-mmr", "logging", ... },
//!   "classes": { "<name>": { "items", "armor", "permission" } },
//!   "arenas":  { "<name>": { "settings": {...}, "warps": {...}, "info": {...} } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::host::{Armor, ItemStack};
use crate::stats::rating::KFactorCurve;

// =============================================================================
// ERRORS
// =============================================================================

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("config I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid config JSON.
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Save requested on a store with no backing file.
    #[error("config store is not bound to a file")]
    Unbound,
}

// =============================================================================
// SECTIONS
// =============================================================================

fn yes() -> bool {
    true
}

/// Process-wide defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalSettings {
    /// Whether any arena may run.
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Rating floor.
    #[serde(default = "default_minimum_mmr")]
    pub minimum_mmr: u32,
    /// Rating given to new players; also the base of the rating curve.
    #[serde(default = "default_starting_mmr")]
    pub starting_mmr: u32,
    /// Verbose logging.
    #[serde(default = "yes")]
    pub logging: bool,
    /// Comma-separated commands players may use while in an arena.
    #[serde(default = "default_allowed_cmds")]
    pub allowed_cmds: String,
    /// K-factor policy used by the rating calculator.
    #[serde(default)]
    pub k_factor_curve: KFactorCurve,
}

fn default_minimum_mmr() -> u32 {
    100
}

fn default_starting_mmr() -> u32 {
    1500
}

fn default_allowed_cmds() -> String {
    "arena, msg, r".to_string()
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_mmr: default_minimum_mmr(),
            starting_mmr: default_starting_mmr(),
            logging: true,
            allowed_cmds: default_allowed_cmds(),
            k_factor_curve: KFactorCurve::default(),
        }
    }
}

/// Loadout class definition as written in config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassSection {
    /// Inventory items, any stack size.
    #[serde(default)]
    pub items: Vec<ItemStack>,
    /// Worn armour.
    #[serde(default)]
    pub armor: Armor,
    /// Require the `classes.<name>` permission node.
    #[serde(default)]
    pub permission: bool,
}

/// Per-arena match rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArenaSettings {
    /// World the arena lives in.
    #[serde(default = "default_world")]
    pub world: String,
    /// Game mode key (`ffa`, `teams`).
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Players needed to start.
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    /// Lobby capacity.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Match length in seconds.
    #[serde(default = "default_arena_time")]
    pub arena_time: u64,
    /// Kills needed to end the match early.
    #[serde(default = "default_score_to_win")]
    pub score_to_win: u32,
    /// Arena accepts players.
    #[serde(default = "yes")]
    pub enabled: bool,
    /// Track per-player statistics.
    #[serde(default = "yes")]
    pub player_stats: bool,
    /// Update ratings at match end.
    #[serde(default = "yes")]
    pub enable_matchmaking_system: bool,
    /// Send players to the end warp when a match ends.
    #[serde(default)]
    pub teleport_to_end: bool,
    /// Allow class changes once the match is running.
    #[serde(default)]
    pub change_class_in_arena: bool,
    /// Remaining-time broadcast thresholds, in seconds.
    #[serde(default = "default_announce_at")]
    pub announce_at: Vec<u64>,
}

fn default_world() -> String {
    "world".to_string()
}

fn default_mode() -> String {
    "ffa".to_string()
}

fn default_min_players() -> usize {
    2
}

fn default_max_players() -> usize {
    10
}

fn default_arena_time() -> u64 {
    300
}

fn default_score_to_win() -> u32 {
    10
}

fn default_announce_at() -> Vec<u64> {
    vec![60, 30, 10, 5, 4, 3, 2, 1]
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            world: default_world(),
            mode: default_mode(),
            min_players: default_min_players(),
            max_players: default_max_players(),
            arena_time: default_arena_time(),
            score_to_win: default_score_to_win(),
            enabled: true,
            player_stats: true,
            enable_matchmaking_system: true,
            teleport_to_end: false,
            change_class_in_arena: false,
            announce_at: default_announce_at(),
        }
    }
}

/// Named locations, stored in the `x,y,z[,yaw,pitch[,world]]` form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warps {
    /// Lobby spawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lobby: Option<String>,
    /// Spectator spawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    /// Where players go when a match ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Free-form arena description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaInfo {
    /// Who built it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One arena's configuration subtree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSection {
    /// Match rules.
    #[serde(default)]
    pub settings: ArenaSettings,
    /// Named locations.
    #[serde(default)]
    pub warps: Warps,
    /// Description.
    #[serde(default)]
    pub info: ArenaInfo,
}

/// The whole configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigRoot {
    /// Process-wide defaults.
    #[serde(default)]
    pub global: GlobalSettings,
    /// Loadout classes by name.
    #[serde(default)]
    pub classes: BTreeMap<String, ClassSection>,
    /// Arenas by name.
    #[serde(default)]
    pub arenas: BTreeMap<String, ArenaSection>,
}

// =============================================================================
// STORE
// =============================================================================

/// Configuration tree, optionally bound to a JSON file.
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    root: ConfigRoot,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Unbound in-memory store with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unbound store over an existing tree.
    pub fn from_root(root: ConfigRoot) -> Self {
        Self { root, path: None }
    }

    /// Parse a tree from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_root(serde_json::from_str(json)?))
    }

    /// Load from `path`. A missing file yields defaults bound to that path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let root = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                ConfigRoot::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(Self { root, path: Some(path) })
    }

    /// Write the tree back to its file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = self.path.as_ref().ok_or(ConfigError::Unbound)?;
        let text = serde_json::to_string_pretty(&self.root)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Save if bound to a file, logging failures.
    pub fn persist(&self) {
        if self.path.is_none() {
            return;
        }
        if let Err(e) = self.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whole tree.
    pub fn root(&self) -> &ConfigRoot {
        &self.root
    }

    /// Global section.
    pub fn global(&self) -> &GlobalSettings {
        &self.root.global
    }

    /// Global section, mutably.
    pub fn global_mut(&mut self) -> &mut GlobalSettings {
        &mut self.root.global
    }

    /// Class definitions.
    pub fn classes(&self) -> &BTreeMap<String, ClassSection> {
        &self.root.classes
    }

    /// Add or replace a class definition.
    pub fn set_class(&mut self, name: impl Into<String>, class: ClassSection) {
        self.root.classes.insert(name.into(), class);
    }

    /// Configured arena names, sorted.
    pub fn arena_names(&self) -> Vec<String> {
        self.root.arenas.keys().cloned().collect()
    }

    /// Arena subtree.
    pub fn arena(&self, name: &str) -> Option<&ArenaSection> {
        self.root.arenas.get(name)
    }

    /// Arena subtree, mutably.
    pub fn arena_mut(&mut self, name: &str) -> Option<&mut ArenaSection> {
        self.root.arenas.get_mut(name)
    }

    /// Add or replace an arena subtree.
    pub fn set_arena(&mut self, name: impl Into<String>, section: ArenaSection) {
        self.root.arenas.insert(name.into(), section);
    }

    /// Delete an arena subtree.
    pub fn remove_arena(&mut self, name: &str) -> Option<ArenaSection> {
        self.root.arenas.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_gets_defaults() {
        let store = ConfigStore::from_json_str(
            r#"{
                "global": { "starting-mmr": 1200 },
                "arenas": { "koth": { "settings": { "min-players": 4, "mode": "teams" } } }
            }"#,
        )
        .unwrap();

        assert_eq!(store.global().starting_mmr, 1200);
        assert_eq!(store.global().minimum_mmr, 100);
        assert!(store.global().enabled);

        let koth = store.arena("koth").unwrap();
        assert_eq!(koth.settings.min_players, 4);
        assert_eq!(koth.settings.mode, "teams");
        assert_eq!(koth.settings.max_players, 10);
        assert_eq!(koth.warps, Warps::default());
    }

    #[test]
    fn test_empty_object_is_valid() {
        let store = ConfigStore::from_json_str("{}").unwrap();
        assert!(store.arena_names().is_empty());
        assert_eq!(store.global(), &GlobalSettings::default());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("arena-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let mut store = ConfigStore::load(&path).unwrap();
        assert!(store.arena_names().is_empty());

        let mut section = ArenaSection::default();
        section.warps.lobby = Some("1,2,3".to_string());
        store.set_arena("duel", section.clone());
        store.global_mut().logging = false;
        store.save().unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.arena("duel"), Some(&section));
        assert!(!reloaded.global().logging);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unbound_save_fails() {
        assert!(matches!(ConfigStore::new().save(), Err(ConfigError::Unbound)));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(ConfigStore::from_json_str("{ nope"), Err(ConfigError::Json(_))));
    }
}
