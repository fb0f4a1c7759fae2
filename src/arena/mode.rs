//! Game Modes
//!
//! Scoring and winner rules plugged into the shared arena orchestrator.
//! Modes are looked up by key in a `ModeRegistry` populated at startup.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::config::ArenaSettings;
use crate::core::id::PlayerId;

/// Read-only match state handed to mode hooks.
#[derive(Clone, Copy, Debug)]
pub struct MatchView<'a> {
    /// Players currently in the match.
    pub active: &'a BTreeSet<PlayerId>,
    /// Kills this match.
    pub kills: &'a BTreeMap<PlayerId, u32>,
    /// Current ratings of participants.
    pub ratings: &'a BTreeMap<PlayerId, u32>,
}

impl MatchView<'_> {
    /// Kills by `player` this match.
    pub fn kills_of(&self, player: PlayerId) -> u32 {
        self.kills.get(&player).copied().unwrap_or(0)
    }

    /// Rating of `player`, if known.
    pub fn rating_of(&self, player: PlayerId) -> Option<u32> {
        self.ratings.get(&player).copied()
    }

    fn average_rating(&self, players: impl Iterator<Item = PlayerId>) -> Option<f64> {
        let (sum, count) = players
            .filter_map(|p| self.rating_of(p))
            .fold((0.0, 0u32), |(sum, n), r| (sum + f64::from(r), n + 1));
        (count > 0).then(|| sum / f64::from(count))
    }
}

/// Scoring hooks of one game mode.
pub trait GameMode: Send + Sync + fmt::Debug {
    /// Registry key.
    fn key(&self) -> &'static str;

    /// Match is starting with these players.
    fn on_start(&mut self, _players: &BTreeSet<PlayerId>) {}

    /// A player left the running match.
    fn on_leave(&mut self, _player: PlayerId) {}

    /// Win condition met ahead of the timer.
    fn score_reached(&self, view: &MatchView<'_>) -> bool;

    /// Winner set; empty means a draw.
    fn declare_winner(&self, view: &MatchView<'_>) -> BTreeSet<PlayerId>;

    /// Aggregate rating of the player's own side.
    fn team_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64;

    /// Aggregate rating of the opposing side.
    fn opponent_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64;

    /// Team label of a player, for modes that have teams.
    fn team_of(&self, _player: PlayerId) -> Option<Team> {
        None
    }

    /// Forget per-match state.
    fn reset(&mut self) {}
}

// =============================================================================
// FREE FOR ALL
// =============================================================================

/// Every player for themselves; most kills wins.
#[derive(Clone, Debug)]
pub struct FreeForAll {
    score_to_win: u32,
}

impl FreeForAll {
    /// Registry key.
    pub const KEY: &'static str = "ffa";

    /// Mode ending early at `score_to_win` kills (0 disables).
    pub fn new(score_to_win: u32) -> Self {
        Self { score_to_win }
    }
}

impl GameMode for FreeForAll {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn score_reached(&self, view: &MatchView<'_>) -> bool {
        self.score_to_win > 0
            && view.active.iter().any(|p| view.kills_of(*p) >= self.score_to_win)
    }

    fn declare_winner(&self, view: &MatchView<'_>) -> BTreeSet<PlayerId> {
        if view.active.len() == 1 {
            return view.active.clone();
        }

        let best = view.active.iter().map(|p| view.kills_of(*p)).max().unwrap_or(0);
        if best == 0 {
            return BTreeSet::new();
        }
        let leaders: BTreeSet<PlayerId> = view
            .active
            .iter()
            .copied()
            .filter(|p| view.kills_of(*p) == best)
            .collect();
        if leaders.len() == 1 {
            leaders
        } else {
            BTreeSet::new()
        }
    }

    fn team_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64 {
        view.rating_of(player).map(f64::from).unwrap_or(0.0)
    }

    fn opponent_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64 {
        let others = view.ratings.keys().copied().filter(|p| *p != player);
        view.average_rating(others)
            .unwrap_or_else(|| self.team_rating(player, view))
    }
}

// =============================================================================
// TEAMS
// =============================================================================

/// Team label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    /// First team.
    Red,
    /// Second team.
    Blue,
}

impl Team {
    /// The other team.
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

/// Two teams; summed kills decide.
#[derive(Clone, Debug)]
pub struct Teams {
    score_to_win: u32,
    teams: BTreeMap<PlayerId, Team>,
    contested: bool,
}

impl Teams {
    /// Registry key.
    pub const KEY: &'static str = "teams";

    /// Mode ending early at `score_to_win` team kills (0 disables).
    pub fn new(score_to_win: u32) -> Self {
        Self {
            score_to_win,
            teams: BTreeMap::new(),
            contested: false,
        }
    }

    /// Members of `team` still in the match.
    pub fn members(&self, team: Team) -> impl Iterator<Item = PlayerId> + '_ {
        self.teams
            .iter()
            .filter(move |(_, t)| **t == team)
            .map(|(p, _)| *p)
    }

    /// Summed kills of a team.
    pub fn team_score(&self, team: Team, view: &MatchView<'_>) -> u32 {
        self.members(team).map(|p| view.kills_of(p)).sum()
    }

    fn emptied_team(&self) -> Option<Team> {
        if !self.contested {
            return None;
        }
        [Team::Red, Team::Blue]
            .into_iter()
            .find(|t| self.members(*t).next().is_none())
    }
}

impl GameMode for Teams {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn on_start(&mut self, players: &BTreeSet<PlayerId>) {
        self.teams = players
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, if i % 2 == 0 { Team::Red } else { Team::Blue }))
            .collect();
        self.contested = players.len() >= 2;
    }

    fn on_leave(&mut self, player: PlayerId) {
        self.teams.remove(&player);
    }

    fn score_reached(&self, view: &MatchView<'_>) -> bool {
        if self.emptied_team().is_some() {
            return true;
        }
        self.score_to_win > 0
            && [Team::Red, Team::Blue]
                .into_iter()
                .any(|t| self.team_score(t, view) >= self.score_to_win)
    }

    fn declare_winner(&self, view: &MatchView<'_>) -> BTreeSet<PlayerId> {
        let winning = match self.emptied_team() {
            Some(empty) => Some(empty.opponent()),
            None => {
                let red = self.team_score(Team::Red, view);
                let blue = self.team_score(Team::Blue, view);
                match red.cmp(&blue) {
                    std::cmp::Ordering::Greater => Some(Team::Red),
                    std::cmp::Ordering::Less => Some(Team::Blue),
                    std::cmp::Ordering::Equal => None,
                }
            }
        };
        match winning {
            Some(team) => self.members(team).filter(|p| view.active.contains(p)).collect(),
            None => BTreeSet::new(),
        }
    }

    fn team_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64 {
        let own = view.rating_of(player).map(f64::from).unwrap_or(0.0);
        match self.team_of(player) {
            Some(team) => view.average_rating(self.members(team)).unwrap_or(own),
            None => own,
        }
    }

    fn opponent_rating(&self, player: PlayerId, view: &MatchView<'_>) -> f64 {
        match self.team_of(player) {
            Some(team) => view
                .average_rating(self.members(team.opponent()))
                .unwrap_or_else(|| self.team_rating(player, view)),
            None => self.team_rating(player, view),
        }
    }

    fn team_of(&self, player: PlayerId) -> Option<Team> {
        self.teams.get(&player).copied()
    }

    fn reset(&mut self) {
        self.teams.clear();
        self.contested = false;
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Builds a mode from arena settings.
pub type ModeFactory = fn(&ArenaSettings) -> Box<dyn GameMode>;

/// Mode key to factory.
#[derive(Clone)]
pub struct ModeRegistry {
    factories: BTreeMap<String, ModeFactory>,
}

impl fmt::Debug for ModeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl ModeRegistry {
    /// Registry with no modes.
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Add or replace a mode.
    pub fn register(&mut self, key: &str, factory: ModeFactory) {
        self.factories.insert(key.to_lowercase(), factory);
    }

    /// Known keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the mode named `key`, ignoring case.
    pub fn create(&self, key: &str, settings: &ArenaSettings) -> Option<Box<dyn GameMode>> {
        self.factories.get(&key.to_lowercase()).map(|f| f(settings))
    }
}

fn free_for_all(settings: &ArenaSettings) -> Box<dyn GameMode> {
    Box::new(FreeForAll::new(settings.score_to_win))
}

fn teams(settings: &ArenaSettings) -> Box<dyn GameMode> {
    Box::new(Teams::new(settings.score_to_win))
}

impl Default for ModeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FreeForAll::KEY, free_for_all);
        registry.register(Teams::KEY, teams);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u8) -> Vec<PlayerId> {
        (1..=n).map(|i| PlayerId::new([i; 16])).collect()
    }

    struct Fixture {
        active: BTreeSet<PlayerId>,
        kills: BTreeMap<PlayerId, u32>,
        ratings: BTreeMap<PlayerId, u32>,
    }

    impl Fixture {
        fn new(players: &[PlayerId]) -> Self {
            Self {
                active: players.iter().copied().collect(),
                kills: BTreeMap::new(),
                ratings: players.iter().map(|p| (*p, 1500)).collect(),
            }
        }

        fn view(&self) -> MatchView<'_> {
            MatchView {
                active: &self.active,
                kills: &self.kills,
                ratings: &self.ratings,
            }
        }
    }

    #[test]
    fn test_ffa_unique_top_killer_wins() {
        let p = ids(3);
        let mut fx = Fixture::new(&p);
        fx.kills.insert(p[0], 2);
        fx.kills.insert(p[1], 5);
        let mode = FreeForAll::new(10);
        assert_eq!(mode.declare_winner(&fx.view()), BTreeSet::from([p[1]]));
        assert!(!mode.score_reached(&fx.view()));

        fx.kills.insert(p[2], 10);
        assert!(mode.score_reached(&fx.view()));
    }

    #[test]
    fn test_ffa_tie_and_no_kills_draw() {
        let p = ids(2);
        let mut fx = Fixture::new(&p);
        let mode = FreeForAll::new(10);
        assert!(mode.declare_winner(&fx.view()).is_empty());

        fx.kills.insert(p[0], 3);
        fx.kills.insert(p[1], 3);
        assert!(mode.declare_winner(&fx.view()).is_empty());
    }

    #[test]
    fn test_ffa_sole_survivor() {
        let p = ids(3);
        let mut fx = Fixture::new(&p);
        fx.kills.insert(p[0], 4);
        fx.active = BTreeSet::from([p[2]]);
        assert_eq!(FreeForAll::new(10).declare_winner(&fx.view()), BTreeSet::from([p[2]]));
    }

    #[test]
    fn test_ffa_opponent_is_pooled_average() {
        let p = ids(3);
        let mut fx = Fixture::new(&p);
        fx.ratings.insert(p[1], 1400);
        fx.ratings.insert(p[2], 1600);
        let mode = FreeForAll::new(10);
        assert_eq!(mode.opponent_rating(p[0], &fx.view()), 1500.0);
        assert_eq!(mode.opponent_rating(p[1], &fx.view()), 1550.0);
    }

    #[test]
    fn test_teams_alternate_assignment() {
        let p = ids(4);
        let mut mode = Teams::new(10);
        mode.on_start(&p.iter().copied().collect());
        assert_eq!(mode.team_of(p[0]), Some(Team::Red));
        assert_eq!(mode.team_of(p[1]), Some(Team::Blue));
        assert_eq!(mode.team_of(p[2]), Some(Team::Red));
        assert_eq!(mode.team_of(p[3]), Some(Team::Blue));
    }

    #[test]
    fn test_teams_summed_kills() {
        let p = ids(4);
        let mut fx = Fixture::new(&p);
        let mut mode = Teams::new(6);
        mode.on_start(&fx.active);

        fx.kills.insert(p[0], 2);
        fx.kills.insert(p[2], 2);
        fx.kills.insert(p[1], 3);
        assert_eq!(mode.team_score(Team::Red, &fx.view()), 4);
        assert_eq!(mode.declare_winner(&fx.view()), BTreeSet::from([p[0], p[2]]));
        assert!(!mode.score_reached(&fx.view()));

        fx.kills.insert(p[3], 3);
        assert!(mode.score_reached(&fx.view()));
        assert_eq!(mode.declare_winner(&fx.view()), BTreeSet::from([p[1], p[3]]));
    }

    #[test]
    fn test_teams_empty_team_loses() {
        let p = ids(3);
        let mut fx = Fixture::new(&p);
        let mut mode = Teams::new(0);
        mode.on_start(&fx.active);

        // Blue only has p[1]
        mode.on_leave(p[1]);
        fx.active.remove(&p[1]);
        assert!(mode.score_reached(&fx.view()));
        assert_eq!(mode.declare_winner(&fx.view()), BTreeSet::from([p[0], p[2]]));
    }

    #[test]
    fn test_teams_rating_hooks_use_averages() {
        let p = ids(4);
        let mut fx = Fixture::new(&p);
        fx.ratings.insert(p[0], 1000);
        fx.ratings.insert(p[2], 2000);
        fx.ratings.insert(p[1], 1200);
        fx.ratings.insert(p[3], 1400);
        let mut mode = Teams::new(10);
        mode.on_start(&fx.active);

        assert_eq!(mode.team_rating(p[0], &fx.view()), 1500.0);
        assert_eq!(mode.opponent_rating(p[0], &fx.view()), 1300.0);
    }

    #[test]
    fn test_single_player_teams_never_contested() {
        let p = ids(1);
        let fx = Fixture::new(&p);
        let mut mode = Teams::new(10);
        mode.on_start(&fx.active);
        assert!(!mode.score_reached(&fx.view()));
        assert!(mode.declare_winner(&fx.view()).is_empty());
    }

    #[test]
    fn test_registry() {
        let registry = ModeRegistry::default();
        let settings = ArenaSettings::default();
        assert_eq!(registry.create("FFA", &settings).map(|m| m.key()), Some("ffa"));
        assert_eq!(registry.create("teams", &settings).map(|m| m.key()), Some("teams"));
        assert!(registry.create("ctf", &settings).is_none());
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["ffa", "teams"]);
    }
}
