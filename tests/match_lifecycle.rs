//! Full match lifecycle through the public API: join, start, run the
//! countdown out, and check every participant's persisted record.

use std::sync::Arc;

use arena_match::arena::ArenaPhase;
use arena_match::core::to_ticks;
use arena_match::host::{InMemoryHost, Msg, PlayerHost, RecordingMessenger};
use arena_match::stats::{MemoryStatsStore, StatsStore};
use arena_match::{ArenaManager, ConfigStore, Services};

const CONFIG: &str = r#"{
    "global": { "starting-mmr": 1500, "minimum-mmr": 100 },
    "arenas": {
        "duel": {
            "settings": { "min-players": 2, "max-players": 2, "arena-time": 30, "score-to-win": 0 },
            "warps": { "lobby": "0,70,0", "spec": "0,90,0" }
        }
    }
}"#;

#[test]
fn test_two_player_match_runs_to_completion() {
    let host = Arc::new(InMemoryHost::default());
    let messenger = Arc::new(RecordingMessenger::new());
    let store = Arc::new(MemoryStatsStore::new());
    let services = Services::new(host.clone(), host.clone(), messenger.clone(), store.clone());

    let mut manager = ArenaManager::new(ConfigStore::from_json_str(CONFIG).unwrap(), services);
    manager.initialize().unwrap();

    let alice = host.connect("alice");
    let bob = host.connect("bob");
    let home = host.location(alice);
    manager.join(alice, "duel").unwrap();
    manager.join(bob, "duel").unwrap();
    assert!(manager.join(host.connect("carol"), "duel").is_err(), "arena is full");

    let arena = manager.arena_with_name_mut("duel").unwrap();
    arena.start_arena().unwrap();
    assert_eq!(arena.phase(), ArenaPhase::Running);
    assert_eq!(arena.active().len(), 2);
    assert!(arena.lobby().is_empty());
    assert!(arena.timer().is_running());
    assert_eq!(arena.timer().duration(), to_ticks(30));

    arena.record_kill(alice, bob).unwrap();

    let mut summaries = Vec::new();
    for _ in 0..to_ticks(30) {
        summaries.extend(manager.tick());
    }
    assert_eq!(summaries.len(), 1, "the countdown ends the match exactly once");
    let summary = &summaries[0];
    assert!(!summary.draw);
    assert!(summary.winners.contains(&alice));

    let arena = manager.arena_with_name("duel").unwrap();
    assert!(!arena.is_running());
    assert!(!arena.timer().is_running());
    assert!(arena.players().is_empty());

    for player in [alice, bob] {
        let record = store.read(player, "duel").unwrap().unwrap();
        assert_eq!(record.wins + record.losses + record.draws, 1);
        assert!(record.rating >= 100);
        assert_eq!(record.rating, summary.players[&player].rating_after);
        assert_eq!(messenger.count(player, Msg::RatingChanged), 1);
        assert_eq!(messenger.count(player, Msg::ArenaEnded), 1);
    }
    assert_eq!(store.read(alice, "duel").unwrap().unwrap().wins, 1);
    assert_eq!(store.read(bob, "duel").unwrap().unwrap().losses, 1);
    assert!(summary.players[&alice].rating_after > summary.players[&bob].rating_after);

    // Snapshot restored: back where they started
    assert_eq!(host.location(alice), home);
}
