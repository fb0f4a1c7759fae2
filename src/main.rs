//! Arena Match Server
//!
//! Loads the arena configuration, then either plays a demo match against the
//! in-memory host or (with `--serve`) drives the tick loop until Ctrl-C.

use std::env;
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arena_match::{
    ArenaManager, ArenaServer, ConfigStore, Location, RuntimeConfig, Services, WarpKind,
    TICKS_PER_SECOND, VERSION,
    host::{InMemoryHost, LogMessenger, PlayerHost},
    stats::JsonStatsStore,
};

const CONFIG_ENV: &str = "ARENA_CONFIG";
const STATS_DIR_ENV: &str = "ARENA_STATS_DIR";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let serve = args.iter().any(|a| a == "--serve");
    let path = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .or_else(|| env::var(CONFIG_ENV).ok());

    let config = match &path {
        Some(path) => ConfigStore::load(path).with_context(|| format!("loading config from {}", path))?,
        None => ConfigStore::new(),
    };

    // RUST_LOG wins; otherwise the global logging flag picks the level
    let default_level = if config.global().logging { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("installing tracing subscriber")?;

    info!("Arena Match Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICKS_PER_SECOND);

    let stats_dir = env::var(STATS_DIR_ENV).unwrap_or_else(|_| "stats".to_string());
    let host = Arc::new(InMemoryHost::default());
    let services = Services::new(
        host.clone(),
        host.clone(),
        Arc::new(LogMessenger),
        Arc::new(JsonStatsStore::new(stats_dir)),
    );

    let mut manager = ArenaManager::new(config, services);
    manager.initialize().context("loading arenas")?;

    if serve {
        let server = Arc::new(ArenaServer::new(RuntimeConfig::default(), manager));
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown.send(());
            }
        });
        let ended = server.run().await;
        info!(ended = ended.len(), "Server stopped");
        return Ok(());
    }

    demo_match(&host, &mut manager)
}

/// Play one free-for-all match with four simulated players.
fn demo_match(host: &InMemoryHost, manager: &mut ArenaManager) -> Result<()> {
    info!("=== Starting Demo Match ===");

    let name = match manager.only_arena() {
        Some(arena) => arena.name().to_string(),
        None => manager
            .arenas()
            .next()
            .map(|a| a.name().to_string())
            .context("no arenas configured")?,
    };

    if !manager.missing_warps(&name)?.is_empty() {
        warn!(arena = %name, "Arena has missing warps, placing demo warps");
        manager.set_warp(&name, WarpKind::Lobby, Location::new(0.0, 70.0, 0.0))?;
        manager.set_warp(&name, WarpKind::Spec, Location::new(0.0, 90.0, 0.0))?;
        manager.set_warp(&name, WarpKind::End, Location::new(0.0, 64.0, 0.0))?;
    }

    let players: Vec<_> = ["ana", "ben", "cyd", "dee"].iter().map(|n| host.connect(*n)).collect();
    for player in &players {
        manager.join(*player, &name)?;
    }

    let arena = manager
        .arena_with_name_mut(&name)
        .context("arena vanished")?;
    arena.force_start()?;
    info!(arena = %name, players = arena.active().len(), "Demo match running");

    // Rotating kills: first player to the score target wins
    let mut finished = None;
    for round in 0..1000usize {
        let killer = players[round % players.len()];
        let victim = players[(round * 3 + 1) % players.len()];
        if killer != victim && arena.active().contains(&killer) && arena.active().contains(&victim) {
            if let Some(summary) = arena.record_kill(killer, victim)? {
                finished = Some(summary);
                break;
            }
        }
        if let Some(summary) = arena.tick() {
            finished = Some(summary);
            break;
        }
    }

    let summary = match finished {
        Some(summary) => summary,
        None => arena.force_end().context("demo match did not end")?,
    };

    info!("=== Match Results ===");
    for (player, result) in &summary.players {
        info!(
            "{} - {:?}, rating {} -> {} ({:+})",
            host.display_name(*player),
            result.outcome,
            result.rating_before,
            result.rating_after,
            result.rating_delta()
        );
    }
    if summary.draw {
        info!("Match drawn");
    }
    Ok(())
}
