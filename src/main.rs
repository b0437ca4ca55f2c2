//! Twenty48 Panel Host
//!
//! `twenty48-panel` serves the panel over WebSocket.
//! `twenty48-panel demo [seed]` plays a headless game and logs the result.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use twenty48::{
    VERSION,
    core::{clock::{Clock, SystemClock}, hash::short_hex, rng::entropy_seed},
    game::{Direction, GameEngine},
    network::{GameServer, ServerConfig},
    persistence::serialize,
};

/// Demo stops after this many moves even if the game is still running.
const DEMO_MOVE_LIMIT: u64 = 100_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Twenty48 Panel v{}", VERSION);

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("demo") => {
            let seed = match args.next() {
                Some(raw) => raw.parse().with_context(|| format!("Invalid seed '{}'", raw))?,
                None => entropy_seed(),
            };
            demo_game(seed)
        }
        Some(other) => anyhow::bail!("Unknown command '{}' (expected 'demo [seed]')", other),
        None => serve().await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    let server = GameServer::open(config).context("Failed to start server")?;

    tokio::select! {
        result = server.run() => result.context("Server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}

/// Play with a fixed direction rotation until the game ends.
fn demo_game(seed: u64) -> anyhow::Result<()> {
    info!("=== Starting Demo Game ===");
    info!("RNG Seed: {}", seed);

    let now = SystemClock.now_ms();
    let mut engine = GameEngine::started(seed, now)?;
    let rotation = [Direction::Left, Direction::Down, Direction::Right, Direction::Down];

    let mut turn = 0usize;
    while !engine.phase().is_terminal() && engine.move_count() < DEMO_MOVE_LIMIT {
        // Prefer the rotation; fall back to any direction that moves.
        let preferred = rotation[turn % rotation.len()];
        turn += 1;
        let direction = if engine.can_move(preferred) {
            preferred
        } else {
            match Direction::ALL.into_iter().find(|&d| engine.can_move(d)) {
                Some(d) => d,
                None => break,
            }
        };
        let result = engine.apply_move(direction);
        for event in result.events.iter().filter(|e| e.is_phase_change()) {
            info!("Move {}: {:?}", engine.move_count(), event);
        }
    }

    if !engine.phase().is_terminal() {
        warn!("Demo stopped before the game ended");
    }

    info!("=== Demo Complete ===");
    for row in engine.board().rows() {
        info!("  {:>5} {:>5} {:>5} {:>5}", row[0], row[1], row[2], row[3]);
    }
    info!("Score: {}", engine.score());
    info!("Moves: {}", engine.move_count());
    info!("Max tile: {}", engine.board().max_tile());
    info!("Phase: {}", engine.phase());

    let snapshot = engine.snapshot();
    let saved = serialize(&snapshot, SystemClock.now_ms())?;
    info!("Save: {} bytes, fingerprint {}", saved.len(), short_hex(&snapshot.fingerprint()));

    Ok(())
}
