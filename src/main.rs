//! Tipr Engine demo
//!
//! Plays a scripted card-battle game on a simulated clock, then replays
//! the recorded history and checks it lands on the live state.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tipr::{
    game::{GameKind, Seat},
    session::{GameStatus, SessionManager},
    VERSION,
};

/// Picks per round: (first seat, second seat). -1 passes.
const SCRIPT: [(i64, i64); 6] = [(0, 2), (1, -1), (4, 3), (-1, -1), (5, 7), (8, 6)];

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Tipr Engine v{}", VERSION);

    let seed: u64 = match std::env::var("TIPR_SEED") {
        Ok(raw) => raw.parse().context("TIPR_SEED must be an unsigned integer")?,
        Err(_) => 12345,
    };
    demo_game(seed).await
}

/// Demo function to exercise a full session.
async fn demo_game(seed: u64) -> Result<()> {
    info!("=== Starting Demo Game ===");
    let start = Utc::now();
    let at = |secs: i64| -> DateTime<Utc> { start + Duration::seconds(secs) };

    let manager = SessionManager::default();
    let id = manager.create(GameKind::Rps, &json!({ "seed": seed }), at(0)).await?;
    manager.sit(&id, Seat::P1, "ana", at(0)).await?;
    manager.sit(&id, Seat::P2, "bo", at(0)).await?;
    info!("Game ID: {}", id);
    info!("RNG Seed: {}", seed);

    let mut clock = 0;
    for (round, (p1, p2)) in SCRIPT.iter().enumerate() {
        clock += 1;
        for (seat, pick) in [(Seat::P1, *p1), (Seat::P2, *p2)] {
            if let Err(err) = manager.submit(&id, seat, &json!({ "selection": pick }), at(clock)).await {
                info!("Round {}: {} pick {} rejected: {}", round + 1, seat, pick, err);
                manager.submit(&id, seat, &json!({ "selection": -1 }), at(clock)).await?;
            }
        }

        // One advance per resolution tick until the round closes.
        let mut idle = 0;
        while idle < 2 {
            clock += 3;
            if manager.poll_all(at(clock)).await == 0 {
                idle += 1;
            }
        }

        let snap = manager.snapshot(&id, None, at(clock)).await?;
        info!(
            "Round {} done: p1 hp {}, p2 hp {}",
            round + 1,
            snap.state["p1"]["hp"],
            snap.state["p2"]["hp"]
        );
        if snap.status == GameStatus::Finished {
            info!("Game finished: {:?}", snap.result);
            break;
        }
    }

    // Print final results
    info!("=== Game Results ===");
    let handle = manager.get(&id).await.context("demo game vanished")?;
    let session = handle.read().await;
    let hash = session.state_hash();
    info!("Final State Hash: {}", hex::encode(hash));
    info!("Intervals: {} canonical, {} recorded", session.history().canonical_len(), session.history().raw_len());
    for line in session.chat() {
        info!("[{}] {}", line.user, line.message);
    }

    // Verify replay
    info!("=== Verifying Replay ===");
    let replayed = session
        .history()
        .reconstruct(-1, None, true)?
        .into_final()
        .context("empty reconstruction")?;
    if &replayed != session.state() {
        bail!("REPLAY FAILURE: reconstructed state differs from live state");
    }
    info!("REPLAY VERIFIED: history reproduces the live state");
    Ok(())
}
