use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use strata_engine::World;
use strata_engine::world::block::BlockId;
use strata_engine::world::position::{LocalPos, WorldPos};
use strata_host::config::HostConfig;
use strata_host::metrics::FrameMetrics;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path: Option<PathBuf> = std::env::args().skip_while(|a| a != "--config").nth(1).map(Into::into);
    let world_dir: Option<PathBuf> = std::env::args().skip_while(|a| a != "--world").nth(1).map(Into::into);
    let frames: Option<u64> = std::env::args()
        .skip_while(|a| a != "--frames")
        .nth(1)
        .and_then(|s| s.parse().ok());
    let demo_mode = std::env::args().any(|a| a == "--demo");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let mut config = match config_path {
        Some(path) => match HostConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{:#}", e);
                std::process::exit(1);
            }
        },
        None => HostConfig::default(),
    };
    if let Some(dir) = world_dir {
        config.world_dir = dir;
    }
    if let Some(frames) = frames {
        config.frames = frames;
    }

    if let Err(e) = run(config, demo_mode).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: HostConfig, demo_mode: bool) -> Result<()> {
    tracing::info!("strata -- streaming voxel world host");
    tracing::info!(
        "World dir {}, load range {}, {} workers",
        config.world_dir.display(),
        config.world.load_range,
        config.world.worker_count
    );

    let collab = strata_host::collaborators(&config)?;
    let spawn = WorldPos::new(config.spawn[0], 0, config.spawn[1]);
    let mut world = World::new(config.world.clone(), spawn.column(), collab).context("creating world")?;
    let metrics = FrameMetrics::new();

    let heading = config.walk_heading.to_radians();
    let step = config.walk_speed * config.frame_interval().as_secs_f64();
    let mut player = [spawn.x as f64 + 0.5, 0.0, spawn.z as f64 + 0.5];
    let mut demo_built = !demo_mode;

    let mut frame_timer = tokio::time::interval(config.frame_interval());
    frame_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut autosave = tokio::time::interval(config.autosave_interval());
    autosave.tick().await; // first tick is immediate, skip it
    let mut stats = tokio::time::interval(config.stats_interval());
    stats.tick().await;

    let started = Instant::now();
    loop {
        tokio::select! {
            _ = frame_timer.tick() => {
                let local = world.to_local(WorldPos::from_f64(player));
                // Walk along the surface once the column is lit.
                if let Some(surface) = world.surface_at(local) {
                    player[1] = surface as f64;
                    player[0] += heading.cos() * step;
                    player[2] += heading.sin() * step;
                }
                world.set_player_bounds(strata_host::player_bounds(player));

                let t0 = Instant::now();
                world.update(player);
                metrics.record_frame(t0.elapsed());
                metrics.record_mesh_updates(&world.take_mesh_updates());

                if !demo_built && world.is_idle() {
                    demo_built = build_demo(&mut world, &metrics, player);
                }

                let frame = world.stats().frame;
                if config.frames > 0 && frame >= config.frames {
                    tracing::info!("Reached {} frames in {:.2?}", frame, started.elapsed());
                    break;
                }
            }
            _ = autosave.tick() => {
                tracing::info!("Autosaving...");
                let t0 = Instant::now();
                let n = world.save_modified();
                tracing::info!("Autosave complete: {} groups in {:.2?}", n, t0.elapsed());
            }
            _ = stats.tick() => {
                log_stats(&world, &metrics);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break;
            }
        }
    }

    log_stats(&world, &metrics);

    // ── Save on shutdown ─────────────────────────────────────────────────
    tracing::info!("Saving world before exit...");
    let saved = world.shutdown(config.shutdown_timeout());
    tracing::info!("Shutdown save complete: {} groups written", saved);
    Ok(())
}

fn log_stats(world: &World, metrics: &FrameMetrics) {
    let world_stats = serde_json::to_string(&world.stats()).unwrap_or_default();
    let frame_stats = serde_json::to_string(&metrics.snapshot()).unwrap_or_default();
    tracing::info!("world {}", world_stats);
    tracing::info!("frames {}", frame_stats);
}

/// Build a small glass hut lit by a lantern a few blocks ahead of the player.
/// Returns `false` if the ground there is not editable yet.
fn build_demo(world: &mut World, metrics: &FrameMetrics, player: [f64; 3]) -> bool {
    let feet = world.to_local(WorldPos::from_f64(player));
    let origin = feet.offset(4, 0, 4);
    let Some(ground) = world.surface_at(origin) else {
        return false;
    };
    let base = LocalPos::new(origin.x, ground, origin.z);

    let mut placed = 0;
    for dz in 0..5 {
        for dy in 0..4 {
            for dx in 0..5 {
                let wall = dx == 0 || dx == 4 || dz == 0 || dz == 4;
                let block = match (wall, dy) {
                    (_, 3) => BlockId::LOG,
                    (true, _) if dx == 2 && dz == 0 && dy < 2 => BlockId::AIR,
                    (true, _) => BlockId::GLASS,
                    (false, _) => BlockId::AIR,
                };
                let outcome = world.set_block(base.offset(dx, dy, dz), block);
                metrics.record_edit(outcome);
                placed += outcome.changed_world() as usize;
            }
        }
    }
    let outcome = world.set_block(base.offset(2, 0, 2), BlockId::LANTERN);
    metrics.record_edit(outcome);
    tracing::info!("Demo hut: {} blocks placed at {:?}, lantern {:?}", placed, world.to_world(base), outcome);
    true
}
