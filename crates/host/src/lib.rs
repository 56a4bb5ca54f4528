//! Runnable host for the strata world core: the collaborators the engine
//! leaves open (region persistence, terrain, meshing) plus configuration and
//! frame metrics for the run loop in `main.rs`.

pub mod config;
pub mod mesher;
pub mod metrics;
pub mod persistence;
pub mod terrain;

use strata_engine::{Aabb, Collaborators};

/// Player collision box.
pub const PLAYER_HALF_WIDTH: f64 = 0.3;
pub const PLAYER_HEIGHT: f64 = 1.8;

/// The standard collaborator set: noise terrain, region files, face meshes.
pub fn collaborators(config: &config::HostConfig) -> anyhow::Result<Collaborators> {
    let store = persistence::RegionStore::open(&config.world_dir)?;
    Ok(Collaborators::new(
        terrain::NoiseTerrain::new(config.terrain.clone()),
        store,
        mesher::FaceMesher,
    ))
}

/// Collision box of a player standing at `feet`, in world coordinates.
pub fn player_bounds(feet: [f64; 3]) -> Aabb {
    Aabb::around_feet(feet, PLAYER_HALF_WIDTH, PLAYER_HEIGHT)
}
