//! Host configuration, read from a JSON file.
//!
//! Every field has a default, so an empty object (or no file at all) gives a
//! runnable setup. Command line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use strata_engine::WorldConfig;

use crate::terrain::TerrainSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding the region files.
    pub world_dir: PathBuf,
    pub world: WorldConfig,
    pub terrain: TerrainSettings,
    /// Target frame time.
    pub frame_ms: u64,
    /// Stop after this many frames. `0` runs until ctrl-c.
    pub frames: u64,
    /// Walking speed of the simulated player, in blocks per second.
    pub walk_speed: f64,
    /// Heading of the walk, in degrees from +X toward +Z.
    pub walk_heading: f64,
    pub spawn: [i64; 2],
    pub autosave_secs: u64,
    pub stats_secs: u64,
    /// Seconds to wait for in-flight saves on exit.
    pub shutdown_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            world_dir: "world".into(),
            world: WorldConfig::default(),
            terrain: TerrainSettings::default(),
            frame_ms: 16,
            frames: 0,
            walk_speed: 6.0,
            walk_heading: 30.0,
            spawn: [8, 8],
            autosave_secs: 300,
            stats_secs: 5,
            shutdown_timeout_secs: 30,
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
        config.world.validate().with_context(|| format!("invalid world section in {}", path.display()))?;
        Ok(config)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_secs.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
