//! Tunables of the streaming world.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected [`WorldConfig`] values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The window needs an interior ring to mesh anything.
    #[error("load_range must be at least 2, got {0}")]
    LoadRange(i32),

    #[error("worker_count must be at least 1")]
    NoWorkers,

    /// The ring holds `capacity - 1` jobs, so 2 is the smallest useful size.
    #[error("queue_capacity must be at least 2, got {0}")]
    QueueCapacity(usize),

    #[error("{name} must be at least 1")]
    ZeroBudget { name: &'static str },

    #[error("shift_margin must be finite and non-negative, got {0}")]
    ShiftMargin(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Columns loaded on each side of the player's column.
    pub load_range: i32,
    pub worker_count: usize,
    /// Slots in the job ring.
    pub queue_capacity: usize,
    pub max_destroys_per_frame: usize,
    pub max_mesh_jobs_per_frame: usize,
    /// Per-chunk vertex budget enforced on edits.
    pub max_chunk_vertices: u32,
    /// Blocks the player may stray past the center column before a shift.
    pub shift_margin: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            load_range: 6,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(2),
            queue_capacity: 1024,
            max_destroys_per_frame: 4,
            max_mesh_jobs_per_frame: 16,
            max_chunk_vertices: 98_304,
            shift_margin: 8.0,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_range < 2 {
            return Err(ConfigError::LoadRange(self.load_range));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.queue_capacity < 2 {
            return Err(ConfigError::QueueCapacity(self.queue_capacity));
        }
        if self.max_destroys_per_frame == 0 {
            return Err(ConfigError::ZeroBudget { name: "max_destroys_per_frame" });
        }
        if self.max_mesh_jobs_per_frame == 0 {
            return Err(ConfigError::ZeroBudget { name: "max_mesh_jobs_per_frame" });
        }
        if self.max_chunk_vertices == 0 {
            return Err(ConfigError::ZeroBudget { name: "max_chunk_vertices" });
        }
        if !self.shift_margin.is_finite() || self.shift_margin < 0.0 {
            return Err(ConfigError::ShiftMargin(self.shift_margin.to_string()));
        }
        Ok(())
    }

    /// Side length of the loaded window in columns.
    pub fn window_size(&self) -> i32 {
        2 * self.load_range + 1
    }
}
