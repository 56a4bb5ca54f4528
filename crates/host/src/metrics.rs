//! Lock-free frame counters.
//!
//! The run loop bumps these once per frame; the periodic stats log reads a
//! snapshot. Nothing here blocks.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

use strata_engine::EditOutcome;
use strata_engine::mesh::MeshUpdate;

pub struct FrameMetrics {
    frames: AtomicU64,
    frame_ns_sum: AtomicU64,
    frame_ns_max: AtomicU64,

    // Frame time histogram
    hist_under_1ms: AtomicU64,
    hist_1_4ms: AtomicU64,
    hist_4_16ms: AtomicU64,
    hist_16_50ms: AtomicU64,
    hist_over_50ms: AtomicU64,

    edits_applied: AtomicU64,
    edits_rejected: AtomicU64,
    meshes_built: AtomicU64,
    mesh_vertices: AtomicU64,
    columns_freed: AtomicU64,

    started_at: Instant,
}

impl FrameMetrics {
    pub fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            frame_ns_sum: AtomicU64::new(0),
            frame_ns_max: AtomicU64::new(0),
            hist_under_1ms: AtomicU64::new(0),
            hist_1_4ms: AtomicU64::new(0),
            hist_4_16ms: AtomicU64::new(0),
            hist_16_50ms: AtomicU64::new(0),
            hist_over_50ms: AtomicU64::new(0),
            edits_applied: AtomicU64::new(0),
            edits_rejected: AtomicU64::new(0),
            meshes_built: AtomicU64::new(0),
            mesh_vertices: AtomicU64::new(0),
            columns_freed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Called once per `World::update`.
    pub fn record_frame(&self, duration: Duration) {
        let ns = duration.as_nanos() as u64;
        self.frames.fetch_add(1, Relaxed);
        self.frame_ns_sum.fetch_add(ns, Relaxed);
        self.frame_ns_max.fetch_max(ns, Relaxed);

        let bucket = match duration.as_millis() {
            0 => &self.hist_under_1ms,
            1..=3 => &self.hist_1_4ms,
            4..=15 => &self.hist_4_16ms,
            16..=49 => &self.hist_16_50ms,
            _ => &self.hist_over_50ms,
        };
        bucket.fetch_add(1, Relaxed);
    }

    pub fn record_edit(&self, outcome: EditOutcome) {
        if outcome.changed_world() {
            self.edits_applied.fetch_add(1, Relaxed);
        } else {
            self.edits_rejected.fetch_add(1, Relaxed);
        }
    }

    pub fn record_mesh_updates(&self, updates: &[MeshUpdate]) {
        for update in updates {
            match update {
                MeshUpdate::Built { mesh, .. } => {
                    self.meshes_built.fetch_add(1, Relaxed);
                    self.mesh_vertices.fetch_add(mesh.vertex_count() as u64, Relaxed);
                }
                MeshUpdate::Freed { .. } => {
                    self.columns_freed.fetch_add(1, Relaxed);
                }
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let frames = self.frames.load(Relaxed);
        let ns_sum = self.frame_ns_sum.load(Relaxed);
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            frames,
            mean_frame_ms: if frames == 0 { 0.0 } else { ns_sum as f64 / frames as f64 / 1e6 },
            max_frame_ms: self.frame_ns_max.load(Relaxed) as f64 / 1e6,
            edits_applied: self.edits_applied.load(Relaxed),
            edits_rejected: self.edits_rejected.load(Relaxed),
            meshes_built: self.meshes_built.load(Relaxed),
            mesh_vertices: self.mesh_vertices.load(Relaxed),
            columns_freed: self.columns_freed.load(Relaxed),
            hist: [
                self.hist_under_1ms.load(Relaxed),
                self.hist_1_4ms.load(Relaxed),
                self.hist_4_16ms.load(Relaxed),
                self.hist_16_50ms.load(Relaxed),
                self.hist_over_50ms.load(Relaxed),
            ],
        }
    }
}

impl Default for FrameMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub frames: u64,
    pub mean_frame_ms: f64,
    pub max_frame_ms: f64,
    pub edits_applied: u64,
    pub edits_rejected: u64,
    pub meshes_built: u64,
    pub mesh_vertices: u64,
    pub columns_freed: u64,
    /// `[<1ms, 1-4ms, 4-16ms, 16-50ms, >50ms]`
    pub hist: [u64; 5],
}
