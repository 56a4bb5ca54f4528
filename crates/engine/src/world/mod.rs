pub mod block;
pub mod chunk;
pub mod edit;
pub mod group;
pub mod jobs;
mod lighting;
pub mod position;
mod stream;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use slotmap::SlotMap;
use thiserror::Error;

use crate::collab::Collaborators;
use crate::config::{ConfigError, WorldConfig};
use crate::light::{LightQueues, MAX_LIGHT, MIN_LIGHT};
use crate::mesh::{MeshInput, MeshUpdate};
use crate::sched::AsyncScheduler;
use block::BlockId;
use chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, Chunk, ChunkState, LightChannel, WORLD_HEIGHT};
use group::{ChunkGroup, GroupKey, GroupPool, GroupState};
use jobs::WorldJob;
use position::{Anchor, ChunkPos, ColumnPos, LocalPos, RelPos, WorldPos};

pub use edit::EditOutcome;

#[derive(Error, Debug)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start worker threads: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A chunk addressed through its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    pub group: GroupKey,
    pub cy: i32,
}

/// Where a chunk-relative offset lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebased {
    Chunk { at: ChunkRef, rel: RelPos },
    /// Below the world: implicitly solid.
    Floor,
    /// Above the world: implicitly air.
    Ceiling,
    /// Outside the loaded window.
    Unloaded,
}

/// Axis-aligned box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// A box of the given half width and height standing on `feet`.
    pub fn around_feet(feet: [f64; 3], half_width: f64, height: f64) -> Self {
        Self {
            min: [feet[0] - half_width, feet[1], feet[2] - half_width],
            max: [feet[0] + half_width, feet[1] + height, feet[2] + half_width],
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] < other.max[i] && self.max[i] > other.min[i])
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldStats {
    pub frame: u64,
    pub groups: usize,
    pub preprocessed_groups: usize,
    pub pooled_bodies: usize,
    pub allocated_bodies: usize,
    pub destroy_queue: usize,
    pub pending_create: usize,
    pub saves_in_flight: usize,
    pub outstanding_jobs: usize,
    pub visible_chunks: usize,
    pub mesh_backlog: usize,
    pub queue_full_events: u64,
}

/// The loaded, streaming world. Owned and driven by one thread.
pub struct World {
    config: WorldConfig,
    anchor: Anchor,
    groups: SlotMap<GroupKey, ChunkGroup>,
    /// Active window, indexed by [`Anchor::index`].
    grid: Vec<Option<GroupKey>>,
    /// Groups between windows during a shift. Empty outside `shift_world`.
    recycle: HashMap<ColumnPos, GroupKey>,
    pool: GroupPool,
    destroy_queue: VecDeque<GroupKey>,
    /// Created groups waiting for a generate job, nearest first.
    pending_create: Vec<GroupKey>,
    /// Groups whose light still has to be joined with their neighbors.
    pending_stitch: Vec<GroupKey>,
    /// Columns with a save job in flight.
    saving: HashSet<ColumnPos>,
    visible: Vec<ChunkPos>,
    mesh_updates: Vec<MeshUpdate>,
    mesh_backlog: usize,
    scheduler: AsyncScheduler<WorldJob>,
    collab: Arc<Collaborators>,
    queues: LightQueues,
    player: Option<Aabb>,
    frame: u64,
    queue_full_events: u64,
}

impl World {
    /// Create a world centered on `center` and schedule its initial window.
    pub fn new(config: WorldConfig, center: ColumnPos, collab: Collaborators) -> Result<Self, WorldError> {
        config.validate()?;
        let scheduler = AsyncScheduler::new(config.queue_capacity, config.worker_count)?;
        let anchor = Anchor::new(center, config.load_range);
        let slots = (anchor.size() * anchor.size()) as usize;
        tracing::info!(
            "world starting at column ({}, {}), {}x{} window, {} workers",
            center.x,
            center.z,
            anchor.size(),
            anchor.size(),
            config.worker_count
        );

        let mut world = Self {
            config,
            anchor,
            groups: SlotMap::with_key(),
            grid: vec![None; slots],
            recycle: HashMap::new(),
            pool: GroupPool::new(),
            destroy_queue: VecDeque::new(),
            pending_create: Vec::new(),
            pending_stitch: Vec::new(),
            saving: HashSet::new(),
            visible: Vec::new(),
            mesh_updates: Vec::new(),
            mesh_backlog: 0,
            scheduler,
            collab: Arc::new(collab),
            queues: LightQueues::new(),
            player: None,
            frame: 0,
            queue_full_events: 0,
        };
        world.shift_world(center);
        Ok(world)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn to_local(&self, pos: WorldPos) -> LocalPos {
        self.anchor.to_local(pos)
    }

    pub fn to_world(&self, pos: LocalPos) -> WorldPos {
        self.anchor.to_world(pos)
    }

    pub fn group(&self, key: GroupKey) -> Option<&ChunkGroup> {
        self.groups.get(key)
    }

    pub fn group_key_at(&self, lcx: i32, lcz: i32) -> Option<GroupKey> {
        if !self.anchor.contains_local(lcx, lcz) {
            return None;
        }
        self.grid[self.anchor.index(lcx, lcz)]
    }

    /// Group in the active window at local column `(lcx, lcz)`.
    pub fn group_at(&self, lcx: i32, lcz: i32) -> Option<&ChunkGroup> {
        self.group_key_at(lcx, lcz).and_then(|k| self.groups.get(k))
    }

    /// Chunk at a local chunk position, if its group's body is attached.
    pub fn chunk(&self, at: ChunkRef) -> Option<&Chunk> {
        self.groups.get(at.group)?.chunk(at.cy)
    }

    pub fn chunk_state(&self, pos: LocalPos) -> Option<ChunkState> {
        match self.locate(pos) {
            Rebased::Chunk { at, .. } => self.chunk(at).map(|c| c.state),
            _ => None,
        }
    }

    /// Chunks with a current mesh, as of the last update.
    pub fn visible_chunks(&self) -> &[ChunkPos] {
        &self.visible
    }

    /// Drain mesh builds and frees for the renderer.
    pub fn take_mesh_updates(&mut self) -> Vec<MeshUpdate> {
        std::mem::take(&mut self.mesh_updates)
    }

    /// Register the player's box for edit rejection. World coordinates.
    pub fn set_player_bounds(&mut self, bounds: Aabb) {
        self.player = Some(bounds);
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            frame: self.frame,
            groups: self.groups.len(),
            preprocessed_groups: self
                .groups
                .values()
                .filter(|g| g.state == GroupState::Preprocessed)
                .count(),
            pooled_bodies: self.pool.free_count(),
            allocated_bodies: self.pool.allocated(),
            destroy_queue: self.destroy_queue.len(),
            pending_create: self.pending_create.len(),
            saves_in_flight: self.saving.len(),
            outstanding_jobs: self.scheduler.outstanding(),
            visible_chunks: self.visible.len(),
            mesh_backlog: self.mesh_backlog,
            queue_full_events: self.queue_full_events,
        }
    }

    /// Nothing queued, in flight or waiting for dispatch.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
            && self.destroy_queue.is_empty()
            && self.pending_create.is_empty()
            && self.pending_stitch.is_empty()
            && self.mesh_backlog == 0
            && self.grid.iter().flatten().all(|&k| {
                self.groups.get(k).is_some_and(|g| g.state == GroupState::Preprocessed)
            })
    }

    // ── Block queries ───────────────────────────────────────────────────

    /// Resolve a local-world position to a chunk of the active window.
    pub fn locate(&self, pos: LocalPos) -> Rebased {
        if pos.y < 0 {
            return Rebased::Floor;
        }
        if pos.y >= WORLD_HEIGHT {
            return Rebased::Ceiling;
        }
        let lc = pos.local_chunk();
        match self.group_key_at(lc.x, lc.z) {
            Some(group) => Rebased::Chunk {
                at: ChunkRef { group, cy: lc.y },
                rel: pos.relative(),
            },
            None => Rebased::Unloaded,
        }
    }

    /// Resolve an offset relative to `from`'s origin, which may fall outside
    /// that chunk.
    pub fn rebase(&self, from: ChunkRef, offset: [i32; 3]) -> Rebased {
        let Some(group) = self.groups.get(from.group) else {
            return Rebased::Unloaded;
        };
        if !group.active {
            return Rebased::Unloaded;
        }
        let pos = LocalPos::new(
            group.local.0 * CHUNK_SIZE_H + offset[0],
            from.cy * CHUNK_SIZE_V + offset[1],
            group.local.1 * CHUNK_SIZE_H + offset[2],
        );
        self.locate(pos)
    }

    fn resolve_block(&self, target: Rebased) -> BlockId {
        match target {
            Rebased::Floor => BlockId::KILL_ZONE,
            Rebased::Ceiling | Rebased::Unloaded => BlockId::AIR,
            Rebased::Chunk { at, rel } => match self.chunk(at) {
                Some(chunk) if chunk.state >= ChunkState::LoadedData => chunk.get(rel),
                _ => BlockId::AIR,
            },
        }
    }

    pub fn get_block(&self, pos: LocalPos) -> BlockId {
        self.resolve_block(self.locate(pos))
    }

    /// Block at an offset from `from`, treating anything unresolvable as air
    /// and the floor as the kill zone.
    pub fn get_block_safe(&self, from: ChunkRef, offset: [i32; 3]) -> BlockId {
        self.resolve_block(self.rebase(from, offset))
    }

    pub fn get_block_world(&self, pos: WorldPos) -> BlockId {
        self.get_block(self.anchor.to_local(pos))
    }

    /// Effective light, with implicit sunlight above the surface.
    pub fn light_at(&self, channel: LightChannel, pos: LocalPos) -> u8 {
        match self.sample(pos) {
            (_, sun, _) if channel == LightChannel::Sun => sun,
            (_, _, torch) => torch,
        }
    }

    /// Surface height of the column containing `pos`, once its light has
    /// been computed.
    pub fn surface_at(&self, pos: LocalPos) -> Option<i32> {
        let lc = pos.local_chunk();
        let group = self.group_at(lc.x, lc.z).filter(|g| g.state >= GroupState::Preprocessed)?;
        let body = group.body.as_deref()?;
        let rel = pos.relative();
        Some(body.surface(rel.x, rel.z))
    }

    /// Block, sunlight and block light as a mesh sees them.
    fn sample(&self, pos: LocalPos) -> (BlockId, u8, u8) {
        match self.locate(pos) {
            Rebased::Floor => (BlockId::KILL_ZONE, MIN_LIGHT, MIN_LIGHT),
            Rebased::Ceiling | Rebased::Unloaded => (BlockId::AIR, MAX_LIGHT, MIN_LIGHT),
            Rebased::Chunk { at, rel } => {
                let Some(group) = self.groups.get(at.group) else {
                    return (BlockId::AIR, MAX_LIGHT, MIN_LIGHT);
                };
                let Some(body) = group.body.as_deref() else {
                    return (BlockId::AIR, MAX_LIGHT, MIN_LIGHT);
                };
                let chunk = &body.chunks[at.cy as usize];
                if chunk.state < ChunkState::LoadedData {
                    return (BlockId::AIR, MAX_LIGHT, MIN_LIGHT);
                }
                let sun = if pos.y >= body.surface(rel.x, rel.z) {
                    MAX_LIGHT
                } else {
                    chunk.light(LightChannel::Sun, rel)
                };
                (chunk.get(rel), sun, chunk.light(LightChannel::Block, rel))
            }
        }
    }

    /// Copy a chunk and its one-block border for meshing.
    pub fn mesh_input(&self, at: ChunkRef) -> Option<MeshInput> {
        let group = self.groups.get(at.group)?;
        let mut input = MeshInput::new(group.pos.chunk(at.cy));
        let origin = LocalPos::new(
            group.local.0 * CHUNK_SIZE_H,
            at.cy * CHUNK_SIZE_V,
            group.local.1 * CHUNK_SIZE_H,
        );
        for z in -1..=CHUNK_SIZE_H {
            for y in -1..=CHUNK_SIZE_V {
                for x in -1..=CHUNK_SIZE_H {
                    let (block, sun, torch) = self.sample(origin.offset(x, y, z));
                    input.set(x, y, z, block, sun, torch);
                }
            }
        }
        Some(input)
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    /// Finish outstanding jobs, then save every modified group in parallel.
    /// Returns the number of groups saved.
    pub fn shutdown(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        while !self.scheduler.is_idle() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "shutdown timed out with {} jobs outstanding",
                    self.scheduler.outstanding()
                );
                break;
            }
            self.scheduler.wait_for_completion(Duration::from_millis(50));
            self.run_callbacks();
        }
        let saved = self.save_modified();
        tracing::info!("shutdown: saved {} modified groups", saved);
        saved
    }

    /// Save every modified group that is on the main thread right now, in
    /// parallel, and clear its modified flag. Groups checked out to a job
    /// keep the flag and are picked up next time.
    pub fn save_modified(&mut self) -> usize {
        let store = &self.collab.store;
        let to_save: Vec<_> = self
            .groups
            .values_mut()
            .filter(|g| g.modified && g.state >= GroupState::Loaded && g.body.is_some())
            .filter_map(|g| {
                g.modified = false;
                g.body.as_deref().map(|b| (g.pos, b))
            })
            .collect();
        let saved = to_save.len();
        to_save.par_iter().for_each(|(pos, body)| store.save(*pos, body));
        saved
    }
}

/// Squared distance of a local column from the window center.
fn center_distance(anchor: &Anchor, lcx: i32, lcz: i32) -> i32 {
    let (dx, dz) = (lcx - anchor.load_range, lcz - anchor.load_range);
    dx * dx + dz * dz
}
