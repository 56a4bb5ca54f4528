//! Per-frame streaming: window shifts, job dispatch and completions.

use std::sync::Arc;

use super::chunk::{ChunkState, WORLD_CHUNK_HEIGHT};
use super::group::{ChunkGroup, GroupKey, GroupState};
use super::jobs::{JobDone, WorldJob};
use super::lighting::{WorldLight, stitch};
use super::position::{Anchor, ColumnPos, WorldPos};
use super::{ChunkRef, World, center_distance};
use crate::mesh::{ChunkMesh, MeshUpdate};
use crate::sched::QueueFull;

impl World {
    /// Advance one frame. `player` is in world coordinates.
    pub fn update(&mut self, player: [f64; 3]) {
        self.frame += 1;

        let local = self.anchor.to_local_f64(player);
        let [min_x, min_z, max_x, max_z] = self.anchor.in_bounds_rect(self.config.shift_margin);
        if local[0] < min_x || local[0] >= max_x || local[2] < min_z || local[2] >= max_z {
            let target = WorldPos::from_f64(player);
            if target.in_chunk_range() {
                self.shift_world(target.column());
            } else {
                tracing::warn!("player at ({}, {}) is beyond the chunk grid, not shifting", player[0], player[2]);
            }
        }

        self.run_callbacks();
        self.stitch_pending();
        self.process_destroy_queue();
        self.dispatch_generation();
        self.dispatch_preprocessing();
        self.update_meshes();
    }

    // ── Window shift ────────────────────────────────────────────────────

    /// Recenter the window on `center`, reusing every group that stays in
    /// view and creating the rest from the pool.
    pub fn shift_world(&mut self, center: ColumnPos) {
        let old = self.anchor;
        self.anchor = Anchor::new(center, self.config.load_range);
        tracing::debug!(
            "shifting window ({}, {}) -> ({}, {})",
            old.center.x,
            old.center.z,
            center.x,
            center.z
        );

        for slot in 0..self.grid.len() {
            if let Some(key) = self.grid[slot].take() {
                self.add_group_to_hash(key);
            }
        }
        // Destroy-queue entries not yet handed to a save job can still be
        // reclaimed.
        while let Some(key) = self.destroy_queue.pop_front() {
            if self.groups.contains_key(key) {
                self.add_group_to_hash(key);
            }
        }

        let mut misses = Vec::new();
        let mut reclaimed = 0;
        for lcz in 0..self.anchor.size() {
            for lcx in 0..self.anchor.size() {
                let pos = self.anchor.local_to_column(lcx, lcz);
                match self.group_from_hash(pos) {
                    Some(key) => {
                        let group = &mut self.groups[key];
                        group.local = (lcx, lcz);
                        if group.pending_destroy {
                            group.pending_destroy = false;
                            if group.state == GroupState::Preprocessed {
                                self.pending_stitch.push(key);
                            }
                        }
                        self.grid[self.anchor.index(lcx, lcz)] = Some(key);
                        reclaimed += 1;
                    }
                    None => misses.push((lcx, lcz)),
                }
            }
        }

        let anchor = self.anchor;
        misses.sort_by_key(|&(lcx, lcz)| center_distance(&anchor, lcx, lcz));
        for &(lcx, lcz) in &misses {
            let pos = anchor.local_to_column(lcx, lcz);
            let body = self.pool.acquire();
            let key = self.groups.insert(ChunkGroup::new(pos, (lcx, lcz), body));
            self.grid[anchor.index(lcx, lcz)] = Some(key);
        }

        let leftovers: Vec<GroupKey> = self.recycle.drain().map(|(_, key)| key).collect();
        for key in leftovers {
            self.groups[key].pending_destroy = true;
            self.destroy_queue.push_back(key);
        }

        self.rebuild_pending_create();
        tracing::debug!(
            "shift done: {} reclaimed, {} created, {} queued for destroy",
            reclaimed,
            misses.len(),
            self.destroy_queue.len()
        );
    }

    fn add_group_to_hash(&mut self, key: GroupKey) {
        let group = &mut self.groups[key];
        group.active = false;
        let previous = self.recycle.insert(group.pos, key);
        debug_assert!(previous.is_none(), "column ({}, {}) hashed twice", group.pos.x, group.pos.z);
    }

    fn group_from_hash(&mut self, pos: ColumnPos) -> Option<GroupKey> {
        let key = self.recycle.remove(&pos)?;
        self.groups[key].active = true;
        Some(key)
    }

    fn rebuild_pending_create(&mut self) {
        let anchor = self.anchor;
        let mut pending: Vec<(i32, GroupKey)> = self
            .grid
            .iter()
            .flatten()
            .filter_map(|&key| {
                let g = self.groups.get(key)?;
                (g.state == GroupState::Default && !g.busy)
                    .then(|| (center_distance(&anchor, g.local.0, g.local.1), key))
            })
            .collect();
        pending.sort_by_key(|&(d, _)| d);
        self.pending_create = pending.into_iter().map(|(_, k)| k).collect();
    }

    // ── Completions ─────────────────────────────────────────────────────

    /// Apply every finished job. Returns how many completed.
    pub fn run_callbacks(&mut self) -> usize {
        let mut done = Vec::new();
        self.scheduler.run_callbacks(|output| done.push(output));
        let count = done.len();
        for output in done {
            self.complete(output);
        }
        count
    }

    fn complete(&mut self, done: JobDone) {
        match done {
            JobDone::Generated { key, body, from_store } => {
                let Some(group) = self.groups.get_mut(key) else {
                    self.pool.release(body);
                    return;
                };
                let mut body = body;
                for chunk in &mut body.chunks {
                    chunk.state = ChunkState::LoadedData;
                }
                group.body = Some(body);
                group.busy = false;
                group.state = GroupState::Loaded;
                group.modified = false;
                tracing::trace!(
                    "group ({}, {}) loaded{}",
                    group.pos.x,
                    group.pos.z,
                    if from_store { " from store" } else { "" }
                );
            }
            JobDone::Preprocessed { key, body } => {
                let Some(group) = self.groups.get_mut(key) else {
                    self.pool.release(body);
                    return;
                };
                group.body = Some(body);
                group.busy = false;
                group.state = GroupState::Preprocessed;
                if group.active {
                    self.pending_stitch.push(key);
                }
            }
            JobDone::Meshed { key, cy, mesh } => self.complete_mesh(key, cy, mesh),
            JobDone::Saved { key, pos, body } => {
                self.saving.remove(&pos);
                match self.groups.get_mut(key) {
                    Some(group) => {
                        group.body = Some(body);
                        group.busy = false;
                        group.modified = false;
                        self.finish_destroy(key);
                    }
                    None => self.pool.release(body),
                }
            }
        }
    }

    fn complete_mesh(&mut self, key: GroupKey, cy: i32, mesh: ChunkMesh) {
        let Some(group) = self.groups.get_mut(key) else {
            return;
        };
        let destroying = group.pending_destroy;
        let chunk_pos = group.pos.chunk(cy);
        let Some(chunk) = group.chunk_mut(cy) else {
            return;
        };
        chunk.meshing = false;
        if destroying {
            // Rebuild if a later shift brings the group back.
            chunk.pending_update = true;
            return;
        }
        let count = mesh.vertex_count();
        if chunk.pending_update {
            // Changed while the job ran; the incremental count is newer.
            chunk.state = ChunkState::NeedsFill;
            chunk.vertex_count.get_or_insert(count);
        } else {
            chunk.state = ChunkState::Built;
            chunk.vertex_count = Some(count);
        }
        self.mesh_updates.push(MeshUpdate::Built { chunk: chunk_pos, mesh });
    }

    fn stitch_pending(&mut self) {
        if self.pending_stitch.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_stitch);
        for key in pending {
            let Some(group) = self.groups.get(key) else {
                continue;
            };
            if !group.active || group.state != GroupState::Preprocessed {
                continue;
            }
            let (lcx, lcz) = group.local;
            let mut field = WorldLight::new(&mut self.groups, &self.grid, self.anchor);
            let edges = stitch(&mut field, lcx, lcz, &mut self.queues);
            tracing::trace!("stitched ({}, {}) across {} edges", lcx, lcz, edges);
        }
    }

    // ── Destroy queue ───────────────────────────────────────────────────

    fn process_destroy_queue(&mut self) {
        let budget = self.config.max_destroys_per_frame.min(self.destroy_queue.len());
        for _ in 0..budget {
            let Some(key) = self.destroy_queue.pop_front() else {
                break;
            };
            let Some(group) = self.groups.get_mut(key) else {
                continue;
            };
            if group.busy {
                self.destroy_queue.push_back(key);
                continue;
            }
            if group.modified && group.state >= GroupState::Loaded {
                let Some(body) = group.body.take() else {
                    continue;
                };
                let pos = group.pos;
                group.busy = true;
                let job = WorldJob::Save { key, pos, body, collab: Arc::clone(&self.collab) };
                match self.scheduler.queue(job) {
                    Ok(()) => {
                        self.saving.insert(pos);
                    }
                    Err(QueueFull(job)) => {
                        self.queue_full(job);
                        self.destroy_queue.push_front(key);
                        break;
                    }
                }
            } else {
                self.finish_destroy(key);
            }
        }
    }

    fn finish_destroy(&mut self, key: GroupKey) {
        let Some(mut group) = self.groups.remove(key) else {
            return;
        };
        debug_assert!(group.pending_destroy && !group.active);
        if let Some(body) = group.body.take() {
            self.pool.release(body);
        }
        self.mesh_updates.push(MeshUpdate::Freed { column: group.pos });
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    fn dispatch_generation(&mut self) {
        if self.pending_create.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_create);
        let mut iter = pending.into_iter();
        while let Some(key) = iter.next() {
            let Some(group) = self.groups.get_mut(key) else {
                continue;
            };
            if !group.active || group.busy || group.state != GroupState::Default {
                continue;
            }
            if self.saving.contains(&group.pos) {
                self.pending_create.push(key);
                continue;
            }
            let Some(body) = group.body.take() else {
                continue;
            };
            group.busy = true;
            let pos = group.pos;
            let job = WorldJob::Generate { key, pos, body, collab: Arc::clone(&self.collab) };
            if let Err(QueueFull(job)) = self.scheduler.queue(job) {
                self.queue_full(job);
                self.pending_create.push(key);
                self.pending_create.extend(iter);
                break;
            }
        }
    }

    fn dispatch_preprocessing(&mut self) {
        for slot in 0..self.grid.len() {
            let Some(key) = self.grid[slot] else {
                continue;
            };
            let group = &mut self.groups[key];
            if group.busy || group.state != GroupState::Loaded {
                continue;
            }
            let Some(body) = group.body.take() else {
                continue;
            };
            group.busy = true;
            group.state = GroupState::Preprocessing;
            if let Err(QueueFull(job)) = self.scheduler.queue(WorldJob::Preprocess { key, body }) {
                self.queue_full(job);
                break;
            }
        }
    }

    /// Put a rejected job's work back where it came from.
    fn queue_full(&mut self, job: WorldJob) {
        self.queue_full_events += 1;
        tracing::error!(
            "work queue full ({} slots); deferring to next frame",
            self.scheduler.capacity()
        );
        match job {
            WorldJob::Generate { key, body, .. } => self.restore(key, body, GroupState::Default),
            WorldJob::Preprocess { key, body } => self.restore(key, body, GroupState::Loaded),
            WorldJob::Save { key, body, .. } => {
                let state = self.groups.get(key).map_or(GroupState::Loaded, |g| g.state);
                self.restore(key, body, state);
            }
            WorldJob::BuildMesh { key, cy, .. } => {
                if let Some(chunk) = self.groups.get_mut(key).and_then(|g| g.chunk_mut(cy)) {
                    chunk.meshing = false;
                    chunk.pending_update = true;
                }
            }
        }
    }

    fn restore(&mut self, key: GroupKey, body: Box<super::group::GroupBody>, state: GroupState) {
        match self.groups.get_mut(key) {
            Some(group) => {
                group.body = Some(body);
                group.busy = false;
                group.state = state;
            }
            None => self.pool.release(body),
        }
    }

    // ── Meshing ─────────────────────────────────────────────────────────

    /// Whether the group at `(lcx, lcz)` and all eight neighbors are
    /// preprocessed. The outer ring never qualifies.
    fn is_eligible(&self, lcx: i32, lcz: i32) -> bool {
        if self.anchor.is_edge(lcx, lcz) {
            return false;
        }
        (-1..=1).all(|dz| {
            (-1..=1).all(|dx| {
                self.group_at(lcx + dx, lcz + dz)
                    .is_some_and(|g| g.state == GroupState::Preprocessed && g.body.is_some())
            })
        })
    }

    fn update_meshes(&mut self) {
        self.visible.clear();
        let mut candidates: Vec<(i32, ChunkRef)> = Vec::new();
        let size = self.anchor.size();

        for lcz in 0..size {
            for lcx in 0..size {
                if !self.is_eligible(lcx, lcz) {
                    continue;
                }
                let Some(key) = self.group_key_at(lcx, lcz) else {
                    continue;
                };
                let distance = center_distance(&self.anchor, lcx, lcz);
                let group = &mut self.groups[key];
                let pos = group.pos;
                let Some(body) = group.body.as_deref_mut() else {
                    continue;
                };
                for chunk in body.chunks.iter_mut() {
                    let cy = chunk.index;
                    if chunk.state == ChunkState::LoadedData {
                        chunk.state = ChunkState::NeedsFill;
                    }
                    if chunk.vertex_count.is_some_and(|c| c > 0) {
                        self.visible.push(pos.chunk(cy));
                    }
                    let wants_mesh = chunk.state == ChunkState::NeedsFill
                        || (chunk.state == ChunkState::Built && chunk.pending_update);
                    if wants_mesh && !chunk.meshing {
                        candidates.push((distance, ChunkRef { group: key, cy }));
                    }
                }
            }
        }

        self.mesh_backlog = candidates.len();
        candidates.sort_by_key(|&(d, at)| (d, at.cy));
        for &(_, at) in candidates.iter().take(self.config.max_mesh_jobs_per_frame) {
            let Some(input) = self.mesh_input(at) else {
                continue;
            };
            if let Some(chunk) = self.groups.get_mut(at.group).and_then(|g| g.chunk_mut(at.cy)) {
                chunk.pending_update = false;
                chunk.meshing = true;
            }
            let job = WorldJob::BuildMesh {
                key: at.group,
                cy: at.cy,
                input: Box::new(input),
                collab: Arc::clone(&self.collab),
            };
            if let Err(QueueFull(job)) = self.scheduler.queue(job) {
                self.queue_full(job);
                break;
            }
        }
        debug_assert!(self.visible.len() <= self.grid.len() * WORLD_CHUNK_HEIGHT as usize);
    }
}
