//! Block edits.

use super::block::BlockId;
use super::chunk::{ChunkState, WORLD_CHUNK_HEIGHT};
use super::lighting::WorldLight;
use super::position::{LocalPos, y_in_world};
use super::{Aabb, ChunkRef, Rebased, World};
use crate::light;
use crate::mesh::{Face, vertices_for};

/// Result of [`World::set_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// The block would have pushed a chunk past its vertex budget; air was
    /// placed instead.
    RevertedToAir,
    /// Below the floor, above the ceiling or outside the loaded window.
    OutOfBounds,
    /// A solid block would intersect the player.
    PlayerOverlap,
    /// The chunk has no mesh yet.
    ChunkNotReady,
    /// Even air would exceed the budget. Nothing changed.
    BudgetExceeded,
}

impl EditOutcome {
    pub fn changed_world(self) -> bool {
        matches!(self, EditOutcome::Applied | EditOutcome::RevertedToAir)
    }
}

/// Vertex count change of one chunk.
struct VertexDelta {
    at: ChunkRef,
    delta: i64,
}

impl World {
    /// Place `block` at a local-world position.
    ///
    /// Only chunks that already have a mesh can be edited. On success the
    /// column surface and both light channels are repaired, the 3x3x3 chunk
    /// neighborhood is marked for remeshing and the group is marked modified.
    pub fn set_block(&mut self, pos: LocalPos, block: BlockId) -> EditOutcome {
        if !y_in_world(pos.y) {
            return EditOutcome::OutOfBounds;
        }
        let Rebased::Chunk { at, .. } = self.locate(pos) else {
            return EditOutcome::OutOfBounds;
        };
        if !block.is_passable() && self.overlaps_player(pos) {
            return EditOutcome::PlayerOverlap;
        }
        match self.chunk(at) {
            Some(chunk) if chunk.state >= ChunkState::NeedsFill && chunk.vertex_count.is_some() => {}
            _ => return EditOutcome::ChunkNotReady,
        }

        let old = self.get_block(pos);
        if old == block {
            return EditOutcome::Applied;
        }

        let (placed, deltas) = match self.budget_deltas(pos, block) {
            Some(deltas) => (block, deltas),
            None if block != BlockId::AIR => match self.budget_deltas(pos, BlockId::AIR) {
                Some(deltas) => (BlockId::AIR, deltas),
                None => return EditOutcome::BudgetExceeded,
            },
            None => return EditOutcome::BudgetExceeded,
        };
        let outcome = if placed == block {
            EditOutcome::Applied
        } else {
            tracing::debug!("edit at {:?} over vertex budget, placed air", pos);
            EditOutcome::RevertedToAir
        };
        if placed == old {
            return outcome;
        }

        for d in &deltas {
            if let Some(chunk) = self.groups.get_mut(d.at.group).and_then(|g| g.chunk_mut(d.at.cy)) {
                if let Some(count) = chunk.vertex_count.as_mut() {
                    *count = (*count as i64 + d.delta).max(0) as u32;
                }
            }
        }

        let rel = pos.relative();
        if let Some(group) = self.groups.get_mut(at.group) {
            group.modified = true;
            if let Some(chunk) = group.chunk_mut(at.cy) {
                chunk.set(rel, placed);
            }
        }

        let mut field = WorldLight::new(&mut self.groups, &self.grid, self.anchor);
        light::relight_edit(&mut field, pos, old, placed, &mut self.queues);

        self.mark_neighborhood(pos);
        if let Some(chunk) = self.groups.get_mut(at.group).and_then(|g| g.chunk_mut(at.cy)) {
            chunk.state = ChunkState::NeedsFill;
        }
        outcome
    }

    pub fn overlaps_player(&self, pos: LocalPos) -> bool {
        let Some(player) = self.player else {
            return false;
        };
        let w = self.anchor.to_world(pos);
        let cell = Aabb::new(
            [w.x as f64, w.y as f64, w.z as f64],
            [w.x as f64 + 1.0, w.y as f64 + 1.0, w.z as f64 + 1.0],
        );
        player.intersects(&cell)
    }

    /// Per-chunk vertex changes of replacing the block at `pos` with `block`,
    /// or `None` if a chunk with a known count would exceed the budget.
    fn budget_deltas(&self, pos: LocalPos, block: BlockId) -> Option<Vec<VertexDelta>> {
        let mut deltas: Vec<VertexDelta> = Vec::with_capacity(4);
        let cells = std::iter::once(pos).chain(pos.neighbors());
        for cell in cells {
            let Rebased::Chunk { at, .. } = self.locate(cell) else {
                continue;
            };
            let before = self.vertices_at(cell, pos, None);
            let after = self.vertices_at(cell, pos, Some(block));
            let delta = after as i64 - before as i64;
            if delta == 0 {
                continue;
            }
            match deltas.iter_mut().find(|d| d.at == at) {
                Some(d) => d.delta += delta,
                None => deltas.push(VertexDelta { at, delta }),
            }
        }

        let max = self.config.max_chunk_vertices as i64;
        for d in &deltas {
            let known = self.chunk(d.at).and_then(|c| c.vertex_count);
            if let Some(count) = known {
                if d.delta > 0 && count as i64 + d.delta > max {
                    return None;
                }
            }
        }
        Some(deltas)
    }

    /// Vertices `cell` contributes, optionally with `edit` replaced.
    fn vertices_at(&self, cell: LocalPos, edit: LocalPos, replacement: Option<BlockId>) -> u32 {
        let read = |p: LocalPos| match replacement {
            Some(b) if p == edit => b,
            _ => self.get_block(p),
        };
        let neighbors = Face::ALL.map(|f| {
            let [dx, dy, dz] = f.offset();
            read(cell.offset(dx, dy, dz))
        });
        vertices_for(read(cell), neighbors)
    }

    /// Flag every meshed chunk in the 3x3x3 neighborhood of `pos`.
    fn mark_neighborhood(&mut self, pos: LocalPos) {
        let lc = pos.local_chunk();
        for dz in -1..=1 {
            for dx in -1..=1 {
                let Some(key) = self.group_key_at(lc.x + dx, lc.z + dz) else {
                    continue;
                };
                let Some(group) = self.groups.get_mut(key) else {
                    continue;
                };
                for dy in -1..=1 {
                    let cy = lc.y + dy;
                    if !(0..WORLD_CHUNK_HEIGHT).contains(&cy) {
                        continue;
                    }
                    if let Some(chunk) = group.chunk_mut(cy) {
                        if chunk.state >= ChunkState::NeedsFill {
                            chunk.pending_update = true;
                        }
                    }
                }
            }
        }
    }
}
