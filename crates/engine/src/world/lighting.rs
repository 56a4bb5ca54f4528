//! The live world as a [`LightField`], plus boundary stitching.

use slotmap::SlotMap;

use super::block::BlockId;
use super::chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, ChunkState, LightChannel, WORLD_HEIGHT};
use super::group::{ChunkGroup, GroupBody, GroupKey, GroupState};
use super::position::{Anchor, LocalPos};
use crate::light::{LightField, LightQueues, MAX_LIGHT, scatter};

const MASK_H: i32 = CHUNK_SIZE_H - 1;

/// Main-thread light view over the active window. Only preprocessed groups
/// with an attached body are part of the field.
pub(crate) struct WorldLight<'a> {
    groups: &'a mut SlotMap<GroupKey, ChunkGroup>,
    grid: &'a [Option<GroupKey>],
    anchor: Anchor,
}

impl<'a> WorldLight<'a> {
    pub fn new(groups: &'a mut SlotMap<GroupKey, ChunkGroup>, grid: &'a [Option<GroupKey>], anchor: Anchor) -> Self {
        Self { groups, grid, anchor }
    }

    fn key_of(&self, pos: LocalPos) -> Option<GroupKey> {
        if pos.y < 0 || pos.y >= WORLD_HEIGHT {
            return None;
        }
        let lc = pos.local_chunk();
        if !self.anchor.contains_local(lc.x, lc.z) {
            return None;
        }
        self.grid[self.anchor.index(lc.x, lc.z)]
    }

    fn body(&self, pos: LocalPos) -> Option<&GroupBody> {
        let group = self.groups.get(self.key_of(pos)?)?;
        if group.state != GroupState::Preprocessed {
            return None;
        }
        group.body.as_deref()
    }

    fn body_mut(&mut self, pos: LocalPos) -> Option<&mut GroupBody> {
        let key = self.key_of(pos)?;
        let group = self.groups.get_mut(key)?;
        if group.state != GroupState::Preprocessed {
            return None;
        }
        group.body.as_deref_mut()
    }
}

impl LightField for WorldLight<'_> {
    fn block(&self, pos: LocalPos) -> Option<BlockId> {
        self.body(pos).map(|b| b.get(pos.x & MASK_H, pos.y, pos.z & MASK_H))
    }

    fn stored(&self, channel: LightChannel, pos: LocalPos) -> u8 {
        self.body(pos)
            .map_or(crate::light::MIN_LIGHT, |b| b.light(channel, pos.x & MASK_H, pos.y, pos.z & MASK_H))
    }

    fn store(&mut self, channel: LightChannel, pos: LocalPos, value: u8) {
        let Some(body) = self.body_mut(pos) else {
            return;
        };
        body.set_light(channel, pos.x & MASK_H, pos.y, pos.z & MASK_H, value);
        let chunk = &mut body.chunks[(pos.y / CHUNK_SIZE_V) as usize];
        if chunk.state >= ChunkState::NeedsFill {
            chunk.pending_update = true;
        }
    }

    fn surface(&self, pos: LocalPos) -> i32 {
        self.body(pos).map_or(0, |b| b.surface(pos.x & MASK_H, pos.z & MASK_H))
    }

    fn recompute_surface(&mut self, pos: LocalPos) -> (i32, i32) {
        match self.body_mut(pos) {
            Some(body) => body.recompute_surface(pos.x & MASK_H, pos.z & MASK_H),
            None => (0, 0),
        }
    }
}

/// Let light cross every edge between the group at `(lcx, lcz)` and its
/// preprocessed neighbors. Both sides of each edge are rescattered, so light
/// flows in whichever direction it is brighter.
pub(crate) fn stitch(field: &mut WorldLight<'_>, lcx: i32, lcz: i32, queues: &mut LightQueues) -> usize {
    let Some(own_top) = top_of(field, lcx, lcz) else {
        return 0;
    };
    let base_x = lcx * CHUNK_SIZE_H;
    let base_z = lcz * CHUNK_SIZE_H;
    let mut edges = 0;

    for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
        let Some(their_top) = top_of(field, lcx + dx, lcz + dz) else {
            continue;
        };
        edges += 1;
        // Block light can climb MAX_LIGHT cells above the tallest surface.
        let height = (own_top.max(their_top) + MAX_LIGHT as i32).min(WORLD_HEIGHT);

        for channel in [LightChannel::Sun, LightChannel::Block] {
            for i in 0..CHUNK_SIZE_H {
                let (inside, outside) = match (dx, dz) {
                    (1, 0) => ((base_x + MASK_H, base_z + i), (base_x + CHUNK_SIZE_H, base_z + i)),
                    (-1, 0) => ((base_x, base_z + i), (base_x - 1, base_z + i)),
                    (0, 1) => ((base_x + i, base_z + MASK_H), (base_x + i, base_z + CHUNK_SIZE_H)),
                    _ => ((base_x + i, base_z), (base_x + i, base_z - 1)),
                };
                for y in 0..height {
                    queues.scatter.push_back(LocalPos::new(inside.0, y, inside.1));
                    queues.scatter.push_back(LocalPos::new(outside.0, y, outside.1));
                }
            }
            scatter(field, channel, &mut queues.scatter);
        }
    }
    edges
}

/// Highest surface of a preprocessed group, or `None` if the column is not
/// part of the field.
fn top_of(field: &WorldLight<'_>, lcx: i32, lcz: i32) -> Option<i32> {
    let corner = LocalPos::new(lcx * CHUNK_SIZE_H, 0, lcz * CHUNK_SIZE_H);
    field.body(corner).map(GroupBody::max_surface)
}
