//! Chunk groups: the vertical stack of chunks sharing one column.

use slotmap::new_key_type;

use super::block::BlockId;
use super::chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, Chunk, LightChannel, WORLD_CHUNK_HEIGHT, WORLD_HEIGHT};
use super::position::{ColumnPos, RelPos};

new_key_type! {
    /// Generation-checked handle to a group in the world's arena.
    pub struct GroupKey;
}

/// Loading lifecycle of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum GroupState {
    #[default]
    Default,
    /// Blocks generated or loaded.
    Loaded,
    /// A preprocessing job is in flight.
    Preprocessing,
    /// Group-local light computed and stitched with neighbors.
    Preprocessed,
}

/// Block and light data of one column: the part of a group a worker job can
/// take ownership of.
#[derive(Clone)]
pub struct GroupBody {
    pub chunks: Vec<Chunk>,
    /// Per (x, z): topmost non-air y + 1, or 0 for an empty column.
    surface: Box<[i32]>,
}

const COLUMN_COUNT: usize = (CHUNK_SIZE_H * CHUNK_SIZE_H) as usize;

impl GroupBody {
    pub fn new() -> Self {
        Self {
            chunks: (0..WORLD_CHUNK_HEIGHT).map(Chunk::new).collect(),
            surface: vec![0; COLUMN_COUNT].into_boxed_slice(),
        }
    }

    #[inline]
    fn split(y: i32) -> (usize, i32) {
        ((y / CHUNK_SIZE_V) as usize, y % CHUNK_SIZE_V)
    }

    /// Block at group coordinates: x, z in `0..16`, y in `0..WORLD_HEIGHT`.
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        let (cy, ry) = Self::split(y);
        self.chunks[cy].get(RelPos::new(x, ry, z))
    }

    /// Write a block without touching the surface map.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockId) {
        let (cy, ry) = Self::split(y);
        self.chunks[cy].set(RelPos::new(x, ry, z), block);
    }

    #[inline]
    pub fn light(&self, channel: LightChannel, x: i32, y: i32, z: i32) -> u8 {
        let (cy, ry) = Self::split(y);
        self.chunks[cy].light(channel, RelPos::new(x, ry, z))
    }

    #[inline]
    pub fn set_light(&mut self, channel: LightChannel, x: i32, y: i32, z: i32, value: u8) {
        let (cy, ry) = Self::split(y);
        self.chunks[cy].set_light(channel, RelPos::new(x, ry, z), value);
    }

    #[inline]
    pub fn surface(&self, x: i32, z: i32) -> i32 {
        self.surface[(x + z * CHUNK_SIZE_H) as usize]
    }

    /// Highest surface in the group.
    pub fn max_surface(&self) -> i32 {
        self.surface.iter().copied().max().unwrap_or(0)
    }

    /// Rescan one column. Returns `(old, new)` surface heights.
    pub fn recompute_surface(&mut self, x: i32, z: i32) -> (i32, i32) {
        let new = (0..WORLD_HEIGHT)
            .rev()
            .find(|&y| self.get(x, y, z) != BlockId::AIR)
            .map_or(0, |y| y + 1);
        let slot = &mut self.surface[(x + z * CHUNK_SIZE_H) as usize];
        let old = *slot;
        *slot = new;
        (old, new)
    }

    pub fn recompute_surfaces(&mut self) {
        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                self.recompute_surface(x, z);
            }
        }
    }

    pub fn clear_light(&mut self) {
        for chunk in &mut self.chunks {
            chunk.clear_light();
        }
    }

    /// Back to all-air, no light, chunks in `Default` state.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.reset();
        }
        self.surface.fill(0);
    }
}

impl Default for GroupBody {
    fn default() -> Self {
        Self::new()
    }
}

/// One column of the loaded world.
pub struct ChunkGroup {
    /// Absolute column.
    pub pos: ColumnPos,
    /// Column relative to the world's anchor.
    pub local: (i32, i32),
    pub state: GroupState,
    /// In the active grid (as opposed to the recycling map or destroy queue).
    pub active: bool,
    pub pending_destroy: bool,
    /// A worker job owns this group's body.
    pub busy: bool,
    /// Edited since load.
    pub modified: bool,
    /// `None` while checked out by a job.
    pub body: Option<Box<GroupBody>>,
}

impl ChunkGroup {
    pub fn new(pos: ColumnPos, local: (i32, i32), body: Box<GroupBody>) -> Self {
        Self {
            pos,
            local,
            state: GroupState::Default,
            active: true,
            pending_destroy: false,
            busy: false,
            modified: false,
            body: Some(body),
        }
    }

    pub fn chunk(&self, cy: i32) -> Option<&Chunk> {
        self.body.as_deref().and_then(|b| b.chunks.get(cy as usize))
    }

    pub fn chunk_mut(&mut self, cy: i32) -> Option<&mut Chunk> {
        self.body.as_deref_mut().and_then(|b| b.chunks.get_mut(cy as usize))
    }
}

/// Free list of group bodies, so streaming does not reallocate chunk arrays.
#[derive(Default)]
pub struct GroupPool {
    free: Vec<Box<GroupBody>>,
    allocated: usize,
}

impl GroupPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a clean body, allocating when the free list is empty.
    pub fn acquire(&mut self) -> Box<GroupBody> {
        match self.free.pop() {
            Some(body) => body,
            None => {
                self.allocated += 1;
                Box::new(GroupBody::new())
            }
        }
    }

    pub fn release(&mut self, mut body: Box<GroupBody>) {
        body.reset();
        self.free.push(body);
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Bodies ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_tracks_topmost_block() {
        let mut body = GroupBody::new();
        assert_eq!(body.recompute_surface(3, 4), (0, 0));
        body.set(3, 40, 4, BlockId::STONE);
        body.set(3, 10, 4, BlockId::STONE);
        assert_eq!(body.recompute_surface(3, 4), (0, 41));
        body.set(3, 40, 4, BlockId::AIR);
        assert_eq!(body.recompute_surface(3, 4), (41, 11));
        assert_eq!(body.max_surface(), 11);
    }

    #[test]
    fn pool_reuses_released_bodies() {
        let mut pool = GroupPool::new();
        let mut body = pool.acquire();
        body.set(0, 0, 0, BlockId::DIRT);
        body.recompute_surfaces();
        pool.release(body);
        assert_eq!(pool.free_count(), 1);
        let body = pool.acquire();
        assert_eq!(pool.allocated(), 1);
        assert_eq!(body.get(0, 0, 0), BlockId::AIR);
        assert_eq!(body.surface(0, 0), 0);
        for (cy, chunk) in body.chunks.iter().enumerate() {
            assert_eq!(chunk.index, cy as i32);
        }
    }
}
