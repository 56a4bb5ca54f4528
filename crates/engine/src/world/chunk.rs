use super::block::BlockId;
use super::position::RelPos;
use crate::light::MIN_LIGHT;

/// Blocks along x and z of a chunk.
pub const CHUNK_SIZE_H: i32 = 16;
/// Blocks along y of a chunk.
pub const CHUNK_SIZE_V: i32 = 32;
/// Chunks stacked in one group.
pub const WORLD_CHUNK_HEIGHT: i32 = 4;
/// Height of the world in blocks.
pub const WORLD_HEIGHT: i32 = CHUNK_SIZE_V * WORLD_CHUNK_HEIGHT;
/// Total block count in one chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE_H * CHUNK_SIZE_V * CHUNK_SIZE_H) as usize;

/// Mesh lifecycle of a chunk. Ordered: later states imply earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ChunkState {
    /// No block data yet.
    #[default]
    Default,
    /// Blocks present, light may still be settling.
    LoadedData,
    /// Ready for a (re)build of its mesh.
    NeedsFill,
    /// Mesh built and current.
    Built,
}

/// Which of the two light arrays an operation works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightChannel {
    Sun,
    Block,
}

/// A 16x32x16 box of blocks with its two light arrays.
///
/// Stored as flat arrays indexed `x + H * (y + V * z)`.
#[derive(Clone)]
pub struct Chunk {
    blocks: Box<[BlockId; CHUNK_VOLUME]>,
    sun: Box<[u8; CHUNK_VOLUME]>,
    torch: Box<[u8; CHUNK_VOLUME]>,
    pub state: ChunkState,
    /// Set when the chunk's mesh no longer reflects its contents.
    pub pending_update: bool,
    /// Vertex count of the current mesh, tracked across edits. `None` until the
    /// first mesh is built.
    pub vertex_count: Option<u32>,
    /// A mesh job for this chunk is in flight.
    pub meshing: bool,
    /// Position of this chunk within its group (0 is the bottom).
    pub index: i32,
}

impl Chunk {
    pub fn new(index: i32) -> Self {
        Self {
            blocks: Box::new([BlockId::AIR; CHUNK_VOLUME]),
            sun: Box::new([MIN_LIGHT; CHUNK_VOLUME]),
            torch: Box::new([MIN_LIGHT; CHUNK_VOLUME]),
            state: ChunkState::Default,
            pending_update: false,
            vertex_count: None,
            meshing: false,
            index,
        }
    }

    #[inline]
    pub const fn index_of(x: i32, y: i32, z: i32) -> usize {
        (x + CHUNK_SIZE_H * (y + CHUNK_SIZE_V * z)) as usize
    }

    #[inline]
    fn slot(rel: RelPos) -> usize {
        debug_assert!(rel.in_bounds(), "{rel:?} outside chunk");
        Self::index_of(rel.x, rel.y, rel.z)
    }

    #[inline]
    pub fn get(&self, rel: RelPos) -> BlockId {
        self.blocks[Self::slot(rel)]
    }

    #[inline]
    pub fn set(&mut self, rel: RelPos, block: BlockId) {
        self.blocks[Self::slot(rel)] = block;
    }

    #[inline]
    pub fn light(&self, channel: LightChannel, rel: RelPos) -> u8 {
        match channel {
            LightChannel::Sun => self.sun[Self::slot(rel)],
            LightChannel::Block => self.torch[Self::slot(rel)],
        }
    }

    #[inline]
    pub fn set_light(&mut self, channel: LightChannel, rel: RelPos, value: u8) {
        debug_assert!((MIN_LIGHT..=crate::light::MAX_LIGHT).contains(&value));
        let slot = Self::slot(rel);
        match channel {
            LightChannel::Sun => self.sun[slot] = value,
            LightChannel::Block => self.torch[slot] = value,
        }
    }

    pub fn blocks(&self) -> &[BlockId; CHUNK_VOLUME] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [BlockId; CHUNK_VOLUME] {
        &mut self.blocks
    }

    /// Reset both light arrays to darkness.
    pub fn clear_light(&mut self) {
        self.sun.fill(MIN_LIGHT);
        self.torch.fill(MIN_LIGHT);
    }

    /// Return the chunk to its freshly-allocated state, keeping the buffers.
    pub fn reset(&mut self) {
        self.blocks.fill(BlockId::AIR);
        self.clear_light();
        self.state = ChunkState::Default;
        self.pending_update = false;
        self.vertex_count = None;
        self.meshing = false;
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == BlockId::AIR)
    }
}
