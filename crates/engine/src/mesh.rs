//! Mesh inputs and face rules shared by the engine and mesh builders.
//!
//! Meshing runs on workers against a [`MeshInput`]: a copy of one chunk plus
//! a one-block border taken from its neighbors. The engine itself only needs
//! vertex counts (for the per-chunk budget); the geometry belongs to whatever
//! [`crate::collab::MeshBuilder`] the host plugs in.

use crate::world::block::{BlockId, CullClass, MeshKind};
use crate::world::chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, LightChannel};
use crate::world::position::{ChunkPos, ColumnPos};

/// Padded width along x and z.
pub const PADDED_H: i32 = CHUNK_SIZE_H + 2;
/// Padded height.
pub const PADDED_V: i32 = CHUNK_SIZE_V + 2;
const PADDED_VOLUME: usize = (PADDED_H * PADDED_V * PADDED_H) as usize;

/// Vertices per drawn quad.
pub const QUAD_VERTICES: u32 = 4;
/// Vertices of a cross (two quads).
pub const CROSS_VERTICES: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    /// Same order as [`crate::world::position::LocalPos::neighbors`].
    pub const ALL: [Face; 6] = [Face::PosX, Face::NegX, Face::PosY, Face::NegY, Face::PosZ, Face::NegZ];

    pub const fn offset(self) -> [i32; 3] {
        match self {
            Face::PosX => [1, 0, 0],
            Face::NegX => [-1, 0, 0],
            Face::PosY => [0, 1, 0],
            Face::NegY => [0, -1, 0],
            Face::PosZ => [0, 0, 1],
            Face::NegZ => [0, 0, -1],
        }
    }
}

/// Whether `block`'s face toward `neighbor` is drawn.
pub fn face_visible(block: BlockId, neighbor: BlockId) -> bool {
    match neighbor.cull_class() {
        CullClass::Opaque => false,
        CullClass::Transparent => neighbor != block,
        CullClass::Fluid => !block.is_fluid(),
        CullClass::Cutout | CullClass::Invisible => true,
    }
}

/// Vertices emitted for `block` given its six neighbors in [`Face::ALL`]
/// order.
pub fn vertices_for(block: BlockId, neighbors: [BlockId; 6]) -> u32 {
    match block.mesh_kind() {
        MeshKind::None => 0,
        MeshKind::Cross => CROSS_VERTICES,
        MeshKind::Cube | MeshKind::Liquid => {
            neighbors.iter().filter(|&&n| face_visible(block, n)).count() as u32 * QUAD_VERTICES
        }
    }
}

/// Snapshot of a chunk and a one-block border, in chunk-relative
/// coordinates `-1..=16` / `-1..=32`.
#[derive(Clone)]
pub struct MeshInput {
    pub chunk: ChunkPos,
    blocks: Box<[BlockId]>,
    sun: Box<[u8]>,
    torch: Box<[u8]>,
}

impl MeshInput {
    pub fn new(chunk: ChunkPos) -> Self {
        Self {
            chunk,
            blocks: vec![BlockId::AIR; PADDED_VOLUME].into_boxed_slice(),
            sun: vec![crate::light::MAX_LIGHT; PADDED_VOLUME].into_boxed_slice(),
            torch: vec![crate::light::MIN_LIGHT; PADDED_VOLUME].into_boxed_slice(),
        }
    }

    #[inline]
    fn slot(x: i32, y: i32, z: i32) -> usize {
        debug_assert!((-1..=CHUNK_SIZE_H).contains(&x));
        debug_assert!((-1..=CHUNK_SIZE_V).contains(&y));
        debug_assert!((-1..=CHUNK_SIZE_H).contains(&z));
        ((x + 1) + PADDED_H * ((y + 1) + PADDED_V * (z + 1))) as usize
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        self.blocks[Self::slot(x, y, z)]
    }

    #[inline]
    pub fn light(&self, channel: LightChannel, x: i32, y: i32, z: i32) -> u8 {
        match channel {
            LightChannel::Sun => self.sun[Self::slot(x, y, z)],
            LightChannel::Block => self.torch[Self::slot(x, y, z)],
        }
    }

    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockId, sun: u8, torch: u8) {
        let slot = Self::slot(x, y, z);
        self.blocks[slot] = block;
        self.sun[slot] = sun;
        self.torch[slot] = torch;
    }

    pub fn neighbors(&self, x: i32, y: i32, z: i32) -> [BlockId; 6] {
        Face::ALL.map(|f| {
            let [dx, dy, dz] = f.offset();
            self.get(x + dx, y + dy, z + dz)
        })
    }

    /// Vertices a full build of this input emits.
    pub fn count_vertices(&self) -> u32 {
        let mut total = 0;
        for z in 0..CHUNK_SIZE_H {
            for y in 0..CHUNK_SIZE_V {
                for x in 0..CHUNK_SIZE_H {
                    total += vertices_for(self.get(x, y, z), self.neighbors(x, y, z));
                }
            }
        }
        total
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    /// Chunk-relative position.
    pub position: [f32; 3],
    pub face: u8,
    pub block: BlockId,
    /// `[sun, block]` light sampled next to the face.
    pub light: [u8; 2],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Mesh changes for the renderer, drained with
/// [`crate::world::World::take_mesh_updates`].
#[derive(Debug)]
pub enum MeshUpdate {
    Built { chunk: ChunkPos, mesh: ChunkMesh },
    /// Every chunk of the column was unloaded.
    Freed { column: ColumnPos },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lone_cube_has_six_faces() {
        assert_eq!(vertices_for(BlockId::STONE, [BlockId::AIR; 6]), 24);
        assert_eq!(vertices_for(BlockId::STONE, [BlockId::STONE; 6]), 0);
        assert_eq!(vertices_for(BlockId::AIR, [BlockId::AIR; 6]), 0);
        assert_eq!(vertices_for(BlockId::TORCH, [BlockId::STONE; 6]), 8);
    }

    #[test]
    fn glass_and_water_hide_their_own_kind() {
        assert!(!face_visible(BlockId::GLASS, BlockId::GLASS));
        assert!(face_visible(BlockId::STONE, BlockId::GLASS));
        assert!(!face_visible(BlockId::WATER, BlockId::WATER));
        assert!(face_visible(BlockId::STONE, BlockId::WATER));
        assert!(face_visible(BlockId::STONE, BlockId::LEAVES));
    }

    #[test]
    fn count_matches_single_block() {
        let mut input = MeshInput::new(ChunkPos::new(0, 0, 0));
        input.set(5, 5, 5, BlockId::STONE, 15, 1);
        input.set(5, 6, 5, BlockId::STONE, 15, 1);
        assert_eq!(input.count_vertices(), 40);
    }
}
