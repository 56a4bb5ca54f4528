//! Coordinate spaces.
//!
//! Absolute positions can be arbitrarily far from the origin, so everything
//! the world stores internally is expressed relative to an [`Anchor`]: the
//! loaded window's lowest corner column. All of these conversions are pure.

use super::chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, WORLD_CHUNK_HEIGHT};

const SHIFT_H: u32 = CHUNK_SIZE_H.trailing_zeros();
const SHIFT_V: u32 = CHUNK_SIZE_V.trailing_zeros();
const MASK_H: i32 = CHUNK_SIZE_H - 1;
const MASK_V: i32 = CHUNK_SIZE_V - 1;

/// Number of chunk columns along each side of a region file.
pub const REGION_SIZE: i32 = 32;

/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldPos {
    pub x: i64,
    pub y: i32,
    pub z: i64,
}

impl WorldPos {
    pub const fn new(x: i64, y: i32, z: i64) -> Self {
        Self { x, y, z }
    }

    /// Floor of a floating point position.
    pub fn from_f64(pos: [f64; 3]) -> Self {
        Self::new(pos[0].floor() as i64, pos[1].floor() as i32, pos[2].floor() as i64)
    }

    /// Whether x and z lie within the reach of `i32` chunk coordinates,
    /// 2^35 blocks either side of the origin.
    pub const fn in_chunk_range(&self) -> bool {
        let (x, z) = (self.x >> SHIFT_H, self.z >> SHIFT_H);
        x >= i32::MIN as i64 && x <= i32::MAX as i64 && z >= i32::MIN as i64 && z <= i32::MAX as i64
    }

    /// The chunk containing this block (floor division). Only meaningful
    /// inside [`WorldPos::in_chunk_range`].
    pub const fn chunk(&self) -> ChunkPos {
        debug_assert!(self.in_chunk_range());
        ChunkPos {
            x: (self.x >> SHIFT_H) as i32,
            y: self.y >> SHIFT_V,
            z: (self.z >> SHIFT_H) as i32,
        }
    }

    /// The chunk column containing this block. Only meaningful inside
    /// [`WorldPos::in_chunk_range`].
    pub const fn column(&self) -> ColumnPos {
        debug_assert!(self.in_chunk_range());
        ColumnPos {
            x: (self.x >> SHIFT_H) as i32,
            z: (self.z >> SHIFT_H) as i32,
        }
    }
}

/// Block position relative to the world's anchor. Kept small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LocalPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The local chunk containing this block.
    #[inline]
    pub const fn local_chunk(&self) -> LocalChunkPos {
        LocalChunkPos {
            x: self.x >> SHIFT_H,
            y: self.y >> SHIFT_V,
            z: self.z >> SHIFT_H,
        }
    }

    /// Position inside the containing chunk.
    #[inline]
    pub const fn relative(&self) -> RelPos {
        RelPos {
            x: self.x & MASK_H,
            y: self.y & MASK_V,
            z: self.z & MASK_H,
        }
    }

    /// Inverse of (`local_chunk`, `relative`).
    #[inline]
    pub const fn from_parts(chunk: LocalChunkPos, rel: RelPos) -> Self {
        let origin = chunk.origin();
        Self::new(origin.x + rel.x, origin.y + rel.y, origin.z + rel.z)
    }

    #[inline]
    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The six face neighbors.
    #[inline]
    pub const fn neighbors(&self) -> [LocalPos; 6] {
        [
            self.offset(1, 0, 0),
            self.offset(-1, 0, 0),
            self.offset(0, 1, 0),
            self.offset(0, -1, 0),
            self.offset(0, 0, 1),
            self.offset(0, 0, -1),
        ]
    }
}

/// Absolute chunk position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn column(&self) -> ColumnPos {
        ColumnPos::new(self.x, self.z)
    }

    pub const fn region(&self) -> RegionPos {
        self.column().region()
    }
}

/// Chunk position relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LocalChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Local-world position of this chunk's lowest corner.
    pub const fn origin(&self) -> LocalPos {
        LocalPos::new(self.x * CHUNK_SIZE_H, self.y * CHUNK_SIZE_V, self.z * CHUNK_SIZE_H)
    }
}

/// Position inside a chunk: x, z in `0..CHUNK_SIZE_H`, y in `0..CHUNK_SIZE_V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RelPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn in_bounds(&self) -> bool {
        self.x >= 0
            && self.x < CHUNK_SIZE_H
            && self.y >= 0
            && self.y < CHUNK_SIZE_V
            && self.z >= 0
            && self.z < CHUNK_SIZE_H
    }
}

/// Absolute chunk column. This is the identity of a chunk group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnPos {
    pub x: i32,
    pub z: i32,
}

impl ColumnPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// Region file holding this column (floored, so negatives work).
    pub const fn region(&self) -> RegionPos {
        RegionPos {
            x: self.x.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }

    /// Slot of this column inside its region, each in `0..REGION_SIZE`.
    pub const fn region_slot(&self) -> (u8, u8) {
        (
            self.x.rem_euclid(REGION_SIZE) as u8,
            self.z.rem_euclid(REGION_SIZE) as u8,
        )
    }

    /// Absolute chunk position of the chunk at `cy` in this column.
    pub const fn chunk(&self, cy: i32) -> ChunkPos {
        ChunkPos::new(self.x, cy, self.z)
    }

    /// World position of this column's lowest corner.
    pub const fn block_origin(&self) -> WorldPos {
        WorldPos::new(
            (self.x as i64) << SHIFT_H,
            0,
            (self.z as i64) << SHIFT_H,
        )
    }
}

/// Region file coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

/// Ties local space to absolute space.
///
/// The loaded window is the square of `2 * load_range + 1` columns centered on
/// `center`; local column `(0, 0)` is its lowest corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub center: ColumnPos,
    pub load_range: i32,
}

impl Anchor {
    pub const fn new(center: ColumnPos, load_range: i32) -> Self {
        Self { center, load_range }
    }

    /// Columns along one side of the loaded window.
    pub const fn size(&self) -> i32 {
        2 * self.load_range + 1
    }

    /// Absolute column of local column `(0, 0)`.
    pub const fn origin(&self) -> ColumnPos {
        self.center.offset(-self.load_range, -self.load_range)
    }

    pub const fn to_local(&self, pos: WorldPos) -> LocalPos {
        let origin = self.origin().block_origin();
        LocalPos::new((pos.x - origin.x) as i32, pos.y, (pos.z - origin.z) as i32)
    }

    pub const fn to_world(&self, pos: LocalPos) -> WorldPos {
        let origin = self.origin().block_origin();
        WorldPos::new(origin.x + pos.x as i64, pos.y, origin.z + pos.z as i64)
    }

    /// Floating point variant of [`Anchor::to_local`].
    pub fn to_local_f64(&self, pos: [f64; 3]) -> [f64; 3] {
        let origin = self.origin().block_origin();
        [pos[0] - origin.x as f64, pos[1], pos[2] - origin.z as f64]
    }

    /// Local column of an absolute column (may be outside the window).
    pub const fn column_to_local(&self, column: ColumnPos) -> (i32, i32) {
        let origin = self.origin();
        (column.x - origin.x, column.z - origin.z)
    }

    pub const fn local_to_column(&self, lcx: i32, lcz: i32) -> ColumnPos {
        self.origin().offset(lcx, lcz)
    }

    pub const fn contains_local(&self, lcx: i32, lcz: i32) -> bool {
        lcx >= 0 && lcz >= 0 && lcx < self.size() && lcz < self.size()
    }

    /// Whether a local column lies on the outermost ring of the window.
    pub const fn is_edge(&self, lcx: i32, lcz: i32) -> bool {
        lcx == 0 || lcz == 0 || lcx == self.size() - 1 || lcz == self.size() - 1
    }

    pub const fn index(&self, lcx: i32, lcz: i32) -> usize {
        (lcx + lcz * self.size()) as usize
    }

    /// Local-world rectangle (min x, min z, max x, max z) the player may roam
    /// without triggering a shift.
    pub fn in_bounds_rect(&self, margin: f64) -> [f64; 4] {
        let lo = (self.load_range * CHUNK_SIZE_H) as f64 - margin;
        let hi = ((self.load_range + 1) * CHUNK_SIZE_H) as f64 + margin;
        [lo, lo, hi, hi]
    }
}

/// Whether a local-world y lies inside the world's vertical extent.
pub const fn y_in_world(y: i32) -> bool {
    y >= 0 && y < CHUNK_SIZE_V * WORLD_CHUNK_HEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_chunk_and_relative_recompose() {
        for x in -70..70 {
            for y in [-33, -1, 0, 5, 31, 32, 127, 200] {
                let p = LocalPos::new(x, y, -x * 3 + 7);
                let lc = p.local_chunk();
                let rel = p.relative();
                assert!(rel.in_bounds(), "{p:?} -> {rel:?}");
                assert_eq!(LocalPos::from_parts(lc, rel), p);
                assert_eq!(lc.x * CHUNK_SIZE_H + rel.x, p.x);
                assert_eq!(lc.y * CHUNK_SIZE_V + rel.y, p.y);
                assert_eq!(lc.z * CHUNK_SIZE_H + rel.z, p.z);
            }
        }
    }

    #[test]
    fn region_uses_floor_division() {
        assert_eq!(ColumnPos::new(0, 0).region(), RegionPos { x: 0, z: 0 });
        assert_eq!(ColumnPos::new(31, 31).region(), RegionPos { x: 0, z: 0 });
        assert_eq!(ColumnPos::new(32, -1).region(), RegionPos { x: 1, z: -1 });
        assert_eq!(ColumnPos::new(-32, -33).region(), RegionPos { x: -1, z: -2 });
        assert_eq!(ColumnPos::new(-1, -33).region_slot(), (31, 31));
    }

    #[test]
    fn world_chunk_floors_negative_positions() {
        let p = WorldPos::new(-1, -1, -17);
        assert_eq!(p.chunk(), ChunkPos::new(-1, -1, -2));
        assert_eq!(p.column(), ColumnPos::new(-1, -2));
    }

    #[test]
    fn chunk_range_reaches_the_i32_limits() {
        let far = WorldPos::new(((i32::MAX as i64) << 4) + 15, 0, (i32::MIN as i64) << 4);
        assert!(far.in_chunk_range());
        assert_eq!(far.column(), ColumnPos::new(i32::MAX, i32::MIN));
        assert_eq!(far.column().block_origin().z, far.z);

        assert!(!WorldPos::new((i32::MAX as i64 + 1) << 4, 0, 0).in_chunk_range());
        assert!(!WorldPos::new(0, 0, ((i32::MIN as i64) << 4) - 1).in_chunk_range());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn column_beyond_chunk_range_is_caught() {
        let _ = WorldPos::new(1 << 40, 0, 0).column();
    }

    #[test]
    fn anchor_round_trips_world_positions() {
        let anchor = Anchor::new(ColumnPos::new(-1_000_000, 42), 3);
        let p = WorldPos::new(-16_000_123, 77, 700);
        let local = anchor.to_local(p);
        assert_eq!(anchor.to_world(local), p);
        let lc = local.local_chunk();
        assert_eq!(anchor.local_to_column(lc.x, lc.z), p.column());
    }

    #[test]
    fn edge_ring() {
        let anchor = Anchor::new(ColumnPos::new(0, 0), 2);
        assert_eq!(anchor.size(), 5);
        assert!(anchor.is_edge(0, 2));
        assert!(anchor.is_edge(4, 4));
        assert!(!anchor.is_edge(1, 3));
        assert!(!anchor.contains_local(5, 0));
    }
}
