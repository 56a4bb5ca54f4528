//! Block registry.
//!
//! Every block type is described once in a static table indexed by
//! [`BlockId`]. Lighting, meshing and collision only ever consult these
//! accessors, never block ids directly.

/// Light step value meaning "blocks light completely".
pub const OPAQUE_STEP: u8 = u8::MAX;

/// Block identifier: an index into the registry table.
///
/// Id 0 is air. Id 1 is the kill zone, returned for every position below the
/// world floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockId(pub u8);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const KILL_ZONE: BlockId = BlockId(1);
    pub const STONE: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const GRASS: BlockId = BlockId(4);
    pub const SAND: BlockId = BlockId(5);
    pub const WATER: BlockId = BlockId(6);
    pub const LEAVES: BlockId = BlockId(7);
    pub const GLASS: BlockId = BlockId(8);
    pub const LANTERN: BlockId = BlockId(9);
    pub const TORCH: BlockId = BlockId(10);
    pub const LOG: BlockId = BlockId(11);
    pub const BEDROCK: BlockId = BlockId(12);
    pub const SNOW: BlockId = BlockId(13);

    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Checked conversion for ids read from outside the process.
    pub fn from_raw(raw: u8) -> Option<Self> {
        ((raw as usize) < BLOCK_TYPES.len()).then_some(Self(raw))
    }

    /// Registry entry for this block. Panics on an unregistered id.
    #[inline]
    pub fn info(self) -> &'static BlockType {
        &BLOCK_TYPES[self.0 as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Light removed when light passes through this block.
    #[inline]
    pub fn light_step(self) -> u8 {
        self.info().light_step
    }

    #[inline]
    pub fn light_emitted(self) -> u8 {
        self.info().emission
    }

    #[inline]
    pub fn is_opaque(self) -> bool {
        self.info().light_step == OPAQUE_STEP
    }

    #[inline]
    pub fn is_passable(self) -> bool {
        self.info().passable
    }

    #[inline]
    pub fn is_fluid(self) -> bool {
        self.info().cull == CullClass::Fluid
    }

    #[inline]
    pub fn cull_class(self) -> CullClass {
        self.info().cull
    }

    #[inline]
    pub fn mesh_kind(self) -> MeshKind {
        self.info().mesh
    }

    #[inline]
    pub fn collision(self) -> Collision {
        self.info().collision
    }

    /// Every registered block, in id order.
    pub fn all() -> impl Iterator<Item = BlockId> {
        (0..BLOCK_TYPES.len()).map(|i| BlockId(i as u8))
    }
}

/// How a block's faces hide their neighbors' faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullClass {
    /// Hides every face against it.
    Opaque,
    /// Alpha-tested (leaves). Never hides faces.
    Cutout,
    /// Hides faces of the same block only (glass).
    Transparent,
    /// Hides other fluid faces.
    Fluid,
    /// Never drawn, never hides.
    Invisible,
}

/// Geometry produced for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshKind {
    None,
    Cube,
    /// Two crossed quads, both sides.
    Cross,
    Liquid,
}

/// How entities respond to touching a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    None,
    Solid,
    /// Slows movement, allows swimming.
    Liquid,
    /// Anything entering it is destroyed.
    Kill,
}

/// Static properties of a block type.
#[derive(Debug, Clone, Copy)]
pub struct BlockType {
    pub name: &'static str,
    pub light_step: u8,
    pub emission: u8,
    pub passable: bool,
    pub cull: CullClass,
    pub mesh: MeshKind,
    pub collision: Collision,
}

const fn solid(name: &'static str) -> BlockType {
    BlockType {
        name,
        light_step: OPAQUE_STEP,
        emission: 0,
        passable: false,
        cull: CullClass::Opaque,
        mesh: MeshKind::Cube,
        collision: Collision::Solid,
    }
}

static BLOCK_TYPES: [BlockType; 14] = [
    BlockType {
        name: "air",
        light_step: 1,
        emission: 0,
        passable: true,
        cull: CullClass::Invisible,
        mesh: MeshKind::None,
        collision: Collision::None,
    },
    BlockType {
        name: "kill_zone",
        light_step: OPAQUE_STEP,
        emission: 0,
        passable: false,
        cull: CullClass::Opaque,
        mesh: MeshKind::None,
        collision: Collision::Kill,
    },
    solid("stone"),
    solid("dirt"),
    solid("grass"),
    solid("sand"),
    BlockType {
        name: "water",
        light_step: 2,
        emission: 0,
        passable: true,
        cull: CullClass::Fluid,
        mesh: MeshKind::Liquid,
        collision: Collision::Liquid,
    },
    BlockType {
        name: "leaves",
        light_step: 2,
        emission: 0,
        passable: false,
        cull: CullClass::Cutout,
        mesh: MeshKind::Cube,
        collision: Collision::Solid,
    },
    BlockType {
        name: "glass",
        light_step: 1,
        emission: 0,
        passable: false,
        cull: CullClass::Transparent,
        mesh: MeshKind::Cube,
        collision: Collision::Solid,
    },
    BlockType {
        name: "lantern",
        light_step: 1,
        emission: 15,
        passable: false,
        cull: CullClass::Transparent,
        mesh: MeshKind::Cube,
        collision: Collision::Solid,
    },
    BlockType {
        name: "torch",
        light_step: 1,
        emission: 14,
        passable: true,
        cull: CullClass::Invisible,
        mesh: MeshKind::Cross,
        collision: Collision::None,
    },
    solid("log"),
    solid("bedrock"),
    solid("snow"),
];
