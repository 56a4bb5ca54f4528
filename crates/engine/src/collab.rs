//! Contracts for the pieces the engine does not own: terrain generation,
//! persistence and mesh building.
//!
//! All three are called from worker threads, so implementations must be
//! `Send + Sync` and must not assume they run on the main thread.

use crate::mesh::{ChunkMesh, MeshInput};
use crate::world::group::GroupBody;
use crate::world::position::ColumnPos;

/// Fills a freshly reset group body with blocks.
///
/// Must be a pure function of `pos` and the generator's own configuration:
/// the same column always produces the same blocks.
pub trait TerrainGenerator: Send + Sync {
    fn generate(&self, pos: ColumnPos, body: &mut GroupBody);
}

/// Saved group data.
pub trait GroupStore: Send + Sync {
    /// Fill `body` with the saved blocks of `pos`. Returns `false` when there
    /// is no usable saved data; the body must then be left all air.
    fn load(&self, pos: ColumnPos, body: &mut GroupBody) -> bool;

    fn save(&self, pos: ColumnPos, body: &GroupBody);
}

/// Builds renderable geometry from a padded chunk snapshot.
pub trait MeshBuilder: Send + Sync {
    fn build(&self, input: &MeshInput) -> ChunkMesh;
}

/// Stores nothing; every column is generated.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl GroupStore for NullStore {
    fn load(&self, _pos: ColumnPos, _body: &mut GroupBody) -> bool {
        false
    }

    fn save(&self, _pos: ColumnPos, _body: &GroupBody) {}
}

/// The collaborators a world runs with. Shared with every job.
pub struct Collaborators {
    pub generator: Box<dyn TerrainGenerator>,
    pub store: Box<dyn GroupStore>,
    pub mesher: Box<dyn MeshBuilder>,
}

impl Collaborators {
    pub fn new(
        generator: impl TerrainGenerator + 'static,
        store: impl GroupStore + 'static,
        mesher: impl MeshBuilder + 'static,
    ) -> Self {
        Self {
            generator: Box::new(generator),
            store: Box::new(store),
            mesher: Box::new(mesher),
        }
    }
}
