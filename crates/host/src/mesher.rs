//! Face mesher: one quad per visible cube face, two crossed quads per plant.

use strata_engine::collab::MeshBuilder;
use strata_engine::mesh::{ChunkMesh, Face, MeshInput, MeshVertex, face_visible};
use strata_engine::world::block::{BlockId, MeshKind};
use strata_engine::world::chunk::{CHUNK_SIZE_H, CHUNK_SIZE_V, LightChannel};

/// Corners of each face of the unit cube, counter-clockwise seen from
/// outside, in [`Face::ALL`] order.
const FACE_CORNERS: [[[f32; 3]; 4]; 6] = [
    [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
    [[0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]],
    [[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]],
    [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
    [[1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]],
    [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
];

const CROSS_CORNERS: [[[f32; 3]; 4]; 2] = [
    [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
    [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]],
];

/// Liquid surfaces sit a little below the top of their cell.
const LIQUID_SURFACE: f32 = 0.875;

/// Face id used for the diagonal quads of a cross.
pub const CROSS_FACE: u8 = 6;

#[derive(Debug, Default, Clone, Copy)]
pub struct FaceMesher;

impl FaceMesher {
    fn push_quad(mesh: &mut ChunkMesh, origin: [f32; 3], corners: &[[f32; 3]; 4], face: u8, block: BlockId, light: [u8; 2], top: f32) {
        let base = mesh.vertices.len() as u32;
        for c in corners {
            let y = if c[1] > 0.0 { top } else { 0.0 };
            mesh.vertices.push(MeshVertex {
                position: [origin[0] + c[0], origin[1] + y, origin[2] + c[2]],
                face,
                block,
                light,
            });
        }
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    fn cube(mesh: &mut ChunkMesh, input: &MeshInput, x: i32, y: i32, z: i32, block: BlockId) {
        let origin = [x as f32, y as f32, z as f32];
        let liquid = block.mesh_kind() == MeshKind::Liquid;
        let top = if liquid && !input.get(x, y + 1, z).is_fluid() {
            LIQUID_SURFACE
        } else {
            1.0
        };
        for (i, face) in Face::ALL.into_iter().enumerate() {
            let [dx, dy, dz] = face.offset();
            let (nx, ny, nz) = (x + dx, y + dy, z + dz);
            if !face_visible(block, input.get(nx, ny, nz)) {
                continue;
            }
            let light = [
                input.light(LightChannel::Sun, nx, ny, nz),
                input.light(LightChannel::Block, nx, ny, nz),
            ];
            Self::push_quad(mesh, origin, &FACE_CORNERS[i], i as u8, block, light, top);
        }
    }

    fn cross(mesh: &mut ChunkMesh, input: &MeshInput, x: i32, y: i32, z: i32, block: BlockId) {
        let origin = [x as f32, y as f32, z as f32];
        let light = [
            input.light(LightChannel::Sun, x, y, z),
            input.light(LightChannel::Block, x, y, z),
        ];
        for corners in &CROSS_CORNERS {
            let base = mesh.vertices.len() as u32;
            Self::push_quad(mesh, origin, corners, CROSS_FACE, block, light, 1.0);
            // Back side shares the vertices.
            mesh.indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        }
    }
}

impl MeshBuilder for FaceMesher {
    fn build(&self, input: &MeshInput) -> ChunkMesh {
        let mut mesh = ChunkMesh::default();
        for z in 0..CHUNK_SIZE_H {
            for y in 0..CHUNK_SIZE_V {
                for x in 0..CHUNK_SIZE_H {
                    let block = input.get(x, y, z);
                    match block.mesh_kind() {
                        MeshKind::None => {}
                        MeshKind::Cross => Self::cross(&mut mesh, input, x, y, z, block),
                        MeshKind::Cube | MeshKind::Liquid => Self::cube(&mut mesh, input, x, y, z, block),
                    }
                }
            }
        }
        mesh
    }
}
