use super::{LightField, LightQueues, MIN_LIGHT, scatter};
use crate::world::block::BlockId;
use crate::world::chunk::{CHUNK_SIZE_H, LightChannel, WORLD_HEIGHT};
use crate::world::group::GroupBody;
use crate::world::position::LocalPos;

/// A lone group body, addressed in group coordinates. Everything outside the
/// column is invisible.
impl LightField for GroupBody {
    #[inline]
    fn block(&self, pos: LocalPos) -> Option<BlockId> {
        in_group(pos).then(|| self.get(pos.x, pos.y, pos.z))
    }

    #[inline]
    fn stored(&self, channel: LightChannel, pos: LocalPos) -> u8 {
        self.light(channel, pos.x, pos.y, pos.z)
    }

    #[inline]
    fn store(&mut self, channel: LightChannel, pos: LocalPos, value: u8) {
        self.set_light(channel, pos.x, pos.y, pos.z, value);
    }

    #[inline]
    fn surface(&self, pos: LocalPos) -> i32 {
        GroupBody::surface(self, pos.x, pos.z)
    }

    fn recompute_surface(&mut self, pos: LocalPos) -> (i32, i32) {
        GroupBody::recompute_surface(self, pos.x, pos.z)
    }
}

#[inline]
fn in_group(pos: LocalPos) -> bool {
    pos.x >= 0
        && pos.x < CHUNK_SIZE_H
        && pos.z >= 0
        && pos.z < CHUNK_SIZE_H
        && pos.y >= 0
        && pos.y < WORLD_HEIGHT
}

/// Compute group-local light from scratch.
///
/// Resets both channels, seeds every emitter up to the surface and every
/// implicitly sunlit cell that borders a taller neighboring column, then
/// scatters each channel once. Light crossing into adjacent groups is left
/// for stitching.
pub fn preprocess(body: &mut GroupBody, queues: &mut LightQueues) {
    body.recompute_surfaces();
    body.clear_light();

    for z in 0..CHUNK_SIZE_H {
        for x in 0..CHUNK_SIZE_H {
            for y in 0..body.surface(x, z) {
                let emission = body.get(x, y, z).light_emitted();
                if emission > MIN_LIGHT {
                    body.set_light(LightChannel::Block, x, y, z, emission);
                    queues.scatter.push_back(LocalPos::new(x, y, z));
                }
            }
        }
    }
    scatter(body, LightChannel::Block, &mut queues.scatter);

    for z in 0..CHUNK_SIZE_H {
        for x in 0..CHUNK_SIZE_H {
            let surface = body.surface(x, z);
            let mut top = surface + 1;
            for (dx, dz) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, nz) = (x + dx, z + dz);
                if (0..CHUNK_SIZE_H).contains(&nx) && (0..CHUNK_SIZE_H).contains(&nz) {
                    top = top.max(body.surface(nx, nz));
                }
            }
            for y in surface..top.min(WORLD_HEIGHT) {
                queues.scatter.push_back(LocalPos::new(x, y, z));
            }
        }
    }
    scatter(body, LightChannel::Sun, &mut queues.scatter);
}
