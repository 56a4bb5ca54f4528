//! Terrain generators.
//!
//! Both generators are pure functions of the column position and their
//! settings, so a column dropped from the window regenerates identically.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use strata_engine::collab::TerrainGenerator;
use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{CHUNK_SIZE_H, WORLD_HEIGHT};
use strata_engine::world::group::GroupBody;
use strata_engine::world::position::ColumnPos;

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    pub seed: u32,
    /// Height the noise oscillates around.
    pub base_height: i32,
    /// Peak deviation from `base_height`.
    pub amplitude: f64,
    /// Horizontal frequency of the first octave, in 1/blocks.
    pub frequency: f64,
    pub octaves: u32,
    pub sea_level: i32,
    pub snow_line: i32,
    /// Roughly one tree per this many grass columns.
    pub tree_rarity: u64,
    /// Roughly one lantern per this many grass columns.
    pub lantern_rarity: u64,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            base_height: 44,
            amplitude: 22.0,
            frequency: 0.008,
            octaves: 4,
            sea_level: 40,
            snow_line: 72,
            tree_rarity: 90,
            lantern_rarity: 400,
        }
    }
}

// ── Hashing ──────────────────────────────────────────────────────────────────

/// splitmix64 finalizer: decorrelates neighboring inputs.
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn column_hash(seed: u32, x: i64, z: i64, salt: u64) -> u64 {
    mix(mix(mix(seed as u64 ^ salt) ^ x as u64) ^ z as u64)
}

// ── Noise terrain ────────────────────────────────────────────────────────────

/// Rolling hills from layered Perlin noise, with beaches, lakes at sea level,
/// snowy peaks, trees and the odd lantern.
pub struct NoiseTerrain {
    settings: TerrainSettings,
    perlin: Perlin,
}

impl NoiseTerrain {
    pub fn new(settings: TerrainSettings) -> Self {
        let perlin = Perlin::new(settings.seed);
        Self { settings, perlin }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Height of the topmost solid block at absolute `(x, z)`.
    pub fn height_at(&self, x: i64, z: i64) -> i32 {
        let s = &self.settings;
        let mut sum = 0.0;
        let mut norm = 0.0;
        let mut amp = 1.0;
        let mut freq = s.frequency;
        for _ in 0..s.octaves.max(1) {
            sum += amp * self.perlin.get([x as f64 * freq, z as f64 * freq]);
            norm += amp;
            amp *= 0.5;
            freq *= 2.0;
        }
        let h = s.base_height as f64 + s.amplitude * (sum / norm);
        // Leave headroom for trees.
        (h.round() as i32).clamp(2, WORLD_HEIGHT - 12)
    }

    fn place_tree(body: &mut GroupBody, x: i32, base: i32, z: i32, trunk: i32) {
        let top = base + trunk;
        for dy in -2..=0 {
            let r: i32 = if dy == 0 { 1 } else { 2 };
            for dz in -r..=r {
                for dx in -r..=r {
                    if dx.abs() == r && dz.abs() == r && r == 2 {
                        continue;
                    }
                    if body.get(x + dx, top + dy, z + dz) == BlockId::AIR {
                        body.set(x + dx, top + dy, z + dz, BlockId::LEAVES);
                    }
                }
            }
        }
        body.set(x, top + 1, z, BlockId::LEAVES);
        for y in base..top {
            body.set(x, y, z, BlockId::LOG);
        }
    }
}

impl TerrainGenerator for NoiseTerrain {
    fn generate(&self, pos: ColumnPos, body: &mut GroupBody) {
        let s = &self.settings;
        let origin = pos.block_origin();
        let mut grass = Vec::new();

        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                let (wx, wz) = (origin.x + x as i64, origin.z + z as i64);
                let h = self.height_at(wx, wz);

                body.set(x, 0, z, BlockId::BEDROCK);
                for y in 1..h - 3 {
                    body.set(x, y, z, BlockId::STONE);
                }
                let top = if h <= s.sea_level + 1 {
                    BlockId::SAND
                } else if h >= s.snow_line {
                    BlockId::SNOW
                } else {
                    BlockId::GRASS
                };
                let filler = if top == BlockId::SAND { BlockId::SAND } else { BlockId::DIRT };
                for y in (h - 3).max(1)..h {
                    body.set(x, y, z, filler);
                }
                body.set(x, h, z, top);
                for y in h + 1..=s.sea_level {
                    body.set(x, y, z, BlockId::WATER);
                }
                if top == BlockId::GRASS {
                    grass.push((x, h, z, wx, wz));
                }
            }
        }

        for (x, h, z, wx, wz) in grass {
            let roll = column_hash(s.seed, wx, wz, 1);
            // Trees stay clear of the column border so columns never write
            // into each other.
            let interior = (2..CHUNK_SIZE_H - 2).contains(&x) && (2..CHUNK_SIZE_H - 2).contains(&z);
            if interior && s.tree_rarity > 0 && roll % s.tree_rarity == 0 {
                let trunk = 4 + ((roll >> 32) % 2) as i32;
                Self::place_tree(body, x, h + 1, z, trunk);
            } else if s.lantern_rarity > 0
                && column_hash(s.seed, wx, wz, 2) % s.lantern_rarity == 0
                && body.get(x, h + 1, z) == BlockId::AIR
            {
                body.set(x, h + 1, z, BlockId::LANTERN);
            }
        }
    }
}

// ── Flat terrain ─────────────────────────────────────────────────────────────

/// Bedrock floor and stone up to a fixed height. Handy for tests and
/// benchmarks where the numbers have to be predictable.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    pub top: i32,
}

impl TerrainGenerator for FlatTerrain {
    fn generate(&self, _pos: ColumnPos, body: &mut GroupBody) {
        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                body.set(x, 0, z, BlockId::BEDROCK);
                for y in 1..=self.top {
                    body.set(x, y, z, BlockId::STONE);
                }
            }
        }
    }
}
