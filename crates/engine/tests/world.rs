//! End-to-end streaming tests: real worker threads, a flat generator, an
//! in-memory store and a counting mesher.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use strata_engine::collab::{Collaborators, GroupStore, MeshBuilder, NullStore, TerrainGenerator};
use strata_engine::light::MIN_LIGHT;
use strata_engine::mesh::{ChunkMesh, MeshInput, MeshUpdate, MeshVertex};
use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{CHUNK_SIZE_H, ChunkState, LightChannel};
use strata_engine::world::group::{GroupBody, GroupState};
use strata_engine::world::position::{ColumnPos, LocalPos, RelPos, WorldPos};
use strata_engine::world::{ChunkRef, Rebased};
use strata_engine::{Aabb, EditOutcome, World, WorldConfig};

// ---------------------------------------------------------------------------
// Test collaborators
// ---------------------------------------------------------------------------

/// Stone from y = 0 up to and including `top`.
struct Flat {
    top: i32,
}

impl TerrainGenerator for Flat {
    fn generate(&self, _pos: ColumnPos, body: &mut GroupBody) {
        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                for y in 0..=self.top {
                    body.set(x, y, z, BlockId::STONE);
                }
            }
        }
    }
}

const GROUND: i32 = 40;
const SLAB: i32 = 50;

/// Stone up to `GROUND`, pierced by a tunnel running along x through every
/// column. A stone slab hangs over world x 8..=27 and a lantern sits at the
/// east end of column (0, 0)'s tunnel segment.
struct Tunnels;

impl TerrainGenerator for Tunnels {
    fn generate(&self, pos: ColumnPos, body: &mut GroupBody) {
        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                for y in 0..=GROUND {
                    let tunnel = (20..=22).contains(&y) && (6..=8).contains(&z);
                    if !tunnel {
                        body.set(x, y, z, BlockId::STONE);
                    }
                }
                if (8..=27).contains(&(pos.x * CHUNK_SIZE_H + x)) {
                    body.set(x, SLAB, z, BlockId::STONE);
                }
            }
        }
        if pos == ColumnPos::new(0, 0) {
            body.set(15, 21, 7, BlockId::LANTERN);
        }
    }
}

/// Emits placeholder vertices, as many as a real face mesher would.
struct Counting;

impl MeshBuilder for Counting {
    fn build(&self, input: &MeshInput) -> ChunkMesh {
        let vertex = MeshVertex { position: [0.0; 3], face: 0, block: BlockId::STONE, light: [15, 1] };
        ChunkMesh {
            vertices: vec![vertex; input.count_vertices() as usize],
            indices: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
struct MemoryStore {
    saved: Arc<Mutex<HashMap<ColumnPos, Vec<(i32, i32, i32, BlockId)>>>>,
}

impl GroupStore for MemoryStore {
    fn load(&self, pos: ColumnPos, body: &mut GroupBody) -> bool {
        let saved = self.saved.lock();
        let Some(blocks) = saved.get(&pos) else {
            return false;
        };
        for &(x, y, z, b) in blocks {
            body.set(x, y, z, b);
        }
        true
    }

    fn save(&self, pos: ColumnPos, body: &GroupBody) {
        let mut blocks = Vec::new();
        for z in 0..CHUNK_SIZE_H {
            for y in 0..128 {
                for x in 0..CHUNK_SIZE_H {
                    let b = body.get(x, y, z);
                    if b != BlockId::AIR {
                        blocks.push((x, y, z, b));
                    }
                }
            }
        }
        self.saved.lock().insert(pos, blocks);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TOP: i32 = 19;

fn config() -> WorldConfig {
    WorldConfig {
        load_range: 2,
        worker_count: 2,
        queue_capacity: 256,
        max_destroys_per_frame: 2,
        max_mesh_jobs_per_frame: 64,
        max_chunk_vertices: 100_000,
        shift_margin: 0.0,
    }
}

fn flat_world(config: WorldConfig) -> World {
    World::new(config, ColumnPos::new(0, 0), Collaborators::new(Flat { top: TOP }, NullStore, Counting)).unwrap()
}

/// Center of a column, standing on the ground.
fn player_at(column: ColumnPos) -> [f64; 3] {
    let origin = column.block_origin();
    [origin.x as f64 + 8.5, (TOP + 1) as f64, origin.z as f64 + 8.5]
}

fn pump(world: &mut World, player: [f64; 3]) {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        world.update(player);
        if world.is_idle() {
            return;
        }
        assert!(Instant::now() < deadline, "world never settled: {:?}", world.stats());
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Every non-opaque cell of the window in `ys` holds exactly what its own
/// emission and its neighbors give it: nothing is missing after stitching and
/// nothing is left over from light that has no source.
fn assert_light_settled(world: &World, ys: Range<i32>) {
    let side = world.anchor().size() * CHUNK_SIZE_H;
    let mut checked = 0;
    for z in 0..side {
        for x in 0..side {
            let surface = world.surface_at(LocalPos::new(x, 0, z)).unwrap();
            for y in ys.clone() {
                let pos = LocalPos::new(x, y, z);
                let block = world.get_block(pos);
                if block.is_opaque() {
                    continue;
                }
                for channel in [LightChannel::Sun, LightChannel::Block] {
                    if channel == LightChannel::Sun && y >= surface {
                        continue;
                    }
                    let mut expected = match channel {
                        LightChannel::Block => block.light_emitted().max(MIN_LIGHT),
                        LightChannel::Sun => MIN_LIGHT,
                    };
                    for n in pos.neighbors() {
                        if !matches!(world.locate(n), Rebased::Chunk { .. }) {
                            continue;
                        }
                        let passed = world.light_at(channel, n).saturating_sub(world.get_block(n).light_step());
                        if passed > MIN_LIGHT {
                            expected = expected.max(passed);
                        }
                    }
                    assert_eq!(world.light_at(channel, pos), expected, "{:?} at {:?}", channel, world.to_world(pos));
                    checked += 1;
                }
            }
        }
    }
    assert!(checked > 0);
}

/// Local position of a block in the window's center column.
fn center_block(world: &World, x: i32, y: i32, z: i32) -> LocalPos {
    let r = world.anchor().load_range * CHUNK_SIZE_H;
    LocalPos::new(r + x, y, r + z)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn initial_window_loads_preprocesses_and_meshes() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let size = world.anchor().size();
    for lcz in 0..size {
        for lcx in 0..size {
            let group = world.group_at(lcx, lcz).unwrap();
            assert_eq!(group.state, GroupState::Preprocessed);
            assert_eq!(group.local, (lcx, lcz));
        }
    }

    // Interior 3x3: the ground chunk shows only its top faces.
    assert_eq!(world.visible_chunks().len(), 9);
    let p = center_block(&world, 3, 5, 3);
    assert_eq!(world.chunk_state(p), Some(ChunkState::Built));
    let lc = p.local_chunk();
    let key = world.group_key_at(lc.x, lc.z).unwrap();
    let chunk = world.group(key).unwrap().chunk(0).unwrap();
    assert_eq!(chunk.vertex_count, Some(16 * 16 * 4));

    let updates = world.take_mesh_updates();
    let built = updates.iter().filter(|u| matches!(u, MeshUpdate::Built { .. })).count();
    assert_eq!(built, 9 * 4);
}

#[test]
fn block_queries_respect_world_bounds() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    assert_eq!(world.get_block(center_block(&world, 0, -1, 0)), BlockId::KILL_ZONE);
    assert_eq!(world.get_block(center_block(&world, 0, 128, 0)), BlockId::AIR);
    assert_eq!(world.get_block(center_block(&world, 0, 5, 0)), BlockId::STONE);
    assert_eq!(world.get_block(center_block(&world, 0, TOP + 1, 0)), BlockId::AIR);
    assert_eq!(world.get_block(LocalPos::new(-1, 5, 0)), BlockId::AIR);
    assert_eq!(world.get_block_world(WorldPos::new(3, 5, -7)), BlockId::STONE);

    let p = center_block(&world, 4, TOP + 1, 4);
    assert_eq!(world.light_at(LightChannel::Sun, p), 15);
    assert_eq!(world.light_at(LightChannel::Sun, p.offset(0, -1, 0)), 1);
    assert_eq!(world.surface_at(p), Some(TOP + 1));
}

#[test]
fn rebased_offsets_resolve_across_groups_and_world_bounds() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let center = world.anchor().load_range;
    let key = |lcx: i32, lcz: i32| world.group_key_at(lcx, lcz).unwrap();
    let ground = ChunkRef { group: key(center, center), cy: 0 };

    assert_eq!(world.rebase(ground, [3, -1, 3]), Rebased::Floor);
    assert_eq!(world.get_block_safe(ground, [3, -1, 3]), BlockId::KILL_ZONE);

    let roof = ChunkRef { group: key(center, center), cy: 3 };
    assert_eq!(world.rebase(roof, [3, 32, 3]), Rebased::Ceiling);
    assert_eq!(world.get_block_safe(roof, [3, 32, 3]), BlockId::AIR);
    assert_eq!(world.get_block_safe(roof, [3, -80, 3]), BlockId::STONE);

    // One block west and one column south lands in the diagonal neighbor.
    let crossed = Rebased::Chunk {
        at: ChunkRef { group: key(center - 1, center + 1), cy: 0 },
        rel: RelPos::new(15, 5, 1),
    };
    assert_eq!(world.rebase(ground, [-1, 5, 17]), crossed);
    assert_eq!(world.locate(center_block(&world, -1, 5, 17)), crossed);
    assert_eq!(world.get_block_safe(ground, [-1, 5, 17]), BlockId::STONE);
    assert_eq!(world.get_block_safe(ground, [-1, TOP + 1, 17]), BlockId::AIR);

    // Downward out of a chunk stays in the same group.
    let middle = ChunkRef { group: key(center, center), cy: 1 };
    assert_eq!(
        world.rebase(middle, [0, -1, 0]),
        Rebased::Chunk { at: ground, rel: RelPos::new(0, 31, 0) }
    );

    // West of the window's edge nothing is loaded, even underground.
    let edge = ChunkRef { group: key(0, center), cy: 0 };
    assert_eq!(world.rebase(edge, [-1, 0, 0]), Rebased::Unloaded);
    assert_eq!(world.get_block_safe(edge, [-1, 5, 0]), BlockId::AIR);
    assert_eq!(world.get_block_safe(edge, [0, 5, 0]), BlockId::STONE);
}

#[test]
fn edge_groups_never_become_eligible() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let size = world.anchor().size();
    for lcz in 0..size {
        for lcx in 0..size {
            if !world.anchor().is_edge(lcx, lcz) {
                continue;
            }
            let group = world.group_at(lcx, lcz).unwrap();
            for cy in 0..4 {
                assert_eq!(group.chunk(cy).unwrap().state, ChunkState::LoadedData);
            }
        }
    }
    let p = LocalPos::new(3, TOP + 1, 3);
    assert_eq!(world.set_block(p, BlockId::STONE), EditOutcome::ChunkNotReady);
}

// ---------------------------------------------------------------------------
// Lighting
// ---------------------------------------------------------------------------

#[test]
fn light_crosses_group_borders_through_tunnels_and_overhangs() {
    let collab = Collaborators::new(Tunnels, NullStore, Counting);
    let mut world = World::new(config(), ColumnPos::new(0, 0), collab).unwrap();
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let check = |world: &World| {
        let block = |x, y, z| world.light_at(LightChannel::Block, world.to_local(WorldPos::new(x, y, z)));
        let sun = |x, y, z| world.light_at(LightChannel::Sun, world.to_local(WorldPos::new(x, y, z)));

        // The lantern sits at x = 15; x = 16 belongs to the next group.
        assert_eq!(block(15, 21, 7), 15);
        assert_eq!(block(16, 21, 7), 14);
        assert_eq!(block(19, 21, 7), 11);
        assert_eq!(block(16, 22, 8), 12);
        assert_eq!(block(16, GROUND + 1, 7), MIN_LIGHT);
        assert_eq!(sun(16, 21, 7), MIN_LIGHT);

        // Under the slab sunlight comes in from both open ends. Near x = 16
        // the west opening is closer, but it lies in the other group.
        assert_eq!(sun(15, 45, 3), 7);
        assert_eq!(sun(16, 45, 3), 6);
        assert_eq!(sun(17, 45, 3), 5);
        assert_eq!(sun(20, 45, 3), 7);
        assert_eq!(sun(7, 45, 3), 15);

        assert_light_settled(world, 0..SLAB + 4);
    };
    check(&world);

    // Move east: column (0, 0) is no longer central and a new ring loads.
    let east = ColumnPos::new(1, 0);
    pump(&mut world, player_at(east));
    assert_eq!(world.anchor().center, east);
    check(&world);
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[test]
fn edit_updates_blocks_light_and_mesh() {
    let mut world = flat_world(config());
    let player = player_at(ColumnPos::new(0, 0));
    pump(&mut world, player);
    world.take_mesh_updates();

    let p = center_block(&world, 2, TOP + 1, 2);
    assert_eq!(world.set_block(p, BlockId::STONE), EditOutcome::Applied);
    assert_eq!(world.get_block(p), BlockId::STONE);
    assert_eq!(world.chunk_state(p), Some(ChunkState::NeedsFill));
    assert_eq!(world.surface_at(p), Some(TOP + 2));
    assert_eq!(world.light_at(LightChannel::Sun, p), 1);
    let lc = p.local_chunk();
    let key = world.group_key_at(lc.x, lc.z).unwrap();
    assert!(world.group(key).unwrap().modified);
    assert_eq!(world.group(key).unwrap().chunk(0).unwrap().vertex_count, Some(1024 + 16));

    pump(&mut world, player);
    assert_eq!(world.chunk_state(p), Some(ChunkState::Built));
    assert_eq!(world.group(key).unwrap().chunk(0).unwrap().vertex_count, Some(1024 + 16));
    assert!(!world.take_mesh_updates().is_empty());

    // Lantern light crosses into the neighboring group.
    let lantern = center_block(&world, 15, TOP + 1, 8);
    assert_eq!(world.set_block(lantern, BlockId::LANTERN), EditOutcome::Applied);
    assert_eq!(world.light_at(LightChannel::Block, lantern.offset(1, 0, 0)), 14);
    assert_eq!(world.light_at(LightChannel::Block, lantern.offset(3, 0, 0)), 12);
    assert_eq!(world.set_block(lantern, BlockId::AIR), EditOutcome::Applied);
    assert_eq!(world.light_at(LightChannel::Block, lantern.offset(1, 0, 0)), 1);
}

#[test]
fn vertex_budget_reverts_to_air() {
    let mut world = flat_world(WorldConfig { max_chunk_vertices: 1035, ..config() });
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let p = center_block(&world, 5, TOP + 1, 5);
    assert_eq!(world.set_block(p, BlockId::STONE), EditOutcome::RevertedToAir);
    assert_eq!(world.get_block(p), BlockId::AIR);
    let lc = p.local_chunk();
    let key = world.group_key_at(lc.x, lc.z).unwrap();
    assert_eq!(world.group(key).unwrap().chunk(0).unwrap().vertex_count, Some(1024));

    // Digging exposes four side faces and the floor while losing the top
    // face. Air is all that was asked for, so nothing is placed.
    let below = p.offset(0, -1, 0);
    let outcome = world.set_block(below, BlockId::AIR);
    assert_eq!(outcome, EditOutcome::BudgetExceeded);
    assert_eq!(world.get_block(below), BlockId::STONE);

    // A torch costs 8 vertices and fits.
    assert_eq!(world.set_block(p, BlockId::TORCH), EditOutcome::Applied);
    assert_eq!(world.group(key).unwrap().chunk(0).unwrap().vertex_count, Some(1032));
}

#[test]
fn edits_are_rejected_when_out_of_range_or_inside_player() {
    let mut world = flat_world(config());
    let player = player_at(ColumnPos::new(0, 0));
    pump(&mut world, player);
    world.set_player_bounds(Aabb::around_feet(player, 0.3, 1.8));

    assert_eq!(world.set_block(center_block(&world, 0, -1, 0), BlockId::STONE), EditOutcome::OutOfBounds);
    assert_eq!(world.set_block(center_block(&world, 0, 128, 0), BlockId::STONE), EditOutcome::OutOfBounds);

    let feet = world.to_local(WorldPos::from_f64(player));
    assert_eq!(world.set_block(feet, BlockId::STONE), EditOutcome::PlayerOverlap);
    assert_eq!(world.get_block(feet), BlockId::AIR);
    assert_eq!(world.set_block(feet, BlockId::TORCH), EditOutcome::Applied);
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[test]
fn shift_reuses_groups_that_stay_in_view() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let column = ColumnPos::new(1, 0);
    let (lcx, lcz) = world.anchor().column_to_local(column);
    assert_eq!((lcx, lcz), (3, 2));
    let key = world.group_key_at(lcx, lcz).unwrap();
    let edited = LocalPos::new(lcx * CHUNK_SIZE_H + 4, TOP + 1, lcz * CHUNK_SIZE_H + 4);
    assert_eq!(world.set_block(edited, BlockId::GLASS), EditOutcome::Applied);
    let edited_world = world.to_world(edited);

    world.update(player_at(column));
    assert_eq!(world.anchor().center, column);
    assert_eq!(world.group_key_at(2, 2), Some(key));
    let group = world.group(key).unwrap();
    assert_eq!(group.local, (2, 2));
    assert_eq!(group.state, GroupState::Preprocessed);
    assert!(group.active);
    assert_eq!(world.get_block_world(edited_world), BlockId::GLASS);
    assert_eq!(world.to_world(world.to_local(edited_world)), edited_world);
}

#[test]
fn destroy_queue_is_capped_per_frame() {
    let mut world = flat_world(config());
    pump(&mut world, player_at(ColumnPos::new(0, 0)));
    world.take_mesh_updates();

    world.update(player_at(ColumnPos::new(1, 0)));
    // Five columns left the window; two are destroyed per frame.
    assert_eq!(world.stats().destroy_queue, 3);

    pump(&mut world, player_at(ColumnPos::new(1, 0)));
    let freed: Vec<ColumnPos> = world
        .take_mesh_updates()
        .into_iter()
        .filter_map(|u| match u {
            MeshUpdate::Freed { column } => Some(column),
            _ => None,
        })
        .collect();
    assert_eq!(freed.len(), 5);
    assert!(freed.iter().all(|c| c.x == -2));
    assert_eq!(world.stats().groups, 25);
    assert_eq!(world.stats().allocated_bodies, 30);
    assert_eq!(world.stats().pooled_bodies, 5);
}

#[test]
fn full_queue_defers_work_until_it_drains() {
    let mut world = flat_world(WorldConfig { queue_capacity: 2, ..config() });
    pump(&mut world, player_at(ColumnPos::new(0, 0)));
    let settled = world.stats().queue_full_events;
    assert!(settled > 0);

    let column = ColumnPos::new(1, 1);
    pump(&mut world, player_at(column));
    assert!(world.stats().queue_full_events > settled);
    assert_eq!(world.anchor().center, column);

    let size = world.anchor().size();
    for lcz in 0..size {
        for lcx in 0..size {
            let group = world.group_at(lcx, lcz).unwrap();
            assert_eq!(group.state, GroupState::Preprocessed);
            assert_eq!(group.pos, world.anchor().local_to_column(lcx, lcz));
            assert!(!group.busy);
        }
    }
    assert_eq!(world.stats().groups, 25);
    assert_eq!(world.visible_chunks().len(), 9);
    let p = center_block(&world, 3, 5, 3);
    assert_eq!(world.chunk_state(p), Some(ChunkState::Built));
    assert_eq!(world.get_block_world(WorldPos::new(16 + 3, TOP, 16 + 3)), BlockId::STONE);
    assert_eq!(world.light_at(LightChannel::Sun, center_block(&world, 3, TOP + 1, 3)), 15);
}

#[test]
fn modified_groups_round_trip_through_the_store() {
    let store = MemoryStore::default();
    let collab = Collaborators::new(Flat { top: TOP }, store.clone(), Counting);
    let mut world = World::new(config(), ColumnPos::new(0, 0), collab).unwrap();
    let home = player_at(ColumnPos::new(0, 0));
    pump(&mut world, home);

    let target = WorldPos::new(5, TOP + 1, 5);
    assert_eq!(world.set_block(world.to_local(target), BlockId::LOG), EditOutcome::Applied);

    // Far enough that every group leaves the window.
    let away = player_at(ColumnPos::new(20, 0));
    pump(&mut world, away);
    assert!(store.saved.lock().contains_key(&ColumnPos::new(0, 0)));
    assert_eq!(store.saved.lock().len(), 1);

    pump(&mut world, home);
    assert_eq!(world.get_block_world(target), BlockId::LOG);
    assert_eq!(world.get_block_world(WorldPos::new(5, TOP, 5)), BlockId::STONE);
}

#[test]
fn shutdown_saves_modified_groups() {
    let store = MemoryStore::default();
    let collab = Collaborators::new(Flat { top: TOP }, store.clone(), Counting);
    let mut world = World::new(config(), ColumnPos::new(0, 0), collab).unwrap();
    pump(&mut world, player_at(ColumnPos::new(0, 0)));

    let p = world.to_local(WorldPos::new(-3, TOP + 1, 2));
    assert_eq!(world.set_block(p, BlockId::SAND), EditOutcome::Applied);
    assert_eq!(world.shutdown(Duration::from_secs(10)), 1);
    assert!(store.saved.lock().contains_key(&ColumnPos::new(-1, 0)));
}

#[test]
fn invalid_config_is_rejected() {
    let bad = WorldConfig { load_range: 0, ..config() };
    let result = World::new(bad, ColumnPos::new(0, 0), Collaborators::new(Flat { top: 3 }, NullStore, Counting));
    assert!(result.is_err());
}
