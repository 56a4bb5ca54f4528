//! Benchmark: sequential vs parallel group preprocessing.
//!
//! Generates a square of noise-terrain columns and computes their group-local
//! light one at a time, then across the rayon pool, and checks both passes
//! agree.
//! Run with: `cargo run --release -p strata-host --example bench_lighting`

use std::time::Instant;

use rayon::prelude::*;
use strata_engine::collab::TerrainGenerator;
use strata_engine::light::{LightQueues, preprocess};
use strata_engine::world::chunk::{CHUNK_SIZE_H, LightChannel, WORLD_HEIGHT};
use strata_engine::world::group::GroupBody;
use strata_engine::world::position::ColumnPos;
use strata_host::terrain::{NoiseTerrain, TerrainSettings};

fn main() {
    let side = 16;
    let columns = (side * side) as usize;
    let terrain = NoiseTerrain::new(TerrainSettings::default());

    println!("=== strata: Group Lighting Benchmark ===\n");
    println!("  {} columns ({}x{} grid), noise terrain seed {}\n", columns, side, side, terrain.settings().seed);

    let t0 = Instant::now();
    let template = generate(&terrain, side);
    println!("  Generation: {:>8.2?}", t0.elapsed());

    // --- Sequential ---
    let mut seq = template.clone();
    let t0 = Instant::now();
    let mut queues = LightQueues::new();
    for body in &mut seq {
        preprocess(body, &mut queues);
    }
    let dt_seq = t0.elapsed();
    println!("  Sequential: {:>8.2?}", dt_seq);

    // --- Parallel ---
    let mut par = template;
    let t0 = Instant::now();
    par.par_iter_mut().for_each_init(LightQueues::new, |queues, body| preprocess(body, queues));
    let dt_par = t0.elapsed();
    println!("  Parallel:   {:>8.2?} ({} threads)", dt_par, rayon::current_num_threads());

    let speedup = dt_seq.as_secs_f64() / dt_par.as_secs_f64();
    println!("\n  Speedup: {:.2}x", speedup);

    // --- Verify identical ---
    let mut mismatches = 0;
    for (a, b) in seq.iter().zip(&par) {
        for z in 0..CHUNK_SIZE_H {
            for x in 0..CHUNK_SIZE_H {
                if a.surface(x, z) != b.surface(x, z) {
                    mismatches += 1;
                }
                for y in 0..WORLD_HEIGHT {
                    for channel in [LightChannel::Sun, LightChannel::Block] {
                        if a.light(channel, x, y, z) != b.light(channel, x, y, z) {
                            mismatches += 1;
                        }
                    }
                }
            }
        }
    }

    if mismatches == 0 {
        println!("  Verification: PASS (identical light in all {} columns)", columns);
    } else {
        println!("  Verification: FAIL ({} mismatched cells)", mismatches);
        std::process::exit(1);
    }
}

fn generate(terrain: &NoiseTerrain, side: i32) -> Vec<GroupBody> {
    let positions: Vec<_> = (0..side)
        .flat_map(|x| (0..side).map(move |z| ColumnPos::new(x, z)))
        .collect();
    positions
        .par_iter()
        .map(|&pos| {
            let mut body = GroupBody::new();
            terrain.generate(pos, &mut body);
            body
        })
        .collect()
}
