//! Region file persistence.
//!
//! Columns are stored under `<dir>/region/r.X.Z.sgr`, 32x32 columns per
//! file. A region file is a small header followed by one record per saved
//! column; each record is a zlib stream of run-length encoded block runs,
//! one run list per chunk from the bottom up. Light is not stored: it is
//! recomputed when a column is preprocessed.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail, ensure};
use dashmap::DashMap;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use parking_lot::Mutex;

use strata_engine::collab::GroupStore;
use strata_engine::world::block::BlockId;
use strata_engine::world::chunk::{CHUNK_VOLUME, WORLD_CHUNK_HEIGHT};
use strata_engine::world::group::GroupBody;
use strata_engine::world::position::{ColumnPos, RegionPos};

// ── Format ───────────────────────────────────────────────────────────────────

const MAGIC: &[u8; 4] = b"SGR1";

/// Column slot inside a region: `(x, z)`, each in `0..32`.
type Slot = (u8, u8);

/// One run of identical blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    block: u8,
    len: u16,
}

/// Run-length encode one chunk's blocks in storage order.
fn encode_runs(blocks: &[BlockId]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &b in blocks {
        match runs.last_mut() {
            Some(run) if run.block == b.0 && run.len < u16::MAX => run.len += 1,
            _ => runs.push(Run { block: b.0, len: 1 }),
        }
    }
    runs
}

/// Serialize and compress a column.
fn encode_column(body: &GroupBody) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    for chunk in &body.chunks {
        let runs = encode_runs(chunk.blocks());
        raw.extend_from_slice(&(runs.len() as u32).to_le_bytes());
        for run in runs {
            raw.push(run.block);
            raw.extend_from_slice(&run.len.to_le_bytes());
        }
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Decompress a column record into `body`.
fn decode_column(record: &[u8], body: &mut GroupBody) -> Result<()> {
    let mut raw = Vec::new();
    ZlibDecoder::new(record)
        .read_to_end(&mut raw)
        .context("decompressing column record")?;

    let mut cursor = ByteReader::new(&raw);
    for cy in 0..WORLD_CHUNK_HEIGHT as usize {
        let run_count = cursor.u32()? as usize;
        let blocks = body.chunks[cy].blocks_mut();
        let mut filled = 0usize;
        for _ in 0..run_count {
            let raw_id = cursor.u8()?;
            let len = cursor.u16()? as usize;
            let Some(block) = BlockId::from_raw(raw_id) else {
                bail!("unknown block id {} in chunk {}", raw_id, cy);
            };
            ensure!(filled + len <= CHUNK_VOLUME, "chunk {} overflows its volume", cy);
            blocks[filled..filled + len].fill(block);
            filled += len;
        }
        ensure!(filled == CHUNK_VOLUME, "chunk {} has {} of {} blocks", cy, filled, CHUNK_VOLUME);
    }
    ensure!(cursor.is_empty(), "{} trailing bytes after column", cursor.remaining());
    Ok(())
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let Some(slice) = self.bytes.get(self.pos..end) else {
            bail!("unexpected end of data at byte {}", self.pos);
        };
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let Some(slice) = self.bytes.get(self.pos..end) else {
            bail!("record of {} bytes runs past end of file", len);
        };
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

fn parse_region(data: &[u8]) -> Result<BTreeMap<Slot, Vec<u8>>> {
    let mut cursor = ByteReader::new(data);
    ensure!(&cursor.take::<4>()? == MAGIC, "bad region magic");
    let count = cursor.u16()?;
    let mut records = BTreeMap::new();
    for _ in 0..count {
        let x = cursor.u8()?;
        let z = cursor.u8()?;
        let len = cursor.u32()? as usize;
        records.insert((x, z), cursor.bytes(len)?.to_vec());
    }
    Ok(records)
}

fn serialize_region(records: &BTreeMap<Slot, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + records.values().map(|r| r.len() + 6).sum::<usize>());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    for (&(x, z), record) in records {
        out.push(x);
        out.push(z);
        out.extend_from_slice(&(record.len() as u32).to_le_bytes());
        out.extend_from_slice(record);
    }
    out
}

// ── Store ────────────────────────────────────────────────────────────────────

/// [`GroupStore`] backed by region files.
///
/// Saves and loads run on worker threads; a per-region lock serializes the
/// read-modify-write of each file.
pub struct RegionStore {
    region_dir: PathBuf,
    locks: DashMap<RegionPos, Arc<Mutex<()>>>,
}

impl RegionStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let region_dir = dir.join("region");
        fs::create_dir_all(&region_dir)
            .with_context(|| format!("creating region directory {}", region_dir.display()))?;
        tracing::info!("Region store at {}", region_dir.display());
        Ok(Self {
            region_dir,
            locks: DashMap::new(),
        })
    }

    pub fn region_path(&self, region: RegionPos) -> PathBuf {
        self.region_dir.join(format!("r.{}.{}.sgr", region.x, region.z))
    }

    fn lock(&self, region: RegionPos) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(region).or_default())
    }

    fn read_records(&self, path: &Path) -> Result<BTreeMap<Slot, Vec<u8>>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        parse_region(&data).with_context(|| format!("parsing {}", path.display()))
    }

    fn try_load(&self, pos: ColumnPos, body: &mut GroupBody) -> Result<bool> {
        let region = pos.region();
        let path = self.region_path(region);
        let lock = self.lock(region);
        let records = {
            let _guard = lock.lock();
            self.read_records(&path)?
        };
        let Some(record) = records.get(&pos.region_slot()) else {
            return Ok(false);
        };
        decode_column(record, body).with_context(|| format!("decoding column ({}, {})", pos.x, pos.z))?;
        Ok(true)
    }

    fn try_save(&self, pos: ColumnPos, body: &GroupBody) -> Result<()> {
        let start = Instant::now();
        let record = encode_column(body)?;
        let region = pos.region();
        let path = self.region_path(region);
        let lock = self.lock(region);
        let _guard = lock.lock();

        let mut records = match self.read_records(&path) {
            Ok(records) => records,
            Err(e) => {
                // Keep the unreadable file for inspection and start the region over.
                let aside = path.with_extension("sgr.corrupt");
                tracing::warn!("Region r.{}.{} unreadable, moving it to {}: {:#}", region.x, region.z, aside.display(), e);
                fs::rename(&path, &aside).with_context(|| format!("moving aside {}", path.display()))?;
                BTreeMap::new()
            }
        };
        records.insert(pos.region_slot(), record);
        let tmp = path.with_extension("sgr.tmp");
        fs::write(&tmp, serialize_region(&records)).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;

        tracing::debug!(
            "Saved column ({}, {}) to r.{}.{} ({} columns in region, {:.2?})",
            pos.x,
            pos.z,
            region.x,
            region.z,
            records.len(),
            start.elapsed()
        );
        Ok(())
    }
}

impl GroupStore for RegionStore {
    fn load(&self, pos: ColumnPos, body: &mut GroupBody) -> bool {
        match self.try_load(pos, body) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Failed to load column ({}, {}), regenerating: {:#}", pos.x, pos.z, e);
                body.reset();
                false
            }
        }
    }

    fn save(&self, pos: ColumnPos, body: &GroupBody) {
        if let Err(e) = self.try_save(pos, body) {
            tracing::warn!("Failed to save column ({}, {}): {:#}", pos.x, pos.z, e);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("strata_test_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn sample_body() -> GroupBody {
        let mut body = GroupBody::new();
        for x in 0..16 {
            for z in 0..16 {
                body.set(x, 0, z, BlockId::BEDROCK);
                for y in 1..40 {
                    body.set(x, y, z, BlockId::STONE);
                }
                body.set(x, 40, z, BlockId::GRASS);
            }
        }
        body.set(3, 41, 3, BlockId::LANTERN);
        body.set(15, 127, 15, BlockId::GLASS);
        body
    }

    #[test]
    fn test_runs_collapse_uniform_data() {
        let blocks = [BlockId::AIR; CHUNK_VOLUME];
        let runs = encode_runs(&blocks);
        assert_eq!(runs, vec![Run { block: 0, len: CHUNK_VOLUME as u16 }]);

        let mut mixed = vec![BlockId::STONE; 3];
        mixed.push(BlockId::AIR);
        mixed.push(BlockId::STONE);
        let runs = encode_runs(&mixed);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], Run { block: BlockId::STONE.0, len: 3 });
    }

    #[test]
    fn test_column_record_roundtrip() {
        let body = sample_body();
        let record = encode_column(&body).unwrap();
        let mut back = GroupBody::new();
        decode_column(&record, &mut back).unwrap();
        for cy in 0..WORLD_CHUNK_HEIGHT as usize {
            assert_eq!(back.chunks[cy].blocks()[..], body.chunks[cy].blocks()[..], "chunk {}", cy);
        }
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let record = encode_column(&sample_body()).unwrap();
        let mut back = GroupBody::new();
        assert!(decode_column(&record[..record.len() / 2], &mut back).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = temp_dir("roundtrip");
        let store = RegionStore::open(&dir).unwrap();
        let body = sample_body();

        store.save(ColumnPos::new(-1, 33), &body);
        store.save(ColumnPos::new(-2, 33), &GroupBody::new());
        assert!(dir.join("region/r.-1.1.sgr").exists());

        let mut loaded = GroupBody::new();
        assert!(store.load(ColumnPos::new(-1, 33), &mut loaded));
        assert_eq!(loaded.get(3, 41, 3), BlockId::LANTERN);
        assert_eq!(loaded.get(15, 127, 15), BlockId::GLASS);
        assert_eq!(loaded.get(7, 20, 7), BlockId::STONE);
        assert_eq!(loaded.get(7, 60, 7), BlockId::AIR);

        // Same region, different slot: the first record survives.
        let mut empty = sample_body();
        assert!(store.load(ColumnPos::new(-2, 33), &mut empty));
        assert!(empty.chunks.iter().all(|c| c.is_empty()));

        let mut missing = GroupBody::new();
        assert!(!store.load(ColumnPos::new(0, 0), &mut missing));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_region_is_replaced_on_save() {
        let dir = temp_dir("corrupt");
        let store = RegionStore::open(&dir).unwrap();
        let pos = ColumnPos::new(4, 4);
        fs::write(store.region_path(pos.region()), b"SGR1\x01\x00garbage").unwrap();

        let mut body = sample_body();
        assert!(!store.load(pos, &mut body));
        assert!(body.chunks.iter().all(|c| c.is_empty()));

        // Saving moves the corrupt file aside and starts a fresh region.
        store.save(pos, &sample_body());
        let path = store.region_path(pos.region());
        assert_eq!(fs::read(path.with_extension("sgr.corrupt")).unwrap(), b"SGR1\x01\x00garbage");
        let mut again = GroupBody::new();
        assert!(store.load(pos, &mut again));
        assert_eq!(again.get(3, 41, 3), BlockId::LANTERN);

        // Neighbours in the same region can be saved again too.
        let neighbour = ColumnPos::new(5, 4);
        store.save(neighbour, &GroupBody::new());
        assert!(store.load(pos, &mut again));
        assert!(store.load(neighbour, &mut GroupBody::new()));

        let _ = fs::remove_dir_all(&dir);
    }
}
