//! Incremental light propagation.
//!
//! Two channels are tracked per block: sunlight and block light. Both use the
//! same breadth-first scatter and two-queue removal; sunlight additionally
//! treats every cell at or above its column's surface as fully lit without
//! storing anything there.
//!
//! The algorithms are written against [`LightField`] so the same code runs on
//! a detached group body inside a worker job and on the live world during
//! edits and boundary stitching.

mod preprocess;
mod propagate;

use std::collections::VecDeque;

use crate::world::block::BlockId;
use crate::world::chunk::LightChannel;
use crate::world::position::LocalPos;

pub use preprocess::preprocess;
pub use propagate::{relight_edit, remove, scatter};

/// Brightest light value.
pub const MAX_LIGHT: u8 = 15;
/// Darkness. Stored light never goes below this.
pub const MIN_LIGHT: u8 = 1;

/// A writable view of blocks and light.
///
/// Positions outside the view (unloaded columns, below the floor, above the
/// ceiling) report `None` from [`LightField::block`] and are never read or
/// written through the other methods.
pub trait LightField {
    fn block(&self, pos: LocalPos) -> Option<BlockId>;

    fn stored(&self, channel: LightChannel, pos: LocalPos) -> u8;

    fn store(&mut self, channel: LightChannel, pos: LocalPos, value: u8);

    /// Surface height of the column containing `pos`.
    fn surface(&self, pos: LocalPos) -> i32;

    /// Rescan the column containing `pos`. Returns `(old, new)` heights.
    fn recompute_surface(&mut self, pos: LocalPos) -> (i32, i32);
}

/// Effective light at `pos`, or `None` outside the field.
#[inline]
pub fn current<F: LightField + ?Sized>(field: &F, channel: LightChannel, pos: LocalPos) -> Option<u8> {
    field.block(pos)?;
    if channel == LightChannel::Sun && pos.y >= field.surface(pos) {
        return Some(MAX_LIGHT);
    }
    Some(field.stored(channel, pos))
}

/// Reusable BFS buffers.
#[derive(Debug, Default)]
pub struct LightQueues {
    pub scatter: VecDeque<LocalPos>,
    pub removal: VecDeque<(LocalPos, u8)>,
}

impl LightQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.scatter.is_empty() && self.removal.is_empty()
    }
}
