//! Streamable voxel world core.
//!
//! `world` holds the block store and the per-frame streaming controller,
//! `light` the incremental illumination, `sched` the worker pool. Terrain,
//! persistence and meshing are plugged in through `collab`.

pub mod collab;
pub mod config;
pub mod light;
pub mod mesh;
pub mod sched;
pub mod world;

pub use collab::Collaborators;
pub use config::{ConfigError, WorldConfig};
pub use world::{Aabb, EditOutcome, World, WorldError};
