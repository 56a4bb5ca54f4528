//! Work shipped to the scheduler and the results shipped back.
//!
//! A job owns everything it touches: group bodies are moved in and handed
//! back by the matching [`JobDone`], mesh jobs get a copied snapshot.

use std::sync::Arc;

use super::group::{GroupBody, GroupKey};
use super::position::ColumnPos;
use crate::collab::Collaborators;
use crate::light::{self, LightQueues};
use crate::mesh::{ChunkMesh, MeshInput};
use crate::sched::Task;

pub enum WorldJob {
    /// Load the column from the store, or generate it.
    Generate {
        key: GroupKey,
        pos: ColumnPos,
        body: Box<GroupBody>,
        collab: Arc<Collaborators>,
    },
    Preprocess { key: GroupKey, body: Box<GroupBody> },
    BuildMesh {
        key: GroupKey,
        cy: i32,
        input: Box<MeshInput>,
        collab: Arc<Collaborators>,
    },
    Save {
        key: GroupKey,
        pos: ColumnPos,
        body: Box<GroupBody>,
        collab: Arc<Collaborators>,
    },
}

pub enum JobDone {
    Generated {
        key: GroupKey,
        body: Box<GroupBody>,
        from_store: bool,
    },
    Preprocessed { key: GroupKey, body: Box<GroupBody> },
    Meshed { key: GroupKey, cy: i32, mesh: ChunkMesh },
    Saved {
        key: GroupKey,
        pos: ColumnPos,
        body: Box<GroupBody>,
    },
}

impl Task for WorldJob {
    type Output = JobDone;

    fn run(self) -> JobDone {
        match self {
            WorldJob::Generate { key, pos, mut body, collab } => {
                let from_store = collab.store.load(pos, &mut body);
                if !from_store {
                    body.reset();
                    collab.generator.generate(pos, &mut body);
                }
                body.recompute_surfaces();
                tracing::trace!("generated ({}, {}) from_store={}", pos.x, pos.z, from_store);
                JobDone::Generated { key, body, from_store }
            }
            WorldJob::Preprocess { key, mut body } => {
                light::preprocess(&mut body, &mut LightQueues::new());
                JobDone::Preprocessed { key, body }
            }
            WorldJob::BuildMesh { key, cy, input, collab } => {
                let mesh = collab.mesher.build(&input);
                JobDone::Meshed { key, cy, mesh }
            }
            WorldJob::Save { key, pos, body, collab } => {
                collab.store.save(pos, &body);
                tracing::trace!("saved ({}, {})", pos.x, pos.z);
                JobDone::Saved { key, pos, body }
            }
        }
    }
}
