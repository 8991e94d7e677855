//! LOD generation tasks.

use std::sync::Arc;

use crate::algo::lod::{generate_lod_chain, LodChain, LodLevel, LodOptions};
use crate::algo::progress::{ProgressState, LOD_PHASES, SIMPLIFY_PHASES};
use crate::error::Result;
use crate::mesh::Mesh;
use crate::scene::ObjectHandle;

use super::{Task, TaskEngine};

/// Receives LOD chains on the interactive thread.
pub trait LodTarget {
    /// Install `levels` on `object`. Returns false if the object is gone.
    fn apply_lod_levels(&mut self, object: ObjectHandle, levels: LodChain) -> bool;
}

/// Build the LOD chain of one object in the background.
#[derive(Debug)]
pub struct LodTask {
    /// Object receiving the chain.
    pub object: ObjectHandle,
    /// Display name.
    pub name: String,
    /// Copy of the full-detail mesh.
    pub input: Mesh,
    /// Levels to generate.
    pub options: LodOptions,
    result: LodChain,
    progress: Arc<ProgressState>,
    simplification: Arc<ProgressState>,
}

impl LodTask {
    /// Create a task for `object` with the default levels.
    pub fn new(object: ObjectHandle, name: impl Into<String>, input: Mesh) -> Self {
        let progress = Arc::new(ProgressState::new(LOD_PHASES));
        let simplification = Arc::new(ProgressState::nested(&progress, SIMPLIFY_PHASES));
        Self {
            object,
            name: name.into(),
            input,
            options: LodOptions::default(),
            result: Vec::new(),
            progress,
            simplification,
        }
    }

    /// Use custom levels.
    pub fn with_options(mut self, options: LodOptions) -> Self {
        self.options = options;
        self
    }

    /// Levels built so far.
    pub fn levels(&self) -> &[LodLevel] {
        &self.result
    }

    /// Tracker of the simplification run in progress.
    pub fn simplification_progress(&self) -> &Arc<ProgressState> {
        &self.simplification
    }
}

impl Task for LodTask {
    fn progress(&self) -> &Arc<ProgressState> {
        &self.progress
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn detail_progress(&self) -> Option<&Arc<ProgressState>> {
        Some(&self.simplification)
    }
}

/// Runs [`LodTask`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LodEngine;

impl TaskEngine for LodEngine {
    type Task = LodTask;
    type Target = dyn LodTarget;

    fn label(&self) -> &'static str {
        "lod"
    }

    fn run(&self, task: &mut LodTask) -> Result<()> {
        task.result = generate_lod_chain(
            &task.input,
            &task.options,
            &task.progress,
            &task.simplification,
        )?;
        let counts: Vec<usize> = task.result.iter().map(|l| l.triangle_count).collect();
        log::debug!("[{}] LOD triangle counts {:?}", task.name, counts);
        Ok(())
    }

    fn apply(&self, task: LodTask, target: &mut Self::Target) -> bool {
        target.apply_lod_levels(task.object, task.result)
    }
}
