//! Subdivision tasks.

use std::sync::Arc;

use crate::algo::progress::{ProgressState, SUBDIVISION_PHASES};
use crate::algo::subdivide::{subdivide_with_progress, SubdivideOptions};
use crate::error::Result;
use crate::mesh::Mesh;
use crate::scene::ObjectHandle;

use super::{Task, TaskEngine};

/// Receives subdivided meshes on the interactive thread.
pub trait SubdivisionTarget {
    /// Replace the mesh of `object`. Returns false if the object is gone.
    fn apply_subdivided_mesh(&mut self, object: ObjectHandle, mesh: Mesh) -> bool;
}

/// Subdivide one object's mesh in the background.
#[derive(Debug)]
pub struct SubdivisionTask {
    /// Object receiving the result.
    pub object: ObjectHandle,
    /// Display name.
    pub name: String,
    /// Copy of the mesh to subdivide.
    pub input: Mesh,
    /// Scheme and parameters.
    pub options: SubdivideOptions,
    result: Option<Mesh>,
    progress: Arc<ProgressState>,
}

impl SubdivisionTask {
    /// Create a task for `object`.
    pub fn new(
        object: ObjectHandle,
        name: impl Into<String>,
        input: Mesh,
        options: SubdivideOptions,
    ) -> Self {
        Self {
            object,
            name: name.into(),
            input,
            options,
            result: None,
            progress: Arc::new(ProgressState::new(SUBDIVISION_PHASES)),
        }
    }

    /// The subdivided mesh, once the task has run.
    pub fn result(&self) -> Option<&Mesh> {
        self.result.as_ref()
    }
}

impl Task for SubdivisionTask {
    fn progress(&self) -> &Arc<ProgressState> {
        &self.progress
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Runs [`SubdivisionTask`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubdivisionEngine;

impl TaskEngine for SubdivisionEngine {
    type Task = SubdivisionTask;
    type Target = dyn SubdivisionTarget;

    fn label(&self) -> &'static str {
        "subdivision"
    }

    fn run(&self, task: &mut SubdivisionTask) -> Result<()> {
        let mesh = subdivide_with_progress(&task.input, &task.options, &task.progress)?;
        if !task.progress.is_cancelled() {
            log::debug!(
                "[{}] subdivided {} -> {} triangles",
                task.name,
                task.input.num_triangles(),
                mesh.num_triangles()
            );
            task.result = Some(mesh);
        }
        Ok(())
    }

    fn apply(&self, task: SubdivisionTask, target: &mut Self::Target) -> bool {
        match task.result {
            Some(mesh) => target.apply_subdivided_mesh(task.object, mesh),
            None => false,
        }
    }
}
