//! Background task execution.
//!
//! Mesh operations that take longer than a frame run on a dedicated worker
//! thread owned by a [`TaskManager`]. The interactive thread submits tasks,
//! polls progress each frame and applies finished results with
//! [`TaskManager::drain_completed`]; it is the only thread that ever touches
//! the scene.
//!
//! # Structure
//!
//! A manager is generic over a [`TaskEngine`], which knows how to run one
//! task and how to apply one finished task to its target. Managers for
//! different engines run side by side, each processing its own queue one
//! task at a time in submission order.
//!
//! # Lifecycle
//!
//! ```text
//! Queued ──> Active ──> Completed
//!   │          ├──────> Cancelled
//!   │          └──────> Errored
//!   └──> (dropped by cancel_all)
//! ```
//!
//! Cancelled and errored tasks still reach the completed buffer but are
//! discarded by `drain_completed` without touching the target. Engine errors
//! and panics are logged and turned into the errored state; they never
//! propagate to the interactive thread.
//!
//! # Example
//!
//! ```
//! use meshwork::algo::subdivide::SubdivideOptions;
//! use meshwork::mesh::primitives;
//! use meshwork::scene::Scene;
//! use meshwork::task::{SubdivisionEngine, SubdivisionTask, TaskManager};
//! use meshwork::upload::HeadlessBackend;
//!
//! let mut scene: Scene<HeadlessBackend> = Scene::new();
//! let cube = scene.insert("cube", primitives::cube());
//!
//! let manager = TaskManager::new(SubdivisionEngine).unwrap();
//! let options = SubdivideOptions::new(1).with_crease_angle(30.0);
//! let mesh = scene.get(cube).unwrap().mesh.clone();
//! manager.submit(SubdivisionTask::new(cube, "cube", mesh, options));
//!
//! while !manager.is_idle() {
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! assert_eq!(manager.drain_completed(&mut scene), 1);
//! assert_eq!(scene.get(cube).unwrap().mesh.num_triangles(), 48);
//! ```

mod lod;
mod manager;
mod subdivision;

use std::sync::Arc;

use crate::algo::progress::ProgressState;
use crate::error::Result;

pub use lod::{LodEngine, LodTarget, LodTask};
pub use manager::TaskManager;
pub use subdivision::{SubdivisionEngine, SubdivisionTarget, SubdivisionTask};

/// Manager running subdivision tasks.
pub type SubdivisionManager = TaskManager<SubdivisionEngine>;

/// Manager running LOD generation tasks.
pub type LodManager = TaskManager<LodEngine>;

/// A unit of background work.
pub trait Task: Send + 'static {
    /// Tracker shared with the interactive thread.
    fn progress(&self) -> &Arc<ProgressState>;

    /// Name shown in progress displays and log messages.
    fn display_name(&self) -> &str;

    /// Finer-grained tracker for the step in progress, if the task has one.
    fn detail_progress(&self) -> Option<&Arc<ProgressState>> {
        None
    }

    /// Lifecycle state derived from the tracker.
    fn status(&self) -> TaskStatus {
        TaskStatus::of(self.progress())
    }
}

/// How to run and deliver one kind of task.
pub trait TaskEngine: Send + Sync + 'static {
    /// Task type this engine processes.
    type Task: Task;

    /// What finished tasks are applied to.
    type Target: ?Sized;

    /// Short name used for the worker thread and log messages.
    fn label(&self) -> &'static str;

    /// Run `task` on the worker thread.
    ///
    /// Implementations poll the task's tracker for cancellation and store
    /// their result in the task. Completion is recorded by the manager.
    fn run(&self, task: &mut Self::Task) -> Result<()>;

    /// Apply a completed task on the interactive thread.
    ///
    /// Returns false when the target no longer accepts the result.
    fn apply(&self, task: Self::Task, target: &mut Self::Target) -> bool;
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting in the queue.
    Queued,
    /// Being processed.
    Active,
    /// Finished with a result.
    Completed,
    /// Stopped on request; the result is discarded.
    Cancelled,
    /// The engine failed; the result is discarded.
    Errored,
}

impl TaskStatus {
    /// Derive the state from a tracker.
    pub fn of(progress: &ProgressState) -> Self {
        if progress.is_errored() {
            TaskStatus::Errored
        } else if progress.is_completed() {
            TaskStatus::Completed
        } else if progress.is_cancelled() {
            TaskStatus::Cancelled
        } else if progress.phase() > 0 {
            TaskStatus::Active
        } else {
            TaskStatus::Queued
        }
    }

    /// Whether the task will not change state any more.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Errored
        )
    }
}
