//! Single-worker task manager.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::algo::progress::{ProgressSnapshot, ProgressState};
use crate::error::{MeshError, Result};

use super::{Task, TaskEngine};

/// The task currently being processed, as seen by the interactive thread.
struct ActiveSlot {
    name: String,
    progress: Arc<ProgressState>,
    detail: Option<Arc<ProgressState>>,
}

/// State shared between a manager and its worker.
///
/// The three mutexes are only ever taken one at a time and never held
/// while running an engine or notifying the worker.
struct Shared<T> {
    pending: Mutex<VecDeque<T>>,
    wake: Condvar,
    active: Mutex<Option<ActiveSlot>>,
    completed: Mutex<Vec<T>>,
    /// Tasks submitted but not yet in the completed buffer.
    in_flight: AtomicUsize,
    /// Bumped under the queue lock each time the queue is cleared.
    clear_generation: AtomicUsize,
    stop: AtomicBool,
}

impl<T> Shared<T> {
    /// Block until a task is available. Returns None once stopping.
    ///
    /// Also returns the clear generation seen when the task was dequeued.
    fn next_task(&self) -> Option<(T, usize)> {
        let mut pending = self.pending.lock();
        loop {
            if self.stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = pending.pop_front() {
                return Some((task, self.clear_generation.load(Ordering::Acquire)));
            }
            self.wake.wait(&mut pending);
        }
    }

    fn cancel_active(&self) {
        if let Some(active) = self.active.lock().as_ref() {
            active.progress.cancel();
        }
    }

    /// Drop every queued task. Returns how many were removed.
    fn clear_pending(&self) -> usize {
        let removed = {
            let mut pending = self.pending.lock();
            let removed = pending.len();
            pending.clear();
            self.clear_generation.fetch_add(1, Ordering::AcqRel);
            removed
        };
        self.in_flight.fetch_sub(removed, Ordering::AcqRel);
        removed
    }
}

/// Runs tasks of one engine on a dedicated worker thread.
///
/// Tasks are processed one at a time in submission order. All methods take
/// `&self` and never wait for the worker, except [`TaskManager::shutdown`].
pub struct TaskManager<E: TaskEngine> {
    engine: Arc<E>,
    shared: Arc<Shared<E::Task>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E: TaskEngine> TaskManager<E> {
    /// Create a manager and start its worker thread.
    pub fn new(engine: E) -> Result<Self> {
        let engine = Arc::new(engine);
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            wake: Condvar::new(),
            active: Mutex::new(None),
            completed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            clear_generation: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        });

        let worker = {
            let engine = Arc::clone(&engine);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("meshwork-{}", engine.label()))
                .spawn(move || worker_loop(engine, shared))?
        };

        Ok(Self {
            engine,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The engine this manager runs.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Queue a task and wake the worker.
    ///
    /// Tasks submitted after [`TaskManager::shutdown`] are dropped.
    pub fn submit(&self, task: E::Task) {
        let name = task.display_name().to_owned();
        {
            // Checked under the queue lock so shutdown cannot miss the task.
            let mut pending = self.shared.pending.lock();
            if self.shared.stop.load(Ordering::Acquire) {
                drop(pending);
                log::warn!("[{}] {} manager is shut down, dropping task", name, self.engine.label());
                return;
            }
            self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
            pending.push_back(task);
        }
        log::debug!("[{}] queued {} task", name, self.engine.label());
        self.shared.wake.notify_one();
    }

    /// Apply every finished task to `target`. Call once per frame.
    ///
    /// Cancelled and errored tasks are discarded. Returns the number of
    /// results applied.
    pub fn drain_completed(&self, target: &mut E::Target) -> usize {
        let finished = std::mem::take(&mut *self.shared.completed.lock());

        let mut applied = 0;
        for task in finished {
            let progress = task.progress();
            if progress.is_cancelled() {
                log::debug!("[{}] discarding cancelled {} task", task.display_name(), self.engine.label());
                continue;
            }
            if progress.is_errored() {
                continue;
            }
            if self.engine.apply(task, target) {
                applied += 1;
            }
        }
        applied
    }

    /// Cancel the active task and drop all queued ones.
    ///
    /// Does not wait: the active task stops at its next cancellation check
    /// and is then discarded by [`TaskManager::drain_completed`].
    pub fn cancel_all(&self) {
        let removed = self.shared.clear_pending();
        self.shared.cancel_active();
        if removed > 0 {
            log::debug!("{} manager dropped {} queued tasks", self.engine.label(), removed);
        }
    }

    /// Whether a task is being processed.
    pub fn is_busy(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Whether every submitted task has reached the completed buffer.
    pub fn is_idle(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == 0
    }

    /// Progress of the active task.
    pub fn progress_snapshot(&self) -> Option<ProgressSnapshot> {
        self.shared.active.lock().as_ref().map(|a| a.progress.snapshot())
    }

    /// Progress of the active task's current step, for tasks that report one.
    pub fn detail_snapshot(&self) -> Option<ProgressSnapshot> {
        self.shared
            .active
            .lock()
            .as_ref()
            .and_then(|a| a.detail.as_ref().map(|d| d.snapshot()))
    }

    /// Display name of the active task.
    pub fn active_name(&self) -> Option<String> {
        self.shared.active.lock().as_ref().map(|a| a.name.clone())
    }

    /// Number of tasks waiting to start.
    pub fn queued_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Number of finished tasks waiting to be drained.
    pub fn completed_count(&self) -> usize {
        self.shared.completed.lock().len()
    }

    /// Stop the worker: cancel the active task, drop queued ones and join.
    ///
    /// Safe to call more than once; also run on drop.
    pub fn shutdown(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);
        self.shared.cancel_active();
        self.shared.clear_pending();
        self.shared.wake.notify_all();

        if handle.join().is_err() {
            log::error!("{} worker thread panicked", self.engine.label());
        }
        log::debug!("{} manager shut down", self.engine.label());
    }
}

impl<E: TaskEngine> Drop for TaskManager<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<E: TaskEngine>(engine: Arc<E>, shared: Arc<Shared<E::Task>>) {
    log::debug!("{} worker started", engine.label());

    while let Some((mut task, generation)) = shared.next_task() {
        let name = task.display_name().to_owned();
        let progress = Arc::clone(task.progress());
        // Show 0% before the task becomes visible as active.
        progress.begin();
        *shared.active.lock() = Some(ActiveSlot {
            name: name.clone(),
            progress: Arc::clone(&progress),
            detail: task.detail_progress().cloned(),
        });
        // A clear between dequeue and publication missed this task.
        if shared.clear_generation.load(Ordering::Acquire) != generation {
            progress.cancel();
        }

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.run(&mut task)));
        match outcome {
            Ok(Ok(())) if progress.is_cancelled() => {
                log::info!("[{}] {} cancelled", name, engine.label());
            }
            Ok(Ok(())) => {
                progress.complete();
                log::info!("[{}] {} finished in {:.2?}", name, engine.label(), start.elapsed());
            }
            Ok(Err(err)) => {
                log::error!("[{}] {} error: {}", name, engine.label(), err);
                progress.mark_errored();
            }
            Err(payload) => {
                let err = MeshError::TaskPanicked {
                    task: name.clone(),
                    message: panic_message(payload.as_ref()),
                };
                log::error!("{} {}", engine.label(), err);
                progress.mark_errored();
            }
        }

        *shared.active.lock() = None;
        shared.completed.lock().push(task);
        shared.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    log::debug!("{} worker stopped", engine.label());
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::progress::SIMPLIFY_PHASES;
    use crate::task::TaskStatus;
    use std::time::Duration;

    enum Behavior {
        Quick,
        /// Run until released or cancelled.
        Block(Arc<AtomicBool>),
        Fail,
        Panic,
    }

    struct TestTask {
        name: String,
        behavior: Behavior,
        progress: Arc<ProgressState>,
    }

    impl TestTask {
        fn new(name: &str, behavior: Behavior) -> Self {
            Self {
                name: name.to_owned(),
                behavior,
                progress: Arc::new(ProgressState::new(SIMPLIFY_PHASES)),
            }
        }
    }

    impl Task for TestTask {
        fn progress(&self) -> &Arc<ProgressState> {
            &self.progress
        }

        fn display_name(&self) -> &str {
            &self.name
        }
    }

    struct TestEngine;

    impl TaskEngine for TestEngine {
        type Task = TestTask;
        type Target = Vec<String>;

        fn label(&self) -> &'static str {
            "test"
        }

        fn run(&self, task: &mut TestTask) -> Result<()> {
            task.progress.set_phase(1);
            match &task.behavior {
                Behavior::Quick => Ok(()),
                Behavior::Block(release) => {
                    while !release.load(Ordering::Acquire) && !task.progress.is_cancelled() {
                        task.progress.update_phase(0.5);
                        thread::sleep(Duration::from_millis(1));
                    }
                    Ok(())
                }
                Behavior::Fail => Err(MeshError::invalid_param("behavior", "fail", "requested")),
                Behavior::Panic => panic!("engine exploded"),
            }
        }

        fn apply(&self, task: TestTask, target: &mut Vec<String>) -> bool {
            target.push(task.name);
            true
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_tasks_applied_in_order() {
        let manager = TaskManager::new(TestEngine).unwrap();
        for name in ["a", "b", "c"] {
            manager.submit(TestTask::new(name, Behavior::Quick));
        }
        wait_until(|| manager.is_idle());

        let mut applied = Vec::new();
        assert_eq!(manager.drain_completed(&mut applied), 3);
        assert_eq!(applied, vec!["a", "b", "c"]);

        // The buffer is empty after a drain.
        assert_eq!(manager.drain_completed(&mut applied), 0);
    }

    #[test]
    fn test_active_task_introspection() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let release = Arc::new(AtomicBool::new(false));
        manager.submit(TestTask::new("slow", Behavior::Block(Arc::clone(&release))));
        manager.submit(TestTask::new("next", Behavior::Quick));

        wait_until(|| manager.progress_snapshot().is_some_and(|s| s.phase == 1));
        assert!(manager.is_busy());
        assert!(!manager.is_idle());
        assert_eq!(manager.active_name().as_deref(), Some("slow"));
        assert_eq!(manager.queued_count(), 1);
        assert!(manager.detail_snapshot().is_none());

        release.store(true, Ordering::Release);
        wait_until(|| manager.is_idle());
        assert!(!manager.is_busy());
        assert!(manager.progress_snapshot().is_none());
        assert_eq!(manager.completed_count(), 2);
    }

    #[test]
    fn test_cancel_all() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let release = Arc::new(AtomicBool::new(false));
        let blocker = TestTask::new("blocker", Behavior::Block(release));
        let blocker_progress = Arc::clone(&blocker.progress);
        manager.submit(blocker);
        manager.submit(TestTask::new("queued-1", Behavior::Quick));
        manager.submit(TestTask::new("queued-2", Behavior::Quick));

        wait_until(|| manager.is_busy());
        manager.cancel_all();
        assert_eq!(manager.queued_count(), 0);

        wait_until(|| manager.is_idle());
        assert_eq!(TaskStatus::of(&blocker_progress), TaskStatus::Cancelled);

        let mut applied = Vec::new();
        assert_eq!(manager.drain_completed(&mut applied), 0);
        assert!(applied.is_empty());
    }

    #[test]
    fn test_cancelled_before_start_is_discarded() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let task = TestTask::new("early", Behavior::Quick);
        task.progress.cancel();
        manager.submit(task);
        manager.submit(TestTask::new("kept", Behavior::Quick));
        wait_until(|| manager.is_idle());

        let mut applied = Vec::new();
        assert_eq!(manager.drain_completed(&mut applied), 1);
        assert_eq!(applied, vec!["kept"]);
    }

    #[test]
    fn test_failures_become_errored() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let failing = TestTask::new("fail", Behavior::Fail);
        let panicking = TestTask::new("panic", Behavior::Panic);
        let fail_progress = Arc::clone(&failing.progress);
        let panic_progress = Arc::clone(&panicking.progress);

        manager.submit(failing);
        manager.submit(panicking);
        manager.submit(TestTask::new("after", Behavior::Quick));
        wait_until(|| manager.is_idle());

        assert_eq!(TaskStatus::of(&fail_progress), TaskStatus::Errored);
        assert_eq!(TaskStatus::of(&panic_progress), TaskStatus::Errored);

        // The worker survives a panicking engine.
        let mut applied = Vec::new();
        assert_eq!(manager.drain_completed(&mut applied), 1);
        assert_eq!(applied, vec!["after"]);
    }

    #[test]
    fn test_completed_progress_is_full() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let task = TestTask::new("done", Behavior::Quick);
        let progress = Arc::clone(&task.progress);
        manager.submit(task);
        wait_until(|| manager.is_idle());

        let snap = progress.snapshot();
        assert!(snap.completed);
        assert_eq!(snap.total_fraction, 1.0);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let manager = TaskManager::new(TestEngine).unwrap();
        let release = Arc::new(AtomicBool::new(false));
        manager.submit(TestTask::new("blocker", Behavior::Block(release)));
        manager.submit(TestTask::new("queued", Behavior::Quick));
        wait_until(|| manager.is_busy());

        manager.shutdown();
        manager.shutdown();
        assert!(manager.is_idle());
        assert!(!manager.is_busy());

        manager.submit(TestTask::new("late", Behavior::Quick));
        assert_eq!(manager.queued_count(), 0);

        let mut applied = Vec::new();
        assert_eq!(manager.drain_completed(&mut applied), 0);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
