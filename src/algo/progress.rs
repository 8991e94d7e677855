//! Progress reporting and cooperative cancellation for long-running algorithms.
//!
//! A [`ProgressState`] is shared (behind an `Arc`) between the worker thread
//! running an algorithm and the interactive thread displaying its progress.
//! Every field is an independent atomic updated with relaxed ordering, so
//! neither side ever blocks. A reader may observe fields from slightly
//! different moments (say, a new phase index with the previous phase
//! fraction); that tearing is tolerated because the values only drive a
//! progress display.
//!
//! # Phases
//!
//! Work is split into numbered phases `1..=total_phases`; phase 0 means
//! "not started". The aggregate fraction is
//! `(phase - 1) / total_phases + phase_fraction / total_phases`, clamped to
//! `[0, 1]`, and never decreases until the tracker is reset.
//!
//! # Cancellation
//!
//! [`ProgressState::cancel`] only raises a flag. Algorithms poll
//! [`ProgressState::is_cancelled`] at their checkpoints and stop at the next
//! one, so cancellation takes effect after a bounded amount of work per
//! poll, not immediately.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use meshwork::algo::progress::{ProgressState, SUBDIVISION_PHASES};
//!
//! let progress = Arc::new(ProgressState::new(SUBDIVISION_PHASES));
//! progress.set_phase(1);
//! progress.update_phase(0.5);
//! assert!((progress.total_fraction() - 0.5 / 8.0).abs() < 1e-6);
//!
//! progress.complete();
//! assert_eq!(progress.snapshot().total_fraction, 1.0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Phase labels for subdivision. Index 0 is the idle label.
pub const SUBDIVISION_PHASES: &[&str] = &[
    "Starting...",
    "Welding vertices",
    "Computing face normals",
    "Building adjacency",
    "Detecting sharp edges",
    "Repositioning vertices",
    "Creating edge vertices",
    "Generating triangles",
    "Recomputing normals",
];

/// Phase labels for a single simplification run.
pub const SIMPLIFY_PHASES: &[&str] = &["Starting...", "Collapsing edges"];

/// Phase labels for LOD chain generation.
pub const LOD_PHASES: &[&str] = &[
    "Starting...",
    "Generating LOD 1",
    "Generating LOD 2",
    "Generating LOD 3",
    "Generating LOD 4",
    "Generating LOD 5",
    "Finalizing...",
];

/// Lock-free progress and cancellation state shared across threads.
#[derive(Debug)]
pub struct ProgressState {
    phase: AtomicUsize,
    // f32 bit patterns
    phase_fraction: AtomicU32,
    total_fraction: AtomicU32,
    completed: AtomicBool,
    cancelled: AtomicBool,
    errored: AtomicBool,
    phase_names: &'static [&'static str],
    parent: Option<Arc<ProgressState>>,
}

/// A plain copy of a [`ProgressState`] taken at one moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Current phase (0 = not started).
    pub phase: usize,
    /// Fraction of the current phase, in `[0, 1]`.
    pub phase_fraction: f32,
    /// Aggregate fraction, in `[0, 1]`.
    pub total_fraction: f32,
    /// Number of phases.
    pub total_phases: usize,
    /// Label of the current phase.
    pub phase_name: &'static str,
    /// The work finished successfully.
    pub completed: bool,
    /// Cancellation was requested.
    pub cancelled: bool,
    /// The work failed.
    pub errored: bool,
}

impl ProgressState {
    /// Create a tracker with the given phase labels.
    ///
    /// `phase_names[0]` labels the not-started state; the number of phases is
    /// `phase_names.len() - 1`.
    pub fn new(phase_names: &'static [&'static str]) -> Self {
        Self {
            phase: AtomicUsize::new(0),
            phase_fraction: AtomicU32::new(0.0_f32.to_bits()),
            total_fraction: AtomicU32::new(0.0_f32.to_bits()),
            completed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            errored: AtomicBool::new(false),
            phase_names,
            parent: None,
        }
    }

    /// Create a tracker nested inside `parent`.
    ///
    /// The nested tracker reports cancelled whenever the parent is cancelled,
    /// so cancelling the outer task also stops the inner algorithm.
    pub fn nested(parent: &Arc<ProgressState>, phase_names: &'static [&'static str]) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            ..Self::new(phase_names)
        }
    }

    /// Number of phases.
    pub fn total_phases(&self) -> usize {
        self.phase_names.len().saturating_sub(1).max(1)
    }

    /// Reset phase and fractions to the not-started state.
    ///
    /// Cancellation and terminal flags are kept, so a task cancelled while
    /// still queued stops at its first checkpoint.
    pub fn begin(&self) {
        self.phase.store(0, Ordering::Relaxed);
        self.phase_fraction.store(0.0_f32.to_bits(), Ordering::Relaxed);
        self.total_fraction.store(0.0_f32.to_bits(), Ordering::Relaxed);
    }

    /// Reset every field, including cancellation and terminal flags.
    ///
    /// Only used to reuse a tracker for a fresh run.
    pub fn reset(&self) {
        self.begin();
        self.completed.store(false, Ordering::Relaxed);
        self.cancelled.store(false, Ordering::Relaxed);
        self.errored.store(false, Ordering::Relaxed);
    }

    /// Enter phase `phase` (1-based) with zero phase fraction.
    pub fn set_phase(&self, phase: usize) {
        self.phase.store(phase, Ordering::Relaxed);
        self.phase_fraction.store(0.0_f32.to_bits(), Ordering::Relaxed);
        self.raise_total(self.base_fraction(phase));
    }

    /// Record the fraction of the current phase that is done.
    pub fn update_phase(&self, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.phase_fraction.store(fraction.to_bits(), Ordering::Relaxed);
        let phase = self.phase.load(Ordering::Relaxed);
        self.raise_total(self.base_fraction(phase) + fraction / self.total_phases() as f32);
    }

    /// Mark the work as finished: total fraction becomes exactly 1.
    pub fn complete(&self) {
        self.phase_fraction.store(1.0_f32.to_bits(), Ordering::Relaxed);
        self.total_fraction.store(1.0_f32.to_bits(), Ordering::Relaxed);
        self.completed.store(true, Ordering::Release);
    }

    /// Mark the work as failed.
    pub fn mark_errored(&self) {
        self.errored.store(true, Ordering::Release);
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested on this tracker or its parent.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Whether the work finished successfully.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether the work failed.
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// Current phase.
    pub fn phase(&self) -> usize {
        self.phase.load(Ordering::Relaxed)
    }

    /// Aggregate fraction.
    pub fn total_fraction(&self) -> f32 {
        f32::from_bits(self.total_fraction.load(Ordering::Relaxed))
    }

    /// Label of the current phase.
    pub fn phase_name(&self) -> &'static str {
        self.phase_names
            .get(self.phase())
            .copied()
            .unwrap_or("Unknown")
    }

    /// Copy every field.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase(),
            phase_fraction: f32::from_bits(self.phase_fraction.load(Ordering::Relaxed)),
            total_fraction: self.total_fraction(),
            total_phases: self.total_phases(),
            phase_name: self.phase_name(),
            completed: self.is_completed(),
            cancelled: self.is_cancelled(),
            errored: self.is_errored(),
        }
    }

    fn base_fraction(&self, phase: usize) -> f32 {
        phase.saturating_sub(1) as f32 / self.total_phases() as f32
    }

    fn raise_total(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        // Non-negative f32 bit patterns order the same way as their values.
        self.total_fraction.fetch_max(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new(SIMPLIFY_PHASES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_arithmetic() {
        let p = ProgressState::new(SUBDIVISION_PHASES);
        assert_eq!(p.total_phases(), 8);
        assert_eq!(p.phase_name(), "Starting...");

        p.set_phase(3);
        assert!((p.total_fraction() - 2.0 / 8.0).abs() < 1e-6);
        p.update_phase(0.5);
        assert!((p.total_fraction() - 2.5 / 8.0).abs() < 1e-6);
        assert_eq!(p.phase_name(), "Building adjacency");
    }

    #[test]
    fn test_total_is_monotonic() {
        let p = ProgressState::new(LOD_PHASES);
        p.set_phase(2);
        p.update_phase(0.8);
        let before = p.total_fraction();

        // Going back to an earlier phase never lowers the aggregate.
        p.set_phase(1);
        assert_eq!(p.total_fraction(), before);
        p.update_phase(2.0);
        assert!(p.total_fraction() <= 1.0);
    }

    #[test]
    fn test_complete_is_exactly_one() {
        let p = ProgressState::new(SIMPLIFY_PHASES);
        p.set_phase(1);
        p.update_phase(0.99);
        assert!(!p.is_completed());
        p.complete();
        let snap = p.snapshot();
        assert!(snap.completed);
        assert_eq!(snap.total_fraction, 1.0);
    }

    #[test]
    fn test_begin_keeps_cancellation() {
        let p = ProgressState::new(SUBDIVISION_PHASES);
        p.set_phase(4);
        p.cancel();
        p.begin();
        assert_eq!(p.phase(), 0);
        assert_eq!(p.total_fraction(), 0.0);
        assert!(p.is_cancelled());

        p.reset();
        assert!(!p.is_cancelled());
    }

    #[test]
    fn test_nested_sees_parent_cancellation() {
        let outer = Arc::new(ProgressState::new(LOD_PHASES));
        let inner = ProgressState::nested(&outer, SIMPLIFY_PHASES);
        assert!(!inner.is_cancelled());

        outer.cancel();
        assert!(inner.is_cancelled());
        // A reset of the inner tracker cannot clear the outer request.
        inner.reset();
        assert!(inner.is_cancelled());
    }

    #[test]
    fn test_unknown_phase_name() {
        let p = ProgressState::new(SIMPLIFY_PHASES);
        p.set_phase(7);
        assert_eq!(p.phase_name(), "Unknown");
        assert_eq!(p.total_fraction(), 1.0);
    }
}
