//! Level-of-detail chains.
//!
//! A LOD chain is an ordered list of progressively simplified versions of a
//! mesh, highest detail first. Each level carries the projected size in
//! pixels above which it should be drawn; the renderer picks a level per
//! frame from the object's size on screen.
//!
//! # Generation
//!
//! [`generate_lod_chain`] keeps the input as level 0 and runs the QEM
//! simplifier once per configured ratio, always starting from the full
//! input so errors do not accumulate from level to level. Targets below 4
//! triangles are skipped, so small meshes produce short chains.
//!
//! # Selection
//!
//! [`select_lod`] moves between levels with a hysteresis band around each
//! threshold: an object hovering at a threshold does not flicker between
//! two levels.
//!
//! # Example
//!
//! ```
//! use meshwork::algo::lod::{generate_lod_chain, LodMesh, LodOptions};
//! use meshwork::algo::progress::{ProgressState, LOD_PHASES, SIMPLIFY_PHASES};
//! use meshwork::mesh::primitives;
//! use std::sync::Arc;
//!
//! let sphere = primitives::icosphere(1.0, 2);
//! let outer = Arc::new(ProgressState::new(LOD_PHASES));
//! let nested = ProgressState::nested(&outer, SIMPLIFY_PHASES);
//!
//! let chain = generate_lod_chain(&sphere, &LodOptions::default(), &outer, &nested).unwrap();
//! assert_eq!(chain[0].triangle_count, 320);
//!
//! let mut lod = LodMesh::new();
//! lod.set_levels(chain);
//! lod.select(10.0);
//! assert!(lod.current_index() > 0);
//! ```

use nalgebra::{Matrix4, Point3};

use crate::algo::decimate::{simplify_with_progress, MIN_TARGET_TRIANGLES};
use crate::algo::progress::{ProgressState, LOD_PHASES};
use crate::error::{MeshError, Result};
use crate::mesh::Mesh;

/// Screen size reported for objects at or behind the camera plane.
pub const BEHIND_CAMERA_SCREEN_SIZE: f32 = 10000.0;

/// Fraction of a threshold used as the switching dead band.
pub const DEFAULT_HYSTERESIS: f32 = 0.1;

/// One entry of a LOD chain.
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    /// Geometry of this level.
    pub mesh: Mesh,
    /// Minimum projected size in pixels for this level.
    pub screen_size_threshold: f32,
    /// Triangle count of `mesh`.
    pub triangle_count: usize,
}

impl LodLevel {
    /// Wrap a mesh with its selection threshold.
    pub fn new(mesh: Mesh, screen_size_threshold: f32) -> Self {
        Self {
            triangle_count: mesh.num_triangles(),
            mesh,
            screen_size_threshold,
        }
    }
}

/// Levels ordered highest detail first.
pub type LodChain = Vec<LodLevel>;

/// A simplified level to generate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodStep {
    /// Fraction of the input triangles to keep.
    pub ratio: f32,
    /// Minimum projected size in pixels for the level.
    pub screen_size_threshold: f32,
}

/// Options for LOD chain generation and selection.
#[derive(Debug, Clone)]
pub struct LodOptions {
    /// Threshold of level 0 (the input mesh).
    pub base_threshold: f32,

    /// Simplified levels, highest detail first.
    pub steps: Vec<LodStep>,

    /// Dead band around each threshold, as a fraction of it.
    pub hysteresis: f32,
}

impl Default for LodOptions {
    fn default() -> Self {
        let step = |ratio, screen_size_threshold| LodStep {
            ratio,
            screen_size_threshold,
        };
        Self {
            base_threshold: 400.0,
            steps: vec![
                step(0.70, 200.0),
                step(0.50, 100.0),
                step(0.35, 50.0),
                step(0.25, 25.0),
                step(0.15, 0.0),
            ],
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }
}

impl LodOptions {
    /// Replace the simplified levels.
    pub fn with_steps(mut self, steps: Vec<LodStep>) -> Self {
        self.steps = steps;
        self
    }

    /// Set the hysteresis fraction.
    pub fn with_hysteresis(mut self, hysteresis: f32) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    /// Maximum number of simplified levels the progress phases can describe.
    pub fn max_steps() -> usize {
        LOD_PHASES.len() - 2
    }

    /// Check that the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.steps.len() > Self::max_steps() {
            return Err(MeshError::invalid_param(
                "steps",
                self.steps.len(),
                "at most 5 simplified levels are supported",
            ));
        }
        for step in &self.steps {
            if !(step.ratio > 0.0 && step.ratio <= 1.0) {
                return Err(MeshError::invalid_param("ratio", step.ratio, "must be in (0, 1]"));
            }
        }
        if !(0.0..1.0).contains(&self.hysteresis) {
            return Err(MeshError::invalid_param(
                "hysteresis",
                self.hysteresis,
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// Build a LOD chain for `mesh`.
///
/// `outer` advances one phase per simplified level and ends in the
/// finalizing phase; `nested` is reset and reused by every simplification
/// run. Create `nested` with [`ProgressState::nested`] so that cancelling
/// `outer` also stops the simplifier.
///
/// An empty mesh is rejected with [`MeshError::EmptyMesh`]. On
/// cancellation the chain built so far is returned; the caller must
/// discard it. Completion is left to the caller.
pub fn generate_lod_chain(
    mesh: &Mesh,
    options: &LodOptions,
    outer: &ProgressState,
    nested: &ProgressState,
) -> Result<LodChain> {
    options.validate()?;
    mesh.validate()?;
    if mesh.is_empty() {
        return Err(MeshError::EmptyMesh);
    }

    let original = mesh.num_triangles();
    let mut chain = Vec::with_capacity(options.steps.len() + 1);
    chain.push(LodLevel::new(mesh.clone(), options.base_threshold));
    if outer.is_cancelled() {
        return Ok(chain);
    }

    for (k, step) in options.steps.iter().enumerate() {
        outer.set_phase(k + 1);
        nested.reset();

        let target = (original as f32 * step.ratio).floor() as usize;
        if target < MIN_TARGET_TRIANGLES {
            log::debug!("skipping LOD {}: target {} triangles is too small", k + 1, target);
            continue;
        }

        let simplified = simplify_with_progress(mesh, target, nested)?;
        if outer.is_cancelled() {
            return Ok(chain);
        }
        log::debug!(
            "LOD {}: {} -> {} triangles",
            k + 1,
            original,
            simplified.num_triangles()
        );
        chain.push(LodLevel::new(simplified, step.screen_size_threshold));
    }

    // The last phase is always the finalizing one, even with fewer levels.
    outer.set_phase(outer.total_phases());
    Ok(chain)
}

/// Projected diameter in pixels of a bounding sphere.
///
/// `view` maps world to camera space (camera looking down -Z) and
/// `proj[(1, 1)]` is the vertical focal scale `cot(fovy / 2)`. Spheres
/// whose center is at or behind the camera report
/// [`BEHIND_CAMERA_SCREEN_SIZE`] so they get full detail.
pub fn screen_size(
    center: &Point3<f32>,
    radius: f32,
    view: &Matrix4<f32>,
    proj: &Matrix4<f32>,
    screen_height: u32,
) -> f32 {
    let view_center = view.transform_point(center);
    let distance = -view_center.z;
    if distance <= 0.0 {
        return BEHIND_CAMERA_SCREEN_SIZE;
    }
    radius * proj[(1, 1)] * screen_height as f32 / distance
}

/// Pick a level index for `screen_size` starting from `current`.
///
/// `thresholds[i]` is the minimum size of level `i`. Moving to a more
/// detailed level requires `thresholds[i] * (1 + hysteresis)`; moving to a
/// coarser one requires dropping below `thresholds[i] * (1 - hysteresis)`.
pub fn select_lod(screen_size: f32, current: usize, thresholds: &[f32], hysteresis: f32) -> usize {
    if thresholds.len() <= 1 {
        return 0;
    }
    let max_lod = thresholds.len() - 1;
    let up = |i: usize| thresholds[i] * (1.0 + hysteresis);
    let down = |i: usize| thresholds[i] * (1.0 - hysteresis);

    let mut lod = current.min(max_lod);
    while lod > 0 && screen_size >= up(lod - 1) {
        lod -= 1;
    }
    while lod < max_lod && screen_size < down(lod) {
        lod += 1;
    }
    lod
}

/// The LOD levels of one object and the state of their selection.
#[derive(Debug, Clone)]
pub struct LodMesh {
    levels: LodChain,
    current: usize,
    forced: Option<usize>,
    generating: bool,
    hysteresis: f32,
}

impl Default for LodMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl LodMesh {
    /// An object without levels.
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            current: 0,
            forced: None,
            generating: false,
            hysteresis: DEFAULT_HYSTERESIS,
        }
    }

    /// Replace all levels and restart selection at level 0.
    pub fn set_levels(&mut self, levels: LodChain) {
        self.levels = levels;
        self.current = 0;
    }

    /// Drop all levels and reset the selection state.
    pub fn clear(&mut self) {
        self.levels.clear();
        self.current = 0;
        self.forced = None;
        self.generating = false;
    }

    /// Set the hysteresis fraction used by [`LodMesh::select`].
    pub fn set_hysteresis(&mut self, hysteresis: f32) {
        self.hysteresis = hysteresis;
    }

    /// Number of levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Whether any level exists.
    pub fn has_lod(&self) -> bool {
        !self.levels.is_empty()
    }

    /// All levels, highest detail first.
    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    /// Level `index`, if present.
    pub fn level(&self, index: usize) -> Option<&LodLevel> {
        self.levels.get(index)
    }

    /// Select the level to draw at `screen_size` pixels.
    ///
    /// A forced level wins when it exists.
    pub fn select(&mut self, screen_size: f32) -> Option<&LodLevel> {
        if self.levels.is_empty() {
            return None;
        }
        self.current = match self.forced {
            Some(forced) if forced < self.levels.len() => forced,
            _ => {
                let thresholds: Vec<f32> =
                    self.levels.iter().map(|l| l.screen_size_threshold).collect();
                select_lod(screen_size, self.current, &thresholds, self.hysteresis)
            }
        };
        self.levels.get(self.current)
    }

    /// Always draw level `level` until [`LodMesh::clear_forced_lod`].
    pub fn force_lod(&mut self, level: usize) {
        self.forced = Some(level);
    }

    /// Return to automatic selection.
    pub fn clear_forced_lod(&mut self) {
        self.forced = None;
    }

    /// Forced level, if any.
    pub fn forced_lod(&self) -> Option<usize> {
        self.forced
    }

    /// Index of the most recently selected level.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Triangle count of the selected level (0 without levels).
    pub fn current_triangle_count(&self) -> usize {
        self.levels.get(self.current).map_or(0, |l| l.triangle_count)
    }

    /// Triangles summed over all levels.
    pub fn total_triangle_count(&self) -> usize {
        self.levels.iter().map(|l| l.triangle_count).sum()
    }

    /// Whether a chain is being generated for this object.
    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Mark generation as running or finished.
    pub fn set_generating(&mut self, generating: bool) {
        self.generating = generating;
    }
}
