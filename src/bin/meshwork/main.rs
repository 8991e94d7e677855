//! Meshwork CLI - runs background mesh tasks on built-in shapes.
//!
//! Usage: meshwork <COMMAND> [OPTIONS]
//!
//! Every command queues its work on a task manager and drives it the way a
//! viewer would: one poll per frame, a progress bar, completed results
//! drained into a scene and uploaded through the headless backend.
//!
//! Set `RUST_LOG=debug` for per-phase logging.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};

use meshwork::algo::decimate::{simplify_with_progress, SimplifyOptions};
use meshwork::algo::progress::{ProgressSnapshot, ProgressState, SIMPLIFY_PHASES};
use meshwork::algo::subdivide::{SubdivideOptions, SubdivisionMethod};
use meshwork::mesh::{primitives, EdgeKey, Mesh};
use meshwork::scene::{ObjectHandle, Scene};
use meshwork::task::{
    LodEngine, LodManager, SubdivisionEngine, SubdivisionManager, SubdivisionTask, Task,
    TaskEngine, TaskManager,
};
use meshwork::upload::HeadlessBackend;

/// Simulated frame time.
const FRAME: Duration = Duration::from_millis(16);

type CliScene = Scene<HeadlessBackend>;

#[derive(Parser)]
#[command(name = "meshwork")]
#[command(author, version, about = "Background mesh subdivision and LOD CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        #[command(flatten)]
        shape: ShapeArgs,
    },

    /// Subdivide a mesh
    Subdivide {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Subdivision method
        #[arg(short, long, value_enum, default_value = "loop")]
        method: SubdivideMethod,

        /// Number of subdivision iterations
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Dihedral angle in degrees above which an edge is kept sharp
        #[arg(short, long, default_value = "180")]
        crease_angle: f32,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },

    /// Simplify a mesh
    Simplify {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Target number of faces
        #[arg(short = 'f', long, conflicts_with = "ratio")]
        faces: Option<usize>,

        /// Target ratio of faces to keep (0.0 to 1.0)
        #[arg(short, long, default_value = "0.5")]
        ratio: f32,
    },

    /// Generate a level-of-detail chain
    Lod {
        #[command(flatten)]
        shape: ShapeArgs,

        /// Camera distances at which to report the selected level
        #[arg(short, long, value_delimiter = ',', default_values_t = [2.0, 10.0, 40.0, 160.0])]
        distances: Vec<f32>,
    },
}

#[derive(clap::Args)]
struct ShapeArgs {
    /// Built-in shape to process
    #[arg(short, long, value_enum, default_value = "icosphere")]
    shape: Shape,

    /// Refinement level of the shape (icosphere subdivisions, grid cells)
    #[arg(short = 'n', long, default_value = "3")]
    detail: usize,
}

impl ShapeArgs {
    fn build(&self) -> (&'static str, Mesh) {
        match self.shape {
            Shape::Cube => ("cube", primitives::cube()),
            Shape::Tetrahedron => ("tetrahedron", primitives::tetrahedron()),
            Shape::Icosahedron => ("icosahedron", primitives::icosahedron(1.0)),
            Shape::Icosphere => ("icosphere", primitives::icosphere(1.0, self.detail)),
            Shape::Grid => ("grid", primitives::grid(self.detail.max(1))),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Shape {
    /// Unit cube with split vertices
    Cube,
    /// Regular tetrahedron
    Tetrahedron,
    /// Regular icosahedron
    Icosahedron,
    /// Subdivided icosahedron projected onto the unit sphere
    Icosphere,
    /// Open square grid
    Grid,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SubdivideMethod {
    /// Loop subdivision with crease detection
    Loop,
    /// Split every triangle into four without smoothing
    Midpoint,
}

impl From<SubdivideMethod> for SubdivisionMethod {
    fn from(method: SubdivideMethod) -> Self {
        match method {
            SubdivideMethod::Loop => SubdivisionMethod::Loop,
            SubdivideMethod::Midpoint => SubdivisionMethod::Midpoint,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { shape } => {
            cmd_info(&shape);
        }

        Commands::Subdivide {
            shape,
            method,
            iterations,
            crease_angle,
            sequential,
        } => {
            cmd_subdivide(&shape, method, iterations, crease_angle, sequential)?;
        }

        Commands::Simplify {
            shape,
            faces,
            ratio,
        } => {
            cmd_simplify(&shape, faces, ratio)?;
        }

        Commands::Lod { shape, distances } => {
            cmd_lod(&shape, &distances)?;
        }
    }

    Ok(())
}

/// Terminal progress bar that never moves backwards.
struct ProgressBar {
    max_percent: usize,
    done: bool,
}

impl ProgressBar {
    fn new() -> Self {
        Self {
            max_percent: 0,
            done: false,
        }
    }

    fn update(&mut self, snapshot: &ProgressSnapshot, detail: Option<&ProgressSnapshot>) {
        // Round instead of truncating for smoother progress
        let raw_percent = (snapshot.total_fraction * 100.0).round() as usize;
        let percent = raw_percent.min(100);
        if percent <= self.max_percent && percent != 100 {
            return;
        }
        self.max_percent = self.max_percent.max(percent);

        let message = match detail {
            Some(d) if d.phase > 0 => format!(
                "{} - {} {:.0}%",
                snapshot.phase_name,
                d.phase_name,
                d.phase_fraction * 100.0
            ),
            _ => snapshot.phase_name.to_string(),
        };
        self.draw(self.max_percent, &message);
    }

    fn draw(&self, percent: usize, message: &str) {
        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let empty = bar_width - filled;

        let bar = "=".repeat(filled);
        let space = " ".repeat(empty);

        // Pad so a shorter message fully overwrites a longer one
        eprint!("\r[{}{}] {:3}% {:<40}", bar, space, percent, message);
        let _ = std::io::stderr().flush();
    }

    fn finish(&mut self, message: &str) {
        if !self.done {
            self.draw(100, message);
            eprintln!();
            self.done = true;
        }
    }
}

/// Poll `manager` once per frame until it is idle.
///
/// Completed tasks are drained into `target` and `scene` uploads are driven
/// every frame. Returns the number of results applied.
fn run_frames<E, F>(manager: &TaskManager<E>, scene: &mut CliScene, mut apply: F) -> usize
where
    E: TaskEngine,
    F: FnMut(&TaskManager<E>, &mut CliScene) -> usize,
{
    let mut backend = HeadlessBackend::with_latency(2);
    let mut bar = ProgressBar::new();
    let mut applied = 0;
    let mut frames = 0usize;

    loop {
        frames += 1;
        if let Some(snapshot) = manager.progress_snapshot() {
            bar.update(&snapshot, manager.detail_snapshot().as_ref());
        }
        let idle = manager.is_idle();
        applied += apply(manager, scene);
        scene.update(&mut backend);
        if idle {
            break;
        }
        thread::sleep(FRAME);
    }

    // Let pending uploads land
    while scene.iter().any(|(_, o)| o.gpu().has_pending() || o.upload_requested()) {
        scene.update(&mut backend);
        frames += 1;
    }

    bar.finish("Done");
    log::debug!(
        "{} frames, {} uploads, {} bytes",
        frames,
        backend.upload_count(),
        backend.bytes_uploaded()
    );
    applied
}

fn print_stats(label: &str, mesh: &Mesh) {
    println!("{}: {} vertices, {} triangles", label, mesh.num_vertices(), mesh.num_triangles());
}

fn cmd_info(shape: &ShapeArgs) {
    let (name, mesh) = shape.build();

    println!("Shape: {}", name);
    println!("Vertices: {}", mesh.num_vertices());
    println!("Triangles: {}", mesh.num_triangles());

    // Compute some statistics
    let mut total_area = 0.0;
    let mut min_area = f32::MAX;
    let mut max_area = 0.0_f32;
    for t in 0..mesh.num_triangles() {
        let area = mesh.face_normal(t).norm() * 0.5;
        total_area += area;
        min_area = min_area.min(area);
        max_area = max_area.max(area);
    }
    println!("Surface area: {:.6}", total_area);
    println!("Face area range: [{:.6}, {:.6}]", min_area, max_area);

    let b = mesh.bounds();
    if b.is_valid() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z
        );
        let diag = b.max - b.min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    // Edge statistics on the index buffer (split vertices count as distinct)
    let mut edge_faces = std::collections::HashMap::new();
    for tri in mesh.triangles() {
        for key in EdgeKey::of_triangle(tri) {
            *edge_faces.entry(key).or_insert(0usize) += 1;
        }
    }
    let boundary = edge_faces.values().filter(|&&n| n == 1).count();
    println!("Edges: {}", edge_faces.len());
    if boundary == 0 {
        println!("Topology: Closed (no boundary)");
    } else {
        println!("Topology: Open ({} boundary edges)", boundary);
    }
}

fn cmd_subdivide(
    shape: &ShapeArgs,
    method: SubdivideMethod,
    iterations: usize,
    crease_angle: f32,
    sequential: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, mesh) = shape.build();
    print_stats("Loaded", &mesh);

    let options = SubdivideOptions::new(iterations)
        .with_method(method.into())
        .with_crease_angle(crease_angle)
        .with_parallel(!sequential);
    options.validate()?;

    let mode = if sequential { "sequential" } else { "parallel" };
    let label = match method {
        SubdivideMethod::Loop => "Loop",
        SubdivideMethod::Midpoint => "midpoint",
    };
    println!(
        "Applying {} subdivision ({} iterations, crease angle {}, {})...",
        label, iterations, crease_angle, mode
    );

    let mut scene = CliScene::new();
    let handle = scene.insert(name, mesh.clone());
    let manager: SubdivisionManager = TaskManager::new(SubdivisionEngine)?;

    let start = Instant::now();
    manager.submit(SubdivisionTask::new(handle, name, mesh, options));
    let applied = run_frames(&manager, &mut scene, |m, s| m.drain_completed(s));
    let elapsed = start.elapsed();
    manager.shutdown();

    if applied == 0 {
        return Err("subdivision produced no result".into());
    }
    if let Some(object) = scene.get(handle) {
        print_stats("Result", &object.mesh);
    }
    println!("Finished in {:.2?}", elapsed);

    Ok(())
}

/// Simplification as a task kind of its own, built on the public traits.
struct SimplifyTask {
    object: ObjectHandle,
    name: String,
    input: Mesh,
    target: usize,
    result: Option<Mesh>,
    progress: Arc<ProgressState>,
}

impl Task for SimplifyTask {
    fn progress(&self) -> &Arc<ProgressState> {
        &self.progress
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

struct SimplifyEngine;

impl TaskEngine for SimplifyEngine {
    type Task = SimplifyTask;
    type Target = CliScene;

    fn label(&self) -> &'static str {
        "simplify"
    }

    fn run(&self, task: &mut SimplifyTask) -> meshwork::error::Result<()> {
        let mesh = simplify_with_progress(&task.input, task.target, &task.progress)?;
        if !task.progress.is_cancelled() {
            task.result = Some(mesh);
        }
        Ok(())
    }

    fn apply(&self, task: SimplifyTask, scene: &mut CliScene) -> bool {
        match task.result {
            Some(mesh) => scene.replace_mesh(task.object, mesh),
            None => false,
        }
    }
}

fn cmd_simplify(
    shape: &ShapeArgs,
    faces: Option<usize>,
    ratio: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (name, mesh) = shape.build();
    print_stats("Loaded", &mesh);

    let options = match faces {
        Some(target_faces) => SimplifyOptions::with_target_faces(target_faces),
        None => SimplifyOptions::with_target_ratio(ratio),
    };
    let target = options.compute_target(mesh.num_triangles());
    println!("Simplifying to {} triangles...", target);

    let mut scene = CliScene::new();
    let handle = scene.insert(name, mesh.clone());
    let manager = TaskManager::new(SimplifyEngine)?;

    let start = Instant::now();
    manager.submit(SimplifyTask {
        object: handle,
        name: name.to_string(),
        input: mesh,
        target,
        result: None,
        progress: Arc::new(ProgressState::new(SIMPLIFY_PHASES)),
    });
    let applied = run_frames(&manager, &mut scene, |m, s| m.drain_completed(s));
    let elapsed = start.elapsed();
    manager.shutdown();

    if applied == 0 {
        return Err("simplification produced no result".into());
    }
    if let Some(object) = scene.get(handle) {
        print_stats("Result", &object.mesh);
    }
    println!("Finished in {:.2?}", elapsed);

    Ok(())
}

fn cmd_lod(shape: &ShapeArgs, distances: &[f32]) -> Result<(), Box<dyn std::error::Error>> {
    let (name, mesh) = shape.build();
    print_stats("Loaded", &mesh);

    let mut scene = CliScene::new();
    let handle = scene.insert(name, mesh);
    let manager: LodManager = TaskManager::new(LodEngine)?;

    let tasks = scene.take_lod_requests();
    if tasks.is_empty() {
        println!("Mesh is too small for LOD generation");
        return Ok(());
    }
    println!("Generating LOD chain...");

    let start = Instant::now();
    for task in tasks {
        manager.submit(task);
    }
    run_frames(&manager, &mut scene, |m, s| m.drain_completed(s));
    let elapsed = start.elapsed();
    manager.shutdown();

    let Some(object) = scene.get_mut(handle) else {
        return Err("object disappeared".into());
    };
    for (i, level) in object.lod.levels().iter().enumerate() {
        println!(
            "LOD{}: {} triangles (>= {} px)",
            i, level.triangle_count, level.screen_size_threshold
        );
    }
    println!("Total: {} triangles", object.lod.total_triangle_count());

    // Camera on the +Z axis looking at the origin, 60 degree field of view
    let proj = nalgebra::Perspective3::new(16.0 / 9.0, 60f32.to_radians(), 0.1, 1000.0);
    let bounds = *object.mesh.bounds();
    for &distance in distances {
        let view = nalgebra::Matrix4::new_translation(&nalgebra::Vector3::new(0.0, 0.0, -distance));
        let size = meshwork::algo::lod::screen_size(
            &bounds.center(),
            bounds.radius(),
            &view,
            proj.as_matrix(),
            1080,
        );
        object.lod.select(size);
        println!(
            "Distance {:>6.1}: {:>7.1} px -> LOD{} ({} triangles)",
            distance,
            size,
            object.lod.current_index(),
            object.lod.current_triangle_count()
        );
    }
    println!("Finished in {:.2?}", elapsed);

    Ok(())
}
