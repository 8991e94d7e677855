//! End-to-end behaviour of task managers driving a scene.

use std::sync::Arc;
use std::time::{Duration, Instant};

use meshwork::prelude::*;
use meshwork::upload::HandoffState;

fn wait_idle<E: meshwork::task::TaskEngine>(manager: &TaskManager<E>) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !manager.is_idle() {
        assert!(Instant::now() < deadline, "manager did not finish in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_subdivide_then_regenerate_lod() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let mut backend = HeadlessBackend::new();
    let sphere = scene.insert("sphere", primitives::icosphere(1.0, 2));

    let subdivision = SubdivisionManager::new(SubdivisionEngine).unwrap();
    let lod = LodManager::new(LodEngine).unwrap();

    // Initial LOD chain for the loaded mesh
    for task in scene.take_lod_requests() {
        lod.submit(task);
    }
    wait_idle(&lod);
    assert_eq!(lod.drain_completed(&mut scene), 1);
    assert_eq!(scene.get(sphere).unwrap().lod.level_count(), 6);
    scene.update(&mut backend);

    // Subdividing invalidates the chain
    let mesh = scene.get(sphere).unwrap().mesh.clone();
    subdivision.submit(SubdivisionTask::new(sphere, "sphere", mesh, SubdivideOptions::new(1)));
    wait_idle(&subdivision);
    assert_eq!(subdivision.drain_completed(&mut scene), 1);

    let object = scene.get(sphere).unwrap();
    assert_eq!(object.mesh.num_triangles(), 1280);
    assert!(!object.lod.has_lod());
    assert!(object.needs_lod_regeneration);

    // The new mesh is uploaded and swapped in
    scene.update(&mut backend);
    let gpu = scene.get(sphere).unwrap().gpu();
    assert_eq!(gpu.state(), HandoffState::Active);
    assert_eq!(gpu.active().map(|b| b.index_count), Some(1280 * 3));
    assert_eq!(backend.upload_count(), 2);

    // Regenerate from the subdivided mesh
    let tasks = scene.take_lod_requests();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].input.num_triangles(), 1280);
    for task in tasks {
        lod.submit(task);
    }
    wait_idle(&lod);
    lod.drain_completed(&mut scene);

    let object = scene.get(sphere).unwrap();
    assert_eq!(object.lod.level_count(), 6);
    assert_eq!(object.lod.levels()[0].triangle_count, 1280);
    assert!(object.lod.total_triangle_count() > 1280);
    assert!(!object.lod.is_generating());

    subdivision.shutdown();
    lod.shutdown();
}

#[test]
fn test_result_for_removed_object_is_dropped() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let cube = scene.insert("cube", primitives::cube());
    let mesh = scene.get(cube).unwrap().mesh.clone();

    let manager = SubdivisionManager::new(SubdivisionEngine).unwrap();
    manager.submit(SubdivisionTask::new(cube, "cube", mesh, SubdivideOptions::new(1)));
    scene.remove(cube);
    let other = scene.insert("tetra", primitives::tetrahedron());

    wait_idle(&manager);
    assert_eq!(manager.drain_completed(&mut scene), 0);
    assert_eq!(scene.get(other).unwrap().mesh.num_triangles(), 4);
}

#[test]
fn test_cancel_all_discards_work() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let manager = SubdivisionManager::new(SubdivisionEngine).unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let name = format!("sphere{}", i);
        let h = scene.insert(name.clone(), primitives::icosphere(1.0, 3));
        let mesh = scene.get(h).unwrap().mesh.clone();
        manager.submit(SubdivisionTask::new(h, name, mesh, SubdivideOptions::new(3)));
        handles.push(h);
    }
    manager.cancel_all();
    assert_eq!(manager.queued_count(), 0);

    wait_idle(&manager);
    assert_eq!(manager.drain_completed(&mut scene), 0);
    for h in handles {
        assert_eq!(scene.get(h).unwrap().mesh.num_triangles(), 1280);
    }
}

#[test]
fn test_cancel_all_stops_running_task() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let h = scene.insert("sphere", primitives::icosphere(1.0, 5));
    let mesh = scene.get(h).unwrap().mesh.clone();

    let manager = SubdivisionManager::new(SubdivisionEngine).unwrap();
    let task = SubdivisionTask::new(h, "sphere", mesh, SubdivideOptions::new(2));
    let progress = Arc::clone(task.progress());
    manager.submit(task);

    // Wait until the worker is past adjacency on the first iteration
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        assert!(Instant::now() < deadline, "task never reached repositioning");
        if manager.progress_snapshot().is_some_and(|p| p.phase >= 5) {
            break;
        }
        std::thread::sleep(Duration::from_micros(100));
    }
    manager.cancel_all();

    while manager.is_busy() {
        assert!(Instant::now() < deadline, "cancelled task kept running");
        std::thread::sleep(Duration::from_millis(1));
    }
    wait_idle(&manager);

    assert!(progress.is_cancelled());
    assert!(!progress.is_completed());
    assert_eq!(manager.drain_completed(&mut scene), 0);
    assert_eq!(scene.get(h).unwrap().mesh.num_triangles(), 20480);
}

#[test]
fn test_invalid_options_leave_scene_untouched() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let cube = scene.insert("cube", primitives::cube());
    let mesh = scene.get(cube).unwrap().mesh.clone();

    let manager = SubdivisionManager::new(SubdivisionEngine).unwrap();
    let bad = SubdivideOptions::new(1).with_crease_angle(-5.0);
    manager.submit(SubdivisionTask::new(cube, "cube", mesh.clone(), bad));
    manager.submit(SubdivisionTask::new(cube, "cube", mesh, SubdivideOptions::new(1)));

    wait_idle(&manager);
    assert_eq!(manager.drain_completed(&mut scene), 1);
    assert_eq!(scene.get(cube).unwrap().mesh.num_triangles(), 48);
}

#[test]
fn test_progress_is_observable_while_running() {
    let manager = LodManager::new(LodEngine).unwrap();
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let h = scene.insert("sphere", primitives::icosphere(1.0, 4));

    let mut tasks = scene.take_lod_requests();
    assert_eq!(tasks.len(), 1);
    let progress = Arc::clone(tasks[0].progress());
    manager.submit(tasks.remove(0));

    let mut last_total = 0.0_f32;
    while !manager.is_idle() {
        if let Some(p) = manager.progress_snapshot() {
            assert!(p.total_fraction >= last_total);
            assert!(p.total_fraction <= 1.0);
            last_total = p.total_fraction;
        }
        std::thread::sleep(Duration::from_micros(200));
    }
    assert!(manager.progress_snapshot().is_none());
    assert!(progress.is_completed());
    assert_eq!(progress.total_fraction(), 1.0);
    assert_eq!(manager.drain_completed(&mut scene), 1);
    assert_eq!(scene.get(h).unwrap().lod.level_count(), 6);
}

#[test]
fn test_subdivision_progress_reaches_completion() {
    let mut scene: Scene<HeadlessBackend> = Scene::new();
    let h = scene.insert("sphere", primitives::icosphere(1.0, 4));
    let mesh = scene.get(h).unwrap().mesh.clone();

    let manager = SubdivisionManager::new(SubdivisionEngine).unwrap();
    let task = SubdivisionTask::new(h, "sphere", mesh, SubdivideOptions::new(2));
    let progress = Arc::clone(task.progress());
    manager.submit(task);
    wait_idle(&manager);

    let snap = progress.snapshot();
    assert!(snap.completed);
    assert!(!snap.cancelled);
    assert_eq!(snap.total_fraction, 1.0);
    assert_eq!(manager.drain_completed(&mut scene), 1);
    assert_eq!(scene.get(h).unwrap().mesh.num_triangles(), 5120 * 16);
}
