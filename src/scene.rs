//! Scene objects addressed by generational handles.
//!
//! Background tasks refer to the object they will update through an
//! [`ObjectHandle`]. A handle records the slot index and the slot's
//! generation at insertion time; removing an object bumps the generation, so
//! results for removed objects are recognised and dropped instead of landing
//! on whatever object reuses the slot.
//!
//! The scene is the target of both task engines: subdivision results
//! replace an object's mesh and schedule a re-upload, LOD chains are
//! installed on the object's [`LodMesh`].

use nalgebra::Matrix4;

use crate::algo::lod::{screen_size, LodChain, LodMesh};
use crate::mesh::Mesh;
use crate::task::{LodTarget, LodTask, SubdivisionTarget};
use crate::upload::{pack_vertices, DoubleBuffer, UploadBackend};

/// Objects below this many triangles get no LOD chain.
pub const MIN_LOD_TRIANGLES: usize = 100;

/// Stable reference to an object in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl ObjectHandle {
    /// Handle to slot `index` at `generation`.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// One drawable object.
pub struct SceneObject<B: UploadBackend> {
    /// Display name.
    pub name: String,
    /// Full-detail mesh.
    pub mesh: Mesh,
    /// Level-of-detail chain and selection state.
    pub lod: LodMesh,
    /// Set when the mesh changed and the LOD chain is out of date.
    pub needs_lod_regeneration: bool,
    gpu: DoubleBuffer<B::Buffer, B::Fence>,
    upload_requested: bool,
}

impl<B: UploadBackend> SceneObject<B> {
    fn new(name: String, mesh: Mesh) -> Self {
        Self {
            name,
            mesh,
            lod: LodMesh::new(),
            needs_lod_regeneration: true,
            gpu: DoubleBuffer::new(),
            upload_requested: true,
        }
    }

    /// GPU buffers of the object.
    pub fn gpu(&self) -> &DoubleBuffer<B::Buffer, B::Fence> {
        &self.gpu
    }

    /// Whether the mesh still has to be uploaded.
    pub fn upload_requested(&self) -> bool {
        self.upload_requested
    }
}

struct Slot<B: UploadBackend> {
    generation: u32,
    object: Option<SceneObject<B>>,
}

/// Arena of scene objects.
pub struct Scene<B: UploadBackend> {
    slots: Vec<Slot<B>>,
    free: Vec<u32>,
    len: usize,
}

impl<B: UploadBackend> Default for Scene<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: UploadBackend> Scene<B> {
    /// Empty scene.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Add an object. It is scheduled for upload and LOD generation.
    pub fn insert(&mut self, name: impl Into<String>, mesh: Mesh) -> ObjectHandle {
        let object = SceneObject::new(name.into(), mesh);
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectHandle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectHandle::new(index, 0)
    }

    /// Remove an object. Outstanding handles to it become stale.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<SceneObject<B>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let object = slot.object.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(object)
    }

    /// Object behind `handle`, unless it was removed.
    pub fn get(&self, handle: ObjectHandle) -> Option<&SceneObject<B>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_ref()
    }

    /// Mutable access to the object behind `handle`.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut SceneObject<B>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.object.as_mut()
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the scene has no objects.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live objects.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &SceneObject<B>)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.object
                .as_ref()
                .map(|object| (ObjectHandle::new(i as u32, slot.generation), object))
        })
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectHandle, &mut SceneObject<B>)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.object
                .as_mut()
                .map(|object| (ObjectHandle::new(i as u32, generation), object))
        })
    }

    /// Swap in a new mesh for `handle`.
    ///
    /// The LOD chain is dropped and regenerated later, and the mesh is
    /// scheduled for upload. Returns false for a stale handle.
    pub fn replace_mesh(&mut self, handle: ObjectHandle, mesh: Mesh) -> bool {
        let Some(target) = self.get_mut(handle) else {
            log::debug!("dropping mesh for removed object {:?}", handle);
            return false;
        };
        log::info!(
            "{}: {} -> {} triangles",
            target.name,
            target.mesh.num_triangles(),
            mesh.num_triangles()
        );
        target.mesh = mesh;
        target.lod.clear();
        target.needs_lod_regeneration = true;
        target.upload_requested = true;
        true
    }

    /// Build LOD tasks for objects whose chain is out of date.
    ///
    /// Objects with fewer than [`MIN_LOD_TRIANGLES`] triangles are cleared
    /// and get no task. Objects with a task are marked as generating.
    pub fn take_lod_requests(&mut self) -> Vec<LodTask> {
        let mut tasks = Vec::new();
        for (handle, object) in self.iter_mut() {
            if !object.needs_lod_regeneration {
                continue;
            }
            object.needs_lod_regeneration = false;
            if object.mesh.num_triangles() < MIN_LOD_TRIANGLES {
                log::debug!(
                    "{}: {} triangles, skipping LOD generation",
                    object.name,
                    object.mesh.num_triangles()
                );
                object.lod.clear();
                continue;
            }
            object.lod.set_generating(true);
            tasks.push(LodTask::new(handle, object.name.clone(), object.mesh.clone()));
        }
        tasks
    }

    /// Pick the LOD level of every object for the given camera.
    pub fn select_lods(&mut self, view: &Matrix4<f32>, proj: &Matrix4<f32>, screen_height: u32) {
        for (_, object) in self.iter_mut() {
            if !object.lod.has_lod() {
                continue;
            }
            let bounds = object.mesh.bounds();
            let size = screen_size(&bounds.center(), bounds.radius(), view, proj, screen_height);
            object.lod.select(size);
        }
    }

    /// Start pending uploads and swap in finished ones.
    ///
    /// Call once per frame. Returns the number of buffers swapped in.
    pub fn update(&mut self, backend: &mut B) -> usize {
        let mut swapped = 0;
        for (_, object) in self.iter_mut() {
            if object.upload_requested {
                object.upload_requested = false;
                let vertices = pack_vertices(&object.mesh);
                let (buffer, fence) = backend.upload(&vertices, object.mesh.indices());
                object.gpu.begin_upload(buffer, fence);
            }
            if object.gpu.poll() {
                swapped += 1;
            }
        }
        swapped
    }
}

impl<B: UploadBackend> SubdivisionTarget for Scene<B> {
    fn apply_subdivided_mesh(&mut self, object: ObjectHandle, mesh: Mesh) -> bool {
        self.replace_mesh(object, mesh)
    }
}

impl<B: UploadBackend> LodTarget for Scene<B> {
    fn apply_lod_levels(&mut self, object: ObjectHandle, levels: LodChain) -> bool {
        let Some(target) = self.get_mut(object) else {
            log::debug!("dropping LOD chain for removed object {:?}", object);
            return false;
        };
        target.lod.set_levels(levels);
        target.lod.set_generating(false);
        true
    }
}
