use std::{collections::BTreeMap, mem};

use log::debug;

use crate::{
    material::Material,
    mesh::Mesh,
    sink::OutputSink,
    texture::Texture,
    world::{Handle, ObjectId, World},
};

/// Mesh and material pair rendered by one primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshPrimitive {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
}

/// Everything an import has produced so far, indexed by document index.
///
/// The cache owns the staged objects until the import completes. Only the
/// import phases append to it.
#[derive(Debug, Default)]
pub struct ImportCache {
    pub(crate) buffers: Vec<Vec<u8>>,
    pub(crate) textures: Vec<Option<Handle<Texture>>>,
    pub(crate) materials: Vec<Handle<Material>>,
    pub(crate) default_material: Option<Handle<Material>>,
    pub(crate) meshes: Vec<Vec<MeshPrimitive>>,
    pub(crate) meshes_with_morph_targets: Vec<usize>,
    pub(crate) nodes: BTreeMap<usize, ObjectId>,
    pub(crate) scene: Option<ObjectId>,
    pub(crate) mesh_to_nodes: BTreeMap<usize, Vec<usize>>,
    pub(crate) skin_to_nodes: BTreeMap<usize, Vec<usize>>,
    /// Object of every primitive of a node's mesh. The first one is the
    /// node's own object.
    pub(crate) node_to_mesh_primitives: BTreeMap<usize, Vec<ObjectId>>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub fn texture(&self, index: usize) -> Option<Handle<Texture>> {
        self.textures.get(index).copied().flatten()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn material(&self, index: usize) -> Option<Handle<Material>> {
        self.materials.get(index).copied()
    }

    pub fn default_material(&self) -> Option<Handle<Material>> {
        self.default_material
    }

    pub fn mesh(&self, index: usize) -> Option<&[MeshPrimitive]> {
        self.meshes.get(index).map(Vec::as_slice)
    }

    pub fn node(&self, index: usize) -> Option<ObjectId> {
        self.nodes.get(&index).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (usize, ObjectId)> + '_ {
        self.nodes.iter().map(|(index, id)| (*index, *id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn scene(&self) -> Option<ObjectId> {
        self.scene
    }

    pub fn node_primitives(&self, node: usize) -> Option<&[ObjectId]> {
        self.node_to_mesh_primitives.get(&node).map(Vec::as_slice)
    }

    pub fn mesh_instances(&self, mesh: usize) -> &[usize] {
        self.mesh_to_nodes.get(&mesh).map_or(&[], Vec::as_slice)
    }

    pub fn skin_instances(&self, skin: usize) -> &[usize] {
        self.skin_to_nodes.get(&skin).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
            && self.textures.is_empty()
            && self.materials.is_empty()
            && self.default_material.is_none()
            && self.meshes.is_empty()
            && self.nodes.is_empty()
            && self.scene.is_none()
            && self.node_to_mesh_primitives.is_empty()
    }

    /// Destroys every staged object through `sink`, then lets the sink
    /// reclaim assets nothing refers to anymore. Nodes go first, then the
    /// extra primitive objects, then the scene root. A second call finds
    /// nothing left and does nothing.
    pub fn clear<S: OutputSink + ?Sized>(&mut self, world: &mut World, sink: &mut S) {
        if self.is_empty() {
            return;
        }
        let nodes = mem::take(&mut self.nodes);
        debug!("Clearing import cache with {} nodes", nodes.len());
        for object in nodes.into_values() {
            sink.destroy(world, object);
        }
        for objects in mem::take(&mut self.node_to_mesh_primitives).into_values() {
            // The first object is the node itself, destroyed above.
            for object in objects.into_iter().skip(1) {
                sink.destroy(world, object);
            }
        }
        if let Some(scene) = self.scene.take() {
            sink.destroy(world, scene);
        }
        self.relinquish();
        sink.reclaim(world);
    }

    /// Hands the staged objects over to the caller. Returns the scene root.
    pub fn release(&mut self) -> Option<ObjectId> {
        let scene = self.scene.take();
        self.nodes.clear();
        self.node_to_mesh_primitives.clear();
        self.relinquish();
        scene
    }

    fn relinquish(&mut self) {
        self.buffers.clear();
        self.textures.clear();
        self.materials.clear();
        self.default_material = None;
        self.meshes.clear();
        self.meshes_with_morph_targets.clear();
        self.mesh_to_nodes.clear();
        self.skin_to_nodes.clear();
    }
}
