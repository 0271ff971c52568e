use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    marker::PhantomData,
    mem,
};

use glam::{Mat4, Quat, Vec3};
use log::{debug, warn};

use crate::{
    coords::Trs,
    material::Material,
    mesh::{Bounds, Mesh},
    texture::Texture,
};

/// Identity of a scene object. Ids are never reused within a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Typed index into an [`Assets`] store.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Append-only asset store. Removed slots stay empty.
pub struct Assets<T> {
    items: Vec<Option<T>>,
}

impl<T> Default for Assets<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Assets<T> {
    pub fn add(&mut self, item: T) -> Handle<T> {
        self.items.push(Some(item));
        Handle::new(self.items.len() - 1)
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index()).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.items.get_mut(handle.index()).and_then(Option::take)
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live assets.
    pub fn len(&self) -> usize {
        self.items.iter().filter(|item| item.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.as_ref().map(|item| (Handle::new(index), item)))
    }

    fn retain(&mut self, mut keep: impl FnMut(Handle<T>) -> bool) -> usize {
        let mut removed = 0;
        for (index, item) in self.items.iter_mut().enumerate() {
            if item.is_some() && !keep(Handle::new(index)) {
                *item = None;
                removed += 1;
            }
        }
        removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl LocalTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// True for the identity transform. Either sign of the identity
    /// quaternion counts.
    pub fn is_identity(&self) -> bool {
        self.position == Vec3::ZERO && self.scale == Vec3::ONE && self.rotation.is_near_identity()
    }
}

impl From<Trs> for LocalTransform {
    fn from(trs: Trs) -> Self {
        Self {
            position: trs.translation,
            rotation: trs.rotation,
            scale: trs.scale,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkinnedRenderer {
    pub mesh: Handle<Mesh>,
    pub material: Handle<Material>,
    pub bones: Vec<ObjectId>,
    pub root_bone: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Renderer {
    Mesh {
        mesh: Handle<Mesh>,
        material: Handle<Material>,
    },
    Skinned(SkinnedRenderer),
}

impl Renderer {
    pub fn mesh(&self) -> Handle<Mesh> {
        match self {
            Renderer::Mesh { mesh, .. } => *mesh,
            Renderer::Skinned(renderer) => renderer.mesh,
        }
    }

    pub fn material(&self) -> Handle<Material> {
        match self {
            Renderer::Mesh { material, .. } => *material,
            Renderer::Skinned(renderer) => renderer.material,
        }
    }

    /// Upgrades a plain renderer to a skinned one, keeping bones already set.
    pub fn make_skinned(&mut self) {
        if let Renderer::Mesh { mesh, material } = *self {
            *self = Renderer::Skinned(SkinnedRenderer {
                mesh,
                material,
                bones: Vec::new(),
                root_bone: None,
            });
        }
    }

    /// Skins the renderer with `bones`, replacing any bones already set.
    pub fn bind_bones(&mut self, bones: Vec<ObjectId>, root_bone: Option<ObjectId>) {
        match self {
            Renderer::Skinned(renderer) => {
                renderer.bones = bones;
                renderer.root_bone = root_bone;
            }
            Renderer::Mesh { mesh, material } => {
                *self = Renderer::Skinned(SkinnedRenderer {
                    mesh: *mesh,
                    material: *material,
                    bones,
                    root_bone,
                });
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: LocalTransform,
    pub renderer: Option<Renderer>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

impl SceneObject {
    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }
}

/// Arena of scene objects plus the assets their renderers use.
#[derive(Default)]
pub struct World {
    objects: Vec<Option<SceneObject>>,
    pending_destroy: Vec<ObjectId>,
    pub textures: Assets<Texture>,
    pub materials: Assets<Material>,
    pub meshes: Assets<Mesh>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, name: impl Into<String>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Some(SceneObject {
            name: name.into(),
            transform: LocalTransform::default(),
            renderer: None,
            parent: None,
            children: Vec::new(),
        }));
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.get(id).and_then(|object| object.parent)
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.get(id).map_or(&[], |object| &object.children)
    }

    /// Objects without a parent, in creation order.
    pub fn roots(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.iter().enumerate().filter_map(|(index, object)| {
            object
                .as_ref()
                .filter(|object| object.parent.is_none())
                .map(|_| ObjectId(index as u32))
        })
    }

    pub fn live_object_count(&self) -> usize {
        self.objects.iter().filter(|object| object.is_some()).count()
    }

    /// Moves `child` under `parent`, keeping its local transform. The child
    /// is appended after existing siblings.
    pub fn set_parent(&mut self, child: ObjectId, parent: Option<ObjectId>) {
        if !self.is_alive(child) || parent.is_some_and(|parent| !self.is_alive(parent)) {
            warn!("Can't parent {:?} to {:?}: object destroyed", child, parent);
            return;
        }
        if let Some(parent) = parent {
            if parent == child || self.ancestors(parent).any(|ancestor| ancestor == child) {
                warn!("Can't parent {:?} to its own descendant {:?}", child, parent);
                return;
            }
        }
        if let Some(old_parent) = self.parent(child) {
            if let Some(object) = self.get_mut(old_parent) {
                object.children.retain(|id| *id != child);
            }
        }
        if let Some(object) = self.get_mut(child) {
            object.parent = parent;
        }
        if let Some(object) = parent.and_then(|parent| self.get_mut(parent)) {
            object.children.push(child);
        }
    }

    pub fn ancestors(&self, id: ObjectId) -> impl Iterator<Item = ObjectId> + '_ {
        let mut current = self.parent(id);
        std::iter::from_fn(move || {
            let id = current?;
            current = self.parent(id);
            Some(id)
        })
    }

    /// `root` followed by all its descendants, depth first.
    pub fn descendants(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(object) = self.get(id) else {
                continue;
            };
            result.push(id);
            stack.extend(object.children.iter().rev());
        }
        result
    }

    pub fn local_to_world(&self, id: ObjectId) -> Mat4 {
        let mut matrix = self.get(id).map_or(Mat4::IDENTITY, |o| o.transform.matrix());
        for ancestor in self.ancestors(id) {
            if let Some(object) = self.get(ancestor) {
                matrix = object.transform.matrix() * matrix;
            }
        }
        matrix
    }

    /// Marks an object for destruction at the next flush.
    pub fn destroy(&mut self, id: ObjectId) {
        if !self.is_alive(id) {
            debug!("Skipping destroy of {:?}: already destroyed", id);
            return;
        }
        if !self.pending_destroy.contains(&id) {
            self.pending_destroy.push(id);
        }
    }

    /// Removes an object and its descendants right away. Returns false if
    /// the object was already gone.
    pub fn destroy_immediate(&mut self, id: ObjectId) -> bool {
        if !self.is_alive(id) {
            debug!("Skipping destroy of {:?}: already destroyed", id);
            return false;
        }
        if let Some(parent) = self.parent(id) {
            if let Some(object) = self.get_mut(parent) {
                object.children.retain(|child| *child != id);
            }
        }
        for descendant in self.descendants(id) {
            self.objects[descendant.index()] = None;
        }
        true
    }

    pub fn flush_destroyed(&mut self) -> usize {
        mem::take(&mut self.pending_destroy)
            .into_iter()
            .filter(|id| self.destroy_immediate(*id))
            .count()
    }

    /// Flushes pending destroys and drops every asset no live object or
    /// material refers to.
    pub fn unload_unused_assets(&mut self) {
        self.flush_destroyed();
        let mut used_meshes = HashSet::new();
        let mut used_materials = HashSet::new();
        for renderer in self.objects.iter().flatten().filter_map(|o| o.renderer.as_ref()) {
            used_meshes.insert(renderer.mesh());
            used_materials.insert(renderer.material());
        }
        let meshes = self.meshes.retain(|handle| used_meshes.contains(&handle));
        let materials = self
            .materials
            .retain(|handle| used_materials.contains(&handle));
        let used_textures: HashSet<_> = self
            .materials
            .iter()
            .flat_map(|(_, material)| material.textures().copied().collect::<Vec<_>>())
            .collect();
        let textures = self
            .textures
            .retain(|handle| used_textures.contains(&handle));
        debug!(
            "Unloaded {} meshes, {} materials, {} textures",
            meshes, materials, textures
        );
    }

    /// World-space bounds of every renderer in the hierarchy under `root`.
    pub fn hierarchy_bounds(&self, root: ObjectId) -> Option<Bounds> {
        let mut result: Option<Bounds> = None;
        for id in self.descendants(root) {
            let Some(renderer) = self.get(id).and_then(|object| object.renderer.as_ref()) else {
                continue;
            };
            let Some(mesh) = self.meshes.get(renderer.mesh()) else {
                continue;
            };
            if mesh.positions.is_empty() {
                continue;
            }
            let bounds = mesh.bounds.transformed(self.local_to_world(id));
            match &mut result {
                Some(result) => result.encapsulate(&bounds),
                None => result = Some(bounds),
            }
        }
        result
    }

    /// Moves the hierarchy under `root` of another world, with the assets it
    /// uses, into this one. Returns the id of the moved root.
    pub fn adopt(&mut self, mut other: World, root: ObjectId, parent: Option<ObjectId>) -> Option<ObjectId> {
        let ids = other.descendants(root);
        if ids.is_empty() {
            return None;
        }
        let mut object_map = HashMap::new();
        for id in &ids {
            let name = other.get(*id).map(|o| o.name.clone()).unwrap_or_default();
            object_map.insert(*id, self.spawn(name));
        }

        let mut texture_map = HashMap::new();
        let mut material_map = HashMap::new();
        let mut mesh_map = HashMap::new();
        let mut move_material = |this: &mut World, other: &mut World, handle: Handle<Material>| {
            if let Some(mapped) = material_map.get(&handle) {
                return Some(*mapped);
            }
            let material = other.materials.remove(handle)?;
            let material = material
                .try_map_textures(|texture| {
                    let mapped = match texture_map.get(&texture) {
                        Some(mapped) => *mapped,
                        None => {
                            let moved = other.textures.remove(texture).ok_or(())?;
                            let mapped = this.textures.add(moved);
                            texture_map.insert(texture, mapped);
                            mapped
                        }
                    };
                    Ok::<_, ()>(mapped)
                })
                .ok()?;
            let mapped = this.materials.add(material);
            material_map.insert(handle, mapped);
            Some(mapped)
        };

        for id in &ids {
            let Some(object) = other.objects[id.index()].take() else {
                continue;
            };
            let renderer = match object.renderer {
                Some(renderer) => {
                    let mesh = match mesh_map.get(&renderer.mesh()) {
                        Some(mapped) => Some(*mapped),
                        None => other.meshes.remove(renderer.mesh()).map(|mesh| {
                            let mapped = self.meshes.add(mesh);
                            mesh_map.insert(renderer.mesh(), mapped);
                            mapped
                        }),
                    };
                    let material = move_material(self, &mut other, renderer.material());
                    match (mesh, material, renderer) {
                        (Some(mesh), Some(material), Renderer::Mesh { .. }) => {
                            Some(Renderer::Mesh { mesh, material })
                        }
                        (Some(mesh), Some(material), Renderer::Skinned(skinned)) => {
                            Some(Renderer::Skinned(SkinnedRenderer {
                                mesh,
                                material,
                                bones: skinned
                                    .bones
                                    .iter()
                                    .filter_map(|bone| object_map.get(bone).copied())
                                    .collect(),
                                root_bone: skinned
                                    .root_bone
                                    .and_then(|bone| object_map.get(&bone).copied()),
                            }))
                        }
                        _ => {
                            warn!("Dropping renderer of {}: assets are missing", object.name);
                            None
                        }
                    }
                }
                None => None,
            };
            if let Some(target) = self.get_mut(object_map[id]) {
                target.transform = object.transform;
                target.renderer = renderer;
                target.children = object
                    .children
                    .iter()
                    .filter_map(|child| object_map.get(child).copied())
                    .collect();
                target.parent = object.parent.and_then(|parent| object_map.get(&parent).copied());
            }
        }

        let new_root = object_map[&root];
        if let Some(object) = self.get_mut(new_root) {
            object.parent = None;
        }
        if parent.is_some() {
            self.set_parent(new_root, parent);
        }
        Some(new_root)
    }

    /// Indented listing of the hierarchy under `root`.
    pub fn describe(&self, root: ObjectId) -> String {
        let mut text = String::new();
        let mut stack = vec![(root, 0)];
        while let Some((id, depth)) = stack.pop() {
            let Some(object) = self.get(id) else {
                continue;
            };
            let kind = match &object.renderer {
                Some(Renderer::Mesh { .. }) => " [mesh]",
                Some(Renderer::Skinned(_)) => " [skinned]",
                None => "",
            };
            text.push_str(&format!("{}{}{}\n", "  ".repeat(depth), object.name, kind));
            stack.extend(object.children.iter().rev().map(|child| (*child, depth + 1)));
        }
        text
    }
}
