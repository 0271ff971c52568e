use std::task::Poll;

use glam::Mat4;
use gltf::{
    accessor::{DataType, Dimensions},
    scene::Transform,
    Semantic,
};
use log::{debug, warn};

use super::{default_scene, geometry::read_vec3, GltfImporter};
use crate::{
    accessor::{check_accessor, check_dimensions, chunk_mat4, chunk_vec4, read_f32, read_joints,
        read_normalized},
    coords::{convert_matrix, convert_trs},
    error::ImportError,
    naming::{blend_shape_name, clean_name, node_name},
    progress::ImportStep,
    sink::OutputSink,
    skin,
    source::Reference,
    task::Step,
    world::{ObjectId, Renderer},
};

impl<S: OutputSink + 'static> GltfImporter<S> {
    fn root_name(&self, scene: &gltf::Scene) -> String {
        self.options
            .scene_name
            .clone()
            .or_else(|| scene.name().map(str::to_string))
            .or_else(|| self.input.reference.as_ref().and_then(Reference::file_stem))
            .map(|name| clean_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| String::from("model"))
    }

    /// Instantiates `node` and its subtree depth first. The object is
    /// attached to `parent` only after its children are in place.
    fn create_node(&mut self, node: &gltf::Node, parent: ObjectId) -> Result<(), ImportError> {
        if self.cache.nodes.contains_key(&node.index()) {
            return Err(ImportError::DuplicateNode(node.index()));
        }
        let object = self.world.spawn(node_name(node.name(), node.index()));
        let trs = match node.transform() {
            Transform::Matrix { matrix } => convert_matrix(Mat4::from_cols_array_2d(&matrix)),
            Transform::Decomposed {
                translation,
                rotation,
                scale,
            } => convert_trs(translation, rotation, scale),
        };
        if let Some(created) = self.world.get_mut(object) {
            created.transform = trs.into();
        }
        self.cache.nodes.insert(node.index(), object);
        if let Some(mesh) = node.mesh() {
            self.cache
                .mesh_to_nodes
                .entry(mesh.index())
                .or_default()
                .push(node.index());
        }
        if let Some(skin) = node.skin() {
            self.cache
                .skin_to_nodes
                .entry(skin.index())
                .or_default()
                .push(node.index());
        }
        for child in node.children() {
            self.create_node(&child, object)?;
        }
        self.world.set_parent(object, Some(parent));
        Ok(())
    }

    /// Puts primitive 0 of each mesh instance on the node's own object and
    /// every other primitive on a sibling with the same transform.
    fn setup_mesh_nodes(&mut self) -> Result<(), ImportError> {
        let instances: Vec<(usize, Vec<usize>)> = self
            .cache
            .mesh_to_nodes
            .iter()
            .map(|(mesh, nodes)| (*mesh, nodes.clone()))
            .collect();
        for (mesh, nodes) in instances {
            let primitives = self
                .cache
                .mesh(mesh)
                .ok_or(ImportError::PhaseOrder("mesh"))?
                .to_vec();
            for node in nodes {
                let object = self
                    .cache
                    .node(node)
                    .ok_or(ImportError::PhaseOrder("node"))?;
                let mut objects = Vec::with_capacity(primitives.len());
                for (index, primitive) in primitives.iter().enumerate() {
                    let target = if index == 0 {
                        object
                    } else {
                        let source = self
                            .world
                            .get(object)
                            .ok_or(ImportError::StaleHandle("object"))?;
                        let (name, transform) = (source.name.clone(), source.transform);
                        let sibling = self.world.spawn(name);
                        if let Some(sibling) = self.world.get_mut(sibling) {
                            sibling.transform = transform;
                        }
                        let parent = self.world.parent(object);
                        self.world.set_parent(sibling, parent);
                        sibling
                    };
                    if let Some(target) = self.world.get_mut(target) {
                        target.renderer = Some(Renderer::Mesh {
                            mesh: primitive.mesh,
                            material: primitive.material,
                        });
                    }
                    objects.push(target);
                }
                self.cache.node_to_mesh_primitives.insert(node, objects);
            }
        }
        Ok(())
    }

    /// One root node of the default scene per step, then mesh attachment.
    pub(super) fn load_scene(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let scene = default_scene(&container.document)?;
        let total = container.document.nodes().len();
        let root = match self.cache.scene {
            Some(root) => root,
            None => {
                self.progress.report(ImportStep::Node, 0, total);
                self.name = self.root_name(&scene);
                let root = self.world.spawn(self.name.clone());
                self.cache.scene = Some(root);
                root
            }
        };

        if let Some(node) = scene.nodes().nth(self.cursor) {
            self.create_node(&node, root)?;
            self.cursor += 1;
            self.progress
                .report(ImportStep::Node, self.cache.node_count(), total);
            return Ok(Poll::Pending);
        }
        self.setup_mesh_nodes()?;
        self.cursor = 0;
        self.progress
            .report(ImportStep::Node, self.cache.node_count(), total);
        Ok(Poll::Ready(None))
    }

    /// Blend shapes of one mesh per step.
    pub(super) fn load_morph_targets(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let total = self.cache.meshes_with_morph_targets.len();
        self.begin(ImportStep::MorphTarget, total);
        let Some(&mesh_index) = self.cache.meshes_with_morph_targets.get(self.cursor) else {
            return self.finish(ImportStep::MorphTarget, total);
        };
        let mesh = container
            .document
            .meshes()
            .nth(mesh_index)
            .ok_or(ImportError::PhaseOrder("mesh"))?;

        for primitive in mesh.primitives() {
            let Some(entry) = self
                .cache
                .mesh(mesh_index)
                .and_then(|primitives| primitives.get(primitive.index()))
                .copied()
            else {
                continue;
            };
            let mut targets = Vec::new();
            for target in primitive.morph_targets() {
                let positions = match target.positions() {
                    Some(accessor) => read_vec3(&self.cache.buffers, &accessor)?,
                    None => Vec::new(),
                };
                let normals = match target.normals() {
                    Some(accessor) => read_vec3(&self.cache.buffers, &accessor)?,
                    None => Vec::new(),
                };
                targets.push((positions, normals));
            }

            let Some(built) = self.world.meshes.get_mut(entry.mesh) else {
                continue;
            };
            let count = built.vertex_count();
            let mut added = false;
            for (target, (mut positions, mut normals)) in targets.into_iter().enumerate() {
                if positions.is_empty() {
                    positions = vec![[0.0; 3]; count];
                }
                if normals.is_empty() {
                    normals = vec![[0.0; 3]; count];
                }
                if positions.len() != count || normals.len() != count {
                    warn!(
                        "Morph target {} of {} has {} deltas for {} vertices, skipping it",
                        target,
                        built.name,
                        positions.len(),
                        count
                    );
                    continue;
                }
                built.add_blend_shape_frame(
                    blend_shape_name(mesh_index, target),
                    1.0,
                    positions,
                    normals,
                    vec![[0.0; 3]; count],
                );
                added = true;
            }
            if !added {
                continue;
            }

            for node in self.cache.mesh_instances(mesh_index) {
                let object = self
                    .cache
                    .node_primitives(*node)
                    .and_then(|objects| objects.get(primitive.index()));
                let renderer = object
                    .and_then(|object| self.world.get_mut(*object))
                    .and_then(|object| object.renderer.as_mut());
                if let Some(renderer) = renderer {
                    renderer.make_skinned();
                }
            }
        }

        self.cursor += 1;
        self.progress
            .report(ImportStep::MorphTarget, self.cursor, total);
        Ok(Poll::Pending)
    }

    /// One skin per step. Invalid skins are logged and skipped.
    pub(super) fn load_skins(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let total = container.document.skins().len();
        self.begin(ImportStep::Skin, total);
        let Some(skin) = container.document.skins().nth(self.cursor) else {
            return self.finish(ImportStep::Skin, total);
        };
        self.cursor += 1;
        match self.bind_skin(&container.document, &skin) {
            Ok(()) => {}
            Err(error @ ImportError::InvalidSkin { .. }) => warn!("{}, skipping it", error),
            Err(error) => return Err(error),
        }
        self.progress.report(ImportStep::Skin, self.cursor, total);
        Ok(Poll::Pending)
    }

    fn bind_skin(
        &mut self,
        document: &gltf::Document,
        skin: &gltf::Skin,
    ) -> Result<(), ImportError> {
        let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
        let inverse_bind_matrices = match skin.inverse_bind_matrices() {
            Some(accessor) => {
                check_accessor(&accessor, DataType::F32, Dimensions::Mat4)?;
                chunk_mat4(&read_f32(&self.cache.buffers, &accessor)?)
            }
            None => vec![Mat4::IDENTITY; joints.len()],
        };
        if joints.is_empty() || joints.len() != inverse_bind_matrices.len() {
            return Err(ImportError::InvalidSkin {
                skin: skin.index(),
                joints: joints.len(),
                inverse_bind_matrices: inverse_bind_matrices.len(),
            });
        }
        let Some(bones) = joints
            .iter()
            .map(|joint| self.cache.node(*joint))
            .collect::<Option<Vec<_>>>()
        else {
            warn!(
                "Skin #{} uses joints outside the imported scene, skipping it",
                skin.index()
            );
            return Ok(());
        };
        let root_bone = skin
            .skeleton()
            .and_then(|skeleton| self.cache.node(skeleton.index()));
        let bind_poses = skin::bind_poses(&inverse_bind_matrices);

        for node_index in self.cache.skin_instances(skin.index()).to_vec() {
            let Some(mesh) = document.nodes().nth(node_index).and_then(|node| node.mesh()) else {
                warn!("Node #{} has a skin but no mesh", node_index);
                continue;
            };
            for primitive in mesh.primitives() {
                let Some(entry) = self
                    .cache
                    .mesh(mesh.index())
                    .and_then(|primitives| primitives.get(primitive.index()))
                    .copied()
                else {
                    continue;
                };
                let (Some(joints), Some(weights)) = (
                    primitive.get(&Semantic::Joints(0)),
                    primitive.get(&Semantic::Weights(0)),
                ) else {
                    warn!(
                        "Primitive {} of mesh #{} has no skinning data",
                        primitive.index(),
                        mesh.index()
                    );
                    continue;
                };
                let joints = read_joints(&self.cache.buffers, &joints)?;
                check_dimensions(&weights, Dimensions::Vec4)?;
                let weights = chunk_vec4(&read_normalized(&self.cache.buffers, &weights)?);

                let Some(target) = self.world.meshes.get_mut(entry.mesh) else {
                    continue;
                };
                match skin::bone_weights(&joints, &weights) {
                    Some(bone_weights) if bone_weights.len() == target.vertex_count() => {
                        target.bone_weights = bone_weights;
                        target.bind_poses = bind_poses.clone();
                    }
                    _ => {
                        warn!(
                            "{} has {} joints and {} weights for {} vertices, not skinning it",
                            target.name,
                            joints.len(),
                            weights.len(),
                            target.vertex_count()
                        );
                        continue;
                    }
                }

                let object = self
                    .cache
                    .node_primitives(node_index)
                    .and_then(|objects| objects.get(primitive.index()));
                let renderer = object
                    .and_then(|object| self.world.get_mut(*object))
                    .and_then(|object| object.renderer.as_mut());
                if let Some(renderer) = renderer {
                    renderer.bind_bones(bones.clone(), root_bone);
                }
            }
        }
        debug!("Bound skin #{} with {} bones", skin.index(), bones.len());
        Ok(())
    }
}
