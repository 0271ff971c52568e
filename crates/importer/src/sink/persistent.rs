use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use image::ImageFormat;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{FinishedImport, OutputSink};
use crate::{
    cache::MeshPrimitive,
    error::{ImportError, SinkWriteError},
    id::ImportId,
    material::Material,
    mesh::Mesh,
    naming::clean_name,
    texture::Texture,
    world::{Handle, ObjectId, Renderer, World},
};

pub const TEXTURES_DIR: &str = "Textures";
pub const MATERIALS_DIR: &str = "Materials";
pub const MESHES_DIR: &str = "Meshes";

/// Result of a persistent import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPackage {
    pub id: ImportId,
    pub root_dir: PathBuf,
    pub manifest: PathBuf,
}

impl PersistedPackage {
    pub fn load_manifest(&self) -> Result<SceneManifest, ImportError> {
        let file = File::open(&self.manifest)
            .map_err(|error| SinkWriteError::Io(self.manifest.clone(), error))?;
        let manifest = serde_json::from_reader(BufReader::new(file))
            .map_err(|error| SinkWriteError::Json(self.manifest.clone(), error))?;
        Ok(manifest)
    }
}

/// Hierarchy of a persisted import, with assets referred to by artifact
/// path relative to the package root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    pub id: ImportId,
    pub name: String,
    /// Pre-order. The root comes first.
    pub objects: Vec<ManifestObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestObject {
    pub name: String,
    pub parent: Option<usize>,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub renderer: Option<ManifestRenderer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRenderer {
    pub mesh: String,
    /// `None` for the built-in default material.
    pub material: Option<String>,
    pub skinned: bool,
    pub bones: Vec<usize>,
    pub root_bone: Option<usize>,
}

/// Writes every entity under one import root and swaps in the reloaded
/// copy, so later phases see what is on disk.
///
/// Objects are destroyed immediately. An aborted import removes the root
/// if this sink created it. Otherwise only the files it wrote and the
/// directories it created are removed.
pub struct PersistentSink {
    root: PathBuf,
    created_root: bool,
    created_dirs: Vec<PathBuf>,
    /// Relative paths of every artifact written so far.
    written: Vec<String>,
    texture_paths: HashMap<Handle<Texture>, String>,
    texture_handles: HashMap<String, Handle<Texture>>,
    material_paths: HashMap<Handle<Material>, String>,
    mesh_paths: HashMap<Handle<Mesh>, String>,
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SinkWriteError + '_ {
    move |error| SinkWriteError::Io(path.to_path_buf(), error)
}

impl PersistentSink {
    pub fn new(root: impl Into<PathBuf>, overwrite: bool) -> Result<Self, ImportError> {
        let root = root.into();
        if root.exists() && !overwrite {
            return Err(SinkWriteError::AlreadyExists(root).into());
        }
        let created_root = !root.exists();
        let mut created_dirs = Vec::new();
        for dir in [TEXTURES_DIR, MATERIALS_DIR, MESHES_DIR] {
            let path = root.join(dir);
            if !path.exists() {
                fs::create_dir_all(&path).map_err(io_error(&path))?;
                created_dirs.push(path);
            }
        }
        debug!("Persisting import to {}", root.display());
        Ok(Self {
            root,
            created_root,
            created_dirs,
            written: Vec::new(),
            texture_paths: HashMap::new(),
            texture_handles: HashMap::new(),
            material_paths: HashMap::new(),
            mesh_paths: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn remove_root(&self) -> Result<(), ImportError> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!("Removed {}", self.root.display());
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(SinkWriteError::Io(self.root.clone(), error).into()),
        }
    }

    fn remove_written(&mut self) -> Result<(), ImportError> {
        for relative in self.written.drain(..) {
            let path = self.root.join(relative);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(SinkWriteError::Io(path, error).into()),
            }
        }
        // Only succeeds on directories left empty.
        for dir in self.created_dirs.drain(..) {
            if let Err(error) = fs::remove_dir(&dir) {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!("Can't remove {}: {}", dir.display(), error);
                }
            }
        }
        debug!("Removed import artifacts from {}", self.root.display());
        Ok(())
    }

    fn create(&self, relative: &str) -> Result<(PathBuf, BufWriter<File>), SinkWriteError> {
        let path = self.root.join(relative);
        let file = File::create(&path).map_err(io_error(&path))?;
        Ok((path, BufWriter::new(file)))
    }

    fn open(&self, relative: &str) -> Result<(PathBuf, BufReader<File>), SinkWriteError> {
        let path = self.root.join(relative);
        let file = File::open(&path).map_err(io_error(&path))?;
        Ok((path, BufReader::new(file)))
    }

    fn write_mesh(&self, relative: &str, mesh: &Mesh) -> Result<(), SinkWriteError> {
        let (path, mut writer) = self.create(relative)?;
        bincode::serialize_into(&mut writer, mesh)
            .map_err(|error| SinkWriteError::Bincode(path, error))
    }

    fn read_mesh(&self, relative: &str) -> Result<Mesh, SinkWriteError> {
        let (path, reader) = self.open(relative)?;
        bincode::deserialize_from(reader).map_err(|error| SinkWriteError::Bincode(path, error))
    }

    fn manifest(&self, world: &World, root: ObjectId, id: ImportId, name: &str) -> SceneManifest {
        let order = world.descendants(root);
        let positions: HashMap<ObjectId, usize> = order
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        let objects = order
            .iter()
            .filter_map(|id| world.get(*id))
            .map(|object| ManifestObject {
                name: object.name.clone(),
                parent: object.parent().and_then(|parent| positions.get(&parent).copied()),
                position: object.transform.position.to_array(),
                rotation: object.transform.rotation.to_array(),
                scale: object.transform.scale.to_array(),
                renderer: object.renderer.as_ref().and_then(|renderer| {
                    let Some(mesh) = self.mesh_paths.get(&renderer.mesh()) else {
                        warn!("{} renders a mesh that was never persisted", object.name);
                        return None;
                    };
                    let (bones, root_bone) = match renderer {
                        Renderer::Skinned(skinned) => (
                            skinned
                                .bones
                                .iter()
                                .filter_map(|bone| positions.get(bone).copied())
                                .collect(),
                            skinned.root_bone.and_then(|bone| positions.get(&bone).copied()),
                        ),
                        Renderer::Mesh { .. } => (Vec::new(), None),
                    };
                    Some(ManifestRenderer {
                        mesh: mesh.clone(),
                        material: self.material_paths.get(&renderer.material()).cloned(),
                        skinned: matches!(renderer, Renderer::Skinned(_)),
                        bones,
                        root_bone,
                    })
                }),
            })
            .collect();
        SceneManifest {
            id,
            name: name.to_string(),
            objects,
        }
    }
}

impl OutputSink for PersistentSink {
    type Output = PersistedPackage;

    fn serialize_texture(
        &mut self,
        world: &mut World,
        index: usize,
        texture: Handle<Texture>,
    ) -> Result<Handle<Texture>, ImportError> {
        let relative = format!("{}/texture_{}.png", TEXTURES_DIR, index);
        let path = self.root.join(&relative);
        self.written.push(relative.clone());
        let source = world
            .textures
            .get(texture)
            .ok_or(ImportError::StaleHandle("texture"))?;
        source
            .encodable_image()
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|error| SinkWriteError::Image(path.clone(), error))?;

        let image = image::open(&path).map_err(|error| SinkWriteError::Image(path, error))?;
        let reloaded = Texture { image, ..source.clone() };
        world.textures.remove(texture);
        let handle = world.textures.add(reloaded);
        self.texture_handles.insert(relative.clone(), handle);
        self.texture_paths.insert(handle, relative);
        Ok(handle)
    }

    fn serialize_material(
        &mut self,
        world: &mut World,
        index: usize,
        material: Handle<Material>,
    ) -> Result<Handle<Material>, ImportError> {
        let relative = format!("{}/material_{}.json", MATERIALS_DIR, index);
        let source = world
            .materials
            .get(material)
            .cloned()
            .ok_or(ImportError::StaleHandle("material"))?;
        let persisted = source.try_map_textures(|texture| {
            self.texture_paths
                .get(&texture)
                .cloned()
                .ok_or_else(|| SinkWriteError::MissingArtifact(format!("{:?}", texture)))
        })?;
        self.written.push(relative.clone());
        let (path, mut writer) = self.create(&relative)?;
        serde_json::to_writer_pretty(&mut writer, &persisted)
            .map_err(|error| SinkWriteError::Json(path, error))?;
        drop(writer);

        let (path, reader) = self.open(&relative)?;
        let reloaded: Material<String> = serde_json::from_reader(reader)
            .map_err(|error| SinkWriteError::Json(path, error))?;
        let reloaded = reloaded.try_map_textures(|path| {
            self.texture_handles
                .get(&path)
                .copied()
                .ok_or(SinkWriteError::MissingArtifact(path))
        })?;
        world.materials.remove(material);
        let handle = world.materials.add(reloaded);
        self.material_paths.insert(handle, relative);
        Ok(handle)
    }

    fn serialize_mesh(
        &mut self,
        world: &mut World,
        index: usize,
        primitives: Vec<MeshPrimitive>,
    ) -> Result<Vec<MeshPrimitive>, ImportError> {
        let mut persisted = Vec::with_capacity(primitives.len());
        for (primitive, entry) in primitives.into_iter().enumerate() {
            let relative = format!("{}/mesh_{}_{}.bin", MESHES_DIR, index, primitive);
            let mesh = world
                .meshes
                .get(entry.mesh)
                .ok_or(ImportError::StaleHandle("mesh"))?;
            self.written.push(relative.clone());
            self.write_mesh(&relative, mesh)?;
            let reloaded = self.read_mesh(&relative)?;
            world.meshes.remove(entry.mesh);
            let handle = world.meshes.add(reloaded);
            self.mesh_paths.insert(handle, relative);
            persisted.push(MeshPrimitive {
                mesh: handle,
                material: entry.material,
            });
        }
        Ok(persisted)
    }

    fn destroy(&mut self, world: &mut World, object: ObjectId) {
        world.destroy_immediate(object);
    }

    fn discard(&mut self) -> Result<(), ImportError> {
        if self.created_root {
            self.remove_root()
        } else {
            self.remove_written()
        }
    }

    fn finalize(&mut self, finished: FinishedImport<'_>) -> Result<PersistedPackage, ImportError> {
        let root = finished.cache.scene().ok_or(ImportError::MissingResult)?;

        // Blend shapes and skins land after the first write.
        for (handle, relative) in &self.mesh_paths {
            if let Some(mesh) = finished.world.meshes.get(*handle) {
                self.write_mesh(relative, mesh)?;
            }
        }

        let manifest = self.manifest(finished.world, root, finished.id, finished.name);
        let mut stem = clean_name(finished.name);
        if stem.is_empty() {
            stem = String::from("scene");
        }
        let relative = format!("{}.scene.json", stem);
        self.written.push(relative.clone());
        let (path, mut writer) = self.create(&relative)?;
        serde_json::to_writer_pretty(&mut writer, &manifest)
            .map_err(|error| SinkWriteError::Json(path.clone(), error))?;
        drop(writer);

        finished.cache.clear(finished.world, self);
        info!("Persisted {} to {}", finished.name, path.display());
        Ok(PersistedPackage {
            id: finished.id,
            root_dir: self.root.clone(),
            manifest: path,
        })
    }
}

#[cfg(test)]
mod test {
    use image::DynamicImage;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        cache::ImportCache,
        material::TextureSlot,
        texture::{FilterMode, WrapMode},
        world::SkinnedRenderer,
    };

    fn texture() -> Texture {
        Texture {
            name: "albedo".to_string(),
            image: DynamicImage::new_rgba8(2, 2),
            filter_mode: FilterMode::Point,
            wrap_mode: WrapMode::Clamp,
        }
    }

    fn mesh() -> Mesh {
        let mut mesh = Mesh {
            name: "Mesh_0".to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![0, 2, 1],
            ..Default::default()
        };
        mesh.recalculate_bounds();
        mesh
    }

    #[test]
    fn refuses_existing_root() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            PersistentSink::new(dir.path(), false),
            Err(ImportError::SinkWrite(SinkWriteError::AlreadyExists(_)))
        ));
        let sink = PersistentSink::new(dir.path(), true).unwrap();
        assert!(sink.root().join(MESHES_DIR).is_dir());
    }

    #[test]
    fn serializes_and_swaps_handles() {
        let dir = tempdir().unwrap();
        let mut sink = PersistentSink::new(dir.path().join("model"), false).unwrap();
        let mut world = World::new();

        let original = world.textures.add(texture());
        let texture = sink.serialize_texture(&mut world, 0, original).unwrap();
        assert_ne!(texture, original);
        assert!(!world.textures.contains(original));
        assert_eq!(world.textures.get(texture).unwrap().size(), (2, 2));
        assert_eq!(world.textures.get(texture).unwrap().filter_mode, FilterMode::Point);

        let material = world.materials.add(Material {
            name: "Skin".to_string(),
            base_color_texture: Some(TextureSlot {
                texture,
                tex_coord: 0,
            }),
            ..Default::default()
        });
        let material = sink.serialize_material(&mut world, 0, material).unwrap();
        assert_eq!(world.materials.len(), 1);
        let reloaded = world.materials.get(material).unwrap();
        assert_eq!(reloaded.name, "Skin");
        assert_eq!(reloaded.textures().copied().collect::<Vec<_>>(), vec![texture]);
        let json = fs::read_to_string(sink.root().join("Materials/material_0.json")).unwrap();
        assert!(json.contains("Textures/texture_0.png"));

        let primitive = MeshPrimitive {
            mesh: world.meshes.add(mesh()),
            material,
        };
        let persisted = sink.serialize_mesh(&mut world, 3, vec![primitive]).unwrap();
        assert_eq!(persisted[0].material, material);
        assert_eq!(world.meshes.get(persisted[0].mesh), Some(&mesh()));
        assert!(sink.root().join("Meshes/mesh_3_0.bin").is_file());
    }

    #[test]
    fn unknown_texture_fails_material() {
        let dir = tempdir().unwrap();
        let mut sink = PersistentSink::new(dir.path().join("model"), false).unwrap();
        let mut world = World::new();
        let texture = world.textures.add(texture());
        let material = world.materials.add(Material {
            emissive_texture: Some(TextureSlot {
                texture,
                tex_coord: 0,
            }),
            ..Default::default()
        });
        assert!(matches!(
            sink.serialize_material(&mut world, 0, material),
            Err(ImportError::SinkWrite(SinkWriteError::MissingArtifact(_)))
        ));
    }

    #[test]
    fn finalize_writes_manifest_and_clears_staging() {
        let dir = tempdir().unwrap();
        let mut sink = PersistentSink::new(dir.path().join("model"), false).unwrap();
        let mut world = World::new();
        let mut cache = ImportCache::new();

        let default_material = world.materials.add(Material::default_material());
        let mesh = world.meshes.add(mesh());
        let primitives = sink
            .serialize_mesh(
                &mut world,
                0,
                vec![MeshPrimitive {
                    mesh,
                    material: default_material,
                }],
            )
            .unwrap();
        let mesh = primitives[0].mesh;
        world.meshes.get_mut(mesh).unwrap().bone_weights = vec![Default::default(); 3];

        let scene = world.spawn("Robot");
        let body = world.spawn("Body");
        let bone = world.spawn("Bone");
        world.set_parent(body, Some(scene));
        world.set_parent(bone, Some(scene));
        world.get_mut(body).unwrap().renderer = Some(Renderer::Skinned(SkinnedRenderer {
            mesh,
            material: default_material,
            bones: vec![bone],
            root_bone: Some(bone),
        }));
        cache.scene = Some(scene);
        cache.nodes.insert(0, body);
        cache.nodes.insert(1, bone);
        cache.node_to_mesh_primitives.insert(0, vec![body]);

        let id = ImportId::digest(b"robot");
        let package = sink
            .finalize(FinishedImport {
                id,
                name: "Robot",
                world: &mut world,
                cache: &mut cache,
            })
            .unwrap();

        assert_eq!(package.manifest, sink.root().join("Robot.scene.json"));
        let manifest = package.load_manifest().unwrap();
        assert_eq!(manifest.id, id);
        let names: Vec<&str> = manifest.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Robot", "Body", "Bone"]);
        assert_eq!(manifest.objects[1].parent, Some(0));
        let renderer = manifest.objects[1].renderer.as_ref().unwrap();
        assert_eq!(renderer.mesh, "Meshes/mesh_0_0.bin");
        assert_eq!(renderer.material, None);
        assert!(renderer.skinned);
        assert_eq!(renderer.bones, vec![2]);
        assert_eq!(renderer.root_bone, Some(2));

        let rewritten = sink.read_mesh("Meshes/mesh_0_0.bin").unwrap();
        assert_eq!(rewritten.bone_weights.len(), 3);
        assert_eq!(world.live_object_count(), 0);
        assert!(world.meshes.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn discard_removes_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("model");
        let mut sink = PersistentSink::new(&root, false).unwrap();
        assert!(root.is_dir());
        sink.discard().unwrap();
        assert!(!root.exists());
        sink.discard().unwrap();
    }

    #[test]
    fn discard_keeps_existing_root_contents() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("model");
        fs::create_dir_all(root.join(MESHES_DIR)).unwrap();
        fs::write(root.join("notes.txt"), b"keep").unwrap();
        fs::write(root.join(MESHES_DIR).join("other.bin"), b"keep").unwrap();

        let mut sink = PersistentSink::new(&root, true).unwrap();
        let mut world = World::new();
        let texture = world.textures.add(texture());
        sink.serialize_texture(&mut world, 0, texture).unwrap();
        let primitive = MeshPrimitive {
            mesh: world.meshes.add(mesh()),
            material: world.materials.add(Material::default_material()),
        };
        sink.serialize_mesh(&mut world, 0, vec![primitive]).unwrap();
        assert!(root.join("Textures/texture_0.png").is_file());
        assert!(root.join("Meshes/mesh_0_0.bin").is_file());

        sink.discard().unwrap();
        assert!(root.join("notes.txt").is_file());
        assert!(root.join("Meshes/other.bin").is_file());
        assert!(!root.join("Meshes/mesh_0_0.bin").exists());
        assert!(!root.join(TEXTURES_DIR).exists());
        assert!(!root.join(MATERIALS_DIR).exists());
    }
}
