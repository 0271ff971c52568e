use std::{
    path::{Path, PathBuf},
    sync::Arc,
    task::Poll,
};

use log::{error, info, warn};

use crate::{
    cache::{ImportCache, MeshPrimitive},
    config::ImportOptions,
    container::{self, Container},
    error::ImportError,
    id::ImportId,
    material::Material,
    progress::{ImportStep, Progress},
    sink::{
        FinishedImport, ImportedScene, InMemorySink, OutputSink, PersistedPackage, PersistentSink,
    },
    source::{ByteRead, ByteSource, Payload, Reference},
    task::{ImportTask, InterleavedTaskSet, Step},
    texture::Texture,
    world::World,
};

mod geometry;
mod materials;
mod scene;
mod textures;


/// What to import: a reference to read, bytes already in memory, or both.
/// When bytes are given the reference only serves as the base for
/// relative references.
#[derive(Debug, Clone, Default)]
pub struct ImportInput {
    pub reference: Option<Reference>,
    pub data: Option<Vec<u8>>,
}

impl ImportInput {
    pub fn from_reference(reference: impl Into<Reference>) -> Self {
        Self {
            reference: Some(reference.into()),
            data: None,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            reference: None,
            data: Some(data),
        }
    }

    pub fn with_base(mut self, reference: impl Into<Reference>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

impl From<Reference> for ImportInput {
    fn from(value: Reference) -> Self {
        Self::from_reference(value)
    }
}

impl From<PathBuf> for ImportInput {
    fn from(value: PathBuf) -> Self {
        Self::from_reference(value)
    }
}

impl From<&Path> for ImportInput {
    fn from(value: &Path) -> Self {
        Self::from_reference(value)
    }
}

impl From<Vec<u8>> for ImportInput {
    fn from(value: Vec<u8>) -> Self {
        Self::from_bytes(value)
    }
}

/// The scene the import builds: the document's default scene, else its
/// first one.
pub(crate) fn default_scene(document: &gltf::Document) -> Result<gltf::Scene<'_>, ImportError> {
    document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ImportError::MissingDefaultScene)
}

/// State shared by the phases of one import.
///
/// Everything is staged in a world owned by the importer, so concurrent
/// imports never share objects or assets.
pub struct GltfImporter<S> {
    options: ImportOptions,
    progress: Progress,
    input: ImportInput,
    data: Option<Arc<[u8]>>,
    id: Option<ImportId>,
    source: Option<ByteSource>,
    container: Option<Arc<Container>>,
    name: String,
    cache: ImportCache,
    world: World,
    sink: S,
    cursor: usize,
    started: bool,
    pending: Option<ByteRead>,
    textures: Option<InterleavedTaskSet<GltfImporter<S>, Texture>>,
}

impl<S> GltfImporter<S> {
    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Registers the progress observer, called with `(step, completed, total)`.
    pub fn on_progress(&mut self, callback: impl FnMut(ImportStep, usize, usize) + 'static) {
        self.progress.set_callback(callback);
    }

    pub fn cache(&self) -> &ImportCache {
        &self.cache
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Available once the parse phase ran.
    pub fn document(&self) -> Option<&gltf::Document> {
        self.container.as_ref().map(|container| &container.document)
    }

    /// Available once the input was read.
    pub fn id(&self) -> Option<ImportId> {
        self.id
    }

    /// Name of the root object, set by the scene phase.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S: OutputSink + 'static> GltfImporter<S> {
    pub fn new(input: ImportInput, sink: S, options: ImportOptions) -> Self {
        Self {
            progress: Progress::new(options.log_progress),
            options,
            input,
            data: None,
            id: None,
            source: None,
            container: None,
            name: String::new(),
            cache: ImportCache::new(),
            world: World::new(),
            sink,
            cursor: 0,
            started: false,
            pending: None,
            textures: None,
        }
    }

    fn container(&self) -> Result<Arc<Container>, ImportError> {
        self.container
            .clone()
            .ok_or(ImportError::PhaseOrder("document"))
    }

    fn source_mut(&mut self) -> Result<&mut ByteSource, ImportError> {
        self.source
            .as_mut()
            .ok_or(ImportError::PhaseOrder("byte source"))
    }

    fn begin(&mut self, step: ImportStep, total: usize) {
        if !self.started {
            self.started = true;
            self.progress.report(step, 0, total);
        }
    }

    fn finish(&mut self, step: ImportStep, total: usize) -> Step<S::Output> {
        self.started = false;
        self.cursor = 0;
        self.progress.report(step, total, total);
        Ok(Poll::Ready(None))
    }

    /// Resumes the pending byte read, reporting bytes read so far.
    fn resume_pending(&mut self) -> Result<Poll<Vec<u8>>, ImportError> {
        let read = self
            .pending
            .as_mut()
            .ok_or(ImportError::PhaseOrder("byte read"))?;
        let poll = read.resume()?;
        let step = if read.is_remote() {
            ImportStep::Download
        } else {
            ImportStep::Read
        };
        match &poll {
            Poll::Pending => {
                let total = read.length().map_or(0, |length| length as usize);
                let done = read.bytes_read();
                self.progress.report(step, done, total);
            }
            Poll::Ready(data) => {
                self.progress.report(step, data.len(), data.len());
                self.pending = None;
            }
        }
        Ok(poll)
    }

    fn read(&mut self) -> Step<S::Output> {
        let data = if let Some(data) = self.input.data.take() {
            self.progress.report(ImportStep::Read, 0, data.len());
            self.progress.report(ImportStep::Read, data.len(), data.len());
            data
        } else {
            if self.pending.is_none() {
                let reference = self
                    .input
                    .reference
                    .as_ref()
                    .ok_or(ImportError::MissingInput)?;
                info!("Importing {}", reference);
                let read = ByteRead::open(
                    reference,
                    self.options.read_chunk_size,
                    self.options.platform,
                )?;
                let step = if read.is_remote() {
                    ImportStep::Download
                } else {
                    ImportStep::Read
                };
                let total = read.length().map_or(0, |length| length as usize);
                self.progress.report(step, 0, total);
                self.pending = Some(read);
            }
            match self.resume_pending()? {
                Poll::Ready(data) => data,
                Poll::Pending => return Ok(Poll::Pending),
            }
        };
        self.id = Some(ImportId::digest(&data));
        self.data = Some(Arc::from(data));
        Ok(Poll::Ready(None))
    }

    fn parse(&mut self) -> Step<S::Output> {
        self.progress.report(ImportStep::Parse, 0, 1);
        let data = self
            .data
            .take()
            .ok_or(ImportError::PhaseOrder("input bytes"))?;
        let mut source =
            ByteSource::new(self.input.reference.clone(), Arc::clone(&data), &self.options)?;
        let document = container::unwrap_container(&mut source, &data)?;
        let container = container::parse(&document)?;
        default_scene(&container.document)?;
        info!(
            "Parsed document with {} nodes, {} meshes, {} textures",
            container.document.nodes().len(),
            container.document.meshes().len(),
            container.document.textures().len()
        );
        self.source = Some(source);
        self.container = Some(Arc::new(container));
        self.progress.report(ImportStep::Parse, 1, 1);
        Ok(Poll::Ready(None))
    }

    /// One buffer, or one chunk of an external buffer, per step.
    fn load_buffers(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let total = container.document.buffers().len();
        self.begin(ImportStep::Buffer, total);
        let Some(buffer) = container.document.buffers().nth(self.cursor) else {
            return self.finish(ImportStep::Buffer, total);
        };

        let mut data = if self.pending.is_some() {
            match self.resume_pending()? {
                Poll::Ready(data) => data,
                Poll::Pending => return Ok(Poll::Pending),
            }
        } else {
            match buffer.source() {
                gltf::buffer::Source::Bin => {
                    let chunk = container
                        .document
                        .buffers()
                        .take(self.cursor)
                        .filter(|buffer| matches!(buffer.source(), gltf::buffer::Source::Bin))
                        .count();
                    container
                        .binary_chunk(chunk)
                        .ok_or(ImportError::MissingBinaryChunk(buffer.index()))?
                        .to_vec()
                }
                gltf::buffer::Source::Uri(uri) => match self.source_mut()?.fetch(uri)? {
                    Payload::Ready(data) => data,
                    Payload::Pending(read) => {
                        self.pending = Some(read);
                        return Ok(Poll::Pending);
                    }
                },
            }
        };
        if data.len() < buffer.length() {
            warn!(
                "Buffer #{} holds {} bytes, {} expected",
                buffer.index(),
                data.len(),
                buffer.length()
            );
        }
        data.resize(data.len().div_ceil(4) * 4, 0);
        self.cache.buffers.push(data);
        self.cursor += 1;
        self.progress.report(ImportStep::Buffer, self.cursor, total);
        Ok(Poll::Pending)
    }

    fn load_materials(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let total = container.document.materials().len();
        self.begin(ImportStep::Material, total);
        let Some(material) = container.document.materials().nth(self.cursor) else {
            let default = self.world.materials.add(Material::default_material());
            self.cache.default_material = Some(default);
            return self.finish(ImportStep::Material, total);
        };
        let built = materials::build_material(&material, &self.cache)?;
        let handle = self.world.materials.add(built);
        let handle = self
            .sink
            .serialize_material(&mut self.world, self.cursor, handle)?;
        self.cache.materials.push(handle);
        self.cursor += 1;
        self.progress.report(ImportStep::Material, self.cursor, total);
        Ok(Poll::Pending)
    }

    /// One mesh with all of its primitives per step.
    fn load_meshes(&mut self) -> Step<S::Output> {
        let container = self.container()?;
        let total = container.document.meshes().len();
        self.begin(ImportStep::Mesh, total);
        let Some(mesh) = container.document.meshes().nth(self.cursor) else {
            return self.finish(ImportStep::Mesh, total);
        };

        let mut primitives = Vec::new();
        let mut has_morph_targets = false;
        for primitive in mesh.primitives() {
            let built = geometry::build_mesh(
                &self.cache.buffers,
                &mesh,
                &primitive,
                self.options.recalculate_tangents,
            )?;
            has_morph_targets |= primitive.morph_targets().next().is_some();
            let material = match primitive.material().index() {
                Some(index) => self.cache.material(index),
                None => self.cache.default_material(),
            }
            .ok_or(ImportError::PhaseOrder("material"))?;
            primitives.push(MeshPrimitive {
                mesh: self.world.meshes.add(built),
                material,
            });
        }
        let primitives = self
            .sink
            .serialize_mesh(&mut self.world, mesh.index(), primitives)?;
        if has_morph_targets {
            self.cache.meshes_with_morph_targets.push(mesh.index());
        }
        self.cache.meshes.push(primitives);
        self.cursor += 1;
        self.progress.report(ImportStep::Mesh, self.cursor, total);
        Ok(Poll::Pending)
    }

    fn finalize(&mut self) -> Step<S::Output> {
        self.progress.report(ImportStep::Finalize, 0, 1);
        let id = self.id.ok_or(ImportError::PhaseOrder("input bytes"))?;
        let output = self.sink.finalize(FinishedImport {
            id,
            name: &self.name,
            world: &mut self.world,
            cache: &mut self.cache,
        })?;
        self.progress.report(ImportStep::Finalize, 1, 1);
        info!("Imported {}", self.name);
        Ok(Poll::Ready(Some(output)))
    }

    /// Destroys everything staged so far and removes what the sink wrote.
    fn cleanup(&mut self) {
        self.textures = None;
        self.pending = None;
        self.cache.clear(&mut self.world, &mut self.sink);
        if let Err(error) = self.sink.discard() {
            error!("Can't discard import output: {}", error);
        }
    }
}

/// Builds the task that imports `input` into `sink`.
pub fn import_task<S>(
    input: impl Into<ImportInput>,
    sink: S,
    options: ImportOptions,
) -> ImportTask<GltfImporter<S>, S::Output>
where
    S: OutputSink + 'static,
{
    let mut task = ImportTask::new(GltfImporter::new(input.into(), sink, options));
    task.add_phase("read", GltfImporter::<S>::read);
    task.add_phase("parse", GltfImporter::<S>::parse);
    task.add_phase("buffers", GltfImporter::<S>::load_buffers);
    task.add_phase("textures", GltfImporter::<S>::load_textures);
    task.add_phase("materials", GltfImporter::<S>::load_materials);
    task.add_phase("meshes", GltfImporter::<S>::load_meshes);
    task.add_phase("scene", GltfImporter::<S>::load_scene);
    task.add_phase("morph targets", GltfImporter::<S>::load_morph_targets);
    task.add_phase("skins", GltfImporter::<S>::load_skins);
    task.add_phase("finalize", GltfImporter::<S>::finalize);
    task.on_aborted(GltfImporter::<S>::cleanup);
    task.on_exception(|importer: &mut GltfImporter<S>, _error: &ImportError| importer.cleanup());
    task
}

/// Import kept in memory. Completes with the staging world and its root.
pub fn runtime_import_task(
    input: impl Into<ImportInput>,
    options: ImportOptions,
) -> ImportTask<GltfImporter<InMemorySink>, ImportedScene> {
    import_task(input, InMemorySink, options)
}

/// Import persisted under `root`. Fails right away when `root` exists and
/// `overwrite_existing` is off.
pub fn persistent_import_task(
    input: impl Into<ImportInput>,
    root: impl Into<PathBuf>,
    options: ImportOptions,
) -> Result<ImportTask<GltfImporter<PersistentSink>, PersistedPackage>, ImportError> {
    let sink = PersistentSink::new(root, options.overwrite_existing)?;
    Ok(import_task(input, sink, options))
}
