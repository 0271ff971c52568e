use std::mem;

use super::{FinishedImport, OutputSink};
use crate::{
    cache::MeshPrimitive,
    error::ImportError,
    id::ImportId,
    material::Material,
    texture::Texture,
    world::{Handle, ObjectId, World},
};

/// Result of an in-memory import: the staging world and its root object.
pub struct ImportedScene {
    pub id: ImportId,
    pub world: World,
    pub root: ObjectId,
}

impl ImportedScene {
    /// Moves the imported hierarchy into `host`, under `parent`.
    pub fn attach_to(self, host: &mut World, parent: Option<ObjectId>) -> Option<ObjectId> {
        host.adopt(self.world, self.root, parent)
    }
}

/// Keeps imported entities in memory only. Destruction is deferred until
/// the next reclaim.
#[derive(Debug, Default)]
pub struct InMemorySink;

impl OutputSink for InMemorySink {
    type Output = ImportedScene;

    fn serialize_texture(
        &mut self,
        _world: &mut World,
        _index: usize,
        texture: Handle<Texture>,
    ) -> Result<Handle<Texture>, ImportError> {
        Ok(texture)
    }

    fn serialize_material(
        &mut self,
        _world: &mut World,
        _index: usize,
        material: Handle<Material>,
    ) -> Result<Handle<Material>, ImportError> {
        Ok(material)
    }

    fn serialize_mesh(
        &mut self,
        _world: &mut World,
        _index: usize,
        primitives: Vec<MeshPrimitive>,
    ) -> Result<Vec<MeshPrimitive>, ImportError> {
        Ok(primitives)
    }

    fn destroy(&mut self, world: &mut World, object: ObjectId) {
        world.destroy(object);
    }

    fn finalize(&mut self, finished: FinishedImport<'_>) -> Result<ImportedScene, ImportError> {
        let root = finished.cache.release().ok_or(ImportError::MissingResult)?;
        Ok(ImportedScene {
            id: finished.id,
            world: mem::take(finished.world),
            root,
        })
    }
}
