//! Where imported entities end up.
//!
//! The import phases hand every texture, material and mesh to an
//! [`OutputSink`] right after creating it, and route object destruction
//! through it. [`InMemorySink`] keeps everything in the staging world and
//! returns it. [`PersistentSink`] also writes each entity to disk and swaps
//! in the reloaded copy.

use crate::{
    cache::{ImportCache, MeshPrimitive},
    error::ImportError,
    id::ImportId,
    material::Material,
    texture::Texture,
    world::{Handle, ObjectId, World},
};

mod memory;
mod persistent;

pub use memory::{ImportedScene, InMemorySink};
pub use persistent::{
    ManifestObject, ManifestRenderer, PersistedPackage, PersistentSink, SceneManifest,
};

/// Staging state handed to [`OutputSink::finalize`] once every phase ran.
pub struct FinishedImport<'a> {
    pub id: ImportId,
    pub name: &'a str,
    pub world: &'a mut World,
    pub cache: &'a mut ImportCache,
}

pub trait OutputSink {
    type Output;

    /// Called for texture `index` right after it is decoded. Returns the
    /// handle later phases must use.
    fn serialize_texture(
        &mut self,
        world: &mut World,
        index: usize,
        texture: Handle<Texture>,
    ) -> Result<Handle<Texture>, ImportError>;

    fn serialize_material(
        &mut self,
        world: &mut World,
        index: usize,
        material: Handle<Material>,
    ) -> Result<Handle<Material>, ImportError>;

    /// Called once per document mesh with all of its primitives.
    fn serialize_mesh(
        &mut self,
        world: &mut World,
        index: usize,
        primitives: Vec<MeshPrimitive>,
    ) -> Result<Vec<MeshPrimitive>, ImportError>;

    fn destroy(&mut self, world: &mut World, object: ObjectId);

    /// Drops assets that no surviving object uses.
    fn reclaim(&mut self, world: &mut World) {
        world.unload_unused_assets();
    }

    /// Removes whatever the sink produced outside the world.
    fn discard(&mut self) -> Result<(), ImportError> {
        Ok(())
    }

    fn finalize(&mut self, finished: FinishedImport<'_>) -> Result<Self::Output, ImportError>;
}
