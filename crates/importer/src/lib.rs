//! Incremental glTF importer.
//!
//! This library turns a `.gltf`, `.glb` or `.zip` input into a scene graph
//! without blocking its host. An import is an [`ImportTask`](task::ImportTask)
//! made of resumable phases which the host advances once per frame. Decoded
//! entities are staged in an [`ImportCache`](cache::ImportCache), and an
//! [`OutputSink`](sink::OutputSink) decides whether they only live in memory
//! or are also persisted as named artifacts on disk.

pub mod accessor;
pub mod archive;
pub mod cache;
pub mod config;
pub mod container;
pub mod coords;
pub mod error;
pub mod id;
/// Import phases and task builders.
pub mod importer;
pub mod material;
pub mod mesh;
pub mod naming;
pub mod progress;
pub mod sink;
pub mod skin;
/// Byte sources and reference resolution.
pub mod source;
pub mod task;
pub mod texture;
pub mod world;

pub use config::{ImportOptions, Platform};
pub use error::ImportError;
pub use importer::{
    import_task, persistent_import_task, runtime_import_task, GltfImporter, ImportInput,
};
pub use progress::ImportStep;
pub use sink::{ImportedScene, InMemorySink, OutputSink, PersistedPackage, PersistentSink};
pub use task::{ImportTask, InterleavedTaskSet, TaskStatus};
pub use world::{ObjectId, World};
