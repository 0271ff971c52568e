/// Host platform, which decides how relative references may be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Desktop,
    /// Browser builds. Local paths can't be read.
    Web,
    /// Android builds. `content:` URIs can't be used as a base.
    Android,
}

impl Platform {
    pub const fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else {
            Platform::Desktop
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Name of the root object. Falls back to the scene name, then to the
    /// file stem of the input reference.
    pub scene_name: Option<String>,
    /// Bytes read from a file or a network stream per resumption.
    pub read_chunk_size: usize,
    pub platform: Platform,
    /// Mirror every progress report to the `log` facade.
    pub log_progress: bool,
    /// Let a persistent import reuse an existing import directory.
    pub overwrite_existing: bool,
    /// Generate tangents for primitives that have normals and UVs but no
    /// tangents.
    pub recalculate_tangents: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            scene_name: None,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            platform: Platform::default(),
            log_progress: false,
            overwrite_existing: false,
            recalculate_tangents: true,
        }
    }
}
