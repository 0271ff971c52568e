use std::fmt::{self, Display, Formatter};

use log::info;

/// Step an import is in, as reported to progress observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStep {
    Read,
    Download,
    Parse,
    Buffer,
    Texture,
    Material,
    Mesh,
    Node,
    MorphTarget,
    Skin,
    Finalize,
}

impl Display for ImportStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStep::Read => "Reading",
            ImportStep::Download => "Downloading",
            ImportStep::Parse => "Parsing",
            ImportStep::Buffer => "Loading buffers",
            ImportStep::Texture => "Loading textures",
            ImportStep::Material => "Loading materials",
            ImportStep::Mesh => "Loading meshes",
            ImportStep::Node => "Building scene",
            ImportStep::MorphTarget => "Loading morph targets",
            ImportStep::Skin => "Loading skins",
            ImportStep::Finalize => "Finalizing",
        };
        f.write_str(name)
    }
}

type ProgressCallback = Box<dyn FnMut(ImportStep, usize, usize)>;

/// Fans progress reports out to an optional callback and the log.
#[derive(Default)]
pub struct Progress {
    callback: Option<ProgressCallback>,
    log: bool,
}

impl Progress {
    pub fn new(log: bool) -> Self {
        Self {
            callback: None,
            log,
        }
    }

    pub fn set_callback(&mut self, callback: impl FnMut(ImportStep, usize, usize) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn report(&mut self, step: ImportStep, completed: usize, total: usize) {
        if self.log {
            info!("{}: {}/{}", step, completed, total);
        }
        if let Some(callback) = &mut self.callback {
            callback(step, completed, total);
        }
    }
}
