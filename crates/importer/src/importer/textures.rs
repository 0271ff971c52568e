use std::{mem, task::Poll};

use log::debug;

use super::GltfImporter;
use crate::{
    error::{ImageSource, ImportError},
    naming::clean_name,
    progress::ImportStep,
    sink::OutputSink,
    source::{ByteRead, Payload},
    task::{InterleavedTaskSet, Resumable, Step},
    texture::{decode_image, Texture},
};

enum Stage {
    Locate,
    Fetch(ByteRead),
    Decode(Vec<u8>),
    Done,
}

/// Loads one texture: locate its bytes, read them if they live in a file
/// or behind a URL, then decode. Each stage is one resumption.
pub(super) struct TextureLoad {
    index: usize,
    source: ImageSource,
    mime: Option<String>,
    stage: Stage,
}

impl TextureLoad {
    pub(super) fn new(index: usize) -> Self {
        Self {
            index,
            source: ImageSource::Uri(String::new()),
            mime: None,
            stage: Stage::Locate,
        }
    }
}

impl<S: OutputSink + 'static> Resumable<GltfImporter<S>, Texture> for TextureLoad {
    fn resume(&mut self, importer: &mut GltfImporter<S>) -> Result<Poll<Texture>, ImportError> {
        let container = importer.container()?;
        let texture = container
            .document
            .textures()
            .nth(self.index)
            .ok_or(ImportError::PhaseOrder("texture"))?;
        match mem::replace(&mut self.stage, Stage::Done) {
            Stage::Locate => {
                self.stage = match texture.source().source() {
                    gltf::image::Source::View { view, mime_type } => {
                        self.source = ImageSource::View(view.index());
                        self.mime = Some(mime_type.to_string());
                        Stage::Decode(importer.view_bytes(&view)?)
                    }
                    gltf::image::Source::Uri { uri, mime_type } => {
                        self.source = ImageSource::Uri(uri.to_string());
                        self.mime = mime_type.map(str::to_string);
                        match importer.source_mut()?.fetch(uri)? {
                            Payload::Ready(data) => Stage::Decode(data),
                            Payload::Pending(read) => Stage::Fetch(read),
                        }
                    }
                };
                Ok(Poll::Pending)
            }
            Stage::Fetch(mut read) => {
                self.stage = match read.resume()? {
                    Poll::Ready(data) => Stage::Decode(data),
                    Poll::Pending => Stage::Fetch(read),
                };
                Ok(Poll::Pending)
            }
            Stage::Decode(data) => {
                let image = decode_image(&self.source, &data, self.mime.as_deref())?;
                let name = texture
                    .name()
                    .or_else(|| texture.source().name())
                    .map(clean_name)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("Texture_{}", self.index));
                let mut result = Texture {
                    name,
                    image,
                    filter_mode: Default::default(),
                    wrap_mode: Default::default(),
                };
                result.apply_sampler(&texture.sampler());
                debug!("Decoded texture {} from {}", result.name, self.source);
                Ok(Poll::Ready(result))
            }
            Stage::Done => Err(ImportError::PhaseOrder("texture")),
        }
    }
}

impl<S: OutputSink + 'static> GltfImporter<S> {
    pub(super) fn view_bytes(&self, view: &gltf::buffer::View) -> Result<Vec<u8>, ImportError> {
        let index = view.buffer().index();
        let buffer = self
            .cache
            .buffer(index)
            .ok_or(ImportError::BadBufferIndex(index, self.cache.buffers().len()))?;
        let end = view.offset() + view.length();
        buffer
            .get(view.offset()..end)
            .map(<[u8]>::to_vec)
            .ok_or(ImportError::ViewOutOfBounds {
                view: view.index(),
                end,
                length: buffer.len(),
            })
    }

    fn texture_loaded(&mut self, index: usize, texture: Texture) -> Result<(), ImportError> {
        let handle = self.world.textures.add(texture);
        let handle = self.sink.serialize_texture(&mut self.world, index, handle)?;
        let slot = self
            .cache
            .textures
            .get_mut(index)
            .ok_or(ImportError::PhaseOrder("texture"))?;
        *slot = Some(handle);
        let loaded = self.cache.textures.iter().flatten().count();
        self.progress
            .report(ImportStep::Texture, loaded, self.cache.textures.len());
        Ok(())
    }

    /// Advances every unfinished texture once per step.
    pub(super) fn load_textures(&mut self) -> Step<S::Output> {
        let mut set = match self.textures.take() {
            Some(set) => set,
            None => {
                let total = self.container()?.document.textures().len();
                self.progress.report(ImportStep::Texture, 0, total);
                self.cache.textures = vec![None; total];
                let mut set = InterleavedTaskSet::<Self, Texture>::new();
                for index in 0..total {
                    set.push(TextureLoad::new(index));
                }
                set.on_completed(|importer: &mut Self, index, texture| {
                    importer.texture_loaded(index, texture)
                });
                set
            }
        };
        match set.advance(self)? {
            Poll::Pending => {
                self.textures = Some(set);
                Ok(Poll::Pending)
            }
            Poll::Ready(()) => {
                if set.is_empty() {
                    self.progress.report(ImportStep::Texture, 0, 0);
                }
                Ok(Poll::Ready(None))
            }
        }
    }
}
