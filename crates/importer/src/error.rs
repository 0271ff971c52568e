use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    io,
    path::PathBuf,
};

use gltf::{
    accessor::{DataType, Dimensions},
    mesh::Mode,
};
use image::ImageError;

use crate::archive::zip::ZipError;

/// Why a reference could not be turned into bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The reference uses a scheme no byte source understands.
    UnsupportedScheme,
    BadDataUri,
    /// A relative reference has no base to resolve against.
    MissingBase,
    /// The archive has no entry at the resolved path.
    MissingArchiveEntry(String),
    /// Browser builds cannot read arbitrary local paths.
    WebSandbox,
    /// Android content providers expose no directory structure.
    ContentProvider,
    /// Network reads were compiled out.
    NetworkDisabled,
}

#[derive(Debug, Clone)]
pub struct UnresolvedReferenceError {
    pub reference: String,
    pub reason: UnresolvedReason,
}

impl UnresolvedReferenceError {
    pub fn new(reference: impl Into<String>, reason: UnresolvedReason) -> Self {
        Self {
            reference: reference.into(),
            reason,
        }
    }
}

impl Display for UnresolvedReferenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let reference = &self.reference;
        match &self.reason {
            UnresolvedReason::UnsupportedScheme => {
                write!(f, "Unsupported scheme in reference {}", reference)
            }
            UnresolvedReason::BadDataUri => write!(f, "Bad data URI {}", reference),
            UnresolvedReason::MissingBase => write!(
                f,
                "Relative reference {} can't be resolved without a base reference",
                reference
            ),
            UnresolvedReason::MissingArchiveEntry(entry) => write!(
                f,
                "Reference {} resolved to archive entry {}, which does not exist",
                reference, entry
            ),
            UnresolvedReason::WebSandbox => write!(
                f,
                "Reference {} is relative to a local file, which browsers can't read. \
                 Import a zip archive or a self-contained .glb instead",
                reference
            ),
            UnresolvedReason::ContentProvider => write!(
                f,
                "Reference {} is relative to a content provider URI, which has no \
                 directory structure. Import a zip archive or a self-contained .glb instead",
                reference
            ),
            UnresolvedReason::NetworkDisabled => write!(
                f,
                "Reference {} needs a network read, but HTTP support is disabled",
                reference
            ),
        }
    }
}

impl Error for UnresolvedReferenceError {}

#[derive(Debug)]
pub enum DocumentParseError {
    Glb(binrw::Error),
    MissingJsonChunk,
    Gltf(gltf::Error),
}

impl Display for DocumentParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DocumentParseError::Glb(error) => write!(f, "Bad GLB container: {}", error),
            DocumentParseError::MissingJsonChunk => write!(f, "GLB container has no JSON chunk"),
            DocumentParseError::Gltf(error) => Display::fmt(error, f),
        }
    }
}

impl Error for DocumentParseError {}

impl From<binrw::Error> for DocumentParseError {
    fn from(value: binrw::Error) -> Self {
        Self::Glb(value)
    }
}

impl From<gltf::Error> for DocumentParseError {
    fn from(value: gltf::Error) -> Self {
        Self::Gltf(value)
    }
}

/// Failure while writing or re-reading a persisted artifact.
#[derive(Debug)]
pub enum SinkWriteError {
    AlreadyExists(PathBuf),
    Io(PathBuf, io::Error),
    Image(PathBuf, ImageError),
    Json(PathBuf, serde_json::Error),
    Bincode(PathBuf, bincode::Error),
    MissingArtifact(String),
}

impl Display for SinkWriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SinkWriteError::AlreadyExists(path) => {
                write!(f, "Import directory {} already exists", path.display())
            }
            SinkWriteError::Io(path, error) => write!(f, "{}: {}", path.display(), error),
            SinkWriteError::Image(path, error) => write!(f, "{}: {}", path.display(), error),
            SinkWriteError::Json(path, error) => write!(f, "{}: {}", path.display(), error),
            SinkWriteError::Bincode(path, error) => write!(f, "{}: {}", path.display(), error),
            SinkWriteError::MissingArtifact(name) => {
                write!(f, "No artifact was written for {}", name)
            }
        }
    }
}

impl Error for SinkWriteError {}

#[derive(Debug, Clone)]
pub enum ImageSource {
    View(usize),
    Uri(String),
}

impl Display for ImageSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::View(index) => write!(f, "buffer view #{}", index),
            ImageSource::Uri(uri) if uri.starts_with("data:") => write!(f, "data URI"),
            ImageSource::Uri(uri) => Display::fmt(uri, f),
        }
    }
}

#[derive(Debug)]
pub enum ImportError {
    UnresolvedReference(UnresolvedReferenceError),
    NoDocumentFound,
    DocumentParse(DocumentParseError),
    InvalidSkin {
        skin: usize,
        joints: usize,
        inverse_bind_matrices: usize,
    },
    SinkWrite(SinkWriteError),
    Io(io::Error),
    Zip(ZipError),
    #[cfg(feature = "http")]
    Http(Box<ureq::Error>),
    MissingInput,
    MissingBinaryChunk(usize),
    BadBufferIndex(usize, usize),
    /// Accessor without a buffer view, such as a sparse-only one.
    MissingBufferView(usize),
    BufferOutOfBounds {
        accessor: usize,
        end: usize,
        length: usize,
    },
    ViewOutOfBounds {
        view: usize,
        end: usize,
        length: usize,
    },
    BadImage(ImageSource, ImageError),
    BadImageMime(ImageSource, String),
    BadExtension(&'static str),
    UnsupportedPrimitiveMode(Mode),
    BadAccessorDataType(DataType, DataType),
    BadAccessorDimensions(Dimensions, Dimensions),
    MissingPositions { mesh: usize, primitive: usize },
    DuplicateNode(usize),
    MissingDefaultScene,
    StaleHandle(&'static str),
    /// A phase ran before the phase that produces its input.
    PhaseOrder(&'static str),
    MissingResult,
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::UnresolvedReference(error) => Display::fmt(error, f),
            ImportError::NoDocumentFound => {
                write!(f, "Archive contains no .gltf or .glb document")
            }
            ImportError::DocumentParse(error) => write!(f, "Can't parse document: {}", error),
            ImportError::InvalidSkin {
                skin,
                joints,
                inverse_bind_matrices,
            } => write!(
                f,
                "Invalid skin #{}: {} joints, {} inverse bind matrices",
                skin, joints, inverse_bind_matrices
            ),
            ImportError::SinkWrite(error) => write!(f, "Can't persist import: {}", error),
            ImportError::Io(error) => Display::fmt(error, f),
            ImportError::Zip(error) => Display::fmt(error, f),
            #[cfg(feature = "http")]
            ImportError::Http(error) => Display::fmt(error, f),
            ImportError::MissingInput => write!(f, "Neither a reference nor bytes were given"),
            ImportError::MissingBinaryChunk(index) => {
                write!(f, "Buffer #{} refers to a missing GLB binary chunk", index)
            }
            ImportError::BadBufferIndex(index, count) => {
                write!(f, "Buffer index {} out of {} buffers", index, count)
            }
            ImportError::MissingBufferView(accessor) => {
                write!(f, "Accessor #{} has no buffer view", accessor)
            }
            ImportError::BufferOutOfBounds {
                accessor,
                end,
                length,
            } => write!(
                f,
                "Accessor #{} reads up to byte {} of a {} byte buffer",
                accessor, end, length
            ),
            ImportError::ViewOutOfBounds { view, end, length } => write!(
                f,
                "Buffer view #{} ends at byte {} of a {} byte buffer",
                view, end, length
            ),
            ImportError::BadImage(source, error) => {
                write!(f, "Bad image {}: {}", source, error)
            }
            ImportError::BadImageMime(source, mime) => {
                write!(f, "Bad MIME {} for image {}", mime, source)
            }
            ImportError::BadExtension(name) => write!(f, "Bad {} extension data", name),
            ImportError::UnsupportedPrimitiveMode(mode) => {
                write!(f, "Unsupported primitive mode: {:?}", mode)
            }
            ImportError::BadAccessorDataType(expected, actual) => write!(
                f,
                "Bad accessor data type: expected {:?}, but got {:?}",
                expected, actual
            ),
            ImportError::BadAccessorDimensions(expected, actual) => write!(
                f,
                "Bad accessor dimensions: expected {:?}, but got {:?}",
                expected, actual
            ),
            ImportError::MissingPositions { mesh, primitive } => write!(
                f,
                "Primitive #{} of mesh #{} has no POSITION attribute",
                primitive, mesh
            ),
            ImportError::DuplicateNode(index) => {
                write!(f, "Node #{} appears more than once in the scene", index)
            }
            ImportError::MissingDefaultScene => write!(f, "Document has no scene to import"),
            ImportError::StaleHandle(kind) => write!(f, "Stale {} handle", kind),
            ImportError::PhaseOrder(what) => write!(f, "{} is not available yet", what),
            ImportError::MissingResult => write!(f, "Import finished without a result"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ImportError::UnresolvedReference(error) => Some(error),
            ImportError::DocumentParse(error) => Some(error),
            ImportError::SinkWrite(error) => Some(error),
            ImportError::Io(error) => Some(error),
            ImportError::Zip(error) => Some(error),
            ImportError::BadImage(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<UnresolvedReferenceError> for ImportError {
    fn from(value: UnresolvedReferenceError) -> Self {
        Self::UnresolvedReference(value)
    }
}

impl From<DocumentParseError> for ImportError {
    fn from(value: DocumentParseError) -> Self {
        Self::DocumentParse(value)
    }
}

impl From<SinkWriteError> for ImportError {
    fn from(value: SinkWriteError) -> Self {
        Self::SinkWrite(value)
    }
}

impl From<io::Error> for ImportError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ZipError> for ImportError {
    fn from(value: ZipError) -> Self {
        Self::Zip(value)
    }
}

#[cfg(feature = "http")]
impl From<ureq::Error> for ImportError {
    fn from(value: ureq::Error) -> Self {
        Self::Http(Box::new(value))
    }
}
