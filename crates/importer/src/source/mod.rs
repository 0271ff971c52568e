use std::{
    fmt::{self, Display, Formatter},
    fs::File,
    io::{Cursor, Read},
    mem,
    path::{Path, PathBuf},
    sync::Arc,
    task::Poll,
};

use log::{debug, trace};
use url::Url;
use zip::ZipArchive;

use crate::{
    archive::{zip::is_zip, Archive},
    config::{ImportOptions, Platform},
    container,
    error::{ImportError, UnresolvedReason, UnresolvedReferenceError},
};

pub(crate) mod scheme;

use scheme::{percent_decode, uri_scheme, Scheme};

/// Location of a byte stream: a local path or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Path(PathBuf),
    Url(Url),
}

impl Reference {
    /// Anything carrying a URI scheme becomes a URL, everything else a path.
    pub fn parse(text: &str) -> Self {
        if uri_scheme(text).is_some() {
            if let Ok(url) = Url::parse(text) {
                return Reference::Url(url);
            }
        }
        Reference::Path(PathBuf::from(text))
    }

    pub fn is_local(&self) -> bool {
        match self {
            Reference::Path(_) => true,
            Reference::Url(url) => url.scheme() == "file",
        }
    }

    pub fn to_path(&self) -> Option<PathBuf> {
        match self {
            Reference::Path(path) => Some(path.clone()),
            Reference::Url(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Reference::Url(_) => None,
        }
    }

    pub fn file_stem(&self) -> Option<String> {
        match self {
            Reference::Path(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            Reference::Url(url) => {
                let name = url.path_segments()?.last()?;
                let name = percent_decode(name);
                let stem = name.rsplit_once('.').map_or(&*name, |(stem, _)| stem);
                (!stem.is_empty()).then(|| stem.to_string())
            }
        }
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Path(path) => Display::fmt(&path.display(), f),
            Reference::Url(url) => Display::fmt(url, f),
        }
    }
}

impl From<PathBuf> for Reference {
    fn from(path: PathBuf) -> Self {
        Reference::Path(path)
    }
}

impl From<&Path> for Reference {
    fn from(path: &Path) -> Self {
        Reference::Path(path.to_path_buf())
    }
}

impl From<Url> for Reference {
    fn from(url: Url) -> Self {
        Reference::Url(url)
    }
}

/// Combines `relative` with the reference of the document that mentions it.
pub fn resolve(
    base: &Reference,
    relative: &str,
    platform: Platform,
) -> Result<Reference, UnresolvedReferenceError> {
    let unresolved = |reason| UnresolvedReferenceError::new(relative, reason);
    if uri_scheme(relative).is_some() {
        let reference = Reference::parse(relative);
        if platform == Platform::Web && reference.is_local() {
            return Err(unresolved(UnresolvedReason::WebSandbox));
        }
        return Ok(reference);
    }
    match base {
        Reference::Path(_) if platform == Platform::Web => {
            Err(unresolved(UnresolvedReason::WebSandbox))
        }
        Reference::Path(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new(""));
            Ok(Reference::Path(directory.join(&*percent_decode(relative))))
        }
        Reference::Url(url) => match url.scheme() {
            "content" => Err(unresolved(UnresolvedReason::ContentProvider)),
            "file" if platform == Platform::Web => Err(unresolved(UnresolvedReason::WebSandbox)),
            _ => url
                .join(relative)
                .map(Reference::Url)
                .map_err(|_| unresolved(UnresolvedReason::UnsupportedScheme)),
        },
    }
}

/// Joins a reference relative to an archive document with the document's
/// directory inside the archive.
pub fn join_archive_path(document_entry: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = match document_entry.rsplit_once('/') {
        Some((directory, _)) => directory.split('/').collect(),
        None => Vec::new(),
    };
    for segment in relative.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// A stream read in bounded chunks, one chunk per resumption.
pub struct ByteRead {
    reader: Box<dyn Read + Send>,
    length: Option<u64>,
    data: Vec<u8>,
    chunk_size: usize,
    remote: bool,
}

impl ByteRead {
    pub fn from_reader(
        reader: impl Read + Send + 'static,
        length: Option<u64>,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            length,
            data: Vec::with_capacity(length.unwrap_or(0).min(MAX_PREALLOCATION) as usize),
            chunk_size: chunk_size.max(1),
            remote: false,
        }
    }

    pub fn open(
        reference: &Reference,
        chunk_size: usize,
        platform: Platform,
    ) -> Result<Self, ImportError> {
        let unresolved = |reason| UnresolvedReferenceError::new(reference.to_string(), reason);
        if let Some(path) = reference.to_path() {
            if platform == Platform::Web {
                return Err(unresolved(UnresolvedReason::WebSandbox).into());
            }
            debug!("Reading {}", path.display());
            let file = File::open(&path)?;
            let length = file.metadata()?.len();
            return Ok(Self::from_reader(file, Some(length), chunk_size));
        }
        let Reference::Url(url) = reference else {
            return Err(unresolved(UnresolvedReason::UnsupportedScheme).into());
        };
        match url.scheme() {
            "http" | "https" => Self::download(url, chunk_size),
            "content" => Err(unresolved(UnresolvedReason::ContentProvider).into()),
            _ => Err(unresolved(UnresolvedReason::UnsupportedScheme).into()),
        }
    }

    #[cfg(feature = "http")]
    fn download(url: &Url, chunk_size: usize) -> Result<Self, ImportError> {
        debug!("Downloading {}", url);
        let response = ureq::get(url.as_str()).call()?;
        let length = response
            .header("Content-Length")
            .and_then(|length| length.parse().ok());
        Ok(Self {
            remote: true,
            ..Self::from_reader(response.into_reader(), length, chunk_size)
        })
    }

    #[cfg(not(feature = "http"))]
    fn download(url: &Url, _chunk_size: usize) -> Result<Self, ImportError> {
        Err(UnresolvedReferenceError::new(url.as_str(), UnresolvedReason::NetworkDisabled).into())
    }

    pub fn bytes_read(&self) -> usize {
        self.data.len()
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Whether the bytes come over the network.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Reads at most one chunk. Yields the whole content once the stream
    /// is exhausted.
    pub fn resume(&mut self) -> Result<Poll<Vec<u8>>, ImportError> {
        let read = (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut self.data)?;
        trace!("Read {} bytes, {} in total", read, self.data.len());
        let complete = match self.length {
            Some(length) => self.data.len() as u64 >= length || read == 0,
            None => read == 0,
        };
        if complete {
            Ok(Poll::Ready(mem::take(&mut self.data)))
        } else {
            Ok(Poll::Pending)
        }
    }
}

pub enum Payload {
    Ready(Vec<u8>),
    Pending(ByteRead),
}

/// Turns references found inside a document into bytes.
///
/// Data URIs are decoded in place. When the input is a zip archive,
/// relative references are looked up next to the document entry. Anything
/// else is resolved against the input reference and read incrementally.
pub struct ByteSource {
    base: Option<Reference>,
    platform: Platform,
    chunk_size: usize,
    archive: Option<ZipArchive<Cursor<Arc<[u8]>>>>,
    document_entry: Option<String>,
}

impl ByteSource {
    pub fn new(
        base: Option<Reference>,
        data: Arc<[u8]>,
        options: &ImportOptions,
    ) -> Result<Self, ImportError> {
        let (archive, document_entry) = if is_zip(&data) {
            let mut archive: ZipArchive<_> = Archive::new(Cursor::new(data))?;
            let entry = container::find_document_entry(&mut archive)?;
            (Some(archive), Some(entry))
        } else {
            (None, None)
        };
        Ok(Self {
            base,
            platform: options.platform,
            chunk_size: options.read_chunk_size,
            archive,
            document_entry,
        })
    }

    pub fn base(&self) -> Option<&Reference> {
        self.base.as_ref()
    }

    /// Name of the document entry when the input is an archive.
    pub fn document_entry(&self) -> Option<&str> {
        self.document_entry.as_deref()
    }

    pub(crate) fn read_document_entry(&mut self) -> Result<Option<Vec<u8>>, ImportError> {
        let (Some(archive), Some(entry)) = (&mut self.archive, &self.document_entry) else {
            return Ok(None);
        };
        match archive.read_entry(entry)? {
            Some(data) => Ok(Some(data)),
            None => Err(ImportError::NoDocumentFound),
        }
    }

    pub fn fetch(&mut self, uri: &str) -> Result<Payload, ImportError> {
        let scheme =
            Scheme::try_from(uri).map_err(|reason| UnresolvedReferenceError::new(uri, reason))?;
        let relative = match scheme {
            Scheme::Data { data, .. } => return Ok(Payload::Ready(data)),
            Scheme::Absolute(uri) => {
                let reference = Reference::parse(uri);
                return Ok(Payload::Pending(ByteRead::open(
                    &reference,
                    self.chunk_size,
                    self.platform,
                )?));
            }
            Scheme::Relative(relative) => relative,
        };

        if let (Some(archive), Some(entry)) = (&mut self.archive, &self.document_entry) {
            let name = join_archive_path(entry, &percent_decode(relative));
            debug!("Reading archive entry {}", name);
            return match archive.read_entry(&name)? {
                Some(data) => Ok(Payload::Ready(data)),
                None => Err(UnresolvedReferenceError::new(
                    uri,
                    UnresolvedReason::MissingArchiveEntry(name),
                )
                .into()),
            };
        }

        let base = self.base.as_ref().ok_or_else(|| {
            UnresolvedReferenceError::new(uri, UnresolvedReason::MissingBase)
        })?;
        let reference = resolve(base, relative, self.platform)?;
        Ok(Payload::Pending(ByteRead::open(
            &reference,
            self.chunk_size,
            self.platform,
        )?))
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;
    use crate::archive::zip::test::build_zip;

    #[test]
    fn resolves_relative_path() {
        let base = Reference::Path(PathBuf::from("models/duck/duck.gltf"));
        let resolved = resolve(&base, "textures/duck%20cm.png", Platform::Desktop).unwrap();
        assert_eq!(
            resolved,
            Reference::Path(PathBuf::from("models/duck/textures/duck cm.png"))
        );
    }

    #[test]
    fn resolves_relative_url() {
        let base = Reference::parse("https://example.com/models/duck.gltf");
        let resolved = resolve(&base, "../buffers/duck.bin", Platform::Web).unwrap();
        assert_eq!(resolved.to_string(), "https://example.com/buffers/duck.bin");
    }

    #[test]
    fn rejects_platform_restricted_bases() {
        let local = Reference::Path(PathBuf::from("/models/duck.gltf"));
        let error = resolve(&local, "duck.bin", Platform::Web).unwrap_err();
        assert_eq!(error.reason, UnresolvedReason::WebSandbox);

        let content = Reference::parse("content://downloads/public/duck.gltf");
        let error = resolve(&content, "duck.bin", Platform::Android).unwrap_err();
        assert_eq!(error.reason, UnresolvedReason::ContentProvider);
        assert!(error.to_string().contains("zip archive"));
    }

    #[test]
    fn archive_paths() {
        assert_eq!(join_archive_path("model.glb", "textures/a.png"), "textures/a.png");
        assert_eq!(join_archive_path("scenes/model.gltf", "a.bin"), "scenes/a.bin");
        assert_eq!(join_archive_path("scenes/model.gltf", "../a.bin"), "a.bin");
        assert_eq!(join_archive_path("scenes/model.gltf", "./b/a.bin"), "scenes/b/a.bin");
    }

    #[test]
    fn file_stem_of_reference() {
        assert_eq!(
            Reference::parse("https://example.com/a/Duck.glb").file_stem(),
            Some("Duck".to_string())
        );
        assert_eq!(
            Reference::parse("models/Box.gltf").file_stem(),
            Some("Box".to_string())
        );
    }

    #[test]
    fn reads_in_chunks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 10]).unwrap();
        let reference = Reference::from(file.path());

        let mut read = ByteRead::open(&reference, 4, Platform::Desktop).unwrap();
        assert_eq!(read.length(), Some(10));
        assert!(read.resume().unwrap().is_pending());
        assert_eq!(read.bytes_read(), 4);
        assert!(read.resume().unwrap().is_pending());
        let Poll::Ready(data) = read.resume().unwrap() else {
            panic!("expected the read to finish");
        };
        assert_eq!(data, vec![7u8; 10]);
    }

    #[test]
    fn reads_unknown_length_until_exhausted() {
        let mut read = ByteRead::from_reader(Cursor::new(vec![1u8, 2, 3]), None, 2);
        assert!(read.resume().unwrap().is_pending());
        assert!(read.resume().unwrap().is_pending());
        assert_eq!(read.resume().unwrap(), Poll::Ready(vec![1, 2, 3]));
    }

    #[test]
    fn fetches_archive_entries_next_to_document() {
        let data = build_zip(&[("model.glb", b"glTF"), ("textures/a.png", b"png")]);
        let mut source =
            ByteSource::new(None, Arc::from(data), &ImportOptions::default()).unwrap();
        assert_eq!(source.document_entry(), Some("model.glb"));

        let Payload::Ready(bytes) = source.fetch("textures/a.png").unwrap() else {
            panic!("archive entries are read in place");
        };
        assert_eq!(bytes, b"png".to_vec());

        let error = source.fetch("textures/b.png").err().unwrap();
        assert!(matches!(
            error,
            ImportError::UnresolvedReference(UnresolvedReferenceError {
                reason: UnresolvedReason::MissingArchiveEntry(_),
                ..
            })
        ));
    }

    #[test]
    fn relative_reference_needs_base() {
        let mut source =
            ByteSource::new(None, Arc::from(&b"{}"[..]), &ImportOptions::default()).unwrap();
        assert!(matches!(
            source.fetch("a.bin"),
            Err(ImportError::UnresolvedReference(UnresolvedReferenceError {
                reason: UnresolvedReason::MissingBase,
                ..
            }))
        ));
        assert!(matches!(
            source.fetch("data:,abc"),
            Ok(Payload::Ready(data)) if data == b"abc"
        ));
    }
}
