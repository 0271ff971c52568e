use std::{
    borrow::Cow,
    error::Error,
    fmt::{self, Display, Formatter},
    io::{self, Read, Seek},
};

use zip::{read::ZipFile, ZipArchive};

use super::{Archive, Entry};

/// Local file header signature every zip file starts with.
pub const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

pub fn is_zip(data: &[u8]) -> bool {
    data.starts_with(&ZIP_MAGIC)
}

#[derive(Debug)]
pub enum ZipError {
    Zip(zip::result::ZipError),
    EntryTooLarge(String, u64),
}

impl Display for ZipError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ZipError::Zip(error) => Display::fmt(error, f),
            ZipError::EntryTooLarge(name, size) => {
                write!(f, "Entry {} of {} bytes is too large", name, size)
            }
        }
    }
}

impl Error for ZipError {}

impl From<zip::result::ZipError> for ZipError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Zip(value)
    }
}

impl From<io::Error> for ZipError {
    fn from(value: io::Error) -> Self {
        Self::Zip(zip::result::ZipError::Io(value))
    }
}

impl<'a> Entry<'a> for ZipFile<'a> {
    type Error = ZipError;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error> {
        Ok(ZipFile::name(self).into())
    }

    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error> {
        let size = self.size();
        let capacity: usize = size
            .try_into()
            .map_err(|_| ZipError::EntryTooLarge(ZipFile::name(self).to_string(), size))?;
        let mut buffer = Vec::with_capacity(capacity);
        self.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

impl<T: Read + Seek> Archive<T> for ZipArchive<T> {
    type Error = ZipError;

    type Entry<'a> = ZipFile<'a>
    where
        Self: 'a;

    fn new(stream: T) -> Result<Self, Self::Error> {
        Ok(ZipArchive::new(stream)?)
    }

    fn entry_names(&mut self) -> Result<Vec<String>, Self::Error> {
        (0..self.len())
            .map(|index| -> Result<String, ZipError> {
                Ok(self.by_index_raw(index)?.name().to_string())
            })
            .collect()
    }

    fn by_name(&mut self, name: &str) -> Result<Option<Self::Entry<'_>>, Self::Error> {
        match ZipArchive::by_name(self, name) {
            Ok(entry) => Ok(Some(entry)),
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::{Cursor, Write};

    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::*;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn lists_and_reads_entries() {
        let data = build_zip(&[("model.gltf", b"{}"), ("textures/a.png", b"png")]);
        assert!(is_zip(&data));

        let mut archive = <ZipArchive<_> as Archive<_>>::new(Cursor::new(data)).unwrap();
        assert_eq!(
            archive.entry_names().unwrap(),
            vec!["model.gltf".to_string(), "textures/a.png".to_string()]
        );
        assert_eq!(
            archive.read_entry("textures/a.png").unwrap(),
            Some(b"png".to_vec())
        );
        assert_eq!(archive.read_entry("textures/b.png").unwrap(), None);
    }
}
