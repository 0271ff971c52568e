use std::{
    borrow::Cow,
    error::Error,
    io::{Read, Seek},
};

pub mod zip;

pub trait Entry<'a> {
    type Error: Error;

    fn name(&self) -> Result<Cow<'_, str>, Self::Error>;
    fn unpack(&mut self) -> Result<Vec<u8>, Self::Error>;
}

/// Read-only view of a packed container such as a zip file.
pub trait Archive<T>: Sized {
    type Error: Error;
    type Entry<'a>: Entry<'a, Error = Self::Error>
    where
        Self: 'a;

    fn new(stream: T) -> Result<Self, Self::Error>
    where
        T: Read + Seek;

    /// Entry names in the order they are stored.
    fn entry_names(&mut self) -> Result<Vec<String>, Self::Error>;

    /// Looks up an entry by its full name, using `/` as the separator.
    fn by_name(&mut self, name: &str) -> Result<Option<Self::Entry<'_>>, Self::Error>;

    fn read_entry(&mut self, name: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        match self.by_name(name)? {
            Some(mut entry) => entry.unpack().map(Some),
            None => Ok(None),
        }
    }
}
