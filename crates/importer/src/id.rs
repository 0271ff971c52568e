use std::fmt::{self, Display, Formatter, LowerHex, UpperHex};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Content hash of an imported document, used to tell imports apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportId(pub [u8; 32]);

impl ImportId {
    pub fn digest(buffer: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(buffer);
        Self(hasher.finalize().into())
    }

    pub fn parse_hex(text: &str) -> Option<Self> {
        if text.len() != 64 || !text.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&text[index * 2..index * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl LowerHex for ImportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl UpperHex for ImportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl Display for ImportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl From<[u8; 32]> for ImportId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ImportId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImportId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ImportId::parse_hex(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("bad import id {}", text)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = ImportId::digest(b"model");
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(ImportId::parse_hex(&text), Some(id));
        assert_eq!(format!("{:X}", id), text.to_uppercase());
    }

    #[test]
    fn distinct_content_distinct_id() {
        assert_ne!(ImportId::digest(b"a"), ImportId::digest(b"b"));
        assert_eq!(ImportId::parse_hex("zz"), None);
    }
}
