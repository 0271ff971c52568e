use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::UnresolvedReason;

pub(crate) enum Scheme<'a> {
    /// Data URI with optional mime type
    Data {
        mime: Option<&'a str>,
        data: Vec<u8>,
    },
    /// Reference without a scheme, resolved against a base
    Relative(&'a str),
    /// Reference with its own scheme
    Absolute(&'a str),
}

/// Returns the scheme of `uri`, if it has one.
///
/// Single letter schemes are not accepted so that Windows drive letters
/// keep being treated as paths.
pub(crate) fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2 || !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}

impl<'a> TryFrom<&'a str> for Scheme<'a> {
    type Error = UnresolvedReason;

    fn try_from(uri: &'a str) -> Result<Self, Self::Error> {
        match uri_scheme(uri) {
            Some(scheme) if scheme.eq_ignore_ascii_case("data") => {
                // Data URI: rfc2397
                let content = &uri[scheme.len() + 1..];
                let Some((param, value)) = content.split_once(',') else {
                    return Err(UnresolvedReason::BadDataUri);
                };
                let (media_type, base64) = match param.rsplit_once(';') {
                    Some((media_type, encoding)) if encoding.eq_ignore_ascii_case("base64") => {
                        (media_type, true)
                    }
                    _ => (param, false),
                };
                let mime = media_type
                    .split(';')
                    .next()
                    .filter(|mime| !mime.is_empty());
                let data = if base64 {
                    STANDARD
                        .decode(value)
                        .map_err(|_| UnresolvedReason::BadDataUri)?
                } else {
                    percent_decode(value).into_owned().into_bytes()
                };
                Ok(Scheme::Data { mime, data })
            }
            Some(_) => Ok(Scheme::Absolute(uri)),
            None => Ok(Scheme::Relative(uri)),
        }
    }
}

/// Decodes `%XX` escapes. Malformed escapes are kept as they are.
pub(crate) fn percent_decode(text: &str) -> Cow<'_, str> {
    if !text.contains('%') {
        return Cow::Borrowed(text);
    }
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let escaped = (bytes[index] == b'%')
            .then(|| bytes.get(index + 1..index + 3))
            .flatten()
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                decoded.push(byte);
                index += 3;
            }
            None => {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
    }
    Cow::Owned(String::from_utf8_lossy(&decoded).into_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_base64_data_uri() {
        let Ok(Scheme::Data { mime, data }) =
            Scheme::try_from("data:application/octet-stream;base64,AAECAw==")
        else {
            panic!("expected a data URI");
        };
        assert_eq!(mime, Some("application/octet-stream"));
        assert_eq!(data, vec![0, 1, 2, 3]);
    }

    #[test]
    fn decodes_plain_data_uri() {
        let Ok(Scheme::Data { mime, data }) = Scheme::try_from("data:,a%20b") else {
            panic!("expected a data URI");
        };
        assert_eq!(mime, None);
        assert_eq!(data, b"a b".to_vec());
    }

    #[test]
    fn rejects_bad_data_uri() {
        assert!(matches!(
            Scheme::try_from("data:image/png;base64"),
            Err(UnresolvedReason::BadDataUri)
        ));
        assert!(matches!(
            Scheme::try_from("data:image/png;base64,!!!"),
            Err(UnresolvedReason::BadDataUri)
        ));
    }

    #[test]
    fn classifies_references() {
        assert!(matches!(
            Scheme::try_from("textures/a.png"),
            Ok(Scheme::Relative("textures/a.png"))
        ));
        assert!(matches!(
            Scheme::try_from("https://example.com/a.bin"),
            Ok(Scheme::Absolute(_))
        ));
        assert!(matches!(
            Scheme::try_from("C:/models/a.bin"),
            Ok(Scheme::Relative(_))
        ));
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("a%20b%2Fc"), "a b/c");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }
}
