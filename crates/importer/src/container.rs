use std::{io::Cursor, sync::Arc};

use binrw::{helpers::until_eof, BinRead};
use gltf::{json::Value, Document};
use log::warn;

use crate::{
    archive::Archive,
    error::{DocumentParseError, ImportError},
    source::ByteSource,
};

pub const GLB_MAGIC: [u8; 4] = *b"glTF";
pub const GLB_CHUNK_JSON: u32 = 0x4E4F_534A;
pub const GLB_CHUNK_BIN: u32 = 0x004E_4942;

#[derive(Debug, BinRead)]
#[br(little, magic = b"glTF")]
struct GlbFile {
    #[br(assert(version == 2, "unsupported GLB version {}", version))]
    version: u32,
    _length: u32,
    #[br(parse_with = until_eof)]
    chunks: Vec<GlbChunk>,
}

#[derive(Debug, BinRead)]
#[br(little)]
struct GlbChunk {
    length: u32,
    kind: u32,
    #[br(count = length)]
    data: Vec<u8>,
}

pub fn is_glb(data: &[u8]) -> bool {
    data.starts_with(&GLB_MAGIC)
}

/// Archive entries that may hold the document.
pub fn is_document_name(name: &str) -> bool {
    name.ends_with(".gltf") || name.ends_with(".glb")
}

/// Picks the document entry of an archive. The first match in storage
/// order wins.
pub fn find_document_entry<T, A>(archive: &mut A) -> Result<String, ImportError>
where
    A: Archive<T>,
    ImportError: From<A::Error>,
{
    let mut documents = archive
        .entry_names()?
        .into_iter()
        .filter(|name| is_document_name(name));
    let document = documents.next().ok_or(ImportError::NoDocumentFound)?;
    for ignored in documents {
        warn!(
            "Archive holds more than one document, importing {} and ignoring {}",
            document, ignored
        );
    }
    Ok(document)
}

/// Extracts the document bytes from the input. Archives yield their
/// document entry, anything else is returned as is.
pub fn unwrap_container(
    source: &mut ByteSource,
    data: &Arc<[u8]>,
) -> Result<Arc<[u8]>, ImportError> {
    match source.read_document_entry()? {
        Some(document) => Ok(Arc::from(document)),
        None => Ok(Arc::clone(data)),
    }
}

/// A validated document together with the binary chunks of its GLB
/// container, if it had one.
#[derive(Debug)]
pub struct Container {
    pub document: Document,
    binary_chunks: Vec<Vec<u8>>,
}

impl Container {
    pub fn binary_chunk(&self, index: usize) -> Option<&[u8]> {
        self.binary_chunks.get(index).map(Vec::as_slice)
    }

    pub fn is_binary(&self) -> bool {
        !self.binary_chunks.is_empty()
    }
}

pub fn parse(data: &[u8]) -> Result<Container, DocumentParseError> {
    let (json, binary_chunks) = if is_glb(data) {
        let glb = GlbFile::read(&mut Cursor::new(data))?;
        let mut json = None;
        let mut binary_chunks = Vec::new();
        for chunk in glb.chunks {
            match chunk.kind {
                GLB_CHUNK_JSON if json.is_none() => json = Some(chunk.data),
                GLB_CHUNK_BIN => binary_chunks.push(chunk.data),
                kind => warn!("Skipping GLB chunk of type {:#010x}", kind),
            }
        }
        let json = json.ok_or(DocumentParseError::MissingJsonChunk)?;
        (json, binary_chunks)
    } else {
        (data.to_vec(), Vec::new())
    };

    let root = gltf::json::Root::from_slice(&json).map_err(gltf::Error::Deserialize)?;
    let document = Document::from_json(root)?;
    Ok(Container {
        document,
        binary_chunks,
    })
}

pub const KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS: &str = "KHR_materials_pbrSpecularGlossiness";

// Defaults of the specular-glossiness extension. Fields missing from the
// extension object take these values.
pub const DIFFUSE_FACTOR_DEFAULT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
pub const SPECULAR_FACTOR_DEFAULT: [f32; 3] = [1.0, 1.0, 1.0];
pub const GLOSSINESS_FACTOR_DEFAULT: f32 = 1.0;

/// Texture reference inside an extension object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionTexture {
    pub index: usize,
    pub tex_coord: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpecularGlossiness {
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<ExtensionTexture>,
    pub specular_factor: [f32; 3],
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<ExtensionTexture>,
}

impl Default for SpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse_factor: DIFFUSE_FACTOR_DEFAULT,
            diffuse_texture: None,
            specular_factor: SPECULAR_FACTOR_DEFAULT,
            glossiness_factor: GLOSSINESS_FACTOR_DEFAULT,
            specular_glossiness_texture: None,
        }
    }
}

const BAD_SPECULAR_GLOSSINESS: ImportError =
    ImportError::BadExtension(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS);

fn load_factor<const N: usize>(value: &Value) -> Result<[f32; N], ImportError> {
    let array = value.as_array().ok_or(BAD_SPECULAR_GLOSSINESS)?;
    if array.len() != N {
        return Err(BAD_SPECULAR_GLOSSINESS);
    }
    let mut factor = [0.0; N];
    for (item, value) in factor.iter_mut().zip(array) {
        *item = value.as_f64().ok_or(BAD_SPECULAR_GLOSSINESS)? as f32;
    }
    Ok(factor)
}

fn load_texture(value: &Value) -> Result<ExtensionTexture, ImportError> {
    let index = value
        .get("index")
        .and_then(Value::as_u64)
        .ok_or(BAD_SPECULAR_GLOSSINESS)?;
    let tex_coord = match value.get("texCoord") {
        Some(tex_coord) => tex_coord.as_u64().ok_or(BAD_SPECULAR_GLOSSINESS)?,
        None => 0,
    };
    Ok(ExtensionTexture {
        index: index as usize,
        tex_coord: tex_coord as u32,
    })
}

impl SpecularGlossiness {
    pub fn from_material(material: &gltf::Material) -> Result<Option<Self>, ImportError> {
        material
            .extension_value(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS)
            .map(Self::from_value)
            .transpose()
    }

    pub fn from_value(value: &Value) -> Result<Self, ImportError> {
        if !value.is_object() {
            return Err(BAD_SPECULAR_GLOSSINESS);
        }
        let mut result = Self::default();
        if let Some(factor) = value.get("diffuseFactor") {
            result.diffuse_factor = load_factor(factor)?;
        }
        if let Some(factor) = value.get("specularFactor") {
            result.specular_factor = load_factor(factor)?;
        }
        if let Some(factor) = value.get("glossinessFactor") {
            result.glossiness_factor = factor.as_f64().ok_or(BAD_SPECULAR_GLOSSINESS)? as f32;
        }
        result.diffuse_texture = value.get("diffuseTexture").map(load_texture).transpose()?;
        result.specular_glossiness_texture = value
            .get("specularGlossinessTexture")
            .map(load_texture)
            .transpose()?;
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::json;

    use super::*;

    pub(crate) fn build_glb(json: &str, bin: &[u8]) -> Vec<u8> {
        fn push_chunk(data: &mut Vec<u8>, kind: u32, chunk: &[u8], pad: u8) {
            let padded = chunk.len().div_ceil(4) * 4;
            data.extend_from_slice(&(padded as u32).to_le_bytes());
            data.extend_from_slice(&kind.to_le_bytes());
            data.extend_from_slice(chunk);
            data.resize(data.len() + padded - chunk.len(), pad);
        }
        let mut body = Vec::new();
        push_chunk(&mut body, GLB_CHUNK_JSON, json.as_bytes(), b' ');
        if !bin.is_empty() {
            push_chunk(&mut body, GLB_CHUNK_BIN, bin, 0);
        }
        let mut data = Vec::new();
        data.extend_from_slice(&GLB_MAGIC);
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&(12 + body.len() as u32).to_le_bytes());
        data.extend_from_slice(&body);
        data
    }

    const BUFFER_DOCUMENT: &str =
        r#"{"asset":{"version":"2.0"},"buffers":[{"byteLength":4}]}"#;

    #[test]
    fn parses_glb_chunks() {
        let data = build_glb(BUFFER_DOCUMENT, &[1, 2, 3, 4]);
        let container = parse(&data).unwrap();
        assert!(container.is_binary());
        assert_eq!(container.document.buffers().len(), 1);
        assert_eq!(container.binary_chunk(0), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(container.binary_chunk(1), None);
    }

    #[test]
    fn parses_plain_json() {
        let container = parse(BUFFER_DOCUMENT.as_bytes()).unwrap();
        assert!(!container.is_binary());
        assert_eq!(container.document.buffers().len(), 1);
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(
            parse(b"not json"),
            Err(DocumentParseError::Gltf(_))
        ));
        let mut data = build_glb(BUFFER_DOCUMENT, &[]);
        data[4] = 1;
        assert!(matches!(parse(&data), Err(DocumentParseError::Glb(_))));
    }

    #[test]
    fn specular_glossiness_defaults() {
        let value = json!({
            "diffuseTexture": { "index": 2 },
            "glossinessFactor": 0.25
        });
        let extension = SpecularGlossiness::from_value(&value).unwrap();
        assert_eq!(extension.diffuse_factor, DIFFUSE_FACTOR_DEFAULT);
        assert_eq!(extension.specular_factor, SPECULAR_FACTOR_DEFAULT);
        assert_eq!(extension.glossiness_factor, 0.25);
        assert_eq!(
            extension.diffuse_texture,
            Some(ExtensionTexture {
                index: 2,
                tex_coord: 0
            })
        );
        assert!(SpecularGlossiness::from_value(&json!({ "specularFactor": [1.0] })).is_err());
    }
}
