use gltf::{
    accessor::{DataType, Dimensions},
    mesh::Mode,
    Primitive, Semantic,
};
use log::warn;

use crate::{
    accessor::{
        check_accessor, check_dimensions, chunk_vec2, chunk_vec3, chunk_vec4, read_f32,
        read_indices, read_normalized,
    },
    coords::{convert_tangent, convert_uv, convert_vec3, flip_winding},
    error::ImportError,
    mesh::{Mesh, TEX_COORD_CHANNELS},
    naming::mesh_name,
};

pub(crate) fn read_vec3(
    buffers: &[Vec<u8>],
    accessor: &gltf::Accessor,
) -> Result<Vec<[f32; 3]>, ImportError> {
    check_accessor(accessor, DataType::F32, Dimensions::Vec3)?;
    Ok(chunk_vec3(&read_f32(buffers, accessor)?)
        .into_iter()
        .map(convert_vec3)
        .collect())
}

fn read_colors(
    buffers: &[Vec<u8>],
    accessor: &gltf::Accessor,
) -> Result<Vec<[f32; 4]>, ImportError> {
    let data = read_normalized(buffers, accessor)?;
    match accessor.dimensions() {
        Dimensions::Vec3 => Ok(chunk_vec3(&data)
            .into_iter()
            .map(|[r, g, b]| [r, g, b, 1.0])
            .collect()),
        Dimensions::Vec4 => Ok(chunk_vec4(&data)),
        actual => Err(ImportError::BadAccessorDimensions(Dimensions::Vec4, actual)),
    }
}

/// Builds the mesh of one primitive, converted into the scene graph frame.
/// Skinning and morph target data is added by later phases.
pub(crate) fn build_mesh(
    buffers: &[Vec<u8>],
    mesh: &gltf::Mesh,
    primitive: &Primitive,
    recalculate_tangents: bool,
) -> Result<Mesh, ImportError> {
    if primitive.mode() != Mode::Triangles {
        return Err(ImportError::UnsupportedPrimitiveMode(primitive.mode()));
    }

    let mut result = Mesh {
        name: mesh_name(mesh.name(), mesh.index(), primitive.index()),
        ..Default::default()
    };
    let mut has_positions = false;
    for (semantic, accessor) in primitive.attributes() {
        match semantic {
            Semantic::Positions => {
                result.positions = read_vec3(buffers, &accessor)?;
                has_positions = true;
            }
            Semantic::Normals => result.normals = read_vec3(buffers, &accessor)?,
            Semantic::Tangents => {
                check_accessor(&accessor, DataType::F32, Dimensions::Vec4)?;
                result.tangents = chunk_vec4(&read_f32(buffers, &accessor)?)
                    .into_iter()
                    .map(convert_tangent)
                    .collect();
            }
            Semantic::TexCoords(set) if (set as usize) < TEX_COORD_CHANNELS => {
                check_dimensions(&accessor, Dimensions::Vec2)?;
                result.tex_coords[set as usize] = chunk_vec2(&read_normalized(buffers, &accessor)?)
                    .into_iter()
                    .map(convert_uv)
                    .collect();
            }
            Semantic::Colors(0) => result.colors = read_colors(buffers, &accessor)?,
            Semantic::TexCoords(set) => {
                warn!("Ignoring UV set {} of {}", set, result.name);
            }
            Semantic::Colors(set) => {
                warn!("Ignoring color set {} of {}", set, result.name);
            }
            // Read by the skin phase.
            Semantic::Joints(_) | Semantic::Weights(_) => {}
        }
    }
    if !has_positions {
        return Err(ImportError::MissingPositions {
            mesh: mesh.index(),
            primitive: primitive.index(),
        });
    }

    result.triangles = match primitive.indices() {
        Some(accessor) => read_indices(buffers, &accessor)?,
        None => Mesh::sequential_triangles(result.vertex_count()),
    };
    flip_winding(&mut result.triangles);
    result.recalculate_bounds();
    if recalculate_tangents && result.tangents.is_empty() {
        result.recalculate_tangents();
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use gltf::json;

    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|value| value.to_le_bytes()).collect()
    }

    fn document(primitive: &str) -> gltf::Document {
        let text = format!(
            r#"{{
                "asset": {{"version": "2.0"}},
                "buffers": [{{"byteLength": 48}}],
                "bufferViews": [
                    {{"buffer": 0, "byteLength": 36}},
                    {{"buffer": 0, "byteOffset": 36, "byteLength": 6}},
                    {{"buffer": 0, "byteOffset": 44, "byteLength": 4}}
                ],
                "accessors": [
                    {{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                      "min": [0, 0, 0], "max": [1, 1, 1]}},
                    {{"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}},
                    {{"bufferView": 2, "componentType": 5121, "count": 1, "type": "VEC4",
                      "normalized": true}}
                ],
                "meshes": [{{"primitives": [{}]}}]
            }}"#,
            primitive
        );
        gltf::Document::from_json(json::Root::from_slice(text.as_bytes()).unwrap()).unwrap()
    }

    fn buffers() -> Vec<Vec<u8>> {
        let mut buffer = f32_bytes(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        for index in [0u16, 1, 2] {
            buffer.extend_from_slice(&index.to_le_bytes());
        }
        buffer.extend_from_slice(&[0, 0]);
        buffer.extend_from_slice(&[255, 0, 255, 255]);
        vec![buffer]
    }

    fn build(primitive: &str) -> Result<Mesh, ImportError> {
        let document = document(primitive);
        let mesh = document.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        build_mesh(&buffers(), &mesh, &primitive, true)
    }

    #[test]
    fn converts_positions_and_winding() {
        let mesh = build(r#"{"attributes": {"POSITION": 0}, "indices": 1}"#).unwrap();
        assert_eq!(mesh.name, "Mesh_0");
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.positions[2], [0.0, 1.0, -1.0]);
        assert_eq!(mesh.triangles, vec![2, 1, 0]);
        assert_eq!(mesh.bounds.min().z, -1.0);
        assert!(mesh.tangents.is_empty());
    }

    #[test]
    fn generates_indices_when_missing() {
        let mesh = build(r#"{"attributes": {"POSITION": 0}}"#).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.triangles, vec![2, 1, 0]);
    }

    #[test]
    fn rejects_line_primitives() {
        assert!(matches!(
            build(r#"{"attributes": {"POSITION": 0}, "mode": 1}"#),
            Err(ImportError::UnsupportedPrimitiveMode(Mode::Lines))
        ));
    }

    #[test]
    fn reads_normalized_colors() {
        let mesh = build(r#"{"attributes": {"POSITION": 0, "COLOR_0": 2}}"#).unwrap();
        assert_eq!(mesh.colors, vec![[1.0, 0.0, 1.0, 1.0]]);
    }
}
