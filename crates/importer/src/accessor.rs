use glam::Mat4;
use gltf::{
    accessor::{DataType, Dimensions},
    Accessor,
};

use crate::error::ImportError;

fn component_size(data_type: DataType) -> usize {
    match data_type {
        DataType::I8 | DataType::U8 => 1,
        DataType::I16 | DataType::U16 => 2,
        DataType::U32 | DataType::F32 => 4,
    }
}

fn component_count(dimensions: Dimensions) -> usize {
    match dimensions {
        Dimensions::Scalar => 1,
        Dimensions::Vec2 => 2,
        Dimensions::Vec3 => 3,
        Dimensions::Vec4 => 4,
        Dimensions::Mat2 => 4,
        Dimensions::Mat3 => 9,
        Dimensions::Mat4 => 16,
    }
}

pub fn check_accessor(
    accessor: &Accessor,
    data_type: DataType,
    dimensions: Dimensions,
) -> Result<(), ImportError> {
    let actual_data_type = accessor.data_type();
    if actual_data_type != data_type {
        return Err(ImportError::BadAccessorDataType(data_type, actual_data_type));
    }
    check_dimensions(accessor, dimensions)
}

pub fn check_dimensions(accessor: &Accessor, dimensions: Dimensions) -> Result<(), ImportError> {
    let actual_dimensions = accessor.dimensions();
    if actual_dimensions != dimensions {
        return Err(ImportError::BadAccessorDimensions(
            dimensions,
            actual_dimensions,
        ));
    }
    Ok(())
}

/// Copies the elements of an accessor out of the buffer its view points
/// into, dropping any stride padding.
pub fn read_accessor(buffers: &[Vec<u8>], accessor: &Accessor) -> Result<Vec<u8>, ImportError> {
    let item_length = component_size(accessor.data_type()) * component_count(accessor.dimensions());
    let count = accessor.count();
    let view = accessor
        .view()
        .ok_or(ImportError::MissingBufferView(accessor.index()))?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let buffer_index = view.buffer().index();
    let buffer = buffers
        .get(buffer_index)
        .ok_or(ImportError::BadBufferIndex(buffer_index, buffers.len()))?;
    let out_of_bounds = |end| ImportError::BufferOutOfBounds {
        accessor: accessor.index(),
        end,
        length: buffer.len(),
    };
    let offset = accessor.offset() + view.offset();
    let stride = view.stride().unwrap_or(item_length);
    // Counts come from the document, so every product is checked.
    let end = stride
        .checked_mul(count - 1)
        .and_then(|span| span.checked_add(offset))
        .and_then(|span| span.checked_add(item_length))
        .ok_or_else(|| out_of_bounds(usize::MAX))?;
    if end > buffer.len() {
        return Err(out_of_bounds(end));
    }

    if stride == item_length {
        return Ok(buffer[offset..end].to_vec());
    }
    let mut result = Vec::with_capacity(count * item_length);
    for index in 0..count {
        let start = offset + index * stride;
        result.extend_from_slice(&buffer[start..start + item_length]);
    }
    Ok(result)
}

macro_rules! read_le {
    ($name:ident, $type:ty, $data_type:path) => {
        pub fn $name(buffers: &[Vec<u8>], accessor: &Accessor) -> Result<Vec<$type>, ImportError> {
            let actual = accessor.data_type();
            if actual != $data_type {
                return Err(ImportError::BadAccessorDataType($data_type, actual));
            }
            let data = read_accessor(buffers, accessor)?;
            Ok(data
                .chunks_exact(std::mem::size_of::<$type>())
                .map(|chunk| {
                    let mut bytes = [0u8; std::mem::size_of::<$type>()];
                    bytes.copy_from_slice(chunk);
                    <$type>::from_le_bytes(bytes)
                })
                .collect())
        }
    };
}

read_le!(read_u8, u8, DataType::U8);
read_le!(read_u16, u16, DataType::U16);
read_le!(read_u32, u32, DataType::U32);
read_le!(read_f32, f32, DataType::F32);

/// Reads float data, expanding normalized unsigned integers to `0..=1`.
pub fn read_normalized(buffers: &[Vec<u8>], accessor: &Accessor) -> Result<Vec<f32>, ImportError> {
    match accessor.data_type() {
        DataType::F32 => read_f32(buffers, accessor),
        DataType::U8 => Ok(read_u8(buffers, accessor)?
            .into_iter()
            .map(|item| item as f32 / u8::MAX as f32)
            .collect()),
        DataType::U16 => Ok(read_u16(buffers, accessor)?
            .into_iter()
            .map(|item| item as f32 / u16::MAX as f32)
            .collect()),
        actual => Err(ImportError::BadAccessorDataType(DataType::F32, actual)),
    }
}

/// Reads triangle indices of any unsigned width.
pub fn read_indices(buffers: &[Vec<u8>], accessor: &Accessor) -> Result<Vec<u32>, ImportError> {
    check_dimensions(accessor, Dimensions::Scalar)?;
    match accessor.data_type() {
        DataType::U8 => Ok(read_u8(buffers, accessor)?.into_iter().map(u32::from).collect()),
        DataType::U16 => Ok(read_u16(buffers, accessor)?.into_iter().map(u32::from).collect()),
        DataType::U32 => read_u32(buffers, accessor),
        actual => Err(ImportError::BadAccessorDataType(DataType::U32, actual)),
    }
}

/// Reads joint indices stored as bytes or shorts.
pub fn read_joints(buffers: &[Vec<u8>], accessor: &Accessor) -> Result<Vec<[u16; 4]>, ImportError> {
    check_dimensions(accessor, Dimensions::Vec4)?;
    let joints: Vec<u16> = match accessor.data_type() {
        DataType::U8 => read_u8(buffers, accessor)?
            .into_iter()
            .map(u16::from)
            .collect(),
        DataType::U16 => read_u16(buffers, accessor)?,
        actual => return Err(ImportError::BadAccessorDataType(DataType::U16, actual)),
    };
    Ok(chunk_vec4(&joints))
}

#[inline]
pub fn chunk_vec2<T: Copy>(data: &[T]) -> Vec<[T; 2]> {
    data.chunks_exact(2).map(|item| [item[0], item[1]]).collect()
}

#[inline]
pub fn chunk_vec3<T: Copy>(data: &[T]) -> Vec<[T; 3]> {
    data.chunks_exact(3)
        .map(|item| [item[0], item[1], item[2]])
        .collect()
}

#[inline]
pub fn chunk_vec4<T: Copy>(data: &[T]) -> Vec<[T; 4]> {
    data.chunks_exact(4)
        .map(|item| [item[0], item[1], item[2], item[3]])
        .collect()
}

#[inline]
pub fn chunk_mat4(data: &[f32]) -> Vec<Mat4> {
    data.chunks_exact(16).map(Mat4::from_cols_slice).collect()
}

#[cfg(test)]
mod test {
    use gltf::json;

    use super::*;

    fn document(accessors: &str, views: &str, buffer_length: usize) -> gltf::Document {
        let text = format!(
            r#"{{"asset":{{"version":"2.0"}},"buffers":[{{"byteLength":{}}}],"bufferViews":{},"accessors":{}}}"#,
            buffer_length, views, accessors
        );
        gltf::Document::from_json(json::Root::from_slice(text.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn strided_read_drops_padding() {
        let document = document(
            r#"[{"bufferView":0,"componentType":5123,"count":3,"type":"SCALAR"}]"#,
            r#"[{"buffer":0,"byteLength":12,"byteStride":4}]"#,
            12,
        );
        let buffer: Vec<u8> = vec![1, 0, 9, 9, 2, 0, 9, 9, 3, 0, 9, 9];
        let accessor = document.accessors().next().unwrap();
        assert_eq!(read_u16(&[buffer], &accessor).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn sparse_accessor_without_view_is_an_error() {
        let document = document(
            r#"[{"componentType":5126,"count":2,"type":"VEC3","sparse":{"count":1,"indices":{"bufferView":0,"componentType":5125},"values":{"bufferView":1}}}]"#,
            r#"[{"buffer":0,"byteLength":4},{"buffer":0,"byteOffset":4,"byteLength":12}]"#,
            16,
        );
        let accessor = document.accessors().next().unwrap();
        assert!(matches!(
            read_f32(&[vec![0u8; 16]], &accessor),
            Err(ImportError::MissingBufferView(0))
        ));
    }

    #[test]
    fn huge_count_is_an_error() {
        let document = document(
            r#"[{"bufferView":0,"componentType":5125,"count":4611686018427387904,"type":"SCALAR"}]"#,
            r#"[{"buffer":0,"byteLength":16}]"#,
            16,
        );
        let accessor = document.accessors().next().unwrap();
        assert!(matches!(
            read_indices(&[vec![0u8; 16]], &accessor),
            Err(ImportError::BufferOutOfBounds { end: usize::MAX, length: 16, .. })
        ));

        let document = self::document(
            r#"[{"bufferView":0,"componentType":5125,"count":1152921504606846976,"type":"SCALAR"}]"#,
            r#"[{"buffer":0,"byteLength":16,"byteStride":8}]"#,
            16,
        );
        let accessor = document.accessors().next().unwrap();
        assert!(matches!(
            read_indices(&[vec![0u8; 16]], &accessor),
            Err(ImportError::BufferOutOfBounds { length: 16, .. })
        ));
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let document = document(
            r#"[{"bufferView":0,"componentType":5125,"count":4,"type":"SCALAR"}]"#,
            r#"[{"buffer":0,"byteLength":16}]"#,
            16,
        );
        let accessor = document.accessors().next().unwrap();
        let short_buffer = vec![0u8; 8];
        assert!(matches!(
            read_indices(&[short_buffer], &accessor),
            Err(ImportError::BufferOutOfBounds { end: 16, length: 8, .. })
        ));
    }

    #[test]
    fn normalized_bytes() {
        let document = document(
            r#"[{"bufferView":0,"componentType":5121,"normalized":true,"count":2,"type":"SCALAR"}]"#,
            r#"[{"buffer":0,"byteLength":2}]"#,
            2,
        );
        let accessor = document.accessors().next().unwrap();
        assert_eq!(
            read_normalized(&[vec![0, 255]], &accessor).unwrap(),
            vec![0.0, 1.0]
        );
    }
}
