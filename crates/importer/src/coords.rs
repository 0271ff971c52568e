//! Conversion from the right-handed glTF frame to the left-handed frame of
//! the scene graph. The z axis is mirrored.

use glam::{Mat3, Mat4, Quat, Vec3};
use log::warn;

const SCALE_EPSILON: f32 = 1e-5;

#[inline]
pub fn convert_vec3([x, y, z]: [f32; 3]) -> [f32; 3] {
    [x, y, -z]
}

/// Tangent handedness (w) flips together with the z axis.
#[inline]
pub fn convert_tangent([x, y, z, w]: [f32; 4]) -> [f32; 4] {
    [x, y, -z, -w]
}

#[inline]
pub fn convert_quat(rotation: Quat) -> Quat {
    Quat::from_xyzw(rotation.x, rotation.y, -rotation.z, -rotation.w)
}

/// Texture rows start at the bottom.
#[inline]
pub fn convert_uv([u, v]: [f32; 2]) -> [f32; 2] {
    [u, 1.0 - v]
}

/// Reverses the winding of every triangle.
pub fn flip_winding(triangles: &mut [u32]) {
    for triangle in triangles.chunks_exact_mut(3) {
        triangle.swap(0, 2);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Trs {
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

pub fn convert_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Trs {
    Trs {
        translation: Vec3::from_array(convert_vec3(translation)),
        rotation: convert_quat(Quat::from_array(rotation)),
        scale: Vec3::from_array(scale),
    }
}

/// Rotation whose z axis points along `forward` and whose y axis is as
/// close to `up` as possible.
fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let right = up.cross(forward).normalize_or_zero();
    if right == Vec3::ZERO {
        return Quat::from_rotation_arc(Vec3::Z, forward);
    }
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

/// Converts a glTF column-major matrix by decomposing it into translation,
/// rotation and scale.
///
/// Rotation is recovered from the forward and up columns, so matrices with
/// non-uniform scale combined with rotation are approximated.
pub fn convert_matrix(matrix: Mat4) -> Trs {
    let column = |index: usize| matrix.col(index).truncate();
    let translation = column(3);
    let rotation = look_rotation(column(2), column(1));
    let mut scale = Vec3::new(
        column(0).length(),
        column(1).length(),
        column(2).length(),
    );
    if (scale.x - scale.y).abs() > SCALE_EPSILON || (scale.y - scale.z).abs() > SCALE_EPSILON {
        warn!(
            "Non-uniform scale {} in node matrix, the converted rotation is approximated",
            scale
        );
    }

    if matrix.determinant() < 0.0 {
        // Mirrored matrix: recover the signed scale from what remains after
        // undoing translation and rotation.
        let correction =
            Mat4::from_scale_rotation_translation(Vec3::ONE, rotation, translation).inverse();
        let remainder = correction * matrix;
        scale = Vec3::new(remainder.x_axis.x, remainder.y_axis.y, remainder.z_axis.z);
    }

    Trs {
        translation: Vec3::from_array(convert_vec3(translation.to_array())),
        rotation: convert_quat(rotation),
        scale,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_trs_eq(left: Trs, right: Trs) {
        assert!(left.translation.abs_diff_eq(right.translation, 1e-5));
        assert!(
            left.rotation.abs_diff_eq(right.rotation, 1e-5)
                || left.rotation.abs_diff_eq(-right.rotation, 1e-5),
            "{} != {}",
            left.rotation,
            right.rotation
        );
        assert!(left.scale.abs_diff_eq(right.scale, 1e-5));
    }

    #[test]
    fn mirrors_vectors() {
        assert_eq!(convert_vec3([1.0, 2.0, 3.0]), [1.0, 2.0, -3.0]);
        assert_eq!(convert_tangent([1.0, 2.0, 3.0, 1.0]), [1.0, 2.0, -3.0, -1.0]);
        assert_eq!(convert_uv([0.25, 0.25]), [0.25, 0.75]);
        let rotation = convert_quat(Quat::from_xyzw(0.1, 0.2, 0.3, 0.9));
        assert_eq!(rotation.to_array(), [0.1, 0.2, -0.3, -0.9]);
    }

    #[test]
    fn flips_triangle_winding() {
        let mut triangles = vec![0, 1, 2, 3, 4, 5];
        flip_winding(&mut triangles);
        assert_eq!(triangles, vec![2, 1, 0, 5, 4, 3]);
    }

    #[test]
    fn identity_matrix() {
        let trs = convert_matrix(Mat4::IDENTITY);
        assert_trs_eq(
            trs,
            Trs {
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                scale: Vec3::ONE,
            },
        );
    }

    #[test]
    fn matrix_matches_decomposed_transform() {
        let translation = [1.0, -2.0, 3.0];
        let rotation = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 0.7);
        let scale = [2.0, 2.0, 2.0];
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::from_array(scale),
            rotation,
            Vec3::from_array(translation),
        );

        assert_trs_eq(
            convert_matrix(matrix),
            convert_trs(translation, rotation.to_array(), scale),
        );
    }

    #[test]
    fn mirrored_matrix_recomposes() {
        let mirror = Mat4::from_scale(Vec3::new(1.0, 1.0, -1.0));
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, -1.0, 1.0),
            Quat::from_rotation_x(0.5),
            Vec3::new(0.0, 1.0, 2.0),
        );
        let trs = convert_matrix(matrix);
        assert!(trs.scale.x * trs.scale.y * trs.scale.z < 0.0);
        assert!(trs
            .to_mat4()
            .abs_diff_eq(mirror * matrix * mirror, 1e-4));
    }
}
