use glam::Mat4;

use crate::{coords::convert_matrix, mesh::BoneWeight};

/// Scales weights so they sum to one. Weights that already sum to exactly
/// one, or to zero, are returned untouched.
pub fn normalize_weights(weights: [f32; 4]) -> [f32; 4] {
    let sum: f32 = weights.iter().sum();
    if sum == 1.0 || sum == 0.0 {
        weights
    } else {
        weights.map(|weight| weight / sum)
    }
}

/// Pairs joint indices with normalized weights. Returns `None` when the
/// two attribute streams disagree on length.
pub fn bone_weights(joints: &[[u16; 4]], weights: &[[f32; 4]]) -> Option<Vec<BoneWeight>> {
    if joints.len() != weights.len() {
        return None;
    }
    Some(
        joints
            .iter()
            .zip(weights)
            .map(|(joints, weights)| BoneWeight {
                joints: *joints,
                weights: normalize_weights(*weights),
            })
            .collect(),
    )
}

/// Converts inverse bind matrices into the scene graph frame.
pub fn bind_poses(inverse_bind_matrices: &[Mat4]) -> Vec<[f32; 16]> {
    inverse_bind_matrices
        .iter()
        .map(|matrix| convert_matrix(*matrix).to_mat4().to_cols_array())
        .collect()
}

#[cfg(test)]
mod test {
    use glam::{Quat, Vec3};

    use super::*;

    #[test]
    fn weights_sum_to_one() {
        let normalized = normalize_weights([0.5, 0.5, 0.5, 0.5]);
        assert!((normalized.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(normalized, [0.25; 4]);

        let normalized = normalize_weights([3.0, 1.0, 0.0, 0.0]);
        assert!((normalized.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalized_weights_are_untouched() {
        let weights = [0.5, 0.25, 0.125, 0.125];
        assert_eq!(weights.iter().sum::<f32>(), 1.0);
        let normalized = normalize_weights(weights);
        assert_eq!(normalized.map(f32::to_bits), weights.map(f32::to_bits));
    }

    #[test]
    fn zero_weights_stay_zero() {
        assert_eq!(normalize_weights([0.0; 4]), [0.0; 4]);
    }

    #[test]
    fn mismatched_streams() {
        assert!(bone_weights(&[[0, 1, 2, 3]], &[]).is_none());
        let weights = bone_weights(&[[0, 1, 0, 0]], &[[2.0, 2.0, 0.0, 0.0]]).unwrap();
        assert_eq!(weights[0].weights, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn bind_pose_of_translation() {
        let matrix = Mat4::from_rotation_translation(Quat::IDENTITY, Vec3::new(0.0, 0.0, 2.0));
        let poses = bind_poses(&[matrix]);
        let pose = Mat4::from_cols_array(&poses[0]);
        assert!(pose
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-5));
    }
}
