use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

pub type Position = Vec<[f32; 3]>;
pub type Normal = Vec<[f32; 3]>;
pub type Tangent = Vec<[f32; 4]>;
pub type TexCoord = Vec<[f32; 2]>;
pub type VertexColor = Vec<[f32; 4]>;

/// Number of UV channels a mesh can carry.
pub const TEX_COORD_CHANNELS: usize = 4;

/// Axis-aligned box stored as center and half size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub center: [f32; 3],
    pub extents: [f32; 3],
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: ((min + max) * 0.5).to_array(),
            extents: ((max - min) * 0.5).to_array(),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), point| {
            (min.min(point), max.max(point))
        });
        Some(Self::from_min_max(min, max))
    }

    pub fn min(&self) -> Vec3 {
        Vec3::from_array(self.center) - Vec3::from_array(self.extents)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::from_array(self.center) + Vec3::from_array(self.extents)
    }

    pub fn encapsulate(&mut self, other: &Bounds) {
        *self = Self::from_min_max(self.min().min(other.min()), self.max().max(other.max()));
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, matrix: Mat4) -> Bounds {
        let (min, max) = (self.min(), self.max());
        let corners = (0..8).map(|corner| {
            let pick = |bit: usize, low: f32, high: f32| if corner & bit == 0 { low } else { high };
            matrix.transform_point3(Vec3::new(
                pick(1, min.x, max.x),
                pick(2, min.y, max.y),
                pick(4, min.z, max.z),
            ))
        });
        Bounds::from_points(corners).unwrap_or(*self)
    }
}

/// One frame of a morph target, as per-vertex deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendShape {
    pub name: String,
    pub weight: f32,
    pub delta_positions: Position,
    pub delta_normals: Normal,
    pub delta_tangents: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneWeight {
    pub joints: [u16; 4],
    pub weights: [f32; 4],
}

/// Triangle mesh in the left-handed frame of the scene graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub positions: Position,
    pub normals: Normal,
    pub tangents: Tangent,
    pub tex_coords: [TexCoord; TEX_COORD_CHANNELS],
    pub colors: VertexColor,
    pub triangles: Vec<u32>,
    pub bounds: Bounds,
    pub blend_shapes: Vec<BlendShape>,
    pub bone_weights: Vec<BoneWeight>,
    /// Column-major inverse bind matrices, one per bone.
    pub bind_poses: Vec<[f32; 16]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn recalculate_bounds(&mut self) {
        self.bounds = Bounds::from_points(self.positions.iter().copied().map(Vec3::from_array))
            .unwrap_or_default();
    }

    pub fn add_blend_shape_frame(
        &mut self,
        name: impl Into<String>,
        weight: f32,
        delta_positions: Position,
        delta_normals: Normal,
        delta_tangents: Vec<[f32; 3]>,
    ) {
        self.blend_shapes.push(BlendShape {
            name: name.into(),
            weight,
            delta_positions,
            delta_normals,
            delta_tangents,
        });
    }

    /// Generates tangents from positions, normals and the first UV channel.
    /// Does nothing unless all three are present for every vertex.
    pub fn recalculate_tangents(&mut self) -> bool {
        let count = self.positions.len();
        let uvs = &self.tex_coords[0];
        if count == 0 || self.normals.len() != count || uvs.len() != count {
            return false;
        }

        let mut tan1 = vec![Vec3::ZERO; count];
        let mut tan2 = vec![Vec3::ZERO; count];
        for triangle in self.triangles.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|index| index as usize);
            if a >= count || b >= count || c >= count {
                continue;
            }
            let position = |index: usize| Vec3::from_array(self.positions[index]);
            let uv = |index: usize| Vec2::from_array(uvs[index]);
            let (edge1, edge2) = (position(b) - position(a), position(c) - position(a));
            let (duv1, duv2) = (uv(b) - uv(a), uv(c) - uv(a));
            let determinant = duv1.x * duv2.y - duv2.x * duv1.y;
            if determinant.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / determinant;
            let sdir = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let tdir = (edge2 * duv1.x - edge1 * duv2.x) * r;
            for index in [a, b, c] {
                tan1[index] += sdir;
                tan2[index] += tdir;
            }
        }

        self.tangents = (0..count)
            .map(|index| {
                let normal = Vec3::from_array(self.normals[index]);
                let tangent = (tan1[index] - normal * normal.dot(tan1[index])).normalize_or_zero();
                let tangent = if tangent == Vec3::ZERO {
                    normal.any_orthonormal_vector()
                } else {
                    tangent
                };
                let handedness = if normal.cross(tan1[index]).dot(tan2[index]) < 0.0 {
                    -1.0
                } else {
                    1.0
                };
                tangent.extend(handedness).to_array()
            })
            .collect();
        true
    }

    pub fn sequential_triangles(vertex_count: usize) -> Vec<u32> {
        (0..vertex_count as u32).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn quad() -> Mesh {
        let mut mesh = Mesh {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            triangles: vec![0, 1, 2, 0, 2, 3],
            ..Default::default()
        };
        mesh.tex_coords[0] = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        mesh
    }

    #[test]
    fn bounds_of_positions() {
        let mut mesh = quad();
        mesh.recalculate_bounds();
        assert_eq!(mesh.bounds.center, [0.5, 0.5, 0.0]);
        assert_eq!(mesh.bounds.extents, [0.5, 0.5, 0.0]);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn transformed_bounds() {
        let bounds = Bounds::from_min_max(Vec3::ZERO, Vec3::ONE);
        let moved = bounds.transformed(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(moved.min(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(moved.max(), Vec3::new(2.0, 1.0, 1.0));
    }

    #[test]
    fn tangents_follow_u_direction() {
        let mut mesh = quad();
        assert!(mesh.recalculate_tangents());
        for tangent in &mesh.tangents {
            assert!(Vec3::new(tangent[0], tangent[1], tangent[2]).abs_diff_eq(Vec3::X, 1e-5));
            assert_eq!(tangent[3], 1.0);
        }
    }

    #[test]
    fn tangents_need_uvs() {
        let mut mesh = quad();
        mesh.tex_coords[0].clear();
        assert!(!mesh.recalculate_tangents());
        assert!(mesh.tangents.is_empty());
    }
}
