//! Mesh data.

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Primitive topology of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Points,
    Lines,
    #[default]
    Triangles,
}

impl PrimitiveKind {
    /// Number of indices per primitive.
    pub fn arity(&self) -> usize {
        match self {
            Self::Points => 1,
            Self::Lines => 2,
            Self::Triangles => 3,
        }
    }
}

/// A mesh with a single material and topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub kind: PrimitiveKind,
    pub positions: Vec<Vec3>,
    /// Empty when absent.
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    /// One entry per texture coordinate set.
    pub texcoords: Vec<Vec<Vec2>>,
    /// One entry per vertex color set.
    pub colors: Vec<Vec<Vec4>>,
    /// Flat index list, `kind.arity()` indices per primitive.
    pub indices: Vec<u32>,
    /// Index into the scene's materials.
    pub material: Option<usize>,
    pub bones: Vec<Bone>,
    pub morph_targets: Vec<MorphTarget>,
}

impl MeshData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.indices.len() / self.kind.arity()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn compute_bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }
}

/// A bone influencing a skinned mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bone {
    /// Name of the scene node driving this bone.
    pub name: String,
    /// Mesh space to bone space (inverse bind matrix).
    pub offset_matrix: Mat4,
    pub weights: Vec<VertexWeight>,
}

impl Bone {
    pub fn new(name: impl Into<String>, offset_matrix: Mat4) -> Self {
        Self {
            name: name.into(),
            offset_matrix,
            weights: Vec::new(),
        }
    }
}

/// Influence of a bone on one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexWeight {
    pub vertex: u32,
    pub weight: f32,
}

/// Vertex displacements blended onto a mesh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MorphTarget {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub weight: f32,
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Create from a set of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some((first, rest)) = points.split_first() else {
            return Self::default();
        };
        rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |mut b, p| {
                b.expand_point(*p);
                b
            },
        )
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) / 2.0
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Expand to include another bounding box.
    pub fn expand(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Bounds of the eight transformed corners.
    pub fn transformed(&self, m: Mat4) -> Self {
        let corners: Vec<Vec3> = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { self.min.x } else { self.max.x },
                    if i & 2 == 0 { self.min.y } else { self.max.y },
                    if i & 4 == 0 { self.min.z } else { self.max.z },
                )
            })
            .map(|c| m.transform_point3(c))
            .collect();
        Self::from_points(&corners)
    }
}
