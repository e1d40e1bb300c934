//! Node transformation steps.

use crate::text;
use assetgraph_core::{AssetError, Result};
use glam::{Mat4, Vec3, Vec4};

/// One transformation element of a `<node>`, applied in document order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformKind {
    /// Row-major in the document, stored column-major.
    Matrix(Mat4),
    Translate(Vec3),
    Rotate { axis: Vec3, degrees: f32 },
    Scale(Vec3),
    LookAt { eye: Vec3, target: Vec3, up: Vec3 },
    /// Shear along `along` in proportion to the component on `around`.
    Skew { degrees: f32, around: Vec3, along: Vec3 },
}

impl TransformKind {
    /// Element tag of this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            TransformKind::Matrix(_) => "matrix",
            TransformKind::Translate(_) => "translate",
            TransformKind::Rotate { .. } => "rotate",
            TransformKind::Scale(_) => "scale",
            TransformKind::LookAt { .. } => "lookat",
            TransformKind::Skew { .. } => "skew",
        }
    }

    /// Build the kind for element `tag` from its values in document order.
    pub fn from_values(tag: &str, v: &[f32]) -> Result<Self> {
        let expect = |n: usize| {
            if v.len() == n {
                Ok(())
            } else {
                Err(AssetError::invalid(format!(
                    "<{}> needs {} values, found {}",
                    tag,
                    n,
                    v.len()
                )))
            }
        };
        let vec3 = |i: usize| Vec3::new(v[i], v[i + 1], v[i + 2]);

        Ok(match tag {
            "matrix" => {
                expect(16)?;
                let mut cols = [0.0f32; 16];
                cols.copy_from_slice(v);
                TransformKind::Matrix(Mat4::from_cols_array(&cols).transpose())
            }
            "translate" => {
                expect(3)?;
                TransformKind::Translate(vec3(0))
            }
            "rotate" => {
                expect(4)?;
                TransformKind::Rotate {
                    axis: vec3(0),
                    degrees: v[3],
                }
            }
            "scale" => {
                expect(3)?;
                TransformKind::Scale(vec3(0))
            }
            "lookat" => {
                expect(9)?;
                TransformKind::LookAt {
                    eye: vec3(0),
                    target: vec3(3),
                    up: vec3(6),
                }
            }
            "skew" => {
                expect(7)?;
                TransformKind::Skew {
                    degrees: v[0],
                    around: vec3(1),
                    along: vec3(4),
                }
            }
            other => return Err(AssetError::Unsupported(format!("transform <{}>", other))),
        })
    }

    /// Values in document order; matrices are row-major.
    pub fn values(&self) -> Vec<f32> {
        match *self {
            TransformKind::Matrix(m) => m.transpose().to_cols_array().to_vec(),
            TransformKind::Translate(t) | TransformKind::Scale(t) => t.to_array().to_vec(),
            TransformKind::Rotate { axis, degrees } => axis.extend(degrees).to_array().to_vec(),
            TransformKind::LookAt { eye, target, up } => [eye, target, up]
                .iter()
                .flat_map(|v| v.to_array())
                .collect(),
            TransformKind::Skew {
                degrees,
                around,
                along,
            } => std::iter::once(degrees)
                .chain(around.to_array())
                .chain(along.to_array())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Scoped ID, the animation target name.
    pub sid: Option<String>,
    pub kind: TransformKind,
}

impl Transform {
    /// Whether `tag` names a transformation element.
    pub fn is_transform(tag: &str) -> bool {
        matches!(tag, "matrix" | "translate" | "rotate" | "scale" | "lookat" | "skew")
    }

    /// Parse the transformation element `tag` from its text content.
    pub fn parse(tag: &str, sid: Option<&str>, content: &str) -> Result<Self> {
        Ok(Self {
            sid: sid.map(str::to_string),
            kind: TransformKind::from_values(tag, &text::floats(content)?)?,
        })
    }

    /// A copy with `values` written over the document values starting at
    /// `first`. Values past the end of the element are ignored.
    pub fn with_values(&self, first: usize, values: &[f32]) -> Self {
        let mut v = self.kind.values();
        for (slot, &value) in v.iter_mut().skip(first).zip(values) {
            *slot = value;
        }
        let kind = TransformKind::from_values(self.kind.tag(), &v).unwrap_or(self.kind);
        Self {
            sid: self.sid.clone(),
            kind,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self.kind {
            TransformKind::Matrix(m) => m,
            TransformKind::Translate(t) => Mat4::from_translation(t),
            TransformKind::Rotate { axis, degrees } => match axis.try_normalize() {
                Some(axis) => Mat4::from_axis_angle(axis, degrees.to_radians()),
                None => Mat4::IDENTITY,
            },
            TransformKind::Scale(s) => Mat4::from_scale(s),
            TransformKind::LookAt { eye, target, up } => {
                let dir = (target - eye).normalize_or_zero();
                let right = dir.cross(up).normalize_or_zero();
                let up = right.cross(dir);
                Mat4::from_cols(
                    right.extend(0.0),
                    up.extend(0.0),
                    (-dir).extend(0.0),
                    eye.extend(1.0),
                )
            }
            TransformKind::Skew {
                degrees,
                around,
                along,
            } => {
                let shear = degrees.to_radians().tan();
                let around = around.normalize_or_zero();
                let along = along.normalize_or_zero();
                // v' = v + tan(angle) * (around . v) * along
                let col = |axis: Vec3| (axis + along * (shear * around.dot(axis))).extend(0.0);
                Mat4::from_cols(col(Vec3::X), col(Vec3::Y), col(Vec3::Z), Vec4::W)
            }
        }
    }
}

/// Product of the steps in document order.
pub fn compose(steps: &[Transform]) -> Mat4 {
    steps
        .iter()
        .fold(Mat4::IDENTITY, |acc, step| acc * step.matrix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tag: &str, content: &str) -> Transform {
        Transform::parse(tag, None, content).unwrap()
    }

    #[test]
    fn test_matrix_is_row_major() {
        let m = step("matrix", "1 0 0 5  0 1 0 6  0 0 1 7  0 0 0 1").matrix();
        assert_eq!(m.w_axis, Vec4::new(5.0, 6.0, 7.0, 1.0));
    }

    #[test]
    fn test_compose_applies_in_document_order() {
        let steps = [step("translate", "10 0 0"), step("rotate", "0 0 1 90"), step("scale", "2 2 2")];
        let m = compose(&steps);
        let p = m.transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_lookat_faces_target() {
        let m = step("lookat", "0 0 5  0 0 0  0 1 0").matrix();
        let forward = m.transform_vector3(Vec3::NEG_Z);
        assert!(forward.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert!(m.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-6));
    }

    #[test]
    fn test_skew_shears_along_axis() {
        let m = step("skew", "45  0 1 0  1 0 0").matrix();
        let p = m.transform_point3(Vec3::new(0.0, 2.0, 0.0));
        assert!(p.abs_diff_eq(Vec3::new(2.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_with_values_overwrites_components() {
        let rot = step("rotate", "0 0 1 0");
        assert_eq!(rot.kind.values(), [0.0, 0.0, 1.0, 0.0]);
        let turned = rot.with_values(3, &[90.0]);
        assert_eq!(turned.kind, TransformKind::Rotate { axis: Vec3::Z, degrees: 90.0 });

        let m = step("matrix", "1 0 0 5  0 1 0 6  0 0 1 7  0 0 0 1");
        assert_eq!(m.kind.values()[3], 5.0);
        let moved = m.with_values(7, &[-6.0]);
        assert_eq!(moved.matrix().w_axis, Vec4::new(5.0, -6.0, 7.0, 1.0));

        let t = step("translate", "1 2 3").with_values(2, &[9.0, 9.0]);
        assert_eq!(t.kind, TransformKind::Translate(Vec3::new(1.0, 2.0, 9.0)));
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        assert!(Transform::parse("translate", None, "1 2").is_err());
        assert!(Transform::parse("rotate", Some("rotX"), "1 0 0").is_err());
        assert_eq!(step("rotate", "0 0 0 30").matrix(), Mat4::IDENTITY);
    }
}
