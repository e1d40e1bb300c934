//! Cameras and lights.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A camera attached to a scene node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub projection: Projection,
}

/// Camera projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        yfov: f32,
        /// Width over height, if fixed by the document.
        aspect_ratio: Option<f32>,
        znear: f32,
        /// `None` for an infinite projection.
        zfar: Option<f32>,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        znear: f32,
        zfar: f32,
    },
}

impl Camera {
    pub fn perspective(name: impl Into<String>, yfov: f32, znear: f32, zfar: Option<f32>) -> Self {
        Self {
            name: name.into(),
            projection: Projection::Perspective {
                yfov,
                aspect_ratio: None,
                znear,
                zfar,
            },
        }
    }
}

/// A light source attached to a scene node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    /// Linear RGB color.
    pub color: Vec3,
    pub intensity: f32,
    pub attenuation: Attenuation,
}

impl Light {
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            attenuation: Attenuation::default(),
        }
    }
}

/// Light type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot {
        /// Inner cone angle in radians.
        inner_cone: f32,
        /// Outer cone angle in radians.
        outer_cone: f32,
    },
}

/// Distance falloff `1 / (constant + linear * d + quadratic * d^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}
