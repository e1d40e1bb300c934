//! Materials and textures.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// PBR material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Base color factor (RGBA).
    pub base_color: Vec4,
    pub base_color_texture: Option<TextureRef>,
    /// Metallic factor (0.0 = dielectric, 1.0 = metallic).
    pub metallic: f32,
    /// Roughness factor (0.0 = smooth, 1.0 = rough).
    pub roughness: f32,
    /// Metallic-roughness texture (B=metallic, G=roughness).
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureRef>,
    pub occlusion_strength: f32,
    /// Emissive color (RGB).
    pub emissive: Vec3,
    pub emissive_texture: Option<TextureRef>,
    pub alpha_mode: AlphaMode,
    /// Alpha cutoff (for `Mask` mode).
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    /// Specular-glossiness parameters, when the source used that workflow.
    pub specular_glossiness: Option<SpecularGlossiness>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec4::ONE,
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive: Vec3::ZERO,
            emissive_texture: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            specular_glossiness: None,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A plain colored dielectric material.
    pub fn colored(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            base_color: color,
            metallic: 0.0,
            roughness: 0.5,
            ..Default::default()
        }
    }
}

/// Specular-glossiness workflow parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecularGlossiness {
    pub diffuse: Vec4,
    pub diffuse_texture: Option<TextureRef>,
    pub specular: Vec3,
    pub glossiness: f32,
    pub specular_glossiness_texture: Option<TextureRef>,
}

impl Default for SpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse: Vec4::ONE,
            diffuse_texture: None,
            specular: Vec3::ONE,
            glossiness: 1.0,
            specular_glossiness_texture: None,
        }
    }
}

/// Alpha blending mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Alpha test against `alpha_cutoff`.
    Mask,
    Blend,
}

/// Reference to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRef {
    /// Index into the scene's textures.
    pub texture: usize,
    /// Texture coordinate set to use.
    pub texcoord: u32,
}

/// Texture: an image plus sampling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub source: ImageSource,
    pub sampler: Sampler,
}

/// Where a texture's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSource {
    /// Encoded image bytes carried in the document.
    Embedded {
        /// MIME type (e.g. "image/png").
        mime_type: String,
        data: Vec<u8>,
    },
    /// File path or URI, left for the caller to open.
    External { uri: String },
}

/// Texture sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sampler {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub wrap_u: Wrap,
    pub wrap_v: Wrap,
}

/// Texture filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Texture wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Wrap {
    ClampToEdge,
    #[default]
    Repeat,
    MirroredRepeat,
}
