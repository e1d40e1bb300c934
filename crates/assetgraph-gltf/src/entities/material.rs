//! Materials.

use super::texture::Texture;
use crate::asset::Asset;
use assetgraph_core::{Entity, Reader, Ref, Result, TreeNode};
use assetgraph_scene::AlphaMode;
use log::warn;

pub const KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS: &str = "KHR_materials_pbrSpecularGlossiness";

/// A texture slot of a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub texture: Ref<Texture>,
    pub tex_coord: u32,
}

/// Specular-glossiness workflow parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PbrSpecularGlossiness {
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureInfo>,
    pub specular_factor: [f32; 3],
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureInfo>,
}

impl Default for PbrSpecularGlossiness {
    fn default() -> Self {
        Self {
            diffuse_factor: [1.0; 4],
            diffuse_texture: None,
            specular_factor: [1.0; 3],
            glossiness_factor: 1.0,
            specular_glossiness_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureInfo>,
    pub normal_texture: Option<TextureInfo>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureInfo>,
    pub occlusion_strength: f32,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: [f32; 3],
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    /// Set only when the document declares the extension in `extensionsUsed`.
    pub pbr_specular_glossiness: Option<PbrSpecularGlossiness>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_texture: None,
            emissive_factor: [0.0; 3],
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            pbr_specular_glossiness: None,
        }
    }
}

pub fn alpha_mode_name(mode: AlphaMode) -> &'static str {
    match mode {
        AlphaMode::Opaque => "OPAQUE",
        AlphaMode::Mask => "MASK",
        AlphaMode::Blend => "BLEND",
    }
}

fn parse_alpha_mode(name: &str) -> AlphaMode {
    match name {
        "OPAQUE" => AlphaMode::Opaque,
        "MASK" => AlphaMode::Mask,
        "BLEND" => AlphaMode::Blend,
        other => {
            warn!("unknown alphaMode \"{}\", using OPAQUE", other);
            AlphaMode::Opaque
        }
    }
}

/// Read the texture slot `key` of `parent`. Returns the slot's node as well
/// so callers can read slot-specific members (`scale`, `strength`).
fn read_texture_info<'n, N: TreeNode>(
    cx: &mut Reader<'_, N, Asset>,
    parent: &'n N,
    key: &str,
) -> Result<Option<(TextureInfo, &'n N)>> {
    let Some(slot) = parent.find_object(key) else {
        return Ok(None);
    };
    let Some(texture) = cx.retrieve_member::<Texture>(slot, "index")? else {
        return Ok(None);
    };
    let info = TextureInfo {
        texture,
        tex_coord: slot.uint_or("texCoord", 0) as u32,
    };
    Ok(Some((info, slot)))
}

fn texture_slot<N: TreeNode>(
    cx: &mut Reader<'_, N, Asset>,
    parent: &N,
    key: &str,
) -> Result<Option<TextureInfo>> {
    Ok(read_texture_info(cx, parent, key)?.map(|(info, _)| info))
}

fn read_specular_glossiness<N: TreeNode>(
    cx: &mut Reader<'_, N, Asset>,
    ext: &N,
) -> Result<PbrSpecularGlossiness> {
    let defaults = PbrSpecularGlossiness::default();
    Ok(PbrSpecularGlossiness {
        diffuse_factor: ext.find_floats("diffuseFactor").unwrap_or(defaults.diffuse_factor),
        diffuse_texture: texture_slot(cx, ext, "diffuseTexture")?,
        specular_factor: ext.find_floats("specularFactor").unwrap_or(defaults.specular_factor),
        glossiness_factor: ext.number_or("glossinessFactor", 1.0) as f32,
        specular_glossiness_texture: texture_slot(cx, ext, "specularGlossinessTexture")?,
    })
}

impl Entity for Material {
    const KIND: &'static str = "material";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let mut material = Self::default();

        if let Some(pbr) = node.find_object("pbrMetallicRoughness") {
            if let Some(factor) = pbr.find_floats("baseColorFactor") {
                material.base_color_factor = factor;
            }
            material.base_color_texture = texture_slot(cx, pbr, "baseColorTexture")?;
            material.metallic_roughness_texture = texture_slot(cx, pbr, "metallicRoughnessTexture")?;
            material.metallic_factor = pbr.number_or("metallicFactor", 1.0) as f32;
            material.roughness_factor = pbr.number_or("roughnessFactor", 1.0) as f32;
        }

        if let Some((info, slot)) = read_texture_info(cx, node, "normalTexture")? {
            material.normal_texture = Some(info);
            material.normal_scale = slot.number_or("scale", 1.0) as f32;
        }
        if let Some((info, slot)) = read_texture_info(cx, node, "occlusionTexture")? {
            material.occlusion_texture = Some(info);
            material.occlusion_strength = slot.number_or("strength", 1.0) as f32;
        }
        material.emissive_texture = texture_slot(cx, node, "emissiveTexture")?;
        if let Some(factor) = node.find_floats("emissiveFactor") {
            material.emissive_factor = factor;
        }

        material.double_sided = node.bool_or("doubleSided", false);
        if let Some(mode) = node.find_string("alphaMode") {
            material.alpha_mode = parse_alpha_mode(mode);
        }
        material.alpha_cutoff = node.number_or("alphaCutoff", 0.5) as f32;

        if cx.asset().extensions_used.pbr_specular_glossiness {
            let ext = node
                .find_object("extensions")
                .and_then(|e| e.find_object(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS));
            if let Some(ext) = ext {
                material.pbr_specular_glossiness = Some(read_specular_glossiness(cx, ext)?);
            }
        }

        Ok(material)
    }
}
