//! Materials, effects and images.
//!
//! Only the common profile is read. A texture slot names a sampler, which
//! names a surface, which names an image; that chain is walked with the
//! same cycle guard as controller sources.

use super::{child_float, child_text, descendant, fragment, optional, url_attr};
use crate::document::ColladaDocument;
use crate::text;
use assetgraph_core::data_uri::{self, DataUri};
use assetgraph_core::{follow_chain, translate_url, AssetError, Entity, Reader, Ref, Result, TreeNode};
use glam::{Vec3, Vec4};
use log::warn;
use std::borrow::Cow;
use std::collections::HashMap;

/// A material: an instance of one effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub effect: Ref<Effect>,
}

impl Entity for Material {
    const KIND: &'static str = "material";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let instance = node
            .member("instance_effect")
            .ok_or_else(|| AssetError::invalid("<material> has no <instance_effect>"))?;
        Ok(Self {
            effect: cx.retrieve_id(url_attr(instance, "url")?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shading {
    Constant,
    #[default]
    Lambert,
    Phong,
    Blinn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorOrTexture {
    Color(Vec4),
    Texture {
        image: Ref<Image>,
        /// Texture coordinate name, bound per instance by `bind_vertex_input`.
        texcoord: String,
    },
}

impl ColorOrTexture {
    pub fn color(&self) -> Option<Vec4> {
        match self {
            Self::Color(c) => Some(*c),
            Self::Texture { .. } => None,
        }
    }
}

/// How `transparent` and `transparency` combine into opacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpaqueMode {
    #[default]
    AOne,
    RgbZero,
    AZero,
    RgbOne,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Effect {
    pub shading: Shading,
    pub emission: Option<ColorOrTexture>,
    pub ambient: Option<ColorOrTexture>,
    pub diffuse: Option<ColorOrTexture>,
    pub specular: Option<ColorOrTexture>,
    pub reflective: Option<ColorOrTexture>,
    pub transparent: Option<ColorOrTexture>,
    pub opaque: OpaqueMode,
    pub shininess: Option<f32>,
    pub reflectivity: Option<f32>,
    pub transparency: Option<f32>,
    pub index_of_refraction: Option<f32>,
    /// Normal map from a vendor `bump` extension.
    pub bump: Option<ColorOrTexture>,
    pub double_sided: bool,
}

fn luminance(c: Vec4) -> f32 {
    c.truncate().dot(Vec3::new(0.212671, 0.71516, 0.072169))
}

impl Effect {
    /// Opacity in `[0, 1]` from `transparent`, `transparency` and the
    /// opaque mode.
    pub fn opacity(&self) -> f32 {
        let t = self.transparency.unwrap_or(1.0);
        let opacity = match self.transparent.as_ref().and_then(ColorOrTexture::color) {
            None => t,
            Some(c) => match self.opaque {
                OpaqueMode::AOne => c.w * t,
                OpaqueMode::AZero => 1.0 - c.w * t,
                OpaqueMode::RgbZero => 1.0 - t * luminance(c),
                OpaqueMode::RgbOne => t * luminance(c),
            },
        };
        opacity.clamp(0.0, 1.0)
    }
}

/// A `newparam` of the common profile.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Param {
    /// `surface/init_from`: an image ID.
    Surface(String),
    /// `sampler2D/source` (a surface sid) or `sampler2D/instance_image` (an image ID).
    Sampler(String),
}

fn read_params<N: TreeNode>(scope: &N, params: &mut HashMap<String, Param>) -> Result<()> {
    for param in super::children(scope, "newparam") {
        let Some(sid) = param.attribute("sid") else {
            continue;
        };
        let value = if let Some(surface) = param.member("surface") {
            child_text(surface, "init_from").map(|id| Param::Surface(id.to_string()))
        } else if let Some(sampler) = param.member("sampler2D") {
            match (child_text(sampler, "source"), sampler.member("instance_image")) {
                (Some(source), _) => Some(Param::Sampler(source.to_string())),
                (None, Some(image)) => Some(Param::Sampler(
                    translate_url(image.attribute("url").unwrap_or_default())?.to_string(),
                )),
                (None, None) => None,
            }
        } else {
            None
        };
        if let Some(value) = value {
            params.insert(sid.to_string(), value);
        }
    }
    Ok(())
}

struct EffectReader<'p> {
    params: &'p HashMap<String, Param>,
}

impl EffectReader<'_> {
    /// The image behind a texture's sampler. A name that is not a sampler
    /// is taken as an image ID directly.
    fn image<N: TreeNode>(
        &self,
        sampler: &str,
        cx: &mut Reader<'_, N, ColladaDocument>,
    ) -> Result<Option<Ref<Image>>> {
        let params = self.params;
        let image_id = follow_chain(sampler.to_string(), cx.options().max_chain_depth, |k| {
            Ok(params.get(k).map(|p| match p {
                Param::Surface(next) | Param::Sampler(next) => next.clone(),
            }))
        })?;
        optional(cx.retrieve_id(&image_id), "texture image")
    }

    fn slot<N: TreeNode>(
        &self,
        element: Option<&N>,
        cx: &mut Reader<'_, N, ColladaDocument>,
    ) -> Result<Option<ColorOrTexture>> {
        let Some(element) = element else {
            return Ok(None);
        };
        if let Some(color) = child_text(element, "color") {
            let c = text::floats(color)?;
            return match c.len() {
                3 => Ok(Some(ColorOrTexture::Color(Vec4::new(c[0], c[1], c[2], 1.0)))),
                4 => Ok(Some(ColorOrTexture::Color(Vec4::new(c[0], c[1], c[2], c[3])))),
                n => Err(AssetError::invalid(format!("<color> needs 3 or 4 values, found {}", n))),
            };
        }
        if let Some(texture) = element.member("texture") {
            let sampler = texture.attribute("texture").unwrap_or_default();
            let texcoord = texture.attribute("texcoord").unwrap_or_default().to_string();
            return Ok(self
                .image(sampler, cx)?
                .map(|image| ColorOrTexture::Texture { image, texcoord }));
        }
        Ok(None)
    }
}

fn float_param<N: TreeNode>(model: &N, tag: &str) -> Result<Option<f32>> {
    match model.member(tag) {
        Some(el) => child_float(el, "float"),
        None => Ok(None),
    }
}

impl Entity for Effect {
    const KIND: &'static str = "effect";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let Some(profile) = node.member("profile_COMMON") else {
            warn!(
                "effect \"{}\" has no common profile, using defaults",
                node.attribute("id").unwrap_or_default()
            );
            return Ok(Self::default());
        };
        let technique = profile
            .member("technique")
            .ok_or_else(|| AssetError::invalid("<profile_COMMON> has no <technique>"))?;

        let mut params = HashMap::new();
        read_params(node, &mut params)?;
        read_params(profile, &mut params)?;
        read_params(technique, &mut params)?;
        let reader = EffectReader { params: &params };

        let models = [
            ("constant", Shading::Constant),
            ("lambert", Shading::Lambert),
            ("phong", Shading::Phong),
            ("blinn", Shading::Blinn),
        ];
        let Some((model, shading)) = models
            .iter()
            .find_map(|&(tag, shading)| technique.member(tag).map(|m| (m, shading)))
        else {
            warn!("effect technique has no shading model, using defaults");
            return Ok(Self::default());
        };

        let opaque = match model.member("transparent").and_then(|t| t.attribute("opaque")) {
            None | Some("A_ONE") => OpaqueMode::AOne,
            Some("RGB_ZERO") => OpaqueMode::RgbZero,
            Some("A_ZERO") => OpaqueMode::AZero,
            Some("RGB_ONE") => OpaqueMode::RgbOne,
            Some(other) => {
                warn!("unknown opaque mode \"{}\", using A_ONE", other);
                OpaqueMode::AOne
            }
        };
        let double_sided = descendant(node, "double_sided")
            .and_then(|d| d.text())
            .is_some_and(|t| matches!(t.trim(), "1" | "true"));

        Ok(Self {
            shading,
            emission: reader.slot(model.member("emission"), cx)?,
            ambient: reader.slot(model.member("ambient"), cx)?,
            diffuse: reader.slot(model.member("diffuse"), cx)?,
            specular: reader.slot(model.member("specular"), cx)?,
            reflective: reader.slot(model.member("reflective"), cx)?,
            transparent: reader.slot(model.member("transparent"), cx)?,
            opaque,
            shininess: float_param(model, "shininess")?,
            reflectivity: float_param(model, "reflectivity")?,
            transparency: float_param(model, "transparency")?,
            index_of_refraction: float_param(model, "index_of_refraction")?,
            bump: reader.slot(descendant(node, "bump"), cx)?,
            double_sided,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageData {
    /// Percent-decoded path or URI, relative to the document.
    File(String),
    Embedded {
        mime_type: Option<String>,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: ImageData,
}

fn mime_for_format(format: &str) -> String {
    match format.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        other => format!("image/{}", other),
    }
}

impl Image {
    fn from_path(path: &str) -> Result<Self> {
        if data_uri::is_data_uri(path) {
            let uri = DataUri::parse(path).ok_or_else(|| AssetError::invalid("invalid data URI"))?;
            return Ok(Self {
                data: ImageData::Embedded {
                    mime_type: Some(uri.mediatype.to_string()).filter(|m| !m.is_empty()),
                    data: uri.decode()?,
                },
            });
        }
        let path = text::percent_decode(path.strip_prefix("file://").unwrap_or(path));
        if path.is_empty() {
            warn!("image without a path");
            return Ok(Self {
                data: ImageData::File("unknown_texture".to_string()),
            });
        }
        Ok(Self {
            data: ImageData::File(path),
        })
    }

    fn from_hex(format: Option<&str>, hex: &str) -> Result<Self> {
        Ok(Self {
            data: ImageData::Embedded {
                mime_type: format.map(mime_for_format),
                data: text::hex_bytes(hex)?,
            },
        })
    }
}

impl Entity for Image {
    const KIND: &'static str = "image";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        if let Some(init) = node.member("init_from") {
            if let Some(hex) = init.member("hex") {
                return Self::from_hex(hex.attribute("format"), hex.text().unwrap_or_default());
            }
            let path = child_text(init, "ref")
                .or_else(|| init.text().map(str::trim))
                .unwrap_or_default();
            return Self::from_path(path);
        }
        if let Some(data) = node.member("data") {
            return Self::from_hex(node.attribute("format"), data.text().unwrap_or_default());
        }
        Self::from_path("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn effect(effect: &str, images: &str) -> Result<(ColladaDocument, Effect)> {
        let doc = fixtures::load_material(effect, images)?;
        let fx = doc.effects[doc.effects.get_id("fx")].clone();
        Ok((doc, fx))
    }

    fn image_path(doc: &ColladaDocument, id: &str) -> ImageData {
        doc.images[doc.images.get_id(id)].data.clone()
    }

    const TEXTURED: &str = r##"
        <effect id="fx">
          <profile_COMMON>
            <newparam sid="wood-surface">
              <surface type="2D"><init_from>wood</init_from></surface>
            </newparam>
            <newparam sid="wood-sampler">
              <sampler2D><source>wood-surface</source></sampler2D>
            </newparam>
            <technique sid="common">
              <phong>
                <emission><color>0 0 0 1</color></emission>
                <diffuse><texture texture="wood-sampler" texcoord="UVMap"/></diffuse>
                <specular><color>0.5 0.5 0.5</color></specular>
                <shininess><float>50</float></shininess>
                <transparent opaque="RGB_ZERO"><color>0.25 0.25 0.25 1</color></transparent>
                <transparency><float>1</float></transparency>
              </phong>
              <extra><technique profile="FCOLLADA"><bump><texture texture="missing" texcoord="UVMap"/></bump></technique></extra>
            </technique>
          </profile_COMMON>
          <extra><technique profile="MAX3D"><double_sided>1</double_sided></technique></extra>
        </effect>"##;

    #[test]
    fn test_texture_chain_reaches_image() {
        let images = r#"<image id="wood"><init_from>tex/wood%20grain.png</init_from></image>"#;
        let (doc, fx) = effect(TEXTURED, images).unwrap();

        assert_eq!(fx.shading, Shading::Phong);
        let Some(ColorOrTexture::Texture { image, texcoord }) = &fx.diffuse else {
            panic!("diffuse is not a texture: {:?}", fx.diffuse);
        };
        assert_eq!(texcoord, "UVMap");
        assert_eq!(doc.images[*image].data, ImageData::File("tex/wood grain.png".into()));
        assert_eq!(fx.specular, Some(ColorOrTexture::Color(Vec4::new(0.5, 0.5, 0.5, 1.0))));
        assert_eq!(fx.shininess, Some(50.0));
        assert!(fx.double_sided);
        // The bump sampler names no image.
        assert_eq!(fx.bump, None);
        assert!((fx.opacity() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_unresolved_texture_image_is_dropped() {
        let (doc, fx) = effect(TEXTURED, "").unwrap();
        assert_eq!(fx.diffuse, None);
        assert!(doc.images.is_empty());
    }

    #[test]
    fn test_sampler_cycle_is_fatal() {
        let looped = TEXTURED.replace("<init_from>wood</init_from>", "<init_from>wood-sampler</init_from>");
        let err = effect(&looped, "").unwrap_err();
        assert!(err.is_cyclic());
    }

    #[test]
    fn test_image_sources() {
        let images = r#"
            <image id="ref15"><init_from><ref>file://C:/maps/a%2Bb.jpg</ref></init_from></image>
            <image id="hex15" format="ignored"><init_from><hex format="PNG">89504E47</hex></init_from></image>
            <image id="datauri"><init_from>data:image/png;base64,iVBORw==</init_from></image>
            <image id="empty"><init_from/></image>"#;
        let fx = r#"
            <effect id="fx"><profile_COMMON><technique sid="t"><lambert>
              <diffuse><texture texture="ref15" texcoord="t"/></diffuse>
              <ambient><texture texture="hex15" texcoord="t"/></ambient>
              <emission><texture texture="datauri" texcoord="t"/></emission>
              <reflective><texture texture="empty" texcoord="t"/></reflective>
            </lambert></technique></profile_COMMON></effect>"#;
        let (doc, _) = effect(fx, images).unwrap();

        assert_eq!(image_path(&doc, "ref15"), ImageData::File("C:/maps/a+b.jpg".into()));
        assert_eq!(
            image_path(&doc, "hex15"),
            ImageData::Embedded {
                mime_type: Some("image/png".into()),
                data: vec![0x89, b'P', b'N', b'G'],
            }
        );
        assert_eq!(
            image_path(&doc, "datauri"),
            ImageData::Embedded {
                mime_type: Some("image/png".into()),
                data: vec![0x89, b'P', b'N', b'G'],
            }
        );
        assert_eq!(image_path(&doc, "empty"), ImageData::File("unknown_texture".into()));
    }

    #[test]
    fn test_opacity_modes() {
        let mut fx = Effect {
            transparent: Some(ColorOrTexture::Color(Vec4::new(1.0, 1.0, 1.0, 0.4))),
            transparency: Some(0.5),
            ..Effect::default()
        };
        assert!((fx.opacity() - 0.2).abs() < 1e-6);
        fx.opaque = OpaqueMode::AZero;
        assert!((fx.opacity() - 0.8).abs() < 1e-6);
        fx.opaque = OpaqueMode::RgbOne;
        assert!((fx.opacity() - 0.5).abs() < 1e-4);
        assert_eq!(Effect::default().opacity(), 1.0);
    }
}
