//! Cameras and lights. Angles are degrees in the document and radians here.

use super::{child_float, child_text, descendant, fragment};
use crate::document::ColladaDocument;
use crate::text;
use assetgraph_core::{AssetError, Entity, Reader, Result, TreeNode};
use assetgraph_scene::{Attenuation, LightKind, Projection};
use glam::Vec3;
use log::warn;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Projection,
}

impl Entity for Camera {
    const KIND: &'static str = "camera";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let optics = node
            .member("optics")
            .and_then(|o| o.member("technique_common"))
            .ok_or_else(|| AssetError::invalid("<camera> has no <optics> technique"))?;

        if let Some(p) = optics.member("perspective") {
            let xfov = child_float(p, "xfov")?.map(f32::to_radians);
            let yfov = child_float(p, "yfov")?.map(f32::to_radians);
            let aspect = child_float(p, "aspect_ratio")?.filter(|&a| a > 0.0);
            let yfov_rad = match (yfov, xfov, aspect) {
                (Some(y), _, _) => y,
                (None, Some(x), Some(a)) => 2.0 * ((x / 2.0).tan() / a).atan(),
                (None, Some(x), None) => x,
                (None, None, _) => {
                    warn!("perspective camera without a field of view, using 45 degrees");
                    45f32.to_radians()
                }
            };
            let aspect_ratio = aspect.or(match (xfov, yfov) {
                (Some(x), Some(y)) => Some((x / 2.0).tan() / (y / 2.0).tan()),
                _ => None,
            });
            return Ok(Self {
                projection: Projection::Perspective {
                    yfov: yfov_rad,
                    aspect_ratio,
                    znear: child_float(p, "znear")?.unwrap_or(0.1),
                    zfar: child_float(p, "zfar")?,
                },
            });
        }

        if let Some(o) = optics.member("orthographic") {
            let xmag = child_float(o, "xmag")?;
            let ymag = child_float(o, "ymag")?;
            let aspect = child_float(o, "aspect_ratio")?.filter(|&a| a > 0.0);
            let xmag = xmag.or_else(|| Some(ymag? * aspect?)).or(ymag).unwrap_or(1.0);
            let ymag = ymag.or_else(|| aspect.map(|a| xmag / a)).unwrap_or(xmag);
            return Ok(Self {
                projection: Projection::Orthographic {
                    xmag,
                    ymag,
                    znear: child_float(o, "znear")?.unwrap_or(0.1),
                    zfar: child_float(o, "zfar")?.unwrap_or(1000.0),
                },
            });
        }

        Err(AssetError::Unsupported("camera without a perspective or orthographic projection".into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub attenuation: Attenuation,
}

impl Entity for Light {
    const KIND: &'static str = "light";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let technique = node
            .member("technique_common")
            .ok_or_else(|| AssetError::invalid("<light> has no <technique_common>"))?;
        let (params, tag) = technique
            .elements()
            .find_map(|el| el.tag().map(|t| (el, t)))
            .ok_or_else(|| AssetError::invalid("<light> has no light type"))?;

        let kind = match tag {
            "ambient" => LightKind::Ambient,
            "directional" => LightKind::Directional,
            "point" => LightKind::Point,
            "spot" => {
                let outer = (child_float(params, "falloff_angle")?.unwrap_or(180.0) / 2.0).to_radians();
                LightKind::Spot {
                    inner_cone: outer,
                    outer_cone: outer,
                }
            }
            other => return Err(AssetError::Unsupported(format!("light type <{}>", other))),
        };

        let color = match child_text(params, "color") {
            Some(c) => Vec3::from_array(text::fixed::<3>(c)?),
            None => Vec3::ONE,
        };
        let attenuation = Attenuation {
            constant: child_float(params, "constant_attenuation")?.unwrap_or(1.0),
            linear: child_float(params, "linear_attenuation")?.unwrap_or(0.0),
            quadratic: child_float(params, "quadratic_attenuation")?.unwrap_or(0.0),
        };
        let intensity = match descendant(node, "intensity").and_then(|i| i.text()) {
            Some(t) => t
                .trim()
                .parse::<f32>()
                .map_err(|_| AssetError::invalid(format!("light intensity \"{}\"", t)))?,
            None => 1.0,
        };

        Ok(Self {
            kind,
            color,
            intensity,
            attenuation,
        })
    }
}
