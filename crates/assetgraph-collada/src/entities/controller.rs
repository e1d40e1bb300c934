//! Skin and morph controllers.
//!
//! A controller's `source` names either a geometry or another controller.
//! The geometry at the end of that chain is found after the document walk,
//! so a controller may be declared before the mesh it deforms.

use super::{child_text, fragment, Geometry};
use crate::document::ColladaDocument;
use crate::source::{index_total, matrix, raw_inputs, scalar, tuple_width, Sources};
use crate::text;
use assetgraph_core::{
    translate_url, AssetError, DuplicatePolicy, Entity, Reader, Ref, Result, TreeNode,
};
use glam::Mat4;
use log::warn;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphMethod {
    /// Targets are complete meshes, blended toward by weight.
    Normalized,
    /// Targets are offsets added to the base mesh.
    Relative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub bind_shape_matrix: Mat4,
    pub joints: Vec<String>,
    /// Joints name node IDs (`IDREF_array`) rather than scoped IDs or names.
    pub joints_by_id: bool,
    pub inverse_bind_matrices: Vec<Mat4>,
    /// `(joint, weight)` influences per position source index.
    pub weights: Vec<Vec<(usize, f32)>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Morph {
    pub method: MorphMethod,
    pub target_ids: Vec<String>,
    pub weights: Vec<f32>,
    /// One entry per target ID. Set after the document walk; targets that
    /// never resolve stay `None`.
    pub targets: Vec<Option<Ref<Geometry>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerKind {
    Skin(Skin),
    Morph(Morph),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Controller {
    /// ID of the geometry or controller this one deforms.
    pub source: String,
    pub kind: ControllerKind,
    /// End of the source chain. Set after the document walk.
    pub geometry: Option<Ref<Geometry>>,
}

impl Controller {
    pub fn skin(&self) -> Option<&Skin> {
        match &self.kind {
            ControllerKind::Skin(skin) => Some(skin),
            ControllerKind::Morph(_) => None,
        }
    }

    pub fn morph(&self) -> Option<&Morph> {
        match &self.kind {
            ControllerKind::Morph(morph) => Some(morph),
            ControllerKind::Skin(_) => None,
        }
    }
}

fn parse_usize(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| AssetError::invalid(format!("negative {} index {}", what, value)))
}

fn read_skin<N: TreeNode>(skin: &N, policy: DuplicatePolicy) -> Result<Skin> {
    let sources = Sources::read(skin, policy)?;
    let bind_shape_matrix = match child_text(skin, "bind_shape_matrix") {
        Some(t) => Mat4::from_cols_array(&text::fixed::<16>(t)?).transpose(),
        None => Mat4::IDENTITY,
    };

    let joints_el = skin
        .member("joints")
        .ok_or_else(|| AssetError::invalid("<skin> has no <joints>"))?;
    let mut joints = Vec::new();
    let mut joints_by_id = false;
    let mut inverse_bind_matrices = Vec::new();
    for (semantic, source, _) in raw_inputs(joints_el)? {
        match semantic.as_str() {
            "JOINT" => {
                let (names, by_id) = sources.strings(&source)?;
                joints = names.to_vec();
                joints_by_id = by_id;
            }
            "INV_BIND_MATRIX" => {
                let (acc, data) = sources.floats(&source)?;
                inverse_bind_matrices = (0..acc.count)
                    .map(|i| matrix(acc, data, i))
                    .collect::<Result<_>>()?;
            }
            other => {
                return Err(AssetError::invalid(format!(
                    "unknown <joints> input semantic \"{}\"",
                    other
                )))
            }
        }
    }
    if inverse_bind_matrices.len() != joints.len() {
        return Err(AssetError::invalid(format!(
            "{} joints but {} inverse bind matrices",
            joints.len(),
            inverse_bind_matrices.len()
        )));
    }

    let vw = skin
        .member("vertex_weights")
        .ok_or_else(|| AssetError::invalid("<skin> has no <vertex_weights>"))?;
    let inputs = raw_inputs(vw)?;
    let mut joint_input = None;
    let mut weight_input = None;
    for (semantic, source, offset) in &inputs {
        match semantic.as_str() {
            "JOINT" => joint_input = Some((source.as_str(), *offset)),
            "WEIGHT" => weight_input = Some((source.as_str(), *offset)),
            other => {
                return Err(AssetError::invalid(format!(
                    "unknown <vertex_weights> input semantic \"{}\"",
                    other
                )))
            }
        }
    }
    let (joint_source, joint_offset) =
        joint_input.ok_or_else(|| AssetError::invalid("<vertex_weights> has no JOINT input"))?;
    let (weight_source, weight_offset) =
        weight_input.ok_or_else(|| AssetError::invalid("<vertex_weights> has no WEIGHT input"))?;
    let stride = tuple_width(inputs.iter().map(|(_, _, o)| *o))?;

    // Indices in <v> are into the vertex_weights JOINT source, which is
    // normally the <joints> one.
    let (names, _) = sources.strings(joint_source)?;
    let remap: Vec<Option<usize>> = names
        .iter()
        .map(|name| joints.iter().position(|j| j == name))
        .collect();
    let (weight_acc, weight_data) = sources.floats(weight_source)?;

    let count = match vw.attribute("count") {
        Some(c) => c
            .parse::<usize>()
            .map_err(|_| AssetError::invalid(format!("<vertex_weights> count \"{}\"", c)))?,
        None => 0,
    };
    let vcount = text::indices(child_text(vw, "vcount").unwrap_or_default())?;
    if vcount.len() != count {
        return Err(AssetError::invalid(format!(
            "<vertex_weights> declares {} vertices, <vcount> has {}",
            count,
            vcount.len()
        )));
    }
    let v = text::ints(child_text(vw, "v").unwrap_or_default())?;
    let expected = index_total(&vcount, stride)?;
    if v.len() != expected {
        return Err(AssetError::invalid(format!(
            "<v> expects {} values, found {}",
            expected,
            v.len()
        )));
    }

    let mut tuples = v.chunks(stride);
    let mut weights = Vec::with_capacity(count);
    for &n in &vcount {
        let mut influences = Vec::with_capacity(n);
        for tuple in tuples.by_ref().take(n) {
            // -1 binds to the bind shape itself.
            if tuple[joint_offset] < 0 {
                continue;
            }
            let joint = parse_usize(tuple[joint_offset], "joint")?;
            let joint = remap.get(joint).copied().flatten().ok_or_else(|| {
                AssetError::invalid(format!("joint index {} out of range", joint))
            })?;
            let weight = scalar(weight_acc, weight_data, parse_usize(tuple[weight_offset], "weight")?)?;
            influences.push((joint, weight));
        }
        weights.push(influences);
    }

    Ok(Skin {
        bind_shape_matrix,
        joints,
        joints_by_id,
        inverse_bind_matrices,
        weights,
    })
}

fn read_morph<N: TreeNode>(morph: &N, policy: DuplicatePolicy) -> Result<Morph> {
    let method = match morph.attribute("method") {
        None | Some("NORMALIZED") => MorphMethod::Normalized,
        Some("RELATIVE") => MorphMethod::Relative,
        Some(other) => return Err(AssetError::Unsupported(format!("morph method \"{}\"", other))),
    };
    let sources = Sources::read(morph, policy)?;
    let targets_el = morph
        .member("targets")
        .ok_or_else(|| AssetError::invalid("<morph> has no <targets>"))?;

    let mut target_ids = Vec::new();
    let mut weights = Vec::new();
    for (semantic, source, _) in raw_inputs(targets_el)? {
        match semantic.as_str() {
            "MORPH_TARGET" => target_ids = sources.strings(&source)?.0.to_vec(),
            "MORPH_WEIGHT" => {
                let (acc, data) = sources.floats(&source)?;
                weights = (0..acc.count)
                    .map(|i| scalar(acc, data, i))
                    .collect::<Result<_>>()?;
            }
            other => warn!("ignoring morph input \"{}\"", other),
        }
    }
    Ok(Morph {
        method,
        targets: vec![None; target_ids.len()],
        target_ids,
        weights,
    })
}

impl Entity for Controller {
    const KIND: &'static str = "controller";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let policy = cx.options().duplicate_ids;
        let (element, kind) = if let Some(skin) = node.member("skin") {
            (skin, ControllerKind::Skin(read_skin(skin, policy)?))
        } else if let Some(morph) = node.member("morph") {
            (morph, ControllerKind::Morph(read_morph(morph, policy)?))
        } else {
            return Err(AssetError::Unsupported("controller without <skin> or <morph>".into()));
        };
        let source = translate_url(element.attribute("source").unwrap_or_default())?;
        Ok(Self {
            source: source.to_string(),
            kind,
            geometry: None,
        })
    }
}
