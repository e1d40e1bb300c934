//! Nodes, scenes, skins and cameras.

use super::buffer::Accessor;
use super::mesh::Mesh;
use crate::asset::Asset;
use assetgraph_core::{AssetError, Entity, Reader, Ref, Result, TreeNode};
use assetgraph_scene::Projection;
use glam::{Mat4, Quat, Vec3};

/// A node in the hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    pub children: Vec<Ref<Node>>,
    /// Local matrix. Takes precedence over TRS when present.
    pub matrix: Option<Mat4>,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub mesh: Option<Ref<Mesh>>,
    pub camera: Option<Ref<Camera>>,
    pub skin: Option<Ref<Skin>>,
    pub weights: Vec<f32>,
    /// Set after the document walk from the parent's children list.
    pub parent: Option<Ref<Node>>,
    /// Set after the document walk on every node some skin uses as a joint.
    pub joint_name: Option<String>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            matrix: None,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            mesh: None,
            camera: None,
            skin: None,
            weights: Vec::new(),
            parent: None,
            joint_name: None,
        }
    }
}

impl Node {
    pub fn local_transform(&self) -> Mat4 {
        self.matrix.unwrap_or_else(|| {
            Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
        })
    }

    pub fn is_joint(&self) -> bool {
        self.joint_name.is_some()
    }
}

impl Entity for Node {
    const KIND: &'static str = "node";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let mut out = Self {
            children: cx.retrieve_all(node, "children")?,
            ..Self::default()
        };

        if let Some(m) = node.find_floats::<16>("matrix") {
            out.matrix = Some(Mat4::from_cols_array(&m));
        } else {
            if let Some(t) = node.find_floats::<3>("translation") {
                out.translation = Vec3::from_array(t);
            }
            if let Some(r) = node.find_floats::<4>("rotation") {
                out.rotation = Quat::from_array(r);
            }
            if let Some(s) = node.find_floats::<3>("scale") {
                out.scale = Vec3::from_array(s);
            }
        }

        out.mesh = cx.retrieve_member(node, "mesh")?;
        out.camera = cx.retrieve_member(node, "camera")?;
        out.skin = cx.retrieve_member(node, "skin")?;
        out.weights = node
            .find_array("weights")
            .map(|w| w.elements().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
            .unwrap_or_default();
        Ok(out)
    }
}

/// A set of root nodes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub nodes: Vec<Ref<Node>>,
}

impl Entity for Scene {
    const KIND: &'static str = "scene";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        Ok(Self {
            nodes: cx.retrieve_all(node, "nodes")?,
        })
    }
}

/// Joints and bind matrices for skinning.
///
/// Joints and the skeleton root are node references, often to ancestors of
/// the node that uses the skin. They are bound after the document walk, when
/// no node is under construction.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub inverse_bind_matrices: Option<Ref<Accessor>>,
    pub joints: Vec<Ref<Node>>,
    pub skeleton: Option<Ref<Node>>,
    pub(crate) pending_joints: Vec<usize>,
    pub(crate) pending_skeleton: Option<usize>,
}

impl Skin {
    /// Whether joints still await the post-pass.
    pub fn is_bound(&self) -> bool {
        self.pending_joints.is_empty() && self.pending_skeleton.is_none()
    }
}

impl Entity for Skin {
    const KIND: &'static str = "skin";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let pending_joints = node
            .find_array("joints")
            .map(|j| j.elements().filter_map(|v| v.as_u64()).map(|v| v as usize).collect())
            .unwrap_or_default();
        Ok(Self {
            inverse_bind_matrices: cx.retrieve_member(node, "inverseBindMatrices")?,
            joints: Vec::new(),
            skeleton: None,
            pending_joints,
            pending_skeleton: node.find_index("skeleton"),
        })
    }
}

/// A camera projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Projection,
}

impl Entity for Camera {
    const KIND: &'static str = "camera";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let kind = node.find_string("type").unwrap_or("perspective");
        if kind != "perspective" && kind != "orthographic" {
            return Err(AssetError::Unsupported(format!("camera type \"{}\"", kind)));
        }
        let params = node
            .find_object(kind)
            .ok_or_else(|| AssetError::invalid(format!("camera is missing its \"{}\" parameters", kind)))?;

        let projection = if kind == "orthographic" {
            Projection::Orthographic {
                xmag: params.number_or("xmag", 1.0) as f32,
                ymag: params.number_or("ymag", 1.0) as f32,
                znear: params.number_or("znear", 0.01) as f32,
                zfar: params.number_or("zfar", 100.0) as f32,
            }
        } else {
            Projection::Perspective {
                yfov: params.number_or("yfov", std::f64::consts::FRAC_PI_2) as f32,
                aspect_ratio: params
                    .find_number("aspectRatio")
                    .filter(|&a| a > 0.0)
                    .map(|a| a as f32),
                znear: params.number_or("znear", 0.01) as f32,
                zfar: params.find_number("zfar").map(|z| z as f32),
            }
        };
        Ok(Self { projection })
    }
}
