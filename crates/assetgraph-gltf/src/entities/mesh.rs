//! Meshes and their primitives.

use super::buffer::Accessor;
use super::material::Material;
use crate::asset::Asset;
use assetgraph_core::{AssetError, Entity, Reader, Ref, Result, TreeNode};
use smallvec::SmallVec;

/// Highest `_n` set index probed for multi-set attributes.
pub const MAX_ATTRIBUTE_SETS: usize = 8;

/// Accessors of one semantic, indexed by set number. Gaps are null handles.
pub type AccessorList = SmallVec<[Ref<Accessor>; 1]>;

/// Topology of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveMode {
    pub fn from_gl(value: u64) -> Option<Self> {
        Some(match value {
            0 => Self::Points,
            1 => Self::Lines,
            2 => Self::LineLoop,
            3 => Self::LineStrip,
            4 => Self::Triangles,
            5 => Self::TriangleStrip,
            6 => Self::TriangleFan,
            _ => return None,
        })
    }

    pub fn to_gl(self) -> u32 {
        match self {
            Self::Points => 0,
            Self::Lines => 1,
            Self::LineLoop => 2,
            Self::LineStrip => 3,
            Self::Triangles => 4,
            Self::TriangleStrip => 5,
            Self::TriangleFan => 6,
        }
    }
}

/// Vertex attribute accessors of a primitive.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub position: Option<Ref<Accessor>>,
    pub normal: Option<Ref<Accessor>>,
    pub tangent: Option<Ref<Accessor>>,
    pub texcoord: AccessorList,
    pub color: AccessorList,
    pub joints: AccessorList,
    pub weights: AccessorList,
}

/// Displacements of one morph target.
#[derive(Debug, Clone, Default)]
pub struct MorphTarget {
    pub position: Option<Ref<Accessor>>,
    pub normal: Option<Ref<Accessor>>,
    pub tangent: Option<Ref<Accessor>>,
}

#[derive(Debug, Clone, Default)]
pub struct Primitive {
    pub mode: PrimitiveMode,
    pub attributes: Attributes,
    pub indices: Option<Ref<Accessor>>,
    pub material: Option<Ref<Material>>,
    pub targets: Vec<MorphTarget>,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
    /// Default morph target weights.
    pub weights: Vec<f32>,
}

/// Read `<base>_0` .. `<base>_N`, plus the bare `legacy` name as set 0.
fn read_sets<N: TreeNode>(
    cx: &mut Reader<'_, N, Asset>,
    attrs: &N,
    base: &str,
    legacy: Option<&str>,
) -> Result<AccessorList> {
    let mut list = AccessorList::new();
    for set in 0..MAX_ATTRIBUTE_SETS {
        let name = format!("{}_{}", base, set);
        if let Some(accessor) = cx.retrieve_member::<Accessor>(attrs, &name)? {
            if list.len() <= set {
                list.resize(set + 1, Ref::null());
            }
            list[set] = accessor;
        }
    }
    if let Some(legacy) = legacy {
        if let Some(accessor) = cx.retrieve_member::<Accessor>(attrs, legacy)? {
            if list.is_empty() {
                list.push(accessor);
            } else if list[0].is_null() {
                list[0] = accessor;
            }
        }
    }
    Ok(list)
}

fn read_attributes<N: TreeNode>(cx: &mut Reader<'_, N, Asset>, attrs: &N) -> Result<Attributes> {
    Ok(Attributes {
        position: cx.retrieve_member(attrs, "POSITION")?,
        normal: cx.retrieve_member(attrs, "NORMAL")?,
        tangent: cx.retrieve_member(attrs, "TANGENT")?,
        texcoord: read_sets(cx, attrs, "TEXCOORD", None)?,
        color: read_sets(cx, attrs, "COLOR", None)?,
        joints: read_sets(cx, attrs, "JOINTS", Some("JOINT"))?,
        weights: read_sets(cx, attrs, "WEIGHTS", Some("WEIGHT"))?,
    })
}

fn read_primitive<N: TreeNode>(cx: &mut Reader<'_, N, Asset>, node: &N) -> Result<Primitive> {
    let raw_mode = node.uint_or("mode", 4);
    let mode = PrimitiveMode::from_gl(raw_mode)
        .ok_or_else(|| AssetError::invalid(format!("unknown primitive mode {}", raw_mode)))?;

    let attributes = match node.find_object("attributes") {
        Some(attrs) => read_attributes(cx, attrs)?,
        None => Attributes::default(),
    };

    let mut targets = Vec::new();
    if let Some(list) = node.find_array("targets") {
        for target in list.elements().filter(|t| t.is_object()) {
            targets.push(MorphTarget {
                position: cx.retrieve_member(target, "POSITION")?,
                normal: cx.retrieve_member(target, "NORMAL")?,
                tangent: cx.retrieve_member(target, "TANGENT")?,
            });
        }
    }

    Ok(Primitive {
        mode,
        attributes,
        indices: cx.retrieve_member(node, "indices")?,
        material: cx.retrieve_member(node, "material")?,
        targets,
    })
}

impl Entity for Mesh {
    const KIND: &'static str = "mesh";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let mut primitives = Vec::new();
        if let Some(list) = node.find_array("primitives") {
            for (i, primitive) in list.elements().enumerate() {
                if !primitive.is_object() {
                    return Err(AssetError::invalid(format!("primitive {} is not an object", i)));
                }
                primitives.push(read_primitive(cx, primitive)?);
            }
        }

        let weights = node
            .find_array("weights")
            .map(|w| w.elements().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
            .unwrap_or_default();

        Ok(Self {
            primitives,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgraph_core::ImportOptions;
    use serde_json::json;

    fn accessor() -> serde_json::Value {
        json!({"componentType": 5126, "count": 0, "type": "VEC2"})
    }

    #[test]
    fn test_attribute_sets_and_legacy_names() {
        let doc = json!({
            "asset": {"version": "2.0"},
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{
                "primitives": [{
                    "attributes": {"POSITION": 0, "TEXCOORD_0": 1, "TEXCOORD_2": 2, "JOINT": 3, "WEIGHTS_0": 4},
                    "mode": 1,
                    "targets": [{"POSITION": 5}]
                }],
                "weights": [0.5]
            }],
            "accessors": [accessor(), accessor(), accessor(), accessor(), accessor(), accessor(), accessor()]
        });
        let asset = Asset::from_json(&doc, ImportOptions::default()).unwrap();
        let mesh = &asset.meshes[asset.meshes.get(0)];
        let prim = &mesh.primitives[0];

        assert_eq!(prim.mode, PrimitiveMode::Lines);
        assert_eq!(prim.attributes.texcoord.len(), 3);
        assert!(prim.attributes.texcoord[1].is_null());
        assert_eq!(prim.attributes.texcoord[2], asset.accessors.get(2));
        assert_eq!(prim.attributes.joints[0], asset.accessors.get(3));
        assert_eq!(prim.attributes.weights.len(), 1);
        assert_eq!(prim.targets[0].position, Some(asset.accessors.get(5)));
        assert_eq!(mesh.weights, vec![0.5]);
        // Accessor 6 is never referenced.
        assert_eq!(asset.accessors.len(), 6);
        assert!(asset.accessors.get(6).is_null());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let doc = json!({
            "asset": {"version": "2.0"},
            "scenes": [{"nodes": [0]}],
            "nodes": [{"mesh": 0}],
            "meshes": [{"primitives": [{"attributes": {}, "mode": 9}]}]
        });
        let err = Asset::from_json(&doc, ImportOptions::default()).err().unwrap();
        assert_eq!(err.path(), Some("scenes[0] > nodes[0] > meshes[0]"));
    }
}
