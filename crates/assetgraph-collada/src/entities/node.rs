//! Nodes and visual scenes.
//!
//! Nodes nested in a visual scene are owned by their parent. Nodes in
//! `library_nodes` are dictionary entries, placed into the hierarchy by
//! `instance_node`; an instance chain that leads back to a node still being
//! read is a cyclic reference.

use super::{children, fragment, optional, url_attr, Camera, Controller, Geometry, Light, Material};
use crate::document::ColladaDocument;
use crate::transform::{compose, Transform};
use assetgraph_core::{translate_url, AssetError, Entity, Reader, Ref, Result, TreeNode};
use glam::Mat4;
use indexmap::IndexMap;
use log::warn;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceTarget {
    Geometry(Ref<Geometry>),
    Controller(Ref<Controller>),
}

/// A material bound to a geometry's material symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBinding {
    pub material: Ref<Material>,
    /// Texture coordinate names mapped to `set` numbers.
    pub texcoord_sets: IndexMap<String, usize>,
}

/// An `instance_geometry` or `instance_controller`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshInstance {
    pub target: InstanceTarget,
    /// Bindings by material symbol.
    pub materials: IndexMap<String, MaterialBinding>,
    /// IDs of the nodes to search for joints.
    pub skeletons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub id: Option<String>,
    pub sid: Option<String>,
    pub name: Option<String>,
    /// `type="JOINT"`.
    pub joint: bool,
    pub transforms: Vec<Transform>,
    pub children: Vec<Node>,
    /// Library nodes placed here by `instance_node`.
    pub instances: Vec<Ref<Node>>,
    pub meshes: Vec<MeshInstance>,
    pub cameras: Vec<Ref<Camera>>,
    pub lights: Vec<Ref<Light>>,
}

impl Node {
    pub fn local_transform(&self) -> Mat4 {
        compose(&self.transforms)
    }

    /// Name, else ID, else scoped ID.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .or(self.sid.as_deref())
            .unwrap_or_default()
    }
}

fn read_instance<N: TreeNode>(
    element: &N,
    target: InstanceTarget,
    cx: &mut Reader<'_, N, ColladaDocument>,
) -> Result<MeshInstance> {
    let mut materials = IndexMap::new();
    let technique = element
        .member("bind_material")
        .and_then(|b| b.member("technique_common"));
    if let Some(technique) = technique {
        for binding in children(technique, "instance_material") {
            let Some(symbol) = binding.attribute("symbol") else {
                warn!("instance_material without a symbol");
                continue;
            };
            let url = url_attr(binding, "target")?;
            let Some(material) = optional(cx.retrieve_id::<Material>(url), "material")? else {
                continue;
            };
            let mut texcoord_sets = IndexMap::new();
            for input in children(binding, "bind_vertex_input") {
                if input.attribute("input_semantic") != Some("TEXCOORD") {
                    continue;
                }
                let set = input.attribute("input_set").unwrap_or("0");
                let set = set
                    .parse()
                    .map_err(|_| AssetError::invalid(format!("input_set \"{}\"", set)))?;
                if let Some(semantic) = input.attribute("semantic") {
                    texcoord_sets.insert(semantic.to_string(), set);
                }
            }
            materials.insert(
                symbol.to_string(),
                MaterialBinding {
                    material,
                    texcoord_sets,
                },
            );
        }
    }

    let mut skeletons = Vec::new();
    for skeleton in children(element, "skeleton") {
        let url = skeleton.text().unwrap_or_default().trim();
        skeletons.push(translate_url(url)?.to_string());
    }
    Ok(MeshInstance {
        target,
        materials,
        skeletons,
    })
}

/// Read a `<node>` and its nested nodes.
pub(crate) fn read_node<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Node> {
    let mut out = Node {
        id: node.attribute("id").map(str::to_string),
        sid: node.attribute("sid").map(str::to_string),
        name: node.attribute("name").map(str::to_string),
        joint: node.attribute("type") == Some("JOINT"),
        ..Node::default()
    };

    for child in node.elements() {
        let tag = child.tag().unwrap_or_default();
        match tag {
            "node" => out.children.push(read_node(child, cx)?),
            "instance_node" => {
                let url = url_attr(child, "url")?;
                out.instances.extend(optional(cx.retrieve_id::<Node>(url), "node instance")?);
            }
            "instance_geometry" => {
                let geometry = cx.retrieve_id::<Geometry>(url_attr(child, "url")?)?;
                out.meshes
                    .push(read_instance(child, InstanceTarget::Geometry(geometry), cx)?);
            }
            "instance_controller" => {
                let controller = cx.retrieve_id::<Controller>(url_attr(child, "url")?)?;
                out.meshes
                    .push(read_instance(child, InstanceTarget::Controller(controller), cx)?);
            }
            "instance_camera" => {
                let url = url_attr(child, "url")?;
                out.cameras.extend(optional(cx.retrieve_id::<Camera>(url), "camera")?);
            }
            "instance_light" => {
                let url = url_attr(child, "url")?;
                out.lights.extend(optional(cx.retrieve_id::<Light>(url), "light")?);
            }
            t if Transform::is_transform(t) => {
                let content = child.text().unwrap_or_default();
                out.transforms
                    .push(Transform::parse(t, child.attribute("sid"), content)?);
            }
            _ => {}
        }
    }
    Ok(out)
}

impl Entity for Node {
    const KIND: &'static str = "node";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        read_node(node, cx)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualScene {
    pub nodes: Vec<Node>,
}

impl Entity for VisualScene {
    const KIND: &'static str = "visual_scene";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let mut nodes = Vec::new();
        for child in children(node, "node") {
            nodes.push(read_node(child, cx)?);
        }
        Ok(Self { nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use glam::Vec3;

    #[test]
    fn test_nested_nodes_and_transforms() {
        let doc = fixtures::load(
            "",
            r#"<node id="root" name="Root">
                 <translate sid="location">1 2 3</translate>
                 <rotate sid="rotationZ">0 0 1 90</rotate>
                 <node sid="arm" type="JOINT"><scale>2 2 2</scale></node>
               </node>"#,
        )
        .unwrap();
        let scene = &doc.visual_scenes[doc.scene.unwrap()];
        let root = &scene.nodes[0];
        assert_eq!(root.label(), "Root");
        assert_eq!(root.transforms[0].sid.as_deref(), Some("location"));
        let p = root.local_transform().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 3.0, 3.0), 1e-5));

        let arm = &root.children[0];
        assert!(arm.joint);
        assert_eq!(arm.label(), "arm");
    }

    #[test]
    fn test_material_bindings() {
        let doc = fixtures::load_material(
            r#"<effect id="fx"><profile_COMMON><technique sid="t"><lambert/></technique></profile_COMMON></effect>"#,
            "",
        )
        .unwrap();
        let node = &doc.visual_scenes[doc.scene.unwrap()].nodes[0];
        let binding = &node.meshes[0].materials["mat"];
        assert_eq!(binding.material, doc.materials.get_id("m"));
        assert_eq!(binding.texcoord_sets.get("UVMap"), Some(&0));
        assert_eq!(doc.effects.len(), 1);
    }

    #[test]
    fn test_instance_node_cycle_is_fatal() {
        let libraries = r##"<library_nodes>
              <node id="lib-a"><instance_node url="#lib-b"/></node>
              <node id="lib-b"><node><instance_node url="#lib-a"/></node></node>
            </library_nodes>"##;
        let err = fixtures::load(libraries, r##"<node><instance_node url="#lib-a"/></node>"##).unwrap_err();
        assert!(err.is_cyclic());
        assert_eq!(err.path(), Some("visual_scenes[0] > nodes[0] > nodes[1]"));
    }

    #[test]
    fn test_instance_node_resolves_library_entry() {
        let libraries = r##"<library_nodes>
              <node id="lamp" name="Lamp"><translate>0 5 0</translate></node>
              <node id="unused"/>
            </library_nodes>"##;
        let doc = fixtures::load(
            libraries,
            r##"<node id="a"><instance_node url="#lamp"/></node>
                <node id="b"><instance_node url="#lamp"/><instance_node url="#ghost"/></node>"##,
        )
        .unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert!(doc.nodes.get_id("unused").is_null());
        let scene = &doc.visual_scenes[doc.scene.unwrap()];
        assert_eq!(scene.nodes[0].instances, scene.nodes[1].instances);
        assert_eq!(scene.nodes[1].instances.len(), 1);
    }

    #[test]
    fn test_unresolved_geometry_is_fatal() {
        let err = fixtures::load("", r##"<node><instance_geometry url="#nothing"/></node>"##).unwrap_err();
        assert!(err.is_unresolved());
        let err = fixtures::load("", r#"<node><instance_geometry url="nothing"/></node>"#).unwrap_err();
        assert!(matches!(err.root_cause(), AssetError::MalformedReference(_)));
    }
}
