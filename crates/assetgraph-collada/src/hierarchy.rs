//! The visual scene's nodes as placed.
//!
//! Library nodes can be instanced more than once, so joints are bound over
//! placed nodes rather than over the node dictionary. Placed nodes are
//! stored in pre-order; a parent always precedes its children.

use crate::document::ColladaDocument;
use crate::entities::{Camera, Controller, InstanceTarget, Light, MeshInstance, Node, VisualScene};
use crate::transform::Transform;
use assetgraph_core::{follow_chain, LazyDict, Ref};
use glam::Mat4;
use log::{debug, warn};

/// A mesh instance with its skin bound to placed nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedMesh {
    pub instance: MeshInstance,
    /// Placed node per skin joint; `None` where the joint was not found.
    pub joints: Vec<Option<usize>>,
    /// Placed node the skeleton hangs from.
    pub skeleton: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedNode {
    pub name: String,
    pub id: Option<String>,
    pub sid: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub transform: Mat4,
    /// Transformation steps `transform` is composed from, for animation.
    pub transforms: Vec<Transform>,
    /// Declared `type="JOINT"`, or bound by a skin.
    pub joint: bool,
    pub meshes: Vec<PlacedMesh>,
    pub cameras: Vec<Ref<Camera>>,
    pub lights: Vec<Ref<Light>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hierarchy {
    pub nodes: Vec<PlacedNode>,
    pub roots: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct MeshSlot {
    node: usize,
    mesh: usize,
}

impl Hierarchy {
    pub fn build(doc: &ColladaDocument, scene: Ref<VisualScene>) -> Self {
        let mut hierarchy = Self::default();
        if let Some(scene) = doc.visual_scenes.try_get(scene) {
            for node in &scene.nodes {
                hierarchy.place(doc, node, None);
            }
        }
        hierarchy
    }

    fn place(&mut self, doc: &ColladaDocument, node: &Node, parent: Option<usize>) {
        let index = self.nodes.len();
        self.nodes.push(PlacedNode {
            name: node.label().to_string(),
            id: node.id.clone(),
            sid: node.sid.clone(),
            parent,
            children: Vec::new(),
            transform: node.local_transform(),
            transforms: node.transforms.clone(),
            joint: node.joint,
            meshes: node
                .meshes
                .iter()
                .map(|instance| PlacedMesh {
                    instance: instance.clone(),
                    joints: Vec::new(),
                    skeleton: None,
                })
                .collect(),
            cameras: node.cameras.clone(),
            lights: node.lights.clone(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None => self.roots.push(index),
        }
        for child in &node.children {
            self.place(doc, child, Some(index));
        }
        for &instance in &node.instances {
            if let Some(library_node) = doc.nodes.try_get(instance) {
                self.place(doc, library_node, Some(index));
            }
        }
    }

    /// Indices of `root` and every node below it.
    pub fn subtree(&self, root: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend(self.nodes[i].children.iter().rev());
        }
        out
    }

    /// First placed node with the given ID.
    pub fn find_id(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id.as_deref() == Some(id))
    }

    /// Find a joint among `candidates`. IDREF joints match node IDs; name
    /// joints match the scoped ID, then the name, then the ID.
    fn find_joint(&self, joint: &str, by_id: bool, candidates: &[usize]) -> Option<usize> {
        let matching = |f: &dyn Fn(&PlacedNode) -> bool| candidates.iter().copied().find(|&i| f(&self.nodes[i]));
        if by_id {
            return matching(&|n| n.id.as_deref() == Some(joint));
        }
        matching(&|n| n.sid.as_deref() == Some(joint))
            .or_else(|| matching(&|n| n.name == joint))
            .or_else(|| matching(&|n| n.id.as_deref() == Some(joint)))
    }

    fn skinned_meshes<'c>(
        &self,
        controllers: &'c LazyDict<Controller>,
    ) -> Vec<(MeshSlot, &'c Controller)> {
        let mut out = Vec::new();
        for (node, placed) in self.nodes.iter().enumerate() {
            for (mesh, m) in placed.meshes.iter().enumerate() {
                let InstanceTarget::Controller(c) = m.instance.target else {
                    continue;
                };
                if let Some(controller) = controllers.try_get(c).filter(|c| c.skin().is_some()) {
                    out.push((MeshSlot { node, mesh }, controller));
                }
            }
        }
        out
    }

    /// Bind every skinned mesh's joints to placed nodes and find its skeleton
    /// root. Unbound joints and skeletons are dropped with a warning.
    pub fn bind_skins(&mut self, controllers: &LazyDict<Controller>, max_depth: usize) {
        let skinned = self.skinned_meshes(controllers);
        let all: Vec<usize> = (0..self.nodes.len()).collect();

        for (slot, controller) in skinned {
            let Some(skin) = controller.skin() else {
                continue;
            };

            // Explicit <skeleton> roots bound the joint search.
            let mut roots = Vec::new();
            for id in &self.nodes[slot.node].meshes[slot.mesh].instance.skeletons {
                match self.find_id(id) {
                    Some(root) => roots.push(root),
                    None => warn!("ignoring skeleton \"{}\": no such node", id),
                }
            }
            let candidates = if roots.is_empty() {
                all.clone()
            } else {
                roots.iter().flat_map(|&r| self.subtree(r)).collect()
            };

            let mut joints = vec![None; skin.joints.len()];
            for (j, name) in skin.joints.iter().enumerate() {
                joints[j] = self.find_joint(name, skin.joints_by_id, &candidates);
                if joints[j].is_none() {
                    warn!("joint \"{}\" is not in the scene", name);
                }
            }
            for node in joints.iter().flatten() {
                self.nodes[*node].joint = true;
            }

            let skeleton = match roots.first() {
                Some(&root) => Some(root),
                None => self.find_skeleton_root(&joints, max_depth),
            };
            let mesh = &mut self.nodes[slot.node].meshes[slot.mesh];
            mesh.joints = joints;
            mesh.skeleton = skeleton;
        }
    }

    /// Walk up from the first bound joint through joint ancestors. The first
    /// ancestor that is not a joint is the root; a chain that ends on a joint
    /// uses that top joint.
    fn find_skeleton_root(&self, joints: &[Option<usize>], max_depth: usize) -> Option<usize> {
        let start = joints.iter().flatten().next().copied()?;
        let walked = follow_chain(start, max_depth, |&i| {
            let node = &self.nodes[i];
            Ok(if node.joint { node.parent } else { None })
        });
        match walked {
            Ok(root) => {
                debug!("skeleton root is \"{}\"", self.nodes[root].name);
                Some(root)
            }
            Err(err) => {
                warn!("no skeleton root from joint \"{}\": {}", self.nodes[start].name, err);
                None
            }
        }
    }
}
