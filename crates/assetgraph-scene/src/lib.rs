//! assetgraph-scene: the in-memory scene produced by importers.
//!
//! Importers resolve a document into their own asset graph and then flatten
//! it into a [`Scene`]. Exporters go the other way. The scene is plain owned
//! data: nodes, meshes, materials, cameras, lights and animations live in
//! vectors and refer to each other by index.

pub mod animation;
pub mod camera;
pub mod material;
pub mod mesh;
pub mod metadata;

pub use animation::*;
pub use camera::*;
pub use material::*;
pub use mesh::*;
pub use metadata::*;

use glam::Mat4;
use serde::{Deserialize, Serialize};

/// An imported scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    /// Scene nodes (hierarchy).
    pub nodes: Vec<SceneNode>,
    /// Root node indices.
    pub roots: Vec<usize>,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
    pub animations: Vec<Animation>,
    pub metadata: SceneMetadata,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a root node and return its index.
    pub fn add_root(&mut self, node: SceneNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.roots.push(index);
        index
    }

    /// Add a child node under `parent` and return its index.
    pub fn add_child(&mut self, parent: usize, mut node: SceneNode) -> usize {
        let index = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(index);
        }
        index
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_texture(&mut self, texture: Texture) -> usize {
        self.textures.push(texture);
        self.textures.len() - 1
    }

    pub fn add_camera(&mut self, camera: Camera) -> usize {
        self.cameras.push(camera);
        self.cameras.len() - 1
    }

    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    pub fn add_animation(&mut self, animation: Animation) -> usize {
        self.animations.push(animation);
        self.animations.len() - 1
    }

    /// First node with the given name.
    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Bounds of every mesh instance in world space.
    pub fn compute_bounds(&self) -> BoundingBox {
        let mut bounds: Option<BoundingBox> = None;
        for (_, node, world) in self.traverse() {
            for mesh in node.meshes.iter().filter_map(|&m| self.meshes.get(m)) {
                if mesh.positions.is_empty() {
                    continue;
                }
                let b = mesh.compute_bounds().transformed(world);
                match bounds.as_mut() {
                    Some(acc) => acc.expand(&b),
                    None => bounds = Some(b),
                }
            }
        }
        bounds.unwrap_or_default()
    }

    /// Depth-first walk yielding each node with its world transform.
    pub fn traverse(&self) -> impl Iterator<Item = (usize, &SceneNode, Mat4)> {
        Traverse::new(self)
    }
}

/// A node in the scene hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    /// Transform relative to the parent.
    pub transform: Mat4,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Mesh indices instanced by this node.
    pub meshes: Vec<usize>,
    pub camera: Option<usize>,
    pub light: Option<usize>,
}

impl Default for SceneNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            transform: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            meshes: Vec::new(),
            camera: None,
            light: None,
        }
    }
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the local transform.
    pub fn transformed(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Instance a mesh.
    pub fn with_mesh(mut self, mesh: usize) -> Self {
        self.meshes.push(mesh);
        self
    }
}

struct Traverse<'a> {
    scene: &'a Scene,
    stack: Vec<(usize, Mat4)>,
}

impl<'a> Traverse<'a> {
    fn new(scene: &'a Scene) -> Self {
        let stack = scene
            .roots
            .iter()
            .rev()
            .map(|&idx| (idx, Mat4::IDENTITY))
            .collect();
        Self { scene, stack }
    }
}

impl<'a> Iterator for Traverse<'a> {
    type Item = (usize, &'a SceneNode, Mat4);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (idx, parent) = self.stack.pop()?;
            let Some(node) = self.scene.nodes.get(idx) else {
                continue;
            };
            let world = parent * node.transform;
            self.stack
                .extend(node.children.iter().rev().map(|&c| (c, world)));
            return Some((idx, node, world));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_add_child_links_parent() {
        let mut scene = Scene::new();
        let root = scene.add_root(SceneNode::new("root"));
        let child = scene.add_child(root, SceneNode::new("child"));
        assert_eq!(scene.roots, vec![0]);
        assert_eq!(scene.nodes[root].children, vec![child]);
        assert_eq!(scene.nodes[child].parent, Some(root));
        assert_eq!(scene.find_node("child"), Some(child));
    }

    #[test]
    fn test_traversal_order_and_world_transforms() {
        let mut scene = Scene::new();
        let root = scene.add_root(
            SceneNode::new("root").transformed(Mat4::from_translation(Vec3::X)),
        );
        let a = scene.add_child(
            root,
            SceneNode::new("a").transformed(Mat4::from_translation(Vec3::Y)),
        );
        scene.add_child(root, SceneNode::new("b"));
        scene.add_child(a, SceneNode::new("a1"));

        let visited: Vec<(&str, Vec3)> = scene
            .traverse()
            .map(|(_, n, m)| (n.name.as_str(), m.transform_point3(Vec3::ZERO)))
            .collect();
        assert_eq!(
            visited,
            vec![
                ("root", Vec3::X),
                ("a", Vec3::new(1.0, 1.0, 0.0)),
                ("a1", Vec3::new(1.0, 1.0, 0.0)),
                ("b", Vec3::X),
            ]
        );
    }

    #[test]
    fn test_scene_bounds_use_world_transform() {
        let mut scene = Scene::new();
        let mut mesh = MeshData::new("tri");
        mesh.positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let m = scene.add_mesh(mesh);
        scene.add_root(
            SceneNode::new("n")
                .with_mesh(m)
                .transformed(Mat4::from_translation(Vec3::Z)),
        );
        let bounds = scene.compute_bounds();
        assert_eq!(bounds.min, Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 1.0));
    }
}
