//! The glTF asset: twelve lazy dictionaries over one document.

use crate::entities::{
    Accessor, Buffer, BufferView, Camera, Image, Material, Mesh, Node, Sampler, Scene, Skin,
    Texture, KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS,
};
use crate::glb;
use assetgraph_core::{
    follow_chain, AssetError, DeferredRefs, DictId, FsLoader, HasDict, IdRegistry, ImportOptions,
    LazyDict, NoLoader, Reader, Ref, RefKind, Resolution, ResourceLoader, Result, Store, TreeNode,
};
use log::{debug, warn};
use serde_json::Value;
use std::path::Path;

/// The `asset` object of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub version: String,
    pub min_version: Option<String>,
    pub generator: Option<String>,
    pub copyright: Option<String>,
}

impl Default for AssetMetadata {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            min_version: None,
            generator: None,
            copyright: None,
        }
    }
}

impl AssetMetadata {
    /// Read and validate the `asset` object. Only 2.x documents are accepted.
    pub fn read<N: TreeNode>(root: &N) -> Result<Self> {
        let obj = root
            .find_object("asset")
            .ok_or_else(|| AssetError::Unsupported("document has no \"asset\" object".into()))?;

        let version = match obj.find_string("version") {
            Some(v) => v.to_string(),
            None => obj
                .find_number("version")
                .map(|v| format!("{:.1}", v))
                .unwrap_or_default(),
        };
        if !version.starts_with('2') {
            return Err(AssetError::Unsupported(format!("glTF version \"{}\"", version)));
        }

        Ok(Self {
            version,
            min_version: obj.find_string("minVersion").map(str::to_string),
            generator: obj.find_string("generator").map(str::to_string),
            copyright: obj.find_string("copyright").map(str::to_string),
        })
    }
}

/// Extensions the document declares in `extensionsUsed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionsUsed {
    pub names: Vec<String>,
    pub pbr_specular_glossiness: bool,
}

impl ExtensionsUsed {
    pub fn read<N: TreeNode>(root: &N) -> Self {
        let names: Vec<String> = root
            .find_array("extensionsUsed")
            .map(|arr| arr.elements().filter_map(|v| v.as_str()).map(str::to_string).collect())
            .unwrap_or_default();
        let pbr_specular_glossiness = names.iter().any(|n| n == KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS);
        Self {
            names,
            pbr_specular_glossiness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkinSlot {
    Joint,
    Skeleton,
}

/// An in-memory glTF 2.0 asset.
///
/// Reading resolves the default scene and everything reachable from it.
/// Dictionary entries never referenced from that scene (or from a skin's
/// joints) are not built.
pub struct Asset {
    pub buffers: LazyDict<Buffer>,
    pub buffer_views: LazyDict<BufferView>,
    pub accessors: LazyDict<Accessor>,
    pub images: LazyDict<Image>,
    pub samplers: LazyDict<Sampler>,
    pub textures: LazyDict<Texture>,
    pub materials: LazyDict<Material>,
    pub meshes: LazyDict<Mesh>,
    pub cameras: LazyDict<Camera>,
    pub nodes: LazyDict<Node>,
    pub scenes: LazyDict<Scene>,
    pub skins: LazyDict<Skin>,

    pub metadata: AssetMetadata,
    pub extensions_used: ExtensionsUsed,
    /// The resolved default scene.
    pub scene: Option<Ref<Scene>>,

    /// GLB binary chunk, until the buffer without a uri claims it.
    body: Option<Vec<u8>>,
    loader: Box<dyn ResourceLoader>,
    ids: IdRegistry,
    options: ImportOptions,
}

impl Asset {
    /// An empty asset, for building one with [`Store::create`].
    pub fn new(options: ImportOptions) -> Self {
        Self::with_loader(Box::new(NoLoader), options)
    }

    pub fn with_loader(loader: Box<dyn ResourceLoader>, options: ImportOptions) -> Self {
        Self {
            buffers: LazyDict::new(DictId(0), "buffers", None),
            buffer_views: LazyDict::new(DictId(1), "bufferViews", None),
            accessors: LazyDict::new(DictId(2), "accessors", None),
            images: LazyDict::new(DictId(3), "images", None),
            samplers: LazyDict::new(DictId(4), "samplers", None),
            textures: LazyDict::new(DictId(5), "textures", None),
            materials: LazyDict::new(DictId(6), "materials", None),
            meshes: LazyDict::new(DictId(7), "meshes", None),
            cameras: LazyDict::new(DictId(8), "cameras", None),
            nodes: LazyDict::new(DictId(9), "nodes", None),
            scenes: LazyDict::new(DictId(10), "scenes", None),
            skins: LazyDict::new(DictId(11), "skins", None),
            metadata: AssetMetadata::default(),
            extensions_used: ExtensionsUsed::default(),
            scene: None,
            body: None,
            loader,
            ids: IdRegistry::new(),
            options,
        }
    }

    /// Load a `.gltf` or `.glb` file. External buffers resolve relative to
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>, options: ImportOptions) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_slice(&data, Box::new(FsLoader::for_document(path)), options)
    }

    /// Read a glTF JSON or GLB document from memory.
    pub fn from_slice(data: &[u8], loader: Box<dyn ResourceLoader>, options: ImportOptions) -> Result<Self> {
        let mut asset = Self::with_loader(loader, options);
        let json = if glb::is_glb(data) {
            let container = glb::parse(data)?;
            asset.body = container.bin.map(<[u8]>::to_vec);
            container.json
        } else {
            data
        };
        let doc: Value = serde_json::from_slice(json)?;
        asset.read_document(&doc)?;
        Ok(asset)
    }

    /// Read an already parsed document. External files cannot be opened.
    pub fn from_json(doc: &Value, options: ImportOptions) -> Result<Self> {
        let mut asset = Self::new(options);
        asset.read_document(doc)?;
        Ok(asset)
    }

    pub fn loader(&self) -> &dyn ResourceLoader {
        self.loader.as_ref()
    }

    pub(crate) fn take_body(&mut self) -> Option<Vec<u8>> {
        self.body.take()
    }

    /// The node's name, or its ID when unnamed.
    pub fn node_name(&self, r: Ref<Node>) -> String {
        self.nodes.display_name(r).unwrap_or_default().to_string()
    }

    fn attach<N: TreeNode>(&mut self, root: &N) {
        self.buffers.attach(root);
        self.buffer_views.attach(root);
        self.accessors.attach(root);
        self.images.attach(root);
        self.samplers.attach(root);
        self.textures.attach(root);
        self.materials.attach(root);
        self.meshes.attach(root);
        self.cameras.attach(root);
        self.nodes.attach(root);
        self.scenes.attach(root);
        self.skins.attach(root);
    }

    fn read_document<N: TreeNode>(&mut self, doc: &N) -> Result<()> {
        if !doc.is_object() {
            return Err(AssetError::invalid("document root must be a JSON object"));
        }
        self.metadata = AssetMetadata::read(doc)?;
        self.extensions_used = ExtensionsUsed::read(doc);
        self.attach(doc);

        let root = match doc.find_index("scene") {
            Some(index) => Some(index),
            None if self.options.default_scene_fallback && self.scenes.section_len() > 0 => {
                debug!("no default scene declared, using scene 0");
                Some(0)
            }
            None => None,
        };

        let mut cx = Reader::new(doc, self);
        if let Some(index) = root {
            let scene = cx.retrieve::<Scene>(index)?;
            cx.asset_mut().scene = Some(scene);
        }
        bind_skins(&mut cx)?;

        self.link_parents();
        self.mark_joints();
        self.find_skeleton_roots();
        debug!(
            "built {} nodes, {} meshes, {} accessors",
            self.nodes.len(),
            self.meshes.len(),
            self.accessors.len()
        );
        Ok(())
    }

    fn link_parents(&mut self) {
        let links: Vec<(Ref<Node>, Ref<Node>)> = self
            .nodes
            .iter()
            .flat_map(|(parent, node)| node.children.iter().map(move |&child| (child, parent)))
            .collect();
        for (child, parent) in links {
            self.nodes[child].parent = Some(parent);
        }
    }

    pub(crate) fn mark_joints(&mut self) {
        let joints: Vec<Ref<Node>> = self
            .skins
            .iter()
            .flat_map(|(_, skin)| skin.joints.iter().copied())
            .collect();
        for joint in joints {
            let name = self.node_name(joint);
            self.nodes[joint].joint_name = Some(name);
        }
    }

    /// For skins without an explicit skeleton, walk up from the first joint
    /// through joint-marked ancestors. The first unmarked ancestor is the
    /// root; a chain that ends on a joint uses that top joint.
    pub(crate) fn find_skeleton_roots(&mut self) {
        let handles: Vec<Ref<Node>> = self.nodes.handles().collect();
        let mut roots = Vec::new();

        for (skin_ref, skin) in self.skins.iter() {
            if skin.skeleton.is_some() {
                continue;
            }
            let Some(start) = skin.joints.first().and_then(|&j| self.nodes.position(j)) else {
                continue;
            };
            let walked = follow_chain(start, self.options.max_chain_depth, |&i| {
                let node = &self.nodes[handles[i]];
                Ok(match node.parent {
                    Some(parent) if node.is_joint() => self.nodes.position(parent),
                    _ => None,
                })
            });
            match walked {
                Ok(root) => roots.push((skin_ref, handles[root])),
                Err(err) => warn!(
                    "no skeleton root for skin \"{}\": {}",
                    self.skins.display_name(skin_ref).unwrap_or_default(),
                    err
                ),
            }
        }

        for (skin, root) in roots {
            debug!("skeleton root of skin {:?} is \"{}\"", skin, self.node_name(root));
            self.skins[skin].skeleton = Some(root);
        }
    }
}

/// Bind skin joints and explicit skeleton roots. Retrieving a joint can build
/// further skins, so this repeats until none are pending.
fn bind_skins<N: TreeNode>(cx: &mut Reader<'_, N, Asset>) -> Result<()> {
    loop {
        let mut refs = DeferredRefs::new();
        let asset = cx.asset_mut();
        let pending: Vec<Ref<Skin>> = asset
            .skins
            .iter()
            .filter(|(_, skin)| !skin.is_bound())
            .map(|(r, _)| r)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        for r in pending {
            let skin = &mut asset.skins[r];
            for index in std::mem::take(&mut skin.pending_joints) {
                refs.defer((r, SkinSlot::Joint), index.to_string(), RefKind::Required("joint"));
            }
            if let Some(index) = skin.pending_skeleton.take() {
                refs.defer((r, SkinSlot::Skeleton), index.to_string(), RefKind::BestEffort("skeleton"));
            }
        }

        refs.resolve_all(|record| {
            let Ok(index) = record.target.parse::<usize>() else {
                return Ok(Resolution::Unresolved);
            };
            let node = match cx.retrieve::<Node>(index) {
                Ok(node) => node,
                Err(AssetError::IndexOutOfRange { .. } | AssetError::MissingSection { .. }) => {
                    return Ok(Resolution::Unresolved)
                }
                Err(err) => return Err(err),
            };
            let (skin, slot) = record.owner;
            let skin = &mut cx.asset_mut().skins[skin];
            match slot {
                SkinSlot::Joint => skin.joints.push(node),
                SkinSlot::Skeleton => skin.skeleton = Some(node),
            }
            Ok(Resolution::Resolved)
        })?;
    }
}

impl Store for Asset {
    fn ids(&self) -> &IdRegistry {
        &self.ids
    }

    fn ids_mut(&mut self) -> &mut IdRegistry {
        &mut self.ids
    }

    fn options(&self) -> &ImportOptions {
        &self.options
    }
}

macro_rules! impl_has_dict {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl HasDict<$ty> for Asset {
                fn dict(&self) -> &LazyDict<$ty> {
                    &self.$field
                }

                fn dict_mut(&mut self) -> &mut LazyDict<$ty> {
                    &mut self.$field
                }
            }
        )*
    };
}

impl_has_dict! {
    Buffer => buffers,
    BufferView => buffer_views,
    Accessor => accessors,
    Image => images,
    Sampler => samplers,
    Texture => textures,
    Material => materials,
    Mesh => meshes,
    Camera => cameras,
    Node => nodes,
    Scene => scenes,
    Skin => skins,
}
