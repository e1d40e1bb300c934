//! glTF export.
//!
//! A [`Scene`](out::Scene) is first built into a fresh [`Asset`] using only
//! [`Store::create`] and [`Store::find_unique_id`], so the exported graph
//! obeys the same ID rules as an imported one. The asset is then flattened
//! into a [`schema::Document`] and written as JSON with an embedded buffer,
//! or as GLB.

use crate::asset::Asset;
use crate::entities::{
    self as gltf, alpha_mode_name, Accessor, Attributes, Buffer, BufferView, ComponentType,
    ElementType, Image, Mesh, MorphTarget, Node, PbrSpecularGlossiness, Primitive, PrimitiveMode,
    Skin, TextureInfo, KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS, TARGET_ARRAY_BUFFER,
    TARGET_ELEMENT_ARRAY_BUFFER,
};
use crate::{glb, schema};
use assetgraph_core::data_uri::{encode_data_uri, sniff_image_mime};
use assetgraph_core::{
    AssetError, ExportOptions, HasDict, ImportOptions, LazyDict, Ref, Result, Store,
};
use assetgraph_scene as out;
use glam::{Mat4, Quat, Vec3};
use log::debug;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Most joint influences glTF stores per vertex in one attribute set.
const MAX_INFLUENCES: usize = 4;

/// Export `scene` as glTF JSON, or as GLB when `options.binary` is set.
pub fn export(scene: &out::Scene, options: &ExportOptions) -> Result<Vec<u8>> {
    Asset::from_scene(scene)?.write(options)
}

impl Asset {
    /// Build a new asset holding `scene`. All vertex and image data goes into
    /// a single buffer.
    pub fn from_scene(scene: &out::Scene) -> Result<Self> {
        AssetBuilder::new(scene).build()
    }

    /// Flatten the asset into a serializable document.
    ///
    /// In binary mode every buffer is packed into the returned body and the
    /// document names a single buffer without a uri. Otherwise buffers are
    /// written as data URIs, except external ones when `embed_buffers` is off,
    /// and the body is empty.
    pub fn to_document(&self, options: &ExportOptions) -> Result<(schema::Document, Vec<u8>)> {
        DocumentWriter { asset: self, options }.write()
    }

    /// Serialize as glTF JSON or GLB.
    pub fn write(&self, options: &ExportOptions) -> Result<Vec<u8>> {
        let (doc, body) = self.to_document(options)?;
        if options.binary {
            let json = serde_json::to_vec(&doc)?;
            return Ok(glb::write(&json, &body));
        }
        let json = if options.pretty {
            serde_json::to_vec_pretty(&doc)?
        } else {
            serde_json::to_vec(&doc)?
        };
        Ok(json)
    }
}

/// `<base>_<what>`, or empty when there is no base.
fn derived(base: &str, what: &str) -> String {
    if base.is_empty() {
        String::new()
    } else {
        format!("{}_{}", base, what)
    }
}

fn filter_to_gl(filter: out::Filter) -> u32 {
    match filter {
        out::Filter::Nearest => gltf::FILTER_NEAREST,
        out::Filter::Linear => gltf::FILTER_LINEAR,
    }
}

fn wrap_to_gl(wrap: out::Wrap) -> u32 {
    match wrap {
        out::Wrap::ClampToEdge => gltf::WRAP_CLAMP_TO_EDGE,
        out::Wrap::Repeat => gltf::WRAP_REPEAT,
        out::Wrap::MirroredRepeat => gltf::WRAP_MIRRORED_REPEAT,
    }
}

/// Store `m` as TRS when that reproduces it, else as a matrix.
fn set_transform(node: &mut Node, m: Mat4) {
    let (scale, rotation, translation) = m.to_scale_rotation_translation();
    let rebuilt = Mat4::from_scale_rotation_translation(scale, rotation, translation);
    if rebuilt.abs_diff_eq(m, 1e-5) {
        node.scale = scale;
        node.rotation = rotation;
        node.translation = translation;
    } else {
        node.matrix = Some(m);
    }
}

fn component_bounds(values: &[f32], components: usize) -> (Vec<f64>, Vec<f64>) {
    let mut min = vec![f64::MAX; components];
    let mut max = vec![f64::MIN; components];
    for element in values.chunks_exact(components) {
        for (i, &v) in element.iter().enumerate() {
            min[i] = min[i].min(v as f64);
            max[i] = max[i].max(v as f64);
        }
    }
    (min, max)
}

/// Per-vertex joint indices and weights, four per vertex. Keeps the
/// strongest influences and renormalizes them.
fn vertex_influences(mesh: &out::MeshData, joints: &[&str]) -> (Vec<u32>, Vec<f32>) {
    let mut per_vertex: Vec<Vec<(u32, f32)>> = vec![Vec::new(); mesh.positions.len()];
    for bone in &mesh.bones {
        let Some(joint) = joints.iter().position(|&name| name == bone.name) else {
            continue;
        };
        for w in &bone.weights {
            if let Some(slot) = per_vertex.get_mut(w.vertex as usize) {
                slot.push((joint as u32, w.weight));
            }
        }
    }

    let mut indices = Vec::with_capacity(per_vertex.len() * MAX_INFLUENCES);
    let mut weights = Vec::with_capacity(per_vertex.len() * MAX_INFLUENCES);
    for mut influences in per_vertex {
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.truncate(MAX_INFLUENCES);
        let total: f32 = influences.iter().map(|i| i.1).sum();
        for k in 0..MAX_INFLUENCES {
            match influences.get(k) {
                Some(&(joint, weight)) if total > 0.0 => {
                    indices.push(joint);
                    weights.push(weight / total);
                }
                _ => {
                    indices.push(0);
                    weights.push(0.0);
                }
            }
        }
    }
    (indices, weights)
}

struct AssetBuilder<'a> {
    scene: &'a out::Scene,
    asset: Asset,
    buffer: Option<Ref<Buffer>>,
    data: Vec<u8>,
    textures: Vec<Ref<gltf::Texture>>,
    samplers: Vec<(out::Sampler, Ref<gltf::Sampler>)>,
    materials: Vec<Ref<gltf::Material>>,
    cameras: Vec<Ref<gltf::Camera>>,
    /// Exported node per scene node. `None` for nodes under no root.
    nodes: Vec<Option<Ref<Node>>>,
    /// Keyed by a node's mesh list.
    meshes: HashMap<Vec<usize>, (Ref<Mesh>, Option<Ref<Skin>>)>,
}

impl<'a> AssetBuilder<'a> {
    fn new(scene: &'a out::Scene) -> Self {
        Self {
            scene,
            asset: Asset::new(ImportOptions::default()),
            buffer: None,
            data: Vec::new(),
            textures: Vec::with_capacity(scene.textures.len()),
            samplers: Vec::new(),
            materials: Vec::with_capacity(scene.materials.len()),
            cameras: Vec::with_capacity(scene.cameras.len()),
            nodes: vec![None; scene.nodes.len()],
            meshes: HashMap::new(),
        }
    }

    /// Create an entry under a fresh ID derived from `name`, keeping `name`
    /// as its display name.
    fn create<T>(&mut self, name: &str, suffix: &str, value: T) -> Result<Ref<T>>
    where
        Asset: HasDict<T>,
    {
        let id = self.asset.find_unique_id(name, suffix);
        let r = self.asset.create(&id, value)?;
        if !name.is_empty() {
            HasDict::<T>::dict_mut(&mut self.asset).set_name(r, name);
        }
        Ok(r)
    }

    fn build(mut self) -> Result<Asset> {
        let scene = self.scene;
        self.asset.metadata.generator = scene.metadata.generator.clone();
        self.asset.metadata.copyright = scene.metadata.copyright.clone();

        for texture in &scene.textures {
            let r = self.export_texture(texture)?;
            self.textures.push(r);
        }
        for material in &scene.materials {
            let r = self.export_material(material)?;
            self.materials.push(r);
        }
        for camera in &scene.cameras {
            let r = self.create(
                &camera.name,
                "camera",
                gltf::Camera {
                    projection: camera.projection,
                },
            )?;
            self.cameras.push(r);
        }
        if !scene.lights.is_empty() {
            debug!("{} lights have no glTF counterpart", scene.lights.len());
        }

        let mut roots = Vec::with_capacity(scene.roots.len());
        for &root in &scene.roots {
            roots.push(self.export_node(root, None)?);
        }
        for index in 0..scene.nodes.len() {
            if let Some(node) = self.nodes[index] {
                self.attach_meshes(index, node)?;
            }
        }

        let default_scene = self.create("", "scene", gltf::Scene { nodes: roots })?;
        self.asset.scene = Some(default_scene);

        if let Some(buffer) = self.buffer {
            self.asset.buffers[buffer].data = std::mem::take(&mut self.data);
        }
        self.asset.mark_joints();
        self.asset.find_skeleton_roots();
        debug!(
            "exported {} nodes, {} meshes, {} accessors",
            self.asset.nodes.len(),
            self.asset.meshes.len(),
            self.asset.accessors.len()
        );
        Ok(self.asset)
    }

    fn declare_extension(&mut self, name: &str) {
        let used = &mut self.asset.extensions_used;
        if !used.names.iter().any(|n| n == name) {
            used.names.push(name.to_string());
        }
        if name == KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS {
            used.pbr_specular_glossiness = true;
        }
    }

    fn push_view(&mut self, base: &str, bytes: &[u8], target: Option<u32>) -> Result<Ref<BufferView>> {
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = self.create("", "buffer", Buffer::default())?;
                self.buffer = Some(buffer);
                buffer
            }
        };
        let padding = (4 - self.data.len() % 4) % 4;
        self.data.resize(self.data.len() + padding, 0);
        let byte_offset = self.data.len();
        self.data.extend_from_slice(bytes);

        let id = self.asset.find_unique_id(&derived(base, "view"), "view");
        self.asset.create(
            &id,
            BufferView {
                buffer,
                byte_offset,
                byte_length: bytes.len(),
                byte_stride: None,
                target,
            },
        )
    }

    /// Write `bytes` to a new view and create `accessor` over it.
    fn push_accessor(
        &mut self,
        base: &str,
        accessor: Accessor,
        bytes: &[u8],
        target: Option<u32>,
    ) -> Result<Ref<Accessor>> {
        let id = self.asset.find_unique_id(base, "accessor");
        let view = self.push_view(&id, bytes, target)?;
        self.asset.create(
            &id,
            Accessor {
                buffer_view: Some(view),
                ..accessor
            },
        )
    }

    fn float_accessor(
        &mut self,
        base: &str,
        element_type: ElementType,
        values: &[f32],
        target: Option<u32>,
    ) -> Result<Ref<Accessor>> {
        let components = element_type.components();
        let (min, max) = if values.is_empty() || element_type == ElementType::Mat4 {
            (Vec::new(), Vec::new())
        } else {
            component_bounds(values, components)
        };
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let accessor = Accessor {
            buffer_view: None,
            byte_offset: 0,
            component_type: ComponentType::F32,
            count: values.len() / components,
            element_type,
            normalized: false,
            min,
            max,
        };
        self.push_accessor(base, accessor, &bytes, target)
    }

    fn index_accessor(&mut self, base: &str, indices: &[u32]) -> Result<Ref<Accessor>> {
        let min = indices.iter().copied().min().unwrap_or(0);
        let max = indices.iter().copied().max().unwrap_or(0);
        let (component_type, bytes): (ComponentType, Vec<u8>) = if max <= u16::MAX as u32 {
            (
                ComponentType::U16,
                indices.iter().flat_map(|&i| (i as u16).to_le_bytes()).collect(),
            )
        } else {
            (
                ComponentType::U32,
                indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
            )
        };
        let accessor = Accessor {
            buffer_view: None,
            byte_offset: 0,
            component_type,
            count: indices.len(),
            element_type: ElementType::Scalar,
            normalized: false,
            min: vec![min as f64],
            max: vec![max as f64],
        };
        self.push_accessor(base, accessor, &bytes, Some(TARGET_ELEMENT_ARRAY_BUFFER))
    }

    fn joint_accessor(&mut self, base: &str, joints: &[u32]) -> Result<Ref<Accessor>> {
        let bytes: Vec<u8> = joints.iter().flat_map(|&j| (j as u16).to_le_bytes()).collect();
        let accessor = Accessor {
            buffer_view: None,
            byte_offset: 0,
            component_type: ComponentType::U16,
            count: joints.len() / MAX_INFLUENCES,
            element_type: ElementType::Vec4,
            normalized: false,
            min: Vec::new(),
            max: Vec::new(),
        };
        self.push_accessor(base, accessor, &bytes, Some(TARGET_ARRAY_BUFFER))
    }

    fn sampler(&mut self, sampler: out::Sampler) -> Result<Ref<gltf::Sampler>> {
        if let Some(&(_, r)) = self.samplers.iter().find(|(s, _)| *s == sampler) {
            return Ok(r);
        }
        let r = self.create(
            "",
            "sampler",
            gltf::Sampler {
                mag_filter: Some(filter_to_gl(sampler.mag_filter)),
                min_filter: Some(filter_to_gl(sampler.min_filter)),
                wrap_s: wrap_to_gl(sampler.wrap_u),
                wrap_t: wrap_to_gl(sampler.wrap_v),
            },
        )?;
        self.samplers.push((sampler, r));
        Ok(r)
    }

    fn export_texture(&mut self, texture: &out::Texture) -> Result<Ref<gltf::Texture>> {
        let image = match &texture.source {
            out::ImageSource::Embedded { mime_type, data } => {
                let view = self.push_view(&derived(&texture.name, "image"), data, None)?;
                Image {
                    uri: None,
                    mime_type: Some(mime_type.clone()),
                    buffer_view: Some(view),
                    data: data.clone(),
                }
            }
            out::ImageSource::External { uri } => Image {
                uri: Some(uri.clone()),
                ..Image::default()
            },
        };
        let image = self.create(&derived(&texture.name, "image"), "image", image)?;
        let sampler = self.sampler(texture.sampler)?;
        self.create(
            &texture.name,
            "texture",
            gltf::Texture {
                source: Some(image),
                sampler: Some(sampler),
            },
        )
    }

    fn texture_info(&self, slot: Option<out::TextureRef>) -> Option<TextureInfo> {
        let slot = slot?;
        self.textures.get(slot.texture).map(|&texture| TextureInfo {
            texture,
            tex_coord: slot.texcoord,
        })
    }

    fn export_material(&mut self, m: &out::Material) -> Result<Ref<gltf::Material>> {
        let pbr_specular_glossiness = m.specular_glossiness.as_ref().map(|sg| PbrSpecularGlossiness {
            diffuse_factor: sg.diffuse.to_array(),
            diffuse_texture: self.texture_info(sg.diffuse_texture),
            specular_factor: sg.specular.to_array(),
            glossiness_factor: sg.glossiness,
            specular_glossiness_texture: self.texture_info(sg.specular_glossiness_texture),
        });
        if pbr_specular_glossiness.is_some() {
            self.declare_extension(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS);
        }
        let material = gltf::Material {
            base_color_factor: m.base_color.to_array(),
            base_color_texture: self.texture_info(m.base_color_texture),
            metallic_factor: m.metallic,
            roughness_factor: m.roughness,
            metallic_roughness_texture: self.texture_info(m.metallic_roughness_texture),
            normal_texture: self.texture_info(m.normal_texture),
            normal_scale: m.normal_scale,
            occlusion_texture: self.texture_info(m.occlusion_texture),
            occlusion_strength: m.occlusion_strength,
            emissive_texture: self.texture_info(m.emissive_texture),
            emissive_factor: m.emissive.to_array(),
            alpha_mode: m.alpha_mode,
            alpha_cutoff: m.alpha_cutoff,
            double_sided: m.double_sided,
            pbr_specular_glossiness,
        };
        self.create(&m.name, "material", material)
    }

    fn export_node(&mut self, index: usize, parent: Option<Ref<Node>>) -> Result<Ref<Node>> {
        let scene = self.scene;
        let source = scene
            .nodes
            .get(index)
            .ok_or_else(|| AssetError::invalid(format!("node index {} out of range", index)))?;
        if self.nodes[index].is_some() {
            return Err(AssetError::invalid(format!(
                "node \"{}\" appears twice in the hierarchy",
                source.name
            )));
        }

        let mut node = Node {
            parent,
            camera: source.camera.and_then(|c| self.cameras.get(c).copied()),
            ..Node::default()
        };
        set_transform(&mut node, source.transform);
        let r = self.create(&source.name, "node", node)?;
        self.nodes[index] = Some(r);

        let mut children = Vec::with_capacity(source.children.len());
        for &child in &source.children {
            children.push(self.export_node(child, Some(r))?);
        }
        self.asset.nodes[r].children = children;
        Ok(r)
    }

    /// First exported node called `name`.
    fn node_named(&self, name: &str) -> Option<Ref<Node>> {
        self.scene
            .nodes
            .iter()
            .zip(&self.nodes)
            .find(|(node, exported)| exported.is_some() && node.name == name)
            .and_then(|(_, exported)| *exported)
    }

    fn attach_meshes(&mut self, index: usize, node: Ref<Node>) -> Result<()> {
        let scene = self.scene;
        let list: Vec<usize> = scene.nodes[index]
            .meshes
            .iter()
            .copied()
            .filter(|&m| m < scene.meshes.len())
            .collect();
        if list.is_empty() {
            return Ok(());
        }
        let (mesh, skin) = match self.meshes.get(&list) {
            Some(&built) => built,
            None => {
                let built = self.export_mesh(&list)?;
                self.meshes.insert(list, built);
                built
            }
        };
        let target = &mut self.asset.nodes[node];
        target.mesh = Some(mesh);
        target.skin = skin;
        Ok(())
    }

    /// One glTF mesh with a primitive per scene mesh, plus a skin over the
    /// union of their bones.
    fn export_mesh(&mut self, list: &[usize]) -> Result<(Ref<Mesh>, Option<Ref<Skin>>)> {
        let scene = self.scene;
        let first = &scene.meshes[list[0]];
        let mesh = self.create(&first.name, "mesh", Mesh::default())?;
        let mesh_id = self
            .asset
            .meshes
            .meta(mesh)
            .map(|m| m.id.clone())
            .unwrap_or_default();

        let mut joints: Vec<(&str, Mat4)> = Vec::new();
        for &m in list {
            for bone in &scene.meshes[m].bones {
                if !joints.iter().any(|(name, _)| *name == bone.name) {
                    joints.push((bone.name.as_str(), bone.offset_matrix));
                }
            }
        }
        if joints.len() > u16::MAX as usize + 1 {
            return Err(AssetError::invalid(format!(
                "mesh \"{}\" has {} joints",
                first.name,
                joints.len()
            )));
        }
        let joint_names: Vec<&str> = joints.iter().map(|(name, _)| *name).collect();

        let mut primitives = Vec::with_capacity(list.len());
        for &m in list {
            primitives.push(self.export_primitive(&mesh_id, &scene.meshes[m], &joint_names)?);
        }
        let exported = &mut self.asset.meshes[mesh];
        exported.primitives = primitives;
        exported.weights = first.morph_targets.iter().map(|t| t.weight).collect();

        if joints.is_empty() {
            return Ok((mesh, None));
        }
        let mut resolved = Vec::with_capacity(joints.len());
        for (name, _) in &joints {
            let node = self
                .node_named(name)
                .ok_or_else(|| AssetError::unresolved("joint", *name))?;
            resolved.push(node);
        }
        let matrices: Vec<f32> = joints.iter().flat_map(|(_, m)| m.to_cols_array()).collect();
        let inverse_bind_matrices =
            self.float_accessor(&format!("{}_inverse_bind", mesh_id), ElementType::Mat4, &matrices, None)?;
        let skin = self.create(
            &derived(&mesh_id, "skin"),
            "skin",
            Skin {
                inverse_bind_matrices: Some(inverse_bind_matrices),
                joints: resolved,
                ..Skin::default()
            },
        )?;
        Ok((mesh, Some(skin)))
    }

    fn export_primitive(
        &mut self,
        mesh_id: &str,
        data: &out::MeshData,
        joints: &[&str],
    ) -> Result<Primitive> {
        let base = |what: &str| format!("{}_{}", mesh_id, what);
        let vertex = Some(TARGET_ARRAY_BUFFER);
        let flat3 = |v: &[Vec3]| -> Vec<f32> { v.iter().flat_map(|p| p.to_array()).collect() };

        let mut attributes = Attributes {
            position: Some(self.float_accessor(
                &base("positions"),
                ElementType::Vec3,
                &flat3(&data.positions),
                vertex,
            )?),
            ..Attributes::default()
        };
        if !data.normals.is_empty() {
            attributes.normal =
                Some(self.float_accessor(&base("normals"), ElementType::Vec3, &flat3(&data.normals), vertex)?);
        }
        if !data.tangents.is_empty() {
            let flat: Vec<f32> = data.tangents.iter().flat_map(|t| t.to_array()).collect();
            attributes.tangent = Some(self.float_accessor(&base("tangents"), ElementType::Vec4, &flat, vertex)?);
        }
        for (set, coords) in data.texcoords.iter().enumerate() {
            let flat: Vec<f32> = coords.iter().flat_map(|c| c.to_array()).collect();
            let r = self.float_accessor(&base(&format!("texcoords_{}", set)), ElementType::Vec2, &flat, vertex)?;
            attributes.texcoord.push(r);
        }
        for (set, colors) in data.colors.iter().enumerate() {
            let flat: Vec<f32> = colors.iter().flat_map(|c| c.to_array()).collect();
            let r = self.float_accessor(&base(&format!("colors_{}", set)), ElementType::Vec4, &flat, vertex)?;
            attributes.color.push(r);
        }
        if !data.bones.is_empty() && !joints.is_empty() {
            let (indices, weights) = vertex_influences(data, joints);
            let r = self.joint_accessor(&base("joints"), &indices)?;
            attributes.joints.push(r);
            let r = self.float_accessor(&base("weights"), ElementType::Vec4, &weights, vertex)?;
            attributes.weights.push(r);
        }

        let indices = if data.indices.is_empty() {
            None
        } else {
            Some(self.index_accessor(&base("indices"), &data.indices)?)
        };

        let mut targets = Vec::with_capacity(data.morph_targets.len());
        for (i, target) in data.morph_targets.iter().enumerate() {
            let mut exported = MorphTarget::default();
            if !target.positions.is_empty() {
                exported.position = Some(self.float_accessor(
                    &base(&format!("target_{}_positions", i)),
                    ElementType::Vec3,
                    &flat3(&target.positions),
                    vertex,
                )?);
            }
            if !target.normals.is_empty() {
                exported.normal = Some(self.float_accessor(
                    &base(&format!("target_{}_normals", i)),
                    ElementType::Vec3,
                    &flat3(&target.normals),
                    vertex,
                )?);
            }
            targets.push(exported);
        }

        Ok(Primitive {
            mode: match data.kind {
                out::PrimitiveKind::Points => PrimitiveMode::Points,
                out::PrimitiveKind::Lines => PrimitiveMode::Lines,
                out::PrimitiveKind::Triangles => PrimitiveMode::Triangles,
            },
            attributes,
            indices,
            material: data.material.and_then(|m| self.materials.get(m).copied()),
            targets,
        })
    }
}

/// Array position of `r`, which must be built in `dict`.
fn position<T>(dict: &LazyDict<T>, r: Ref<T>) -> Result<usize> {
    dict.position(r)
        .ok_or_else(|| AssetError::invalid(format!("dangling {:?} into \"{}\"", r, dict.key())))
}

fn positions<T>(dict: &LazyDict<T>, refs: &[Ref<T>]) -> Result<Vec<usize>> {
    refs.iter().map(|&r| position(dict, r)).collect()
}

fn name_of<T>(dict: &LazyDict<T>, r: Ref<T>) -> Option<String> {
    dict.meta(r).and_then(|m| m.name.clone())
}

struct DocumentWriter<'a> {
    asset: &'a Asset,
    options: &'a ExportOptions,
}

impl DocumentWriter<'_> {
    fn write(&self) -> Result<(schema::Document, Vec<u8>)> {
        let asset = self.asset;
        let (buffers, buffer_views, body) = self.buffers()?;
        let mut doc = schema::Document {
            asset: self.asset_info(),
            buffers,
            buffer_views,
            extensions_used: asset.extensions_used.names.clone(),
            ..schema::Document::default()
        };

        for (r, accessor) in asset.accessors.iter() {
            doc.accessors.push(schema::Accessor {
                name: name_of(&asset.accessors, r),
                buffer_view: accessor
                    .buffer_view
                    .map(|v| position(&asset.buffer_views, v))
                    .transpose()?,
                byte_offset: accessor.byte_offset,
                component_type: accessor.component_type.to_gl(),
                normalized: accessor.normalized,
                count: accessor.count,
                element_type: accessor.element_type.as_str(),
                min: accessor.min.clone(),
                max: accessor.max.clone(),
            });
        }
        for (r, image) in asset.images.iter() {
            doc.images.push(self.image(r, image)?);
        }
        for (_, sampler) in asset.samplers.iter() {
            doc.samplers.push(schema::Sampler {
                mag_filter: sampler.mag_filter,
                min_filter: sampler.min_filter,
                wrap_s: sampler.wrap_s,
                wrap_t: sampler.wrap_t,
            });
        }
        for (r, texture) in asset.textures.iter() {
            doc.textures.push(schema::Texture {
                name: name_of(&asset.textures, r),
                sampler: texture.sampler.map(|s| position(&asset.samplers, s)).transpose()?,
                source: texture.source.map(|i| position(&asset.images, i)).transpose()?,
            });
        }
        for (r, material) in asset.materials.iter() {
            doc.materials.push(self.material(r, material)?);
        }
        for (r, mesh) in asset.meshes.iter() {
            let mut primitives = Vec::with_capacity(mesh.primitives.len());
            for primitive in &mesh.primitives {
                primitives.push(self.primitive(primitive)?);
            }
            doc.meshes.push(schema::Mesh {
                name: name_of(&asset.meshes, r),
                primitives,
                weights: mesh.weights.clone(),
            });
        }
        for (r, camera) in asset.cameras.iter() {
            doc.cameras.push(camera_of(name_of(&asset.cameras, r), camera.projection));
        }
        for (r, node) in asset.nodes.iter() {
            doc.nodes.push(self.node(r, node)?);
        }
        for (r, skin) in asset.skins.iter() {
            doc.skins.push(schema::Skin {
                name: name_of(&asset.skins, r),
                inverse_bind_matrices: skin
                    .inverse_bind_matrices
                    .map(|a| position(&asset.accessors, a))
                    .transpose()?,
                skeleton: skin.skeleton.map(|n| position(&asset.nodes, n)).transpose()?,
                joints: positions(&asset.nodes, &skin.joints)?,
            });
        }
        for (r, scene) in asset.scenes.iter() {
            doc.scenes.push(schema::Scene {
                name: name_of(&asset.scenes, r),
                nodes: positions(&asset.nodes, &scene.nodes)?,
            });
        }
        doc.scene = asset.scene.map(|s| position(&asset.scenes, s)).transpose()?;
        Ok((doc, body))
    }

    fn asset_info(&self) -> schema::AssetInfo {
        let meta = &self.asset.metadata;
        let generator = if self.options.generator.is_empty() {
            meta.generator.clone()
        } else {
            Some(self.options.generator.clone())
        };
        schema::AssetInfo {
            version: "2.0".to_string(),
            min_version: meta.min_version.clone(),
            generator,
            copyright: meta.copyright.clone(),
        }
    }

    /// Buffers and views, with all buffer data packed into one body in
    /// binary mode.
    fn buffers(&self) -> Result<(Vec<schema::Buffer>, Vec<schema::BufferView>, Vec<u8>)> {
        let asset = self.asset;
        let mut body = Vec::new();
        let mut bases = Vec::with_capacity(asset.buffers.len());
        let mut buffers = Vec::new();

        if self.options.binary {
            for (_, buffer) in asset.buffers.iter() {
                let padding = (4 - body.len() % 4) % 4;
                body.resize(body.len() + padding, 0);
                bases.push(body.len());
                body.extend_from_slice(&buffer.data);
            }
            if !asset.buffers.is_empty() {
                buffers.push(schema::Buffer {
                    name: None,
                    byte_length: body.len(),
                    uri: None,
                });
            }
        } else {
            for (r, buffer) in asset.buffers.iter() {
                bases.push(0);
                let uri = match &buffer.uri {
                    Some(uri) if !self.options.embed_buffers => uri.clone(),
                    _ => encode_data_uri("application/octet-stream", &buffer.data),
                };
                buffers.push(schema::Buffer {
                    name: name_of(&asset.buffers, r),
                    byte_length: buffer.byte_length(),
                    uri: Some(uri),
                });
            }
        }

        let mut views = Vec::with_capacity(asset.buffer_views.len());
        for (r, view) in asset.buffer_views.iter() {
            let buffer = position(&asset.buffers, view.buffer)?;
            views.push(schema::BufferView {
                name: name_of(&asset.buffer_views, r),
                buffer: if self.options.binary { 0 } else { buffer },
                byte_offset: bases[buffer] + view.byte_offset,
                byte_length: view.byte_length,
                byte_stride: view.byte_stride,
                target: view.target,
            });
        }
        Ok((buffers, views, body))
    }

    fn image(&self, r: Ref<Image>, image: &Image) -> Result<schema::Image> {
        let asset = self.asset;
        let mime_type = image
            .mime_type
            .clone()
            .or_else(|| sniff_image_mime(&image.data).map(str::to_string));
        let (uri, buffer_view) = match (image.buffer_view, &image.uri) {
            (Some(view), _) => (None, Some(position(&asset.buffer_views, view)?)),
            (None, Some(uri)) => (Some(uri.clone()), None),
            (None, None) => (
                Some(encode_data_uri(mime_type.as_deref().unwrap_or(""), &image.data)),
                None,
            ),
        };
        Ok(schema::Image {
            name: name_of(&asset.images, r),
            uri,
            mime_type,
            buffer_view,
        })
    }

    fn texture_info(&self, info: Option<TextureInfo>) -> Result<Option<schema::TextureInfo>> {
        info.map(|info| {
            Ok(schema::TextureInfo {
                index: position(&self.asset.textures, info.texture)?,
                tex_coord: info.tex_coord,
                ..schema::TextureInfo::default()
            })
        })
        .transpose()
    }

    fn material(&self, r: Ref<gltf::Material>, m: &gltf::Material) -> Result<schema::Material> {
        let mut extensions = BTreeMap::new();
        if let Some(sg) = &m.pbr_specular_glossiness {
            let mut ext = Map::new();
            ext.insert("diffuseFactor".to_string(), serde_json::to_value(sg.diffuse_factor)?);
            ext.insert("specularFactor".to_string(), serde_json::to_value(sg.specular_factor)?);
            ext.insert("glossinessFactor".to_string(), serde_json::to_value(sg.glossiness_factor)?);
            if let Some(t) = self.texture_info(sg.diffuse_texture)? {
                ext.insert("diffuseTexture".to_string(), serde_json::to_value(t)?);
            }
            if let Some(t) = self.texture_info(sg.specular_glossiness_texture)? {
                ext.insert("specularGlossinessTexture".to_string(), serde_json::to_value(t)?);
            }
            extensions.insert(KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS.to_string(), Value::Object(ext));
        }

        let normal_texture = self.texture_info(m.normal_texture)?.map(|t| schema::TextureInfo {
            scale: Some(m.normal_scale),
            ..t
        });
        let occlusion_texture = self.texture_info(m.occlusion_texture)?.map(|t| schema::TextureInfo {
            strength: Some(m.occlusion_strength),
            ..t
        });
        Ok(schema::Material {
            name: name_of(&self.asset.materials, r),
            pbr_metallic_roughness: schema::PbrMetallicRoughness {
                base_color_factor: m.base_color_factor,
                base_color_texture: self.texture_info(m.base_color_texture)?,
                metallic_factor: m.metallic_factor,
                roughness_factor: m.roughness_factor,
                metallic_roughness_texture: self.texture_info(m.metallic_roughness_texture)?,
            },
            normal_texture,
            occlusion_texture,
            emissive_texture: self.texture_info(m.emissive_texture)?,
            emissive_factor: m.emissive_factor,
            alpha_mode: alpha_mode_name(m.alpha_mode),
            alpha_cutoff: (m.alpha_mode == out::AlphaMode::Mask).then_some(m.alpha_cutoff),
            double_sided: m.double_sided,
            extensions,
        })
    }

    fn primitive(&self, primitive: &Primitive) -> Result<schema::Primitive> {
        let asset = self.asset;
        let mut targets = Vec::with_capacity(primitive.targets.len());
        for target in &primitive.targets {
            let mut map = BTreeMap::new();
            for (name, r) in [
                ("POSITION", target.position),
                ("NORMAL", target.normal),
                ("TANGENT", target.tangent),
            ] {
                if let Some(r) = r {
                    map.insert(name.to_string(), position(&asset.accessors, r)?);
                }
            }
            targets.push(map);
        }
        Ok(schema::Primitive {
            attributes: self.attributes(&primitive.attributes)?,
            indices: primitive
                .indices
                .map(|a| position(&asset.accessors, a))
                .transpose()?,
            material: primitive
                .material
                .map(|m| position(&asset.materials, m))
                .transpose()?,
            mode: primitive.mode.to_gl(),
            targets,
        })
    }

    fn attributes(&self, attrs: &Attributes) -> Result<BTreeMap<String, usize>> {
        let accessors = &self.asset.accessors;
        let mut map = BTreeMap::new();
        for (name, r) in [
            ("POSITION", attrs.position),
            ("NORMAL", attrs.normal),
            ("TANGENT", attrs.tangent),
        ] {
            if let Some(r) = r {
                map.insert(name.to_string(), position(accessors, r)?);
            }
        }
        for (base, list) in [
            ("TEXCOORD", &attrs.texcoord),
            ("COLOR", &attrs.color),
            ("JOINTS", &attrs.joints),
            ("WEIGHTS", &attrs.weights),
        ] {
            for (set, r) in list.iter().enumerate() {
                if let Some(r) = r.resolved() {
                    map.insert(format!("{}_{}", base, set), position(accessors, r)?);
                }
            }
        }
        Ok(map)
    }

    fn node(&self, r: Ref<Node>, node: &Node) -> Result<schema::Node> {
        let asset = self.asset;
        let mut written = schema::Node {
            name: name_of(&asset.nodes, r),
            children: positions(&asset.nodes, &node.children)?,
            mesh: node.mesh.map(|m| position(&asset.meshes, m)).transpose()?,
            camera: node.camera.map(|c| position(&asset.cameras, c)).transpose()?,
            skin: node.skin.map(|s| position(&asset.skins, s)).transpose()?,
            weights: node.weights.clone(),
            ..schema::Node::default()
        };
        match node.matrix {
            Some(m) => written.matrix = Some(m.to_cols_array()),
            None => {
                written.translation = (node.translation != Vec3::ZERO).then(|| node.translation.to_array());
                written.rotation = (node.rotation != Quat::IDENTITY).then(|| node.rotation.to_array());
                written.scale = (node.scale != Vec3::ONE).then(|| node.scale.to_array());
            }
        }
        Ok(written)
    }
}

fn camera_of(name: Option<String>, projection: out::Projection) -> schema::Camera {
    match projection {
        out::Projection::Perspective {
            yfov,
            aspect_ratio,
            znear,
            zfar,
        } => schema::Camera {
            name,
            camera_type: "perspective",
            perspective: Some(schema::Perspective {
                aspect_ratio,
                yfov,
                znear,
                zfar,
            }),
            orthographic: None,
        },
        out::Projection::Orthographic {
            xmag,
            ymag,
            znear,
            zfar,
        } => schema::Camera {
            name,
            camera_type: "orthographic",
            perspective: None,
            orthographic: Some(schema::Orthographic {
                xmag,
                ymag,
                znear,
                zfar,
            }),
        },
    }
}
