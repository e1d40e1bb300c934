//! Conversion of a resolved [`Asset`] into a [`Scene`](out::Scene).

use crate::asset::Asset;
use crate::entities::{
    self as gltf, Image, Mesh, Node, Primitive, PrimitiveMode, Skin, TextureInfo,
};
use assetgraph_core::{data_uri, AssetError, ImportOptions, Ref, ResourceLoader, Result};
use assetgraph_scene as out;
use glam::{Mat4, Vec3, Vec4};
use log::warn;
use std::collections::HashMap;
use std::path::Path;

/// Load a `.gltf` or `.glb` file into a scene.
pub fn import_file(path: impl AsRef<Path>, options: ImportOptions) -> Result<out::Scene> {
    Asset::load(path, options)?.to_scene()
}

/// Read a glTF JSON or GLB document from memory into a scene.
pub fn import_slice(
    data: &[u8],
    loader: Box<dyn ResourceLoader>,
    options: ImportOptions,
) -> Result<out::Scene> {
    Asset::from_slice(data, loader, options)?.to_scene()
}

impl Asset {
    /// Build a scene from the resolved default scene. An asset without one
    /// yields a scene with metadata only.
    pub fn to_scene(&self) -> Result<out::Scene> {
        SceneBuilder::new(self).build()
    }
}

struct SceneBuilder<'a> {
    asset: &'a Asset,
    scene: out::Scene,
    textures: HashMap<Ref<gltf::Texture>, usize>,
    materials: HashMap<Ref<gltf::Material>, usize>,
    /// Unskinned mesh instances, shared by every node using the mesh.
    meshes: HashMap<Ref<Mesh>, Vec<usize>>,
    cameras: HashMap<Ref<gltf::Camera>, usize>,
}

impl<'a> SceneBuilder<'a> {
    fn new(asset: &'a Asset) -> Self {
        Self {
            asset,
            scene: out::Scene::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            meshes: HashMap::new(),
            cameras: HashMap::new(),
        }
    }

    fn build(mut self) -> Result<out::Scene> {
        self.convert_metadata();
        for (r, texture) in self.asset.textures.iter() {
            if let Some(converted) = self.convert_texture(r, texture) {
                let index = self.scene.add_texture(converted);
                self.textures.insert(r, index);
            }
        }
        for (r, material) in self.asset.materials.iter() {
            let converted = self.convert_material(r, material);
            let index = self.scene.add_material(converted);
            self.materials.insert(r, index);
        }

        if let Some(scene) = self.asset.scene {
            for &root in &self.asset.scenes[scene].nodes {
                self.add_node(root, None)?;
            }
        }
        Ok(self.scene)
    }

    fn convert_metadata(&mut self) {
        let meta = &self.asset.metadata;
        let target = &mut self.scene.metadata;
        target.source_format = Some("glTF".to_string());
        target.format_version = Some(meta.version.clone());
        target.generator = meta.generator.clone();
        target.copyright = meta.copyright.clone();
        if !self.asset.extensions_used.names.is_empty() {
            let used = self
                .asset
                .extensions_used
                .names
                .iter()
                .map(|n| out::MetadataValue::from(n.as_str()))
                .collect();
            target
                .custom
                .insert("extensionsUsed".to_string(), out::MetadataValue::Array(used));
        }
    }

    fn convert_image(&self, image: &Image) -> Option<out::ImageSource> {
        if !image.data.is_empty() {
            let mime_type = image
                .mime_type
                .clone()
                .or_else(|| data_uri::sniff_image_mime(&image.data).map(str::to_string))
                .unwrap_or_else(|| "application/octet-stream".to_string());
            return Some(out::ImageSource::Embedded {
                mime_type,
                data: image.data.clone(),
            });
        }
        image
            .uri
            .clone()
            .map(|uri| out::ImageSource::External { uri })
    }

    fn convert_texture(&self, r: Ref<gltf::Texture>, texture: &gltf::Texture) -> Option<out::Texture> {
        let image = &self.asset.images[texture.source?];
        let source = self.convert_image(image)?;
        let sampler = texture
            .sampler
            .map(|s| convert_sampler(&self.asset.samplers[s]))
            .unwrap_or_default();
        Some(out::Texture {
            name: self.asset.textures.display_name(r).unwrap_or_default().to_string(),
            source,
            sampler,
        })
    }

    fn texture_ref(&self, info: Option<TextureInfo>) -> Option<out::TextureRef> {
        let info = info?;
        self.textures.get(&info.texture).map(|&texture| out::TextureRef {
            texture,
            texcoord: info.tex_coord,
        })
    }

    fn convert_material(&self, r: Ref<gltf::Material>, m: &gltf::Material) -> out::Material {
        let specular_glossiness = m.pbr_specular_glossiness.as_ref().map(|sg| out::SpecularGlossiness {
            diffuse: Vec4::from_array(sg.diffuse_factor),
            diffuse_texture: self.texture_ref(sg.diffuse_texture),
            specular: Vec3::from_array(sg.specular_factor),
            glossiness: sg.glossiness_factor,
            specular_glossiness_texture: self.texture_ref(sg.specular_glossiness_texture),
        });
        out::Material {
            name: self.asset.materials.display_name(r).unwrap_or_default().to_string(),
            base_color: Vec4::from_array(m.base_color_factor),
            base_color_texture: self.texture_ref(m.base_color_texture),
            metallic: m.metallic_factor,
            roughness: m.roughness_factor,
            metallic_roughness_texture: self.texture_ref(m.metallic_roughness_texture),
            normal_texture: self.texture_ref(m.normal_texture),
            normal_scale: m.normal_scale,
            occlusion_texture: self.texture_ref(m.occlusion_texture),
            occlusion_strength: m.occlusion_strength,
            emissive: Vec3::from_array(m.emissive_factor),
            emissive_texture: self.texture_ref(m.emissive_texture),
            alpha_mode: m.alpha_mode,
            alpha_cutoff: m.alpha_cutoff,
            double_sided: m.double_sided,
            specular_glossiness,
        }
    }

    /// Convert one primitive. Strips, loops and fans are skipped.
    fn convert_primitive(
        &self,
        name: &str,
        primitive: &Primitive,
        morph_weights: &[f32],
    ) -> Result<Option<out::MeshData>> {
        let asset = self.asset;
        let kind = match primitive.mode {
            PrimitiveMode::Points => out::PrimitiveKind::Points,
            PrimitiveMode::Lines => out::PrimitiveKind::Lines,
            PrimitiveMode::Triangles => out::PrimitiveKind::Triangles,
            other => {
                warn!("mesh \"{}\": skipping {:?} primitive", name, other);
                return Ok(None);
            }
        };

        let attrs = &primitive.attributes;
        let position = attrs
            .position
            .ok_or_else(|| AssetError::invalid(format!("mesh \"{}\": primitive has no POSITION", name)))?;

        let mut mesh = out::MeshData::new(name);
        mesh.kind = kind;
        mesh.positions = asset.read_vec3(position)?;
        if let Some(normal) = attrs.normal {
            mesh.normals = asset.read_vec3(normal)?;
        }
        if let Some(tangent) = attrs.tangent {
            mesh.tangents = asset.read_vec4(tangent)?;
        }
        for set in attrs.texcoord.iter().filter_map(|r| r.resolved()) {
            mesh.texcoords.push(asset.read_vec2(set)?);
        }
        for set in attrs.color.iter().filter_map(|r| r.resolved()) {
            mesh.colors.push(asset.read_colors(set)?);
        }
        mesh.indices = match primitive.indices {
            Some(indices) => asset.read_indices(indices)?,
            None => (0..mesh.positions.len() as u32).collect(),
        };
        mesh.material = primitive.material.and_then(|m| self.materials.get(&m).copied());

        for (i, target) in primitive.targets.iter().enumerate() {
            let mut morph = out::MorphTarget {
                name: format!("{}_target_{}", name, i),
                weight: morph_weights.get(i).copied().unwrap_or(0.0),
                ..Default::default()
            };
            if let Some(p) = target.position {
                morph.positions = asset.read_vec3(p)?;
            }
            if let Some(n) = target.normal {
                morph.normals = asset.read_vec3(n)?;
            }
            mesh.morph_targets.push(morph);
        }
        Ok(Some(mesh))
    }

    fn convert_mesh(&self, r: Ref<Mesh>, skin: Option<Ref<Skin>>) -> Result<Vec<out::MeshData>> {
        let mesh = &self.asset.meshes[r];
        let name = self.asset.meshes.display_name(r).unwrap_or_default();
        let mut converted = Vec::new();
        for primitive in &mesh.primitives {
            let Some(mut data) = self.convert_primitive(name, primitive, &mesh.weights)? else {
                continue;
            };
            if let Some(skin) = skin {
                data.bones = self.convert_bones(&self.asset.skins[skin], primitive)?;
            }
            converted.push(data);
        }
        Ok(converted)
    }

    /// Bones of `skin`, with the primitive's first joints/weights set as
    /// per-vertex influences.
    fn convert_bones(&self, skin: &Skin, primitive: &Primitive) -> Result<Vec<out::Bone>> {
        let asset = self.asset;
        let inverse = match skin.inverse_bind_matrices {
            Some(r) => asset.read_mat4(r)?,
            None => Vec::new(),
        };
        let mut bones: Vec<out::Bone> = skin
            .joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                out::Bone::new(
                    asset.node_name(joint),
                    inverse.get(i).copied().unwrap_or(Mat4::IDENTITY),
                )
            })
            .collect();

        let joints = primitive.attributes.joints.first().and_then(|r| r.resolved());
        let weights = primitive.attributes.weights.first().and_then(|r| r.resolved());
        if let (Some(joints), Some(weights)) = (joints, weights) {
            let joints = asset.read_uints(joints)?;
            let weights = asset.read_floats(weights)?;
            for (vertex, (j, w)) in joints.chunks_exact(4).zip(weights.chunks_exact(4)).enumerate() {
                for (&bone, &weight) in j.iter().zip(w) {
                    if weight <= 0.0 {
                        continue;
                    }
                    match bones.get_mut(bone as usize) {
                        Some(b) => b.weights.push(out::VertexWeight {
                            vertex: vertex as u32,
                            weight,
                        }),
                        None => {
                            return Err(AssetError::invalid(format!(
                                "vertex {} uses joint {} of {}",
                                vertex,
                                bone,
                                bones.len()
                            )))
                        }
                    }
                }
            }
        }
        Ok(bones)
    }

    /// Scene mesh indices for `mesh` as used by a node with `skin`.
    fn mesh_instances(&mut self, mesh: Ref<Mesh>, skin: Option<Ref<Skin>>) -> Result<Vec<usize>> {
        if skin.is_none() {
            if let Some(indices) = self.meshes.get(&mesh) {
                return Ok(indices.clone());
            }
        }
        let indices: Vec<usize> = self
            .convert_mesh(mesh, skin)?
            .into_iter()
            .map(|data| self.scene.add_mesh(data))
            .collect();
        if skin.is_none() {
            self.meshes.insert(mesh, indices.clone());
        }
        Ok(indices)
    }

    fn camera_instance(&mut self, camera: Ref<gltf::Camera>, name: &str) -> usize {
        if let Some(&index) = self.cameras.get(&camera) {
            return index;
        }
        let index = self.scene.add_camera(out::Camera {
            name: name.to_string(),
            projection: self.asset.cameras[camera].projection,
        });
        self.cameras.insert(camera, index);
        index
    }

    fn add_node(&mut self, r: Ref<Node>, parent: Option<usize>) -> Result<()> {
        let asset = self.asset;
        let node = &asset.nodes[r];
        let name = asset.node_name(r);

        let mut converted = out::SceneNode::new(name.clone()).transformed(node.local_transform());
        if let Some(mesh) = node.mesh {
            converted.meshes = self.mesh_instances(mesh, node.skin)?;
        }
        if let Some(camera) = node.camera {
            converted.camera = Some(self.camera_instance(camera, &name));
        }

        let index = match parent {
            Some(parent) => self.scene.add_child(parent, converted),
            None => self.scene.add_root(converted),
        };
        for &child in &node.children {
            self.add_node(child, Some(index))?;
        }
        Ok(())
    }
}

fn convert_filter(value: Option<u32>) -> out::Filter {
    match value {
        Some(gltf::FILTER_NEAREST)
        | Some(gltf::FILTER_NEAREST_MIPMAP_NEAREST)
        | Some(gltf::FILTER_NEAREST_MIPMAP_LINEAR) => out::Filter::Nearest,
        _ => out::Filter::Linear,
    }
}

fn convert_wrap(value: u32) -> out::Wrap {
    match value {
        gltf::WRAP_CLAMP_TO_EDGE => out::Wrap::ClampToEdge,
        gltf::WRAP_MIRRORED_REPEAT => out::Wrap::MirroredRepeat,
        _ => out::Wrap::Repeat,
    }
}

fn convert_sampler(sampler: &gltf::Sampler) -> out::Sampler {
    out::Sampler {
        mag_filter: convert_filter(sampler.mag_filter),
        min_filter: convert_filter(sampler.min_filter),
        wrap_u: convert_wrap(sampler.wrap_s),
        wrap_v: convert_wrap(sampler.wrap_t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgraph_core::data_uri::encode_data_uri;
    use serde_json::{json, Value};

    fn bytes_of(floats: &[f32], shorts: &[u16]) -> Vec<u8> {
        let mut out: Vec<u8> = floats.iter().flat_map(|v| v.to_le_bytes()).collect();
        out.extend(shorts.iter().flat_map(|v| v.to_le_bytes()));
        out
    }

    /// One triangle: 3 positions (36 bytes) then 3 u16 indices (6 bytes).
    fn triangle_doc(extra_primitive: Value) -> Value {
        let data = bytes_of(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2]);
        let mut primitives = vec![json!({"attributes": {"POSITION": 0}, "indices": 1, "material": 0})];
        if !extra_primitive.is_null() {
            primitives.push(extra_primitive);
        }
        json!({
            "asset": {"version": "2.0", "generator": "test"},
            "scene": 0,
            "scenes": [{"nodes": [0]}],
            "nodes": [
                {"name": "Root", "children": [1, 2], "translation": [0, 1, 0]},
                {"name": "A", "mesh": 0},
                {"name": "B", "mesh": 0, "camera": 0}
            ],
            "meshes": [{"name": "Tri", "primitives": primitives}],
            "materials": [{"name": "Red", "pbrMetallicRoughness": {"baseColorFactor": [1, 0, 0, 1]}}],
            "cameras": [{"type": "perspective", "perspective": {"yfov": 1.0, "znear": 0.1}}],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"},
                {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
            ],
            "bufferViews": [
                {"buffer": 0, "byteLength": 36},
                {"buffer": 0, "byteOffset": 36, "byteLength": 6}
            ],
            "buffers": [{"byteLength": data.len(), "uri": encode_data_uri("application/octet-stream", &data)}]
        })
    }

    fn import(doc: &Value) -> out::Scene {
        Asset::from_json(doc, ImportOptions::default())
            .unwrap()
            .to_scene()
            .unwrap()
    }

    #[test]
    fn test_import_hierarchy_and_shared_mesh() {
        let scene = import(&triangle_doc(Value::Null));

        assert_eq!(scene.roots.len(), 1);
        assert_eq!(scene.nodes.len(), 3);
        let root = &scene.nodes[scene.roots[0]];
        assert_eq!(root.name, "Root");
        assert_eq!(root.children.len(), 2);

        let a = &scene.nodes[scene.find_node("A").unwrap()];
        let b = &scene.nodes[scene.find_node("B").unwrap()];
        assert_eq!(a.parent, Some(scene.roots[0]));
        assert_eq!(a.meshes, b.meshes);
        assert_eq!(scene.meshes.len(), 1);

        let mesh = &scene.meshes[a.meshes[0]];
        assert_eq!(mesh.name, "Tri");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.positions[1], Vec3::X);
        assert_eq!(scene.materials[mesh.material.unwrap()].name, "Red");

        assert_eq!(b.camera, Some(0));
        assert_eq!(scene.cameras[0].name, "B");
        assert_eq!(scene.metadata.source_format.as_deref(), Some("glTF"));
        assert_eq!(scene.metadata.generator.as_deref(), Some("test"));

        let bounds = scene.compute_bounds();
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_strip_primitives_are_skipped() {
        let scene = import(&triangle_doc(json!({"attributes": {"POSITION": 0}, "mode": 5})));
        assert_eq!(scene.meshes.len(), 1);
    }

    #[test]
    fn test_non_indexed_primitive_gets_sequential_indices() {
        let mut doc = triangle_doc(Value::Null);
        doc["meshes"][0]["primitives"][0]
            .as_object_mut()
            .unwrap()
            .remove("indices");
        let scene = import(&doc);
        assert_eq!(scene.meshes[0].indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_primitive_without_position_is_fatal() {
        let doc = triangle_doc(json!({"attributes": {}}));
        let asset = Asset::from_json(&doc, ImportOptions::default()).unwrap();
        assert!(asset.to_scene().is_err());
    }

    #[test]
    fn test_skinned_mesh_gets_bones() {
        let data = {
            let mut d = bytes_of(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[]);
            // JOINTS_0 as u8 VEC4, WEIGHTS_0 as float VEC4.
            d.extend_from_slice(&[0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0]);
            d.extend(
                [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0]
                    .iter()
                    .flat_map(|v| v.to_le_bytes()),
            );
            d
        };
        let doc = json!({
            "asset": {"version": "2.0"},
            "scenes": [{"nodes": [0, 3]}],
            "nodes": [
                {"name": "Armature", "children": [1]},
                {"name": "Hip", "children": [2]},
                {"name": "Spine"},
                {"name": "Body", "mesh": 0, "skin": 0}
            ],
            "skins": [{"joints": [1, 2]}],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "JOINTS_0": 1, "WEIGHTS_0": 2}}]}],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"},
                {"bufferView": 0, "byteOffset": 36, "componentType": 5121, "count": 3, "type": "VEC4"},
                {"bufferView": 0, "byteOffset": 48, "componentType": 5126, "count": 3, "type": "VEC4"}
            ],
            "bufferViews": [{"buffer": 0, "byteLength": data.len()}],
            "buffers": [{"byteLength": data.len(), "uri": encode_data_uri("", &data)}]
        });
        let scene = import(&doc);
        let body = &scene.nodes[scene.find_node("Body").unwrap()];
        let mesh = &scene.meshes[body.meshes[0]];

        assert_eq!(mesh.bones.len(), 2);
        assert_eq!(mesh.bones[0].name, "Hip");
        assert_eq!(mesh.bones[0].offset_matrix, Mat4::IDENTITY);
        let hip: Vec<(u32, f32)> = mesh.bones[0].weights.iter().map(|w| (w.vertex, w.weight)).collect();
        let spine: Vec<(u32, f32)> = mesh.bones[1].weights.iter().map(|w| (w.vertex, w.weight)).collect();
        assert_eq!(hip, vec![(0, 1.0), (2, 0.5)]);
        assert_eq!(spine, vec![(1, 1.0), (2, 0.5)]);
    }
}
