//! Conversion of a resolved [`ColladaDocument`] into a [`Scene`](out::Scene).
//!
//! Node transforms are kept as local transforms and the document unit and up
//! axis are reported in the scene metadata; nothing is rescaled or rotated.

use crate::document::ColladaDocument;
use crate::entities::{
    self as dae, AnimationChannel, ColorOrTexture, Controller, ControllerKind, Geometry, ImageData,
    InstanceTarget, Interpolation, MaterialBinding, MorphMethod, PrimitiveType, Shading, Skin,
    SubMesh,
};
use crate::hierarchy::PlacedMesh;
use crate::transform::compose;
use assetgraph_core::{data_uri, AssetError, ImportOptions, Ref, Result};
use assetgraph_scene as out;
use glam::{Vec3, Vec4};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Load a `.dae` file into a scene.
pub fn import_file(path: impl AsRef<Path>, options: ImportOptions) -> Result<out::Scene> {
    ColladaDocument::load(path, options)?.to_scene()
}

/// Read a COLLADA document from memory into a scene.
pub fn import_slice(data: &[u8], options: ImportOptions) -> Result<out::Scene> {
    ColladaDocument::from_slice(data, options)?.to_scene()
}

impl ColladaDocument {
    /// Build a scene from the resolved visual scene. A document without one
    /// yields a scene with metadata only.
    pub fn to_scene(&self) -> Result<out::Scene> {
        SceneBuilder::new(self).build()
    }
}

/// Contributor fields with a dedicated metadata slot.
const KNOWN_FIELDS: [&str; 3] = ["authoringTool", "author", "copyright"];

struct SceneBuilder<'a> {
    doc: &'a ColladaDocument,
    scene: out::Scene,
    textures: HashMap<Ref<dae::Image>, usize>,
    /// Materials depend on the geometry's texture coordinate channels.
    materials: HashMap<(Ref<dae::Material>, Ref<Geometry>), usize>,
    /// Unskinned meshes by geometry and bound materials.
    meshes: HashMap<(Ref<Geometry>, Vec<Option<usize>>), Vec<usize>>,
    cameras: HashMap<Ref<dae::Camera>, usize>,
    lights: HashMap<Ref<dae::Light>, usize>,
}

impl<'a> SceneBuilder<'a> {
    fn new(doc: &'a ColladaDocument) -> Self {
        Self {
            doc,
            scene: out::Scene::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            meshes: HashMap::new(),
            cameras: HashMap::new(),
            lights: HashMap::new(),
        }
    }

    fn build(mut self) -> Result<out::Scene> {
        self.convert_metadata();

        let doc = self.doc;
        // Placed nodes are in pre-order, so a parent is always converted first.
        let mut converted = Vec::with_capacity(doc.hierarchy.nodes.len());
        for placed in &doc.hierarchy.nodes {
            let mut node = out::SceneNode::new(placed.name.clone()).transformed(placed.transform);
            for mesh in &placed.meshes {
                node.meshes.extend(self.mesh_instances(mesh)?);
            }
            if let Some((&camera, rest)) = placed.cameras.split_first() {
                if !rest.is_empty() {
                    warn!("node \"{}\": keeping the first of {} cameras", placed.name, placed.cameras.len());
                }
                node.camera = Some(self.camera_instance(camera));
            }
            if let Some((&light, rest)) = placed.lights.split_first() {
                if !rest.is_empty() {
                    warn!("node \"{}\": keeping the first of {} lights", placed.name, placed.lights.len());
                }
                node.light = Some(self.light_instance(light));
            }

            let index = match placed.parent.and_then(|p| converted.get(p).copied()) {
                Some(parent) => self.scene.add_child(parent, node),
                None => self.scene.add_root(node),
            };
            converted.push(index);
        }
        self.convert_animations(&converted);
        Ok(self.scene)
    }

    /// One scene animation per clip. Without clips each animation becomes
    /// one, except that single-channel animations with distinct targets are
    /// merged into one.
    fn convert_animations(&mut self, converted: &[usize]) {
        let doc = self.doc;
        if !doc.animation_clips.is_empty() {
            for (r, clip) in doc.animation_clips.iter() {
                let channels: Vec<&AnimationChannel> = clip
                    .animations
                    .iter()
                    .filter_map(|&a| doc.animations.try_get(a))
                    .flat_map(|a| &a.channels)
                    .collect();
                let name = doc.animation_clips.display_name(r).unwrap_or_default();
                self.push_animation(name, &channels, (clip.start, clip.end), converted);
            }
            return;
        }

        let mut targets = HashSet::new();
        let merge = doc.animations.len() > 1
            && doc
                .animations
                .iter()
                .all(|(_, a)| a.channels.len() == 1 && targets.insert(&a.channels[0].target));
        if merge {
            let channels: Vec<&AnimationChannel> =
                doc.animations.iter().flat_map(|(_, a)| &a.channels).collect();
            debug!("merging {} single-channel animations", channels.len());
            self.push_animation("animation_0", &channels, (0.0, None), converted);
            return;
        }
        for (r, animation) in doc.animations.iter() {
            let channels: Vec<&AnimationChannel> = animation.channels.iter().collect();
            let name = doc.animations.display_name(r).unwrap_or_default();
            self.push_animation(name, &channels, (0.0, None), converted);
        }
    }

    /// Sample every bound channel at the union of its node's key times and
    /// store the node's composed local transform as translation, rotation
    /// and scale keys.
    fn push_animation(
        &mut self,
        name: &str,
        channels: &[&AnimationChannel],
        (start, end): (f32, Option<f32>),
        converted: &[usize],
    ) {
        let mut by_node: IndexMap<usize, Vec<&AnimationChannel>> = IndexMap::new();
        for &channel in channels {
            if let Some(node) = channel.node {
                by_node.entry(node).or_default().push(channel);
            }
            let curved = channel
                .interpolation
                .iter()
                .any(|i| !matches!(i, Interpolation::Linear | Interpolation::Step));
            if curved {
                debug!("animation \"{}\": sampling curved keys linearly", name);
            }
        }

        let mut animation = out::Animation::new(name);
        for (placed, channels) in by_node {
            let Some(&node) = converted.get(placed) else {
                continue;
            };
            let mut times: Vec<f32> = channels
                .iter()
                .flat_map(|c| c.times.iter().copied())
                .filter(|&t| t >= start && end.map_or(true, |end| t <= end))
                .collect();
            times.sort_by(f32::total_cmp);
            times.dedup();

            let steps = &self.doc.hierarchy.nodes[placed].transforms;
            let mut keys = out::NodeAnimation::new(node);
            for time in times {
                let mut posed = steps.clone();
                for channel in &channels {
                    let Some(step) = posed
                        .iter_mut()
                        .find(|s| s.sid.as_deref() == Some(channel.target.sid.as_str()))
                    else {
                        continue;
                    };
                    *step = step.with_values(channel.target.first_value(), &channel.sample(time));
                }
                let (scale, rotation, translation) = compose(&posed).to_scale_rotation_translation();
                let t = time - start;
                keys.translations.push(out::Key::new(t, translation));
                keys.rotations.push(out::Key::new(t, rotation));
                keys.scales.push(out::Key::new(t, scale));
            }
            animation.push(keys);
        }

        if animation.channels.is_empty() {
            warn!("animation \"{}\" animates no node in the scene", name);
            return;
        }
        self.scene.add_animation(animation);
    }

    fn convert_metadata(&mut self) {
        let info = &self.doc.info;
        let target = &mut self.scene.metadata;
        target.source_format = Some("COLLADA".to_string());
        target.format_version = info.version_string.clone();
        target.generator = info.fields.get("authoringTool").cloned();
        target.author = info.fields.get("author").cloned();
        target.copyright = info.fields.get("copyright").cloned();
        target.created = info.created.clone();
        target.modified = info.modified.clone();
        target.unit_scale = info.unit_meter;
        target.up_axis = info.up_axis;
        if let Some(unit) = &info.unit_name {
            target
                .custom
                .insert("unitName".to_string(), out::MetadataValue::from(unit.as_str()));
        }
        for (key, value) in &info.fields {
            if !KNOWN_FIELDS.contains(&key.as_str()) {
                target
                    .custom
                    .insert(key.clone(), out::MetadataValue::from(value.as_str()));
            }
        }
    }

    fn texture_index(&mut self, image: Ref<dae::Image>) -> Option<usize> {
        if let Some(&index) = self.textures.get(&image) {
            return Some(index);
        }
        let doc = self.doc;
        let source = match &doc.images.try_get(image)?.data {
            ImageData::File(path) => out::ImageSource::External { uri: path.clone() },
            ImageData::Embedded { mime_type, data } => out::ImageSource::Embedded {
                mime_type: mime_type
                    .clone()
                    .or_else(|| data_uri::sniff_image_mime(data).map(str::to_string))
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: data.clone(),
            },
        };
        let index = self.scene.add_texture(out::Texture {
            name: doc.images.display_name(image).unwrap_or_default().to_string(),
            source,
            sampler: out::Sampler::default(),
        });
        self.textures.insert(image, index);
        Some(index)
    }

    /// A texture slot, with its coordinate name mapped through the
    /// instance's `bind_vertex_input` to the geometry's channel.
    fn texture_ref(
        &mut self,
        slot: Option<&ColorOrTexture>,
        binding: &MaterialBinding,
        geometry: &Geometry,
    ) -> Option<out::TextureRef> {
        let Some(ColorOrTexture::Texture { image, texcoord }) = slot else {
            return None;
        };
        let texture = self.texture_index(*image)?;
        let set = binding.texcoord_sets.get(texcoord).copied().unwrap_or(0);
        let channel = geometry.texcoord_channel(set).unwrap_or(0);
        Some(out::TextureRef {
            texture,
            texcoord: channel as u32,
        })
    }

    fn material_index(&mut self, binding: &MaterialBinding, geometry_ref: Ref<Geometry>) -> Option<usize> {
        let key = (binding.material, geometry_ref);
        if let Some(&index) = self.materials.get(&key) {
            return Some(index);
        }
        let doc = self.doc;
        let geometry = doc.geometries.try_get(geometry_ref)?;
        let material = doc.materials.try_get(binding.material)?;
        let effect = doc.effects.try_get(material.effect)?;

        let opacity = effect.opacity();
        let diffuse = effect.diffuse.as_ref().and_then(ColorOrTexture::color).unwrap_or(Vec4::ONE);
        let base_color = diffuse.truncate().extend(diffuse.w * opacity);
        let specular_model = matches!(effect.shading, Shading::Phong | Shading::Blinn);
        let roughness = match effect.shininess {
            Some(s) if specular_model => (2.0 / (s.max(0.0) + 2.0)).sqrt(),
            _ => 1.0,
        };

        let base_color_texture = self.texture_ref(effect.diffuse.as_ref(), binding, geometry);
        let specular_glossiness = if specular_model {
            Some(out::SpecularGlossiness {
                diffuse: base_color,
                diffuse_texture: base_color_texture,
                specular: effect
                    .specular
                    .as_ref()
                    .and_then(ColorOrTexture::color)
                    .map_or(Vec3::ZERO, Vec4::truncate),
                glossiness: 1.0 - roughness,
                specular_glossiness_texture: self.texture_ref(effect.specular.as_ref(), binding, geometry),
            })
        } else {
            None
        };

        let converted = out::Material {
            name: doc.materials.display_name(binding.material).unwrap_or_default().to_string(),
            base_color,
            base_color_texture,
            metallic: 0.0,
            roughness,
            normal_texture: self.texture_ref(effect.bump.as_ref(), binding, geometry),
            emissive: effect
                .emission
                .as_ref()
                .and_then(ColorOrTexture::color)
                .map_or(Vec3::ZERO, Vec4::truncate),
            emissive_texture: self.texture_ref(effect.emission.as_ref(), binding, geometry),
            alpha_mode: if opacity < 1.0 {
                out::AlphaMode::Blend
            } else {
                out::AlphaMode::Opaque
            },
            double_sided: effect.double_sided,
            specular_glossiness,
            ..out::Material::default()
        };
        let index = self.scene.add_material(converted);
        self.materials.insert(key, index);
        Some(index)
    }

    /// Scene mesh indices for one mesh instance: one mesh per submesh.
    fn mesh_instances(&mut self, placed: &PlacedMesh) -> Result<Vec<usize>> {
        let doc = self.doc;
        let (geometry_ref, controller) = match placed.instance.target {
            InstanceTarget::Geometry(g) => (g, None),
            InstanceTarget::Controller(c) => {
                let controller = &doc.controllers[c];
                let Some(g) = controller.geometry else {
                    warn!("controller \"{}\" has no geometry", doc.id_of(c).unwrap_or_default());
                    return Ok(Vec::new());
                };
                (g, Some(controller))
            }
        };
        let geometry = &doc.geometries[geometry_ref];

        let materials: Vec<Option<usize>> = geometry
            .submeshes
            .iter()
            .map(|sub| {
                let symbol = sub.material.as_deref()?;
                match placed.instance.materials.get(symbol) {
                    Some(binding) => self.material_index(binding, geometry_ref),
                    None => {
                        warn!("no material bound to symbol \"{}\"", symbol);
                        None
                    }
                }
            })
            .collect();

        let key = (geometry_ref, materials);
        if controller.is_none() {
            if let Some(indices) = self.meshes.get(&key) {
                return Ok(indices.clone());
            }
        }

        let name = doc.geometries.display_name(geometry_ref).unwrap_or_default();
        let mut indices = Vec::with_capacity(geometry.submeshes.len());
        for (sub, &material) in geometry.submeshes.iter().zip(&key.1) {
            let mut mesh = convert_submesh(name, geometry, sub);
            mesh.material = material;
            if let Some(controller) = controller {
                self.apply_controller(&mut mesh, controller, placed, geometry, sub)?;
            }
            indices.push(self.scene.add_mesh(mesh));
        }
        if controller.is_none() {
            self.meshes.insert(key, indices.clone());
        }
        Ok(indices)
    }

    fn apply_controller(
        &self,
        mesh: &mut out::MeshData,
        controller: &Controller,
        placed: &PlacedMesh,
        geometry: &Geometry,
        sub: &SubMesh,
    ) -> Result<()> {
        match &controller.kind {
            ControllerKind::Skin(skin) => {
                mesh.bones = self.convert_bones(skin, placed, geometry, sub)?;
            }
            ControllerKind::Morph(morph) => {
                let doc = self.doc;
                for (i, target) in morph.targets.iter().enumerate() {
                    let Some(target) = *target else {
                        continue;
                    };
                    let Some(target_geometry) = doc.geometries.try_get(target) else {
                        continue;
                    };
                    let positions = sub
                        .vertex_range()
                        .map(|v| {
                            let p = geometry.position_indices[v];
                            let base = geometry.source_positions.get(p).copied().unwrap_or(Vec3::ZERO);
                            let moved = target_geometry.source_positions.get(p).copied().unwrap_or(base);
                            match morph.method {
                                MorphMethod::Normalized => moved - base,
                                MorphMethod::Relative => moved,
                            }
                        })
                        .collect();
                    mesh.morph_targets.push(out::MorphTarget {
                        name: doc.geometries.display_name(target).unwrap_or_default().to_string(),
                        positions,
                        normals: Vec::new(),
                        weight: morph.weights.get(i).copied().unwrap_or(0.0),
                    });
                }
            }
        }
        Ok(())
    }

    /// Bones for the joints bound to placed nodes. Weights are looked up per
    /// position and normalized per vertex.
    fn convert_bones(
        &self,
        skin: &Skin,
        placed: &PlacedMesh,
        geometry: &Geometry,
        sub: &SubMesh,
    ) -> Result<Vec<out::Bone>> {
        if skin.weights.len() != geometry.source_positions.len() {
            return Err(AssetError::invalid(format!(
                "skin has weights for {} vertices, geometry has {} positions",
                skin.weights.len(),
                geometry.source_positions.len()
            )));
        }
        let nodes = &self.doc.hierarchy.nodes;
        let mut bones: Vec<Option<out::Bone>> = skin
            .joints
            .iter()
            .enumerate()
            .map(|(j, _)| {
                let node = placed.joints.get(j).copied().flatten()?;
                let offset = skin.inverse_bind_matrices[j] * skin.bind_shape_matrix;
                Some(out::Bone::new(nodes[node].name.clone(), offset))
            })
            .collect();

        for (local, v) in sub.vertex_range().enumerate() {
            let influences = &skin.weights[geometry.position_indices[v]];
            let total: f32 = influences
                .iter()
                .filter(|(j, _)| matches!(bones.get(*j), Some(Some(_))))
                .map(|(_, w)| w)
                .sum();
            if total <= 0.0 {
                continue;
            }
            for &(joint, weight) in influences {
                if let Some(Some(bone)) = bones.get_mut(joint) {
                    bone.weights.push(out::VertexWeight {
                        vertex: local as u32,
                        weight: weight / total,
                    });
                }
            }
        }
        Ok(bones.into_iter().flatten().collect())
    }

    fn camera_instance(&mut self, camera: Ref<dae::Camera>) -> usize {
        if let Some(&index) = self.cameras.get(&camera) {
            return index;
        }
        let doc = self.doc;
        let index = self.scene.add_camera(out::Camera {
            name: doc.cameras.display_name(camera).unwrap_or_default().to_string(),
            projection: doc.cameras[camera].projection,
        });
        self.cameras.insert(camera, index);
        index
    }

    fn light_instance(&mut self, light: Ref<dae::Light>) -> usize {
        if let Some(&index) = self.lights.get(&light) {
            return index;
        }
        let doc = self.doc;
        let l = doc.lights[light];
        let index = self.scene.add_light(out::Light {
            name: doc.lights.display_name(light).unwrap_or_default().to_string(),
            kind: l.kind,
            color: l.color,
            intensity: l.intensity,
            attenuation: l.attenuation,
        });
        self.lights.insert(light, index);
        index
    }
}

/// Tangent handedness from the bitangent, when there is one.
fn tangent_sign(normal: Option<&Vec3>, tangent: Vec3, bitangent: Option<&Vec3>) -> f32 {
    match (normal, bitangent) {
        (Some(n), Some(b)) if n.cross(tangent).dot(*b) < 0.0 => -1.0,
        _ => 1.0,
    }
}

/// One submesh as a scene mesh. Lines and line strips become line segments.
/// Polygons and fans are fanned into triangles, strips alternate winding.
fn convert_submesh(name: &str, geometry: &Geometry, sub: &SubMesh) -> out::MeshData {
    let range = sub.vertex_range();
    let slice = |stream: &[Vec3]| -> Vec<Vec3> { stream.get(range.clone()).map(<[Vec3]>::to_vec).unwrap_or_default() };

    let mut mesh = out::MeshData::new(name);
    mesh.positions = slice(&geometry.positions);
    mesh.normals = slice(&geometry.normals);
    let bitangents = slice(&geometry.bitangents);
    mesh.tangents = slice(&geometry.tangents)
        .into_iter()
        .enumerate()
        .map(|(i, t)| t.extend(tangent_sign(mesh.normals.get(i), t, bitangents.get(i))))
        .collect();
    mesh.texcoords = geometry
        .texcoords
        .iter()
        .map(|channel| channel.get(range.clone()).map(<[_]>::to_vec).unwrap_or_default())
        .collect();
    mesh.colors = geometry
        .colors
        .iter()
        .map(|channel| channel.get(range.clone()).map(<[_]>::to_vec).unwrap_or_default())
        .collect();

    let mut start = 0u32;
    let mut skipped = 0;
    if matches!(sub.primitive, PrimitiveType::Lines | PrimitiveType::LineStrips) {
        mesh.kind = out::PrimitiveKind::Lines;
        for &n in &sub.face_sizes {
            for i in 1..n as u32 {
                mesh.indices.extend([start + i - 1, start + i]);
            }
            start += n as u32;
        }
    } else {
        mesh.kind = out::PrimitiveKind::Triangles;
        for &n in &sub.face_sizes {
            if n < 3 {
                skipped += 1;
            }
            if sub.primitive == PrimitiveType::TriStrips {
                for i in 0..(n as u32).saturating_sub(2) {
                    let (a, b) = if i % 2 == 0 { (i, i + 1) } else { (i + 1, i) };
                    mesh.indices.extend([start + a, start + b, start + i + 2]);
                }
            } else {
                for i in 1..(n as u32).saturating_sub(1) {
                    mesh.indices.extend([start, start + i, start + i + 1]);
                }
            }
            start += n as u32;
        }
    }
    if skipped > 0 {
        warn!("mesh \"{}\": skipped {} faces with fewer than 3 vertices", name, skipped);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use assetgraph_scene::Axis;

    fn scene(libraries: &str, nodes: &str) -> out::Scene {
        fixtures::load(libraries, nodes).unwrap().to_scene().unwrap()
    }

    #[test]
    fn test_metadata_and_hierarchy() {
        let doc = fixtures::collada(
            "",
            r#"<node id="root" name="Root"><translate>0 1 0</translate><node id="child"/></node>"#,
        )
        .replace(
            r#"<up_axis>Y_UP</up_axis>"#,
            r#"<up_axis>Z_UP</up_axis><contributor><author>Ann</author><authoring_tool>Maya</authoring_tool><comments>hi</comments></contributor>"#,
        );
        let scene = import_slice(doc.as_bytes(), ImportOptions::default()).unwrap();

        let meta = &scene.metadata;
        assert_eq!(meta.source_format.as_deref(), Some("COLLADA"));
        assert_eq!(meta.format_version.as_deref(), Some("1.4.1"));
        assert_eq!(meta.generator.as_deref(), Some("Maya"));
        assert_eq!(meta.author.as_deref(), Some("Ann"));
        assert_eq!(meta.up_axis, Axis::Z);
        assert_eq!(meta.unit_scale, 1.0);
        assert_eq!(meta.custom.get("comments"), Some(&out::MetadataValue::from("hi")));
        assert_eq!(meta.custom.get("unitName"), Some(&out::MetadataValue::from("meter")));

        let names: Vec<&str> = scene.nodes.iter().map(|n| n.name.as_str()).collect();
        insta::assert_snapshot!(names.join(","), @"Root,child");
        assert_eq!(scene.nodes[1].parent, Some(0));
        assert_eq!(scene.nodes[0].transform.w_axis.truncate(), Vec3::Y);
    }

    #[test]
    fn test_polygons_are_fanned_and_meshes_shared() {
        let libraries = format!(
            r##"<library_geometries><geometry id="g" name="Quad">{}</geometry></library_geometries>"##,
            fixtures::quad_mesh(
                r##"<polylist count="1">
                     <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                     <vcount>4</vcount><p>0 1 2 3</p>
                   </polylist>
                   <lines count="1">
                     <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                     <p>0 2</p>
                   </lines>"##
            )
        );
        let scene = scene(
            &libraries,
            r##"<node id="a"><instance_geometry url="#g"/></node>
                <node id="b"><instance_geometry url="#g"/></node>"##,
        );
        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.nodes[0].meshes, [0, 1]);
        assert_eq!(scene.nodes[1].meshes, [0, 1]);

        let quad = &scene.meshes[0];
        assert_eq!(quad.name, "Quad");
        assert_eq!(quad.kind, out::PrimitiveKind::Triangles);
        assert_eq!(quad.indices, [0, 1, 2, 0, 2, 3]);
        assert_eq!(quad.positions.len(), 4);

        let line = &scene.meshes[1];
        assert_eq!(line.kind, out::PrimitiveKind::Lines);
        assert_eq!(line.indices, [0, 1]);
        assert_eq!(line.positions, [Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)]);
    }

    #[test]
    fn test_strips_alternate_winding() {
        let libraries = format!(
            r##"<library_geometries><geometry id="g">{}</geometry></library_geometries>"##,
            fixtures::quad_mesh(
                r##"<tristrips count="1">
                     <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                     <p>0 1 3 2</p>
                   </tristrips>
                   <trifans count="1">
                     <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                     <p>0 1 2 3</p>
                   </trifans>
                   <linestrips count="1">
                     <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                     <p>0 1 2</p>
                   </linestrips>"##
            )
        );
        let scene = scene(&libraries, r##"<node id="a"><instance_geometry url="#g"/></node>"##);
        assert_eq!(scene.meshes.len(), 3);
        assert_eq!(scene.meshes[0].indices, [0, 1, 2, 2, 1, 3]);
        assert_eq!(scene.meshes[1].indices, [0, 1, 2, 0, 2, 3]);
        assert_eq!(scene.meshes[2].kind, out::PrimitiveKind::Lines);
        assert_eq!(scene.meshes[2].indices, [0, 1, 1, 2]);
    }

    #[test]
    fn test_common_profile_material() {
        let effect = r##"
            <effect id="fx">
              <profile_COMMON>
                <newparam sid="s"><surface type="2D"><init_from>wood</init_from></surface></newparam>
                <newparam sid="t"><sampler2D><source>s</source></sampler2D></newparam>
                <technique sid="common">
                  <blinn>
                    <emission><color>0.1 0.2 0.3 1</color></emission>
                    <diffuse><texture texture="t" texcoord="UVMap"/></diffuse>
                    <specular><color>0.5 0.5 0.5 1</color></specular>
                    <shininess><float>50</float></shininess>
                    <transparency><float>0.5</float></transparency>
                  </blinn>
                </technique>
              </profile_COMMON>
            </effect>"##;
        let images = r#"<image id="wood" name="Wood"><init_from>wood.png</init_from></image>"#;
        let scene = fixtures::load_material(effect, images).unwrap().to_scene().unwrap();

        assert_eq!(scene.materials.len(), 1);
        let m = &scene.materials[0];
        assert_eq!(m.name, "Wood");
        assert_eq!(m.base_color, Vec4::new(1.0, 1.0, 1.0, 0.5));
        assert_eq!(m.alpha_mode, out::AlphaMode::Blend);
        assert_eq!(m.metallic, 0.0);
        assert!((m.roughness - (2.0f32 / 52.0).sqrt()).abs() < 1e-6);
        assert_eq!(m.emissive, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(m.base_color_texture, Some(out::TextureRef { texture: 0, texcoord: 0 }));
        let sg = m.specular_glossiness.as_ref().unwrap();
        assert_eq!(sg.specular, Vec3::splat(0.5));

        assert_eq!(scene.textures.len(), 1);
        assert_eq!(scene.textures[0].name, "Wood");
        assert_eq!(
            scene.textures[0].source,
            out::ImageSource::External { uri: "wood.png".into() }
        );
        assert_eq!(scene.meshes[0].material, Some(0));
    }

    #[test]
    fn test_lambert_material_is_rough_and_opaque() {
        let effect = r##"<effect id="fx"><profile_COMMON><technique sid="t"><lambert>
              <diffuse><color>1 0 0 1</color></diffuse>
            </lambert></technique></profile_COMMON></effect>"##;
        let scene = fixtures::load_material(effect, "").unwrap().to_scene().unwrap();
        let m = &scene.materials[0];
        assert_eq!(m.base_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(m.roughness, 1.0);
        assert_eq!(m.alpha_mode, out::AlphaMode::Opaque);
        assert!(m.specular_glossiness.is_none());
    }

    #[test]
    fn test_skin_becomes_bones() {
        let libraries = format!(
            "<library_geometries>{}</library_geometries><library_controllers>{}</library_controllers>",
            fixtures::quad_geometry("quad"),
            fixtures::skin_controller("skin", "quad", "Hip Knee")
        );
        let scene = scene(
            &libraries,
            r##"<node id="Armature">
                 <node id="Hip" sid="Hip" type="JOINT"><node id="Knee" sid="Knee" type="JOINT"/></node>
               </node>
               <node id="body"><instance_controller url="#skin"><skeleton>#Hip</skeleton></instance_controller></node>"##,
        );
        let body = &scene.nodes[scene.find_node("body").unwrap()];
        let mesh = &scene.meshes[body.meshes[0]];
        assert_eq!(mesh.bones.len(), 2);

        let hip = &mesh.bones[0];
        assert_eq!(hip.name, "Hip");
        let hip_vertices: Vec<u32> = hip.weights.iter().map(|w| w.vertex).collect();
        assert_eq!(hip_vertices, [0, 1, 3]);
        assert_eq!(hip.weights[1].weight, 0.25);

        let knee = &mesh.bones[1];
        assert_eq!(knee.offset_matrix.w_axis.truncate(), Vec3::new(0.0, -1.0, 1.0));
        let knee_vertices: Vec<u32> = knee.weights.iter().map(|w| w.vertex).collect();
        assert_eq!(knee_vertices, [1, 2, 4]);
    }

    #[test]
    fn test_morph_targets_are_displacements() {
        let raised = fixtures::quad_geometry("smile").replace("0 0 0  1 0 0  1 1 0  0 1 0", "0 0 1  1 0 1  1 1 1  0 1 1");
        let libraries = format!(
            r##"<library_geometries>{}{}</library_geometries>
                <library_controllers><controller id="morph"><morph source="#quad">
                  <source id="targets">
                    <IDREF_array id="targets-array" count="1">smile</IDREF_array>
                    <technique_common><accessor source="#targets-array" count="1"><param name="IDREF" type="IDREF"/></accessor></technique_common>
                  </source>
                  <source id="weights">
                    <float_array id="weights-array" count="1">0.5</float_array>
                    <technique_common><accessor source="#weights-array" count="1"><param name="MORPH_WEIGHT" type="float"/></accessor></technique_common>
                  </source>
                  <targets>
                    <input semantic="MORPH_TARGET" source="#targets"/>
                    <input semantic="MORPH_WEIGHT" source="#weights"/>
                  </targets>
                </morph></controller></library_controllers>"##,
            fixtures::quad_geometry("quad"),
            raised
        );
        let scene = scene(&libraries, r##"<node id="face"><instance_controller url="#morph"/></node>"##);
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.morph_targets.len(), 1);
        let target = &mesh.morph_targets[0];
        assert_eq!(target.name, "Quad");
        assert_eq!(target.weight, 0.5);
        assert_eq!(target.positions, vec![Vec3::Z; 6]);
    }

    #[test]
    fn test_first_camera_and_light_per_node() {
        let libraries = r##"
            <library_cameras><camera id="cam" name="Main"><optics><technique_common><perspective>
              <yfov>60</yfov><znear>0.1</znear>
            </perspective></technique_common></optics></camera></library_cameras>
            <library_lights>
              <light id="key"><technique_common><point><color>1 1 1</color></point></technique_common></light>
              <light id="fill"><technique_common><ambient><color>0.2 0.2 0.2</color></ambient></technique_common></light>
            </library_lights>"##;
        let scene = scene(
            libraries,
            r##"<node id="a"><instance_camera url="#cam"/><instance_light url="#key"/><instance_light url="#fill"/></node>
                <node id="b"><instance_camera url="#cam"/></node>"##,
        );
        assert_eq!(scene.cameras.len(), 1);
        assert_eq!(scene.cameras[0].name, "Main");
        assert_eq!(scene.nodes[0].camera, Some(0));
        assert_eq!(scene.nodes[1].camera, Some(0));
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].kind, out::LightKind::Point);
        assert_eq!(scene.lights[0].name, "key");
    }

    fn animations(body: &str) -> String {
        format!("<library_animations>{}</library_animations>", body)
    }

    #[test]
    fn test_single_channel_animations_are_merged() {
        let libraries = animations(&format!(
            r#"<animation id="move">{}</animation><animation id="turn">{}</animation>"#,
            fixtures::animation_body("a", "box/location.X", "0 1", "0 2", 1, None),
            fixtures::animation_body("b", "box/rotZ.ANGLE", "0 0.5", "0 90", 1, Some("STEP STEP")),
        ));
        let scene = scene(&libraries, fixtures::ANIMATED_BOX);
        assert_eq!(scene.animations.len(), 1);

        let anim = &scene.animations[0];
        assert_eq!(anim.name, "animation_0");
        assert_eq!(anim.duration, 1.0);
        let keys = anim.channel(0).unwrap();
        let times: Vec<f32> = keys.translations.iter().map(|k| k.time).collect();
        assert_eq!(times, [0.0, 0.5, 1.0]);
        assert!(keys.translations[1].value.abs_diff_eq(Vec3::X, 1e-6));
        assert!(keys.translations[2].value.abs_diff_eq(Vec3::X * 2.0, 1e-6));
        let quarter = glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        assert!(keys.rotations[0].value.abs_diff_eq(glam::Quat::IDENTITY, 1e-6));
        assert!(keys.rotations[1].value.abs_diff_eq(quarter, 1e-5));
        assert!(keys.scales[2].value.abs_diff_eq(Vec3::ONE, 1e-5));
    }

    #[test]
    fn test_clip_selects_its_time_range() {
        let libraries = format!(
            r##"{}<library_animation_clips>
                 <animation_clip id="tail" start="0.5" end="1"><instance_animation url="#all"/></animation_clip>
               </library_animation_clips>"##,
            animations(&format!(
                r#"<animation id="all">{}{}</animation>"#,
                fixtures::animation_body("a", "box/location.X", "0 1", "0 2", 1, None),
                fixtures::animation_body("b", "box/rotZ.ANGLE", "0 0.5", "0 90", 1, None),
            ))
        );
        let scene = scene(&libraries, fixtures::ANIMATED_BOX);
        assert_eq!(scene.animations.len(), 1);

        let anim = &scene.animations[0];
        assert_eq!(anim.name, "tail");
        assert_eq!(anim.duration, 0.5);
        let keys = anim.channel(0).unwrap();
        assert_eq!(keys.translations.len(), 2);
        assert_eq!(keys.translations[0].time, 0.0);
        assert!(keys.translations[0].value.abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_unbound_animation_is_dropped() {
        let libraries = animations(&format!(
            r#"<animation id="ghost">{}</animation>"#,
            fixtures::animation_body("a", "nobody/location.X", "0 1", "0 2", 1, None),
        ));
        let scene = scene(&libraries, fixtures::ANIMATED_BOX);
        assert!(scene.animations.is_empty());
    }
}
