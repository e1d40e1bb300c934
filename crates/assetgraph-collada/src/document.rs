//! The COLLADA document: one lazy dictionary per library of the catalog.

use crate::catalog::{Catalog, DocumentInfo};
use crate::entities::{
    Animation, AnimationClip, Camera, Controller, ControllerKind, Effect, Geometry, Image, Light,
    Material, Node, VisualScene,
};
use crate::hierarchy::Hierarchy;
use crate::xml::{self, XmlNode};
use assetgraph_core::{
    follow_chain, translate_url, AssetError, DeferredRefs, DictId, HasDict, IdRegistry,
    ImportOptions, LazyDict, Reader, Ref, RefKind, Resolution, Result, Store, TreeNode,
};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// An in-memory COLLADA document.
///
/// Reading resolves the scene's visual scene and everything reachable from
/// it, then the animation clips, or every animation when there are no
/// clips. Library entries nothing reaches are not built.
pub struct ColladaDocument {
    pub geometries: LazyDict<Geometry>,
    pub controllers: LazyDict<Controller>,
    pub materials: LazyDict<Material>,
    pub effects: LazyDict<Effect>,
    pub images: LazyDict<Image>,
    pub cameras: LazyDict<Camera>,
    pub lights: LazyDict<Light>,
    pub nodes: LazyDict<Node>,
    pub visual_scenes: LazyDict<VisualScene>,
    pub animations: LazyDict<Animation>,
    pub animation_clips: LazyDict<AnimationClip>,

    pub info: DocumentInfo,
    /// The resolved visual scene.
    pub scene: Option<Ref<VisualScene>>,
    /// The visual scene's nodes as placed, with skins bound to joints.
    pub hierarchy: Hierarchy,

    ids: IdRegistry,
    options: ImportOptions,
}

impl ColladaDocument {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            geometries: LazyDict::new(DictId(0), "geometries", None),
            controllers: LazyDict::new(DictId(1), "controllers", None),
            materials: LazyDict::new(DictId(2), "materials", None),
            effects: LazyDict::new(DictId(3), "effects", None),
            images: LazyDict::new(DictId(4), "images", None),
            cameras: LazyDict::new(DictId(5), "cameras", None),
            lights: LazyDict::new(DictId(6), "lights", None),
            nodes: LazyDict::new(DictId(7), "nodes", None),
            visual_scenes: LazyDict::new(DictId(8), "visual_scenes", None),
            animations: LazyDict::new(DictId(9), "animations", None),
            animation_clips: LazyDict::new(DictId(10), "animation_clips", None),
            info: DocumentInfo::default(),
            scene: None,
            hierarchy: Hierarchy::default(),
            ids: IdRegistry::new(),
            options,
        }
    }

    pub fn load(path: impl AsRef<Path>, options: ImportOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_slice(&data, options)
    }

    pub fn from_slice(data: &[u8], options: ImportOptions) -> Result<Self> {
        let root = xml::parse(data)?;
        let catalog = Catalog::read(&root, &options)?;
        let mut doc = Self::new(options);
        doc.info = catalog.info.clone();
        let scene_url = catalog.scene_url.clone();
        let tree = catalog.into_tree();
        doc.read_catalog(&tree, scene_url.as_deref())?;
        Ok(doc)
    }

    fn attach(&mut self, tree: &XmlNode) {
        self.geometries.attach(tree);
        self.controllers.attach(tree);
        self.materials.attach(tree);
        self.effects.attach(tree);
        self.images.attach(tree);
        self.cameras.attach(tree);
        self.lights.attach(tree);
        self.nodes.attach(tree);
        self.visual_scenes.attach(tree);
        self.animations.attach(tree);
        self.animation_clips.attach(tree);
    }

    fn read_catalog(&mut self, tree: &XmlNode, scene_url: Option<&str>) -> Result<()> {
        self.attach(tree);

        let mut cx = Reader::new(tree, self);
        let scene = match scene_url {
            Some(url) => {
                translate_url(url)?;
                Some(cx.retrieve_id::<VisualScene>(url)?)
            }
            None if cx.options().default_scene_fallback && cx.asset().visual_scenes.section_len() > 0 => {
                debug!("no <instance_visual_scene>, using the first visual scene");
                Some(cx.retrieve::<VisualScene>(0)?)
            }
            None => None,
        };
        cx.asset_mut().scene = scene;
        bind_controllers(&mut cx)?;
        read_animations(&mut cx)?;

        if let Some(scene) = self.scene {
            self.hierarchy = Hierarchy::build(self, scene);
            self.hierarchy
                .bind_skins(&self.controllers, self.options.max_chain_depth);
        }
        self.bind_animation_targets()?;
        debug!(
            "built {} geometries, {} controllers, {} materials, {} animations, {} placed nodes",
            self.geometries.len(),
            self.controllers.len(),
            self.materials.len(),
            self.animations.len(),
            self.hierarchy.nodes.len()
        );
        Ok(())
    }

    /// Bind every animation channel to the placed node its target names. A
    /// target whose node or transform `sid` is missing stays unbound.
    fn bind_animation_targets(&mut self) -> Result<()> {
        let mut refs = DeferredRefs::new();
        for (r, animation) in self.animations.iter() {
            for (i, channel) in animation.channels.iter().enumerate() {
                let target = channel.target.node.clone();
                refs.defer((r, i), target, RefKind::BestEffort("animation target"));
            }
        }
        let hierarchy = &self.hierarchy;
        let animations = &mut self.animations;
        refs.resolve_all(|record| {
            let (r, i) = record.owner;
            let channel = &mut animations[r].channels[i];
            let node = hierarchy.find_id(&record.target).filter(|&n| {
                hierarchy.nodes[n]
                    .transforms
                    .iter()
                    .any(|t| t.sid.as_deref() == Some(channel.target.sid.as_str()))
            });
            channel.node = node;
            Ok(match node {
                Some(_) => Resolution::Resolved,
                None => Resolution::Unresolved,
            })
        })?;
        Ok(())
    }

    /// The entry's ID as stored.
    pub fn id_of<'a, T: 'a>(&'a self, r: Ref<T>) -> Option<&'a str>
    where
        Self: HasDict<T>,
    {
        HasDict::<T>::dict(self).meta(r).map(|m| m.id.as_str())
    }
}

impl fmt::Debug for ColladaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColladaDocument")
            .field("info", &self.info)
            .field("scene", &self.scene)
            .field("geometries", &self.geometries.len())
            .field("controllers", &self.controllers.len())
            .field("nodes", &self.hierarchy.nodes.len())
            .finish_non_exhaustive()
    }
}

/// Point each controller at the geometry its source chain ends on. A
/// controller's source may be another controller; the chain is followed
/// over the catalog, so intermediate controllers are never built.
fn bind_controllers<N: TreeNode>(cx: &mut Reader<'_, N, ColladaDocument>) -> Result<()> {
    let sources: HashMap<String, String> = cx
        .doc()
        .member("controllers")
        .map(|section| {
            section
                .elements()
                .filter_map(|c| {
                    let id = c.attribute("id")?;
                    let element = c.member("skin").or_else(|| c.member("morph"))?;
                    let source = translate_url(element.attribute("source")?).ok()?;
                    Some((id.to_string(), source.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let max = cx.options().max_chain_depth;
    let pending: Vec<(Ref<Controller>, String, Vec<String>)> = cx
        .asset()
        .controllers
        .iter()
        .filter(|(_, c)| c.geometry.is_none())
        .map(|(r, c)| {
            let targets = c.morph().map(|m| m.target_ids.clone()).unwrap_or_default();
            (r, c.source.clone(), targets)
        })
        .collect();

    let mut refs = DeferredRefs::new();
    for (r, source, targets) in pending {
        let geometry = follow_chain(source, max, |id| Ok(sources.get(id).cloned()))?;
        refs.defer((r, None), geometry, RefKind::Required("geometry"));
        for (i, target) in targets.into_iter().enumerate() {
            refs.defer((r, Some(i)), target, RefKind::BestEffort("morph target"));
        }
    }

    refs.resolve_all(|record| {
        let geometry = match cx.retrieve_id::<Geometry>(&record.target) {
            Ok(g) => g,
            Err(AssetError::UnresolvedReference { .. }) => return Ok(Resolution::Unresolved),
            Err(err) => return Err(err),
        };
        let (r, slot) = record.owner;
        let controller = &mut cx.asset_mut().controllers[r];
        match slot {
            None => controller.geometry = Some(geometry),
            Some(i) => {
                if let ControllerKind::Morph(morph) = &mut controller.kind {
                    if let Some(target) = morph.targets.get_mut(i) {
                        *target = Some(geometry);
                    }
                }
            }
        }
        Ok(Resolution::Resolved)
    })?;
    Ok(())
}

/// Build the animation clips, or every animation when the document has no
/// clips. Nothing in the visual scene references animations.
fn read_animations<N: TreeNode>(cx: &mut Reader<'_, N, ColladaDocument>) -> Result<()> {
    let clips = cx.asset().animation_clips.section_len();
    if clips > 0 {
        for index in 0..clips {
            cx.retrieve::<AnimationClip>(index)?;
        }
        return Ok(());
    }
    for index in 0..cx.asset().animations.section_len() {
        cx.retrieve::<Animation>(index)?;
    }
    Ok(())
}

impl Store for ColladaDocument {
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
            impl HasDict<$ty> for ColladaDocument {
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
    Geometry => geometries,
    Controller => controllers,
    Material => materials,
    Effect => effects,
    Image => images,
    Camera => cameras,
    Light => lights,
    Node => nodes,
    VisualScene => visual_scenes,
    Animation => animations,
    AnimationClip => animation_clips,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use assetgraph_core::DuplicatePolicy;
    use assetgraph_scene::Axis;

    #[test]
    fn test_only_reachable_entries_are_built() {
        let libraries = format!(
            "<library_geometries>{}{}</library_geometries>",
            fixtures::quad_geometry("used"),
            fixtures::quad_geometry("unused")
        );
        let doc = fixtures::load(&libraries, r##"<node><instance_geometry url="#used"/></node>"##).unwrap();
        assert_eq!(doc.geometries.len(), 1);
        assert!(!doc.geometries.get_id("used").is_null());
        assert_eq!(doc.geometries.get_id("#used"), doc.geometries.get_id("used"));
        assert!(doc.geometries.get_id("unused").is_null());
        assert!(doc.geometries.get_id("#unused").is_null());
        assert_eq!(doc.id_of(doc.geometries.get_id("used")), Some("used"));
    }

    #[test]
    fn test_duplicate_geometry_keeps_first() {
        let libraries = r##"<library_geometries>
              <geometry id="g" name="first"><spline/></geometry>
              <geometry id="g" name="second"><mesh/></geometry>
            </library_geometries>"##;
        let nodes = r##"<node><instance_geometry url="#g"/></node>"##;
        let doc = fixtures::load_with(
            libraries,
            nodes,
            ImportOptions::default().with_duplicates(DuplicatePolicy::Reject),
        )
        .unwrap();
        assert_eq!(doc.geometries.len(), 1);
    }

    #[test]
    fn test_unresolved_scene_url_is_fatal() {
        let doc = fixtures::collada("", "").replace("#Scene", "#Elsewhere");
        let err = ColladaDocument::from_slice(doc.as_bytes(), ImportOptions::default()).unwrap_err();
        assert!(err.is_unresolved());
        assert_eq!(err.to_string(), "unresolved visual_scene reference \"Elsewhere\"");
    }

    #[test]
    fn test_scene_fallback() {
        let doc = fixtures::collada("", r#"<node id="n"/>"#);
        let doc = doc.replace(r##"<scene><instance_visual_scene url="#Scene"/></scene>"##, "");

        let with = ColladaDocument::from_slice(doc.as_bytes(), ImportOptions::default()).unwrap();
        assert_eq!(with.scene, Some(with.visual_scenes.get(0)));
        assert_eq!(with.hierarchy.roots.len(), 1);

        let options = ImportOptions::default().without_scene_fallback();
        let without = ColladaDocument::from_slice(doc.as_bytes(), options).unwrap();
        assert_eq!(without.scene, None);
        assert!(without.visual_scenes.is_empty());
    }

    #[test]
    fn test_controller_chain_ends_on_geometry() {
        let libraries = format!(
            r##"<library_geometries>{}</library_geometries>
                <library_controllers>
                  <controller id="c1">
                    <morph source="#c2"><targets/></morph>
                  </controller>
                  {}
                </library_controllers>"##,
            fixtures::quad_geometry("mesh"),
            fixtures::skin_controller("c2", "mesh", "J")
        );
        let doc = fixtures::load(&libraries, r##"<node><instance_controller url="#c1"/></node>"##).unwrap();
        let c1 = &doc.controllers[doc.controllers.get_id("c1")];
        assert_eq!(c1.source, "c2");
        assert_eq!(c1.geometry, Some(doc.geometries.get_id("mesh")));
        // The intermediate controller is only followed, not built.
        assert_eq!(doc.controllers.len(), 1);
    }

    #[test]
    fn test_controller_cycle_is_fatal() {
        let libraries = r##"<library_controllers>
              <controller id="c1"><morph source="#c2"><targets/></morph></controller>
              <controller id="c2"><morph source="#c1"><targets/></morph></controller>
            </library_controllers>"##;
        let err = fixtures::load(libraries, r##"<node><instance_controller url="#c1"/></node>"##).unwrap_err();
        assert!(err.is_cyclic());
    }

    #[test]
    fn test_controller_without_geometry_is_fatal() {
        let libraries = r##"<library_controllers>
              <controller id="c1"><morph source="#ghost"><targets/></morph></controller>
            </library_controllers>"##;
        let err = fixtures::load(libraries, r##"<node><instance_controller url="#c1"/></node>"##).unwrap_err();
        assert!(err.is_unresolved());
    }

    #[test]
    fn test_document_info() {
        let doc = fixtures::load("", "").unwrap();
        assert_eq!(doc.info.version_string.as_deref(), Some("1.4.1"));
        assert_eq!(doc.info.up_axis, Axis::Y);
        assert_eq!(doc.info.unit_name.as_deref(), Some("meter"));
    }

    #[test]
    fn test_second_visual_scene_instance_is_fatal() {
        let doc = fixtures::collada("", "").replace(
            r##"<instance_visual_scene url="#Scene"/>"##,
            r##"<instance_visual_scene url="#Scene"/><instance_visual_scene url="#Scene"/>"##,
        );
        assert!(ColladaDocument::from_slice(doc.as_bytes(), ImportOptions::default()).is_err());
    }
}
