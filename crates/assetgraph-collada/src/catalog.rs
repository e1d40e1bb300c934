//! The top-level walk: document info, library sections and the scene entry
//! point.
//!
//! Library entries are collected into symbol tables keyed by ID, in
//! document order, without reading their contents. The tables are then
//! laid out as one section per library so the lazy dictionaries can attach
//! to them.

use crate::xml::XmlNode;
use assetgraph_core::{AssetError, DuplicatePolicy, ImportOptions, Result, SymbolTable, TreeNode};
use assetgraph_scene::Axis;
use indexmap::IndexMap;
use log::{debug, warn};

/// Format option overriding the duplicate policy for geometries.
pub const GEOMETRY_DUPLICATES: &str = "geometry_duplicates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColladaVersion {
    V1_3,
    V1_4,
    V1_5,
}

impl ColladaVersion {
    /// Version from the root `version` attribute. Unknown versions read as 1.5.
    pub fn parse(version: Option<&str>) -> Self {
        match version {
            Some(v) if v.starts_with("1.5") => Self::V1_5,
            Some(v) if v.starts_with("1.4") => Self::V1_4,
            Some(v) if v.starts_with("1.3") => Self::V1_3,
            other => {
                debug!("unknown COLLADA version {:?}, reading as 1.5", other);
                Self::V1_5
            }
        }
    }
}

/// The `COLLADA` root's version and `asset` element.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub version: ColladaVersion,
    /// `version` attribute as written.
    pub version_string: Option<String>,
    /// Length of one document unit in meters.
    pub unit_meter: f32,
    pub unit_name: Option<String>,
    pub up_axis: Axis,
    pub created: Option<String>,
    pub modified: Option<String>,
    /// Contributor fields under camelCase keys (`author`, `authoringTool`,
    /// `copyright`, ...), then `title`, `subject`, `keywords` and `revision`.
    pub fields: IndexMap<String, String>,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            version: ColladaVersion::V1_5,
            version_string: None,
            unit_meter: 1.0,
            unit_name: None,
            up_axis: Axis::Y,
            created: None,
            modified: None,
            fields: IndexMap::new(),
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn text_of(node: &XmlNode, tag: &str) -> Option<String> {
    node.member(tag)
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl DocumentInfo {
    pub fn read(root: &XmlNode) -> Result<Self> {
        let version_string = root.attribute("version").map(str::to_string);
        let mut info = Self {
            version: ColladaVersion::parse(version_string.as_deref()),
            version_string,
            ..Self::default()
        };
        let Some(asset) = root.member("asset") else {
            return Ok(info);
        };

        if let Some(unit) = asset.member("unit") {
            if let Some(meter) = unit.attribute("meter") {
                info.unit_meter = meter
                    .trim()
                    .parse()
                    .map_err(|_| AssetError::invalid(format!("unit meter \"{}\"", meter)))?;
            }
            info.unit_name = unit.attribute("name").map(str::to_string);
        }
        info.up_axis = match text_of(asset, "up_axis").as_deref() {
            Some("X_UP") => Axis::X,
            Some("Z_UP") => Axis::Z,
            _ => Axis::Y,
        };
        info.created = text_of(asset, "created");
        info.modified = text_of(asset, "modified");

        for contributor in asset.children_named("contributor") {
            for field in &contributor.children {
                let value = field.text.trim();
                if !value.is_empty() {
                    info.fields
                        .entry(camel_case(&field.name))
                        .or_insert_with(|| value.to_string());
                }
            }
        }
        for tag in ["title", "subject", "keywords", "revision"] {
            if let Some(value) = text_of(asset, tag) {
                info.fields.entry(tag.to_string()).or_insert(value);
            }
        }
        Ok(info)
    }
}

struct Library {
    section: &'static str,
    element: &'static str,
    key: &'static str,
}

const LIBRARIES: [Library; 11] = [
    Library { section: "library_geometries", element: "geometry", key: "geometries" },
    Library { section: "library_controllers", element: "controller", key: "controllers" },
    Library { section: "library_materials", element: "material", key: "materials" },
    Library { section: "library_effects", element: "effect", key: "effects" },
    Library { section: "library_images", element: "image", key: "images" },
    Library { section: "library_cameras", element: "camera", key: "cameras" },
    Library { section: "library_lights", element: "light", key: "lights" },
    Library { section: "library_nodes", element: "node", key: "nodes" },
    Library { section: "library_visual_scenes", element: "visual_scene", key: "visual_scenes" },
    Library { section: "library_animations", element: "animation", key: "animations" },
    Library { section: "library_animation_clips", element: "animation_clip", key: "animation_clips" },
];

const IMAGES: usize = 4;

/// Library entries of one document, by ID.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub info: DocumentInfo,
    /// `url` of the scene's `instance_visual_scene`.
    pub scene_url: Option<String>,
    tables: Vec<SymbolTable<XmlNode>>,
}

impl Catalog {
    pub fn read(root: &XmlNode, options: &ImportOptions) -> Result<Self> {
        if root.name != "COLLADA" {
            return Err(AssetError::Unsupported(format!(
                "root element <{}> is not <COLLADA>",
                root.name
            )));
        }
        let geometry_policy = match options.format_option(GEOMETRY_DUPLICATES) {
            None => DuplicatePolicy::Skip,
            Some(name) => DuplicatePolicy::from_name(name).ok_or_else(|| {
                AssetError::invalid(format!("{} \"{}\"", GEOMETRY_DUPLICATES, name))
            })?,
        };

        let mut catalog = Self {
            info: DocumentInfo::read(root)?,
            scene_url: None,
            tables: LIBRARIES.iter().map(|l| SymbolTable::new(l.key)).collect(),
        };
        debug!(
            "COLLADA {:?} document, unit {} m",
            catalog.info.version, catalog.info.unit_meter
        );

        for section in &root.children {
            let name = section.name.as_str();
            let Some(slot) = LIBRARIES.iter().position(|l| l.section == name) else {
                match name {
                    "asset" => {}
                    "scene" => catalog.read_scene(section)?,
                    other => debug!("ignoring <{}>", other),
                }
                continue;
            };
            let library = &LIBRARIES[slot];
            let policy = if slot == 0 {
                geometry_policy
            } else {
                options.duplicate_ids
            };
            for entry in section.children_named(library.element) {
                catalog.insert(slot, entry, policy)?;
                if library.element == "effect" {
                    catalog.hoist_images(entry, options.duplicate_ids)?;
                }
            }
        }
        Ok(catalog)
    }

    fn insert(&mut self, slot: usize, entry: &XmlNode, policy: DuplicatePolicy) -> Result<()> {
        let table = &mut self.tables[slot];
        match entry.attribute("id") {
            Some(id) => {
                table.insert(id, entry.clone(), policy)?;
            }
            // Animations are played, not referenced, so they need no id.
            None if matches!(entry.name.as_str(), "animation" | "animation_clip") => {
                let id = format!("{}_{}", entry.name, table.len());
                table.insert(&id, entry.clone(), policy)?;
            }
            None => warn!("{}: skipping <{}> without an id", table.name(), entry.name),
        }
        Ok(())
    }

    /// Images declared inside an effect (1.4 style) join the image library.
    fn hoist_images(&mut self, effect: &XmlNode, policy: DuplicatePolicy) -> Result<()> {
        let scopes = std::iter::once(effect).chain(
            effect
                .children
                .iter()
                .filter(|c| c.name.starts_with("profile_")),
        );
        for scope in scopes {
            for image in scope.children_named("image") {
                self.insert(IMAGES, image, policy)?;
            }
        }
        Ok(())
    }

    fn read_scene(&mut self, scene: &XmlNode) -> Result<()> {
        for instance in scene.children_named("instance_visual_scene") {
            if self.scene_url.is_some() {
                return Err(AssetError::invalid("more than one <instance_visual_scene>"));
            }
            let url = instance
                .attribute("url")
                .ok_or_else(|| AssetError::invalid("<instance_visual_scene> has no url"))?;
            self.scene_url = Some(url.to_string());
        }
        Ok(())
    }

    /// The table for a library key such as `"geometries"`.
    pub fn table(&self, key: &str) -> Option<&SymbolTable<XmlNode>> {
        self.tables.iter().find(|t| t.name() == key)
    }

    /// Lay the tables out as `<catalog><geometries>...</geometries>...`,
    /// every entry carrying the ID it is stored under.
    pub fn into_tree(self) -> XmlNode {
        let mut root = XmlNode::new("catalog");
        for table in self.tables {
            let mut section = XmlNode::new(table.name());
            for (id, mut entry) in table.into_entries() {
                entry.attributes.insert("id".to_string(), id);
                section.children.push(entry);
            }
            root.children.push(section);
        }
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    fn catalog(doc: &str, options: &ImportOptions) -> Result<Catalog> {
        Catalog::read(&xml::parse(doc.as_bytes())?, options)
    }

    const DUPLICATES: &str = r##"
        <COLLADA version="1.4.1">
          <library_geometries>
            <geometry id="g" name="first"/>
            <geometry id="g" name="second"/>
            <geometry name="anonymous"/>
          </library_geometries>
          <library_materials>
            <material id="m" name="first"/>
          </library_materials>
          <library_materials>
            <material id="m" name="second"/>
          </library_materials>
        </COLLADA>"##;

    #[test]
    fn test_asset_info() {
        let doc = r##"
            <COLLADA version="1.4.1">
              <asset>
                <contributor><author>Ann</author><authoring_tool>Blender 4.0</authoring_tool></contributor>
                <contributor><author>Bo</author><source_data>file.blend</source_data></contributor>
                <created>2024-01-02T03:04:05</created>
                <unit name="centimeter" meter="0.01"/>
                <up_axis>Z_UP</up_axis>
                <title>Chair</title>
              </asset>
              <library_animations><animation id="a"/></library_animations>
            </COLLADA>"##;
        let c = catalog(doc, &ImportOptions::default()).unwrap();
        let info = &c.info;
        assert_eq!(info.version, ColladaVersion::V1_4);
        assert_eq!(info.version_string.as_deref(), Some("1.4.1"));
        assert_eq!(info.unit_meter, 0.01);
        assert_eq!(info.unit_name.as_deref(), Some("centimeter"));
        assert_eq!(info.up_axis, Axis::Z);
        assert_eq!(info.created.as_deref(), Some("2024-01-02T03:04:05"));
        let fields: Vec<(&str, &str)> = info.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(
            fields,
            [
                ("author", "Ann"),
                ("authoringTool", "Blender 4.0"),
                ("sourceData", "file.blend"),
                ("title", "Chair")
            ]
        );
    }

    #[test]
    fn test_versions() {
        assert_eq!(ColladaVersion::parse(Some("1.5.0")), ColladaVersion::V1_5);
        assert_eq!(ColladaVersion::parse(Some("1.3.1")), ColladaVersion::V1_3);
        assert_eq!(ColladaVersion::parse(Some("2.0")), ColladaVersion::V1_5);
        assert_eq!(ColladaVersion::parse(None), ColladaVersion::V1_5);
    }

    #[test]
    fn test_duplicate_geometry_is_skipped_by_default() {
        let options = ImportOptions::default().with_duplicates(DuplicatePolicy::Rename);
        let c = catalog(DUPLICATES, &options).unwrap();
        let geometries = c.table("geometries").unwrap();
        assert_eq!(geometries.len(), 1);
        assert_eq!(geometries.get("g").unwrap().attribute("name"), Some("first"));
        // Other libraries follow the import policy.
        let materials = c.table("materials").unwrap();
        assert_eq!(materials.get("m_dup").unwrap().attribute("name"), Some("second"));

        let err = catalog(DUPLICATES, &ImportOptions::default()).unwrap_err();
        assert!(err.is_duplicate_id());
    }

    #[test]
    fn test_geometry_policy_option() {
        let options = ImportOptions::default()
            .with_duplicates(DuplicatePolicy::Skip)
            .with_format_option(GEOMETRY_DUPLICATES, "reject");
        assert!(catalog(DUPLICATES, &options).unwrap_err().is_duplicate_id());

        let options = ImportOptions::default().with_format_option(GEOMETRY_DUPLICATES, "merge");
        assert!(matches!(
            catalog(DUPLICATES, &options),
            Err(AssetError::InvalidData(_))
        ));
    }

    #[test]
    fn test_tree_carries_stored_ids() {
        let options = ImportOptions::default()
            .with_duplicates(DuplicatePolicy::Rename)
            .with_format_option(GEOMETRY_DUPLICATES, "rename");
        let tree = catalog(DUPLICATES, &options).unwrap().into_tree();
        assert_eq!(tree.children.len(), 11);
        let geometries = tree.member("geometries").unwrap();
        let ids: Vec<_> = geometries.children.iter().filter_map(|g| g.attribute("id")).collect();
        assert_eq!(ids, ["g", "g_dup"]);
        assert!(tree.member("visual_scenes").unwrap().children.is_empty());
    }

    #[test]
    fn test_animations_without_id_are_kept() {
        let doc = r##"
            <COLLADA version="1.4.1">
              <library_animations>
                <animation id="walk"/>
                <animation name="anonymous"/>
              </library_animations>
              <library_animation_clips>
                <animation_clip id="clip"><instance_animation url="#walk"/></animation_clip>
              </library_animation_clips>
            </COLLADA>"##;
        let c = catalog(doc, &ImportOptions::default()).unwrap();
        let animations = c.table("animations").unwrap();
        let ids: Vec<_> = animations.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["walk", "animation_1"]);
        assert_eq!(c.table("animation_clips").unwrap().len(), 1);
    }

    #[test]
    fn test_effect_images_join_library() {
        let doc = r##"
            <COLLADA version="1.4.0">
              <library_images><image id="a"/></library_images>
              <library_effects>
                <effect id="fx">
                  <profile_COMMON><image id="b"/><technique sid="t"/></profile_COMMON>
                </effect>
              </library_effects>
            </COLLADA>"##;
        let c = catalog(doc, &ImportOptions::default()).unwrap();
        let images = c.table("images").unwrap();
        let ids: Vec<_> = images.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_scene_entry_point() {
        let one = r##"<COLLADA><scene><instance_visual_scene url="#s"/></scene></COLLADA>"##;
        let c = catalog(one, &ImportOptions::default()).unwrap();
        assert_eq!(c.scene_url.as_deref(), Some("#s"));

        let two = r##"<COLLADA><scene>
            <instance_visual_scene url="#s"/><instance_visual_scene url="#t"/>
          </scene></COLLADA>"##;
        let err = catalog(two, &ImportOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "invalid data: more than one <instance_visual_scene>");
    }

    #[test]
    fn test_root_must_be_collada() {
        let err = catalog("<gltf/>", &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, AssetError::Unsupported(_)));
    }
}
