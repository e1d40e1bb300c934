//! Lazy, reference-resolving dictionaries.
//!
//! A [`LazyDict`] is attached to one section of a parsed document. Nothing is
//! parsed at attach time: an entry is materialized the first time a
//! [`Reader`] retrieves it, by calling the entity's [`Entity::read`], which
//! may in turn retrieve entries from other dictionaries. Built entries live in
//! an arena owned by the dictionary and are addressed by [`Ref`] handles.

use crate::error::{AssetError, Result};
use crate::handle::{DictId, Ref};
use crate::options::{DuplicatePolicy, ImportOptions};
use crate::registry::IdRegistry;
use crate::tree::TreeNode;
use log::{debug, trace, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// Where a dictionary's backing section was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    /// `attach` has not run.
    Detached,
    /// The document has no such section.
    Missing,
    /// The section exists but is not an array.
    NotContainer,
    /// The section is an array of `len` entries.
    Present { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Building,
    Built(u32),
    Rejected,
}

/// Identity of a built entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    /// Asset-wide unique ID.
    pub id: String,
    /// Display name from the document, if any.
    pub name: Option<String>,
    /// Position in the source section. `None` for created entries.
    pub source_index: Option<usize>,
}

/// An object kind that can be materialized from a document node.
pub trait Entity: Sized {
    /// Kind name used in diagnostics and as the suffix for renamed IDs.
    const KIND: &'static str;

    /// The asset this entity belongs to.
    type Asset: Store;

    /// Parse fields from `node`, retrieving referenced entries through `cx`.
    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Self::Asset>) -> Result<Self>;

    /// Map a reference as written in the document to the ID it was stored under.
    fn translate_id(id: &str) -> Cow<'_, str> {
        Cow::Borrowed(id)
    }
}

/// Access to the dictionary holding entities of type `T`.
pub trait HasDict<T> {
    fn dict(&self) -> &LazyDict<T>;
    fn dict_mut(&mut self) -> &mut LazyDict<T>;
}

/// An asset: the owner of dictionaries and the asset-wide ID registry.
pub trait Store {
    fn ids(&self) -> &IdRegistry;

    fn ids_mut(&mut self) -> &mut IdRegistry;

    fn options(&self) -> &ImportOptions;

    /// See [`IdRegistry::find_unique_id`].
    fn find_unique_id(&self, base: &str, suffix: &str) -> String {
        self.ids().find_unique_id(base, suffix)
    }

    /// Add a new entry under `id`, for building an asset rather than reading
    /// one. Fails with `DuplicateId`, leaving the asset unchanged, if `id` is
    /// already registered anywhere in the asset.
    fn create<T>(&mut self, id: &str, value: T) -> Result<Ref<T>>
    where
        Self: HasDict<T> + Sized,
    {
        self.ids_mut().register(id)?;
        let meta = EntityMeta {
            id: id.to_string(),
            name: None,
            source_index: None,
        };
        Ok(HasDict::<T>::dict_mut(self).push(meta, value))
    }
}

/// A dictionary of entities of one kind, backed by one document section.
#[derive(Debug, Clone)]
pub struct LazyDict<T> {
    id: DictId,
    key: &'static str,
    extension: Option<&'static str>,
    section: SectionState,
    items: Vec<T>,
    meta: Vec<EntityMeta>,
    by_index: HashMap<usize, SlotState>,
    by_id: HashMap<String, u32>,
    /// Section position of the first entry carrying each `id` attribute.
    source_ids: HashMap<String, usize>,
}

impl<T> LazyDict<T> {
    /// A dictionary over the section `key`, optionally nested under
    /// `extensions/<extension>`.
    pub fn new(id: DictId, key: &'static str, extension: Option<&'static str>) -> Self {
        Self {
            id,
            key,
            extension,
            section: SectionState::Detached,
            items: Vec::new(),
            meta: Vec::new(),
            by_index: HashMap::new(),
            by_id: HashMap::new(),
            source_ids: HashMap::new(),
        }
    }

    pub fn id(&self) -> DictId {
        self.id
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn section(&self) -> SectionState {
        self.section
    }

    /// Number of entries in the backing section, built or not.
    pub fn section_len(&self) -> usize {
        match self.section {
            SectionState::Present { len } => len,
            _ => 0,
        }
    }

    /// Record where this dictionary's section lives in `root`. A missing
    /// section is not an error: the dictionary stays empty.
    pub fn attach<N: TreeNode>(&mut self, root: &N) -> SectionState {
        self.source_ids.clear();
        self.section = match self.find_section(root) {
            None => SectionState::Missing,
            Some(node) if !node.is_array() => SectionState::NotContainer,
            Some(node) => {
                for (index, element) in node.elements().enumerate() {
                    if let Some(id) = element.attribute("id") {
                        self.source_ids.entry(id.to_string()).or_insert(index);
                    }
                }
                SectionState::Present {
                    len: node.len().unwrap_or(0),
                }
            }
        };
        debug!("attached \"{}\": {:?}", self.key, self.section);
        self.section
    }

    fn find_section<'d, N: TreeNode>(&self, root: &'d N) -> Option<&'d N> {
        match self.extension {
            Some(ext) => root
                .find_object("extensions")
                .and_then(|e| e.find_object(ext))
                .and_then(|e| e.member(self.key)),
            None => root.member(self.key),
        }
    }

    /// The backing section, or the structural error that prevents reading it.
    pub fn locate<'d, N: TreeNode>(&self, root: &'d N) -> Result<&'d N> {
        match self.section {
            SectionState::Detached | SectionState::Missing => Err(self.missing()),
            SectionState::NotContainer => Err(AssetError::MalformedSection {
                dict: self.key.to_string(),
                expected: "an array",
            }),
            SectionState::Present { .. } => self.find_section(root).ok_or_else(|| self.missing()),
        }
    }

    fn missing(&self) -> AssetError {
        AssetError::MissingSection {
            dict: self.key.to_string(),
        }
    }

    fn handle(&self, arena: u32) -> Ref<T> {
        Ref::new(self.id, arena)
    }

    fn slot(&self, index: usize) -> Option<SlotState> {
        self.by_index.get(&index).copied()
    }

    /// Handle for the entry at source position `index`, or null if it has not
    /// been built. Never triggers construction.
    pub fn get(&self, index: usize) -> Ref<T> {
        match self.slot(index) {
            Some(SlotState::Built(arena)) => self.handle(arena),
            _ => Ref::null(),
        }
    }

    /// Number of built entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn arena_index(&self, r: Ref<T>) -> Option<usize> {
        if r.dict() != self.id {
            return None;
        }
        r.index().filter(|&i| i < self.items.len())
    }

    pub fn try_get(&self, r: Ref<T>) -> Option<&T> {
        self.arena_index(r).map(|i| &self.items[i])
    }

    pub fn get_mut(&mut self, r: Ref<T>) -> Option<&mut T> {
        self.arena_index(r).map(move |i| &mut self.items[i])
    }

    pub fn meta(&self, r: Ref<T>) -> Option<&EntityMeta> {
        self.arena_index(r).map(|i| &self.meta[i])
    }

    /// The entry's name if it has one, else its ID.
    pub fn display_name(&self, r: Ref<T>) -> Option<&str> {
        self.meta(r).map(|m| m.name.as_deref().unwrap_or(&m.id))
    }

    /// Set the display name of a built entry. The ID stays fixed.
    pub fn set_name(&mut self, r: Ref<T>, name: impl Into<String>) {
        if let Some(i) = self.arena_index(r) {
            self.meta[i].name = Some(name.into());
        }
    }

    /// Position of `r` in construction order, for writers that emit entries
    /// as a flat array.
    pub fn position(&self, r: Ref<T>) -> Option<usize> {
        self.arena_index(r)
    }

    /// Built entries in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (Ref<T>, &T)> {
        let id = self.id;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, v)| (Ref::new(id, i as u32), v))
    }

    /// Handles of all built entries in construction order.
    pub fn handles(&self) -> impl Iterator<Item = Ref<T>> {
        let id = self.id;
        (0..self.items.len() as u32).map(move |i| Ref::new(id, i))
    }

    fn push(&mut self, meta: EntityMeta, value: T) -> Ref<T> {
        let arena = self.items.len() as u32;
        let index = meta.source_index.unwrap_or(arena as usize);
        self.by_index.entry(index).or_insert(SlotState::Built(arena));
        self.by_id.insert(meta.id.clone(), arena);
        self.items.push(value);
        self.meta.push(meta);
        self.handle(arena)
    }
}

impl<T: Entity> LazyDict<T> {
    /// Handle for the entry stored under `id`, or null. Never fails.
    pub fn get_id(&self, id: &str) -> Ref<T> {
        match self.by_id.get(T::translate_id(id).as_ref()) {
            Some(&arena) => self.handle(arena),
            None => Ref::null(),
        }
    }
}

impl<T> Index<Ref<T>> for LazyDict<T> {
    type Output = T;

    fn index(&self, r: Ref<T>) -> &T {
        match self.try_get(r) {
            Some(v) => v,
            None => panic!("dereferenced {:?} in dictionary \"{}\"", r, self.key),
        }
    }
}

impl<T> IndexMut<Ref<T>> for LazyDict<T> {
    fn index_mut(&mut self, r: Ref<T>) -> &mut T {
        let key = self.key;
        match self.get_mut(r) {
            Some(v) => v,
            None => panic!("dereferenced {:?} in dictionary \"{}\"", r, key),
        }
    }
}

/// Resolution context: the document being read and the asset being built.
pub struct Reader<'a, N, A> {
    doc: &'a N,
    asset: &'a mut A,
}

impl<'a, N: TreeNode, A: Store> Reader<'a, N, A> {
    pub fn new(doc: &'a N, asset: &'a mut A) -> Self {
        Self { doc, asset }
    }

    pub fn doc(&self) -> &'a N {
        self.doc
    }

    pub fn asset(&self) -> &A {
        &*self.asset
    }

    pub fn asset_mut(&mut self) -> &mut A {
        &mut *self.asset
    }

    pub fn options(&self) -> &ImportOptions {
        self.asset.options()
    }

    fn dict<T>(&self) -> &LazyDict<T>
    where
        A: HasDict<T>,
    {
        HasDict::<T>::dict(&*self.asset)
    }

    fn dict_mut<T>(&mut self) -> &mut LazyDict<T>
    where
        A: HasDict<T>,
    {
        HasDict::<T>::dict_mut(&mut *self.asset)
    }

    /// Materialize the entry at position `index` of `T`'s section, or return
    /// the handle built by an earlier call.
    pub fn retrieve<T>(&mut self, index: usize) -> Result<Ref<T>>
    where
        T: Entity<Asset = A>,
        A: HasDict<T>,
    {
        let dict = self.dict::<T>();
        let key = dict.key();
        let path = format!("{}[{}]", key, index);

        match dict.slot(index) {
            Some(SlotState::Built(arena)) => {
                trace!("{}: cached", path);
                return Ok(dict.handle(arena));
            }
            Some(SlotState::Building) => {
                return Err(AssetError::CyclicReference {
                    chain: vec![path.clone(), path],
                })
            }
            Some(SlotState::Rejected) => {
                return Err(AssetError::Rejected {
                    dict: key.to_string(),
                    index,
                })
            }
            None => {}
        }

        let section = dict.locate(self.doc)?;
        let len = section.len().unwrap_or(0);
        let node = section.element(index).ok_or(AssetError::IndexOutOfRange {
            dict: key.to_string(),
            index,
            len,
        })?;
        if !node.is_object() {
            return Err(AssetError::NotAnObject {
                dict: key.to_string(),
                index,
            });
        }

        if self.options().duplicate_ids == DuplicatePolicy::Skip {
            let first = node
                .attribute("id")
                .and_then(|id| self.dict::<T>().source_ids.get(id).copied())
                .filter(|&first| first != index);
            if let Some(first) = first {
                warn!("{}: duplicate id, using {}[{}]", path, key, first);
                let kept = self.retrieve::<T>(first)?;
                if let Some(arena) = kept.index() {
                    self.dict_mut::<T>()
                        .by_index
                        .insert(index, SlotState::Built(arena as u32));
                }
                return Ok(kept);
            }
        }

        self.dict_mut::<T>().by_index.insert(index, SlotState::Building);
        let built = T::read(node, self).and_then(|value| {
            let derived = match node.attribute("id") {
                Some(id) => id.to_string(),
                None => format!("{}_{}", key, index),
            };
            let id = self.claim_id(derived, T::KIND)?;
            Ok((id, value))
        });

        match built {
            Ok((id, value)) => {
                let meta = EntityMeta {
                    id,
                    name: node.attribute("name").map(str::to_string),
                    source_index: Some(index),
                };
                let dict = self.dict_mut::<T>();
                dict.by_index.remove(&index);
                Ok(dict.push(meta, value))
            }
            Err(err) => {
                self.dict_mut::<T>().by_index.insert(index, SlotState::Rejected);
                Err(err.at(path))
            }
        }
    }

    /// Materialize the entry whose `id` attribute is `id`.
    pub fn retrieve_id<T>(&mut self, id: &str) -> Result<Ref<T>>
    where
        T: Entity<Asset = A>,
        A: HasDict<T>,
    {
        let found = self.dict::<T>().get_id(id);
        if !found.is_null() {
            return Ok(found);
        }

        let wanted = T::translate_id(id);
        let dict = self.dict::<T>();
        if let Some(&index) = dict.source_ids.get(wanted.as_ref()) {
            return self.retrieve(index);
        }
        dict.locate(self.doc)?;
        Err(AssetError::unresolved(T::KIND, wanted.into_owned()))
    }

    /// Retrieve the entry named by the index member `key` of `node`, if the
    /// member is present and is an unsigned integer.
    pub fn retrieve_member<T>(&mut self, node: &N, key: &str) -> Result<Option<Ref<T>>>
    where
        T: Entity<Asset = A>,
        A: HasDict<T>,
    {
        match node.find_index(key) {
            Some(index) => self.retrieve(index).map(Some),
            None => Ok(None),
        }
    }

    /// Retrieve every entry named by the index array member `key` of `node`.
    /// Elements that are not unsigned integers are ignored.
    pub fn retrieve_all<T>(&mut self, node: &N, key: &str) -> Result<Vec<Ref<T>>>
    where
        T: Entity<Asset = A>,
        A: HasDict<T>,
    {
        let Some(arr) = node.find_array(key) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(arr.len().unwrap_or(0));
        for index in arr.elements().filter_map(|v| v.as_u64()) {
            out.push(self.retrieve(index as usize)?);
        }
        Ok(out)
    }

    /// Register `id` in the asset, applying the duplicate policy on collision.
    /// Duplicates within one section were already folded into the first entry
    /// under `Skip`, so a collision here is with another section and is
    /// renamed.
    fn claim_id(&mut self, id: String, kind: &str) -> Result<String> {
        let policy = self.asset.options().duplicate_ids;
        if !self.asset.ids().contains(&id) {
            self.asset.ids_mut().register(id.clone())?;
            return Ok(id);
        }
        match policy {
            DuplicatePolicy::Reject => Err(AssetError::DuplicateId { id }),
            DuplicatePolicy::Skip | DuplicatePolicy::Rename => {
                let fresh = self.asset.find_unique_id(&id, kind);
                warn!("duplicate id \"{}\" stored as \"{}\"", id, fresh);
                self.asset.ids_mut().register(fresh.clone())?;
                Ok(fresh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[derive(Debug)]
    struct Mesh {
        vertex_count: u64,
    }

    #[derive(Debug)]
    struct Node {
        mesh: Option<Ref<Mesh>>,
        children: Vec<Ref<Node>>,
    }

    struct TestAsset {
        ids: IdRegistry,
        options: ImportOptions,
        meshes: LazyDict<Mesh>,
        nodes: LazyDict<Node>,
    }

    impl TestAsset {
        fn new(options: ImportOptions) -> Self {
            Self {
                ids: IdRegistry::new(),
                options,
                meshes: LazyDict::new(DictId(0), "meshes", None),
                nodes: LazyDict::new(DictId(1), "nodes", None),
            }
        }

        fn attach(&mut self, doc: &Value) {
            self.meshes.attach(doc);
            self.nodes.attach(doc);
        }
    }

    impl Store for TestAsset {
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

    impl HasDict<Mesh> for TestAsset {
        fn dict(&self) -> &LazyDict<Mesh> {
            &self.meshes
        }
        fn dict_mut(&mut self) -> &mut LazyDict<Mesh> {
            &mut self.meshes
        }
    }

    impl HasDict<Node> for TestAsset {
        fn dict(&self) -> &LazyDict<Node> {
            &self.nodes
        }
        fn dict_mut(&mut self) -> &mut LazyDict<Node> {
            &mut self.nodes
        }
    }

    impl Entity for Mesh {
        const KIND: &'static str = "mesh";
        type Asset = TestAsset;

        fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, TestAsset>) -> Result<Self> {
            Ok(Mesh {
                vertex_count: node.uint_or("count", 0),
            })
        }
    }

    impl Entity for Node {
        const KIND: &'static str = "node";
        type Asset = TestAsset;

        fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, TestAsset>) -> Result<Self> {
            Ok(Node {
                mesh: cx.retrieve_member(node, "mesh")?,
                children: cx.retrieve_all(node, "children")?,
            })
        }
    }

    fn load(doc: &Value) -> TestAsset {
        let mut asset = TestAsset::new(ImportOptions::default());
        asset.attach(doc);
        asset
    }

    #[test]
    fn test_retrieve_is_idempotent() {
        let doc = json!({"meshes": [{"count": 3}], "nodes": [{"mesh": 0}, {"mesh": 0}]});
        let mut asset = load(&doc);
        let mut cx = Reader::new(&doc, &mut asset);

        let a = cx.retrieve::<Node>(0).unwrap();
        let b = cx.retrieve::<Node>(0).unwrap();
        let c = cx.retrieve::<Node>(1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert_eq!(asset.nodes.len(), 2);
        assert_eq!(asset.meshes.len(), 1);
        assert_eq!(asset.nodes[a].mesh, asset.nodes[c].mesh);
        let mesh = asset.nodes[a].mesh.unwrap();
        assert_eq!(asset.meshes[mesh].vertex_count, 3);
        assert_eq!(asset.meshes.meta(mesh).unwrap().id, "meshes_0");
    }

    #[test]
    fn test_unreachable_entries_are_not_built() {
        let doc = json!({
            "meshes": [{"id": "m0"}, {"id": "m1"}],
            "nodes": [{"mesh": 1}]
        });
        let mut asset = load(&doc);
        Reader::new(&doc, &mut asset).retrieve::<Node>(0).unwrap();

        assert_eq!(asset.meshes.len(), 1);
        assert!(asset.meshes.get(0).is_null());
        assert!(!asset.meshes.get(1).is_null());
        assert_eq!(asset.meshes.get_id("m1"), asset.meshes.get(1));
        assert!(asset.meshes.get_id("m0").is_null());
        assert!(!asset.ids.contains("m0"));
    }

    #[test]
    fn test_missing_section_is_queryable() {
        let doc = json!({"nodes": []});
        let mut asset = load(&doc);
        assert_eq!(asset.meshes.section(), SectionState::Missing);
        assert!(asset.meshes.is_empty());
        assert!(asset.meshes.get(0).is_null());

        let err = Reader::new(&doc, &mut asset)
            .retrieve::<Mesh>(0)
            .unwrap_err();
        assert!(err.is_missing_section());
    }

    #[test]
    fn test_structural_errors() {
        let doc = json!({"meshes": {"a": 1}, "nodes": [5, {"mesh": 9}]});
        let mut asset = TestAsset::new(ImportOptions::default());
        asset.attach(&doc);
        assert_eq!(asset.meshes.section(), SectionState::NotContainer);

        let mut cx = Reader::new(&doc, &mut asset);
        assert!(matches!(
            cx.retrieve::<Mesh>(0),
            Err(AssetError::MalformedSection { .. })
        ));
        assert!(matches!(
            cx.retrieve::<Node>(0),
            Err(AssetError::NotAnObject { index: 0, .. })
        ));
        assert!(matches!(
            cx.retrieve::<Node>(7),
            Err(AssetError::IndexOutOfRange { index: 7, len: 2, .. })
        ));

        let err = cx.retrieve::<Node>(1).unwrap_err();
        assert_eq!(err.path(), Some("nodes[1]"));
        assert!(matches!(err.root_cause(), AssetError::MalformedSection { .. }));
        assert!(matches!(
            cx.retrieve::<Node>(1),
            Err(AssetError::Rejected { index: 1, .. })
        ));
    }

    #[test]
    fn test_reentrant_retrieve_of_same_slot_is_cyclic() {
        let doc = json!({"nodes": [{"children": [1]}, {"children": [0]}]});
        let mut asset = load(&doc);
        let err = Reader::new(&doc, &mut asset)
            .retrieve::<Node>(0)
            .unwrap_err();
        assert!(err.is_cyclic());
        assert_eq!(err.path(), Some("nodes[0] > nodes[1]"));
        assert!(asset.nodes.is_empty());
    }

    #[test]
    fn test_retrieve_id_and_duplicate_policy() {
        let doc = json!({"meshes": [{"id": "m"}, {"id": "m"}]});

        let mut asset = load(&doc);
        let mut cx = Reader::new(&doc, &mut asset);
        let first = cx.retrieve_id::<Mesh>("m").unwrap();
        assert_eq!(cx.retrieve_id::<Mesh>("m").unwrap(), first);
        assert!(cx.retrieve::<Mesh>(1).unwrap_err().is_duplicate_id());
        assert!(cx.retrieve_id::<Mesh>("nope").unwrap_err().is_unresolved());

        let mut asset = TestAsset::new(ImportOptions::new().with_duplicates(DuplicatePolicy::Rename));
        asset.attach(&doc);
        let mut cx = Reader::new(&doc, &mut asset);
        cx.retrieve::<Mesh>(0).unwrap();
        let second = cx.retrieve::<Mesh>(1).unwrap();
        assert_eq!(asset.meshes.meta(second).unwrap().id, "m_mesh");
    }

    #[test]
    fn test_skip_duplicate_reuses_first_entry() {
        let doc = json!({
            "meshes": [{"id": "m", "count": 1}, {"id": "m", "count": 2}],
            "nodes": [{"mesh": 1}]
        });
        let mut asset = TestAsset::new(ImportOptions::new().with_duplicates(DuplicatePolicy::Skip));
        asset.attach(&doc);
        let mut cx = Reader::new(&doc, &mut asset);
        let node = cx.retrieve::<Node>(0).unwrap();
        let second = cx.retrieve::<Mesh>(1).unwrap();
        let first = cx.retrieve::<Mesh>(0).unwrap();

        assert_eq!(first, second);
        assert_eq!(asset.nodes[node].mesh, Some(first));
        assert_eq!(asset.meshes.len(), 1);
        assert_eq!(asset.meshes[first].vertex_count, 1);
        assert_eq!(asset.meshes.meta(first).unwrap().source_index, Some(0));
        assert_eq!(asset.meshes.get(1), first);
        assert!(!asset.ids.contains("m_mesh"));
    }

    #[test]
    fn test_retrieve_id_uses_first_position() {
        let doc = json!({"meshes": [{"id": "a"}, {"id": "b", "count": 4}, {"id": "b"}]});
        let mut asset = load(&doc);
        let mut cx = Reader::new(&doc, &mut asset);
        let b = cx.retrieve_id::<Mesh>("b").unwrap();
        assert_eq!(asset.meshes.get(1), b);
        assert_eq!(asset.meshes[b].vertex_count, 4);
        assert!(asset.meshes.get(0).is_null());

        let doc = json!({"nodes": []});
        let mut asset = load(&doc);
        let err = Reader::new(&doc, &mut asset)
            .retrieve_id::<Mesh>("b")
            .unwrap_err();
        assert!(err.is_missing_section());
    }

    #[test]
    fn test_create_rejects_duplicate_ids() {
        let mut asset = TestAsset::new(ImportOptions::default());
        let foo = asset.create("foo", Mesh { vertex_count: 0 }).unwrap();
        assert_eq!(asset.meshes.meta(foo).unwrap().id, "foo");

        let err = asset
            .create("foo", Node { mesh: None, children: Vec::new() })
            .unwrap_err();
        assert!(err.is_duplicate_id());
        assert_eq!(asset.ids.len(), 1);
        assert!(asset.nodes.is_empty());
        assert_eq!(asset.meshes.get(0), foo);
    }

    #[test]
    fn test_foreign_handle_is_not_dereferenced() {
        let mut asset = TestAsset::new(ImportOptions::default());
        let m = asset.create("m", Mesh { vertex_count: 1 }).unwrap();
        let other: LazyDict<Mesh> = LazyDict::new(DictId(9), "other", None);
        assert!(other.try_get(m).is_none());
        assert!(asset.meshes.try_get(Ref::null()).is_none());
    }
}
