//! assetgraph-core: the lazy reference-resolving asset graph engine.
//!
//! Format readers parse a document into a tree (JSON, XML, ...) and describe
//! each object kind as an [`Entity`] stored in a [`LazyDict`]. Resolving a
//! root reference through a [`Reader`] materializes exactly the objects
//! reachable from it, each once, with cross-links expressed as [`Ref`]
//! handles.
//!
//! # Example
//!
//! ```ignore
//! use assetgraph_core::{Reader, ImportOptions};
//!
//! let mut asset = MyAsset::new(ImportOptions::default());
//! asset.attach(&doc);
//! let root = Reader::new(&doc, &mut asset).retrieve::<Scene>(0)?;
//! ```
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`tree`] | Read-only view over a parsed document |
//! | [`handle`] | Typed reference handles |
//! | [`dict`] | Lazy dictionaries and the resolution context |
//! | [`registry`] | Asset-wide unique ID allocation |
//! | [`symbols`] | ID-keyed symbol tables for library-style documents |
//! | [`chain`] | Chain resolution with cycle detection |
//! | [`deferred`] | References resolved after the document walk |
//! | [`data_uri`] | Inline `data:` payloads |
//! | [`io`] | Opening external resources |

pub mod chain;
pub mod data_uri;
pub mod deferred;
pub mod dict;
pub mod error;
pub mod handle;
pub mod io;
pub mod options;
pub mod registry;
pub mod symbols;
pub mod tree;

pub use chain::follow_chain;
pub use deferred::{Deferred, DeferredRefs, RefKind, Resolution};
pub use dict::{Entity, EntityMeta, HasDict, LazyDict, Reader, SectionState, Store};
pub use error::{AssetError, Result};
pub use handle::{DictId, Ref};
pub use io::{FsLoader, MemoryLoader, NoLoader, ResourceLoader};
pub use options::{DuplicatePolicy, ExportOptions, ImportOptions};
pub use registry::IdRegistry;
pub use symbols::{translate_url, Inserted, SymbolTable};
pub use tree::TreeNode;
