//! assetgraph-collada: COLLADA 1.4/1.5 on top of the assetgraph resolution
//! engine.
//!
//! The document is folded into an XML tree, then every library entry is
//! collected by ID into a catalog. A [`ColladaDocument`] owns one lazy
//! dictionary per library; loading resolves the scene's visual scene and
//! builds exactly the entries it instances, then follows controller chains
//! and binds skin joints in post-passes.
//!
//! # Quick Start
//!
//! ```ignore
//! use assetgraph_core::ImportOptions;
//! use assetgraph_collada::import_file;
//!
//! let scene = import_file("model.dae", ImportOptions::default())?;
//! ```
//!
//! # Pipeline
//!
//! ```text
//! .dae ─> XmlNode ─> Catalog ─> ColladaDocument ─> Hierarchy ─> Scene
//! ```

pub mod catalog;
pub mod document;
pub mod entities;
pub mod hierarchy;
pub mod import;
pub mod source;
pub mod text;
pub mod transform;
pub mod xml;

#[cfg(test)]
mod fixtures;

pub use catalog::{ColladaVersion, DocumentInfo};
pub use document::ColladaDocument;
pub use hierarchy::{Hierarchy, PlacedMesh, PlacedNode};
pub use import::{import_file, import_slice};
