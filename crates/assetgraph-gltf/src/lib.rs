//! assetgraph-gltf: glTF 2.0 on top of the assetgraph resolution engine.
//!
//! An [`Asset`] owns one lazy dictionary per top-level glTF array. Loading a
//! document resolves the default scene and materializes exactly the objects
//! reachable from it, then binds skin joints in a post-pass.
//!
//! # Quick Start
//!
//! ```ignore
//! use assetgraph_core::{ExportOptions, ImportOptions};
//! use assetgraph_gltf::{export, import_file};
//!
//! let scene = import_file("model.glb", ImportOptions::default())?;
//! let glb = export(&scene, &ExportOptions::new().binary())?;
//! ```
//!
//! # Pipeline
//!
//! ```text
//! .gltf/.glb ─> Asset ─> Scene          (import)
//! Scene ─> Asset ─> schema::Document ─> .gltf/.glb   (export)
//! ```

pub mod asset;
pub mod entities;
pub mod export;
pub mod glb;
pub mod import;
pub mod schema;

pub use asset::{Asset, AssetMetadata, ExtensionsUsed};
pub use export::export;
pub use import::{import_file, import_slice};
