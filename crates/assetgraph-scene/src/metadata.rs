//! Scene-level metadata.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    /// Source format name, e.g. "glTF" or "COLLADA".
    pub source_format: Option<String>,
    /// Format version as declared by the document.
    pub format_version: Option<String>,
    /// Software that created the file.
    pub generator: Option<String>,
    pub author: Option<String>,
    pub copyright: Option<String>,
    /// Creation date (ISO 8601).
    pub created: Option<String>,
    /// Last modified date (ISO 8601).
    pub modified: Option<String>,
    /// Length of one document unit in meters.
    pub unit_scale: f32,
    pub up_axis: Axis,
    pub custom: IndexMap<String, MetadataValue>,
}

impl Default for SceneMetadata {
    fn default() -> Self {
        Self {
            source_format: None,
            format_version: None,
            generator: None,
            author: None,
            copyright: None,
            created: None,
            modified: None,
            unit_scale: 1.0,
            up_axis: Axis::Y,
            custom: IndexMap::new(),
        }
    }
}

/// Coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Axis {
    X,
    /// glTF and most game engines.
    #[default]
    Y,
    /// CAD tools and Blender.
    Z,
}

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetadataValue>),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::String(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::String(v.to_string())
    }
}
