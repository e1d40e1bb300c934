//! Import and export options.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What to do when an entry's ID is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Abort the import with `DuplicateId`.
    #[default]
    Reject,
    /// Keep the first entry and drop later ones with a warning.
    Skip,
    /// Keep both, renaming the later entry to a fresh unique ID.
    Rename,
}

impl DuplicatePolicy {
    /// Parse the string form used in `format_options`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reject" => Some(Self::Reject),
            "skip" => Some(Self::Skip),
            "rename" => Some(Self::Rename),
            _ => None,
        }
    }
}

/// Options for importing a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Step cap for chain resolution (controller indirection, joint parents).
    pub max_chain_depth: usize,
    /// Policy for colliding IDs.
    pub duplicate_ids: DuplicatePolicy,
    /// Whether external files referenced by the document may be opened.
    pub allow_external_resources: bool,
    /// Resolve the first scene when the document names no default scene.
    pub default_scene_fallback: bool,
    /// Format-specific options.
    pub format_options: IndexMap<String, String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            max_chain_depth: 64,
            duplicate_ids: DuplicatePolicy::Reject,
            allow_external_resources: true,
            default_scene_fallback: true,
            format_options: IndexMap::new(),
        }
    }
}

impl ImportOptions {
    /// Create default import options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duplicate-ID policy.
    pub fn with_duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_ids = policy;
        self
    }

    /// Set the chain resolution step cap.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Refuse to open external files.
    pub fn sandboxed(mut self) -> Self {
        self.allow_external_resources = false;
        self
    }

    /// Only resolve an explicitly declared default scene.
    pub fn without_scene_fallback(mut self) -> Self {
        self.default_scene_fallback = false;
        self
    }

    /// Set a format-specific option.
    pub fn with_format_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.format_options.insert(key.into(), value.into());
        self
    }

    pub fn format_option(&self, key: &str) -> Option<&str> {
        self.format_options.get(key).map(String::as_str)
    }
}

/// Options for exporting an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Use the binary container when the format has one (GLB).
    pub binary: bool,
    /// Pretty-print text output.
    pub pretty: bool,
    /// Embed buffers as data URIs in text output.
    pub embed_buffers: bool,
    /// Generator string written into the asset metadata.
    pub generator: String,
    /// Format-specific options.
    pub format_options: IndexMap<String, String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            binary: false,
            pretty: false,
            embed_buffers: true,
            generator: concat!("assetgraph ", env!("CARGO_PKG_VERSION")).to_string(),
            format_options: IndexMap::new(),
        }
    }
}

impl ExportOptions {
    /// Create default export options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use binary format.
    pub fn binary(mut self) -> Self {
        self.binary = true;
        self
    }

    /// Pretty-print output.
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Set the generator string.
    pub fn with_generator(mut self, generator: impl Into<String>) -> Self {
        self.generator = generator.into();
        self
    }
}
