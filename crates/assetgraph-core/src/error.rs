//! Error types for assetgraph.

use thiserror::Error;

/// Result type for asset graph operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Errors raised while assembling or building an asset graph.
///
/// Structural errors carry the dictionary and index or ID they were raised
/// for. Errors raised inside an entity's `read` step are wrapped in
/// [`AssetError::Located`] on the way out so the caller sees the document
/// path that led to them.
#[derive(Debug, Error)]
pub enum AssetError {
    /// A dictionary has no backing section in the document.
    #[error("missing section \"{dict}\"")]
    MissingSection {
        /// Dictionary key.
        dict: String,
    },

    /// The backing section exists but is not the expected container shape.
    #[error("section \"{dict}\" is not {expected}")]
    MalformedSection {
        /// Dictionary key.
        dict: String,
        /// Shape that was expected ("an array", "an object", ...).
        expected: &'static str,
    },

    /// A positional reference points past the end of its dictionary.
    #[error("index {index} out of range for \"{dict}\" ({len} entries)")]
    IndexOutOfRange {
        /// Dictionary key.
        dict: String,
        /// Requested index.
        index: usize,
        /// Number of entries in the section.
        len: usize,
    },

    /// The element at a positional index is not a record.
    #[error("entry {index} of \"{dict}\" is not an object")]
    NotAnObject {
        /// Dictionary key.
        dict: String,
        /// Offending index.
        index: usize,
    },

    /// An ID was registered twice in the same asset.
    #[error("two objects with the same id \"{id}\"")]
    DuplicateId {
        /// The colliding ID.
        id: String,
    },

    /// A reference chain looped back on itself or exceeded its step cap.
    #[error("cyclic reference: {}", .chain.join(" -> "))]
    CyclicReference {
        /// The IDs visited, ending with the one that closed the loop.
        chain: Vec<String>,
    },

    /// A reference named an ID that exists nowhere in the document.
    #[error("unresolved {kind} reference \"{id}\"")]
    UnresolvedReference {
        /// What kind of reference it was ("mesh", "joint", ...).
        kind: String,
        /// The ID that could not be found.
        id: String,
    },

    /// An entry failed to read earlier and was dropped.
    #[error("entry {index} of \"{dict}\" was rejected")]
    Rejected {
        /// Dictionary key.
        dict: String,
        /// Rejected index.
        index: usize,
    },

    /// A URL-style reference is not of the form `#id`.
    #[error("unknown reference format \"{0}\"")]
    MalformedReference(String),

    /// Invalid data in the document.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Unsupported feature or version.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// XML tokenizer error.
    #[error("xml error: {0}")]
    Xml(String),

    /// An error raised while materializing the entry at `path`.
    #[error("{path}: {source}")]
    Located {
        /// Document path of the entry, e.g. `nodes[3]`.
        path: String,
        /// The underlying error.
        #[source]
        source: Box<AssetError>,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl AssetError {
    /// Create an invalid-data error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Create an unresolved-reference error.
    pub fn unresolved(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Wrap this error with the document path it was raised under.
    pub fn at(self, path: impl Into<String>) -> Self {
        match self {
            Self::Located { path: inner, source } => Self::Located {
                path: format!("{} > {}", path.into(), inner),
                source,
            },
            other => Self::Located {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with every [`AssetError::Located`] wrapper removed.
    pub fn root_cause(&self) -> &AssetError {
        match self {
            Self::Located { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The document path attached to this error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Located { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_missing_section(&self) -> bool {
        matches!(self.root_cause(), Self::MissingSection { .. })
    }

    pub fn is_duplicate_id(&self) -> bool {
        matches!(self.root_cause(), Self::DuplicateId { .. })
    }

    pub fn is_cyclic(&self) -> bool {
        matches!(self.root_cause(), Self::CyclicReference { .. })
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.root_cause(), Self::UnresolvedReference { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_paths_nest() {
        let err = AssetError::MissingSection {
            dict: "buffers".into(),
        }
        .at("bufferViews[0]")
        .at("accessors[2]");

        assert_eq!(err.path(), Some("accessors[2] > bufferViews[0]"));
        assert!(err.is_missing_section());
        assert_eq!(
            err.to_string(),
            "accessors[2] > bufferViews[0]: missing section \"buffers\""
        );
    }

    #[test]
    fn test_cycle_message() {
        let err = AssetError::CyclicReference {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic reference: a -> b -> a");
        assert!(err.is_cyclic());
    }
}
