//! Asset-wide unique ID registry.

use crate::error::{AssetError, Result};
use indexmap::IndexSet;

/// Every textual ID allocated in one asset, across all dictionaries.
///
/// Append-only for the lifetime of the asset.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    used: IndexSet<String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.used.contains(id)
    }

    /// Register an ID. Fails, leaving the registry unchanged, if it is taken.
    pub fn register(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if self.used.contains(&id) {
            return Err(AssetError::DuplicateId { id });
        }
        self.used.insert(id);
        Ok(())
    }

    /// Pick an ID that is not yet registered.
    ///
    /// Returns `base` when it is non-empty and free. Otherwise appends
    /// `_suffix` (or uses `suffix` alone for an empty base), and if that is
    /// taken too, appends `_0`, `_1`, ... until a free ID is found. The result
    /// is not registered.
    pub fn find_unique_id(&self, base: &str, suffix: &str) -> String {
        unique_id(base, suffix, |id| self.contains(id))
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// IDs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.used.iter().map(String::as_str)
    }
}

/// The allocation rule behind [`IdRegistry::find_unique_id`], for any
/// notion of "taken".
pub fn unique_id(base: &str, suffix: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut id = base.to_string();

    if !id.is_empty() {
        if !is_taken(&id) {
            return id;
        }
        id.push('_');
    }

    id.push_str(suffix);
    if !is_taken(&id) {
        return id;
    }

    (0usize..)
        .map(|i| format!("{}_{}", id, i))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or(id)
}
