//! ID-keyed symbol tables for library-style documents.

use crate::error::{AssetError, Result};
use crate::options::DuplicatePolicy;
use crate::registry::unique_id;
use indexmap::IndexMap;
use log::warn;

/// Outcome of inserting into a [`SymbolTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    /// Stored under the requested ID.
    Stored(String),
    /// Stored under a fresh ID because the requested one was taken.
    Renamed(String),
    /// Dropped because the ID was taken.
    Skipped,
}

/// Raw entries of one category, keyed by textual ID in document order.
#[derive(Debug, Clone)]
pub struct SymbolTable<E> {
    name: &'static str,
    entries: IndexMap<String, E>,
}

impl<E> SymbolTable<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Insert an entry, resolving an ID collision with `policy`.
    pub fn insert(&mut self, id: &str, entry: E, policy: DuplicatePolicy) -> Result<Inserted> {
        if !self.entries.contains_key(id) {
            self.entries.insert(id.to_string(), entry);
            return Ok(Inserted::Stored(id.to_string()));
        }

        match policy {
            DuplicatePolicy::Reject => Err(AssetError::DuplicateId { id: id.to_string() }),
            DuplicatePolicy::Skip => {
                warn!("{}: skipping entry with duplicate id \"{}\"", self.name, id);
                Ok(Inserted::Skipped)
            }
            DuplicatePolicy::Rename => {
                let fresh = unique_id(id, "dup", |c| self.entries.contains_key(c));
                warn!("{}: renaming duplicate id \"{}\" to \"{}\"", self.name, id, fresh);
                self.entries.insert(fresh.clone(), entry);
                Ok(Inserted::Renamed(fresh))
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&E> {
        self.entries.get(id)
    }

    /// Positional index of an ID.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &E)> {
        self.entries
            .get_index(index)
            .map(|(id, e)| (id.as_str(), e))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &E)> {
        self.entries.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// Consume the table, yielding entries in insertion order.
    pub fn into_entries(self) -> impl Iterator<Item = (String, E)> {
        self.entries.into_iter()
    }
}

/// Strip the leading `#` from a URL-fragment reference.
pub fn translate_url(url: &str) -> Result<&str> {
    url.strip_prefix('#')
        .ok_or_else(|| AssetError::MalformedReference(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_keeps_first() {
        let mut table = SymbolTable::new("geometries");
        table.insert("g", 1, DuplicatePolicy::Reject).unwrap();
        let err = table.insert("g", 2, DuplicatePolicy::Reject).unwrap_err();
        assert!(err.is_duplicate_id());
        assert_eq!(table.get("g"), Some(&1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_skip_and_rename() {
        let mut table = SymbolTable::new("geometries");
        table.insert("g", 1, DuplicatePolicy::Skip).unwrap();
        assert_eq!(table.insert("g", 2, DuplicatePolicy::Skip).unwrap(), Inserted::Skipped);
        assert_eq!(
            table.insert("g", 3, DuplicatePolicy::Rename).unwrap(),
            Inserted::Renamed("g_dup".into())
        );
        assert_eq!(
            table.insert("g", 4, DuplicatePolicy::Rename).unwrap(),
            Inserted::Renamed("g_dup_0".into())
        );
        let ids: Vec<_> = table.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["g", "g_dup", "g_dup_0"]);
        assert_eq!(table.position("g_dup"), Some(1));
    }

    #[test]
    fn test_translate_url() {
        assert_eq!(translate_url("#mesh-1").unwrap(), "mesh-1");
        assert!(matches!(
            translate_url("mesh-1"),
            Err(AssetError::MalformedReference(_))
        ));
    }
}
