//! References recorded during the document walk and resolved afterwards.

use crate::error::{AssetError, Result};
use log::warn;

/// How a deferred reference is treated if it never resolves. The label names
/// the reference in diagnostics ("joint", "skeleton", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Unresolved after the post-pass is fatal.
    Required(&'static str),
    /// Unresolved after the post-pass is logged and left null.
    BestEffort(&'static str),
}

impl RefKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Required(label) | Self::BestEffort(label) => label,
        }
    }
}

/// One deferred reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred<K> {
    /// The object holding the reference.
    pub owner: K,
    /// The referenced ID, or the start of the chain to walk.
    pub target: String,
    pub kind: RefKind,
}

/// Result of one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Unresolved,
}

/// Queue of references waiting for the post-pass.
#[derive(Debug, Clone)]
pub struct DeferredRefs<K> {
    records: Vec<Deferred<K>>,
}

impl<K> Default for DeferredRefs<K> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<K> DeferredRefs<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, owner: K, target: impl Into<String>, kind: RefKind) {
        self.records.push(Deferred {
            owner,
            target: target.into(),
            kind,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take every pending record, in the order they were deferred.
    pub fn drain(&mut self) -> Vec<Deferred<K>> {
        std::mem::take(&mut self.records)
    }

    /// Attempt every pending record with `resolve`.
    ///
    /// A `Required` record that stays unresolved aborts with
    /// `UnresolvedReference`. `BestEffort` ones are logged and returned.
    pub fn resolve_all<F>(&mut self, mut resolve: F) -> Result<Vec<Deferred<K>>>
    where
        F: FnMut(&Deferred<K>) -> Result<Resolution>,
    {
        let mut dropped = Vec::new();
        for record in self.drain() {
            if resolve(&record)? == Resolution::Resolved {
                continue;
            }
            match record.kind {
                RefKind::Required(label) => {
                    return Err(AssetError::unresolved(label, record.target));
                }
                RefKind::BestEffort(label) => {
                    warn!("leaving {} reference \"{}\" unresolved", label, record.target);
                    dropped.push(record);
                }
            }
        }
        Ok(dropped)
    }
}
