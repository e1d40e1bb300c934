//! Reference handles into lazy dictionaries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identity of one dictionary within one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DictId(pub u16);

/// A copyable handle naming "object N in dictionary D".
///
/// The index is the object's slot in the dictionary's arena (construction
/// order), not its position in the source document. All cross-entity links
/// are handles, so cyclic graphs (node parents, skins and joints) need no
/// owning pointers.
pub struct Ref<T> {
    dict: DictId,
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

const NULL_INDEX: u32 = u32::MAX;

impl<T> Ref<T> {
    pub(crate) fn new(dict: DictId, index: u32) -> Self {
        Self {
            dict,
            index,
            _marker: PhantomData,
        }
    }

    /// The unresolved handle.
    pub const fn null() -> Self {
        Self {
            dict: DictId(u16::MAX),
            index: NULL_INDEX,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_INDEX
    }

    /// Arena index, or `None` for the null handle.
    pub fn index(&self) -> Option<usize> {
        (!self.is_null()).then_some(self.index as usize)
    }

    pub fn dict(&self) -> DictId {
        self.dict
    }

    /// `Some(self)` unless null.
    pub fn resolved(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.index == other.index
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dict.hash(state);
        self.index.hash(state);
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Ref(null)")
        } else {
            write!(f, "Ref({}:{})", self.dict.0, self.index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mesh;

    #[test]
    fn test_null_handle() {
        let r: Ref<Mesh> = Ref::null();
        assert!(r.is_null());
        assert_eq!(r.index(), None);
        assert_eq!(r, Ref::default());
        assert_eq!(format!("{:?}", r), "Ref(null)");
    }

    #[test]
    fn test_handles_compare_by_dict_and_index() {
        let a: Ref<Mesh> = Ref::new(DictId(1), 0);
        let b: Ref<Mesh> = Ref::new(DictId(1), 0);
        let c: Ref<Mesh> = Ref::new(DictId(2), 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.index(), Some(0));
        assert_eq!(format!("{:?}", a), "Ref(1:0)");
    }
}
