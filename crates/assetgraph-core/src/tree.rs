//! Generic read-only view over a parsed document tree.
//!
//! The resolution engine does not care whether the document was JSON or XML.
//! It needs named-child lookup, positional indexing and typed scalar
//! extraction that reports a type mismatch as `None` rather than an error.

use serde_json::Value;

/// A node in a parsed document.
pub trait TreeNode {
    /// Named child lookup. For JSON this is an object member, for XML the
    /// first child element with the given tag.
    fn member(&self, key: &str) -> Option<&Self>;

    /// Positional child lookup.
    fn element(&self, index: usize) -> Option<&Self>;

    /// Number of positional children, or `None` if the node is not a container.
    fn len(&self) -> Option<usize>;

    fn is_array(&self) -> bool;

    /// Whether this node is a record that can back an entity.
    fn is_object(&self) -> bool;

    fn as_str(&self) -> Option<&str>;

    fn as_f64(&self) -> Option<f64>;

    fn as_u64(&self) -> Option<u64>;

    fn as_bool(&self) -> Option<bool>;

    /// Attribute lookup. Trees without attributes fall back to a string member.
    fn attribute(&self, name: &str) -> Option<&str> {
        self.member(name).and_then(|m| m.as_str())
    }

    /// Character content of the node.
    fn text(&self) -> Option<&str> {
        self.as_str()
    }

    /// Element name. Only trees with named elements (XML) have one.
    fn tag(&self) -> Option<&str> {
        None
    }

    fn is_empty(&self) -> bool {
        self.len().map_or(true, |n| n == 0)
    }

    fn find_member(&self, key: &str) -> Option<&Self> {
        self.member(key)
    }

    fn find_array(&self, key: &str) -> Option<&Self> {
        self.member(key).filter(|m| m.is_array())
    }

    fn find_object(&self, key: &str) -> Option<&Self> {
        self.member(key).filter(|m| m.is_object())
    }

    fn find_string(&self, key: &str) -> Option<&str> {
        self.member(key).and_then(|m| m.as_str())
    }

    fn find_number(&self, key: &str) -> Option<f64> {
        self.member(key).and_then(|m| m.as_f64())
    }

    fn find_uint(&self, key: &str) -> Option<u64> {
        self.member(key).and_then(|m| m.as_u64())
    }

    fn find_bool(&self, key: &str) -> Option<bool> {
        self.member(key).and_then(|m| m.as_bool())
    }

    /// Index-typed member, for positional references.
    fn find_index(&self, key: &str) -> Option<usize> {
        self.find_uint(key).and_then(|v| usize::try_from(v).ok())
    }

    fn number_or(&self, key: &str, default: f64) -> f64 {
        self.find_number(key).unwrap_or(default)
    }

    fn uint_or(&self, key: &str, default: u64) -> u64 {
        self.find_uint(key).unwrap_or(default)
    }

    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.find_bool(key).unwrap_or(default)
    }

    /// Read an array member of exactly `N` numbers.
    fn find_floats<const N: usize>(&self, key: &str) -> Option<[f32; N]> {
        let arr = self.find_array(key)?;
        if arr.len()? != N {
            return None;
        }
        let mut out = [0.0f32; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = arr.element(i)?.as_f64()? as f32;
        }
        Some(out)
    }

    /// Iterate positional children.
    fn elements(&self) -> Elements<'_, Self>
    where
        Self: Sized,
    {
        Elements {
            node: self,
            next: 0,
            len: self.len().unwrap_or(0),
        }
    }
}

/// Iterator over the positional children of a [`TreeNode`].
pub struct Elements<'a, N> {
    node: &'a N,
    next: usize,
    len: usize,
}

impl<'a, N: TreeNode> Iterator for Elements<'a, N> {
    type Item = &'a N;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.len {
            let i = self.next;
            self.next += 1;
            if let Some(el) = self.node.element(i) {
                return Some(el);
            }
        }
        None
    }
}

impl TreeNode for Value {
    fn member(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|o| o.get(key))
    }

    fn element(&self, index: usize) -> Option<&Self> {
        self.as_array().and_then(|a| a.get(index))
    }

    fn len(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.len()),
            Value::Object(o) => Some(o.len()),
            _ => None,
        }
    }

    fn is_array(&self) -> bool {
        Value::is_array(self)
    }

    fn is_object(&self) -> bool {
        Value::is_object(self)
    }

    fn as_str(&self) -> Option<&str> {
        Value::as_str(self)
    }

    fn as_f64(&self) -> Option<f64> {
        Value::as_f64(self)
    }

    fn as_u64(&self) -> Option<u64> {
        Value::as_u64(self)
    }

    fn as_bool(&self) -> Option<bool> {
        Value::as_bool(self)
    }
}
