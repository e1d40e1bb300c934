//! Chain resolution over same-typed "points to" relations.

use crate::error::{AssetError, Result};
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;

/// Follow `next` from `start` until it reports a terminal (`Ok(None)`), and
/// return the last key reached.
///
/// Revisiting a key, or taking more than `max_steps` steps, fails with
/// `CyclicReference` carrying the keys walked so far.
pub fn follow_chain<K, F>(start: K, max_steps: usize, mut next: F) -> Result<K>
where
    K: Clone + Eq + Hash + Display,
    F: FnMut(&K) -> Result<Option<K>>,
{
    let mut visited = HashSet::new();
    let mut walked = vec![start.to_string()];
    visited.insert(start.clone());
    let mut current = start;
    let mut steps = 0;

    loop {
        let Some(k) = next(&current)? else {
            return Ok(current);
        };
        walked.push(k.to_string());
        steps += 1;
        if !visited.insert(k.clone()) || steps > max_steps {
            return Err(AssetError::CyclicReference { chain: walked });
        }
        current = k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn relation(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, &'static str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_controller_chain_resolves_to_mesh() {
        let sources = relation(&[("C1", "C2"), ("C2", "M")]);
        let controllers = ["C1", "C2"];
        let mesh = follow_chain("C1", 64, |k| {
            Ok(controllers
                .contains(k)
                .then(|| sources.get(k).copied())
                .flatten())
        })
        .unwrap();
        assert_eq!(mesh, "M");
    }

    #[test]
    fn test_joint_root_search() {
        let parents = relation(&[("J3", "J2"), ("J2", "J1"), ("J1", "R")]);
        let joints = ["J1", "J2", "J3"];
        let root = follow_chain("J3", 64, |k| {
            let parent = parents.get(k).copied();
            Ok(parent.filter(|_| joints.contains(k)))
        })
        .unwrap();
        assert_eq!(root, "R");
    }

    #[test]
    fn test_cycle_is_detected() {
        let next = relation(&[("A", "B"), ("B", "A")]);
        let err = follow_chain("A", 64, |k| Ok(next.get(k).copied())).unwrap_err();
        assert_eq!(err.to_string(), "cyclic reference: A -> B -> A");
    }

    #[test]
    fn test_step_cap_bounds_long_chains() {
        let err = follow_chain(0u32, 10, |k| Ok(Some(k + 1))).unwrap_err();
        assert!(err.is_cyclic());

        let end = follow_chain(0u32, 10, |k| Ok((*k < 10).then_some(k + 1))).unwrap();
        assert_eq!(end, 10);
    }

    #[test]
    fn test_relation_errors_propagate() {
        let err = follow_chain("A", 4, |k| Err(AssetError::unresolved("mesh", *k))).unwrap_err();
        assert!(err.is_unresolved());
    }
}
