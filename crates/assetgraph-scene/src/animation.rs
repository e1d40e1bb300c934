//! Keyframed node animation.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One value at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Key<T> {
    /// Seconds from the start of the animation.
    pub time: f32,
    pub value: T,
}

impl<T> Key<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

/// Local transform keys of one node. Key lists are sorted by time and may be
/// empty when the component is not animated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAnimation {
    /// Index of the animated scene node.
    pub node: usize,
    pub translations: Vec<Key<Vec3>>,
    pub rotations: Vec<Key<Quat>>,
    pub scales: Vec<Key<Vec3>>,
}

impl NodeAnimation {
    pub fn new(node: usize) -> Self {
        Self {
            node,
            ..Self::default()
        }
    }

    /// Time of the last key of any component.
    pub fn end_time(&self) -> f32 {
        let last = |times: &mut dyn Iterator<Item = f32>| times.last().unwrap_or(0.0);
        last(&mut self.translations.iter().map(|k| k.time))
            .max(last(&mut self.rotations.iter().map(|k| k.time)))
            .max(last(&mut self.scales.iter().map(|k| k.time)))
    }
}

/// A named set of node animations played together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    /// Length in seconds.
    pub duration: f32,
    pub channels: Vec<NodeAnimation>,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add `channel`, extending the duration to cover it.
    pub fn push(&mut self, channel: NodeAnimation) {
        self.duration = self.duration.max(channel.end_time());
        self.channels.push(channel);
    }

    /// Channel animating `node`, if any.
    pub fn channel(&self, node: usize) -> Option<&NodeAnimation> {
        self.channels.iter().find(|c| c.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_covers_every_channel() {
        let mut anim = Animation::new("walk");
        let mut a = NodeAnimation::new(0);
        a.translations = vec![Key::new(0.0, Vec3::ZERO), Key::new(1.5, Vec3::X)];
        let mut b = NodeAnimation::new(3);
        b.rotations = vec![Key::new(0.0, Quat::IDENTITY), Key::new(2.0, Quat::IDENTITY)];
        anim.push(a);
        anim.push(b);

        assert_eq!(anim.duration, 2.0);
        assert_eq!(anim.channel(3).map(|c| c.rotations.len()), Some(2));
        assert!(anim.channel(1).is_none());
    }
}
