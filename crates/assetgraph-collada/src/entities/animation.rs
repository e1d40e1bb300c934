//! Animations and animation clips.
//!
//! An `<animation>` binds samplers over its own sources to the transform
//! elements its channels target. Nested animations only group channels, so
//! they are folded into the library entry that holds them. Channel targets
//! name a node ID and a transform `sid`; they are bound to placed nodes once
//! the scene hierarchy exists.

use super::{children, fragment, optional, url_attr};
use crate::document::ColladaDocument;
use crate::source::{element, raw_inputs, scalar, Sources};
use assetgraph_core::{
    translate_url, AssetError, DuplicatePolicy, Entity, Reader, Ref, Result, TreeNode,
};
use log::{debug, warn};
use std::borrow::Cow;
use std::collections::HashMap;

/// Interpolation between a key and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    Bezier,
    Hermite,
    Cardinal,
    BSpline,
}

impl Interpolation {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "STEP" => Self::Step,
            "LINEAR" => Self::Linear,
            "BEZIER" => Self::Bezier,
            "HERMITE" => Self::Hermite,
            "CARDINAL" => Self::Cardinal,
            "BSPLINE" => Self::BSpline,
            _ => return None,
        })
    }
}

/// The values of the target element a channel writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetMember {
    /// Every value of the element.
    All,
    /// One value, by position in document order.
    Component(usize),
}

/// A channel `target` such as `Arm/rotZ.ANGLE`, `Box/trans` or
/// `Box/transform(0)(3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTarget {
    pub node: String,
    pub sid: String,
    pub member: TargetMember,
}

impl ChannelTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let malformed = || AssetError::invalid(format!("animation target \"{}\"", target));
        let (node, path) = target.split_once('/').ok_or_else(malformed)?;
        // Scoped IDs between the node and the element are not tracked.
        let last = path.rsplit('/').next().unwrap_or(path);

        let (sid, member) = if let Some((sid, member)) = last.split_once('.') {
            let index = match member {
                "X" | "R" | "S" | "U" => 0,
                "Y" | "G" | "T" | "V" => 1,
                "Z" | "B" | "P" => 2,
                "W" | "A" | "Q" | "ANGLE" => 3,
                _ => return Err(malformed()),
            };
            (sid, TargetMember::Component(index))
        } else if let Some((sid, subscript)) = last.split_once('(') {
            let indices = subscript
                .strip_suffix(')')
                .ok_or_else(malformed)?
                .split(")(")
                .map(|i| i.parse::<usize>().map_err(|_| malformed()))
                .collect::<Result<Vec<_>>>()?;
            let index = match indices[..] {
                [i] => i,
                // Matrices are addressed (row)(column) over row-major values.
                [row, column] if row < 4 && column < 4 => row * 4 + column,
                _ => return Err(malformed()),
            };
            (sid, TargetMember::Component(index))
        } else {
            (last, TargetMember::All)
        };

        if node.is_empty() || sid.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            node: node.to_string(),
            sid: sid.to_string(),
            member,
        })
    }

    /// Position of the first value written.
    pub fn first_value(&self) -> usize {
        match self.member {
            TargetMember::All => 0,
            TargetMember::Component(i) => i,
        }
    }
}

/// One sampler bound to one target.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    pub target: ChannelTarget,
    /// Key times in seconds, ascending.
    pub times: Vec<f32>,
    /// `width` output values per key.
    pub values: Vec<f32>,
    pub width: usize,
    /// Per key. Missing entries read as linear.
    pub interpolation: Vec<Interpolation>,
    /// Placed node the target resolves to, bound after the hierarchy is built.
    pub node: Option<usize>,
}

impl AnimationChannel {
    fn key(&self, i: usize) -> &[f32] {
        &self.values[i * self.width..(i + 1) * self.width]
    }

    /// Output values at `time`. Times outside the keys hold the first or
    /// last value.
    pub fn sample(&self, time: f32) -> Vec<f32> {
        let n = self.times.len();
        if n == 0 {
            return Vec::new();
        }
        let next = self.times.partition_point(|&t| t <= time);
        if next == 0 {
            return self.key(0).to_vec();
        }
        if next == n {
            return self.key(n - 1).to_vec();
        }
        let prev = next - 1;
        let (a, b) = (self.key(prev), self.key(next));
        let interpolation = self.interpolation.get(prev).copied().unwrap_or_default();
        let span = self.times[next] - self.times[prev];
        if interpolation == Interpolation::Step || span <= 0.0 {
            return a.to_vec();
        }
        let f = (time - self.times[prev]) / span;
        a.iter().zip(b).map(|(&a, &b)| a + (b - a) * f).collect()
    }
}

/// A library `<animation>` with the channels of every nested animation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub channels: Vec<AnimationChannel>,
}

fn read_sampler<N: TreeNode>(
    sampler: &N,
    sources: &Sources,
    target: ChannelTarget,
) -> Result<AnimationChannel> {
    let mut input = None;
    let mut output = None;
    let mut interpolation = None;
    for (semantic, source, _) in raw_inputs(sampler)? {
        match semantic.as_str() {
            "INPUT" => input = Some(source),
            "OUTPUT" => output = Some(source),
            "INTERPOLATION" => interpolation = Some(source),
            other => debug!("ignoring sampler input {}", other),
        }
    }
    let input = input.ok_or_else(|| AssetError::invalid("<sampler> has no INPUT"))?;
    let output = output.ok_or_else(|| AssetError::invalid("<sampler> has no OUTPUT"))?;

    let (accessor, data) = sources.floats(&input)?;
    let times = (0..accessor.count)
        .map(|i| scalar(accessor, data, i))
        .collect::<Result<Vec<_>>>()?;

    let (accessor, data) = sources.floats(&output)?;
    if accessor.count != times.len() {
        return Err(AssetError::invalid(format!(
            "sampler has {} key times but {} values",
            times.len(),
            accessor.count
        )));
    }
    let width = accessor.size.max(1);
    let mut values = Vec::with_capacity(times.len() * width);
    for i in 0..accessor.count {
        values.extend_from_slice(element(accessor, data, i)?);
    }

    let interpolation = match interpolation {
        Some(id) => sources
            .strings(&id)?
            .0
            .iter()
            .map(|name| {
                Interpolation::parse(name).unwrap_or_else(|| {
                    warn!("unknown interpolation \"{}\", using LINEAR", name);
                    Interpolation::Linear
                })
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(AnimationChannel {
        target,
        times,
        values,
        width,
        interpolation,
        node: None,
    })
}

fn collect_channels<N: TreeNode>(
    node: &N,
    policy: DuplicatePolicy,
    out: &mut Vec<AnimationChannel>,
) -> Result<()> {
    let sources = Sources::read(node, policy)?;
    let samplers: HashMap<&str, &N> = children(node, "sampler")
        .filter_map(|s| Some((s.attribute("id")?, s)))
        .collect();

    for channel in children(node, "channel") {
        let source = translate_url(channel.attribute("source").unwrap_or_default())?;
        let Some(&sampler) = samplers.get(source) else {
            warn!("ignoring channel: no sampler \"{}\"", source);
            continue;
        };
        let target = channel.attribute("target").unwrap_or_default();
        let target = match ChannelTarget::parse(target) {
            Ok(target) => target,
            Err(err) => {
                warn!("ignoring channel: {}", err);
                continue;
            }
        };
        out.push(read_sampler(sampler, &sources, target)?);
    }

    for nested in children(node, "animation") {
        collect_channels(nested, policy, out)?;
    }
    Ok(())
}

impl Entity for Animation {
    const KIND: &'static str = "animation";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let mut channels = Vec::new();
        collect_channels(node, cx.options().duplicate_ids, &mut channels)?;
        Ok(Self { channels })
    }
}

/// An `<animation_clip>`: animations played together over a time range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationClip {
    pub start: f32,
    pub end: Option<f32>,
    pub animations: Vec<Ref<Animation>>,
}

impl Entity for AnimationClip {
    const KIND: &'static str = "animation_clip";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let time = |name: &str| -> Result<Option<f32>> {
            node.attribute(name)
                .map(|v| {
                    v.trim()
                        .parse::<f32>()
                        .map_err(|_| AssetError::invalid(format!("clip {} \"{}\"", name, v)))
                })
                .transpose()
        };
        let mut clip = Self {
            start: time("start")?.unwrap_or(0.0),
            end: time("end")?,
            animations: Vec::new(),
        };
        for instance in children(node, "instance_animation") {
            let url = url_attr(instance, "url")?;
            clip.animations
                .extend(optional(cx.retrieve_id::<Animation>(url), "clip animation")?);
        }
        Ok(clip)
    }
}
