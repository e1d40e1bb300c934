//! COLLADA library entries and their `read` steps.

mod animation;
mod controller;
mod effect;
mod geometry;
mod node;
mod optics;

pub use animation::{
    Animation, AnimationChannel, AnimationClip, ChannelTarget, Interpolation, TargetMember,
};
pub use controller::{Controller, ControllerKind, Morph, MorphMethod, Skin};
pub use effect::{ColorOrTexture, Effect, Image, ImageData, Material, OpaqueMode, Shading};
pub use geometry::{Geometry, PrimitiveType, SubMesh, MAX_CHANNELS};
pub use node::{InstanceTarget, MaterialBinding, MeshInstance, Node, VisualScene};
pub use optics::{Camera, Light};

use assetgraph_core::{translate_url, AssetError, Ref, Result, TreeNode};
use log::warn;
use std::borrow::Cow;

/// Child elements of `node` named `tag`, in document order.
pub fn children<'a, N: TreeNode>(node: &'a N, tag: &'a str) -> impl Iterator<Item = &'a N> + 'a {
    node.elements().filter(move |c| c.tag() == Some(tag))
}

/// First element named `tag` anywhere below `node`, depth first.
pub fn descendant<'a, N: TreeNode>(node: &'a N, tag: &str) -> Option<&'a N> {
    for child in node.elements() {
        if child.tag() == Some(tag) {
            return Some(child);
        }
        if let Some(found) = descendant(child, tag) {
            return Some(found);
        }
    }
    None
}

/// Trimmed text of the child `tag`, if present and non-empty.
pub fn child_text<'a, N: TreeNode>(node: &'a N, tag: &str) -> Option<&'a str> {
    node.member(tag)
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Float content of the child `tag`.
pub fn child_float<N: TreeNode>(node: &N, tag: &str) -> Result<Option<f32>> {
    child_text(node, tag)
        .map(|t| {
            t.parse::<f32>()
                .map_err(|_| AssetError::invalid(format!("<{}> is not a number: \"{}\"", tag, t)))
        })
        .transpose()
}

/// The `#id` URL held by `attribute`, checked to be a same-document
/// reference. Lookups drop the `#` through `Entity::translate_id`.
pub fn url_attr<'a, N: TreeNode>(element: &'a N, attribute: &str) -> Result<&'a str> {
    let url = element.attribute(attribute).unwrap_or_default();
    translate_url(url)?;
    Ok(url)
}

/// Library IDs are stored without the `#` that references carry.
pub(crate) fn fragment(id: &str) -> Cow<'_, str> {
    Cow::Borrowed(id.strip_prefix('#').unwrap_or(id))
}

/// Turn a direct unresolved-reference error into a warning and `None`.
/// Errors raised while building the target propagate.
pub(crate) fn optional<T>(found: Result<Ref<T>>, what: &str) -> Result<Option<Ref<T>>> {
    match found {
        Ok(r) => Ok(Some(r)),
        Err(AssetError::UnresolvedReference { id, .. }) => {
            warn!("ignoring {} \"{}\": no such entry", what, id);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
