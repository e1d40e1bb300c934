//! Images, samplers and textures.

use super::buffer::BufferView;
use crate::asset::Asset;
use assetgraph_core::data_uri::DataUri;
use assetgraph_core::{Entity, Reader, Ref, Result, TreeNode};

/// Image data: inline, in a buffer view, or an external file left unopened.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub buffer_view: Option<Ref<BufferView>>,
    /// Encoded bytes for data URIs and buffer views. Empty for external files.
    pub data: Vec<u8>,
}

impl Entity for Image {
    const KIND: &'static str = "image";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let mut image = Self {
            mime_type: node.find_string("mimeType").map(str::to_string),
            ..Self::default()
        };

        if let Some(uri) = node.find_string("uri") {
            match DataUri::parse(uri) {
                Some(data_uri) => {
                    if !data_uri.mediatype.is_empty() {
                        image.mime_type = Some(data_uri.mediatype.to_string());
                    }
                    image.data = data_uri.decode()?;
                }
                None => image.uri = Some(uri.to_string()),
            }
        } else if let Some(view) = cx.retrieve_member::<BufferView>(node, "bufferView")? {
            let asset = cx.asset();
            image.data = asset.buffer_views[view].bytes(asset).to_vec();
            image.buffer_view = Some(view);
        }
        Ok(image)
    }
}

pub const FILTER_NEAREST: u32 = 9728;
pub const FILTER_LINEAR: u32 = 9729;
pub const FILTER_NEAREST_MIPMAP_NEAREST: u32 = 9984;
pub const FILTER_NEAREST_MIPMAP_LINEAR: u32 = 9986;
pub const WRAP_CLAMP_TO_EDGE: u32 = 33071;
pub const WRAP_MIRRORED_REPEAT: u32 = 33648;
pub const WRAP_REPEAT: u32 = 10497;

/// Texture sampling state, in GL enum values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: None,
            min_filter: None,
            wrap_s: WRAP_REPEAT,
            wrap_t: WRAP_REPEAT,
        }
    }
}

impl Entity for Sampler {
    const KIND: &'static str = "sampler";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, _cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        Ok(Self {
            mag_filter: node.find_uint("magFilter").map(|v| v as u32),
            min_filter: node.find_uint("minFilter").map(|v| v as u32),
            wrap_s: node.uint_or("wrapS", WRAP_REPEAT as u64) as u32,
            wrap_t: node.uint_or("wrapT", WRAP_REPEAT as u64) as u32,
        })
    }
}

/// An image plus how to sample it.
#[derive(Debug, Clone, Default)]
pub struct Texture {
    pub source: Option<Ref<Image>>,
    pub sampler: Option<Ref<Sampler>>,
}

impl Entity for Texture {
    const KIND: &'static str = "texture";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        Ok(Self {
            source: cx.retrieve_member(node, "source")?,
            sampler: cx.retrieve_member(node, "sampler")?,
        })
    }
}
