//! Buffers, buffer views and accessors, plus typed extraction of accessor data.

use crate::asset::Asset;
use assetgraph_core::data_uri::DataUri;
use assetgraph_core::{AssetError, Entity, Reader, Ref, Result, TreeNode};
use glam::{Mat4, Vec2, Vec3, Vec4};
use log::debug;

/// A block of binary data: a data URI, an external file, or the GLB body.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    /// Source URI for external buffers. `None` for data URIs and the GLB body.
    pub uri: Option<String>,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn byte_length(&self) -> usize {
        self.data.len()
    }
}

impl Entity for Buffer {
    const KIND: &'static str = "buffer";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let stated = node.uint_or("byteLength", 0) as usize;

        let Some(uri) = node.find_string("uri") else {
            if let Some(mut body) = cx.asset_mut().take_body() {
                if body.len() < stated {
                    return Err(AssetError::invalid(format!(
                        "binary chunk holds {} bytes, byteLength is {}",
                        body.len(),
                        stated
                    )));
                }
                if stated > 0 {
                    body.truncate(stated);
                }
                return Ok(Self {
                    uri: None,
                    data: body,
                });
            }
            if stated > 0 {
                return Err(AssetError::invalid("buffer has no uri"));
            }
            return Ok(Self::default());
        };

        if let Some(data_uri) = DataUri::parse(uri) {
            let data = data_uri.decode()?;
            let checked = stated > 0 || !data_uri.base64;
            if checked && data.len() != stated {
                return Err(AssetError::invalid(format!(
                    "data URI holds {} bytes, byteLength is {}",
                    data.len(),
                    stated
                )));
            }
            return Ok(Self { uri: None, data });
        }

        if !cx.options().allow_external_resources {
            return Err(AssetError::Unsupported(format!(
                "external buffer \"{}\" with external resources disabled",
                uri
            )));
        }
        let mut data = cx
            .asset()
            .loader()
            .open(uri)?
            .ok_or_else(|| AssetError::invalid(format!("could not open referenced file \"{}\"", uri)))?;
        if stated > 0 {
            if data.len() < stated {
                return Err(AssetError::invalid(format!(
                    "\"{}\" holds {} bytes, byteLength is {}",
                    uri,
                    data.len(),
                    stated
                )));
            }
            data.truncate(stated);
        }
        debug!("loaded external buffer \"{}\" ({} bytes)", uri, data.len());
        Ok(Self {
            uri: Some(uri.to_string()),
            data,
        })
    }
}

/// Buffer view target hint.
pub const TARGET_ARRAY_BUFFER: u32 = 34962;
pub const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// A contiguous byte range of a buffer.
#[derive(Debug, Clone)]
pub struct BufferView {
    pub buffer: Ref<Buffer>,
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Distance between elements. `None` means tightly packed.
    pub byte_stride: Option<usize>,
    pub target: Option<u32>,
}

impl BufferView {
    /// The bytes this view covers.
    pub fn bytes<'a>(&self, asset: &'a Asset) -> &'a [u8] {
        let data = &asset.buffers[self.buffer].data;
        let end = (self.byte_offset + self.byte_length).min(data.len());
        &data[self.byte_offset.min(end)..end]
    }
}

impl Entity for BufferView {
    const KIND: &'static str = "bufferView";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let buffer = cx
            .retrieve_member::<Buffer>(node, "buffer")?
            .ok_or_else(|| AssetError::invalid("buffer view has no buffer"))?;
        let byte_offset = node.uint_or("byteOffset", 0) as usize;
        let byte_length = node.uint_or("byteLength", 0) as usize;

        let available = cx.asset().buffers[buffer].byte_length();
        if byte_offset
            .checked_add(byte_length)
            .map_or(true, |end| end > available)
        {
            return Err(AssetError::invalid(format!(
                "range {}+{} exceeds buffer length {}",
                byte_offset, byte_length, available
            )));
        }

        Ok(Self {
            buffer,
            byte_offset,
            byte_length,
            byte_stride: node.find_uint("byteStride").filter(|&s| s > 0).map(|s| s as usize),
            target: node.find_uint("target").map(|t| t as u32),
        })
    }
}

/// Scalar type of accessor components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn from_gl(value: u32) -> Option<Self> {
        Some(match value {
            5120 => Self::I8,
            5121 => Self::U8,
            5122 => Self::I16,
            5123 => Self::U16,
            5125 => Self::U32,
            5126 => Self::F32,
            _ => return None,
        })
    }

    pub fn to_gl(self) -> u32 {
        match self {
            Self::I8 => 5120,
            Self::U8 => 5121,
            Self::I16 => 5122,
            Self::U16 => 5123,
            Self::U32 => 5125,
            Self::F32 => 5126,
        }
    }

    /// Size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32)
    }

    /// Decode one component from exactly `self.size()` bytes.
    fn decode(self, b: &[u8], normalized: bool) -> f32 {
        match self {
            Self::I8 => {
                let v = b[0] as i8 as f32;
                if normalized {
                    (v / 127.0).max(-1.0)
                } else {
                    v
                }
            }
            Self::U8 => {
                let v = b[0] as f32;
                if normalized {
                    v / 255.0
                } else {
                    v
                }
            }
            Self::I16 => {
                let v = i16::from_le_bytes([b[0], b[1]]) as f32;
                if normalized {
                    (v / 32767.0).max(-1.0)
                } else {
                    v
                }
            }
            Self::U16 => {
                let v = u16::from_le_bytes([b[0], b[1]]) as f32;
                if normalized {
                    v / 65535.0
                } else {
                    v
                }
            }
            Self::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            Self::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }

    fn decode_uint(self, b: &[u8]) -> u32 {
        match self {
            Self::U8 => b[0] as u32,
            Self::U16 => u16::from_le_bytes([b[0], b[1]]) as u32,
            _ => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        }
    }
}

/// Shape of one accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "SCALAR" => Self::Scalar,
            "VEC2" => Self::Vec2,
            "VEC3" => Self::Vec3,
            "VEC4" => Self::Vec4,
            "MAT2" => Self::Mat2,
            "MAT3" => Self::Mat3,
            "MAT4" => Self::Mat4,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Vec2 => "VEC2",
            Self::Vec3 => "VEC3",
            Self::Vec4 => "VEC4",
            Self::Mat2 => "MAT2",
            Self::Mat3 => "MAT3",
            Self::Mat4 => "MAT4",
        }
    }

    /// Components per element.
    pub fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// A typed view of buffer data.
#[derive(Debug, Clone)]
pub struct Accessor {
    /// `None` means every element is zero.
    pub buffer_view: Option<Ref<BufferView>>,
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub count: usize,
    pub element_type: ElementType,
    pub normalized: bool,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Accessor {
    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.element_type.components()
    }

    /// Bytes between consecutive elements.
    pub fn stride(&self, view: &BufferView) -> usize {
        view.byte_stride.unwrap_or_else(|| self.element_size())
    }
}

/// Largest zero-filled accessor read without a buffer view.
const MAX_ZERO_FILL_BYTES: usize = 64 << 20;

fn read_bounds<N: TreeNode>(node: &N, key: &str) -> Vec<f64> {
    node.find_array(key)
        .map(|arr| arr.elements().filter_map(|v| v.as_f64()).collect())
        .unwrap_or_default()
}

impl Entity for Accessor {
    const KIND: &'static str = "accessor";
    type Asset = Asset;

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, Asset>) -> Result<Self> {
        let buffer_view = cx.retrieve_member::<BufferView>(node, "bufferView")?;

        let raw_type = node
            .find_uint("componentType")
            .ok_or_else(|| AssetError::invalid("accessor has no componentType"))?;
        let component_type = ComponentType::from_gl(raw_type as u32)
            .ok_or_else(|| AssetError::Unsupported(format!("component type {}", raw_type)))?;

        let type_name = node.find_string("type").unwrap_or("SCALAR");
        let element_type = ElementType::from_name(type_name)
            .ok_or_else(|| AssetError::invalid(format!("unknown accessor type \"{}\"", type_name)))?;

        let accessor = Self {
            buffer_view,
            byte_offset: node.uint_or("byteOffset", 0) as usize,
            component_type,
            count: node.uint_or("count", 0) as usize,
            element_type,
            normalized: node.bool_or("normalized", false),
            min: read_bounds(node, "min"),
            max: read_bounds(node, "max"),
        };

        match accessor.buffer_view {
            Some(view) => {
                let view = &cx.asset().buffer_views[view];
                let needed = accessor.required_bytes(view);
                if needed > view.byte_length {
                    return Err(AssetError::invalid(format!(
                        "{} elements need {} bytes, view holds {}",
                        accessor.count, needed, view.byte_length
                    )));
                }
            }
            None => {
                let zeros = accessor.count.checked_mul(accessor.element_size());
                if !zeros.is_some_and(|n| n <= MAX_ZERO_FILL_BYTES) {
                    return Err(AssetError::invalid(format!(
                        "accessor without a buffer view declares {} elements",
                        accessor.count
                    )));
                }
            }
        }
        Ok(accessor)
    }
}

impl Accessor {
    fn required_bytes(&self, view: &BufferView) -> usize {
        match self.count {
            0 => 0,
            n => (n - 1)
                .saturating_mul(self.stride(view))
                .saturating_add(self.byte_offset)
                .saturating_add(self.element_size()),
        }
    }
}

/// Typed accessor extraction.
impl Asset {
    /// Visit the raw bytes of every element of `r`. Returns `false` if the
    /// accessor has no buffer view.
    fn for_each_element<F>(&self, r: Ref<Accessor>, mut visit: F) -> Result<bool>
    where
        F: FnMut(&[u8]),
    {
        let accessor = &self.accessors[r];
        let Some(view) = accessor.buffer_view else {
            return Ok(false);
        };
        let view = &self.buffer_views[view];
        let bytes = view.bytes(self);
        if accessor.required_bytes(view) > bytes.len() {
            return Err(AssetError::invalid("accessor reads past the end of its buffer view"));
        }
        let stride = accessor.stride(view);
        let size = accessor.element_size();
        for i in 0..accessor.count {
            let start = accessor.byte_offset + i * stride;
            visit(&bytes[start..start + size]);
        }
        Ok(true)
    }

    /// All components of `r` as floats, element after element, with
    /// normalization applied.
    pub fn read_floats(&self, r: Ref<Accessor>) -> Result<Vec<f32>> {
        let accessor = &self.accessors[r];
        let (ty, normalized) = (accessor.component_type, accessor.normalized);
        let total = accessor.count.saturating_mul(accessor.element_type.components());
        let mut out = Vec::with_capacity(total);
        let found = self.for_each_element(r, |element| {
            out.extend(element.chunks_exact(ty.size()).map(|c| ty.decode(c, normalized)));
        })?;
        if !found {
            out.resize(total, 0.0);
        }
        Ok(out)
    }

    /// All components of `r` as unsigned integers.
    pub fn read_uints(&self, r: Ref<Accessor>) -> Result<Vec<u32>> {
        let accessor = &self.accessors[r];
        let ty = accessor.component_type;
        if !ty.is_unsigned_int() {
            return Err(AssetError::invalid(format!(
                "expected unsigned integer components, found {:?}",
                ty
            )));
        }
        let total = accessor.count.saturating_mul(accessor.element_type.components());
        let mut out = Vec::with_capacity(total);
        let found = self.for_each_element(r, |element| {
            out.extend(element.chunks_exact(ty.size()).map(|c| ty.decode_uint(c)));
        })?;
        if !found {
            out.resize(total, 0);
        }
        Ok(out)
    }

    fn expect_type(&self, r: Ref<Accessor>, expected: ElementType) -> Result<()> {
        let found = self.accessors[r].element_type;
        if found != expected {
            return Err(AssetError::invalid(format!(
                "expected {} accessor, found {}",
                expected.as_str(),
                found.as_str()
            )));
        }
        Ok(())
    }

    pub fn read_scalars(&self, r: Ref<Accessor>) -> Result<Vec<f32>> {
        self.expect_type(r, ElementType::Scalar)?;
        self.read_floats(r)
    }

    pub fn read_vec2(&self, r: Ref<Accessor>) -> Result<Vec<Vec2>> {
        self.expect_type(r, ElementType::Vec2)?;
        Ok(self.read_floats(r)?.chunks_exact(2).map(Vec2::from_slice).collect())
    }

    pub fn read_vec3(&self, r: Ref<Accessor>) -> Result<Vec<Vec3>> {
        self.expect_type(r, ElementType::Vec3)?;
        Ok(self.read_floats(r)?.chunks_exact(3).map(Vec3::from_slice).collect())
    }

    pub fn read_vec4(&self, r: Ref<Accessor>) -> Result<Vec<Vec4>> {
        self.expect_type(r, ElementType::Vec4)?;
        Ok(self.read_floats(r)?.chunks_exact(4).map(Vec4::from_slice).collect())
    }

    /// Vertex colors. RGB accessors get an alpha of one.
    pub fn read_colors(&self, r: Ref<Accessor>) -> Result<Vec<Vec4>> {
        match self.accessors[r].element_type {
            ElementType::Vec3 => Ok(self.read_vec3(r)?.into_iter().map(|c| c.extend(1.0)).collect()),
            _ => self.read_vec4(r),
        }
    }

    pub fn read_mat4(&self, r: Ref<Accessor>) -> Result<Vec<Mat4>> {
        self.expect_type(r, ElementType::Mat4)?;
        Ok(self
            .read_floats(r)?
            .chunks_exact(16)
            .map(Mat4::from_cols_slice)
            .collect())
    }

    /// Index data: unsigned scalars.
    pub fn read_indices(&self, r: Ref<Accessor>) -> Result<Vec<u32>> {
        self.expect_type(r, ElementType::Scalar)?;
        self.read_uints(r)
    }
}
