//! Data sources: typed arrays, the accessors that view them, and the input
//! channels that bind accessors to vertex semantics.
//!
//! Sources are local to the geometry or controller that declares them and
//! are kept in two symbol tables, one for arrays and one for accessors,
//! keyed by the IDs the document uses to reference them.

use crate::entities::children;
use crate::text;
use assetgraph_core::{translate_url, AssetError, DuplicatePolicy, Result, SymbolTable, TreeNode};
use glam::Mat4;
use log::warn;

/// The contents of a `float_array`, `Name_array` or `IDREF_array`.
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    Float(Vec<f32>),
    Name(Vec<String>),
    IdRef(Vec<String>),
}

impl DataArray {
    fn read<N: TreeNode>(node: &N, tag: &str) -> Result<Self> {
        let content = node.text().unwrap_or_default();
        let count = node
            .attribute("count")
            .map(|c| {
                c.parse::<usize>()
                    .map_err(|_| AssetError::invalid(format!("<{}> count \"{}\"", tag, c)))
            })
            .transpose()?;

        let array = match tag {
            "float_array" => DataArray::Float(text::floats(content)?),
            "Name_array" => DataArray::Name(content.split_whitespace().map(str::to_string).collect()),
            _ => DataArray::IdRef(content.split_whitespace().map(str::to_string).collect()),
        };
        match count {
            Some(count) if array.len() < count => Err(AssetError::invalid(format!(
                "<{}> declares {} values, found {}",
                tag,
                count,
                array.len()
            ))),
            Some(count) => Ok(array.truncated(count)),
            None => Ok(array),
        }
    }

    fn truncated(self, count: usize) -> Self {
        match self {
            DataArray::Float(mut v) => {
                v.truncate(count);
                DataArray::Float(v)
            }
            DataArray::Name(mut v) => {
                v.truncate(count);
                DataArray::Name(v)
            }
            DataArray::IdRef(mut v) => {
                v.truncate(count);
                DataArray::IdRef(v)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DataArray::Float(v) => v.len(),
            DataArray::Name(v) | DataArray::IdRef(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A strided view over a data array.
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    /// ID of the viewed array.
    pub array: String,
    pub count: usize,
    pub offset: usize,
    pub stride: usize,
    /// Values per element, summed over params (`float4x4` counts 16).
    pub size: usize,
    pub params: Vec<Option<String>>,
    /// Position of the X/Y/Z/W-like components within one element.
    pub sub_offsets: [usize; 4],
}

impl Accessor {
    fn read<N: TreeNode>(node: &N) -> Result<Self> {
        let array = translate_url(node.attribute("source").unwrap_or_default())?.to_string();
        let uint = |name: &str, default: usize| -> Result<usize> {
            match node.attribute(name) {
                Some(v) => v
                    .parse()
                    .map_err(|_| AssetError::invalid(format!("accessor {} \"{}\"", name, v))),
                None => Ok(default),
            }
        };

        let mut accessor = Accessor {
            array,
            count: uint("count", 0)?,
            offset: uint("offset", 0)?,
            stride: uint("stride", 1)?,
            size: 0,
            params: Vec::new(),
            sub_offsets: [0, 1, 2, 3],
        };

        for param in children(node, "param") {
            let name = param.attribute("name").filter(|n| !n.is_empty());
            let component = match name {
                Some("X" | "R" | "S" | "U") => Some(0),
                Some("Y" | "G" | "T" | "V") => Some(1),
                Some("Z" | "B" | "P") => Some(2),
                Some("A") => Some(3),
                _ => None,
            };
            if let Some(c) = component {
                accessor.sub_offsets[c] = accessor.params.len();
            }
            accessor.size += match param.attribute("type") {
                Some("float4x4") => 16,
                _ => 1,
            };
            accessor.params.push(name.map(str::to_string));
        }
        Ok(accessor)
    }

    fn check_bounds(&self, id: &str, data_len: usize) -> Result<()> {
        if self.count == 0 {
            return Ok(());
        }
        if self.stride == 0 && self.count > 1 {
            return Err(AssetError::invalid(format!("accessor \"{}\" has a stride of 0", id)));
        }
        let needed = (self.count - 1)
            .checked_mul(self.stride)
            .and_then(|n| n.checked_add(self.offset))
            .and_then(|n| n.checked_add(self.size.max(1)));
        match needed {
            Some(needed) if needed <= data_len => Ok(()),
            Some(needed) => Err(AssetError::invalid(format!(
                "accessor \"{}\" reads {} values from an array of {}",
                id, needed, data_len
            ))),
            None => Err(AssetError::invalid(format!(
                "accessor \"{}\" range overflows: count {}, stride {}, offset {}",
                id, self.count, self.stride, self.offset
            ))),
        }
    }

    fn base(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(AssetError::invalid(format!(
                "data index {} out of range for accessor of {} elements",
                index, self.count
            )));
        }
        Ok(self.offset + index * self.stride)
    }
}

/// Vertex semantic of an input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    /// Refers to the mesh's `<vertices>` element.
    Vertex,
    Position,
    Normal,
    Texcoord,
    Color,
    Tangent,
    Bitangent,
}

impl Semantic {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "VERTEX" => Some(Self::Vertex),
            "POSITION" => Some(Self::Position),
            "NORMAL" => Some(Self::Normal),
            "TEXCOORD" => Some(Self::Texcoord),
            "COLOR" => Some(Self::Color),
            "TANGENT" | "TEXTANGENT" => Some(Self::Tangent),
            "BINORMAL" | "TEXBINORMAL" => Some(Self::Bitangent),
            _ => None,
        }
    }
}

/// An `<input>` binding a source to a semantic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub semantic: Semantic,
    /// Source ID, without the leading `#`.
    pub source: String,
    /// Position within each index tuple.
    pub offset: usize,
    /// Set number for texture coordinates and colors.
    pub set: usize,
}

impl Input {
    /// Read every `<input>` child of `node`. Inputs with unknown semantics
    /// are skipped with a warning.
    pub fn read_all<N: TreeNode>(node: &N) -> Result<Vec<Input>> {
        let mut inputs = Vec::new();
        for input in children(node, "input") {
            let name = input.attribute("semantic").unwrap_or_default();
            let Some(semantic) = Semantic::parse(name) else {
                warn!("ignoring input with semantic \"{}\"", name);
                continue;
            };
            let source = translate_url(input.attribute("source").unwrap_or_default())?;
            let number = |attr: &str| -> Result<usize> {
                input.attribute(attr).map_or(Ok(0), |v| {
                    v.parse()
                        .map_err(|_| AssetError::invalid(format!("input {} \"{}\"", attr, v)))
                })
            };
            inputs.push(Input {
                semantic,
                source: source.to_string(),
                offset: number("offset")?,
                set: number("set")?,
            });
        }
        Ok(inputs)
    }
}

/// Raw `(semantic, source, offset)` inputs, for controllers whose semantics
/// are not vertex attributes.
pub fn raw_inputs<N: TreeNode>(node: &N) -> Result<Vec<(String, String, usize)>> {
    children(node, "input")
        .map(|input| {
            let semantic = input.attribute("semantic").unwrap_or_default().to_string();
            let source = translate_url(input.attribute("source").unwrap_or_default())?.to_string();
            let offset = input.attribute("offset").map_or(Ok(0), |v| {
                v.parse::<usize>()
                    .map_err(|_| AssetError::invalid(format!("input offset \"{}\"", v)))
            })?;
            Ok((semantic, source, offset))
        })
        .collect()
}

/// Index tuple width for inputs at the given offsets.
pub fn tuple_width(offsets: impl Iterator<Item = usize>) -> Result<usize> {
    offsets
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| AssetError::invalid("input offset out of range"))
}

/// Number of indices taken by tuples grouped as `sizes`, each `width` wide.
pub fn index_total(sizes: &[usize], width: usize) -> Result<usize> {
    sizes
        .iter()
        .try_fold(0usize, |acc, &n| acc.checked_add(n))
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| AssetError::invalid("index count overflows"))
}

/// The sources declared by one geometry, controller or animation.
#[derive(Debug, Clone)]
pub struct Sources {
    arrays: SymbolTable<DataArray>,
    accessors: SymbolTable<Accessor>,
}

impl Sources {
    /// Collect every `<source>` child of `parent`.
    pub fn read<N: TreeNode>(parent: &N, policy: DuplicatePolicy) -> Result<Self> {
        let mut sources = Sources {
            arrays: SymbolTable::new("arrays"),
            accessors: SymbolTable::new("accessors"),
        };
        for source in children(parent, "source") {
            let id = source.attribute("id").unwrap_or_default();
            for el in source.elements() {
                let tag = el.tag().unwrap_or_default();
                match tag {
                    "float_array" | "Name_array" | "IDREF_array" => {
                        let array_id = el.attribute("id").unwrap_or(id);
                        sources.arrays.insert(array_id, DataArray::read(el, tag)?, policy)?;
                    }
                    "technique_common" => {
                        if let Some(acc) = el.member("accessor") {
                            sources.accessors.insert(id, Accessor::read(acc)?, policy)?;
                        }
                    }
                    _ => {}
                }
            }
        }

        for (id, accessor) in sources.accessors.iter() {
            let array = sources
                .arrays
                .get(&accessor.array)
                .ok_or_else(|| AssetError::unresolved("array", accessor.array.as_str()))?;
            accessor.check_bounds(id, array.len())?;
        }
        Ok(sources)
    }

    pub fn accessor(&self, id: &str) -> Result<&Accessor> {
        self.accessors
            .get(id)
            .ok_or_else(|| AssetError::unresolved("source", id))
    }

    fn array(&self, accessor: &Accessor) -> Result<&DataArray> {
        self.arrays
            .get(&accessor.array)
            .ok_or_else(|| AssetError::unresolved("array", accessor.array.as_str()))
    }

    /// The float values behind the source `id`.
    pub fn floats(&self, id: &str) -> Result<(&Accessor, &[f32])> {
        let accessor = self.accessor(id)?;
        match self.array(accessor)? {
            DataArray::Float(v) => Ok((accessor, v)),
            _ => Err(AssetError::invalid(format!("source \"{}\" is not a float array", id))),
        }
    }

    /// The string values behind the source `id`, and whether they are IDs
    /// (`IDREF_array`) rather than names or scoped IDs.
    pub fn strings(&self, id: &str) -> Result<(&[String], bool)> {
        let accessor = self.accessor(id)?;
        match self.array(accessor)? {
            DataArray::Name(v) => Ok((v, false)),
            DataArray::IdRef(v) => Ok((v, true)),
            DataArray::Float(_) => Err(AssetError::invalid(format!("source \"{}\" is not a string array", id))),
        }
    }
}

/// Element `index` of a float source as up to four components. Components
/// the accessor does not provide keep the value from `fill`.
pub fn element4(accessor: &Accessor, data: &[f32], index: usize, fill: [f32; 4]) -> Result<[f32; 4]> {
    let base = accessor.base(index)?;
    let mut out = fill;
    for (c, slot) in out.iter_mut().enumerate().take(accessor.size.min(4)) {
        if let Some(&v) = data.get(base + accessor.sub_offsets[c]) {
            *slot = v;
        }
    }
    Ok(out)
}

/// All values of element `index`.
pub fn element<'d>(accessor: &Accessor, data: &'d [f32], index: usize) -> Result<&'d [f32]> {
    let base = accessor.base(index)?;
    data.get(base..base + accessor.size.max(1))
        .ok_or_else(|| AssetError::invalid("element read past end of array"))
}

/// First value of element `index`.
pub fn scalar(accessor: &Accessor, data: &[f32], index: usize) -> Result<f32> {
    let base = accessor.base(index)?;
    data.get(base)
        .copied()
        .ok_or_else(|| AssetError::invalid("scalar read past end of array"))
}

/// Element `index` as a row-major 4x4 matrix.
pub fn matrix(accessor: &Accessor, data: &[f32], index: usize) -> Result<Mat4> {
    let base = accessor.base(index)?;
    let values = data
        .get(base..base + 16)
        .ok_or_else(|| AssetError::invalid("matrix read past end of array"))?;
    let mut cols = [0.0f32; 16];
    cols.copy_from_slice(values);
    Ok(Mat4::from_cols_array(&cols).transpose())
}
