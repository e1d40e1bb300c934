//! Meshes: sources, `<vertices>` and primitive index lists.
//!
//! Primitive elements index each input separately. Reading de-interleaves
//! every index tuple into one vertex, so all streams of a geometry share one
//! vertex numbering. Each vertex remembers the index it used into the
//! position source, which skin weights and morph targets are keyed by.

use super::{children, fragment};
use crate::document::ColladaDocument;
use crate::source::{element4, index_total, tuple_width, Accessor, Input, Semantic, Sources};
use crate::text;
use assetgraph_core::{AssetError, Entity, Reader, Result, TreeNode};
use glam::{Vec2, Vec3, Vec4};
use log::{debug, warn};
use std::borrow::Cow;

/// Texture coordinate and color sets kept per geometry.
pub const MAX_CHANNELS: usize = 8;

/// The primitive element a submesh was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Lines,
    Triangles,
    Polylist,
    Polygons,
    LineStrips,
    TriFans,
    TriStrips,
}

impl PrimitiveType {
    /// Element tag of this primitive.
    pub fn tag(self) -> &'static str {
        match self {
            PrimitiveType::Lines => "lines",
            PrimitiveType::Triangles => "triangles",
            PrimitiveType::Polylist => "polylist",
            PrimitiveType::Polygons => "polygons",
            PrimitiveType::LineStrips => "linestrips",
            PrimitiveType::TriFans => "trifans",
            PrimitiveType::TriStrips => "tristrips",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "lines" => PrimitiveType::Lines,
            "triangles" => PrimitiveType::Triangles,
            "polylist" => PrimitiveType::Polylist,
            "polygons" => PrimitiveType::Polygons,
            "linestrips" => PrimitiveType::LineStrips,
            "trifans" => PrimitiveType::TriFans,
            "tristrips" => PrimitiveType::TriStrips,
            _ => return None,
        })
    }

    /// Vertices per face when every face has the same size.
    fn fixed_size(self) -> Option<usize> {
        match self {
            PrimitiveType::Lines => Some(2),
            PrimitiveType::Triangles => Some(3),
            _ => None,
        }
    }
}

/// The vertices of one primitive element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubMesh {
    pub primitive: PrimitiveType,
    /// Material symbol, bound per instance by `instance_material`.
    pub material: Option<String>,
    pub first_vertex: usize,
    /// Vertices per face, consumed in order from `first_vertex`. For strips
    /// and fans each entry is the length of one `<p>`.
    pub face_sizes: Vec<usize>,
}

impl SubMesh {
    pub fn vertex_count(&self) -> usize {
        self.face_sizes.iter().sum()
    }

    pub fn vertex_range(&self) -> std::ops::Range<usize> {
        self.first_vertex..self.first_vertex + self.vertex_count()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    /// Values of the position source, in source order.
    pub source_positions: Vec<Vec3>,
    pub positions: Vec<Vec3>,
    /// Empty when no primitive has normals.
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub bitangents: Vec<Vec3>,
    pub texcoords: Vec<Vec<Vec2>>,
    /// `set` number of each texture coordinate channel.
    pub texcoord_sets: Vec<usize>,
    pub colors: Vec<Vec<Vec4>>,
    /// Position source index of every vertex.
    pub position_indices: Vec<usize>,
    pub submeshes: Vec<SubMesh>,
}

struct Channel<'s> {
    semantic: Semantic,
    slot: usize,
    offset: usize,
    accessor: &'s Accessor,
    data: &'s [f32],
}

fn push_at<T: Clone + Default>(stream: &mut Vec<T>, vertex: usize, value: T) {
    stream.resize(vertex, T::default());
    stream.push(value);
}

fn concat_p<N: TreeNode>(prim: &N) -> Result<Vec<usize>> {
    let mut indices = Vec::new();
    for p in children(prim, "p") {
        indices.extend(text::indices(p.text().unwrap_or_default())?);
    }
    Ok(indices)
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Channel index of the texture coordinate set `set`.
    pub fn texcoord_channel(&self, set: usize) -> Option<usize> {
        self.texcoord_sets.iter().position(|&s| s == set)
    }

    fn read_primitive<N: TreeNode>(
        &mut self,
        prim: &N,
        primitive: PrimitiveType,
        sources: &Sources,
        vertices: (&str, &[Input]),
    ) -> Result<()> {
        let tag = prim.tag().unwrap_or_default();
        let declared = Input::read_all(prim)?;
        if declared.is_empty() {
            return Err(AssetError::invalid(format!("<{}> has no inputs", tag)));
        }
        let stride = tuple_width(declared.iter().map(|i| i.offset))?;

        let (vertices_id, vertex_inputs) = vertices;
        let mut inputs = Vec::with_capacity(declared.len() + vertex_inputs.len());
        for input in declared {
            if input.semantic != Semantic::Vertex {
                inputs.push(input);
                continue;
            }
            if input.source != vertices_id {
                return Err(AssetError::Unsupported(format!(
                    "VERTEX input \"{}\" does not name the mesh's <vertices>",
                    input.source
                )));
            }
            inputs.extend(vertex_inputs.iter().map(|v| Input {
                offset: input.offset,
                ..v.clone()
            }));
        }
        let position_offset = inputs
            .iter()
            .find(|i| i.semantic == Semantic::Position)
            .map(|i| i.offset)
            .ok_or_else(|| AssetError::invalid(format!("<{}> has no VERTEX input", tag)))?;

        let count = match prim.attribute("count") {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| AssetError::invalid(format!("<{}> count \"{}\"", tag, c)))?,
            None => 0,
        };
        let (indices, face_sizes) = match primitive {
            PrimitiveType::Triangles | PrimitiveType::Lines => {
                let indices = concat_p(prim)?;
                let size = primitive.fixed_size().unwrap_or(1);
                let expected = count
                    .checked_mul(size)
                    .and_then(|n| n.checked_mul(stride))
                    .ok_or_else(|| AssetError::invalid(format!("<{}> count {} overflows", tag, count)))?;
                let faces = if indices.len() == expected {
                    count
                } else if primitive == PrimitiveType::Lines && indices.len() % (2 * stride) == 0 {
                    warn!("<lines> declares {} lines but has {} indices", count, indices.len());
                    indices.len() / (2 * stride)
                } else {
                    return Err(AssetError::invalid(format!(
                        "<{}> expects {} indices, found {}",
                        tag,
                        expected,
                        indices.len()
                    )));
                };
                (indices, vec![size; faces])
            }
            PrimitiveType::Polylist => {
                let vcount = prim.member("vcount").and_then(|v| v.text()).unwrap_or_default();
                let sizes = text::indices(vcount)?;
                let indices = concat_p(prim)?;
                let expected = index_total(&sizes, stride)?;
                if indices.len() != expected {
                    return Err(AssetError::invalid(format!(
                        "<{}> expects {} indices, found {}",
                        tag,
                        expected,
                        indices.len()
                    )));
                }
                (indices, sizes)
            }
            PrimitiveType::Polygons
            | PrimitiveType::LineStrips
            | PrimitiveType::TriFans
            | PrimitiveType::TriStrips => {
                let mut indices = Vec::new();
                let mut sizes = Vec::new();
                let holes = children(prim, "ph")
                    .filter(|_| primitive == PrimitiveType::Polygons)
                    .filter_map(|ph| {
                        warn!("ignoring holes of a <ph> polygon");
                        ph.member("p")
                    });
                for p in children(prim, "p").chain(holes) {
                    let group = text::indices(p.text().unwrap_or_default())?;
                    if group.len() % stride != 0 {
                        return Err(AssetError::invalid(format!(
                            "<{}> group of {} indices is not a multiple of {} inputs",
                            tag,
                            group.len(),
                            stride
                        )));
                    }
                    sizes.push(group.len() / stride);
                    indices.extend(group);
                }
                (indices, sizes)
            }
        };
        if count != 0 && primitive != PrimitiveType::Lines && face_sizes.len() != count {
            debug!(
                "<{}> declares {} faces, read {}",
                tag,
                count,
                face_sizes.len()
            );
        }

        let channels = self.channels(&inputs, sources)?;
        let first_vertex = self.positions.len();
        for tuple in indices.chunks(stride) {
            let vertex = self.positions.len();
            self.position_indices.push(tuple[position_offset]);
            for ch in &channels {
                let index = tuple[ch.offset];
                match ch.semantic {
                    Semantic::Position => {
                        let v = element4(ch.accessor, ch.data, index, [0.0; 4])?;
                        self.positions.push(Vec3::new(v[0], v[1], v[2]));
                    }
                    Semantic::Normal | Semantic::Tangent | Semantic::Bitangent => {
                        let v = element4(ch.accessor, ch.data, index, [0.0; 4])?;
                        let stream = match ch.semantic {
                            Semantic::Normal => &mut self.normals,
                            Semantic::Tangent => &mut self.tangents,
                            _ => &mut self.bitangents,
                        };
                        push_at(stream, vertex, Vec3::new(v[0], v[1], v[2]));
                    }
                    Semantic::Texcoord => {
                        let v = element4(ch.accessor, ch.data, index, [0.0; 4])?;
                        push_at(&mut self.texcoords[ch.slot], vertex, Vec2::new(v[0], v[1]));
                    }
                    Semantic::Color => {
                        let v = element4(ch.accessor, ch.data, index, [0.0, 0.0, 0.0, 1.0])?;
                        push_at(&mut self.colors[ch.slot], vertex, Vec4::from_array(v));
                    }
                    Semantic::Vertex => {}
                }
            }
        }

        debug!(
            "<{}>: {} faces, {} vertices",
            tag,
            face_sizes.len(),
            self.positions.len() - first_vertex
        );
        self.submeshes.push(SubMesh {
            primitive,
            material: prim.attribute("material").map(str::to_string),
            first_vertex,
            face_sizes,
        });
        Ok(())
    }

    /// Resolve each input to its source, assigning texture coordinate and
    /// color channels.
    fn channels<'s>(&mut self, inputs: &[Input], sources: &'s Sources) -> Result<Vec<Channel<'s>>> {
        let mut channels = Vec::with_capacity(inputs.len());
        let mut has_position = false;
        let mut colors = 0;
        for input in inputs {
            let slot = match input.semantic {
                Semantic::Position if has_position => continue,
                Semantic::Position => {
                    has_position = true;
                    0
                }
                Semantic::Texcoord => match self.texcoord_channel(input.set) {
                    Some(slot) => slot,
                    None if self.texcoord_sets.len() < MAX_CHANNELS => {
                        self.texcoord_sets.push(input.set);
                        self.texcoords.push(Vec::new());
                        self.texcoords.len() - 1
                    }
                    None => {
                        warn!("dropping texture coordinate set {}", input.set);
                        continue;
                    }
                },
                Semantic::Color if colors < MAX_CHANNELS => {
                    colors += 1;
                    if self.colors.len() < colors {
                        self.colors.push(Vec::new());
                    }
                    colors - 1
                }
                Semantic::Color => {
                    warn!("dropping color set {}", input.set);
                    continue;
                }
                _ => 0,
            };
            let (accessor, data) = sources.floats(&input.source)?;
            channels.push(Channel {
                semantic: input.semantic,
                slot,
                offset: input.offset,
                accessor,
                data,
            });
        }
        Ok(channels)
    }

    /// Pad streams some primitives did not provide.
    fn finish(&mut self) {
        let n = self.positions.len();
        for stream in [&mut self.normals, &mut self.tangents, &mut self.bitangents] {
            if !stream.is_empty() {
                stream.resize(n, Vec3::ZERO);
            }
        }
        for set in &mut self.texcoords {
            set.resize(n, Vec2::ZERO);
        }
        for set in &mut self.colors {
            set.resize(n, Vec4::ONE);
        }
    }
}

impl Entity for Geometry {
    const KIND: &'static str = "geometry";
    type Asset = ColladaDocument;

    fn translate_id(id: &str) -> Cow<'_, str> {
        fragment(id)
    }

    fn read<N: TreeNode>(node: &N, cx: &mut Reader<'_, N, ColladaDocument>) -> Result<Self> {
        let Some(mesh) = node.member("mesh") else {
            warn!(
                "geometry \"{}\" has no <mesh>, leaving it empty",
                node.attribute("id").unwrap_or_default()
            );
            return Ok(Self::default());
        };

        let sources = Sources::read(mesh, cx.options().duplicate_ids)?;
        let vertices = mesh
            .member("vertices")
            .ok_or_else(|| AssetError::invalid("<mesh> has no <vertices>"))?;
        let vertices_id = vertices.attribute("id").unwrap_or_default();
        let vertex_inputs = Input::read_all(vertices)?;
        let position = vertex_inputs
            .iter()
            .find(|i| i.semantic == Semantic::Position)
            .ok_or_else(|| AssetError::invalid("<vertices> has no POSITION input"))?;

        let (accessor, data) = sources.floats(&position.source)?;
        let source_positions = (0..accessor.count)
            .map(|i| element4(accessor, data, i, [0.0; 4]).map(|v| Vec3::new(v[0], v[1], v[2])))
            .collect::<Result<Vec<_>>>()?;
        let mut geometry = Self {
            source_positions,
            ..Self::default()
        };

        for prim in mesh.elements() {
            let Some(primitive) = prim.tag().and_then(PrimitiveType::from_tag) else {
                continue;
            };
            geometry.read_primitive(prim, primitive, &sources, (vertices_id, &vertex_inputs))?;
        }
        geometry.finish();
        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn geometry(mesh: &str) -> Result<Geometry> {
        let libraries = format!(
            r##"<library_geometries><geometry id="g">{}</geometry></library_geometries>"##,
            mesh
        );
        let doc = fixtures::load(&libraries, r##"<node id="n"><instance_geometry url="#g"/></node>"##)?;
        let g = doc.geometries.get_id("g");
        Ok(doc.geometries[g].clone())
    }

    #[test]
    fn test_triangles_deinterleave_per_tuple() {
        let g = geometry(&fixtures::quad_mesh(
            r##"<triangles count="2" material="mat">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <input semantic="NORMAL" source="#quad-normals" offset="1"/>
                 <input semantic="TEXCOORD" source="#quad-uv" offset="2" set="0"/>
                 <p>0 0 0  1 0 1  2 0 2   0 0 0  2 0 2  3 0 3</p>
               </triangles>"##,
        ))
        .unwrap();

        assert_eq!(g.vertex_count(), 6);
        assert_eq!(g.position_indices, [0, 1, 2, 0, 2, 3]);
        assert_eq!(g.positions[4], Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(g.normals, vec![Vec3::Z; 6]);
        assert_eq!(g.texcoords.len(), 1);
        assert_eq!(g.texcoords[0][1], Vec2::new(1.0, 0.0));
        assert_eq!(g.source_positions.len(), 4);

        let sub = &g.submeshes[0];
        assert_eq!(sub.material.as_deref(), Some("mat"));
        assert_eq!(sub.face_sizes, [3, 3]);
        assert_eq!(sub.vertex_range(), 0..6);
    }

    #[test]
    fn test_polylist_and_lines_append_submeshes() {
        let g = geometry(&fixtures::quad_mesh(
            r##"<polylist count="1">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <vcount>4</vcount>
                 <p>0 1 2 3</p>
               </polylist>
               <lines count="5">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 1 2</p>
               </lines>
               <tristrips count="1">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2 3</p>
               </tristrips>"##,
        ))
        .unwrap();

        assert_eq!(g.submeshes.len(), 3);
        assert_eq!(g.submeshes[0].face_sizes, [4]);
        // Mismatched <lines> count is recomputed from the index list.
        assert_eq!(g.submeshes[1].face_sizes, [2, 2]);
        assert_eq!(g.submeshes[1].first_vertex, 4);
        assert_eq!(g.submeshes[2].primitive, PrimitiveType::TriStrips);
        assert_eq!(g.submeshes[2].face_sizes, [4]);
        assert_eq!(g.submeshes[2].first_vertex, 8);
        assert!(g.normals.is_empty());
    }

    #[test]
    fn test_strips_and_fans_keep_one_group_per_p() {
        let g = geometry(&fixtures::quad_mesh(
            r##"<trifans count="1">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2 3</p>
               </trifans>
               <linestrips count="2">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2</p>
                 <p>2 3</p>
               </linestrips>"##,
        ))
        .unwrap();
        assert_eq!(g.submeshes[0].primitive, PrimitiveType::TriFans);
        assert_eq!(g.submeshes[0].face_sizes, [4]);
        assert_eq!(g.submeshes[1].primitive, PrimitiveType::LineStrips);
        assert_eq!(g.submeshes[1].face_sizes, [3, 2]);
        assert_eq!(g.position_indices, [0, 1, 2, 3, 0, 1, 2, 2, 3]);
    }

    #[test]
    fn test_huge_primitive_count_is_invalid() {
        let err = geometry(&fixtures::quad_mesh(
            r##"<triangles count="4611686018427387904">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2</p>
               </triangles>"##,
        ))
        .unwrap_err();
        assert!(matches!(err.root_cause(), AssetError::InvalidData(_)), "{:?}", err);

        let err = geometry(&fixtures::quad_mesh(
            r##"<polylist count="3">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <vcount>9223372036854775807 9223372036854775807 9223372036854775807</vcount>
                 <p>0 1 2</p>
               </polylist>"##,
        ))
        .unwrap_err();
        assert!(matches!(err.root_cause(), AssetError::InvalidData(_)), "{:?}", err);
    }

    #[test]
    fn test_polygons_read_one_face_per_p() {
        let g = geometry(&fixtures::quad_mesh(
            r##"<polygons count="2">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2 3</p>
                 <p>0 2 3</p>
               </polygons>"##,
        ))
        .unwrap();
        assert_eq!(g.submeshes[0].primitive, PrimitiveType::Polygons);
        assert_eq!(g.submeshes[0].face_sizes, [4, 3]);
        // Negative indices from some exporters read as 0.
        let g = geometry(&fixtures::quad_mesh(
            r##"<polygons count="1">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 -1 2</p>
               </polygons>"##,
        ))
        .unwrap();
        assert_eq!(g.position_indices, [0, 0, 2]);
    }

    #[test]
    fn test_index_count_mismatch_is_fatal() {
        let err = geometry(&fixtures::quad_mesh(
            r##"<triangles count="2">
                 <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
                 <p>0 1 2</p>
               </triangles>"##,
        ))
        .unwrap_err();
        assert_eq!(err.path(), Some("visual_scenes[0] > geometries[0]"));
        assert!(err.to_string().ends_with("<triangles> expects 6 indices, found 3"));
    }

    #[test]
    fn test_vertex_input_must_name_vertices() {
        let err = geometry(&fixtures::quad_mesh(
            r##"<triangles count="1">
                 <input semantic="VERTEX" source="#quad-positions" offset="0"/>
                 <p>0 1 2</p>
               </triangles>"##,
        ))
        .unwrap_err();
        assert!(matches!(err.root_cause(), AssetError::Unsupported(_)));
    }

    #[test]
    fn test_geometry_without_mesh_is_empty() {
        let g = geometry("<spline/>").unwrap();
        assert_eq!(g, Geometry::default());
    }
}
