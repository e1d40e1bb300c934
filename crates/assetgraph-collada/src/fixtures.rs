//! Small COLLADA documents shared by the unit tests.

use crate::document::ColladaDocument;
use assetgraph_core::{ImportOptions, Result};

/// A 1.4.1 document with the given library sections and one visual scene
/// holding `nodes`.
pub fn collada(libraries: &str, nodes: &str) -> String {
    format!(
        r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset><unit name="meter" meter="1"/><up_axis>Y_UP</up_axis></asset>
  {}
  <library_visual_scenes><visual_scene id="Scene" name="Scene">{}</visual_scene></library_visual_scenes>
  <scene><instance_visual_scene url="#Scene"/></scene>
</COLLADA>"##,
        libraries, nodes
    )
}

pub fn load(libraries: &str, nodes: &str) -> Result<ColladaDocument> {
    load_with(libraries, nodes, ImportOptions::default())
}

pub fn load_with(libraries: &str, nodes: &str, options: ImportOptions) -> Result<ColladaDocument> {
    ColladaDocument::from_slice(collada(libraries, nodes).as_bytes(), options)
}

/// A `<mesh>` with a unit quad's sources (`#quad-positions`, `#quad-normals`,
/// `#quad-uv`), its `#quad-vertices` and the given primitives.
pub fn quad_mesh(primitives: &str) -> String {
    format!(
        r##"<mesh>
  <source id="quad-positions">
    <float_array id="quad-positions-array" count="12">0 0 0  1 0 0  1 1 0  0 1 0</float_array>
    <technique_common><accessor source="#quad-positions-array" count="4" stride="3">
      <param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/>
    </accessor></technique_common>
  </source>
  <source id="quad-normals">
    <float_array id="quad-normals-array" count="3">0 0 1</float_array>
    <technique_common><accessor source="#quad-normals-array" count="1" stride="3">
      <param name="X" type="float"/><param name="Y" type="float"/><param name="Z" type="float"/>
    </accessor></technique_common>
  </source>
  <source id="quad-uv">
    <float_array id="quad-uv-array" count="8">0 0  1 0  1 1  0 1</float_array>
    <technique_common><accessor source="#quad-uv-array" count="4" stride="2">
      <param name="S" type="float"/><param name="T" type="float"/>
    </accessor></technique_common>
  </source>
  <vertices id="quad-vertices"><input semantic="POSITION" source="#quad-positions"/></vertices>
  {}
</mesh>"##,
        primitives
    )
}

/// Two triangles over the quad, bound to material symbol `mat`.
pub fn quad_geometry(id: &str) -> String {
    format!(
        r##"<geometry id="{}" name="Quad">{}</geometry>"##,
        id,
        quad_mesh(
            r##"<triangles count="2" material="mat">
  <input semantic="VERTEX" source="#quad-vertices" offset="0"/>
  <input semantic="TEXCOORD" source="#quad-uv" offset="0" set="0"/>
  <p>0 1 2  0 2 3</p>
</triangles>"##
        )
    )
}

/// A skin over `source` with the given space-separated joint names. The
/// second joint's inverse bind matrix translates by -1 on Y, and the bind
/// shape translates by 1 on Z.
pub fn skin_controller(id: &str, source: &str, joints: &str) -> String {
    let count = joints.split_whitespace().count();
    let mut matrices = String::from("1 0 0 0  0 1 0 0  0 0 1 0  0 0 0 1");
    for _ in 1..count {
        matrices.push_str("  1 0 0 0  0 1 0 -1  0 0 1 0  0 0 0 1");
    }
    format!(
        r##"<controller id="{id}">
  <skin source="#{source}">
    <bind_shape_matrix>1 0 0 0  0 1 0 0  0 0 1 1  0 0 0 1</bind_shape_matrix>
    <source id="{id}-joints">
      <Name_array id="{id}-joints-array" count="{count}">{joints}</Name_array>
      <technique_common><accessor source="#{id}-joints-array" count="{count}" stride="1">
        <param name="JOINT" type="name"/>
      </accessor></technique_common>
    </source>
    <source id="{id}-bind-poses">
      <float_array id="{id}-bind-poses-array" count="{floats}">{matrices}</float_array>
      <technique_common><accessor source="#{id}-bind-poses-array" count="{count}" stride="16">
        <param name="TRANSFORM" type="float4x4"/>
      </accessor></technique_common>
    </source>
    <source id="{id}-weights">
      <float_array id="{id}-weights-array" count="5">1 0.25 0.75 1 0.5</float_array>
      <technique_common><accessor source="#{id}-weights-array" count="5" stride="1">
        <param name="WEIGHT" type="float"/>
      </accessor></technique_common>
    </source>
    <joints>
      <input semantic="JOINT" source="#{id}-joints"/>
      <input semantic="INV_BIND_MATRIX" source="#{id}-bind-poses"/>
    </joints>
    <vertex_weights count="4">
      <input semantic="JOINT" source="#{id}-joints" offset="0"/>
      <input semantic="WEIGHT" source="#{id}-weights" offset="1"/>
      <vcount>1 2 1 1</vcount>
      <v>0 0  0 1 1 2  1 3  -1 4</v>
    </vertex_weights>
  </skin>
</controller>"##,
        id = id,
        source = source,
        joints = joints,
        count = count,
        floats = count * 16,
        matrices = matrices,
    )
}

/// The quad placed at node `n` with material `m` bound to symbol `mat`;
/// `m` instances effect `#fx`, which `effect` should define.
pub fn load_material(effect: &str, images: &str) -> Result<ColladaDocument> {
    let libraries = format!(
        r##"<library_images>{}</library_images>
<library_effects>{}</library_effects>
<library_materials><material id="m" name="Wood"><instance_effect url="#fx"/></material></library_materials>
<library_geometries>{}</library_geometries>"##,
        images,
        effect,
        quad_geometry("quad")
    );
    load(
        &libraries,
        r##"<node id="n" name="Board">
  <instance_geometry url="#quad">
    <bind_material><technique_common>
      <instance_material symbol="mat" target="#m">
        <bind_vertex_input semantic="UVMap" input_semantic="TEXCOORD" input_set="0"/>
      </instance_material>
    </technique_common></bind_material>
  </instance_geometry>
</node>"##,
    )
}

/// A box node with `location` and `rotZ` transforms for animation targets.
pub const ANIMATED_BOX: &str = r##"<node id="box" name="Box">
  <translate sid="location">0 0 0</translate>
  <rotate sid="rotZ">0 0 1 0</rotate>
</node>"##;

/// Sources, a sampler and a channel for one animated target. Source and
/// sampler IDs start with `prefix`; `values` holds `width` floats per key.
pub fn animation_body(
    prefix: &str,
    target: &str,
    times: &str,
    values: &str,
    width: usize,
    interpolation: Option<&str>,
) -> String {
    let keys = times.split_whitespace().count();
    let outputs = values.split_whitespace().count();
    let params = if width == 16 {
        r#"<param name="TRANSFORM" type="float4x4"/>"#.to_string()
    } else {
        r#"<param name="X" type="float"/>"#.repeat(width)
    };
    let (interpolation_source, interpolation_input) = match interpolation {
        Some(names) => (
            format!(
                r##"<source id="{p}-interp">
  <Name_array id="{p}-interp-array" count="{n}">{names}</Name_array>
  <technique_common><accessor source="#{p}-interp-array" count="{n}" stride="1">
    <param name="INTERPOLATION" type="name"/>
  </accessor></technique_common>
</source>"##,
                p = prefix,
                n = names.split_whitespace().count(),
                names = names
            ),
            format!(r##"<input semantic="INTERPOLATION" source="#{}-interp"/>"##, prefix),
        ),
        None => (String::new(), String::new()),
    };
    format!(
        r##"<source id="{p}-input">
  <float_array id="{p}-input-array" count="{keys}">{times}</float_array>
  <technique_common><accessor source="#{p}-input-array" count="{keys}" stride="1">
    <param name="TIME" type="float"/>
  </accessor></technique_common>
</source>
<source id="{p}-output">
  <float_array id="{p}-output-array" count="{outputs}">{values}</float_array>
  <technique_common><accessor source="#{p}-output-array" count="{count}" stride="{width}">
    {params}
  </accessor></technique_common>
</source>
{interpolation_source}
<sampler id="{p}-sampler">
  <input semantic="INPUT" source="#{p}-input"/>
  <input semantic="OUTPUT" source="#{p}-output"/>
  {interpolation_input}
</sampler>
<channel source="#{p}-sampler" target="{target}"/>"##,
        p = prefix,
        keys = keys,
        times = times,
        outputs = outputs,
        values = values,
        count = outputs / width.max(1),
        width = width,
        params = params,
        interpolation_source = interpolation_source,
        interpolation_input = interpolation_input,
        target = target
    )
}
