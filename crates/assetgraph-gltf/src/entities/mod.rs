//! glTF object kinds and their `read` steps.

mod buffer;
mod material;
mod mesh;
mod node;
mod texture;

pub use buffer::{
    Accessor, Buffer, BufferView, ComponentType, ElementType, TARGET_ARRAY_BUFFER,
    TARGET_ELEMENT_ARRAY_BUFFER,
};
pub use material::{
    alpha_mode_name, Material, PbrSpecularGlossiness, TextureInfo,
    KHR_MATERIALS_PBR_SPECULAR_GLOSSINESS,
};
pub use mesh::{AccessorList, Attributes, Mesh, MorphTarget, Primitive, PrimitiveMode, MAX_ATTRIBUTE_SETS};
pub use node::{Camera, Node, Scene, Skin};
pub use texture::{
    Image, Sampler, Texture, FILTER_LINEAR, FILTER_NEAREST, FILTER_NEAREST_MIPMAP_LINEAR,
    FILTER_NEAREST_MIPMAP_NEAREST, WRAP_CLAMP_TO_EDGE, WRAP_MIRRORED_REPEAT, WRAP_REPEAT,
};
