//! Vertex input layout: descriptor construction and the native declaration cache.

mod cache;
mod declaration;

pub use cache::{VertexFormatCache, VERTEX_FORMAT_CACHE_CAPACITY};
pub use declaration::{
    decl_type_for, ComponentType, DeclMethod, DeclType, DeclUsage, ProgramInputs,
    TranslatedAttribute, VertexElement, VertexFormatDescriptor, MAX_VERTEX_ATTRIBS,
};
