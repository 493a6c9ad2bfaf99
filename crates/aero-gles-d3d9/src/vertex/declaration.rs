use crate::error::BackendError;
use crate::native::{DeclTypeCaps, VertexBufferHandle};

/// Number of generic vertex attributes exposed by the portable API.
pub const MAX_VERTEX_ATTRIBS: usize = 16;

/// `D3DDECLTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeclType {
    Float1 = 0,
    Float2 = 1,
    Float3 = 2,
    Float4 = 3,
    D3dColor = 4,
    UByte4 = 5,
    Short2 = 6,
    Short4 = 7,
    UByte4N = 8,
    Short2N = 9,
    Short4N = 10,
    UShort2N = 11,
    UShort4N = 12,
    UDec3 = 13,
    Dec3N = 14,
    Float16_2 = 15,
    Float16_4 = 16,
}

impl DeclType {
    fn float(components: u8) -> Self {
        match components {
            1 => Self::Float1,
            2 => Self::Float2,
            3 => Self::Float3,
            _ => Self::Float4,
        }
    }
}

/// `D3DDECLUSAGE`. Programs generated for this back-end read every attribute through
/// `TEXCOORD<n>`, so that is the only usage emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeclUsage {
    TexCoord = 5,
}

/// `D3DDECLMETHOD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeclMethod {
    Default = 0,
}

/// One `D3DVERTEXELEMENT9`. The `D3DDECL_END` terminator is implied by the slice length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub stream: u16,
    pub offset: u16,
    pub ty: DeclType,
    pub method: DeclMethod,
    pub usage: DeclUsage,
    pub usage_index: u8,
}

/// Component type of a client vertex array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Fixed,
    Float,
}

/// Select the declaration type the vertex data manager stores an array as.
///
/// Types the device cannot fetch natively are widened to floats (the data manager converts them
/// while streaming).
pub fn decl_type_for(
    ty: ComponentType,
    normalized: bool,
    components: u8,
    caps: DeclTypeCaps,
) -> DeclType {
    let components = components.clamp(1, 4);
    let wide = components > 2;
    match (ty, normalized) {
        (ComponentType::Float, _) => DeclType::float(components),
        (ComponentType::Short, false) => {
            if wide {
                DeclType::Short4
            } else {
                DeclType::Short2
            }
        }
        (ComponentType::Short, true) => match wide {
            false if caps.contains(DeclTypeCaps::SHORT2N) => DeclType::Short2N,
            true if caps.contains(DeclTypeCaps::SHORT4N) => DeclType::Short4N,
            _ => DeclType::float(components),
        },
        (ComponentType::UnsignedShort, true) => match wide {
            false if caps.contains(DeclTypeCaps::USHORT2N) => DeclType::UShort2N,
            true if caps.contains(DeclTypeCaps::USHORT4N) => DeclType::UShort4N,
            _ => DeclType::float(components),
        },
        (ComponentType::UnsignedByte, false) if caps.contains(DeclTypeCaps::UBYTE4) => {
            DeclType::UByte4
        }
        (ComponentType::UnsignedByte, true) if caps.contains(DeclTypeCaps::UBYTE4N) => {
            DeclType::UByte4N
        }
        _ => DeclType::float(components),
    }
}

/// A vertex attribute after the vertex data manager has placed it in a native buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslatedAttribute {
    /// `false` when the attribute reads the current generic value instead of a client array.
    pub array_enabled: bool,
    pub ty: ComponentType,
    pub normalized: bool,
    pub components: u8,
    pub buffer: VertexBufferHandle,
    /// Serial of the buffer storage; changes whenever the storage is reallocated.
    pub serial: u32,
    pub stride: u32,
    pub offset: u32,
    /// Instance divisor; `0` advances per vertex.
    pub divisor: u32,
}

impl TranslatedAttribute {
    pub fn decl_type(&self, caps: DeclTypeCaps) -> DeclType {
        if self.array_enabled {
            decl_type_for(self.ty, self.normalized, self.components, caps)
        } else {
            // Current values are streamed as a single float4.
            DeclType::Float4
        }
    }
}

/// Attribute inputs declared by a linked program: attribute slot -> `TEXCOORD` semantic index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgramInputs {
    semantic_indices: [Option<u8>; MAX_VERTEX_ATTRIBS],
}

impl ProgramInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, attribute: usize, semantic_index: u8) -> Result<Self, BackendError> {
        let slot = self.semantic_indices.get_mut(attribute).ok_or_else(|| {
            BackendError::UnsupportedConfiguration(format!(
                "vertex attribute {attribute} exceeds the {MAX_VERTEX_ATTRIBS} supported slots"
            ))
        })?;
        *slot = Some(semantic_index);
        Ok(self)
    }

    /// Semantic index for `attribute`, or `None` if the program does not consume it.
    pub fn semantic_index(&self, attribute: usize) -> Option<u8> {
        self.semantic_indices.get(attribute).copied().flatten()
    }

    pub fn is_consumed(&self, attribute: usize) -> bool {
        self.semantic_index(attribute).is_some()
    }
}

/// Canonical vertex declaration: the cache key of [`super::VertexFormatCache`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexFormatDescriptor {
    elements: Vec<VertexElement>,
}

impl VertexFormatDescriptor {
    pub fn new() -> Self {
        Self {
            elements: Vec::with_capacity(MAX_VERTEX_ATTRIBS),
        }
    }

    pub fn push(&mut self, element: VertexElement) -> Result<(), BackendError> {
        if self.elements.len() >= MAX_VERTEX_ATTRIBS {
            return Err(BackendError::UnsupportedConfiguration(format!(
                "vertex declaration exceeds {MAX_VERTEX_ATTRIBS} elements"
            )));
        }
        self.elements.push(element);
        Ok(())
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
