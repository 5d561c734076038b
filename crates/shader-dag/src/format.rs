use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::limits::REGISTER_WORDS;

/// Base component kind of a numeric or boolean format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Integer,
    UInteger,
    Bool,
    SNorm,
    UNorm,
    Float,
}

impl ScalarKind {
    /// Bytes taken by one component in a vertex/texel element.
    pub fn component_bytes(self) -> u32 {
        match self {
            ScalarKind::Integer | ScalarKind::UInteger | ScalarKind::Float => 4,
            ScalarKind::SNorm | ScalarKind::UNorm => 2,
            ScalarKind::Bool => 1,
        }
    }
}

/// Format carried by a pin or an operand.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PinFormat {
    #[default]
    Undefined,

    Integer,
    Integerx2,
    Integerx3,
    Integerx4,
    UInteger,
    UIntegerx2,
    UIntegerx3,
    UIntegerx4,
    Bool,
    Boolx2,
    Boolx3,
    Boolx4,
    SNorm,
    SNormx2,
    SNormx3,
    SNormx4,
    UNorm,
    UNormx2,
    UNormx3,
    UNormx4,
    Float,
    Floatx2,
    Floatx3,
    Floatx4,

    Float2x2,
    Float3x3,
    Float4x4,
    Integer2x2,
    Integer3x3,
    Integer4x4,
    UInteger2x2,
    UInteger3x3,
    UInteger4x4,

    BufferTexture,
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    TextureCube,
    Texture3D,
    Sampler,
    Interface,
}

/// Numeric layout of a format: `rows == 1` for scalars and vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub kind: ScalarKind,
    pub rows: u32,
    pub columns: u32,
}

impl Shape {
    pub fn components(&self) -> u32 {
        self.rows * self.columns
    }

    pub fn is_matrix(&self) -> bool {
        self.rows > 1
    }
}

impl PinFormat {
    pub fn shape(self) -> Option<Shape> {
        use PinFormat::*;
        use ScalarKind as K;
        let (kind, rows, columns) = match self {
            Integer => (K::Integer, 1, 1),
            Integerx2 => (K::Integer, 1, 2),
            Integerx3 => (K::Integer, 1, 3),
            Integerx4 => (K::Integer, 1, 4),
            UInteger => (K::UInteger, 1, 1),
            UIntegerx2 => (K::UInteger, 1, 2),
            UIntegerx3 => (K::UInteger, 1, 3),
            UIntegerx4 => (K::UInteger, 1, 4),
            Bool => (K::Bool, 1, 1),
            Boolx2 => (K::Bool, 1, 2),
            Boolx3 => (K::Bool, 1, 3),
            Boolx4 => (K::Bool, 1, 4),
            SNorm => (K::SNorm, 1, 1),
            SNormx2 => (K::SNorm, 1, 2),
            SNormx3 => (K::SNorm, 1, 3),
            SNormx4 => (K::SNorm, 1, 4),
            UNorm => (K::UNorm, 1, 1),
            UNormx2 => (K::UNorm, 1, 2),
            UNormx3 => (K::UNorm, 1, 3),
            UNormx4 => (K::UNorm, 1, 4),
            Float => (K::Float, 1, 1),
            Floatx2 => (K::Float, 1, 2),
            Floatx3 => (K::Float, 1, 3),
            Floatx4 => (K::Float, 1, 4),
            Float2x2 => (K::Float, 2, 2),
            Float3x3 => (K::Float, 3, 3),
            Float4x4 => (K::Float, 4, 4),
            Integer2x2 => (K::Integer, 2, 2),
            Integer3x3 => (K::Integer, 3, 3),
            Integer4x4 => (K::Integer, 4, 4),
            UInteger2x2 => (K::UInteger, 2, 2),
            UInteger3x3 => (K::UInteger, 3, 3),
            UInteger4x4 => (K::UInteger, 4, 4),
            Undefined | BufferTexture | Texture1D | Texture1DArray | Texture2D
            | Texture2DArray | TextureCube | Texture3D | Sampler | Interface => return None,
        };
        Some(Shape {
            kind,
            rows,
            columns,
        })
    }

    /// Builds a scalar/vector (`rows == 1`) or square matrix format.
    pub fn from_shape(kind: ScalarKind, rows: u32, columns: u32) -> Option<PinFormat> {
        use PinFormat::*;
        use ScalarKind as K;
        if rows == 1 {
            return Self::vector(kind, columns);
        }
        if rows != columns {
            return None;
        }
        Some(match (kind, rows) {
            (K::Float, 2) => Float2x2,
            (K::Float, 3) => Float3x3,
            (K::Float, 4) => Float4x4,
            (K::Integer, 2) => Integer2x2,
            (K::Integer, 3) => Integer3x3,
            (K::Integer, 4) => Integer4x4,
            (K::UInteger, 2) => UInteger2x2,
            (K::UInteger, 3) => UInteger3x3,
            (K::UInteger, 4) => UInteger4x4,
            _ => return None,
        })
    }

    pub fn vector(kind: ScalarKind, components: u32) -> Option<PinFormat> {
        use PinFormat::*;
        use ScalarKind as K;
        let table = match kind {
            K::Integer => [Integer, Integerx2, Integerx3, Integerx4],
            K::UInteger => [UInteger, UIntegerx2, UIntegerx3, UIntegerx4],
            K::Bool => [Bool, Boolx2, Boolx3, Boolx4],
            K::SNorm => [SNorm, SNormx2, SNormx3, SNormx4],
            K::UNorm => [UNorm, UNormx2, UNormx3, UNormx4],
            K::Float => [Float, Floatx2, Floatx3, Floatx4],
        };
        match components {
            1..=4 => Some(table[components as usize - 1]),
            _ => None,
        }
    }

    pub fn scalar_kind(self) -> Option<ScalarKind> {
        self.shape().map(|s| s.kind)
    }

    /// Single-component format of the same base kind.
    pub fn to_scalar(self) -> Option<PinFormat> {
        self.scalar_kind().and_then(|k| Self::vector(k, 1))
    }

    pub fn components(self) -> u32 {
        self.shape().map_or(0, |s| s.components())
    }

    pub fn is_scalar(self) -> bool {
        self.shape().is_some_and(|s| s.components() == 1)
    }

    pub fn is_vector(self) -> bool {
        self.shape().is_some_and(|s| s.rows == 1)
    }

    pub fn is_matrix(self) -> bool {
        self.shape().is_some_and(|s| s.is_matrix())
    }

    pub fn is_numeric(self) -> bool {
        self.shape().is_some()
    }

    pub fn is_texture(self) -> bool {
        use PinFormat::*;
        matches!(
            self,
            BufferTexture
                | Texture1D
                | Texture1DArray
                | Texture2D
                | Texture2DArray
                | TextureCube
                | Texture3D
        )
    }

    /// Textures, samplers and interfaces: values that can only be bound, never stored in a buffer.
    pub fn is_resource(self) -> bool {
        self.is_texture() || matches!(self, PinFormat::Sampler | PinFormat::Interface)
    }

    /// Size of one value in bytes, `None` for resources.
    pub fn size_in_bytes(self) -> Option<u32> {
        self.shape()
            .map(|s| s.components() * s.kind.component_bytes())
    }

    /// Constant buffer footprint of a single non-array value, in words.
    ///
    /// Every component occupies one word; matrix rows each start a new register.
    pub fn words(self) -> Option<u32> {
        self.shape()
            .map(|s| (s.rows - 1) * REGISTER_WORDS + s.columns)
    }

    /// Component count of the float position used to sample this texture.
    pub fn sample_position_components(self) -> Option<u32> {
        use PinFormat::*;
        match self {
            Texture1D => Some(1),
            Texture1DArray | Texture2D => Some(2),
            Texture2DArray | TextureCube | Texture3D => Some(3),
            _ => None,
        }
    }

    /// Component count of the integer position used to load from this texture.
    ///
    /// Includes the trailing mip level for every mipmapped kind.
    pub fn load_position_components(self) -> Option<u32> {
        use PinFormat::*;
        match self {
            BufferTexture => Some(1),
            Texture1D => Some(2),
            Texture1DArray | Texture2D => Some(3),
            Texture2DArray | Texture3D => Some(4),
            _ => None,
        }
    }

    /// Component count of the integer texel offset of a load. Array slices take no offset.
    pub fn texel_offset_components(self) -> Option<u32> {
        use PinFormat::*;
        match self {
            Texture1D | Texture1DArray => Some(1),
            Texture2D | Texture2DArray => Some(2),
            Texture3D => Some(3),
            _ => None,
        }
    }
}

/// Result format of a shader `mul` between `a` and `b`.
///
/// Same formats multiply component-wise (or as matrices), a square matrix transforms a vector
/// of its width, and a vector scales by a scalar of its base kind in either order.
pub fn mul_result_format(a: PinFormat, b: PinFormat) -> Option<PinFormat> {
    let (sa, sb) = (a.shape()?, b.shape()?);
    if sa.kind == ScalarKind::Bool || sb.kind == ScalarKind::Bool || sa.kind != sb.kind {
        return None;
    }
    if a == b {
        return Some(a);
    }
    if sa.is_matrix() && sb.rows == 1 && sb.columns == sa.columns {
        return Some(b);
    }
    if sa.rows == 1 && sb.components() == 1 {
        return Some(a);
    }
    if sa.components() == 1 && sb.rows == 1 {
        return Some(b);
    }
    None
}

impl fmt::Display for PinFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Array-ness of a pin or parameter.
///
/// Orders as `Static(_) < Dynamic < NotArray`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ArraySize {
    Static(u32),
    Dynamic,
    #[default]
    NotArray,
}

impl ArraySize {
    pub fn is_array(self) -> bool {
        !matches!(self, ArraySize::NotArray)
    }

    pub fn len(self) -> Option<u32> {
        match self {
            ArraySize::Static(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for ArraySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArraySize::Static(n) => write!(f, "[{n}]"),
            ArraySize::Dynamic => f.write_str("[]"),
            ArraySize::NotArray => Ok(()),
        }
    }
}

bitflags! {
    /// Semantic tag of a stage input or output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    pub struct PinComponent: u64 {
        const POSITION = 1 << 0;
        const NORMAL = 1 << 1;
        const COLOUR = 1 << 2;
        const SECONDARY_COLOUR = 1 << 3;
        const BLEND_WEIGHTS = 1 << 4;
        const BLEND_INDICES = 1 << 5;
        const BINORMAL = 1 << 6;
        const TANGENT = 1 << 7;
        const TEX_COORD0 = 1 << 8;
        const TEX_COORD1 = 1 << 9;
        const TEX_COORD2 = 1 << 10;
        const TEX_COORD3 = 1 << 11;
        const TEX_COORD4 = 1 << 12;
        const TEX_COORD5 = 1 << 13;
        const TEX_COORD6 = 1 << 14;
        const TEX_COORD7 = 1 << 15;
        const TEX_COORD8 = 1 << 16;
        const TEX_COORD9 = 1 << 17;
        const TEX_COORD10 = 1 << 18;
        const TEX_COORD11 = 1 << 19;
        const TEX_COORD12 = 1 << 20;
        const TEX_COORD13 = 1 << 21;
        const TEX_COORD14 = 1 << 22;
        const TEX_COORD15 = 1 << 23;
        const USER0 = 1 << 24;
        const USER1 = 1 << 25;
        const USER2 = 1 << 26;
        const USER3 = 1 << 27;
        const USER4 = 1 << 28;
        const USER5 = 1 << 29;
        const USER6 = 1 << 30;
        const USER7 = 1 << 31;
        const USER8 = 1 << 32;
        const USER9 = 1 << 33;
        const USER10 = 1 << 34;
        const USER11 = 1 << 35;
        const USER12 = 1 << 36;
        const USER13 = 1 << 37;
        const USER14 = 1 << 38;
        const USER15 = 1 << 39;
        const DEPTH = 1 << 40;
        const RENDER_TARGET0 = 1 << 41;
        const RENDER_TARGET1 = 1 << 42;
        const RENDER_TARGET2 = 1 << 43;
        const RENDER_TARGET3 = 1 << 44;
        const RENDER_TARGET4 = 1 << 45;
        const RENDER_TARGET5 = 1 << 46;
        const RENDER_TARGET6 = 1 << 47;
        const RENDER_TARGET7 = 1 << 48;
        const VERTEX_ID = 1 << 49;
        const PRIMITIVE_ID = 1 << 50;
        const INSTANCE_ID = 1 << 51;
        const RENDER_TARGET_ARRAY_INDEX = 1 << 52;
        const VIEWPORT_ARRAY_INDEX = 1 << 53;

        const TEX_COORDS = 0xFFFF << 8;
        const USERS = 0xFFFF << 24;
        const RENDER_TARGETS = 0xFF << 41;
        /// Components a pixel shader is allowed to write.
        const PIXEL_OUTPUTS = Self::DEPTH.bits() | Self::RENDER_TARGETS.bits();
    }
}

impl PinComponent {
    /// `true` when exactly one semantic is set.
    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }
}
