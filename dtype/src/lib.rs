//! Element types for the weld fusion compiler.
//!
//! Every tensor port in the graph carries an [`ElementType`]. Code generation only
//! needs the byte width and the numeric class of an element; everything else about
//! numerical precision is treated as opaque.

pub mod ext;


pub use ext::HasElementType;

/// Scalar element type of a tensor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ElementType {
    Boolean,

    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,

    F16,
    BF16,
    F32,
    F64,
}

impl ElementType {
    /// Size of a single element in bytes.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Boolean | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::F16 | Self::BF16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Boolean)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub const fn is_integral(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    /// Low-precision integer types produced by quantization.
    pub const fn is_quantized(&self) -> bool {
        matches!(self, Self::I8 | Self::U8)
    }

    /// Pick the wider of two types of the same numeric class.
    ///
    /// Returns `None` when the classes differ (float vs. integral vs. boolean); the
    /// compiler never promotes implicitly across classes.
    pub fn merge(lhs: Self, rhs: Self) -> Option<Self> {
        if lhs == rhs {
            return Some(lhs);
        }
        let same_class = (lhs.is_float() && rhs.is_float())
            || (lhs.is_signed() && rhs.is_signed())
            || (lhs.is_unsigned() && rhs.is_unsigned());
        same_class.then(|| if lhs.bytes() >= rhs.bytes() { lhs } else { rhs })
    }
}
