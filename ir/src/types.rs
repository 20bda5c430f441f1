//! Element-wise operation kinds.

use strum::{Display, EnumIter};

/// Unary element-wise operations. All of them preserve the input element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum UnaryOp {
    /// -x
    Neg,
    /// |x|
    Abs,
    /// √x (float only)
    Sqrt,
    /// max(x, 0)
    Relu,
    /// e^x (float only)
    Exp,
    /// Round toward -∞ (float only)
    Floor,
}

impl UnaryOp {
    pub const fn requires_float(self) -> bool {
        matches!(self, Self::Sqrt | Self::Exp | Self::Floor)
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Abs => x.abs(),
            Self::Sqrt => x.sqrt(),
            Self::Relu => x.max(0.0),
            Self::Exp => x.exp(),
            Self::Floor => x.floor(),
        }
    }
}

/// Binary element-wise operations with numpy broadcasting.
///
/// Both operands must share an element type; the result keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Truncating for integers, IEEE division for floats.
    Div,
    Max,
    Min,
    Pow,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Max => a.max(b),
            Self::Min => a.min(b),
            Self::Pow => a.powf(b),
        }
    }
}
