//! Tensor shapes with optionally dynamic dimensions.
//!
//! Broadcasting follows numpy rules: shapes are right-aligned and a dimension of
//! extent 1 stretches to match the other operand.

use std::fmt;

use smallvec::{SmallVec, smallvec};

/// One dimension of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    /// Extent only known at execution time.
    Dynamic,
}

impl Dim {
    pub const fn as_static(self) -> Option<usize> {
        match self {
            Dim::Static(n) => Some(n),
            Dim::Dynamic => None,
        }
    }

    pub const fn is_dynamic(self) -> bool {
        matches!(self, Dim::Dynamic)
    }

    /// Broadcast two dimensions; `None` when the extents conflict.
    pub fn broadcast(self, other: Dim) -> Option<Dim> {
        match (self, other) {
            (Dim::Static(a), Dim::Static(b)) if a == b => Some(Dim::Static(a)),
            (Dim::Static(1), d) | (d, Dim::Static(1)) => Some(d),
            (Dim::Static(_), Dim::Static(_)) => None,
            (Dim::Dynamic, d) | (d, Dim::Dynamic) => Some(d),
        }
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Static(n)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Static(n) => write!(f, "{n}"),
            Dim::Dynamic => f.write_str("?"),
        }
    }
}

pub type Shape = SmallVec<[Dim; 4]>;

/// Build a fully static shape.
pub fn static_shape(dims: &[usize]) -> Shape {
    dims.iter().copied().map(Dim::Static).collect()
}

pub fn is_static(shape: &Shape) -> bool {
    shape.iter().all(|d| !d.is_dynamic())
}

pub fn to_static(shape: &Shape) -> Option<SmallVec<[usize; 4]>> {
    shape.iter().map(|d| d.as_static()).collect()
}

/// Number of elements, when the shape is static.
pub fn shape_size(shape: &Shape) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, d| d.as_static().map(|n| acc * n))
}

/// Single-element tensor (rank 0, or every extent equal to 1).
pub fn is_scalar(shape: &Shape) -> bool {
    shape_size(shape) == Some(1)
}

/// Numpy broadcast of two shapes.
pub fn broadcast_merge(lhs: &Shape, rhs: &Shape) -> Option<Shape> {
    let rank = lhs.len().max(rhs.len());
    let mut out: Shape = smallvec![Dim::Static(1); rank];
    for (i, slot) in out.iter_mut().enumerate() {
        let l = dim_from_right(lhs, rank - 1 - i);
        let r = dim_from_right(rhs, rank - 1 - i);
        *slot = l.broadcast(r)?;
    }
    Some(out)
}

/// Numpy broadcast of any number of shapes; an empty iterator yields a scalar.
pub fn broadcast_all<'a>(shapes: impl IntoIterator<Item = &'a Shape>) -> Option<Shape> {
    shapes.into_iter().try_fold(Shape::new(), |acc, s| broadcast_merge(&acc, s))
}

fn dim_from_right(shape: &Shape, from_right: usize) -> Dim {
    if from_right < shape.len() { shape[shape.len() - 1 - from_right] } else { Dim::Static(1) }
}

/// Resolve a possibly negative axis against `rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank = rank as i64;
    let axis = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&axis).then_some(axis as usize)
}

pub struct DisplayShape<'a>(pub &'a Shape);

impl fmt::Display for DisplayShape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}
