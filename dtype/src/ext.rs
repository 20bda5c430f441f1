use super::*;

/// Maps a host Rust type onto its [`ElementType`].
pub trait HasElementType: Copy + 'static {
    const ELEMENT_TYPE: ElementType;
}

macro_rules! impl_element_type_ext {
    ($($ty:ty => $et:expr),* $(,)?) => {
        $(impl HasElementType for $ty { const ELEMENT_TYPE: ElementType = $et; })*
    };
}

impl_element_type_ext! {
    bool => ElementType::Boolean,
    i8 => ElementType::I8, i16 => ElementType::I16, i32 => ElementType::I32, i64 => ElementType::I64,
    u8 => ElementType::U8, u16 => ElementType::U16, u32 => ElementType::U32, u64 => ElementType::U64,
    f32 => ElementType::F32, f64 => ElementType::F64,
}
