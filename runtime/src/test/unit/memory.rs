use test_case::test_case;
use weld_ir::ElementType;

use crate::error::Error;
use crate::memory::{Buffer, MemoryArgs};

#[test]
fn test_from_slice_round_trip() {
    let buffer = Buffer::from_slice(&[2, 3], &[1i32, -2, 3, -4, 5, -6]).unwrap();
    assert_eq!(buffer.element_type(), ElementType::I32);
    assert_eq!(buffer.shape(), &[2, 3]);
    assert_eq!(buffer.byte_len(), 24);
    assert_eq!(buffer.to_vec::<i32>().unwrap(), vec![1, -2, 3, -4, 5, -6]);
}

#[test]
fn test_from_slice_checks_length() {
    let err = Buffer::from_slice(&[4], &[1.0f32; 3]).unwrap_err();
    assert!(matches!(err, Error::BufferSize { .. }), "{err}");
}

#[test]
fn test_typed_view_checks_element_type() {
    let buffer = Buffer::zeros(ElementType::F32, &[4]);
    let err = buffer.as_slice::<i32>().unwrap_err();
    assert!(matches!(err, Error::ElementTypeMismatch { expected: ElementType::F32, actual: ElementType::I32 }), "{err}");
}

#[test_case(ElementType::U8, &[0.0, 255.0, 7.0]; "u8")]
#[test_case(ElementType::I64, &[-3.0, 0.0, 1e12]; "i64")]
#[test_case(ElementType::F32, &[0.5, -1.25, 3.0]; "f32")]
#[test_case(ElementType::Boolean, &[1.0, 0.0, 1.0]; "boolean")]
fn test_f64_views(element_type: ElementType, values: &[f64]) {
    let mut buffer = Buffer::zeros(element_type, &[3]);
    buffer.write_f64(values).unwrap();
    assert_eq!(buffer.read_f64().unwrap(), values);
}

#[test]
fn test_f64_write_narrows() {
    let mut buffer = Buffer::zeros(ElementType::I32, &[3]);
    buffer.write_f64(&[1.9, -1.9, 3e10]).unwrap();
    assert_eq!(buffer.to_vec::<i32>().unwrap(), vec![1, -1, i32::MAX]);
}

#[test]
fn test_half_precision_has_no_host_view() {
    let buffer = Buffer::zeros(ElementType::F16, &[2]);
    assert_eq!(buffer.byte_len(), 4);
    assert!(matches!(buffer.read_f64(), Err(Error::UnsupportedElementType { element_type: ElementType::F16 })));
}

#[test]
fn test_empty_buffer() {
    let buffer = Buffer::zeros(ElementType::F32, &[0, 5]);
    assert!(buffer.is_empty());
    assert_eq!(buffer.read_f64().unwrap(), Vec::<f64>::new());
}

#[test]
fn test_memory_args_describe() {
    let a = Buffer::zeros(ElementType::F32, &[2, 3]);
    let b = Buffer::zeros(ElementType::F32, &[3]);
    let memory = MemoryArgs::new(vec![&a, &b], vec![]);
    assert_eq!(memory.describe(), "[[2, 3], [3]]");
    assert_eq!(memory.src_shapes().len(), 2);
}
