use std::sync::Arc;

use proptest::prelude::*;
use test_case::test_case;
use weld_ir::{
    BinaryOp, BroadcastLoad, Constant, ElementType, Fill, Graph, LayoutClass, Op, Output, Subgraph, UnaryOp, VectorBuffer,
};

use crate::context::ExecutorContext;
use crate::executor::{Executor, ExecutorImplementation};
use crate::memory::{Buffer, MemoryArgs};
use crate::reference::{Dense, ReferenceImplementation, broadcast, cast, evaluate};
use crate::subgraph::SubgraphAttrs;
use crate::test::helpers::*;

fn iota(n: usize) -> Vec<f64> {
    (0..n).map(|i| i as f64).collect()
}

#[test]
fn test_broadcasting_binary() {
    let mut g = Graph::new("bias");
    let x = param(&mut g, "x", ElementType::F32, &[2, 3]);
    let b = param(&mut g, "b", ElementType::F32, &[3]);
    let add = binary(&mut g, "add", BinaryOp::Add, x, b);
    g.add_result("out", add.into()).unwrap();

    let out = eval_one(&g, &[(&[2, 3], iota(6)), (&[3], vec![10.0, 20.0, 30.0])]);
    assert_eq!(out, [10.0, 21.0, 32.0, 13.0, 24.0, 35.0]);
}

#[test_case(ElementType::I32, &[7.0, -7.0, 9.0], &[2.0, 2.0, -4.0], &[3.0, -3.0, -2.0]; "truncating integer")]
#[test_case(ElementType::F32, &[7.0, -7.0, 1.0], &[2.0, 2.0, 4.0], &[3.5, -3.5, 0.25]; "float")]
fn test_division(element_type: ElementType, a: &[f64], b: &[f64], expected: &[f64]) {
    let mut g = Graph::new("div");
    let x = param(&mut g, "a", element_type, &[3]);
    let y = param(&mut g, "b", element_type, &[3]);
    let div = binary(&mut g, "div", BinaryOp::Div, x, y);
    g.add_result("out", div.into()).unwrap();
    assert_eq!(eval_one(&g, &[(&[3], a.to_vec()), (&[3], b.to_vec())]), expected);
}

#[test]
fn test_f32_rounding_between_ops() {
    let mut g = Graph::new("round");
    let x = param(&mut g, "x", ElementType::F32, &[1]);
    let third = g.add_constant("third", Constant::scalar(ElementType::F32, 3.0));
    let div = binary(&mut g, "div", BinaryOp::Div, x, third);
    g.add_result("out", div.into()).unwrap();
    assert_eq!(eval_one(&g, &[(&[1], vec![1.0])]), [(1.0f32 / 3.0) as f64]);
}

#[test]
fn test_select_broadcasts_all_inputs() {
    let mut g = Graph::new("select");
    let c = param(&mut g, "c", ElementType::Boolean, &[4]);
    let t = param(&mut g, "t", ElementType::F32, &[4]);
    let e = g.add_constant("e", Constant::scalar(ElementType::F32, -1.0));
    let sel = g.add_op("select", Op::Select, &[c.into(), t.into(), e.into()]).unwrap();
    g.add_result("out", sel.into()).unwrap();

    let out = eval_one(&g, &[(&[4], vec![1.0, 0.0, 0.0, 1.0]), (&[4], vec![5.0, 6.0, 7.0, 8.0])]);
    assert_eq!(out, [5.0, -1.0, -1.0, 8.0]);
}

#[test_case(ElementType::I32, &[1.0, -1.0, 300.0]; "to i32")]
#[test_case(ElementType::U8, &[1.0, 0.0, 255.0]; "to u8 saturates")]
#[test_case(ElementType::Boolean, &[1.0, 1.0, 1.0]; "to boolean")]
fn test_convert(to: ElementType, expected: &[f64]) {
    let mut g = Graph::new("convert");
    let x = param(&mut g, "x", ElementType::F32, &[3]);
    let cvt = g.add_op("cvt", Op::Convert { to }, &[x.into()]).unwrap();
    g.add_result("out", cvt.into()).unwrap();
    assert_eq!(eval_one(&g, &[(&[3], vec![1.7, -1.7, 300.0])]), expected);
}

#[test]
fn test_fake_quantize() {
    let mut g = Graph::new("fq");
    let x = param(&mut g, "x", ElementType::F32, &[5]);
    let ranges: Vec<Output> = [0.0, 1.0, 0.0, 10.0]
        .iter()
        .enumerate()
        .map(|(i, &v)| g.add_constant(format!("r{i}"), Constant::scalar(ElementType::F32, v)).into())
        .collect();
    let inputs = [x.into(), ranges[0], ranges[1], ranges[2], ranges[3]];
    let fq = g.add_op("fq", Op::FakeQuantize { levels: 3 }, &inputs).unwrap();
    g.add_result("out", fq.into()).unwrap();

    let out = eval_one(&g, &[(&[5], vec![-1.0, 0.0, 0.3, 0.8, 2.0])]);
    assert_eq!(out, [0.0, 0.0, 5.0, 10.0, 10.0]);
}

#[test_case(&[1, 0], &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]; "explicit order")]
#[test_case(&[], &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]; "empty order reverses")]
#[test_case(&[0, 1], &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]; "identity")]
fn test_transpose(order: &[i64], expected: &[f64]) {
    let mut g = Graph::new("transpose");
    let x = param(&mut g, "x", ElementType::F32, &[2, 3]);
    let order = g.add_constant("order", Constant::indices(order));
    let t = g.add_op("t", Op::Transpose, &[x.into(), order.into()]).unwrap();
    g.add_result("out", t.into()).unwrap();
    assert_eq!(eval_one(&g, &[(&[2, 3], iota(6))]), expected);
}

#[test]
fn test_softmax_rows_sum_to_one() {
    let mut g = Graph::new("softmax");
    let x = param(&mut g, "x", ElementType::F64, &[2, 3]);
    let sm = g.add_op("sm", Op::Softmax { axis: -1 }, &[x.into()]).unwrap();
    g.add_result("out", sm.into()).unwrap();

    let out = eval_one(&g, &[(&[2, 3], vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0])]);
    for v in &out[..3] {
        assert!((v - 1.0 / 3.0).abs() < 1e-12);
    }
    assert!((out[3..].iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert!(out[3] < out[4] && out[4] < out[5]);
}

#[test_case(false, &[3, 2]; "plain")]
#[test_case(true, &[2, 3]; "transposed b")]
fn test_matmul(transpose_b: bool, b_dims: &[usize]) {
    let mut g = Graph::new("mm");
    let a = param(&mut g, "a", ElementType::F32, &[2, 3]);
    let b = param(&mut g, "b", ElementType::F32, b_dims);
    let mm = g.add_op("mm", Op::MatMul { transpose_a: false, transpose_b }, &[a.into(), b.into()]).unwrap();
    g.add_result("out", mm.into()).unwrap();

    let b_values = if transpose_b { vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0] } else { iota(6) };
    let out = eval_one(&g, &[(&[2, 3], iota(6)), (b_dims, b_values)]);
    assert_eq!(out, [10.0, 13.0, 28.0, 40.0]);
}

#[test]
fn test_matmul_broadcasts_batch() {
    let mut g = Graph::new("bmm");
    let a = param(&mut g, "a", ElementType::F32, &[2, 2, 2]);
    let b = param(&mut g, "b", ElementType::F32, &[2, 1]);
    let mm = g.add_op("mm", Op::MatMul { transpose_a: false, transpose_b: false }, &[a.into(), b.into()]).unwrap();
    g.add_result("out", mm.into()).unwrap();
    assert_eq!(eval_one(&g, &[(&[2, 2, 2], iota(8)), (&[2, 1], vec![1.0, 1.0])]), [1.0, 5.0, 9.0, 13.0]);
}

#[test]
fn test_split_outputs() {
    let mut g = Graph::new("split");
    let x = param(&mut g, "x", ElementType::F32, &[2, 4]);
    let split = g.add_op("split", Op::Split { axis: 1, num_splits: 2 }, &[x.into()]).unwrap();
    g.add_result("lo", Output::new(split, 0)).unwrap();
    g.add_result("hi", Output::new(split, 1)).unwrap();

    let outputs = evaluate(&g, &[Dense::new(&[2, 4], iota(8))]).unwrap();
    assert_eq!(outputs[0], Dense::new(&[2, 2], vec![0.0, 1.0, 4.0, 5.0]));
    assert_eq!(outputs[1], Dense::new(&[2, 2], vec![2.0, 3.0, 6.0, 7.0]));
}

#[test]
fn test_lowered_ops() {
    let mut g = Graph::new("lowered");
    let x = param(&mut g, "x", ElementType::F32, &[8]);
    let bias = param(&mut g, "bias", ElementType::F32, &[3]);
    let load = g
        .add_op("load", Op::BroadcastLoad(BroadcastLoad::new(8, LayoutClass::Planar).with_offset(4)), &[bias.into()])
        .unwrap();
    let scratch = g.add_op("scratch", Op::VectorBuffer(VectorBuffer { element_type: ElementType::F32 }), &[]).unwrap();
    let add = binary(&mut g, "add", BinaryOp::Add, x, load);
    let out = binary(&mut g, "keep", BinaryOp::Add, add, scratch);
    g.add_result("out", out.into()).unwrap();

    let out = eval_one(&g, &[(&[8], iota(8)), (&[3], vec![100.0, 10.0, 1000.0])]);
    assert_eq!(out, iota(8).iter().map(|v| v + 10.0).collect::<Vec<_>>());
}

#[test]
fn test_nested_subgraph() {
    let inner = add_relu(&[4]);
    let mut g = Graph::new("outer");
    let a = param(&mut g, "a", ElementType::F32, &[4]);
    let b = param(&mut g, "b", ElementType::F32, &[4]);
    let sg = g.add_op("sg", Op::Subgraph(Box::new(Subgraph::new(inner))), &[a.into(), b.into()]).unwrap();
    let neg = unary(&mut g, "neg", UnaryOp::Neg, sg);
    g.add_result("out", neg.into()).unwrap();

    let out = eval_one(&g, &[(&[4], vec![-3.0, -1.0, 1.0, 3.0]), (&[4], vec![1.0; 4])]);
    assert_eq!(out, [0.0, 0.0, -2.0, -4.0]);
}

#[test]
fn test_input_count_checked() {
    let err = evaluate(&add_relu(&[2]), &[Dense::new(&[2], vec![0.0; 2])]).unwrap_err();
    assert!(matches!(err, crate::Error::BufferCount { expected: 2, actual: 1, .. }), "{err}");
}

#[test]
fn test_nested_body_follows_outer_shapes() {
    let inner = add_relu(&[4]);
    let mut g = Graph::new("outer");
    let a = param(&mut g, "a", ElementType::F32, &[2, 4]);
    let b = param(&mut g, "b", ElementType::F32, &[4]);
    let sg = g.add_op("sg", Op::Subgraph(Box::new(Subgraph::new(inner))), &[a.into(), b.into()]).unwrap();
    g.add_result("out", sg.into()).unwrap();

    let out = eval_one(&g, &[(&[2, 4], iota(8)), (&[4], vec![-4.0; 4])]);
    assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_input_shape_checked() {
    let err = evaluate(&add_relu(&[2]), &[Dense::new(&[3], vec![0.0; 3]), Dense::new(&[2], vec![0.0; 2])]).unwrap_err();
    assert!(matches!(err, crate::Error::ShapeMismatch { .. }), "{err}");

    let ragged = Dense::new(&[2], vec![0.0; 1]);
    let err = evaluate(&add_relu(&[2]), &[ragged, Dense::new(&[2], vec![0.0; 2])]).unwrap_err();
    assert!(matches!(err, crate::Error::ShapeMismatch { .. }), "{err}");
}

#[test_case(&[3], &[2, 4]; "trailing dim differs")]
#[test_case(&[2, 2, 4], &[2, 4]; "higher rank")]
fn test_broadcast_rejects_incompatible(src: &[usize], shape: &[usize]) {
    let src = Dense::new(src, iota(src.iter().product()));
    assert!(matches!(broadcast(&src, shape), Err(crate::Error::ShapeMismatch { .. })));
}

#[test]
fn test_executor_rejects_inputs_it_was_not_updated_for() {
    let attrs = SubgraphAttrs::new(add_relu(&[2]));
    let (a, b) = (f32_buffer(&[2], &[1.0, 2.0]), f32_buffer(&[2], &[1.0, 2.0]));
    let mut exec = ReferenceImplementation
        .create(&attrs, &MemoryArgs::new(vec![&a, &b], vec![]), &Arc::default())
        .unwrap();
    assert!(exec.update(&MemoryArgs::new(vec![&a, &b], vec![])).unwrap());

    let (wide_a, wide_b) = (f32_buffer(&[5], &[1.0; 5]), f32_buffer(&[5], &[1.0; 5]));
    let mut out = Buffer::zeros(ElementType::F32, &[5]);
    let mut memory = MemoryArgs::new(vec![&wide_a, &wide_b], vec![&mut out]);
    assert!(matches!(exec.execute(&mut memory), Err(crate::Error::ShapeMismatch { .. })));
}

#[test]
fn test_executor_declines_fill() {
    let mut g = Graph::new("fill");
    let x = param(&mut g, "x", ElementType::F32, &[8]);
    let fill = g.add_op("tail", Op::Fill(Fill::new(2, 0)), &[x.into()]).unwrap();
    g.add_result("out", fill.into()).unwrap();

    let src = Buffer::zeros(ElementType::F32, &[8]);
    let memory = MemoryArgs::new(vec![&src], vec![]);
    let attrs = SubgraphAttrs::new(g);
    let mut exec = ReferenceImplementation.create(&attrs, &memory, &Arc::new(ExecutorContext::default())).unwrap();
    assert!(!exec.update(&memory).unwrap());
}

#[test]
fn test_executor_follows_shape_changes() {
    let attrs = SubgraphAttrs::new(add_relu(&[2]));
    let context = Arc::new(ExecutorContext::default());
    let a = f32_buffer(&[5], &[-2.0, -1.0, 0.0, 1.0, 2.0]);
    let b = f32_buffer(&[5], &[0.5; 5]);
    let mut out = Buffer::zeros(ElementType::F32, &[5]);

    let mut memory = MemoryArgs::new(vec![&a, &b], vec![&mut out]);
    assert!(ReferenceImplementation.accepts_shapes(&attrs, &memory));
    let mut exec = ReferenceImplementation.create(&attrs, &memory, &context).unwrap();
    assert!(matches!(exec.execute(&mut memory), Err(crate::Error::NotUpdated)));
    assert!(exec.update(&memory).unwrap());
    exec.execute(&mut memory).unwrap();
    drop(memory);
    assert_eq!(out.to_vec::<f32>().unwrap(), [0.0, 0.0, 0.5, 1.5, 2.5]);
}

#[test]
fn test_executor_checks_output_shape() {
    let attrs = SubgraphAttrs::new(add_relu(&[2]));
    let (a, b) = (f32_buffer(&[2], &[1.0, 2.0]), f32_buffer(&[2], &[1.0, 2.0]));
    let mut out = Buffer::zeros(ElementType::F32, &[3]);
    let mut memory = MemoryArgs::new(vec![&a, &b], vec![&mut out]);
    let mut exec = ReferenceImplementation.create(&attrs, &memory, &Arc::default()).unwrap();
    assert!(exec.update(&memory).unwrap());
    assert!(matches!(exec.execute(&mut memory), Err(crate::Error::BufferSize { .. })));
}

#[test]
fn test_rejects_mismatched_element_types() {
    let attrs = SubgraphAttrs::new(add_relu(&[2]));
    let a = Buffer::zeros(ElementType::I32, &[2]);
    let b = Buffer::zeros(ElementType::F32, &[2]);
    assert!(!ReferenceImplementation.accepts_shapes(&attrs, &MemoryArgs::new(vec![&a, &b], vec![])));
}

proptest! {
    #[test]
    fn test_broadcast_matches_indexing(rows in 1usize..5, cols in 1usize..5, row_vector in any::<bool>()) {
        let src = if row_vector {
            Dense::new(&[cols], iota(cols))
        } else {
            Dense::new(&[rows, 1], iota(rows))
        };
        let out = broadcast(&src, &[rows, cols]).unwrap();
        prop_assert_eq!(out.len(), rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let expected = (if row_vector { c } else { r }) as f64;
                prop_assert_eq!(out[r * cols + c], expected);
            }
        }
    }

    #[test]
    fn test_cast_is_idempotent(value in -1e6f64..1e6) {
        for et in [ElementType::I8, ElementType::U16, ElementType::I32, ElementType::F32, ElementType::Boolean] {
            let once = cast(value, et);
            prop_assert_eq!(cast(once, et), once);
        }
    }
}
