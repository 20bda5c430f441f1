use test_case::test_case;
use weld_ir::shape::static_shape;
use weld_ir::{Constant, ElementType, Graph, NodeId, Op, Output, UnaryOp};

use crate::budget::*;
use crate::config::TokenizationConfig;
use crate::test::helpers::*;

fn constant(g: &mut Graph, name: &str, values: &[f64]) -> NodeId {
    let c = if values.len() == 1 {
        Constant::scalar(ElementType::F32, values[0])
    } else {
        Constant::new(ElementType::F32, &[values.len()], values.to_vec()).unwrap()
    };
    g.add_constant(name, c)
}

fn fake_quantize(il: &[f64], ih: &[f64], ol: &[f64], oh: &[f64], levels: usize) -> (Graph, NodeId) {
    let mut g = Graph::new("fq");
    let x = param(&mut g, "x", &[1, 3]);
    let il = constant(&mut g, "il", il);
    let ih = constant(&mut g, "ih", ih);
    let ol = constant(&mut g, "ol", ol);
    let oh = constant(&mut g, "oh", oh);
    let fq = g
        .add_op("fq", Op::FakeQuantize { levels }, &[x.into(), il.into(), ih.into(), ol.into(), oh.into()])
        .unwrap();
    g.add_result("out", fq.into()).unwrap();
    (g, fq)
}

#[test_case(&[0.0], &[255.0], &[0.0], &[255.0], 256 => 0; "scalar ranges")]
#[test_case(&[0.0, 1.0, 2.0], &[10.0], &[0.0], &[255.0], 256 => 3; "per channel input low, identity output")]
#[test_case(&[0.0, 1.0, 2.0], &[10.0], &[0.0], &[1.0, 2.0, 3.0], 256 => 4; "per channel output scale")]
#[test_case(&[0.0, 1.0, 2.0], &[3.0, 4.0, 5.0], &[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 256 => 4; "uniform width still shifts")]
#[test_case(&[0.0, 1.0, 2.0], &[10.0], &[0.0], &[1.0], 1 => 0; "degenerate levels")]
fn test_fake_quantize_hidden_count(il: &[f64], ih: &[f64], ol: &[f64], oh: &[f64], levels: usize) -> usize {
    let (g, fq) = fake_quantize(il, ih, ol, oh, levels);
    fake_quantize_hidden_count(&g, fq).unwrap()
}

#[test]
fn test_fake_quantize_dynamic_ranges_count_zero() {
    let mut g = Graph::new("fq");
    let x = param(&mut g, "x", &[1, 3]);
    let mut inputs: Vec<Output> = vec![x.into()];
    for i in 0..4 {
        inputs.push(param(&mut g, &format!("r{i}"), &[3]).into());
    }
    let fq = g.add_op("fq", Op::FakeQuantize { levels: 256 }, &inputs).unwrap();
    assert_eq!(fake_quantize_hidden_count(&g, fq).unwrap(), 0);
}

#[test]
fn test_non_fake_quantize_counts_zero() {
    let mut g = Graph::new("relu");
    let x = param(&mut g, "x", &[4]);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, x);
    assert_eq!(fake_quantize_hidden_count(&g, relu).unwrap(), 0);
}

fn transpose(g: &mut Graph, name: &str, x: NodeId) -> NodeId {
    let order = g.add_constant(format!("{name}/order"), Constant::indices(&[1, 0]));
    g.add_op(name, Op::Transpose, &[x.into(), order.into()]).unwrap()
}

fn count_all(g: &Graph) -> usize {
    estimated_buffer_count(g.ordered_ops().unwrap().into_iter().map(|id| (g, id)))
}

#[test]
fn test_transpose_next_to_parameter_needs_no_buffer() {
    let mut g = Graph::new("t");
    let x = param(&mut g, "x", &[2, 3]);
    let t = transpose(&mut g, "t", x);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, t);
    g.add_result("out", relu.into()).unwrap();
    assert_eq!(count_all(&g), 0);
}

#[test]
fn test_inner_transpose_needs_buffer() {
    let mut g = Graph::new("t");
    let x = param(&mut g, "x", &[2, 3]);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, x);
    let t = transpose(&mut g, "t", relu);
    let neg = unary(&mut g, "neg", UnaryOp::Neg, t);
    g.add_result("out", neg.into()).unwrap();
    assert_eq!(count_all(&g), 1);
}

#[test]
fn test_equal_size_buffers_are_shared() {
    let mut g = Graph::new("t");
    let x = param(&mut g, "x", &[4, 4]);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, x);
    let t = transpose(&mut g, "t", relu);
    let sm = g.add_op("softmax", Op::Softmax { axis: -1 }, &[t.into()]).unwrap();
    g.add_result("out", sm.into()).unwrap();
    assert_eq!(count_all(&g), 1);
}

#[test]
fn test_matmul_buffers() {
    let mut g = Graph::new("mm");
    let a = param(&mut g, "a", &[2, 3]);
    let b = param(&mut g, "b", &[3, 4]);
    let mm = Op::MatMul { transpose_a: false, transpose_b: false };
    let direct = g.add_op("direct", mm.clone(), &[a.into(), b.into()]).unwrap();
    g.add_result("direct/out", direct.into()).unwrap();
    assert_eq!(count_all(&g), 0);

    let mut g = Graph::new("mm");
    let a = param(&mut g, "a", &[2, 3]);
    let b = param(&mut g, "b", &[3, 4]);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, a);
    let inner = g.add_op("inner", mm, &[relu.into(), b.into()]).unwrap();
    let neg = unary(&mut g, "neg", UnaryOp::Neg, inner);
    g.add_result("out", neg.into()).unwrap();
    // Computed lhs and the output each get their own buffer.
    assert_eq!(count_all(&g), 2);
}

#[test]
fn test_estimate_fits() {
    let estimate = ResourceEstimate { parameters: 5, results: 2, hidden: 3, buffers: 1 };
    assert_eq!(estimate.total(), 11);
    assert!(estimate.fits(&TokenizationConfig::default()));
    assert!(!estimate.fits(&TokenizationConfig::builder().data_ptr_gpr_count(10).build()));
}

#[test]
fn test_estimate_subgraph() {
    let mut g = Graph::new("sg");
    let x = param(&mut g, "x", &[4]);
    let y = param(&mut g, "y", &[4]);
    let add = binary(&mut g, "add", weld_ir::BinaryOp::Add, x, y);
    g.add_result("out", add.into()).unwrap();
    let sg = crate::tokenize::wrap_node(&mut g, add).unwrap();

    let estimate = estimate_subgraph(&g, sg).unwrap();
    assert_eq!(estimate, ResourceEstimate { parameters: 2, results: 1, hidden: 0, buffers: 0 });
    assert!(matches!(estimate_subgraph(&g, x), Err(crate::Error::NotASubgraph { .. })));
}

#[test]
fn test_buffers_shared_across_equal_width_types() {
    let mut g = Graph::new("t");
    let x = g.add_parameter("x", ElementType::I32, static_shape(&[8, 2]));
    let abs = g.add_op("abs", Op::Unary(UnaryOp::Abs), &[x.into()]).unwrap();
    let t = transpose(&mut g, "t", abs);
    let sm_input = g.add_op("convert", Op::Convert { to: ElementType::F32 }, &[t.into()]).unwrap();
    let sm = g.add_op("softmax", Op::Softmax { axis: 1 }, &[sm_input.into()]).unwrap();
    g.add_result("out", sm.into()).unwrap();
    // i32 and f32 are both four bytes wide.
    assert_eq!(count_all(&g), 1);
}
