use weld_ir::{BinaryOp, Constant, ElementType, Graph, Output, UnaryOp};

use crate::test::helpers::*;
use crate::tokenize::tokenize_ordered_nodes;

#[test]
fn test_chain_collapses_into_one_node() {
    let mut g = Graph::new("chain");
    let p0 = param(&mut g, "p0", &[4]);
    let p1 = param(&mut g, "p1", &[4]);
    let add = binary(&mut g, "add", BinaryOp::Add, p0, p1);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, add);
    let out = g.add_result("out", relu.into()).unwrap();

    let sg = tokenize_ordered_nodes(&mut g, &[add, relu]).unwrap();
    assert!(!g.contains(add) && !g.contains(relu));
    assert_eq!(g.len(), 4);

    let node = g.node(sg).unwrap();
    assert_eq!(node.name(), "relu");
    assert_eq!(node.inputs(), &[Output::from(p0), Output::from(p1)]);
    assert_eq!(node.rt_info().original_layers_names(), Some("add,relu,"));
    assert_eq!(g.node(out).unwrap().inputs(), &[Output::from(sg)]);
    assert_eq!(body_ops(&g, sg), vec!["add", "relu"]);
    assert_well_formed(&g);
}

#[test]
fn test_only_last_node_is_observable() {
    let mut g = Graph::new("chain");
    let p0 = param(&mut g, "p0", &[4]);
    let neg = unary(&mut g, "neg", UnaryOp::Neg, p0);
    let abs = unary(&mut g, "abs", UnaryOp::Abs, neg);
    g.add_result("out", abs.into()).unwrap();

    let sg = tokenize_ordered_nodes(&mut g, &[neg, abs]).unwrap();
    let body = g.node(sg).unwrap().op().as_subgraph().unwrap().body();
    assert_eq!(body.results().len(), 1);
    assert_eq!(body.parameters().len(), 1);
}

#[test]
fn test_shared_constant_is_copied() {
    let mut g = Graph::new("shared");
    let p0 = param(&mut g, "p0", &[4]);
    let c = g.add_constant("c", Constant::scalar(ElementType::F32, 0.5));
    let mul = binary(&mut g, "mul", BinaryOp::Mul, p0, c);
    let outside = binary(&mut g, "outside", BinaryOp::Add, p0, c);
    g.add_result("r0", mul.into()).unwrap();
    g.add_result("r1", outside.into()).unwrap();

    let sg = tokenize_ordered_nodes(&mut g, &[mul]).unwrap();
    // Still read by `outside`.
    assert!(g.contains(c));
    assert_eq!(g.node(sg).unwrap().inputs(), &[Output::from(p0)]);
    assert_well_formed(&g);

    tokenize_ordered_nodes(&mut g, &[outside]).unwrap();
    assert!(!g.contains(c));
}

#[test]
fn test_empty_chain_is_fatal() {
    let mut g = Graph::new("empty");
    assert!(matches!(tokenize_ordered_nodes(&mut g, &[]), Err(crate::Error::EmptyChain)));
}
