//! Dispatch over JIT kernels and the interpreter. JIT assertions are skipped on
//! hosts without a 128-bit profile.

use std::sync::Arc;

use proptest::prelude::*;
use rayon::prelude::*;
use weld_codegen::KernelConfig;
use weld_ir::{BinaryOp, Constant, ElementType, Graph, Op, UnaryOp};
use weld_schedule::{TokenizationConfig, TokenizationPass};

use crate::context::ExecutorContext;
use crate::error::Error;
use crate::executor::{Executor, ExecutorImplementation, ImplementationKind};
use crate::jit::JitExecutor;
use crate::memory::{Buffer, MemoryArgs};
use crate::reference::{Dense, evaluate};
use crate::subgraph::{result_buffers, subgraph_executor, subgraph_implementations};
use crate::test::helpers::*;

/// (relu(a + b) * a) - b
fn mixed(n: usize) -> Graph {
    let mut g = Graph::new("mixed");
    let a = param(&mut g, "a", ElementType::F32, &[n]);
    let b = param(&mut g, "b", ElementType::F32, &[n]);
    let add = binary(&mut g, "add", BinaryOp::Add, a, b);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, add);
    let mul = binary(&mut g, "mul", BinaryOp::Mul, relu, a);
    let sub = binary(&mut g, "sub", BinaryOp::Sub, mul, b);
    g.add_result("out", sub.into()).unwrap();
    g
}

fn run(body: &Graph, context: ExecutorContext, inputs: &[Buffer]) -> (crate::Result<crate::SubgraphExecutor>, Vec<Buffer>) {
    let srcs: Vec<&Buffer> = inputs.iter().collect();
    let mut outs = result_buffers(body, &srcs).unwrap();
    let exec = subgraph_executor(body.clone(), &MemoryArgs::new(srcs.clone(), vec![]), Arc::new(context));
    if let Ok(exec) = &exec {
        exec.execute(&mut MemoryArgs::new(srcs, outs.iter_mut().collect())).unwrap();
    }
    (exec, outs)
}

fn reference(body: &Graph, inputs: &[Buffer]) -> Vec<f64> {
    let dense: Vec<Dense> = inputs.iter().map(|b| Dense::from_buffer(b).unwrap()).collect();
    evaluate(body, &dense).unwrap().remove(0).data
}

#[test]
fn test_dispatch_table_order() {
    let context = ExecutorContext::default();
    let names: Vec<String> = subgraph_implementations(&context).iter().map(|i| i.name().to_string()).collect();
    assert_eq!(names.last().map(String::as_str), Some("ref"));

    let jit = &names[..names.len() - 1];
    let widths: Vec<usize> = weld_codegen::Isa::dispatch_table().iter().map(|isa| isa.vlen()).collect();
    assert_eq!(jit.len(), widths.len());
    assert!(widths.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_pinned_profile_and_disabled_reference() {
    let Some(isa) = host_isa() else { return };
    let context = ExecutorContext::builder()
        .kernel_config(KernelConfig::builder().isa(isa).build())
        .disable_reference(true)
        .build();
    let names: Vec<String> = subgraph_implementations(&context).iter().map(|i| i.name().to_string()).collect();
    assert_eq!(names, [format!("jit_{isa}")]);
}

#[test]
fn test_jit_selected_when_available() {
    let inputs = [f32_buffer(&[6], &[-3.0, -2.0, -1.0, 1.0, 2.0, 3.0]), f32_buffer(&[6], &[1.0; 6])];
    let (exec, outs) = run(&add_relu(&[6]), ExecutorContext::default(), &inputs);
    let exec = exec.unwrap();
    if host_isa().is_some() {
        assert!(matches!(exec.implementation_kind(), ImplementationKind::Jit(_)));
    } else {
        assert_eq!(exec.active_name(), Some("ref"));
    }
    assert_eq!(outs[0].to_vec::<f32>().unwrap(), [0.0, 0.0, 0.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_unsupported_op_falls_back_to_reference() {
    let mut g = Graph::new("exp");
    let x = param(&mut g, "x", ElementType::F32, &[2]);
    let exp = unary(&mut g, "exp", UnaryOp::Exp, x);
    g.add_result("out", exp.into()).unwrap();

    let (exec, outs) = run(&g, ExecutorContext::default(), &[f32_buffer(&[2], &[0.0, 1.0])]);
    let exec = exec.unwrap();
    assert_eq!(exec.active_name(), Some("ref"));
    assert_eq!(exec.implementation_kind(), ImplementationKind::Reference);
    assert_eq!(outs[0].to_vec::<f32>().unwrap(), [1.0, std::f64::consts::E as f32]);

    let context = ExecutorContext::builder().disable_reference(true).build();
    let (exec, _) = run(&g, context, &[f32_buffer(&[2], &[0.0, 1.0])]);
    assert!(matches!(exec.err().unwrap(), Error::NoImplementation { .. }));
}

#[test]
fn test_non_jit_element_type_uses_reference() {
    let mut g = Graph::new("i64");
    let a = param(&mut g, "a", ElementType::I64, &[3]);
    let neg = unary(&mut g, "neg", UnaryOp::Neg, a);
    g.add_result("out", neg.into()).unwrap();

    let (exec, outs) = run(&g, ExecutorContext::default(), &[Buffer::from_slice(&[3], &[1i64, -2, 3]).unwrap()]);
    assert_eq!(exec.unwrap().active_name(), Some("ref"));
    assert_eq!(outs[0].to_vec::<i64>().unwrap(), [-1, 2, -3]);
}

#[test]
fn test_shape_change_reuses_kernels() {
    let Some(isa) = host_isa() else { return };
    let body = add_relu(&[4]);
    let mut exec = JitExecutor::new(body, isa, KernelConfig::builder().isa(isa).build());
    let update = |exec: &mut JitExecutor, n: usize| {
        let (a, b) = (Buffer::zeros(ElementType::F32, &[n]), Buffer::zeros(ElementType::F32, &[n]));
        exec.update(&MemoryArgs::new(vec![&a, &b], vec![])).unwrap()
    };

    for n in [4, 4, 19, 4, 19, 1] {
        assert!(update(&mut exec, n));
    }
    assert_eq!(exec.kernel_count(), 3);
}

#[test]
fn test_executor_rejects_stale_buffers() {
    let Some(isa) = host_isa() else { return };
    let mut exec = JitExecutor::new(add_relu(&[4]), isa, KernelConfig::default());
    let (a, b) = (Buffer::zeros(ElementType::F32, &[4]), Buffer::zeros(ElementType::F32, &[4]));
    assert!(matches!(exec.execute(&mut MemoryArgs::new(vec![&a, &b], vec![])), Err(Error::NotUpdated)));
    assert!(exec.update(&MemoryArgs::new(vec![&a, &b], vec![])).unwrap());

    let big = Buffer::zeros(ElementType::F32, &[8]);
    let mut out = Buffer::zeros(ElementType::F32, &[4]);
    let err = exec.execute(&mut MemoryArgs::new(vec![&big, &b], vec![&mut out])).unwrap_err();
    assert!(matches!(err, Error::BufferSize { .. }), "{err}");

    let err = exec.execute(&mut MemoryArgs::new(vec![&a, &b], vec![])).unwrap_err();
    assert!(matches!(err, Error::BufferCount { what: "output", expected: 1, actual: 0 }), "{err}");
}

#[test]
fn test_concurrent_execution() {
    let n = 37;
    let body = mixed(n);
    let (a, b) = (Buffer::zeros(ElementType::F32, &[n]), Buffer::zeros(ElementType::F32, &[n]));
    let exec = subgraph_executor(body, &MemoryArgs::new(vec![&a, &b], vec![]), Arc::default()).unwrap();

    (0..16).into_par_iter().for_each(|t| {
        let a = f32_buffer(&[n], &vec![t as f32; n]);
        let b = f32_buffer(&[n], &vec![1.0; n]);
        let mut out = Buffer::zeros(ElementType::F32, &[n]);
        exec.execute(&mut MemoryArgs::new(vec![&a, &b], vec![&mut out])).unwrap();
        let expected = (t as f32 + 1.0) * t as f32 - 1.0;
        assert!(out.to_vec::<f32>().unwrap().iter().all(|&v| v == expected));
    });
}

#[test]
fn test_tokenized_model_runs_end_to_end() {
    let mut g = Graph::new("model");
    let x = param(&mut g, "x", ElementType::F32, &[2, 8]);
    let y = param(&mut g, "y", ElementType::F32, &[2, 8]);
    let add = binary(&mut g, "add", BinaryOp::Add, x, y);
    let relu = unary(&mut g, "relu", UnaryOp::Relu, add);
    let two = g.add_constant("two", Constant::scalar(ElementType::F32, 2.0));
    let mul = binary(&mut g, "mul", BinaryOp::Mul, relu, two);
    g.add_result("out", mul.into()).unwrap();

    TokenizationPass::new(TokenizationConfig::default()).run(&mut g).unwrap();
    let body = g
        .nodes()
        .find_map(|n| match n.op() {
            Op::Subgraph(sg) => Some(sg.body().clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(body.parameters().len(), 2);

    let xs: Vec<f32> = (0..16).map(|i| i as f32 - 8.0).collect();
    let inputs = [f32_buffer(&[2, 8], &xs), f32_buffer(&[2, 8], &[0.5; 16])];
    let (exec, outs) = run(&body, ExecutorContext::default(), &inputs);
    exec.unwrap();
    let expected: Vec<f32> = xs.iter().map(|v| (v + 0.5).max(0.0) * 2.0).collect();
    assert_eq!(outs[0].to_vec::<f32>().unwrap(), expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_jit_matches_reference(values in prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0), 1..70)) {
        let n = values.len();
        let (a, b): (Vec<f32>, Vec<f32>) = values.into_iter().unzip();
        let inputs = [f32_buffer(&[n], &a), f32_buffer(&[n], &b)];
        let body = mixed(n);

        let (exec, outs) = run(&body, ExecutorContext::default(), &inputs);
        let exec = exec.unwrap();
        prop_assert_eq!(exec.implementation_kind() != ImplementationKind::Reference, host_isa().is_some());
        prop_assert_eq!(outs[0].read_f64().unwrap(), reference(&body, &inputs));
    }
}
