//! Mutable dataflow graph.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Edges are stored on the
//! consumer side only (`Node::inputs`), so consumer queries scan the arena. Removed
//! nodes leave a hole; ids are never reused within one graph.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tracing::trace;
use weld_dtype::ElementType;

use crate::constant::Constant;
use crate::error::*;
use crate::op::{InferInput, Op, Ports};
use crate::rt_info::RtInfo;
use crate::shape::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Producer side of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub node: NodeId,
    pub index: usize,
}

impl Output {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl From<NodeId> for Output {
    fn from(node: NodeId) -> Self {
        Self { node, index: 0 }
    }
}

/// Consumer side of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Input {
    pub node: NodeId,
    pub index: usize,
}

impl Input {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub element_type: ElementType,
    pub shape: Shape,
}

impl PortInfo {
    pub fn new(element_type: ElementType, shape: Shape) -> Self {
        Self { element_type, shape }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    op: Op,
    inputs: SmallVec<[Output; 4]>,
    outputs: Ports,
    name: String,
    rt_info: RtInfo,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn op_mut(&mut self) -> &mut Op {
        &mut self.op
    }

    pub fn inputs(&self) -> &[Output] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortInfo] {
        &self.outputs
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rt_info(&self) -> &RtInfo {
        &self.rt_info
    }

    pub fn rt_info_mut(&mut self) -> &mut RtInfo {
        &mut self.rt_info
    }

    pub fn output(&self, index: usize) -> Output {
        Output::new(self.id, index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    name: String,
    nodes: Vec<Option<Node>>,
    parameters: Vec<NodeId>,
    results: Vec<NodeId>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn results(&self) -> &[NodeId] {
        &self.results
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id).context(NodeNotFoundSnafu { id })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut).context(NodeNotFoundSnafu { id })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().map(Node::id)
    }

    pub fn output_port(&self, output: Output) -> Result<&PortInfo> {
        let node = self.node(output.node)?;
        node.outputs.get(output.index).context(OutputOutOfRangeSnafu {
            id: output.node,
            index: output.index,
            count: node.outputs.len(),
        })
    }

    pub fn constant(&self, id: NodeId) -> Option<&Constant> {
        self.get(id).and_then(|n| n.op.as_constant())
    }

    pub fn parameter_index(&self, id: NodeId) -> Option<usize> {
        self.parameters.iter().position(|&p| p == id)
    }

    pub fn result_index(&self, id: NodeId) -> Option<usize> {
        self.results.iter().position(|&r| r == id)
    }

    pub fn parameter_ports(&self) -> Result<Ports> {
        self.parameters.iter().map(|&p| self.output_port(Output::from(p)).cloned()).collect()
    }

    /// Ports feeding each result, in result order.
    pub fn result_ports(&self) -> Result<Ports> {
        self.result_sources()?.into_iter().map(|src| self.output_port(src).cloned()).collect()
    }

    pub fn result_sources(&self) -> Result<Vec<Output>> {
        self.results.iter().map(|&r| self.input_value(Input::new(r, 0))).collect()
    }

    // Construction.

    fn infer_inputs(&self, inputs: &[Output]) -> Result<Vec<InferInput>> {
        inputs
            .iter()
            .map(|&src| {
                let port = self.output_port(src)?.clone();
                let constant = self.constant(src.node).cloned();
                Ok(InferInput { port, constant })
            })
            .collect()
    }

    fn push(&mut self, op: Op, inputs: &[Output], outputs: Ports, name: String, rt_info: RtInfo) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        if op.is_parameter() {
            self.parameters.push(id);
        } else if op.is_result() {
            self.results.push(id);
        }
        self.nodes.push(Some(Node { id, op, inputs: inputs.into(), outputs, name, rt_info }));
        id
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, element_type: ElementType, shape: Shape) -> NodeId {
        let outputs = SmallVec::from_elem(PortInfo::new(element_type, shape.clone()), 1);
        self.push(Op::Parameter { element_type, shape }, &[], outputs, name.into(), RtInfo::default())
    }

    pub fn add_constant(&mut self, name: impl Into<String>, constant: Constant) -> NodeId {
        let outputs = SmallVec::from_elem(PortInfo::new(constant.element_type(), constant.shape()), 1);
        self.push(Op::Constant(constant), &[], outputs, name.into(), RtInfo::default())
    }

    /// Add an op after running its shape/type inference on `inputs`.
    pub fn add_op(&mut self, name: impl Into<String>, op: Op, inputs: &[Output]) -> Result<NodeId> {
        let outputs = op.infer(&self.infer_inputs(inputs)?)?;
        Ok(self.push(op, inputs, outputs, name.into(), RtInfo::default()))
    }

    pub fn add_result(&mut self, name: impl Into<String>, source: Output) -> Result<NodeId> {
        self.add_op(name, Op::Result, &[source])
    }

    /// Copy `node` (op, name, metadata) from another graph, wired to `inputs` of this one.
    pub fn insert_node(&mut self, node: &Node, inputs: &[Output]) -> Result<NodeId> {
        let outputs = node.op.infer(&self.infer_inputs(inputs)?)?;
        Ok(self.push(node.op.clone(), inputs, outputs, node.name.clone(), node.rt_info.clone()))
    }

    // Queries.

    /// Every input fed by `output`, ordered by consumer id.
    pub fn consumers(&self, output: Output) -> Vec<Input> {
        self.nodes()
            .flat_map(|n| {
                n.inputs.iter().enumerate().filter(move |(_, src)| **src == output).map(move |(i, _)| Input::new(n.id, i))
            })
            .collect()
    }

    /// Distinct nodes consuming any output of `id`.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes().filter(|n| n.inputs.iter().any(|src| src.node == id)).map(Node::id).collect()
    }

    pub fn input_value(&self, input: Input) -> Result<Output> {
        let node = self.node(input.node)?;
        node.inputs.get(input.index).copied().context(InputOutOfRangeSnafu {
            id: input.node,
            index: input.index,
            count: node.inputs.len(),
        })
    }

    // Rewiring.

    pub fn replace_source(&mut self, input: Input, source: Output) -> Result<()> {
        self.output_port(source)?;
        let node = self.node_mut(input.node)?;
        let count = node.inputs.len();
        let slot =
            node.inputs.get_mut(input.index).context(InputOutOfRangeSnafu { id: input.node, index: input.index, count })?;
        *slot = source;
        Ok(())
    }

    /// Rewire every consumer of `old` to read `new`. Inputs of `new`'s own node are
    /// left alone so the replacement may consume what it replaces.
    pub fn replace_output(&mut self, old: Output, new: Output) -> Result<()> {
        self.output_port(new)?;
        for input in self.consumers(old) {
            if input.node != new.node {
                self.replace_source(input, new)?;
            }
        }
        Ok(())
    }

    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let old_outputs = self.node(old)?.outputs.len();
        let new_outputs = self.node(new)?.outputs.len();
        ensure!(old_outputs == new_outputs, ReplaceAritySnafu { old, new, old_outputs, new_outputs });
        for index in 0..old_outputs {
            self.replace_output(Output::new(old, index), Output::new(new, index))?;
        }
        trace!(%old, %new, "node replaced");
        Ok(())
    }

    /// Remove a node nothing reads from.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        self.node(id)?;
        let count = self.users(id).len();
        ensure!(count == 0, NodeInUseSnafu { id, count });
        self.parameters.retain(|&p| p != id);
        self.results.retain(|&r| r != id);
        self.nodes[id.index()].take().context(NodeNotFoundSnafu { id })
    }

    // Ordering.

    /// Deterministic topological order; ties break by ascending id.
    pub fn ordered_ops(&self) -> Result<Vec<NodeId>> {
        let mut pending = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for node in self.nodes() {
            for src in &node.inputs {
                pending[node.id.index()] += 1;
                successors[src.node.index()].push(node.id);
            }
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> =
            self.nodes().filter(|n| n.inputs.is_empty()).map(|n| Reverse(n.id)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &succ in &successors[id.index()] {
                pending[succ.index()] -= 1;
                if pending[succ.index()] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        ensure!(order.len() == self.len(), CycleSnafu { graph: self.name.clone() });
        Ok(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.ordered_ops().is_ok()
    }

    /// Structural check: edges point at live ports, roles match ops, no cycles.
    pub fn validate(&self) -> Result<()> {
        for node in self.nodes() {
            for &src in &node.inputs {
                self.output_port(src)?;
            }
        }
        for &id in &self.parameters {
            let op = &self.node(id)?.op;
            ensure!(op.is_parameter(), RoleMismatchSnafu { id, role: "parameter", op: op.name() });
        }
        for &id in &self.results {
            let op = &self.node(id)?.op;
            ensure!(op.is_result(), RoleMismatchSnafu { id, role: "result", op: op.name() });
        }
        self.ordered_ops().map(|_| ())
    }

    /// Re-run inference over the whole graph in topological order.
    pub fn revalidate(&mut self) -> Result<()> {
        for id in self.ordered_ops()? {
            let node = self.node(id)?;
            let outputs = node.op.infer(&self.infer_inputs(&node.inputs)?)?;
            self.node_mut(id)?.outputs = outputs;
        }
        Ok(())
    }

    /// Give every parameter a new shape and propagate it.
    pub fn reshape_parameters(&mut self, shapes: &[Shape]) -> Result<()> {
        ensure!(
            shapes.len() == self.parameters.len(),
            ParameterCountSnafu { expected: self.parameters.len(), actual: shapes.len() }
        );
        for (id, shape) in self.parameters.clone().into_iter().zip(shapes) {
            if let Op::Parameter { shape: current, .. } = &mut self.node_mut(id)?.op {
                *current = shape.clone();
            }
        }
        self.revalidate()
    }
}
