//! Speculative merge workspace.
//!
//! Planning a merge only reads the outer graph. Bodies of the candidate subgraphs
//! are cloned up front and the fused body is assembled into a fresh graph, so an
//! aborted plan is simply dropped. Only [`FusedNode::commit`] touches the graph.

use std::collections::{BTreeMap, HashMap};

use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use weld_ir::{Graph, Input, Node, NodeId, Op, Output, PortInfo, RtInfo, Subgraph, shape::broadcast_all};

use super::node::WrapReason;
use super::{
    inherited_names, remove_orphan_constants, remove_replaced, result_children, result_name, should_inline_constant,
    topological_order,
};
use crate::budget::{ResourceEstimate, estimated_buffer_count, fake_quantize_hidden_count};
use crate::config::TokenizationConfig;
use crate::error::*;

/// Where a body parameter of an absorbed subgraph takes its value from.
#[derive(Debug, Clone, Copy)]
enum Source {
    /// Parameter `k` of the fused body.
    Param(usize),
    /// Result `output` of another absorbed subgraph.
    Inner { sg: NodeId, output: usize },
}

/// Where an input of the tokenized node comes from inside the fused body.
#[derive(Debug, Clone, Copy)]
enum Internal {
    Param(usize),
    Inner { sg: NodeId, output: usize },
    Constant(NodeId),
}

pub(super) enum Plan {
    Commit(FusedNode),
    Abort(WrapReason),
}

pub(super) struct MergeWorkspace<'g> {
    graph: &'g Graph,
    node: &'g Node,
    clones: BTreeMap<NodeId, Graph>,
    /// Subgraphs accepted into the merge, in acceptance order.
    absorbed: Vec<NodeId>,
    /// (max parent order, min child order) over the merge so far.
    bounds: (i64, i64),

    external: Vec<Output>,
    params: Vec<NodeId>,
    bindings: HashMap<(NodeId, usize), Source>,

    body: Graph,
    imported: HashMap<(NodeId, NodeId), NodeId>,
    imported_constants: HashMap<NodeId, NodeId>,

    subgraph_name: String,
    fused_names: String,
    result_children: usize,
}

impl<'g> MergeWorkspace<'g> {
    /// `None` when no input of `id` is an open subgraph.
    pub(super) fn new(graph: &'g Graph, id: NodeId) -> Result<Option<Self>> {
        let node = graph.node(id).context(IrSnafu)?;
        let mut clones = BTreeMap::new();
        for src in node.inputs() {
            let producer = graph.node(src.node).context(IrSnafu)?;
            if super::is_open_subgraph(producer)
                && let Some(sg) = producer.op().as_subgraph()
            {
                clones.entry(src.node).or_insert_with(|| sg.body().clone());
            }
        }
        if clones.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            graph,
            node,
            clones,
            absorbed: Vec::new(),
            bounds: (-1, i64::MAX),
            external: Vec::new(),
            params: Vec::new(),
            bindings: HashMap::new(),
            body: Graph::new(node.name()),
            imported: HashMap::new(),
            imported_constants: HashMap::new(),
            subgraph_name: node.name().to_string(),
            fused_names: String::new(),
            result_children: 0,
        }))
    }

    pub(super) fn plan(mut self, config: &TokenizationConfig) -> Result<Plan> {
        let graph = self.graph;
        let node = self.node;

        if self.introduces_cycle(node.id())? {
            return Ok(Plan::Abort(WrapReason::CyclicDependency));
        }

        let mut internal: SmallVec<[Internal; 4]> = SmallVec::new();
        for (index, &src) in node.inputs().iter().enumerate() {
            let producer = src.node;
            let mergeable = self.clones.contains_key(&producer)
                && (self.absorbed.contains(&producer) || !self.introduces_cycle(producer)?);
            if mergeable {
                if !self.absorbed.contains(&producer)
                    && let Some(reason) = self.absorb(producer)?
                {
                    return Ok(Plan::Abort(reason));
                }
                internal.push(Internal::Inner { sg: producer, output: src.index });
            } else if should_inline_constant(graph, node.op(), index, src) {
                internal.push(Internal::Constant(producer));
            } else {
                let k = match self.external_index(src) {
                    Some(k) => k,
                    None => {
                        let name = graph.node(producer).context(IrSnafu)?.name().to_string();
                        let port = graph.output_port(src).context(IrSnafu)?.clone();
                        self.push_external(src, name, port)
                    }
                };
                internal.push(Internal::Param(k));
            }
        }

        if self.absorbed.is_empty() {
            // Every candidate was rejected by the topological bounds.
            return Ok(Plan::Abort(WrapReason::CyclicDependency));
        }

        self.fused_names.push_str(node.name());
        self.result_children += result_children(graph, node.id());
        if self.result_children > 1 {
            return Ok(Plan::Abort(WrapReason::TooManyResultConsumers));
        }

        let mut inputs: SmallVec<[Output; 4]> = SmallVec::new();
        for item in &internal {
            inputs.push(self.resolve(*item)?);
        }
        let rebuilt = self.body.insert_node(node, &inputs).context(IrSnafu)?;
        let rebuilt_outputs = self.body.node(rebuilt).context(IrSnafu)?.outputs().len();
        ensure!(
            rebuilt_outputs == node.outputs().len(),
            OutputArityMismatchSnafu { node: node.name(), original: node.outputs().len(), rebuilt: rebuilt_outputs }
        );

        // Side outputs: absorbed values still read outside the merge.
        let mut sources: Vec<Output> = Vec::new();
        let mut wiring: Vec<Vec<Input>> = Vec::new();
        for sg in self.absorbed.clone() {
            let outputs = graph.node(sg).context(IrSnafu)?.outputs().len();
            for output in 0..outputs {
                let mut targets: Vec<Input> = Vec::new();
                for target in graph.consumers(Output::new(sg, output)) {
                    if target.node == node.id() || self.absorbed.contains(&target.node) {
                        continue;
                    }
                    ensure!(
                        !targets.contains(&target) && !wiring.iter().any(|w| w.contains(&target)),
                        DuplicateResultWiringSnafu { node: node.name(), consumer: target.node }
                    );
                    targets.push(target);
                }
                if !targets.is_empty() {
                    sources.push(self.import_result(sg, output)?);
                    wiring.push(targets);
                }
            }
        }
        for output in 0..node.outputs().len() {
            sources.push(Output::new(rebuilt, output));
            wiring.push(graph.consumers(Output::new(node.id(), output)));
        }
        ensure!(
            sources.len() == wiring.len(),
            ResultCountMismatchSnafu { node: node.name(), results: sources.len(), consumers: wiring.len() }
        );

        let estimate = self.estimate(sources.len())?;
        if !estimate.fits(config) {
            tracing::debug!(
                node = node.name(),
                inputs = estimate.parameters,
                outputs = estimate.results,
                hidden = estimate.hidden,
                buffers = estimate.buffers,
                budget = config.data_ptr_gpr_count,
                "impossible to schedule merged subgraph"
            );
            return Ok(Plan::Abort(WrapReason::BudgetExceeded));
        }

        for (index, &src) in sources.iter().enumerate() {
            self.body.add_result(result_name(node.name(), index), src).context(IrSnafu)?;
        }
        let ports = self.body.result_ports().context(IrSnafu)?;
        if broadcast_all(ports.iter().map(|p| &p.shape)).is_none() {
            return Ok(Plan::Abort(WrapReason::OutputsNotBroadcastable));
        }

        let mut replaced = vec![node.id()];
        replaced.extend(self.absorbed.iter().copied());
        let constants = replaced
            .iter()
            .filter_map(|&id| graph.get(id))
            .flat_map(|n| n.inputs().iter().map(|src| src.node))
            .filter(|&id| graph.constant(id).is_some())
            .collect();

        Ok(Plan::Commit(FusedNode {
            name: self.subgraph_name,
            fused_names: self.fused_names,
            rt_info: node.rt_info().clone(),
            body: self.body,
            external: self.external,
            wiring,
            hidden: estimate.hidden,
            replaced,
            constants,
        }))
    }

    fn estimate(&self, results: usize) -> Result<ResourceEstimate> {
        let graph = self.graph;
        let mut hidden = fake_quantize_hidden_count(graph, self.node.id())?;
        let mut buffer_ops: Vec<(&Graph, NodeId)> = Vec::new();
        for &sg in &self.absorbed {
            let subgraph = graph.node(sg).context(IrSnafu)?.op().as_subgraph().context(NotASubgraphSnafu { id: sg })?;
            hidden += subgraph.virtual_port_count();
            if subgraph.has_domain_sensitive_ops() {
                let body = subgraph.body();
                buffer_ops.extend(body.ordered_ops().context(IrSnafu)?.into_iter().map(|op| (body, op)));
            }
        }
        if self.node.op().is_domain_sensitive() {
            buffer_ops.push((graph, self.node.id()));
        }
        Ok(ResourceEstimate {
            parameters: self.external.len(),
            results,
            hidden,
            buffers: estimated_buffer_count(buffer_ops),
        })
    }

    /// Accept `sg` into the merge and bind each of its body parameters.
    fn absorb(&mut self, sg: NodeId) -> Result<Option<WrapReason>> {
        let graph = self.graph;
        self.absorbed.push(sg);
        let sg_node = graph.node(sg).context(IrSnafu)?;
        self.fused_names.push_str(&inherited_names(sg_node));
        if result_children(graph, sg) > 0 {
            // Keep the name the outside world observes.
            self.subgraph_name = sg_node.name().to_string();
            self.result_children += 1;
        }

        let param_count = self.clone_of(sg)?.parameters().len();
        for index in 0..param_count {
            let ext = *sg_node.inputs().get(index).context(UnboundParameterSnafu { subgraph: sg, index })?;

            if let Some(k) = self.external_index(ext) {
                tracing::trace!(subgraph = sg_node.name(), param = index, shared = k, "parameter deduplicated");
                self.bindings.insert((sg, index), Source::Param(k));
                continue;
            }

            let producer = ext.node;
            if self.node.inputs().contains(&ext) && self.clones.contains_key(&producer) {
                if !self.absorbed.contains(&producer) {
                    if self.introduces_cycle(producer)? {
                        return Ok(Some(WrapReason::TernaryCycle));
                    }
                    if let Some(reason) = self.absorb(producer)? {
                        return Ok(Some(reason));
                    }
                }
                tracing::trace!(subgraph = sg_node.name(), producer = %producer, "ternary merge");
                self.bindings.insert((sg, index), Source::Inner { sg: producer, output: ext.index });
                continue;
            }

            let (name, port) = {
                let body = self.clone_of(sg)?;
                let param = body.parameters()[index];
                (body.node(param).context(IrSnafu)?.name().to_string(), body.output_port(param.into()).context(IrSnafu)?.clone())
            };
            let k = self.push_external(ext, name, port);
            self.bindings.insert((sg, index), Source::Param(k));
        }
        Ok(None)
    }

    /// Topological bounds check for attaching `examined`. Constants and parameters
    /// carry no order; results, the tokenized node and absorbed subgraphs end up
    /// inside (or after) the merge and are skipped as children. Bounds tighten only
    /// when no cycle is possible.
    fn introduces_cycle(&mut self, examined: NodeId) -> Result<bool> {
        let graph = self.graph;
        let node = graph.node(examined).context(IrSnafu)?;

        let mut max_parent = self.bounds.0;
        for src in node.inputs() {
            let parent = graph.node(src.node).context(IrSnafu)?;
            if matches!(parent.op(), Op::Constant(_) | Op::Parameter { .. }) {
                continue;
            }
            max_parent = max_parent.max(topological_order(parent)?);
        }

        let mut min_child = self.bounds.1;
        for user in graph.users(examined) {
            let child = graph.node(user).context(IrSnafu)?;
            if child.op().is_result() || user == self.node.id() || self.absorbed.contains(&user) {
                continue;
            }
            min_child = min_child.min(topological_order(child)?);
        }

        if max_parent < min_child {
            self.bounds = (max_parent, min_child);
            Ok(false)
        } else {
            tracing::trace!(node = node.name(), max_parent, min_child, "cyclic dependency");
            Ok(true)
        }
    }

    fn clone_of(&self, sg: NodeId) -> Result<&Graph> {
        self.clones.get(&sg).context(NotASubgraphSnafu { id: sg })
    }

    fn external_index(&self, src: Output) -> Option<usize> {
        self.external.iter().position(|&e| e == src)
    }

    fn push_external(&mut self, src: Output, name: String, port: PortInfo) -> usize {
        self.external.push(src);
        self.params.push(self.body.add_parameter(name, port.element_type, port.shape));
        self.external.len() - 1
    }

    fn resolve(&mut self, item: Internal) -> Result<Output> {
        match item {
            Internal::Param(k) => Ok(self.params[k].into()),
            Internal::Inner { sg, output } => self.import_result(sg, output),
            Internal::Constant(id) => {
                if let Some(&copy) = self.imported_constants.get(&id) {
                    return Ok(copy.into());
                }
                let constant = self.graph.node(id).context(IrSnafu)?;
                let copy = self.body.insert_node(constant, &[]).context(IrSnafu)?;
                self.imported_constants.insert(id, copy);
                Ok(copy.into())
            }
        }
    }

    fn import_result(&mut self, sg: NodeId, output: usize) -> Result<Output> {
        let sources = self.clone_of(sg)?.result_sources().context(IrSnafu)?;
        let src = *sources.get(output).context(UnboundParameterSnafu { subgraph: sg, index: output })?;
        self.import(sg, src)
    }

    /// Copy the computation behind `out` of the cloned body of `sg` into the fused
    /// body, memoized per body node.
    fn import(&mut self, sg: NodeId, out: Output) -> Result<Output> {
        if let Some(&copy) = self.imported.get(&(sg, out.node)) {
            return Ok(Output::new(copy, out.index));
        }

        let body = self.clone_of(sg)?;
        let node = body.node(out.node).context(IrSnafu)?;
        if node.op().is_parameter() {
            let index = body.parameter_index(out.node).context(UnboundParameterSnafu { subgraph: sg, index: 0usize })?;
            let source = *self.bindings.get(&(sg, index)).context(UnboundParameterSnafu { subgraph: sg, index })?;
            return match source {
                Source::Param(k) => Ok(self.params[k].into()),
                Source::Inner { sg: producer, output } => self.import_result(producer, output),
            };
        }

        let node = node.clone();
        let mut inputs: SmallVec<[Output; 4]> = SmallVec::new();
        for &src in node.inputs() {
            inputs.push(self.import(sg, src)?);
        }
        let copy = self.body.insert_node(&node, &inputs).context(IrSnafu)?;
        self.imported.insert((sg, out.node), copy);
        Ok(Output::new(copy, out.index))
    }
}

/// A merge that passed every check, ready to be spliced into the graph.
pub(super) struct FusedNode {
    name: String,
    fused_names: String,
    rt_info: RtInfo,
    body: Graph,
    external: Vec<Output>,
    /// External consumers of each body result.
    wiring: Vec<Vec<Input>>,
    hidden: usize,
    /// The tokenized node first, then absorbed subgraphs.
    replaced: Vec<NodeId>,
    constants: Vec<NodeId>,
}

impl FusedNode {
    pub(super) fn absorbed(&self) -> usize {
        self.replaced.len() - 1
    }

    pub(super) fn commit(self, graph: &mut Graph) -> Result<NodeId> {
        let mut subgraph = Subgraph::new(self.body);
        subgraph.set_virtual_port_count(self.hidden);
        let sg = graph.add_op(self.name.as_str(), Op::Subgraph(Box::new(subgraph)), &self.external).context(IrSnafu)?;

        let node = graph.node_mut(sg).context(IrSnafu)?;
        let outputs = node.outputs().len();
        ensure!(
            outputs == self.wiring.len(),
            ResultCountMismatchSnafu { node: self.name.as_str(), results: outputs, consumers: self.wiring.len() }
        );
        *node.rt_info_mut() = self.rt_info;
        node.rt_info_mut().set_original_layers_names(self.fused_names);

        for (index, targets) in self.wiring.iter().enumerate() {
            for &target in targets {
                graph.replace_source(target, Output::new(sg, index)).context(IrSnafu)?;
            }
        }
        remove_replaced(graph, self.replaced)?;
        remove_orphan_constants(graph, self.constants)?;
        Ok(sg)
    }
}
