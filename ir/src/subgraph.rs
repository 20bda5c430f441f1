//! Fused subgraph op: an isolated body bounded by parameters and results.

use snafu::ensure;

use crate::error::{InputAritySnafu, Result};
use crate::graph::Graph;
use crate::op::{InferInput, Ports};

#[derive(Debug, Clone)]
pub struct Subgraph {
    body: Graph,
    /// Hidden resources (extra inlined constants, scratch buffers) that occupy
    /// data pointers without being visible as ports.
    virtual_port_count: usize,
}

impl Subgraph {
    pub fn new(body: Graph) -> Self {
        Self { body, virtual_port_count: 0 }
    }

    pub fn body(&self) -> &Graph {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Graph {
        &mut self.body
    }

    pub fn into_body(self) -> Graph {
        self.body
    }

    pub fn virtual_port_count(&self) -> usize {
        self.virtual_port_count
    }

    pub fn set_virtual_port_count(&mut self, count: usize) {
        self.virtual_port_count = count;
    }

    pub fn has_domain_sensitive_ops(&self) -> bool {
        self.body.nodes().any(|n| n.op().is_domain_sensitive())
    }

    /// Output ports for the given external inputs. When input shapes differ from
    /// the body's parameters the body is re-inferred on a copy.
    pub fn infer(&self, inputs: &[InferInput]) -> Result<Ports> {
        let params = self.body.parameter_ports()?;
        ensure!(
            inputs.len() == params.len(),
            InputAritySnafu { op: "Subgraph", expected: params.len(), actual: inputs.len() }
        );
        if inputs.iter().zip(&params).all(|(i, p)| i.port == *p) {
            return self.body.result_ports();
        }
        let mut body = self.body.clone();
        body.reshape_parameters(&inputs.iter().map(|i| i.port.shape.clone()).collect::<Vec<_>>())?;
        body.result_ports()
    }
}
