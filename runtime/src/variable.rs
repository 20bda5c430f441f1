//! Shape-dispatching executor.
//!
//! Holds an ordered list of candidate implementations. On every update the
//! first candidate that accepts the shapes, can be built and updates
//! successfully becomes active. Built candidates are cached, so switching back
//! to a previously seen implementation costs no rebuild.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::ExecutorContext;
use crate::error::*;
use crate::executor::{Executor, ExecutorImplementation, ImplementationKind};
use crate::memory::MemoryArgs;

pub struct VariableExecutor<A> {
    op: String,
    attrs: A,
    context: Arc<ExecutorContext>,
    implementations: Vec<Box<dyn ExecutorImplementation<A>>>,
    cache: Vec<Option<Box<dyn Executor>>>,
    active: Option<usize>,
}

impl<A: Send + Sync> VariableExecutor<A> {
    /// Build and select an implementation for the initial `memory`.
    pub fn new(
        op: impl Into<String>,
        memory: &MemoryArgs<'_>,
        attrs: A,
        context: Arc<ExecutorContext>,
        implementations: Vec<Box<dyn ExecutorImplementation<A>>>,
    ) -> Result<Self> {
        let cache = implementations.iter().map(|_| None).collect();
        let mut executor = Self { op: op.into(), attrs, context, implementations, cache, active: None };
        executor.select(memory)?;
        Ok(executor)
    }

    /// Index of the active candidate.
    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.map(|i| self.implementations[i].name())
    }

    /// Number of candidates built so far.
    pub fn built_count(&self) -> usize {
        self.cache.iter().filter(|c| c.is_some()).count()
    }

    pub fn attrs(&self) -> &A {
        &self.attrs
    }

    fn select(&mut self, memory: &MemoryArgs<'_>) -> Result<()> {
        self.active = None;
        for (index, implementation) in self.implementations.iter().enumerate() {
            if !implementation.accepts_shapes(&self.attrs, memory) {
                trace!(op = %self.op, implementation = implementation.name(), "shapes rejected");
                continue;
            }
            if self.cache[index].is_none() {
                self.cache[index] = implementation.create(&self.attrs, memory, &self.context);
            }
            let Some(executor) = self.cache[index].as_mut() else {
                debug!(op = %self.op, implementation = implementation.name(), "construction failed");
                continue;
            };
            match executor.update(memory) {
                Ok(true) => {
                    debug!(op = %self.op, implementation = implementation.name(), shapes = %memory.describe(), "implementation selected");
                    self.active = Some(index);
                    return Ok(());
                }
                Ok(false) => trace!(op = %self.op, implementation = implementation.name(), "update declined"),
                Err(error) => debug!(op = %self.op, implementation = implementation.name(), %error, "update failed"),
            }
        }
        NoImplementationSnafu { op: self.op.clone(), shapes: memory.describe() }.fail()
    }
}

impl<A: Send + Sync> Executor for VariableExecutor<A> {
    fn update(&mut self, memory: &MemoryArgs<'_>) -> Result<bool> {
        self.select(memory)?;
        Ok(true)
    }

    fn execute(&self, memory: &mut MemoryArgs<'_>) -> Result<()> {
        let executor = self.active.and_then(|i| self.cache[i].as_ref()).ok_or(Error::NotUpdated)?;
        executor.execute(memory)
    }

    /// Kind of the active implementation; the reference kind until one is selected.
    fn implementation_kind(&self) -> ImplementationKind {
        self.active
            .and_then(|i| self.cache[i].as_ref())
            .map_or(ImplementationKind::Reference, |e| e.implementation_kind())
    }
}
