//! Instrumentation decorator.
//!
//! [`DebugEmitter`] composes any target emitter with any instrumentation
//! emitter. Every resource query is answered by the target alone; the
//! decorator only interleaves its own code around the target's.

use std::sync::atomic::AtomicU64;

use strum::Display;

use crate::asm::Assembler;
use crate::emitter::{ConstantTable, EmitArgs, EmitContext, Emitter, validate};
use crate::error::Result;
use crate::isa::Isa;
use crate::regs::RegClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EmitLocation {
    Before,
    After,
    Both,
}

impl EmitLocation {
    fn before(self) -> bool {
        matches!(self, EmitLocation::Before | EmitLocation::Both)
    }

    fn after(self) -> bool {
        matches!(self, EmitLocation::After | EmitLocation::Both)
    }
}

#[derive(Debug)]
pub struct DebugEmitter {
    target: Box<dyn Emitter>,
    /// Takes no operands; emitted with empty arguments.
    decorator: Box<dyn Emitter>,
    location: EmitLocation,
}

impl DebugEmitter {
    pub fn new(target: Box<dyn Emitter>, decorator: Box<dyn Emitter>, location: EmitLocation) -> Self {
        Self { target, decorator, location }
    }

    pub fn target(&self) -> &dyn Emitter {
        self.target.as_ref()
    }

    pub fn location(&self) -> EmitLocation {
        self.location
    }

    fn decorate(&self, asm: &mut dyn Assembler, ctx: &EmitContext<'_>) -> Result<()> {
        self.decorator.emit_code(asm, &EmitArgs::default(), ctx)
    }
}

impl Emitter for DebugEmitter {
    fn name(&self) -> &'static str {
        self.target.name()
    }

    fn input_classes(&self) -> &[RegClass] {
        self.target.input_classes()
    }

    fn output_classes(&self) -> &[RegClass] {
        self.target.output_classes()
    }

    fn input_count(&self) -> usize {
        self.target.input_count()
    }

    fn output_count(&self) -> usize {
        self.target.output_count()
    }

    fn aux_vec_count(&self) -> usize {
        self.target.aux_vec_count()
    }

    fn aux_gpr_count(&self) -> usize {
        self.target.aux_gpr_count()
    }

    fn supports(&self, isa: Isa) -> bool {
        self.target.supports(isa)
    }

    fn emit_data(&self, table: &mut ConstantTable) {
        self.target.emit_data(table);
        self.decorator.emit_data(table);
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, ctx: &EmitContext<'_>) -> Result<()> {
        self.target.emit_impl(asm, args, ctx)
    }

    fn emit_code(&self, asm: &mut dyn Assembler, args: &EmitArgs, ctx: &EmitContext<'_>) -> Result<()> {
        validate(self, asm.isa(), args)?;
        if self.location.before() {
            self.decorate(asm, ctx)?;
        }
        self.target.emit_code(asm, args, ctx)?;
        if self.location.after() {
            self.decorate(asm, ctx)?;
        }
        Ok(())
    }
}

/// Records a sequence number in a trace slot, so a kernel that crashes can be
/// attributed to the last emitter that started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEmitter {
    slot: u64,
    sequence: u64,
}

impl TraceEmitter {
    pub fn new(slot: &AtomicU64, sequence: u64) -> Self {
        Self { slot: slot.as_ptr() as u64, sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Emitter for TraceEmitter {
    fn name(&self) -> &'static str {
        "Trace"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, _args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        asm.store_abs_imm(self.slot, self.sequence);
        Ok(())
    }
}
