//! Emitter framework.
//!
//! An emitter turns one lowered body op into instructions. Emission is a
//! two-phase protocol: the register allocator first queries what an emitter
//! needs (operand counts and classes, scratch registers, supported profiles),
//! reserves exactly that, and only then calls [`Emitter::emit_code`].

pub mod broadcast;
pub mod buffer;
pub mod constant;
pub mod debug;
pub mod eltwise;
pub mod fill;
pub mod memory;

use std::fmt;

use smallvec::SmallVec;
use snafu::ensure;

use crate::asm::Assembler;
use crate::error::*;
use crate::isa::Isa;
use crate::regs::{Gpr, Reg, RegClass, VecReg};

pub use broadcast::BroadcastLoadEmitter;
pub use buffer::VectorBufferEmitter;
pub use constant::ConstantEmitter;
pub use debug::{DebugEmitter, EmitLocation, TraceEmitter};
pub use eltwise::{BinaryEmitter, UnaryEmitter};
pub use fill::FillEmitter;
pub use memory::{LoadEmitter, StoreEmitter};

/// Registers handed to one emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitArgs {
    pub inputs: SmallVec<[Reg; 4]>,
    pub outputs: SmallVec<[Reg; 2]>,
    pub aux_vecs: SmallVec<[VecReg; 2]>,
    pub aux_gprs: SmallVec<[Gpr; 2]>,
}

/// Read-only state shared by every emission of one kernel.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    pub table: &'a ConstantTable,
}

/// Named 32-bit constants referenced by generated code.
///
/// Filled by [`Emitter::emit_data`] before any code is emitted. Addresses handed
/// out by [`ConstantTable::address_of`] stay valid until the table is dropped or
/// grown, so the table must outlive the compiled kernel unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantTable {
    names: Vec<String>,
    values: Vec<u32>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`. Re-registering a name keeps the first value.
    pub fn push(&mut self, name: impl Into<String>, value: u32) {
        let name = name.into();
        if !self.names.contains(&name) {
            self.names.push(name);
            self.values.push(value);
        }
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.index_of(name).map(|i| self.values[i])
    }

    pub fn address_of(&self, name: &str) -> Result<u64> {
        let index = self.index_of(name).ok_or_else(|| Error::MissingConstant { name: name.to_string() })?;
        Ok(self.values.as_ptr() as u64 + (index * size_of::<u32>()) as u64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

pub trait Emitter: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Register class of every input operand.
    fn input_classes(&self) -> &[RegClass];

    /// Register class of every output operand.
    fn output_classes(&self) -> &[RegClass];

    fn input_count(&self) -> usize {
        self.input_classes().len()
    }

    fn output_count(&self) -> usize {
        self.output_classes().len()
    }

    fn aux_vec_count(&self) -> usize {
        0
    }

    fn aux_gpr_count(&self) -> usize {
        0
    }

    fn supports(&self, _isa: Isa) -> bool {
        true
    }

    /// Contribute entries to the kernel's constant table.
    fn emit_data(&self, _table: &mut ConstantTable) {}

    /// Generate instructions. Operands are already checked by [`Emitter::emit_code`].
    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, ctx: &EmitContext<'_>) -> Result<()>;

    /// Check the target profile and the handed registers, then emit.
    fn emit_code(&self, asm: &mut dyn Assembler, args: &EmitArgs, ctx: &EmitContext<'_>) -> Result<()> {
        validate(self, asm.isa(), args)?;
        self.emit_impl(asm, args, ctx)
    }
}

/// Registers and profile check shared by every emitter.
pub fn validate<E: Emitter + ?Sized>(emitter: &E, isa: Isa, args: &EmitArgs) -> Result<()> {
    let name = emitter.name();
    ensure!(emitter.supports(isa), TargetIncompatibleSnafu { emitter: name, isa });
    check_operands(name, "inputs", emitter.input_classes(), &args.inputs)?;
    check_operands(name, "outputs", emitter.output_classes(), &args.outputs)?;
    ensure!(
        args.aux_vecs.len() == emitter.aux_vec_count(),
        EmitAritySnafu { emitter: name, what: "aux vector registers", expected: emitter.aux_vec_count(), actual: args.aux_vecs.len() }
    );
    ensure!(
        args.aux_gprs.len() == emitter.aux_gpr_count(),
        EmitAritySnafu { emitter: name, what: "aux GPRs", expected: emitter.aux_gpr_count(), actual: args.aux_gprs.len() }
    );
    Ok(())
}

fn check_operands(emitter: &'static str, what: &'static str, classes: &[RegClass], regs: &[Reg]) -> Result<()> {
    ensure!(regs.len() == classes.len(), EmitAritySnafu { emitter, what, expected: classes.len(), actual: regs.len() });
    for (index, (reg, &expected)) in regs.iter().zip(classes).enumerate() {
        ensure!(reg.class() == expected, RegisterClassSnafu { emitter, what, index, expected });
    }
    Ok(())
}

/// Vector register at `index`; callers run after [`validate`].
pub(crate) fn vec_at(regs: &[Reg], index: usize) -> VecReg {
    match regs[index] {
        Reg::Vec(reg) => reg,
        Reg::Gpr(reg) => VecReg(reg.0),
    }
}

/// General-purpose register at `index`; callers run after [`validate`].
pub(crate) fn gpr_at(regs: &[Reg], index: usize) -> Gpr {
    match regs[index] {
        Reg::Gpr(reg) => reg,
        Reg::Vec(reg) => Gpr(reg.0),
    }
}
