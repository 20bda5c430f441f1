//! Tail-lane overwrite.

use weld_ir::Fill;

use crate::asm::Assembler;
use crate::emitter::{EmitArgs, EmitContext, Emitter, vec_at};
use crate::error::Result;
use crate::regs::RegClass;

/// Copy the input register and overwrite lanes `offset..` with the fill value.
///
/// Zero fills take the cheap path and need no scratch register; any other
/// value is materialized in one auxiliary GPR first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEmitter {
    fill: Fill,
}

impl FillEmitter {
    pub fn new(fill: Fill) -> Self {
        Self { fill }
    }

    pub fn fill(&self) -> Fill {
        self.fill
    }
}

impl Emitter for FillEmitter {
    fn name(&self) -> &'static str {
        "Fill"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn aux_gpr_count(&self) -> usize {
        if self.fill.is_zero_fill() { 0 } else { 1 }
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        let (src, dst) = (vec_at(&args.inputs, 0), vec_at(&args.outputs, 0));
        if src != dst {
            asm.vmov(dst, src);
        }
        if self.fill.offset >= asm.lanes() {
            return Ok(());
        }
        match args.aux_gprs.first() {
            Some(&scratch) if !self.fill.is_zero_fill() => {
                asm.mov_imm(scratch, i64::from(self.fill.fill_value));
                asm.insert_lanes(dst, scratch, self.fill.offset);
            }
            _ => asm.zero_lanes(dst, self.fill.offset),
        }
        Ok(())
    }
}
