use weld_ir::BroadcastLoad;

use crate::asm::Assembler;
use crate::emitter::{EmitArgs, EmitContext, Emitter, gpr_at, vec_at};
use crate::error::Result;
use crate::regs::RegClass;

/// Splat one element, `offset` bytes past the input pointer, over the whole register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastLoadEmitter {
    pub offset: i32,
}

impl BroadcastLoadEmitter {
    pub fn new(offset: i32) -> Self {
        Self { offset }
    }

    pub fn from_op(op: &BroadcastLoad) -> Self {
        Self::new(op.offset as i32)
    }
}

impl Emitter for BroadcastLoadEmitter {
    fn name(&self) -> &'static str {
        "BroadcastLoad"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::General]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        asm.broadcast_load(vec_at(&args.outputs, 0), gpr_at(&args.inputs, 0), self.offset);
        Ok(())
    }
}
