use weld_ir::ElementType;

use crate::asm::Assembler;
use crate::emitter::{EmitArgs, EmitContext, Emitter, vec_at};
use crate::error::Result;
use crate::regs::RegClass;

/// Scratch register, zeroed on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorBufferEmitter {
    pub element_type: ElementType,
}

impl Emitter for VectorBufferEmitter {
    fn name(&self) -> &'static str {
        "VectorBuffer"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        asm.vzero(vec_at(&args.outputs, 0));
        Ok(())
    }
}
