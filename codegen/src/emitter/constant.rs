use crate::asm::Assembler;
use crate::emitter::{ConstantTable, EmitArgs, EmitContext, Emitter, vec_at};
use crate::error::Result;
use crate::regs::RegClass;

/// Broadcast a scalar from the kernel's constant table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEmitter {
    pub name: String,
    /// Raw lane bits.
    pub bits: u32,
}

impl ConstantEmitter {
    pub fn new(name: impl Into<String>, bits: u32) -> Self {
        Self { name: name.into(), bits }
    }
}

impl Emitter for ConstantEmitter {
    fn name(&self) -> &'static str {
        "Constant"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn aux_gpr_count(&self) -> usize {
        1
    }

    fn emit_data(&self, table: &mut ConstantTable) {
        table.push(self.name.clone(), self.bits);
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, ctx: &EmitContext<'_>) -> Result<()> {
        let address = ctx.table.address_of(&self.name)?;
        let scratch = args.aux_gprs[0];
        asm.mov_imm(scratch, address as i64);
        asm.broadcast_load(vec_at(&args.outputs, 0), scratch, 0);
        Ok(())
    }
}
