//! Contiguous loads and stores through a data pointer.

use crate::asm::Assembler;
use crate::emitter::{EmitArgs, EmitContext, Emitter, gpr_at, vec_at};
use crate::error::Result;
use crate::regs::RegClass;

/// Load `count` elements from the pointer in the input GPR.
///
/// A count below the register width loads only the leading lanes; the rest keep
/// whatever the register held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadEmitter {
    pub count: usize,
    /// Byte offset from the pointer.
    pub offset: i32,
}

impl LoadEmitter {
    pub fn new(count: usize) -> Self {
        Self { count, offset: 0 }
    }
}

impl Emitter for LoadEmitter {
    fn name(&self) -> &'static str {
        "Load"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::General]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        let (base, dst) = (gpr_at(&args.inputs, 0), vec_at(&args.outputs, 0));
        if self.count >= asm.lanes() {
            asm.load(dst, base, self.offset);
        } else {
            asm.load_lanes(dst, base, self.offset, self.count);
        }
        Ok(())
    }
}

/// Store `count` elements of the input register to the pointer in the output GPR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEmitter {
    pub count: usize,
    pub offset: i32,
}

impl StoreEmitter {
    pub fn new(count: usize) -> Self {
        Self { count, offset: 0 }
    }
}

impl Emitter for StoreEmitter {
    fn name(&self) -> &'static str {
        "Store"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::General]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        let (src, base) = (vec_at(&args.inputs, 0), gpr_at(&args.outputs, 0));
        if self.count >= asm.lanes() {
            asm.store(src, base, self.offset);
        } else {
            asm.store_lanes(src, base, self.offset, self.count);
        }
        Ok(())
    }
}
