//! Lane-parallel arithmetic.

use weld_ir::{BinaryOp, ElementType, UnaryOp};

use crate::asm::Assembler;
use crate::emitter::{EmitArgs, EmitContext, Emitter, vec_at};
use crate::error::*;
use crate::regs::RegClass;

/// Whether the assembler has an instruction sequence for `op` on `element_type`.
pub fn unary_supported(op: UnaryOp, element_type: ElementType) -> bool {
    match op {
        UnaryOp::Exp => false,
        UnaryOp::Sqrt | UnaryOp::Floor => element_type.is_float(),
        UnaryOp::Neg | UnaryOp::Abs | UnaryOp::Relu => true,
    }
}

pub fn binary_supported(op: BinaryOp, element_type: ElementType) -> bool {
    match op {
        BinaryOp::Pow => false,
        BinaryOp::Div => element_type.is_float(),
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryEmitter {
    pub op: UnaryOp,
    pub element_type: ElementType,
}

impl UnaryEmitter {
    /// Fails for ops the JIT has no lowering for.
    pub fn new(op: UnaryOp, element_type: ElementType) -> Result<Self> {
        if !unary_supported(op, element_type) {
            return UnsupportedOpSnafu { op: format!("{op}({element_type})") }.fail();
        }
        Ok(Self { op, element_type })
    }
}

impl Emitter for UnaryEmitter {
    fn name(&self) -> &'static str {
        "Unary"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        asm.unary(self.op, self.element_type, vec_at(&args.outputs, 0), vec_at(&args.inputs, 0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryEmitter {
    pub op: BinaryOp,
    pub element_type: ElementType,
}

impl BinaryEmitter {
    pub fn new(op: BinaryOp, element_type: ElementType) -> Result<Self> {
        if !binary_supported(op, element_type) {
            return UnsupportedOpSnafu { op: format!("{op}({element_type})") }.fail();
        }
        Ok(Self { op, element_type })
    }
}

impl Emitter for BinaryEmitter {
    fn name(&self) -> &'static str {
        "Binary"
    }

    fn input_classes(&self) -> &[RegClass] {
        &[RegClass::Vector, RegClass::Vector]
    }

    fn output_classes(&self) -> &[RegClass] {
        &[RegClass::Vector]
    }

    fn emit_impl(&self, asm: &mut dyn Assembler, args: &EmitArgs, _ctx: &EmitContext<'_>) -> Result<()> {
        let (lhs, rhs) = (vec_at(&args.inputs, 0), vec_at(&args.inputs, 1));
        asm.binary(self.op, self.element_type, vec_at(&args.outputs, 0), lhs, rhs)
    }
}
