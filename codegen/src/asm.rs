//! Instruction-level primitives used by emitters.
//!
//! [`CraneliftAssembler`] models every hardware vector register as a group of
//! 128-bit Cranelift variables and every GPR as an `i64` variable. Lanes are
//! 32 bits wide.

use cranelift_codegen::ir::types::{F32X4, I32, I32X4, I64};
use cranelift_codegen::ir::{Endianness, InstBuilder, MemFlags, Value};
use cranelift_frontend::{FunctionBuilder, Variable};
use weld_ir::{BinaryOp, ElementType, UnaryOp};

use crate::error::*;
use crate::isa::Isa;
use crate::regs::{Gpr, VecReg};

/// Lanes of one 128-bit chunk.
pub const CHUNK_LANES: usize = 4;
const LANE_BYTES: usize = 4;

pub trait Assembler {
    fn isa(&self) -> Isa;

    /// 32-bit lanes per vector register.
    fn lanes(&self) -> usize {
        self.isa().vlen() / LANE_BYTES
    }

    fn vzero(&mut self, dst: VecReg);
    fn vmov(&mut self, dst: VecReg, src: VecReg);

    /// Full-width load from `base + offset` bytes.
    fn load(&mut self, dst: VecReg, base: Gpr, offset: i32);
    /// Load the first `lanes` elements; the remaining lanes keep their contents.
    fn load_lanes(&mut self, dst: VecReg, base: Gpr, offset: i32, lanes: usize);
    fn store(&mut self, src: VecReg, base: Gpr, offset: i32);
    /// Store the first `lanes` elements only.
    fn store_lanes(&mut self, src: VecReg, base: Gpr, offset: i32, lanes: usize);
    /// Replicate the element at `base + offset` into every lane.
    fn broadcast_load(&mut self, dst: VecReg, base: Gpr, offset: i32);

    /// Overwrite lanes `from_lane..` with the low 32 bits of `src`.
    fn insert_lanes(&mut self, dst: VecReg, src: Gpr, from_lane: usize);
    /// Overwrite lanes `from_lane..` with zero.
    fn zero_lanes(&mut self, dst: VecReg, from_lane: usize);

    fn unary(&mut self, op: UnaryOp, element_type: ElementType, dst: VecReg, src: VecReg) -> Result<()>;
    fn binary(&mut self, op: BinaryOp, element_type: ElementType, dst: VecReg, lhs: VecReg, rhs: VecReg)
    -> Result<()>;

    fn mov_imm(&mut self, dst: Gpr, value: i64);
    fn add_imm(&mut self, dst: Gpr, value: i64);
    /// Store a 64-bit immediate to an absolute address.
    fn store_abs_imm(&mut self, address: u64, value: u64);
}

pub struct CraneliftAssembler<'a, 'f> {
    builder: &'a mut FunctionBuilder<'f>,
    isa: Isa,
    vecs: Vec<Vec<Variable>>,
    gprs: Vec<Variable>,
}

impl<'a, 'f> CraneliftAssembler<'a, 'f> {
    /// Declare the register file. Must be called with the builder positioned in
    /// the entry block so every register starts zeroed.
    pub fn new(builder: &'a mut FunctionBuilder<'f>, isa: Isa, vec_count: usize, gpr_count: usize) -> Self {
        let chunks = isa.vlen() / (CHUNK_LANES * LANE_BYTES);
        let zero = builder.ins().iconst(I32, 0);
        let zero_vec = builder.ins().splat(I32X4, zero);
        let vecs = (0..vec_count)
            .map(|_| {
                (0..chunks)
                    .map(|_| {
                        let var = builder.declare_var(I32X4);
                        builder.def_var(var, zero_vec);
                        var
                    })
                    .collect()
            })
            .collect();
        let zero = builder.ins().iconst(I64, 0);
        let gprs = (0..gpr_count)
            .map(|_| {
                let var = builder.declare_var(I64);
                builder.def_var(var, zero);
                var
            })
            .collect();
        Self { builder, isa, vecs, gprs }
    }

    pub fn builder(&mut self) -> &mut FunctionBuilder<'f> {
        self.builder
    }

    pub fn gpr_value(&mut self, reg: Gpr) -> Value {
        self.builder.use_var(self.gprs[reg.0 as usize])
    }

    pub fn set_gpr(&mut self, reg: Gpr, value: Value) {
        self.builder.def_var(self.gprs[reg.0 as usize], value);
    }

    fn chunks(&self) -> usize {
        self.isa.vlen() / (CHUNK_LANES * LANE_BYTES)
    }

    fn get(&mut self, reg: VecReg, chunk: usize) -> Value {
        self.builder.use_var(self.vecs[reg.0 as usize][chunk])
    }

    fn set(&mut self, reg: VecReg, chunk: usize, value: Value) {
        self.builder.def_var(self.vecs[reg.0 as usize][chunk], value);
    }

    fn flags() -> MemFlags {
        MemFlags::new().with_notrap()
    }

    fn to_float(&mut self, value: Value) -> Value {
        self.builder.ins().bitcast(F32X4, MemFlags::new().with_endianness(Endianness::Little), value)
    }

    fn to_int(&mut self, value: Value) -> Value {
        self.builder.ins().bitcast(I32X4, MemFlags::new().with_endianness(Endianness::Little), value)
    }

    /// Write `scalar` to every lane at or after `from_lane`.
    fn set_lanes(&mut self, dst: VecReg, from_lane: usize, scalar: Value) {
        for lane in from_lane..self.lanes() {
            let (chunk, index) = (lane / CHUNK_LANES, lane % CHUNK_LANES);
            let current = self.get(dst, chunk);
            let updated = self.builder.ins().insertlane(current, scalar, index as u8);
            self.set(dst, chunk, updated);
        }
    }
}

impl Assembler for CraneliftAssembler<'_, '_> {
    fn isa(&self) -> Isa {
        self.isa
    }

    fn vzero(&mut self, dst: VecReg) {
        let zero = self.builder.ins().iconst(I32, 0);
        let zero = self.builder.ins().splat(I32X4, zero);
        for chunk in 0..self.chunks() {
            self.set(dst, chunk, zero);
        }
    }

    fn vmov(&mut self, dst: VecReg, src: VecReg) {
        for chunk in 0..self.chunks() {
            let value = self.get(src, chunk);
            self.set(dst, chunk, value);
        }
    }

    fn load(&mut self, dst: VecReg, base: Gpr, offset: i32) {
        let base = self.gpr_value(base);
        for chunk in 0..self.chunks() {
            let at = offset + (chunk * CHUNK_LANES * LANE_BYTES) as i32;
            let value = self.builder.ins().load(I32X4, Self::flags(), base, at);
            self.set(dst, chunk, value);
        }
    }

    fn load_lanes(&mut self, dst: VecReg, base: Gpr, offset: i32, lanes: usize) {
        let base = self.gpr_value(base);
        for lane in 0..lanes.min(self.lanes()) {
            let (chunk, index) = (lane / CHUNK_LANES, lane % CHUNK_LANES);
            let scalar = self.builder.ins().load(I32, Self::flags(), base, offset + (lane * LANE_BYTES) as i32);
            let current = self.get(dst, chunk);
            let updated = self.builder.ins().insertlane(current, scalar, index as u8);
            self.set(dst, chunk, updated);
        }
    }

    fn store(&mut self, src: VecReg, base: Gpr, offset: i32) {
        let base = self.gpr_value(base);
        for chunk in 0..self.chunks() {
            let value = self.get(src, chunk);
            let at = offset + (chunk * CHUNK_LANES * LANE_BYTES) as i32;
            self.builder.ins().store(Self::flags(), value, base, at);
        }
    }

    fn store_lanes(&mut self, src: VecReg, base: Gpr, offset: i32, lanes: usize) {
        let base = self.gpr_value(base);
        for lane in 0..lanes.min(self.lanes()) {
            let (chunk, index) = (lane / CHUNK_LANES, lane % CHUNK_LANES);
            let current = self.get(src, chunk);
            let scalar = self.builder.ins().extractlane(current, index as u8);
            self.builder.ins().store(Self::flags(), scalar, base, offset + (lane * LANE_BYTES) as i32);
        }
    }

    fn broadcast_load(&mut self, dst: VecReg, base: Gpr, offset: i32) {
        let base = self.gpr_value(base);
        let scalar = self.builder.ins().load(I32, Self::flags(), base, offset);
        let splat = self.builder.ins().splat(I32X4, scalar);
        for chunk in 0..self.chunks() {
            self.set(dst, chunk, splat);
        }
    }

    fn insert_lanes(&mut self, dst: VecReg, src: Gpr, from_lane: usize) {
        let wide = self.gpr_value(src);
        let scalar = self.builder.ins().ireduce(I32, wide);
        self.set_lanes(dst, from_lane, scalar);
    }

    fn zero_lanes(&mut self, dst: VecReg, from_lane: usize) {
        let zero = self.builder.ins().iconst(I32, 0);
        self.set_lanes(dst, from_lane, zero);
    }

    fn unary(&mut self, op: UnaryOp, element_type: ElementType, dst: VecReg, src: VecReg) -> Result<()> {
        let unsupported = || UnsupportedOpSnafu { op: op.to_string() }.fail();
        let float = element_type.is_float();
        for chunk in 0..self.chunks() {
            let x = self.get(src, chunk);
            let result = if float {
                let x = self.to_float(x);
                let y = match op {
                    UnaryOp::Neg => self.builder.ins().fneg(x),
                    UnaryOp::Abs => self.builder.ins().fabs(x),
                    UnaryOp::Sqrt => self.builder.ins().sqrt(x),
                    UnaryOp::Floor => self.builder.ins().floor(x),
                    UnaryOp::Relu => {
                        let zero = self.builder.ins().f32const(0.0);
                        let zero = self.builder.ins().splat(F32X4, zero);
                        self.builder.ins().fmax(x, zero)
                    }
                    UnaryOp::Exp => return unsupported(),
                };
                self.to_int(y)
            } else {
                match op {
                    UnaryOp::Neg => self.builder.ins().ineg(x),
                    UnaryOp::Abs => self.builder.ins().iabs(x),
                    UnaryOp::Relu => {
                        let zero = self.builder.ins().iconst(I32, 0);
                        let zero = self.builder.ins().splat(I32X4, zero);
                        self.builder.ins().smax(x, zero)
                    }
                    UnaryOp::Sqrt | UnaryOp::Floor | UnaryOp::Exp => return unsupported(),
                }
            };
            self.set(dst, chunk, result);
        }
        Ok(())
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        element_type: ElementType,
        dst: VecReg,
        lhs: VecReg,
        rhs: VecReg,
    ) -> Result<()> {
        let unsupported = || UnsupportedOpSnafu { op: op.to_string() }.fail();
        let float = element_type.is_float();
        let signed = element_type.is_signed();
        for chunk in 0..self.chunks() {
            let (a, b) = (self.get(lhs, chunk), self.get(rhs, chunk));
            let result = if float {
                let (a, b) = (self.to_float(a), self.to_float(b));
                let y = match op {
                    BinaryOp::Add => self.builder.ins().fadd(a, b),
                    BinaryOp::Sub => self.builder.ins().fsub(a, b),
                    BinaryOp::Mul => self.builder.ins().fmul(a, b),
                    BinaryOp::Div => self.builder.ins().fdiv(a, b),
                    BinaryOp::Max => self.builder.ins().fmax(a, b),
                    BinaryOp::Min => self.builder.ins().fmin(a, b),
                    BinaryOp::Pow => return unsupported(),
                };
                self.to_int(y)
            } else {
                match op {
                    BinaryOp::Add => self.builder.ins().iadd(a, b),
                    BinaryOp::Sub => self.builder.ins().isub(a, b),
                    BinaryOp::Mul => self.builder.ins().imul(a, b),
                    BinaryOp::Max if signed => self.builder.ins().smax(a, b),
                    BinaryOp::Max => self.builder.ins().umax(a, b),
                    BinaryOp::Min if signed => self.builder.ins().smin(a, b),
                    BinaryOp::Min => self.builder.ins().umin(a, b),
                    BinaryOp::Div | BinaryOp::Pow => return unsupported(),
                }
            };
            self.set(dst, chunk, result);
        }
        Ok(())
    }

    fn mov_imm(&mut self, dst: Gpr, value: i64) {
        let value = self.builder.ins().iconst(I64, value);
        self.set_gpr(dst, value);
    }

    fn add_imm(&mut self, dst: Gpr, value: i64) {
        let current = self.gpr_value(dst);
        let value = self.builder.ins().iadd_imm(current, value);
        self.set_gpr(dst, value);
    }

    fn store_abs_imm(&mut self, address: u64, value: u64) {
        let address = self.builder.ins().iconst(I64, address as i64);
        let value = self.builder.ins().iconst(I64, value as i64);
        self.builder.ins().store(Self::flags(), value, address, 0);
    }
}
