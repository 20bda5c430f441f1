//! Kernel generation for fused subgraphs.
//!
//! # Module Organization
//!
//! - [`isa`] - Hardware profiles and host capability detection
//! - [`regs`] - Register handles and the per-compilation pool
//! - [`asm`] - Instruction primitives and their Cranelift lowering
//! - [`emitter`] - Emitter contract, per-op emitters and the debug decorator
//! - [`kernel`] - Body lowering, register allocation and JIT compilation
//! - [`config`] - Kernel generation configuration
//! - [`error`] - Error types and result handling
//!
//! Each hardware vector register is modeled as a group of 128-bit Cranelift
//! values, so wider profiles change the unroll width of every instruction
//! rather than the instructions themselves.

pub mod asm;
pub mod config;
pub mod emitter;
pub mod error;
pub mod isa;
pub mod kernel;
pub mod regs;


pub use config::KernelConfig;
pub use emitter::{ConstantTable, DebugEmitter, EmitArgs, EmitContext, EmitLocation, Emitter};
pub use error::{Error, Result};
pub use isa::Isa;
pub use kernel::{CompiledKernel, KernelProgram, compile, compile_for, lower, select_isa};
pub use regs::{Gpr, Reg, RegClass, RegistersPool, VecReg};
