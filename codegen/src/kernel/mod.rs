//! Kernel generation for fused bodies.
//!
//! [`lower`] selects an emitter per body op and allocates registers;
//! [`CompiledKernel::compile`] turns the result into native code.

pub mod jit;
pub mod lower;

use snafu::{OptionExt, ensure};
use weld_ir::Graph;

use crate::config::KernelConfig;
use crate::error::*;
use crate::isa::Isa;

pub use jit::CompiledKernel;
pub use lower::{KernelProgram, Step, is_jit_element_type, lower};

/// Profile a kernel is generated for: the configured one, else the widest the
/// host supports.
pub fn select_isa(config: &KernelConfig) -> Result<Isa> {
    match config.isa {
        Some(isa) => {
            ensure!(isa.is_supported(), IsaNotSupportedSnafu { isa });
            Ok(isa)
        }
        None => Isa::dispatch_table().first().copied().context(JitSnafu { reason: "host supports no vector profile" }),
    }
}

/// Lower and compile `body` for `isa`.
pub fn compile_for(body: &Graph, isa: Isa, config: &KernelConfig) -> Result<CompiledKernel> {
    ensure!(isa.is_supported(), IsaNotSupportedSnafu { isa });
    CompiledKernel::compile(lower(body, isa, config)?)
}

pub fn compile(body: &Graph, config: &KernelConfig) -> Result<CompiledKernel> {
    compile_for(body, select_isa(config)?, config)
}
