//! Cranelift JIT compilation and execution of lowered kernels.

use std::sync::atomic::{AtomicU64, Ordering};

use cranelift_codegen::ir::{AbiParam, Function, InstBuilder, MemFlags, UserFuncName, types};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module, default_libcall_names};
use snafu::ensure;
use tracing::debug;

use crate::asm::{Assembler, CraneliftAssembler};
use crate::emitter::{ConstantTable, EmitContext};
use crate::error::*;
use crate::isa::Isa;
use crate::kernel::lower::{KernelProgram, Step};

/// JIT-compiled kernel: `extern "C" fn(args: *const *mut u8)` over body
/// parameters followed by body results.
pub struct CompiledKernel {
    /// Owns the code `func_ptr` points into.
    #[allow(dead_code)]
    module: JITModule,
    func_ptr: *const u8,
    name: String,
    isa: Isa,
    work_amount: usize,
    arg_count: usize,
    /// Referenced by absolute address from the generated code.
    #[allow(dead_code)]
    table: ConstantTable,
    trace: Option<Box<AtomicU64>>,
    labels: Vec<String>,
}

// SAFETY: The JITModule owns the compiled code and is never mutated after
// finalization. The constant table and trace slot are heap allocations that
// live as long as the kernel. Generated code only reads the table and only
// writes the trace slot.
unsafe impl Send for CompiledKernel {}
unsafe impl Sync for CompiledKernel {}

impl std::fmt::Debug for CompiledKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledKernel")
            .field("name", &self.name)
            .field("isa", &self.isa)
            .field("work_amount", &self.work_amount)
            .field("arg_count", &self.arg_count)
            .finish_non_exhaustive()
    }
}

impl CompiledKernel {
    /// Generate machine code for a lowered program.
    #[tracing::instrument(skip_all, fields(kernel.name = %program.name, isa = %program.isa))]
    pub fn compile(program: KernelProgram) -> Result<Self> {
        let jit = |reason: String| Error::Jit { reason };

        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false").map_err(|e| jit(format!("failed to set flag: {e}")))?;
        flag_builder.set("is_pic", "false").map_err(|e| jit(format!("failed to set flag: {e}")))?;
        let isa = cranelift_native::builder()
            .map_err(|e| jit(format!("failed to create native ISA builder: {e}")))?
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| jit(format!("failed to finish ISA: {e}")))?;

        let mut module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));

        let mut signature = module.make_signature();
        signature.params.push(AbiParam::new(types::I64));
        let func_id = module
            .declare_function(&program.name, Linkage::Local, &signature)
            .map_err(|e| jit(format!("failed to declare kernel: {e}")))?;

        let mut func = Function::with_name_signature(UserFuncName::testcase(&program.name), signature);
        let mut func_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);
            build_body(&mut builder, &program)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        let mut ctx = module.make_context();
        ctx.func = func;
        module.define_function(func_id, &mut ctx).map_err(|e| jit(format!("failed to define kernel: {e}")))?;
        module.finalize_definitions().map_err(|e| jit(format!("failed to finalize: {e}")))?;
        let func_ptr = module.get_finalized_function(func_id);

        debug!(
            kernel.name = %program.name,
            isa = %program.isa,
            work_amount = program.work_amount,
            emitters = program.main.len() + program.tail.len(),
            "kernel compiled"
        );

        Ok(Self {
            module,
            func_ptr,
            arg_count: program.data_ptrs.len(),
            name: program.name,
            isa: program.isa,
            work_amount: program.work_amount,
            table: program.table,
            trace: program.trace,
            labels: program.labels,
        })
    }

    /// Run the kernel once over its whole work amount.
    ///
    /// # Safety
    ///
    /// Every pointer must address a live buffer of the matching body port with
    /// at least `work_amount` elements, or one element for single-element
    /// parameters. Result buffers must not alias each other.
    pub unsafe fn execute(&self, args: &[*mut u8]) -> Result<()> {
        ensure!(
            args.len() == self.arg_count,
            ArgumentCountSnafu { name: self.name.clone(), expected: self.arg_count, actual: args.len() }
        );
        // SAFETY: func_ptr was produced by finalize_definitions for a function
        // with exactly this signature.
        let func: extern "C" fn(*const *mut u8) = unsafe { std::mem::transmute(self.func_ptr) };
        func(args.as_ptr());
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn isa(&self) -> Isa {
        self.isa
    }

    pub fn work_amount(&self) -> usize {
        self.work_amount
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Label of the last instrumented emitter that started, if tracing is on
    /// and the kernel ran at least once.
    pub fn last_emitter(&self) -> Option<&str> {
        let sequence = self.trace.as_ref()?.load(Ordering::Relaxed) as usize;
        sequence.checked_sub(1).and_then(|i| self.labels.get(i)).map(String::as_str)
    }
}

/// entry -> loop (main steps, pointer advance) -> tail -> return.
fn build_body(builder: &mut FunctionBuilder<'_>, program: &KernelProgram) -> Result<()> {
    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    let args_ptr = builder.block_params(entry)[0];

    let iterations = program.iterations();
    let counter = builder.declare_var(types::I64);
    let remaining = builder.ins().iconst(types::I64, iterations as i64);
    builder.def_var(counter, remaining);

    let mut asm = CraneliftAssembler::new(builder, program.isa, program.vec_count, program.gpr_count);
    for (i, &ptr) in program.data_ptrs.iter().enumerate() {
        let value = asm.builder().ins().load(types::I64, MemFlags::trusted(), args_ptr, (i * 8) as i32);
        asm.set_gpr(ptr, value);
    }

    let ctx = EmitContext { table: &program.table };
    let tail_block = asm.builder().create_block();

    if iterations > 0 {
        let loop_block = asm.builder().create_block();
        asm.builder().ins().jump(loop_block, &[]);
        asm.builder().switch_to_block(loop_block);

        emit_steps(&mut asm, &program.main, &ctx)?;
        for (&ptr, &stride) in program.data_ptrs.iter().zip(&program.strides) {
            if stride != 0 {
                asm.add_imm(ptr, stride);
            }
        }

        let builder = asm.builder();
        let current = builder.use_var(counter);
        let next = builder.ins().iadd_imm(current, -1);
        builder.def_var(counter, next);
        builder.ins().brif(next, loop_block, &[], tail_block, &[]);
    } else {
        asm.builder().ins().jump(tail_block, &[]);
    }

    asm.builder().switch_to_block(tail_block);
    emit_steps(&mut asm, &program.tail, &ctx)?;
    asm.builder().ins().return_(&[]);
    Ok(())
}

fn emit_steps(asm: &mut CraneliftAssembler<'_, '_>, steps: &[Step], ctx: &EmitContext<'_>) -> Result<()> {
    for step in steps {
        step.emitter.emit_code(asm, &step.args, ctx)?;
    }
    Ok(())
}
