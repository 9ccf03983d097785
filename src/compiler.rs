use std::sync::OnceLock;

use inkwell::OptimizationLevel;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, InitializationConfig, RelocMode, Target, TargetMachine};
use tracing::debug;

use crate::error::LlvmError;
use crate::interface::CallInterface;
use crate::program::Program;
use crate::source::ModuleSource;

/// Whole-module optimization pipeline, aggressive and host-target-aware.
const OPT_PIPELINE: &str = "default<O3>";

/// Initialize the native target exactly once per process.
pub(crate) fn ensure_native_target() -> Result<(), LlvmError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| Target::initialize_native(&InitializationConfig::default()))
        .clone()
        .map_err(LlvmError::Compile)
}

/// Compiles LLVM modules for the host CPU and binds them to invocation
/// interfaces.
///
/// The pipeline is strict: verify, optionally clone, optimize, JIT-compile,
/// then hand the engine to the interface verifier. Every stage failure is
/// fatal for that attempt; the caller may retry with other source.
pub struct Compiler<'ctx> {
    context: &'ctx Context,
    target_machine: TargetMachine,
}

impl<'ctx> Compiler<'ctx> {
    pub fn new(context: &'ctx Context) -> Result<Self, LlvmError> {
        ensure_native_target()?;

        let triple = TargetMachine::get_default_triple();
        let cpu = TargetMachine::get_host_cpu_name().to_string();
        let features = TargetMachine::get_host_cpu_features().to_string();
        let target =
            Target::from_triple(&triple).map_err(|e| LlvmError::Compile(e.to_string()))?;
        let target_machine = target
            .create_target_machine(
                &triple,
                &cpu,
                &features,
                OptimizationLevel::Aggressive,
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| {
                LlvmError::Compile(format!(
                    "no target machine for host triple {}",
                    triple.as_str().to_string_lossy()
                ))
            })?;

        Ok(Compiler {
            context,
            target_machine,
        })
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Build the source and compile it into a bound [`Program`].
    pub fn compile<T: CallInterface>(
        &self,
        source: &ModuleSource,
    ) -> Result<Program<'ctx, T>, LlvmError> {
        let (module, already_optimized) = source.build(self.context)?;
        self.compile_module(module, already_optimized)
    }

    /// Compile a clone of `module`, leaving the caller's module untouched
    /// and reusable. The execution engine owns the clone's backing memory.
    pub fn compile_shared<T: CallInterface>(
        &self,
        module: &Module<'ctx>,
        already_optimized: bool,
    ) -> Result<Program<'ctx, T>, LlvmError> {
        let clone = clone_module(module, self.context)?;
        self.compile_module(clone, already_optimized)
    }

    /// Verify, optimize (unless declared already optimized) and JIT-compile
    /// the module, then verify and bind the invocation interface.
    pub fn compile_module<T: CallInterface>(
        &self,
        module: Module<'ctx>,
        already_optimized: bool,
    ) -> Result<Program<'ctx, T>, LlvmError> {
        module
            .verify()
            .map_err(|e| LlvmError::Compile(e.to_string()))?;

        if already_optimized {
            debug!("skipping optimization, module declared pre-optimized");
        } else {
            module
                .run_passes(OPT_PIPELINE, &self.target_machine, PassBuilderOptions::create())
                .map_err(|e| LlvmError::Compile(e.to_string()))?;
        }

        let engine = module
            .create_jit_execution_engine(OptimizationLevel::Aggressive)
            .map_err(|e| LlvmError::Compile(e.to_string()))?;
        debug!("engine ready");

        Program::new(engine, module)
    }
}

/// LLVM modules cannot be shared between engines, so a shared compile works
/// on a bitcode round-trip copy.
fn clone_module<'ctx>(
    module: &Module<'ctx>,
    context: &'ctx Context,
) -> Result<Module<'ctx>, LlvmError> {
    let bitcode = module.write_bitcode_to_memory();
    Module::parse_bitcode_from_buffer(&bitcode, context)
        .map_err(|e| LlvmError::Compile(e.to_string()))
}
