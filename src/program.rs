use std::collections::HashMap;
use std::mem;
use std::path::Path;

use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use tracing::debug;

use crate::emit;
use crate::error::LlvmError;
use crate::interface::CallInterface;
use crate::verify::verify_interface;

/// Verified (name → native address) pairs, handed to
/// [`CallInterface::bind`] to fill the typed dispatch table.
pub struct SymbolTable<'a> {
    addresses: &'a HashMap<String, usize>,
}

impl SymbolTable<'_> {
    /// Reinterpret a resolved address as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `unsafe extern "C" fn` pointer type whose signature
    /// matches the native function behind `name`. The verifier has already
    /// checked the declared signature against the module, so bindings
    /// generated by `call_interface!` uphold this.
    pub unsafe fn function<F: Copy>(&self, name: &str) -> Result<F, LlvmError> {
        assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<usize>(),
            "bind target must be a bare function pointer"
        );
        let addr = self
            .addresses
            .get(name)
            .ok_or_else(|| LlvmError::MissingSymbol(name.to_string()))?;
        Ok(unsafe { mem::transmute_copy::<usize, F>(addr) })
    }
}

/// A JIT-compiled module bound to its invocation interface.
///
/// Owns the execution engine, the optimized module and the resolved address
/// table. The engine owns the module's backing memory, so both live and die
/// together here; [`dispose`](Program::dispose) releases them and every
/// later access fails with [`LlvmError::Disposed`].
#[derive(Debug)]
pub struct Program<'ctx, T: CallInterface> {
    engine: Option<ExecutionEngine<'ctx>>,
    module: Option<Module<'ctx>>,
    addresses: HashMap<String, usize>,
    bound: Option<T>,
}

impl<'ctx, T: CallInterface> Program<'ctx, T> {
    /// Verify the interface against the module, resolve every verified name
    /// to its native address and bind the typed dispatch table.
    pub(crate) fn new(
        engine: ExecutionEngine<'ctx>,
        module: Module<'ctx>,
    ) -> Result<Self, LlvmError> {
        let decl = T::describe();
        let names = verify_interface(&module, &decl)?;

        let mut addresses = HashMap::with_capacity(names.len());
        for name in names {
            let address = engine
                .get_function_address(&name)
                .map_err(|_| LlvmError::MissingSymbol(name.clone()))?;
            debug!(%name, address, "resolved");
            addresses.insert(name, address);
        }

        let table = SymbolTable {
            addresses: &addresses,
        };
        // Safety: every address in the table belongs to a function the
        // verifier matched against T's declared signature.
        let bound = unsafe { T::bind(&table)? };

        Ok(Program {
            engine: Some(engine),
            module: Some(module),
            addresses,
            bound: Some(bound),
        })
    }

    /// Native entry address of a verified function.
    pub fn get_address(&self, name: &str) -> Result<usize, LlvmError> {
        if self.is_disposed() {
            return Err(LlvmError::Disposed);
        }
        self.addresses
            .get(name)
            .copied()
            .ok_or_else(|| LlvmError::MissingSymbol(name.to_string()))
    }

    /// The bound interface. Every call through it jumps into the JIT-compiled
    /// machine code; the same instance is returned across calls.
    pub fn invoke(&self) -> Result<&T, LlvmError> {
        self.bound.as_ref().ok_or(LlvmError::Disposed)
    }

    /// The optimized module backing this program. Useful for storing a
    /// pre-optimized artifact back into the cache.
    pub fn optimized_module(&self) -> Result<&Module<'ctx>, LlvmError> {
        self.module.as_ref().ok_or(LlvmError::Disposed)
    }

    /// Store the optimized module as bitcode, typically at the cache's
    /// bitcode path so the next run skips transpile and optimization.
    pub fn store_bitcode(&self, path: &Path) -> Result<(), LlvmError> {
        emit::store_bitcode(self.optimized_module()?, path)
    }

    pub fn is_disposed(&self) -> bool {
        self.bound.is_none()
    }

    /// Release the engine and with it the module's machine code. Idempotent;
    /// afterwards [`invoke`](Program::invoke) and
    /// [`get_address`](Program::get_address) fail loudly.
    pub fn dispose(&mut self) {
        if self.bound.take().is_some() {
            debug!("disposing program");
        }
        self.addresses.clear();
        // drop order: engine releases the module's backing memory
        self.engine.take();
        self.module.take();
    }
}

impl<T: CallInterface> Drop for Program<'_, T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
