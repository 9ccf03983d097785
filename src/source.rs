use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use tracing::debug;

use crate::cache::{self, ArtifactKind};
use crate::clang;
use crate::error::LlvmError;

/// A programmatic module build, e.g. one assembled with inkwell's builder.
pub type BuildFn =
    Box<dyn for<'ctx> Fn(&'ctx Context) -> Result<Module<'ctx>, LlvmError> + Send + Sync>;

/// Knobs for the C-to-IR transpile path.
#[derive(Default)]
pub struct TranspileOptions {
    /// Directory for content-addressed artifacts. `None` means a
    /// process-scoped temp dir: every run recompiles.
    pub cache_dir: Option<PathBuf>,
    /// Extra clang flags; empty means `-O3`.
    pub flags: Vec<String>,
    /// Kill clang after this long. `None` blocks until it exits.
    pub timeout: Option<Duration>,
}

/// Where a module comes from. Each variant owns its source-specific state
/// and yields a module through [`build`](ModuleSource::build).
pub enum ModuleSource {
    /// Textual LLVM IR held in memory.
    IrText { name: String, text: String },
    /// An `.ll` or `.bc` file on disk; `optimized` marks a pre-optimized
    /// artifact whose optimization stage should be skipped.
    Stored { path: PathBuf, optimized: bool },
    /// C source that went through the cache/transpile stage.
    Transpiled(TranspiledSource),
    /// A programmatic build against the caller's context.
    Built(BuildFn),
}

/// Result of resolving C source against the cache: the IR artifact to load
/// plus what we know about it.
pub struct TranspiledSource {
    ir_path: PathBuf,
    already_optimized: bool,
    transpiled: bool,
    entry: cache::CacheEntry,
}

impl TranspiledSource {
    pub fn ir_path(&self) -> &Path {
        &self.ir_path
    }

    /// Whether this construction actually ran clang (false on a cache hit).
    pub fn transpiled(&self) -> bool {
        self.transpiled
    }

    /// The cache slot this source resolved to; its bitcode path is where an
    /// optimized module can be stored for the next run.
    pub fn cache_entry(&self) -> &cache::CacheEntry {
        &self.entry
    }
}

impl ModuleSource {
    pub fn ir_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        ModuleSource::IrText {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn stored(path: impl Into<PathBuf>) -> Self {
        ModuleSource::Stored {
            path: path.into(),
            optimized: false,
        }
    }

    /// A stored artifact that is already optimized (typically a `.bc` this
    /// library published earlier). The pipeline trusts this declaration.
    pub fn stored_pre_optimized(path: impl Into<PathBuf>) -> Self {
        ModuleSource::Stored {
            path: path.into(),
            optimized: true,
        }
    }

    pub fn built(
        build: impl for<'ctx> Fn(&'ctx Context) -> Result<Module<'ctx>, LlvmError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        ModuleSource::Built(Box::new(build))
    }

    /// Resolve a C file against the cache and transpile it on a miss.
    ///
    /// A cached `.bc` is the optimized module from an earlier run and skips
    /// both the transpiler and the optimizer; a cached `.ll` skips only the
    /// transpiler.
    pub fn from_c_file(path: &Path, opts: &TranspileOptions) -> Result<Self, LlvmError> {
        let source = fs::read(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string();
        let entry = cache::resolve(&source, &opts.flags, &stem, opts.cache_dir.as_deref())?;
        let transpiled = resolve_or_transpile(entry, opts, || Ok(path.to_path_buf()))?;
        Ok(ModuleSource::Transpiled(transpiled))
    }

    /// Like [`from_c_file`](Self::from_c_file) for C source held in memory.
    /// The cache key is the code itself; only on a miss is the code staged
    /// to a file for clang.
    pub fn from_c_code(code: &str, opts: &TranspileOptions) -> Result<Self, LlvmError> {
        let entry =
            cache::resolve(code.as_bytes(), &opts.flags, "inline", opts.cache_dir.as_deref())?;
        let staged = entry.ir_path().with_extension("c");
        let transpiled = resolve_or_transpile(entry, opts, move || {
            cache::publish(&staged, code.as_bytes())?;
            Ok(staged)
        })?;
        Ok(ModuleSource::Transpiled(transpiled))
    }

    pub fn as_transpiled(&self) -> Option<&TranspiledSource> {
        match self {
            ModuleSource::Transpiled(t) => Some(t),
            _ => None,
        }
    }

    /// Produce the module plus whether it is already optimized.
    pub fn build<'ctx>(&self, context: &'ctx Context) -> Result<(Module<'ctx>, bool), LlvmError> {
        match self {
            ModuleSource::IrText { name, text } => {
                let buffer = MemoryBuffer::create_from_memory_range_copy(text.as_bytes(), name);
                let module = context
                    .create_module_from_ir(buffer)
                    .map_err(|e| LlvmError::Compile(e.to_string()))?;
                Ok((module, false))
            }
            ModuleSource::Stored { path, optimized } => {
                Ok((load_module(path, context)?, *optimized))
            }
            ModuleSource::Transpiled(t) => {
                Ok((load_module(&t.ir_path, context)?, t.already_optimized))
            }
            ModuleSource::Built(build) => Ok((build(context)?, false)),
        }
    }
}

/// Turn a resolved cache slot into a transpiled source. On a hit the
/// artifact is reused as-is (a `.bc` additionally skips the optimizer); on
/// a miss `input` supplies the C file to run clang over, produced lazily so
/// a hit stages nothing.
fn resolve_or_transpile(
    entry: cache::CacheEntry,
    opts: &TranspileOptions,
    input: impl FnOnce() -> Result<PathBuf, LlvmError>,
) -> Result<TranspiledSource, LlvmError> {
    match entry.kind() {
        ArtifactKind::Bitcode => Ok(TranspiledSource {
            ir_path: entry.bitcode_path(),
            already_optimized: true,
            transpiled: false,
            entry,
        }),
        ArtifactKind::IrText => Ok(TranspiledSource {
            ir_path: entry.ir_path(),
            already_optimized: false,
            transpiled: false,
            entry,
        }),
        ArtifactKind::Missing => {
            let input = input()?;
            let output = entry.ir_path();
            clang::transpile(&input, &output, &opts.flags, opts.timeout)?;
            debug!(output = %output.display(), "transpiled");
            Ok(TranspiledSource {
                ir_path: output,
                already_optimized: false,
                transpiled: true,
                entry,
            })
        }
    }
}

/// Load an IR artifact, picking the parser by extension: `.bc` is bitcode,
/// everything else is textual IR.
fn load_module<'ctx>(path: &Path, context: &'ctx Context) -> Result<Module<'ctx>, LlvmError> {
    let buffer = MemoryBuffer::create_from_file(path).map_err(|e| {
        LlvmError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: {}", path.display(), e),
        ))
    })?;

    if path.extension().is_some_and(|ext| ext == "bc") {
        Module::parse_bitcode_from_buffer(&buffer, context)
            .map_err(|e| LlvmError::Compile(e.to_string()))
    } else {
        context
            .create_module_from_ir(buffer)
            .map_err(|e| LlvmError::Compile(e.to_string()))
    }
}
