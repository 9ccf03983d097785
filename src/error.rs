use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong between a module source and a bound program.
///
/// Configuration errors (a malformed interface declaration) must be fixed by
/// the caller and are never retried. Resolution errors name the offending
/// function, parameter index and both observed types. Compile errors carry
/// the underlying LLVM or clang diagnostic verbatim.
#[derive(Debug, Error)]
pub enum LlvmError {
    // --- configuration ---
    #[error("malformed invocation interface: {0}")]
    MalformedInterface(String),

    #[error("invocation interface declares `{0}` more than once, overloading is not allowed")]
    DuplicateMethod(String),

    // --- resolution ---
    #[error("no function named `{0}` in the module")]
    MissingSymbol(String),

    #[error("function `{function}` declares {declared} parameters but the native code has {native}")]
    ParameterCountMismatch {
        function: String,
        declared: usize,
        native: usize,
    },

    #[error("parameter {index} of `{function}`: declared {declared} but the native type is {native}")]
    TypeMismatch {
        function: String,
        index: usize,
        declared: String,
        native: String,
    },

    #[error("return value of `{function}`: declared {declared} but the native type is {native}")]
    ReturnTypeMismatch {
        function: String,
        declared: String,
        native: String,
    },

    // --- compile ---
    #[error("{0}")]
    Compile(String),

    #[error("no clang binary found, set LLVM_INVOKE_CLANG or put clang on PATH")]
    ClangNotFound,

    #[error("clang exited with {status}: {stderr}")]
    ClangFailed { status: i32, stderr: String },

    #[error("clang did not finish within {secs}s compiling {}", .input.display())]
    ClangTimedOut { secs: u64, input: PathBuf },

    // --- i/o ---
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // --- lifecycle ---
    #[error("program has been disposed")]
    Disposed,
}
