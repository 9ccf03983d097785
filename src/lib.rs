pub mod cache;
pub mod clang;
pub mod compiler;
pub mod emit;
pub mod error;
pub mod interface;
pub mod program;
pub mod source;
pub mod verify;

pub use compiler::Compiler;
pub use error::LlvmError;
pub use interface::{CallInterface, InterfaceDecl, MethodSig, NativeKind, NativeType};
pub use program::Program;
pub use source::{ModuleSource, TranspileOptions};
