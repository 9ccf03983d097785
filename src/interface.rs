use std::fmt;

use crate::error::LlvmError;
use crate::program::SymbolTable;

/// The parameter/return vocabulary an invocation interface may use. This is
/// the set of types that can cross the native boundary unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeKind {
    Void,
    Bool,
    I8,
    I16,
    I32,
    F32,
    F64,
    Ptr(Box<NativeKind>),
}

impl fmt::Display for NativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeKind::Void => write!(f, "void"),
            NativeKind::Bool => write!(f, "bool"),
            NativeKind::I8 => write!(f, "i8"),
            NativeKind::I16 => write!(f, "i16"),
            NativeKind::I32 => write!(f, "i32"),
            NativeKind::F32 => write!(f, "f32"),
            NativeKind::F64 => write!(f, "f64"),
            NativeKind::Ptr(elem) => write!(f, "*{}", elem),
        }
    }
}

/// Rust types usable in a `call_interface!` signature.
pub trait NativeType {
    fn kind() -> NativeKind;
}

macro_rules! native_type {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(impl NativeType for $ty {
            fn kind() -> NativeKind {
                $kind
            }
        })*
    };
}

native_type! {
    () => NativeKind::Void,
    bool => NativeKind::Bool,
    i8 => NativeKind::I8,
    i16 => NativeKind::I16,
    i32 => NativeKind::I32,
    f32 => NativeKind::F32,
    f64 => NativeKind::F64,
}

impl<T: NativeType> NativeType for *const T {
    fn kind() -> NativeKind {
        NativeKind::Ptr(Box::new(T::kind()))
    }
}

impl<T: NativeType> NativeType for *mut T {
    fn kind() -> NativeKind {
        NativeKind::Ptr(Box::new(T::kind()))
    }
}

/// One declared native function: its name and full signature.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<NativeKind>,
    pub ret: NativeKind,
}

/// The caller-declared contract: every native function to be exposed, one
/// entry per function. A pure descriptor, it carries no behavior of its own.
#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub methods: Vec<MethodSig>,
}

impl InterfaceDecl {
    pub fn new(methods: Vec<MethodSig>) -> Self {
        InterfaceDecl { methods }
    }
}

/// A typed dispatch table over a set of JIT-compiled functions.
///
/// Implementations are normally generated with [`call_interface!`]: one
/// `unsafe extern "C" fn` field per native function. `describe` is what the
/// verifier checks against the module; `bind` fills the table from resolved
/// addresses and is only called with addresses the verifier accepted.
pub trait CallInterface: Sized {
    fn describe() -> InterfaceDecl;

    /// # Safety
    ///
    /// Every address in `symbols` must point to a function whose ABI matches
    /// the signature declared for that name in [`describe`](Self::describe).
    unsafe fn bind(symbols: &SymbolTable<'_>) -> Result<Self, LlvmError>;
}

/// Declare an invocation interface: a struct with one method per native
/// function. Parameter and return types are restricted to the
/// [`NativeType`] vocabulary.
///
/// ```ignore
/// call_interface! {
///     pub struct MatMul {
///         fn matmul(a: *const f32, b: *const f32, c: *mut f32, m: i32, n: i32, k: i32);
///     }
/// }
/// ```
///
/// Two methods with the same name collide as struct fields, so overloading
/// is already a compile error here; the verifier re-checks hand-written
/// declarations at runtime.
#[macro_export]
macro_rules! call_interface {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( fn $fname:ident ( $($arg:ident : $aty:ty),* $(,)? ) $(-> $rty:ty)? ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        $vis struct $name {
            $( $fname: unsafe extern "C" fn($($aty),*) $(-> $rty)?, )*
        }

        impl $name {
            $(
                /// # Safety
                ///
                /// Calls straight into JIT-compiled machine code; pointer
                /// arguments must be valid for the native function's access
                /// pattern and the owning program must not be disposed.
                pub unsafe fn $fname(&self, $($arg: $aty),*) $(-> $rty)? {
                    unsafe { (self.$fname)($($arg),*) }
                }
            )*
        }

        impl $crate::interface::CallInterface for $name {
            fn describe() -> $crate::interface::InterfaceDecl {
                $crate::interface::InterfaceDecl::new(vec![
                    $(
                        $crate::interface::MethodSig {
                            name: stringify!($fname).to_string(),
                            params: vec![
                                $(<$aty as $crate::interface::NativeType>::kind()),*
                            ],
                            ret: $crate::call_interface!(@ret $($rty)?),
                        }
                    ),*
                ])
            }

            unsafe fn bind(
                symbols: &$crate::program::SymbolTable<'_>,
            ) -> Result<Self, $crate::error::LlvmError> {
                Ok(Self {
                    $( $fname: unsafe { symbols.function(stringify!($fname))? }, )*
                })
            }
        }
    };

    (@ret) => { $crate::interface::NativeKind::Void };
    (@ret $rty:ty) => { <$rty as $crate::interface::NativeType>::kind() };
}
