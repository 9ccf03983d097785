use std::collections::HashSet;

use inkwell::module::Module;
use inkwell::types::BasicTypeEnum;

use crate::error::LlvmError;
use crate::interface::{InterfaceDecl, NativeKind};

/// Check a declared invocation interface against the module's exported
/// functions: every method must exist by name with matching arity and
/// compatible parameter/return types.
///
/// Fails fast on the first offending method. The returned names are exactly
/// the declared methods, in declaration order, and are the only symbols the
/// program will resolve.
pub fn verify_interface(
    module: &Module<'_>,
    decl: &InterfaceDecl,
) -> Result<Vec<String>, LlvmError> {
    if decl.methods.is_empty() {
        return Err(LlvmError::MalformedInterface(
            "interface declares no functions".to_string(),
        ));
    }

    // overloading check runs before any native lookup
    let mut seen = HashSet::new();
    for method in &decl.methods {
        if !seen.insert(method.name.as_str()) {
            return Err(LlvmError::DuplicateMethod(method.name.clone()));
        }
    }

    let mut names = Vec::with_capacity(decl.methods.len());
    for method in &decl.methods {
        let function = module
            .get_function(&method.name)
            .ok_or_else(|| LlvmError::MissingSymbol(method.name.clone()))?;
        let fn_type = function.get_type();

        let native_params = fn_type.get_param_types();
        if native_params.len() != method.params.len() {
            return Err(LlvmError::ParameterCountMismatch {
                function: method.name.clone(),
                declared: method.params.len(),
                native: native_params.len(),
            });
        }

        for (index, (declared, native)) in
            method.params.iter().zip(&native_params).enumerate()
        {
            let native = BasicTypeEnum::try_from(*native).map_err(|_| {
                LlvmError::TypeMismatch {
                    function: method.name.clone(),
                    index,
                    declared: declared.to_string(),
                    native: format!("{native:?}"),
                }
            })?;
            if !compatible(module, declared, native) {
                return Err(LlvmError::TypeMismatch {
                    function: method.name.clone(),
                    index,
                    declared: declared.to_string(),
                    native: native.print_to_string().to_string(),
                });
            }
        }

        match (fn_type.get_return_type(), &method.ret) {
            (None, NativeKind::Void) => {}
            (Some(native), declared) if *declared != NativeKind::Void => {
                if !compatible(module, declared, native) {
                    return Err(LlvmError::ReturnTypeMismatch {
                        function: method.name.clone(),
                        declared: declared.to_string(),
                        native: native.print_to_string().to_string(),
                    });
                }
            }
            (native, declared) => {
                return Err(LlvmError::ReturnTypeMismatch {
                    function: method.name.clone(),
                    declared: declared.to_string(),
                    native: native
                        .map(|t| t.print_to_string().to_string())
                        .unwrap_or_else(|| "void".to_string()),
                });
            }
        }

        names.push(method.name.clone());
    }

    Ok(names)
}

/// The type-compatibility relation between a declared kind and an LLVM type.
///
/// Integers match on exact bit width (32/16/8/1). A declared pointer accepts
/// any native pointer (LLVM 18 pointers are opaque, the pointee is not
/// recoverable) and accepts an array whose element type is compatible with
/// the pointee.
fn compatible(module: &Module<'_>, declared: &NativeKind, native: BasicTypeEnum<'_>) -> bool {
    let ctx = module.get_context();
    match (declared, native) {
        (NativeKind::F32, BasicTypeEnum::FloatType(f)) => f == ctx.f32_type(),
        (NativeKind::F64, BasicTypeEnum::FloatType(f)) => f == ctx.f64_type(),
        (NativeKind::Bool, BasicTypeEnum::IntType(i)) => i.get_bit_width() == 1,
        (NativeKind::I8, BasicTypeEnum::IntType(i)) => i.get_bit_width() == 8,
        (NativeKind::I16, BasicTypeEnum::IntType(i)) => i.get_bit_width() == 16,
        (NativeKind::I32, BasicTypeEnum::IntType(i)) => i.get_bit_width() == 32,
        (NativeKind::Ptr(_), BasicTypeEnum::PointerType(_)) => true,
        (NativeKind::Ptr(elem), BasicTypeEnum::ArrayType(a)) => {
            compatible(module, elem, a.get_element_type())
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interface::MethodSig;
    use inkwell::context::Context;

    fn sig(name: &str, params: Vec<NativeKind>, ret: NativeKind) -> MethodSig {
        MethodSig {
            name: name.to_string(),
            params,
            ret,
        }
    }

    /// `void scale(float* data, i32 len, float factor)` and
    /// `i32 count()` without bodies; declarations are enough to verify.
    fn sample_module(ctx: &Context) -> Module<'_> {
        let module = ctx.create_module("sample");
        let f32t = ctx.f32_type();
        let i32t = ctx.i32_type();
        let ptr = f32t.ptr_type(inkwell::AddressSpace::default());

        module.add_function(
            "scale",
            ctx.void_type()
                .fn_type(&[ptr.into(), i32t.into(), f32t.into()], false),
            None,
        );
        module.add_function("count", i32t.fn_type(&[], false), None);
        module
    }

    fn scale_sig() -> MethodSig {
        sig(
            "scale",
            vec![
                NativeKind::Ptr(Box::new(NativeKind::F32)),
                NativeKind::I32,
                NativeKind::F32,
            ],
            NativeKind::Void,
        )
    }

    #[test]
    fn accepts_matching_interface() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let decl = InterfaceDecl::new(vec![
            scale_sig(),
            sig("count", vec![], NativeKind::I32),
        ]);
        let names = verify_interface(&module, &decl).unwrap();
        assert_eq!(names, vec!["scale", "count"]);
    }

    #[test]
    fn rejects_empty_interface() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let err = verify_interface(&module, &InterfaceDecl::new(vec![])).unwrap_err();
        assert!(matches!(err, LlvmError::MalformedInterface(_)));
    }

    #[test]
    fn rejects_overloading_before_lookup() {
        let ctx = Context::create();
        // neither name exists in the module; the duplicate must win anyway
        let module = ctx.create_module("empty");
        let decl = InterfaceDecl::new(vec![
            sig("f", vec![], NativeKind::Void),
            sig("f", vec![NativeKind::I32], NativeKind::Void),
        ]);
        let err = verify_interface(&module, &decl).unwrap_err();
        match err {
            LlvmError::DuplicateMethod(name) => assert_eq!(name, "f"),
            other => panic!("expected duplicate method, got {other}"),
        }
    }

    #[test]
    fn rejects_missing_symbol_by_name() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let decl = InterfaceDecl::new(vec![sig("rotate", vec![], NativeKind::Void)]);
        match verify_interface(&module, &decl).unwrap_err() {
            LlvmError::MissingSymbol(name) => assert_eq!(name, "rotate"),
            other => panic!("expected missing symbol, got {other}"),
        }
    }

    #[test]
    fn rejects_arity_mismatch() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let mut wrong = scale_sig();
        wrong.params.pop();
        let decl = InterfaceDecl::new(vec![wrong]);
        match verify_interface(&module, &decl).unwrap_err() {
            LlvmError::ParameterCountMismatch {
                function,
                declared,
                native,
            } => {
                assert_eq!(function, "scale");
                assert_eq!(declared, 2);
                assert_eq!(native, 3);
            }
            other => panic!("expected parameter count mismatch, got {other}"),
        }
    }

    #[test]
    fn rejects_parameter_type_mismatch_with_index() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let mut wrong = scale_sig();
        wrong.params[2] = NativeKind::F64; // native is float
        let decl = InterfaceDecl::new(vec![wrong]);
        match verify_interface(&module, &decl).unwrap_err() {
            LlvmError::TypeMismatch {
                function,
                index,
                declared,
                native,
            } => {
                assert_eq!(function, "scale");
                assert_eq!(index, 2);
                assert_eq!(declared, "f64");
                assert_eq!(native, "float");
            }
            other => panic!("expected type mismatch, got {other}"),
        }
    }

    #[test]
    fn rejects_return_type_mismatch() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let decl = InterfaceDecl::new(vec![sig("count", vec![], NativeKind::F64)]);
        match verify_interface(&module, &decl).unwrap_err() {
            LlvmError::ReturnTypeMismatch { function, .. } => assert_eq!(function, "count"),
            other => panic!("expected return type mismatch, got {other}"),
        }
    }

    #[test]
    fn void_return_must_be_declared_void() {
        let ctx = Context::create();
        let module = sample_module(&ctx);
        let mut wrong = scale_sig();
        wrong.ret = NativeKind::I32; // native returns void
        let decl = InterfaceDecl::new(vec![wrong]);
        assert!(matches!(
            verify_interface(&module, &decl).unwrap_err(),
            LlvmError::ReturnTypeMismatch { .. }
        ));
    }

    #[test]
    fn integer_widths_match_exactly() {
        let ctx = Context::create();
        let module = ctx.create_module("ints");
        let i16t = ctx.i16_type();
        module.add_function("narrow", i16t.fn_type(&[i16t.into()], false), None);

        let ok = InterfaceDecl::new(vec![sig(
            "narrow",
            vec![NativeKind::I16],
            NativeKind::I16,
        )]);
        assert!(verify_interface(&module, &ok).is_ok());

        let wide = InterfaceDecl::new(vec![sig(
            "narrow",
            vec![NativeKind::I32],
            NativeKind::I16,
        )]);
        assert!(matches!(
            verify_interface(&module, &wide).unwrap_err(),
            LlvmError::TypeMismatch { index: 0, .. }
        ));
    }
}
