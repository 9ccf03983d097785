use std::path::Path;

use inkwell::OptimizationLevel;
use inkwell::module::Module;
use inkwell::targets::{CodeModel, FileType, RelocMode, Target, TargetMachine, TargetTriple};

use crate::cache;
use crate::compiler::ensure_native_target;
use crate::error::LlvmError;

/// Parameters for relocatable object emission. Defaults follow the common
/// case: host triple, generic CPU tuning, no extra features, aggressive
/// optimization, default relocation and code models.
pub struct ObjectOptions {
    /// Target triple; `None` means the host default.
    pub triple: Option<String>,
    pub cpu: String,
    pub features: String,
    pub opt_level: OptimizationLevel,
    pub reloc_mode: RelocMode,
    pub code_model: CodeModel,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        ObjectOptions {
            triple: None,
            cpu: "generic".to_string(),
            features: String::new(),
            opt_level: OptimizationLevel::Aggressive,
            reloc_mode: RelocMode::Default,
            code_model: CodeModel::Default,
        }
    }
}

/// Store the module as textual IR (`.ll`). Published atomically, so the
/// path may be a live cache slot.
pub fn store_ir(module: &Module<'_>, path: &Path) -> Result<(), LlvmError> {
    cache::publish(path, module.print_to_string().to_bytes())
}

/// Store the module as bitcode (`.bc`). These artifacts usually land at a
/// cache's bitcode path, so the bytes are rendered in memory and published
/// atomically; an interrupted writer never leaves a truncated artifact
/// visible as a cache hit.
pub fn store_bitcode(module: &Module<'_>, path: &Path) -> Result<(), LlvmError> {
    let bitcode = module.write_bitcode_to_memory();
    cache::publish(path, bitcode.as_slice())
}

/// Emit a target-specific relocatable object file from the module.
pub fn emit_object(
    module: &Module<'_>,
    path: &Path,
    opts: &ObjectOptions,
) -> Result<(), LlvmError> {
    ensure_native_target()?;

    let triple = match &opts.triple {
        Some(s) => TargetTriple::create(s),
        None => TargetMachine::get_default_triple(),
    };
    let target = Target::from_triple(&triple).map_err(|e| LlvmError::Compile(e.to_string()))?;
    let machine = target
        .create_target_machine(
            &triple,
            &opts.cpu,
            &opts.features,
            opts.opt_level,
            opts.reloc_mode,
            opts.code_model,
        )
        .ok_or_else(|| {
            LlvmError::Compile(format!(
                "no target machine for triple {}",
                triple.as_str().to_string_lossy()
            ))
        })?;

    machine
        .write_to_file(module, FileType::Object, path)
        .map_err(|e| LlvmError::Compile(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use inkwell::context::Context;

    fn one_fn_module(ctx: &Context) -> Module<'_> {
        let module = ctx.create_module("emit");
        let i32t = ctx.i32_type();
        let f = module.add_function("answer", i32t.fn_type(&[], false), None);
        let bb = ctx.append_basic_block(f, "entry");
        let builder = ctx.create_builder();
        builder.position_at_end(bb);
        builder
            .build_return(Some(&i32t.const_int(42, false)))
            .unwrap();
        module
    }

    #[test]
    fn stores_ir_and_bitcode_round_trip() {
        let ctx = Context::create();
        let module = one_fn_module(&ctx);
        let dir = tempfile::tempdir().unwrap();

        let ll = dir.path().join("m.ll");
        store_ir(&module, &ll).unwrap();
        assert!(std::fs::read_to_string(&ll).unwrap().contains("answer"));

        let bc = dir.path().join("m.bc");
        store_bitcode(&module, &bc).unwrap();
        let reparsed = crate::source::ModuleSource::stored(&bc);
        let (module, _) = reparsed.build(&ctx).unwrap();
        assert!(module.get_function("answer").is_some());
    }

    #[test]
    fn stored_artifacts_are_published_atomically() {
        let ctx = Context::create();
        let module = one_fn_module(&ctx);
        let dir = tempfile::tempdir().unwrap();

        let bc = dir.path().join("m.bc");
        store_bitcode(&module, &bc).unwrap();
        let ll = dir.path().join("m.ll");
        store_ir(&module, &ll).unwrap();

        // rename-published: only the final artifacts are ever visible
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["m.bc", "m.ll"]);

        let (reparsed, _) = crate::source::ModuleSource::stored(&bc).build(&ctx).unwrap();
        assert!(reparsed.get_function("answer").is_some());
    }

    #[test]
    fn emits_object_file_for_host() {
        let ctx = Context::create();
        let module = one_fn_module(&ctx);
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("m.o");

        emit_object(&module, &obj, &ObjectOptions::default()).unwrap();
        let bytes = std::fs::read(&obj).unwrap();
        assert!(!bytes.is_empty());
    }
}
