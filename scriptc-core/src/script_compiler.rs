//! Hooks that adapt the generic pipeline to compute scripts.
//!
//! Before the LTO passes are added, the hooks compute which symbols the
//! runtime must still reach after whole-program optimization and queue an
//! internalization pass that hides everything else. Before the LTO passes
//! execute, foreach kernels are expanded into `<kernel>.expand` dispatch
//! wrappers unless the target launches kernels natively.

use tracing::{debug, info, instrument};

use crate::error::HookError;
use crate::export::{ExportTable, ForeachKernel, RUNTIME_ENTRY_POINTS};
use crate::hooks::{CompilerHooks, HookResult};
use crate::pass::PassManager;
use crate::script::Script;
use crate::target::TargetMachine;
use crate::transforms::{EXPAND_SUFFIX, ForEachExpandPass, InternalizePass};

/// Name under which the runtime dispatches `kernel`.
pub fn expanded_name(kernel: &ForeachKernel, native_dispatch: bool) -> String {
    if native_dispatch {
        kernel.name.clone()
    } else {
        format!("{}{EXPAND_SUFFIX}", kernel.name)
    }
}

/// Symbols that keep external linkage: entry points, exported variables,
/// exported functions, then every kernel's dispatch name, in that order.
pub fn build_preservation_set(
    entry_points: &[&str],
    exports: &ExportTable,
    native_dispatch: bool,
) -> Vec<String> {
    let mut preserve = Vec::with_capacity(
        entry_points.len() + exports.vars().len() + exports.funcs().len() + exports.foreach().len(),
    );
    preserve.extend(entry_points.iter().map(|name| name.to_string()));
    preserve.extend(exports.vars().iter().cloned());
    preserve.extend(exports.funcs().iter().cloned());
    preserve.extend(
        exports
            .foreach()
            .iter()
            .map(|kernel| expanded_name(kernel, native_dispatch)),
    );
    preserve
}

#[derive(Debug, Clone)]
pub struct ScriptCompilerHooks {
    entry_points: Vec<&'static str>,
}

impl Default for ScriptCompilerHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptCompilerHooks {
    pub fn new() -> Self {
        Self::with_entry_points(RUNTIME_ENTRY_POINTS)
    }

    pub fn with_entry_points(entry_points: &[&'static str]) -> Self {
        Self {
            entry_points: entry_points.to_vec(),
        }
    }
}

fn require_exports<'s>(script: &'s Script, stage: &str) -> Result<&'s ExportTable, HookError> {
    script.export_table().map(|table| table.as_ref()).ok_or_else(|| {
        HookError::new(format!(
            "module '{}' has no export table; cannot {stage}",
            script.module().id
        ))
    })
}

impl CompilerHooks for ScriptCompilerHooks {
    #[instrument(skip_all, fields(module = %script.module().id))]
    fn before_add_lto_passes(
        &self,
        script: &mut Script,
        passes: &mut PassManager,
        target: &TargetMachine,
    ) -> HookResult {
        let exports = require_exports(script, "compute preserved symbols")?;
        let preserve =
            build_preservation_set(&self.entry_points, exports, target.dispatches_foreach_natively());
        debug!(preserve = ?preserve, "symbol preservation set");
        passes.add(InternalizePass::new(preserve));
        Ok(())
    }

    #[instrument(skip_all, fields(module = %script.module().id))]
    fn before_execute_lto_passes(
        &self,
        script: &mut Script,
        _passes: &mut PassManager,
        target: &TargetMachine,
    ) -> HookResult {
        let exports = require_exports(script, "expand foreach kernels")?;
        if target.dispatches_foreach_natively() {
            debug!(triple = %target.triple(), "target dispatches foreach kernels natively");
            return Ok(());
        }
        if exports.foreach().is_empty() {
            return Ok(());
        }

        let mut expansion = PassManager::new();
        expansion.add(ForEachExpandPass::new(exports.foreach(), true));
        let run = expansion
            .run(script.module_mut())
            .map_err(|err| HookError::new(err.to_string()))?;
        info!(changed = run.changed, "foreach expansion finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::codegen::FileType;
    use crate::compiler::Compiler;
    use crate::error::ErrorCode;
    use crate::export::ForeachSignature;
    use crate::ir::{BinOp, Function, Global, Inst, Linkage, Module};
    use crate::target::CompilerConfig;

    fn scenario_table() -> ExportTable {
        ExportTable::new()
            .with_var("g_x")
            .with_func("compute")
            .with_foreach(ForeachKernel::new(
                "blur",
                ForeachSignature::IN
                    .union(ForeachSignature::OUT)
                    .union(ForeachSignature::X),
            ))
    }

    fn scenario_script() -> Script {
        let mut module = Module::new("scenario");
        module.globals.push(Global::new("g_x", 5));
        module.globals.push(Global::new("g_scratch", 0));
        module.functions.push(Function::new(
            "init",
            0,
            0,
            vec![Inst::Const(1), Inst::GlobalSet("g_scratch".into())],
        ));
        module.functions.push(Function::new(
            "compute",
            1,
            1,
            vec![Inst::LocalGet(0), Inst::Call("scale".into())],
        ));
        module.functions.push(Function::new(
            "scale",
            1,
            1,
            vec![
                Inst::LocalGet(0),
                Inst::GlobalGet("g_x".into()),
                Inst::Binary(BinOp::Mul),
            ],
        ));
        module
            .functions
            .push(Function::new("unused", 0, 1, vec![Inst::Const(9)]));
        // blur(in, x) = in * 2 + x
        module.functions.push(Function::new(
            "blur",
            2,
            1,
            vec![
                Inst::LocalGet(0),
                Inst::Const(2),
                Inst::Binary(BinOp::Mul),
                Inst::LocalGet(1),
                Inst::Binary(BinOp::Add),
            ],
        ));
        Script::new(module).with_exports(scenario_table())
    }

    fn compiler_for(triple: &str, file_type: FileType) -> Compiler {
        let mut compiler = Compiler::with_hooks(Arc::new(ScriptCompilerHooks::new()));
        compiler
            .configure(&CompilerConfig::new(triple).with_file_type(file_type))
            .expect("configure");
        compiler
    }

    #[test]
    fn preservation_set_for_expanding_target() {
        let preserve = build_preservation_set(&["init"], &scenario_table(), false);
        assert_eq!(preserve, ["init", "g_x", "compute", "blur.expand"]);
    }

    #[test]
    fn preservation_set_for_native_target_keeps_kernel_name() {
        let preserve = build_preservation_set(&["init"], &scenario_table(), true);
        assert_eq!(preserve, ["init", "g_x", "compute", "blur"]);
    }

    #[test]
    fn preservation_set_size_and_kernel_order() {
        let sig = ForeachSignature::IN.union(ForeachSignature::OUT);
        let table = ExportTable::new()
            .with_var("a")
            .with_var("a")
            .with_func("f")
            .with_foreach(ForeachKernel::new("k2", sig))
            .with_foreach(ForeachKernel::new("k1", sig))
            .with_foreach(ForeachKernel::new("k3", sig));
        let preserve = build_preservation_set(RUNTIME_ENTRY_POINTS, &table, false);

        assert_eq!(preserve.len(), RUNTIME_ENTRY_POINTS.len() + 2 + 1 + 3);
        assert_eq!(&preserve[preserve.len() - 3..], ["k2.expand", "k1.expand", "k3.expand"]);
        for kernel in table.foreach() {
            let name = expanded_name(kernel, false);
            assert_eq!(preserve.iter().filter(|entry| **entry == name).count(), 1);
        }
    }

    #[test]
    fn expanding_target_internalizes_and_generates_wrapper() {
        let compiler = compiler_for("wasm32-unknown-unknown", FileType::Object);
        let mut script = scenario_script();
        let mut out = Vec::new();
        compiler
            .compile_to_stream(&mut script, &mut out)
            .expect("compile");

        let module = script.module();
        let wrapper = module.function("blur.expand").expect("wrapper generated");
        assert_eq!(wrapper.linkage, Linkage::External);
        assert_eq!(module.function("blur").map(|f| f.linkage), Some(Linkage::Internal));
        assert_eq!(module.function("scale").map(|f| f.linkage), Some(Linkage::Internal));
        assert_eq!(module.function("init").map(|f| f.linkage), Some(Linkage::External));
        assert_eq!(module.global("g_x").map(|g| g.linkage), Some(Linkage::External));
        assert!(module.function("unused").is_none(), "dead internal code removed");

        let mut external = module.external_symbols();
        external.sort_unstable();
        assert_eq!(external, ["blur.expand", "compute", "g_x", "init"]);
    }

    #[test]
    fn native_target_keeps_kernel_and_skips_expansion() {
        let compiler = compiler_for("usc-img-pvr", FileType::Assembly);
        let mut script = scenario_script();
        let mut out = Vec::new();
        compiler
            .compile_to_stream(&mut script, &mut out)
            .expect("compile");

        let module = script.module();
        assert!(module.function("blur.expand").is_none());
        assert_eq!(module.function("blur").map(|f| f.linkage), Some(Linkage::External));
        let listing = String::from_utf8(out).expect("utf8");
        assert!(listing.contains("func @blur(2) -> 1"), "{listing}");
    }

    #[test]
    fn missing_export_table_fails_before_adding_lto_passes() {
        let compiler = compiler_for("wasm32-unknown-unknown", FileType::Object);
        let mut script = scenario_script();
        script.set_export_table(None);
        let mut out = Vec::new();
        assert_eq!(
            compiler.compile_to_stream(&mut script, &mut out),
            Err(ErrorCode::ErrHookBeforeAddLTOPasses)
        );
        assert!(out.is_empty());
    }

    #[test]
    fn missing_export_table_fails_expansion_hook() {
        let hooks = ScriptCompilerHooks::new();
        let target = crate::target::TargetMachine::create(&CompilerConfig::new("wasm32"))
            .expect("target");
        let mut script = scenario_script();
        script.set_export_table(None);
        let before = script.module().clone();

        let mut passes = PassManager::new();
        assert!(
            hooks
                .before_execute_lto_passes(&mut script, &mut passes, &target)
                .is_err()
        );
        assert_eq!(*script.module(), before);
    }

    /// Drops the export table after the preservation set has been built.
    struct LoseExports;

    impl CompilerHooks for LoseExports {
        fn before_add_lto_passes(
            &self,
            script: &mut Script,
            passes: &mut PassManager,
            target: &TargetMachine,
        ) -> HookResult {
            ScriptCompilerHooks::new().before_add_lto_passes(script, passes, target)?;
            script.set_export_table(None);
            Ok(())
        }

        fn before_execute_lto_passes(
            &self,
            script: &mut Script,
            passes: &mut PassManager,
            target: &TargetMachine,
        ) -> HookResult {
            ScriptCompilerHooks::new().before_execute_lto_passes(script, passes, target)
        }
    }

    #[test]
    fn compile_reports_expansion_hook_failure() {
        let mut compiler = Compiler::with_hooks(Arc::new(LoseExports));
        compiler
            .configure(&CompilerConfig::new("wasm32-unknown-unknown"))
            .expect("configure");
        let mut out = Vec::new();
        assert_eq!(
            compiler.compile_to_stream(&mut scenario_script(), &mut out),
            Err(ErrorCode::ErrHookBeforeExecuteLTOPasses)
        );
        assert!(out.is_empty());
    }

    #[test]
    fn kernel_not_matching_its_signature_fails_compile() {
        let compiler = compiler_for("wasm32-unknown-unknown", FileType::Object);
        let table = ExportTable::new().with_foreach(ForeachKernel::new(
            "blur",
            ForeachSignature::IN.union(ForeachSignature::OUT),
        ));
        let mut script = Script::new(scenario_script().into_module()).with_exports(table);
        let mut out = Vec::new();
        assert_eq!(
            compiler.compile_to_stream(&mut script, &mut out),
            Err(ErrorCode::ErrHookBeforeExecuteLTOPasses)
        );
        assert!(out.is_empty());
        let blur = script.module().function("blur").expect("kernel kept");
        assert_eq!(blur.params, 2);
        assert!(script.module().function("blur.expand").is_none());
    }

    #[test]
    fn expanded_kernel_runs_from_compiled_object() {
        let compiler = compiler_for("wasm32-unknown-unknown", FileType::Object);
        let mut out = Vec::new();
        compiler
            .compile_to_stream(&mut scenario_script(), &mut out)
            .expect("compile");

        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, &out[..]).expect("module");
        let mut store = wasmi::Store::new(&engine, ());
        let instance = wasmi::Linker::<()>::new(&engine)
            .instantiate_and_start(&mut store, &module)
            .expect("instantiate");
        assert!(instance.get_func(&store, "blur").is_none());

        let memory = instance.get_memory(&store, "memory").expect("memory");
        let input: Vec<u8> = [1i32, 2, 3]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        memory.write(&mut store, 0, &input).expect("write");

        let expand = instance
            .get_typed_func::<(i32, i32, i32, i32, i32, i32), ()>(&store, "blur.expand")
            .expect("wrapper");
        expand
            .call(&mut store, (0, 128, 0, 3, 4, 4))
            .expect("dispatch");

        let mut output = [0u8; 12];
        memory.read(&store, 128, &mut output).expect("read");
        let values: Vec<i32> = output
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        assert_eq!(values, [2, 5, 8]);
    }
}
