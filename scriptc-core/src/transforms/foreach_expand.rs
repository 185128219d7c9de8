use tracing::{debug, info, warn};

use crate::error::PassError;
use crate::export::{ForeachKernel, ForeachSignature};
use crate::ir::{BinOp, Function, Inst, Module};
use crate::pass::{ModulePass, PassOutcome};

/// Suffix of the generated dispatch wrapper for a kernel.
pub const EXPAND_SUFFIX: &str = ".expand";

/// Size in bytes of one element of a kernel's input/output buffers.
pub const ELEMENT_SIZE: i32 = 4;

// Wrapper parameters: (in_ptr, out_ptr, x1, x2, instep, outstep).
const IN_PTR: u32 = 0;
const OUT_PTR: u32 = 1;
const X: u32 = 2;
const X_END: u32 = 3;
const IN_STEP: u32 = 4;
const OUT_STEP: u32 = 5;
const WRAPPER_PARAMS: u32 = 6;

/// Generates `<kernel>.expand` wrappers that run a foreach kernel over the
/// index range `[x1, x2)` so the runtime launches a whole range with one call.
///
/// With step optimization enabled the pointer steps are the constant
/// element size rather than the `instep`/`outstep` arguments. A kernel that
/// is not defined or does not match its signature fails the whole pass.
#[derive(Debug, Clone)]
pub struct ForEachExpandPass {
    kernels: Vec<ForeachKernel>,
    enable_step_opt: bool,
}

impl ForEachExpandPass {
    pub fn new(kernels: &[ForeachKernel], enable_step_opt: bool) -> Self {
        Self {
            kernels: kernels.to_vec(),
            enable_step_opt,
        }
    }

    fn step(&self, param: u32) -> Inst {
        if self.enable_step_opt {
            Inst::Const(ELEMENT_SIZE)
        } else {
            Inst::LocalGet(param)
        }
    }

    fn wrapper_body(&self, kernel: &ForeachKernel) -> Vec<Inst> {
        let signature = kernel.signature;
        let has_in = signature.contains(ForeachSignature::IN);
        let has_out = signature.contains(ForeachSignature::OUT);

        let mut body = vec![
            Inst::Block,
            Inst::Loop,
            Inst::LocalGet(X),
            Inst::LocalGet(X_END),
            Inst::Binary(BinOp::GeS),
            Inst::BrIf(1),
        ];
        if has_out {
            body.push(Inst::LocalGet(OUT_PTR));
        }
        if has_in {
            body.push(Inst::LocalGet(IN_PTR));
            body.push(Inst::Load { offset: 0 });
        }
        if signature.contains(ForeachSignature::X) {
            body.push(Inst::LocalGet(X));
        }
        body.push(Inst::Call(kernel.name.clone()));
        if has_out {
            body.push(Inst::Store { offset: 0 });
        }
        if has_in {
            body.extend(advance(IN_PTR, self.step(IN_STEP)));
        }
        if has_out {
            body.extend(advance(OUT_PTR, self.step(OUT_STEP)));
        }
        body.extend(advance(X, Inst::Const(1)));
        body.extend([Inst::Br(0), Inst::End, Inst::End]);
        body
    }
}

fn advance(local: u32, step: Inst) -> [Inst; 4] {
    [
        Inst::LocalGet(local),
        step,
        Inst::Binary(BinOp::Add),
        Inst::LocalSet(local),
    ]
}

impl ModulePass for ForEachExpandPass {
    fn name(&self) -> &'static str {
        "foreach-expand"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        // Every kernel is checked before the module is touched.
        let mut pending = Vec::new();
        for kernel in &self.kernels {
            let wrapper = format!("{}{EXPAND_SUFFIX}", kernel.name);
            if module.defines(&wrapper) {
                debug!(kernel = %kernel.name, "wrapper already present");
                continue;
            }
            let Some(function) = module.function(&kernel.name) else {
                warn!(kernel = %kernel.name, module = %module.id, "foreach kernel is not defined");
                return Err(PassError::new(
                    self.name(),
                    format!("foreach kernel '{}' is not defined in '{}'", kernel.name, module.id),
                ));
            };
            let signature = kernel.signature;
            if function.params != signature.kernel_params()
                || function.results != signature.kernel_results()
            {
                warn!(
                    kernel = %kernel.name,
                    %signature,
                    params = function.params,
                    results = function.results,
                    "foreach kernel does not match its signature"
                );
                return Err(PassError::new(
                    self.name(),
                    format!(
                        "foreach kernel '{}' takes {} parameter(s) and returns {} value(s), \
                         but signature {signature} needs {} and {}",
                        kernel.name,
                        function.params,
                        function.results,
                        signature.kernel_params(),
                        signature.kernel_results()
                    ),
                ));
            }
            pending.push((kernel, wrapper));
        }

        let expanded = pending.len();
        for (kernel, wrapper) in pending {
            let body = self.wrapper_body(kernel);
            module
                .functions
                .push(Function::new(wrapper, WRAPPER_PARAMS, 0, body));
        }

        info!(
            module = %module.id,
            expanded,
            step_opt = self.enable_step_opt,
            "expanded foreach kernels"
        );
        Ok(if expanded > 0 {
            PassOutcome::Changed
        } else {
            PassOutcome::Unchanged
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Linkage;

    fn blur_signature() -> ForeachSignature {
        ForeachSignature::IN
            .union(ForeachSignature::OUT)
            .union(ForeachSignature::X)
    }

    fn module_with_blur() -> Module {
        let mut module = Module::new("kernels");
        module.functions.push(
            Function::new(
                "blur",
                2,
                1,
                vec![Inst::LocalGet(0), Inst::LocalGet(1), Inst::Binary(BinOp::Add)],
            )
            .internal(),
        );
        module
    }

    #[test]
    fn generates_external_wrapper_with_constant_steps() {
        let mut module = module_with_blur();
        let kernels = [ForeachKernel::new("blur", blur_signature())];
        let outcome = ForEachExpandPass::new(&kernels, true)
            .run_on_module(&mut module)
            .expect("expand");
        assert_eq!(outcome, PassOutcome::Changed);
        module.verify().expect("expanded module verifies");

        let wrapper = module.function("blur.expand").expect("wrapper generated");
        assert_eq!(wrapper.linkage, Linkage::External);
        assert_eq!(wrapper.params, 6);
        assert_eq!(wrapper.results, 0);
        assert!(wrapper.body.contains(&Inst::Call("blur".into())));
        assert!(!wrapper.body.contains(&Inst::LocalGet(IN_STEP)));
        assert!(wrapper.body.contains(&Inst::Const(ELEMENT_SIZE)));
    }

    #[test]
    fn uses_runtime_steps_without_step_optimization() {
        let mut module = module_with_blur();
        let kernels = [ForeachKernel::new("blur", blur_signature())];
        ForEachExpandPass::new(&kernels, false)
            .run_on_module(&mut module)
            .expect("expand");
        let wrapper = module.function("blur.expand").expect("wrapper generated");
        assert!(wrapper.body.contains(&Inst::LocalGet(IN_STEP)));
        assert!(wrapper.body.contains(&Inst::LocalGet(OUT_STEP)));
    }

    #[test]
    fn missing_or_mismatched_kernels_fail_without_changing_the_module() {
        for kernel in [
            ForeachKernel::new("missing", ForeachSignature::OUT),
            ForeachKernel::new("blur", ForeachSignature::IN.union(ForeachSignature::OUT)),
        ] {
            let mut module = module_with_blur();
            let before = module.clone();
            let kernels = [ForeachKernel::new("blur", blur_signature()), kernel];
            let err = ForEachExpandPass::new(&kernels, true)
                .run_on_module(&mut module)
                .unwrap_err();
            assert_eq!(err.pass, "foreach-expand");
            assert_eq!(module, before, "no wrapper is generated when any kernel fails");
        }
    }

    #[test]
    fn leaves_existing_wrapper_alone() {
        let mut module = module_with_blur();
        let kernels = [ForeachKernel::new("blur", blur_signature())];
        let mut pass = ForEachExpandPass::new(&kernels, true);
        pass.run_on_module(&mut module).expect("first expansion");
        let outcome = pass.run_on_module(&mut module).expect("second expansion");
        assert_eq!(outcome, PassOutcome::Unchanged);
        assert_eq!(module.functions.len(), 2);
    }
}
