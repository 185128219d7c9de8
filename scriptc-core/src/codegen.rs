//! Emitter passes that close the code-generation pass sequence.

use crate::codegen_wasm;
use crate::error::PassError;
use crate::ir::Module;
use crate::pass::{ModulePass, PassOutcome};
use crate::script::OptLevel;

/// Kind of artifact the code-generation stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    /// Binary object (a WebAssembly module).
    #[default]
    Object,
    /// Textual assembly listing.
    Assembly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmitObjectPass;

impl ModulePass for EmitObjectPass {
    fn name(&self) -> &'static str {
        "emit-object"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        codegen_wasm::emit_module(module)
            .map(PassOutcome::Emitted)
            .map_err(|err| PassError::new(self.name(), err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct EmitAssemblyPass {
    triple: String,
    opt_level: OptLevel,
}

impl EmitAssemblyPass {
    pub fn new(triple: impl Into<String>, opt_level: OptLevel) -> Self {
        Self {
            triple: triple.into(),
            opt_level,
        }
    }
}

impl ModulePass for EmitAssemblyPass {
    fn name(&self) -> &'static str {
        "emit-assembly"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        let listing = format!(
            "; target: {}\n; opt: {}\n{}",
            self.triple, self.opt_level as u8, module
        );
        Ok(PassOutcome::Emitted(listing.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Inst};

    #[test]
    fn assembly_listing_carries_target_header() {
        let mut module = Module::new("asm");
        module
            .functions
            .push(Function::new("root", 0, 1, vec![Inst::Const(3)]));
        let outcome = EmitAssemblyPass::new("usc-img-pvr", OptLevel::O2)
            .run_on_module(&mut module)
            .expect("emit");
        let PassOutcome::Emitted(bytes) = outcome else {
            panic!("emitter must produce output");
        };
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("; target: usc-img-pvr\n; opt: 2\nmodule \"asm\"\n"));
        assert!(text.contains("func @root(0) -> 1 {"));
    }

    #[test]
    fn object_emitter_reports_broken_modules() {
        let mut module = Module::new("broken");
        module
            .functions
            .push(Function::new("root", 0, 0, vec![Inst::Call("nowhere".into())]));
        let err = EmitObjectPass.run_on_module(&mut module).unwrap_err();
        assert_eq!(err.pass, "emit-object");
    }
}
