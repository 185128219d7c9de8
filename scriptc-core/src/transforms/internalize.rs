use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::PassError;
use crate::ir::{Linkage, Module};
use crate::pass::{ModulePass, PassOutcome};

/// Downgrades every external symbol that is not in the preserve list to
/// internal linkage. Cannot be undone by later passes.
#[derive(Debug, Clone)]
pub struct InternalizePass {
    preserve: Vec<String>,
}

impl InternalizePass {
    pub fn new(preserve: Vec<String>) -> Self {
        Self { preserve }
    }
}

impl ModulePass for InternalizePass {
    fn name(&self) -> &'static str {
        "internalize"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        // Membership only, so repeated names in the list are harmless.
        let keep: HashSet<&str> = self.preserve.iter().map(String::as_str).collect();
        let mut internalized = 0usize;

        for global in &mut module.globals {
            if global.linkage == Linkage::External && !keep.contains(global.name.as_str()) {
                debug!(symbol = %global.name, "internalizing global");
                global.linkage = Linkage::Internal;
                internalized += 1;
            }
        }
        for function in &mut module.functions {
            if function.linkage == Linkage::External && !keep.contains(function.name.as_str()) {
                debug!(symbol = %function.name, "internalizing function");
                function.linkage = Linkage::Internal;
                internalized += 1;
            }
        }

        info!(
            module = %module.id,
            preserved = keep.len(),
            internalized,
            "internalized symbols"
        );
        Ok(if internalized > 0 {
            PassOutcome::Changed
        } else {
            PassOutcome::Unchanged
        })
    }
}
