use std::collections::HashSet;

use tracing::debug;

use crate::error::PassError;
use crate::ir::Module;
use crate::pass::{ModulePass, PassOutcome};

/// Removes internal functions and globals that no external symbol reaches.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalDcePass;

impl ModulePass for GlobalDcePass {
    fn name(&self) -> &'static str {
        "global-dce"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        let live = live_symbols(module);

        let before = module.functions.len() + module.globals.len();
        module.functions.retain(|function| {
            let keep = live.contains(&function.name);
            if !keep {
                debug!(symbol = %function.name, "removing dead function");
            }
            keep
        });
        module.globals.retain(|global| {
            let keep = live.contains(&global.name);
            if !keep {
                debug!(symbol = %global.name, "removing dead global");
            }
            keep
        });
        let after = module.functions.len() + module.globals.len();

        Ok(if after < before {
            PassOutcome::Changed
        } else {
            PassOutcome::Unchanged
        })
    }
}

fn live_symbols(module: &Module) -> HashSet<String> {
    let mut live: HashSet<String> = module
        .external_symbols()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut worklist: Vec<String> = live.iter().cloned().collect();

    while let Some(name) = worklist.pop() {
        let Some(function) = module.function(&name) else {
            continue;
        };
        for referenced in function.referenced_symbols() {
            if live.insert(referenced.to_string()) {
                worklist.push(referenced.to_string());
            }
        }
    }
    live
}
