use tracing::debug;

use crate::error::PassError;
use crate::ir::{Inst, Module};
use crate::pass::{ModulePass, PassOutcome};

/// Folds constant operand windows (`const const binop`, `const eqz`).
///
/// Control flow is structured, so removing instructions never invalidates
/// a branch target. Operations that would trap are left in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantFoldPass;

impl ModulePass for ConstantFoldPass {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError> {
        let mut folded = 0usize;
        for function in &mut module.functions {
            let count = fold_body(&mut function.body);
            if count > 0 {
                debug!(function = %function.name, folded = count, "folded constants");
            }
            folded += count;
        }
        Ok(if folded > 0 {
            PassOutcome::Changed
        } else {
            PassOutcome::Unchanged
        })
    }
}

fn fold_body(body: &mut Vec<Inst>) -> usize {
    let mut folded = 0;
    loop {
        match find_fold(body) {
            Some((start, len, value)) => {
                body[start] = Inst::Const(value);
                body.drain(start + 1..start + len);
                folded += 1;
            }
            None => return folded,
        }
    }
}

fn find_fold(body: &[Inst]) -> Option<(usize, usize, i32)> {
    for index in 0..body.len() {
        match &body[index..] {
            [Inst::Const(left), Inst::Const(right), Inst::Binary(op), ..] => {
                if let Some(value) = op.fold(*left, *right) {
                    return Some((index, 3, value));
                }
            }
            [Inst::Const(value), Inst::Eqz, ..] => {
                return Some((index, 2, i32::from(*value == 0)));
            }
            _ => {}
        }
    }
    None
}
