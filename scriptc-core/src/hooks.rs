//! Extension points invoked by [`crate::Compiler`] at stage boundaries.
//!
//! Each method corresponds to exactly one boundary. Returning an error stops
//! the pipeline there: nothing further is added or executed for that stage
//! and the driver reports the boundary's own [`crate::ErrorCode`].

use crate::error::{ErrorCode, HookError};
use crate::pass::PassManager;
use crate::script::Script;
use crate::target::TargetMachine;

pub type HookResult = Result<(), HookError>;

/// Pipeline boundary a hook runs at, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeAddLtoPasses,
    AfterAddLtoPasses,
    BeforeExecuteLtoPasses,
    AfterExecuteLtoPasses,
    BeforeAddCodeGenPasses,
    AfterAddCodeGenPasses,
    BeforeExecuteCodeGenPasses,
    AfterExecuteCodeGenPasses,
}

impl HookPoint {
    pub const ALL: [HookPoint; 8] = [
        HookPoint::BeforeAddLtoPasses,
        HookPoint::AfterAddLtoPasses,
        HookPoint::BeforeExecuteLtoPasses,
        HookPoint::AfterExecuteLtoPasses,
        HookPoint::BeforeAddCodeGenPasses,
        HookPoint::AfterAddCodeGenPasses,
        HookPoint::BeforeExecuteCodeGenPasses,
        HookPoint::AfterExecuteCodeGenPasses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HookPoint::BeforeAddLtoPasses => "before_add_lto_passes",
            HookPoint::AfterAddLtoPasses => "after_add_lto_passes",
            HookPoint::BeforeExecuteLtoPasses => "before_execute_lto_passes",
            HookPoint::AfterExecuteLtoPasses => "after_execute_lto_passes",
            HookPoint::BeforeAddCodeGenPasses => "before_add_codegen_passes",
            HookPoint::AfterAddCodeGenPasses => "after_add_codegen_passes",
            HookPoint::BeforeExecuteCodeGenPasses => "before_execute_codegen_passes",
            HookPoint::AfterExecuteCodeGenPasses => "after_execute_codegen_passes",
        }
    }

    /// The code the driver reports when the hook at this point fails.
    pub fn error_code(self) -> ErrorCode {
        match self {
            HookPoint::BeforeAddLtoPasses => ErrorCode::ErrHookBeforeAddLTOPasses,
            HookPoint::AfterAddLtoPasses => ErrorCode::ErrHookAfterAddLTOPasses,
            HookPoint::BeforeExecuteLtoPasses => ErrorCode::ErrHookBeforeExecuteLTOPasses,
            HookPoint::AfterExecuteLtoPasses => ErrorCode::ErrHookAfterExecuteLTOPasses,
            HookPoint::BeforeAddCodeGenPasses => ErrorCode::ErrHookBeforeAddCodeGenPasses,
            HookPoint::AfterAddCodeGenPasses => ErrorCode::ErrHookAfterAddCodeGenPasses,
            HookPoint::BeforeExecuteCodeGenPasses => ErrorCode::ErrHookBeforeExecuteCodeGenPasses,
            HookPoint::AfterExecuteCodeGenPasses => ErrorCode::ErrHookAfterExecuteCodeGenPasses,
        }
    }
}

/// Stage-boundary callbacks. Every method defaults to success.
pub trait CompilerHooks: Send + Sync {
    fn before_add_lto_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn after_add_lto_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn before_execute_lto_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn after_execute_lto_passes(&self, _script: &mut Script, _target: &TargetMachine) -> HookResult {
        Ok(())
    }

    fn before_add_codegen_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn after_add_codegen_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn before_execute_codegen_passes(
        &self,
        _script: &mut Script,
        _passes: &mut PassManager,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }

    fn after_execute_codegen_passes(
        &self,
        _script: &mut Script,
        _target: &TargetMachine,
    ) -> HookResult {
        Ok(())
    }
}

/// Hooks that let every stage proceed untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl CompilerHooks for DefaultHooks {}
