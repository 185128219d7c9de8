use std::path::PathBuf;

use thiserror::Error;

/// Outcome codes reported by [`crate::Compiler`].
///
/// The set is closed: every failure the driver can observe is translated to
/// exactly one of these at the point of detection. `Ok(())` stands for the
/// success code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    #[error("invalid compiler configuration: no target triple was supplied")]
    InvalidConfigNoTarget,
    #[error("failed to create the target machine for the supplied configuration")]
    ErrCreateTargetMachine,
    #[error("cannot compile without a target machine (configure the compiler first)")]
    ErrNoTargetMachine,
    #[error("failed to materialize the script module")]
    ErrMaterialization,
    #[error("the output target is in an invalid state (already finalized or failed)")]
    ErrInvalidOutputFileState,
    #[error("failed to prepare the output target for writing")]
    ErrPrepareOutput,
    #[error("the target cannot construct code-generation passes for the requested output")]
    ErrPrepareCodeGenPass,

    #[error("hook failed before adding LTO passes")]
    ErrHookBeforeAddLTOPasses,
    #[error("hook failed after adding LTO passes")]
    ErrHookAfterAddLTOPasses,
    #[error("hook failed before executing LTO passes")]
    ErrHookBeforeExecuteLTOPasses,
    #[error("hook failed after executing LTO passes")]
    ErrHookAfterExecuteLTOPasses,

    #[error("hook failed before adding code-generation passes")]
    ErrHookBeforeAddCodeGenPasses,
    #[error("hook failed after adding code-generation passes")]
    ErrHookAfterAddCodeGenPasses,
    #[error("hook failed before executing code-generation passes")]
    ErrHookBeforeExecuteCodeGenPasses,
    #[error("hook failed after executing code-generation passes")]
    ErrHookAfterExecuteCodeGenPasses,

    #[error("an LTO pass reported a failure")]
    ErrExecuteLtoPasses,
    #[error("a code-generation pass reported a failure")]
    ErrExecuteCodeGenPasses,
    #[error("failed to write the compiled artifact to the output target")]
    ErrWriteOutput,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 18] = [
        ErrorCode::InvalidConfigNoTarget,
        ErrorCode::ErrCreateTargetMachine,
        ErrorCode::ErrNoTargetMachine,
        ErrorCode::ErrMaterialization,
        ErrorCode::ErrInvalidOutputFileState,
        ErrorCode::ErrPrepareOutput,
        ErrorCode::ErrPrepareCodeGenPass,
        ErrorCode::ErrHookBeforeAddLTOPasses,
        ErrorCode::ErrHookAfterAddLTOPasses,
        ErrorCode::ErrHookBeforeExecuteLTOPasses,
        ErrorCode::ErrHookAfterExecuteLTOPasses,
        ErrorCode::ErrHookBeforeAddCodeGenPasses,
        ErrorCode::ErrHookAfterAddCodeGenPasses,
        ErrorCode::ErrHookBeforeExecuteCodeGenPasses,
        ErrorCode::ErrHookAfterExecuteCodeGenPasses,
        ErrorCode::ErrExecuteLtoPasses,
        ErrorCode::ErrExecuteCodeGenPasses,
        ErrorCode::ErrWriteOutput,
    ];
}

pub type CompileResult<T = ()> = Result<T, ErrorCode>;

pub const SUCCESS_STRING: &str = "successfully compiled";

/// Fixed description of a driver outcome, including success.
pub fn status_string(result: &CompileResult) -> String {
    match result {
        Ok(()) => SUCCESS_STRING.to_string(),
        Err(code) => code.to_string(),
    }
}

/// Failure reported by a single pass while it runs over a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pass '{pass}' failed: {reason}")]
pub struct PassError {
    pub pass: &'static str,
    pub reason: String,
}

impl PassError {
    pub fn new(pass: &'static str, reason: impl Into<String>) -> Self {
        Self {
            pass,
            reason: reason.into(),
        }
    }
}

/// Diagnostic attached to a hook that refused to let the pipeline continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("lex error at byte {position}: {message}")]
    LexError { position: usize, message: String },
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid module '{module}': {message}")]
    InvalidModule { module: String, message: String },
    #[error("runtime library directory was not found at {0}")]
    MissingRuntime(PathBuf),
    #[error("runtime library '{0}' is not available")]
    UnknownRuntimeLibrary(String),
    #[error("compilation failed: {0}")]
    Compile(#[from] ErrorCode),
}
