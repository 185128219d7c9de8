//! Core of the scriptc compute-script toolchain.
//!
//! This crate provides the compilation driver and everything it drives.
//! The pipeline is roughly:
//!
//!   source .rsir
//!     -> lexer / parser       (Script: module + export table)
//!     -> runtime linking      (core runtime library)
//!     -> LTO stage            (internalize, foreach expansion, fold, DCE)
//!     -> codegen stage        (wasm object or assembly listing)
//!     -> output sink
//!
//! Both stages are bracketed by hooks ([`CompilerHooks`]); the script
//! hooks ([`ScriptCompilerHooks`]) are what make the generic driver a
//! compute-script compiler. The CLI depends on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: IR model, lexing and parsing
// ---------------------------------------------------------------------

pub mod ir;
pub mod lexer;
pub mod parser;
pub mod export;
pub mod script;

// ---------------------------------------------------------------------
// Passes and transformations
// ---------------------------------------------------------------------

pub mod pass;
pub mod transforms;

// ---------------------------------------------------------------------
// Back-end: targets, code generation and output
// ---------------------------------------------------------------------

pub mod target;
pub mod codegen;
pub mod codegen_wasm;
pub mod sink;

// ---------------------------------------------------------------------
// Driver, hooks and runtime integration
// ---------------------------------------------------------------------

pub mod hooks;
pub mod compiler;
pub mod script_compiler;
pub mod runtime;
pub mod driver;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use codegen::FileType;
pub use compiler::Compiler;
pub use driver::ScriptDriver;
pub use error::{CompileResult, CoreError, ErrorCode, HookError, PassError, status_string};
pub use export::{ExportTable, ForeachKernel, ForeachSignature, RUNTIME_ENTRY_POINTS};
pub use hooks::{CompilerHooks, DefaultHooks, HookPoint, HookResult};
pub use parser::{parse_module, parse_script};
pub use script::{OptLevel, Script};
pub use script_compiler::ScriptCompilerHooks;
pub use sink::{OutputFile, OutputSink, SinkState, StreamSink};
pub use target::{CompilerConfig, TargetMachine};
