//! The compilation driver.
//!
//! [`Compiler`] owns one [`TargetMachine`] and a set of [`CompilerHooks`].
//! `compile` runs two stages over a [`Script`]: whole-program (LTO) passes,
//! then code generation for the configured file type. Each stage builds its
//! pass collection, calls the hooks at the four stage boundaries and runs the
//! collection synchronously. The artifact reaches the sink only after the
//! last hook has returned successfully.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::error::{CompileResult, ErrorCode};
use crate::hooks::{CompilerHooks, DefaultHooks, HookPoint, HookResult};
use crate::pass::PassManager;
use crate::script::Script;
use crate::sink::{OutputFile, OutputSink, SinkState, StreamSink};
use crate::target::{CompilerConfig, TargetMachine};

pub struct Compiler {
    target: Option<TargetMachine>,
    enable_lto: bool,
    hooks: Arc<dyn CompilerHooks>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// An unconfigured compiler with hooks that change nothing.
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(DefaultHooks))
    }

    pub fn with_hooks(hooks: Arc<dyn CompilerHooks>) -> Self {
        Self {
            target: None,
            enable_lto: true,
            hooks,
        }
    }

    /// Create the target machine described by `config`.
    ///
    /// On failure the previously configured machine, if any, stays in place.
    pub fn configure(&mut self, config: &CompilerConfig) -> CompileResult {
        match TargetMachine::create(config) {
            Ok(machine) => {
                if let Some(previous) = &self.target {
                    debug!(previous = %previous.triple(), "replacing target machine");
                }
                self.target = Some(machine);
                Ok(())
            }
            Err(code) => {
                error!(
                    triple = config.triple(),
                    %code,
                    kept_previous = self.target.is_some(),
                    "failed to configure compiler"
                );
                Err(code)
            }
        }
    }

    pub fn target_machine(&self) -> Option<&TargetMachine> {
        self.target.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    pub fn enable_lto(&mut self, enable: bool) {
        self.enable_lto = enable;
    }

    /// Run both stages over `script` and write the artifact to `sink`.
    ///
    /// Without a target machine the sink is never touched.
    #[instrument(skip_all, fields(module = %script.module().id))]
    pub fn compile(&self, script: &mut Script, sink: &mut dyn OutputSink) -> CompileResult {
        let Some(target) = self.target.as_ref() else {
            error!("compile called before a target machine was configured");
            return Err(ErrorCode::ErrNoTargetMachine);
        };

        match sink.state() {
            SinkState::Unprepared | SinkState::Ready => {}
            state @ (SinkState::Finalized | SinkState::Failed) => {
                error!(?state, "output sink cannot accept an artifact");
                return Err(ErrorCode::ErrInvalidOutputFileState);
            }
        }
        sink.prepare().map_err(|err| {
            error!(%err, "failed to prepare output");
            ErrorCode::ErrPrepareOutput
        })?;

        script.materialize().map_err(|err| {
            error!(%err, "module materialization failed");
            ErrorCode::ErrMaterialization
        })?;

        if self.enable_lto {
            self.run_lto_stage(script, target)?;
        } else {
            debug!("LTO stage disabled");
        }
        let artifact = self.run_codegen_stage(script, target)?;

        sink.write_artifact(&artifact).map_err(|err| {
            error!(%err, "failed to write artifact");
            ErrorCode::ErrWriteOutput
        })?;
        info!(bytes = artifact.len(), triple = %target.triple(), "compiled script");
        Ok(())
    }

    /// Compile into any writer.
    pub fn compile_to_stream<W: Write + ?Sized>(
        &self,
        script: &mut Script,
        writer: &mut W,
    ) -> CompileResult {
        let mut sink = StreamSink::new(writer);
        self.compile(script, &mut sink)
    }

    pub fn compile_to_file(&self, script: &mut Script, file: &mut OutputFile) -> CompileResult {
        self.compile(script, file)
    }

    fn run_lto_stage(&self, script: &mut Script, target: &TargetMachine) -> CompileResult {
        let hooks = self.hooks.as_ref();
        let mut passes = PassManager::new();

        check_hook(
            HookPoint::BeforeAddLtoPasses,
            hooks.before_add_lto_passes(script, &mut passes, target),
        )?;
        target.add_lto_passes(&mut passes);
        check_hook(
            HookPoint::AfterAddLtoPasses,
            hooks.after_add_lto_passes(script, &mut passes, target),
        )?;
        check_hook(
            HookPoint::BeforeExecuteLtoPasses,
            hooks.before_execute_lto_passes(script, &mut passes, target),
        )?;

        debug!(passes = ?passes.pass_names(), "running LTO passes");
        let run = passes.run(script.module_mut()).map_err(|err| {
            error!(%err, "LTO pass failed");
            ErrorCode::ErrExecuteLtoPasses
        })?;
        debug!(changed = run.changed, "LTO passes finished");

        check_hook(
            HookPoint::AfterExecuteLtoPasses,
            hooks.after_execute_lto_passes(script, target),
        )
    }

    fn run_codegen_stage(&self, script: &mut Script, target: &TargetMachine) -> CompileResult<Vec<u8>> {
        let hooks = self.hooks.as_ref();
        let mut passes = PassManager::new();

        check_hook(
            HookPoint::BeforeAddCodeGenPasses,
            hooks.before_add_codegen_passes(script, &mut passes, target),
        )?;
        target.add_passes_to_emit_file(&mut passes)?;
        check_hook(
            HookPoint::AfterAddCodeGenPasses,
            hooks.after_add_codegen_passes(script, &mut passes, target),
        )?;
        check_hook(
            HookPoint::BeforeExecuteCodeGenPasses,
            hooks.before_execute_codegen_passes(script, &mut passes, target),
        )?;

        let run = passes.run(script.module_mut()).map_err(|err| {
            error!(%err, "code-generation pass failed");
            ErrorCode::ErrExecuteCodeGenPasses
        })?;

        check_hook(
            HookPoint::AfterExecuteCodeGenPasses,
            hooks.after_execute_codegen_passes(script, target),
        )?;
        Ok(run.output)
    }
}

fn check_hook(point: HookPoint, result: HookResult) -> CompileResult {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(hook = point.name(), %err, "hook aborted compilation");
            Err(point.error_code())
        }
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("target", &self.target)
            .field("enable_lto", &self.enable_lto)
            .finish_non_exhaustive()
    }
}
