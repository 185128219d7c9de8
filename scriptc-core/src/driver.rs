//! High-level entry point: link a script against its runtime library and
//! compile it for a target in one call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::codegen::FileType;
use crate::compiler::Compiler;
use crate::error::CoreError;
use crate::runtime::{RuntimeLibrary, default_runtime_root, link_runtime, load_runtime_libraries, select_library};
use crate::script::Script;
use crate::script_compiler::ScriptCompilerHooks;
use crate::sink::{OutputFile, OutputSink, StreamSink};
use crate::target::CompilerConfig;

/// Owns a [`Compiler`] with [`ScriptCompilerHooks`] and reuses its target
/// machine across builds that need the same configuration.
#[derive(Debug)]
pub struct ScriptDriver {
    compiler: Compiler,
    config: Option<CompilerConfig>,
    runtime_root: PathBuf,
    libraries: Option<Vec<RuntimeLibrary>>,
    link_runtime: bool,
}

impl Default for ScriptDriver {
    fn default() -> Self {
        Self::new(default_runtime_root())
    }
}

impl ScriptDriver {
    pub fn new(runtime_root: impl Into<PathBuf>) -> Self {
        Self {
            compiler: Compiler::with_hooks(Arc::new(ScriptCompilerHooks::new())),
            config: None,
            runtime_root: runtime_root.into(),
            libraries: None,
            link_runtime: true,
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut Compiler {
        &mut self.compiler
    }

    /// Configuration of the current target machine, if one was created.
    pub fn config(&self) -> Option<&CompilerConfig> {
        self.config.as_ref()
    }

    pub fn runtime_root(&self) -> &Path {
        &self.runtime_root
    }

    pub fn set_link_runtime(&mut self, link: bool) {
        self.link_runtime = link;
    }

    /// Compile `script` into the file at `output`.
    pub fn build(
        &mut self,
        script: &mut Script,
        triple: &str,
        file_type: FileType,
        output: impl AsRef<Path>,
    ) -> Result<(), CoreError> {
        let mut file = OutputFile::new(output.as_ref());
        self.build_into(script, triple, file_type, &mut file)
    }

    /// Compile `script` and return the artifact bytes.
    pub fn build_to_vec(
        &mut self,
        script: &mut Script,
        triple: &str,
        file_type: FileType,
    ) -> Result<Vec<u8>, CoreError> {
        let mut sink = StreamSink::new(Vec::new());
        self.build_into(script, triple, file_type, &mut sink)?;
        Ok(sink.into_inner())
    }

    #[instrument(skip(self, script, sink), fields(module = %script.module().id))]
    pub fn build_into(
        &mut self,
        script: &mut Script,
        triple: &str,
        file_type: FileType,
        sink: &mut dyn OutputSink,
    ) -> Result<(), CoreError> {
        let config = CompilerConfig::new(triple)
            .with_opt_level(script.opt_level())
            .with_file_type(file_type);
        self.configure(config)?;
        if self.link_runtime {
            self.link(script)?;
        }
        self.compiler.compile(script, sink)?;
        Ok(())
    }

    fn link(&mut self, script: &mut Script) -> Result<(), CoreError> {
        if self.libraries.is_none() {
            self.libraries = Some(load_runtime_libraries(&self.runtime_root)?);
        }
        let libraries = self.libraries.as_deref().unwrap_or_default();
        let library = select_library(libraries, script.preferred_library())?;
        link_runtime(script, library);
        Ok(())
    }

    fn configure(&mut self, config: CompilerConfig) -> Result<(), CoreError> {
        if self.config.as_ref() == Some(&config) && self.compiler.is_configured() {
            debug!(triple = config.triple(), "reusing target machine");
            return Ok(());
        }
        self.compiler.configure(&config)?;
        self.config = Some(config);
        Ok(())
    }
}
