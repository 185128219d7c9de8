use std::sync::Arc;

use crate::error::CoreError;
use crate::export::ExportTable;
use crate::ir::Module;

/// Optimization level of a script.
///
/// Values line up one-to-one with the backend's code-generation levels, so
/// the level is handed to the target machine without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum OptLevel {
    O0 = 0,
    O1 = 1,
    O2 = 2,
    #[default]
    O3 = 3,
}

impl TryFrom<u8> for OptLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OptLevel::O0),
            1 => Ok(OptLevel::O1),
            2 => Ok(OptLevel::O2),
            3 => Ok(OptLevel::O3),
            other => Err(other),
        }
    }
}

/// The unit of compilation: a module plus the metadata the pipeline needs.
///
/// Stages mutate the module in place.
#[derive(Debug, Clone)]
pub struct Script {
    module: Module,
    exports: Option<Arc<ExportTable>>,
    opt_level: OptLevel,
    compiler_version: u32,
    preferred_library: Option<String>,
}

impl Script {
    pub fn new(module: Module) -> Self {
        Self {
            module,
            exports: None,
            opt_level: OptLevel::default(),
            compiler_version: 0,
            preferred_library: None,
        }
    }

    pub fn with_exports(mut self, exports: ExportTable) -> Self {
        self.exports = Some(Arc::new(exports));
        self
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn export_table(&self) -> Option<&Arc<ExportTable>> {
        self.exports.as_ref()
    }

    pub fn set_export_table(&mut self, exports: Option<Arc<ExportTable>>) {
        self.exports = exports;
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    pub fn set_opt_level(&mut self, level: OptLevel) {
        self.opt_level = level;
    }

    pub fn compiler_version(&self) -> u32 {
        self.compiler_version
    }

    pub fn set_compiler_version(&mut self, version: u32) {
        self.compiler_version = version;
    }

    pub fn preferred_library(&self) -> Option<&str> {
        self.preferred_library.as_deref()
    }

    pub fn set_preferred_library(&mut self, library: Option<String>) {
        self.preferred_library = library;
    }

    /// Bring the module into a state the passes may rely on.
    pub fn materialize(&self) -> Result<(), CoreError> {
        self.module.verify()
    }
}
