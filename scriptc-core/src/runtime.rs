use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::ir::Module;
use crate::parser::parse_module;
use crate::script::Script;

/// Library linked when a script names no preference.
pub const DEFAULT_RUNTIME_LIBRARY: &str = "clcore";

pub const RUNTIME_EXTENSION: &str = "rsir";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLibrary {
    /// File stem, e.g. `clcore` for `clcore.rsir`.
    pub name: String,
    /// Path relative to the runtime root.
    pub path: PathBuf,
    pub module: Module,
}

pub fn default_runtime_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../runtime")
}

/// Parse every `*.rsir` file below `root`, ordered by file name.
pub fn load_runtime_libraries(root: impl AsRef<Path>) -> Result<Vec<RuntimeLibrary>, CoreError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(CoreError::MissingRuntime(root.to_path_buf()));
    }
    let mut libraries = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !path.is_file() || !path.extension().is_some_and(|ext| ext == RUNTIME_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let source = fs::read_to_string(path)?;
        let module = parse_module(&source)?;
        debug!(library = name, functions = module.functions.len(), "loaded runtime library");
        libraries.push(RuntimeLibrary {
            name: name.to_string(),
            path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
            module,
        });
    }
    Ok(libraries)
}

pub fn select_library<'l>(
    libraries: &'l [RuntimeLibrary],
    preferred: Option<&str>,
) -> Result<&'l RuntimeLibrary, CoreError> {
    let name = preferred.unwrap_or(DEFAULT_RUNTIME_LIBRARY);
    libraries
        .iter()
        .find(|library| library.name == name)
        .ok_or_else(|| CoreError::UnknownRuntimeLibrary(name.to_string()))
}

/// Copy library definitions the script does not define itself.
///
/// Script definitions win over library ones. Returns the number of symbols
/// added to the script's module.
pub fn link_runtime(script: &mut Script, library: &RuntimeLibrary) -> usize {
    let module = script.module_mut();
    let mut linked = 0;
    for global in &library.module.globals {
        if !module.defines(&global.name) {
            module.globals.push(global.clone());
            linked += 1;
        }
    }
    for function in &library.module.functions {
        if !module.defines(&function.name) {
            module.functions.push(function.clone());
            linked += 1;
        }
    }
    info!(library = %library.name, module = %module.id, linked, "linked runtime library");
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Inst, Linkage};

    #[test]
    fn loads_libraries_from_default_root() {
        let libraries = load_runtime_libraries(default_runtime_root()).expect("runtime should load");
        let core = select_library(&libraries, None).expect("default library");
        assert_eq!(core.name, DEFAULT_RUNTIME_LIBRARY);
        assert!(core.module.function("rs_clamp").is_some());
        assert!(core.module.verify().is_ok());
        assert!(select_library(&libraries, Some("clcore_debug")).is_ok());
    }

    #[test]
    fn missing_root_and_unknown_library_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load_runtime_libraries(dir.path().join("absent")),
            Err(CoreError::MissingRuntime(_))
        ));

        let libraries = load_runtime_libraries(dir.path()).expect("empty root");
        assert!(libraries.is_empty());
        assert!(matches!(
            select_library(&libraries, Some("libm")),
            Err(CoreError::UnknownRuntimeLibrary(name)) if name == "libm"
        ));
    }

    #[test]
    fn ignores_other_files_and_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("notes.txt"), "not ir").expect("write");
        fs::create_dir(dir.path().join("extra")).expect("mkdir");
        fs::write(
            dir.path().join("extra").join("small.rsir"),
            "internal func @one(0) -> 1 { i32.const 1 }",
        )
        .expect("write");
        let libraries = load_runtime_libraries(dir.path()).expect("load");
        assert_eq!(libraries.len(), 1);
        assert_eq!(libraries[0].name, "small");
        assert_eq!(libraries[0].path, Path::new("extra").join("small.rsir"));

        fs::write(dir.path().join("bad.rsir"), "func @broken(").expect("write");
        assert!(matches!(
            load_runtime_libraries(dir.path()),
            Err(CoreError::ParseError(_))
        ));
    }

    #[test]
    fn script_definitions_win_when_linking() {
        let libraries = load_runtime_libraries(default_runtime_root()).expect("runtime");
        let library = select_library(&libraries, None).expect("clcore");

        let mut module = Module::new("user");
        module
            .functions
            .push(Function::new("rs_abs", 1, 1, vec![Inst::LocalGet(0)]));
        let mut script = Script::new(module);

        let linked = link_runtime(&mut script, library);
        assert_eq!(linked, library.module.functions.len() - 1);
        let abs = script.module().function("rs_abs").expect("rs_abs");
        assert_eq!(abs.body, [Inst::LocalGet(0)]);
        assert_eq!(abs.linkage, Linkage::External);
        assert_eq!(
            script.module().function("rs_min").map(|f| f.linkage),
            Some(Linkage::Internal)
        );
        assert_eq!(link_runtime(&mut script, library), 0);
    }
}
