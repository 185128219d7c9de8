//! Target descriptions and the backend handle ([`TargetMachine`]).
//!
//! The reference backend knows two architectures: `wasm32`, which emits
//! WebAssembly objects and needs foreach kernels expanded into dispatch
//! wrappers, and `usc`, a device target that dispatches kernels natively
//! and only produces assembly listings.

use std::fmt;

use tracing::{debug, info, warn};

use crate::codegen::{EmitAssemblyPass, EmitObjectPass, FileType};
use crate::error::{CompileResult, ErrorCode};
use crate::pass::PassManager;
use crate::script::OptLevel;
use crate::transforms::{ConstantFoldPass, GlobalDcePass};

/// Architecture prefix of targets that launch foreach kernels themselves.
pub const NATIVE_FOREACH_ARCH: &str = "usc";

/// Whether a triple names a target that dispatches foreach kernels natively.
pub fn dispatches_foreach_natively(triple: &str) -> bool {
    triple.starts_with(NATIVE_FOREACH_ARCH)
}

#[derive(Debug)]
pub struct TargetInfo {
    pub arch: &'static str,
    pub cpus: &'static [&'static str],
    pub features: &'static [&'static str],
    pub file_types: &'static [FileType],
}

pub const TARGETS: &[TargetInfo] = &[
    TargetInfo {
        arch: "wasm32",
        cpus: &["generic", "mvp"],
        features: &["simd128", "bulk-memory"],
        file_types: &[FileType::Object, FileType::Assembly],
    },
    TargetInfo {
        arch: "usc",
        cpus: &["generic", "sgx544"],
        features: &[],
        file_types: &[FileType::Assembly],
    },
];

pub fn lookup_target(arch: &str) -> Option<&'static TargetInfo> {
    TARGETS.iter().find(|target| target.arch == arch)
}

/// `arch-vendor-os[-env]`; missing components read as `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    raw: String,
    arch: String,
    vendor: String,
    os: String,
    env: Option<String>,
}

impl Triple {
    pub fn parse(text: &str) -> Option<Triple> {
        let text = text.trim();
        let mut parts = text.split('-');
        let arch = parts.next().filter(|arch| !arch.is_empty())?;
        let vendor = parts.next().unwrap_or("unknown");
        let os = parts.next().unwrap_or("unknown");
        let env = parts.next().map(str::to_string);
        if parts.next().is_some() {
            return None;
        }
        Some(Triple {
            raw: text.to_string(),
            arch: arch.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            env,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Everything needed to create a [`TargetMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompilerConfig {
    triple: String,
    cpu: Option<String>,
    features: Vec<String>,
    opt_level: OptLevel,
    file_type: FileType,
}

impl CompilerConfig {
    pub fn new(triple: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            cpu: None,
            features: Vec::new(),
            opt_level: OptLevel::default(),
            file_type: FileType::default(),
        }
    }

    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = Some(cpu.into());
        self
    }

    /// Add a `+name` or `-name` feature toggle.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    pub fn triple(&self) -> &str {
        &self.triple
    }

    pub fn cpu(&self) -> Option<&str> {
        self.cpu.as_deref()
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

/// A configured target: triple, CPU, features and code-generation options.
///
/// Owned exclusively by one [`crate::Compiler`] and rebuilt on every
/// successful reconfiguration.
#[derive(Debug)]
pub struct TargetMachine {
    triple: Triple,
    cpu: String,
    features: Vec<String>,
    opt_level: OptLevel,
    file_type: FileType,
    native_foreach: bool,
    info: &'static TargetInfo,
}

impl TargetMachine {
    pub fn create(config: &CompilerConfig) -> CompileResult<TargetMachine> {
        if config.triple().trim().is_empty() {
            return Err(ErrorCode::InvalidConfigNoTarget);
        }
        let triple = Triple::parse(config.triple()).ok_or_else(|| {
            warn!(triple = config.triple(), "malformed target triple");
            ErrorCode::ErrCreateTargetMachine
        })?;
        let info = lookup_target(triple.arch()).ok_or_else(|| {
            warn!(arch = triple.arch(), "no registered target for architecture");
            ErrorCode::ErrCreateTargetMachine
        })?;

        let cpu = config.cpu().unwrap_or("generic");
        if !info.cpus.contains(&cpu) {
            warn!(arch = info.arch, cpu, "unknown CPU for target");
            return Err(ErrorCode::ErrCreateTargetMachine);
        }
        for feature in config.features() {
            let known = feature
                .strip_prefix('+')
                .or_else(|| feature.strip_prefix('-'))
                .is_some_and(|name| info.features.contains(&name));
            if !known {
                warn!(arch = info.arch, feature = %feature, "unsupported target feature");
                return Err(ErrorCode::ErrCreateTargetMachine);
            }
        }

        let native_foreach = dispatches_foreach_natively(triple.as_str());
        info!(
            triple = %triple,
            cpu,
            opt = config.opt_level() as u8,
            native_foreach,
            "created target machine"
        );
        Ok(TargetMachine {
            triple,
            cpu: cpu.to_string(),
            features: config.features().to_vec(),
            opt_level: config.opt_level(),
            file_type: config.file_type(),
            native_foreach,
            info,
        })
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Evaluated once when the machine is created.
    pub fn dispatches_foreach_natively(&self) -> bool {
        self.native_foreach
    }

    /// Append the standard whole-program optimization sequence.
    pub fn add_lto_passes(&self, passes: &mut PassManager) {
        passes.add(ConstantFoldPass);
        passes.add(GlobalDcePass);
    }

    /// Append the code-generation sequence that ends in the emitter for the
    /// configured file type.
    pub fn add_passes_to_emit_file(&self, passes: &mut PassManager) -> CompileResult {
        if !self.info.file_types.contains(&self.file_type) {
            warn!(
                triple = %self.triple,
                file_type = ?self.file_type,
                "target cannot emit the requested file type"
            );
            return Err(ErrorCode::ErrPrepareCodeGenPass);
        }
        if self.opt_level >= OptLevel::O1 {
            passes.add(ConstantFoldPass);
        }
        match self.file_type {
            FileType::Object => passes.add(EmitObjectPass),
            FileType::Assembly => {
                passes.add(EmitAssemblyPass::new(self.triple.as_str(), self.opt_level))
            }
        }
        debug!(passes = ?passes.pass_names(), "code-generation passes added");
        Ok(())
    }
}
