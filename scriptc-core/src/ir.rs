//! Intermediate representation consumed by the pipeline.
//!
//! A [`Module`] is a flat list of `i32` globals and functions whose bodies
//! are structured stack-machine instructions. Symbols are referenced by
//! name; numeric indices only appear during code generation. The textual
//! form produced by `Display` is the same format the reader accepts.

use std::collections::HashSet;
use std::fmt;

use crate::error::CoreError;

/// Symbol visibility. Internalization downgrades `External` to `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    External,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    DivS,
    RemS,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    Eq,
    Ne,
    LtS,
    LeS,
    GtS,
    GeS,
}

impl BinOp {
    pub const ALL: [BinOp; 16] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::DivS,
        BinOp::RemS,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Shl,
        BinOp::ShrS,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::LtS,
        BinOp::LeS,
        BinOp::GtS,
        BinOp::GeS,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "i32.add",
            BinOp::Sub => "i32.sub",
            BinOp::Mul => "i32.mul",
            BinOp::DivS => "i32.div_s",
            BinOp::RemS => "i32.rem_s",
            BinOp::And => "i32.and",
            BinOp::Or => "i32.or",
            BinOp::Xor => "i32.xor",
            BinOp::Shl => "i32.shl",
            BinOp::ShrS => "i32.shr_s",
            BinOp::Eq => "i32.eq",
            BinOp::Ne => "i32.ne",
            BinOp::LtS => "i32.lt_s",
            BinOp::LeS => "i32.le_s",
            BinOp::GtS => "i32.gt_s",
            BinOp::GeS => "i32.ge_s",
        }
    }

    pub fn from_mnemonic(text: &str) -> Option<BinOp> {
        BinOp::ALL.into_iter().find(|op| op.mnemonic() == text)
    }

    /// Evaluate the operator with WebAssembly semantics.
    ///
    /// Returns `None` when the operation would trap at run time, so callers
    /// never fold away a trap.
    pub fn fold(self, left: i32, right: i32) -> Option<i32> {
        let value = match self {
            BinOp::Add => left.wrapping_add(right),
            BinOp::Sub => left.wrapping_sub(right),
            BinOp::Mul => left.wrapping_mul(right),
            BinOp::DivS => left.checked_div(right)?,
            BinOp::RemS => {
                if right == 0 {
                    return None;
                }
                left.wrapping_rem(right)
            }
            BinOp::And => left & right,
            BinOp::Or => left | right,
            BinOp::Xor => left ^ right,
            BinOp::Shl => left.wrapping_shl(right as u32),
            BinOp::ShrS => left.wrapping_shr(right as u32),
            BinOp::Eq => bool_to_i32(left == right),
            BinOp::Ne => bool_to_i32(left != right),
            BinOp::LtS => bool_to_i32(left < right),
            BinOp::LeS => bool_to_i32(left <= right),
            BinOp::GtS => bool_to_i32(left > right),
            BinOp::GeS => bool_to_i32(left >= right),
        };
        Some(value)
    }
}

fn bool_to_i32(value: bool) -> i32 {
    if value { 1 } else { 0 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    Const(i32),
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(String),
    GlobalSet(String),
    Load { offset: u32 },
    Store { offset: u32 },
    Binary(BinOp),
    Eqz,
    Call(String),
    Block,
    Loop,
    End,
    Br(u32),
    BrIf(u32),
    Drop,
    Return,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Const(value) => write!(f, "i32.const {value}"),
            Inst::LocalGet(index) => write!(f, "local.get {index}"),
            Inst::LocalSet(index) => write!(f, "local.set {index}"),
            Inst::LocalTee(index) => write!(f, "local.tee {index}"),
            Inst::GlobalGet(name) => write!(f, "global.get @{name}"),
            Inst::GlobalSet(name) => write!(f, "global.set @{name}"),
            Inst::Load { offset } => write!(f, "i32.load {offset}"),
            Inst::Store { offset } => write!(f, "i32.store {offset}"),
            Inst::Binary(op) => f.write_str(op.mnemonic()),
            Inst::Eqz => f.write_str("i32.eqz"),
            Inst::Call(name) => write!(f, "call @{name}"),
            Inst::Block => f.write_str("block"),
            Inst::Loop => f.write_str("loop"),
            Inst::End => f.write_str("end"),
            Inst::Br(depth) => write!(f, "br {depth}"),
            Inst::BrIf(depth) => write!(f, "br_if {depth}"),
            Inst::Drop => f.write_str("drop"),
            Inst::Return => f.write_str("return"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
    pub linkage: Linkage,
    pub init: i32,
}

impl Global {
    pub fn new(name: impl Into<String>, init: i32) -> Self {
        Self {
            name: name.into(),
            linkage: Linkage::External,
            init,
        }
    }

    pub fn internal(mut self) -> Self {
        self.linkage = Linkage::Internal;
        self
    }
}

/// A function over `i32` values.
///
/// `body` holds the instructions without the implicit trailing `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    pub params: u32,
    pub results: u32,
    pub locals: u32,
    pub body: Vec<Inst>,
}

impl Function {
    pub fn new(name: impl Into<String>, params: u32, results: u32, body: Vec<Inst>) -> Self {
        Self {
            name: name.into(),
            linkage: Linkage::External,
            params,
            results,
            locals: 0,
            body,
        }
    }

    pub fn with_locals(mut self, locals: u32) -> Self {
        self.locals = locals;
        self
    }

    pub fn internal(mut self) -> Self {
        self.linkage = Linkage::Internal;
        self
    }

    /// Names of the functions and globals this body refers to.
    pub fn referenced_symbols(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|inst| match inst {
            Inst::Call(name) | Inst::GlobalGet(name) | Inst::GlobalSet(name) => {
                Some(name.as_str())
            }
            _ => None,
        })
    }

    pub fn uses_memory(&self) -> bool {
        self.body
            .iter()
            .any(|inst| matches!(inst, Inst::Load { .. } | Inst::Store { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Module {
    pub id: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|function| function.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|global| global.name == name)
    }

    pub fn defines(&self, name: &str) -> bool {
        self.function(name).is_some() || self.global(name).is_some()
    }

    pub fn uses_memory(&self) -> bool {
        self.functions.iter().any(Function::uses_memory)
    }

    /// Names of all externally visible symbols, globals first.
    pub fn external_symbols(&self) -> Vec<&str> {
        self.globals
            .iter()
            .filter(|global| global.linkage == Linkage::External)
            .map(|global| global.name.as_str())
            .chain(
                self.functions
                    .iter()
                    .filter(|function| function.linkage == Linkage::External)
                    .map(|function| function.name.as_str()),
            )
            .collect()
    }

    /// Structural verification performed before any pass sees the module.
    pub fn verify(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        let names = self
            .globals
            .iter()
            .map(|global| global.name.as_str())
            .chain(self.functions.iter().map(|function| function.name.as_str()));
        for name in names {
            if !seen.insert(name) {
                return Err(self.invalid(format!("symbol '@{name}' is defined more than once")));
            }
        }
        for function in &self.functions {
            self.verify_function(function)?;
        }
        Ok(())
    }

    fn verify_function(&self, function: &Function) -> Result<(), CoreError> {
        let name = &function.name;
        if function.results > 1 {
            return Err(self.invalid(format!("function '@{name}' returns more than one value")));
        }
        let local_count = function.params + function.locals;
        let mut depth: u32 = 0;
        for inst in &function.body {
            match inst {
                Inst::LocalGet(index) | Inst::LocalSet(index) | Inst::LocalTee(index)
                    if *index >= local_count =>
                {
                    return Err(self.invalid(format!(
                        "function '@{name}' uses local {index} but declares only {local_count}"
                    )));
                }
                Inst::GlobalGet(target) | Inst::GlobalSet(target) if self.global(target).is_none() => {
                    return Err(self.invalid(format!(
                        "function '@{name}' refers to undefined global '@{target}'"
                    )));
                }
                Inst::Call(target) if self.function(target).is_none() => {
                    return Err(self.invalid(format!(
                        "function '@{name}' calls undefined function '@{target}'"
                    )));
                }
                Inst::Block | Inst::Loop => depth += 1,
                Inst::End => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        self.invalid(format!("function '@{name}' has an unmatched 'end'"))
                    })?;
                }
                Inst::Br(target) | Inst::BrIf(target) if *target > depth => {
                    return Err(self.invalid(format!(
                        "function '@{name}' branches to depth {target} outside its blocks"
                    )));
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(self.invalid(format!("function '@{name}' has {depth} unclosed block(s)")));
        }
        Ok(())
    }

    fn invalid(&self, message: String) -> CoreError {
        CoreError::InvalidModule {
            module: self.id.clone(),
            message,
        }
    }
}

fn linkage_prefix(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::External => "",
        Linkage::Internal => "internal ",
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}global @{} = {}",
            linkage_prefix(self.linkage),
            self.name,
            self.init
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}func @{}({})",
            linkage_prefix(self.linkage),
            self.name,
            self.params
        )?;
        if self.results > 0 {
            write!(f, " -> {}", self.results)?;
        }
        if self.locals > 0 {
            write!(f, " locals {}", self.locals)?;
        }
        writeln!(f, " {{")?;
        let mut depth = 1usize;
        for inst in &self.body {
            if matches!(inst, Inst::End) {
                depth = depth.saturating_sub(1).max(1);
            }
            writeln!(f, "{:indent$}{inst}", "", indent = depth * 2)?;
            if matches!(inst, Inst::Block | Inst::Loop) {
                depth += 1;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module \"{}\"", self.id)?;
        for global in &self.globals {
            writeln!(f, "{global}")?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
