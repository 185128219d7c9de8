//! WASM object emission for the reference backend.
//!
//! This module lowers a verified [`Module`] into a WebAssembly binary using
//! the `wasm-encoder` crate. Function and global names are resolved to
//! indices here; external symbols are exported under their own names.

use std::collections::HashMap;

use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, Instruction, MemArg, MemorySection, MemoryType,
    Module as WasmModule, TypeSection, ValType,
};

use crate::error::CoreError;
use crate::ir::{BinOp, Inst, Linkage, Module};

/// Export name of the linear memory, present when the module loads or stores.
pub const MEMORY_EXPORT: &str = "memory";

struct Indices<'m> {
    functions: HashMap<&'m str, u32>,
    globals: HashMap<&'m str, u32>,
}

/// Build a wasm module for the given IR module.
pub fn emit_module(module: &Module) -> Result<Vec<u8>, CoreError> {
    let indices = Indices {
        functions: module
            .functions
            .iter()
            .enumerate()
            .map(|(index, function)| (function.name.as_str(), index as u32))
            .collect(),
        globals: module
            .globals
            .iter()
            .enumerate()
            .map(|(index, global)| (global.name.as_str(), index as u32))
            .collect(),
    };
    let uses_memory = module.uses_memory();

    let mut wasm = WasmModule::new();

    // Type section: one entry per distinct (params, results) shape.
    let mut types = TypeSection::new();
    let mut signatures: HashMap<(u32, u32), u32> = HashMap::new();
    let mut functions = FunctionSection::new();
    for function in &module.functions {
        let shape = (function.params, function.results);
        let type_index = match signatures.get(&shape) {
            Some(index) => *index,
            None => {
                let index = types.len();
                types.ty().function(
                    vec![ValType::I32; function.params as usize],
                    vec![ValType::I32; function.results as usize],
                );
                signatures.insert(shape, index);
                index
            }
        };
        functions.function(type_index);
    }
    wasm.section(&types);
    wasm.section(&functions);

    if uses_memory {
        let mut memories = MemorySection::new();
        memories.memory(MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        wasm.section(&memories);
    }

    if !module.globals.is_empty() {
        let mut globals = GlobalSection::new();
        for global in &module.globals {
            globals.global(
                GlobalType {
                    val_type: ValType::I32,
                    mutable: true,
                    shared: false,
                },
                &ConstExpr::i32_const(global.init),
            );
        }
        wasm.section(&globals);
    }

    let mut exports = ExportSection::new();
    let mut exported: Vec<&str> = Vec::new();
    if uses_memory {
        exports.export(MEMORY_EXPORT, ExportKind::Memory, 0);
        exported.push(MEMORY_EXPORT);
    }
    for (index, global) in module.globals.iter().enumerate() {
        if global.linkage == Linkage::External {
            check_export_name(module, &exported, &global.name)?;
            exports.export(&global.name, ExportKind::Global, index as u32);
            exported.push(&global.name);
        }
    }
    for (index, function) in module.functions.iter().enumerate() {
        if function.linkage == Linkage::External {
            check_export_name(module, &exported, &function.name)?;
            exports.export(&function.name, ExportKind::Func, index as u32);
            exported.push(&function.name);
        }
    }
    wasm.section(&exports);

    let mut code = CodeSection::new();
    for function in &module.functions {
        let locals = if function.locals > 0 {
            vec![(function.locals, ValType::I32)]
        } else {
            Vec::new()
        };
        let mut body = Function::new(locals);
        for inst in &function.body {
            body.instruction(&lower_inst(module, &indices, inst)?);
        }
        body.instruction(&Instruction::End);
        code.function(&body);
    }
    wasm.section(&code);

    Ok(wasm.finish())
}

fn check_export_name(module: &Module, exported: &[&str], name: &str) -> Result<(), CoreError> {
    if exported.contains(&name) {
        return Err(CoreError::InvalidModule {
            module: module.id.clone(),
            message: format!("export name '{name}' is already taken"),
        });
    }
    Ok(())
}

fn lower_inst(
    module: &Module,
    indices: &Indices<'_>,
    inst: &Inst,
) -> Result<Instruction<'static>, CoreError> {
    let lowered = match inst {
        Inst::Const(value) => Instruction::I32Const(*value),
        Inst::LocalGet(index) => Instruction::LocalGet(*index),
        Inst::LocalSet(index) => Instruction::LocalSet(*index),
        Inst::LocalTee(index) => Instruction::LocalTee(*index),
        Inst::GlobalGet(name) => Instruction::GlobalGet(lookup(module, &indices.globals, name)?),
        Inst::GlobalSet(name) => Instruction::GlobalSet(lookup(module, &indices.globals, name)?),
        Inst::Load { offset } => Instruction::I32Load(mem_arg(*offset)),
        Inst::Store { offset } => Instruction::I32Store(mem_arg(*offset)),
        Inst::Binary(op) => lower_binary(*op),
        Inst::Eqz => Instruction::I32Eqz,
        Inst::Call(name) => Instruction::Call(lookup(module, &indices.functions, name)?),
        Inst::Block => Instruction::Block(BlockType::Empty),
        Inst::Loop => Instruction::Loop(BlockType::Empty),
        Inst::End => Instruction::End,
        Inst::Br(depth) => Instruction::Br(*depth),
        Inst::BrIf(depth) => Instruction::BrIf(*depth),
        Inst::Drop => Instruction::Drop,
        Inst::Return => Instruction::Return,
    };
    Ok(lowered)
}

fn lower_binary(op: BinOp) -> Instruction<'static> {
    match op {
        BinOp::Add => Instruction::I32Add,
        BinOp::Sub => Instruction::I32Sub,
        BinOp::Mul => Instruction::I32Mul,
        BinOp::DivS => Instruction::I32DivS,
        BinOp::RemS => Instruction::I32RemS,
        BinOp::And => Instruction::I32And,
        BinOp::Or => Instruction::I32Or,
        BinOp::Xor => Instruction::I32Xor,
        BinOp::Shl => Instruction::I32Shl,
        BinOp::ShrS => Instruction::I32ShrS,
        BinOp::Eq => Instruction::I32Eq,
        BinOp::Ne => Instruction::I32Ne,
        BinOp::LtS => Instruction::I32LtS,
        BinOp::LeS => Instruction::I32LeS,
        BinOp::GtS => Instruction::I32GtS,
        BinOp::GeS => Instruction::I32GeS,
    }
}

fn mem_arg(offset: u32) -> MemArg {
    MemArg {
        offset: u64::from(offset),
        align: 2,
        memory_index: 0,
    }
}

fn lookup(module: &Module, table: &HashMap<&str, u32>, name: &str) -> Result<u32, CoreError> {
    table
        .get(name)
        .copied()
        .ok_or_else(|| CoreError::InvalidModule {
            module: module.id.clone(),
            message: format!("reference to undefined symbol '@{name}'"),
        })
}
