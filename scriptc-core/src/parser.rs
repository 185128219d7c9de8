//! Parser for the textual script IR.
//!
//! A script is a flat list of directives and definitions; see
//! [`parse_script`]. The output of `Display for Module` parses back to an
//! equal module.

use crate::error::CoreError;
use crate::export::{ExportTable, ForeachKernel, ForeachSignature};
use crate::ir::{BinOp, Function, Global, Inst, Linkage, Module};
use crate::lexer::{Token, TokenKind, lex};
use crate::script::{OptLevel, Script};

const DEFAULT_MODULE_ID: &str = "script";

/// Parse a complete script. The returned script always carries an export
/// table, empty when the source has no `export` directives.
pub fn parse_script(source: &str) -> Result<Script, CoreError> {
    let tokens = lex(source)?;
    let mut position = 0;

    let mut module_id: Option<String> = None;
    let mut version = None;
    let mut opt_level = None;
    let mut library = None;
    let mut exports = ExportTable::new();
    let mut globals = Vec::new();
    let mut functions = Vec::new();

    while let Some(token) = tokens.get(position) {
        position += 1;
        match &token.kind {
            TokenKind::Module => {
                let id = expect_str(&tokens, &mut position)?;
                if module_id.replace(id).is_some() {
                    return Err(error_at(token, "duplicate 'module' directive"));
                }
            }
            TokenKind::Version => {
                let value = expect_int(&tokens, &mut position)?;
                let value = u32::try_from(value)
                    .map_err(|_| error_at(token, format!("version {value} is out of range")))?;
                version = Some(value);
            }
            TokenKind::Opt => {
                let value = expect_int(&tokens, &mut position)?;
                let level = u8::try_from(value)
                    .ok()
                    .and_then(|value| OptLevel::try_from(value).ok())
                    .ok_or_else(|| error_at(token, format!("unknown optimization level {value}")))?;
                opt_level = Some(level);
            }
            TokenKind::Library => library = Some(expect_str(&tokens, &mut position)?),
            TokenKind::Export => parse_export(&tokens, &mut position, &mut exports)?,
            TokenKind::Global => globals.push(parse_global(&tokens, &mut position, Linkage::External)?),
            TokenKind::Func => {
                functions.push(parse_function(&tokens, &mut position, Linkage::External)?)
            }
            TokenKind::Internal => {
                let next = expect_token(&tokens, &mut position)?;
                match next.kind {
                    TokenKind::Global => {
                        globals.push(parse_global(&tokens, &mut position, Linkage::Internal)?)
                    }
                    TokenKind::Func => {
                        functions.push(parse_function(&tokens, &mut position, Linkage::Internal)?)
                    }
                    _ => return Err(error_at(next, "expected 'global' or 'func' after 'internal'")),
                }
            }
            other => return Err(error_at(token, format!("unexpected {other:?} at top level"))),
        }
    }

    let mut module = Module::new(module_id.unwrap_or_else(|| DEFAULT_MODULE_ID.to_string()));
    module.globals = globals;
    module.functions = functions;

    let mut script = Script::new(module).with_exports(exports);
    if let Some(level) = opt_level {
        script.set_opt_level(level);
    }
    if let Some(version) = version {
        script.set_compiler_version(version);
    }
    script.set_preferred_library(library);
    Ok(script)
}

/// Parse only the module, ignoring script metadata.
pub fn parse_module(source: &str) -> Result<Module, CoreError> {
    parse_script(source).map(Script::into_module)
}

fn parse_export(
    tokens: &[Token],
    position: &mut usize,
    exports: &mut ExportTable,
) -> Result<(), CoreError> {
    let kind = expect_token(tokens, position)?;
    match kind.kind {
        TokenKind::Var => exports.add_var(expect_ident(tokens, position)?),
        TokenKind::Func => exports.add_func(expect_ident(tokens, position)?),
        TokenKind::Foreach => {
            let name = expect_ident(tokens, position)?;
            let bits = expect_int(tokens, position)?;
            let signature = u32::try_from(bits)
                .ok()
                .and_then(ForeachSignature::from_bits)
                .ok_or_else(|| {
                    error_at(kind, format!("invalid foreach signature {bits:#x} for '{name}'"))
                })?;
            exports.add_foreach(ForeachKernel::new(name, signature));
        }
        _ => return Err(error_at(kind, "expected 'var', 'func' or 'foreach' after 'export'")),
    }
    Ok(())
}

fn parse_global(
    tokens: &[Token],
    position: &mut usize,
    linkage: Linkage,
) -> Result<Global, CoreError> {
    let name = expect_symbol(tokens, position)?;
    expect_kind(tokens, position, &TokenKind::Equal, "'='")?;
    let init = expect_i32(tokens, position)?;
    let mut global = Global::new(name, init);
    global.linkage = linkage;
    Ok(global)
}

fn parse_function(
    tokens: &[Token],
    position: &mut usize,
    linkage: Linkage,
) -> Result<Function, CoreError> {
    let name = expect_symbol(tokens, position)?;
    expect_kind(tokens, position, &TokenKind::LParen, "'('")?;
    let params = expect_u32(tokens, position)?;
    expect_kind(tokens, position, &TokenKind::RParen, "')'")?;

    let mut results = 0;
    if peek_is(tokens, *position, &TokenKind::Arrow) {
        *position += 1;
        results = expect_u32(tokens, position)?;
    }
    let mut locals = 0;
    if peek_is(tokens, *position, &TokenKind::Locals) {
        *position += 1;
        locals = expect_u32(tokens, position)?;
    }

    expect_kind(tokens, position, &TokenKind::LBrace, "'{'")?;
    let mut body = Vec::new();
    loop {
        let token = expect_token(tokens, position)?;
        match &token.kind {
            TokenKind::RBrace => break,
            TokenKind::Ident(mnemonic) => body.push(parse_inst(tokens, position, token, mnemonic)?),
            other => {
                return Err(error_at(
                    token,
                    format!("expected an instruction in '@{name}', found {other:?}"),
                ));
            }
        }
    }

    let mut function = Function::new(name, params, results, body).with_locals(locals);
    function.linkage = linkage;
    Ok(function)
}

fn parse_inst(
    tokens: &[Token],
    position: &mut usize,
    token: &Token,
    mnemonic: &str,
) -> Result<Inst, CoreError> {
    if let Some(op) = BinOp::from_mnemonic(mnemonic) {
        return Ok(Inst::Binary(op));
    }
    let inst = match mnemonic {
        "i32.const" => Inst::Const(expect_i32(tokens, position)?),
        "local.get" => Inst::LocalGet(expect_u32(tokens, position)?),
        "local.set" => Inst::LocalSet(expect_u32(tokens, position)?),
        "local.tee" => Inst::LocalTee(expect_u32(tokens, position)?),
        "global.get" => Inst::GlobalGet(expect_symbol(tokens, position)?),
        "global.set" => Inst::GlobalSet(expect_symbol(tokens, position)?),
        "i32.load" => Inst::Load {
            offset: optional_offset(tokens, position)?,
        },
        "i32.store" => Inst::Store {
            offset: optional_offset(tokens, position)?,
        },
        "i32.eqz" => Inst::Eqz,
        "call" => Inst::Call(expect_symbol(tokens, position)?),
        "block" => Inst::Block,
        "loop" => Inst::Loop,
        "end" => Inst::End,
        "br" => Inst::Br(expect_u32(tokens, position)?),
        "br_if" => Inst::BrIf(expect_u32(tokens, position)?),
        "drop" => Inst::Drop,
        "return" => Inst::Return,
        other => return Err(error_at(token, format!("unknown instruction '{other}'"))),
    };
    Ok(inst)
}

fn optional_offset(tokens: &[Token], position: &mut usize) -> Result<u32, CoreError> {
    match tokens.get(*position).map(|token| &token.kind) {
        Some(TokenKind::Int(_)) => expect_u32(tokens, position),
        _ => Ok(0),
    }
}

fn peek_is(tokens: &[Token], position: usize, kind: &TokenKind) -> bool {
    tokens.get(position).is_some_and(|token| &token.kind == kind)
}

fn expect_token<'t>(tokens: &'t [Token], position: &mut usize) -> Result<&'t Token, CoreError> {
    let token = tokens
        .get(*position)
        .ok_or_else(|| CoreError::ParseError("unexpected end of input".to_string()))?;
    *position += 1;
    Ok(token)
}

fn expect_kind(
    tokens: &[Token],
    position: &mut usize,
    kind: &TokenKind,
    what: &str,
) -> Result<(), CoreError> {
    let token = expect_token(tokens, position)?;
    if &token.kind == kind {
        Ok(())
    } else {
        Err(error_at(token, format!("expected {what}, found {:?}", token.kind)))
    }
}

fn expect_str(tokens: &[Token], position: &mut usize) -> Result<String, CoreError> {
    let token = expect_token(tokens, position)?;
    match &token.kind {
        TokenKind::Str(text) => Ok(text.clone()),
        other => Err(error_at(token, format!("expected a string, found {other:?}"))),
    }
}

fn expect_ident(tokens: &[Token], position: &mut usize) -> Result<String, CoreError> {
    let token = expect_token(tokens, position)?;
    match &token.kind {
        TokenKind::Ident(name) | TokenKind::Symbol(name) => Ok(name.clone()),
        other => Err(error_at(token, format!("expected a name, found {other:?}"))),
    }
}

fn expect_symbol(tokens: &[Token], position: &mut usize) -> Result<String, CoreError> {
    let token = expect_token(tokens, position)?;
    match &token.kind {
        TokenKind::Symbol(name) => Ok(name.clone()),
        other => Err(error_at(token, format!("expected '@name', found {other:?}"))),
    }
}

fn expect_int(tokens: &[Token], position: &mut usize) -> Result<i64, CoreError> {
    let token = expect_token(tokens, position)?;
    match token.kind {
        TokenKind::Int(value) => Ok(value),
        ref other => Err(error_at(token, format!("expected an integer, found {other:?}"))),
    }
}

fn expect_i32(tokens: &[Token], position: &mut usize) -> Result<i32, CoreError> {
    let start = *position;
    let value = expect_int(tokens, position)?;
    // Accept the full u32 range so bit patterns can be written unsigned.
    if let Ok(value) = i32::try_from(value) {
        return Ok(value);
    }
    u32::try_from(value)
        .map(|bits| bits as i32)
        .map_err(|_| error_at(&tokens[start], format!("{value} does not fit in i32")))
}

fn expect_u32(tokens: &[Token], position: &mut usize) -> Result<u32, CoreError> {
    let start = *position;
    let value = expect_int(tokens, position)?;
    u32::try_from(value)
        .map_err(|_| error_at(&tokens[start], format!("expected a non-negative index, found {value}")))
}

fn error_at(token: &Token, message: impl AsRef<str>) -> CoreError {
    CoreError::ParseError(format!("at byte {}: {}", token.position, message.as_ref()))
}
