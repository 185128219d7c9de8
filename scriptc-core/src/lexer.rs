//! Lexer for the textual script IR.
//!
//! The lexer only recognizes directive keywords, names, symbols and
//! literals. Instruction mnemonics are plain identifiers; the parser gives
//! them meaning.

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Identifiers and literals
    Ident(String),
    /// `@name`, a reference to a function or global.
    Symbol(String),
    Int(i64),
    Str(String),

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Equal,
    Arrow, // ->

    // Keywords
    Module,
    Version,
    Opt,
    Library,
    Export,
    Var,
    Func,
    Foreach,
    Internal,
    Global,
    Locals,
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub fn lex(source: &str) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        bytes: source.as_bytes(),
        source,
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.index += 1;
                continue;
            }
            if ch == b';' {
                self.skip_comment();
                continue;
            }

            let start = self.index;
            let kind = match ch {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'=' => self.single(TokenKind::Equal),
                b'-' if self.peek_at(1) == Some(b'>') => {
                    self.index += 2;
                    TokenKind::Arrow
                }
                b'-' | b'0'..=b'9' => self.int()?,
                b'"' => self.string()?,
                b'@' => {
                    self.index += 1;
                    let name = self.name();
                    if name.is_empty() {
                        return Err(self.error(start, "expected a symbol name after '@'"));
                    }
                    TokenKind::Symbol(name.to_string())
                }
                ch if is_name_start(ch) => keyword_or_ident(self.name()),
                other => {
                    return Err(self.error(
                        start,
                        format!("unexpected character '{}'", char::from(other)),
                    ));
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }

        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.index += 1;
        kind
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            self.index += 1;
            if ch == b'\n' {
                break;
            }
        }
    }

    fn name(&mut self) -> &'src str {
        let start = self.index;
        while self.peek().is_some_and(is_name_char) {
            self.index += 1;
        }
        &self.source[start..self.index]
    }

    fn int(&mut self) -> Result<TokenKind, CoreError> {
        let start = self.index;
        let negative = self.peek() == Some(b'-');
        if negative {
            self.index += 1;
        }
        let hex = self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X'));
        if hex {
            self.index += 2;
        }
        let digits_start = self.index;
        while self.peek().is_some_and(|ch| ch.is_ascii_hexdigit()) {
            self.index += 1;
        }
        let digits = &self.source[digits_start..self.index];
        if digits.is_empty() {
            return Err(self.error(start, "expected digits"));
        }
        let radix = if hex { 16 } else { 10 };
        let magnitude = i64::from_str_radix(digits, radix)
            .map_err(|err| self.error(start, format!("invalid integer literal: {err}")))?;
        Ok(TokenKind::Int(if negative { -magnitude } else { magnitude }))
    }

    fn string(&mut self) -> Result<TokenKind, CoreError> {
        let start = self.index;
        self.index += 1;
        let content_start = self.index;
        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(b'\n') | None => return Err(self.error(start, "unterminated string literal")),
                Some(_) => self.index += 1,
            }
        }
        let text = self.source[content_start..self.index].to_string();
        self.index += 1;
        Ok(TokenKind::Str(text))
    }

    fn error(&self, position: usize, message: impl Into<String>) -> CoreError {
        CoreError::LexError {
            position,
            message: message.into(),
        }
    }
}

fn is_name_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'.'
}

fn is_name_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'.' | b'$')
}

fn keyword_or_ident(text: &str) -> TokenKind {
    match text {
        "module" => TokenKind::Module,
        "version" => TokenKind::Version,
        "opt" => TokenKind::Opt,
        "library" => TokenKind::Library,
        "export" => TokenKind::Export,
        "var" => TokenKind::Var,
        "func" => TokenKind::Func,
        "foreach" => TokenKind::Foreach,
        "internal" => TokenKind::Internal,
        "global" => TokenKind::Global,
        "locals" => TokenKind::Locals,
        _ => TokenKind::Ident(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_function_header() {
        assert_eq!(
            kinds("internal func @blur.expand(6) -> 1 {"),
            vec![
                TokenKind::Internal,
                TokenKind::Func,
                TokenKind::Symbol("blur.expand".into()),
                TokenKind::LParen,
                TokenKind::Int(6),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Int(1),
                TokenKind::LBrace,
            ]
        );
    }

    #[test]
    fn mnemonics_and_dotted_names_are_identifiers() {
        assert_eq!(
            kinds("i32.const -7 br_if 0 export func .rs.dtor"),
            vec![
                TokenKind::Ident("i32.const".into()),
                TokenKind::Int(-7),
                TokenKind::Ident("br_if".into()),
                TokenKind::Int(0),
                TokenKind::Export,
                TokenKind::Func,
                TokenKind::Ident(".rs.dtor".into()),
            ]
        );
    }

    #[test]
    fn skips_comments_and_reads_hex() {
        assert_eq!(
            kinds("; header\nexport foreach blur 0x0b ; trailing\n"),
            vec![
                TokenKind::Export,
                TokenKind::Foreach,
                TokenKind::Ident("blur".into()),
                TokenKind::Int(0x0b),
            ]
        );
    }

    #[test]
    fn records_byte_positions() {
        let tokens = lex("module \"m\"").expect("lex");
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 7);
        assert_eq!(tokens[1].kind, TokenKind::Str("m".into()));
    }

    #[test]
    fn rejects_unterminated_string_and_stray_characters() {
        assert!(matches!(
            lex("module \"open"),
            Err(CoreError::LexError { position: 7, .. })
        ));
        assert!(matches!(
            lex("func # x"),
            Err(CoreError::LexError { position: 5, .. })
        ));
        assert!(matches!(lex("@ "), Err(CoreError::LexError { .. })));
    }
}
