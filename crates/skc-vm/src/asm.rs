//! Assembler for the processor's instruction set.
//!
//! ```text
//! #name x i1          // alias register i1 as `x`
//! push 0
//! pop x
//! #here loop          // location for jumps
//! push x
//! push 1
//! add
//! pop x
//! push x
//! push 8
//! jl loop             // jump back while x < 8
//! hlt
//! ```
//!
//! Numbers may be decimal, `0x` hex or `0b` binary, with an optional leading `-`. Anything up to
//! `u32::MAX` is accepted and stored as its 32-bit two's complement pattern. Jumps may refer to
//! locations defined later in the source.

use std::collections::HashMap;

use thiserror::Error;

use crate::cpu::{Instruction, REGISTER_COUNT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("unexpected symbol at {at}")]
    UnexpectedSymbol { at: usize },

    #[error("unexpected {found} at {at}, expected {expected}")]
    UnexpectedToken {
        at: usize,
        found: String,
        expected: &'static str,
    },

    #[error("number {text:?} at {at} does not fit in 32 bits")]
    NumberOutOfRange { at: usize, text: String },

    #[error("register {text:?} at {at} is out of range (max i{})", REGISTER_COUNT - 1)]
    RegisterOutOfRange { at: usize, text: String },

    #[error("undefined name {name:?} at {at}")]
    UndefinedName { at: usize, name: String },

    #[error("undefined location {name:?} at {at}")]
    UndefinedLocation { at: usize, name: String },

    #[error("location {name:?} at {at} is already defined")]
    DuplicateLocation { at: usize, name: String },

    #[error("jump at {at} to {name:?} is out of range ({offset} bytes)")]
    JumpOutOfRange { at: usize, name: String, offset: i64 },
}

/// Maps one emitted instruction back to the statement that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// Byte offset of the instruction in the program.
    pub offset: u32,
    /// Encoded width of the instruction.
    pub width: u32,
    /// Byte offset of the statement in the source text.
    pub at: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub bytes: Vec<u8>,
    pub map: Vec<SourceSpan>,
}

pub fn assemble(source: &str) -> Result<Program, AsmError> {
    let tokens = tokenize(source)?;
    let nodes = Parser { tokens, pos: 0 }.parse()?;
    emit(&nodes)
}

/// Decode `bytes` from address 0 into `(address, instruction)` pairs.
pub fn disassemble(bytes: &[u8]) -> Vec<(u32, Instruction)> {
    let mut out = Vec::new();
    let mut at = 0usize;
    while at < bytes.len() {
        let inst = Instruction::decode(&bytes[at..]);
        out.push((at as u32, inst));
        at += inst.width() as usize;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Push,
    Pop,
    Add,
    Mul,
    Jl,
    Hlt,
    Read,
    Write,
}

impl Keyword {
    fn parse(ident: &str) -> Option<Self> {
        Some(match ident {
            "push" => Keyword::Push,
            "pop" => Keyword::Pop,
            "add" => Keyword::Add,
            "mul" => Keyword::Mul,
            "jl" => Keyword::Jl,
            "hlt" => Keyword::Hlt,
            "read" => Keyword::Read,
            "write" => Keyword::Write,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tok<'a> {
    Number(i32),
    Register(u8),
    Name(&'a str),
    Keyword(Keyword),
    DirectiveName,
    DirectiveHere,
    Eof,
}

impl Tok<'_> {
    fn describe(&self) -> String {
        match self {
            Tok::Number(n) => format!("number {n}"),
            Tok::Register(r) => format!("register i{r}"),
            Tok::Name(name) => format!("name {name:?}"),
            Tok::Keyword(kw) => format!("keyword {kw:?}"),
            Tok::DirectiveName => "#name".to_string(),
            Tok::DirectiveHere => "#here".to_string(),
            Tok::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    tok: Tok<'a>,
    at: usize,
    len: usize,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, AsmError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(b"//") {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let tok = if c == b'#' {
            i += 1;
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            match &source[start..i] {
                "#name" => Tok::DirectiveName,
                "#here" => Tok::DirectiveHere,
                _ => return Err(AsmError::UnexpectedSymbol { at: start }),
            }
        } else if c.is_ascii_digit() || c == b'-' {
            let (value, end) = lex_number(source, start)?;
            i = end;
            Tok::Number(value)
        } else if is_ident_start(c) {
            while i < bytes.len() && is_ident_continue(bytes[i]) {
                i += 1;
            }
            classify_ident(&source[start..i], start)?
        } else {
            return Err(AsmError::UnexpectedSymbol { at: start });
        };

        tokens.push(Token {
            tok,
            at: start,
            len: i - start,
        });
    }

    tokens.push(Token {
        tok: Tok::Eof,
        at: bytes.len(),
        len: 0,
    });
    Ok(tokens)
}

fn lex_number(source: &str, start: usize) -> Result<(i32, usize), AsmError> {
    let bytes = source.as_bytes();
    let mut i = start;
    let negative = bytes[i] == b'-';
    if negative {
        i += 1;
    }

    let (radix, digits_start) = match bytes.get(i..i + 2) {
        Some(b"0x") => (16, i + 2),
        Some(b"0b") => (2, i + 2),
        _ => (10, i),
    };
    let mut end = digits_start;
    while end < bytes.len() && (bytes[end] as char).is_digit(radix) {
        end += 1;
    }
    if end == digits_start {
        return Err(AsmError::UnexpectedSymbol { at: start });
    }

    let text = &source[start..end];
    let out_of_range = || AsmError::NumberOutOfRange {
        at: start,
        text: text.to_string(),
    };
    let magnitude =
        i64::from_str_radix(&source[digits_start..end], radix).map_err(|_| out_of_range())?;
    let value = if negative { -magnitude } else { magnitude };

    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return Err(out_of_range());
    }
    Ok((value as u32 as i32, end))
}

fn classify_ident(ident: &str, at: usize) -> Result<Tok<'_>, AsmError> {
    if let Some(kw) = Keyword::parse(ident) {
        return Ok(Tok::Keyword(kw));
    }

    let digits = &ident[1..];
    let is_register = ident.starts_with('i')
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if !is_register {
        return Ok(Tok::Name(ident));
    }

    match digits.parse::<usize>() {
        Ok(index) if index < REGISTER_COUNT => Ok(Tok::Register(index as u8)),
        _ => Err(AsmError::RegisterOutOfRange {
            at,
            text: ident.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
enum Operand<'a> {
    Number(i32),
    Register(u8),
    Name(&'a str),
}

#[derive(Debug, Clone, Copy)]
enum Stmt<'a> {
    Push(Operand<'a>),
    Pop(Operand<'a>),
    Plain(Instruction),
    Jl(&'a str),
    Alias { name: &'a str, register: u8 },
    Here(&'a str),
}

#[derive(Debug, Clone, Copy)]
struct Node<'a> {
    stmt: Stmt<'a>,
    at: usize,
    len: usize,
    /// Position of the operand, for error reporting.
    operand_at: usize,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Token<'a> {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token<'a> {
        let token = self.peek();
        if !matches!(token.tok, Tok::Eof) {
            self.pos += 1;
        }
        token
    }

    fn unexpected(token: Token<'a>, expected: &'static str) -> AsmError {
        AsmError::UnexpectedToken {
            at: token.at,
            found: token.tok.describe(),
            expected,
        }
    }

    fn name(&mut self) -> Result<(&'a str, Token<'a>), AsmError> {
        let token = self.bump();
        match token.tok {
            Tok::Name(name) => Ok((name, token)),
            _ => Err(Self::unexpected(token, "a name")),
        }
    }

    fn parse(mut self) -> Result<Vec<Node<'a>>, AsmError> {
        let mut nodes = Vec::new();

        loop {
            let head = self.bump();
            let (stmt, last) = match head.tok {
                Tok::Eof => break,
                Tok::Keyword(Keyword::Push) => {
                    let token = self.bump();
                    let operand = match token.tok {
                        Tok::Number(n) => Operand::Number(n),
                        Tok::Register(r) => Operand::Register(r),
                        Tok::Name(name) => Operand::Name(name),
                        _ => return Err(Self::unexpected(token, "a number, register or name")),
                    };
                    (Stmt::Push(operand), token)
                }
                Tok::Keyword(Keyword::Pop) => {
                    let token = self.bump();
                    let operand = match token.tok {
                        Tok::Register(r) => Operand::Register(r),
                        Tok::Name(name) => Operand::Name(name),
                        _ => return Err(Self::unexpected(token, "a register or name")),
                    };
                    (Stmt::Pop(operand), token)
                }
                Tok::Keyword(Keyword::Jl) => {
                    let (name, token) = self.name()?;
                    (Stmt::Jl(name), token)
                }
                Tok::Keyword(Keyword::Add) => (Stmt::Plain(Instruction::Add), head),
                Tok::Keyword(Keyword::Mul) => (Stmt::Plain(Instruction::Mul), head),
                Tok::Keyword(Keyword::Hlt) => (Stmt::Plain(Instruction::Halt), head),
                Tok::Keyword(Keyword::Read) => (Stmt::Plain(Instruction::Read), head),
                Tok::Keyword(Keyword::Write) => (Stmt::Plain(Instruction::Write), head),
                Tok::DirectiveName => {
                    let (name, _) = self.name()?;
                    let token = self.bump();
                    let Tok::Register(register) = token.tok else {
                        return Err(Self::unexpected(token, "a register"));
                    };
                    (Stmt::Alias { name, register }, token)
                }
                Tok::DirectiveHere => {
                    let (name, token) = self.name()?;
                    (Stmt::Here(name), token)
                }
                _ => return Err(Self::unexpected(head, "an operation")),
            };

            nodes.push(Node {
                stmt,
                at: head.at,
                len: last.at + last.len - head.at,
                operand_at: last.at,
            });
        }

        Ok(nodes)
    }
}

fn emit(nodes: &[Node<'_>]) -> Result<Program, AsmError> {
    let mut aliases: HashMap<&str, u8> = HashMap::new();
    for node in nodes {
        if let Stmt::Alias { name, register } = node.stmt {
            aliases.entry(name).or_insert(register);
        }
    }

    let register_of = |operand: Operand<'_>, at: usize| match operand {
        Operand::Register(r) => Ok(Some(r)),
        Operand::Name(name) => aliases
            .get(name)
            .copied()
            .map(Some)
            .ok_or_else(|| AsmError::UndefinedName {
                at,
                name: name.to_string(),
            }),
        Operand::Number(_) => Ok(None),
    };

    // Resolve everything except jump targets, and lay the program out.
    let mut planned: Vec<(Node<'_>, Option<Instruction>, u32)> = Vec::new();
    let mut locations: HashMap<&str, u32> = HashMap::new();
    let mut offset = 0u32;
    for node in nodes {
        let inst = match node.stmt {
            Stmt::Push(Operand::Number(n)) => Some(Instruction::PushInt(n)),
            Stmt::Push(operand) => register_of(operand, node.operand_at)?.map(Instruction::PushReg),
            Stmt::Pop(operand) => register_of(operand, node.operand_at)?.map(Instruction::PopReg),
            Stmt::Plain(inst) => Some(inst),
            Stmt::Jl(_) => Some(Instruction::JumpIfLess(0)),
            Stmt::Alias { .. } => None,
            Stmt::Here(name) => {
                if locations.insert(name, offset).is_some() {
                    return Err(AsmError::DuplicateLocation {
                        at: node.operand_at,
                        name: name.to_string(),
                    });
                }
                None
            }
        };
        planned.push((*node, inst, offset));
        offset += inst.map_or(0, |inst| inst.width());
    }

    let mut program = Program::default();
    for (node, inst, offset) in planned {
        let Some(mut inst) = inst else {
            continue;
        };
        if let Stmt::Jl(name) = node.stmt {
            let target = locations
                .get(name)
                .ok_or_else(|| AsmError::UndefinedLocation {
                    at: node.operand_at,
                    name: name.to_string(),
                })?;
            let delta = i64::from(*target) - i64::from(offset);
            let delta = i16::try_from(delta).map_err(|_| AsmError::JumpOutOfRange {
                at: node.at,
                name: name.to_string(),
                offset: delta,
            })?;
            inst = Instruction::JumpIfLess(delta);
        }

        inst.encode(&mut program.bytes);
        program.map.push(SourceSpan {
            offset,
            width: inst.width(),
            at: node.at,
            len: node.len,
        });
    }

    Ok(program)
}
