
mod assembled_program;
mod lexer;

pub use assembled_program::AssembledProgram;
pub use lexer::{Lexer, Token, TokenKind};

use std::{collections::HashMap, iter::Peekable, str::FromStr};

use peeking_take_while::PeekableExt;
use thiserror::Error;

use crate::emulator::RESET_VECTOR;
use crate::isa::{ISA, MemBranchOp, Operands};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line_number}, column {column}: {error_message}")]
pub struct AssemblerError {
    pub error_message: String,
    pub line_number: usize,
    pub column: usize,
    pub width: usize,
}

impl AssemblerError {
    pub fn new(error_message: String, line_number: usize, column: usize, width: usize) -> Self {
        Self {
            error_message,
            line_number,
            column,
            width,
        }
    }

    pub fn from_token(error_message: String, token: &Token) -> Self {
        Self {
            error_message,
            line_number: token.line,
            column: token.column,
            width: token.width,
        }
    }

    pub fn from_tokens(error_message: String, tokens: &[Token]) -> Self {
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => Self {
                error_message,
                line_number: first.line,
                column: first.column,
                width: last.column + last.width - first.column,
            },
            _ => Self::new(error_message, 0, 0, 0),
        }
    }
}

type Expression<'a> = Vec<Token<'a>>;

#[derive(Debug)]
enum Operand<'a> {
    Register(u8, Token<'a>),
    Expression(Expression<'a>),
}

#[derive(Debug)]
enum Statement<'a> {
    Instruction(ISA, Token<'a>, Vec<Operand<'a>>),
    Word(Vec<Expression<'a>>),
    Org(Expression<'a>),
    Equ(Token<'a>, Expression<'a>),
}

#[derive(Debug)]
struct Line<'a> {
    number: usize,
    labels: Vec<Token<'a>>,
    statement: Option<Statement<'a>>,
}

impl Statement<'_> {
    /// Number of memory words the statement emits.
    fn size(&self) -> u32 {
        match self {
            Statement::Instruction(isa, _, operands) => {
                let has_const = isa.mem_branch_op().is_some()
                    || matches!(operands.get(2), Some(Operand::Expression(_)));
                1 + has_const as u32
            }
            Statement::Word(values) => values.len() as u32,
            Statement::Org(_) | Statement::Equ(..) => 0,
        }
    }
}

/// Assemble a program. Code is placed at the reset vector unless an
/// `.org` directive says otherwise.
pub fn assemble(program: &str) -> Result<AssembledProgram, Vec<AssemblerError>> {
    let mut errors = Vec::new();
    let lines = parse_lines(program, &mut errors);

    let mut assembled = AssembledProgram::new();

    // First pass: lay out addresses and collect symbols
    let mut address = RESET_VECTOR as u32;
    for line in &lines {
        for label in &line.labels {
            let TokenKind::Symbol(name) = label.kind else {
                continue;
            };
            if address > 0xFFFF {
                errors.push(AssemblerError::from_token(
                    format!("Label '{name}' is past the end of memory"),
                    label,
                ));
                continue;
            }
            if let Err(e) = assembled.add_symbol(name, address as u16) {
                errors.push(AssemblerError::from_token(e, label));
            }
        }

        match &line.statement {
            Some(Statement::Org(expression)) => {
                match evaluate_origin(expression, &assembled.symbol_table) {
                    Ok(origin) => address = origin as u32,
                    Err(e) => errors.push(e),
                }
            }
            Some(Statement::Equ(name, expression)) => {
                let result = evaluate(expression, &assembled.symbol_table)
                    .and_then(|value| to_word(value, expression));
                match (result, &name.kind) {
                    (Ok(value), TokenKind::Symbol(symbol)) => {
                        if let Err(e) = assembled.add_symbol(symbol, value) {
                            errors.push(AssemblerError::from_token(e, name));
                        }
                    }
                    (Err(e), _) => errors.push(e),
                    _ => {}
                }
            }
            Some(statement) => address += 2 * statement.size(),
            None => {}
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Second pass: emit words
    let mut address = RESET_VECTOR as u32;
    for line in &lines {
        let Some(statement) = &line.statement else {
            continue;
        };

        if address + 2 * statement.size() > 0x10000 {
            errors.push(AssemblerError::new(
                "Program runs past the end of memory".to_string(),
                line.number,
                0,
                0,
            ));
            break;
        }

        let result = match statement {
            Statement::Org(expression) => {
                // already validated by the first pass
                if let Ok(origin) = evaluate_origin(expression, &assembled.symbol_table) {
                    address = origin as u32;
                }
                Ok(())
            }
            Statement::Equ(..) => Ok(()),
            Statement::Word(values) => values.iter().try_for_each(|expression| {
                let word = evaluate(expression, &assembled.symbol_table)
                    .and_then(|value| to_word(value, expression))?;
                assembled
                    .add_word(address as u16, word)
                    .map_err(|e| AssemblerError::from_tokens(e, expression))?;
                address += 2;
                Ok::<(), AssemblerError>(())
            }),
            Statement::Instruction(isa, mnemonic, operands) => {
                encode(*isa, mnemonic, operands, address as u16, &assembled.symbol_table)
                    .and_then(|words| {
                        assembled
                            .add_instruction(address as u16, &words, line.number)
                            .map_err(|e| AssemblerError::from_token(e, mnemonic))?;
                        address += 2 * words.len() as u32;
                        Ok(())
                    })
            }
        };

        if let Err(e) = result {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(assembled)
    } else {
        Err(errors)
    }
}

fn parse_lines<'a>(program: &'a str, errors: &mut Vec<AssemblerError>) -> Vec<Line<'a>> {
    let mut lexer = Lexer::new(program).peekable();
    let mut lines = Vec::new();
    let mut number = 1;

    while lexer.peek().is_some() {
        let tokens = match consume_line(&mut lexer) {
            Ok(tokens) => tokens,
            Err(e) => {
                errors.push(e);
                // skip whatever is left of a line the lexer choked on
                while lexer
                    .next_if(|token| !matches!(token, Ok(Token { kind: TokenKind::Newline, .. })))
                    .is_some()
                {}
                lexer.next();
                number += 1;
                continue;
            }
        };
        match parse_line(number, tokens) {
            Ok(line) => lines.push(line),
            Err(e) => errors.push(e),
        }
        number += 1;
    }

    lines
}

fn consume_line<'a>(lexer: &mut Peekable<Lexer<'a>>) -> Result<Vec<Token<'a>>, AssemblerError> {
    let parts = lexer
        .peeking_take_while(|token_result| {
            token_result
                .as_ref()
                .is_ok_and(|token| token.kind != TokenKind::Newline)
        })
        .map(|token_result| token_result.expect("filtered to Ok above"))
        .collect();

    // lexer.next() is either None, Newline, or Err(_) at this point
    match lexer.next() {
        Some(Err(e)) => Err(e),
        _ => Ok(parts),
    }
}

fn parse_line(number: usize, tokens: Vec<Token<'_>>) -> Result<Line<'_>, AssemblerError> {
    let mut labels = Vec::new();
    let mut rest = &tokens[..];

    while let [label @ Token { kind: TokenKind::Symbol(_), .. }, Token { kind: TokenKind::Colon, .. }, tail @ ..] =
        rest
    {
        labels.push(label.clone());
        rest = tail;
    }

    let statement = match rest {
        [] => None,
        [Token { kind: TokenKind::Dot, .. }, directive, args @ ..] => {
            Some(parse_directive(directive, args)?)
        }
        [mnemonic @ Token { kind: TokenKind::Symbol(name), .. }, args @ ..] => {
            let isa = ISA::from_str(name).map_err(|_| {
                AssemblerError::from_token(format!("Unknown instruction '{name}'"), mnemonic)
            })?;
            let operands = split_operands(mnemonic, args)?
                .into_iter()
                .map(parse_operand)
                .collect::<Result<Vec<_>, _>>()?;
            Some(Statement::Instruction(isa, mnemonic.clone(), operands))
        }
        [first, ..] => {
            return Err(AssemblerError::from_token(
                "Expected a label, directive or instruction".to_string(),
                first,
            ));
        }
    };

    Ok(Line {
        number,
        labels,
        statement,
    })
}

fn parse_directive<'a>(
    directive: &Token<'a>,
    args: &[Token<'a>],
) -> Result<Statement<'a>, AssemblerError> {
    let TokenKind::Symbol(name) = directive.kind else {
        return Err(AssemblerError::from_token(
            "Expected a directive name after '.'".to_string(),
            directive,
        ));
    };
    let mut args = split_operands(directive, args)?;

    match name.to_ascii_lowercase().as_str() {
        "org" if args.len() == 1 => Ok(Statement::Org(args.remove(0))),
        "word" if !args.is_empty() => Ok(Statement::Word(args)),
        "equ" if args.len() == 2 => {
            let value = args.remove(1);
            match args.remove(0).as_slice() {
                [symbol @ Token { kind: TokenKind::Symbol(_), .. }] => {
                    Ok(Statement::Equ(symbol.clone(), value))
                }
                other => Err(AssemblerError::from_tokens(
                    "Expected a name for .equ".to_string(),
                    other,
                )),
            }
        }
        "org" | "word" | "equ" => Err(AssemblerError::from_token(
            format!("Wrong number of arguments for .{name}"),
            directive,
        )),
        _ => Err(AssemblerError::from_token(
            format!("Unknown directive '.{name}'"),
            directive,
        )),
    }
}

/// Splits comma separated operands. `head` locates errors when there are
/// no tokens at all.
fn split_operands<'a>(head: &Token<'a>, tokens: &[Token<'a>]) -> Result<Vec<Expression<'a>>, AssemblerError> {
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    tokens
        .split(|token| token.kind == TokenKind::Comma)
        .map(|group| {
            if group.is_empty() {
                Err(AssemblerError::from_token(
                    "Missing operand".to_string(),
                    head,
                ))
            } else {
                Ok(group.to_vec())
            }
        })
        .collect()
}

fn parse_register(name: &str) -> Option<Result<u8, String>> {
    let digits = name.strip_prefix(['r', 'R'])?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(match digits.parse::<u8>() {
        Ok(reg) if reg < 8 => Ok(reg),
        _ => Err(format!("Register '{name}' does not exist (r0-r7)")),
    })
}

fn parse_operand(tokens: Expression<'_>) -> Result<Operand<'_>, AssemblerError> {
    if let [token @ Token { kind: TokenKind::Symbol(name), .. }] = tokens.as_slice() {
        if let Some(register) = parse_register(name) {
            return register
                .map(|reg| Operand::Register(reg, token.clone()))
                .map_err(|e| AssemblerError::from_token(e, token));
        }
    }
    Ok(Operand::Expression(tokens))
}

/// Evaluates `[-]term {(+|-) [-]term}` where a term is a literal or symbol.
fn evaluate(expression: &[Token], symbols: &HashMap<String, u16>) -> Result<i64, AssemblerError> {
    let mut total = 0i64;
    let mut sign = 1i64;
    let mut expect_term = true;

    for token in expression {
        let term = match (&token.kind, expect_term) {
            (TokenKind::Plus, true) => None,
            (TokenKind::Minus, true) => {
                sign = -sign;
                None
            }
            (TokenKind::Plus, false) => {
                sign = 1;
                expect_term = true;
                None
            }
            (TokenKind::Minus, false) => {
                sign = -1;
                expect_term = true;
                None
            }
            (TokenKind::IntLiteral(_, value), true) => Some(*value),
            (TokenKind::ChrLiteral(_, c), true) => Some(*c as i64),
            (TokenKind::Symbol(name), true) => match symbols.get(*name) {
                Some(&value) => Some(value as i64),
                None => {
                    return Err(AssemblerError::from_token(
                        format!("Unknown symbol '{name}'"),
                        token,
                    ));
                }
            },
            _ => {
                return Err(AssemblerError::from_token(
                    "Unexpected token in expression".to_string(),
                    token,
                ));
            }
        };

        if let Some(term) = term {
            total = sign
                .checked_mul(term)
                .and_then(|term| total.checked_add(term))
                .ok_or_else(|| {
                    AssemblerError::from_tokens(
                        "Value does not fit in 16 bits".to_string(),
                        expression,
                    )
                })?;
            expect_term = false;
        }
    }

    if expect_term {
        return Err(AssemblerError::from_tokens(
            "Incomplete expression".to_string(),
            expression,
        ));
    }
    Ok(total)
}

fn to_word(value: i64, expression: &[Token]) -> Result<u16, AssemblerError> {
    if (-0x8000..=0xFFFF).contains(&value) {
        Ok(value as u16)
    } else {
        Err(AssemblerError::from_tokens(
            format!("Value {value} does not fit in 16 bits"),
            expression,
        ))
    }
}

fn evaluate_origin(expression: &[Token], symbols: &HashMap<String, u16>) -> Result<u16, AssemblerError> {
    let origin = evaluate(expression, symbols).and_then(|value| to_word(value, expression))?;
    if origin & 1 != 0 {
        return Err(AssemblerError::from_tokens(
            format!("Origin {origin:#06x} is not word aligned"),
            expression,
        ));
    }
    Ok(origin)
}

fn operand_value<'a, 'b>(
    operand: &'b Operand<'a>,
    symbols: &HashMap<String, u16>,
) -> Result<(i64, &'b [Token<'a>]), AssemblerError> {
    match operand {
        Operand::Expression(expression) => {
            evaluate(expression, symbols).map(|value| (value, expression.as_slice()))
        }
        Operand::Register(_, token) => Err(AssemblerError::from_token(
            "Expected a value, found a register".to_string(),
            token,
        )),
    }
}

fn usage(isa: ISA) -> &'static str {
    match isa.mem_branch_op() {
        None => "rC, rA, rB|value",
        Some(MemBranchOp::Jump) => "[rC,] target",
        Some(MemBranchOp::BranchZero | MemBranchOp::BranchNotZero) => "rA, target[, rC]",
        Some(MemBranchOp::Load | MemBranchOp::LoadRelative | MemBranchOp::Store) => "rC, address",
    }
}

fn encode(
    isa: ISA,
    mnemonic: &Token,
    operands: &[Operand],
    address: u16,
    symbols: &HashMap<String, u16>,
) -> Result<Vec<u16>, AssemblerError> {
    let register = |operand: &Operand| match operand {
        Operand::Register(reg, _) => Ok(*reg),
        Operand::Expression(expression) => Err(AssemblerError::from_tokens(
            "Expected a register".to_string(),
            expression,
        )),
    };
    let arity = || {
        AssemblerError::from_token(
            format!("{isa} expects operands: {}", usage(isa)),
            mnemonic,
        )
    };

    let Some(op) = isa.mem_branch_op() else {
        let [c, a, b] = operands else {
            return Err(arity());
        };
        let (c, a) = (register(c)?, register(a)?);
        return match b {
            Operand::Register(b, _) => Ok(vec![
                isa.build(Operands {
                    a,
                    b: *b,
                    c,
                    constant: false,
                })
                .raw(),
            ]),
            Operand::Expression(_) => {
                let (constant, expression) = operand_value(b, symbols)?;
                Ok(vec![
                    isa.build(Operands {
                        a,
                        c,
                        constant: true,
                        ..Default::default()
                    })
                    .raw(),
                    to_word(constant, expression)?,
                ])
            }
        };
    };

    let (a, c, target) = match (op, operands) {
        (MemBranchOp::Jump, [target]) => (0, 0, target),
        (MemBranchOp::Jump, [c, target]) => (0, register(c)?, target),
        (MemBranchOp::BranchZero | MemBranchOp::BranchNotZero, [a, target]) => {
            (register(a)?, 0, target)
        }
        (MemBranchOp::BranchZero | MemBranchOp::BranchNotZero, [a, target, c]) => {
            (register(a)?, register(c)?, target)
        }
        (MemBranchOp::Load | MemBranchOp::LoadRelative | MemBranchOp::Store, [c, target]) => {
            (0, register(c)?, target)
        }
        _ => return Err(arity()),
    };

    let (value, expression) = operand_value(target, symbols)?;
    let mut constant = to_word(value, expression)?;
    if op == MemBranchOp::LoadRelative {
        // relative to PC + 2 at execute, which is past the constant word;
        // the ALU adds modulo 2^16 so any address is reachable
        constant = constant.wrapping_sub(address.wrapping_add(4));
    }

    Ok(vec![
        isa.build(Operands {
            a,
            c,
            constant: true,
            ..Default::default()
        })
        .raw(),
        constant,
    ])
}
