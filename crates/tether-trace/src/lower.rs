//! A small expression language lowered to instruction streams.
//!
//! ```text
//! fn scale(a, b) {
//!     c = a * b;
//!     return m.mul(c)
//! }
//! ```
//!
//! Names bound as parameters or by assignment are locals; every other name
//! is a global. `if`/`while` lower to jump instructions and numeric
//! literals to `load_const`, both of which the trace compiler rejects.

use std::collections::HashMap;

use winnow::combinator::{alt, delimited, opt, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::asm::ident;
use crate::error::ParseError;
use crate::instruction::{BinaryOperator, Instruction, TraceFunction};

const KEYWORDS: &[&str] = &["fn", "return", "if", "else", "while"];

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Name(String),
    Number(String),
    Binary(Box<Expr>, BinaryOperator, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Method(Box<Expr>, String, Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum Stmt {
    Assign(String, Expr),
    Return(Expr),
    Expr(Expr),
    If(Expr, Vec<Stmt>, Vec<Stmt>),
    While(Expr, Vec<Stmt>),
}

#[derive(Clone, Debug, PartialEq)]
struct FnDef {
    name: String,
    params: Vec<String>,
    body: Vec<Stmt>,
}

// ============================================================================
// Parser
// ============================================================================

/// Skip whitespace and `//` comments.
fn ws(input: &mut &str) -> ModalResult<()> {
    loop {
        take_while(0.., |c: char| c.is_whitespace()).parse_next(input)?;
        if opt("//").parse_next(input)?.is_none() {
            return Ok(());
        }
        take_while(0.., |c: char| c != '\n').parse_next(input)?;
    }
}

fn token<'a, O>(
    mut parser: impl Parser<&'a str, O, ErrMode<ContextError>>,
) -> impl Parser<&'a str, O, ErrMode<ContextError>> {
    move |input: &mut &'a str| {
        ws.parse_next(input)?;
        parser.parse_next(input)
    }
}

fn keyword<'a>(kw: &'static str) -> impl Parser<&'a str, &'a str, ErrMode<ContextError>> {
    token(ident.verify(move |s: &str| s == kw))
}

fn name(input: &mut &str) -> ModalResult<String> {
    token(ident.verify(|s: &str| !KEYWORDS.contains(&s)))
        .map(str::to_owned)
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<Expr> {
    token(
        (
            take_while(1.., |c: char| c.is_ascii_digit()),
            opt(('.', take_while(1.., |c: char| c.is_ascii_digit()))),
        )
            .take(),
    )
    .map(|s: &str| Expr::Number(s.to_owned()))
    .parse_next(input)
}

fn args(input: &mut &str) -> ModalResult<Vec<Expr>> {
    delimited(token('('), separated(0.., expr, token(',')), token(')')).parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        number,
        name.map(Expr::Name),
        delimited(token('('), expr, token(')')),
    ))
    .parse_next(input)
}

fn postfix(input: &mut &str) -> ModalResult<Expr> {
    let mut expr = primary.parse_next(input)?;
    loop {
        if let Some(args) = opt(args).parse_next(input)? {
            expr = Expr::Call(Box::new(expr), args);
        } else if opt(token('.')).parse_next(input)?.is_some() {
            let method = name.parse_next(input)?;
            let args = args.parse_next(input)?;
            expr = Expr::Method(Box::new(expr), method, args);
        } else {
            return Ok(expr);
        }
    }
}

fn binary_level(
    input: &mut &str,
    ops: &'static [char],
    operand: fn(&mut &str) -> ModalResult<Expr>,
) -> ModalResult<Expr> {
    let mut lhs = operand(input)?;
    loop {
        let Some(op) = opt(token(one_of(|c: char| ops.contains(&c)))).parse_next(input)? else {
            return Ok(lhs);
        };
        let rhs = operand(input)?;
        let op = BinaryOperator::from_symbol(op).unwrap_or(BinaryOperator::Add);
        lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
    }
}

fn product(input: &mut &str) -> ModalResult<Expr> {
    binary_level(input, &['*', '/', '%'], postfix)
}

fn expr(input: &mut &str) -> ModalResult<Expr> {
    binary_level(input, &['+', '-'], product)
}

fn block(input: &mut &str) -> ModalResult<Vec<Stmt>> {
    token('{').parse_next(input)?;
    let mut body = Vec::new();
    loop {
        if opt(token('}')).parse_next(input)?.is_some() {
            return Ok(body);
        }
        if opt(token(';')).parse_next(input)?.is_some() {
            continue;
        }
        body.push(statement.parse_next(input)?);
    }
}

fn statement(input: &mut &str) -> ModalResult<Stmt> {
    alt((
        (keyword("return"), expr).map(|(_, e)| Stmt::Return(e)),
        (keyword("if"), expr, block, opt((keyword("else"), block)))
            .map(|(_, cond, then, other)| {
                Stmt::If(cond, then, other.map(|(_, b)| b).unwrap_or_default())
            }),
        (keyword("while"), expr, block).map(|(_, cond, body)| Stmt::While(cond, body)),
        (name, token('='), expr).map(|(target, _, value)| Stmt::Assign(target, value)),
        expr.map(Stmt::Expr),
    ))
    .parse_next(input)
}

fn function(input: &mut &str) -> ModalResult<FnDef> {
    keyword("fn").parse_next(input)?;
    let fn_name = name.parse_next(input)?;
    let params =
        delimited(token('('), separated(0.., name, token(',')), token(')')).parse_next(input)?;
    let body = block.parse_next(input)?;
    Ok(FnDef {
        name: fn_name,
        params,
        body,
    })
}

// ============================================================================
// Lowering
// ============================================================================

struct Lowerer {
    code: Vec<Instruction>,
    slots: HashMap<String, u32>,
}

impl Lowerer {
    fn new(params: &[String]) -> Self {
        let slots = params
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i as u32))
            .collect();
        Lowerer {
            code: Vec::new(),
            slots,
        }
    }

    fn emit(&mut self, inst: Instruction) -> usize {
        self.code.push(inst);
        self.code.len() - 1
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn patch(&mut self, at: usize, target: u32) {
        match &mut self.code[at] {
            Instruction::Jump(t) | Instruction::JumpIfFalse(t) | Instruction::JumpIfTrue(t) => {
                *t = target
            }
            _ => {}
        }
    }

    fn slot_for(&mut self, name: &str) -> u32 {
        let next = self.slots.len() as u32;
        *self.slots.entry(name.to_owned()).or_insert(next)
    }

    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign(target, value) => {
                self.expr(value);
                let slot = self.slot_for(target);
                self.emit(Instruction::StoreLocal(slot));
            }
            Stmt::Return(value) => {
                self.expr(value);
                self.emit(Instruction::Return);
            }
            Stmt::Expr(value) => {
                self.expr(value);
                self.emit(Instruction::Other("pop_top".into()));
            }
            Stmt::If(cond, then, other) => {
                self.expr(cond);
                let skip_then = self.emit(Instruction::JumpIfFalse(0));
                self.block(then);
                if other.is_empty() {
                    let end = self.here();
                    self.patch(skip_then, end);
                } else {
                    let skip_else = self.emit(Instruction::Jump(0));
                    let else_start = self.here();
                    self.patch(skip_then, else_start);
                    self.block(other);
                    let end = self.here();
                    self.patch(skip_else, end);
                }
            }
            Stmt::While(cond, body) => {
                let start = self.here();
                self.expr(cond);
                let exit = self.emit(Instruction::JumpIfFalse(0));
                self.block(body);
                self.emit(Instruction::Jump(start));
                let end = self.here();
                self.patch(exit, end);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(name) => {
                let inst = match self.slots.get(name) {
                    Some(&slot) => Instruction::LoadLocal(slot),
                    None => Instruction::LoadGlobal(name.clone()),
                };
                self.emit(inst);
            }
            Expr::Number(text) => {
                self.emit(Instruction::Other(format!("load_const {text}")));
            }
            Expr::Binary(lhs, op, rhs) => {
                self.expr(lhs);
                self.expr(rhs);
                self.emit(Instruction::BinaryOp(*op));
            }
            Expr::Call(callee, args) => {
                self.expr(callee);
                self.call_args(args);
            }
            Expr::Method(receiver, method, args) => {
                self.expr(receiver);
                self.emit(Instruction::LoadMethod(method.clone()));
                self.call_args(args);
            }
        }
    }

    fn call_args(&mut self, args: &[Expr]) {
        for arg in args {
            self.expr(arg);
        }
        self.emit(Instruction::Call(args.len() as u32));
    }
}

fn lower(def: FnDef) -> TraceFunction {
    let mut lowerer = Lowerer::new(&def.params);
    lowerer.block(&def.body);
    TraceFunction::new(def.name, def.params, lowerer.code)
}

/// Parse `source` and lower every function it defines.
pub fn lower_source(source: &str) -> Result<Vec<TraceFunction>, ParseError> {
    let mut remaining = source;
    let mut functions = Vec::new();
    loop {
        ws.parse_next(&mut remaining)
            .map_err(|e| ParseError::at(source, source.len() - remaining.len(), e.to_string()))?;
        if remaining.is_empty() {
            break;
        }
        let start = source.len() - remaining.len();
        let def = function.parse_next(&mut remaining).map_err(|_| {
            ParseError::at(source, start, "expected a well-formed `fn name(params) { ... }`")
        })?;
        tracing::trace!(function = %def.name, statements = def.body.len(), "lowering");
        functions.push(lower(def));
    }
    Ok(functions)
}
