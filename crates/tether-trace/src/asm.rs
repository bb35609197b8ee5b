//! Line-oriented assembly format for instruction streams.
//!
//! ```text
//! fn area(w, h)
//!     load_local 0
//!     load_local 1
//!     binary_op *
//!     return
//! ```
//!
//! `#` starts a comment. Unknown mnemonics are kept as
//! [`Instruction::Other`] so the compiler can report them.

use winnow::ascii;
use winnow::combinator::{delimited, preceded, separated};
use winnow::prelude::*;
use winnow::token::{one_of, rest, take_while};

use crate::error::ParseError;
use crate::instruction::{BinaryOperator, Instruction, TraceFunction};

fn hspace(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

fn hspace1(input: &mut &str) -> ModalResult<()> {
    take_while(1.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

pub(crate) fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<u32> {
    hspace1.parse_next(input)?;
    let value: u32 = ascii::dec_uint(input)?;
    Ok(value)
}

fn name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(hspace1, ident).parse_next(input)
}

fn operator(input: &mut &str) -> ModalResult<BinaryOperator> {
    preceded(hspace1, take_while(1.., |c: char| !c.is_whitespace()))
        .verify_map(|s: &str| s.parse().ok())
        .parse_next(input)
}

/// Parse one instruction, without surrounding whitespace or comments.
fn instruction(input: &mut &str) -> ModalResult<Instruction> {
    let start = *input;
    let mnemonic = ident.parse_next(input)?;
    let inst = match mnemonic {
        "load_local" => Instruction::LoadLocal(number.parse_next(input)?),
        "store_local" => Instruction::StoreLocal(number.parse_next(input)?),
        "load_global" => Instruction::LoadGlobal(name.parse_next(input)?.to_owned()),
        "load_method" => Instruction::LoadMethod(name.parse_next(input)?.to_owned()),
        "binary_op" => Instruction::BinaryOp(operator.parse_next(input)?),
        "call" => Instruction::Call(number.parse_next(input)?),
        "return" => Instruction::Return,
        "jump" => Instruction::Jump(number.parse_next(input)?),
        "jump_if_true" => Instruction::JumpIfTrue(number.parse_next(input)?),
        "jump_if_false" => Instruction::JumpIfFalse(number.parse_next(input)?),
        "for_iter" => Instruction::ForIter(number.parse_next(input)?),
        _ => {
            rest.void().parse_next(input)?;
            Instruction::Other(start.trim_end().to_owned())
        }
    };
    hspace.parse_next(input)?;
    Ok(inst)
}

fn header<'a>(input: &mut &'a str) -> ModalResult<(&'a str, Vec<&'a str>)> {
    "fn".parse_next(input)?;
    let fn_name = name.parse_next(input)?;
    hspace.parse_next(input)?;
    let params = delimited(
        '(',
        separated(0.., delimited(hspace, ident, hspace), ','),
        ')',
    )
    .parse_next(input)?;
    hspace.parse_next(input)?;
    Ok((fn_name, params))
}

/// Parse every function in `input`.
pub fn parse_assembly(input: &str) -> Result<Vec<TraceFunction>, ParseError> {
    let mut functions: Vec<TraceFunction> = Vec::new();
    let mut offset = 0;
    for raw in input.split_inclusive('\n') {
        let line_offset = offset;
        offset += raw.len();

        let code = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let trimmed = code.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lead = code.len() - code.trim_start().len();
        let at = line_offset + lead;

        if trimmed.starts_with("fn ") {
            let (name, params) = header.parse(trimmed).map_err(|_| {
                ParseError::at(input, at, format!("malformed function header `{trimmed}`"))
            })?;
            functions.push(TraceFunction::new(
                name,
                params.into_iter().map(str::to_owned).collect(),
                Vec::new(),
            ));
            continue;
        }

        let inst = instruction
            .parse(trimmed)
            .map_err(|_| ParseError::at(input, at, format!("malformed instruction `{trimmed}`")))?;
        match functions.last_mut() {
            Some(function) => function.code.push(inst),
            None => {
                return Err(ParseError::at(
                    input,
                    at,
                    "instruction outside of a function; start with `fn name(params)`",
                ));
            }
        }
    }
    Ok(functions)
}
