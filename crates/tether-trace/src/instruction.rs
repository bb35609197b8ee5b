//! The tagged instruction stream traced by the compiler.

use std::fmt;
use std::str::FromStr;

/// Arithmetic operator of a [`Instruction::BinaryOp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOperator {
    pub fn symbol(self) -> char {
        match self {
            BinaryOperator::Add => '+',
            BinaryOperator::Sub => '-',
            BinaryOperator::Mul => '*',
            BinaryOperator::Div => '/',
            BinaryOperator::Rem => '%',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        Some(match c {
            '+' => BinaryOperator::Add,
            '-' => BinaryOperator::Sub,
            '*' => BinaryOperator::Mul,
            '/' => BinaryOperator::Div,
            '%' => BinaryOperator::Rem,
            _ => return None,
        })
    }

    /// Lowercase name used in graph dumps.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Rem => "rem",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for BinaryOperator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(op) = Self::from_symbol(c) {
                return Ok(op);
            }
        }
        match s {
            "add" => Ok(BinaryOperator::Add),
            "sub" => Ok(BinaryOperator::Sub),
            "mul" => Ok(BinaryOperator::Mul),
            "div" => Ok(BinaryOperator::Div),
            "rem" | "mod" => Ok(BinaryOperator::Rem),
            _ => Err(()),
        }
    }
}

/// One instruction. Jump targets are instruction indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    LoadLocal(u32),
    LoadGlobal(String),
    LoadMethod(String),
    StoreLocal(u32),
    BinaryOp(BinaryOperator),
    Call(u32),
    Return,
    Jump(u32),
    JumpIfTrue(u32),
    JumpIfFalse(u32),
    ForIter(u32),
    /// Any other instruction, kept verbatim.
    Other(String),
}

impl Instruction {
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_)
                | Instruction::JumpIfTrue(_)
                | Instruction::JumpIfFalse(_)
                | Instruction::ForIter(_)
        )
    }

    pub fn mnemonic(&self) -> &str {
        match self {
            Instruction::LoadLocal(_) => "load_local",
            Instruction::LoadGlobal(_) => "load_global",
            Instruction::LoadMethod(_) => "load_method",
            Instruction::StoreLocal(_) => "store_local",
            Instruction::BinaryOp(_) => "binary_op",
            Instruction::Call(_) => "call",
            Instruction::Return => "return",
            Instruction::Jump(_) => "jump",
            Instruction::JumpIfTrue(_) => "jump_if_true",
            Instruction::JumpIfFalse(_) => "jump_if_false",
            Instruction::ForIter(_) => "for_iter",
            Instruction::Other(text) => text.split_whitespace().next().unwrap_or(text),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Instruction::LoadLocal(n)
            | Instruction::StoreLocal(n)
            | Instruction::Call(n)
            | Instruction::Jump(n)
            | Instruction::JumpIfTrue(n)
            | Instruction::JumpIfFalse(n)
            | Instruction::ForIter(n) => write!(f, "{mnemonic} {n}"),
            Instruction::LoadGlobal(name) | Instruction::LoadMethod(name) => {
                write!(f, "{mnemonic} {name}")
            }
            Instruction::BinaryOp(op) => write!(f, "{mnemonic} {op}"),
            Instruction::Return => f.write_str(mnemonic),
            Instruction::Other(text) => f.write_str(text),
        }
    }
}

/// A callable to trace. Parameters occupy local slots `0..params.len()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceFunction {
    pub name: String,
    pub params: Vec<String>,
    pub code: Vec<Instruction>,
}

impl TraceFunction {
    pub fn new(name: impl Into<String>, params: Vec<String>, code: Vec<Instruction>) -> Self {
        TraceFunction {
            name: name.into(),
            params,
            code,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Prints in the assembly format accepted by [`crate::parse_assembly`].
impl fmt::Display for TraceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {}({})", self.name, self.params.join(", "))?;
        for (i, inst) in self.code.iter().enumerate() {
            writeln!(f, "    {inst}  # {i}")?;
        }
        Ok(())
    }
}
