//! Decoded instruction representation.

use std::fmt;

use crate::il::opcode::OpCode;
use crate::metadata::member::Member;
use crate::metadata::token::Token;

/// The decoded operand of a single instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand.
    None,
    /// Signed 8-bit immediate.
    I8(i8),
    /// Signed 32-bit immediate.
    I32(i32),
    /// Signed 64-bit immediate.
    I64(i64),
    /// 32-bit float immediate.
    F32(f32),
    /// 64-bit float immediate.
    F64(f64),
    /// Variable or argument index.
    Var(u16),
    /// Absolute branch target, in bytes from the start of the stream.
    Target(usize),
    /// Jump table of displacements relative to the end of the instruction.
    Switch(Vec<i32>),
    /// Metadata token, with the entity it resolved to when a resolver
    /// was available and succeeded.
    Token {
        /// The raw token value.
        token: Token,
        /// Resolved entity, if any.
        entity: Option<Member>,
    },
}

/// A single decoded instruction.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Zero-based position of the instruction in the decoded sequence.
    pub index: usize,
    /// Byte offset of the opcode within the stream.
    pub offset: usize,
    /// The opcode table entry.
    pub opcode: &'static OpCode,
    /// Total encoded size, opcode and operand bytes included.
    pub size: usize,
    /// The decoded operand.
    pub operand: Operand,
}

impl Operation {
    /// Resolved entity attached to a token operand, if any.
    #[must_use]
    pub fn entity(&self) -> Option<&Member> {
        match &self.operand {
            Operand::Token { entity, .. } => entity.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::I8(v) => write!(f, " {v}"),
            Operand::I32(v) => write!(f, " {v}"),
            Operand::I64(v) => write!(f, " {v}"),
            Operand::F32(v) => write!(f, " {v}"),
            Operand::F64(v) => write!(f, " {v}"),
            Operand::Var(v) => write!(f, " {v}"),
            Operand::Target(target) => write!(f, " IL_{target:04x}"),
            Operand::Switch(targets) => write!(f, " ({} targets)", targets.len()),
            Operand::Token { token, .. } => write!(f, " {token}"),
        }
    }
}
