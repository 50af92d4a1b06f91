//! Linear instruction stream decoder.
//!
//! [`IlDecoder`] walks a bytecode stream front to back, yielding one
//! [`Operation`] per instruction. Decoding is resilient by construction:
//! a truncated operand surfaces as an error from the iterator rather
//! than a panic, and the caller decides whether to stop or discard.
//!
//! When a [`TokenResolver`] is attached, token operands are resolved to
//! their entities as they are decoded. A resolution failure propagates
//! as [`crate::Error::ScopeResolution`], except at the ambiguous-member
//! operand in relaxed mode: there the token is re-read as a plain 32-bit
//! immediate, matching streams produced by runtime code generators where
//! not every 4-byte inline value at that position is a live metadata
//! reference.
//!
//! A reserved or undefined encoding decodes to an [`Operation`] with an
//! empty mnemonic and no operand, and the stream continues.

use crate::il::opcode::{self, OpCode, OperandKind, EXTENDED_PREFIX};
use crate::il::operation::{Operand, Operation};
use crate::il::parser::Parser;
use crate::metadata::member::Member;
use crate::metadata::resolver::TokenResolver;
use crate::metadata::token::{Token, TokenKind};
use crate::Result;

/// Streaming decoder over a bytecode slice.
pub struct IlDecoder<'a> {
    parser: Parser<'a>,
    resolver: Option<&'a dyn TokenResolver>,
    relaxed: bool,
    next_index: usize,
    failed: bool,
}

impl<'a> IlDecoder<'a> {
    /// Create a decoder without token resolution. Token operands are
    /// yielded with their raw value and no entity.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        IlDecoder {
            parser: Parser::new(data),
            resolver: None,
            relaxed: false,
            next_index: 0,
            failed: false,
        }
    }

    /// Create a decoder that resolves token operands through `resolver`.
    ///
    /// In relaxed mode an unresolvable ambiguous-member operand (the
    /// `ldtoken` shape) degrades to a raw 32-bit immediate instead of
    /// failing; every other token shape still propagates the error.
    #[must_use]
    pub fn with_resolver(data: &'a [u8], resolver: &'a dyn TokenResolver, relaxed: bool) -> Self {
        IlDecoder {
            parser: Parser::new(data),
            resolver: Some(resolver),
            relaxed,
            next_index: 0,
            failed: false,
        }
    }

    fn decode_one(&mut self) -> Result<Operation> {
        let offset = self.parser.pos();
        let first = self.parser.read_le::<u8>()?;

        // Undefined encodings yield the reserved placeholder entry so
        // decoding can continue past them.
        let entry = if first == EXTENDED_PREFIX {
            let second = self.parser.read_le::<u8>()?;
            opcode::lookup_extended(second).unwrap_or(&OpCode::INVALID)
        } else {
            opcode::lookup(first).unwrap_or(&OpCode::INVALID)
        };

        let operand = self.decode_operand(entry.operand)?;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Operation {
            index,
            offset,
            opcode: entry,
            size: self.parser.pos() - offset,
            operand,
        })
    }

    fn decode_operand(&mut self, kind: OperandKind) -> Result<Operand> {
        match kind {
            OperandKind::None => Ok(Operand::None),
            OperandKind::I8 => Ok(Operand::I8(self.parser.read_le()?)),
            OperandKind::I32 => Ok(Operand::I32(self.parser.read_le()?)),
            OperandKind::I64 => Ok(Operand::I64(self.parser.read_le()?)),
            OperandKind::F32 => Ok(Operand::F32(self.parser.read_le()?)),
            OperandKind::F64 => Ok(Operand::F64(self.parser.read_le()?)),
            OperandKind::VarU8 => Ok(Operand::Var(u16::from(self.parser.read_le::<u8>()?))),
            OperandKind::VarU16 => Ok(Operand::Var(self.parser.read_le()?)),
            OperandKind::BranchI8 => {
                let displacement = i64::from(self.parser.read_le::<i8>()?);
                self.branch_target(displacement)
            }
            OperandKind::BranchI32 => {
                let displacement = i64::from(self.parser.read_le::<i32>()?);
                self.branch_target(displacement)
            }
            OperandKind::Switch => {
                let count = self.parser.read_le::<u32>()?;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(self.parser.read_le::<i32>()?);
                }
                Ok(Operand::Switch(targets))
            }
            OperandKind::Token(expected) => self.decode_token(expected),
        }
    }

    /// Branch targets are encoded relative to the first byte after the
    /// operand and reported absolute.
    fn branch_target(&self, displacement: i64) -> Result<Operand> {
        let base = self.parser.pos() as i64;
        let target = base + displacement;
        if target < 0 {
            return Err(malformed_error!(
                "branch target {} before start of stream",
                target
            ));
        }
        Ok(Operand::Target(target as usize))
    }

    fn decode_token(&mut self, expected: TokenKind) -> Result<Operand> {
        let start = self.parser.pos();
        let raw = self.parser.read_le::<u32>()?;
        let token = Token::new(raw);

        let Some(resolver) = self.resolver else {
            return Ok(Operand::Token {
                token,
                entity: None,
            });
        };

        match resolve_shaped(resolver, token, expected) {
            Ok(entity) => Ok(Operand::Token {
                token,
                entity: Some(entity),
            }),
            // Only the ambiguous-member position may carry an inline
            // value that is not a live token, and only relaxed callers
            // accept one. Re-read it as an immediate.
            Err(_) if self.relaxed && expected == TokenKind::Member => {
                self.parser.seek(start)?;
                Ok(Operand::I32(self.parser.read_le()?))
            }
            Err(error) => Err(error),
        }
    }
}

fn resolve_shaped(resolver: &dyn TokenResolver, token: Token, expected: TokenKind) -> Result<Member> {
    match expected {
        TokenKind::Type => resolver.resolve_type(token).map(Member::Type),
        TokenKind::Field => resolver.resolve_field(token).map(Member::Field),
        TokenKind::Method => resolver.resolve_method(token).map(Member::Method),
        TokenKind::String => resolver.resolve_string(token).map(Member::String),
        TokenKind::Signature => resolver.resolve_signature(token).map(Member::Signature),
        TokenKind::Member => resolver.resolve_member(token),
    }
}

impl Iterator for IlDecoder<'_> {
    type Item = Result<Operation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.parser.has_more_data() {
            return None;
        }

        match self.decode_one() {
            Ok(operation) => Some(Ok(operation)),
            Err(error) => {
                self.failed = true;
                Some(Err(error))
            }
        }
    }
}

/// Decode an entire stream into a vector of operations.
///
/// `relaxed` controls the ambiguous-member fallback; it has no effect
/// without a resolver.
///
/// # Errors
/// Returns the first decode error encountered; operations decoded before
/// the error are discarded.
pub fn decode_stream(
    data: &[u8],
    resolver: Option<&dyn TokenResolver>,
    relaxed: bool,
) -> Result<Vec<Operation>> {
    let mut decoder = match resolver {
        Some(resolver) => IlDecoder::with_resolver(data, resolver, relaxed),
        None => IlDecoder::new(data),
    };
    decoder.try_fold(Vec::new(), |mut operations, operation| {
        operations.push(operation?);
        Ok(operations)
    })
}
