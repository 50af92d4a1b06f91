//! Raw call thunks.
//!
//! A thunk re-enters the original, detoured entry point of an intercepted
//! method: it forwards its own arguments, pushes the raw entry address and
//! calls through it indirectly. Instance calls use the has-this indirect
//! convention, with the receiver carried implicitly rather than in the
//! signature. Primitive results box to their own category, opaque results
//! travel as addresses and box as such.

use std::sync::Arc;

use crate::il::assembler::{BodyAssembler, TokenScope, WellKnownType};
use crate::il::body::MethodBody;
use crate::il::opcode::codes;
use crate::metadata::method::{MethodRef, Primitive, ReturnKind, SlotType};
use crate::Result;

/// Indirect call convention byte: plain static call.
const CALL_CONV_DEFAULT: u8 = 0x00;
/// Indirect call convention byte: implicit receiver.
const CALL_CONV_HAS_THIS: u8 = 0x20;

/// Element byte for a void result in an indirect call signature.
const ELEMENT_VOID: u8 = 0x01;
/// Element byte for an address-sized slot.
const ELEMENT_I: u8 = 0x18;

/// How the thunk's raw result must be handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkReturn {
    /// Nothing to hand back.
    Void,
    /// The raw value flows through unchanged.
    Raw(SlotType),
    /// The raw value is boxed before returning.
    Boxed(SlotType),
}

/// Builds the body calling back into a detoured entry point.
pub struct ThunkBuilder {
    method: Arc<MethodRef>,
    address: usize,
}

impl ThunkBuilder {
    /// Create a builder for calling `method`'s code at `address`.
    #[must_use]
    pub fn new(method: Arc<MethodRef>, address: usize) -> Self {
        ThunkBuilder { method, address }
    }

    /// Whether the indirect call carries an implicit receiver.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.method.is_static() && !self.method.is_constructor()
    }

    /// The thunk's parameter slots: a receiver for instance methods, an
    /// instantiation handle for generic methods, then the declared
    /// parameters with non-primitives erased to addresses.
    #[must_use]
    pub fn parameters(&self) -> Vec<SlotType> {
        let mut parameters = Vec::with_capacity(self.method.params.len() + 2);
        if !self.method.is_static() {
            parameters.push(SlotType::Primitive(Primitive::IPtr));
        }
        if self.method.is_generic() {
            parameters.push(SlotType::Primitive(Primitive::IPtr));
        }
        for parameter in &self.method.params {
            parameters.push(match parameter.ty {
                SlotType::Primitive(primitive) => SlotType::Primitive(primitive),
                SlotType::Opaque => SlotType::Primitive(Primitive::IPtr),
            });
        }
        parameters
    }

    /// How the raw result is adapted.
    #[must_use]
    pub fn return_shape(&self) -> ThunkReturn {
        if self.method.is_constructor() {
            return ThunkReturn::Void;
        }
        match self.method.returns {
            ReturnKind::Void => ThunkReturn::Void,
            ReturnKind::ValueTaskOf(slot)
                if !self.method.is_static()
                    && self.method.params.first().is_some_and(|p| p.ty.can_inline()) =>
            {
                ThunkReturn::Raw(slot)
            }
            ReturnKind::Value(SlotType::Primitive(primitive)) => {
                ThunkReturn::Boxed(SlotType::Primitive(primitive))
            }
            _ => ThunkReturn::Boxed(SlotType::Primitive(Primitive::IPtr)),
        }
    }

    /// Emit the thunk body, minting tokens through `scope`.
    ///
    /// # Errors
    /// Propagates token minting failures from the scope.
    pub fn build(&self, scope: &mut dyn TokenScope) -> Result<MethodBody> {
        let mut asm = BodyAssembler::new();
        let parameters = self.parameters();

        for index in 0..parameters.len() {
            asm.emit_wide(codes::LDARG);
            asm.emit_u16(index as u16);
        }

        asm.emit(codes::LDC_I8);
        asm.emit_i64(self.address as i64);
        asm.emit(codes::CONV_I);

        asm.emit(codes::CALLI);
        asm.emit_token(scope.signature_token(&self.indirect_signature(&parameters))?);

        if let ThunkReturn::Boxed(slot) = self.return_shape() {
            asm.emit(codes::BOX);
            let boxed = match slot {
                SlotType::Primitive(primitive) => WellKnownType::Primitive(primitive),
                SlotType::Opaque => WellKnownType::IntPtr,
            };
            asm.emit_token(scope.type_token(boxed)?);
        }

        asm.emit(codes::RET);
        asm.require_stack(parameters.len() as u32 + 2);
        Ok(asm.finish())
    }

    /// Signature blob of the indirect call: convention byte, parameter
    /// count, return element, parameter elements. The implicit receiver
    /// of a has-this call never appears as a parameter entry.
    fn indirect_signature(&self, parameters: &[SlotType]) -> Vec<u8> {
        let has_this = self.has_this();
        let signature_params = if has_this {
            &parameters[1..]
        } else {
            parameters
        };

        let mut blob = Vec::with_capacity(3 + signature_params.len());
        blob.push(if has_this {
            CALL_CONV_HAS_THIS
        } else {
            CALL_CONV_DEFAULT
        });
        blob.push(signature_params.len() as u8);
        blob.push(match self.return_shape() {
            ThunkReturn::Void => ELEMENT_VOID,
            ThunkReturn::Raw(slot) | ThunkReturn::Boxed(slot) => element_byte(slot),
        });
        blob.extend(signature_params.iter().map(|slot| element_byte(*slot)));
        blob
    }
}

fn element_byte(slot: SlotType) -> u8 {
    use Primitive::*;
    match slot {
        SlotType::Primitive(primitive) => match primitive {
            Bool => 0x02,
            Char => 0x03,
            I1 => 0x04,
            U1 => 0x05,
            I2 => 0x06,
            U2 => 0x07,
            I4 => 0x08,
            U4 => 0x09,
            I8 => 0x0A,
            U8 => 0x0B,
            R4 => 0x0C,
            R8 => 0x0D,
            IPtr => 0x18,
            UPtr => 0x19,
        },
        SlotType::Opaque => ELEMENT_I,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::decoder;
    use crate::il::operation::Operand;
    use crate::metadata::method::{MethodAttributes, Param};
    use crate::metadata::token::Token;

    struct RecordingScope {
        blobs: Vec<Vec<u8>>,
    }

    impl RecordingScope {
        fn new() -> Self {
            RecordingScope { blobs: Vec::new() }
        }
    }

    impl TokenScope for RecordingScope {
        fn type_token(&mut self, _ty: WellKnownType) -> crate::Result<Token> {
            Ok(Token::new(0x0100_0001))
        }

        fn member_token(
            &mut self,
            _member: crate::il::assembler::WellKnownMember,
        ) -> crate::Result<Token> {
            Ok(Token::new(0x0A00_0001))
        }

        fn signature_token(&mut self, blob: &[u8]) -> crate::Result<Token> {
            self.blobs.push(blob.to_vec());
            Ok(Token::new(0x1100_0001))
        }
    }

    fn instance_method(returns: ReturnKind) -> Arc<MethodRef> {
        Arc::new(MethodRef::new(
            Token::new(0x0600_0010),
            "Target",
            0x1234,
            MethodAttributes::empty(),
            vec![
                Param::value(SlotType::Primitive(Primitive::I4)),
                Param::value(SlotType::Opaque),
            ],
            returns,
        ))
    }

    #[test]
    fn instance_thunk_uses_has_this() {
        let builder = ThunkBuilder::new(
            instance_method(ReturnKind::Value(SlotType::Primitive(Primitive::I4))),
            0xDEAD_BEEF,
        );
        assert!(builder.has_this());

        let mut scope = RecordingScope::new();
        let body = builder.build(&mut scope).unwrap();

        let operations = decoder::decode_stream(&body.il, None, false).unwrap();
        let mnemonics: Vec<&str> = operations.iter().map(|op| op.opcode.mnemonic).collect();
        assert_eq!(
            mnemonics,
            vec!["ldarg", "ldarg", "ldarg", "ldc.i8", "conv.i", "calli", "box", "ret"]
        );
        assert_eq!(operations[3].operand, Operand::I64(0xDEAD_BEEF));

        // Receiver is implicit in the has-this signature.
        let blob = &scope.blobs[0];
        assert_eq!(blob[0], CALL_CONV_HAS_THIS);
        assert_eq!(blob[1], 2);
        assert_eq!(blob[2], 0x08);
        assert_eq!(&blob[3..], &[0x08, ELEMENT_I]);
    }

    #[test]
    fn static_thunk_uses_default_convention() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0011),
            "StaticTarget",
            0x1,
            MethodAttributes::STATIC,
            vec![Param::value(SlotType::Primitive(Primitive::R8))],
            ReturnKind::Void,
        ));
        let builder = ThunkBuilder::new(method, 0x1000);
        assert!(!builder.has_this());
        assert_eq!(builder.return_shape(), ThunkReturn::Void);

        let mut scope = RecordingScope::new();
        let body = builder.build(&mut scope).unwrap();
        let operations = decoder::decode_stream(&body.il, None, false).unwrap();

        // No boxing on the void path.
        assert!(!operations.iter().any(|op| op.opcode.mnemonic == "box"));

        let blob = &scope.blobs[0];
        assert_eq!(blob, &[CALL_CONV_DEFAULT, 1, ELEMENT_VOID, 0x0D]);
    }

    #[test]
    fn constructor_thunk_returns_void() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0012),
            ".ctor",
            0x2,
            MethodAttributes::CONSTRUCTOR,
            Vec::new(),
            ReturnKind::Void,
        ));
        let builder = ThunkBuilder::new(method, 0x2000);

        // Constructors call with the plain convention despite the receiver.
        assert!(!builder.has_this());
        assert_eq!(builder.return_shape(), ThunkReturn::Void);
        assert_eq!(builder.parameters().len(), 1);
    }

    #[test]
    fn opaque_return_boxes_as_address() {
        let builder = ThunkBuilder::new(
            instance_method(ReturnKind::Value(SlotType::Opaque)),
            0x3000,
        );
        assert_eq!(
            builder.return_shape(),
            ThunkReturn::Boxed(SlotType::Primitive(Primitive::IPtr))
        );
    }
}
