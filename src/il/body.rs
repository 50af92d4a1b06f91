//! Replacement method bodies.
//!
//! A [`MethodBody`] carries the bytecode, stack depth and local variable
//! layout handed to the host compiler when a compilation is rewritten.
//! Locals are described by a signature blob in the standard encoding:
//! a length byte, the local-signature calling convention byte, the local
//! count and one element type byte per local.

use crate::il::decoder;
use crate::il::operation::Operation;
use crate::Result;

/// Calling convention byte marking a local variable signature blob.
pub const LOCAL_SIG: u8 = 0x07;

/// Element type encodings used in local variable signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    /// No value.
    Void = 0x01,
    /// Boolean.
    Boolean = 0x02,
    /// UTF-16 code unit.
    Char = 0x03,
    /// Signed 8-bit integer.
    I1 = 0x04,
    /// Unsigned 8-bit integer.
    U1 = 0x05,
    /// Signed 16-bit integer.
    I2 = 0x06,
    /// Unsigned 16-bit integer.
    U2 = 0x07,
    /// Signed 32-bit integer.
    I4 = 0x08,
    /// Unsigned 32-bit integer.
    U4 = 0x09,
    /// Signed 64-bit integer.
    I8 = 0x0A,
    /// Unsigned 64-bit integer.
    U8 = 0x0B,
    /// 32-bit float.
    R4 = 0x0C,
    /// 64-bit float.
    R8 = 0x0D,
    /// String reference.
    String = 0x0E,
    /// Unmanaged pointer.
    Ptr = 0x0F,
    /// Managed reference.
    ByRef = 0x10,
    /// Value type, token follows in full signatures.
    ValueType = 0x11,
    /// Class reference, token follows in full signatures.
    Class = 0x12,
    /// Native-width signed integer.
    I = 0x18,
    /// Native-width unsigned integer.
    U = 0x19,
    /// Object reference.
    Object = 0x1C,
}

/// A bytecode body ready to be compiled in place of another.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Raw instruction bytes.
    pub il: Vec<u8>,
    /// Operand stack depth the body requires.
    pub max_stack: u32,
    /// Element types of the body's local variables, in slot order.
    pub locals: Vec<ElementType>,
}

impl MethodBody {
    /// Wrap raw bytecode with no locals and a default stack depth.
    #[must_use]
    pub fn new(il: Vec<u8>) -> Self {
        MethodBody {
            il,
            max_stack: 8,
            locals: Vec::new(),
        }
    }

    /// Set the required stack depth.
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Set the local variable layout.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<ElementType>) -> Self {
        self.locals = locals;
        self
    }

    /// Decode the body's instruction stream.
    ///
    /// # Errors
    /// Propagates any decode error from the stream.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        decoder::decode_stream(&self.il, None, false)
    }

    /// Build the local variable signature blob, or `None` when the body
    /// declares no locals.
    ///
    /// Layout: `[length, LOCAL_SIG, count, type...]` where `length` counts
    /// the bytes after the length byte itself.
    #[must_use]
    pub fn locals_signature(&self) -> Option<Vec<u8>> {
        if self.locals.is_empty() {
            return None;
        }

        let mut blob = Vec::with_capacity(3 + self.locals.len());
        blob.push((2 + self.locals.len()) as u8);
        blob.push(LOCAL_SIG);
        blob.push(self.locals.len() as u8);
        blob.extend(self.locals.iter().map(|ty| *ty as u8));
        Some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_blob_layout() {
        let body = MethodBody::new(vec![0x2A])
            .with_locals(vec![ElementType::I4, ElementType::Object, ElementType::I]);
        let blob = body.locals_signature().unwrap();
        assert_eq!(blob, vec![5, LOCAL_SIG, 3, 0x08, 0x1C, 0x18]);
    }

    #[test]
    fn no_locals_no_signature() {
        assert!(MethodBody::new(vec![0x2A]).locals_signature().is_none());
    }

    #[test]
    fn operations_round_trip() {
        let body = MethodBody::new(vec![0x17, 0x17, 0x5F, 0x2A]);
        let operations = body.operations().unwrap();
        assert_eq!(operations.len(), 4);
        assert_eq!(operations[2].opcode.mnemonic, "and");
    }
}
