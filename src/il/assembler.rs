//! Bytecode emission.
//!
//! [`BodyAssembler`] appends encoded instructions to a growing body and
//! tracks the locals the body declares. Token operands are minted by a
//! [`TokenScope`], which abstracts over the scope the synthesized body
//! will be compiled in; tests substitute a scripted scope.

use crate::il::body::{ElementType, MethodBody};
use crate::metadata::method::{Primitive, SlotType};
use crate::metadata::token::Token;
use crate::Result;

/// Types a synthesized body may need a token for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownType {
    /// The root object type.
    Object,
    /// Native-width pointer value type.
    IntPtr,
    /// The lightweight awaitable value type.
    ValueTask,
    /// A primitive value type.
    Primitive(Primitive),
}

/// Members a synthesized body may need a token for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownMember {
    /// Parameterless constructor of the root object type.
    ObjectCtor,
    /// Helper extracting the address held by a typed reference.
    RefFromTypedRef,
    /// Constructor taking a 64-bit value, producing a pointer value.
    IntPtrCtor,
    /// Constructor of the call state object: handle, argument buffer,
    /// generic flag.
    CallStateCtor,
    /// Untyped dispatch entry, returning an awaitable of object.
    InterceptCall,
    /// Typed dispatch entry instantiated at the given return slot.
    InterceptCallOf(SlotType),
    /// Obtain the awaiter of the pending dispatch at the given slot.
    GetAwaiter(SlotType),
    /// Block on the awaiter and fetch the produced value.
    GetResult(SlotType),
    /// Release the call state object.
    DisposeCallState,
    /// Wrap a finished value back into a heavyweight awaitable.
    TaskFromResult(SlotType),
    /// Getter for the already-completed heavyweight awaitable.
    TaskCompleted,
    /// Constructor wrapping a value into a lightweight awaitable.
    ValueTaskCtor(SlotType),
}

/// Source of metadata tokens for a synthesized body.
pub trait TokenScope {
    /// Token for a well-known type.
    ///
    /// # Errors
    /// [`crate::Error::ScopeResolution`] when the scope cannot produce
    /// a token for the type.
    fn type_token(&mut self, ty: WellKnownType) -> Result<Token>;

    /// Token for a well-known member.
    ///
    /// # Errors
    /// [`crate::Error::ScopeResolution`] when the scope cannot produce
    /// a token for the member.
    fn member_token(&mut self, member: WellKnownMember) -> Result<Token>;

    /// Token for a standalone signature blob.
    ///
    /// # Errors
    /// [`crate::Error::ScopeResolution`] when the scope cannot register
    /// the blob.
    fn signature_token(&mut self, blob: &[u8]) -> Result<Token>;
}

/// Append-only instruction encoder.
#[derive(Debug, Default)]
pub struct BodyAssembler {
    il: Vec<u8>,
    locals: Vec<ElementType>,
    max_stack: u32,
}

impl BodyAssembler {
    /// Start an empty body.
    #[must_use]
    pub fn new() -> Self {
        BodyAssembler::default()
    }

    /// Append a single-byte opcode.
    pub fn emit(&mut self, opcode: u8) {
        self.il.push(opcode);
    }

    /// Append an extended opcode carrying its prefix in the high byte.
    pub fn emit_wide(&mut self, opcode: u16) {
        self.il.push((opcode >> 8) as u8);
        self.il.push(opcode as u8);
    }

    /// Append an unsigned byte operand.
    pub fn emit_u8(&mut self, value: u8) {
        self.il.push(value);
    }

    /// Append a 16-bit operand, little-endian.
    pub fn emit_u16(&mut self, value: u16) {
        self.il.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a 32-bit immediate, little-endian.
    pub fn emit_i32(&mut self, value: i32) {
        self.il.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a 64-bit immediate, little-endian.
    pub fn emit_i64(&mut self, value: i64) {
        self.il.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a token operand, little-endian.
    pub fn emit_token(&mut self, token: Token) {
        self.il.extend_from_slice(&token.value().to_le_bytes());
    }

    /// Declare a local variable, returning its slot index.
    pub fn declare_local(&mut self, ty: ElementType) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// Raise the required stack depth to at least `depth`.
    pub fn require_stack(&mut self, depth: u32) {
        if depth > self.max_stack {
            self.max_stack = depth;
        }
    }

    /// Bytes emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.il.len()
    }

    /// True if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.il.is_empty()
    }

    /// Finish the body.
    #[must_use]
    pub fn finish(self) -> MethodBody {
        MethodBody {
            il: self.il,
            max_stack: self.max_stack.max(8),
            locals: self.locals,
        }
    }
}
