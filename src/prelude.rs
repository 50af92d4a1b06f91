//! # jitscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the jitscope library. Import this module to get quick access to the essential
//! types for compiler instrumentation and bytecode work.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jitscope operations
pub use crate::Error;

/// The result type used throughout jitscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Main entry point for hooking the resident compiler
pub use crate::JitEngine;

/// Low-level bytecode parsing cursor
pub use crate::Parser;

// ================================================================================================
// Dispatch - Observers and Contexts
// ================================================================================================

/// Observer traits invoked from the compiler's dispatch path
pub use crate::jit::engine::{MethodObserver, TokenObserver};

/// Mutable views handed to observers during dispatch
pub use crate::jit::context::{MethodContext, ResolveMode, TokenContext, TokenRequestKind};

/// Host compiler abstraction and the request types that cross it
pub use crate::jit::host::{
    CompileOutcome, CompileRequest, CompiledCode, CorJitResult, HostJit, StringConstruction,
    StringRequest, TokenRequest,
};

// ================================================================================================
// Metadata System - Core Types
// ================================================================================================

/// Scope-relative metadata token and its table classification
pub use crate::metadata::token::{Token, TokenKind};

/// Resolved metadata entities
pub use crate::metadata::member::{FieldRef, Member, TypeRef};

/// Method identity and signature model
pub use crate::metadata::method::{
    MethodAttributes, MethodRef, Param, Primitive, ReturnKind, SlotType,
};

/// Modules and the scope-handle registry
pub use crate::metadata::module::{Module, ModuleBuilder, ModuleRegistry};

/// Token-to-entity resolution
pub use crate::metadata::resolver::{DynamicTokenResolver, ModuleTokenResolver, TokenResolver};

// ================================================================================================
// Bytecode - Decoding and Assembly
// ================================================================================================

/// Streaming decoder and one-shot stream decoding
pub use crate::il::decoder::{decode_stream, IlDecoder};

/// Decoded instructions and their operands
pub use crate::il::operation::{Operand, Operation};

/// Opcode descriptors and lookup
pub use crate::il::opcode::{lookup, lookup_extended, OpCode, OperandKind};

/// Method bodies, locals and the signature element types
pub use crate::il::body::{ElementType, MethodBody};

/// Incremental body construction and token minting
pub use crate::il::assembler::{BodyAssembler, TokenScope, WellKnownMember, WellKnownType};

// ================================================================================================
// Call Interception
// ================================================================================================

/// Trampoline and thunk body generation
pub use crate::intercept::{builder::InterceptBuilder, thunk::ThunkBuilder};

// ================================================================================================
// Host Runtime
// ================================================================================================

/// Discovered host runtime and its version
pub use crate::runtime::{HostRuntime, HostVersion};
