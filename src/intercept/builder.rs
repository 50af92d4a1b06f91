//! Trampoline synthesis.
//!
//! A trampoline is the replacement body compiled in place of an
//! intercepted method. It erases every argument to an address, packs the
//! addresses into an object array, hands the array together with the
//! method handle to a freshly constructed call state object, dispatches
//! through the interception entry point, blocks on the awaiter and
//! adapts the produced value back to the method's declared return shape.

use std::sync::Arc;

use crate::il::assembler::{BodyAssembler, TokenScope, WellKnownMember, WellKnownType};
use crate::il::body::{ElementType, MethodBody};
use crate::il::opcode::codes;
use crate::metadata::method::{MethodRef, Param, ReturnKind, SlotType};
use crate::Result;

/// Builds the interception trampoline for one method.
pub struct InterceptBuilder {
    method: Arc<MethodRef>,
}

impl InterceptBuilder {
    /// Create a builder for `method`.
    #[must_use]
    pub fn new(method: Arc<MethodRef>) -> Self {
        InterceptBuilder { method }
    }

    /// Whether the trampoline must hand a value back to its caller.
    #[must_use]
    pub fn has_return(&self) -> bool {
        self.method.returns.has_return()
    }

    /// The trampoline's parameter layout: an instantiation handle for
    /// generic methods, a receiver for instance methods, then the
    /// declared parameters.
    #[must_use]
    pub fn parameters(&self) -> Vec<Param> {
        let mut parameters = Vec::with_capacity(self.method.params.len() + 2);
        if self.method.is_generic() {
            parameters.push(Param::value(SlotType::Primitive(
                crate::metadata::method::Primitive::IPtr,
            )));
        }
        if !self.method.is_static() {
            parameters.push(Param::value(SlotType::Primitive(
                crate::metadata::method::Primitive::IPtr,
            )));
        }
        parameters.extend(self.method.params.iter().copied());
        parameters
    }

    /// Emit the trampoline body, minting tokens through `scope`.
    ///
    /// # Errors
    /// Propagates token minting failures from the scope.
    pub fn build(&self, scope: &mut dyn TokenScope) -> Result<MethodBody> {
        let mut asm = BodyAssembler::new();
        let parameters = self.parameters();
        let returns = self.method.returns;
        let slot = returns.intercept_slot();

        // Instance constructors must run the base initializer before
        // anything observes the receiver.
        if self.method.is_constructor() && !self.method.is_static() {
            asm.emit(codes::LDARG_0);
            asm.emit(codes::CALL);
            asm.emit_token(scope.member_token(WellKnownMember::ObjectCtor)?);
        }

        let args_local = asm.declare_local(ElementType::Object);
        asm.emit(codes::LDC_I4);
        asm.emit_i32(parameters.len() as i32);
        asm.emit(codes::NEWARR);
        asm.emit_token(scope.type_token(WellKnownType::Object)?);
        asm.emit(codes::STLOC_0);

        for (index, parameter) in parameters.iter().enumerate() {
            asm.emit(codes::LDLOC_S);
            asm.emit_u8(args_local as u8);
            asm.emit(codes::LDC_I4);
            asm.emit_i32(index as i32);

            // By-ref arguments already are addresses in the caller frame.
            if parameter.by_ref {
                asm.emit(codes::LDARG_S);
            } else {
                asm.emit(codes::LDARGA_S);
            }
            asm.emit_u8(index as u8);

            asm.emit(codes::MKREFANY);
            asm.emit_token(scope.type_token(slot_type_token(parameter.ty))?);
            asm.emit(codes::CALL);
            asm.emit_token(scope.member_token(WellKnownMember::RefFromTypedRef)?);
            asm.emit(codes::BOX);
            asm.emit_token(scope.type_token(WellKnownType::IntPtr)?);
            asm.emit(codes::STELEM_REF);
        }

        let awaiter_local = asm.declare_local(ElementType::ValueType);

        asm.emit(codes::LDC_I8);
        asm.emit_i64(self.method.handle as i64);
        asm.emit(codes::NEWOBJ);
        asm.emit_token(scope.member_token(WellKnownMember::IntPtrCtor)?);

        asm.emit(codes::LDLOCA_S);
        asm.emit_u8(args_local as u8);

        if self.method.needs_instantiation() {
            asm.emit(codes::LDC_I4_1);
        } else {
            asm.emit(codes::LDC_I4_0);
        }

        asm.emit(codes::NEWOBJ);
        asm.emit_token(scope.member_token(WellKnownMember::CallStateCtor)?);
        asm.emit(codes::DUP);

        // Typed dispatch whenever the caller must observe a real value:
        // any awaitable other than the bare lightweight shape, and any
        // fast-inlinable plain value.
        let typed = (returns.is_awaitable() && returns != ReturnKind::ValueTask)
            || returns.can_inline();
        asm.emit(codes::CALL);
        if typed {
            asm.emit_token(scope.member_token(WellKnownMember::InterceptCallOf(slot))?);
        } else {
            asm.emit_token(scope.member_token(WellKnownMember::InterceptCall)?);
        }

        asm.emit(codes::CALL);
        asm.emit_token(scope.member_token(WellKnownMember::GetAwaiter(slot))?);
        asm.emit(codes::STLOC_S);
        asm.emit_u8(awaiter_local as u8);
        asm.emit(codes::LDLOCA_S);
        asm.emit_u8(awaiter_local as u8);
        asm.emit(codes::CALL);
        asm.emit_token(scope.member_token(WellKnownMember::GetResult(slot))?);

        if self.has_return() {
            let ret_local = asm.declare_local(slot_element(slot));
            asm.emit(codes::STLOC_S);
            asm.emit_u8(ret_local as u8);
            asm.emit(codes::CALL);
            asm.emit_token(scope.member_token(WellKnownMember::DisposeCallState)?);
            asm.emit(codes::LDLOC_S);
            asm.emit_u8(ret_local as u8);

            match returns {
                ReturnKind::TaskOf(_) => {
                    asm.emit(codes::CALL);
                    asm.emit_token(scope.member_token(WellKnownMember::TaskFromResult(slot))?);
                }
                ReturnKind::ValueTaskOf(_) => {
                    asm.emit(codes::NEWOBJ);
                    asm.emit_token(scope.member_token(WellKnownMember::ValueTaskCtor(slot))?);
                }
                _ => {}
            }
        } else {
            asm.emit(codes::POP);
            asm.emit(codes::CALL);
            asm.emit_token(scope.member_token(WellKnownMember::DisposeCallState)?);

            match returns {
                ReturnKind::Task => {
                    asm.emit(codes::CALL);
                    asm.emit_token(scope.member_token(WellKnownMember::TaskCompleted)?);
                }
                ReturnKind::ValueTask => {
                    let default_local = asm.declare_local(ElementType::ValueType);
                    asm.emit(codes::LDLOCA_S);
                    asm.emit_u8(default_local as u8);
                    asm.emit_wide(codes::INITOBJ);
                    asm.emit_token(scope.type_token(WellKnownType::ValueTask)?);
                    asm.emit(codes::LDLOCA_S);
                    asm.emit_u8(default_local as u8);
                }
                _ => {}
            }
        }

        asm.emit(codes::RET);
        asm.require_stack(8);
        Ok(asm.finish())
    }
}

fn slot_type_token(slot: SlotType) -> WellKnownType {
    match slot {
        SlotType::Primitive(primitive) => WellKnownType::Primitive(primitive),
        SlotType::Opaque => WellKnownType::Object,
    }
}

fn slot_element(slot: SlotType) -> ElementType {
    use crate::metadata::method::Primitive::*;
    match slot {
        SlotType::Primitive(primitive) => match primitive {
            Bool => ElementType::Boolean,
            Char => ElementType::Char,
            I1 => ElementType::I1,
            U1 => ElementType::U1,
            I2 => ElementType::I2,
            U2 => ElementType::U2,
            I4 => ElementType::I4,
            U4 => ElementType::U4,
            I8 => ElementType::I8,
            U8 => ElementType::U8,
            R4 => ElementType::R4,
            R8 => ElementType::R8,
            IPtr => ElementType::I,
            UPtr => ElementType::U,
        },
        SlotType::Opaque => ElementType::Object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::decoder;
    use crate::il::operation::Operand;
    use crate::metadata::method::{MethodAttributes, Primitive};
    use crate::metadata::token::Token;
    use std::collections::HashMap;

    /// Scripted scope minting distinct, stable tokens per request.
    #[derive(Default)]
    struct ScriptedScope {
        types: HashMap<String, Token>,
        members: HashMap<String, Token>,
        next: u32,
    }

    impl ScriptedScope {
        fn mint(&mut self, table: u32) -> Token {
            self.next += 1;
            Token::new(table << 24 | self.next)
        }
    }

    impl TokenScope for ScriptedScope {
        fn type_token(&mut self, ty: WellKnownType) -> crate::Result<Token> {
            let key = format!("{ty:?}");
            if let Some(token) = self.types.get(&key) {
                return Ok(*token);
            }
            let token = self.mint(0x01);
            self.types.insert(key, token);
            Ok(token)
        }

        fn member_token(&mut self, member: WellKnownMember) -> crate::Result<Token> {
            let key = format!("{member:?}");
            if let Some(token) = self.members.get(&key) {
                return Ok(*token);
            }
            let token = self.mint(0x0A);
            self.members.insert(key, token);
            Ok(token)
        }

        fn signature_token(&mut self, _blob: &[u8]) -> crate::Result<Token> {
            Ok(self.mint(0x11))
        }
    }

    fn static_i4_method() -> Arc<MethodRef> {
        Arc::new(MethodRef::new(
            Token::new(0x0600_0001),
            "Compute",
            0x4242,
            MethodAttributes::STATIC,
            vec![
                Param::value(SlotType::Primitive(Primitive::I4)),
                Param::value(SlotType::Opaque),
            ],
            ReturnKind::Value(SlotType::Primitive(Primitive::I4)),
        ))
    }

    #[test]
    fn value_returning_trampoline_shape() {
        let builder = InterceptBuilder::new(static_i4_method());
        assert!(builder.has_return());

        let mut scope = ScriptedScope::default();
        let body = builder.build(&mut scope).unwrap();

        let operations = decoder::decode_stream(&body.il, None, false).unwrap();
        let mnemonics: Vec<&str> = operations.iter().map(|op| op.opcode.mnemonic).collect();

        // Array construction first, no base-initializer for a static.
        assert_eq!(&mnemonics[..3], &["ldc.i4", "newarr", "stloc.0"]);
        assert_eq!(
            operations[0].operand,
            Operand::I32(2),
            "two erased arguments"
        );

        // Each argument: load array, index, address, erase, pack.
        let per_arg = ["ldloc.s", "ldc.i4", "ldarga.s", "mkrefany", "call", "box", "stelem.ref"];
        assert_eq!(&mnemonics[3..10], &per_arg);
        assert_eq!(&mnemonics[10..17], &per_arg);

        // Call state construction and typed dispatch.
        let dispatch = &mnemonics[17..];
        assert_eq!(
            dispatch,
            &[
                "ldc.i8", "newobj", "ldloca.s", "ldc.i4.0", "newobj", "dup", "call", "call",
                "stloc.s", "ldloca.s", "call", "stloc.s", "call", "ldloc.s", "ret"
            ]
        );

        // The method handle rides in the i8 immediate.
        let handle = operations
            .iter()
            .find(|op| op.opcode.mnemonic == "ldc.i8")
            .unwrap();
        assert_eq!(handle.operand, Operand::I64(0x4242));

        // Locals: argument array, awaiter, return slot.
        assert_eq!(
            body.locals,
            vec![ElementType::Object, ElementType::ValueType, ElementType::I4]
        );
    }

    #[test]
    fn constructor_runs_base_initializer_first() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0002),
            ".ctor",
            0x99,
            MethodAttributes::CONSTRUCTOR,
            Vec::new(),
            ReturnKind::Void,
        ));
        let builder = InterceptBuilder::new(method);
        assert!(!builder.has_return());

        let mut scope = ScriptedScope::default();
        let body = builder.build(&mut scope).unwrap();
        let operations = decoder::decode_stream(&body.il, None, false).unwrap();

        assert_eq!(operations[0].opcode.mnemonic, "ldarg.0");
        assert_eq!(operations[1].opcode.mnemonic, "call");
        // Void path pops the dispatch result instead of storing it.
        assert!(operations.iter().any(|op| op.opcode.mnemonic == "pop"));
    }

    #[test]
    fn generic_flag_and_instantiation_parameter() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0003),
            "Generic",
            0x77,
            MethodAttributes::STATIC | MethodAttributes::GENERIC,
            vec![Param::value(SlotType::Opaque)],
            ReturnKind::Void,
        ));
        let builder = InterceptBuilder::new(method);

        // Instantiation handle precedes declared parameters.
        assert_eq!(builder.parameters().len(), 2);

        let mut scope = ScriptedScope::default();
        let body = builder.build(&mut scope).unwrap();
        let operations = decoder::decode_stream(&body.il, None, false).unwrap();
        assert!(operations.iter().any(|op| op.opcode.mnemonic == "ldc.i4.1"));
    }

    #[test]
    fn bare_value_task_defaults_out() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0004),
            "FireAndForget",
            0x55,
            MethodAttributes::STATIC,
            Vec::new(),
            ReturnKind::ValueTask,
        ));
        let builder = InterceptBuilder::new(method);
        assert!(!builder.has_return());

        let mut scope = ScriptedScope::default();
        let body = builder.build(&mut scope).unwrap();
        let operations = decoder::decode_stream(&body.il, None, false).unwrap();
        let mnemonics: Vec<&str> = operations.iter().map(|op| op.opcode.mnemonic).collect();

        // Defaulted lightweight awaitable flows out by address.
        let tail = &mnemonics[mnemonics.len() - 4..];
        assert_eq!(tail, &["ldloca.s", "initobj", "ldloca.s", "ret"]);
    }

    #[test]
    fn task_of_wraps_result_back() {
        let method = Arc::new(MethodRef::new(
            Token::new(0x0600_0005),
            "FetchAsync",
            0x66,
            MethodAttributes::STATIC,
            Vec::new(),
            ReturnKind::TaskOf(SlotType::Primitive(Primitive::I8)),
        ));
        let builder = InterceptBuilder::new(method);
        assert!(builder.has_return());

        let mut scope = ScriptedScope::default();
        let body = builder.build(&mut scope).unwrap();
        let operations = decoder::decode_stream(&body.il, None, false).unwrap();

        // Result is stored, state disposed, result reloaded and rewrapped.
        let mnemonics: Vec<&str> = operations.iter().map(|op| op.opcode.mnemonic).collect();
        let tail = &mnemonics[mnemonics.len() - 5..];
        assert_eq!(tail, &["stloc.s", "call", "ldloc.s", "call", "ret"]);
        assert_eq!(body.locals.last(), Some(&ElementType::I8));
    }
}
