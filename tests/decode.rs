//! End-to-end bytecode decoding through the public API.

use std::sync::Arc;

use jitscope::prelude::*;

fn sample_module() -> Arc<Module> {
    Module::build("decode-sample")
        .with_method(MethodRef::parameterless(
            Token::new(0x0600_0001),
            "Callee",
            0x5000,
        ))
        .with_string(Token::new(0x7000_0001), "greeting")
        .finish()
}

#[test]
fn branchy_body_decodes_with_resolved_entities() {
    let resolver = ModuleTokenResolver::new(sample_module());

    #[rustfmt::skip]
    let body = [
        0x02,                               // IL_0000 ldarg.0
        0x2C, 0x05,                         // IL_0001 brfalse.s IL_0008
        0x28, 0x01, 0x00, 0x00, 0x06,      // IL_0003 call 0x06000001
        0x72, 0x01, 0x00, 0x00, 0x70,      // IL_0008 ldstr 0x70000001
        0x26,                               // IL_000d pop
        0x2A,                               // IL_000e ret
    ];

    let ops = decode_stream(&body, Some(&resolver), false).unwrap();
    assert_eq!(ops.len(), 6);

    assert_eq!(ops[0].opcode.mnemonic, "ldarg.0");
    assert_eq!(ops[0].index, 0);

    assert_eq!(ops[1].opcode.mnemonic, "brfalse.s");
    assert_eq!(ops[1].operand, Operand::Target(0x08));

    assert_eq!(ops[2].opcode.mnemonic, "call");
    match &ops[2].operand {
        Operand::Token { token, entity } => {
            assert_eq!(*token, Token::new(0x0600_0001));
            match entity {
                Some(Member::Method(method)) => assert_eq!(method.name, "Callee"),
                other => panic!("expected a method entity, got {other:?}"),
            }
        }
        other => panic!("expected a token operand, got {other:?}"),
    }

    match &ops[3].operand {
        Operand::Token {
            entity: Some(Member::String(content)),
            ..
        } => assert_eq!(&**content, "greeting"),
        other => panic!("expected a string entity, got {other:?}"),
    }

    assert_eq!(ops[5].opcode.mnemonic, "ret");
    assert_eq!(ops[5].index, 5);
    assert_eq!(ops[5].offset, 0x0E);
}

#[test]
fn unresolvable_field_token_fails_resolution() {
    let resolver = ModuleTokenResolver::new(sample_module());

    // ldfld on a token the module never declared
    let body = [0x7B, 0x63, 0x00, 0x00, 0x04, 0x2A];
    let result = decode_stream(&body, Some(&resolver), false);

    assert!(matches!(result, Err(Error::ScopeResolution(token)) if token.value() == 0x0400_0063));
}

#[test]
fn relaxed_decoding_softens_only_the_member_position() {
    let resolver = ModuleTokenResolver::new(sample_module());

    // ldtoken on an undeclared row degrades to an immediate in relaxed
    // mode; a shaped method token never does
    let member_body = [0xD0, 0x63, 0x00, 0x00, 0x06, 0x2A];
    let ops = decode_stream(&member_body, Some(&resolver), true).unwrap();
    assert_eq!(ops[0].operand, Operand::I32(0x0600_0063));
    assert_eq!(ops[1].opcode.mnemonic, "ret");

    let call_body = [0x28, 0x63, 0x00, 0x00, 0x06, 0x2A];
    let strict = decode_stream(&member_body, Some(&resolver), false);
    assert!(matches!(strict, Err(Error::ScopeResolution(_))));
    let relaxed = decode_stream(&call_body, Some(&resolver), true);
    assert!(matches!(relaxed, Err(Error::ScopeResolution(_))));
}

#[test]
fn operation_sizes_tile_the_stream() {
    #[rustfmt::skip]
    let body = [
        0x02,                               // ldarg.0
        0x1F, 0x2A,                         // ldc.i4.s 42
        0x20, 0x01, 0x00, 0x00, 0x00,      // ldc.i4 1
        0x2B, 0x00,                         // br.s +0
        0xFE, 0x09, 0x02, 0x00,            // ldarg 2
        0x2A,                               // ret
    ];

    let ops = decode_stream(&body, None, false).unwrap();

    let mut expected_offset = 0;
    for (position, op) in ops.iter().enumerate() {
        assert_eq!(op.index, position);
        assert_eq!(op.offset, expected_offset);
        expected_offset += op.size;
    }
    assert_eq!(expected_offset, body.len());
}

#[test]
fn raw_tokens_match_across_resolver_bindings() {
    let resolver = ModuleTokenResolver::new(sample_module());

    #[rustfmt::skip]
    let body = [
        0x28, 0x01, 0x00, 0x00, 0x06,      // call 0x06000001
        0x72, 0x01, 0x00, 0x00, 0x70,      // ldstr 0x70000001
        0x26,                               // pop
        0x2A,                               // ret
    ];

    let unbound = decode_stream(&body, None, false).unwrap();
    let bound = decode_stream(&body, Some(&resolver), false).unwrap();
    assert_eq!(unbound.len(), bound.len());

    for (raw_op, resolved_op) in unbound.iter().zip(&bound) {
        let (Operand::Token { token: raw, entity: None }, Operand::Token { token: resolved, .. }) =
            (&raw_op.operand, &resolved_op.operand)
        else {
            assert_eq!(raw_op.opcode.mnemonic, resolved_op.opcode.mnemonic);
            continue;
        };
        assert_eq!(raw, resolved);
    }
}

#[test]
fn switch_targets_stay_relative() {
    #[rustfmt::skip]
    let body = [
        0x16,                               // ldc.i4.0
        0x45, 0x02, 0x00, 0x00, 0x00,      // switch, 2 targets
        0x02, 0x00, 0x00, 0x00,            //   +2
        0xFB, 0xFF, 0xFF, 0xFF,            //   -5
        0x2A,                               // ret
    ];

    let ops = decode_stream(&body, None, false).unwrap();
    assert_eq!(ops[1].operand, Operand::Switch(vec![2, -5]));
}

#[test]
fn truncated_stream_is_malformed() {
    // ldc.i4 with only two of four operand bytes
    let result = decode_stream(&[0x20, 0x2A, 0x00], None, false);
    assert!(matches!(
        result,
        Err(Error::OutOfBounds) | Err(Error::Malformed { .. })
    ));
}

#[test]
fn display_renders_offsets_and_mnemonics() {
    let ops = decode_stream(&[0x00, 0x17, 0x2A], None, false).unwrap();
    let listing: Vec<String> = ops.iter().map(|op| op.to_string()).collect();

    assert_eq!(listing[0], "IL_0000: nop");
    assert_eq!(listing[1], "IL_0001: ldc.i4.1");
    assert_eq!(listing[2], "IL_0002: ret");
}
