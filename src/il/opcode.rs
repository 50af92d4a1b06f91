//! Instruction opcode tables.
//!
//! The instruction set uses single-byte opcodes for the common encoding
//! space and a `0xFE`-prefixed second byte for the extended space. Each
//! table entry carries the mnemonic and the shape of the inline operand
//! that follows the opcode in the stream.

use crate::metadata::token::TokenKind;

/// Escape byte introducing the extended opcode space.
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// Shape of the inline operand following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand bytes.
    None,
    /// Signed 8-bit immediate.
    I8,
    /// Signed 32-bit immediate.
    I32,
    /// Signed 64-bit immediate.
    I64,
    /// 32-bit float immediate.
    F32,
    /// 64-bit float immediate.
    F64,
    /// Unsigned 8-bit variable or argument index.
    VarU8,
    /// Unsigned 16-bit variable or argument index.
    VarU16,
    /// Signed 8-bit branch displacement.
    BranchI8,
    /// Signed 32-bit branch displacement.
    BranchI32,
    /// Jump table: a u32 count followed by that many i32 displacements.
    Switch,
    /// Metadata token expected to resolve to the given entity shape.
    Token(TokenKind),
}

/// A decoded opcode table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode {
    /// Assembly mnemonic.
    pub mnemonic: &'static str,
    /// Inline operand shape.
    pub operand: OperandKind,
}

impl OpCode {
    /// Placeholder for undefined encodings.
    pub const INVALID: OpCode = OpCode {
        mnemonic: "",
        operand: OperandKind::None,
    };

    /// True if this entry corresponds to a defined encoding.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.mnemonic.is_empty()
    }
}

const fn op(mnemonic: &'static str, operand: OperandKind) -> OpCode {
    OpCode { mnemonic, operand }
}

/// Single-byte opcode table, indexed by the opcode byte.
pub static OPCODES: [OpCode; 256] = {
    use OperandKind::*;
    let mut t = [OpCode::INVALID; 256];
    t[0x00] = op("nop", None);
    t[0x01] = op("break", None);
    t[0x02] = op("ldarg.0", None);
    t[0x03] = op("ldarg.1", None);
    t[0x04] = op("ldarg.2", None);
    t[0x05] = op("ldarg.3", None);
    t[0x06] = op("ldloc.0", None);
    t[0x07] = op("ldloc.1", None);
    t[0x08] = op("ldloc.2", None);
    t[0x09] = op("ldloc.3", None);
    t[0x0A] = op("stloc.0", None);
    t[0x0B] = op("stloc.1", None);
    t[0x0C] = op("stloc.2", None);
    t[0x0D] = op("stloc.3", None);
    t[0x0E] = op("ldarg.s", VarU8);
    t[0x0F] = op("ldarga.s", VarU8);
    t[0x10] = op("starg.s", VarU8);
    t[0x11] = op("ldloc.s", VarU8);
    t[0x12] = op("ldloca.s", VarU8);
    t[0x13] = op("stloc.s", VarU8);
    t[0x14] = op("ldnull", None);
    t[0x15] = op("ldc.i4.m1", None);
    t[0x16] = op("ldc.i4.0", None);
    t[0x17] = op("ldc.i4.1", None);
    t[0x18] = op("ldc.i4.2", None);
    t[0x19] = op("ldc.i4.3", None);
    t[0x1A] = op("ldc.i4.4", None);
    t[0x1B] = op("ldc.i4.5", None);
    t[0x1C] = op("ldc.i4.6", None);
    t[0x1D] = op("ldc.i4.7", None);
    t[0x1E] = op("ldc.i4.8", None);
    t[0x1F] = op("ldc.i4.s", I8);
    t[0x20] = op("ldc.i4", I32);
    t[0x21] = op("ldc.i8", I64);
    t[0x22] = op("ldc.r4", F32);
    t[0x23] = op("ldc.r8", F64);
    t[0x25] = op("dup", None);
    t[0x26] = op("pop", None);
    t[0x27] = op("jmp", Token(TokenKind::Method));
    t[0x28] = op("call", Token(TokenKind::Method));
    t[0x29] = op("calli", Token(TokenKind::Signature));
    t[0x2A] = op("ret", None);
    t[0x2B] = op("br.s", BranchI8);
    t[0x2C] = op("brfalse.s", BranchI8);
    t[0x2D] = op("brtrue.s", BranchI8);
    t[0x2E] = op("beq.s", BranchI8);
    t[0x2F] = op("bge.s", BranchI8);
    t[0x30] = op("bgt.s", BranchI8);
    t[0x31] = op("ble.s", BranchI8);
    t[0x32] = op("blt.s", BranchI8);
    t[0x33] = op("bne.un.s", BranchI8);
    t[0x34] = op("bge.un.s", BranchI8);
    t[0x35] = op("bgt.un.s", BranchI8);
    t[0x36] = op("ble.un.s", BranchI8);
    t[0x37] = op("blt.un.s", BranchI8);
    t[0x38] = op("br", BranchI32);
    t[0x39] = op("brfalse", BranchI32);
    t[0x3A] = op("brtrue", BranchI32);
    t[0x3B] = op("beq", BranchI32);
    t[0x3C] = op("bge", BranchI32);
    t[0x3D] = op("bgt", BranchI32);
    t[0x3E] = op("ble", BranchI32);
    t[0x3F] = op("blt", BranchI32);
    t[0x40] = op("bne.un", BranchI32);
    t[0x41] = op("bge.un", BranchI32);
    t[0x42] = op("bgt.un", BranchI32);
    t[0x43] = op("ble.un", BranchI32);
    t[0x44] = op("blt.un", BranchI32);
    t[0x45] = op("switch", Switch);
    t[0x46] = op("ldind.i1", None);
    t[0x47] = op("ldind.u1", None);
    t[0x48] = op("ldind.i2", None);
    t[0x49] = op("ldind.u2", None);
    t[0x4A] = op("ldind.i4", None);
    t[0x4B] = op("ldind.u4", None);
    t[0x4C] = op("ldind.i8", None);
    t[0x4D] = op("ldind.i", None);
    t[0x4E] = op("ldind.r4", None);
    t[0x4F] = op("ldind.r8", None);
    t[0x50] = op("ldind.ref", None);
    t[0x51] = op("stind.ref", None);
    t[0x52] = op("stind.i1", None);
    t[0x53] = op("stind.i2", None);
    t[0x54] = op("stind.i4", None);
    t[0x55] = op("stind.i8", None);
    t[0x56] = op("stind.r4", None);
    t[0x57] = op("stind.r8", None);
    t[0x58] = op("add", None);
    t[0x59] = op("sub", None);
    t[0x5A] = op("mul", None);
    t[0x5B] = op("div", None);
    t[0x5C] = op("div.un", None);
    t[0x5D] = op("rem", None);
    t[0x5E] = op("rem.un", None);
    t[0x5F] = op("and", None);
    t[0x60] = op("or", None);
    t[0x61] = op("xor", None);
    t[0x62] = op("shl", None);
    t[0x63] = op("shr", None);
    t[0x64] = op("shr.un", None);
    t[0x65] = op("neg", None);
    t[0x66] = op("not", None);
    t[0x67] = op("conv.i1", None);
    t[0x68] = op("conv.i2", None);
    t[0x69] = op("conv.i4", None);
    t[0x6A] = op("conv.i8", None);
    t[0x6B] = op("conv.r4", None);
    t[0x6C] = op("conv.r8", None);
    t[0x6D] = op("conv.u4", None);
    t[0x6E] = op("conv.u8", None);
    t[0x6F] = op("callvirt", Token(TokenKind::Method));
    t[0x70] = op("cpobj", Token(TokenKind::Type));
    t[0x71] = op("ldobj", Token(TokenKind::Type));
    t[0x72] = op("ldstr", Token(TokenKind::String));
    t[0x73] = op("newobj", Token(TokenKind::Method));
    t[0x74] = op("castclass", Token(TokenKind::Type));
    t[0x75] = op("isinst", Token(TokenKind::Type));
    t[0x76] = op("conv.r.un", None);
    t[0x79] = op("unbox", Token(TokenKind::Type));
    t[0x7A] = op("throw", None);
    t[0x7B] = op("ldfld", Token(TokenKind::Field));
    t[0x7C] = op("ldflda", Token(TokenKind::Field));
    t[0x7D] = op("stfld", Token(TokenKind::Field));
    t[0x7E] = op("ldsfld", Token(TokenKind::Field));
    t[0x7F] = op("ldsflda", Token(TokenKind::Field));
    t[0x80] = op("stsfld", Token(TokenKind::Field));
    t[0x81] = op("stobj", Token(TokenKind::Type));
    t[0x82] = op("conv.ovf.i1.un", None);
    t[0x83] = op("conv.ovf.i2.un", None);
    t[0x84] = op("conv.ovf.i4.un", None);
    t[0x85] = op("conv.ovf.i8.un", None);
    t[0x86] = op("conv.ovf.u1.un", None);
    t[0x87] = op("conv.ovf.u2.un", None);
    t[0x88] = op("conv.ovf.u4.un", None);
    t[0x89] = op("conv.ovf.u8.un", None);
    t[0x8A] = op("conv.ovf.i.un", None);
    t[0x8B] = op("conv.ovf.u.un", None);
    t[0x8C] = op("box", Token(TokenKind::Type));
    t[0x8D] = op("newarr", Token(TokenKind::Type));
    t[0x8E] = op("ldlen", None);
    t[0x8F] = op("ldelema", Token(TokenKind::Type));
    t[0x90] = op("ldelem.i1", None);
    t[0x91] = op("ldelem.u1", None);
    t[0x92] = op("ldelem.i2", None);
    t[0x93] = op("ldelem.u2", None);
    t[0x94] = op("ldelem.i4", None);
    t[0x95] = op("ldelem.u4", None);
    t[0x96] = op("ldelem.i8", None);
    t[0x97] = op("ldelem.i", None);
    t[0x98] = op("ldelem.r4", None);
    t[0x99] = op("ldelem.r8", None);
    t[0x9A] = op("ldelem.ref", None);
    t[0x9B] = op("stelem.i", None);
    t[0x9C] = op("stelem.i1", None);
    t[0x9D] = op("stelem.i2", None);
    t[0x9E] = op("stelem.i4", None);
    t[0x9F] = op("stelem.i8", None);
    t[0xA0] = op("stelem.r4", None);
    t[0xA1] = op("stelem.r8", None);
    t[0xA2] = op("stelem.ref", None);
    t[0xA3] = op("ldelem", Token(TokenKind::Type));
    t[0xA4] = op("stelem", Token(TokenKind::Type));
    t[0xA5] = op("unbox.any", Token(TokenKind::Type));
    t[0xB3] = op("conv.ovf.i1", None);
    t[0xB4] = op("conv.ovf.u1", None);
    t[0xB5] = op("conv.ovf.i2", None);
    t[0xB6] = op("conv.ovf.u2", None);
    t[0xB7] = op("conv.ovf.i4", None);
    t[0xB8] = op("conv.ovf.u4", None);
    t[0xB9] = op("conv.ovf.i8", None);
    t[0xBA] = op("conv.ovf.u8", None);
    t[0xC2] = op("refanyval", Token(TokenKind::Type));
    t[0xC3] = op("ckfinite", None);
    t[0xC6] = op("mkrefany", Token(TokenKind::Type));
    t[0xD0] = op("ldtoken", Token(TokenKind::Member));
    t[0xD1] = op("conv.u2", None);
    t[0xD2] = op("conv.u1", None);
    t[0xD3] = op("conv.i", None);
    t[0xD4] = op("conv.ovf.i", None);
    t[0xD5] = op("conv.ovf.u", None);
    t[0xD6] = op("add.ovf", None);
    t[0xD7] = op("add.ovf.un", None);
    t[0xD8] = op("mul.ovf", None);
    t[0xD9] = op("mul.ovf.un", None);
    t[0xDA] = op("sub.ovf", None);
    t[0xDB] = op("sub.ovf.un", None);
    t[0xDC] = op("endfinally", None);
    t[0xDD] = op("leave", BranchI32);
    t[0xDE] = op("leave.s", BranchI8);
    t[0xDF] = op("stind.i", None);
    t[0xE0] = op("conv.u", None);
    t
};

/// Extended opcode table, indexed by the byte following [`EXTENDED_PREFIX`].
pub static OPCODES_EXTENDED: [OpCode; 0x1F] = {
    use OperandKind::*;
    let mut t = [OpCode::INVALID; 0x1F];
    t[0x00] = op("arglist", None);
    t[0x01] = op("ceq", None);
    t[0x02] = op("cgt", None);
    t[0x03] = op("cgt.un", None);
    t[0x04] = op("clt", None);
    t[0x05] = op("clt.un", None);
    t[0x06] = op("ldftn", Token(TokenKind::Method));
    t[0x07] = op("ldvirtftn", Token(TokenKind::Method));
    t[0x09] = op("ldarg", VarU16);
    t[0x0A] = op("ldarga", VarU16);
    t[0x0B] = op("starg", VarU16);
    t[0x0C] = op("ldloc", VarU16);
    t[0x0D] = op("ldloca", VarU16);
    t[0x0E] = op("stloc", VarU16);
    t[0x0F] = op("localloc", None);
    t[0x11] = op("endfilter", None);
    t[0x12] = op("unaligned.", I8);
    t[0x13] = op("volatile.", None);
    t[0x14] = op("tail.", None);
    t[0x15] = op("initobj", Token(TokenKind::Type));
    t[0x16] = op("constrained.", Token(TokenKind::Type));
    t[0x17] = op("cpblk", None);
    t[0x18] = op("initblk", None);
    t[0x19] = op("no.", I8);
    t[0x1A] = op("rethrow", None);
    t[0x1C] = op("sizeof", Token(TokenKind::Type));
    t[0x1D] = op("refanytype", None);
    t[0x1E] = op("readonly.", None);
    t
};

/// Look up a single-byte opcode. Returns `None` for undefined encodings
/// and for [`EXTENDED_PREFIX`] itself.
#[must_use]
pub fn lookup(byte: u8) -> Option<&'static OpCode> {
    if byte == EXTENDED_PREFIX {
        return None;
    }
    let entry = &OPCODES[byte as usize];
    entry.is_valid().then_some(entry)
}

/// Look up an extended opcode by its second byte.
#[must_use]
pub fn lookup_extended(byte: u8) -> Option<&'static OpCode> {
    let entry = OPCODES_EXTENDED.get(byte as usize)?;
    entry.is_valid().then_some(entry)
}

/// Raw encoding bytes for the opcodes the body builders emit. Extended
/// encodings carry the `0xFE` prefix in the high byte.
pub mod codes {
    /// `nop`
    pub const NOP: u8 = 0x00;
    /// `ldarg.0`
    pub const LDARG_0: u8 = 0x02;
    /// `stloc.0`
    pub const STLOC_0: u8 = 0x0A;
    /// `ldarg.s`
    pub const LDARG_S: u8 = 0x0E;
    /// `ldarga.s`
    pub const LDARGA_S: u8 = 0x0F;
    /// `ldloc.s`
    pub const LDLOC_S: u8 = 0x11;
    /// `ldloca.s`
    pub const LDLOCA_S: u8 = 0x12;
    /// `stloc.s`
    pub const STLOC_S: u8 = 0x13;
    /// `ldc.i4.0`
    pub const LDC_I4_0: u8 = 0x16;
    /// `ldc.i4.1`
    pub const LDC_I4_1: u8 = 0x17;
    /// `ldc.i4`
    pub const LDC_I4: u8 = 0x20;
    /// `ldc.i8`
    pub const LDC_I8: u8 = 0x21;
    /// `dup`
    pub const DUP: u8 = 0x25;
    /// `pop`
    pub const POP: u8 = 0x26;
    /// `call`
    pub const CALL: u8 = 0x28;
    /// `calli`
    pub const CALLI: u8 = 0x29;
    /// `ret`
    pub const RET: u8 = 0x2A;
    /// `and`
    pub const AND: u8 = 0x5F;
    /// `callvirt`
    pub const CALLVIRT: u8 = 0x6F;
    /// `newobj`
    pub const NEWOBJ: u8 = 0x73;
    /// `box`
    pub const BOX: u8 = 0x8C;
    /// `newarr`
    pub const NEWARR: u8 = 0x8D;
    /// `stelem.ref`
    pub const STELEM_REF: u8 = 0xA2;
    /// `mkrefany`
    pub const MKREFANY: u8 = 0xC6;
    /// `conv.i`
    pub const CONV_I: u8 = 0xD3;
    /// `ldarg`
    pub const LDARG: u16 = 0xFE09;
    /// `initobj`
    pub const INITOBJ: u16 = 0xFE15;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::TokenKind;

    #[test]
    fn single_byte_lookup() {
        let call = lookup(0x28).unwrap();
        assert_eq!(call.mnemonic, "call");
        assert_eq!(call.operand, OperandKind::Token(TokenKind::Method));

        let switch = lookup(0x45).unwrap();
        assert_eq!(switch.mnemonic, "switch");
        assert_eq!(switch.operand, OperandKind::Switch);

        assert!(lookup(0x24).is_none());
        assert!(lookup(EXTENDED_PREFIX).is_none());
    }

    #[test]
    fn extended_lookup() {
        let initobj = lookup_extended(0x15).unwrap();
        assert_eq!(initobj.mnemonic, "initobj");
        assert_eq!(initobj.operand, OperandKind::Token(TokenKind::Type));

        let ldarg = lookup_extended(0x09).unwrap();
        assert_eq!(ldarg.operand, OperandKind::VarU16);

        assert!(lookup_extended(0x08).is_none());
        assert!(lookup_extended(0x7F).is_none());
    }

    #[test]
    fn branch_shapes() {
        assert_eq!(lookup(0x2B).unwrap().operand, OperandKind::BranchI8);
        assert_eq!(lookup(0x38).unwrap().operand, OperandKind::BranchI32);
        assert_eq!(lookup(0xDD).unwrap().operand, OperandKind::BranchI32);
    }
}
