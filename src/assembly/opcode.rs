//! The closed set of CIL opcodes (ECMA-335 III).
//!
//! Every opcode is a variant of [`OpCode`], generated from a single table that records the
//! mnemonic, the encoded value (`0xFExx` for two-byte opcodes), the inline operand kind and the
//! control-flow behaviour. The scanner matches on this enum exhaustively, so adding an
//! opcode here without handling it there is a compile error.

use strum::{EnumCount, EnumIter};

/// Encoding of the inline operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// 8-bit argument or local index
    ShortVar,
    /// 16-bit argument or local index
    Var,
    /// Signed 8-bit integer
    ShortInt,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit float
    ShortFloat,
    /// 64-bit float
    Float,
    /// Signed 8-bit branch displacement
    ShortBranch,
    /// Signed 32-bit branch displacement
    Branch,
    /// Jump table: count followed by 32-bit displacements
    Switch,
    /// Metadata token (type, method, field, signature)
    Token,
    /// User-string token
    String,
}

impl OperandType {
    /// Encoded size in bytes of the operand; for [`OperandType::Switch`] this is the size of
    /// the count only.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            OperandType::None => 0,
            OperandType::ShortVar | OperandType::ShortInt | OperandType::ShortBranch => 1,
            OperandType::Var => 2,
            OperandType::Int32
            | OperandType::ShortFloat
            | OperandType::Branch
            | OperandType::Switch
            | OperandType::Token
            | OperandType::String => 4,
            OperandType::Int64 | OperandType::Float => 8,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches to its target or falls through
    ConditionalBranch,
    /// Always branches to its target
    UnconditionalBranch,
    /// Calls a method, then falls through
    Call,
    /// Leaves the method (`ret`, `jmp`)
    Return,
    /// Jump table with fall-through default
    Switch,
    /// Raises an exception (`throw`, `rethrow`)
    Throw,
    /// Ends a `finally`, `fault` or `filter` region
    EndFinally,
    /// Leaves a protected region, emptying the stack
    Leave,
    /// Prefix modifying the following instruction
    Meta,
}

impl FlowType {
    /// Returns `true` if the instruction ends a basic block.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        !matches!(
            self,
            FlowType::Sequential | FlowType::Call | FlowType::Meta
        )
    }
}

macro_rules! opcodes {
    ($( $variant:ident => $mnemonic:literal, $value:literal, $operand:ident, $flow:ident; )*) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumCount)]
        #[allow(missing_docs)]
        pub enum OpCode {
            $( $variant, )*
        }

        impl OpCode {
            /// The assembler mnemonic, e.g. `ldc.i4.s`.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( OpCode::$variant => $mnemonic, )*
                }
            }

            /// The encoded value; two-byte opcodes include the `0xFE` prefix in the high byte.
            #[must_use]
            pub const fn value(self) -> u16 {
                match self {
                    $( OpCode::$variant => $value, )*
                }
            }

            /// The inline operand kind.
            #[must_use]
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $( OpCode::$variant => OperandType::$operand, )*
                }
            }

            /// The control-flow behaviour.
            #[must_use]
            pub const fn flow_type(self) -> FlowType {
                match self {
                    $( OpCode::$variant => FlowType::$flow, )*
                }
            }

            /// Looks up an opcode by its encoded value.
            #[must_use]
            pub const fn from_value(value: u16) -> Option<OpCode> {
                match value {
                    $( $value => Some(OpCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop => "nop", 0x00, None, Sequential;
    Break => "break", 0x01, None, Sequential;
    Ldarg0 => "ldarg.0", 0x02, None, Sequential;
    Ldarg1 => "ldarg.1", 0x03, None, Sequential;
    Ldarg2 => "ldarg.2", 0x04, None, Sequential;
    Ldarg3 => "ldarg.3", 0x05, None, Sequential;
    Ldloc0 => "ldloc.0", 0x06, None, Sequential;
    Ldloc1 => "ldloc.1", 0x07, None, Sequential;
    Ldloc2 => "ldloc.2", 0x08, None, Sequential;
    Ldloc3 => "ldloc.3", 0x09, None, Sequential;
    Stloc0 => "stloc.0", 0x0A, None, Sequential;
    Stloc1 => "stloc.1", 0x0B, None, Sequential;
    Stloc2 => "stloc.2", 0x0C, None, Sequential;
    Stloc3 => "stloc.3", 0x0D, None, Sequential;
    LdargS => "ldarg.s", 0x0E, ShortVar, Sequential;
    LdargaS => "ldarga.s", 0x0F, ShortVar, Sequential;
    StargS => "starg.s", 0x10, ShortVar, Sequential;
    LdlocS => "ldloc.s", 0x11, ShortVar, Sequential;
    LdlocaS => "ldloca.s", 0x12, ShortVar, Sequential;
    StlocS => "stloc.s", 0x13, ShortVar, Sequential;
    Ldnull => "ldnull", 0x14, None, Sequential;
    LdcI4M1 => "ldc.i4.m1", 0x15, None, Sequential;
    LdcI40 => "ldc.i4.0", 0x16, None, Sequential;
    LdcI41 => "ldc.i4.1", 0x17, None, Sequential;
    LdcI42 => "ldc.i4.2", 0x18, None, Sequential;
    LdcI43 => "ldc.i4.3", 0x19, None, Sequential;
    LdcI44 => "ldc.i4.4", 0x1A, None, Sequential;
    LdcI45 => "ldc.i4.5", 0x1B, None, Sequential;
    LdcI46 => "ldc.i4.6", 0x1C, None, Sequential;
    LdcI47 => "ldc.i4.7", 0x1D, None, Sequential;
    LdcI48 => "ldc.i4.8", 0x1E, None, Sequential;
    LdcI4S => "ldc.i4.s", 0x1F, ShortInt, Sequential;
    LdcI4 => "ldc.i4", 0x20, Int32, Sequential;
    LdcI8 => "ldc.i8", 0x21, Int64, Sequential;
    LdcR4 => "ldc.r4", 0x22, ShortFloat, Sequential;
    LdcR8 => "ldc.r8", 0x23, Float, Sequential;
    Dup => "dup", 0x25, None, Sequential;
    Pop => "pop", 0x26, None, Sequential;
    Jmp => "jmp", 0x27, Token, Return;
    Call => "call", 0x28, Token, Call;
    Calli => "calli", 0x29, Token, Call;
    Ret => "ret", 0x2A, None, Return;
    BrS => "br.s", 0x2B, ShortBranch, UnconditionalBranch;
    BrfalseS => "brfalse.s", 0x2C, ShortBranch, ConditionalBranch;
    BrtrueS => "brtrue.s", 0x2D, ShortBranch, ConditionalBranch;
    BeqS => "beq.s", 0x2E, ShortBranch, ConditionalBranch;
    BgeS => "bge.s", 0x2F, ShortBranch, ConditionalBranch;
    BgtS => "bgt.s", 0x30, ShortBranch, ConditionalBranch;
    BleS => "ble.s", 0x31, ShortBranch, ConditionalBranch;
    BltS => "blt.s", 0x32, ShortBranch, ConditionalBranch;
    BneUnS => "bne.un.s", 0x33, ShortBranch, ConditionalBranch;
    BgeUnS => "bge.un.s", 0x34, ShortBranch, ConditionalBranch;
    BgtUnS => "bgt.un.s", 0x35, ShortBranch, ConditionalBranch;
    BleUnS => "ble.un.s", 0x36, ShortBranch, ConditionalBranch;
    BltUnS => "blt.un.s", 0x37, ShortBranch, ConditionalBranch;
    Br => "br", 0x38, Branch, UnconditionalBranch;
    Brfalse => "brfalse", 0x39, Branch, ConditionalBranch;
    Brtrue => "brtrue", 0x3A, Branch, ConditionalBranch;
    Beq => "beq", 0x3B, Branch, ConditionalBranch;
    Bge => "bge", 0x3C, Branch, ConditionalBranch;
    Bgt => "bgt", 0x3D, Branch, ConditionalBranch;
    Ble => "ble", 0x3E, Branch, ConditionalBranch;
    Blt => "blt", 0x3F, Branch, ConditionalBranch;
    BneUn => "bne.un", 0x40, Branch, ConditionalBranch;
    BgeUn => "bge.un", 0x41, Branch, ConditionalBranch;
    BgtUn => "bgt.un", 0x42, Branch, ConditionalBranch;
    BleUn => "ble.un", 0x43, Branch, ConditionalBranch;
    BltUn => "blt.un", 0x44, Branch, ConditionalBranch;
    Switch => "switch", 0x45, Switch, Switch;
    LdindI1 => "ldind.i1", 0x46, None, Sequential;
    LdindU1 => "ldind.u1", 0x47, None, Sequential;
    LdindI2 => "ldind.i2", 0x48, None, Sequential;
    LdindU2 => "ldind.u2", 0x49, None, Sequential;
    LdindI4 => "ldind.i4", 0x4A, None, Sequential;
    LdindU4 => "ldind.u4", 0x4B, None, Sequential;
    LdindI8 => "ldind.i8", 0x4C, None, Sequential;
    LdindI => "ldind.i", 0x4D, None, Sequential;
    LdindR4 => "ldind.r4", 0x4E, None, Sequential;
    LdindR8 => "ldind.r8", 0x4F, None, Sequential;
    LdindRef => "ldind.ref", 0x50, None, Sequential;
    StindRef => "stind.ref", 0x51, None, Sequential;
    StindI1 => "stind.i1", 0x52, None, Sequential;
    StindI2 => "stind.i2", 0x53, None, Sequential;
    StindI4 => "stind.i4", 0x54, None, Sequential;
    StindI8 => "stind.i8", 0x55, None, Sequential;
    StindR4 => "stind.r4", 0x56, None, Sequential;
    StindR8 => "stind.r8", 0x57, None, Sequential;
    Add => "add", 0x58, None, Sequential;
    Sub => "sub", 0x59, None, Sequential;
    Mul => "mul", 0x5A, None, Sequential;
    Div => "div", 0x5B, None, Sequential;
    DivUn => "div.un", 0x5C, None, Sequential;
    Rem => "rem", 0x5D, None, Sequential;
    RemUn => "rem.un", 0x5E, None, Sequential;
    And => "and", 0x5F, None, Sequential;
    Or => "or", 0x60, None, Sequential;
    Xor => "xor", 0x61, None, Sequential;
    Shl => "shl", 0x62, None, Sequential;
    Shr => "shr", 0x63, None, Sequential;
    ShrUn => "shr.un", 0x64, None, Sequential;
    Neg => "neg", 0x65, None, Sequential;
    Not => "not", 0x66, None, Sequential;
    ConvI1 => "conv.i1", 0x67, None, Sequential;
    ConvI2 => "conv.i2", 0x68, None, Sequential;
    ConvI4 => "conv.i4", 0x69, None, Sequential;
    ConvI8 => "conv.i8", 0x6A, None, Sequential;
    ConvR4 => "conv.r4", 0x6B, None, Sequential;
    ConvR8 => "conv.r8", 0x6C, None, Sequential;
    ConvU4 => "conv.u4", 0x6D, None, Sequential;
    ConvU8 => "conv.u8", 0x6E, None, Sequential;
    Callvirt => "callvirt", 0x6F, Token, Call;
    Cpobj => "cpobj", 0x70, Token, Sequential;
    Ldobj => "ldobj", 0x71, Token, Sequential;
    Ldstr => "ldstr", 0x72, String, Sequential;
    Newobj => "newobj", 0x73, Token, Call;
    Castclass => "castclass", 0x74, Token, Sequential;
    Isinst => "isinst", 0x75, Token, Sequential;
    ConvRUn => "conv.r.un", 0x76, None, Sequential;
    Unbox => "unbox", 0x79, Token, Sequential;
    Throw => "throw", 0x7A, None, Throw;
    Ldfld => "ldfld", 0x7B, Token, Sequential;
    Ldflda => "ldflda", 0x7C, Token, Sequential;
    Stfld => "stfld", 0x7D, Token, Sequential;
    Ldsfld => "ldsfld", 0x7E, Token, Sequential;
    Ldsflda => "ldsflda", 0x7F, Token, Sequential;
    Stsfld => "stsfld", 0x80, Token, Sequential;
    Stobj => "stobj", 0x81, Token, Sequential;
    ConvOvfI1Un => "conv.ovf.i1.un", 0x82, None, Sequential;
    ConvOvfI2Un => "conv.ovf.i2.un", 0x83, None, Sequential;
    ConvOvfI4Un => "conv.ovf.i4.un", 0x84, None, Sequential;
    ConvOvfI8Un => "conv.ovf.i8.un", 0x85, None, Sequential;
    ConvOvfU1Un => "conv.ovf.u1.un", 0x86, None, Sequential;
    ConvOvfU2Un => "conv.ovf.u2.un", 0x87, None, Sequential;
    ConvOvfU4Un => "conv.ovf.u4.un", 0x88, None, Sequential;
    ConvOvfU8Un => "conv.ovf.u8.un", 0x89, None, Sequential;
    ConvOvfIUn => "conv.ovf.i.un", 0x8A, None, Sequential;
    ConvOvfUUn => "conv.ovf.u.un", 0x8B, None, Sequential;
    Box => "box", 0x8C, Token, Sequential;
    Newarr => "newarr", 0x8D, Token, Sequential;
    Ldlen => "ldlen", 0x8E, None, Sequential;
    Ldelema => "ldelema", 0x8F, Token, Sequential;
    LdelemI1 => "ldelem.i1", 0x90, None, Sequential;
    LdelemU1 => "ldelem.u1", 0x91, None, Sequential;
    LdelemI2 => "ldelem.i2", 0x92, None, Sequential;
    LdelemU2 => "ldelem.u2", 0x93, None, Sequential;
    LdelemI4 => "ldelem.i4", 0x94, None, Sequential;
    LdelemU4 => "ldelem.u4", 0x95, None, Sequential;
    LdelemI8 => "ldelem.i8", 0x96, None, Sequential;
    LdelemI => "ldelem.i", 0x97, None, Sequential;
    LdelemR4 => "ldelem.r4", 0x98, None, Sequential;
    LdelemR8 => "ldelem.r8", 0x99, None, Sequential;
    LdelemRef => "ldelem.ref", 0x9A, None, Sequential;
    StelemI => "stelem.i", 0x9B, None, Sequential;
    StelemI1 => "stelem.i1", 0x9C, None, Sequential;
    StelemI2 => "stelem.i2", 0x9D, None, Sequential;
    StelemI4 => "stelem.i4", 0x9E, None, Sequential;
    StelemI8 => "stelem.i8", 0x9F, None, Sequential;
    StelemR4 => "stelem.r4", 0xA0, None, Sequential;
    StelemR8 => "stelem.r8", 0xA1, None, Sequential;
    StelemRef => "stelem.ref", 0xA2, None, Sequential;
    Ldelem => "ldelem", 0xA3, Token, Sequential;
    Stelem => "stelem", 0xA4, Token, Sequential;
    UnboxAny => "unbox.any", 0xA5, Token, Sequential;
    ConvOvfI1 => "conv.ovf.i1", 0xB3, None, Sequential;
    ConvOvfU1 => "conv.ovf.u1", 0xB4, None, Sequential;
    ConvOvfI2 => "conv.ovf.i2", 0xB5, None, Sequential;
    ConvOvfU2 => "conv.ovf.u2", 0xB6, None, Sequential;
    ConvOvfI4 => "conv.ovf.i4", 0xB7, None, Sequential;
    ConvOvfU4 => "conv.ovf.u4", 0xB8, None, Sequential;
    ConvOvfI8 => "conv.ovf.i8", 0xB9, None, Sequential;
    ConvOvfU8 => "conv.ovf.u8", 0xBA, None, Sequential;
    Refanyval => "refanyval", 0xC2, Token, Sequential;
    Ckfinite => "ckfinite", 0xC3, None, Sequential;
    Mkrefany => "mkrefany", 0xC6, Token, Sequential;
    Ldtoken => "ldtoken", 0xD0, Token, Sequential;
    ConvU2 => "conv.u2", 0xD1, None, Sequential;
    ConvU1 => "conv.u1", 0xD2, None, Sequential;
    ConvI => "conv.i", 0xD3, None, Sequential;
    ConvOvfI => "conv.ovf.i", 0xD4, None, Sequential;
    ConvOvfU => "conv.ovf.u", 0xD5, None, Sequential;
    AddOvf => "add.ovf", 0xD6, None, Sequential;
    AddOvfUn => "add.ovf.un", 0xD7, None, Sequential;
    MulOvf => "mul.ovf", 0xD8, None, Sequential;
    MulOvfUn => "mul.ovf.un", 0xD9, None, Sequential;
    SubOvf => "sub.ovf", 0xDA, None, Sequential;
    SubOvfUn => "sub.ovf.un", 0xDB, None, Sequential;
    Endfinally => "endfinally", 0xDC, None, EndFinally;
    Leave => "leave", 0xDD, Branch, Leave;
    LeaveS => "leave.s", 0xDE, ShortBranch, Leave;
    StindI => "stind.i", 0xDF, None, Sequential;
    ConvU => "conv.u", 0xE0, None, Sequential;
    Arglist => "arglist", 0xFE00, None, Sequential;
    Ceq => "ceq", 0xFE01, None, Sequential;
    Cgt => "cgt", 0xFE02, None, Sequential;
    CgtUn => "cgt.un", 0xFE03, None, Sequential;
    Clt => "clt", 0xFE04, None, Sequential;
    CltUn => "clt.un", 0xFE05, None, Sequential;
    Ldftn => "ldftn", 0xFE06, Token, Sequential;
    Ldvirtftn => "ldvirtftn", 0xFE07, Token, Sequential;
    Ldarg => "ldarg", 0xFE09, Var, Sequential;
    Ldarga => "ldarga", 0xFE0A, Var, Sequential;
    Starg => "starg", 0xFE0B, Var, Sequential;
    Ldloc => "ldloc", 0xFE0C, Var, Sequential;
    Ldloca => "ldloca", 0xFE0D, Var, Sequential;
    Stloc => "stloc", 0xFE0E, Var, Sequential;
    Localloc => "localloc", 0xFE0F, None, Sequential;
    Endfilter => "endfilter", 0xFE11, None, EndFinally;
    Unaligned => "unaligned.", 0xFE12, ShortInt, Meta;
    Volatile => "volatile.", 0xFE13, None, Meta;
    Tail => "tail.", 0xFE14, None, Meta;
    Initobj => "initobj", 0xFE15, Token, Sequential;
    Constrained => "constrained.", 0xFE16, Token, Meta;
    Cpblk => "cpblk", 0xFE17, None, Sequential;
    Initblk => "initblk", 0xFE18, None, Sequential;
    No => "no.", 0xFE19, ShortInt, Meta;
    Rethrow => "rethrow", 0xFE1A, None, Throw;
    Sizeof => "sizeof", 0xFE1C, Token, Sequential;
    Refanytype => "refanytype", 0xFE1D, None, Sequential;
    Readonly => "readonly.", 0xFE1E, None, Meta;
}

impl OpCode {
    /// Size of the opcode itself in bytes (1 or 2).
    #[must_use]
    pub const fn size(self) -> usize {
        if self.value() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns `true` for branch-class opcodes carrying a target operand (including `leave`).
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.operand_type(),
            OperandType::ShortBranch | OperandType::Branch
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn values_and_mnemonics_are_unique() {
        let mut values = HashSet::new();
        let mut mnemonics = HashSet::new();
        for op in OpCode::iter() {
            assert!(values.insert(op.value()), "duplicate value for {op:?}");
            assert!(mnemonics.insert(op.mnemonic()), "duplicate mnemonic for {op:?}");
            assert_eq!(OpCode::from_value(op.value()), Some(op));
        }
        assert_eq!(values.len(), OpCode::COUNT);
    }

    #[test]
    fn two_byte_opcodes() {
        assert_eq!(OpCode::Ceq.size(), 2);
        assert_eq!(OpCode::Ldarg.operand_type(), OperandType::Var);
        assert_eq!(OpCode::Nop.size(), 1);
        assert_eq!(OpCode::from_value(0x24), None);
    }

    #[test]
    fn flow_classification() {
        assert!(OpCode::Ret.flow_type().ends_block());
        assert!(OpCode::LeaveS.flow_type().ends_block());
        assert!(OpCode::LeaveS.is_branch());
        assert!(!OpCode::Call.flow_type().ends_block());
        assert!(!OpCode::Constrained.flow_type().ends_block());
        assert_eq!(OpCode::Rethrow.flow_type(), FlowType::Throw);
        assert_eq!(OpCode::BrtrueS.flow_type(), FlowType::ConditionalBranch);
    }
}
