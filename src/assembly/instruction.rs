//! Decoded CIL instructions.

use std::{fmt, sync::Arc};

use crate::{assembly::opcode::OpCode, metadata::token::Token};

/// The inline operand of a decoded instruction.
///
/// Branch displacements are stored as absolute offsets within the method body, and the
/// implicit operands of short forms (`ldloc.2`, `ldc.i4.3`) are left implicit; use
/// [`Instruction::local_index`], [`Instruction::argument_index`] and
/// [`Instruction::int_constant`] to read them uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 8- or 32-bit integer constant, sign-extended
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// Floating-point constant, widened to 64 bits
    Float64(f64),
    /// Local variable index
    Local(u16),
    /// Argument index (including `this` as 0 in instance methods)
    Argument(u16),
    /// Absolute branch target offset
    Target(u32),
    /// Absolute switch target offsets
    Switch(Vec<u32>),
    /// Metadata token
    Token(Token),
    /// User string contents for `ldstr`
    String(Arc<str>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, "{v}"),
            Operand::Int64(v) => write!(f, "{v}"),
            Operand::Float64(v) => write!(f, "{v}"),
            Operand::Local(i) => write!(f, "V_{i}"),
            Operand::Argument(i) => write!(f, "A_{i}"),
            Operand::Target(t) => write!(f, "IL_{t:04x}"),
            Operand::Switch(targets) => {
                write!(f, "(")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "IL_{t:04x}")?;
                }
                write!(f, ")")
            }
            Operand::Token(t) => write!(f, "{t}"),
            Operand::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset of the instruction within the method body
    pub offset: u32,
    /// The opcode
    pub opcode: OpCode,
    /// The inline operand
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(offset: u32, opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            offset,
            opcode,
            operand,
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        let operand = match &self.operand {
            Operand::Switch(targets) => 4 + targets.len() * 4,
            _ => self.opcode.operand_type().size(),
        };
        self.opcode.size() + operand
    }

    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        // Bodies are bounded well below u32::MAX.
        self.offset + self.size() as u32
    }

    /// Explicit branch targets (jump target or switch table), in operand order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Target(t) => vec![*t],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Local index for `ldloc*`, `stloc*` and `ldloca*`.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => match self.operand {
                Operand::Local(i) => Some(i),
                _ => None,
            },
        }
    }

    /// Argument index for `ldarg*`, `starg*` and `ldarga*`.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            _ => match self.operand {
                Operand::Argument(i) => Some(i),
                _ => None,
            },
        }
    }

    /// Constant pushed by the `ldc.i4` family.
    #[must_use]
    pub fn int_constant(&self) -> Option<i32> {
        match self.opcode {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI40 => Some(0),
            OpCode::LdcI41 => Some(1),
            OpCode::LdcI42 => Some(2),
            OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            OpCode::LdcI4S | OpCode::LdcI4 => match self.operand {
                Operand::Int32(v) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    /// Metadata token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.opcode)?;
        if self.operand != Operand::None {
            write!(f, " {}", self.operand)?;
        }
        Ok(())
    }
}
