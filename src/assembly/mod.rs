//! CIL instruction model.
//!
//! This module defines the instruction vocabulary the analysis consumes:
//!
//! - [`OpCode`] - every ECMA-335 opcode with mnemonic, encoding, operand and flow metadata
//! - [`Instruction`] / [`Operand`] - decoded instructions with absolute branch targets
//! - [`MethodBodyBuilder`] - assembles [`crate::metadata::body::MethodBody`] values with labels
//!
//! Decoding raw method bodies from a PE image is the host's concern; hosts hand the
//! analysis already-decoded instructions.

mod builder;
mod instruction;
mod opcode;

pub use builder::MethodBodyBuilder;
pub use instruction::{Instruction, Operand};
pub use opcode::{FlowType, OpCode, OperandType};
