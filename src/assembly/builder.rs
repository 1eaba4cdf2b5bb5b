//! Assembling method bodies from opcodes and labels.
//!
//! [`MethodBodyBuilder`] is the programmatic way to produce a [`MethodBody`]: it assigns
//! encoded offsets as instructions are emitted, resolves named labels for branches, switch
//! tables and exception regions once the body is complete, and rejects operands that do not
//! fit the opcode.
//!
//! ```rust,ignore
//! use dotreach::assembly::{MethodBodyBuilder, OpCode};
//!
//! let mut builder = MethodBodyBuilder::new();
//! builder
//!     .ldarg(0)
//!     .branch(OpCode::BrfalseS, "else")
//!     .ldstr("a")
//!     .branch(OpCode::BrS, "end")
//!     .label("else")
//!     .ldstr("b")
//!     .label("end")
//!     .emit(OpCode::Ret);
//! let body = builder.build()?;
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    assembly::{
        instruction::{Instruction, Operand},
        opcode::{OpCode, OperandType},
    },
    metadata::{
        body::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        signatures::TypeSignature,
        token::Token,
    },
    Result,
};

#[derive(Debug, Clone)]
enum PendingOperand {
    Resolved(Operand),
    Label(String),
    Labels(Vec<String>),
}

#[derive(Debug, Clone)]
struct PendingInstruction {
    offset: u32,
    opcode: OpCode,
    operand: PendingOperand,
}

#[derive(Debug, Clone)]
struct PendingHandler {
    flags: ExceptionHandlerFlags,
    try_start: String,
    try_end: String,
    handler_start: String,
    handler_end: String,
    catch_type: Option<Token>,
    filter_start: Option<String>,
}

/// Incrementally assembles a [`MethodBody`].
///
/// Emission methods return `&mut Self` for chaining. Problems (operand of the wrong kind,
/// duplicate or undefined labels) are collected and reported by [`MethodBodyBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct MethodBodyBuilder {
    instructions: Vec<PendingInstruction>,
    labels: HashMap<String, u32>,
    handlers: Vec<PendingHandler>,
    locals: Vec<TypeSignature>,
    position: u32,
    max_stack: u16,
    errors: Vec<String>,
}

impl MethodBodyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        MethodBodyBuilder {
            max_stack: 8,
            ..Default::default()
        }
    }

    /// Declares a local variable and returns the builder.
    pub fn local(&mut self, signature: TypeSignature) -> &mut Self {
        self.locals.push(signature);
        self
    }

    /// Overrides the declared maximum stack depth.
    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.max_stack = max_stack;
        self
    }

    /// Current encoded offset.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Emits an opcode without operand.
    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.emit_with(opcode, Operand::None)
    }

    /// Emits an opcode with an explicit operand.
    ///
    /// Branch opcodes must be emitted through [`MethodBodyBuilder::branch`] or with an
    /// already-absolute [`Operand::Target`].
    pub fn emit_with(&mut self, opcode: OpCode, operand: Operand) -> &mut Self {
        if !operand_fits(opcode, &operand) {
            self.errors.push(format!(
                "operand {operand:?} does not fit {} at IL_{:04x}",
                opcode.mnemonic(),
                self.position
            ));
        }
        self.push(opcode, PendingOperand::Resolved(operand));
        self
    }

    /// Emits a branch to a named label.
    pub fn branch(&mut self, opcode: OpCode, label: &str) -> &mut Self {
        if !opcode.is_branch() {
            self.errors
                .push(format!("{} is not a branch opcode", opcode.mnemonic()));
        }
        self.push(opcode, PendingOperand::Label(label.to_string()));
        self
    }

    /// Emits a `switch` over named labels.
    pub fn switch(&mut self, labels: &[&str]) -> &mut Self {
        let labels = labels.iter().map(|l| (*l).to_string()).collect();
        self.push(OpCode::Switch, PendingOperand::Labels(labels));
        self
    }

    /// Places a label at the current position.
    pub fn label(&mut self, name: &str) -> &mut Self {
        if self
            .labels
            .insert(name.to_string(), self.position)
            .is_some()
        {
            self.errors.push(format!("label '{name}' defined twice"));
        }
        self
    }

    /// Registers an exception clause whose bounds are given as labels.
    ///
    /// `try_end` and `handler_end` label the first instruction after the region.
    pub fn handler(
        &mut self,
        flags: ExceptionHandlerFlags,
        try_region: (&str, &str),
        handler_region: (&str, &str),
        catch_type: Option<Token>,
        filter_start: Option<&str>,
    ) -> &mut Self {
        self.handlers.push(PendingHandler {
            flags,
            try_start: try_region.0.to_string(),
            try_end: try_region.1.to_string(),
            handler_start: handler_region.0.to_string(),
            handler_end: handler_region.1.to_string(),
            catch_type,
            filter_start: filter_start.map(str::to_string),
        });
        self
    }

    /// Emits the shortest `ldc.i4` form for `value`.
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.emit(OpCode::LdcI4M1),
            0 => self.emit(OpCode::LdcI40),
            1 => self.emit(OpCode::LdcI41),
            2 => self.emit(OpCode::LdcI42),
            3 => self.emit(OpCode::LdcI43),
            4 => self.emit(OpCode::LdcI44),
            5 => self.emit(OpCode::LdcI45),
            6 => self.emit(OpCode::LdcI46),
            7 => self.emit(OpCode::LdcI47),
            8 => self.emit(OpCode::LdcI48),
            v if i8::try_from(v).is_ok() => self.emit_with(OpCode::LdcI4S, Operand::Int32(v)),
            v => self.emit_with(OpCode::LdcI4, Operand::Int32(v)),
        }
    }

    /// Emits `ldstr`.
    pub fn ldstr(&mut self, value: &str) -> &mut Self {
        self.emit_with(OpCode::Ldstr, Operand::String(Arc::from(value)))
    }

    /// Emits the shortest `ldarg` form.
    pub fn ldarg(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.emit(OpCode::Ldarg0),
            1 => self.emit(OpCode::Ldarg1),
            2 => self.emit(OpCode::Ldarg2),
            3 => self.emit(OpCode::Ldarg3),
            i if i <= 0xFF => self.emit_with(OpCode::LdargS, Operand::Argument(i)),
            i => self.emit_with(OpCode::Ldarg, Operand::Argument(i)),
        }
    }

    /// Emits the shortest `ldloc` form.
    pub fn ldloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.emit(OpCode::Ldloc0),
            1 => self.emit(OpCode::Ldloc1),
            2 => self.emit(OpCode::Ldloc2),
            3 => self.emit(OpCode::Ldloc3),
            i if i <= 0xFF => self.emit_with(OpCode::LdlocS, Operand::Local(i)),
            i => self.emit_with(OpCode::Ldloc, Operand::Local(i)),
        }
    }

    /// Emits the shortest `stloc` form.
    pub fn stloc(&mut self, index: u16) -> &mut Self {
        match index {
            0 => self.emit(OpCode::Stloc0),
            1 => self.emit(OpCode::Stloc1),
            2 => self.emit(OpCode::Stloc2),
            3 => self.emit(OpCode::Stloc3),
            i if i <= 0xFF => self.emit_with(OpCode::StlocS, Operand::Local(i)),
            i => self.emit_with(OpCode::Stloc, Operand::Local(i)),
        }
    }

    /// Emits `starg.s` or `starg`.
    pub fn starg(&mut self, index: u16) -> &mut Self {
        if index <= 0xFF {
            self.emit_with(OpCode::StargS, Operand::Argument(index))
        } else {
            self.emit_with(OpCode::Starg, Operand::Argument(index))
        }
    }

    /// Emits `ldarga.s` or `ldarga`.
    pub fn ldarga(&mut self, index: u16) -> &mut Self {
        if index <= 0xFF {
            self.emit_with(OpCode::LdargaS, Operand::Argument(index))
        } else {
            self.emit_with(OpCode::Ldarga, Operand::Argument(index))
        }
    }

    /// Emits `ldloca.s` or `ldloca`.
    pub fn ldloca(&mut self, index: u16) -> &mut Self {
        if index <= 0xFF {
            self.emit_with(OpCode::LdlocaS, Operand::Local(index))
        } else {
            self.emit_with(OpCode::Ldloca, Operand::Local(index))
        }
    }

    /// Emits an opcode taking a metadata token (`call`, `newobj`, `ldfld`, `ldtoken`, ...).
    pub fn token(&mut self, opcode: OpCode, token: Token) -> &mut Self {
        self.emit_with(opcode, Operand::Token(token))
    }

    /// Emits `call`.
    pub fn call(&mut self, method: Token) -> &mut Self {
        self.token(OpCode::Call, method)
    }

    /// Emits `callvirt`.
    pub fn callvirt(&mut self, method: Token) -> &mut Self {
        self.token(OpCode::Callvirt, method)
    }

    /// Finishes the body, resolving labels.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an operand did not fit its opcode, a label was
    /// defined twice, or a referenced label was never placed.
    pub fn build(&self) -> Result<MethodBody> {
        if let Some(first) = self.errors.first() {
            return Err(malformed_error!(first.clone()));
        }

        let mut instructions = Vec::with_capacity(self.instructions.len());
        for pending in &self.instructions {
            let operand = match &pending.operand {
                PendingOperand::Resolved(operand) => operand.clone(),
                PendingOperand::Label(label) => Operand::Target(self.resolve(label)?),
                PendingOperand::Labels(labels) => Operand::Switch(
                    labels
                        .iter()
                        .map(|l| self.resolve(l))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            instructions.push(Instruction::new(pending.offset, pending.opcode, operand));
        }

        let mut exception_handlers = Vec::with_capacity(self.handlers.len());
        for handler in &self.handlers {
            let try_offset = self.resolve(&handler.try_start)?;
            let handler_offset = self.resolve(&handler.handler_start)?;
            let filter_offset = match &handler.filter_start {
                Some(label) => Some(self.resolve(label)?),
                None => None,
            };
            exception_handlers.push(ExceptionHandler {
                flags: handler.flags,
                try_offset,
                try_length: self.resolve(&handler.try_end)?.saturating_sub(try_offset),
                handler_offset,
                handler_length: self
                    .resolve(&handler.handler_end)?
                    .saturating_sub(handler_offset),
                catch_type: handler.catch_type,
                filter_offset,
            });
        }

        Ok(MethodBody {
            max_stack: self.max_stack,
            init_locals: true,
            locals: self.locals.clone(),
            instructions,
            exception_handlers,
        })
    }

    fn resolve(&self, label: &str) -> Result<u32> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| malformed_error!("label '{}' is never defined", label))
    }

    fn push(&mut self, opcode: OpCode, operand: PendingOperand) {
        let operand_size = match &operand {
            PendingOperand::Labels(labels) => 4 + labels.len() * 4,
            _ => opcode.operand_type().size(),
        };
        self.instructions.push(PendingInstruction {
            offset: self.position,
            opcode,
            operand,
        });
        self.position += (opcode.size() + operand_size) as u32;
    }
}

fn operand_fits(opcode: OpCode, operand: &Operand) -> bool {
    match (opcode.operand_type(), operand) {
        (OperandType::None, Operand::None) => true,
        (OperandType::ShortVar | OperandType::Var, Operand::Local(_) | Operand::Argument(_)) => {
            true
        }
        (OperandType::ShortInt, Operand::Int32(v)) => i8::try_from(*v).is_ok(),
        (OperandType::Int32, Operand::Int32(_)) => true,
        (OperandType::Int64, Operand::Int64(_)) => true,
        (OperandType::ShortFloat | OperandType::Float, Operand::Float64(_)) => true,
        (OperandType::ShortBranch | OperandType::Branch, Operand::Target(_)) => true,
        (OperandType::Switch, Operand::Switch(_)) => true,
        (OperandType::Token, Operand::Token(_)) => true,
        (OperandType::String, Operand::String(_)) => true,
        _ => false,
    }
}
