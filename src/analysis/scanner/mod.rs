//! The per-method abstract interpreter.
//!
//! [`MethodScanner`] is the [`DataFlowAnalysis`] the solver iterates over one method body.
//! Its transfer function interprets every instruction of a block on a
//! [`DataflowState`]: loads and stores move value sets between the evaluation stack and
//! the variables, calls are routed through the intrinsic handlers with effects disabled,
//! and everything that needs marking or reporting is recorded as a [`Pattern`].
//!
//! Once the solver has converged, [`MethodScanner::apply_patterns`] replays the recorded
//! patterns in offset order with effects enabled, so each pattern marks and reports
//! exactly once and only against the final state of its block.
//!
//! # Locations
//!
//! Addresses (`ldloca`, `ldarga`, `ldflda`, `ldelema`, by-ref parameters) are modeled as
//! [`ReferenceKind`] values. They may sit on the stack but are never stored in a variable:
//! every store dereferences first. A store through an address with a single possible
//! target replaces the target's value, a store through several possible targets merges
//! into each of them.

mod calls;
mod patterns;

pub use patterns::{Pattern, PatternLog};

use std::{collections::BTreeMap, sync::Arc};

use log::trace;

use crate::{
    analysis::{
        caches::MethodAnnotations,
        cfg::{BasicBlock, BlockId, ControlFlowGraph},
        context::MethodContext,
        dataflow::{DataFlowAnalysis, DataflowState, LocalKey, OperandStack},
        requirements::RequirementTarget,
        value::{
            AbstractValue, ArraySite, ArrayValue, FieldValue, MultiValue, ParameterValue,
            ReferenceKind, ThisValue,
        },
    },
    assembly::{Instruction, OpCode, Operand},
    host::AnalysisHost,
    metadata::{body::MethodBody, signatures::TypeSignature, token::Token},
    Result,
};

/// Abstract interpreter for one method under one instantiation.
pub struct MethodScanner<'c, 'a, H: ?Sized> {
    ctx: &'c MethodContext<'a, H>,
    body: &'c MethodBody,
    annotations: Arc<MethodAnnotations>,
    params: Vec<TypeSignature>,
    patterns: PatternLog,
    returns: BTreeMap<u32, MultiValue>,
    block: BlockId,
}

impl<'c, 'a, H: AnalysisHost + ?Sized> MethodScanner<'c, 'a, H> {
    /// Creates a scanner for `body`, the body of `ctx.method`.
    pub fn new(ctx: &'c MethodContext<'a, H>, body: &'c MethodBody, cfg: &ControlFlowGraph) -> Self {
        let params = ctx
            .method
            .signature
            .params
            .iter()
            .map(|param| ctx.substitute(param))
            .collect();
        MethodScanner {
            ctx,
            body,
            annotations: ctx.annotations(),
            params,
            patterns: PatternLog::default(),
            returns: BTreeMap::new(),
            block: cfg.entry(),
        }
    }

    /// Patterns recorded so far.
    pub fn patterns(&self) -> &PatternLog {
        &self.patterns
    }

    /// Everything the method may return, merged over its `ret` instructions.
    ///
    /// Empty for `void` methods and for methods that never return.
    pub fn return_value(&self) -> MultiValue {
        self.returns
            .values()
            .fold(MultiValue::empty(), |acc, value| acc.merge(value))
    }

    /// Applies every recorded pattern in offset order with effects enabled.
    ///
    /// Returns the number of applied patterns.
    pub fn apply_patterns(&self) -> usize {
        for (offset, pattern) in self.patterns.iter() {
            pattern.apply(self.ctx, offset);
        }
        self.patterns.len()
    }

    fn has_this(&self) -> bool {
        self.ctx.method.has_this()
    }

    /// Declared parameter index of an IL argument index.
    fn parameter_index(&self, argument: u16) -> Option<usize> {
        let index = if self.has_this() {
            argument.checked_sub(1)?
        } else {
            argument
        };
        let index = usize::from(index);
        (index < self.params.len()).then_some(index)
    }

    fn parameter_value(&self, index: usize) -> AbstractValue {
        AbstractValue::MethodParameter(ParameterValue {
            method: self.ctx.token(),
            index: u16::try_from(index).unwrap_or(u16::MAX),
            requirement: self.annotations.parameter(index),
            declared_type: self
                .params
                .get(index)
                .map_or(TypeSignature::Object, |p| p.strip_by_ref().clone()),
        })
    }

    fn this_value(&self) -> AbstractValue {
        let declaring = self.ctx.method.declaring_type;
        let declared_type = self
            .ctx
            .host
            .type_signature(declaring)
            .map_or(TypeSignature::Class(declaring), |s| self.ctx.substitute(&s));
        AbstractValue::MethodThisParameter(ThisValue {
            method: self.ctx.token(),
            requirement: self.annotations.this,
            declared_type,
        })
    }

    fn entry_state(&self) -> DataflowState {
        let mut state = DataflowState::new();
        let first = if self.has_this() {
            state
                .locals
                .set(LocalKey::Argument(0), MultiValue::single(self.this_value()));
            1
        } else {
            0
        };
        for index in 0..self.params.len() {
            let Ok(argument) = u16::try_from(index + first) else {
                break;
            };
            state.locals.set(
                LocalKey::Argument(argument),
                MultiValue::single(self.parameter_value(index)),
            );
        }
        state
    }

    fn invalid(&mut self, offset: u32, reason: impl Into<String>) {
        let reason = reason.into();
        trace!("invalid IL at IL_{offset:04x} in {}: {reason}", self.ctx.token());
        self.patterns.record(offset, Pattern::InvalidIl { reason });
    }

    fn pop(&mut self, state: &mut DataflowState, offset: u32) -> MultiValue {
        match state.stack.pop() {
            Some(value) => value,
            None => {
                self.invalid(offset, "evaluation stack underflow");
                MultiValue::unknown()
            }
        }
    }

    fn pop_n(&mut self, state: &mut DataflowState, offset: u32, count: usize) {
        for _ in 0..count {
            self.pop(state, offset);
        }
    }

    /// Pops a value and dereferences any addresses in it.
    fn pop_value(&mut self, state: &mut DataflowState, offset: u32) -> MultiValue {
        let value = self.pop(state, offset);
        self.dereference(value, state)
    }

    /// Replaces every address in `value` with the contents of its location.
    fn dereference(&self, value: MultiValue, state: &DataflowState) -> MultiValue {
        if !value
            .iter()
            .any(|v| matches!(v, AbstractValue::Reference(_)))
        {
            return value;
        }
        value.flat_map(|v| match v {
            AbstractValue::Reference(kind) => self.read_location(kind, state),
            other => MultiValue::single(other.clone()),
        })
    }

    /// Contents of the locations `address` may point to; non-addresses read as unknown.
    fn read_through(&self, address: &MultiValue, state: &DataflowState) -> MultiValue {
        address.flat_map(|v| match v {
            AbstractValue::Reference(kind) => self.read_location(kind, state),
            _ => MultiValue::unknown(),
        })
    }

    fn read_location(&self, kind: &ReferenceKind, state: &DataflowState) -> MultiValue {
        match kind {
            ReferenceKind::Local(index) => state.locals.get(&LocalKey::Local(*index)),
            ReferenceKind::Argument(index) => state.locals.get(&LocalKey::Argument(*index)),
            ReferenceKind::This => state.locals.get(&LocalKey::Argument(0)),
            ReferenceKind::Field(token) => self.load_field(*token),
            ReferenceKind::ArrayElement { site, index } => {
                let versions = state.array_versions(*site);
                match (merge_versions(&versions), index) {
                    (Some(array), Some(index)) => array.element(*index),
                    _ => MultiValue::unknown(),
                }
            }
            ReferenceKind::ParameterTarget(index) => {
                MultiValue::single(self.parameter_value(usize::from(*index)))
            }
            ReferenceKind::ReturnSlot(_) => MultiValue::unknown(),
        }
    }

    /// Stores `value` through every address in `address`.
    fn store_indirect(
        &mut self,
        address: &MultiValue,
        value: MultiValue,
        state: &mut DataflowState,
        offset: u32,
    ) {
        let strong = address.len() == 1;
        for target in address.iter() {
            if let AbstractValue::Reference(kind) = target {
                self.write_location(kind, value.clone(), strong, state, offset);
            }
        }
    }

    fn write_location(
        &mut self,
        kind: &ReferenceKind,
        value: MultiValue,
        strong: bool,
        state: &mut DataflowState,
        offset: u32,
    ) {
        match kind {
            ReferenceKind::Local(index) => {
                let key = LocalKey::Local(*index);
                let value = if strong {
                    value
                } else {
                    state.locals.get(&key).merge(&value)
                };
                state.locals.set(key, value);
            }
            ReferenceKind::Argument(index) => {
                self.store_argument(*index, value, strong, state, offset);
            }
            ReferenceKind::This => self.store_argument(0, value, strong, state, offset),
            ReferenceKind::Field(token) => self.store_field(*token, value, offset),
            ReferenceKind::ArrayElement { site, index } => {
                let versions = state.array_versions(*site);
                self.store_into_versions(&versions, *index, &value, state);
            }
            ReferenceKind::ParameterTarget(index) => {
                let index = usize::from(*index);
                let required = self.annotations.parameter(index);
                if !required.is_empty() {
                    self.patterns.record(
                        offset,
                        Pattern::Assignment {
                            value,
                            required,
                            target: RequirementTarget::parameter(&self.ctx.method, index),
                        },
                    );
                }
            }
            ReferenceKind::ReturnSlot(_) => {}
        }
    }

    fn load_argument(&self, argument: u16, state: &DataflowState) -> MultiValue {
        match self.parameter_index(argument) {
            Some(index) if self.params[index].is_by_ref() => MultiValue::single(
                AbstractValue::Reference(ReferenceKind::ParameterTarget(
                    u16::try_from(index).unwrap_or(u16::MAX),
                )),
            ),
            _ => state.locals.get(&LocalKey::Argument(argument)),
        }
    }

    fn argument_address(&self, argument: u16) -> AbstractValue {
        if argument == 0 && self.has_this() {
            AbstractValue::Reference(ReferenceKind::This)
        } else {
            AbstractValue::Reference(ReferenceKind::Argument(argument))
        }
    }

    fn store_argument(
        &mut self,
        argument: u16,
        value: MultiValue,
        strong: bool,
        state: &mut DataflowState,
        offset: u32,
    ) {
        let target = if argument == 0 && self.has_this() {
            (!self.annotations.this.is_empty())
                .then(|| (self.annotations.this, RequirementTarget::this(&self.ctx.method)))
        } else {
            self.parameter_index(argument).and_then(|index| {
                let required = self.annotations.parameter(index);
                (!required.is_empty())
                    .then(|| (required, RequirementTarget::parameter(&self.ctx.method, index)))
            })
        };
        if let Some((required, target)) = target {
            self.patterns.record(
                offset,
                Pattern::Assignment {
                    value: value.clone(),
                    required,
                    target,
                },
            );
        }
        let key = LocalKey::Argument(argument);
        let value = if strong {
            value
        } else {
            state.locals.get(&key).merge(&value)
        };
        state.locals.set(key, value);
    }

    /// The value a field load produces.
    ///
    /// The host may know the field's contents; otherwise the load yields a field
    /// placeholder carrying the field's annotation.
    fn load_field(&self, token: Token) -> MultiValue {
        let host = self.ctx.host;
        let Some(field) = host.resolve_field(token) else {
            return MultiValue::unknown();
        };
        if let Some(value) = host.field_value(field.token) {
            return value;
        }
        MultiValue::single(AbstractValue::FieldValue(FieldValue {
            field: field.token,
            requirement: host.field_requirement(field.token),
            declared_type: self.ctx.substitute(&field.signature),
        }))
    }

    fn store_field(&mut self, token: Token, value: MultiValue, offset: u32) {
        let Some(field) = self.ctx.host.resolve_field(token) else {
            return;
        };
        let required = self.ctx.host.field_requirement(field.token);
        if !required.is_empty() {
            self.patterns.record(
                offset,
                Pattern::Assignment {
                    value,
                    required,
                    target: RequirementTarget::field(&field.name),
                },
            );
        }
    }

    /// Stores `value` into every array `array` may be.
    ///
    /// Versions of one allocation that arrived on different paths are merged first, so a
    /// store after a join keeps what each path stored before it.
    fn store_element(
        &mut self,
        array: &MultiValue,
        index: &MultiValue,
        value: &MultiValue,
        state: &mut DataflowState,
    ) {
        let mut by_site: BTreeMap<ArraySite, Vec<ArrayValue>> = BTreeMap::new();
        for single in array.iter() {
            if let AbstractValue::Array(array) = single {
                by_site.entry(array.site).or_default().push(array.clone());
            }
        }
        for versions in by_site.values() {
            self.store_into_versions(versions, index.as_const_int(), value, state);
        }
    }

    fn store_into_versions(
        &self,
        versions: &[ArrayValue],
        index: Option<i32>,
        value: &MultiValue,
        state: &mut DataflowState,
    ) {
        let Some(array) = merge_versions(versions) else {
            return;
        };
        let updated = match index {
            Some(index) => array.with_element(
                index,
                value,
                self.block,
                self.ctx.config.max_tracked_array_values,
            ),
            None => array.cleared(),
        };
        state.replace_array(versions, &updated);
    }

    fn load_token(&self, token: Option<Token>) -> AbstractValue {
        match token {
            Some(token) if token.is_type() => self.ctx.type_handle_value(token),
            Some(token) if token.is_method_like() => self
                .ctx
                .resolve_callee(token)
                .map_or(AbstractValue::Unknown, |m| {
                    AbstractValue::KnownMethodHandle(m.method.token)
                }),
            _ => AbstractValue::Unknown,
        }
    }

    fn scan_return(&mut self, state: &mut DataflowState, offset: u32) {
        if !self.ctx.method.signature.return_type.is_void() {
            let value = self.pop_value(state, offset);
            let required = self.annotations.return_value;
            if !required.is_empty() {
                self.patterns.record(
                    offset,
                    Pattern::Assignment {
                        value: value.clone(),
                        required,
                        target: RequirementTarget::return_value(&self.ctx.method),
                    },
                );
            }
            self.returns.insert(offset, value);
        }
        if !state.stack.is_empty() {
            self.invalid(offset, "evaluation stack is not empty at return");
        }
        state.stack.clear();
    }

    /// Interprets one instruction.
    fn step(&mut self, instruction: &Instruction, state: &mut DataflowState) -> Result<()> {
        let offset = instruction.offset;
        match instruction.opcode {
            OpCode::Nop
            | OpCode::Break
            | OpCode::Jmp
            | OpCode::Br
            | OpCode::BrS
            | OpCode::Unaligned
            | OpCode::Volatile
            | OpCode::Tail
            | OpCode::Constrained
            | OpCode::No
            | OpCode::Readonly => {}

            OpCode::Ldarg0
            | OpCode::Ldarg1
            | OpCode::Ldarg2
            | OpCode::Ldarg3
            | OpCode::LdargS
            | OpCode::Ldarg => match instruction.argument_index() {
                Some(argument) => {
                    let value = self.load_argument(argument, state);
                    state.stack.push(value);
                }
                None => {
                    self.invalid(offset, "missing argument operand");
                    state.stack.push(MultiValue::unknown());
                }
            },
            OpCode::LdargaS | OpCode::Ldarga => {
                let value = instruction
                    .argument_index()
                    .map_or(AbstractValue::Unknown, |a| self.argument_address(a));
                state.stack.push(MultiValue::single(value));
            }
            OpCode::StargS | OpCode::Starg => {
                let value = self.pop_value(state, offset);
                match instruction.argument_index() {
                    Some(argument) => self.store_argument(argument, value, true, state, offset),
                    None => self.invalid(offset, "missing argument operand"),
                }
            }

            OpCode::Ldloc0
            | OpCode::Ldloc1
            | OpCode::Ldloc2
            | OpCode::Ldloc3
            | OpCode::LdlocS
            | OpCode::Ldloc => {
                let value = instruction
                    .local_index()
                    .map_or_else(MultiValue::unknown, |i| state.locals.get(&LocalKey::Local(i)));
                state.stack.push(value);
            }
            OpCode::LdlocaS | OpCode::Ldloca => {
                let value = instruction
                    .local_index()
                    .map_or(AbstractValue::Unknown, |i| {
                        AbstractValue::Reference(ReferenceKind::Local(i))
                    });
                state.stack.push(MultiValue::single(value));
            }
            OpCode::Stloc0
            | OpCode::Stloc1
            | OpCode::Stloc2
            | OpCode::Stloc3
            | OpCode::StlocS
            | OpCode::Stloc => {
                let value = self.pop_value(state, offset);
                match instruction.local_index() {
                    Some(index) => state.locals.set(LocalKey::Local(index), value),
                    None => self.invalid(offset, "missing local operand"),
                }
            }

            OpCode::Ldnull => state.stack.push(MultiValue::single(AbstractValue::Null)),
            OpCode::LdcI4M1
            | OpCode::LdcI40
            | OpCode::LdcI41
            | OpCode::LdcI42
            | OpCode::LdcI43
            | OpCode::LdcI44
            | OpCode::LdcI45
            | OpCode::LdcI46
            | OpCode::LdcI47
            | OpCode::LdcI48
            | OpCode::LdcI4S
            | OpCode::LdcI4 => {
                let value = instruction
                    .int_constant()
                    .map_or(AbstractValue::Unknown, AbstractValue::ConstInt);
                state.stack.push(MultiValue::single(value));
            }
            OpCode::LdcI8
            | OpCode::LdcR4
            | OpCode::LdcR8
            | OpCode::Arglist
            | OpCode::Sizeof
            | OpCode::Ldftn => state.stack.push(MultiValue::unknown()),
            OpCode::Ldstr => {
                let value = match &instruction.operand {
                    Operand::String(text) => AbstractValue::KnownString(text.clone()),
                    _ => AbstractValue::Unknown,
                };
                state.stack.push(MultiValue::single(value));
            }
            OpCode::Ldtoken => {
                let value = self.load_token(instruction.token());
                state.stack.push(MultiValue::single(value));
            }

            OpCode::Dup => {
                let value = self.pop(state, offset);
                state.stack.push(value.clone());
                state.stack.push(value);
            }
            OpCode::Pop => {
                self.pop(state, offset);
            }

            OpCode::Call | OpCode::Callvirt | OpCode::Newobj | OpCode::Calli => {
                self.scan_call(instruction, state)?;
            }
            OpCode::Ret => self.scan_return(state, offset),

            OpCode::Brfalse
            | OpCode::BrfalseS
            | OpCode::Brtrue
            | OpCode::BrtrueS
            | OpCode::Switch => {
                self.pop(state, offset);
            }
            OpCode::Beq
            | OpCode::BeqS
            | OpCode::Bge
            | OpCode::BgeS
            | OpCode::Bgt
            | OpCode::BgtS
            | OpCode::Ble
            | OpCode::BleS
            | OpCode::Blt
            | OpCode::BltS
            | OpCode::BneUn
            | OpCode::BneUnS
            | OpCode::BgeUn
            | OpCode::BgeUnS
            | OpCode::BgtUn
            | OpCode::BgtUnS
            | OpCode::BleUn
            | OpCode::BleUnS
            | OpCode::BltUn
            | OpCode::BltUnS => self.pop_n(state, offset, 2),

            OpCode::LdindI1
            | OpCode::LdindU1
            | OpCode::LdindI2
            | OpCode::LdindU2
            | OpCode::LdindI4
            | OpCode::LdindU4
            | OpCode::LdindI8
            | OpCode::LdindI
            | OpCode::LdindR4
            | OpCode::LdindR8
            | OpCode::LdindRef
            | OpCode::Ldobj => {
                let address = self.pop(state, offset);
                let value = self.read_through(&address, state);
                state.stack.push(value);
            }
            OpCode::StindRef
            | OpCode::StindI1
            | OpCode::StindI2
            | OpCode::StindI4
            | OpCode::StindI8
            | OpCode::StindR4
            | OpCode::StindR8
            | OpCode::StindI
            | OpCode::Stobj => {
                let value = self.pop_value(state, offset);
                let address = self.pop(state, offset);
                self.store_indirect(&address, value, state, offset);
            }
            OpCode::Initobj => {
                let address = self.pop(state, offset);
                self.store_indirect(&address, MultiValue::unknown(), state, offset);
            }
            OpCode::Cpobj => self.pop_n(state, offset, 2),
            OpCode::Cpblk | OpCode::Initblk => self.pop_n(state, offset, 3),

            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::DivUn
            | OpCode::Rem
            | OpCode::RemUn
            | OpCode::And
            | OpCode::Or
            | OpCode::Xor
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::ShrUn
            | OpCode::AddOvf
            | OpCode::AddOvfUn
            | OpCode::MulOvf
            | OpCode::MulOvfUn
            | OpCode::SubOvf
            | OpCode::SubOvfUn
            | OpCode::Ceq
            | OpCode::Cgt
            | OpCode::CgtUn
            | OpCode::Clt
            | OpCode::CltUn => {
                self.pop_n(state, offset, 2);
                state.stack.push(MultiValue::unknown());
            }
            OpCode::Neg
            | OpCode::Not
            | OpCode::ConvI1
            | OpCode::ConvI2
            | OpCode::ConvI4
            | OpCode::ConvI8
            | OpCode::ConvR4
            | OpCode::ConvR8
            | OpCode::ConvU4
            | OpCode::ConvU8
            | OpCode::ConvU2
            | OpCode::ConvU1
            | OpCode::ConvI
            | OpCode::ConvU
            | OpCode::ConvRUn
            | OpCode::ConvOvfI1
            | OpCode::ConvOvfU1
            | OpCode::ConvOvfI2
            | OpCode::ConvOvfU2
            | OpCode::ConvOvfI4
            | OpCode::ConvOvfU4
            | OpCode::ConvOvfI8
            | OpCode::ConvOvfU8
            | OpCode::ConvOvfI
            | OpCode::ConvOvfU
            | OpCode::ConvOvfI1Un
            | OpCode::ConvOvfI2Un
            | OpCode::ConvOvfI4Un
            | OpCode::ConvOvfI8Un
            | OpCode::ConvOvfU1Un
            | OpCode::ConvOvfU2Un
            | OpCode::ConvOvfU4Un
            | OpCode::ConvOvfU8Un
            | OpCode::ConvOvfIUn
            | OpCode::ConvOvfUUn
            | OpCode::Ckfinite
            | OpCode::Unbox
            | OpCode::Refanyval
            | OpCode::Mkrefany
            | OpCode::Refanytype
            | OpCode::Ldvirtftn
            | OpCode::Localloc => {
                self.pop(state, offset);
                state.stack.push(MultiValue::unknown());
            }

            OpCode::Box => {
                let value = self.pop_value(state, offset);
                state.stack.push(value);
            }
            OpCode::Castclass | OpCode::Isinst | OpCode::UnboxAny => {
                let value = self.pop_value(state, offset);
                if let Some(target) = instruction.token() {
                    self.patterns.record(
                        offset,
                        Pattern::Cast {
                            value: value.clone(),
                            target,
                        },
                    );
                }
                state.stack.push(value);
            }

            OpCode::Throw => {
                self.pop(state, offset);
                state.stack.clear();
            }
            OpCode::Rethrow | OpCode::Endfinally | OpCode::Leave | OpCode::LeaveS => {
                state.stack.clear();
            }
            OpCode::Endfilter => {
                self.pop(state, offset);
                state.stack.clear();
            }

            OpCode::Ldfld => {
                self.pop(state, offset);
                let value = instruction
                    .token()
                    .map_or_else(MultiValue::unknown, |t| self.load_field(t));
                state.stack.push(value);
            }
            OpCode::Ldsfld => {
                let value = instruction
                    .token()
                    .map_or_else(MultiValue::unknown, |t| self.load_field(t));
                state.stack.push(value);
            }
            OpCode::Ldflda | OpCode::Ldsflda => {
                if instruction.opcode == OpCode::Ldflda {
                    self.pop(state, offset);
                }
                let value = instruction
                    .token()
                    .map_or(AbstractValue::Unknown, |t| {
                        AbstractValue::Reference(ReferenceKind::Field(t))
                    });
                state.stack.push(MultiValue::single(value));
            }
            OpCode::Stfld | OpCode::Stsfld => {
                let value = self.pop_value(state, offset);
                if instruction.opcode == OpCode::Stfld {
                    self.pop(state, offset);
                }
                if let Some(token) = instruction.token() {
                    self.store_field(token, value, offset);
                }
            }

            OpCode::Newarr => {
                let size = self.pop_value(state, offset);
                let site = ArraySite {
                    method: self.ctx.token(),
                    offset,
                };
                state
                    .stack
                    .push(MultiValue::single(AbstractValue::Array(ArrayValue::new(site, size))));
            }
            OpCode::Ldlen => {
                let array = self.pop_value(state, offset);
                let length = array.flat_map(|v| match v {
                    AbstractValue::Array(array) => array
                        .constant_size()
                        .map_or_else(MultiValue::unknown, |n| {
                            MultiValue::single(AbstractValue::ConstInt(n))
                        }),
                    _ => MultiValue::unknown(),
                });
                state.stack.push(length);
            }
            OpCode::Ldelema => {
                let index = self.pop_value(state, offset);
                let array = self.pop_value(state, offset);
                let address = array.flat_map(|v| match v {
                    AbstractValue::Array(array) => MultiValue::single(AbstractValue::Reference(
                        ReferenceKind::ArrayElement {
                            site: array.site,
                            index: index.as_const_int(),
                        },
                    )),
                    _ => MultiValue::unknown(),
                });
                state.stack.push(address);
            }
            OpCode::LdelemI1
            | OpCode::LdelemU1
            | OpCode::LdelemI2
            | OpCode::LdelemU2
            | OpCode::LdelemI4
            | OpCode::LdelemU4
            | OpCode::LdelemI8
            | OpCode::LdelemI
            | OpCode::LdelemR4
            | OpCode::LdelemR8
            | OpCode::LdelemRef
            | OpCode::Ldelem => {
                let index = self.pop_value(state, offset);
                let array = self.pop_value(state, offset);
                let element = array.flat_map(|v| match (v, index.as_const_int()) {
                    (AbstractValue::Array(array), Some(index)) => array.element(index),
                    _ => MultiValue::unknown(),
                });
                state.stack.push(element);
            }
            OpCode::StelemI
            | OpCode::StelemI1
            | OpCode::StelemI2
            | OpCode::StelemI4
            | OpCode::StelemI8
            | OpCode::StelemR4
            | OpCode::StelemR8
            | OpCode::StelemRef
            | OpCode::Stelem => {
                let value = self.pop_value(state, offset);
                let index = self.pop_value(state, offset);
                let array = self.pop_value(state, offset);
                self.store_element(&array, &index, &value, state);
            }
        }
        Ok(())
    }
}

/// One array standing for every version of an allocation that may reach this point.
fn merge_versions(versions: &[ArrayValue]) -> Option<ArrayValue> {
    let (first, rest) = versions.split_first()?;
    Some(rest.iter().fold(first.clone(), |merged, next| merged.merge(next)))
}

impl<H: AnalysisHost + ?Sized> DataFlowAnalysis for MethodScanner<'_, '_, H> {
    type Lattice = DataflowState;

    fn boundary(&self, cfg: &ControlFlowGraph) -> Vec<(BlockId, DataflowState)> {
        let mut states = vec![(cfg.entry(), self.entry_state())];
        for (block, kind) in cfg.handler_entries() {
            let mut state = DataflowState::new();
            if kind.receives_exception() {
                state.stack.push(MultiValue::unknown());
            }
            states.push((*block, state));
        }
        states
    }

    fn transfer(&mut self, block: &BasicBlock, input: &DataflowState) -> Result<DataflowState> {
        let mut state = input.clone();
        if matches!(state.stack, OperandStack::Top) {
            state.stack = OperandStack::empty();
        }
        let body = self.body;
        let Some(instructions) = block
            .instructions
            .clone()
            .and_then(|range| body.instructions.get(range))
        else {
            return Ok(state);
        };
        if let (Some(first), Some(last)) = (instructions.first(), instructions.last()) {
            self.patterns.forget(first.offset..=last.offset);
            let stale: Vec<u32> = self
                .returns
                .range(first.offset..=last.offset)
                .map(|(offset, _)| *offset)
                .collect();
            for offset in stale {
                self.returns.remove(&offset);
            }
        }

        self.block = block.id;
        for instruction in instructions {
            self.step(instruction, &mut state)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{requirements::MemberTypes, value::SourceKind, AnalysisConfig, AnalysisSession},
        assembly::MethodBodyBuilder,
        host::{DiagnosticCode, MemberKind, RecordingHost},
        metadata::{
            signatures::SignatureMethod,
            types::{FieldAttributes, MethodAttributes},
            MetadataStore,
        },
        test::{analyze, define, fixture, program, Fixture},
        Error,
    };

    fn method(
        store: &mut MetadataStore,
        declaring: Token,
        name: &str,
        signature: SignatureMethod,
        body: &mut MethodBodyBuilder,
    ) -> Token {
        define(store, declaring, name, signature, body.build().unwrap())
    }

    fn string(text: &str) -> MultiValue {
        MultiValue::single(AbstractValue::string(text))
    }

    #[test]
    fn out_argument_holds_callee_view_after_call() {
        let Fixture {
            mut store,
            corlib,
            ..
        } = fixture();
        let program = program(&mut store, corlib.object);
        let type_sig = TypeSignature::Class(corlib.type_type);
        let fill = store.add_method(
            program,
            "Fill",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            SignatureMethod::new_static(
                TypeSignature::Void,
                vec![TypeSignature::ByRef(Box::new(type_sig.clone()))],
            ),
        );
        store.annotate_parameter(fill, 0, MemberTypes::PUBLIC_METHODS);
        let main = method(
            &mut store,
            program,
            "Main",
            SignatureMethod::new_static(type_sig.clone(), vec![]),
            MethodBodyBuilder::new()
                .local(type_sig)
                .emit(OpCode::Ldnull)
                .stloc(0)
                .ldloca(0)
                .call(fill)
                .ldloc(0)
                .emit(OpCode::Ret),
        );

        let (analysis, host) = analyze(&store, main);
        assert!(matches!(
            analysis.return_value.as_single(),
            Some(AbstractValue::MethodParameter(p))
                if p.method == fill
                    && p.index == 0
                    && p.requirement == MemberTypes::PUBLIC_METHODS
                    && p.declared_type == TypeSignature::Class(corlib.type_type)
        ));
        assert!(host.diagnostics.is_empty());
    }

    #[test]
    fn stores_through_local_and_argument_addresses() {
        let Fixture {
            mut store,
            corlib,
            ..
        } = fixture();
        let program = program(&mut store, corlib.object);
        let signature =
            || SignatureMethod::new_static(TypeSignature::String, vec![TypeSignature::String]);
        let local = method(
            &mut store,
            program,
            "ThroughLocal",
            signature(),
            MethodBodyBuilder::new()
                .local(TypeSignature::String)
                .ldloca(0)
                .ldstr("a")
                .emit(OpCode::StindRef)
                .ldloca(0)
                .emit(OpCode::LdindRef)
                .emit(OpCode::Ret),
        );
        let argument = method(
            &mut store,
            program,
            "ThroughArgument",
            signature(),
            MethodBodyBuilder::new()
                .ldarga(0)
                .ldstr("b")
                .emit(OpCode::StindRef)
                .ldarg(0)
                .emit(OpCode::Ret),
        );

        let (analysis, host) = analyze(&store, local);
        assert_eq!(analysis.return_value, string("a"));
        assert!(host.diagnostics.is_empty());

        let (analysis, host) = analyze(&store, argument);
        assert_eq!(analysis.return_value, string("b"));
        assert!(host.diagnostics.is_empty());
    }

    #[test]
    fn stores_to_annotated_locations_require_members() {
        let Fixture {
            mut store,
            corlib,
            app,
        } = fixture();
        let program = program(&mut store, corlib.object);
        let type_sig = TypeSignature::Class(corlib.type_type);
        let target = store.add_field(
            program,
            "Target",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            type_sig.clone(),
        );
        store.annotate_field(target, MemberTypes::PUBLIC_METHODS);

        let argument = method(
            &mut store,
            program,
            "ToArgument",
            SignatureMethod::new_static(TypeSignature::Void, vec![type_sig.clone()]),
            MethodBodyBuilder::new()
                .token(OpCode::Ldtoken, app.foo)
                .call(corlib.type_get_type_from_handle)
                .starg(0)
                .emit(OpCode::Ret),
        );
        store.annotate_parameter(argument, 0, MemberTypes::PUBLIC_METHODS);
        let field = method(
            &mut store,
            program,
            "ToField",
            SignatureMethod::new_static(TypeSignature::Void, vec![]),
            MethodBodyBuilder::new()
                .token(OpCode::Ldtoken, app.foo)
                .call(corlib.type_get_type_from_handle)
                .token(OpCode::Stsfld, target)
                .emit(OpCode::Ret),
        );
        let returned = method(
            &mut store,
            program,
            "Returned",
            SignatureMethod::new_static(type_sig.clone(), vec![]),
            MethodBodyBuilder::new()
                .token(OpCode::Ldtoken, app.foo)
                .call(corlib.type_get_type_from_handle)
                .emit(OpCode::Ret),
        );
        store.annotate_return(returned, MemberTypes::PUBLIC_METHODS);
        let forwarded = method(
            &mut store,
            program,
            "Forwarded",
            SignatureMethod::new_static(type_sig.clone(), vec![type_sig]),
            MethodBodyBuilder::new().ldarg(0).emit(OpCode::Ret),
        );
        store.annotate_return(forwarded, MemberTypes::PUBLIC_METHODS);

        for marking in [argument, field, returned] {
            let (_, host) = analyze(&store, marking);
            assert!(host.marks.contains(MemberKind::Method, app.foo_run));
            assert!(!host.marks.contains(MemberKind::Method, app.foo_secret));
            assert!(host.diagnostics.is_empty());
        }

        let (_, host) = analyze(&store, forwarded);
        assert!(host.marks.is_empty());
        assert!(host.diagnostics.has_code(DiagnosticCode::RequirementMismatch {
            source: SourceKind::Parameter,
            target: SourceKind::Return,
        }));
    }

    #[test]
    fn intrinsic_return_below_declared_requirement_is_internal_error() {
        let Fixture {
            mut store,
            corlib,
            ..
        } = fixture();
        store.annotate_return(corlib.activator_create_instance_type, MemberTypes::PUBLIC_METHODS);
        let program = program(&mut store, corlib.object);
        let main = method(
            &mut store,
            program,
            "Main",
            SignatureMethod::new_static(TypeSignature::Object, vec![TypeSignature::Object]),
            MethodBodyBuilder::new()
                .ldarg(0)
                .callvirt(corlib.object_get_type)
                .call(corlib.activator_create_instance_type)
                .emit(OpCode::Ret),
        );

        let host = RecordingHost::new(&store);
        let session = AnalysisSession::new(&host, AnalysisConfig::sequential());
        assert!(matches!(
            session.analyze_method(main),
            Err(Error::InternalError(_))
        ));
    }

    #[test]
    fn element_address_reads_merged_versions() {
        let Fixture {
            mut store,
            corlib,
            ..
        } = fixture();
        let program = program(&mut store, corlib.object);
        let main = method(
            &mut store,
            program,
            "Main",
            SignatureMethod::new_static(TypeSignature::Object, vec![TypeSignature::Boolean]),
            MethodBodyBuilder::new()
                .local(TypeSignature::SzArray(Box::new(TypeSignature::Object)))
                .ldc_i4(2)
                .token(OpCode::Newarr, corlib.object)
                .stloc(0)
                .ldarg(0)
                .branch(OpCode::Brtrue, "other")
                .ldloc(0)
                .ldc_i4(0)
                .ldstr("a")
                .emit(OpCode::StelemRef)
                .branch(OpCode::Br, "join")
                .label("other")
                .ldloc(0)
                .ldc_i4(0)
                .ldstr("b")
                .emit(OpCode::StelemRef)
                .label("join")
                .ldloc(0)
                .ldc_i4(1)
                .token(OpCode::Ldelema, corlib.object)
                .ldstr("c")
                .emit(OpCode::StindRef)
                .ldloc(0)
                .ldc_i4(0)
                .token(OpCode::Ldelema, corlib.object)
                .emit(OpCode::LdindRef)
                .emit(OpCode::Ret),
        );

        let (analysis, host) = analyze(&store, main);
        assert_eq!(analysis.return_value, string("a").merge(&string("b")));
        assert!(host.diagnostics.is_empty());
    }
}
