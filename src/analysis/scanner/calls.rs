//! Interpretation of `call`, `callvirt`, `newobj` and `calli`.

use log::trace;

use crate::{
    analysis::{
        dataflow::DataflowState,
        intrinsics::{self, CallSite, IntrinsicId},
        scanner::{MethodScanner, Pattern},
        value::{AbstractValue, MultiValue, ParameterValue},
    },
    assembly::{Instruction, OpCode},
    host::AnalysisHost,
    metadata::{signatures::SignatureMethod, types::MethodDesc},
    Error, Result,
};

impl<H: AnalysisHost + ?Sized> MethodScanner<'_, '_, H> {
    /// Pops the arguments of a call, pushes its result and records the call.
    ///
    /// Intrinsics compute their result here with effects disabled; their marks and
    /// diagnostics happen when the recorded pattern is applied after convergence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if an intrinsic synthesizes a return value that
    /// does not satisfy the return annotation of the method it models.
    pub(super) fn scan_call(
        &mut self,
        instruction: &Instruction,
        state: &mut DataflowState,
    ) -> Result<()> {
        let offset = instruction.offset;
        let constructs = instruction.opcode == OpCode::Newobj;
        let callee = match instruction.opcode {
            OpCode::Calli => None,
            _ => instruction
                .token()
                .and_then(|token| self.ctx.resolve_callee(token)),
        };
        let Some(callee) = callee else {
            self.scan_opaque_call(instruction, state);
            return Ok(());
        };

        let signature = callee.instantiated_signature();
        let method = callee.method.clone();
        let mut raw = Vec::with_capacity(signature.params.len());
        for _ in 0..signature.params.len() {
            raw.push(self.pop(state, offset));
        }
        raw.reverse();

        let mut arguments = Vec::with_capacity(raw.len() + 1);
        if constructs {
            arguments.push(MultiValue::unknown());
        } else if signature.has_this && !signature.explicit_this {
            let receiver = self.pop_value(state, offset);
            arguments.push(receiver);
        }
        let view: &DataflowState = state;
        arguments.extend(raw.iter().map(|a| self.dereference(a.clone(), view)));

        let intrinsic = self.ctx.caches.intrinsic(method.token, || {
            IntrinsicId::classify(self.ctx.host, &method)
        });
        let returned = if constructs {
            MultiValue::unknown()
        } else {
            let site = CallSite {
                ctx: self.ctx,
                offset,
                callee: &callee,
                signature: &signature,
                arguments: &arguments,
            };
            match intrinsic {
                Some(id) => {
                    let effects = self.ctx.effects(offset, false);
                    match intrinsics::handle(id, &site, &effects) {
                        Some(value) => {
                            self.check_intrinsic_return(id, &method, &value)?;
                            value
                        }
                        None => MultiValue::unknown(),
                    }
                }
                None => site.default_return(),
            }
        };

        if constructs || !signature.return_type.is_void() {
            state.stack.push(if returned.is_empty() {
                MultiValue::unknown()
            } else {
                returned
            });
        }

        self.write_back(&method, &signature, &raw, state, offset);
        self.patterns.record(
            offset,
            Pattern::Call {
                callee,
                signature,
                arguments,
                intrinsic,
                constructs,
            },
        );
        Ok(())
    }

    /// A call whose target does not resolve: the stack effect comes from the call-site
    /// signature if the host has one, and the result is unknown.
    fn scan_opaque_call(&mut self, instruction: &Instruction, state: &mut DataflowState) {
        let offset = instruction.offset;
        if instruction.opcode == OpCode::Calli {
            self.pop(state, offset);
        }
        let signature = instruction
            .token()
            .and_then(|token| self.ctx.host.call_site_signature(token));
        match signature {
            Some(signature) => {
                let count = if instruction.opcode == OpCode::Newobj {
                    signature.params.len()
                } else {
                    signature.stack_arguments()
                };
                self.pop_n(state, offset, count);
                if instruction.opcode == OpCode::Newobj || !signature.return_type.is_void() {
                    state.stack.push(MultiValue::unknown());
                }
            }
            None => {
                trace!("unresolved call target at IL_{offset:04x} in {}", self.ctx.token());
                self.invalid(offset, format!("call target of {instruction} cannot be resolved"));
                state.stack.clear();
                if instruction.opcode == OpCode::Newobj {
                    state.stack.push(MultiValue::unknown());
                }
            }
        }
    }

    /// Stores the callee's view of each by-ref parameter through the address passed for it.
    fn write_back(
        &mut self,
        method: &MethodDesc,
        signature: &SignatureMethod,
        raw: &[MultiValue],
        state: &mut DataflowState,
        offset: u32,
    ) {
        let annotations = self.ctx.caches.method_annotations(self.ctx.host, method);
        for (index, (param, address)) in signature.params.iter().zip(raw).enumerate() {
            if !param.is_by_ref() {
                continue;
            }
            let Ok(position) = u16::try_from(index) else {
                break;
            };
            let written = MultiValue::single(AbstractValue::MethodParameter(ParameterValue {
                method: method.token,
                index: position,
                requirement: annotations.parameter(index),
                declared_type: param.strip_by_ref().clone(),
            }));
            self.store_indirect(address, written, state, offset);
        }
    }

    /// Placeholders an intrinsic synthesizes for its own return value must carry at
    /// least the requirement the modeled method declares.
    fn check_intrinsic_return(
        &self,
        id: IntrinsicId,
        method: &MethodDesc,
        returned: &MultiValue,
    ) -> Result<()> {
        let declared = self
            .ctx
            .caches
            .method_annotations(self.ctx.host, method)
            .return_value;
        if declared.is_empty() {
            return Ok(());
        }
        for value in returned.iter() {
            if let AbstractValue::MethodReturn(placeholder) = value {
                if placeholder.method == method.token && !placeholder.requirement.satisfies(declared)
                {
                    return Err(Error::InternalError(format!(
                        "intrinsic {id} returned {value}, which does not satisfy the declared \
                         return requirement {declared:?} of '{}'",
                        method.name
                    )));
                }
            }
        }
        Ok(())
    }
}
