//! Observations recorded while scanning and applied once the fixpoint has converged.
//!
//! Every pattern is keyed by the offset of the instruction that produced it. A block
//! revisited by the solver first forgets the patterns of its instructions, so after
//! convergence each pattern reflects the final input state of its block.

use std::{collections::BTreeMap, ops::RangeInclusive};

use crate::{
    analysis::{
        context::MethodContext,
        intrinsics::{self, CallSite, IntrinsicId},
        requirements::{MemberFilter, MemberTypes, RequirementTarget},
        value::{AbstractValue, GenericOwner, MultiValue},
    },
    host::{AnalysisHost, DiagnosticCode, MarkReason},
    metadata::{signatures::SignatureMethod, token::Token, types::ResolvedMethod},
};

/// A recorded observation.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// A call with its dereferenced arguments
    Call {
        /// The callee under the caller's instantiation
        callee: ResolvedMethod,
        /// The callee's instantiated signature
        signature: SignatureMethod,
        /// Arguments, `this` first for instance callees
        arguments: Vec<MultiValue>,
        /// Intrinsic classification of the callee
        intrinsic: Option<IntrinsicId>,
        /// The call is a `newobj`
        constructs: bool,
    },
    /// A value flowing into an annotated location
    Assignment {
        /// The stored value
        value: MultiValue,
        /// Requirement of the location
        required: MemberTypes,
        /// The location
        target: RequirementTarget,
    },
    /// A `castclass`, `isinst` or `unbox.any`
    Cast {
        /// The value being cast
        value: MultiValue,
        /// Type token operand
        target: Token,
    },
    /// An instruction the scanner could not make sense of
    InvalidIl {
        /// What went wrong
        reason: String,
    },
}

/// Patterns of one method in offset order.
#[derive(Debug, Default)]
pub struct PatternLog {
    entries: BTreeMap<(u32, u16), Pattern>,
}

impl PatternLog {
    /// Records a pattern for the instruction at `offset`.
    pub fn record(&mut self, offset: u32, pattern: Pattern) {
        let slot = self
            .entries
            .range((offset, 0)..=(offset, u16::MAX))
            .next_back()
            .map_or(0, |((_, slot), _)| slot.saturating_add(1));
        self.entries.insert((offset, slot), pattern);
    }

    /// Forgets every pattern recorded for instructions in `offsets`.
    pub fn forget(&mut self, offsets: RangeInclusive<u32>) {
        let stale: Vec<(u32, u16)> = self
            .entries
            .range((*offsets.start(), 0)..=(*offsets.end(), u16::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.entries.remove(&key);
        }
    }

    /// Number of recorded patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patterns with their offsets, in offset order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Pattern)> + '_ {
        self.entries.iter().map(|((offset, _), p)| (*offset, p))
    }
}

impl Pattern {
    /// Marks and reports what the pattern requires.
    pub fn apply<H: AnalysisHost + ?Sized>(&self, ctx: &MethodContext<'_, H>, offset: u32) {
        let effects = ctx.effects(offset, true);
        match self {
            Pattern::Call {
                callee,
                signature,
                arguments,
                intrinsic,
                constructs,
            } => apply_call(ctx, offset, callee, signature, arguments, *intrinsic, *constructs),
            Pattern::Assignment {
                value,
                required,
                target,
            } => effects.require_members(value, *required, target),
            Pattern::Cast { value, target } => apply_cast(ctx, offset, value, *target),
            Pattern::InvalidIl { reason } => {
                if ctx.config.report_invalid_il {
                    effects.report(DiagnosticCode::InvalidIl, reason.clone());
                }
            }
        }
    }
}

fn apply_call<H: AnalysisHost + ?Sized>(
    ctx: &MethodContext<'_, H>,
    offset: u32,
    callee: &ResolvedMethod,
    signature: &SignatureMethod,
    arguments: &[MultiValue],
    intrinsic: Option<IntrinsicId>,
    constructs: bool,
) {
    let effects = ctx.effects(offset, true);
    let method = &callee.method;
    let annotations = ctx.caches.method_annotations(ctx.host, method);

    if let Some(message) = &annotations.requires_unreferenced_code {
        if ctx.annotations().requires_unreferenced_code.is_none() {
            effects.report(
                DiagnosticCode::RequiresUnreferencedCode,
                format!(
                    "using '{}' may break functionality when trimming: {message}",
                    method.name
                ),
            );
        }
    }

    let site = CallSite {
        ctx,
        offset,
        callee,
        signature,
        arguments,
    };
    match intrinsic {
        Some(id) if !constructs => {
            if intrinsics::handle(id, &site, &effects).is_none() {
                effects.report(
                    DiagnosticCode::UnanalyzableCall,
                    format!("overload of '{id}' called from here is not analyzed"),
                );
            }
        }
        _ => {
            for (index, required) in annotations.parameters.iter().enumerate() {
                if let Some(value) = site.parameter(index) {
                    effects.require_members(
                        value,
                        *required,
                        &RequirementTarget::parameter(method, index),
                    );
                }
            }
            if !constructs {
                if let Some(receiver) = site.receiver() {
                    effects.require_members(
                        receiver,
                        annotations.this,
                        &RequirementTarget::this(method),
                    );
                }
            }
            check_generic_arguments(ctx, &effects, GenericOwner::Method(method.token), &callee.method_args);
            check_generic_arguments(
                ctx,
                &effects,
                GenericOwner::Type(method.declaring_type),
                &callee.type_args,
            );
        }
    }

    if ctx.config.com_interop_checks {
        intrinsics::check_com_interop(method, &effects);
    }
}

fn check_generic_arguments<H: AnalysisHost + ?Sized>(
    ctx: &MethodContext<'_, H>,
    effects: &crate::analysis::requirements::Effects<'_, H>,
    owner: GenericOwner,
    arguments: &[crate::metadata::signatures::TypeSignature],
) {
    if arguments.is_empty() {
        return;
    }
    let requirements = ctx.caches.generic_requirements(ctx.host, owner);
    for (index, (argument, required)) in arguments.iter().zip(requirements.iter()).enumerate() {
        let Ok(index) = u16::try_from(index) else {
            break;
        };
        effects.require_members(
            &MultiValue::single(ctx.type_value(argument)),
            *required,
            &RequirementTarget::generic_parameter(owner, index),
        );
    }
}

/// Satisfies requirements deferred by an activation intrinsic on the concrete type the
/// created object is cast to.
fn apply_cast<H: AnalysisHost + ?Sized>(
    ctx: &MethodContext<'_, H>,
    offset: u32,
    value: &MultiValue,
    target: Token,
) {
    let Some(cast_type) = ctx
        .host
        .type_signature(target)
        .and_then(|signature| ctx.resolve_signature_type(&signature))
    else {
        return;
    };
    let effects = ctx.effects(offset, true);
    for single in value.iter() {
        let AbstractValue::MethodReturn(returned) = single else {
            continue;
        };
        if returned.requirement.is_empty() || !is_activation(ctx, returned.method) {
            continue;
        }
        effects.mark_type_members(
            cast_type,
            returned.requirement,
            &MemberFilter::ANY,
            MarkReason::CastTarget,
        );
    }
}

fn is_activation<H: AnalysisHost + ?Sized>(ctx: &MethodContext<'_, H>, method: Token) -> bool {
    let classified = ctx.caches.intrinsic(method, || {
        ctx.host
            .resolve_method_definition(method)
            .and_then(|desc| IntrinsicId::classify(ctx.host, &desc))
    });
    matches!(
        classified,
        Some(
            IntrinsicId::ActivatorCreateInstanceType
                | IntrinsicId::ActivatorCreateInstanceName
                | IntrinsicId::ActivatorCreateInstanceGeneric
        )
    )
}
