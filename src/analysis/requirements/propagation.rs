//! Applying member requirements to abstract values.
//!
//! [`Effects`] is the only place the analysis talks to the host's marker and diagnostic
//! sink. It is created per call site or per instruction with an [`Origin`] and a flag
//! saying whether actions are live: while a method's fixpoint is being computed the same
//! code runs with actions disabled, so intrinsic handling can compute return values
//! without marking members for values that are not final yet.

use std::{fmt, sync::Arc};

use log::trace;

use crate::{
    analysis::{
        caches::AnalysisCaches,
        requirements::{select_members, MemberFilter, MemberTypes, TypeName},
        value::{AbstractValue, GenericOwner, MultiValue, SourceKind},
    },
    host::{
        AnalysisHost, Diagnostic, DiagnosticCode, MarkReason, MarkedMember, MemberKind, Origin,
    },
    metadata::{token::Token, types::MethodDesc},
};

/// An annotated location a value flows into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementTarget {
    /// Kind of location, selects the diagnostic code
    pub kind: SourceKind,
    /// Human-readable name used in diagnostic messages
    pub description: String,
}

impl RequirementTarget {
    /// Parameter `index` (`this` excluded) of `method`.
    #[must_use]
    pub fn parameter(method: &MethodDesc, index: usize) -> Self {
        let name = method
            .param_names
            .get(index)
            .map_or_else(|| format!("#{index}"), |n| format!("'{n}'"));
        RequirementTarget {
            kind: SourceKind::Parameter,
            description: format!("parameter {name} of '{}'", method.name),
        }
    }

    /// The return value of `method`.
    #[must_use]
    pub fn return_value(method: &MethodDesc) -> Self {
        RequirementTarget {
            kind: SourceKind::Return,
            description: format!("return value of '{}'", method.name),
        }
    }

    /// The implicit `this` of `method`.
    #[must_use]
    pub fn this(method: &MethodDesc) -> Self {
        RequirementTarget {
            kind: SourceKind::This,
            description: format!("implicit 'this' of '{}'", method.name),
        }
    }

    /// A field.
    #[must_use]
    pub fn field(name: &str) -> Self {
        RequirementTarget {
            kind: SourceKind::Field,
            description: format!("field '{name}'"),
        }
    }

    /// Generic parameter `index` of `owner`.
    #[must_use]
    pub fn generic_parameter(owner: GenericOwner, index: u16) -> Self {
        let description = match owner {
            GenericOwner::Type(token) => format!("generic parameter !{index} of type {token}"),
            GenericOwner::Method(token) => format!("generic parameter !!{index} of method {token}"),
        };
        RequirementTarget {
            kind: SourceKind::GenericParameter,
            description,
        }
    }
}

impl fmt::Display for RequirementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Marks and reports on behalf of one instruction, or does nothing when disabled.
pub struct Effects<'a, H: ?Sized> {
    host: &'a H,
    caches: &'a AnalysisCaches,
    origin: Origin,
    enabled: bool,
}

impl<'a, H: AnalysisHost + ?Sized> Effects<'a, H> {
    /// Creates an effect sink for `origin`.
    pub fn new(host: &'a H, caches: &'a AnalysisCaches, origin: Origin, enabled: bool) -> Self {
        Effects {
            host,
            caches,
            origin,
            enabled,
        }
    }

    /// The host metadata queries go to.
    pub fn host(&self) -> &'a H {
        self.host
    }

    /// The session caches.
    pub fn caches(&self) -> &'a AnalysisCaches {
        self.caches
    }

    /// Where the effects are attributed.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns `true` if marks and diagnostics reach the host.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Reports a diagnostic.
    pub fn report(&self, code: DiagnosticCode, message: impl Into<String>) {
        if self.enabled {
            self.host
                .report(Diagnostic::new(code, self.origin, message));
        }
    }

    /// Marks one member.
    pub fn mark(&self, member: MarkedMember, reason: MarkReason) {
        if !self.enabled {
            return;
        }
        let origin = &self.origin;
        match member.kind {
            MemberKind::Type => self.host.mark_type(member.token, reason, origin),
            MemberKind::Method => {
                let constructor = self
                    .host
                    .resolve_method_definition(member.token)
                    .is_some_and(|m| m.is_any_constructor());
                if constructor {
                    self.host.mark_constructor(member.token, reason, origin);
                } else {
                    self.host.mark_method(member.token, reason, origin);
                }
            }
            MemberKind::Field => self.host.mark_field(member.token, reason, origin),
            MemberKind::Property => self.host.mark_property(member.token, reason, origin),
            MemberKind::Event => self.host.mark_event(member.token, reason, origin),
        }
    }

    /// Marks a type.
    pub fn mark_type(&self, token: Token, reason: MarkReason) {
        self.mark(
            MarkedMember {
                kind: MemberKind::Type,
                token,
            },
            reason,
        );
    }

    /// Marks a type and the members `categories` select on it.
    pub fn mark_type_members(
        &self,
        ty: Token,
        categories: MemberTypes,
        filter: &MemberFilter<'_>,
        reason: MarkReason,
    ) {
        if !self.enabled {
            return;
        }
        let Some(desc) = self.host.resolve_type(ty) else {
            return;
        };
        self.mark_type(desc.token, reason);
        for member in select_members(self.host, &desc, categories, filter) {
            self.mark(member, reason);
        }
    }

    /// Resolves a reflection type name.
    ///
    /// Returns the named type first, followed by the types its generic arguments name.
    /// Names with an unresolvable component do not resolve.
    pub fn resolve_type_name(&self, text: &str) -> Option<Arc<[Token]>> {
        self.caches.type_name(text, || {
            let parsed = TypeName::parse(text)?;
            let mut tokens = Vec::new();
            self.resolve_parsed(&parsed, &mut tokens)?;
            Some(Arc::from(tokens))
        })
    }

    fn resolve_parsed(&self, name: &TypeName, tokens: &mut Vec<Token>) -> Option<()> {
        let ty = match &name.assembly {
            Some(assembly) => self.host.resolve_type_in_assembly(assembly, &name.name),
            None => self.host.resolve_type_by_name(&name.name),
        }?;
        tokens.push(ty.token);
        for arg in &name.generic_args {
            self.resolve_parsed(arg, tokens)?;
        }
        Some(())
    }

    /// Requires the members `required` selects on whatever `value` denotes.
    ///
    /// Known types have their members marked; strings are resolved as type names;
    /// annotated values must carry at least the required categories; `null` needs
    /// nothing; anything else cannot be guaranteed and is reported.
    pub fn require_members(
        &self,
        value: &MultiValue,
        required: MemberTypes,
        target: &RequirementTarget,
    ) {
        if required.is_empty() || !self.enabled {
            return;
        }
        trace!("require {required:?} on {target} at {}", self.origin);
        for single in value.iter() {
            self.require_single(single, required, target);
        }
    }

    fn require_single(
        &self,
        value: &AbstractValue,
        required: MemberTypes,
        target: &RequirementTarget,
    ) {
        match value {
            AbstractValue::Null => {}
            AbstractValue::KnownType(ty) => {
                self.mark_type_members(*ty, required, &MemberFilter::ANY, MarkReason::AccessedMembers);
            }
            AbstractValue::KnownString(text) => match self.resolve_type_name(text) {
                Some(tokens) => {
                    for (i, &token) in tokens.iter().enumerate() {
                        self.mark_type(token, MarkReason::TypeName);
                        if i == 0 {
                            self.mark_type_members(
                                token,
                                required,
                                &MemberFilter::ANY,
                                MarkReason::AccessedMembers,
                            );
                        }
                    }
                }
                None => self.report(
                    DiagnosticCode::UnresolvedTypeName,
                    format!("type '{text}' flowing into {target} could not be resolved"),
                ),
            },
            other => match other.annotation() {
                Some((source, available)) => {
                    if !available.satisfies(required) {
                        self.report(
                            DiagnosticCode::RequirementMismatch {
                                source,
                                target: target.kind,
                            },
                            format!(
                                "{other} with requirement {available:?} does not satisfy {required:?} of {target}"
                            ),
                        );
                    }
                }
                None => self.report(
                    DiagnosticCode::UnrecognizedValue {
                        target: target.kind,
                    },
                    format!("value {other} passed to {target} cannot be statically analyzed"),
                ),
            },
        }
    }
}
