//! Semantics of the individual intrinsics.
//!
//! [`handle`] returns the value a call produces. `None` means the intrinsic was called
//! through an overload whose shape is not modeled; the caller reports that and uses
//! `Unknown`.

use std::{collections::BTreeSet, sync::Arc};

use log::trace;

use crate::{
    analysis::{
        intrinsics::{CallSite, IntrinsicId, Lookup, LookupKind, ParamShape},
        requirements::{select_members, Effects, MemberFilter, MemberTypes, RequirementTarget},
        value::{AbstractValue, ArraySite, ArrayValue, GenericOwner, MultiValue},
    },
    host::{AnalysisHost, DiagnosticCode, MarkReason, MarkedMember, MemberKind},
    metadata::token::Token,
};

/// Computes the value returned by a call to intrinsic `id` and, when `effects` is enabled,
/// marks what the call reaches and reports what cannot be analyzed.
///
/// # Arguments
///
/// * `id` - The recognized intrinsic
/// * `site` - The call with its dereferenced arguments
/// * `effects` - Marking and reporting sink for the call instruction
///
/// # Returns
///
/// The returned value, or `None` for an overload whose parameters are not understood.
pub fn handle<H: AnalysisHost + ?Sized>(
    id: IntrinsicId,
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    trace!("intrinsic {id} at {}", effects.origin());
    match id {
        IntrinsicId::TypeGetType => get_type(site, effects),
        IntrinsicId::TypeGetTypeFromHandle => Some(site.parameter(0)?.flat_map(|v| match v {
            AbstractValue::KnownTypeHandle(ty) => MultiValue::single(AbstractValue::KnownType(*ty)),
            AbstractValue::GenericParameterHandle(g) => {
                MultiValue::single(AbstractValue::GenericParameter(g.clone()))
            }
            _ => site.default_return(),
        })),
        IntrinsicId::TypeGetTypeHandle => Some(site.receiver()?.flat_map(|v| match v {
            AbstractValue::KnownType(ty) => MultiValue::single(AbstractValue::KnownTypeHandle(*ty)),
            AbstractValue::GenericParameter(g) => {
                MultiValue::single(AbstractValue::GenericParameterHandle(g.clone()))
            }
            _ => site.default_return(),
        })),
        IntrinsicId::MethodBaseGetMethodFromHandle => Some(site.parameter(0)?.flat_map(|v| {
            match v {
                AbstractValue::KnownMethodHandle(m) => {
                    MultiValue::single(AbstractValue::KnownMethod(*m))
                }
                _ => site.default_return(),
            }
        })),
        IntrinsicId::ObjectGetType => object_get_type(site),
        IntrinsicId::TypeGetBaseType => base_type(site),
        IntrinsicId::TypeGetConstructor
        | IntrinsicId::TypeGetConstructors
        | IntrinsicId::TypeGetMethod
        | IntrinsicId::TypeGetMethods
        | IntrinsicId::TypeGetField
        | IntrinsicId::TypeGetFields
        | IntrinsicId::TypeGetProperty
        | IntrinsicId::TypeGetProperties
        | IntrinsicId::TypeGetEvent
        | IntrinsicId::TypeGetEvents
        | IntrinsicId::TypeGetNestedType
        | IntrinsicId::TypeGetNestedTypes
        | IntrinsicId::TypeGetMember
        | IntrinsicId::TypeGetMembers
        | IntrinsicId::TypeGetInterface
        | IntrinsicId::TypeGetInterfaces => {
            let (kind, named) = id.lookup()?;
            member_lookup(kind, named, site, effects)
        }
        IntrinsicId::TypeMakeGenericType | IntrinsicId::MethodInfoMakeGenericMethod => {
            make_generic(id, site, effects)
        }
        IntrinsicId::ActivatorCreateInstanceType => create_instance_type(site, effects),
        IntrinsicId::ActivatorCreateInstanceName => create_instance_name(site, effects),
        IntrinsicId::ActivatorCreateInstanceGeneric => {
            let argument = site.callee.method_args.first()?;
            let value = MultiValue::single(site.ctx.type_value(argument));
            let owner = GenericOwner::Method(site.callee.method.token);
            effects.require_members(
                &value,
                MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR,
                &RequirementTarget::generic_parameter(owner, 0),
            );
            Some(site.default_return())
        }
        IntrinsicId::AssemblyCreateInstance => {
            effects.report(
                DiagnosticCode::AssemblyCreateInstance,
                format!(
                    "'{}' creates instances of types that cannot be statically determined",
                    site.callee.method.name
                ),
            );
            Some(site.default_return())
        }
        IntrinsicId::RuntimeHelpersRunClassConstructor => run_class_constructor(site, effects),
        IntrinsicId::ExpressionCall => expression_member(
            site,
            effects,
            MemberTypes::PUBLIC_METHODS | MemberTypes::NON_PUBLIC_METHODS,
        ),
        IntrinsicId::ExpressionField => expression_member(
            site,
            effects,
            MemberTypes::PUBLIC_FIELDS | MemberTypes::NON_PUBLIC_FIELDS,
        ),
        IntrinsicId::ExpressionProperty => expression_member(
            site,
            effects,
            MemberTypes::PUBLIC_PROPERTIES | MemberTypes::NON_PUBLIC_PROPERTIES,
        ),
        IntrinsicId::ExpressionNew => {
            if site.shapes() == [ParamShape::Type] {
                effects.require_members(
                    site.parameter(0)?,
                    MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR,
                    &RequirementTarget::parameter(&site.callee.method, 0),
                );
            }
            Some(site.default_return())
        }
        IntrinsicId::MarshalSizeOf
        | IntrinsicId::MarshalOffsetOf
        | IntrinsicId::MarshalPtrToStructure
        | IntrinsicId::MarshalDestroyStructure => marshal_layout(site, effects),
        IntrinsicId::ArrayEmpty => {
            let array = ArrayValue::new(
                ArraySite {
                    method: site.ctx.token(),
                    offset: site.offset,
                },
                MultiValue::single(AbstractValue::ConstInt(0)),
            );
            Some(MultiValue::single(AbstractValue::Array(array)))
        }
    }
}

fn or_default<H: AnalysisHost + ?Sized>(
    result: MultiValue,
    site: &CallSite<'_, '_, H>,
) -> MultiValue {
    if result.is_empty() {
        site.default_return()
    } else {
        result
    }
}

/// String constants of `values`, or `None` if any value is not one.
fn constant_strings(values: &MultiValue) -> Option<Vec<Arc<str>>> {
    values
        .iter()
        .map(|v| match v {
            AbstractValue::KnownString(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn get_type<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    if site.shapes().first() != Some(&ParamShape::String) {
        return None;
    }
    let names = site.parameter(0)?;
    let mut result = MultiValue::empty();
    for value in names.iter() {
        match value {
            AbstractValue::KnownString(text) => {
                if let Some(tokens) = effects.resolve_type_name(text) {
                    for &token in tokens.iter() {
                        effects.mark_type(token, MarkReason::TypeName);
                    }
                    if let Some(&named) = tokens.first() {
                        result.insert(AbstractValue::KnownType(named));
                    }
                }
            }
            AbstractValue::Null => {}
            other => match other.annotation() {
                Some((_, requirement)) if !requirement.is_empty() => {
                    result = result.merge(&site.return_with(requirement));
                }
                _ => {
                    effects.report(
                        DiagnosticCode::UnrecognizedTypeName,
                        format!("type name {other} passed to 'Type.GetType' is not a constant"),
                    );
                    result.insert(AbstractValue::Unknown);
                }
            },
        }
    }
    if result.is_empty() {
        result.insert(AbstractValue::Null);
    }
    Some(result)
}

fn object_get_type<H: AnalysisHost + ?Sized>(site: &CallSite<'_, '_, H>) -> Option<MultiValue> {
    let host = site.ctx.host;
    let result = site.receiver()?.flat_map(|value| {
        let exact = match value {
            AbstractValue::Null => return MultiValue::empty(),
            AbstractValue::KnownString(_) => host.resolve_type_by_name("System.String"),
            other => other
                .declared_type()
                .and_then(|declared| site.ctx.resolve_signature_type(declared.strip_by_ref()))
                .and_then(|token| host.resolve_type(token))
                .filter(|ty| ty.is_sealed()),
        };
        exact.map_or_else(
            || site.default_return(),
            |ty| MultiValue::single(AbstractValue::KnownType(ty.token)),
        )
    });
    Some(or_default(result, site))
}

fn base_type<H: AnalysisHost + ?Sized>(site: &CallSite<'_, '_, H>) -> Option<MultiValue> {
    let host = site.ctx.host;
    Some(site.receiver()?.flat_map(|value| match value {
        AbstractValue::KnownType(ty) => match host.resolve_type(*ty) {
            Some(desc) => match desc.extends {
                None => MultiValue::single(AbstractValue::Null),
                Some(base) => host.resolve_type(base).map_or_else(
                    || site.default_return(),
                    |base| MultiValue::single(AbstractValue::KnownType(base.token)),
                ),
            },
            None => site.default_return(),
        },
        other => match other.annotation() {
            Some((_, requirement)) if !requirement.for_base_type().is_empty() => {
                site.return_with(requirement.for_base_type())
            }
            _ => site.default_return(),
        },
    }))
}

fn member_lookup<H: AnalysisHost + ?Sized>(
    kind: LookupKind,
    named: bool,
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    let shapes = site.shapes();
    let by_name = named && kind != LookupKind::Constructors;
    let names = if by_name {
        if shapes.first() != Some(&ParamShape::String) {
            return None;
        }
        constant_strings(site.parameter(0)?)
    } else {
        None
    };
    let mut lookup = match shapes.iter().position(|s| *s == ParamShape::BindingFlags) {
        Some(index) => Lookup::from_flags(kind, site.parameter(index)?),
        None => Lookup::default_for(kind),
    };
    if kind == LookupKind::Interfaces && shapes.get(1) == Some(&ParamShape::Bool) {
        lookup.ignore_case |= site
            .parameter(1)?
            .iter()
            .any(|v| v.as_const_int() != Some(0));
    }

    let host = site.ctx.host;
    let mut result = MultiValue::empty();
    for value in site.receiver()?.iter() {
        match value {
            AbstractValue::KnownType(ty) => {
                let Some(desc) = host.resolve_type(*ty) else {
                    result = result.merge(&site.default_return());
                    continue;
                };
                let mut found = BTreeSet::new();
                match &names {
                    Some(names) => {
                        for name in names {
                            let filter = MemberFilter::named(name, lookup.ignore_case);
                            effects.mark_type_members(
                                desc.token,
                                lookup.categories,
                                &filter,
                                MarkReason::ReflectionLookup,
                            );
                            found.extend(select_members(host, &desc, lookup.categories, &filter));
                        }
                    }
                    None => effects.mark_type_members(
                        desc.token,
                        lookup.categories,
                        &MemberFilter::ANY,
                        MarkReason::ReflectionLookup,
                    ),
                }
                let unique = if names.is_some() {
                    unique_match(kind, &found)
                } else {
                    None
                };
                result = result.merge(&unique.unwrap_or_else(|| site.default_return()));
            }
            AbstractValue::Null => {}
            other => {
                effects.require_members(
                    &MultiValue::single(other.clone()),
                    lookup.categories,
                    &RequirementTarget::this(&site.callee.method),
                );
                result = result.merge(&site.default_return());
            }
        }
    }
    Some(or_default(result, site))
}

/// The single member a by-name lookup finds, for the kinds whose result can be tracked.
fn unique_match(kind: LookupKind, found: &BTreeSet<MarkedMember>) -> Option<MultiValue> {
    let member_kind = match kind {
        LookupKind::Methods => MemberKind::Method,
        LookupKind::NestedTypes | LookupKind::Interfaces => MemberKind::Type,
        _ => return None,
    };
    let mut matches = found.iter().filter(|m| m.kind == member_kind);
    let (Some(only), None) = (matches.next(), matches.next()) else {
        return None;
    };
    let value = if member_kind == MemberKind::Method {
        AbstractValue::KnownMethod(only.token)
    } else {
        AbstractValue::KnownType(only.token)
    };
    Some(MultiValue::single(value))
}

fn make_generic<H: AnalysisHost + ?Sized>(
    id: IntrinsicId,
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    let code = if id == IntrinsicId::TypeMakeGenericType {
        DiagnosticCode::UnrecognizedMakeGenericType
    } else {
        DiagnosticCode::UnrecognizedMakeGenericMethod
    };
    let host = site.ctx.host;
    let arguments = site.parameter(0)?;
    for value in site.receiver()?.iter() {
        let owner = match (id, value) {
            (IntrinsicId::TypeMakeGenericType, AbstractValue::KnownType(ty)) => {
                GenericOwner::Type(host.resolve_type(*ty).map_or(*ty, |desc| desc.token))
            }
            (IntrinsicId::MethodInfoMakeGenericMethod, AbstractValue::KnownMethod(method)) => {
                GenericOwner::Method(*method)
            }
            (_, AbstractValue::Null) => continue,
            _ => {
                effects.report(
                    code,
                    format!("'{id}' on {value} cannot be statically analyzed"),
                );
                continue;
            }
        };
        let requirements = effects.caches().generic_requirements(host, owner);
        if requirements.iter().all(|r| r.is_empty()) {
            continue;
        }
        for argument in arguments.iter() {
            let array = match argument {
                AbstractValue::Array(array) => array,
                AbstractValue::Null => continue,
                other => {
                    effects.report(
                        code,
                        format!("type arguments {other} of '{id}' are not statically known"),
                    );
                    continue;
                }
            };
            for (index, required) in requirements.iter().enumerate() {
                if required.is_empty() {
                    continue;
                }
                let (Ok(element_index), Ok(param_index)) =
                    (i32::try_from(index), u16::try_from(index))
                else {
                    continue;
                };
                let element = array.element(element_index);
                if element.is_unknown() {
                    effects.report(
                        code,
                        format!("type argument {index} of '{id}' is not statically known"),
                    );
                    continue;
                }
                effects.require_members(
                    &element,
                    *required,
                    &RequirementTarget::generic_parameter(owner, param_index),
                );
            }
        }
    }
    Some(site.default_return())
}

/// Which constructors an activation call can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Activation {
    public: bool,
    non_public: bool,
    /// Parameter count of the invoked constructor, `None` when not known
    arity: Option<usize>,
}

impl Activation {
    const PUBLIC_PARAMETERLESS: Activation = Activation {
        public: true,
        non_public: false,
        arity: Some(0),
    };

    fn from_lookup(lookup: Lookup, arity: Option<usize>) -> Self {
        Activation {
            public: lookup.public || !lookup.non_public,
            non_public: lookup.non_public,
            arity,
        }
    }

    fn requirement(self) -> MemberTypes {
        let mut required = MemberTypes::empty();
        if self.public {
            required |= if self.arity == Some(0) {
                MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR
            } else {
                MemberTypes::PUBLIC_CONSTRUCTORS
            };
        }
        if self.non_public {
            required |= MemberTypes::NON_PUBLIC_CONSTRUCTORS;
        }
        required
    }
}

/// The constructor arity an `object[] args` argument selects.
fn arity(arguments: &MultiValue) -> Option<usize> {
    let mut sizes = arguments.iter().map(|v| match v {
        AbstractValue::Null => Some(0),
        AbstractValue::Array(array) => array
            .constant_size()
            .and_then(|size| usize::try_from(size).ok()),
        _ => None,
    });
    let first = sizes.next()??;
    sizes.all(|size| size == Some(first)).then_some(first)
}

fn mark_constructors<H: AnalysisHost + ?Sized>(
    effects: &Effects<'_, H>,
    ty: Token,
    activation: Activation,
) {
    let host = effects.host();
    let Some(desc) = host.resolve_type(ty) else {
        return;
    };
    effects.mark_type(desc.token, MarkReason::Activation);
    for &token in &desc.methods {
        let Some(method) = host.resolve_method_definition(token) else {
            continue;
        };
        if !method.is_constructor() {
            continue;
        }
        let visible = if method.is_public() {
            activation.public
        } else {
            activation.non_public
        };
        if visible && activation.arity.map_or(true, |n| n == method.param_count()) {
            effects.mark(
                MarkedMember {
                    kind: MemberKind::Method,
                    token,
                },
                MarkReason::Activation,
            );
        }
    }
}

fn create_instance_type<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    use ParamShape::{BindingFlags, Bool, ObjectArray, Other, Type};

    let activation = match site.shapes().as_slice() {
        [Type] => Activation::PUBLIC_PARAMETERLESS,
        [Type, Bool] => Activation {
            non_public: site
                .parameter(1)?
                .iter()
                .any(|v| v.as_const_int() != Some(0)),
            ..Activation::PUBLIC_PARAMETERLESS
        },
        [Type, ObjectArray] | [Type, ObjectArray, ObjectArray] => Activation {
            public: true,
            non_public: false,
            arity: arity(site.parameter(1)?),
        },
        [Type, BindingFlags, Other, ObjectArray, Other]
        | [Type, BindingFlags, Other, ObjectArray, Other, ObjectArray] => Activation::from_lookup(
            Lookup::from_flags(LookupKind::Constructors, site.parameter(1)?),
            arity(site.parameter(3)?),
        ),
        _ => return None,
    };

    let required = activation.requirement();
    let target = RequirementTarget::parameter(&site.callee.method, 0);
    let mut deferred = false;
    let mut settled = false;
    for value in site.parameter(0)?.iter() {
        match value {
            AbstractValue::KnownType(ty) => {
                mark_constructors(effects, *ty, activation);
                settled = true;
            }
            AbstractValue::Null => {}
            AbstractValue::GenericParameter(_) => {
                effects.require_members(&MultiValue::single(value.clone()), required, &target);
                settled = true;
            }
            other => match other.annotation() {
                Some((_, available)) if available.satisfies(required) => settled = true,
                _ if is_runtime_type(site, other) => deferred = true,
                Some(_) => {
                    effects.require_members(&MultiValue::single(other.clone()), required, &target);
                    settled = true;
                }
                None => {
                    effects.require_members(&MultiValue::single(other.clone()), required, &target);
                    deferred = true;
                }
            },
        }
    }
    if deferred {
        trace!("activation at {} defers {required:?} to the created object", effects.origin());
    }

    let mut result = MultiValue::empty();
    if settled {
        result = result.merge(&site.default_return());
    }
    if deferred {
        result = result.merge(&site.return_with(required));
    }
    Some(or_default(result, site))
}

/// The result of `Object.GetType()` on a value whose exact type is not known here. A cast
/// of the created object may still name that type.
fn is_runtime_type<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    value: &AbstractValue,
) -> bool {
    let AbstractValue::MethodReturn(returned) = value else {
        return false;
    };
    let ctx = site.ctx;
    let classified = ctx.caches.intrinsic(returned.method, || {
        ctx.host
            .resolve_method_definition(returned.method)
            .and_then(|desc| IntrinsicId::classify(ctx.host, &desc))
    });
    classified == Some(IntrinsicId::ObjectGetType)
}

fn create_instance_name<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    use ParamShape as P;

    let activation = match site.shapes().as_slice() {
        [P::String, P::String] | [P::String, P::String, P::ObjectArray] => {
            Activation::PUBLIC_PARAMETERLESS
        }
        [P::String, P::String, P::Bool, P::BindingFlags, P::Other, P::ObjectArray, P::Other, P::ObjectArray] => {
            Activation::from_lookup(
                Lookup::from_flags(LookupKind::Constructors, site.parameter(3)?),
                arity(site.parameter(5)?),
            )
        }
        _ => return None,
    };

    let host = site.ctx.host;
    let assemblies = site.parameter(0)?;
    let names = site.parameter(1)?;
    for assembly in assemblies.iter() {
        for name in names.iter() {
            match (assembly, name) {
                (AbstractValue::KnownString(assembly), AbstractValue::KnownString(name)) => {
                    match host.resolve_type_in_assembly(assembly, name) {
                        Some(ty) => {
                            effects.mark_type(ty.token, MarkReason::TypeName);
                            mark_constructors(effects, ty.token, activation);
                        }
                        None => effects.report(
                            DiagnosticCode::UnresolvedTypeName,
                            format!("type '{name}' was not found in assembly '{assembly}'"),
                        ),
                    }
                }
                _ => effects.report(
                    DiagnosticCode::UnrecognizedCreateInstanceName,
                    format!(
                        "'Activator.CreateInstance' with assembly {assembly} and type {name} cannot be statically analyzed"
                    ),
                ),
            }
        }
    }
    Some(site.default_return())
}

fn run_class_constructor<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    let host = site.ctx.host;
    for value in site.parameter(0)?.iter() {
        match value {
            AbstractValue::KnownTypeHandle(ty) => {
                let Some(desc) = host.resolve_type(*ty) else {
                    continue;
                };
                effects.mark_type(desc.token, MarkReason::ClassConstructor);
                for &token in &desc.methods {
                    if host
                        .resolve_method_definition(token)
                        .is_some_and(|m| m.is_static_constructor())
                    {
                        effects.mark(
                            MarkedMember {
                                kind: MemberKind::Method,
                                token,
                            },
                            MarkReason::ClassConstructor,
                        );
                    }
                }
            }
            AbstractValue::Null => {}
            other => effects.report(
                DiagnosticCode::UnrecognizedClassConstructor,
                format!("type handle {other} passed to 'RunClassConstructor' is not statically known"),
            ),
        }
    }
    Some(site.default_return())
}

fn expression_member<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
    categories: MemberTypes,
) -> Option<MultiValue> {
    let shapes = site.shapes();
    let Some(index) = shapes
        .windows(2)
        .position(|pair| pair == [ParamShape::Type, ParamShape::String])
    else {
        return Some(site.default_return());
    };
    let names = constant_strings(site.parameter(index + 1)?);
    for value in site.parameter(index)?.iter() {
        match value {
            AbstractValue::KnownType(ty) => match &names {
                Some(names) => {
                    for name in names {
                        effects.mark_type_members(
                            *ty,
                            categories,
                            &MemberFilter::named(name, false),
                            MarkReason::ReflectionLookup,
                        );
                    }
                }
                None => effects.mark_type_members(
                    *ty,
                    categories,
                    &MemberFilter::ANY,
                    MarkReason::ReflectionLookup,
                ),
            },
            AbstractValue::Null => {}
            other => effects.require_members(
                &MultiValue::single(other.clone()),
                categories,
                &RequirementTarget::parameter(&site.callee.method, index),
            ),
        }
    }
    Some(site.default_return())
}

fn marshal_layout<H: AnalysisHost + ?Sized>(
    site: &CallSite<'_, '_, H>,
    effects: &Effects<'_, H>,
) -> Option<MultiValue> {
    let types = match site.shapes().iter().position(|s| *s == ParamShape::Type) {
        Some(index) => site.parameter(index)?.clone(),
        None => match site.callee.method_args.first() {
            Some(argument) => MultiValue::single(site.ctx.type_value(argument)),
            None => return Some(site.default_return()),
        },
    };
    for value in types.iter() {
        if let AbstractValue::KnownType(ty) = value {
            effects.mark_type_members(
                *ty,
                MemberTypes::PUBLIC_FIELDS | MemberTypes::NON_PUBLIC_FIELDS,
                &MemberFilter::ANY,
                MarkReason::InteropLayout,
            );
        }
    }
    Some(site.default_return())
}
