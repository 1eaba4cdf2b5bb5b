//! Everything the analysis of one method needs to know about its surroundings.

use std::sync::Arc;

use crate::{
    analysis::{
        caches::{AnalysisCaches, MethodAnnotations},
        config::AnalysisConfig,
        requirements::Effects,
        value::{AbstractValue, GenericOwner, GenericParameterValue},
    },
    host::{AnalysisHost, Origin},
    metadata::{
        signatures::TypeSignature,
        token::Token,
        types::{MethodRc, ResolvedMethod},
    },
};

/// The analyzed method under one generic instantiation, with the session it runs in.
pub struct MethodContext<'a, H: ?Sized> {
    /// The host
    pub host: &'a H,
    /// Session memo tables
    pub caches: &'a AnalysisCaches,
    /// Session configuration
    pub config: &'a AnalysisConfig,
    /// The analyzed method
    pub method: MethodRc,
    /// Arguments for the declaring type's generic parameters, empty when uninstantiated
    pub type_args: Vec<TypeSignature>,
    /// Arguments for the method's generic parameters, empty when uninstantiated
    pub method_args: Vec<TypeSignature>,
}

impl<'a, H: AnalysisHost + ?Sized> MethodContext<'a, H> {
    /// Token of the analyzed method.
    pub fn token(&self) -> Token {
        self.method.token
    }

    /// An effect sink attributed to `offset`.
    pub fn effects(&self, offset: u32, enabled: bool) -> Effects<'a, H> {
        Effects::new(
            self.host,
            self.caches,
            Origin::at(self.method.token, offset),
            enabled,
        )
    }

    /// Annotations of the analyzed method.
    pub fn annotations(&self) -> Arc<MethodAnnotations> {
        self.caches.method_annotations(self.host, &self.method)
    }

    /// Applies the analyzed instantiation to a signature found in the body.
    pub fn substitute(&self, signature: &TypeSignature) -> TypeSignature {
        signature.substitute(&self.type_args, &self.method_args)
    }

    /// Resolves a method token referenced by the body and applies the analyzed
    /// instantiation to the reference's own type and method arguments.
    pub fn resolve_callee(&self, token: Token) -> Option<ResolvedMethod> {
        let mut resolved = self.host.resolve_method(token)?;
        for arg in resolved
            .type_args
            .iter_mut()
            .chain(resolved.method_args.iter_mut())
        {
            *arg = self.substitute(arg);
        }
        Some(resolved)
    }

    /// The `System.Type` value of a generic parameter of the analyzed method or its type.
    pub fn generic_parameter(&self, owner: GenericOwner, index: u16) -> GenericParameterValue {
        let requirement = self
            .caches
            .generic_requirements(self.host, owner)
            .get(usize::from(index))
            .copied()
            .unwrap_or_default();
        GenericParameterValue {
            owner,
            index,
            requirement,
        }
    }

    fn owner_of(&self, signature: &TypeSignature) -> Option<(GenericOwner, u16)> {
        match signature {
            TypeSignature::GenericParamType(index) => {
                Some((GenericOwner::Type(self.method.declaring_type), *index))
            }
            TypeSignature::GenericParamMethod(index) => {
                Some((GenericOwner::Method(self.method.token), *index))
            }
            _ => None,
        }
    }

    fn definition_of(&self, signature: &TypeSignature) -> Option<Token> {
        signature.definition().or_else(|| {
            signature
                .well_known_name()
                .and_then(|name| self.host.resolve_type_by_name(name))
                .map(|ty| ty.token)
        })
    }

    /// The `System.Type` value a type signature denotes under the analyzed instantiation.
    ///
    /// Generic parameters that remain after substitution become generic parameter
    /// placeholders; arrays, pointers and unresolvable signatures are unknown.
    pub fn type_value(&self, signature: &TypeSignature) -> AbstractValue {
        let signature = self.substitute(signature);
        if let Some((owner, index)) = self.owner_of(&signature) {
            return AbstractValue::GenericParameter(self.generic_parameter(owner, index));
        }
        self.definition_of(&signature)
            .map_or(AbstractValue::Unknown, AbstractValue::KnownType)
    }

    /// The `RuntimeTypeHandle` value `ldtoken` produces for a type token.
    pub fn type_handle_value(&self, token: Token) -> AbstractValue {
        let signature = self.host.type_signature(token).map(|s| self.substitute(&s));
        match signature {
            Some(signature) => {
                if let Some((owner, index)) = self.owner_of(&signature) {
                    AbstractValue::GenericParameterHandle(self.generic_parameter(owner, index))
                } else {
                    self.definition_of(&signature)
                        .map_or(AbstractValue::Unknown, AbstractValue::KnownTypeHandle)
                }
            }
            None => self
                .host
                .resolve_type(token)
                .map_or(AbstractValue::Unknown, |ty| {
                    AbstractValue::KnownTypeHandle(ty.token)
                }),
        }
    }

    /// The resolved definition of the type a signature names, if any.
    pub fn resolve_signature_type(&self, signature: &TypeSignature) -> Option<Token> {
        self.definition_of(&self.substitute(signature))
    }
}
