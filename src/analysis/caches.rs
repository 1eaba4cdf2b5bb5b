//! Per-session memo tables.
//!
//! Annotation lookups, intrinsic classification and type name resolution are asked
//! repeatedly for the same members while a batch of methods is analyzed. The answers only
//! depend on the host's metadata, which is immutable for the lifetime of a session, so
//! they are memoized here. All tables are `DashMap`s and can be shared by the methods a
//! batch analyzes in parallel.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    analysis::{intrinsics::IntrinsicId, requirements::MemberTypes, value::GenericOwner},
    host::AnalysisHost,
    metadata::{
        token::Token,
        types::{GenericParamDesc, MethodDesc},
    },
};

/// Requirements declared on a method's signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodAnnotations {
    /// Requirement of each declared parameter, `this` excluded
    pub parameters: Vec<MemberTypes>,
    /// Requirement of the return value
    pub return_value: MemberTypes,
    /// Requirement of the implicit `this`
    pub this: MemberTypes,
    /// Message of a `RequiresUnreferencedCode` attribute
    pub requires_unreferenced_code: Option<String>,
}

impl MethodAnnotations {
    /// Requirement of parameter `index`.
    #[must_use]
    pub fn parameter(&self, index: usize) -> MemberTypes {
        self.parameters.get(index).copied().unwrap_or_default()
    }

    /// Returns `true` if any parameter or `this` carries a requirement.
    #[must_use]
    pub fn has_parameter_requirements(&self) -> bool {
        !self.this.is_empty() || self.parameters.iter().any(|r| !r.is_empty())
    }
}

/// Memo tables owned by an analysis session.
#[derive(Debug, Default)]
pub struct AnalysisCaches {
    methods: DashMap<Token, Arc<MethodAnnotations>>,
    generics: DashMap<GenericOwner, Arc<[MemberTypes]>>,
    intrinsics: DashMap<Token, Option<IntrinsicId>>,
    type_names: DashMap<String, Option<Arc<[Token]>>>,
}

impl AnalysisCaches {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotations of `method`, memoized by definition token.
    pub fn method_annotations<H: AnalysisHost + ?Sized>(
        &self,
        host: &H,
        method: &MethodDesc,
    ) -> Arc<MethodAnnotations> {
        if let Some(cached) = self.methods.get(&method.token) {
            return cached.clone();
        }
        let parameters = (0..method.param_count())
            .map(|i| {
                u16::try_from(i).map_or(MemberTypes::empty(), |i| {
                    host.parameter_requirement(method.token, i)
                })
            })
            .collect();
        let annotations = Arc::new(MethodAnnotations {
            parameters,
            return_value: host.return_requirement(method.token),
            this: if method.has_this() {
                host.this_requirement(method.token)
            } else {
                MemberTypes::empty()
            },
            requires_unreferenced_code: host.requires_unreferenced_code(method.token),
        });
        self.methods
            .entry(method.token)
            .or_insert(annotations)
            .clone()
    }

    /// Requirement of every generic parameter of `owner`.
    ///
    /// A `new()` constraint counts as a requirement for the public parameterless
    /// constructor.
    pub fn generic_requirements<H: AnalysisHost + ?Sized>(
        &self,
        host: &H,
        owner: GenericOwner,
    ) -> Arc<[MemberTypes]> {
        if let Some(cached) = self.generics.get(&owner) {
            return cached.clone();
        }
        let params: Vec<GenericParamDesc> = match owner {
            GenericOwner::Type(token) => host
                .resolve_type(token)
                .map(|ty| ty.generic_params.clone())
                .unwrap_or_default(),
            GenericOwner::Method(token) => host
                .resolve_method_definition(token)
                .map(|m| m.generic_params.clone())
                .unwrap_or_default(),
        };
        let requirements: Arc<[MemberTypes]> = params
            .iter()
            .map(|param| {
                let mut required = host.generic_parameter_requirement(owner, param.index);
                if param.has_default_constructor_constraint() {
                    required |= MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR;
                }
                required
            })
            .collect();
        self.generics.entry(owner).or_insert(requirements).clone()
    }

    /// Memoized intrinsic classification of a method definition.
    pub fn intrinsic(
        &self,
        method: Token,
        classify: impl FnOnce() -> Option<IntrinsicId>,
    ) -> Option<IntrinsicId> {
        if let Some(cached) = self.intrinsics.get(&method) {
            return *cached;
        }
        *self.intrinsics.entry(method).or_insert_with(classify)
    }

    /// Memoized resolution of a reflection type name.
    ///
    /// The resolved tokens list the named type first, followed by the types named by its
    /// generic arguments.
    pub fn type_name(
        &self,
        name: &str,
        resolve: impl FnOnce() -> Option<Arc<[Token]>>,
    ) -> Option<Arc<[Token]>> {
        if let Some(cached) = self.type_names.get(name) {
            return cached.clone();
        }
        self.type_names
            .entry(name.to_string())
            .or_insert_with(resolve)
            .clone()
    }

    /// Number of memoized method annotation records.
    #[must_use]
    pub fn annotated_method_count(&self) -> usize {
        self.methods.len()
    }
}
