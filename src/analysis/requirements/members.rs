//! Member enumeration by category.
//!
//! Given a type and a [`MemberTypes`] set, [`select_members`] returns every member
//! reflection could reach through those categories. The visibility rules follow what
//! `System.Type` exposes:
//!
//! - public methods, fields, properties and events include those inherited from base types
//! - non-public members are only those declared on the type itself
//! - constructors and nested types are never inherited
//! - `Interfaces` covers the interfaces of the type and its base types, transitively
//! - `All` covers everything on the type, its nested types, base types and interfaces
//!
//! A [`MemberFilter`] narrows the selection to members of a given name, the way
//! `GetMethod("Name")` does. Constructors have no name to filter on.

use std::collections::BTreeSet;

use crate::{
    analysis::requirements::MemberTypes,
    host::{MarkedMember, MemberKind, MetadataResolver},
    metadata::{token::Token, types::TypeDesc},
};

/// Restricts a selection to members with a given name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberFilter<'a> {
    name: Option<&'a str>,
    ignore_case: bool,
}

impl<'a> MemberFilter<'a> {
    /// Selects members of any name.
    pub const ANY: MemberFilter<'static> = MemberFilter {
        name: None,
        ignore_case: false,
    };

    /// Selects members named `name`.
    #[must_use]
    pub fn named(name: &'a str, ignore_case: bool) -> Self {
        MemberFilter {
            name: Some(name),
            ignore_case,
        }
    }

    /// Returns `true` if a member called `candidate` passes the filter.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match self.name {
            None => true,
            Some(name) if self.ignore_case => name.eq_ignore_ascii_case(candidate),
            Some(name) => name == candidate,
        }
    }
}

/// Selects the members of `ty` covered by `categories` and passing `filter`.
///
/// The result is ordered by member kind, then token. Members that do not resolve are
/// skipped.
///
/// # Arguments
///
/// * `resolver` - Metadata access for base types, interfaces and member descriptors
/// * `ty` - The type reflection is performed on
/// * `categories` - Requested member categories
/// * `filter` - Name restriction
pub fn select_members<R: MetadataResolver + ?Sized>(
    resolver: &R,
    ty: &TypeDesc,
    categories: MemberTypes,
    filter: &MemberFilter<'_>,
) -> BTreeSet<MarkedMember> {
    let mut collector = Collector {
        resolver,
        selected: BTreeSet::new(),
        visited: BTreeSet::new(),
    };
    if categories == MemberTypes::ALL {
        collector.everything(ty);
    } else if !categories.is_empty() {
        collector.constructors(ty, categories);
        collector.hierarchy(ty, categories, filter);
        if categories.requests(MemberTypes::INTERFACES) {
            collector.interfaces(ty, filter);
        }
    }
    collector.selected
}

struct Collector<'r, R: ?Sized> {
    resolver: &'r R,
    selected: BTreeSet<MarkedMember>,
    visited: BTreeSet<Token>,
}

impl<R: MetadataResolver + ?Sized> Collector<'_, R> {
    fn add(&mut self, kind: MemberKind, token: Token) {
        self.selected.insert(MarkedMember { kind, token });
    }

    fn constructors(&mut self, ty: &TypeDesc, categories: MemberTypes) {
        for &token in &ty.methods {
            let Some(method) = self.resolver.resolve_method_definition(token) else {
                continue;
            };
            let wanted = if method.is_static_constructor() {
                categories.requests(MemberTypes::NON_PUBLIC_CONSTRUCTORS)
            } else if !method.is_constructor() {
                false
            } else if method.is_public() {
                categories.requests(MemberTypes::PUBLIC_CONSTRUCTORS)
                    || (method.param_count() == 0
                        && categories.requests(MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR))
            } else {
                categories.requests(MemberTypes::NON_PUBLIC_CONSTRUCTORS)
            };
            if wanted {
                self.add(MemberKind::Method, token);
            }
        }
    }

    fn hierarchy(&mut self, ty: &TypeDesc, categories: MemberTypes, filter: &MemberFilter<'_>) {
        let mut declared = true;
        let mut current = Some(ty.token);
        let mut seen = BTreeSet::new();
        while let Some(token) = current {
            if !seen.insert(token) {
                break;
            }
            let Some(ty) = self.resolver.resolve_type(token) else {
                break;
            };
            self.methods(&ty, categories, filter, declared);
            self.fields(&ty, categories, filter, declared);
            self.properties(&ty, categories, filter, declared);
            self.events(&ty, categories, filter, declared);
            if declared {
                self.nested_types(&ty, categories, filter);
            }
            declared = false;
            current = ty.extends;
        }
    }

    fn wanted(
        categories: MemberTypes,
        public: bool,
        declared: bool,
        public_category: MemberTypes,
        non_public_category: MemberTypes,
    ) -> bool {
        if public {
            categories.requests(public_category)
        } else {
            declared && categories.requests(non_public_category)
        }
    }

    fn methods(
        &mut self,
        ty: &TypeDesc,
        categories: MemberTypes,
        filter: &MemberFilter<'_>,
        declared: bool,
    ) {
        for &token in &ty.methods {
            let Some(method) = self.resolver.resolve_method_definition(token) else {
                continue;
            };
            if method.is_any_constructor() || !filter.matches(&method.name) {
                continue;
            }
            if Self::wanted(
                categories,
                method.is_public(),
                declared,
                MemberTypes::PUBLIC_METHODS,
                MemberTypes::NON_PUBLIC_METHODS,
            ) {
                self.add(MemberKind::Method, token);
            }
        }
    }

    fn fields(
        &mut self,
        ty: &TypeDesc,
        categories: MemberTypes,
        filter: &MemberFilter<'_>,
        declared: bool,
    ) {
        for &token in &ty.fields {
            let Some(field) = self.resolver.resolve_field(token) else {
                continue;
            };
            if filter.matches(&field.name)
                && Self::wanted(
                    categories,
                    field.is_public(),
                    declared,
                    MemberTypes::PUBLIC_FIELDS,
                    MemberTypes::NON_PUBLIC_FIELDS,
                )
            {
                self.add(MemberKind::Field, token);
            }
        }
    }

    fn accessors_public(&self, accessors: impl Iterator<Item = Token>) -> bool {
        accessors
            .filter_map(|token| self.resolver.resolve_method_definition(token))
            .any(|method| method.is_public())
    }

    fn properties(
        &mut self,
        ty: &TypeDesc,
        categories: MemberTypes,
        filter: &MemberFilter<'_>,
        declared: bool,
    ) {
        for &token in &ty.properties {
            let Some(property) = self.resolver.resolve_property(token) else {
                continue;
            };
            if !filter.matches(&property.name) {
                continue;
            }
            let public = self.accessors_public(property.accessors());
            if Self::wanted(
                categories,
                public,
                declared,
                MemberTypes::PUBLIC_PROPERTIES,
                MemberTypes::NON_PUBLIC_PROPERTIES,
            ) {
                self.add(MemberKind::Property, token);
                for accessor in property.accessors() {
                    self.add(MemberKind::Method, accessor);
                }
            }
        }
    }

    fn events(
        &mut self,
        ty: &TypeDesc,
        categories: MemberTypes,
        filter: &MemberFilter<'_>,
        declared: bool,
    ) {
        for &token in &ty.events {
            let Some(event) = self.resolver.resolve_event(token) else {
                continue;
            };
            if !filter.matches(&event.name) {
                continue;
            }
            let public = self.accessors_public(event.accessors());
            if Self::wanted(
                categories,
                public,
                declared,
                MemberTypes::PUBLIC_EVENTS,
                MemberTypes::NON_PUBLIC_EVENTS,
            ) {
                self.add(MemberKind::Event, token);
                for accessor in event.accessors() {
                    self.add(MemberKind::Method, accessor);
                }
            }
        }
    }

    fn nested_types(&mut self, ty: &TypeDesc, categories: MemberTypes, filter: &MemberFilter<'_>) {
        for &token in &ty.nested_types {
            let Some(nested) = self.resolver.resolve_type(token) else {
                continue;
            };
            if filter.matches(&nested.name)
                && Self::wanted(
                    categories,
                    nested.is_public(),
                    true,
                    MemberTypes::PUBLIC_NESTED_TYPES,
                    MemberTypes::NON_PUBLIC_NESTED_TYPES,
                )
            {
                self.add(MemberKind::Type, token);
            }
        }
    }

    fn interfaces(&mut self, ty: &TypeDesc, filter: &MemberFilter<'_>) {
        let mut pending: Vec<Token> = Vec::new();
        let mut current = Some(ty.token);
        let mut seen = BTreeSet::new();
        while let Some(token) = current {
            if !seen.insert(token) {
                break;
            }
            let Some(ty) = self.resolver.resolve_type(token) else {
                break;
            };
            pending.extend(ty.interfaces.iter().copied());
            current = ty.extends;
        }

        let mut done = BTreeSet::new();
        while let Some(token) = pending.pop() {
            if !done.insert(token) {
                continue;
            }
            let Some(interface) = self.resolver.resolve_type(token) else {
                continue;
            };
            if filter.matches(&interface.name) || filter.matches(&interface.full_name) {
                self.add(MemberKind::Type, interface.token);
            }
            pending.extend(interface.interfaces.iter().copied());
        }
    }

    fn everything(&mut self, ty: &TypeDesc) {
        if !self.visited.insert(ty.token) {
            return;
        }
        for &token in &ty.methods {
            self.add(MemberKind::Method, token);
        }
        for &token in &ty.fields {
            self.add(MemberKind::Field, token);
        }
        for &token in &ty.properties {
            self.add(MemberKind::Property, token);
            if let Some(property) = self.resolver.resolve_property(token) {
                for accessor in property.accessors() {
                    self.add(MemberKind::Method, accessor);
                }
            }
        }
        for &token in &ty.events {
            self.add(MemberKind::Event, token);
            if let Some(event) = self.resolver.resolve_event(token) {
                for accessor in event.accessors() {
                    self.add(MemberKind::Method, accessor);
                }
            }
        }
        let related = ty
            .nested_types
            .iter()
            .chain(&ty.interfaces)
            .chain(ty.extends.as_ref())
            .copied()
            .collect::<Vec<_>>();
        for token in related {
            if let Some(other) = self.resolver.resolve_type(token) {
                self.add(MemberKind::Type, other.token);
                self.everything(&other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::MetadataStore,
        test::{fixture, Fixture},
    };

    fn methods(selected: &BTreeSet<MarkedMember>) -> Vec<Token> {
        selected
            .iter()
            .filter(|m| m.kind == MemberKind::Method)
            .map(|m| m.token)
            .collect()
    }

    fn select(store: &MetadataStore, ty: Token, categories: MemberTypes) -> BTreeSet<MarkedMember> {
        let desc = store.resolve_type(ty).unwrap();
        select_members(store, &desc, categories, &MemberFilter::ANY)
    }

    #[test]
    fn parameterless_constructor_only() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR);
        assert_eq!(methods(&selected), vec![app.foo_ctor]);
    }

    #[test]
    fn public_constructors_include_parameterized() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::PUBLIC_CONSTRUCTORS);
        assert_eq!(methods(&selected), vec![app.foo_ctor, app.foo_ctor_int]);
    }

    #[test]
    fn public_methods_walk_base_types() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::PUBLIC_METHODS);
        let tokens = methods(&selected);
        assert!(tokens.contains(&app.foo_run));
        assert!(tokens.contains(&app.base_describe));
        assert!(!tokens.contains(&app.foo_secret));
        assert!(!tokens.contains(&app.base_hidden));
    }

    #[test]
    fn non_public_methods_are_declared_only() {
        let Fixture { store, app, .. } = fixture();
        let tokens = methods(&select(&store, app.foo, MemberTypes::NON_PUBLIC_METHODS));
        assert_eq!(tokens, vec![app.foo_secret]);
    }

    #[test]
    fn name_filter() {
        let Fixture { store, app, .. } = fixture();
        let desc = store.resolve_type(app.foo).unwrap();
        let selected = select_members(
            &store,
            &desc,
            MemberTypes::PUBLIC_METHODS | MemberTypes::NON_PUBLIC_METHODS,
            &MemberFilter::named("secret", true),
        );
        assert_eq!(methods(&selected), vec![app.foo_secret]);
        assert!(MemberFilter::named("Run", false).matches("Run"));
        assert!(!MemberFilter::named("run", false).matches("Run"));
    }

    #[test]
    fn properties_bring_accessors() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::PUBLIC_PROPERTIES);
        assert!(selected.contains(&MarkedMember {
            kind: MemberKind::Property,
            token: app.foo_name
        }));
        assert_eq!(methods(&selected), vec![app.foo_get_name]);
    }

    #[test]
    fn interfaces_are_transitive() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::INTERFACES);
        let types: Vec<Token> = selected.iter().map(|m| m.token).collect();
        assert_eq!(types, vec![app.runnable, app.marker]);
    }

    #[test]
    fn all_covers_base_and_nested() {
        let Fixture { store, app, .. } = fixture();
        let selected = select(&store, app.foo, MemberTypes::ALL);
        let tokens: BTreeSet<Token> = selected.iter().map(|m| m.token).collect();
        assert!(tokens.contains(&app.base));
        assert!(tokens.contains(&app.base_hidden));
        assert!(tokens.contains(&app.foo_secret));
        assert!(tokens.contains(&app.foo_nested));
        assert!(tokens.contains(&app.marker));
    }
}
