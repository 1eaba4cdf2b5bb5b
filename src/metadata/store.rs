//! In-memory metadata registry.
//!
//! [`MetadataStore`] is populated through `add_*` calls and then answers the
//! [`MetadataResolver`], [`AnnotationProvider`] and [`FieldValueProvider`] queries of the
//! analysis. Tokens are allocated per table in insertion order, starting at row 1, so a
//! store built the same way always hands out the same tokens.
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotreach::metadata::{MetadataStore, types::{TypeAttributes, MethodAttributes}};
//!
//! let mut store = MetadataStore::new();
//! let object = store.add_type("System.Runtime", "System", "Object", TypeAttributes::PUBLIC, None);
//! let foo = store.add_type("App", "App", "Foo", TypeAttributes::PUBLIC, Some(object));
//! let ctor = store.add_method(
//!     foo,
//!     ".ctor",
//!     MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME,
//!     SignatureMethod::new_instance(TypeSignature::Void, vec![]),
//! );
//! assert_eq!(store.resolve_type_by_name("App.Foo").map(|t| t.token), Some(foo));
//! ```

use std::{collections::BTreeMap, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        requirements::MemberTypes,
        value::{AbstractValue, ArraySite, ArrayValue, GenericOwner, MultiValue},
    },
    host::{AnnotationProvider, FieldValueProvider, MetadataResolver},
    metadata::{
        body::MethodBody,
        marshalling::NativeType,
        signatures::{SignatureMethod, TypeSignature},
        token::{table, Token},
        types::{
            EventDesc, EventRc, FieldAttributes, FieldDesc, FieldRc, GenericParamDesc,
            MethodAttributes, MethodDesc, MethodRc, PropertyDesc, PropertyRc, ResolvedMethod,
            TypeAttributes, TypeDesc, TypeRc,
        },
    },
};

#[derive(Debug, Clone)]
struct MemberRef {
    target: Token,
    type_args: Vec<TypeSignature>,
}

#[derive(Debug, Clone)]
struct MethodSpec {
    method: Token,
    method_args: Vec<TypeSignature>,
}

/// A builder-populated metadata registry.
#[derive(Debug, Default)]
pub struct MetadataStore {
    next_row: FxHashMap<u8, u32>,
    types: BTreeMap<Token, TypeRc>,
    methods: BTreeMap<Token, MethodRc>,
    fields: BTreeMap<Token, FieldRc>,
    properties: BTreeMap<Token, PropertyRc>,
    events: BTreeMap<Token, EventRc>,
    type_refs: FxHashMap<Token, Token>,
    type_specs: FxHashMap<Token, TypeSignature>,
    member_refs: FxHashMap<Token, MemberRef>,
    method_specs: FxHashMap<Token, MethodSpec>,
    call_sites: FxHashMap<Token, SignatureMethod>,
    bodies: FxHashMap<Token, Arc<MethodBody>>,
    names: BTreeMap<String, Token>,
    assembly_names: BTreeMap<(String, String), Token>,
    parameter_annotations: FxHashMap<(Token, u16), MemberTypes>,
    return_annotations: FxHashMap<Token, MemberTypes>,
    this_annotations: FxHashMap<Token, MemberTypes>,
    field_annotations: FxHashMap<Token, MemberTypes>,
    generic_annotations: FxHashMap<(GenericOwner, u16), MemberTypes>,
    requires_unreferenced_code: FxHashMap<Token, String>,
    field_values: FxHashMap<Token, MultiValue>,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, table: u8) -> Token {
        let row = self.next_row.entry(table).or_insert(1);
        let token = Token::from_parts(table, *row);
        *row += 1;
        token
    }

    fn update_type(&mut self, token: Token, f: impl FnOnce(&mut TypeDesc)) {
        if let Some(ty) = self.types.get_mut(&token) {
            f(Arc::make_mut(ty));
        }
    }

    fn update_method(&mut self, token: Token, f: impl FnOnce(&mut MethodDesc)) {
        if let Some(method) = self.methods.get_mut(&token) {
            f(Arc::make_mut(method));
        }
    }

    /// Defines a top-level type and returns its `TypeDef` token.
    pub fn add_type(
        &mut self,
        assembly: &str,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
        extends: Option<Token>,
    ) -> Token {
        let full_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        };
        self.insert_type(assembly, namespace, name, full_name, flags, extends, None)
    }

    /// Defines a type nested in `enclosing`; its full name is `Outer+Inner`.
    pub fn add_nested_type(
        &mut self,
        enclosing: Token,
        name: &str,
        flags: TypeAttributes,
        extends: Option<Token>,
    ) -> Token {
        let (assembly, full_name) = match self.types.get(&enclosing) {
            Some(outer) => (outer.assembly.clone(), format!("{}+{name}", outer.full_name)),
            None => (String::new(), name.to_string()),
        };
        let token = self.insert_type(&assembly, "", name, full_name, flags, extends, Some(enclosing));
        self.update_type(enclosing, |outer| outer.nested_types.push(token));
        token
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_type(
        &mut self,
        assembly: &str,
        namespace: &str,
        name: &str,
        full_name: String,
        flags: TypeAttributes,
        extends: Option<Token>,
        enclosing: Option<Token>,
    ) -> Token {
        let token = self.allocate(table::TYPE_DEF);
        self.names.entry(full_name.clone()).or_insert(token);
        self.assembly_names
            .entry((assembly.to_string(), full_name.clone()))
            .or_insert(token);
        self.types.insert(
            token,
            Arc::new(TypeDesc {
                token,
                assembly: assembly.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                full_name,
                flags,
                extends,
                enclosing,
                interfaces: Vec::new(),
                generic_params: Vec::new(),
                methods: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
                nested_types: Vec::new(),
            }),
        );
        token
    }

    /// Records that `ty` implements `interface`.
    pub fn add_interface_impl(&mut self, ty: Token, interface: Token) {
        self.update_type(ty, |desc| desc.interfaces.push(interface));
    }

    /// Declares the generic parameters of a type or method.
    pub fn set_generic_params(&mut self, owner: GenericOwner, params: Vec<GenericParamDesc>) {
        match owner {
            GenericOwner::Type(token) => {
                self.update_type(token, |desc| desc.generic_params = params);
            }
            GenericOwner::Method(token) => {
                self.update_method(token, |desc| {
                    desc.signature.generic_param_count =
                        u16::try_from(params.len()).unwrap_or(u16::MAX);
                    desc.generic_params = params;
                });
            }
        }
    }

    /// Defines a method on `declaring` and returns its `MethodDef` token.
    ///
    /// The `has_this` flag of the signature is derived from `flags`.
    pub fn add_method(
        &mut self,
        declaring: Token,
        name: &str,
        flags: MethodAttributes,
        mut signature: SignatureMethod,
    ) -> Token {
        let token = self.allocate(table::METHOD_DEF);
        signature.has_this = !flags.contains(MethodAttributes::STATIC);
        let param_names = (0..signature.params.len()).map(|i| format!("arg{i}")).collect();
        self.methods.insert(
            token,
            Arc::new(MethodDesc {
                token,
                declaring_type: declaring,
                name: name.to_string(),
                flags,
                signature,
                generic_params: Vec::new(),
                param_names,
                return_marshal: None,
                param_marshal: Vec::new(),
            }),
        );
        self.update_type(declaring, |desc| desc.methods.push(token));
        token
    }

    /// Attaches a body to a method definition.
    pub fn set_method_body(&mut self, method: Token, body: MethodBody) {
        self.bodies.insert(method, Arc::new(body));
    }

    /// Sets the marshalling descriptors of a p/invoke method.
    pub fn set_marshalling(
        &mut self,
        method: Token,
        return_marshal: Option<NativeType>,
        param_marshal: Vec<Option<NativeType>>,
    ) {
        self.update_method(method, |desc| {
            desc.return_marshal = return_marshal;
            desc.param_marshal = param_marshal;
        });
    }

    /// Defines a field and returns its `Field` token.
    pub fn add_field(
        &mut self,
        declaring: Token,
        name: &str,
        flags: FieldAttributes,
        signature: TypeSignature,
    ) -> Token {
        let token = self.allocate(table::FIELD);
        self.fields.insert(
            token,
            Arc::new(FieldDesc {
                token,
                declaring_type: declaring,
                name: name.to_string(),
                flags,
                signature,
            }),
        );
        self.update_type(declaring, |desc| desc.fields.push(token));
        token
    }

    /// Defines a property and returns its `Property` token.
    pub fn add_property(
        &mut self,
        declaring: Token,
        name: &str,
        getter: Option<Token>,
        setter: Option<Token>,
    ) -> Token {
        let token = self.allocate(table::PROPERTY);
        self.properties.insert(
            token,
            Arc::new(PropertyDesc {
                token,
                declaring_type: declaring,
                name: name.to_string(),
                getter,
                setter,
            }),
        );
        self.update_type(declaring, |desc| desc.properties.push(token));
        token
    }

    /// Defines an event and returns its `Event` token.
    pub fn add_event(
        &mut self,
        declaring: Token,
        name: &str,
        add: Option<Token>,
        remove: Option<Token>,
        raise: Option<Token>,
    ) -> Token {
        let token = self.allocate(table::EVENT);
        self.events.insert(
            token,
            Arc::new(EventDesc {
                token,
                declaring_type: declaring,
                name: name.to_string(),
                add,
                remove,
                raise,
            }),
        );
        self.update_type(declaring, |desc| desc.events.push(token));
        token
    }

    /// Adds a `TypeRef` resolving to the definition `target`.
    pub fn add_type_ref(&mut self, target: Token) -> Token {
        let token = self.allocate(table::TYPE_REF);
        self.type_refs.insert(token, target);
        token
    }

    /// Adds a `TypeSpec` for `signature`.
    pub fn add_type_spec(&mut self, signature: TypeSignature) -> Token {
        let token = self.allocate(table::TYPE_SPEC);
        self.type_specs.insert(token, signature);
        token
    }

    /// Adds a `MemberRef` to a method or field, optionally through an instantiated parent
    /// type.
    pub fn add_member_ref(&mut self, target: Token, type_args: Vec<TypeSignature>) -> Token {
        let token = self.allocate(table::MEMBER_REF);
        self.member_refs.insert(token, MemberRef { target, type_args });
        token
    }

    /// Adds a `MethodSpec` instantiating the generic method `method`.
    pub fn add_method_spec(&mut self, method: Token, method_args: Vec<TypeSignature>) -> Token {
        let token = self.allocate(table::METHOD_SPEC);
        self.method_specs.insert(
            token,
            MethodSpec {
                method,
                method_args,
            },
        );
        token
    }

    /// Adds a `StandAloneSig` describing a `calli` call site.
    pub fn add_call_site_signature(&mut self, signature: SignatureMethod) -> Token {
        let token = self.allocate(table::STANDALONE_SIG);
        self.call_sites.insert(token, signature);
        token
    }

    /// Annotates a declared parameter (`index` excludes `this`).
    pub fn annotate_parameter(&mut self, method: Token, index: u16, requirement: MemberTypes) {
        self.parameter_annotations.insert((method, index), requirement);
    }

    /// Annotates a method's return value.
    pub fn annotate_return(&mut self, method: Token, requirement: MemberTypes) {
        self.return_annotations.insert(method, requirement);
    }

    /// Annotates the implicit `this` of an instance method.
    pub fn annotate_this(&mut self, method: Token, requirement: MemberTypes) {
        self.this_annotations.insert(method, requirement);
    }

    /// Annotates a field.
    pub fn annotate_field(&mut self, field: Token, requirement: MemberTypes) {
        self.field_annotations.insert(field, requirement);
    }

    /// Annotates a generic parameter.
    pub fn annotate_generic_parameter(
        &mut self,
        owner: GenericOwner,
        index: u16,
        requirement: MemberTypes,
    ) {
        self.generic_annotations.insert((owner, index), requirement);
    }

    /// Marks a method as requiring unreferenced code.
    pub fn set_requires_unreferenced_code(&mut self, method: Token, message: &str) {
        self.requires_unreferenced_code
            .insert(method, message.to_string());
    }

    /// Declares the statically known contents of a field.
    pub fn set_field_value(&mut self, field: Token, value: MultiValue) {
        self.field_values.insert(field, value);
    }

    /// All type definitions in token order.
    pub fn types(&self) -> impl Iterator<Item = &TypeRc> + '_ {
        self.types.values()
    }

    /// All method definitions in token order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodRc> + '_ {
        self.methods.values()
    }

    /// Looks up a method definition by declaring type and name.
    #[must_use]
    pub fn find_method(&self, declaring: Token, name: &str) -> Option<Token> {
        let ty = self.types.get(&declaring)?;
        ty.methods
            .iter()
            .copied()
            .find(|m| self.methods.get(m).is_some_and(|desc| desc.name == name))
    }

    /// Looks up a field definition by declaring type and name.
    #[must_use]
    pub fn find_field(&self, declaring: Token, name: &str) -> Option<Token> {
        let ty = self.types.get(&declaring)?;
        ty.fields
            .iter()
            .copied()
            .find(|f| self.fields.get(f).is_some_and(|desc| desc.name == name))
    }

    fn is_value_type(&self, ty: &TypeDesc) -> bool {
        ty.extends
            .and_then(|base| self.types.get(&base))
            .is_some_and(|base| {
                (base.full_name == "System.ValueType" || base.full_name == "System.Enum")
                    && ty.full_name != "System.Enum"
            })
    }

    fn well_known_field_value(&self, field: &FieldDesc) -> Option<MultiValue> {
        let declaring = self.types.get(&field.declaring_type)?;
        match (declaring.full_name.as_str(), field.name.as_str()) {
            ("System.String", "Empty") => Some(MultiValue::single(AbstractValue::string(""))),
            ("System.Type", "EmptyTypes") => Some(MultiValue::single(AbstractValue::Array(
                ArrayValue::new(
                    ArraySite {
                        method: field.token,
                        offset: 0,
                    },
                    MultiValue::single(AbstractValue::ConstInt(0)),
                ),
            ))),
            _ => None,
        }
    }
}

impl MetadataResolver for MetadataStore {
    fn resolve_type(&self, token: Token) -> Option<TypeRc> {
        match token.table() {
            table::TYPE_DEF => self.types.get(&token).cloned(),
            table::TYPE_REF => self
                .type_refs
                .get(&token)
                .and_then(|target| self.types.get(target).cloned()),
            table::TYPE_SPEC => self
                .type_specs
                .get(&token)
                .and_then(TypeSignature::definition)
                .and_then(|definition| self.resolve_type(definition)),
            _ => None,
        }
    }

    fn resolve_method(&self, token: Token) -> Option<ResolvedMethod> {
        match token.table() {
            table::METHOD_DEF => self
                .methods
                .get(&token)
                .cloned()
                .map(ResolvedMethod::definition),
            table::MEMBER_REF => {
                let reference = self.member_refs.get(&token)?;
                let method = self.methods.get(&reference.target)?.clone();
                Some(ResolvedMethod {
                    method,
                    type_args: reference.type_args.clone(),
                    method_args: Vec::new(),
                })
            }
            table::METHOD_SPEC => {
                let spec = self.method_specs.get(&token)?;
                let mut resolved = self.resolve_method(spec.method)?;
                resolved.method_args.clone_from(&spec.method_args);
                Some(resolved)
            }
            _ => None,
        }
    }

    fn resolve_field(&self, token: Token) -> Option<FieldRc> {
        match token.table() {
            table::FIELD => self.fields.get(&token).cloned(),
            table::MEMBER_REF => self
                .member_refs
                .get(&token)
                .and_then(|reference| self.fields.get(&reference.target).cloned()),
            _ => None,
        }
    }

    fn resolve_property(&self, token: Token) -> Option<PropertyRc> {
        self.properties.get(&token).cloned()
    }

    fn resolve_event(&self, token: Token) -> Option<EventRc> {
        self.events.get(&token).cloned()
    }

    fn resolve_type_by_name(&self, full_name: &str) -> Option<TypeRc> {
        self.names
            .get(full_name)
            .and_then(|token| self.types.get(token).cloned())
    }

    fn resolve_type_in_assembly(&self, assembly: &str, full_name: &str) -> Option<TypeRc> {
        self.assembly_names
            .get(&(assembly.to_string(), full_name.to_string()))
            .and_then(|token| self.types.get(token).cloned())
    }

    fn method_body(&self, method: Token) -> Option<Arc<MethodBody>> {
        self.bodies.get(&method).cloned()
    }

    fn call_site_signature(&self, token: Token) -> Option<SignatureMethod> {
        self.call_sites.get(&token).cloned()
    }

    fn type_signature(&self, token: Token) -> Option<TypeSignature> {
        match token.table() {
            table::TYPE_SPEC => self.type_specs.get(&token).cloned(),
            table::TYPE_DEF | table::TYPE_REF => {
                let ty = self.resolve_type(token)?;
                Some(if self.is_value_type(&ty) {
                    TypeSignature::ValueType(ty.token)
                } else {
                    TypeSignature::Class(ty.token)
                })
            }
            _ => None,
        }
    }
}

impl AnnotationProvider for MetadataStore {
    fn parameter_requirement(&self, method: Token, index: u16) -> MemberTypes {
        self.parameter_annotations
            .get(&(method, index))
            .copied()
            .unwrap_or_default()
    }

    fn return_requirement(&self, method: Token) -> MemberTypes {
        self.return_annotations
            .get(&method)
            .copied()
            .unwrap_or_default()
    }

    fn this_requirement(&self, method: Token) -> MemberTypes {
        self.this_annotations.get(&method).copied().unwrap_or_default()
    }

    fn field_requirement(&self, field: Token) -> MemberTypes {
        self.field_annotations.get(&field).copied().unwrap_or_default()
    }

    fn generic_parameter_requirement(&self, owner: GenericOwner, index: u16) -> MemberTypes {
        self.generic_annotations
            .get(&(owner, index))
            .copied()
            .unwrap_or_default()
    }

    fn requires_unreferenced_code(&self, method: Token) -> Option<String> {
        self.requires_unreferenced_code.get(&method).cloned()
    }
}

impl FieldValueProvider for MetadataStore {
    fn field_value(&self, field: Token) -> Option<MultiValue> {
        let desc = self.resolve_field(field)?;
        self.field_values
            .get(&desc.token)
            .cloned()
            .or_else(|| self.well_known_field_value(&desc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (MetadataStore, Token, Token) {
        let mut store = MetadataStore::new();
        let object = store.add_type(
            "System.Runtime",
            "System",
            "Object",
            TypeAttributes::PUBLIC,
            None,
        );
        let list = store.add_type(
            "App",
            "App",
            "List`1",
            TypeAttributes::PUBLIC,
            Some(object),
        );
        (store, object, list)
    }

    #[test]
    fn tokens_are_allocated_per_table() {
        let (mut store, object, list) = store();
        assert_eq!(object, Token::new(0x0200_0001));
        assert_eq!(list, Token::new(0x0200_0002));
        let field = store.add_field(list, "items", FieldAttributes::PRIVATE, TypeSignature::Object);
        assert_eq!(field, Token::new(0x0400_0001));
        assert_eq!(store.find_field(list, "items"), Some(field));
    }

    #[test]
    fn nested_names() {
        let (mut store, _, list) = store();
        let inner = store.add_nested_type(list, "Enumerator", TypeAttributes::NESTED_PUBLIC, None);
        let resolved = store.resolve_type_by_name("App.List`1+Enumerator").unwrap();
        assert_eq!(resolved.token, inner);
        assert_eq!(resolved.enclosing, Some(list));
        assert_eq!(store.resolve_type(list).unwrap().nested_types, vec![inner]);
        assert!(store.resolve_type_in_assembly("App", "App.List`1").is_some());
        assert!(store.resolve_type_in_assembly("Other", "App.List`1").is_none());
    }

    #[test]
    fn member_ref_and_method_spec_carry_instantiation() {
        let (mut store, object, list) = store();
        let add = store.add_method(
            list,
            "Add",
            MethodAttributes::PUBLIC,
            SignatureMethod::new_instance(
                TypeSignature::Void,
                vec![TypeSignature::GenericParamType(0)],
            ),
        );
        let reference = store.add_member_ref(add, vec![TypeSignature::Class(object)]);
        let spec = store.add_method_spec(reference, vec![TypeSignature::String]);

        let resolved = store.resolve_method(spec).unwrap();
        assert_eq!(resolved.method.token, add);
        assert_eq!(resolved.type_args, vec![TypeSignature::Class(object)]);
        assert_eq!(resolved.method_args, vec![TypeSignature::String]);
        assert_eq!(
            resolved.instantiated_signature().params,
            vec![TypeSignature::Class(object)]
        );
        assert!(resolved.method.has_this());
    }

    #[test]
    fn well_known_fields() {
        let (mut store, object, _) = store();
        let string = store.add_type("System.Runtime", "System", "String", TypeAttributes::PUBLIC, Some(object));
        let empty = store.add_field(
            string,
            "Empty",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::INIT_ONLY,
            TypeSignature::String,
        );
        assert_eq!(
            store.field_value(empty),
            Some(MultiValue::single(AbstractValue::string("")))
        );
    }

    #[test]
    fn value_types_get_value_type_signatures() {
        let (mut store, object, _) = store();
        let value_type = store.add_type("System.Runtime", "System", "ValueType", TypeAttributes::PUBLIC, Some(object));
        let point = store.add_type("App", "App", "Point", TypeAttributes::PUBLIC | TypeAttributes::SEALED, Some(value_type));
        assert_eq!(store.type_signature(point), Some(TypeSignature::ValueType(point)));
        let reference = store.add_type_ref(point);
        assert_eq!(store.resolve_type(reference).unwrap().token, point);
    }
}
