//! Type, method, field, property and event descriptors.
//!
//! These are the resolved definitions the analysis works on. They mirror the owned metadata
//! rows of a loaded module closely enough for reflection modelling (visibility, static-ness,
//! layout, generic parameters, marshalling) and nothing more.

use std::sync::Arc;

use bitflags::bitflags;

use crate::metadata::{
    marshalling::NativeType,
    signatures::{SignatureMethod, TypeSignature},
    token::Token,
};

/// Reference-counted type descriptor
pub type TypeRc = Arc<TypeDesc>;
/// Reference-counted method descriptor
pub type MethodRc = Arc<MethodDesc>;
/// Reference-counted field descriptor
pub type FieldRc = Arc<FieldDesc>;
/// Reference-counted property descriptor
pub type PropertyRc = Arc<PropertyDesc>;
/// Reference-counted event descriptor
pub type EventRc = Arc<EventDesc>;

bitflags! {
    /// `TypeAttributes` (ECMA-335 II.23.1.15).
    ///
    /// Visibility and layout are enumerations stored in masked bit ranges; query them
    /// through [`TypeDesc`] helpers rather than `contains`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Visibility mask
        const VISIBILITY_MASK = 0x0000_0007;
        /// Top-level public type
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested type with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Layout mask
        const LAYOUT_MASK = 0x0000_0018;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields are laid out at explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is imported (COM)
        const IMPORT = 0x0000_1000;
        /// Static initialization may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// `MethodAttributes` (ECMA-335 II.23.1.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u16 {
        /// Member access mask
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Accessible only by the declaring type
        const PRIVATE = 0x0001;
        /// Accessible by subtypes in the same assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by subtypes
        const FAMILY = 0x0004;
        /// Accessible by subtypes or the assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible everywhere
        const PUBLIC = 0x0006;
        /// Static method
        const STATIC = 0x0010;
        /// Cannot be overridden
        const FINAL = 0x0020;
        /// Virtual method
        const VIRTUAL = 0x0040;
        /// Method has no implementation
        const ABSTRACT = 0x0400;
        /// Name is special
        const SPECIAL_NAME = 0x0800;
        /// Name is special to the runtime (`.ctor`, `.cctor`)
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through p/invoke
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    /// `FieldAttributes` (ECMA-335 II.23.1.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u16 {
        /// Member access mask
        const FIELD_ACCESS_MASK = 0x0007;
        /// Accessible only by the declaring type
        const PRIVATE = 0x0001;
        /// Accessible within the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible by subtypes
        const FAMILY = 0x0004;
        /// Accessible everywhere
        const PUBLIC = 0x0006;
        /// Static field
        const STATIC = 0x0010;
        /// Only assignable in a constructor
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
    }
}

bitflags! {
    /// `GenericParamAttributes` (ECMA-335 II.23.1.7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant (`out T`)
        const COVARIANT = 0x0001;
        /// Contravariant (`in T`)
        const CONTRAVARIANT = 0x0002;
        /// `class` constraint
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// `struct` constraint
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// `new()` constraint
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

const MEMBER_ACCESS_PUBLIC: u16 = 0x0006;

/// A generic parameter declared by a type or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericParamDesc {
    /// Zero-based position
    pub index: u16,
    /// Declared name (`T`, `TKey`, ...)
    pub name: String,
    /// Variance and constraint flags
    pub flags: GenericParamAttributes,
}

impl GenericParamDesc {
    /// Creates an unconstrained generic parameter.
    #[must_use]
    pub fn new(index: u16, name: impl Into<String>) -> Self {
        GenericParamDesc {
            index,
            name: name.into(),
            flags: GenericParamAttributes::empty(),
        }
    }

    /// Returns `true` if the parameter carries the `new()` constraint.
    #[must_use]
    pub fn has_default_constructor_constraint(&self) -> bool {
        self.flags
            .contains(GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT)
    }
}

/// A type definition.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    /// `TypeDef` token
    pub token: Token,
    /// Name of the defining assembly
    pub assembly: String,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Reflection-style full name, `Outer+Inner` for nested types
    pub full_name: String,
    /// Type attributes
    pub flags: TypeAttributes,
    /// Base type definition, if any
    pub extends: Option<Token>,
    /// Enclosing type for nested types
    pub enclosing: Option<Token>,
    /// Directly implemented interfaces
    pub interfaces: Vec<Token>,
    /// Generic parameters
    pub generic_params: Vec<GenericParamDesc>,
    /// Declared methods, constructors included
    pub methods: Vec<Token>,
    /// Declared fields
    pub fields: Vec<Token>,
    /// Declared properties
    pub properties: Vec<Token>,
    /// Declared events
    pub events: Vec<Token>,
    /// Declared nested types
    pub nested_types: Vec<Token>,
}

impl TypeDesc {
    /// Returns `true` for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Returns `true` for sealed types.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED)
    }

    /// Returns `true` if the type is visible as public (top-level or nested).
    #[must_use]
    pub fn is_public(&self) -> bool {
        let visibility = self.flags.bits() & TypeAttributes::VISIBILITY_MASK.bits();
        visibility == TypeAttributes::PUBLIC.bits() || visibility == TypeAttributes::NESTED_PUBLIC.bits()
    }

    /// Returns `true` if the type declares sequential or explicit layout.
    #[must_use]
    pub fn has_explicit_layout(&self) -> bool {
        self.flags.bits() & TypeAttributes::LAYOUT_MASK.bits() != 0
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDesc {
    /// `MethodDef` token
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Method name
    pub name: String,
    /// Method attributes
    pub flags: MethodAttributes,
    /// Declared signature
    pub signature: SignatureMethod,
    /// Generic parameters
    pub generic_params: Vec<GenericParamDesc>,
    /// Parameter names, in signature order
    pub param_names: Vec<String>,
    /// Marshalling of the return value, for p/invoke methods
    pub return_marshal: Option<NativeType>,
    /// Marshalling of each parameter, for p/invoke methods
    pub param_marshal: Vec<Option<NativeType>>,
}

impl MethodDesc {
    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns `true` for public methods.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.bits() & MethodAttributes::MEMBER_ACCESS_MASK.bits() == MEMBER_ACCESS_PUBLIC
    }

    /// Returns `true` for private methods.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.bits() & MethodAttributes::MEMBER_ACCESS_MASK.bits()
            == MethodAttributes::PRIVATE.bits()
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        !self.is_static() && self.name == ".ctor"
    }

    /// Returns `true` for the type initializer.
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.is_static() && self.name == ".cctor"
    }

    /// Returns `true` for constructors of either kind.
    #[must_use]
    pub fn is_any_constructor(&self) -> bool {
        self.is_constructor() || self.is_static_constructor()
    }

    /// Returns `true` for p/invoke methods.
    #[must_use]
    pub fn is_pinvoke(&self) -> bool {
        self.flags.contains(MethodAttributes::PINVOKE_IMPL)
    }

    /// Number of declared parameters, excluding `this`.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.signature.params.len()
    }

    /// Returns `true` if calls pass an implicit `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.signature.has_this && !self.signature.explicit_this
    }
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// `Field` token
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Field name
    pub name: String,
    /// Field attributes
    pub flags: FieldAttributes,
    /// Declared type
    pub signature: TypeSignature,
}

impl FieldDesc {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }

    /// Returns `true` for public fields.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.flags.bits() & FieldAttributes::FIELD_ACCESS_MASK.bits() == MEMBER_ACCESS_PUBLIC
    }

    /// Returns `true` for private fields.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.bits() & FieldAttributes::FIELD_ACCESS_MASK.bits()
            == FieldAttributes::PRIVATE.bits()
    }
}

/// A property definition. Visibility and static-ness come from its accessors.
#[derive(Debug, Clone)]
pub struct PropertyDesc {
    /// `Property` token
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Property name
    pub name: String,
    /// `get` accessor
    pub getter: Option<Token>,
    /// `set` accessor
    pub setter: Option<Token>,
}

impl PropertyDesc {
    /// Accessor methods, getter first.
    pub fn accessors(&self) -> impl Iterator<Item = Token> + '_ {
        self.getter.iter().chain(self.setter.iter()).copied()
    }
}

/// An event definition. Visibility and static-ness come from its accessors.
#[derive(Debug, Clone)]
pub struct EventDesc {
    /// `Event` token
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Event name
    pub name: String,
    /// `add` accessor
    pub add: Option<Token>,
    /// `remove` accessor
    pub remove: Option<Token>,
    /// `raise` accessor
    pub raise: Option<Token>,
}

impl EventDesc {
    /// Accessor methods in `add`, `remove`, `raise` order.
    pub fn accessors(&self) -> impl Iterator<Item = Token> + '_ {
        self.add
            .iter()
            .chain(self.remove.iter())
            .chain(self.raise.iter())
            .copied()
    }
}

/// A method reference resolved to its definition, together with the generic
/// instantiation the reference applies.
///
/// `MemberRef` tokens whose parent is an instantiated generic type carry `type_args`;
/// `MethodSpec` tokens carry `method_args`.
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    /// The method definition
    pub method: MethodRc,
    /// Arguments for the declaring type's generic parameters
    pub type_args: Vec<TypeSignature>,
    /// Arguments for the method's generic parameters
    pub method_args: Vec<TypeSignature>,
}

impl ResolvedMethod {
    /// Wraps a definition without instantiation.
    #[must_use]
    pub fn definition(method: MethodRc) -> Self {
        ResolvedMethod {
            method,
            type_args: Vec::new(),
            method_args: Vec::new(),
        }
    }

    /// The signature with the reference's instantiation applied.
    #[must_use]
    pub fn instantiated_signature(&self) -> SignatureMethod {
        self.method
            .signature
            .substitute(&self.type_args, &self.method_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::table;

    fn method(name: &str, flags: MethodAttributes) -> MethodDesc {
        MethodDesc {
            token: Token::from_parts(table::METHOD_DEF, 1),
            declaring_type: Token::from_parts(table::TYPE_DEF, 1),
            name: name.to_string(),
            flags,
            signature: SignatureMethod::new_instance(TypeSignature::Void, vec![]),
            generic_params: Vec::new(),
            param_names: Vec::new(),
            return_marshal: None,
            param_marshal: Vec::new(),
        }
    }

    #[test]
    fn constructor_kinds() {
        let ctor = method(".ctor", MethodAttributes::PUBLIC | MethodAttributes::RT_SPECIAL_NAME);
        assert!(ctor.is_constructor());
        assert!(ctor.is_public());
        assert!(!ctor.is_static_constructor());

        let cctor = method(
            ".cctor",
            MethodAttributes::PRIVATE | MethodAttributes::STATIC | MethodAttributes::RT_SPECIAL_NAME,
        );
        assert!(cctor.is_static_constructor());
        assert!(cctor.is_private());
        assert!(cctor.is_any_constructor());
        assert!(!cctor.is_constructor());
    }

    #[test]
    fn family_is_not_public() {
        let m = method("Run", MethodAttributes::FAMILY);
        assert!(!m.is_public());
        assert!(!m.is_private());
    }

    #[test]
    fn generic_constraints() {
        let mut param = GenericParamDesc::new(0, "T");
        assert!(!param.has_default_constructor_constraint());
        param.flags |= GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT;
        assert!(param.has_default_constructor_constraint());
    }
}
