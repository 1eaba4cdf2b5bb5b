//! `System.Reflection.BindingFlags` and how they select member categories.

use bitflags::bitflags;

use crate::analysis::{requirements::MemberTypes, value::MultiValue};

bitflags! {
    /// Flags controlling reflection member lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindingFlags: u32 {
        /// Case-insensitive name comparison
        const IGNORE_CASE = 0x0000_0001;
        /// Only members declared on the type itself
        const DECLARED_ONLY = 0x0000_0002;
        /// Instance members
        const INSTANCE = 0x0000_0004;
        /// Static members
        const STATIC = 0x0000_0008;
        /// Public members
        const PUBLIC = 0x0000_0010;
        /// Non-public members
        const NON_PUBLIC = 0x0000_0020;
        /// Static members of base types
        const FLATTEN_HIERARCHY = 0x0000_0040;
        /// Invoke a method
        const INVOKE_METHOD = 0x0000_0100;
        /// Create an instance
        const CREATE_INSTANCE = 0x0000_0200;
        /// Get a field
        const GET_FIELD = 0x0000_0400;
        /// Set a field
        const SET_FIELD = 0x0000_0800;
        /// Get a property
        const GET_PROPERTY = 0x0000_1000;
        /// Set a property
        const SET_PROPERTY = 0x0000_2000;
        /// Call `PROPPUT` on a COM object
        const PUT_DISP_PROPERTY = 0x0000_4000;
        /// Call `PROPPUTREF` on a COM object
        const PUT_REF_DISP_PROPERTY = 0x0000_8000;
        /// Parameter types must match exactly
        const EXACT_BINDING = 0x0001_0000;
        /// Do not change argument types
        const SUPPRESS_CHANGE_TYPE = 0x0002_0000;
        /// Bind to methods with optional parameters
        const OPTIONAL_PARAM_BINDING = 0x0004_0000;
        /// Ignore the return value of COM calls
        const IGNORE_RETURN = 0x0100_0000;
        /// Do not wrap exceptions thrown by invoked members
        const DO_NOT_WRAP_EXCEPTIONS = 0x0200_0000;
    }
}

impl BindingFlags {
    /// Flags whose effect on the lookup is modeled or irrelevant to it.
    pub const UNDERSTOOD: BindingFlags = BindingFlags::DECLARED_ONLY
        .union(BindingFlags::INSTANCE)
        .union(BindingFlags::STATIC)
        .union(BindingFlags::PUBLIC)
        .union(BindingFlags::NON_PUBLIC)
        .union(BindingFlags::FLATTEN_HIERARCHY)
        .union(BindingFlags::EXACT_BINDING)
        .union(BindingFlags::INVOKE_METHOD)
        .union(BindingFlags::CREATE_INSTANCE)
        .union(BindingFlags::GET_FIELD)
        .union(BindingFlags::SET_FIELD)
        .union(BindingFlags::GET_PROPERTY)
        .union(BindingFlags::SET_PROPERTY);

    /// Converts the integer constant of a `BindingFlags` argument; `None` when it carries
    /// a flag the lookup model does not understand.
    #[must_use]
    pub fn from_constant(value: i32) -> Option<BindingFlags> {
        let flags = BindingFlags::from_bits_retain(value as u32);
        BindingFlags::UNDERSTOOD.contains(flags).then_some(flags)
    }
}

/// What a reflection lookup looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    /// `GetConstructor(s)`, `Activator.CreateInstance`
    Constructors,
    /// `GetMethod(s)`
    Methods,
    /// `GetField(s)`
    Fields,
    /// `GetProperty`/`GetProperties`
    Properties,
    /// `GetEvent(s)`
    Events,
    /// `GetNestedType(s)`
    NestedTypes,
    /// `GetMember(s)`: every kind
    Members,
    /// `GetInterface(s)`
    Interfaces,
}

impl LookupKind {
    /// Categories of public members of this kind.
    #[must_use]
    pub fn public(self) -> MemberTypes {
        match self {
            LookupKind::Constructors => MemberTypes::PUBLIC_CONSTRUCTORS,
            LookupKind::Methods => MemberTypes::PUBLIC_METHODS,
            LookupKind::Fields => MemberTypes::PUBLIC_FIELDS,
            LookupKind::Properties => MemberTypes::PUBLIC_PROPERTIES,
            LookupKind::Events => MemberTypes::PUBLIC_EVENTS,
            LookupKind::NestedTypes => MemberTypes::PUBLIC_NESTED_TYPES,
            LookupKind::Members => {
                MemberTypes::PUBLIC_CONSTRUCTORS
                    | MemberTypes::PUBLIC_METHODS
                    | MemberTypes::PUBLIC_FIELDS
                    | MemberTypes::PUBLIC_PROPERTIES
                    | MemberTypes::PUBLIC_EVENTS
                    | MemberTypes::PUBLIC_NESTED_TYPES
            }
            LookupKind::Interfaces => MemberTypes::INTERFACES,
        }
    }

    /// Categories of non-public members of this kind.
    #[must_use]
    pub fn non_public(self) -> MemberTypes {
        match self {
            LookupKind::Constructors => MemberTypes::NON_PUBLIC_CONSTRUCTORS,
            LookupKind::Methods => MemberTypes::NON_PUBLIC_METHODS,
            LookupKind::Fields => MemberTypes::NON_PUBLIC_FIELDS,
            LookupKind::Properties => MemberTypes::NON_PUBLIC_PROPERTIES,
            LookupKind::Events => MemberTypes::NON_PUBLIC_EVENTS,
            LookupKind::NestedTypes => MemberTypes::NON_PUBLIC_NESTED_TYPES,
            LookupKind::Members => {
                MemberTypes::NON_PUBLIC_CONSTRUCTORS
                    | MemberTypes::NON_PUBLIC_METHODS
                    | MemberTypes::NON_PUBLIC_FIELDS
                    | MemberTypes::NON_PUBLIC_PROPERTIES
                    | MemberTypes::NON_PUBLIC_EVENTS
                    | MemberTypes::NON_PUBLIC_NESTED_TYPES
            }
            LookupKind::Interfaces => MemberTypes::INTERFACES,
        }
    }
}

/// The categories a lookup reaches and how names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Reached categories
    pub categories: MemberTypes,
    /// Names may match case-insensitively
    pub ignore_case: bool,
    /// Public members are reached
    pub public: bool,
    /// Non-public members are reached
    pub non_public: bool,
}

impl Lookup {
    fn new(kind: LookupKind, public: bool, non_public: bool, ignore_case: bool) -> Self {
        let mut categories = MemberTypes::empty();
        if public {
            categories |= kind.public();
        }
        if non_public {
            categories |= kind.non_public();
        }
        Lookup {
            categories,
            ignore_case,
            public,
            non_public,
        }
    }

    /// The lookup of an overload without a `BindingFlags` parameter: public members only.
    #[must_use]
    pub fn default_for(kind: LookupKind) -> Self {
        Lookup::new(kind, true, false, false)
    }

    /// The lookup selected by a `BindingFlags` argument.
    ///
    /// Every constant the argument may hold contributes; a non-constant argument or one
    /// with flags outside [`BindingFlags::UNDERSTOOD`] reaches public and non-public
    /// members with case-insensitive names.
    #[must_use]
    pub fn from_flags(kind: LookupKind, flags: &MultiValue) -> Self {
        let mut public = false;
        let mut non_public = false;
        if flags.is_empty() {
            return Lookup::new(kind, true, true, true);
        }
        for value in flags.iter() {
            match value.as_const_int().and_then(BindingFlags::from_constant) {
                Some(flags) => {
                    public |= flags.contains(BindingFlags::PUBLIC);
                    non_public |= flags.contains(BindingFlags::NON_PUBLIC);
                }
                None => return Lookup::new(kind, true, true, true),
            }
        }
        Lookup::new(kind, public, non_public, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::value::AbstractValue;

    fn constant(value: i32) -> MultiValue {
        MultiValue::single(AbstractValue::ConstInt(value))
    }

    #[test]
    fn public_instance() {
        let lookup = Lookup::from_flags(LookupKind::Methods, &constant(16 | 4));
        assert_eq!(lookup.categories, MemberTypes::PUBLIC_METHODS);
        assert!(!lookup.ignore_case);
    }

    #[test]
    fn non_public_static_fields() {
        let lookup = Lookup::from_flags(LookupKind::Fields, &constant(32 | 8));
        assert_eq!(lookup.categories, MemberTypes::NON_PUBLIC_FIELDS);
    }

    #[test]
    fn unknown_and_unsupported_flags() {
        let unknown = Lookup::from_flags(LookupKind::Properties, &MultiValue::unknown());
        assert_eq!(
            unknown.categories,
            MemberTypes::PUBLIC_PROPERTIES | MemberTypes::NON_PUBLIC_PROPERTIES
        );
        assert!(unknown.ignore_case);

        let ignore_case = Lookup::from_flags(LookupKind::Events, &constant(1 | 16));
        assert!(ignore_case.non_public);
        assert_eq!(BindingFlags::from_constant(0x0100_0000 | 16), None);
    }

    #[test]
    fn merged_constants_union() {
        let flags = constant(16 | 4).merge(&constant(32 | 4));
        let lookup = Lookup::from_flags(LookupKind::Constructors, &flags);
        assert_eq!(
            lookup.categories,
            MemberTypes::PUBLIC_CONSTRUCTORS | MemberTypes::NON_PUBLIC_CONSTRUCTORS
        );
    }

    #[test]
    fn no_visibility_reaches_nothing() {
        let lookup = Lookup::from_flags(LookupKind::Methods, &constant(4 | 8));
        assert!(lookup.categories.is_empty());
        assert_eq!(
            Lookup::default_for(LookupKind::Interfaces).categories,
            MemberTypes::INTERFACES
        );
    }
}
