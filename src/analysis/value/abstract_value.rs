//! Leaf abstract values.

use std::{fmt, sync::Arc};

use crate::{
    analysis::{requirements::MemberTypes, value::ArrayValue},
    metadata::{signatures::TypeSignature, token::Token},
};

/// Where an annotated placeholder value comes from.
///
/// The same five kinds double as assignment targets when a value flows into an annotated
/// location, and together they select the diagnostic code for a requirement mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// A method parameter
    Parameter,
    /// A method return value
    Return,
    /// A field
    Field,
    /// The implicit `this` parameter
    This,
    /// A generic parameter
    GenericParameter,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Parameter => "parameter",
            SourceKind::Return => "return value",
            SourceKind::Field => "field",
            SourceKind::This => "implicit 'this'",
            SourceKind::GenericParameter => "generic parameter",
        })
    }
}

/// The value of a method parameter on entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParameterValue {
    /// Declaring method
    pub method: Token,
    /// Zero-based index among the declared parameters, `this` excluded
    pub index: u16,
    /// Members the parameter's annotation requires
    pub requirement: MemberTypes,
    /// Declared parameter type
    pub declared_type: TypeSignature,
}

/// The value a method call returns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReturnValue {
    /// Called method
    pub method: Token,
    /// Members the return annotation requires, or the deferred requirement of an intrinsic
    pub requirement: MemberTypes,
    /// Declared return type
    pub declared_type: TypeSignature,
}

/// The implicit `this` of an instance method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThisValue {
    /// The instance method
    pub method: Token,
    /// Members the `this` annotation requires
    pub requirement: MemberTypes,
    /// The declaring type
    pub declared_type: TypeSignature,
}

/// The contents of a field whose value is not otherwise known.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldValue {
    /// The field
    pub field: Token,
    /// Members the field's annotation requires
    pub requirement: MemberTypes,
    /// Declared field type
    pub declared_type: TypeSignature,
}

/// The type or method declaring a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GenericOwner {
    /// Declared by a type definition
    Type(Token),
    /// Declared by a method definition
    Method(Token),
}

/// A `System.Type` standing for an uninstantiated generic parameter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericParameterValue {
    /// Declaring type or method
    pub owner: GenericOwner,
    /// Position among the owner's generic parameters
    pub index: u16,
    /// Members the parameter's annotation requires
    pub requirement: MemberTypes,
}

/// Identity of an array allocation: the `newarr` instruction that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArraySite {
    /// Allocating method
    pub method: Token,
    /// Offset of the `newarr`
    pub offset: u32,
}

/// A storage location whose address is on the stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKind {
    /// `ldloca`
    Local(u16),
    /// `ldarga` on a declared parameter; the index includes `this` like the IL operand
    Argument(u16),
    /// `ldarga 0` in an instance method
    This,
    /// `ldflda` / `ldsflda`
    Field(Token),
    /// `ldelema`; `index` is `None` when not a constant
    ArrayElement {
        /// The array
        site: ArraySite,
        /// Constant element index
        index: Option<i32>,
    },
    /// The target of a by-ref parameter of the analyzed method
    ParameterTarget(u16),
    /// The location returned by a by-ref returning method
    ReturnSlot(Token),
}

/// A single abstract value.
///
/// Values are totally ordered so that value sets iterate deterministically; the order
/// carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AbstractValue {
    /// Nothing is known
    Unknown,
    /// The null reference
    Null,
    /// A 32-bit integer constant
    ConstInt(i32),
    /// A string constant
    KnownString(Arc<str>),
    /// Exactly this `System.Type`
    KnownType(Token),
    /// The `RuntimeTypeHandle` of this type
    KnownTypeHandle(Token),
    /// Exactly this `MethodInfo`
    KnownMethod(Token),
    /// The `RuntimeMethodHandle` of this method
    KnownMethodHandle(Token),
    /// The value of a parameter on entry
    MethodParameter(ParameterValue),
    /// The result of a call
    MethodReturn(ReturnValue),
    /// `this` of the analyzed instance method
    MethodThisParameter(ThisValue),
    /// The contents of a field
    FieldValue(FieldValue),
    /// The `System.Type` of a generic parameter
    GenericParameter(GenericParameterValue),
    /// The `RuntimeTypeHandle` of a generic parameter
    GenericParameterHandle(GenericParameterValue),
    /// An array allocated in the analyzed method
    Array(ArrayValue),
    /// The address of a storage location
    Reference(ReferenceKind),
}

impl AbstractValue {
    /// Creates a string constant.
    #[must_use]
    pub fn string(text: &str) -> Self {
        AbstractValue::KnownString(Arc::from(text))
    }

    /// Source kind and requirement of annotated placeholder values.
    ///
    /// Returns `None` for everything that is not a symbolic placeholder.
    #[must_use]
    pub fn annotation(&self) -> Option<(SourceKind, MemberTypes)> {
        match self {
            AbstractValue::MethodParameter(p) => Some((SourceKind::Parameter, p.requirement)),
            AbstractValue::MethodReturn(r) => Some((SourceKind::Return, r.requirement)),
            AbstractValue::MethodThisParameter(t) => Some((SourceKind::This, t.requirement)),
            AbstractValue::FieldValue(f) => Some((SourceKind::Field, f.requirement)),
            AbstractValue::GenericParameter(g) => {
                Some((SourceKind::GenericParameter, g.requirement))
            }
            _ => None,
        }
    }

    /// Declared static type of a placeholder value.
    #[must_use]
    pub fn declared_type(&self) -> Option<&TypeSignature> {
        match self {
            AbstractValue::MethodParameter(p) => Some(&p.declared_type),
            AbstractValue::MethodReturn(r) => Some(&r.declared_type),
            AbstractValue::MethodThisParameter(t) => Some(&t.declared_type),
            AbstractValue::FieldValue(f) => Some(&f.declared_type),
            _ => None,
        }
    }

    /// Returns `true` for the `Unknown` value.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, AbstractValue::Unknown)
    }

    /// The integer constant, if this is one.
    #[must_use]
    pub fn as_const_int(&self) -> Option<i32> {
        match self {
            AbstractValue::ConstInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Removes array contents so that values stored into arrays never nest tracked
    /// contents.
    #[must_use]
    pub fn without_array_contents(&self) -> AbstractValue {
        match self {
            AbstractValue::Array(array) => AbstractValue::Array(array.without_contents()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractValue::Unknown => f.write_str("<unknown>"),
            AbstractValue::Null => f.write_str("null"),
            AbstractValue::ConstInt(v) => write!(f, "{v}"),
            AbstractValue::KnownString(s) => write!(f, "{s:?}"),
            AbstractValue::KnownType(t) => write!(f, "typeof({t})"),
            AbstractValue::KnownTypeHandle(t) => write!(f, "typeof({t}).TypeHandle"),
            AbstractValue::KnownMethod(m) => write!(f, "method {m}"),
            AbstractValue::KnownMethodHandle(m) => write!(f, "methodof({m}).MethodHandle"),
            AbstractValue::MethodParameter(p) => {
                write!(f, "parameter #{} of {}", p.index, p.method)
            }
            AbstractValue::MethodReturn(r) => write!(f, "return value of {}", r.method),
            AbstractValue::MethodThisParameter(t) => write!(f, "'this' of {}", t.method),
            AbstractValue::FieldValue(v) => write!(f, "field {}", v.field),
            AbstractValue::GenericParameter(g) | AbstractValue::GenericParameterHandle(g) => {
                match g.owner {
                    GenericOwner::Type(t) => write!(f, "!{} of {t}", g.index),
                    GenericOwner::Method(m) => write!(f, "!!{} of {m}", g.index),
                }
            }
            AbstractValue::Array(a) => write!(f, "array allocated at IL_{:04x}", a.site.offset),
            AbstractValue::Reference(kind) => write!(f, "&{kind:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_only_on_placeholders() {
        let parameter = AbstractValue::MethodParameter(ParameterValue {
            method: Token::new(0x0600_0001),
            index: 0,
            requirement: MemberTypes::PUBLIC_METHODS,
            declared_type: TypeSignature::Object,
        });
        assert_eq!(
            parameter.annotation(),
            Some((SourceKind::Parameter, MemberTypes::PUBLIC_METHODS))
        );
        assert_eq!(parameter.declared_type(), Some(&TypeSignature::Object));
        assert_eq!(AbstractValue::string("x").annotation(), None);
        assert_eq!(AbstractValue::KnownType(Token::new(0x0200_0001)).annotation(), None);
    }

    #[test]
    fn display() {
        assert_eq!(AbstractValue::string("a").to_string(), "\"a\"");
        assert_eq!(AbstractValue::ConstInt(-3).to_string(), "-3");
    }
}
