//! Type and method signatures.
//!
//! A trimmed-down rendition of the ECMA-335 II.23.2 signature grammar: enough structure for
//! the analysis to count call arguments, detect by-ref parameters, find the declared type of
//! a value and substitute generic arguments when a generic method is analyzed under a
//! concrete instantiation.

use std::fmt;

use crate::metadata::token::Token;

/// A type as it appears in a signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TypeSignature {
    /// `void` (return types only)
    #[default]
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `TypedReference`
    TypedByRef,
    /// A reference type by `TypeDef`/`TypeRef` token
    Class(Token),
    /// A value type by `TypeDef`/`TypeRef` token
    ValueType(Token),
    /// An instantiated generic type: definition token plus arguments
    GenericInst {
        /// The generic type definition
        definition: Token,
        /// Whether the definition is a value type
        value_type: bool,
        /// Type arguments in declaration order
        args: Vec<TypeSignature>,
    },
    /// `!n`, a generic parameter of the enclosing type
    GenericParamType(u16),
    /// `!!n`, a generic parameter of the enclosing method
    GenericParamMethod(u16),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: Box<TypeSignature>,
        /// Number of dimensions
        rank: u32,
    },
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed pointer (`ref`/`out`/`in`)
    ByRef(Box<TypeSignature>),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
}

impl TypeSignature {
    /// Returns `true` for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// Returns `true` for managed pointers.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSignature::ByRef(_))
    }

    /// Strips one level of managed pointer.
    #[must_use]
    pub fn strip_by_ref(&self) -> &TypeSignature {
        match self {
            TypeSignature::ByRef(inner) => inner,
            other => other,
        }
    }

    /// Returns `true` if this is a generic parameter reference (`!n` or `!!n`).
    #[must_use]
    pub fn is_generic_parameter(&self) -> bool {
        matches!(
            self,
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_)
        )
    }

    /// Returns `true` if the signature mentions any generic parameter.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_) => true,
            TypeSignature::GenericInst { args, .. } => {
                args.iter().any(TypeSignature::contains_generic_parameter)
            }
            TypeSignature::SzArray(inner)
            | TypeSignature::Ptr(inner)
            | TypeSignature::ByRef(inner)
            | TypeSignature::Array { element: inner, .. } => inner.contains_generic_parameter(),
            TypeSignature::FnPtr(sig) => {
                sig.return_type.contains_generic_parameter()
                    || sig
                        .params
                        .iter()
                        .any(TypeSignature::contains_generic_parameter)
            }
            _ => false,
        }
    }

    /// Returns the type definition token a class, value type or generic instantiation
    /// refers to.
    ///
    /// Primitives, arrays and generic parameters return `None`; callers that need a
    /// definition for a primitive go through its well-known name instead
    /// (see [`TypeSignature::well_known_name`]).
    #[must_use]
    pub fn definition(&self) -> Option<Token> {
        match self {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => Some(*token),
            TypeSignature::GenericInst { definition, .. } => Some(*definition),
            _ => None,
        }
    }

    /// Returns the full name of the corlib type backing a primitive signature element.
    #[must_use]
    pub fn well_known_name(&self) -> Option<&'static str> {
        Some(match self {
            TypeSignature::Void => "System.Void",
            TypeSignature::Boolean => "System.Boolean",
            TypeSignature::Char => "System.Char",
            TypeSignature::I1 => "System.SByte",
            TypeSignature::U1 => "System.Byte",
            TypeSignature::I2 => "System.Int16",
            TypeSignature::U2 => "System.UInt16",
            TypeSignature::I4 => "System.Int32",
            TypeSignature::U4 => "System.UInt32",
            TypeSignature::I8 => "System.Int64",
            TypeSignature::U8 => "System.UInt64",
            TypeSignature::R4 => "System.Single",
            TypeSignature::R8 => "System.Double",
            TypeSignature::I => "System.IntPtr",
            TypeSignature::U => "System.UIntPtr",
            TypeSignature::String => "System.String",
            TypeSignature::Object => "System.Object",
            TypeSignature::TypedByRef => "System.TypedReference",
            _ => return None,
        })
    }

    /// Replaces generic parameter references with the supplied instantiation.
    ///
    /// Parameters without a corresponding argument are left in place, so substituting
    /// with empty slices is the identity.
    ///
    /// # Arguments
    ///
    /// * `type_args` - Arguments for `!n` references
    /// * `method_args` - Arguments for `!!n` references
    #[must_use]
    pub fn substitute(
        &self,
        type_args: &[TypeSignature],
        method_args: &[TypeSignature],
    ) -> TypeSignature {
        if type_args.is_empty() && method_args.is_empty() {
            return self.clone();
        }

        match self {
            TypeSignature::GenericParamType(index) => type_args
                .get(usize::from(*index))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericParamMethod(index) => method_args
                .get(usize::from(*index))
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericInst {
                definition,
                value_type,
                args,
            } => TypeSignature::GenericInst {
                definition: *definition,
                value_type: *value_type,
                args: args
                    .iter()
                    .map(|arg| arg.substitute(type_args, method_args))
                    .collect(),
            },
            TypeSignature::SzArray(inner) => {
                TypeSignature::SzArray(Box::new(inner.substitute(type_args, method_args)))
            }
            TypeSignature::Array { element, rank } => TypeSignature::Array {
                element: Box::new(element.substitute(type_args, method_args)),
                rank: *rank,
            },
            TypeSignature::Ptr(inner) => {
                TypeSignature::Ptr(Box::new(inner.substitute(type_args, method_args)))
            }
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(inner.substitute(type_args, method_args)))
            }
            TypeSignature::FnPtr(sig) => {
                TypeSignature::FnPtr(Box::new(sig.substitute(type_args, method_args)))
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                write!(f, "[{token}]")
            }
            TypeSignature::GenericInst {
                definition, args, ..
            } => {
                write!(f, "[{definition}]<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeSignature::GenericParamType(i) => write!(f, "!{i}"),
            TypeSignature::GenericParamMethod(i) => write!(f, "!!{i}"),
            TypeSignature::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSignature::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat((*rank).saturating_sub(1) as usize))
            }
            TypeSignature::Ptr(inner) => write!(f, "{inner}*"),
            TypeSignature::ByRef(inner) => write!(f, "{inner}&"),
            TypeSignature::FnPtr(_) => write!(f, "method*"),
            other => write!(f, "{}", other.well_known_name().unwrap_or("?")),
        }
    }
}

/// A method signature (`MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SignatureMethod {
    /// The method takes an implicit `this`
    pub has_this: bool,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// Number of generic parameters declared by the method
    pub generic_param_count: u16,
    /// Return type
    pub return_type: TypeSignature,
    /// Parameter types, excluding `this`
    pub params: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// Creates a static method signature.
    #[must_use]
    pub fn new_static(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            explicit_this: false,
            generic_param_count: 0,
            return_type,
            params,
        }
    }

    /// Creates an instance method signature.
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            ..SignatureMethod::new_static(return_type, params)
        }
    }

    /// Sets the generic parameter count.
    #[must_use]
    pub fn with_generic_params(mut self, count: u16) -> Self {
        self.generic_param_count = count;
        self
    }

    /// Number of values a call to this signature pops from the stack, excluding any
    /// function pointer.
    #[must_use]
    pub fn stack_arguments(&self) -> usize {
        self.params.len() + usize::from(self.has_this && !self.explicit_this)
    }

    /// Substitutes generic arguments in the return and parameter types.
    #[must_use]
    pub fn substitute(
        &self,
        type_args: &[TypeSignature],
        method_args: &[TypeSignature],
    ) -> SignatureMethod {
        SignatureMethod {
            has_this: self.has_this,
            explicit_this: self.explicit_this,
            generic_param_count: self.generic_param_count,
            return_type: self.return_type.substitute(type_args, method_args),
            params: self
                .params
                .iter()
                .map(|p| p.substitute(type_args, method_args))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::table;

    #[test]
    fn substitute_method_and_type_parameters() {
        let foo = TypeSignature::Class(Token::from_parts(table::TYPE_DEF, 2));
        let list = TypeSignature::GenericInst {
            definition: Token::from_parts(table::TYPE_REF, 7),
            value_type: false,
            args: vec![TypeSignature::GenericParamMethod(0)],
        };
        let arr = TypeSignature::SzArray(Box::new(TypeSignature::GenericParamType(1)));

        let method_args = [foo.clone()];
        let type_args = [TypeSignature::I4, TypeSignature::String];

        let substituted = list.substitute(&type_args, &method_args);
        assert_eq!(
            substituted,
            TypeSignature::GenericInst {
                definition: Token::from_parts(table::TYPE_REF, 7),
                value_type: false,
                args: vec![foo],
            }
        );
        assert_eq!(
            arr.substitute(&type_args, &method_args),
            TypeSignature::SzArray(Box::new(TypeSignature::String))
        );
        assert!(!substituted.contains_generic_parameter());
    }

    #[test]
    fn missing_arguments_leave_parameters() {
        let sig = TypeSignature::GenericParamMethod(3);
        assert_eq!(sig.substitute(&[TypeSignature::I4], &[]), sig);
        assert!(sig.contains_generic_parameter());
    }

    #[test]
    fn stack_arguments_counts_this() {
        let instance = SignatureMethod::new_instance(
            TypeSignature::Void,
            vec![TypeSignature::I4, TypeSignature::String],
        );
        assert_eq!(instance.stack_arguments(), 3);

        let stat = SignatureMethod::new_static(TypeSignature::Object, vec![]);
        assert_eq!(stat.stack_arguments(), 0);
    }

    #[test]
    fn by_ref_helpers() {
        let by_ref = TypeSignature::ByRef(Box::new(TypeSignature::Object));
        assert!(by_ref.is_by_ref());
        assert_eq!(by_ref.strip_by_ref(), &TypeSignature::Object);
        assert_eq!(TypeSignature::I4.strip_by_ref(), &TypeSignature::I4);
        assert_eq!(by_ref.to_string(), "System.Object&");
    }
}
