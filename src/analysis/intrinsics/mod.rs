//! Reflection APIs with modeled semantics.
//!
//! A call to one of the framework methods listed in [`IntrinsicId`] is not treated as an
//! opaque call: its arguments are inspected and its return value computed from them, and
//! the members it can reach through reflection are marked. Classification is by declaring
//! type full name, method name and static-ness; the overload is told apart by the shapes
//! of the declared parameters ([`ParamShape`]).
//!
//! Handling happens twice per call site. While the method's fixpoint is computed only the
//! return value matters and [`Effects`](crate::analysis::requirements::Effects) are
//! disabled; after convergence the same code runs once more with marking and reporting
//! enabled.

mod binding;
mod handler;
mod interop;

use strum::Display;

pub use binding::{BindingFlags, Lookup, LookupKind};
pub use handler::handle;
pub use interop::check_com_interop;

use crate::{
    analysis::{
        context::MethodContext,
        requirements::MemberTypes,
        value::{AbstractValue, MultiValue, ReferenceKind, ReturnValue},
    },
    host::{AnalysisHost, MetadataResolver},
    metadata::{
        signatures::{SignatureMethod, TypeSignature},
        types::{MethodDesc, ResolvedMethod},
    },
};

/// A framework method whose behavior the analysis models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum IntrinsicId {
    /// `Type.GetType(string, ...)`
    TypeGetType,
    /// `Type.GetTypeFromHandle(RuntimeTypeHandle)`
    TypeGetTypeFromHandle,
    /// `Type.TypeHandle`
    TypeGetTypeHandle,
    /// `Object.GetType()`
    ObjectGetType,
    /// `Type.BaseType`
    TypeGetBaseType,
    /// `Type.GetConstructor(...)`
    TypeGetConstructor,
    /// `Type.GetConstructors(...)`
    TypeGetConstructors,
    /// `Type.GetMethod(string, ...)`
    TypeGetMethod,
    /// `Type.GetMethods(...)`
    TypeGetMethods,
    /// `Type.GetField(string, ...)`
    TypeGetField,
    /// `Type.GetFields(...)`
    TypeGetFields,
    /// `Type.GetProperty(string, ...)`
    TypeGetProperty,
    /// `Type.GetProperties(...)`
    TypeGetProperties,
    /// `Type.GetEvent(string, ...)`
    TypeGetEvent,
    /// `Type.GetEvents(...)`
    TypeGetEvents,
    /// `Type.GetNestedType(string, ...)`
    TypeGetNestedType,
    /// `Type.GetNestedTypes(...)`
    TypeGetNestedTypes,
    /// `Type.GetMember(string, ...)`
    TypeGetMember,
    /// `Type.GetMembers(...)`
    TypeGetMembers,
    /// `Type.GetInterface(string, ...)`
    TypeGetInterface,
    /// `Type.GetInterfaces()`
    TypeGetInterfaces,
    /// `Type.MakeGenericType(params Type[])`
    TypeMakeGenericType,
    /// `MethodInfo.MakeGenericMethod(params Type[])`
    MethodInfoMakeGenericMethod,
    /// `MethodBase.GetMethodFromHandle(RuntimeMethodHandle, ...)`
    MethodBaseGetMethodFromHandle,
    /// `Activator.CreateInstance(Type, ...)`
    ActivatorCreateInstanceType,
    /// `Activator.CreateInstance(string, string, ...)`
    ActivatorCreateInstanceName,
    /// `Activator.CreateInstance<T>()`
    ActivatorCreateInstanceGeneric,
    /// `Assembly.CreateInstance`, `AppDomain.CreateInstance*`, `Activator.CreateInstanceFrom`
    AssemblyCreateInstance,
    /// `RuntimeHelpers.RunClassConstructor(RuntimeTypeHandle)`
    RuntimeHelpersRunClassConstructor,
    /// `Expression.Call(Type, string, ...)`
    ExpressionCall,
    /// `Expression.Field(Expression, Type, string)`
    ExpressionField,
    /// `Expression.Property(Expression, Type, string)`
    ExpressionProperty,
    /// `Expression.New(Type)`
    ExpressionNew,
    /// `Marshal.SizeOf`
    MarshalSizeOf,
    /// `Marshal.OffsetOf`
    MarshalOffsetOf,
    /// `Marshal.PtrToStructure`
    MarshalPtrToStructure,
    /// `Marshal.DestroyStructure`
    MarshalDestroyStructure,
    /// `Array.Empty<T>()`
    ArrayEmpty,
}

impl IntrinsicId {
    /// Recognizes a method definition as an intrinsic.
    pub fn classify<R: MetadataResolver + ?Sized>(
        resolver: &R,
        method: &MethodDesc,
    ) -> Option<IntrinsicId> {
        let declaring = resolver.resolve_type(method.declaring_type)?;
        let generic = method.signature.generic_param_count > 0;
        let first = method.signature.params.first();

        Some(
            match (
                declaring.full_name.as_str(),
                method.name.as_str(),
                method.is_static(),
            ) {
                ("System.Type", "GetType", true) => IntrinsicId::TypeGetType,
                ("System.Type", "GetTypeFromHandle", true) => IntrinsicId::TypeGetTypeFromHandle,
                ("System.Type", "get_TypeHandle", false) => IntrinsicId::TypeGetTypeHandle,
                ("System.Object", "GetType", false) => IntrinsicId::ObjectGetType,
                ("System.Type", "get_BaseType", false) => IntrinsicId::TypeGetBaseType,
                ("System.Type", "GetConstructor", false) => IntrinsicId::TypeGetConstructor,
                ("System.Type", "GetConstructors", false) => IntrinsicId::TypeGetConstructors,
                ("System.Type", "GetMethod", false) => IntrinsicId::TypeGetMethod,
                ("System.Type", "GetMethods", false) => IntrinsicId::TypeGetMethods,
                ("System.Type", "GetField", false) => IntrinsicId::TypeGetField,
                ("System.Type", "GetFields", false) => IntrinsicId::TypeGetFields,
                ("System.Type", "GetProperty", false) => IntrinsicId::TypeGetProperty,
                ("System.Type", "GetProperties", false) => IntrinsicId::TypeGetProperties,
                ("System.Type", "GetEvent", false) => IntrinsicId::TypeGetEvent,
                ("System.Type", "GetEvents", false) => IntrinsicId::TypeGetEvents,
                ("System.Type", "GetNestedType", false) => IntrinsicId::TypeGetNestedType,
                ("System.Type", "GetNestedTypes", false) => IntrinsicId::TypeGetNestedTypes,
                ("System.Type", "GetMember", false) => IntrinsicId::TypeGetMember,
                ("System.Type", "GetMembers", false) => IntrinsicId::TypeGetMembers,
                ("System.Type", "GetInterface", false) => IntrinsicId::TypeGetInterface,
                ("System.Type", "GetInterfaces", false) => IntrinsicId::TypeGetInterfaces,
                ("System.Type", "MakeGenericType", false) => IntrinsicId::TypeMakeGenericType,
                ("System.Reflection.MethodInfo", "MakeGenericMethod", false) => {
                    IntrinsicId::MethodInfoMakeGenericMethod
                }
                ("System.Reflection.MethodBase", "GetMethodFromHandle", true) => {
                    IntrinsicId::MethodBaseGetMethodFromHandle
                }
                ("System.Activator", "CreateInstance", true) if generic => {
                    IntrinsicId::ActivatorCreateInstanceGeneric
                }
                ("System.Activator", "CreateInstance", true) => match first {
                    Some(TypeSignature::String) => IntrinsicId::ActivatorCreateInstanceName,
                    _ => IntrinsicId::ActivatorCreateInstanceType,
                },
                ("System.Activator", "CreateInstanceFrom", true)
                | ("System.Reflection.Assembly", "CreateInstance", false)
                | (
                    "System.AppDomain",
                    "CreateInstance"
                    | "CreateInstanceAndUnwrap"
                    | "CreateInstanceFrom"
                    | "CreateInstanceFromAndUnwrap",
                    false,
                ) => IntrinsicId::AssemblyCreateInstance,
                ("System.Runtime.CompilerServices.RuntimeHelpers", "RunClassConstructor", true) => {
                    IntrinsicId::RuntimeHelpersRunClassConstructor
                }
                ("System.Linq.Expressions.Expression", "Call", true) => IntrinsicId::ExpressionCall,
                ("System.Linq.Expressions.Expression", "Field", true) => {
                    IntrinsicId::ExpressionField
                }
                ("System.Linq.Expressions.Expression", "Property", true) => {
                    IntrinsicId::ExpressionProperty
                }
                ("System.Linq.Expressions.Expression", "New", true) => IntrinsicId::ExpressionNew,
                ("System.Runtime.InteropServices.Marshal", "SizeOf", true) => {
                    IntrinsicId::MarshalSizeOf
                }
                ("System.Runtime.InteropServices.Marshal", "OffsetOf", true) => {
                    IntrinsicId::MarshalOffsetOf
                }
                ("System.Runtime.InteropServices.Marshal", "PtrToStructure", true) => {
                    IntrinsicId::MarshalPtrToStructure
                }
                ("System.Runtime.InteropServices.Marshal", "DestroyStructure", true) => {
                    IntrinsicId::MarshalDestroyStructure
                }
                ("System.Array", "Empty", true) if generic => IntrinsicId::ArrayEmpty,
                _ => return None,
            },
        )
    }

    /// The member lookup performed by the `Type.GetXxx` family.
    ///
    /// The flag is `true` for the singular overloads, which take a member name first
    /// (`GetConstructor` takes parameter types instead).
    #[must_use]
    pub fn lookup(self) -> Option<(LookupKind, bool)> {
        Some(match self {
            IntrinsicId::TypeGetConstructor => (LookupKind::Constructors, true),
            IntrinsicId::TypeGetConstructors => (LookupKind::Constructors, false),
            IntrinsicId::TypeGetMethod => (LookupKind::Methods, true),
            IntrinsicId::TypeGetMethods => (LookupKind::Methods, false),
            IntrinsicId::TypeGetField => (LookupKind::Fields, true),
            IntrinsicId::TypeGetFields => (LookupKind::Fields, false),
            IntrinsicId::TypeGetProperty => (LookupKind::Properties, true),
            IntrinsicId::TypeGetProperties => (LookupKind::Properties, false),
            IntrinsicId::TypeGetEvent => (LookupKind::Events, true),
            IntrinsicId::TypeGetEvents => (LookupKind::Events, false),
            IntrinsicId::TypeGetNestedType => (LookupKind::NestedTypes, true),
            IntrinsicId::TypeGetNestedTypes => (LookupKind::NestedTypes, false),
            IntrinsicId::TypeGetMember => (LookupKind::Members, true),
            IntrinsicId::TypeGetMembers => (LookupKind::Members, false),
            IntrinsicId::TypeGetInterface => (LookupKind::Interfaces, true),
            IntrinsicId::TypeGetInterfaces => (LookupKind::Interfaces, false),
            _ => return None,
        })
    }
}

/// The coarse shape of a declared parameter, used to tell overloads apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// `string`
    String,
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `System.Type`
    Type,
    /// `System.Type[]`
    TypeArray,
    /// `object[]`
    ObjectArray,
    /// `System.Reflection.BindingFlags`
    BindingFlags,
    /// Anything else
    Other,
}

impl ParamShape {
    /// The shape of a declared parameter type.
    pub fn of<R: MetadataResolver + ?Sized>(resolver: &R, signature: &TypeSignature) -> Self {
        let named = |token| resolver.resolve_type(token).map(|ty| ty.full_name.clone());
        match signature {
            TypeSignature::String => ParamShape::String,
            TypeSignature::Boolean => ParamShape::Bool,
            TypeSignature::I4 => ParamShape::Int,
            TypeSignature::Class(token) if named(*token).as_deref() == Some("System.Type") => {
                ParamShape::Type
            }
            TypeSignature::ValueType(token)
                if named(*token).as_deref() == Some("System.Reflection.BindingFlags") =>
            {
                ParamShape::BindingFlags
            }
            TypeSignature::SzArray(element) => match element.as_ref() {
                TypeSignature::Object => ParamShape::ObjectArray,
                TypeSignature::Class(token)
                    if named(*token).as_deref() == Some("System.Type") =>
                {
                    ParamShape::TypeArray
                }
                _ => ParamShape::Other,
            },
            _ => ParamShape::Other,
        }
    }
}

/// A call being handled: the callee under its instantiation and the argument values.
pub struct CallSite<'c, 'a, H: ?Sized> {
    /// The calling method
    pub ctx: &'c MethodContext<'a, H>,
    /// Offset of the call instruction
    pub offset: u32,
    /// The callee with the caller's instantiation applied
    pub callee: &'c ResolvedMethod,
    /// The callee's signature under its instantiation
    pub signature: &'c SignatureMethod,
    /// Dereferenced argument values, `this` first for instance callees
    pub arguments: &'c [MultiValue],
}

impl<'c, 'a, H: AnalysisHost + ?Sized> CallSite<'c, 'a, H> {
    fn has_this(&self) -> bool {
        self.callee.method.has_this()
    }

    /// The `this` argument of an instance callee.
    pub fn receiver(&self) -> Option<&'c MultiValue> {
        if self.has_this() {
            self.arguments.first()
        } else {
            None
        }
    }

    /// Declared parameter `index`, `this` excluded.
    pub fn parameter(&self, index: usize) -> Option<&'c MultiValue> {
        self.arguments.get(index + usize::from(self.has_this()))
    }

    /// Shapes of the callee's declared parameters.
    pub fn shapes(&self) -> Vec<ParamShape> {
        self.callee
            .method
            .signature
            .params
            .iter()
            .map(|p| ParamShape::of(self.ctx.host, p))
            .collect()
    }

    /// What an ordinary call to the callee returns.
    ///
    /// `void` yields nothing, a by-ref return the returned location, and everything else
    /// a return value placeholder carrying the callee's return annotation.
    pub fn default_return(&self) -> MultiValue {
        let return_type = &self.signature.return_type;
        if return_type.is_void() {
            return MultiValue::empty();
        }
        if return_type.is_by_ref() {
            return MultiValue::single(AbstractValue::Reference(ReferenceKind::ReturnSlot(
                self.callee.method.token,
            )));
        }
        let requirement = self
            .ctx
            .caches
            .method_annotations(self.ctx.host, &self.callee.method)
            .return_value;
        self.return_with(requirement)
    }

    /// A return value placeholder for the callee carrying `requirement`.
    pub fn return_with(&self, requirement: MemberTypes) -> MultiValue {
        MultiValue::single(AbstractValue::MethodReturn(ReturnValue {
            method: self.callee.method.token,
            requirement,
            declared_type: self.signature.return_type.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{fixture, Fixture};

    #[test]
    fn classifies_reflection_entry_points() {
        let Fixture { store, corlib, .. } = fixture();
        let classify = |token| {
            let method = store.resolve_method_definition(token).expect("method");
            IntrinsicId::classify(&store, &method)
        };
        assert_eq!(classify(corlib.type_get_type), Some(IntrinsicId::TypeGetType));
        assert_eq!(classify(corlib.object_get_type), Some(IntrinsicId::ObjectGetType));
        assert_eq!(
            classify(corlib.activator_create_instance_type),
            Some(IntrinsicId::ActivatorCreateInstanceType)
        );
        assert_eq!(
            classify(corlib.activator_create_instance_args),
            Some(IntrinsicId::ActivatorCreateInstanceType)
        );
        assert_eq!(
            classify(corlib.activator_create_instance_name),
            Some(IntrinsicId::ActivatorCreateInstanceName)
        );
        assert_eq!(
            classify(corlib.activator_create_instance_generic),
            Some(IntrinsicId::ActivatorCreateInstanceGeneric)
        );
        assert_eq!(classify(corlib.object_ctor), None);
        assert_eq!(
            IntrinsicId::TypeGetMethods.lookup(),
            Some((LookupKind::Methods, false))
        );
        assert_eq!(IntrinsicId::ArrayEmpty.to_string(), "ArrayEmpty");
    }

    #[test]
    fn parameter_shapes() {
        let Fixture { store, corlib, .. } = fixture();
        let method = store
            .resolve_method_definition(corlib.type_get_method_flags)
            .expect("method");
        let shapes: Vec<_> = method
            .signature
            .params
            .iter()
            .map(|p| ParamShape::of(&store, p))
            .collect();
        assert_eq!(shapes, vec![ParamShape::String, ParamShape::BindingFlags]);
        assert_eq!(
            ParamShape::of(&store, &TypeSignature::SzArray(Box::new(TypeSignature::Object))),
            ParamShape::ObjectArray
        );
    }
}
