//! Shared metadata for unit tests.
//!
//! [`fixture`] builds a small core library with the reflection surface the intrinsics
//! model, and an application assembly with a class hierarchy, an interface chain, a nested
//! type and a property. Tokens are stable: the store allocates them in insertion order.

use crate::{
    analysis::{
        requirements::MemberTypes, value::GenericOwner, AnalysisConfig, AnalysisSession,
        MethodAnalysis,
    },
    host::RecordingHost,
    metadata::{
        body::MethodBody,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        types::{FieldAttributes, GenericParamDesc, MethodAttributes, TypeAttributes},
        MetadataStore,
    },
};

const CORLIB: &str = "System.Runtime";
const APP: &str = "App";

/// Tokens of the synthetic core library.
pub struct Corlib {
    pub object: Token,
    pub object_ctor: Token,
    pub object_get_type: Token,
    pub runtime_type_handle: Token,
    pub type_type: Token,
    pub type_empty_types: Token,
    pub type_get_type: Token,
    pub type_get_type_from_handle: Token,
    pub type_get_type_handle: Token,
    pub type_get_base_type: Token,
    pub type_get_method: Token,
    pub type_get_method_flags: Token,
    pub type_get_methods: Token,
    pub type_get_field: Token,
    pub type_get_properties: Token,
    pub type_get_constructor: Token,
    pub type_get_nested_type: Token,
    pub type_make_generic_type: Token,
    pub expression_call: Token,
    pub expression_field: Token,
    pub method_base_get_method_from_handle: Token,
    pub method_info: Token,
    pub method_info_make_generic_method: Token,
    pub activator_create_instance_type: Token,
    pub activator_create_instance_args: Token,
    pub activator_create_instance_name: Token,
    pub activator_create_instance_generic: Token,
    pub runtime_helpers_run_class_constructor: Token,
    pub array_empty: Token,
    pub marshal_size_of: Token,
    pub marshal_offset_of: Token,
}

/// Tokens of the synthetic application assembly.
pub struct App {
    pub base: Token,
    pub base_ctor: Token,
    pub base_describe: Token,
    pub base_hidden: Token,
    pub runnable: Token,
    pub marker: Token,
    pub foo: Token,
    pub foo_ctor: Token,
    pub foo_ctor_int: Token,
    pub foo_run: Token,
    pub foo_secret: Token,
    pub foo_get_name: Token,
    pub foo_name: Token,
    pub foo_nested: Token,
}

/// A populated store with the tokens of both assemblies.
pub struct Fixture {
    pub store: MetadataStore,
    pub corlib: Corlib,
    pub app: App,
}

const PUBLIC_STATIC: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::STATIC);
const CTOR: MethodAttributes = MethodAttributes::PUBLIC
    .union(MethodAttributes::SPECIAL_NAME)
    .union(MethodAttributes::RT_SPECIAL_NAME);

fn corlib(store: &mut MetadataStore) -> Corlib {
    let public = TypeAttributes::PUBLIC;
    let object = store.add_type(CORLIB, "System", "Object", public, None);
    let object_ctor = store.add_method(
        object,
        ".ctor",
        CTOR,
        SignatureMethod::new_instance(TypeSignature::Void, vec![]),
    );
    let value_type = store.add_type(
        CORLIB,
        "System",
        "ValueType",
        public | TypeAttributes::ABSTRACT,
        Some(object),
    );
    let enum_type = store.add_type(
        CORLIB,
        "System",
        "Enum",
        public | TypeAttributes::ABSTRACT,
        Some(value_type),
    );
    store.add_type(
        CORLIB,
        "System",
        "String",
        public | TypeAttributes::SEALED,
        Some(object),
    );
    let runtime_type_handle = store.add_type(
        CORLIB,
        "System",
        "RuntimeTypeHandle",
        public | TypeAttributes::SEALED,
        Some(value_type),
    );
    let binding_flags = store.add_type(
        CORLIB,
        "System.Reflection",
        "BindingFlags",
        public | TypeAttributes::SEALED,
        Some(enum_type),
    );
    let type_type = store.add_type(
        CORLIB,
        "System",
        "Type",
        public | TypeAttributes::ABSTRACT,
        Some(object),
    );
    let method_base = store.add_type(
        CORLIB,
        "System.Reflection",
        "MethodBase",
        public | TypeAttributes::ABSTRACT,
        Some(object),
    );
    let method_info = store.add_type(
        CORLIB,
        "System.Reflection",
        "MethodInfo",
        public | TypeAttributes::ABSTRACT,
        Some(method_base),
    );

    let type_sig = TypeSignature::Class(type_type);
    let type_array = TypeSignature::SzArray(Box::new(type_sig.clone()));
    let object_array = TypeSignature::SzArray(Box::new(TypeSignature::Object));
    let flags_sig = TypeSignature::ValueType(binding_flags);
    let handle_sig = TypeSignature::ValueType(runtime_type_handle);
    let method_info_sig = TypeSignature::Class(method_info);

    let object_get_type = store.add_method(
        object,
        "GetType",
        MethodAttributes::PUBLIC,
        SignatureMethod::new_instance(type_sig.clone(), vec![]),
    );

    let type_empty_types = store.add_field(
        type_type,
        "EmptyTypes",
        FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::INIT_ONLY,
        type_array.clone(),
    );
    let type_get_type = store.add_method(
        type_type,
        "GetType",
        PUBLIC_STATIC,
        SignatureMethod::new_static(type_sig.clone(), vec![TypeSignature::String]),
    );
    let type_get_type_from_handle = store.add_method(
        type_type,
        "GetTypeFromHandle",
        PUBLIC_STATIC,
        SignatureMethod::new_static(type_sig.clone(), vec![handle_sig.clone()]),
    );
    let instance = |ret: TypeSignature, params: Vec<TypeSignature>| {
        SignatureMethod::new_instance(ret, params)
    };
    let type_get_type_handle = store.add_method(
        type_type,
        "get_TypeHandle",
        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
        instance(handle_sig.clone(), vec![]),
    );
    let type_get_base_type = store.add_method(
        type_type,
        "get_BaseType",
        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
        instance(type_sig.clone(), vec![]),
    );
    let type_get_method = store.add_method(
        type_type,
        "GetMethod",
        MethodAttributes::PUBLIC,
        instance(method_info_sig.clone(), vec![TypeSignature::String]),
    );
    let type_get_method_flags = store.add_method(
        type_type,
        "GetMethod",
        MethodAttributes::PUBLIC,
        instance(
            method_info_sig.clone(),
            vec![TypeSignature::String, flags_sig.clone()],
        ),
    );
    let type_get_methods = store.add_method(
        type_type,
        "GetMethods",
        MethodAttributes::PUBLIC,
        instance(
            TypeSignature::SzArray(Box::new(method_info_sig.clone())),
            vec![flags_sig.clone()],
        ),
    );
    let type_get_field = store.add_method(
        type_type,
        "GetField",
        MethodAttributes::PUBLIC,
        instance(TypeSignature::Object, vec![TypeSignature::String]),
    );
    let type_get_properties = store.add_method(
        type_type,
        "GetProperties",
        MethodAttributes::PUBLIC,
        instance(TypeSignature::Object, vec![]),
    );
    let type_get_constructor = store.add_method(
        type_type,
        "GetConstructor",
        MethodAttributes::PUBLIC,
        instance(TypeSignature::Object, vec![type_array.clone()]),
    );
    let type_get_nested_type = store.add_method(
        type_type,
        "GetNestedType",
        MethodAttributes::PUBLIC,
        instance(type_sig.clone(), vec![TypeSignature::String, flags_sig.clone()]),
    );
    let type_make_generic_type = store.add_method(
        type_type,
        "MakeGenericType",
        MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
        instance(type_sig.clone(), vec![type_array.clone()]),
    );
    store.annotate_this(type_get_method, MemberTypes::PUBLIC_METHODS);
    store.annotate_this(
        type_get_method_flags,
        MemberTypes::PUBLIC_METHODS | MemberTypes::NON_PUBLIC_METHODS,
    );
    store.annotate_this(type_get_field, MemberTypes::PUBLIC_FIELDS);

    let method_base_get_method_from_handle = store.add_method(
        method_base,
        "GetMethodFromHandle",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::Class(method_base), vec![TypeSignature::I]),
    );
    let method_info_make_generic_method = store.add_method(
        method_info,
        "MakeGenericMethod",
        MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
        instance(method_info_sig, vec![type_array]),
    );

    let activator = store.add_type(
        CORLIB,
        "System",
        "Activator",
        public | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object),
    );
    let activator_create_instance_type = store.add_method(
        activator,
        "CreateInstance",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::Object, vec![type_sig.clone()]),
    );
    let activator_create_instance_args = store.add_method(
        activator,
        "CreateInstance",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::Object, vec![type_sig.clone(), object_array]),
    );
    let activator_create_instance_name = store.add_method(
        activator,
        "CreateInstance",
        PUBLIC_STATIC,
        SignatureMethod::new_static(
            TypeSignature::Object,
            vec![TypeSignature::String, TypeSignature::String],
        ),
    );
    let activator_create_instance_generic = store.add_method(
        activator,
        "CreateInstance",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::GenericParamMethod(0), vec![]),
    );
    store.set_generic_params(
        GenericOwner::Method(activator_create_instance_generic),
        vec![GenericParamDesc::new(0, "T")],
    );
    store.annotate_parameter(
        activator_create_instance_type,
        0,
        MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR,
    );
    store.annotate_parameter(
        activator_create_instance_args,
        0,
        MemberTypes::PUBLIC_CONSTRUCTORS,
    );
    store.annotate_generic_parameter(
        GenericOwner::Method(activator_create_instance_generic),
        0,
        MemberTypes::PUBLIC_PARAMETERLESS_CONSTRUCTOR,
    );

    let runtime_helpers = store.add_type(
        CORLIB,
        "System.Runtime.CompilerServices",
        "RuntimeHelpers",
        public | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object),
    );
    let runtime_helpers_run_class_constructor = store.add_method(
        runtime_helpers,
        "RunClassConstructor",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::Void, vec![handle_sig]),
    );

    let array = store.add_type(
        CORLIB,
        "System",
        "Array",
        public | TypeAttributes::ABSTRACT,
        Some(object),
    );
    let array_empty = store.add_method(
        array,
        "Empty",
        PUBLIC_STATIC,
        SignatureMethod::new_static(
            TypeSignature::SzArray(Box::new(TypeSignature::GenericParamMethod(0))),
            vec![],
        ),
    );
    store.set_generic_params(
        GenericOwner::Method(array_empty),
        vec![GenericParamDesc::new(0, "T")],
    );

    let marshal = store.add_type(
        CORLIB,
        "System.Runtime.InteropServices",
        "Marshal",
        public | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object),
    );
    let marshal_size_of = store.add_method(
        marshal,
        "SizeOf",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::I4, vec![type_sig.clone()]),
    );
    let marshal_offset_of = store.add_method(
        marshal,
        "OffsetOf",
        PUBLIC_STATIC,
        SignatureMethod::new_static(TypeSignature::I, vec![type_sig.clone(), TypeSignature::String]),
    );

    let expression = store.add_type(
        CORLIB,
        "System.Linq.Expressions",
        "Expression",
        public | TypeAttributes::ABSTRACT,
        Some(object),
    );
    let expression_sig = TypeSignature::Class(expression);
    let expression_call = store.add_method(
        expression,
        "Call",
        PUBLIC_STATIC,
        SignatureMethod::new_static(
            expression_sig.clone(),
            vec![
                type_sig.clone(),
                TypeSignature::String,
                TypeSignature::SzArray(Box::new(type_sig.clone())),
                TypeSignature::SzArray(Box::new(expression_sig.clone())),
            ],
        ),
    );
    let expression_field = store.add_method(
        expression,
        "Field",
        PUBLIC_STATIC,
        SignatureMethod::new_static(
            expression_sig.clone(),
            vec![expression_sig, type_sig, TypeSignature::String],
        ),
    );

    Corlib {
        object,
        object_ctor,
        object_get_type,
        runtime_type_handle,
        type_type,
        type_empty_types,
        type_get_type,
        type_get_type_from_handle,
        type_get_type_handle,
        type_get_base_type,
        type_get_method,
        type_get_method_flags,
        type_get_methods,
        type_get_field,
        type_get_properties,
        type_get_constructor,
        type_get_nested_type,
        type_make_generic_type,
        expression_call,
        expression_field,
        method_base_get_method_from_handle,
        method_info,
        method_info_make_generic_method,
        activator_create_instance_type,
        activator_create_instance_args,
        activator_create_instance_name,
        activator_create_instance_generic,
        runtime_helpers_run_class_constructor,
        array_empty,
        marshal_size_of,
        marshal_offset_of,
    }
}

fn app(store: &mut MetadataStore, corlib: &Corlib) -> App {
    let interface =
        TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
    let void = || SignatureMethod::new_instance(TypeSignature::Void, vec![]);

    let base = store.add_type(APP, "App", "Base", TypeAttributes::PUBLIC, Some(corlib.object));
    let base_ctor = store.add_method(base, ".ctor", CTOR, void());
    let base_describe = store.add_method(
        base,
        "Describe",
        MethodAttributes::PUBLIC,
        SignatureMethod::new_instance(TypeSignature::String, vec![]),
    );
    let base_hidden = store.add_method(base, "Hidden", MethodAttributes::PRIVATE, void());

    let runnable = store.add_type(APP, "App", "IRunnable", interface, None);
    let marker = store.add_type(APP, "App", "IMarker", interface, None);
    store.add_interface_impl(runnable, marker);

    let foo = store.add_type(APP, "App", "Foo", TypeAttributes::PUBLIC, Some(base));
    store.add_interface_impl(foo, runnable);
    let foo_ctor = store.add_method(foo, ".ctor", CTOR, void());
    let foo_ctor_int = store.add_method(
        foo,
        ".ctor",
        CTOR,
        SignatureMethod::new_instance(TypeSignature::Void, vec![TypeSignature::I4]),
    );
    let foo_run = store.add_method(
        foo,
        "Run",
        MethodAttributes::PUBLIC,
        SignatureMethod::new_instance(TypeSignature::Void, vec![TypeSignature::Object]),
    );
    let foo_secret = store.add_method(foo, "Secret", MethodAttributes::PRIVATE, void());
    let foo_get_name = store.add_method(
        foo,
        "get_Name",
        MethodAttributes::PUBLIC | MethodAttributes::SPECIAL_NAME,
        SignatureMethod::new_instance(TypeSignature::String, vec![]),
    );
    let foo_name = store.add_property(foo, "Name", Some(foo_get_name), None);
    let foo_nested = store.add_nested_type(
        foo,
        "Nested",
        TypeAttributes::NESTED_PUBLIC,
        Some(corlib.object),
    );

    App {
        base,
        base_ctor,
        base_describe,
        base_hidden,
        runnable,
        marker,
        foo,
        foo_ctor,
        foo_ctor_int,
        foo_run,
        foo_secret,
        foo_get_name,
        foo_name,
        foo_nested,
    }
}

/// Builds the shared store.
pub fn fixture() -> Fixture {
    let mut store = MetadataStore::new();
    let corlib = corlib(&mut store);
    let app = app(&mut store, &corlib);
    Fixture { store, corlib, app }
}

/// Adds the static class `App.Program` that test methods are defined on.
pub fn program(store: &mut MetadataStore, object: Token) -> Token {
    store.add_type(
        APP,
        "App",
        "Program",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
        Some(object),
    )
}

/// Adds a public method with `body`; static unless the signature has `this`.
pub fn define(
    store: &mut MetadataStore,
    declaring: Token,
    name: &str,
    signature: SignatureMethod,
    body: MethodBody,
) -> Token {
    let flags = if signature.has_this {
        MethodAttributes::PUBLIC
    } else {
        PUBLIC_STATIC
    };
    let method = store.add_method(declaring, name, flags, signature);
    store.set_method_body(method, body);
    method
}

/// Analyzes `method` sequentially against a fresh recording host.
pub fn analyze(store: &MetadataStore, method: Token) -> (MethodAnalysis, RecordingHost<'_, MetadataStore>) {
    let host = RecordingHost::new(store);
    let analysis = AnalysisSession::new(&host, AnalysisConfig::sequential())
        .analyze_method(method)
        .unwrap();
    (analysis, host)
}
