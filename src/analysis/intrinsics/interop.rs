//! Detection of p/invoke signatures that marshal COM objects.
//!
//! Built-in COM marshalling creates runtime callable wrappers for types the analysis cannot
//! see, so calls to p/invoke methods that pass or return COM interfaces are reported.

use crate::{
    analysis::requirements::Effects,
    host::{AnalysisHost, DiagnosticCode, MetadataResolver},
    metadata::{
        marshalling::NativeType,
        signatures::TypeSignature,
        types::{MethodDesc, TypeDesc},
    },
};

const NEVER_COM: &[&str] = &["System.String", "System.Text.StringBuilder"];
const MARSHALLED_BY_HANDLE: &[&str] = &[
    "System.Runtime.InteropServices.SafeHandle",
    "System.Runtime.InteropServices.CriticalHandle",
    "System.Delegate",
    "System.MulticastDelegate",
    "System.ValueType",
    "System.Enum",
];

/// Reports a call to a p/invoke `method` whose signature involves COM marshalling.
///
/// Does nothing for methods that are not p/invoke.
pub fn check_com_interop<H: AnalysisHost + ?Sized>(method: &MethodDesc, effects: &Effects<'_, H>) {
    if !method.is_pinvoke() {
        return;
    }
    let host = effects.host();
    let returns_com = !method.signature.return_type.is_void()
        && is_com(
            host,
            method.return_marshal.as_ref(),
            &method.signature.return_type,
        );
    let param_com = method
        .signature
        .params
        .iter()
        .enumerate()
        .any(|(i, param)| is_com(host, method.param_marshal.get(i).and_then(Option::as_ref), param));

    if returns_com || param_com {
        effects.report(
            DiagnosticCode::ComInterop,
            format!(
                "p/invoke method '{}' uses built-in COM interop, which may need members that are not statically referenced",
                method.name
            ),
        );
    }
}

fn is_com<R: MetadataResolver + ?Sized>(
    resolver: &R,
    marshal: Option<&NativeType>,
    signature: &TypeSignature,
) -> bool {
    if let Some(native) = marshal {
        return native.is_com_interface();
    }
    match signature.strip_by_ref() {
        TypeSignature::Object => true,
        TypeSignature::Class(token) => resolver
            .resolve_type(*token)
            .is_some_and(|ty| is_com_class(resolver, &ty)),
        _ => false,
    }
}

fn is_com_class<R: MetadataResolver + ?Sized>(resolver: &R, ty: &TypeDesc) -> bool {
    if ty.full_name == "System.Array" || ty.is_interface() {
        return true;
    }
    if NEVER_COM.contains(&ty.full_name.as_str()) || ty.has_explicit_layout() {
        return false;
    }
    let mut current = ty.extends;
    let mut depth = 0;
    while let Some(token) = current {
        let Some(base) = resolver.resolve_type(token) else {
            break;
        };
        if MARSHALLED_BY_HANDLE.contains(&base.full_name.as_str()) {
            return false;
        }
        depth += 1;
        if depth > 64 {
            break;
        }
        current = base.extends;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::caches::AnalysisCaches,
        host::{Origin, RecordingHost},
        metadata::{
            signatures::SignatureMethod,
            token::Token,
            types::{MethodAttributes, TypeAttributes},
            MetadataStore,
        },
    };

    fn pinvoke(store: &mut MetadataStore, owner: Token, params: Vec<TypeSignature>) -> Token {
        store.add_method(
            owner,
            "Native",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::PINVOKE_IMPL,
            SignatureMethod::new_static(TypeSignature::Void, params),
        )
    }

    fn reports(store: &MetadataStore, method: Token) -> bool {
        let host = RecordingHost::new(store);
        let caches = AnalysisCaches::new();
        let effects = Effects::new(&host, &caches, Origin::at(method, 0), true);
        let desc = store.resolve_method_definition(method).expect("method");
        check_com_interop(&desc, &effects);
        host.diagnostics.has_code(DiagnosticCode::ComInterop)
    }

    #[test]
    fn object_and_interfaces_are_com() {
        let mut store = MetadataStore::new();
        let object = store.add_type("corlib", "System", "Object", TypeAttributes::PUBLIC, None);
        let native = store.add_type("app", "App", "Native", TypeAttributes::PUBLIC, Some(object));
        let iface = store.add_type(
            "app",
            "App",
            "IThing",
            TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            None,
        );
        let takes_object = pinvoke(&mut store, native, vec![TypeSignature::Object]);
        let takes_iface = pinvoke(&mut store, native, vec![TypeSignature::Class(iface)]);
        let takes_int = pinvoke(&mut store, native, vec![TypeSignature::I4]);

        assert!(reports(&store, takes_object));
        assert!(reports(&store, takes_iface));
        assert!(!reports(&store, takes_int));
    }

    #[test]
    fn marshalling_and_handles() {
        let mut store = MetadataStore::new();
        let object = store.add_type("corlib", "System", "Object", TypeAttributes::PUBLIC, None);
        let safe_handle = store.add_type(
            "corlib",
            "System.Runtime.InteropServices",
            "SafeHandle",
            TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT,
            Some(object),
        );
        let file_handle =
            store.add_type("app", "App", "FileHandle", TypeAttributes::PUBLIC, Some(safe_handle));
        let native = store.add_type("app", "App", "Native", TypeAttributes::PUBLIC, Some(object));

        let takes_handle = pinvoke(&mut store, native, vec![TypeSignature::Class(file_handle)]);
        assert!(!reports(&store, takes_handle));

        let marshalled = pinvoke(&mut store, native, vec![TypeSignature::I]);
        store.set_marshalling(marshalled, None, vec![Some(NativeType::IUnknown)]);
        assert!(reports(&store, marshalled));

        let as_string = pinvoke(&mut store, native, vec![TypeSignature::Object]);
        store.set_marshalling(as_string, None, vec![Some(NativeType::LPWStr)]);
        assert!(!reports(&store, as_string));
    }
}
