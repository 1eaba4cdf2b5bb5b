//! Collaborators the analysis is embedded in.
//!
//! The analysis never reads binaries, never decides what is kept by default and never
//! prints anything. Everything it needs from the outside world goes through the traits in
//! this module:
//!
//! - [`MetadataResolver`] resolves tokens and names to descriptors and bodies
//! - [`AnnotationProvider`] supplies member requirements and `RequiresUnreferencedCode`
//! - [`FieldValueProvider`] supplies statically known field contents
//! - [`ReachabilityMarker`] receives members that must be kept
//! - [`DiagnosticSink`] receives warnings
//!
//! [`AnalysisHost`] bundles all five and is implemented automatically for any type that
//! implements them. [`RecordingHost`] is a complete host backed by a
//! [`MetadataStore`](crate::metadata::MetadataStore) that records marks and diagnostics in
//! concurrent collections.
//!
//! All methods take `&self`; implementations used with parallel batch analysis must be
//! `Sync`.

mod diagnostics;
mod recorder;

use std::{fmt, sync::Arc};

use strum::Display;

pub use diagnostics::{Diagnostic, DiagnosticCode, DiagnosticLog, DiagnosticSeverity};
pub use recorder::{MarkedMember, MemberKind, ReachabilityRecorder, RecordingHost};

use crate::{
    analysis::{requirements::MemberTypes, value::GenericOwner, value::MultiValue},
    metadata::{
        body::MethodBody,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        types::{EventRc, FieldRc, MethodRc, PropertyRc, ResolvedMethod, TypeRc},
    },
};

/// Where a mark or diagnostic was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    /// The analyzed method
    pub method: Token,
    /// Instruction offset, `None` for method-level observations
    pub offset: Option<u32>,
}

impl Origin {
    /// A method-level origin.
    #[must_use]
    pub const fn method(method: Token) -> Self {
        Origin {
            method,
            offset: None,
        }
    }

    /// An origin at an instruction.
    #[must_use]
    pub const fn at(method: Token, offset: u32) -> Self {
        Origin {
            method,
            offset: Some(offset),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}+IL_{offset:04x}", self.method),
            None => write!(f, "{}", self.method),
        }
    }
}

/// Why a member is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum MarkReason {
    /// Required by a member-types annotation or an equivalent intrinsic requirement
    #[strum(serialize = "accessed members")]
    AccessedMembers,
    /// Named by a string resolved as a type name
    #[strum(serialize = "type name")]
    TypeName,
    /// Looked up by name through a reflection API on a known type
    #[strum(serialize = "reflection lookup")]
    ReflectionLookup,
    /// Instantiated through `Activator`
    #[strum(serialize = "activation")]
    Activation,
    /// Type initializer run explicitly
    #[strum(serialize = "class constructor")]
    ClassConstructor,
    /// Laid out by the interop marshaller
    #[strum(serialize = "interop layout")]
    InteropLayout,
    /// Deferred requirement resolved at a cast to a concrete type
    #[strum(serialize = "cast target")]
    CastTarget,
}

/// Resolves metadata for the analysis.
///
/// Implementations must be pure: the same query always yields the same answer. `None`
/// means the item is outside the closed world (or does not exist) and is handled
/// conservatively by the analysis.
pub trait MetadataResolver {
    /// Resolves a `TypeDef`, `TypeRef` or `TypeSpec` token to its definition.
    fn resolve_type(&self, token: Token) -> Option<TypeRc>;

    /// Resolves a `MethodDef`, `MemberRef` or `MethodSpec` token, including the
    /// instantiation a reference applies.
    fn resolve_method(&self, token: Token) -> Option<ResolvedMethod>;

    /// Resolves a `Field` or field `MemberRef` token.
    fn resolve_field(&self, token: Token) -> Option<FieldRc>;

    /// Resolves a `Property` token.
    fn resolve_property(&self, token: Token) -> Option<PropertyRc>;

    /// Resolves an `Event` token.
    fn resolve_event(&self, token: Token) -> Option<EventRc>;

    /// Resolves a type by reflection-style full name (`Ns.Outer+Inner`) in any module.
    fn resolve_type_by_name(&self, full_name: &str) -> Option<TypeRc>;

    /// Resolves a type by full name within the named assembly.
    fn resolve_type_in_assembly(&self, assembly: &str, full_name: &str) -> Option<TypeRc>;

    /// The body of a method definition.
    fn method_body(&self, method: Token) -> Option<Arc<MethodBody>>;

    /// The call-site signature of a `calli` (`StandAloneSig` token).
    fn call_site_signature(&self, token: Token) -> Option<SignatureMethod>;

    /// The signature a type token denotes; `TypeSpec` tokens may carry generic
    /// instantiations or generic parameters.
    fn type_signature(&self, token: Token) -> Option<TypeSignature>;

    /// Resolves a method definition token without instantiation.
    fn resolve_method_definition(&self, token: Token) -> Option<MethodRc> {
        self.resolve_method(token).map(|resolved| resolved.method)
    }
}

/// Supplies member requirements declared on members.
///
/// Every method has a default of "no requirement".
pub trait AnnotationProvider {
    /// Requirement on a declared parameter (`index` excludes `this`).
    fn parameter_requirement(&self, _method: Token, _index: u16) -> MemberTypes {
        MemberTypes::empty()
    }

    /// Requirement on the return value.
    fn return_requirement(&self, _method: Token) -> MemberTypes {
        MemberTypes::empty()
    }

    /// Requirement on `this` of an instance method (used for `System.Type` subclasses).
    fn this_requirement(&self, _method: Token) -> MemberTypes {
        MemberTypes::empty()
    }

    /// Requirement on a field.
    fn field_requirement(&self, _field: Token) -> MemberTypes {
        MemberTypes::empty()
    }

    /// Requirement on a generic parameter.
    fn generic_parameter_requirement(&self, _owner: GenericOwner, _index: u16) -> MemberTypes {
        MemberTypes::empty()
    }

    /// The message of a `RequiresUnreferencedCode` attribute on the method.
    fn requires_unreferenced_code(&self, _method: Token) -> Option<String> {
        None
    }
}

/// Supplies field contents known without running the program.
pub trait FieldValueProvider {
    /// Known values of `field`, or `None` to use an opaque placeholder.
    fn field_value(&self, field: Token) -> Option<MultiValue>;
}

/// Receives members that must survive trimming.
///
/// Marking is fire-and-forget and idempotent: marking a member twice is the same as
/// marking it once.
pub trait ReachabilityMarker {
    /// Marks a type.
    fn mark_type(&self, token: Token, reason: MarkReason, origin: &Origin);
    /// Marks a method.
    fn mark_method(&self, token: Token, reason: MarkReason, origin: &Origin);
    /// Marks a field.
    fn mark_field(&self, token: Token, reason: MarkReason, origin: &Origin);
    /// Marks a constructor.
    fn mark_constructor(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.mark_method(token, reason, origin);
    }
    /// Marks a property.
    fn mark_property(&self, token: Token, reason: MarkReason, origin: &Origin);
    /// Marks an event.
    fn mark_event(&self, token: Token, reason: MarkReason, origin: &Origin);
}

/// Receives diagnostics.
pub trait DiagnosticSink {
    /// Reports one diagnostic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Everything the analysis needs from its embedding.
pub trait AnalysisHost:
    MetadataResolver + AnnotationProvider + FieldValueProvider + ReachabilityMarker + DiagnosticSink
{
}

impl<T> AnalysisHost for T where
    T: MetadataResolver
        + AnnotationProvider
        + FieldValueProvider
        + ReachabilityMarker
        + DiagnosticSink
{
}
