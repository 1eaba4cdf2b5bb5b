//! Concurrent recorders for marks, and a host built on them.

use std::sync::Arc;

use crossbeam_skiplist::SkipSet;
use log::trace;

use crate::{
    analysis::{requirements::MemberTypes, value::GenericOwner, value::MultiValue},
    host::{
        AnnotationProvider, Diagnostic, DiagnosticLog, DiagnosticSink, FieldValueProvider,
        MarkReason, MetadataResolver, Origin, ReachabilityMarker,
    },
    metadata::{
        body::MethodBody,
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
        types::{EventRc, FieldRc, PropertyRc, ResolvedMethod, TypeRc},
    },
};

/// Kind of a marked member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberKind {
    /// A type
    Type,
    /// A method or constructor
    Method,
    /// A field
    Field,
    /// A property
    Property,
    /// An event
    Event,
}

/// A member recorded as reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkedMember {
    /// Kind of member
    pub kind: MemberKind,
    /// Its definition token
    pub token: Token,
}

/// Lock-free set of marked members.
///
/// Iteration is ordered by kind, then token, independent of the order marks arrived in.
#[derive(Debug, Default)]
pub struct ReachabilityRecorder {
    marked: SkipSet<MarkedMember>,
}

impl ReachabilityRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a member.
    pub fn mark(&self, kind: MemberKind, token: Token) {
        self.marked.insert(MarkedMember { kind, token });
    }

    /// Returns true if the member has been marked.
    pub fn contains(&self, kind: MemberKind, token: Token) -> bool {
        self.marked.contains(&MarkedMember { kind, token })
    }

    /// Number of marked members.
    pub fn len(&self) -> usize {
        self.marked.len()
    }

    /// Returns true if nothing has been marked.
    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    /// Marked members in order.
    pub fn members(&self) -> Vec<MarkedMember> {
        self.marked.iter().map(|entry| *entry.value()).collect()
    }

    /// Tokens of marked members of one kind.
    pub fn tokens(&self, kind: MemberKind) -> Vec<Token> {
        self.marked
            .iter()
            .filter(|entry| entry.value().kind == kind)
            .map(|entry| entry.value().token)
            .collect()
    }
}

impl ReachabilityMarker for ReachabilityRecorder {
    fn mark_type(&self, token: Token, reason: MarkReason, origin: &Origin) {
        trace!("mark type {token} ({reason}) from {origin}");
        self.mark(MemberKind::Type, token);
    }

    fn mark_method(&self, token: Token, reason: MarkReason, origin: &Origin) {
        trace!("mark method {token} ({reason}) from {origin}");
        self.mark(MemberKind::Method, token);
    }

    fn mark_field(&self, token: Token, reason: MarkReason, origin: &Origin) {
        trace!("mark field {token} ({reason}) from {origin}");
        self.mark(MemberKind::Field, token);
    }

    fn mark_property(&self, token: Token, reason: MarkReason, origin: &Origin) {
        trace!("mark property {token} ({reason}) from {origin}");
        self.mark(MemberKind::Property, token);
    }

    fn mark_event(&self, token: Token, reason: MarkReason, origin: &Origin) {
        trace!("mark event {token} ({reason}) from {origin}");
        self.mark(MemberKind::Event, token);
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn report(&self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// A complete host: metadata queries go to `metadata`, marks and diagnostics are recorded.
///
/// # Examples
///
/// ```rust,ignore
/// use dotreach::{host::RecordingHost, analysis::AnalysisSession};
///
/// let host = RecordingHost::new(&store);
/// let session = AnalysisSession::new(&host, AnalysisConfig::default());
/// session.analyze_method(entry_point)?;
/// for member in host.marks.members() {
///     println!("{:?} {}", member.kind, member.token);
/// }
/// ```
#[derive(Debug)]
pub struct RecordingHost<'m, M> {
    /// Metadata and annotations
    pub metadata: &'m M,
    /// Members marked so far
    pub marks: ReachabilityRecorder,
    /// Diagnostics reported so far
    pub diagnostics: DiagnosticLog,
}

impl<'m, M> RecordingHost<'m, M> {
    /// Creates a host with empty recorders.
    #[must_use]
    pub fn new(metadata: &'m M) -> Self {
        RecordingHost {
            metadata,
            marks: ReachabilityRecorder::new(),
            diagnostics: DiagnosticLog::new(),
        }
    }
}

impl<M: MetadataResolver> MetadataResolver for RecordingHost<'_, M> {
    fn resolve_type(&self, token: Token) -> Option<TypeRc> {
        self.metadata.resolve_type(token)
    }

    fn resolve_method(&self, token: Token) -> Option<ResolvedMethod> {
        self.metadata.resolve_method(token)
    }

    fn resolve_field(&self, token: Token) -> Option<FieldRc> {
        self.metadata.resolve_field(token)
    }

    fn resolve_property(&self, token: Token) -> Option<PropertyRc> {
        self.metadata.resolve_property(token)
    }

    fn resolve_event(&self, token: Token) -> Option<EventRc> {
        self.metadata.resolve_event(token)
    }

    fn resolve_type_by_name(&self, full_name: &str) -> Option<TypeRc> {
        self.metadata.resolve_type_by_name(full_name)
    }

    fn resolve_type_in_assembly(&self, assembly: &str, full_name: &str) -> Option<TypeRc> {
        self.metadata.resolve_type_in_assembly(assembly, full_name)
    }

    fn method_body(&self, method: Token) -> Option<Arc<MethodBody>> {
        self.metadata.method_body(method)
    }

    fn call_site_signature(&self, token: Token) -> Option<SignatureMethod> {
        self.metadata.call_site_signature(token)
    }

    fn type_signature(&self, token: Token) -> Option<TypeSignature> {
        self.metadata.type_signature(token)
    }
}

impl<M: AnnotationProvider> AnnotationProvider for RecordingHost<'_, M> {
    fn parameter_requirement(&self, method: Token, index: u16) -> MemberTypes {
        self.metadata.parameter_requirement(method, index)
    }

    fn return_requirement(&self, method: Token) -> MemberTypes {
        self.metadata.return_requirement(method)
    }

    fn this_requirement(&self, method: Token) -> MemberTypes {
        self.metadata.this_requirement(method)
    }

    fn field_requirement(&self, field: Token) -> MemberTypes {
        self.metadata.field_requirement(field)
    }

    fn generic_parameter_requirement(&self, owner: GenericOwner, index: u16) -> MemberTypes {
        self.metadata.generic_parameter_requirement(owner, index)
    }

    fn requires_unreferenced_code(&self, method: Token) -> Option<String> {
        self.metadata.requires_unreferenced_code(method)
    }
}

impl<M: FieldValueProvider> FieldValueProvider for RecordingHost<'_, M> {
    fn field_value(&self, field: Token) -> Option<MultiValue> {
        self.metadata.field_value(field)
    }
}

impl<M> ReachabilityMarker for RecordingHost<'_, M> {
    fn mark_type(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.marks.mark_type(token, reason, origin);
    }

    fn mark_method(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.marks.mark_method(token, reason, origin);
    }

    fn mark_field(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.marks.mark_field(token, reason, origin);
    }

    fn mark_property(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.marks.mark_property(token, reason, origin);
    }

    fn mark_event(&self, token: Token, reason: MarkReason, origin: &Origin) {
        self.marks.mark_event(token, reason, origin);
    }
}

impl<M> DiagnosticSink for RecordingHost<'_, M> {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_idempotent_and_ordered() {
        let recorder = ReachabilityRecorder::new();
        let origin = Origin::method(Token::new(0x0600_0001));
        recorder.mark_method(Token::new(0x0600_0003), MarkReason::Activation, &origin);
        recorder.mark_type(Token::new(0x0200_0002), MarkReason::TypeName, &origin);
        recorder.mark_method(Token::new(0x0600_0003), MarkReason::AccessedMembers, &origin);

        assert_eq!(recorder.len(), 2);
        assert!(recorder.contains(MemberKind::Method, Token::new(0x0600_0003)));
        assert_eq!(recorder.members()[0].kind, MemberKind::Type);
        assert_eq!(recorder.tokens(MemberKind::Method), vec![Token::new(0x0600_0003)]);
    }

    #[test]
    fn constructors_are_recorded_as_methods() {
        let recorder = ReachabilityRecorder::new();
        let origin = Origin::method(Token::new(0x0600_0001));
        recorder.mark_constructor(Token::new(0x0600_0009), MarkReason::Activation, &origin);
        assert!(recorder.contains(MemberKind::Method, Token::new(0x0600_0009)));
    }
}
