//! Diagnostics reported by the analysis.
//!
//! Diagnostics describe reflection patterns the analysis could not prove safe and
//! structural problems it worked around. They are reported through the host's
//! [`DiagnosticSink`](crate::host::DiagnosticSink); the [`DiagnosticLog`] in this module is
//! a ready-made thread-safe sink.
//!
//! Codes follow the ILLink `IL2xxx` numbering so that existing suppression tooling keeps
//! working. Two codes have no ILLink counterpart and live in the `IL9xxx` range:
//! [`DiagnosticCode::InvalidIl`] and [`DiagnosticCode::UnanalyzableCall`].
//!
//! # Thread Safety
//!
//! [`DiagnosticLog`] uses `boxcar::Vec` internally, so methods analyzed in parallel can
//! report without coordination. Arrival order is not deterministic; use
//! [`DiagnosticLog::sorted`] when comparing runs.

use std::fmt;

use crate::{analysis::value::SourceKind, host::Origin};

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    /// Informational; the analysis worked around a problem in the input
    Info,
    /// The trimmed program may fail at run time
    Warning,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Info => write!(f, "INFO"),
            DiagnosticSeverity::Warning => write!(f, "WARN"),
        }
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticCode {
    /// IL2026: call to a method marked as requiring unreferenced code
    RequiresUnreferencedCode,
    /// IL2032: `Activator.CreateInstance(string, string)` with unknown names
    UnrecognizedCreateInstanceName,
    /// IL2050: p/invoke signature may marshal a COM interface
    ComInterop,
    /// IL2055: `MakeGenericType` on a value that is not statically known
    UnrecognizedMakeGenericType,
    /// IL2057: `Type.GetType` with a name that is not statically known
    UnrecognizedTypeName,
    /// IL2058: `Assembly.CreateInstance` and friends
    AssemblyCreateInstance,
    /// IL2059: `RunClassConstructor` on a handle that is not statically known
    UnrecognizedClassConstructor,
    /// IL2060: `MakeGenericMethod` on a method that is not statically known
    UnrecognizedMakeGenericMethod,
    /// IL2062..IL2066: a value that cannot be analyzed flows into an annotated location
    UnrecognizedValue {
        /// The annotated location
        target: SourceKind,
    },
    /// IL2067..IL2091: an annotated value does not satisfy the requirement of the location
    /// it flows into
    RequirementMismatch {
        /// Where the value comes from
        source: SourceKind,
        /// Where it flows
        target: SourceKind,
    },
    /// IL2105: a type name string does not resolve
    UnresolvedTypeName,
    /// IL9001: stack underflow or an otherwise inconsistent instruction stream
    InvalidIl,
    /// IL9002: a recognized reflection API called through an overload the analysis does not
    /// model
    UnanalyzableCall,
}

const fn kind_index(kind: SourceKind) -> u32 {
    match kind {
        SourceKind::Parameter => 0,
        SourceKind::Return => 1,
        SourceKind::Field => 2,
        SourceKind::This => 3,
        SourceKind::GenericParameter => 4,
    }
}

impl DiagnosticCode {
    /// The numeric code.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            DiagnosticCode::RequiresUnreferencedCode => 2026,
            DiagnosticCode::UnrecognizedCreateInstanceName => 2032,
            DiagnosticCode::ComInterop => 2050,
            DiagnosticCode::UnrecognizedMakeGenericType => 2055,
            DiagnosticCode::UnrecognizedTypeName => 2057,
            DiagnosticCode::AssemblyCreateInstance => 2058,
            DiagnosticCode::UnrecognizedClassConstructor => 2059,
            DiagnosticCode::UnrecognizedMakeGenericMethod => 2060,
            DiagnosticCode::UnrecognizedValue { target } => 2062 + kind_index(target),
            DiagnosticCode::RequirementMismatch { source, target } => {
                2067 + 5 * kind_index(source) + kind_index(target)
            }
            DiagnosticCode::UnresolvedTypeName => 2105,
            DiagnosticCode::InvalidIl => 9001,
            DiagnosticCode::UnanalyzableCall => 9002,
        }
    }

    /// Severity the analysis reports this code with.
    #[must_use]
    pub const fn severity(self) -> DiagnosticSeverity {
        match self {
            DiagnosticCode::InvalidIl => DiagnosticSeverity::Info,
            _ => DiagnosticSeverity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL{}", self.number())
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Diagnostic {
    /// Where the pattern was observed
    pub origin: Origin,
    /// What was observed
    pub code: DiagnosticCode,
    /// How serious it is
    pub severity: DiagnosticSeverity,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic with the code's default severity.
    #[must_use]
    pub fn new(code: DiagnosticCode, origin: Origin, message: impl Into<String>) -> Self {
        Diagnostic {
            origin,
            code,
            severity: code.severity(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.severity, self.code, self.origin, self.message
        )
    }
}

/// Thread-safe, append-only collection of diagnostics.
#[derive(Debug)]
pub struct DiagnosticLog {
    entries: boxcar::Vec<Diagnostic>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Appends a diagnostic.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Total number of diagnostics.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns true if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.entries.count() == 0
    }

    /// Diagnostics in arrival order.
    ///
    /// Note: boxcar's iterator yields `(index, &Diagnostic)`; the index is dropped here.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }

    /// Diagnostics with the given code.
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.iter().filter(|d| d.code == code).collect()
    }

    /// Returns true if any diagnostic carries `code`.
    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.iter().any(|d| d.code == code)
    }

    /// All diagnostics, ordered by origin, then code, then message.
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = self.iter().cloned().collect();
        all.sort();
        all
    }
}
